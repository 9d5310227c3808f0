use color_eyre::eyre;
use log::debug;

use crate::backend::{Backend, MeterCommand};
use crate::data::MeterReading;
use crate::sim::SimBus;

pub(crate) struct SimBackend {
    bus: SimBus,
}

impl SimBackend {
    pub(crate) fn new(addresses: &[u8]) -> Self {
        let bus = SimBus::new(addresses);
        debug!("Simulated meters answer on {:?}", bus.addresses());
        Self { bus }
    }
}

impl Backend for SimBackend {
    fn poll_meter(&mut self, slave: u8) -> eyre::Result<MeterReading> {
        let blocks = self.bus.poll(slave)?;
        MeterReading::from_blocks(&blocks).ok_or_else(|| eyre::eyre!("short simulated response"))
    }

    fn apply_command(&mut self, slave: u8, command: &MeterCommand) -> eyre::Result<()> {
        match *command {
            MeterCommand::SetAddress { address, .. } => self.bus.readdress(slave, address),
        }
    }
}
