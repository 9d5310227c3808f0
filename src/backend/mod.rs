use color_eyre::eyre::{self, WrapErr};

use crate::constants::REG_ADDRESS_BAUD;
use crate::data::MeterReading;
use crate::interface::InterfaceMode;

mod remote;

#[cfg(debug_assertions)]
mod sim;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeterCommand {
    SetAddress { address: u8, baud_code: u8 },
}

impl MeterCommand {
    /// Register and value written to carry out the command.
    pub fn register_write(&self) -> (u16, u16) {
        match *self {
            Self::SetAddress { address, baud_code } => (
                REG_ADDRESS_BAUD,
                (u16::from(address) << 8) | u16::from(baud_code),
            ),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub port: Option<String>,
    pub baud: u32,
    pub interface: InterfaceMode,
    /// Addresses answered by the simulated bus, ignored otherwise.
    pub meters: Vec<u8>,
}

pub(crate) trait Backend {
    fn poll_meter(&mut self, slave: u8) -> eyre::Result<MeterReading>;
    fn apply_command(&mut self, slave: u8, command: &MeterCommand) -> eyre::Result<()>;
}

pub(crate) fn build_backend(config: &BackendConfig) -> eyre::Result<Box<dyn Backend + Send>> {
    match config.interface {
        InterfaceMode::Remote => {
            let port = config
                .port
                .as_ref()
                .ok_or_else(|| eyre::eyre!("serial port required"))?;
            let backend = remote::RemoteBackend::new(port, config.baud)
                .wrap_err_with(|| format!("open {port} (available ports: {})", available_ports()))?;
            Ok(Box::new(backend))
        }
        InterfaceMode::Simulation => {
            #[cfg(debug_assertions)]
            {
                Ok(Box::new(sim::SimBackend::new(&config.meters)))
            }
            #[cfg(not(debug_assertions))]
            {
                Err(eyre::eyre!("simulation not available in release builds"))
            }
        }
    }
}

fn available_ports() -> String {
    match serialport::available_ports() {
        Ok(ports) if ports.is_empty() => "none".to_owned(),
        Ok(ports) => ports
            .into_iter()
            .map(|port| port.port_name)
            .collect::<Vec<_>>()
            .join(", "),
        Err(err) => format!("unknown ({err})"),
    }
}
