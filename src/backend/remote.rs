use std::time::Duration;

use color_eyre::eyre::{self, WrapErr};
use modbus_rtu::{Function, Master, Request, Response};

use crate::backend::{Backend, MeterCommand};
use crate::constants::{
    COUNTER_BLOCK_COUNT, COUNTER_BLOCK_START, ENERGY_BLOCK_COUNT, ENERGY_BLOCK_START,
    PHASE_BLOCK_COUNT, PHASE_BLOCK_START, REQUEST_TIMEOUT_MS,
};
use crate::data::{MeterReading, RegisterBlocks};

pub(crate) struct RemoteBackend {
    master: Master,
}

impl RemoteBackend {
    pub(crate) fn new(port: &str, baud: u32) -> eyre::Result<Self> {
        let master = Master::new_rs485(port, baud).wrap_err("open modbus port")?;
        Ok(Self { master })
    }
}

impl Backend for RemoteBackend {
    fn poll_meter(&mut self, slave: u8) -> eyre::Result<MeterReading> {
        let blocks = RegisterBlocks {
            energy: read_block(&mut self.master, slave, ENERGY_BLOCK_START, ENERGY_BLOCK_COUNT)?,
            counters: read_block(
                &mut self.master,
                slave,
                COUNTER_BLOCK_START,
                COUNTER_BLOCK_COUNT,
            )?,
            phases: read_block(&mut self.master, slave, PHASE_BLOCK_START, PHASE_BLOCK_COUNT)?,
        };
        MeterReading::from_blocks(&blocks)
            .ok_or_else(|| eyre::eyre!("short register response from slave {slave}"))
    }

    fn apply_command(&mut self, slave: u8, command: &MeterCommand) -> eyre::Result<()> {
        let (register, value) = command.register_write();
        write_register(&mut self.master, slave, register, value)
    }
}

fn request_timeout() -> Duration {
    Duration::from_millis(REQUEST_TIMEOUT_MS)
}

fn read_block(master: &mut Master, slave: u8, start: u16, quantity: u16) -> eyre::Result<Vec<u16>> {
    let function = Function::ReadHoldingRegisters {
        starting_address: start,
        quantity,
    };
    let request = Request::new(slave, &function, request_timeout());
    let response = master
        .send(&request)
        .wrap_err_with(|| format!("read registers 0x{start:02X}+{quantity}"))?;
    match response {
        Response::Value(values) => Ok(values.into_vec()),
        Response::Exception(exception) => Err(eyre::eyre!("device exception: {exception:?}")),
        _ => Err(eyre::eyre!("unexpected response to register read")),
    }
}

fn write_register(master: &mut Master, slave: u8, register: u16, value: u16) -> eyre::Result<()> {
    let function = Function::WriteSingleRegister {
        address: register,
        value,
    };
    let request = Request::new(slave, &function, request_timeout());
    let response = master.send(&request).wrap_err("write register")?;
    if response.is_success() {
        Ok(())
    } else {
        Err(eyre::eyre!("write rejected: {response}"))
    }
}
