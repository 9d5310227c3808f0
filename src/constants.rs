pub const ENERGY_BLOCK_START: u16 = 0x0000;
pub const ENERGY_BLOCK_COUNT: u16 = 0x0002;

pub const COUNTER_BLOCK_START: u16 = 0x0008;
pub const COUNTER_BLOCK_COUNT: u16 = 0x000A;

pub const PHASE_BLOCK_START: u16 = 0x0080;
pub const PHASE_BLOCK_COUNT: u16 = 0x0019;

// Offsets inside the energy block.
pub const IDX_ENERGY_TOTAL_HI: usize = 0x00;
pub const IDX_ENERGY_TOTAL_LO: usize = 0x01;

// Offsets inside the counter block (register 0x08 is index 0).
pub const IDX_ENERGY_EXPORT_HI: usize = 0x00;
pub const IDX_ENERGY_EXPORT_LO: usize = 0x01;
pub const IDX_ENERGY_IMPORT_HI: usize = 0x02;
pub const IDX_ENERGY_IMPORT_LO: usize = 0x03;
pub const IDX_FREQUENCY: usize = 0x09;

// Offsets inside the phase block (register 0x80 is index 0).
pub const IDX_VOLTAGE: usize = 0x00;
pub const IDX_CURRENT: usize = 0x03;
pub const IDX_ACTIVE_POWER_HI: usize = 0x06;
pub const IDX_ACTIVE_POWER_LO: usize = 0x07;
pub const IDX_ACTIVE_POWER_PHASE: usize = 0x08;
pub const IDX_REACTIVE_POWER_HI: usize = 0x0B;
pub const IDX_REACTIVE_POWER_LO: usize = 0x0C;
pub const IDX_REACTIVE_POWER_PHASE: usize = 0x0D;
pub const IDX_APPARENT_POWER_HI: usize = 0x10;
pub const IDX_APPARENT_POWER_LO: usize = 0x11;
pub const IDX_APPARENT_POWER_PHASE: usize = 0x12;
pub const IDX_POWER_FACTOR: usize = 0x15;
pub const IDX_POWER_FACTOR_PHASE: usize = 0x16;

/// High byte: slave address, low byte: baud rate code.
pub const REG_ADDRESS_BAUD: u16 = 0x0015;

/// Energy counters count in units of 10 Wh.
pub const ENERGY_WH_PER_COUNT: i64 = 10;

pub const SLAVE_ADDRESS_MIN: u8 = 1;
pub const SLAVE_ADDRESS_MAX: u8 = 247;
pub const FACTORY_SLAVE_ADDRESS: u8 = 1;

pub const UNITS_PER_METER: u8 = 40;
pub const MAX_METERS: usize = 6;
pub const ADDRESS_DEVICE_UNIT: u8 = 240;

pub const TYPE_GENERAL: u8 = 243;
pub const SUBTYPE_VOLTAGE: u8 = 8;
pub const SUBTYPE_TEXT: u8 = 19;
pub const SUBTYPE_CURRENT: u8 = 23;
pub const SUBTYPE_KWH: u8 = 29;
pub const SUBTYPE_CUSTOM: u8 = 31;

pub const SWITCH_NORMAL: u8 = 0;
pub const SWITCH_EXPORT: u8 = 4;

pub const REQUEST_TIMEOUT_MS: u64 = 500;
pub const HEARTBEAT_JITTER_SECS: std::ops::RangeInclusive<u64> = 1..=5;
