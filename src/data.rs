use std::fmt;

use crate::constants::{
    COUNTER_BLOCK_COUNT, ENERGY_BLOCK_COUNT, ENERGY_WH_PER_COUNT, IDX_ACTIVE_POWER_HI,
    IDX_ACTIVE_POWER_LO, IDX_ACTIVE_POWER_PHASE, IDX_APPARENT_POWER_HI, IDX_APPARENT_POWER_LO,
    IDX_APPARENT_POWER_PHASE, IDX_CURRENT, IDX_ENERGY_EXPORT_HI, IDX_ENERGY_EXPORT_LO,
    IDX_ENERGY_IMPORT_HI, IDX_ENERGY_IMPORT_LO, IDX_ENERGY_TOTAL_HI, IDX_ENERGY_TOTAL_LO,
    IDX_FREQUENCY, IDX_POWER_FACTOR, IDX_POWER_FACTOR_PHASE, IDX_REACTIVE_POWER_HI,
    IDX_REACTIVE_POWER_LO, IDX_REACTIVE_POWER_PHASE, IDX_VOLTAGE, PHASE_BLOCK_COUNT,
};

/// Fixed-point value as reported by the meter: `raw / 10^decimals`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scaled {
    pub raw: i64,
    pub decimals: u8,
}

impl Scaled {
    pub const fn new(raw: i64, decimals: u8) -> Self {
        Self { raw, decimals }
    }
}

impl fmt::Display for Scaled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.decimals == 0 {
            return write!(f, "{}", self.raw);
        }
        let divisor = 10_u64.pow(u32::from(self.decimals));
        let sign = if self.raw < 0 { "-" } else { "" };
        let abs = self.raw.unsigned_abs();
        write!(
            f,
            "{sign}{}.{:0width$}",
            abs / divisor,
            abs % divisor,
            width = usize::from(self.decimals)
        )
    }
}

/// Raw holding registers read from one meter in a single poll.
#[derive(Debug, Clone, Default)]
pub struct RegisterBlocks {
    pub energy: Vec<u16>,
    pub counters: Vec<u16>,
    pub phases: Vec<u16>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeterReading {
    pub energy_total_wh: i64,
    pub energy_import_wh: i64,
    pub energy_export_wh: i64,
    pub frequency: Scaled,
    pub voltage: [Scaled; 3],
    pub current: [Scaled; 3],
    pub active_power: i32,
    pub active_power_phase: [i16; 3],
    pub reactive_power: i32,
    pub reactive_power_phase: [i16; 3],
    pub apparent_power: i32,
    pub apparent_power_phase: [i16; 3],
    pub power_factor: Scaled,
    pub power_factor_phase: [Scaled; 3],
}

impl MeterReading {
    pub fn from_blocks(blocks: &RegisterBlocks) -> Option<Self> {
        if blocks.energy.len() < usize::from(ENERGY_BLOCK_COUNT)
            || blocks.counters.len() < usize::from(COUNTER_BLOCK_COUNT)
            || blocks.phases.len() < usize::from(PHASE_BLOCK_COUNT)
        {
            return None;
        }
        let energy = blocks.energy.as_slice();
        let counters = blocks.counters.as_slice();
        let phases = blocks.phases.as_slice();

        let unsigned = |regs: &[u16], index: usize, decimals: u8| {
            Scaled::new(i64::from(regs[index]), decimals)
        };
        let per_phase = |index: usize, decimals: u8| {
            [0, 1, 2].map(|line| unsigned(phases, index + line, decimals))
        };
        let signed_phase = |index: usize| [0, 1, 2].map(|line| signed16(phases[index + line]));

        Some(Self {
            energy_total_wh: energy_wh(energy[IDX_ENERGY_TOTAL_HI], energy[IDX_ENERGY_TOTAL_LO]),
            energy_import_wh: energy_wh(
                counters[IDX_ENERGY_IMPORT_HI],
                counters[IDX_ENERGY_IMPORT_LO],
            ),
            energy_export_wh: energy_wh(
                counters[IDX_ENERGY_EXPORT_HI],
                counters[IDX_ENERGY_EXPORT_LO],
            ),
            frequency: unsigned(counters, IDX_FREQUENCY, 2),
            voltage: per_phase(IDX_VOLTAGE, 1),
            current: per_phase(IDX_CURRENT, 2),
            active_power: signed32(phases[IDX_ACTIVE_POWER_HI], phases[IDX_ACTIVE_POWER_LO]),
            active_power_phase: signed_phase(IDX_ACTIVE_POWER_PHASE),
            reactive_power: signed32(
                phases[IDX_REACTIVE_POWER_HI],
                phases[IDX_REACTIVE_POWER_LO],
            ),
            reactive_power_phase: signed_phase(IDX_REACTIVE_POWER_PHASE),
            apparent_power: signed32(
                phases[IDX_APPARENT_POWER_HI],
                phases[IDX_APPARENT_POWER_LO],
            ),
            apparent_power_phase: signed_phase(IDX_APPARENT_POWER_PHASE),
            power_factor: unsigned(phases, IDX_POWER_FACTOR, 1),
            power_factor_phase: per_phase(IDX_POWER_FACTOR_PHASE, 1),
        })
    }

    /// Power drawn from the grid, zero while exporting.
    pub fn import_power(&self) -> i64 {
        i64::from(self.active_power).max(0)
    }

    /// Power fed into the grid, zero while importing.
    pub fn export_power(&self) -> i64 {
        (-i64::from(self.active_power)).max(0)
    }

    pub fn net_energy_wh(&self) -> i64 {
        self.energy_import_wh - self.energy_export_wh
    }
}

pub fn signed16(value: u16) -> i16 {
    i16::from_be_bytes(value.to_be_bytes())
}

pub fn signed32(hi: u16, lo: u16) -> i32 {
    let [a, b] = hi.to_be_bytes();
    let [c, d] = lo.to_be_bytes();
    i32::from_be_bytes([a, b, c, d])
}

fn energy_wh(hi: u16, lo: u16) -> i64 {
    let counts = (u32::from(hi) << 16) | u32::from(lo);
    i64::from(counts) * ENERGY_WH_PER_COUNT
}

#[cfg(test)]
mod tests {
    use super::{MeterReading, RegisterBlocks, Scaled, signed16, signed32};
    use crate::constants::{
        COUNTER_BLOCK_COUNT, ENERGY_BLOCK_COUNT, IDX_ACTIVE_POWER_HI, IDX_ACTIVE_POWER_LO,
        IDX_ACTIVE_POWER_PHASE, IDX_CURRENT, IDX_ENERGY_EXPORT_LO, IDX_ENERGY_IMPORT_HI,
        IDX_ENERGY_IMPORT_LO, IDX_ENERGY_TOTAL_HI, IDX_ENERGY_TOTAL_LO, IDX_FREQUENCY,
        IDX_POWER_FACTOR, IDX_REACTIVE_POWER_PHASE, IDX_VOLTAGE, PHASE_BLOCK_COUNT,
    };

    fn zero_blocks() -> RegisterBlocks {
        RegisterBlocks {
            energy: vec![0; usize::from(ENERGY_BLOCK_COUNT)],
            counters: vec![0; usize::from(COUNTER_BLOCK_COUNT)],
            phases: vec![0; usize::from(PHASE_BLOCK_COUNT)],
        }
    }

    #[test]
    fn sixteen_bit_fields_are_twos_complement() {
        assert_eq!(signed16(0x0000), 0);
        assert_eq!(signed16(0x7FFF), 32_767);
        assert_eq!(signed16(0x8000), -32_768);
        assert_eq!(signed16(0xFFFF), -1);
        assert_eq!(signed16(0xFF38), -200);
    }

    #[test]
    fn thirty_two_bit_fields_are_twos_complement() {
        assert_eq!(signed32(0x0000, 0x0064), 100);
        assert_eq!(signed32(0x0001, 0x0000), 65_536);
        assert_eq!(signed32(0xFFFF, 0xFF9C), -100);
        assert_eq!(signed32(0x8000, 0x0000), i32::MIN);
    }

    #[test]
    fn scaled_values_render_fixed_decimals() {
        assert_eq!(Scaled::new(2301, 1).to_string(), "230.1");
        assert_eq!(Scaled::new(2300, 1).to_string(), "230.0");
        assert_eq!(Scaled::new(5, 2).to_string(), "0.05");
        assert_eq!(Scaled::new(-125, 2).to_string(), "-1.25");
        assert_eq!(Scaled::new(42, 0).to_string(), "42");
    }

    #[test]
    fn short_blocks_are_rejected() {
        let mut blocks = zero_blocks();
        blocks.phases.pop();
        assert!(MeterReading::from_blocks(&blocks).is_none());
    }

    #[test]
    fn decodes_fields_at_fixed_offsets() {
        let mut blocks = zero_blocks();
        blocks.energy[IDX_ENERGY_TOTAL_HI] = 0x0001;
        blocks.energy[IDX_ENERGY_TOTAL_LO] = 0x0002;
        blocks.counters[IDX_ENERGY_IMPORT_HI] = 0;
        blocks.counters[IDX_ENERGY_IMPORT_LO] = 1_500;
        blocks.counters[IDX_ENERGY_EXPORT_LO] = 400;
        blocks.counters[IDX_FREQUENCY] = 5_002;
        blocks.phases[IDX_VOLTAGE] = 2_301;
        blocks.phases[IDX_VOLTAGE + 2] = 2_288;
        blocks.phases[IDX_CURRENT + 1] = 123;
        blocks.phases[IDX_ACTIVE_POWER_HI] = 0xFFFF;
        blocks.phases[IDX_ACTIVE_POWER_LO] = 0xFC18;
        blocks.phases[IDX_ACTIVE_POWER_PHASE + 2] = 0xFFFE;
        blocks.phases[IDX_REACTIVE_POWER_PHASE + 2] = 0x8001;
        blocks.phases[IDX_POWER_FACTOR] = 987;

        let reading = MeterReading::from_blocks(&blocks).expect("reading should decode");
        assert_eq!(reading.energy_total_wh, 655_380);
        assert_eq!(reading.energy_import_wh, 15_000);
        assert_eq!(reading.energy_export_wh, 4_000);
        assert_eq!(reading.net_energy_wh(), 11_000);
        assert_eq!(reading.frequency.to_string(), "50.02");
        assert_eq!(reading.voltage[0].to_string(), "230.1");
        assert_eq!(reading.voltage[2].to_string(), "228.8");
        assert_eq!(reading.current[1].to_string(), "1.23");
        assert_eq!(reading.active_power, -1_000);
        assert_eq!(reading.active_power_phase, [0, 0, -2]);
        assert_eq!(reading.reactive_power_phase[2], -32_767);
        assert_eq!(reading.power_factor.to_string(), "98.7");
    }

    #[test]
    fn splits_active_power_into_import_and_export() {
        let mut blocks = zero_blocks();
        blocks.phases[IDX_ACTIVE_POWER_LO] = 750;
        let importing = MeterReading::from_blocks(&blocks).expect("reading should decode");
        assert_eq!(importing.import_power(), 750);
        assert_eq!(importing.export_power(), 0);

        blocks.phases[IDX_ACTIVE_POWER_HI] = 0xFFFF;
        blocks.phases[IDX_ACTIVE_POWER_LO] = 0xFD12;
        let exporting = MeterReading::from_blocks(&blocks).expect("reading should decode");
        assert_eq!(exporting.import_power(), 0);
        assert_eq!(exporting.export_power(), 750);
    }

    #[test]
    fn export_power_does_not_overflow_at_minimum() {
        let mut blocks = zero_blocks();
        blocks.phases[IDX_ACTIVE_POWER_HI] = 0x8000;
        let reading = MeterReading::from_blocks(&blocks).expect("reading should decode");
        assert_eq!(reading.export_power(), 2_147_483_648);
    }
}
