use std::collections::BTreeMap;

use color_eyre::eyre;

use crate::constants::{
    COUNTER_BLOCK_COUNT, ENERGY_BLOCK_COUNT, FACTORY_SLAVE_ADDRESS, IDX_ACTIVE_POWER_HI,
    IDX_ACTIVE_POWER_LO, IDX_ACTIVE_POWER_PHASE, IDX_APPARENT_POWER_HI, IDX_APPARENT_POWER_LO,
    IDX_APPARENT_POWER_PHASE, IDX_CURRENT, IDX_ENERGY_EXPORT_HI, IDX_ENERGY_EXPORT_LO,
    IDX_ENERGY_IMPORT_HI, IDX_ENERGY_IMPORT_LO, IDX_ENERGY_TOTAL_HI, IDX_ENERGY_TOTAL_LO,
    IDX_FREQUENCY, IDX_POWER_FACTOR, IDX_POWER_FACTOR_PHASE, IDX_REACTIVE_POWER_HI,
    IDX_REACTIVE_POWER_LO, IDX_REACTIVE_POWER_PHASE, IDX_VOLTAGE, PHASE_BLOCK_COUNT,
};
use crate::data::RegisterBlocks;

/// One simulated meter: a household load with a PV array that swings the
/// active power between import and export.
#[derive(Debug, Clone)]
pub struct SimMeter {
    tick: u32,
    import_counts: u32,
    export_counts: u32,
}

impl SimMeter {
    pub fn new() -> Self {
        Self {
            tick: 0,
            import_counts: 125_000,
            export_counts: 48_000,
        }
    }

    pub fn tick(&mut self) -> RegisterBlocks {
        self.tick = self.tick.wrapping_add(1);
        let phase_power: [i16; 3] = [0, 1, 2].map(|line| self.phase_power(line));
        let total_power: i32 = phase_power.iter().map(|&p| i32::from(p)).sum();
        if total_power >= 0 {
            self.import_counts = self.import_counts.wrapping_add(total_power.unsigned_abs() / 100);
        } else {
            self.export_counts = self.export_counts.wrapping_add(total_power.unsigned_abs() / 100);
        }

        let mut energy = vec![0u16; usize::from(ENERGY_BLOCK_COUNT)];
        let mut counters = vec![0u16; usize::from(COUNTER_BLOCK_COUNT)];
        let mut phases = vec![0u16; usize::from(PHASE_BLOCK_COUNT)];

        let total_counts = self.import_counts.wrapping_add(self.export_counts);
        put_u32(&mut energy, IDX_ENERGY_TOTAL_HI, IDX_ENERGY_TOTAL_LO, total_counts);
        put_u32(&mut counters, IDX_ENERGY_IMPORT_HI, IDX_ENERGY_IMPORT_LO, self.import_counts);
        put_u32(&mut counters, IDX_ENERGY_EXPORT_HI, IDX_ENERGY_EXPORT_LO, self.export_counts);
        counters[IDX_FREQUENCY] = 4_995 + u16::try_from(self.tick % 10).unwrap_or(0);

        let mut reactive_total = 0i32;
        let mut apparent_total = 0i32;
        for (line, power) in phase_power.into_iter().enumerate() {
            let offset = u32::try_from(line).unwrap_or(0) * 3;
            let voltage = 2_290 + u16::try_from((self.tick + offset) % 20).unwrap_or(0);
            let reactive = power / 8;
            let apparent = power.saturating_abs().saturating_add(reactive.saturating_abs());
            let amps = u32::from(apparent.unsigned_abs()) * 1_000 / u32::from(voltage);
            reactive_total += i32::from(reactive);
            apparent_total += i32::from(apparent);

            phases[IDX_VOLTAGE + line] = voltage;
            phases[IDX_CURRENT + line] = u16::try_from(amps).unwrap_or(u16::MAX);
            phases[IDX_ACTIVE_POWER_PHASE + line] = unsigned16(power);
            phases[IDX_REACTIVE_POWER_PHASE + line] = unsigned16(reactive);
            phases[IDX_APPARENT_POWER_PHASE + line] = unsigned16(apparent);
            phases[IDX_POWER_FACTOR_PHASE + line] = power_factor(power, apparent);
        }
        put_i32(&mut phases, IDX_ACTIVE_POWER_HI, IDX_ACTIVE_POWER_LO, total_power);
        put_i32(&mut phases, IDX_REACTIVE_POWER_HI, IDX_REACTIVE_POWER_LO, reactive_total);
        put_i32(&mut phases, IDX_APPARENT_POWER_HI, IDX_APPARENT_POWER_LO, apparent_total);
        phases[IDX_POWER_FACTOR] = power_factor_total(total_power, apparent_total);

        RegisterBlocks {
            energy,
            counters,
            phases,
        }
    }

    fn phase_power(&self, line: u32) -> i16 {
        let step = i32::try_from((self.tick + line * 5) % 40).unwrap_or(0);
        let load = 300 + 40 * i32::try_from(line).unwrap_or(0);
        // Triangle wave between -500 W and +1100 W on top of the load.
        let swing = if step < 20 { step * 80 } else { (40 - step) * 80 };
        i16::try_from(load + 800 - swing).unwrap_or(0)
    }
}

/// A simulated RS485 bus with meters keyed by slave address.
#[derive(Debug, Clone)]
pub struct SimBus {
    meters: BTreeMap<u8, SimMeter>,
}

impl SimBus {
    /// Populates `addresses` plus a meter still on the factory address.
    pub fn new(addresses: &[u8]) -> Self {
        let meters = addresses
            .iter()
            .copied()
            .chain([FACTORY_SLAVE_ADDRESS])
            .map(|address| (address, SimMeter::new()))
            .collect();
        Self { meters }
    }

    pub fn poll(&mut self, slave: u8) -> eyre::Result<RegisterBlocks> {
        self.meters
            .get_mut(&slave)
            .map(SimMeter::tick)
            .ok_or_else(|| eyre::eyre!("no response from slave {slave}"))
    }

    pub fn readdress(&mut self, slave: u8, address: u8) -> eyre::Result<()> {
        if self.meters.contains_key(&address) {
            return Err(eyre::eyre!("address {address} already answers on the bus"));
        }
        let meter = self
            .meters
            .remove(&slave)
            .ok_or_else(|| eyre::eyre!("no response from slave {slave}"))?;
        self.meters.insert(address, meter);
        Ok(())
    }

    pub fn addresses(&self) -> Vec<u8> {
        self.meters.keys().copied().collect()
    }
}

fn unsigned16(value: i16) -> u16 {
    u16::from_be_bytes(value.to_be_bytes())
}

fn put_u32(regs: &mut [u16], hi: usize, lo: usize, value: u32) {
    let [a, b, c, d] = value.to_be_bytes();
    regs[hi] = u16::from_be_bytes([a, b]);
    regs[lo] = u16::from_be_bytes([c, d]);
}

fn put_i32(regs: &mut [u16], hi: usize, lo: usize, value: i32) {
    put_u32(regs, hi, lo, u32::from_be_bytes(value.to_be_bytes()));
}

fn power_factor(power: i16, apparent: i16) -> u16 {
    power_factor_total(i32::from(power), i32::from(apparent))
}

fn power_factor_total(power: i32, apparent: i32) -> u16 {
    if apparent == 0 {
        return 1_000;
    }
    let permille = power.unsigned_abs() * 1_000 / apparent.unsigned_abs();
    u16::try_from(permille.min(1_000)).unwrap_or(1_000)
}
