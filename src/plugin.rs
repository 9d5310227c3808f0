use std::time::Duration;

use color_eyre::eyre;
use log::{debug, error, info, warn};
use rand::Rng;

use crate::addressing::{
    AddressRejection, find_address_option, parse_meter_addresses, validate_new_address,
};
use crate::backend::{Backend, MeterCommand};
use crate::constants::{ADDRESS_DEVICE_UNIT, FACTORY_SLAVE_ADDRESS, HEARTBEAT_JITTER_SECS};
use crate::data::{MeterReading, Scaled};
use crate::devices::{
    ADDRESS_DEVICE_DESCRIPTION, ADDRESS_DEVICE_NAME, CATALOGUE, DeviceSpec, DeviceValue,
    IDX_POWER_FACTOR, Language, TEXT, description_for, device_values, locate_unit, unit_for,
};
use crate::store::{Device, DeviceStore, DeviceUpdate};

#[derive(Debug, Clone)]
pub struct PluginConfig {
    pub poll_interval: Duration,
    /// Comma separated slave addresses, in unit order.
    pub meters: String,
    pub language: String,
    pub baud_code: u8,
    pub read_only: bool,
}

/// Which bus address an edited device stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AddressTarget {
    Meter(usize),
    Factory,
}

pub struct Plugin<S> {
    config: PluginConfig,
    backend: Box<dyn Backend + Send>,
    store: S,
    /// Slave address per unit block; `None` once the meter was moved to the
    /// factory address and is no longer polled.
    meters: Vec<Option<u8>>,
    language: Language,
    heartbeat: Duration,
}

impl<S: DeviceStore> Plugin<S> {
    pub(crate) fn new(config: PluginConfig, backend: Box<dyn Backend + Send>, store: S) -> Self {
        let heartbeat = config.poll_interval;
        Self {
            config,
            backend,
            store,
            meters: Vec::new(),
            language: Language::English,
            heartbeat,
        }
    }

    /// Interval the host should wait before the next `on_heartbeat`.
    pub fn heartbeat(&self) -> Duration {
        self.heartbeat
    }

    /// Addresses polled on each heartbeat, in unit order.
    pub fn meters(&self) -> Vec<u8> {
        self.meters.iter().flatten().copied().collect()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn on_start(&mut self) -> eyre::Result<()> {
        info!("Starting DTS238 poller");
        self.set_heartbeat(self.config.poll_interval);

        self.language = Language::from_code(&self.config.language).unwrap_or_else(|| {
            error!(
                "Language {:?} has no translation, falling back to English",
                self.config.language
            );
            Language::English
        });

        self.meters = parse_meter_addresses(&self.config.meters)
            .into_iter()
            .map(Some)
            .collect();
        if self.meters.is_empty() {
            warn!("No meter addresses configured, only the address device will be created");
        }

        if !self.store.contains(ADDRESS_DEVICE_UNIT) {
            info!("Create device to change address of meters still on address 1");
            self.store.create(
                Device::new(ADDRESS_DEVICE_UNIT, ADDRESS_DEVICE_NAME, TEXT)
                    .with_description(ADDRESS_DEVICE_DESCRIPTION),
            )?;
        }

        for (position, slave) in self.meters.clone().into_iter().enumerate() {
            let Some(slave) = slave else {
                continue;
            };
            for spec in &CATALOGUE {
                let Some(unit) = unit_for(position, spec.index) else {
                    continue;
                };
                if !self.store.contains(unit) {
                    self.create_device(unit, spec, slave)?;
                }
            }
        }
        Ok(())
    }

    pub fn on_stop(&mut self) {
        info!("Stopping DTS238 poller");
    }

    pub fn on_heartbeat(&mut self) {
        let mut failed = false;
        for position in 0..self.meters.len() {
            let Some(slave) = self.meters[position] else {
                continue;
            };
            match self.backend.poll_meter(slave) {
                Ok(reading) => {
                    log_reading(slave, &reading);
                    self.push_reading(position, &reading);
                }
                Err(err) => {
                    error!("Error reading Modbus registers from meter {slave}: {err:#}");
                    failed = true;
                }
            }
        }

        if failed {
            self.lengthen_heartbeat();
        } else if self.heartbeat != self.config.poll_interval {
            self.set_heartbeat(self.config.poll_interval);
        }
    }

    pub fn on_command(&mut self, unit: u8, command: &str, level: u8) {
        let name = self
            .store
            .device(unit)
            .map_or("<unknown>", |device| device.name.as_str());
        info!("Command for {name}: Unit={unit}, Command={command}, Level={level}");
    }

    /// Called after the user edited a device, e.g. its description.
    pub fn on_device_modified(&mut self, unit: u8) {
        let Some(device) = self.store.device(unit) else {
            warn!("Modified device with Unit={unit} does not exist");
            return;
        };
        let description = device.description.clone();
        info!("Modified device with Unit={unit}: Description={description}");

        let Some(target) = self.address_target(unit) else {
            return;
        };
        let requested = match find_address_option(&description) {
            None => return,
            Some(None) => {
                warn!("ADDR option of unit {unit} is not a number: {description:?}");
                return;
            }
            Some(Some(requested)) => requested,
        };

        let current = self.target_address(target);
        let address = match validate_new_address(requested, current) {
            Ok(address) => address,
            Err(AddressRejection::Unchanged(_)) => {
                debug!("Meter {current} already uses the requested address");
                return;
            }
            Err(rejection) => {
                warn!("Refusing to reprogram meter {current}: {rejection}");
                return;
            }
        };
        if self.meters.contains(&Some(address)) {
            warn!(
                "Refusing to reprogram meter {current}: address {address} belongs to another meter"
            );
            return;
        }
        if self.config.read_only {
            warn!("Read-only mode: not reprogramming meter {current} to address {address}");
            return;
        }

        let command = MeterCommand::SetAddress {
            address,
            baud_code: self.config.baud_code,
        };
        match self.backend.apply_command(current, &command) {
            Ok(()) => {
                info!(
                    "Meter with slave address {current} successfully reprogrammed with new slave \
                     address {address}"
                );
                self.after_readdress(target, address);
            }
            Err(err) => {
                error!(
                    "Error writing Modbus register 0x15 (to change slave address) to meter \
                     {current}: {err:#}"
                );
            }
        }
    }

    fn create_device(&mut self, unit: u8, spec: &DeviceSpec, slave: u8) -> eyre::Result<()> {
        let name = spec.name(self.language);
        let description = description_for(spec.index, slave);
        let options = spec.options();
        info!(
            "Creating device Name={name}, Description={description}, Unit={unit}, Type={}, \
             Subtype={}, Switchtype={}, Options={options:?}, Image={}",
            spec.kind.type_id, spec.kind.subtype, spec.kind.switch_type, spec.image
        );
        let mut device = Device::new(unit, name, spec.kind).with_description(description);
        device.image = spec.image;
        self.store.create(device)?;

        if !options.is_empty() {
            if spec.is_kwh() {
                self.store.update(unit, DeviceUpdate::value(0, "0;0"))?;
                self.store
                    .update(unit, DeviceUpdate::value(0, "0;0").with_options(options))?;
            } else {
                self.store
                    .update(unit, DeviceUpdate::value(0, "0").with_options(options))?;
            }
        }
        Ok(())
    }

    fn push_reading(&mut self, position: usize, reading: &MeterReading) {
        for (index, value) in device_values(reading) {
            let Some(unit) = unit_for(position, index) else {
                continue;
            };
            match value {
                DeviceValue::Meter { power, energy } => {
                    self.update_value(unit, format!("{power};{energy}"));
                }
                DeviceValue::Instant(power) => self.update_counter(unit, power),
                DeviceValue::Text(value) => self.update_value(unit, value.to_string()),
            }
        }
    }

    /// Writes `s_value` only when it differs from the stored one.
    fn update_value(&mut self, unit: u8, s_value: String) {
        let Some(device) = self.store.device(unit) else {
            warn!("Device with Unit={unit} is missing, skipping update");
            return;
        };
        if device.s_value == s_value {
            return;
        }
        debug!("Update Devices[{unit}] {} = {s_value}", device.name);
        if let Err(err) = self.store.update(unit, DeviceUpdate::value(0, s_value)) {
            error!("Failed to update device with Unit={unit}: {err:#}");
        }
    }

    /// Writes `power;0` unless the stored value already starts with `power;`.
    fn update_counter(&mut self, unit: u8, power: i64) {
        let Some(device) = self.store.device(unit) else {
            warn!("Device with Unit={unit} is missing, skipping update");
            return;
        };
        if device.s_value.starts_with(&format!("{power};")) {
            return;
        }
        debug!("Update Devices[{unit}] {} = {power}", device.name);
        if let Err(err) = self
            .store
            .update(unit, DeviceUpdate::value(0, format!("{power};0")))
        {
            error!("Failed to update device with Unit={unit}: {err:#}");
        }
    }

    fn set_heartbeat(&mut self, interval: Duration) {
        self.heartbeat = interval;
        info!("Heartbeat set to {}s", interval.as_secs());
    }

    /// Lengthens the interval once, so masters that collided drift apart.
    fn lengthen_heartbeat(&mut self) {
        if self.heartbeat != self.config.poll_interval {
            return;
        }
        let jitter = rand::rng().random_range(HEARTBEAT_JITTER_SECS);
        self.set_heartbeat(self.config.poll_interval + Duration::from_secs(jitter));
    }

    fn address_target(&self, unit: u8) -> Option<AddressTarget> {
        if unit == ADDRESS_DEVICE_UNIT {
            return Some(AddressTarget::Factory);
        }
        let (position, index) = locate_unit(unit);
        let polled = self.meters.get(position).is_some_and(Option::is_some);
        (index == IDX_POWER_FACTOR && polled).then_some(AddressTarget::Meter(position))
    }

    fn target_address(&self, target: AddressTarget) -> u8 {
        match target {
            AddressTarget::Meter(position) => {
                self.meters[position].unwrap_or(FACTORY_SLAVE_ADDRESS)
            }
            AddressTarget::Factory => FACTORY_SLAVE_ADDRESS,
        }
    }

    fn after_readdress(&mut self, target: AddressTarget, address: u8) {
        match target {
            AddressTarget::Meter(position) => {
                let previous = self.target_address(target);
                for spec in &CATALOGUE {
                    if let Some(unit) = unit_for(position, spec.index) {
                        self.set_description(unit, description_for(spec.index, address));
                    }
                }
                if address == FACTORY_SLAVE_ADDRESS {
                    self.meters[position] = None;
                    warn!(
                        "Meter {previous} moved to factory address {address} and is no longer \
                         polled; give it a new address through unit {ADDRESS_DEVICE_UNIT}"
                    );
                    return;
                }
                self.meters[position] = Some(address);
                warn!(
                    "Meter {previous} now answers on address {address}; update the configured \
                     meter list to keep it after a restart"
                );
            }
            AddressTarget::Factory => {
                self.set_description(ADDRESS_DEVICE_UNIT, ADDRESS_DEVICE_DESCRIPTION.to_owned());
                info!("Add address {address} to the configured meter list to start polling it");
            }
        }
    }

    fn set_description(&mut self, unit: u8, description: String) {
        let Some(device) = self.store.device(unit) else {
            return;
        };
        let update = DeviceUpdate::value(device.n_value, device.s_value.clone())
            .with_description(description);
        if let Err(err) = self.store.update(unit, update) {
            error!("Failed to update description of device with Unit={unit}: {err:#}");
        }
    }
}

fn log_reading(slave: u8, reading: &MeterReading) {
    info!(
        "Slave={slave}, P={}W E={}kWh Imp={}kWh Exp={}kWh f={}Hz PF={}%",
        reading.active_power,
        kwh(reading.energy_total_wh),
        kwh(reading.energy_import_wh),
        kwh(reading.energy_export_wh),
        reading.frequency,
        reading.power_factor
    );
    for line in 0..3 {
        debug!(
            "Slave={slave}, L{}: {}W {}VAR {}VA {}A {}V PF={}%",
            line + 1,
            reading.active_power_phase[line],
            reading.reactive_power_phase[line],
            reading.apparent_power_phase[line],
            reading.current[line],
            reading.voltage[line],
            reading.power_factor_phase[line]
        );
    }
}

fn kwh(wh: i64) -> Scaled {
    Scaled::new(wh, 3)
}
