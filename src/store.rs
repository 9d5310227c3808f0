use std::collections::BTreeMap;

use color_eyre::eyre;

pub type DeviceOptions = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceKind {
    pub type_id: u8,
    pub subtype: u8,
    pub switch_type: u8,
}

/// A device as owned by the hub's device model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    pub unit: u8,
    pub name: String,
    pub description: String,
    pub kind: DeviceKind,
    pub image: u16,
    pub used: bool,
    pub n_value: i32,
    pub s_value: String,
    pub options: DeviceOptions,
}

impl Device {
    pub fn new(unit: u8, name: impl Into<String>, kind: DeviceKind) -> Self {
        Self {
            unit,
            name: name.into(),
            description: String::new(),
            kind,
            image: 0,
            used: true,
            n_value: 0,
            s_value: String::new(),
            options: DeviceOptions::new(),
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceUpdate {
    pub n_value: i32,
    pub s_value: String,
    pub options: Option<DeviceOptions>,
    pub description: Option<String>,
}

impl DeviceUpdate {
    pub fn value(n_value: i32, s_value: impl Into<String>) -> Self {
        Self {
            n_value,
            s_value: s_value.into(),
            options: None,
            description: None,
        }
    }

    #[must_use]
    pub fn with_options(mut self, options: DeviceOptions) -> Self {
        self.options = Some(options);
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

pub trait DeviceStore {
    fn device(&self, unit: u8) -> Option<&Device>;
    fn create(&mut self, device: Device) -> eyre::Result<()>;
    fn update(&mut self, unit: u8, update: DeviceUpdate) -> eyre::Result<()>;

    fn contains(&self, unit: u8) -> bool {
        self.device(unit).is_some()
    }
}

/// Device model kept in memory by the standalone host.
#[derive(Debug, Default)]
pub struct MemoryStore {
    devices: BTreeMap<u8, Device>,
    writes: usize,
}

impl MemoryStore {
    pub fn devices(&self) -> impl Iterator<Item = &Device> {
        self.devices.values()
    }

    /// Number of create/update calls that reached the store.
    pub fn writes(&self) -> usize {
        self.writes
    }

    /// Edits a description the way the hub's frontend does, without
    /// notifying anyone.
    pub fn set_description(&mut self, unit: u8, description: &str) -> eyre::Result<()> {
        let device = self
            .devices
            .get_mut(&unit)
            .ok_or_else(|| eyre::eyre!("no device with unit {unit}"))?;
        device.description = description.to_owned();
        Ok(())
    }

    /// Deletes a device the way a user does from the hub's frontend.
    pub fn remove(&mut self, unit: u8) -> Option<Device> {
        self.devices.remove(&unit)
    }
}

impl DeviceStore for MemoryStore {
    fn device(&self, unit: u8) -> Option<&Device> {
        self.devices.get(&unit)
    }

    fn create(&mut self, device: Device) -> eyre::Result<()> {
        if self.devices.contains_key(&device.unit) {
            return Err(eyre::eyre!("unit {} already exists", device.unit));
        }
        self.writes += 1;
        self.devices.insert(device.unit, device);
        Ok(())
    }

    fn update(&mut self, unit: u8, update: DeviceUpdate) -> eyre::Result<()> {
        let device = self
            .devices
            .get_mut(&unit)
            .ok_or_else(|| eyre::eyre!("no device with unit {unit}"))?;
        device.n_value = update.n_value;
        device.s_value = update.s_value;
        if let Some(options) = update.options {
            device.options = options;
        }
        if let Some(description) = update.description {
            device.description = description;
        }
        self.writes += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{Device, DeviceKind, DeviceStore, DeviceUpdate, MemoryStore};

    const KIND: DeviceKind = DeviceKind {
        type_id: 243,
        subtype: 8,
        switch_type: 0,
    };

    #[test]
    fn duplicate_units_are_rejected() {
        let mut store = MemoryStore::default();
        store.create(Device::new(3, "Voltage", KIND)).expect("first create");
        let err = store
            .create(Device::new(3, "Voltage", KIND))
            .expect_err("duplicate should fail");
        assert!(err.to_string().contains("already exists"));
    }

    #[test]
    fn update_keeps_description_unless_given() {
        let mut store = MemoryStore::default();
        store
            .create(Device::new(1, "Voltage", KIND).with_description("Meter Addr=2"))
            .expect("create");
        store
            .update(1, DeviceUpdate::value(0, "230.1"))
            .expect("update");
        let device = store.device(1).expect("device exists");
        assert_eq!(device.s_value, "230.1");
        assert_eq!(device.description, "Meter Addr=2");
        assert_eq!(store.writes(), 2);
    }

    #[test]
    fn updating_missing_unit_fails() {
        let mut store = MemoryStore::default();
        assert!(store.update(9, DeviceUpdate::value(0, "1")).is_err());
        assert!(store.set_description(9, "ADDR=3").is_err());
    }

    #[test]
    fn removed_unit_is_gone() {
        let mut store = MemoryStore::default();
        store.create(Device::new(4, "Current", KIND)).expect("create");
        assert!(store.remove(4).is_some());
        assert!(!store.contains(4));
        assert!(store.remove(4).is_none());
    }
}
