use crate::constants::{
    SUBTYPE_CURRENT, SUBTYPE_CUSTOM, SUBTYPE_KWH, SUBTYPE_TEXT, SUBTYPE_VOLTAGE, SWITCH_EXPORT,
    SWITCH_NORMAL, TYPE_GENERAL, UNITS_PER_METER,
};
use crate::data::{MeterReading, Scaled};
use crate::store::{DeviceKind, DeviceOptions};

pub const IDX_TOTAL: u8 = 1;
pub const IDX_IMPORTED: u8 = 2;
pub const IDX_EXPORTED: u8 = 3;
pub const IDX_NET: u8 = 4;
pub const IDX_ACTIVE_L1: u8 = 5;
pub const IDX_REACTIVE: u8 = 8;
pub const IDX_REACTIVE_L1: u8 = 9;
pub const IDX_APPARENT: u8 = 12;
pub const IDX_APPARENT_L1: u8 = 13;
pub const IDX_POWER_FACTOR: u8 = 16;
pub const IDX_POWER_FACTOR_L1: u8 = 17;
pub const IDX_VOLTAGE_L1: u8 = 20;
pub const IDX_CURRENT_L1: u8 = 23;
pub const IDX_FREQUENCY: u8 = 26;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Language {
    #[default]
    English,
    Italian,
}

impl Language {
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim().to_ascii_lowercase().as_str() {
            "en" => Some(Self::English),
            "it" => Some(Self::Italian),
            _ => None,
        }
    }

    const fn slot(self) -> usize {
        match self {
            Self::English => 0,
            Self::Italian => 1,
        }
    }
}

#[derive(Debug)]
pub struct DeviceSpec {
    pub index: u8,
    pub kind: DeviceKind,
    pub options: &'static [(&'static str, &'static str)],
    pub image: u16,
    names: [&'static str; 2],
}

impl DeviceSpec {
    pub fn name(&self, language: Language) -> &'static str {
        self.names[language.slot()]
    }

    pub fn options(&self) -> DeviceOptions {
        self.options
            .iter()
            .map(|(key, value)| ((*key).to_owned(), (*value).to_owned()))
            .collect()
    }

    pub fn is_kwh(&self) -> bool {
        self.kind.subtype == SUBTYPE_KWH
    }
}

const fn kind(subtype: u8, switch_type: u8) -> DeviceKind {
    DeviceKind {
        type_id: TYPE_GENERAL,
        subtype,
        switch_type,
    }
}

const KWH: DeviceKind = kind(SUBTYPE_KWH, SWITCH_NORMAL);
const KWH_EXPORT: DeviceKind = kind(SUBTYPE_KWH, SWITCH_EXPORT);
const CUSTOM: DeviceKind = kind(SUBTYPE_CUSTOM, SWITCH_NORMAL);
const VOLTAGE: DeviceKind = kind(SUBTYPE_VOLTAGE, SWITCH_NORMAL);
const CURRENT: DeviceKind = kind(SUBTYPE_CURRENT, SWITCH_NORMAL);

pub const TEXT: DeviceKind = kind(SUBTYPE_TEXT, SWITCH_NORMAL);

/// Text device used to move a meter off the factory address.
pub const ADDRESS_DEVICE_NAME: &str = "Change address 1 -> 2-247";
pub const ADDRESS_DEVICE_DESCRIPTION: &str = "DTS238 meter: change address from 1 to, ADDR=1";

const NONE: &[(&str, &str)] = &[];
const INSTANT: &[(&str, &str)] = &[("EnergyMeterMode", "1")];
const PERCENT: &[(&str, &str)] = &[("Custom", "1;%")];
const HERTZ: &[(&str, &str)] = &[("Custom", "1;Hz")];

const fn spec(
    index: u8,
    kind: DeviceKind,
    options: &'static [(&'static str, &'static str)],
    en: &'static str,
    it: &'static str,
) -> DeviceSpec {
    DeviceSpec {
        index,
        kind,
        options,
        image: 0,
        names: [en, it],
    }
}

pub static CATALOGUE: [DeviceSpec; 26] = [
    spec(1, KWH, NONE, "Power/Energy total", "Potenza/Energia totale"),
    spec(2, KWH, NONE, "Power/Energy imported", "Potenza/Energia importata"),
    spec(3, KWH_EXPORT, NONE, "Power/Energy exported", "Potenza/Energia esportata"),
    spec(4, KWH, NONE, "Power/Energy net", "Potenza/Energia netta"),
    spec(5, KWH, INSTANT, "Active Power L1", "Potenza attiva L1"),
    spec(6, KWH, INSTANT, "Active Power L2", "Potenza attiva L2"),
    spec(7, KWH, INSTANT, "Active Power L3", "Potenza attiva L3"),
    spec(8, KWH, INSTANT, "Reactive Power", "Potenza reattiva"),
    spec(9, KWH, INSTANT, "Reactive Power L1", "Potenza reattiva L1"),
    spec(10, KWH, INSTANT, "Reactive Power L2", "Potenza reattiva L2"),
    spec(11, KWH, INSTANT, "Reactive Power L3", "Potenza reattiva L3"),
    spec(12, KWH, INSTANT, "Apparent Power", "Potenza apparente"),
    spec(13, KWH, INSTANT, "Apparent Power L1", "Potenza apparente L1"),
    spec(14, KWH, INSTANT, "Apparent Power L2", "Potenza apparente L2"),
    spec(15, KWH, INSTANT, "Apparent Power L3", "Potenza apparente L3"),
    spec(16, CUSTOM, PERCENT, "Power Factor", "Fattore di Potenza"),
    spec(17, CUSTOM, PERCENT, "Power Factor L1", "Fattore di Potenza L1"),
    spec(18, CUSTOM, PERCENT, "Power Factor L2", "Fattore di Potenza L2"),
    spec(19, CUSTOM, PERCENT, "Power Factor L3", "Fattore di Potenza L3"),
    spec(20, VOLTAGE, NONE, "Voltage L1", "Tensione L1"),
    spec(21, VOLTAGE, NONE, "Voltage L2", "Tensione L2"),
    spec(22, VOLTAGE, NONE, "Voltage L3", "Tensione L3"),
    spec(23, CURRENT, NONE, "Current L1", "Corrente L1"),
    spec(24, CURRENT, NONE, "Current L2", "Corrente L2"),
    spec(25, CURRENT, NONE, "Current L3", "Corrente L3"),
    spec(26, CUSTOM, HERTZ, "Frequency", "Frequenza"),
];

/// Unit of catalogue entry `index` for the meter at position `meter`.
pub fn unit_for(meter: usize, index: u8) -> Option<u8> {
    let base = u8::try_from(meter)
        .ok()?
        .checked_mul(UNITS_PER_METER)?;
    base.checked_add(index)
}

/// Splits a unit back into meter position and catalogue index.
pub fn locate_unit(unit: u8) -> (usize, u8) {
    (
        usize::from(unit / UNITS_PER_METER),
        unit % UNITS_PER_METER,
    )
}

pub fn description_for(index: u8, address: u8) -> String {
    match index {
        IDX_TOTAL => format!("Meter Addr={address}, Total power = imported + exported"),
        IDX_NET => format!("Meter Addr={address}, Net power = imported - exported"),
        IDX_POWER_FACTOR => power_factor_description(address),
        _ => format!("Meter Addr={address}"),
    }
}

pub fn power_factor_description(address: u8) -> String {
    format!("Meter Addr={address}, Power Factor, ADDR={address}")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceValue {
    /// Full `power;energy` pair.
    Meter { power: i64, energy: i64 },
    /// Instant power only; stored as `power;0`, compared on the power.
    Instant(i64),
    Text(Scaled),
}

pub fn device_values(reading: &MeterReading) -> Vec<(u8, DeviceValue)> {
    let power = i64::from(reading.active_power);
    let mut values = vec![
        (
            IDX_TOTAL,
            DeviceValue::Meter {
                power,
                energy: reading.energy_total_wh,
            },
        ),
        (
            IDX_IMPORTED,
            DeviceValue::Meter {
                power: reading.import_power(),
                energy: reading.energy_import_wh,
            },
        ),
        (
            IDX_EXPORTED,
            DeviceValue::Meter {
                power: reading.export_power(),
                energy: reading.energy_export_wh,
            },
        ),
        (
            IDX_NET,
            DeviceValue::Meter {
                power,
                energy: reading.net_energy_wh(),
            },
        ),
        (
            IDX_REACTIVE,
            DeviceValue::Instant(i64::from(reading.reactive_power)),
        ),
        (
            IDX_APPARENT,
            DeviceValue::Instant(i64::from(reading.apparent_power)),
        ),
        (IDX_POWER_FACTOR, DeviceValue::Text(reading.power_factor)),
        (IDX_FREQUENCY, DeviceValue::Text(reading.frequency)),
    ];

    for line in 0..3u8 {
        let at = usize::from(line);
        values.extend([
            (
                IDX_ACTIVE_L1 + line,
                DeviceValue::Instant(i64::from(reading.active_power_phase[at])),
            ),
            (
                IDX_REACTIVE_L1 + line,
                DeviceValue::Instant(i64::from(reading.reactive_power_phase[at])),
            ),
            (
                IDX_APPARENT_L1 + line,
                DeviceValue::Instant(i64::from(reading.apparent_power_phase[at])),
            ),
            (
                IDX_POWER_FACTOR_L1 + line,
                DeviceValue::Text(reading.power_factor_phase[at]),
            ),
            (IDX_VOLTAGE_L1 + line, DeviceValue::Text(reading.voltage[at])),
            (IDX_CURRENT_L1 + line, DeviceValue::Text(reading.current[at])),
        ]);
    }

    values.sort_by_key(|(index, _)| *index);
    values
}

#[cfg(test)]
mod tests {
    use super::{
        CATALOGUE, DeviceValue, IDX_EXPORTED, IDX_FREQUENCY, IDX_POWER_FACTOR, Language,
        description_for, device_values, locate_unit, unit_for,
    };
    use crate::data::{MeterReading, Scaled};

    fn reading() -> MeterReading {
        MeterReading {
            energy_total_wh: 1_000,
            energy_import_wh: 700,
            energy_export_wh: 300,
            frequency: Scaled::new(5_000, 2),
            voltage: [Scaled::new(2_300, 1); 3],
            current: [Scaled::new(150, 2); 3],
            active_power: -250,
            active_power_phase: [-100, -100, -50],
            reactive_power: 30,
            reactive_power_phase: [10, 10, 10],
            apparent_power: 260,
            apparent_power_phase: [100, 100, 60],
            power_factor: Scaled::new(962, 1),
            power_factor_phase: [Scaled::new(1_000, 1); 3],
        }
    }

    #[test]
    fn catalogue_indices_are_dense_and_ordered() {
        for (position, spec) in CATALOGUE.iter().enumerate() {
            assert_eq!(usize::from(spec.index), position + 1);
        }
    }

    #[test]
    fn language_codes_select_names() {
        assert_eq!(Language::from_code("it"), Some(Language::Italian));
        assert_eq!(Language::from_code(" EN "), Some(Language::English));
        assert_eq!(Language::from_code("de"), None);
        assert_eq!(CATALOGUE[25].name(Language::Italian), "Frequenza");
        assert_eq!(CATALOGUE[0].name(Language::English), "Power/Energy total");
    }

    #[test]
    fn units_follow_forty_per_meter() {
        assert_eq!(unit_for(0, 1), Some(1));
        assert_eq!(unit_for(2, IDX_POWER_FACTOR), Some(96));
        assert_eq!(unit_for(5, IDX_FREQUENCY), Some(226));
        assert_eq!(unit_for(7, 1), None);
        assert_eq!(locate_unit(96), (2, IDX_POWER_FACTOR));
    }

    #[test]
    fn power_factor_description_carries_address() {
        assert_eq!(
            description_for(IDX_POWER_FACTOR, 5),
            "Meter Addr=5, Power Factor, ADDR=5"
        );
        assert_eq!(description_for(20, 5), "Meter Addr=5");
    }

    #[test]
    fn every_catalogue_entry_gets_a_value() {
        let values = device_values(&reading());
        let indices: Vec<u8> = values.iter().map(|(index, _)| *index).collect();
        let expected: Vec<u8> = CATALOGUE.iter().map(|spec| spec.index).collect();
        assert_eq!(indices, expected);
    }

    #[test]
    fn exported_power_is_positive_while_feeding_in() {
        let values = device_values(&reading());
        let exported = values
            .iter()
            .find(|(index, _)| *index == IDX_EXPORTED)
            .map(|(_, value)| value.clone());
        assert_eq!(
            exported,
            Some(DeviceValue::Meter {
                power: 250,
                energy: 300
            })
        );
    }
}
