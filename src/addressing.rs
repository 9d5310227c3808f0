use std::fmt;

use log::warn;

use crate::constants::{MAX_METERS, SLAVE_ADDRESS_MAX, SLAVE_ADDRESS_MIN};

/// Baud rate code stored in the low byte of the address register.
pub fn baud_code(baud: u32) -> Option<u8> {
    match baud {
        9_600 => Some(1),
        4_800 => Some(2),
        2_400 => Some(3),
        1_200 => Some(4),
        _ => None,
    }
}

/// Parses the configured meter list, e.g. `2,3,124`.
///
/// Address 1 is the factory default and is never polled, so only 2..=247 is
/// kept. Order is preserved since it decides each meter's unit range.
pub fn parse_meter_addresses(list: &str) -> Vec<u8> {
    let mut meters: Vec<u8> = Vec::new();
    for token in list.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        let Ok(address) = token.parse::<u8>() else {
            warn!("Ignoring meter address {token:?}: not a number in 2..=247");
            continue;
        };
        if address <= SLAVE_ADDRESS_MIN || address > SLAVE_ADDRESS_MAX {
            warn!("Ignoring meter address {address}: must be in 2..=247");
            continue;
        }
        if meters.contains(&address) {
            warn!("Ignoring duplicate meter address {address}");
            continue;
        }
        if meters.len() == MAX_METERS {
            warn!("Ignoring meter address {address}: at most {MAX_METERS} meters are supported");
            continue;
        }
        meters.push(address);
    }
    meters
}

/// Finds an `ADDR=x` option in a comma separated description.
///
/// Returns `None` when no option is present, `Some(None)` when it is
/// present but not numeric. Fractions are truncated.
#[allow(clippy::cast_possible_truncation)]
pub fn find_address_option(description: &str) -> Option<Option<i64>> {
    description.split(',').find_map(|option| {
        let option = option.trim().to_ascii_uppercase();
        let value = option.strip_prefix("ADDR=")?;
        Some(
            value
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .map(|v| v.trunc() as i64),
        )
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressRejection {
    OutOfRange(i64),
    Unchanged(u8),
}

impl fmt::Display for AddressRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfRange(requested) => write!(f, "address {requested} outside 1..=247"),
            Self::Unchanged(address) => write!(f, "meter already uses address {address}"),
        }
    }
}

/// Checks a requested address against the meter's current one.
pub fn validate_new_address(requested: i64, current: u8) -> Result<u8, AddressRejection> {
    let address = u8::try_from(requested)
        .ok()
        .filter(|a| (SLAVE_ADDRESS_MIN..=SLAVE_ADDRESS_MAX).contains(a))
        .ok_or(AddressRejection::OutOfRange(requested))?;
    if address == current {
        return Err(AddressRejection::Unchanged(address));
    }
    Ok(address)
}
