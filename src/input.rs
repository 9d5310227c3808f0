use color_eyre::eyre::{self, WrapErr};

use crate::transport::HostEvent;

/// Parses one console line into a host event. Blank lines yield `None`.
pub fn parse_line(line: &str) -> eyre::Result<Option<HostEvent>> {
    let line = line.trim();
    let Some((keyword, rest)) = split_word(line) else {
        return Ok(None);
    };

    let event = match keyword.to_ascii_lowercase().as_str() {
        "quit" | "exit" => HostEvent::Terminate,
        "list" => HostEvent::ListDevices,
        "describe" => {
            let (unit, description) =
                split_word(rest).ok_or_else(|| eyre::eyre!("usage: describe <unit> <text>"))?;
            HostEvent::DeviceModified {
                unit: parse_unit(unit)?,
                description: description.to_owned(),
            }
        }
        "delete" => {
            let (unit, _) = split_word(rest).ok_or_else(|| eyre::eyre!("usage: delete <unit>"))?;
            HostEvent::DeviceRemoved {
                unit: parse_unit(unit)?,
            }
        }
        "command" => {
            let (unit, rest) = split_word(rest)
                .ok_or_else(|| eyre::eyre!("usage: command <unit> <command> [level]"))?;
            let (command, rest) = split_word(rest)
                .ok_or_else(|| eyre::eyre!("usage: command <unit> <command> [level]"))?;
            let level = match split_word(rest) {
                Some((level, _)) => level.parse::<u8>().wrap_err("parse level")?,
                None => 0,
            };
            HostEvent::Command {
                unit: parse_unit(unit)?,
                command: command.to_owned(),
                level,
            }
        }
        other => return Err(eyre::eyre!("unknown console command: {other}")),
    };
    Ok(Some(event))
}

fn split_word(text: &str) -> Option<(&str, &str)> {
    let text = text.trim_start();
    if text.is_empty() {
        return None;
    }
    match text.split_once(char::is_whitespace) {
        Some((word, rest)) => Some((word, rest.trim())),
        None => Some((text, "")),
    }
}

fn parse_unit(text: &str) -> eyre::Result<u8> {
    let unit = text
        .parse::<u8>()
        .wrap_err_with(|| format!("invalid unit {text:?}"))?;
    if unit == 0 {
        return Err(eyre::eyre!("unit numbers start at 1"));
    }
    Ok(unit)
}
