// OpenWeatherMap icon codes are a two digit category plus a d/n qualifier.

use std::fmt;
use std::str::FromStr;

use crate::error::{CommandError, IconError};

pub const ICON_PAYLOAD_HEX_LEN: usize = 16;

const SUNNY: [u8; 8] = [0x08, 0x22, 0x1C, 0x55, 0x1C, 0x22, 0x08, 0x00];
const CLOUDY: [u8; 8] = [0x00, 0x18, 0x26, 0x43, 0x99, 0x66, 0x00, 0x00];
const RAINY: [u8; 8] = [0x08, 0x14, 0x22, 0x55, 0x08, 0x08, 0x28, 0x10];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IconPayload([u8; 8]);

impl IconPayload {
    pub const fn new(rows: [u8; 8]) -> Self {
        Self(rows)
    }

    pub fn rows(&self) -> [u8; 8] {
        self.0
    }

    // Parse the 16 hex character form used on the wire. Either case is accepted.
    pub fn from_hex(hex: &str) -> Result<Self, CommandError> {
        let len = hex.chars().count();
        if len != ICON_PAYLOAD_HEX_LEN {
            return Err(CommandError::PayloadLength { expected: ICON_PAYLOAD_HEX_LEN, actual: len });
        }
        let mut rows = [0u8; 8];
        for (i, row) in rows.iter_mut().enumerate() {
            *row = parse_hex_byte(hex, i * 2)?;
        }
        Ok(Self(rows))
    }
}

impl fmt::Display for IconPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in self.0 {
            write!(f, "{:02X}", row)?;
        }
        Ok(())
    }
}

impl FromStr for IconPayload {
    type Err = CommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

// Parse the two hex digits starting at character `position`. The caller has
// already checked that both characters exist.
pub(crate) fn parse_hex_byte(s: &str, position: usize) -> Result<u8, CommandError> {
    let mut value = 0u8;
    for (offset, c) in s.chars().skip(position).take(2).enumerate() {
        let digit = c
            .to_digit(16)
            .ok_or(CommandError::InvalidHex { found: c, position: position + offset })?;
        value = (value << 4) | digit as u8;
    }
    Ok(value)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IconCategory {
    Sunny,
    Cloudy,
    Rainy,
}

impl IconCategory {
    pub fn from_icon_code(icon: &str) -> Result<Self, IconError> {
        let len = icon.chars().count();
        if len != 3 {
            return Err(IconError::InvalidLength { code: icon.to_string(), len });
        }
        let category: String = icon.chars().take(2).collect();
        match category.as_str() {
            "01" | "02" => Ok(Self::Sunny),
            "03" | "04" => Ok(Self::Cloudy),
            // rain, thunderstorm, snow and mist all share the rain picture
            "09" | "10" | "11" | "13" | "50" => Ok(Self::Rainy),
            _ => Err(IconError::UnknownCategory { code: icon.to_string(), category }),
        }
    }

    pub fn payload(self) -> IconPayload {
        match self {
            Self::Sunny => IconPayload(SUNNY),
            Self::Cloudy => IconPayload(CLOUDY),
            Self::Rainy => IconPayload(RAINY),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sunny => "sunny",
            Self::Cloudy => "cloudy",
            Self::Rainy => "rainy",
        }
    }
}

impl fmt::Display for IconCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IconCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sunny" | "clear" => Ok(Self::Sunny),
            "cloudy" => Ok(Self::Cloudy),
            "rainy" | "rain" => Ok(Self::Rainy),
            other => Err(format!("unknown icon category '{}'", other)),
        }
    }
}

pub fn map_icon_to_payload(icon: &str) -> Result<IconPayload, IconError> {
    IconCategory::from_icon_code(icon).map(IconCategory::payload)
}
