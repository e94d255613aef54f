// Wire format: a 2 hex char opcode (settings use FF plus a sub-opcode)
// followed by fixed width fields. No length prefix, delimiter or checksum.

use std::fmt;
use std::str::FromStr;

use crate::error::CommandError;
use crate::icon::{parse_hex_byte, IconPayload, ICON_PAYLOAD_HEX_LEN};

pub const OP_TEST: &str = "00";
pub const OP_DISPLAY_ICON: &str = "01";
pub const OP_SCROLL_TEXT: &str = "02";
pub const OP_SCROLL_SETTINGS: &str = "03";
pub const OP_SETTING: &str = "FF";
pub const OP_SET_BRIGHTNESS: &str = "FF00";
pub const OP_SET_ROTATION: &str = "FF01";
pub const OP_SET_BLINK_RATE: &str = "FF02";

const ICON_TERMINATOR: u8 = 0x00;

pub const DEFAULT_SCROLL_SPEED: u8 = 25;
pub const DEFAULT_SCROLL_REPEAT: u8 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TestPattern {
    FaceSmiley,
    FaceNeutral,
    FaceFrown,
    // Every LED at full brightness, for current draw measurements.
    AllFullBrightness,
    // Single LED in the lower right corner, brightness 5, blink rate 3.
    Standby,
    // Rain icon at the default brightness and blink rate.
    Weather,
    LetterA,
}

impl TestPattern {
    pub const ALL: [TestPattern; 7] = [
        Self::FaceSmiley,
        Self::FaceNeutral,
        Self::FaceFrown,
        Self::AllFullBrightness,
        Self::Standby,
        Self::Weather,
        Self::LetterA,
    ];

    pub fn code(self) -> u8 {
        match self {
            Self::FaceSmiley => 0x00,
            Self::FaceNeutral => 0x01,
            Self::FaceFrown => 0x02,
            Self::AllFullBrightness => 0xFE,
            Self::Standby => 0xFF,
            Self::Weather => 0xFD,
            Self::LetterA => 0xFC,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.code() == code)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Brightness(u8);

impl Brightness {
    pub const MAX: u8 = 15;

    pub fn new(value: i32) -> Option<Self> {
        (0..=Self::MAX as i32).contains(&value).then_some(Self(value as u8))
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rotation(u8);

impl Rotation {
    pub const MAX: u8 = 3;

    pub fn new(value: i32) -> Option<Self> {
        (0..=Self::MAX as i32).contains(&value).then_some(Self(value as u8))
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlinkRate {
    AlwaysOn,
    TwoHz,
    OneHz,
    HalfHz,
}

impl BlinkRate {
    pub fn new(value: i32) -> Option<Self> {
        match value {
            0 => Some(Self::AlwaysOn),
            1 => Some(Self::TwoHz),
            2 => Some(Self::OneHz),
            3 => Some(Self::HalfHz),
            _ => None,
        }
    }

    pub fn value(self) -> u8 {
        match self {
            Self::AlwaysOn => 0,
            Self::TwoHz => 1,
            Self::OneHz => 2,
            Self::HalfHz => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScrollSettings {
    pub speed: u8,
    pub repeat: u8,
}

impl ScrollSettings {
    pub fn new(speed: u32, repeat: u32) -> Result<Self, CommandError> {
        Ok(Self { speed: byte_field("speed", speed)?, repeat: byte_field("repeat", repeat)? })
    }
}

impl Default for ScrollSettings {
    fn default() -> Self {
        Self { speed: DEFAULT_SCROLL_SPEED, repeat: DEFAULT_SCROLL_REPEAT }
    }
}

fn byte_field(field: &'static str, value: u32) -> Result<u8, CommandError> {
    u8::try_from(value).map_err(|_| CommandError::OutOfRange {
        field,
        value: value as i64,
        min: 0,
        max: u8::MAX as i64,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Test(TestPattern),
    DisplayIcon(IconPayload),
    ScrollText(String),
    ScrollSettings(ScrollSettings),
    SetBrightness(Brightness),
    SetRotation(Rotation),
    SetBlinkRate(BlinkRate),
}

impl Command {
    pub fn opcode(&self) -> &'static str {
        match self {
            Self::Test(_) => OP_TEST,
            Self::DisplayIcon(_) => OP_DISPLAY_ICON,
            Self::ScrollText(_) => OP_SCROLL_TEXT,
            Self::ScrollSettings(_) => OP_SCROLL_SETTINGS,
            Self::SetBrightness(_) => OP_SET_BRIGHTNESS,
            Self::SetRotation(_) => OP_SET_ROTATION,
            Self::SetBlinkRate(_) => OP_SET_BLINK_RATE,
        }
    }

    pub fn encode(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.opcode())?;
        match self {
            Self::Test(pattern) => write!(f, "{:02X}", pattern.code()),
            Self::DisplayIcon(payload) => write!(f, "{}{:02X}", payload, ICON_TERMINATOR),
            Self::ScrollText(text) => f.write_str(text),
            Self::ScrollSettings(s) => write!(f, "{:02X}{:02X}", s.speed, s.repeat),
            Self::SetBrightness(b) => write!(f, "{:02X}", b.value()),
            Self::SetRotation(r) => write!(f, "{:02X}", r.value()),
            Self::SetBlinkRate(b) => write!(f, "{:02X}", b.value()),
        }
    }
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let opcode: String = s.chars().take(2).collect::<String>().to_ascii_uppercase();
        let len = s.chars().count();
        let expect_len = |expected: usize| {
            if len == expected {
                Ok(())
            } else {
                Err(CommandError::Length { command: s.to_string(), expected })
            }
        };

        match opcode.as_str() {
            OP_TEST => {
                expect_len(4)?;
                let code = parse_hex_byte(s, 2)?;
                TestPattern::from_code(code)
                    .map(Self::Test)
                    .ok_or_else(|| CommandError::UnknownOpcode(s.to_string()))
            }
            OP_DISPLAY_ICON => {
                expect_len(2 + ICON_PAYLOAD_HEX_LEN + 2)?;
                let hex: String = s.chars().skip(2).take(ICON_PAYLOAD_HEX_LEN).collect();
                let payload = IconPayload::from_hex(&hex).map_err(|e| shift_position(e, 2))?;
                let terminator = parse_hex_byte(s, 2 + ICON_PAYLOAD_HEX_LEN)?;
                if terminator != ICON_TERMINATOR {
                    return Err(CommandError::OutOfRange {
                        field: "terminator",
                        value: terminator as i64,
                        min: 0,
                        max: 0,
                    });
                }
                Ok(Self::DisplayIcon(payload))
            }
            OP_SCROLL_TEXT => Ok(Self::ScrollText(s.chars().skip(2).collect())),
            OP_SCROLL_SETTINGS => {
                expect_len(6)?;
                Ok(Self::ScrollSettings(ScrollSettings {
                    speed: parse_hex_byte(s, 2)?,
                    repeat: parse_hex_byte(s, 4)?,
                }))
            }
            OP_SETTING => {
                expect_len(6)?;
                let sub = parse_hex_byte(s, 2)?;
                let value = parse_hex_byte(s, 4)? as i32;
                let out_of_range = |field: &'static str, max: u8| CommandError::OutOfRange {
                    field,
                    value: value as i64,
                    min: 0,
                    max: max as i64,
                };
                match sub {
                    0x00 => Brightness::new(value)
                        .map(Self::SetBrightness)
                        .ok_or_else(|| out_of_range("brightness", Brightness::MAX)),
                    0x01 => Rotation::new(value)
                        .map(Self::SetRotation)
                        .ok_or_else(|| out_of_range("rotation", Rotation::MAX)),
                    0x02 => BlinkRate::new(value)
                        .map(Self::SetBlinkRate)
                        .ok_or_else(|| out_of_range("blink rate", 3)),
                    _ => Err(CommandError::UnknownOpcode(s.chars().take(4).collect())),
                }
            }
            _ => Err(CommandError::UnknownOpcode(opcode)),
        }
    }
}

fn shift_position(err: CommandError, by: usize) -> CommandError {
    match err {
        CommandError::InvalidHex { found, position } => CommandError::InvalidHex { found, position: position + by },
        other => other,
    }
}

// ----- Wire encoders, one per opcode -----

pub fn encode_test(pattern: TestPattern) -> String {
    Command::Test(pattern).encode()
}

/// `01` + payload + `00`. The payload must be exactly 16 hex characters;
/// lower-case digits are accepted and sent upper-case.
pub fn encode_display_icon(payload: &str) -> Result<String, CommandError> {
    Ok(Command::DisplayIcon(IconPayload::from_hex(payload)?).encode())
}

// The device truncates long messages on its side; nothing is enforced here.
pub fn encode_scroll_text(message: &str) -> String {
    Command::ScrollText(message.to_string()).encode()
}

pub fn encode_scroll_settings(speed: u32, repeat: u32) -> Result<String, CommandError> {
    Ok(Command::ScrollSettings(ScrollSettings::new(speed, repeat)?).encode())
}

pub fn encode_brightness(brightness: i32) -> Option<String> {
    Brightness::new(brightness).map(|b| Command::SetBrightness(b).encode())
}

pub fn encode_rotation(rotation: i32) -> Option<String> {
    Rotation::new(rotation).map(|r| Command::SetRotation(r).encode())
}

pub fn encode_blink_rate(blink: i32) -> Option<String> {
    BlinkRate::new(blink).map(|b| Command::SetBlinkRate(b).encode())
}
