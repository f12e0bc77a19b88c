use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::protocol::ProtocolError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PowerState {
    On,
    #[default]
    Off,
}

impl PowerState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::On => "ON",
            Self::Off => "OFF",
        }
    }

    pub fn is_on(self) -> bool {
        self == Self::On
    }
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PowerState {
    type Err = ProtocolError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "ON" => Ok(Self::On),
            "OFF" => Ok(Self::Off),
            other => Err(ProtocolError::InvalidPower(other.to_string())),
        }
    }
}

/// Fan speed as understood by the AC remote. The wire value is the digit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum FanLevel {
    Low,
    Medium,
    High,
    #[default]
    Auto,
}

impl FanLevel {
    pub const ALL: [FanLevel; 4] = [Self::Low, Self::Medium, Self::High, Self::Auto];

    pub fn index(self) -> u8 {
        match self {
            Self::Low => 0,
            Self::Medium => 1,
            Self::High => 2,
            Self::Auto => 3,
        }
    }

    pub fn from_index(index: u8) -> Option<Self> {
        match index {
            0 => Some(Self::Low),
            1 => Some(Self::Medium),
            2 => Some(Self::High),
            3 => Some(Self::Auto),
            _ => None,
        }
    }

    /// Next level in the remote's fan button cycle.
    pub fn next(self) -> Self {
        match self {
            Self::Low => Self::Medium,
            Self::Medium => Self::High,
            Self::High => Self::Auto,
            Self::Auto => Self::Low,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
            Self::Auto => "Auto",
        }
    }
}

impl fmt::Display for FanLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.index())
    }
}

impl FromStr for FanLevel {
    type Err = ProtocolError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        value
            .trim()
            .parse::<u8>()
            .ok()
            .and_then(Self::from_index)
            .ok_or_else(|| ProtocolError::InvalidFanLevel(value.to_string()))
    }
}

impl TryFrom<u8> for FanLevel {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::from_index(value).ok_or_else(|| ProtocolError::InvalidFanLevel(value.to_string()))
    }
}

impl From<FanLevel> for u8 {
    fn from(level: FanLevel) -> Self {
        level.index()
    }
}
