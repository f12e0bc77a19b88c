use std::{fmt, str::FromStr};

use thiserror::Error;

use crate::types::{FanLevel, PowerState};

pub const ROUTE_REPORT: &str = "/extpost/{temp}/{msg_id}";
pub const ROUTE_FETCH: &str = "/extget/{msg_id}";
pub const ROUTE_ACK: &str = "/getack/{msg_id}";

/// Body returned by the panel for accepted reports and acks.
pub const ACK_REPLY: &str = "Posted.";

const FRAME_SEPARATOR: char = '#';

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("command frame must have 4 segments, got {0}")]
    SegmentCount(usize),
    #[error("invalid pending flag {0:?}")]
    InvalidPending(String),
    #[error("invalid power state {0:?}")]
    InvalidPower(String),
    #[error("invalid target temperature {0:?}")]
    InvalidTarget(String),
    #[error("invalid fan level {0:?}")]
    InvalidFanLevel(String),
}

/// The `pending#power#target#fan` string served to the device on fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandFrame {
    pub pending: bool,
    pub power: PowerState,
    pub target: i32,
    pub fan: FanLevel,
}

impl fmt::Display for CommandFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{sep}{}{sep}{}{sep}{}",
            u8::from(self.pending),
            self.power,
            self.target,
            self.fan,
            sep = FRAME_SEPARATOR
        )
    }
}

impl FromStr for CommandFrame {
    type Err = ProtocolError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = raw.trim().split(FRAME_SEPARATOR).collect();
        let [pending, power, target, fan] = parts.as_slice() else {
            return Err(ProtocolError::SegmentCount(parts.len()));
        };

        let pending = match *pending {
            "1" => true,
            "0" => false,
            other => return Err(ProtocolError::InvalidPending(other.to_string())),
        };
        let target = target
            .parse::<i32>()
            .map_err(|_| ProtocolError::InvalidTarget(target.to_string()))?;

        Ok(Self {
            pending,
            power: power.parse()?,
            target,
            fan: fan.parse()?,
        })
    }
}

pub fn report_path(temp: f64, msg_id: u64) -> String {
    format!("/extpost/{temp:.1}/{msg_id}")
}

pub fn fetch_path(msg_id: u64) -> String {
    format!("/extget/{msg_id}")
}

pub fn ack_path(msg_id: u64) -> String {
    format!("/getack/{msg_id}")
}
