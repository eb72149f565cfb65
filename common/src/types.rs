use std::fmt;

use chrono::{Datelike, Timelike};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LightPower {
    #[default]
    Off,
    On,
}

impl LightPower {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Off => "OFF",
            Self::On => "ON",
        }
    }

    pub fn is_on(self) -> bool {
        self == Self::On
    }

    /// Command payloads are strict: only the exact text `ON` switches a light
    /// on, anything else (including `on` or garbage) means off.
    pub fn from_command_payload(payload: &str) -> Self {
        if payload == "ON" {
            Self::On
        } else {
            Self::Off
        }
    }
}

impl From<bool> for LightPower {
    fn from(on: bool) -> Self {
        if on {
            Self::On
        } else {
            Self::Off
        }
    }
}

impl fmt::Display for LightPower {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provenance of a state change, rendered into the log topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeSource {
    UserCommand,
    Timer,
}

impl ChangeSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::UserCommand => "user command",
            Self::Timer => "timer",
        }
    }
}

impl fmt::Display for ChangeSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Any clock reading older than this has not been set from the network.
pub const EARLIEST_SYNCED_YEAR: i32 = 2024;

/// Wall-clock hour and minute as observed once per control loop iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockTick {
    pub hour: u8,
    pub minute: u8,
}

impl ClockTick {
    pub fn new(hour: u8, minute: u8) -> Self {
        Self { hour, minute }
    }

    pub fn from_time<T: Timelike>(time: &T) -> Self {
        Self {
            hour: time.hour() as u8,
            minute: time.minute() as u8,
        }
    }

    /// Reads a wall clock that may not have been synchronised yet. An RTC
    /// still counting from its power-on epoch reports a year before
    /// [`EARLIEST_SYNCED_YEAR`] and yields `None`.
    pub fn from_wall_clock<T: Datelike + Timelike>(now: &T) -> Option<Self> {
        (now.year() >= EARLIEST_SYNCED_YEAR).then(|| Self::from_time(now))
    }

    pub fn minutes_since_midnight(self) -> u16 {
        self.hour as u16 * 60 + self.minute as u16
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    Online,
    Offline,
}

impl Availability {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Offline => "offline",
        }
    }
}
