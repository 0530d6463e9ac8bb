//! Command table for the microcontroller link
//!
//! Inbound: a validated payload's first byte selects the command. Only the
//! sensor report (`0x10`) is understood; anything else is ignored.
//!
//! Outbound: two boolean outputs, each switched on or off by a four byte
//! payload `00 00 00 <code>` sent with the [`FrameShape::mcu`] shape.

use super::frame::FrameShape;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Command code of a sensor report
pub const CMD_SENSOR_REPORT: u8 = 0x10;

/// ADC reference voltage
pub const ADC_REFERENCE_VOLTS: f64 = 3.3;

/// Full-scale ADC count (12-bit)
pub const ADC_FULL_SCALE: f64 = 4095.0;

/// Sensor report decoded from a payload
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SensorReading {
    /// Raw ADC count
    pub raw: u16,
    /// Raw count scaled to volts
    pub volts: f64,
}

impl SensorReading {
    /// Scale a raw ADC count
    pub fn from_raw(raw: u16) -> Self {
        Self {
            raw,
            volts: f64::from(raw) * ADC_REFERENCE_VOLTS / ADC_FULL_SCALE,
        }
    }
}

impl fmt::Display for SensorReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3} V  (ADC={})", self.volts, self.raw)
    }
}

/// Domain event carried by a validated payload
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DeviceEvent {
    /// Periodic sensor report
    Reading(SensorReading),
}

/// Map a validated payload to a domain event
pub fn dispatch(payload: &[u8]) -> Option<DeviceEvent> {
    match *payload {
        [CMD_SENSOR_REPORT, _, hi, lo, ..] => Some(DeviceEvent::Reading(SensorReading::from_raw(
            u16::from_be_bytes([hi, lo]),
        ))),
        [cmd, ..] => {
            tracing::trace!(cmd = format_args!("{cmd:02X}"), "ignoring unhandled command");
            None
        }
        [] => None,
    }
}

/// One of the two switchable outputs on the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Output {
    /// First LED
    Led0,
    /// Second LED
    Led1,
}

impl Output {
    /// Display name
    pub fn name(&self) -> &'static str {
        match self {
            Output::Led0 => "LED0",
            Output::Led1 => "LED1",
        }
    }
}

impl fmt::Display for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for Output {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "led0" | "0" => Ok(Self::Led0),
            "led1" | "1" => Ok(Self::Led1),
            other => Err(format!("unknown output: {other}")),
        }
    }
}

/// Switch command for one output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputCommand {
    /// Target output
    pub output: Output,
    /// Requested state
    pub on: bool,
}

impl OutputCommand {
    /// Build a command
    pub fn new(output: Output, on: bool) -> Self {
        Self { output, on }
    }

    /// Wire code: 0x00/0x01 for LED0 on/off, 0x02/0x03 for LED1 on/off
    pub fn code(&self) -> u8 {
        let base = match self.output {
            Output::Led0 => 0x00,
            Output::Led1 => 0x02,
        };
        if self.on {
            base
        } else {
            base + 1
        }
    }

    /// Command payload
    pub fn payload(&self) -> [u8; 4] {
        [0x00, 0x00, 0x00, self.code()]
    }

    /// Complete wire frame
    pub fn to_frame(&self) -> Vec<u8> {
        FrameShape::mcu().pack(&self.payload())
    }
}

/// Last commanded state of both outputs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OutputStates {
    /// LED0 on
    pub led0: bool,
    /// LED1 on
    pub led1: bool,
}

impl OutputStates {
    /// Current state of `output`
    pub fn get(&self, output: Output) -> bool {
        match output {
            Output::Led0 => self.led0,
            Output::Led1 => self.led1,
        }
    }

    /// Record a new state for `output`
    pub fn set(&mut self, output: Output, on: bool) {
        match output {
            Output::Led0 => self.led0 = on,
            Output::Led1 => self.led1 = on,
        }
    }

    /// Command that flips `output`
    pub fn toggle_command(&self, output: Output) -> OutputCommand {
        OutputCommand::new(output, !self.get(output))
    }
}
