//! Buffer classes, data types and logical channel ids.
//!
//! Every frame starts with a data type byte telling the receiver whether it
//! is an acknowledgment or data, and whether that data must be acknowledged.
//! Commands declare a buffer class in their definition, which selects both
//! the data type and the logical channel (buffer id) the frame travels on.

use std::fmt;
use std::str::FromStr;

/// Data type flag carried in the first byte of every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DataType {
    /// Acknowledgment of previously received data.
    Ack = 0x01,
    /// Normal data, no ack requested.
    Data = 0x02,
    /// Treated as normal data on the network, given higher priority internally.
    LowLatencyData = 0x03,
    /// Data requesting an ack. The receiver must ack it.
    DataWithAck = 0x04,
}

impl DataType {
    /// Attempts to parse a data type from a byte.
    #[must_use]
    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(Self::Ack),
            0x02 => Some(Self::Data),
            0x03 => Some(Self::LowLatencyData),
            0x04 => Some(Self::DataWithAck),
            _ => None,
        }
    }

    /// Returns true if the receiver of this frame must send an ack back.
    #[must_use]
    pub const fn requires_ack(&self) -> bool {
        matches!(self, Self::DataWithAck)
    }
}

impl From<DataType> for u8 {
    fn from(ty: DataType) -> Self {
        ty as Self
    }
}

/// Reliability/priority category declared by a command definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BufferClass {
    /// Acknowledgment.
    Ack,
    /// Normal data.
    Data,
    /// Same as `Data`.
    NonAck,
    /// Emergency commands.
    HighPrio,
    /// Low latency data (piloting).
    LowLatencyData,
    /// Data that must be acknowledged.
    #[default]
    DataWithAck,
}

impl BufferClass {
    /// Returns the data type flag written in the frame.
    #[must_use]
    pub const fn data_type(&self) -> DataType {
        match self {
            Self::Ack => DataType::Ack,
            Self::Data | Self::NonAck | Self::HighPrio => DataType::Data,
            Self::LowLatencyData => DataType::LowLatencyData,
            Self::DataWithAck => DataType::DataWithAck,
        }
    }

    /// Returns the logical channel commands of this class are sent on.
    #[must_use]
    pub const fn buffer_id(&self) -> u8 {
        match self {
            Self::Ack => buffer_id::ACK_COMMAND,
            Self::Data | Self::NonAck | Self::LowLatencyData => buffer_id::SEND_NO_ACK,
            Self::HighPrio => buffer_id::SEND_HIGH_PRIORITY,
            Self::DataWithAck => buffer_id::SEND_WITH_ACK,
        }
    }

    /// Returns true if sending a command of this class waits for an ack.
    #[must_use]
    pub const fn requires_ack(&self) -> bool {
        self.data_type().requires_ack()
    }

    /// Returns the definition attribute spelling.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Ack => "ACK",
            Self::Data => "DATA",
            Self::NonAck => "NON_ACK",
            Self::HighPrio => "HIGH_PRIO",
            Self::LowLatencyData => "LOW_LATENCY_DATA",
            Self::DataWithAck => "DATA_WITH_ACK",
        }
    }
}

impl fmt::Display for BufferClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BufferClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ACK" => Ok(Self::Ack),
            "DATA" => Ok(Self::Data),
            "NON_ACK" => Ok(Self::NonAck),
            "HIGH_PRIO" => Ok(Self::HighPrio),
            "LOW_LATENCY_DATA" => Ok(Self::LowLatencyData),
            "DATA_WITH_ACK" => Ok(Self::DataWithAck),
            other => Err(format!("unknown buffer class {other}")),
        }
    }
}

/// Action to take when a command times out, as declared by its definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TimeoutPolicy {
    /// Drop the command.
    #[default]
    Pop,
    /// Send it again.
    Retry,
    /// Flush the whole buffer.
    Flush,
}

impl FromStr for TimeoutPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "POP" => Ok(Self::Pop),
            "RETRY" => Ok(Self::Retry),
            "FLUSH" => Ok(Self::Flush),
            other => Err(format!("unknown timeout policy {other}")),
        }
    }
}

/// Well-known logical channel ids.
///
/// On BLE the send ids double as characteristic suffixes (`0x0b` → `fa0b`).
pub mod buffer_id {
    /// Pings from the device.
    pub const PING: u8 = 0;
    /// Answers to pings.
    pub const PONG: u8 = 1;
    /// Commands without ack.
    pub const SEND_NO_ACK: u8 = 0x0a;
    /// Commands with ack.
    pub const SEND_WITH_ACK: u8 = 0x0b;
    /// Emergency commands.
    pub const SEND_HIGH_PRIORITY: u8 = 0x0c;
    /// Acks for data the drone sent on its ack-required channel (BLE).
    pub const ACK_COMMAND: u8 = 0x1e;
    /// Drone data without ack (Wi-Fi).
    pub const NO_ACK_DRONE_DATA: u8 = 126;
    /// Drone data that needs an ack (Wi-Fi).
    pub const ACK_DRONE_DATA: u8 = 127;
    /// Offset added to a buffer id to form its ack channel (Wi-Fi).
    pub const ACK_OFFSET: u8 = 128;
}
