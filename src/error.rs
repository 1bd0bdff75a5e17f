//! Error types for the minidrone library.

use std::fmt;

use thiserror::Error;

/// Level of the command namespace an identifier failed to resolve at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    /// A project (e.g. `minidrone`, `common`).
    Project,
    /// A class within a project.
    Class,
    /// A command within a class.
    Command,
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Project => f.write_str("project"),
            Self::Class => f.write_str("class"),
            Self::Command => f.write_str("command"),
        }
    }
}

/// A name or numeric id used to look up a catalog element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identifier {
    /// Lookup by name.
    Name(String),
    /// Lookup by numeric id.
    Id(u16),
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(name) => write!(f, "called \"{name}\""),
            Self::Id(id) => write!(f, "with the value 0x{id:02x}"),
        }
    }
}

/// Renders the resolved ancestors of a failed lookup, e.g. ` (minidrone, Piloting)`.
fn fmt_context(context: &[String]) -> String {
    if context.is_empty() {
        String::new()
    } else {
        format!(" ({})", context.join(", "))
    }
}

/// The main error type for minidrone operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Catalog lookup miss.
    #[error("can't find {kind} {identifier}{}", fmt_context(.context))]
    UnknownElement {
        kind: ElementKind,
        identifier: Identifier,
        context: Vec<String>,
    },

    /// A value could not be coerced into an argument's declared type.
    #[error("invalid value for argument {name}: {reason}")]
    InvalidArgumentValue { name: String, reason: String },

    /// A definition declares an argument type the codec does not know.
    #[error("unsupported data type \"{type_name}\" for argument \"{argument}\" in {token}")]
    UnsupportedType {
        type_name: String,
        argument: String,
        token: String,
    },

    /// A definition lacks an id or declares one the wire format can't carry.
    #[error("invalid definition for {token}: {reason}")]
    InvalidDefinition { token: String, reason: String },

    /// Frame encoding/decoding error.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// No acknowledgment arrived before the deadline.
    #[error("command {token} (buffer {buffer_id}, packet {packet_id}) timed out after {timeout_ms}ms")]
    CommandTimeout {
        token: String,
        buffer_id: u8,
        packet_id: u8,
        timeout_ms: u64,
    },

    /// The drone refused the Wi-Fi handshake.
    #[error("handshake rejected by drone: {name} ({status})")]
    HandshakeRejected { status: i32, name: String },

    /// A send reused a `(buffer, packet)` key that is still awaiting its ack.
    #[error("packet {packet_id} on buffer {buffer_id} is already awaiting an ack")]
    DuplicatePendingAck { buffer_id: u8, packet_id: u8 },

    /// The peripheral does not expose a required characteristic.
    #[error("characteristic {0} not found")]
    MissingCharacteristic(String),

    /// No drone was found before the discovery deadline.
    #[error("no drone found after {timeout_ms}ms")]
    DiscoveryTimeout { timeout_ms: u64 },

    /// The link went down while the operation was in flight.
    #[error("link lost: {reason}")]
    LinkLost { reason: String },

    /// Error reported by the BLE radio stack.
    #[error("radio error: {message}")]
    Radio { message: String },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding/decoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Connection is not established.
    #[error("not connected")]
    NotConnected,

    /// Channel receive error.
    #[error("channel closed")]
    ChannelClosed,
}

/// Frame-specific errors.
#[derive(Debug, Error)]
pub enum FrameError {
    /// Frame too short to contain its header.
    #[error("frame too short: need at least {need} bytes, got {got}")]
    TooShort { need: usize, got: usize },

    /// Declared frame length is smaller than the header itself.
    #[error("invalid frame length {0}")]
    InvalidLength(usize),

    /// Frame exceeds maximum size.
    #[error("frame too large: {size} bytes exceeds maximum {max}")]
    TooLarge { size: usize, max: usize },

    /// Incomplete argument data.
    #[error("incomplete {field}: expected {expected} bytes, got {got}")]
    Incomplete {
        field: String,
        expected: usize,
        got: usize,
    },

    /// The leading type byte is not a known data type.
    #[error("unknown data type 0x{0:02x}")]
    UnknownDataType(u8),
}

/// Result type alias for minidrone operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_element_message() {
        let err = Error::UnknownElement {
            kind: ElementKind::Command,
            identifier: Identifier::Name("Barrel".into()),
            context: vec!["minidrone".into(), "Animations".into()],
        };
        assert_eq!(
            err.to_string(),
            "can't find command called \"Barrel\" (minidrone, Animations)"
        );

        let err = Error::UnknownElement {
            kind: ElementKind::Project,
            identifier: Identifier::Id(0x0f),
            context: Vec::new(),
        };
        assert_eq!(err.to_string(), "can't find project with the value 0x0f");
    }

    #[test]
    fn test_handshake_rejected_names_status() {
        let err = Error::HandshakeRejected {
            status: -1999,
            name: "ERROR_INIT".into(),
        };
        assert!(err.to_string().contains("ERROR_INIT"));
    }
}
