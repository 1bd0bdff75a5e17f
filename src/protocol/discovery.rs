//! Wi-Fi discovery handshake messages and status codes.
//!
//! Before the UDP data channel opens, the controller sends a JSON request
//! over a short-lived TCP connection telling the drone which port to send
//! to, and the drone answers with a status and the port it listens on.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Well-known mDNS service type announced by the drones.
pub const SERVICE_TYPE: &str = "_arsdk-090b._udp";

/// Handshake request sent by the controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakeRequest {
    /// UDP port the drone sends to.
    pub d2c_port: u16,
    /// Kind of controller.
    pub controller_type: String,
    /// Name of the controller application.
    pub controller_name: String,
}

/// Handshake response sent by the drone.
///
/// Unknown fields (stream ports, QoS settings) are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakeResponse {
    /// Discovery status, 0 on success.
    pub status: i32,
    /// UDP port the drone listens on.
    #[serde(default)]
    pub c2d_port: u16,
}

impl HandshakeResponse {
    /// Parses a response, tolerating the trailing NUL some firmwares append.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let end = data
            .iter()
            .rposition(|&b| b != 0 && !b.is_ascii_whitespace())
            .map_or(0, |i| i + 1);
        Ok(serde_json::from_slice(&data[..end])?)
    }

    /// Returns the peer port, or the rejection error for a non-zero status.
    pub fn into_port(self) -> Result<u16> {
        if self.status == 0 {
            Ok(self.c2d_port)
        } else {
            Err(Error::HandshakeRejected {
                status: self.status,
                name: status_name(self.status),
            })
        }
    }
}

/// Discovery status codes.
///
/// `Ok`, `Error` and the `ErrorConnection*` values are sent by the drone in
/// the handshake response; the others come from the controller-side stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum DiscoveryStatus {
    Ok = 0,
    Error = -1,

    ErrorSimplePoll = -1000,
    ErrorBuildName = -999,
    ErrorClient = -998,
    ErrorCreateConfig = -997,
    ErrorDeleteConfig = -996,
    ErrorEntryGroup = -995,
    ErrorAddService = -994,
    ErrorGroupCommit = -993,
    ErrorBrowserAlloc = -992,
    ErrorBrowserNew = -991,

    ErrorAlloc = -2000,
    ErrorInit = -1999,
    ErrorSocketCreation = -1998,
    ErrorSocketPermissionDenied = -1997,
    ErrorSocketAlreadyConnected = -1996,
    ErrorAccept = -1995,
    ErrorSend = -1994,
    ErrorRead = -1993,
    ErrorSelect = -1992,
    ErrorTimeout = -1991,
    ErrorAbort = -1990,
    ErrorPipeInit = -1989,
    ErrorBadParameter = -1988,
    ErrorBusy = -1987,
    ErrorSocketUnreachable = -1986,
    ErrorOutputLength = -1985,

    ErrorJni = -3000,
    ErrorJniVm = -2999,
    ErrorJniEnv = -2998,
    ErrorJniCallbackListener = -2997,

    ErrorConnection = -4000,
    ErrorConnectionBusy = -3999,
    ErrorConnectionNotReady = -3998,
    ErrorConnectionBadId = -3997,

    ErrorDevice = -5000,
    ErrorDeviceOperationNotSupported = -499,

    ErrorJson = -6000,
    ErrorJsonParsing = -5999,
    ErrorJsonBufferSize = -5998,
}

impl DiscoveryStatus {
    const ALL: [Self; 41] = [
        Self::Ok,
        Self::Error,
        Self::ErrorSimplePoll,
        Self::ErrorBuildName,
        Self::ErrorClient,
        Self::ErrorCreateConfig,
        Self::ErrorDeleteConfig,
        Self::ErrorEntryGroup,
        Self::ErrorAddService,
        Self::ErrorGroupCommit,
        Self::ErrorBrowserAlloc,
        Self::ErrorBrowserNew,
        Self::ErrorAlloc,
        Self::ErrorInit,
        Self::ErrorSocketCreation,
        Self::ErrorSocketPermissionDenied,
        Self::ErrorSocketAlreadyConnected,
        Self::ErrorAccept,
        Self::ErrorSend,
        Self::ErrorRead,
        Self::ErrorSelect,
        Self::ErrorTimeout,
        Self::ErrorAbort,
        Self::ErrorPipeInit,
        Self::ErrorBadParameter,
        Self::ErrorBusy,
        Self::ErrorSocketUnreachable,
        Self::ErrorOutputLength,
        Self::ErrorJni,
        Self::ErrorJniVm,
        Self::ErrorJniEnv,
        Self::ErrorJniCallbackListener,
        Self::ErrorConnection,
        Self::ErrorConnectionBusy,
        Self::ErrorConnectionNotReady,
        Self::ErrorConnectionBadId,
        Self::ErrorDevice,
        Self::ErrorDeviceOperationNotSupported,
        Self::ErrorJson,
        Self::ErrorJsonParsing,
        Self::ErrorJsonBufferSize,
    ];

    /// Looks up a status by its numeric code.
    #[must_use]
    pub fn from_code(code: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|s| *s as i32 == code)
    }

    /// Returns the numeric code.
    #[must_use]
    pub const fn code(&self) -> i32 {
        *self as i32
    }

    /// Returns the status name as used in the vendor SDK.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::Error => "ERROR",
            Self::ErrorSimplePoll => "ERROR_SIMPLE_POLL",
            Self::ErrorBuildName => "ERROR_BUILD_NAME",
            Self::ErrorClient => "ERROR_CLIENT",
            Self::ErrorCreateConfig => "ERROR_CREATE_CONFIG",
            Self::ErrorDeleteConfig => "ERROR_DELETE_CONFIG",
            Self::ErrorEntryGroup => "ERROR_ENTRY_GROUP",
            Self::ErrorAddService => "ERROR_ADD_SERVICE",
            Self::ErrorGroupCommit => "ERROR_GROUP_COMMIT",
            Self::ErrorBrowserAlloc => "ERROR_BROWSER_ALLOC",
            Self::ErrorBrowserNew => "ERROR_BROWSER_NEW",
            Self::ErrorAlloc => "ERROR_ALLOC",
            Self::ErrorInit => "ERROR_INIT",
            Self::ErrorSocketCreation => "ERROR_SOCKET_CREATION",
            Self::ErrorSocketPermissionDenied => "ERROR_SOCKET_PERMISSION_DENIED",
            Self::ErrorSocketAlreadyConnected => "ERROR_SOCKET_ALREADY_CONNECTED",
            Self::ErrorAccept => "ERROR_ACCEPT",
            Self::ErrorSend => "ERROR_SEND",
            Self::ErrorRead => "ERROR_READ",
            Self::ErrorSelect => "ERROR_SELECT",
            Self::ErrorTimeout => "ERROR_TIMEOUT",
            Self::ErrorAbort => "ERROR_ABORT",
            Self::ErrorPipeInit => "ERROR_PIPE_INIT",
            Self::ErrorBadParameter => "ERROR_BAD_PARAMETER",
            Self::ErrorBusy => "ERROR_BUSY",
            Self::ErrorSocketUnreachable => "ERROR_SOCKET_UNREACHABLE",
            Self::ErrorOutputLength => "ERROR_OUTPUT_LENGTH",
            Self::ErrorJni => "ERROR_JNI",
            Self::ErrorJniVm => "ERROR_JNI_VM",
            Self::ErrorJniEnv => "ERROR_JNI_ENV",
            Self::ErrorJniCallbackListener => "ERROR_JNI_CALLBACK_LISTENER",
            Self::ErrorConnection => "ERROR_CONNECTION",
            Self::ErrorConnectionBusy => "ERROR_CONNECTION_BUSY",
            Self::ErrorConnectionNotReady => "ERROR_CONNECTION_NOT_READY",
            Self::ErrorConnectionBadId => "ERROR_CONNECTION_BAD_ID",
            Self::ErrorDevice => "ERROR_DEVICE",
            Self::ErrorDeviceOperationNotSupported => "ERROR_DEVICE_OPERATION_NOT_SUPPORTED",
            Self::ErrorJson => "ERROR_JSON",
            Self::ErrorJsonParsing => "ERROR_JSON_PARSSING",
            Self::ErrorJsonBufferSize => "ERROR_JSON_BUFFER_SIZE",
        }
    }
}

/// Returns the name for a status code, `UNKNOWN(<code>)` if it isn't in the table.
#[must_use]
pub fn status_name(code: i32) -> String {
    DiscoveryStatus::from_code(code)
        .map_or_else(|| format!("UNKNOWN({code})"), |s| s.name().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serialization() {
        let request = HandshakeRequest {
            d2c_port: 43210,
            controller_type: "computer".into(),
            controller_name: "minidrone".into(),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "d2c_port": 43210,
                "controller_type": "computer",
                "controller_name": "minidrone",
            })
        );
    }

    #[test]
    fn test_response_parse_accepted() {
        let data = b"{\"status\": 0, \"c2d_port\": 54321, \"arstream_fragment_size\": 65000}\0";
        let response = HandshakeResponse::parse(data).unwrap();
        assert_eq!(response.into_port().unwrap(), 54321);
    }

    #[test]
    fn test_response_parse_rejected() {
        let response = HandshakeResponse::parse(br#"{"status": -1999, "c2d_port": 0}"#).unwrap();
        match response.into_port() {
            Err(Error::HandshakeRejected { status, name }) => {
                assert_eq!(status, -1999);
                assert_eq!(name, "ERROR_INIT");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_status_names() {
        assert_eq!(status_name(-3999), "ERROR_CONNECTION_BUSY");
        assert_eq!(status_name(-3998), "ERROR_CONNECTION_NOT_READY");
        assert_eq!(status_name(-1988), "ERROR_BAD_PARAMETER");
        assert_eq!(status_name(-1991), "ERROR_TIMEOUT");
        assert_eq!(status_name(42), "UNKNOWN(42)");
        assert_eq!(DiscoveryStatus::ErrorInit.code(), -1999);
    }

    #[test]
    fn test_response_parse_garbage() {
        assert!(matches!(
            HandshakeResponse::parse(b"not json"),
            Err(Error::Json(_))
        ));
    }
}
