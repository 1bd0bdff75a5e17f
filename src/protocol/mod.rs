//! Protocol definitions for drone communication.
//!
//! This module contains the low-level protocol types including:
//! - Argument type codec
//! - Buffer classes, data types and channel ids
//! - Wi-Fi frame encoding/decoding
//! - Wi-Fi discovery handshake messages

pub mod buffer;
pub mod codec;
pub mod discovery;
pub mod frame;

pub use buffer::{BufferClass, DataType, TimeoutPolicy, buffer_id};
pub use codec::{ArgType, ArgValue, EnumSpec, Value};
pub use discovery::{DiscoveryStatus, HandshakeRequest, HandshakeResponse, SERVICE_TYPE};
pub use frame::{FrameDecoder, HEADER_SIZE, MAX_FRAME_SIZE, WifiFrame, encode as encode_frame};
