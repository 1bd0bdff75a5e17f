//! Transport layer for drone communication.
//!
//! A transport moves frames between the [`Drone`](crate::Drone) and the
//! device. Two implementations exist: [`ble::BleTransport`] over GATT
//! characteristics and [`wifi::WifiTransport`] over UDP after a TCP
//! handshake. Both deliver received frames, already normalised, through the
//! event channel given to [`Transport::connect`].

pub mod ble;
pub mod wifi;

use bytes::{BufMut, Bytes, BytesMut};
use futures::future::BoxFuture;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::protocol::{DataType, buffer_id};

/// A frame received from the drone.
///
/// `buffer_id` is normalised: acks carry the id of the channel being
/// acknowledged, not the channel they arrived on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundFrame {
    /// Data type flag.
    pub data_type: DataType,
    /// Logical channel.
    pub buffer_id: u8,
    /// Sender's sequence number.
    pub sequence: u8,
    /// `[projectId][classId][commandId LE][args]` for data, the acknowledged
    /// sequence number for acks, raw bytes for pings.
    pub payload: Bytes,
}

impl InboundFrame {
    /// Returns the sequence number acknowledged by an ack frame.
    #[must_use]
    pub fn acked_sequence(&self) -> Option<u8> {
        if self.data_type == DataType::Ack {
            self.payload.first().copied()
        } else {
            None
        }
    }
}

/// A frame to be sent to the drone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundFrame {
    /// Data type flag.
    pub data_type: DataType,
    /// Channel to send on.
    pub buffer_id: u8,
    /// Sequence number drawn for `buffer_id`.
    pub sequence: u8,
    /// Frame body after the `[flag][seq]` prefix.
    pub payload: Bytes,
}

impl OutboundFrame {
    /// Creates an ack for `acked` sent on `buffer_id`.
    #[must_use]
    pub fn ack(buffer_id: u8, sequence: u8, acked: u8) -> Self {
        Self {
            data_type: DataType::Ack,
            buffer_id,
            sequence,
            payload: Bytes::copy_from_slice(&[acked]),
        }
    }

    /// Returns true if this frame carries an encoded command.
    #[must_use]
    pub fn is_command(&self) -> bool {
        self.data_type != DataType::Ack && self.buffer_id != buffer_id::PONG
    }

    /// Returns `[flag][seq][payload]`, the command encoding with the
    /// sequence stamped in.
    #[must_use]
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(2 + self.payload.len());
        buf.put_u8(self.data_type.into());
        buf.put_u8(self.sequence);
        buf.put_slice(&self.payload);
        buf.freeze()
    }
}

/// Notification from a transport's reader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A frame was received.
    Frame(InboundFrame),
    /// The link went down.
    Closed { reason: String },
}

/// Trait for transport implementations.
pub trait Transport: Send + Sync {
    /// Connects to the device. Received frames are sent to `events`.
    fn connect(&mut self, events: mpsc::Sender<TransportEvent>) -> BoxFuture<'_, Result<()>>;

    /// Disconnects from the device, releasing all resources.
    fn disconnect(&mut self) -> BoxFuture<'_, Result<()>>;

    /// Sends a frame to the device.
    fn send(&mut self, frame: OutboundFrame) -> BoxFuture<'_, Result<()>>;

    /// Returns true if connected.
    fn is_connected(&self) -> bool;

    /// Returns the channel used to acknowledge data received on `buffer_id`.
    fn ack_buffer_id(&self, buffer_id: u8) -> u8 {
        buffer_id.wrapping_add(buffer_id::ACK_OFFSET)
    }
}

pub use ble::{BleConfig, BleRadio, BleTransport};
pub use wifi::{ServiceBrowser, WifiConfig, WifiTransport};
