//! Frame encoding and decoding for the Wi-Fi data channel.
//!
//! Every UDP datagram carries one or more frames:
//! ```text
//! ┌────────┬──────────┬────────┬──────────────┬─────────────┐
//! │  type  │ bufferId │  seq   │ length (LE)  │   payload   │
//! │ 1 byte │  1 byte  │ 1 byte │   4 bytes    │ length - 7  │
//! └────────┴──────────┴────────┴──────────────┴─────────────┘
//! ```
//!
//! `length` counts the whole frame including the header. Acks travel on
//! `bufferId + 128` with the acknowledged sequence number as their only
//! payload byte.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::FrameError;

/// Size of the frame header.
pub const HEADER_SIZE: usize = 7;

/// Maximum frame size (largest UDP payload).
pub const MAX_FRAME_SIZE: usize = 65_507;

/// A single decoded Wi-Fi frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WifiFrame {
    /// Raw data type byte.
    pub data_type: u8,
    /// Buffer id as it appears on the wire.
    pub buffer_id: u8,
    /// Sequence number.
    pub sequence: u8,
    /// Frame payload.
    pub payload: Bytes,
}

impl WifiFrame {
    /// Returns the total encoded length.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }
}

/// Encodes a frame into its wire form.
///
/// Fails with [`FrameError::TooLarge`] if the frame exceeds `MAX_FRAME_SIZE`.
pub fn encode(frame: &WifiFrame) -> Result<Bytes, FrameError> {
    let total = frame.encoded_len();
    let length = u32::try_from(total)
        .ok()
        .filter(|_| total <= MAX_FRAME_SIZE)
        .ok_or(FrameError::TooLarge {
            size: total,
            max: MAX_FRAME_SIZE,
        })?;

    let mut buf = BytesMut::with_capacity(total);
    buf.put_u8(frame.data_type);
    buf.put_u8(frame.buffer_id);
    buf.put_u8(frame.sequence);
    buf.put_u32_le(length);
    buf.put_slice(&frame.payload);
    Ok(buf.freeze())
}

/// Frame decoder that splits datagrams into frames.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: BytesMut,
}

impl FrameDecoder {
    /// Creates a new frame decoder.
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::new(),
        }
    }

    /// Feeds data into the decoder.
    pub fn feed(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Attempts to decode the next complete frame.
    ///
    /// Returns `Ok(Some(frame))` if a complete frame was decoded,
    /// `Ok(None)` if more data is needed, or an error if the header is
    /// invalid. An invalid header drops everything buffered since the
    /// stream can't be resynchronised.
    pub fn decode(&mut self) -> Result<Option<WifiFrame>, FrameError> {
        if self.buffer.len() < HEADER_SIZE {
            return Ok(None);
        }

        let length = u32::from_le_bytes([
            self.buffer[3],
            self.buffer[4],
            self.buffer[5],
            self.buffer[6],
        ]) as usize;

        if length < HEADER_SIZE {
            self.buffer.clear();
            return Err(FrameError::InvalidLength(length));
        }
        if length > MAX_FRAME_SIZE {
            self.buffer.clear();
            return Err(FrameError::TooLarge {
                size: length,
                max: MAX_FRAME_SIZE,
            });
        }

        if self.buffer.len() < length {
            return Ok(None);
        }

        let mut frame = self.buffer.split_to(length);
        let data_type = frame.get_u8();
        let buffer_id = frame.get_u8();
        let sequence = frame.get_u8();
        frame.advance(4);

        Ok(Some(WifiFrame {
            data_type,
            buffer_id,
            sequence,
            payload: frame.freeze(),
        }))
    }

    /// Returns the number of bytes currently buffered.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Clears the internal buffer.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}
