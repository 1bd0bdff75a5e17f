//! Outstanding acknowledgments.
//!
//! Each command that requires an ack registers a waiter keyed by
//! `(buffer_id, packet_id)`. The waiter is resolved when the matching ack
//! frame arrives, or failed when the link goes down. Deadlines live with
//! the waiting future, not here.

use std::collections::HashMap;

use tokio::sync::oneshot;

use crate::error::{Error, Result};

/// Receiving half handed to the sender of a command.
pub type AckReceiver = oneshot::Receiver<Result<()>>;

#[derive(Debug)]
struct PendingEntry {
    token: String,
    waiter: oneshot::Sender<Result<()>>,
}

/// Table of commands waiting for their ack.
#[derive(Debug, Default)]
pub struct PendingAcks {
    entries: HashMap<(u8, u8), PendingEntry>,
}

impl PendingAcks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a waiter for `(buffer_id, packet_id)`.
    ///
    /// Fails with [`Error::DuplicatePendingAck`] if the key is still
    /// awaited; the existing entry is left untouched. An entry whose
    /// receiver was dropped no longer counts as awaited.
    pub fn register(&mut self, buffer_id: u8, packet_id: u8, token: &str) -> Result<AckReceiver> {
        let key = (buffer_id, packet_id);
        if let Some(existing) = self.entries.get(&key) {
            if !existing.waiter.is_closed() {
                return Err(Error::DuplicatePendingAck {
                    buffer_id,
                    packet_id,
                });
            }
            tracing::debug!(
                "replacing abandoned ack waiter for {} ({buffer_id}, {packet_id})",
                existing.token
            );
        }

        let (waiter, receiver) = oneshot::channel();
        self.entries.insert(
            key,
            PendingEntry {
                token: token.to_string(),
                waiter,
            },
        );
        Ok(receiver)
    }

    /// Resolves the waiter for `(buffer_id, packet_id)`.
    ///
    /// Returns false if nothing was waiting for that key.
    pub fn resolve(&mut self, buffer_id: u8, packet_id: u8) -> bool {
        match self.entries.remove(&(buffer_id, packet_id)) {
            Some(entry) => {
                tracing::debug!("ack for {} ({buffer_id}, {packet_id})", entry.token);
                let _ = entry.waiter.send(Ok(()));
                true
            }
            None => false,
        }
    }

    /// Removes the entry for `(buffer_id, packet_id)` without resolving it.
    pub fn cancel(&mut self, buffer_id: u8, packet_id: u8) -> bool {
        self.entries.remove(&(buffer_id, packet_id)).is_some()
    }

    /// Fails every waiter with [`Error::LinkLost`] and empties the table.
    ///
    /// Returns the number of waiters failed.
    pub fn fail_all(&mut self, reason: &str) -> usize {
        let count = self.entries.len();
        for (_, entry) in self.entries.drain() {
            let _ = entry.waiter.send(Err(Error::LinkLost {
                reason: reason.to_string(),
            }));
        }
        count
    }

    /// Returns true if `(buffer_id, packet_id)` is awaited.
    #[must_use]
    pub fn contains(&self, buffer_id: u8, packet_id: u8) -> bool {
        self.entries.contains_key(&(buffer_id, packet_id))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
