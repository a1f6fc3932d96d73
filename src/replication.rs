//! Migration stream
//!
//! Every successful write or delete is mirrored to a migration stream so a
//! partition being moved elsewhere sees the same changes as the local store.
//!
//! ```text
//! handler ──► MigrationStream::send ──► (channel) ──► migration target
//! ```

use bytes::Bytes;
use crossbeam::channel::{self, Receiver, Sender};

use crate::version::Version;

/// Kind of change carried by an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationKind {
    Put,
    /// Physical delete
    Delete,
    /// Delete replaced by a tombstone write
    Tombstone,
}

/// One mirrored change
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationEvent {
    pub kind: MigrationKind,
    pub key: Vec<u8>,
    /// New value; `None` for deletes and tombstones
    pub value: Option<Bytes>,
    /// Version of the write; `None` for physical deletes
    pub version: Option<Version>,
    pub creation_time: u64,
    pub modification_time: u64,
    pub expiration_time: u64,
}

/// Sink for migration events
pub trait MigrationStream: Send + Sync {
    fn send(&self, event: MigrationEvent);
}

/// Migration stream backed by an unbounded crossbeam channel
#[derive(Debug, Clone)]
pub struct ChannelMigrationStream {
    sender: Sender<MigrationEvent>,
    receiver: Receiver<MigrationEvent>,
}

impl ChannelMigrationStream {
    pub fn new() -> Self {
        let (sender, receiver) = channel::unbounded();
        Self { sender, receiver }
    }

    /// Receiving end, for the migration target
    pub fn receiver(&self) -> Receiver<MigrationEvent> {
        self.receiver.clone()
    }

    /// Drain every event sent so far
    pub fn drain(&self) -> Vec<MigrationEvent> {
        self.receiver.try_iter().collect()
    }
}

impl Default for ChannelMigrationStream {
    fn default() -> Self {
        Self::new()
    }
}

impl MigrationStream for ChannelMigrationStream {
    fn send(&self, event: MigrationEvent) {
        // Both ends live in self, so the channel is never disconnected
        if self.sender.send(event).is_err() {
            tracing::warn!("Migration stream disconnected, event dropped");
        }
    }
}
