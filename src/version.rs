//! Record versions
//!
//! A version identifies one physical write of a record. Equality is what
//! optimistic concurrency (PutIfVersion / DeleteIfVersion) relies on.

use serde::{Deserialize, Serialize};

/// Opaque storage version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Version {
    /// Shard (replication group) the write was made on
    pub shard_id: u32,
    /// Logical sequence number within the shard
    pub seq: u64,
    /// Node that recorded `position`
    pub node_id: u32,
    /// Physical position token, when known
    pub position: Option<u64>,
}

impl Version {
    pub fn new(shard_id: u32, seq: u64, node_id: u32, position: Option<u64>) -> Self {
        Self {
            shard_id,
            seq,
            node_id,
            position,
        }
    }

    /// Same physical write?
    ///
    /// Versions from different shards never match, even if their sequence
    /// numbers coincide. Position tokens are compared only when both were
    /// recorded on the same node; otherwise the sequence number decides.
    pub fn same_write(&self, other: &Version) -> bool {
        if self.shard_id != other.shard_id {
            return false;
        }
        match (self.position, other.position) {
            (Some(a), Some(b)) if self.node_id == other.node_id => a == b,
            _ => self.seq == other.seq,
        }
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{}:{}", self.shard_id, self.seq)
    }
}
