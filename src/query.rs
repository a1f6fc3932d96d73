//! Query batch collaborators
//!
//! The query planner and engine are black boxes: the core hands one batch of
//! an already planned query to a [`QueryExecutor`] and reports what comes
//! back. Before running a batch it waits for the [`TopologyView`] to agree
//! that every partition the batch needs is in place.

use std::time::Duration;

use bytes::Bytes;

use crate::error::Result;
use crate::ops::Query;
use crate::tracker::ExecContext;

/// Where a suspended query batch continues
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResumeInfo {
    /// Position in the partition / shard list
    pub current_index: u32,
    pub primary_key: Option<Vec<u8>>,
    pub secondary_key: Option<Vec<u8>>,
    /// Results produced by previous batches
    pub num_results: u64,
}

/// What a query batch runs against
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryScope {
    SinglePartition(u32),
    MultiPartition(Vec<u32>),
    MultiShard(Vec<u32>),
}

impl QueryScope {
    /// Partitions or shards that must be ready before the batch runs
    pub fn members(&self) -> Vec<u32> {
        match self {
            QueryScope::SinglePartition(id) => vec![*id],
            QueryScope::MultiPartition(ids) | QueryScope::MultiShard(ids) => ids.clone(),
        }
    }
}

/// Limits for one batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryLimits {
    pub batch_size: u32,
    /// 0 = no budget
    pub max_read_kb: u32,
    /// Time left before the batch must suspend
    pub deadline: Option<Duration>,
}

/// One batch of results
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryBatch {
    pub rows: Vec<Bytes>,
    pub more: bool,
    pub resume_info: Option<ResumeInfo>,
}

/// Query engine collaborator
pub trait QueryExecutor: Send + Sync {
    /// Run one batch, charging reads and writes to `ctx`
    fn execute_batch(
        &self,
        query: &Query,
        scope: &QueryScope,
        limits: &QueryLimits,
        ctx: &mut ExecContext,
    ) -> Result<QueryBatch>;
}

/// Partition routing collaborator
pub trait TopologyView: Send + Sync {
    /// True once every listed partition is available to this node
    fn is_converged(&self, partitions: &[u32]) -> bool;
}
