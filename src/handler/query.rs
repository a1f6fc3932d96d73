//! Query batches
//!
//! ```text
//! wait for topology ──► execute one batch ──► rows + resume info
//!   (poll + sleep)        (QueryExecutor)
//! ```
//!
//! The caller timeout minus `query_timeout_margin_ms` bounds both the
//! topology wait and the batch itself, so the batch suspends before the
//! client gives up.

use std::time::Duration;

use crate::access::AccessTarget;
use crate::error::{AtlasError, Result};
use crate::ops::{OpCode, Operation, Query, QueryResult};
use crate::query::{QueryLimits, QueryScope};
use crate::store::Partition;
use crate::tracker::ExecContext;

use super::OperationHandler;

impl OperationHandler {
    pub(super) fn query(
        &self,
        op: &Operation,
        query: &Query,
        ctx: &mut ExecContext,
        partition: &Partition,
    ) -> Result<QueryResult> {
        let executor = self
            .query_executor
            .as_ref()
            .ok_or_else(|| AtlasError::Config("No query executor configured".to_string()))?;

        for table_id in &query.table_ids {
            let table = self.table(*table_id)?;
            self.authorize(op, &AccessTarget::table(&table))?;
        }

        let scope = match op.opcode() {
            OpCode::QuerySinglePartition => QueryScope::SinglePartition(partition.id),
            OpCode::QueryMultiPartition => QueryScope::MultiPartition(query.partitions.clone()),
            OpCode::QueryMultiShard => QueryScope::MultiShard(query.partitions.clone()),
            other => {
                return Err(AtlasError::Fatal(format!(
                    "{} dispatched to the query handler",
                    other
                )))
            }
        };

        let margin = Duration::from_millis(self.config.query_timeout_margin_ms);
        self.await_topology(&scope, ctx, margin)?;

        let limits = QueryLimits {
            batch_size: self.batch_size(query.batch_size),
            max_read_kb: query.max_read_kb,
            deadline: ctx.remaining(margin),
        };
        let batch = executor.execute_batch(query, &scope, &limits, ctx)?;
        if batch.rows.is_empty() && ctx.read_kb() == 0 {
            ctx.add_empty_read_charge();
        }

        tracing::debug!(
            "Query batch on {:?} returned {} rows (more: {})",
            scope,
            batch.rows.len(),
            batch.more
        );
        Ok(QueryResult {
            rows: batch.rows,
            more: batch.more,
            resume_info: batch.resume_info,
        })
    }

    /// Poll the topology until every member of `scope` is available
    fn await_topology(&self, scope: &QueryScope, ctx: &ExecContext, margin: Duration) -> Result<()> {
        let Some(topology) = &self.topology else {
            return Ok(());
        };
        let members = scope.members();
        let poll = Duration::from_millis(self.config.topology_poll_interval_ms);
        let timeout_ms = ctx.timeout().map_or(0, |t| t.as_millis() as u64);

        loop {
            if topology.is_converged(&members) {
                return Ok(());
            }
            match ctx.remaining(margin) {
                Some(left) if left >= poll => {
                    tracing::debug!("Waiting for partitions {:?} ({:?} left)", members, left);
                    std::thread::sleep(poll);
                }
                _ => {
                    tracing::warn!("Topology did not converge for partitions {:?}", members);
                    return Err(AtlasError::RequestTimeout(timeout_ms));
                }
            }
        }
    }
}
