//! Handler Module
//!
//! Executes one decoded [`Operation`] against the record store.
//!
//! ## Execution Flow
//! ```text
//! ┌─────────────┐     ┌──────────────────┐     ┌──────────────┐
//! │  Operation  │────►│ OperationHandler │────►│ RecordStore  │
//! │ ExecContext │     │  (dispatch)      │     │  (cursor)    │
//! └─────────────┘     └────────┬─────────┘     └──────────────┘
//!                              │
//!               ┌──────────────┼──────────────┐
//!               ▼              ▼              ▼
//!          privilege     charges (ctx)   migration stream
//!               └──────────────┬──────────────┘
//!                              ▼
//!                          OpResult
//! ```
//!
//! Each operation kind has a handler function in its own file; they share the
//! flat helpers in `common.rs`. Privileges are checked before any storage
//! access.

mod ancestor;
mod bulk_get;
mod common;
mod delete;
mod get;
mod index_iterate;
mod multi_delete;
mod multi_get;
mod put;
mod put_batch;
mod put_resolve;
mod query;
mod scanner;
mod table_charge;
mod table_iterate;

use std::sync::Arc;

use crate::access::{AccessChecker, AccessTarget, AllowAll};
use crate::config::{Config, NULL_REGION_ID};
use crate::error::{AtlasError, Result};
use crate::keyspace::KeySpace;
use crate::ops::{OpResult, Operation, ResultPayload};
use crate::query::{QueryExecutor, TopologyView};
use crate::replication::MigrationStream;
use crate::resolver::ConflictResolver;
use crate::schema::{TableId, TableMetadata, TableSchema, TargetTables};
use crate::store::{CursorConfig, Isolation, Partition, RecordStore, Transaction};
use crate::tracker::ExecContext;

pub use common::RetryOutcome;
pub use put::PutKind;

/// Executes operations against one record store
pub struct OperationHandler {
    store: Arc<dyn RecordStore>,
    metadata: Arc<dyn TableMetadata>,
    access: Arc<dyn AccessChecker>,
    config: Config,
    resolver: ConflictResolver,
    migration: Option<Arc<dyn MigrationStream>>,
    query_executor: Option<Arc<dyn QueryExecutor>>,
    topology: Option<Arc<dyn TopologyView>>,
}

impl OperationHandler {
    /// Start building a handler over `store` and `metadata`
    pub fn builder(
        store: Arc<dyn RecordStore>,
        metadata: Arc<dyn TableMetadata>,
    ) -> OperationHandlerBuilder {
        OperationHandlerBuilder {
            store,
            metadata,
            access: Arc::new(AllowAll),
            config: Config::default(),
            migration: None,
            query_executor: None,
            topology: None,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Execute `op` inside `txn` against `partition`
    ///
    /// Precondition failures come back as unsuccessful results; only faults
    /// are errors.
    pub fn execute(
        &self,
        op: &Operation,
        ctx: &mut ExecContext,
        txn: &Transaction,
        partition: &Partition,
    ) -> Result<OpResult> {
        let opcode = op.opcode();
        tracing::trace!("Executing {} in txn {}", opcode, txn.id());

        let payload = match op {
            Operation::Nop => ResultPayload::Nop,
            Operation::Get(get) => ResultPayload::Get(self.get(op, get, ctx, txn)?),
            Operation::Put(put) => {
                ResultPayload::Put(self.put(op, put, PutKind::Overwrite, ctx, txn, partition)?)
            }
            Operation::PutIfAbsent(put) => {
                ResultPayload::Put(self.put(op, put, PutKind::IfAbsent, ctx, txn, partition)?)
            }
            Operation::PutIfPresent(put) => {
                ResultPayload::Put(self.put(op, put, PutKind::IfPresent, ctx, txn, partition)?)
            }
            Operation::PutIfVersion(p) => ResultPayload::Put(self.put(
                op,
                &p.put,
                PutKind::IfVersion(p.match_version),
                ctx,
                txn,
                partition,
            )?),
            Operation::PutResolve(p) => {
                ResultPayload::Put(self.put_resolve(op, p, ctx, txn, partition)?)
            }
            Operation::Delete(d) => {
                ResultPayload::Delete(self.delete(op, d, None, ctx, txn, partition)?)
            }
            Operation::DeleteIfVersion(d) => ResultPayload::Delete(self.delete(
                op,
                &d.delete,
                Some(d.match_version),
                ctx,
                txn,
                partition,
            )?),
            Operation::MultiGet(m) => ResultPayload::Iterate(self.multi_get(op, m, false, ctx, txn)?),
            Operation::MultiGetKeys(m) => {
                ResultPayload::Iterate(self.multi_get(op, m, true, ctx, txn)?)
            }
            Operation::MultiGetTable(m) => {
                ResultPayload::Iterate(self.multi_get_table(op, m, false, ctx, txn)?)
            }
            Operation::MultiGetTableKeys(m) => {
                ResultPayload::Iterate(self.multi_get_table(op, m, true, ctx, txn)?)
            }
            Operation::TableIterate(t) => {
                ResultPayload::Iterate(self.table_iterate(op, t, false, ctx, txn)?)
            }
            Operation::TableKeysIterate(t) => {
                ResultPayload::Iterate(self.table_iterate(op, t, true, ctx, txn)?)
            }
            Operation::IndexIterate(i) => {
                ResultPayload::Iterate(self.index_iterate(op, i, false, ctx, txn)?)
            }
            Operation::IndexKeysIterate(i) => {
                ResultPayload::Iterate(self.index_iterate(op, i, true, ctx, txn)?)
            }
            Operation::MultiDeleteTable(m) => {
                ResultPayload::MultiDelete(self.multi_delete(op, m, ctx, txn, partition)?)
            }
            Operation::MultiGetBatchTable(m) => {
                ResultPayload::BulkGet(self.bulk_get(op, m, false, ctx, txn)?)
            }
            Operation::MultiGetBatchTableKeys(m) => {
                ResultPayload::BulkGet(self.bulk_get(op, m, true, ctx, txn)?)
            }
            Operation::PutBatch(b) => {
                ResultPayload::PutBatch(self.put_batch(op, b, ctx, txn, partition)?)
            }
            Operation::QuerySinglePartition(q)
            | Operation::QueryMultiPartition(q)
            | Operation::QueryMultiShard(q) => {
                ResultPayload::Query(self.query(op, q, ctx, partition)?)
            }
            Operation::TableCharge(c) => {
                self.table_charge(op, c, ctx)?;
                ResultPayload::TableCharge
            }
        };

        OpResult::new(
            opcode,
            ctx.read_kb(),
            ctx.write_kb(),
            self.metadata.metadata_seq_num(),
            payload,
        )
    }

    // =========================================================================
    // Shared Lookups
    // =========================================================================

    fn table(&self, table_id: TableId) -> Result<Arc<TableSchema>> {
        self.metadata
            .table(table_id)
            .ok_or(AtlasError::TableNotFound(table_id))
    }

    fn opt_table(&self, table_id: Option<TableId>) -> Result<Option<Arc<TableSchema>>> {
        table_id.map(|id| self.table(id)).transpose()
    }

    /// Check every privilege `op` needs on `target`
    fn authorize(&self, op: &Operation, target: &AccessTarget) -> Result<()> {
        for privilege in op.required_privileges() {
            self.access.check(privilege, target)?;
        }
        Ok(())
    }

    /// Authorize a single-key operation on its table, or on the keyspace of
    /// `key` when it names no table
    fn authorize_key(
        &self,
        op: &Operation,
        table: Option<&Arc<TableSchema>>,
        key: &[u8],
    ) -> Result<()> {
        let target = match table {
            Some(t) => AccessTarget::table(t),
            None => AccessTarget::Keyspace(KeySpace::classify(key)),
        };
        self.authorize(op, &target)
    }

    /// Authorize a table operation on every target and ancestor table
    fn authorize_targets(&self, op: &Operation, targets: &TargetTables) -> Result<()> {
        for id in targets.targets.iter().chain(&targets.ancestors) {
            let table = self.table(*id)?;
            self.authorize(op, &AccessTarget::table(&table))?;
        }
        Ok(())
    }

    fn cursor_config(&self, op: &Operation, ctx: &ExecContext) -> CursorConfig {
        CursorConfig {
            isolation: if op.needs_repeatable_read() {
                Isolation::RepeatableRead
            } else {
                Isolation::ReadCommitted
            },
            now_ms: ctx.now_ms(),
        }
    }

    /// Region stamped on a locally originated write
    fn local_region(&self, table: Option<&Arc<TableSchema>>) -> u32 {
        match table {
            Some(t) if t.is_multi_region() => self.config.local_region_id,
            _ => NULL_REGION_ID,
        }
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Builder for [`OperationHandler`]
pub struct OperationHandlerBuilder {
    store: Arc<dyn RecordStore>,
    metadata: Arc<dyn TableMetadata>,
    access: Arc<dyn AccessChecker>,
    config: Config,
    migration: Option<Arc<dyn MigrationStream>>,
    query_executor: Option<Arc<dyn QueryExecutor>>,
    topology: Option<Arc<dyn TopologyView>>,
}

impl OperationHandlerBuilder {
    /// Set the privilege checker (default: allow everything)
    pub fn access(mut self, access: Arc<dyn AccessChecker>) -> Self {
        self.access = access;
        self
    }

    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Mirror writes to a migration stream
    pub fn migration_stream(mut self, stream: Arc<dyn MigrationStream>) -> Self {
        self.migration = Some(stream);
        self
    }

    pub fn query_executor(mut self, executor: Arc<dyn QueryExecutor>) -> Self {
        self.query_executor = Some(executor);
        self
    }

    pub fn topology(mut self, topology: Arc<dyn TopologyView>) -> Self {
        self.topology = Some(topology);
        self
    }

    pub fn build(self) -> OperationHandler {
        let resolver = ConflictResolver::new(self.config.region_order.clone());
        OperationHandler {
            store: self.store,
            metadata: self.metadata,
            access: self.access,
            config: self.config,
            resolver,
            migration: self.migration,
            query_executor: self.query_executor,
            topology: self.topology,
        }
    }
}
