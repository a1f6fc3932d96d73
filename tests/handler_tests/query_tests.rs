//! Tests for query batches
//!
//! The query engine and topology are mocked; these tests verify what the
//! handler hands them and how it waits for partitions.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use atlastable::ops::{Operation, Query};
use atlastable::query::{QueryBatch, QueryExecutor, QueryLimits, QueryScope, ResumeInfo, TopologyView};
use atlastable::tracker::ExecContext;
use atlastable::{AtlasError, Config, Result};
use bytes::Bytes;
use parking_lot::Mutex;

use crate::common::*;

// =============================================================================
// Mocks
// =============================================================================

/// Returns `rows` copies of a fixed row and charges `read_bytes`
struct MockExecutor {
    rows: usize,
    read_bytes: usize,
    calls: Mutex<Vec<(QueryScope, QueryLimits)>>,
}

impl MockExecutor {
    fn new(rows: usize, read_bytes: usize) -> Arc<Self> {
        Arc::new(Self {
            rows,
            read_bytes,
            calls: Mutex::new(Vec::new()),
        })
    }

    fn last_call(&self) -> (QueryScope, QueryLimits) {
        self.calls.lock().last().cloned().unwrap()
    }
}

impl QueryExecutor for MockExecutor {
    fn execute_batch(
        &self,
        _query: &Query,
        scope: &QueryScope,
        limits: &QueryLimits,
        ctx: &mut ExecContext,
    ) -> Result<QueryBatch> {
        self.calls.lock().push((scope.clone(), *limits));
        if self.read_bytes > 0 {
            ctx.add_read_bytes(self.read_bytes);
        }
        let more = self.rows as u32 >= limits.batch_size;
        Ok(QueryBatch {
            rows: vec![Bytes::from_static(b"row"); self.rows],
            more,
            resume_info: more.then(|| ResumeInfo {
                current_index: 0,
                primary_key: Some(b"last".to_vec()),
                secondary_key: None,
                num_results: self.rows as u64,
            }),
        })
    }
}

/// Converges after `polls_left` failed checks
struct SlowTopology {
    polls_left: AtomicU32,
    checks: AtomicU32,
}

impl SlowTopology {
    fn new(polls: u32) -> Arc<Self> {
        Arc::new(Self {
            polls_left: AtomicU32::new(polls),
            checks: AtomicU32::new(0),
        })
    }
}

impl TopologyView for SlowTopology {
    fn is_converged(&self, _partitions: &[u32]) -> bool {
        self.checks.fetch_add(1, Ordering::SeqCst);
        self.polls_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_err()
    }
}

fn query_fixture(executor: Arc<MockExecutor>) -> Fixture {
    Fixture::build(|b| b.query_executor(executor))
}

fn user_query() -> Query {
    Query {
        plan: Bytes::from_static(b"plan"),
        table_ids: vec![USERS],
        ..Query::default()
    }
}

// =============================================================================
// Batches
// =============================================================================

#[test]
fn test_query_returns_executor_batch() {
    let executor = MockExecutor::new(3, 2048);
    let fx = query_fixture(executor.clone());

    let mut query = user_query();
    query.batch_size = 3;
    let result = fx.exec(&Operation::QuerySinglePartition(query));
    let batch = result.as_query().unwrap();

    assert_eq!(batch.rows.len(), 3);
    assert!(batch.more);
    assert_eq!(batch.resume_info.as_ref().unwrap().num_results, 3);
    assert_eq!(result.read_kb, 2);

    let (scope, limits) = executor.last_call();
    assert_eq!(scope, QueryScope::SinglePartition(fx.partition.id));
    assert_eq!(limits.batch_size, 3);
    assert_eq!(limits.deadline, None);
}

#[test]
fn test_query_scopes() {
    let executor = MockExecutor::new(1, 1024);
    let fx = query_fixture(executor.clone());
    let mut query = user_query();
    query.partitions = vec![4, 5, 6];

    fx.exec(&Operation::QueryMultiPartition(query.clone()));
    assert_eq!(executor.last_call().0, QueryScope::MultiPartition(vec![4, 5, 6]));

    fx.exec(&Operation::QueryMultiShard(query));
    assert_eq!(executor.last_call().0, QueryScope::MultiShard(vec![4, 5, 6]));
}

#[test]
fn test_query_default_batch_size() {
    let executor = MockExecutor::new(0, 0);
    let fx = query_fixture(executor.clone());

    fx.exec(&Operation::QuerySinglePartition(user_query()));

    assert_eq!(executor.last_call().1.batch_size, 100);
}

#[test]
fn test_query_empty_batch_charges_floor() {
    let executor = MockExecutor::new(0, 0);
    let fx = query_fixture(executor);

    let result = fx.exec(&Operation::QuerySinglePartition(user_query()));

    assert!(result.as_query().unwrap().rows.is_empty());
    assert!(!result.as_query().unwrap().more);
    assert_eq!(result.read_kb, 1);
}

#[test]
fn test_query_deadline_leaves_margin() {
    let executor = MockExecutor::new(1, 1024);
    let fx = query_fixture(executor.clone());

    let (result, _) = fx.run(
        &Operation::QuerySinglePartition(user_query()),
        ExecContext::new().with_time_ms(NOW).with_timeout_ms(5000),
    );
    result.unwrap();

    let deadline = executor.last_call().1.deadline.unwrap();
    assert!(deadline <= Duration::from_millis(4000));
    assert!(deadline > Duration::from_millis(3000));
}

// =============================================================================
// Errors
// =============================================================================

#[test]
fn test_query_without_executor() {
    let fx = Fixture::new();

    let err = fx.try_exec(&Operation::QuerySinglePartition(user_query())).unwrap_err();

    assert!(matches!(err, AtlasError::Config(_)));
}

#[test]
fn test_query_unknown_table() {
    let executor = MockExecutor::new(1, 1024);
    let fx = query_fixture(executor.clone());
    let mut query = user_query();
    query.table_ids.push(77);

    let err = fx.try_exec(&Operation::QuerySinglePartition(query)).unwrap_err();

    assert!(matches!(err, AtlasError::TableNotFound(77)));
    assert!(executor.calls.lock().is_empty());
}

// =============================================================================
// Topology
// =============================================================================

fn topology_fixture(executor: Arc<MockExecutor>, topology: Arc<SlowTopology>) -> Fixture {
    let config = Config::builder().topology_poll_interval_ms(10).build();
    Fixture::build(|b| b.config(config).query_executor(executor).topology(topology))
}

#[test]
fn test_query_waits_for_topology() {
    let executor = MockExecutor::new(1, 1024);
    let topology = SlowTopology::new(3);
    let fx = topology_fixture(executor.clone(), topology.clone());

    let (result, _) = fx.run(
        &Operation::QuerySinglePartition(user_query()),
        ExecContext::new().with_time_ms(NOW).with_timeout_ms(10_000),
    );

    assert!(result.is_ok());
    assert_eq!(topology.checks.load(Ordering::SeqCst), 4);
    assert_eq!(executor.calls.lock().len(), 1);
}

#[test]
fn test_query_topology_timeout() {
    let executor = MockExecutor::new(1, 1024);
    let topology = SlowTopology::new(u32::MAX);
    let fx = topology_fixture(executor.clone(), topology.clone());

    let (result, _) = fx.run(
        &Operation::QuerySinglePartition(user_query()),
        ExecContext::new().with_time_ms(NOW).with_timeout_ms(1050),
    );

    match result.unwrap_err() {
        AtlasError::RequestTimeout(ms) => assert_eq!(ms, 1050),
        other => panic!("Expected RequestTimeout, got {:?}", other),
    }
    assert!(topology.checks.load(Ordering::SeqCst) >= 1);
    assert!(executor.calls.lock().is_empty());
}

#[test]
fn test_query_topology_without_timeout_checks_once() {
    let executor = MockExecutor::new(1, 1024);
    let topology = SlowTopology::new(u32::MAX);
    let fx = topology_fixture(executor, topology.clone());

    let err = fx.try_exec(&Operation::QuerySinglePartition(user_query())).unwrap_err();

    assert!(matches!(err, AtlasError::RequestTimeout(0)));
    assert_eq!(topology.checks.load(Ordering::SeqCst), 1);
}
