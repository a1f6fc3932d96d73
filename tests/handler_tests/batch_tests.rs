//! Tests for PutBatch
//!
//! These tests verify:
//! - Present-key reporting in insert and overwrite modes
//! - Tombstone entries and their default lifetime
//! - Resolve mode against resident rows
//! - Region and timestamp defaults

use atlastable::ops::{BatchEntry, Operation, PutBatch, TimeToLive};
use atlastable::{AtlasError, Config};
use bytes::Bytes;

use crate::common::*;

fn entry(key: &[u8], value: &[u8]) -> BatchEntry {
    BatchEntry::new(key.to_vec(), value.to_vec())
}

fn row_entry(key: &[u8], row: atlastable::value::Row) -> BatchEntry {
    BatchEntry::new(key.to_vec(), row.encode().unwrap())
}

fn repeated_key_batch() -> Vec<BatchEntry> {
    vec![entry(b"k1", b"a"), entry(b"k2", b"b"), entry(b"k1", b"c")]
}

// =============================================================================
// Modes
// =============================================================================

#[test]
fn test_put_batch_insert_mode_reports_present_keys() {
    let fx = Fixture::new();
    fx.exec(&put(b"k2", b"resident".to_vec()));

    let mut batch = PutBatch::new(repeated_key_batch());
    batch.overwrite = false;
    let result = fx.exec(&Operation::PutBatch(batch));
    let outcome = result.as_put_batch().unwrap();

    assert_eq!(outcome.num_put, 1);
    assert_eq!(outcome.key_present_indices, vec![1, 2]);
    assert_eq!(fx.store.peek(b"k1").unwrap().value, Bytes::from_static(b"a"));
    assert_eq!(fx.store.peek(b"k2").unwrap().value, Bytes::from_static(b"resident"));
}

#[test]
fn test_put_batch_overwrite_mode_reports_repeats() {
    let fx = Fixture::new();
    fx.exec(&put(b"k2", b"resident".to_vec()));

    let result = fx.exec(&Operation::PutBatch(PutBatch::new(repeated_key_batch())));
    let outcome = result.as_put_batch().unwrap();

    assert_eq!(outcome.num_put, 2);
    assert_eq!(outcome.key_present_indices, vec![2]);
    // First occurrence wins
    assert_eq!(fx.store.peek(b"k1").unwrap().value, Bytes::from_static(b"a"));
    assert_eq!(fx.store.peek(b"k2").unwrap().value, Bytes::from_static(b"b"));
}

#[test]
fn test_put_batch_charges_every_write() {
    let fx = Fixture::new();
    fx.exec(&put(b"k2", b"resident".to_vec()));

    let result = fx.exec(&Operation::PutBatch(PutBatch::new(vec![
        entry(b"k1", b"a"),
        entry(b"k2", b"b"),
    ])));

    assert_eq!(result.read_kb, 2);
    // insert: 1, overwrite: new + old
    assert_eq!(result.write_kb, 3);
}

// =============================================================================
// Entry Metadata
// =============================================================================

#[test]
fn test_put_batch_tombstone_entry() {
    let fx = Fixture::new();
    fx.exec(&put(b"k1", b"v1".to_vec()));

    let mut tombstone = BatchEntry::new(b"k1".to_vec(), Bytes::new());
    tombstone.tombstone = true;
    tombstone.modification_time = Some(NOW - 1000);
    let result = fx.exec(&Operation::PutBatch(PutBatch::new(vec![tombstone])));

    assert_eq!(result.as_put_batch().unwrap().num_put, 1);
    let stored = fx.store.peek(b"k1").unwrap();
    assert!(stored.tombstone);
    assert!(stored.value.is_empty());
    assert_eq!(stored.modification_time, NOW - 1000);
    assert_eq!(
        stored.expiration_time,
        NOW - 1000 + Config::default().tombstone_ttl_ms
    );
}

#[test]
fn test_put_batch_entry_ttl() {
    let fx = Fixture::new();
    let mut with_ttl = entry(b"k1", b"v1");
    with_ttl.ttl = Some(TimeToLive::hours(1));

    fx.exec(&Operation::PutBatch(PutBatch::new(vec![with_ttl, entry(b"k2", b"v2")])));

    assert_eq!(fx.store.peek(b"k1").unwrap().expiration_time, NOW + HOUR_MS);
    assert_eq!(fx.store.peek(b"k2").unwrap().expiration_time, 0);
}

#[test]
fn test_put_batch_expiration_out_of_range_is_rejected() {
    let fx = Fixture::new();

    let mut with_ttl = entry(b"k1", b"v1");
    with_ttl.ttl = Some(TimeToLive::days(u64::MAX / 1000));
    let err = fx
        .try_exec(&Operation::PutBatch(PutBatch::new(vec![with_ttl])))
        .unwrap_err();
    assert!(matches!(err, AtlasError::IllegalArgument(_)));

    let mut tombstone = BatchEntry::new(b"k2".to_vec(), Bytes::new());
    tombstone.tombstone = true;
    tombstone.modification_time = Some(u64::MAX);
    let err = fx
        .try_exec(&Operation::PutBatch(PutBatch::new(vec![tombstone])))
        .unwrap_err();
    assert!(err.is_client_fault());
    assert!(fx.store.is_empty());
}

#[test]
fn test_put_batch_region_defaults() {
    let fx = Fixture::new();
    let mut explicit = entry(b"k2", b"v2");
    explicit.region_id = Some(5);

    let mut batch = PutBatch::new(vec![entry(b"k1", b"v1"), explicit]);
    batch.local_region_id = 3;
    fx.exec(&Operation::PutBatch(batch));

    assert_eq!(fx.store.peek(b"k1").unwrap().region_id, 3);
    assert_eq!(fx.store.peek(b"k2").unwrap().region_id, 5);
}

#[test]
fn test_put_batch_mr_table_takes_config_region() {
    let fx = Fixture::with_config(Config::builder().local_region_id(2).build());
    let key = fx.row_key(ACCOUNTS, &["a1"]);

    let mut batch = PutBatch::new(vec![row_entry(&key, account_row("a", &[(2, 1)]))]);
    batch.table_id = Some(ACCOUNTS);
    fx.exec(&Operation::PutBatch(batch));

    assert_eq!(fx.store.peek(&key).unwrap().region_id, 2);
}

#[test]
fn test_put_batch_rejects_stale_row_version() {
    let fx = Fixture::new();
    fx.catalog
        .evolve_table(USERS, |t| {
            t.version = 3;
            t.min_writable_version = 2;
        })
        .unwrap();
    let good = fx.row_key(USERS, &["u1"]);
    let stale = fx.row_key(USERS, &["u2"]);

    let mut batch = PutBatch::new(vec![
        row_entry(&good, atlastable::value::Row::new(3)),
        row_entry(&stale, atlastable::value::Row::new(1)),
    ]);
    batch.table_id = Some(USERS);
    let err = fx.try_exec(&Operation::PutBatch(batch)).unwrap_err();

    assert!(matches!(err, AtlasError::TableVersionMismatch { .. }));
    // Rejected before anything is written
    assert!(fx.store.is_empty());
}

// =============================================================================
// Resolve Mode
// =============================================================================

#[test]
fn test_put_batch_resolve_mode_reports_losers() {
    let fx = Fixture::with_config(Config::builder().local_region_id(1).build());
    let a1 = fx.row_key(ACCOUNTS, &["a1"]);
    let a2 = fx.row_key(ACCOUNTS, &["a2"]);
    fx.exec(&put_row(ACCOUNTS, &a1, account_row("resident", &[])));

    let mut older = row_entry(&a1, account_row("older", &[]));
    older.modification_time = Some(NOW - 1);
    older.region_id = Some(2);
    let mut fresh = row_entry(&a2, account_row("fresh", &[]));
    fresh.modification_time = Some(NOW - 1);
    fresh.region_id = Some(2);

    let mut batch = PutBatch::new(vec![older, fresh]);
    batch.table_id = Some(ACCOUNTS);
    batch.use_put_resolve = true;
    let result = fx.exec(&Operation::PutBatch(batch));
    let outcome = result.as_put_batch().unwrap();

    assert_eq!(outcome.num_put, 1);
    assert_eq!(outcome.key_present_indices, vec![0]);
    assert_eq!(fx.stored_row(&a1), account_row("resident", &[]));
    let stored = fx.store.peek(&a2).unwrap();
    assert_eq!(stored.region_id, 2);
    assert_eq!(stored.modification_time, NOW - 1);
    assert_eq!(stored.creation_time, NOW - 1);
}
