//! Tests for multi-region conflict resolution
//!
//! These tests verify:
//! - Last-writer-wins ordering and region tie-breaks
//! - MR counter merge and copy helpers
//! - PutResolve against absent, older, newer, and tombstoned residents
//! - Convergence of two regions applying each other's writes

use std::collections::HashMap;

use atlastable::ops::{Operation, PutResolve};
use atlastable::resolver::{
    copy_counters, merge_counters, ConflictResolver, RegionOrder, Resolution, WriteStamp,
};
use atlastable::value::{FieldValue, Row};
use atlastable::AtlasError;
use bytes::Bytes;

use crate::common::*;

fn paths(list: &[&[&str]]) -> Vec<Vec<String>> {
    list.iter()
        .map(|p| p.iter().map(|s| s.to_string()).collect())
        .collect()
}

fn resolve_op(key: &[u8], row: Option<Row>, modification_time: u64, region_id: u32) -> PutResolve {
    PutResolve {
        key: key.to_vec(),
        value: row.map_or_else(Bytes::new, |r| Bytes::from(r.encode().unwrap())),
        table_id: Some(ACCOUNTS),
        modification_time,
        region_id,
        tombstone: false,
        expiration_time: 0,
        creation_time: 0,
    }
}

fn tombstone_op(key: &[u8], modification_time: u64, region_id: u32) -> PutResolve {
    PutResolve {
        tombstone: true,
        ..resolve_op(key, None, modification_time, region_id)
    }
}

// =============================================================================
// Resolver
// =============================================================================

#[test]
fn test_later_timestamp_wins() {
    let resolver = ConflictResolver::new(RegionOrder::NumericId);

    assert_eq!(
        resolver.resolve(WriteStamp::new(100, 9), WriteStamp::new(101, 1)),
        Resolution::RemoteWins
    );
    assert_eq!(
        resolver.resolve(WriteStamp::new(101, 1), WriteStamp::new(100, 9)),
        Resolution::LocalWins
    );
}

#[test]
fn test_timestamp_tie_greater_region_wins() {
    let resolver = ConflictResolver::new(RegionOrder::NumericId);
    let low = WriteStamp::new(100, 1);
    let high = WriteStamp::new(100, 2);

    // Both sides agree on the winner
    assert_eq!(resolver.resolve(low, high), Resolution::RemoteWins);
    assert_eq!(resolver.resolve(high, low), Resolution::LocalWins);
}

#[test]
fn test_region_names_order_ties() {
    let names: HashMap<u32, String> = [(2, "us-west".to_string()), (3, "EU-central".to_string())]
        .into_iter()
        .collect();
    let resolver = ConflictResolver::new(RegionOrder::Name(names));
    let us = WriteStamp::new(100, 2);
    let eu = WriteStamp::new(100, 3);

    // "us-west" > "eu-central", despite the smaller id
    assert_eq!(resolver.resolve(eu, us), Resolution::RemoteWins);
    assert_eq!(resolver.resolve(us, eu), Resolution::LocalWins);
}

#[test]
fn test_unnamed_region_ranks_after_named_ones() {
    let names: HashMap<u32, String> = [(1, "zurich".to_string()), (3, "amsterdam".to_string())]
        .into_iter()
        .collect();
    let resolver = ConflictResolver::new(RegionOrder::Name(names));
    let zurich = WriteStamp::new(100, 1);
    let unnamed = WriteStamp::new(100, 2);
    let amsterdam = WriteStamp::new(100, 3);

    // amsterdam < zurich < unnamed, whichever side is resident
    for (low, high) in [(amsterdam, zurich), (zurich, unnamed), (amsterdam, unnamed)] {
        assert_eq!(resolver.resolve(low, high), Resolution::RemoteWins);
        assert_eq!(resolver.resolve(high, low), Resolution::LocalWins);
    }
}

#[test]
fn test_missing_region_goes_to_incoming_write() {
    let resolver = ConflictResolver::new(RegionOrder::NumericId);
    let regionless = WriteStamp::new(100, 0);
    let regional = WriteStamp::new(100, 5);

    assert_eq!(resolver.resolve(regionless, regional), Resolution::RemoteWins);
    assert_eq!(resolver.resolve(regional, regionless), Resolution::RemoteWins);
}

#[test]
fn test_identical_stamps_keep_resident() {
    let resolver = ConflictResolver::default();
    let stamp = WriteStamp::new(100, 4);

    assert_eq!(resolver.resolve(stamp, stamp), Resolution::LocalWins);
}

#[test]
fn test_merge_counters_commutes() {
    let counters = paths(&[&["visits"]]);
    let left = account_row("L", &[(1, 5)]);
    let right = account_row("R", &[(2, 3)]);

    let lr = merge_counters(&left, &right, &counters);
    let rl = merge_counters(&right, &left, &counters);

    assert_eq!(counter_value(&lr, &["visits"]), 8);
    assert_eq!(lr.get("visits"), rl.get("visits"));
    // Non-counter fields come from the base row
    assert_eq!(lr.get("name"), Some(&FieldValue::Text("L".to_string())));
    assert_eq!(rl.get("name"), Some(&FieldValue::Text("R".to_string())));
}

#[test]
fn test_copy_counters_nested_path() {
    let counters = paths(&[&["visits"], &["stats", "likes"]]);
    let mut stats = std::collections::BTreeMap::new();
    stats.insert("likes".to_string(), FieldValue::Counter(counter(&[(1, 7)])));
    let prev = account_row("old", &[(1, 2)]).with("stats", FieldValue::Map(stats));
    let incoming = Row::new(1).with("name", FieldValue::Text("new".to_string()));

    let out = copy_counters(&prev, &incoming, &counters);

    assert_eq!(out.get("name"), Some(&FieldValue::Text("new".to_string())));
    assert_eq!(counter_value(&out, &["visits"]), 2);
    assert_eq!(counter_value(&out, &["stats", "likes"]), 7);
}

// =============================================================================
// PutResolve
// =============================================================================

#[test]
fn test_put_resolve_inserts_absent_key() {
    let fx = Fixture::new();
    let key = fx.row_key(ACCOUNTS, &["a1"]);

    let result = fx.exec(&Operation::PutResolve(resolve_op(&key, Some(account_row("r", &[])), 500, 2)));

    assert!(result.success());
    let stored = fx.store.peek(&key).unwrap();
    assert_eq!(stored.modification_time, 500);
    assert_eq!(stored.creation_time, 500);
    assert_eq!(stored.region_id, 2);
    assert_eq!(result.read_kb, 1);
    assert_eq!(result.write_kb, 1);
}

#[test]
fn test_put_resolve_keeps_given_creation_time() {
    let fx = Fixture::new();
    let key = fx.row_key(ACCOUNTS, &["a1"]);
    let mut op = resolve_op(&key, Some(account_row("r", &[])), 500, 2);
    op.creation_time = 300;

    fx.exec(&Operation::PutResolve(op));

    assert_eq!(fx.store.peek(&key).unwrap().creation_time, 300);
}

#[test]
fn test_put_resolve_newer_write_wins() {
    let fx = Fixture::new();
    let key = fx.row_key(ACCOUNTS, &["a1"]);
    fx.exec(&Operation::PutResolve(resolve_op(&key, Some(account_row("old", &[])), 100, 1)));

    let result = fx.exec(&Operation::PutResolve(resolve_op(&key, Some(account_row("new", &[])), 200, 2)));

    assert!(result.success());
    assert_eq!(fx.stored_row(&key), account_row("new", &[]));
    assert_eq!(fx.store.peek(&key).unwrap().modification_time, 200);
}

#[test]
fn test_put_resolve_older_write_loses() {
    let fx = Fixture::new();
    let key = fx.row_key(ACCOUNTS, &["a1"]);
    fx.exec(&Operation::PutResolve(resolve_op(&key, Some(account_row("new", &[])), 200, 1)));
    let before = fx.store.peek(&key).unwrap();

    let result = fx.exec(&Operation::PutResolve(resolve_op(&key, Some(account_row("old", &[])), 100, 2)));

    assert!(!result.success());
    assert_eq!(result.write_kb, 0);
    assert_eq!(fx.store.peek(&key).unwrap(), before);
}

#[test]
fn test_put_resolve_tombstone_with_value_rejected() {
    let fx = Fixture::new();
    let key = fx.row_key(ACCOUNTS, &["a1"]);
    let mut op = tombstone_op(&key, 100, 1);
    op.value = Bytes::from_static(b"not empty");

    let err = fx.try_exec(&Operation::PutResolve(op)).unwrap_err();

    assert!(matches!(err, AtlasError::IllegalArgument(_)));
    assert!(err.is_client_fault());
    assert!(fx.store.is_empty());
}

#[test]
fn test_put_resolve_winning_tombstone() {
    let fx = Fixture::new();
    let key = fx.row_key(ACCOUNTS, &["a1"]);
    fx.exec(&Operation::PutResolve(resolve_op(&key, Some(account_row("a", &[(1, 4)])), 100, 1)));

    let mut op = tombstone_op(&key, 200, 2);
    op.expiration_time = 200 + HOUR_MS;
    let result = fx.exec(&Operation::PutResolve(op));

    assert!(result.success());
    let stored = fx.store.peek(&key).unwrap();
    assert!(stored.tombstone);
    assert!(stored.value.is_empty());
    assert_eq!(stored.expiration_time, 200 + HOUR_MS);
    assert!(!fx.exec(&get_row(ACCOUNTS, &key)).success());
}

#[test]
fn test_put_resolve_over_tombstone() {
    let fx = Fixture::new();
    let key = fx.row_key(ACCOUNTS, &["a1"]);
    fx.exec(&Operation::PutResolve(tombstone_op(&key, 100, 1)));

    let result = fx.exec(&Operation::PutResolve(resolve_op(&key, Some(account_row("back", &[(2, 1)])), 150, 2)));

    assert!(result.success());
    assert_eq!(fx.stored_row(&key), account_row("back", &[(2, 1)]));
    assert_eq!(fx.store.tombstone_count(), 0);
}

#[test]
fn test_put_resolve_losing_without_counters_charges_floor() {
    let fx = Fixture::new();
    let key = fx.put_order("o1", 5);
    let newer = fx.store.peek(&key).unwrap().modification_time;

    let mut op = resolve_op(&key, Some(Row::new(1)), newer - 1, 2);
    op.table_id = Some(ORDERS);
    let result = fx.exec(&Operation::PutResolve(op));

    assert!(!result.success());
    assert_eq!(result.read_kb, 1);
    assert_eq!(result.write_kb, 0);
}

// =============================================================================
// Convergence
// =============================================================================

#[test]
fn test_two_regions_converge() {
    let left = Fixture::new();
    let right = Fixture::new();
    let key = left.row_key(ACCOUNTS, &["a1"]);

    let l_write = resolve_op(&key, Some(account_row("L", &[(1, 5)])), 100, 1);
    let r_write = resolve_op(&key, Some(account_row("R", &[(2, 3)])), 200, 2);

    // Each region sees its own write first, then the other's
    left.exec(&Operation::PutResolve(l_write.clone()));
    let remote_wins = left.exec(&Operation::PutResolve(r_write.clone()));
    right.exec(&Operation::PutResolve(r_write));
    let loser_merge = right.exec(&Operation::PutResolve(l_write));

    assert!(remote_wins.success());
    // The losing write's counters were merged, but it did not take effect
    assert!(!loser_merge.success());
    assert!(loser_merge.write_kb > 0);

    let l_row = left.stored_row(&key);
    let r_row = right.stored_row(&key);
    assert_eq!(l_row, r_row);
    assert_eq!(l_row.get("name"), Some(&FieldValue::Text("R".to_string())));
    assert_eq!(counter_value(&l_row, &["visits"]), 8);

    let l_rec = left.store.peek(&key).unwrap();
    let r_rec = right.store.peek(&key).unwrap();
    assert_eq!(l_rec.modification_time, r_rec.modification_time);
    assert_eq!(l_rec.region_id, r_rec.region_id);
}

#[test]
fn test_loser_merge_skips_write_when_nothing_changes() {
    let fx = Fixture::new();
    let key = fx.row_key(ACCOUNTS, &["a1"]);
    fx.exec(&Operation::PutResolve(resolve_op(&key, Some(account_row("new", &[(1, 5), (2, 3)])), 200, 1)));

    // Everything the older write counted is already reflected
    let result = fx.exec(&Operation::PutResolve(resolve_op(&key, Some(account_row("old", &[(2, 3)])), 100, 2)));

    assert!(!result.success());
    assert_eq!(result.write_kb, 0);
    assert_eq!(result.read_kb, 1);
}
