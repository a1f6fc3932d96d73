//! Tests for MemStore and its cursors
//!
//! These tests verify:
//! - Put policies and record metadata
//! - Expiration visibility
//! - Seek / advance ordering in both directions
//! - Read lock retention per isolation level
//! - Secondary index maintenance

use std::sync::Arc;

use atlastable::schema::{Catalog, TableSchema};
use atlastable::store::{
    CursorConfig, Direction, Isolation, MemStore, PutOutcome, PutPolicy, RecordStore, StoredRecord,
    WriteOptions,
};
use atlastable::value::{FieldValue, Row};
use atlastable::version::Version;
use atlastable::AtlasError;

const NOW: u64 = 1_000_000;

// =============================================================================
// Helpers
// =============================================================================

fn config() -> CursorConfig {
    CursorConfig {
        isolation: Isolation::ReadCommitted,
        now_ms: NOW,
    }
}

fn opts() -> WriteOptions {
    WriteOptions {
        modification_time: NOW,
        ..WriteOptions::default()
    }
}

fn write(store: &MemStore, key: &[u8], value: &[u8], policy: PutPolicy, options: &WriteOptions) -> PutOutcome {
    let txn = store.begin_transaction();
    let mut cursor = store.open_cursor(&txn, config()).unwrap();
    let outcome = cursor.put(key, value, policy, options).unwrap();
    drop(cursor);
    txn.commit();
    outcome
}

fn insert(store: &MemStore, key: &[u8], value: &[u8]) -> Version {
    match write(store, key, value, PutPolicy::Overwrite, &opts()) {
        PutOutcome::Written { version, .. } => version,
        PutOutcome::KeyExists => panic!("Overwrite reported KeyExists"),
    }
}

fn search(store: &MemStore, key: &[u8], now_ms: u64) -> Option<StoredRecord> {
    let txn = store.begin_transaction();
    let mut cursor = store
        .open_cursor(&txn, CursorConfig { now_ms, ..config() })
        .unwrap();
    cursor.search(key).unwrap()
}

fn seeded() -> MemStore {
    let store = MemStore::default();
    for key in ["a", "c", "e", "g"] {
        insert(&store, key.as_bytes(), b"v");
    }
    store
}

fn scan(store: &MemStore, start: Option<&[u8]>, direction: Direction, inclusive: bool) -> Vec<String> {
    let txn = store.begin_transaction();
    let mut cursor = store.open_cursor(&txn, config()).unwrap();
    let mut out = Vec::new();
    let mut next = cursor.seek(start, direction, inclusive).unwrap();
    while let Some((key, _)) = next {
        out.push(String::from_utf8(key).unwrap());
        next = cursor.advance(direction).unwrap();
    }
    out
}

// =============================================================================
// Put Policies
// =============================================================================

#[test]
fn test_no_overwrite_reports_existing_key() {
    let store = MemStore::default();
    insert(&store, b"k", b"v1");

    let outcome = write(&store, b"k", b"v2", PutPolicy::NoOverwrite, &opts());

    assert_eq!(outcome, PutOutcome::KeyExists);
    assert_eq!(store.peek(b"k").unwrap().value.as_ref(), b"v1");
}

#[test]
fn test_no_overwrite_sees_tombstones() {
    let store = MemStore::default();
    let tombstone = WriteOptions {
        tombstone: true,
        ..opts()
    };
    write(&store, b"k", b"", PutPolicy::Overwrite, &tombstone);

    assert_eq!(
        write(&store, b"k", b"v", PutPolicy::NoOverwrite, &opts()),
        PutOutcome::KeyExists
    );
    assert_eq!(store.tombstone_count(), 1);
}

#[test]
fn test_no_overwrite_replaces_expired_record() {
    let store = MemStore::default();
    let expiring = WriteOptions {
        expiration_time: NOW - 1,
        ..opts()
    };
    write(&store, b"k", b"old", PutPolicy::Overwrite, &expiring);

    let outcome = write(&store, b"k", b"new", PutPolicy::NoOverwrite, &opts());

    assert!(matches!(outcome, PutOutcome::Written { .. }));
    assert_eq!(store.peek(b"k").unwrap().value.as_ref(), b"new");
}

#[test]
fn test_current_policy_requires_position() {
    let store = MemStore::default();
    insert(&store, b"k", b"v");
    let txn = store.begin_transaction();
    let mut cursor = store.open_cursor(&txn, config()).unwrap();

    let err = cursor.put(b"k", b"v2", PutPolicy::Current, &opts()).unwrap_err();
    assert!(matches!(err, AtlasError::Storage(_)));

    cursor.search(b"k").unwrap();
    assert!(cursor.put(b"k", b"v2", PutPolicy::Current, &opts()).is_ok());
}

#[test]
fn test_delete_requires_position() {
    let store = MemStore::default();
    let txn = store.begin_transaction();
    let mut cursor = store.open_cursor(&txn, config()).unwrap();

    assert!(matches!(cursor.delete(), Err(AtlasError::Storage(_))));
    assert!(matches!(cursor.storage_size(), Err(AtlasError::Storage(_))));
    assert_eq!(cursor.current_version(), None);
}

#[test]
fn test_delete_reports_size() {
    let store = MemStore::default();
    insert(&store, b"key", b"value");
    let txn = store.begin_transaction();
    let mut cursor = store.open_cursor(&txn, config()).unwrap();
    cursor.search(b"key").unwrap();

    assert_eq!(cursor.storage_size().unwrap(), 8);
    assert_eq!(cursor.delete().unwrap().storage_size, 8);
    assert!(store.is_empty());
}

// =============================================================================
// Record Metadata
// =============================================================================

#[test]
fn test_versions_are_distinct_writes() {
    let store = MemStore::new(4, 2);
    let v1 = insert(&store, b"k", b"one");
    let v2 = insert(&store, b"k", b"two");

    assert_eq!(v1.shard_id, 4);
    assert!(v2.seq > v1.seq);
    assert!(!v1.same_write(&v2));
    assert!(v2.same_write(&store.peek(b"k").unwrap().version));
}

#[test]
fn test_overwrite_keeps_creation_time() {
    let store = MemStore::default();
    insert(&store, b"k", b"v1");

    let later = WriteOptions {
        modification_time: NOW + 500,
        ..opts()
    };
    write(&store, b"k", b"v2", PutPolicy::Overwrite, &later);

    let record = store.peek(b"k").unwrap();
    assert_eq!(record.creation_time, NOW);
    assert_eq!(record.modification_time, NOW + 500);
}

#[test]
fn test_write_over_tombstone_starts_new_lifetime() {
    let store = MemStore::default();
    let tombstone = WriteOptions {
        tombstone: true,
        ..opts()
    };
    write(&store, b"k", b"", PutPolicy::Overwrite, &tombstone);

    let later = WriteOptions {
        modification_time: NOW + 500,
        ..opts()
    };
    write(&store, b"k", b"v", PutPolicy::Overwrite, &later);

    let record = store.peek(b"k").unwrap();
    assert!(!record.tombstone);
    assert_eq!(record.creation_time, NOW + 500);
}

#[test]
fn test_keep_expiration() {
    let store = MemStore::default();
    let expiring = WriteOptions {
        expiration_time: NOW + 10_000,
        ..opts()
    };
    write(&store, b"k", b"v1", PutPolicy::Overwrite, &expiring);

    let keep = WriteOptions {
        keep_expiration: true,
        expiration_time: 42,
        ..opts()
    };
    write(&store, b"k", b"v2", PutPolicy::Overwrite, &keep);

    assert_eq!(store.peek(b"k").unwrap().expiration_time, NOW + 10_000);
}

#[test]
fn test_expired_records_are_invisible() {
    let store = MemStore::default();
    let expiring = WriteOptions {
        expiration_time: NOW + 100,
        ..opts()
    };
    write(&store, b"k", b"v", PutPolicy::Overwrite, &expiring);

    assert!(search(&store, b"k", NOW + 99).is_some());
    // Expiration is inclusive
    assert!(search(&store, b"k", NOW + 100).is_none());
    // Still physically present
    assert!(store.peek(b"k").is_some());
}

// =============================================================================
// Ordering
// =============================================================================

#[test]
fn test_seek_forward() {
    let store = seeded();

    assert_eq!(scan(&store, None, Direction::Forward, true), ["a", "c", "e", "g"]);
    assert_eq!(scan(&store, Some(b"c"), Direction::Forward, true), ["c", "e", "g"]);
    assert_eq!(scan(&store, Some(b"c"), Direction::Forward, false), ["e", "g"]);
    assert_eq!(scan(&store, Some(b"d"), Direction::Forward, false), ["e", "g"]);
}

#[test]
fn test_seek_reverse() {
    let store = seeded();

    assert_eq!(scan(&store, None, Direction::Reverse, true), ["g", "e", "c", "a"]);
    assert_eq!(scan(&store, Some(b"e"), Direction::Reverse, true), ["e", "c", "a"]);
    assert_eq!(scan(&store, Some(b"e"), Direction::Reverse, false), ["c", "a"]);
}

#[test]
fn test_seek_skips_expired() {
    let store = seeded();
    let expired = WriteOptions {
        expiration_time: NOW,
        ..opts()
    };
    write(&store, b"c", b"v", PutPolicy::Overwrite, &expired);

    assert_eq!(scan(&store, None, Direction::Forward, true), ["a", "e", "g"]);
}

#[test]
fn test_seek_past_end() {
    let store = seeded();

    assert!(scan(&store, Some(b"h"), Direction::Forward, true).is_empty());
    assert!(scan(&store, Some(b"a"), Direction::Reverse, false).is_empty());
}

// =============================================================================
// Isolation
// =============================================================================

#[test]
fn test_repeatable_read_holds_locks() {
    let store = seeded();
    let txn = store.begin_transaction();
    {
        let mut cursor = store
            .open_cursor(
                &txn,
                CursorConfig {
                    isolation: Isolation::RepeatableRead,
                    now_ms: NOW,
                },
            )
            .unwrap();
        cursor.search(b"a").unwrap();
        cursor.seek(Some(b"e"), Direction::Forward, true).unwrap();
        cursor.search(b"missing").unwrap();
    }

    assert_eq!(txn.held_read_locks(), 2);
}

#[test]
fn test_read_committed_releases_locks() {
    let store = seeded();
    let txn = store.begin_transaction();
    {
        let mut cursor = store.open_cursor(&txn, config()).unwrap();
        cursor.seek(None, Direction::Forward, true).unwrap();
        cursor.advance(Direction::Forward).unwrap();
    }

    assert_eq!(txn.held_read_locks(), 0);
}

#[test]
fn test_transactions_get_distinct_ids() {
    let store = MemStore::default();

    let a = store.begin_transaction();
    let b = store.begin_transaction();

    assert_ne!(a.id(), b.id());
}

// =============================================================================
// Indexes
// =============================================================================

fn users_with_index() -> (Catalog, Arc<atlastable::schema::TableSchema>) {
    let catalog = Catalog::new();
    let users = catalog
        .add_table(TableSchema::new(1, "users").index("by_age", &["age"]))
        .unwrap();
    (catalog, users)
}

fn user(age: i64) -> Vec<u8> {
    Row::new(1)
        .with("age", FieldValue::Integer(age))
        .encode()
        .unwrap()
}

fn index_primaries(store: &MemStore, direction: Direction) -> Vec<Vec<u8>> {
    let txn = store.begin_transaction();
    let mut cursor = store.open_index_cursor(&txn, 1, "by_age", config()).unwrap();
    let mut out = Vec::new();
    let mut next = cursor.seek_secondary(None, direction, true).unwrap();
    while let Some(entry) = next {
        out.push(entry.primary);
        next = cursor.advance(direction).unwrap();
    }
    out
}

#[test]
fn test_register_indexes_backfills_existing_rows() {
    let store = MemStore::default();
    let (_catalog, users) = users_with_index();
    let old = users.row_key(&["old"]).unwrap().to_bytes();
    let young = users.row_key(&["young"]).unwrap().to_bytes();
    insert(&store, &old, &user(70));
    insert(&store, &young, &user(-5));

    store.register_indexes(&users);

    // Negative values sort first
    assert_eq!(index_primaries(&store, Direction::Forward), [young.clone(), old.clone()]);
    assert_eq!(index_primaries(&store, Direction::Reverse), [old, young]);
}

#[test]
fn test_index_counts_writes() {
    let store = MemStore::default();
    let (_catalog, users) = users_with_index();
    store.register_indexes(&users);
    let key = users.row_key(&["u1"]).unwrap().to_bytes();

    let index_writes = |outcome: PutOutcome| match outcome {
        PutOutcome::Written { index_writes, .. } => index_writes,
        PutOutcome::KeyExists => panic!("unexpected KeyExists"),
    };

    assert_eq!(index_writes(write(&store, &key, &user(30), PutPolicy::Overwrite, &opts())), 1);
    // Unchanged secondary key
    assert_eq!(index_writes(write(&store, &key, &user(30), PutPolicy::Overwrite, &opts())), 0);
    // Remove + insert
    assert_eq!(index_writes(write(&store, &key, &user(31), PutPolicy::Overwrite, &opts())), 2);
}

#[test]
fn test_index_skips_foreign_keys_and_tombstones() {
    let store = MemStore::default();
    let (_catalog, users) = users_with_index();
    store.register_indexes(&users);

    insert(&store, b"not-a-row-key", &user(1));
    let key = users.row_key(&["u1"]).unwrap().to_bytes();
    let tombstone = WriteOptions {
        tombstone: true,
        ..opts()
    };
    write(&store, &key, &user(2), PutPolicy::Overwrite, &tombstone);

    assert!(index_primaries(&store, Direction::Forward).is_empty());
}

#[test]
fn test_unknown_index() {
    let store = MemStore::default();
    let txn = store.begin_transaction();

    let err = store.open_index_cursor(&txn, 1, "by_name", config()).err().unwrap();

    assert!(matches!(err, AtlasError::IndexNotFound { table_id: 1, .. }));
}
