//! Tests for range scans
//!
//! These tests verify:
//! - TableIterate target filtering, direction, and resumption
//! - Batch termination by count and read budget
//! - Ancestor and child table expansion
//! - Plain MultiGet over the untyped keyspace
//! - MultiGetBatchTable across several parent keys
//! - MultiDeleteTable write budgets and tombstones

use atlastable::keyspace::KeyRange;
use atlastable::ops::{
    IterateResult, MultiDeleteTable, MultiGet, MultiGetBatchTable, MultiGetTable, Operation,
    TableIterate,
};
use atlastable::schema::TargetTables;
use atlastable::store::{Direction, RecordStore};
use atlastable::tracker::ExecContext;
use atlastable::Config;

use crate::common::*;

fn table_iterate(parent: Vec<u8>, targets: TargetTables, direction: Direction, batch_size: u32) -> TableIterate {
    TableIterate {
        parent_key: parent,
        sub_range: None,
        targets,
        direction,
        batch_size,
        max_read_kb: 0,
        resume_key: None,
        include_tombstones: false,
    }
}

fn keys(result: &IterateResult) -> Vec<Vec<u8>> {
    result.records.iter().map(|r| r.key.clone()).collect()
}

/// Run `iterate` batch by batch until the scan reports no more rows
fn iterate_all(fx: &Fixture, mut iterate: TableIterate) -> (Vec<Vec<u8>>, usize) {
    let mut all = Vec::new();
    let mut batches = 0;
    loop {
        let result = fx.exec(&Operation::TableIterate(iterate.clone()));
        let page = result.as_iterate().unwrap();
        all.extend(keys(page));
        batches += 1;
        if !page.more {
            assert!(page.resume_key.is_none());
            return (all, batches);
        }
        iterate.resume_key = page.resume_key.clone();
        assert!(iterate.resume_key.is_some());
    }
}

fn seed_users(fx: &Fixture) -> Vec<Vec<u8>> {
    let u1 = fx.put_user("u1", "ann", Some(30));
    let u2 = fx.put_user("u2", "bob", Some(20));
    fx.put_address("u2", "a1", "Oslo");
    let u3 = fx.put_user("u3", "cat", Some(40));
    let u4 = fx.put_user("u4", "dan", Some(20));
    vec![u1, u2, u3, u4]
}

// =============================================================================
// TableIterate
// =============================================================================

#[test]
fn test_table_iterate_returns_only_targets() {
    let fx = Fixture::new();
    let users = seed_users(&fx);
    fx.put_order("o1", 5);

    let op = table_iterate(table_prefix(USERS), TargetTables::single(USERS), Direction::Forward, 0);
    let result = fx.exec(&Operation::TableIterate(op));
    let page = result.as_iterate().unwrap();

    assert_eq!(keys(page), users);
    assert!(!page.more);
    assert!(page.resume_key.is_none());
    assert_eq!(result.read_kb, 4);
}

#[test]
fn test_table_iterate_resume_forward() {
    let fx = Fixture::new();
    let users = seed_users(&fx);

    let op = table_iterate(table_prefix(USERS), TargetTables::single(USERS), Direction::Forward, 2);
    let (all, batches) = iterate_all(&fx, op);

    assert_eq!(all, users);
    assert_eq!(batches, 3);
}

#[test]
fn test_table_iterate_resume_at_every_split() {
    let fx = Fixture::new();
    seed_users(&fx);

    for direction in [Direction::Forward, Direction::Reverse] {
        let whole = table_iterate(table_prefix(USERS), TargetTables::single(USERS), direction, 0);
        let (expected, batches) = iterate_all(&fx, whole);
        assert_eq!(batches, 1);
        assert_eq!(expected.len(), 4);

        for batch_size in 1..expected.len() as u32 {
            let op = table_iterate(table_prefix(USERS), TargetTables::single(USERS), direction, batch_size);
            let (all, _) = iterate_all(&fx, op);
            assert_eq!(all, expected, "{:?} with batch size {}", direction, batch_size);
        }
    }
}

#[test]
fn test_table_iterate_resume_reverse() {
    let fx = Fixture::new();
    let mut users = seed_users(&fx);
    users.reverse();

    let op = table_iterate(table_prefix(USERS), TargetTables::single(USERS), Direction::Reverse, 3);
    let (all, _) = iterate_all(&fx, op);

    assert_eq!(all, users);
}

#[test]
fn test_table_iterate_read_budget() {
    let fx = Fixture::new();
    let users = seed_users(&fx);

    let mut op = table_iterate(table_prefix(USERS), TargetTables::single(USERS), Direction::Forward, 10);
    op.max_read_kb = 2;
    let result = fx.exec(&Operation::TableIterate(op));
    let page = result.as_iterate().unwrap();

    assert_eq!(keys(page), users[..2].to_vec());
    assert!(page.more);
    assert_eq!(page.resume_key.as_ref(), Some(&users[1]));
}

#[test]
fn test_table_keys_iterate() {
    let fx = Fixture::new();
    seed_users(&fx);
    let big = user_row(&"x".repeat(4000), None);
    let key = fx.row_key(USERS, &["u5"]);
    fx.exec(&put_row(USERS, &key, big));

    let op = table_iterate(table_prefix(USERS), TargetTables::single(USERS), Direction::Forward, 0);
    let result = fx.exec(&Operation::TableKeysIterate(op));
    let page = result.as_iterate().unwrap();

    assert_eq!(page.records.len(), 5);
    assert!(page.records.iter().all(|r| r.value.is_none() && r.version.is_some()));
    // Keys only: the floor per key, whatever the row size
    assert_eq!(result.read_kb, 5);
}

#[test]
fn test_table_iterate_stops_at_hierarchy_end() {
    let fx = Fixture::new();
    fx.put_user("u1", "ann", None);
    fx.put_user("u2", "bob", None);
    let account = fx.row_key(ACCOUNTS, &["a1"]);
    fx.exec(&put_row(ACCOUNTS, &account, account_row("acc", &[])));

    // Whole keyspace: the accounts row sorts right after the users
    let op = table_iterate(Vec::new(), TargetTables::single(USERS), Direction::Forward, 0);
    let result = fx.exec(&Operation::TableIterate(op));
    let page = result.as_iterate().unwrap();

    assert_eq!(page.records.len(), 2);
    assert!(!page.more);
    // two rows plus the floor for the row that ended the scan
    assert_eq!(result.read_kb, 3);
}

#[test]
fn test_table_iterate_empty_range_charges_floor() {
    let fx = Fixture::new();

    let op = table_iterate(table_prefix(USERS), TargetTables::single(USERS), Direction::Forward, 0);
    let result = fx.exec(&Operation::TableIterate(op));

    assert!(result.as_iterate().unwrap().records.is_empty());
    assert_eq!(result.read_kb, 1);
}

#[test]
fn test_table_iterate_sub_range() {
    let fx = Fixture::new();
    let users = seed_users(&fx);

    let mut op = table_iterate(table_prefix(USERS), TargetTables::single(USERS), Direction::Forward, 0);
    op.sub_range = Some(KeyRange::inclusive(b"u2".to_vec(), b"u3".to_vec()));
    let result = fx.exec(&Operation::TableIterate(op));

    assert_eq!(keys(result.as_iterate().unwrap()), users[1..3].to_vec());
}

// =============================================================================
// Hierarchies
// =============================================================================

#[test]
fn test_multi_get_table_with_ancestor() {
    let fx = Fixture::new();
    let u1 = fx.put_user("u1", "ann", None);
    let a1 = fx.put_address("u1", "a1", "Oslo");
    let a2 = fx.put_address("u1", "a2", "Rome");
    fx.put_address("u2", "a1", "Lima");

    let op = Operation::MultiGetTable(MultiGetTable {
        parent_key: u1.clone(),
        sub_range: None,
        targets: TargetTables::single(ADDRESSES).with_ancestor(USERS),
        include_tombstones: false,
    });
    let result = fx.exec(&op);

    // The ancestor row comes once, ahead of its first descendant
    assert_eq!(keys(result.as_iterate().unwrap()), vec![u1, a1, a2]);
}

#[test]
fn test_table_iterate_with_child_targets() {
    let fx = Fixture::new();
    let u1 = fx.put_user("u1", "ann", None);
    let a1 = fx.put_address("u1", "a1", "Oslo");
    let u2 = fx.put_user("u2", "bob", None);

    let op = table_iterate(
        table_prefix(USERS),
        TargetTables::single(USERS).with_child(ADDRESSES),
        Direction::Forward,
        0,
    );
    let result = fx.exec(&Operation::TableIterate(op));

    assert_eq!(keys(result.as_iterate().unwrap()), vec![u1, a1, u2]);
}

#[test]
fn test_ancestor_emitted_again_in_next_batch() {
    let fx = Fixture::new();
    let u1 = fx.put_user("u1", "ann", None);
    let a1 = fx.put_address("u1", "a1", "Oslo");
    let a2 = fx.put_address("u1", "a2", "Rome");

    let op = table_iterate(
        table_prefix(USERS),
        TargetTables::single(ADDRESSES).with_ancestor(USERS),
        Direction::Forward,
        1,
    );
    let first = fx.exec(&Operation::TableIterate(op.clone()));
    let page = first.as_iterate().unwrap();
    assert_eq!(keys(page), vec![u1.clone(), a1]);

    let mut next = op;
    next.resume_key = page.resume_key.clone();
    let second = fx.exec(&Operation::TableIterate(next));
    assert_eq!(keys(second.as_iterate().unwrap()), vec![u1, a2]);
}

// =============================================================================
// Plain MultiGet
// =============================================================================

fn seed_plain(fx: &Fixture) {
    for parts in [["a", "1"], ["a", "2"], ["a", "3"], ["b", "1"]] {
        let key = plain_key(&parts);
        fx.exec(&put(&key, format!("{}{}", parts[0], parts[1]).into_bytes()));
    }
}

#[test]
fn test_multi_get_under_parent() {
    let fx = Fixture::new();
    seed_plain(&fx);

    let op = Operation::MultiGet(MultiGet {
        parent_key: plain_key(&["a"]),
        ..MultiGet::default()
    });
    let result = fx.exec(&op);
    let page = result.as_iterate().unwrap();

    assert_eq!(
        keys(page),
        vec![plain_key(&["a", "1"]), plain_key(&["a", "2"]), plain_key(&["a", "3"])]
    );
    assert!(!page.more);
    assert_eq!(result.read_kb, 3);
}

#[test]
fn test_multi_get_sub_range() {
    let fx = Fixture::new();
    seed_plain(&fx);

    let op = Operation::MultiGetKeys(MultiGet {
        parent_key: plain_key(&["a"]),
        sub_range: Some(KeyRange::from(b"1".to_vec(), false)),
        include_tombstones: false,
    });
    let result = fx.exec(&op);
    let page = result.as_iterate().unwrap();

    assert_eq!(keys(page), vec![plain_key(&["a", "2"]), plain_key(&["a", "3"])]);
    assert!(page.records.iter().all(|r| r.value.is_none()));
}

#[test]
fn test_multi_get_holds_read_locks() {
    let fx = Fixture::new();
    for id in ["1", "2", "3"] {
        fx.exec(&put(&plain_key(&["a", id]), b"v".to_vec()));
    }

    let op = Operation::MultiGet(MultiGet {
        parent_key: plain_key(&["a"]),
        ..MultiGet::default()
    });
    let txn = fx.store.begin_transaction();
    let mut ctx = ExecContext::new().with_time_ms(NOW);
    fx.handler.execute(&op, &mut ctx, &txn, &fx.partition).unwrap();

    assert_eq!(txn.held_read_locks(), 3);
    txn.commit();
}

#[test]
fn test_multi_get_table_holds_no_locks() {
    let fx = Fixture::new();
    let u1 = fx.put_user("u1", "ann", None);

    let op = Operation::MultiGetTable(MultiGetTable {
        parent_key: u1,
        sub_range: None,
        targets: TargetTables::single(USERS),
        include_tombstones: false,
    });
    let txn = fx.store.begin_transaction();
    let mut ctx = ExecContext::new().with_time_ms(NOW);
    fx.handler.execute(&op, &mut ctx, &txn, &fx.partition).unwrap();

    assert_eq!(txn.held_read_locks(), 0);
    txn.commit();
}

// =============================================================================
// MultiGetBatchTable
// =============================================================================

#[test]
fn test_bulk_get_shares_batch_size() {
    let fx = Fixture::new();
    let u1 = fx.put_user("u1", "ann", None);
    let a1 = fx.put_address("u1", "a1", "Oslo");
    let a2 = fx.put_address("u1", "a2", "Rome");
    let u2 = fx.put_user("u2", "bob", None);
    let u3 = fx.put_user("u3", "cat", None);

    let mut op = MultiGetBatchTable {
        parent_keys: vec![u1.clone(), u2.clone(), u3.clone()],
        sub_range: None,
        targets: TargetTables::single(USERS).with_child(ADDRESSES),
        batch_size: 4,
        max_read_kb: 0,
        resume_key: None,
        include_tombstones: false,
    };
    let first = fx.exec(&Operation::MultiGetBatchTable(op.clone()));
    let bulk = first.as_bulk_get().unwrap();

    assert!(bulk.more);
    assert_eq!(bulk.batches.len(), 2);
    assert_eq!(bulk.batches[0].key_index, 0);
    assert_eq!(
        bulk.batches[0].records.iter().map(|r| r.key.clone()).collect::<Vec<_>>(),
        vec![u1, a1, a2]
    );
    assert_eq!(bulk.batches[1].key_index, 1);
    assert_eq!(bulk.resume_parent_index, 1);
    assert_eq!(bulk.resume_key.as_ref(), Some(&u2));

    // Follow-up starts at the parent key the batch stopped in
    op.parent_keys = vec![u2.clone(), u3.clone()];
    op.resume_key = bulk.resume_key.clone();
    let second = fx.exec(&Operation::MultiGetBatchTable(op));
    let bulk = second.as_bulk_get().unwrap();

    assert!(!bulk.more);
    assert!(bulk.resume_key.is_none());
    assert_eq!(bulk.batches.len(), 1);
    assert_eq!(bulk.batches[0].key_index, 1);
    assert_eq!(bulk.batches[0].records[0].key, u3);
}

#[test]
fn test_bulk_get_unlimited_batch_spans_all_parents() {
    let fx = Fixture::with_config(Config::builder().default_batch_size(0).build());
    let u1 = fx.put_user("u1", "ann", None);
    let u2 = fx.put_user("u2", "bob", None);

    let result = fx.exec(&Operation::MultiGetBatchTable(MultiGetBatchTable {
        parent_keys: vec![u1.clone(), u2.clone()],
        sub_range: None,
        targets: TargetTables::single(USERS),
        batch_size: 0,
        max_read_kb: 0,
        resume_key: None,
        include_tombstones: false,
    }));
    let bulk = result.as_bulk_get().unwrap();

    assert!(!bulk.more);
    assert_eq!(bulk.batches.len(), 2);
    assert_eq!(bulk.batches[0].records[0].key, u1);
    assert_eq!(bulk.batches[1].records[0].key, u2);
}

#[test]
fn test_bulk_get_keys_only() {
    let fx = Fixture::new();
    let u1 = fx.put_user("u1", "ann", None);
    let u2 = fx.put_user("u2", "bob", None);

    let op = Operation::MultiGetBatchTableKeys(MultiGetBatchTable {
        parent_keys: vec![u1, u2],
        sub_range: None,
        targets: TargetTables::single(USERS),
        batch_size: 0,
        max_read_kb: 0,
        resume_key: None,
        include_tombstones: false,
    });
    let result = fx.exec(&op);
    let bulk = result.as_bulk_get().unwrap();

    assert!(!bulk.more);
    assert_eq!(bulk.batches.len(), 2);
    assert!(bulk
        .batches
        .iter()
        .flat_map(|b| &b.records)
        .all(|r| r.value.is_none()));
}

// =============================================================================
// MultiDeleteTable
// =============================================================================

fn multi_delete(parent: Vec<u8>, table: u64, max_write_kb: u32) -> MultiDeleteTable {
    MultiDeleteTable {
        parent_key: parent,
        sub_range: None,
        targets: TargetTables::single(table),
        max_write_kb,
        resume_key: None,
        do_tombstone: false,
    }
}

#[test]
fn test_multi_delete_write_budget() {
    let fx = Fixture::new();
    let orders: Vec<_> = ["o1", "o2", "o3"].iter().map(|id| fx.put_order(id, 1)).collect();

    let mut op = multi_delete(table_prefix(ORDERS), ORDERS, 2);
    let first = fx.exec(&Operation::MultiDeleteTable(op.clone()));
    let deleted = first.as_multi_delete().unwrap();

    assert_eq!(deleted.num_deleted, 2);
    assert!(deleted.more);
    assert_eq!(deleted.resume_key.as_ref(), Some(&orders[1]));
    assert_eq!(first.read_kb, 2);
    assert_eq!(first.write_kb, 2);
    assert_eq!(fx.store.len(), 1);

    op.resume_key = deleted.resume_key.clone();
    let second = fx.exec(&Operation::MultiDeleteTable(op));
    let deleted = second.as_multi_delete().unwrap();

    assert_eq!(deleted.num_deleted, 1);
    assert!(!deleted.more);
    assert!(fx.store.is_empty());
}

#[test]
fn test_multi_delete_leaves_other_tables() {
    let fx = Fixture::new();
    let u1 = fx.put_user("u1", "ann", None);
    fx.put_address("u1", "a1", "Oslo");
    fx.put_address("u1", "a2", "Rome");

    let result = fx.exec(&Operation::MultiDeleteTable(multi_delete(u1.clone(), ADDRESSES, 0)));

    assert_eq!(result.as_multi_delete().unwrap().num_deleted, 2);
    assert_eq!(fx.store.len(), 1);
    assert!(fx.store.peek(&u1).is_some());
}

#[test]
fn test_multi_delete_on_mr_table_writes_tombstones() {
    let fx = Fixture::new();
    for id in ["a1", "a2"] {
        let key = fx.row_key(ACCOUNTS, &[id]);
        fx.exec(&put_row(ACCOUNTS, &key, account_row(id, &[(1, 1)])));
    }

    let result = fx.exec(&Operation::MultiDeleteTable(multi_delete(table_prefix(ACCOUNTS), ACCOUNTS, 0)));

    assert_eq!(result.as_multi_delete().unwrap().num_deleted, 2);
    assert_eq!(fx.store.len(), 2);
    assert_eq!(fx.store.tombstone_count(), 2);

    // Tombstones are not deleted twice
    let again = fx.exec(&Operation::MultiDeleteTable(multi_delete(table_prefix(ACCOUNTS), ACCOUNTS, 0)));
    assert_eq!(again.as_multi_delete().unwrap().num_deleted, 0);
    assert_eq!(again.write_kb, 0);
}

#[test]
fn test_multi_delete_requested_tombstones() {
    let fx = Fixture::new();
    fx.put_order("o1", 1);

    let mut op = multi_delete(table_prefix(ORDERS), ORDERS, 0);
    op.do_tombstone = true;
    fx.exec(&Operation::MultiDeleteTable(op));

    assert_eq!(fx.store.tombstone_count(), 1);
}
