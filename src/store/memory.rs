//! In-memory record store
//!
//! BTreeMap-based store with RwLock for concurrency.
//!
//! ## Concurrency
//! - `data`: RwLock (many concurrent readers, exclusive writer)
//! - `indexes`: RwLock, always taken after `data`
//! - sequence and position counters: atomics

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{AtlasError, Result};
use crate::schema::{TableId, TableSchema};
use crate::version::Version;

use super::index::{MemIndex, MemIndexCursor};
use super::{
    CursorConfig, DeleteOutcome, Direction, IndexCursor, Isolation, PutOutcome, PutPolicy,
    RecordCursor, RecordStore, StoredRecord, Transaction, WriteOptions,
};

/// Fixed log overhead added to each position token step
const LOG_ENTRY_OVERHEAD: u64 = 32;

/// In-memory transactional record store
pub struct MemStore {
    shard_id: u32,
    node_id: u32,

    /// Primary records, ordered by key bytes
    data: RwLock<BTreeMap<Vec<u8>, StoredRecord>>,

    /// Secondary indexes
    indexes: RwLock<Vec<MemIndex>>,

    next_seq: AtomicU64,
    next_position: AtomicU64,
    next_txn: AtomicU64,
}

impl MemStore {
    pub fn new(shard_id: u32, node_id: u32) -> Self {
        Self {
            shard_id,
            node_id,
            data: RwLock::new(BTreeMap::new()),
            indexes: RwLock::new(Vec::new()),
            next_seq: AtomicU64::new(1),
            next_position: AtomicU64::new(1),
            next_txn: AtomicU64::new(1),
        }
    }

    pub fn shard_id(&self) -> u32 {
        self.shard_id
    }

    /// Create every index declared by `table`, back-filling existing rows
    pub fn register_indexes(&self, table: &Arc<TableSchema>) {
        let data = self.data.read();
        let mut indexes = self.indexes.write();
        for def in &table.indexes {
            let mut index = MemIndex::new(Arc::clone(table), def.name.clone());
            for (key, record) in data.iter() {
                index.update(key, None, Some(record));
            }
            tracing::debug!(
                "Registered index {} on table {} ({} entries)",
                def.name,
                table.id,
                index.entries.len()
            );
            indexes.push(index);
        }
    }

    /// Raw record lookup, ignoring expiration (tests and tools)
    pub fn peek(&self, key: &[u8]) -> Option<StoredRecord> {
        self.data.read().get(key).cloned()
    }

    /// Number of stored records, tombstones included
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    /// Number of stored tombstones
    pub fn tombstone_count(&self) -> usize {
        self.data.read().values().filter(|r| r.tombstone).count()
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn next_version(&self, size: usize) -> Version {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        let position = self
            .next_position
            .fetch_add(size as u64 + LOG_ENTRY_OVERHEAD, Ordering::SeqCst);
        Version::new(self.shard_id, seq, self.node_id, Some(position))
    }

    fn update_indexes(&self, key: &[u8], old: Option<&StoredRecord>, new: Option<&StoredRecord>) -> u32 {
        let mut indexes = self.indexes.write();
        indexes.iter_mut().map(|idx| idx.update(key, old, new)).sum()
    }

    pub(super) fn with_index<T>(&self, slot: usize, f: impl FnOnce(&MemIndex) -> Option<T>) -> Option<T> {
        let indexes = self.indexes.read();
        indexes.get(slot).and_then(f)
    }
}

impl Default for MemStore {
    fn default() -> Self {
        Self::new(1, 1)
    }
}

impl RecordStore for MemStore {
    fn begin_transaction(&self) -> Transaction {
        Transaction::new(self.next_txn.fetch_add(1, Ordering::SeqCst))
    }

    fn open_cursor<'a>(
        &'a self,
        txn: &'a Transaction,
        config: CursorConfig,
    ) -> Result<Box<dyn RecordCursor + 'a>> {
        Ok(Box::new(MemCursor {
            store: self,
            txn,
            config,
            current: None,
            read_keys: Vec::new(),
        }))
    }

    fn open_index_cursor<'a>(
        &'a self,
        _txn: &'a Transaction,
        table_id: TableId,
        index: &str,
        _config: CursorConfig,
    ) -> Result<Box<dyn IndexCursor + 'a>> {
        let slot = self
            .indexes
            .read()
            .iter()
            .position(|idx| idx.table.id == table_id && idx.name == index)
            .ok_or_else(|| AtlasError::IndexNotFound {
                table_id,
                index: index.to_string(),
            })?;
        Ok(Box::new(MemIndexCursor {
            store: self,
            slot,
            current: None,
        }))
    }
}

// =============================================================================
// Cursor
// =============================================================================

struct MemCursor<'a> {
    store: &'a MemStore,
    txn: &'a Transaction,
    config: CursorConfig,
    /// Key the cursor is positioned on
    current: Option<Vec<u8>>,
    /// Keys read through this cursor (read locks)
    read_keys: Vec<Vec<u8>>,
}

impl<'a> MemCursor<'a> {
    fn visible(&self, record: &StoredRecord) -> bool {
        !record.is_expired(self.config.now_ms)
    }

    fn positioned(&mut self, found: Option<(Vec<u8>, StoredRecord)>) -> Option<(Vec<u8>, StoredRecord)> {
        if let Some((key, _)) = &found {
            self.current = Some(key.clone());
            self.read_keys.push(key.clone());
        }
        found
    }

    fn current_key(&self) -> Result<&[u8]> {
        self.current
            .as_deref()
            .ok_or_else(|| AtlasError::Storage("Cursor is not positioned".to_string()))
    }
}

impl<'a> RecordCursor for MemCursor<'a> {
    fn search(&mut self, key: &[u8]) -> Result<Option<StoredRecord>> {
        let found = {
            let data = self.store.data.read();
            data.get(key).filter(|r| self.visible(r)).cloned()
        };
        match found {
            Some(record) => {
                self.current = Some(key.to_vec());
                self.read_keys.push(key.to_vec());
                Ok(Some(record))
            }
            None => {
                self.current = None;
                Ok(None)
            }
        }
    }

    fn seek(
        &mut self,
        key: Option<&[u8]>,
        direction: Direction,
        inclusive: bool,
    ) -> Result<Option<(Vec<u8>, StoredRecord)>> {
        let found = {
            let data = self.store.data.read();
            let mut range: Box<dyn Iterator<Item = (&Vec<u8>, &StoredRecord)>> = match (direction, key) {
                (Direction::Forward, None) => Box::new(data.iter()),
                (Direction::Reverse, None) => Box::new(data.iter().rev()),
                (Direction::Forward, Some(k)) => {
                    Box::new(data.range::<[u8], _>((bound(k, inclusive), Bound::Unbounded)))
                }
                (Direction::Reverse, Some(k)) => {
                    Box::new(data.range::<[u8], _>((Bound::Unbounded, bound(k, inclusive))).rev())
                }
            };
            range
                .find(|(_, r)| self.visible(r))
                .map(|(k, r)| (k.clone(), r.clone()))
        };
        Ok(self.positioned(found))
    }

    fn advance(&mut self, direction: Direction) -> Result<Option<(Vec<u8>, StoredRecord)>> {
        match self.current.clone() {
            Some(key) => self.seek(Some(&key), direction, false),
            None => Ok(None),
        }
    }

    fn put(
        &mut self,
        key: &[u8],
        value: &[u8],
        policy: PutPolicy,
        options: &WriteOptions,
    ) -> Result<PutOutcome> {
        if policy == PutPolicy::Current && self.current.as_deref() != Some(key) {
            return Err(AtlasError::Storage(
                "Put with Current policy requires a cursor positioned on the key".to_string(),
            ));
        }

        let mut data = self.store.data.write();
        let existing = data
            .get(key)
            .filter(|r| !r.is_expired(self.config.now_ms))
            .cloned();

        if policy == PutPolicy::NoOverwrite && existing.is_some() {
            return Ok(PutOutcome::KeyExists);
        }

        let version = self.store.next_version(key.len() + value.len());
        let live_existing = existing.as_ref().filter(|r| !r.tombstone);
        let creation_time = options
            .creation_time
            .or_else(|| live_existing.map(|r| r.creation_time))
            .unwrap_or(options.modification_time);
        let expiration_time = if options.keep_expiration {
            existing.as_ref().map_or(0, |r| r.expiration_time)
        } else {
            options.expiration_time
        };

        let record = StoredRecord {
            value: bytes::Bytes::copy_from_slice(value),
            version,
            creation_time,
            modification_time: options.modification_time,
            expiration_time,
            region_id: options.region_id,
            tombstone: options.tombstone,
        };
        let storage_size = record.storage_size(key.len());
        let index_writes = self
            .store
            .update_indexes(key, existing.as_ref(), Some(&record));
        data.insert(key.to_vec(), record);
        drop(data);

        self.current = Some(key.to_vec());
        Ok(PutOutcome::Written {
            version,
            storage_size,
            index_writes,
        })
    }

    fn delete(&mut self) -> Result<DeleteOutcome> {
        let key = self.current_key()?.to_vec();
        let mut data = self.store.data.write();
        let removed = data
            .remove(&key)
            .ok_or_else(|| AtlasError::Storage("Record under cursor vanished".to_string()))?;
        let index_writes = self.store.update_indexes(&key, Some(&removed), None);
        Ok(DeleteOutcome {
            storage_size: removed.storage_size(key.len()),
            index_writes,
        })
    }

    fn storage_size(&self) -> Result<usize> {
        let key = self.current_key()?;
        let data = self.store.data.read();
        data.get(key)
            .map(|r| r.storage_size(key.len()))
            .ok_or_else(|| AtlasError::Storage("Record under cursor vanished".to_string()))
    }

    fn current_version(&self) -> Option<Version> {
        let key = self.current.as_deref()?;
        self.store.data.read().get(key).map(|r| r.version)
    }
}

fn bound(key: &[u8], inclusive: bool) -> Bound<&[u8]> {
    if inclusive {
        Bound::Included(key)
    } else {
        Bound::Excluded(key)
    }
}

impl<'a> Drop for MemCursor<'a> {
    fn drop(&mut self) {
        if self.config.isolation == Isolation::RepeatableRead {
            self.txn.hold_read_locks(std::mem::take(&mut self.read_keys));
        }
    }
}
