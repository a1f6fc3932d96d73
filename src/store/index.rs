//! In-memory secondary indexes
//!
//! Each index is an ordered set of (secondary key, primary key) entries kept
//! in step with primary writes by [`super::MemStore`].

use std::collections::BTreeSet;
use std::ops::Bound;
use std::sync::Arc;

use crate::error::Result;
use crate::keyspace::Key;
use crate::schema::TableSchema;
use crate::value::Row;

use super::{Direction, IndexCursor, StoredRecord};

/// One index entry
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IndexEntry {
    pub secondary: Vec<u8>,
    pub primary: Vec<u8>,
}

impl IndexEntry {
    pub fn new(secondary: Vec<u8>, primary: Vec<u8>) -> Self {
        Self { secondary, primary }
    }
}

pub(super) struct MemIndex {
    pub(super) table: Arc<TableSchema>,
    pub(super) name: String,
    pub(super) entries: BTreeSet<IndexEntry>,
}

impl MemIndex {
    pub(super) fn new(table: Arc<TableSchema>, name: String) -> Self {
        Self {
            table,
            name,
            entries: BTreeSet::new(),
        }
    }

    /// Entry for a primary record, if it belongs in this index
    pub(super) fn entry_for(&self, key: &[u8], record: &StoredRecord) -> Option<IndexEntry> {
        if record.tombstone {
            return None;
        }
        let parsed = Key::from_bytes(key).ok()?;
        if !self.table.owns_key(&parsed) {
            return None;
        }
        let row = Row::decode(&record.value).ok()?;
        let secondary = self.table.index_key(&self.name, &row)?;
        Some(IndexEntry::new(secondary, key.to_vec()))
    }

    /// Apply a primary change; returns the number of index writes
    pub(super) fn update(
        &mut self,
        key: &[u8],
        old: Option<&StoredRecord>,
        new: Option<&StoredRecord>,
    ) -> u32 {
        let old_entry = old.and_then(|r| self.entry_for(key, r));
        let new_entry = new.and_then(|r| self.entry_for(key, r));
        if old_entry == new_entry {
            return 0;
        }
        let mut writes = 0;
        if let Some(entry) = old_entry {
            if self.entries.remove(&entry) {
                writes += 1;
            }
        }
        if let Some(entry) = new_entry {
            self.entries.insert(entry);
            writes += 1;
        }
        writes
    }

    pub(super) fn seek_secondary(
        &self,
        sec: Option<&[u8]>,
        direction: Direction,
        inclusive: bool,
    ) -> Option<IndexEntry> {
        let probe = |s: &[u8]| IndexEntry::new(s.to_vec(), Vec::new());
        // Nothing sorts strictly between `s` and `s + [0]`
        let just_after = |s: &[u8]| {
            let mut v = s.to_vec();
            v.push(0);
            IndexEntry::new(v, Vec::new())
        };
        let found = match (direction, sec) {
            (Direction::Forward, None) => self.entries.iter().next(),
            (Direction::Reverse, None) => self.entries.iter().next_back(),
            (Direction::Forward, Some(s)) => {
                let lower = if inclusive { probe(s) } else { just_after(s) };
                self.entries.range((Bound::Included(lower), Bound::Unbounded)).next()
            }
            (Direction::Reverse, Some(s)) => {
                let upper = if inclusive { just_after(s) } else { probe(s) };
                self.entries
                    .range((Bound::Unbounded, Bound::Excluded(upper)))
                    .next_back()
            }
        };
        found.cloned()
    }

    pub(super) fn seek_after(&self, entry: &IndexEntry, direction: Direction) -> Option<IndexEntry> {
        let found = match direction {
            Direction::Forward => self
                .entries
                .range((Bound::Excluded(entry), Bound::Unbounded))
                .next(),
            Direction::Reverse => self
                .entries
                .range((Bound::Unbounded, Bound::Excluded(entry)))
                .next_back(),
        };
        found.cloned()
    }
}

/// Cursor over a [`MemIndex`] owned by a [`super::MemStore`]
pub(super) struct MemIndexCursor<'a> {
    pub(super) store: &'a super::MemStore,
    pub(super) slot: usize,
    pub(super) current: Option<IndexEntry>,
}

impl<'a> MemIndexCursor<'a> {
    fn position(&mut self, found: Option<IndexEntry>) -> Result<Option<IndexEntry>> {
        if found.is_some() {
            self.current = found.clone();
        }
        Ok(found)
    }
}

impl<'a> IndexCursor for MemIndexCursor<'a> {
    fn seek_secondary(
        &mut self,
        sec: Option<&[u8]>,
        direction: Direction,
        inclusive: bool,
    ) -> Result<Option<IndexEntry>> {
        let found = self
            .store
            .with_index(self.slot, |idx| idx.seek_secondary(sec, direction, inclusive));
        self.position(found)
    }

    fn seek_after(&mut self, entry: &IndexEntry, direction: Direction) -> Result<Option<IndexEntry>> {
        let found = self
            .store
            .with_index(self.slot, |idx| idx.seek_after(entry, direction));
        self.position(found)
    }

    fn advance(&mut self, direction: Direction) -> Result<Option<IndexEntry>> {
        match self.current.clone() {
            Some(entry) => self.seek_after(&entry, direction),
            None => Ok(None),
        }
    }
}
