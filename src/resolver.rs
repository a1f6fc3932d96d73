//! Multi-region conflict resolution
//!
//! Last-writer-wins over `(modification time, region id)` stamps, plus
//! field-level merging of MR counter columns.
//!
//! ## Resolution Order
//! ```text
//! 1. later timestamp wins
//! 2. tie, exactly one side without a region -> MissingRegionPolicy
//! 3. tie -> RegionOrder (greater region wins)
//! 4. identical stamps -> resident row stays
//! ```

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::config::NULL_REGION_ID;
use crate::value::{FieldPath, FieldValue, Row};

/// Ordering over region identifiers used to break timestamp ties
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RegionOrder {
    /// Machine-assigned ids, compared numerically
    #[default]
    NumericId,
    /// Human-named regions, compared case-insensitively by name. Ids missing
    /// from the map sort after all named ones, by id.
    Name(HashMap<u32, String>),
}

/// Tie-break when exactly one side carries no region id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MissingRegionPolicy {
    /// The incoming write wins; covers restores from non multi-region sources
    #[default]
    RemoteWins,
}

/// Conflict metadata of one side of a resolve
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteStamp {
    pub timestamp: u64,
    pub region_id: u32,
}

impl WriteStamp {
    pub fn new(timestamp: u64, region_id: u32) -> Self {
        Self {
            timestamp,
            region_id,
        }
    }

    fn has_region(&self) -> bool {
        self.region_id != NULL_REGION_ID
    }
}

/// Outcome of a resolve
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Incoming write replaces the resident row
    RemoteWins,
    /// Resident row stays
    LocalWins,
}

/// Last-writer-wins resolver
#[derive(Debug, Clone, Default)]
pub struct ConflictResolver {
    order: RegionOrder,
    missing_region: MissingRegionPolicy,
}

impl ConflictResolver {
    pub fn new(order: RegionOrder) -> Self {
        Self {
            order,
            missing_region: MissingRegionPolicy::RemoteWins,
        }
    }

    pub fn missing_region_policy(&self) -> MissingRegionPolicy {
        self.missing_region
    }

    /// Decide between the resident (`local`) and incoming (`remote`) writes
    pub fn resolve(&self, local: WriteStamp, remote: WriteStamp) -> Resolution {
        match remote.timestamp.cmp(&local.timestamp) {
            Ordering::Greater => return Resolution::RemoteWins,
            Ordering::Less => return Resolution::LocalWins,
            Ordering::Equal => {}
        }

        if local.has_region() != remote.has_region() {
            return match self.missing_region {
                MissingRegionPolicy::RemoteWins => Resolution::RemoteWins,
            };
        }

        match self.compare_regions(remote.region_id, local.region_id) {
            Ordering::Greater => Resolution::RemoteWins,
            Ordering::Less | Ordering::Equal => Resolution::LocalWins,
        }
    }

    fn compare_regions(&self, a: u32, b: u32) -> Ordering {
        match &self.order {
            RegionOrder::NumericId => a.cmp(&b),
            // Unnamed ids sort after every named one, by id among themselves
            RegionOrder::Name(names) => match (names.get(&a), names.get(&b)) {
                (Some(na), Some(nb)) => na
                    .to_lowercase()
                    .cmp(&nb.to_lowercase())
                    .then_with(|| a.cmp(&b)),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => a.cmp(&b),
            },
        }
    }
}

// =============================================================================
// MR Counter Helpers
// =============================================================================

/// Copy the counter fields at `paths` from `prev` into a copy of `incoming`
///
/// Used by plain writes: an overwrite must carry the resident counters
/// forward instead of resetting them.
pub fn copy_counters(prev: &Row, incoming: &Row, paths: &[FieldPath]) -> Row {
    let mut out = incoming.clone();
    for path in paths {
        if let Some(counter @ FieldValue::Counter(_)) = prev.get_path(path) {
            out.set_path(path, counter.clone());
        }
    }
    out
}

/// Merge the counter fields at `paths` of `other` into a copy of `base`
///
/// Non-counter fields of `base` are kept as they are.
pub fn merge_counters(base: &Row, other: &Row, paths: &[FieldPath]) -> Row {
    let mut out = base.clone();
    for path in paths {
        let merged = match (base.get_path(path), other.get_path(path)) {
            (Some(FieldValue::Counter(a)), Some(FieldValue::Counter(b))) => a.merge(b),
            (_, Some(FieldValue::Counter(b))) => b.clone(),
            _ => continue,
        };
        out.set_path(path, FieldValue::Counter(merged));
    }
    out
}
