//! Range scanning and batch termination
//!
//! ## Batch Termination
//! Checked after each candidate, in this order:
//! ```text
//! (a) key outside the target tables ──► skip, no charge
//!     key outside the hierarchy     ──► empty read charge, more = false
//! (b) read KB  >= max_read_kb       ──► more = true
//! (c) count    >= batch_size        ──► more = true
//! (d) write KB >= max_write_kb      ──► more = true
//! end of range                      ──► more = false
//! ```

use std::sync::Arc;

use crate::error::Result;
use crate::keyspace::{Key, ScanBounds};
use crate::schema::{KeyMatch, ResolvedTargets, TableSchema};
use crate::store::{Direction, RecordCursor, StoredRecord};
use crate::tracker::ExecContext;

/// Cursor over one key range, optionally resuming after a key
pub(super) struct Scanner<'a> {
    cursor: Box<dyn RecordCursor + 'a>,
    bounds: ScanBounds,
    direction: Direction,
    resume_key: Option<Vec<u8>>,
    include_tombstones: bool,
    started: bool,
}

impl<'a> Scanner<'a> {
    pub(super) fn new(
        cursor: Box<dyn RecordCursor + 'a>,
        bounds: ScanBounds,
        direction: Direction,
        resume_key: Option<Vec<u8>>,
        include_tombstones: bool,
    ) -> Self {
        Self {
            cursor,
            bounds,
            direction,
            resume_key,
            include_tombstones,
            started: false,
        }
    }

    /// Next visible record, or `None` at the end of the range
    pub(super) fn next(&mut self) -> Result<Option<(Vec<u8>, StoredRecord)>> {
        loop {
            let found = if self.started {
                self.cursor.advance(self.direction)?
            } else {
                self.started = true;
                self.seek_start()?
            };
            let Some((key, record)) = found else {
                return Ok(None);
            };
            // Keys arrive in scan order, so the first one outside ends the range
            if !self.bounds.contains(&key) {
                return Ok(None);
            }
            if record.tombstone && !self.include_tombstones {
                continue;
            }
            return Ok(Some((key, record)));
        }
    }

    /// Cursor positioned on the last record returned
    pub(super) fn cursor_mut(&mut self) -> &mut dyn RecordCursor {
        self.cursor.as_mut()
    }

    fn seek_start(&mut self) -> Result<Option<(Vec<u8>, StoredRecord)>> {
        let lower = self.bounds.lower.as_slice();
        match self.direction {
            Direction::Forward => match &self.resume_key {
                Some(resume) if resume.as_slice() >= lower => {
                    self.cursor.seek(Some(resume), Direction::Forward, false)
                }
                _ => self.cursor.seek(Some(lower), Direction::Forward, true),
            },
            Direction::Reverse => {
                let upper = self.bounds.upper.as_deref();
                let start = match (self.resume_key.as_deref(), upper) {
                    (Some(resume), Some(upper)) => Some(resume.min(upper)),
                    (Some(resume), None) => Some(resume),
                    (None, upper) => upper,
                };
                match start {
                    Some(start) => self.cursor.seek(Some(start), Direction::Reverse, false),
                    None => self.cursor.seek(None, Direction::Reverse, true),
                }
            }
        }
    }
}

// =============================================================================
// Batch Driver
// =============================================================================

/// Stop conditions for one batch; 0 disables a limit
#[derive(Debug, Clone, Copy, Default)]
pub(super) struct BatchLimits {
    pub batch_size: u32,
    pub max_read_kb: u32,
    pub max_write_kb: u32,
}

impl BatchLimits {
    /// True when the batch must stop after `count` results
    pub(super) fn reached(&self, ctx: &ExecContext, count: u32) -> bool {
        if self.max_read_kb > 0 && ctx.read_kb() >= self.max_read_kb {
            tracing::debug!("Batch stopped at read budget ({} KB)", ctx.read_kb());
            return true;
        }
        if self.batch_size > 0 && count >= self.batch_size {
            tracing::trace!("Batch stopped at {} results", count);
            return true;
        }
        if self.max_write_kb > 0 && ctx.write_kb() >= self.max_write_kb {
            tracing::debug!("Batch stopped at write budget ({} KB)", ctx.write_kb());
            return true;
        }
        false
    }
}

/// How a table scan ended
#[derive(Debug, Default)]
pub(super) struct ScanOutcome {
    pub count: u32,
    pub more: bool,
    /// Primary key of the last row visited
    pub last_key: Option<Vec<u8>>,
}

impl ScanOutcome {
    /// Resume key to hand back; only a suspended batch has one
    pub(super) fn resume_key(&self) -> Option<Vec<u8>> {
        if self.more {
            self.last_key.clone()
        } else {
            None
        }
    }
}

/// Drive `scanner` over the rows of `targets`, calling `visit` for each one
pub(super) fn scan_targets<'a>(
    scanner: &mut Scanner<'a>,
    targets: &ResolvedTargets,
    limits: &BatchLimits,
    ctx: &mut ExecContext,
    mut visit: impl FnMut(&mut Scanner<'a>, &[u8], &StoredRecord, &Arc<TableSchema>, &mut ExecContext) -> Result<()>,
) -> Result<ScanOutcome> {
    let mut outcome = ScanOutcome::default();
    while let Some((key, record)) = scanner.next()? {
        let table = match targets.classify(&Key::from_bytes(&key)?) {
            KeyMatch::Target(table) => table,
            KeyMatch::Skip => continue,
            KeyMatch::NoMore => {
                ctx.add_empty_read_charge();
                break;
            }
        };

        visit(scanner, &key, &record, &table, ctx)?;
        outcome.count += 1;
        outcome.last_key = Some(key);
        if limits.reached(ctx, outcome.count) {
            outcome.more = true;
            break;
        }
    }

    if outcome.count == 0 && ctx.read_kb() == 0 {
        ctx.add_empty_read_charge();
    }
    Ok(outcome)
}
