//! Resource accounting
//!
//! Every read and write is charged in KB rounded up to a 1 KB block. A read
//! that finds nothing still costs [`MIN_READ`].
//!
//! Two layers:
//! - [`ResourceTracker`]: connection-scoped accumulator supplied by the caller
//! - [`ExecContext`]: per-operation state (accumulated KB, consistency flag,
//!   clock, deadline) passed alongside an immutable `Operation`

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Block size used for rounding charges
pub const KB: usize = 1024;

/// Minimum bytes charged for any read, including one that found nothing
pub const MIN_READ: usize = 1024;

/// Convert bytes to KB, rounding up; saturates at `u32::MAX`
pub fn bytes_to_kb(bytes: usize) -> u32 {
    u32::try_from(bytes.div_ceil(KB)).unwrap_or(u32::MAX)
}

/// Read KB for `bytes`; absolute-consistency reads cost double
pub fn read_kb(bytes: usize, absolute: bool) -> u32 {
    let kb = bytes_to_kb(bytes);
    if absolute {
        kb.saturating_mul(2)
    } else {
        kb
    }
}

/// Capability interface for throughput accounting
pub trait ResourceTracker: Send + Sync {
    /// Record a read; returns the KB charged
    fn add_read_bytes(&self, bytes: usize, absolute: bool) -> u32;

    /// Record a write; returns the KB charged. `index_writes` is carried for
    /// capacity planning and never changes the KB figure.
    fn add_write_bytes(&self, bytes: usize, index_writes: u32) -> u32;
}

/// Default tracker: lock-free running totals
#[derive(Debug, Default)]
pub struct ThroughputTracker {
    read_kb: AtomicU64,
    write_kb: AtomicU64,
    index_writes: AtomicU64,
}

impl ThroughputTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total read KB charged so far
    pub fn read_kb(&self) -> u64 {
        self.read_kb.load(Ordering::Relaxed)
    }

    /// Total write KB charged so far
    pub fn write_kb(&self) -> u64 {
        self.write_kb.load(Ordering::Relaxed)
    }

    /// Total secondary index writes reported so far
    pub fn index_writes(&self) -> u64 {
        self.index_writes.load(Ordering::Relaxed)
    }
}

impl ResourceTracker for ThroughputTracker {
    fn add_read_bytes(&self, bytes: usize, absolute: bool) -> u32 {
        let kb = read_kb(bytes, absolute);
        self.read_kb.fetch_add(kb as u64, Ordering::Relaxed);
        kb
    }

    fn add_write_bytes(&self, bytes: usize, index_writes: u32) -> u32 {
        let kb = bytes_to_kb(bytes);
        self.write_kb.fetch_add(kb as u64, Ordering::Relaxed);
        self.index_writes
            .fetch_add(index_writes as u64, Ordering::Relaxed);
        kb
    }
}

/// Per-operation execution state
///
/// Holds everything that changes while an operation runs so the operation
/// itself stays immutable and shareable.
pub struct ExecContext {
    tracker: Option<Arc<dyn ResourceTracker>>,
    absolute_consistency: bool,
    read_kb: u32,
    write_kb: u32,
    index_writes: u32,
    now_ms: u64,
    started: Instant,
    timeout: Option<Duration>,
}

impl ExecContext {
    /// Context with no tracker, wall-clock time, and no timeout
    pub fn new() -> Self {
        let now_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Self {
            tracker: None,
            absolute_consistency: false,
            read_kb: 0,
            write_kb: 0,
            index_writes: 0,
            now_ms,
            started: Instant::now(),
            timeout: None,
        }
    }

    /// Attach a connection-scoped tracker
    pub fn with_tracker(mut self, tracker: Arc<dyn ResourceTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    /// Mark reads as absolute consistency (charged double)
    pub fn with_absolute_consistency(mut self, absolute: bool) -> Self {
        self.absolute_consistency = absolute;
        self
    }

    /// Pin the clock used for modification/expiration times
    pub fn with_time_ms(mut self, now_ms: u64) -> Self {
        self.now_ms = now_ms;
        self
    }

    /// Caller-supplied timeout budget; 0 means none
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout = (timeout_ms > 0).then(|| Duration::from_millis(timeout_ms));
        self
    }

    // =========================================================================
    // Charging
    // =========================================================================

    /// Charge a read of `bytes`
    pub fn add_read_bytes(&mut self, bytes: usize) -> u32 {
        let kb = match &self.tracker {
            Some(t) => t.add_read_bytes(bytes, self.absolute_consistency),
            None => read_kb(bytes, self.absolute_consistency),
        };
        self.read_kb = self.read_kb.saturating_add(kb);
        kb
    }

    /// Charge a write of `bytes` touching `index_writes` secondary indexes
    pub fn add_write_bytes(&mut self, bytes: usize, index_writes: u32) -> u32 {
        let kb = match &self.tracker {
            Some(t) => t.add_write_bytes(bytes, index_writes),
            None => bytes_to_kb(bytes),
        };
        self.write_kb = self.write_kb.saturating_add(kb);
        self.index_writes = self.index_writes.saturating_add(index_writes);
        kb
    }

    /// Charge the floor for a lookup that found nothing
    pub fn add_empty_read_charge(&mut self) -> u32 {
        self.add_read_bytes(MIN_READ)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn read_kb(&self) -> u32 {
        self.read_kb
    }

    pub fn write_kb(&self) -> u32 {
        self.write_kb
    }

    pub fn index_writes(&self) -> u32 {
        self.index_writes
    }

    pub fn is_absolute_consistency(&self) -> bool {
        self.absolute_consistency
    }

    /// Wall-clock time of this operation in unix millis
    pub fn now_ms(&self) -> u64 {
        self.now_ms
    }

    /// Caller timeout, if any
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Time left before the caller timeout minus `margin`
    ///
    /// Returns `None` when no timeout was supplied.
    pub fn remaining(&self, margin: Duration) -> Option<Duration> {
        let timeout = self.timeout?;
        Some(
            timeout
                .saturating_sub(margin)
                .saturating_sub(self.started.elapsed()),
        )
    }
}

impl Default for ExecContext {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ExecContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecContext")
            .field("absolute_consistency", &self.absolute_consistency)
            .field("read_kb", &self.read_kb)
            .field("write_kb", &self.write_kb)
            .field("index_writes", &self.index_writes)
            .field("now_ms", &self.now_ms)
            .field("timeout", &self.timeout)
            .finish()
    }
}
