//! # AtlasTable
//!
//! The per-operation execution core of a multi-region key-value/table
//! storage node:
//! - A closed set of operations with a versioned wire format
//! - Conditional writes with optimistic concurrency and tombstones
//! - Last-writer-wins conflict resolution with MR counter merging
//! - Resumable, budgeted range and index iteration
//! - KB-rounded throughput accounting on every path
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Protocol (framed requests)                  │
//! │              serial versions 20 ..= 24                       │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ Operation + ExecContext
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                  OperationHandler                            │
//! │     (privileges, charges, retries, conflict resolution)      │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┼─────────────┬──────────────┐
//!          │            │             │              │
//!          ▼            ▼             ▼              ▼
//!   ┌────────────┐ ┌──────────┐ ┌───────────┐ ┌─────────────┐
//!   │RecordStore │ │  Schema  │ │ Migration │ │QueryExecutor│
//!   │ (cursors)  │ │(metadata)│ │  stream   │ │ + Topology  │
//!   └────────────┘ └──────────┘ └───────────┘ └─────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;

pub mod access;
pub mod handler;
pub mod keyspace;
pub mod ops;
pub mod protocol;
pub mod query;
pub mod replication;
pub mod resolver;
pub mod schema;
pub mod store;
pub mod tracker;
pub mod value;
pub mod version;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use config::Config;
pub use error::{AtlasError, Result};
pub use handler::{OperationHandler, OperationHandlerBuilder};
pub use ops::{OpCode, OpResult, Operation};
pub use tracker::ExecContext;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of AtlasTable
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
