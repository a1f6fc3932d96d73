//! Error types for AtlasTable
//!
//! One caller-visible error type for every handler. Precondition failures
//! (wrong version, absent/present mismatch) are never errors; they are encoded
//! in the operation result.

use thiserror::Error;

/// Result type alias using AtlasError
pub type Result<T> = std::result::Result<T, AtlasError>;

/// Unified error type for AtlasTable operations
#[derive(Debug, Error)]
pub enum AtlasError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Client / Protocol Errors (client-attributable, never retried)
    // -------------------------------------------------------------------------
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Serial version {found} does not support {feature} (requires {required})")]
    UnsupportedSerialVersion {
        feature: &'static str,
        found: u16,
        required: u16,
    },

    #[error("Illegal argument: {0}")]
    IllegalArgument(String),

    // -------------------------------------------------------------------------
    // Schema Errors
    // -------------------------------------------------------------------------
    #[error("Table not found: {0}")]
    TableNotFound(u64),

    #[error("Index {index} not found on table {table_id}")]
    IndexNotFound { table_id: u64, index: String },

    #[error(
        "Table {table_id} version mismatch: client row version {client_version}, \
         table requires at least {required_version}"
    )]
    TableVersionMismatch {
        table_id: u64,
        client_version: u32,
        required_version: u32,
    },

    // -------------------------------------------------------------------------
    // Security Errors
    // -------------------------------------------------------------------------
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    // -------------------------------------------------------------------------
    // Storage Errors
    // -------------------------------------------------------------------------
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Reached max retries ({retries}) for {operation}")]
    MaxRetriesExceeded {
        operation: &'static str,
        retries: u32,
    },

    #[error("Request timed out after {0} ms")]
    RequestTimeout(u64),

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),

    // -------------------------------------------------------------------------
    // Programming Errors (fatal, not caught locally)
    // -------------------------------------------------------------------------
    #[error("Result type mismatch: expected {expected}, got {actual}")]
    ResultTypeMismatch { expected: String, actual: String },

    #[error("Fatal: {0}")]
    Fatal(String),
}

impl AtlasError {
    /// True when the caller sent something it should not have
    pub fn is_client_fault(&self) -> bool {
        matches!(
            self,
            AtlasError::Protocol(_)
                | AtlasError::UnsupportedSerialVersion { .. }
                | AtlasError::IllegalArgument(_)
                | AtlasError::Unauthorized(_)
        )
    }

    /// True for programming-error-class faults that must terminate the request
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            AtlasError::ResultTypeMismatch { .. } | AtlasError::Fatal(_)
        )
    }

    /// True when the client should refresh its cached schema and retry
    pub fn needs_schema_refresh(&self) -> bool {
        matches!(
            self,
            AtlasError::TableVersionMismatch { .. } | AtlasError::TableNotFound(_)
        )
    }
}

impl From<bincode::Error> for AtlasError {
    fn from(err: bincode::Error) -> Self {
        AtlasError::Serialization(err.to_string())
    }
}
