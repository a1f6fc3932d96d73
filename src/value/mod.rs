//! Value Module
//!
//! Values carried by Put-family operations.
//!
//! ## RequestValue
//! The client builds a value from a rich [`Row`]; the service only ever sees
//! the raw bytes that came off the wire. A `RequestValue` holds exactly one of
//! the two so neither side pays for a conversion it does not need.

mod row;

use bytes::Bytes;

use crate::error::Result;

pub use row::{FieldPath, FieldValue, MrCounter, Row, ROW_FORMAT};

/// Value of a Put-family operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestValue {
    /// Client-side form
    Row(Row),
    /// Service-side form
    Bytes(Bytes),
}

impl RequestValue {
    /// Wrap raw bytes (service side)
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        RequestValue::Bytes(bytes.into())
    }

    /// Wrap a row (client side)
    pub fn from_row(row: Row) -> Self {
        RequestValue::Row(row)
    }

    /// Serialized form. Cheap for the bytes variant.
    pub fn to_bytes(&self) -> Result<Bytes> {
        match self {
            RequestValue::Bytes(b) => Ok(b.clone()),
            RequestValue::Row(row) => Ok(Bytes::from(row.encode()?)),
        }
    }

    /// Row form, decoding bytes if necessary
    pub fn to_row(&self) -> Result<Row> {
        match self {
            RequestValue::Row(row) => Ok(row.clone()),
            RequestValue::Bytes(b) => Row::decode(b),
        }
    }

    /// Serialized length
    pub fn len(&self) -> Result<usize> {
        match self {
            RequestValue::Bytes(b) => Ok(b.len()),
            RequestValue::Row(row) => Ok(row.encode()?.len()),
        }
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

impl From<Vec<u8>> for RequestValue {
    fn from(bytes: Vec<u8>) -> Self {
        RequestValue::Bytes(Bytes::from(bytes))
    }
}

impl From<&'static [u8]> for RequestValue {
    fn from(bytes: &'static [u8]) -> Self {
        RequestValue::Bytes(Bytes::from_static(bytes))
    }
}

impl From<Row> for RequestValue {
    fn from(row: Row) -> Self {
        RequestValue::Row(row)
    }
}
