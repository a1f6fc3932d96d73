//! Keys, key ranges, and keyspace classification
//!
//! ## Key Encoding
//! A key is an ordered list of byte components. Each component is escaped and
//! followed by a terminator so that:
//! - a parent key's bytes are a strict prefix of every descendant's bytes
//! - byte order of encoded keys equals component-wise order
//!
//! ```text
//! 0x00 -> 0x01 0x01
//! 0x01 -> 0x01 0x02
//! end  -> 0x00
//! ```

use crate::error::{AtlasError, Result};

const TERMINATOR: u8 = 0x00;
const ESCAPE: u8 = 0x01;

/// First component of every internal (non-user) key
pub const INTERNAL_COMPONENT: &[u8] = b"";

/// Second component of internal keys holding schema metadata
pub const SCHEMA_COMPONENT: &[u8] = b"sch";

/// A multi-component key
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Key {
    components: Vec<Vec<u8>>,
}

impl Key {
    pub fn new(components: Vec<Vec<u8>>) -> Self {
        Self { components }
    }

    /// Build a key from string components
    pub fn from_strs(components: &[&str]) -> Self {
        Self {
            components: components.iter().map(|c| c.as_bytes().to_vec()).collect(),
        }
    }

    pub fn components(&self) -> &[Vec<u8>] {
        &self.components
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// A new key with `component` appended
    pub fn child(&self, component: impl Into<Vec<u8>>) -> Key {
        let mut components = self.components.clone();
        components.push(component.into());
        Key { components }
    }

    /// The first `n` components
    pub fn prefix(&self, n: usize) -> Key {
        Key {
            components: self.components[..n.min(self.components.len())].to_vec(),
        }
    }

    /// True if every component of `self` leads `other`
    pub fn is_prefix_of(&self, other: &Key) -> bool {
        other.components.len() >= self.components.len()
            && other.components[..self.components.len()] == self.components[..]
    }

    /// Serialize to ordered bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.components.iter().map(|c| c.len() + 1).sum());
        for component in &self.components {
            encode_component(component, &mut out);
        }
        out
    }

    /// Parse bytes produced by [`Key::to_bytes`]
    pub fn from_bytes(bytes: &[u8]) -> Result<Key> {
        let mut components = Vec::new();
        let mut current = Vec::new();
        let mut iter = bytes.iter();
        while let Some(&b) = iter.next() {
            match b {
                TERMINATOR => components.push(std::mem::take(&mut current)),
                ESCAPE => match iter.next() {
                    Some(0x01) => current.push(0x00),
                    Some(0x02) => current.push(0x01),
                    other => {
                        return Err(AtlasError::Protocol(format!(
                            "Invalid key escape sequence: 0x01 {:?}",
                            other
                        )))
                    }
                },
                _ => current.push(b),
            }
        }
        if !current.is_empty() {
            return Err(AtlasError::Protocol(
                "Key bytes missing final terminator".to_string(),
            ));
        }
        Ok(Key { components })
    }
}

impl std::fmt::Display for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for component in &self.components {
            write!(f, "/{}", String::from_utf8_lossy(component))?;
        }
        Ok(())
    }
}

fn encode_component(component: &[u8], out: &mut Vec<u8>) {
    for &b in component {
        match b {
            0x00 => out.extend_from_slice(&[ESCAPE, 0x01]),
            0x01 => out.extend_from_slice(&[ESCAPE, 0x02]),
            _ => out.push(b),
        }
    }
    out.push(TERMINATOR);
}

/// Smallest byte string greater than every string with prefix `bytes`
///
/// `None` when no such string exists (empty or all 0xFF).
pub fn prefix_successor(bytes: &[u8]) -> Option<Vec<u8>> {
    let mut out = bytes.to_vec();
    while let Some(last) = out.pop() {
        if last < 0xFF {
            out.push(last + 1);
            return Some(out);
        }
    }
    None
}

// =============================================================================
// Key Ranges
// =============================================================================

/// Range over the component that follows a parent key
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyRange {
    pub start: Option<Vec<u8>>,
    pub start_inclusive: bool,
    pub end: Option<Vec<u8>>,
    pub end_inclusive: bool,
}

impl KeyRange {
    /// Inclusive range `[start, end]`
    pub fn inclusive(start: impl Into<Vec<u8>>, end: impl Into<Vec<u8>>) -> Self {
        Self {
            start: Some(start.into()),
            start_inclusive: true,
            end: Some(end.into()),
            end_inclusive: true,
        }
    }

    /// Range with only a lower bound
    pub fn from(start: impl Into<Vec<u8>>, inclusive: bool) -> Self {
        Self {
            start: Some(start.into()),
            start_inclusive: inclusive,
            end: None,
            end_inclusive: false,
        }
    }

    /// Range with only an upper bound
    pub fn until(end: impl Into<Vec<u8>>, inclusive: bool) -> Self {
        Self {
            start: None,
            start_inclusive: false,
            end: Some(end.into()),
            end_inclusive: inclusive,
        }
    }

    /// True when the bounds can never select a key
    pub fn is_empty(&self) -> bool {
        match (&self.start, &self.end) {
            (Some(s), Some(e)) => s > e || (s == e && !(self.start_inclusive && self.end_inclusive)),
            _ => false,
        }
    }
}

/// Byte bounds for a cursor scan: `[lower, upper)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanBounds {
    pub lower: Vec<u8>,
    pub upper: Option<Vec<u8>>,
}

impl ScanBounds {
    /// Every key that has `parent` as a prefix, narrowed by `range`
    pub fn for_parent(parent: &Key, range: Option<&KeyRange>) -> Self {
        let parent_bytes = parent.to_bytes();
        let range = match range {
            Some(r) => r,
            None => {
                return Self {
                    upper: prefix_successor(&parent_bytes),
                    lower: parent_bytes,
                }
            }
        };

        let lower = match &range.start {
            Some(start) => {
                let mut bound = parent_bytes.clone();
                encode_component(start, &mut bound);
                if range.start_inclusive {
                    bound
                } else {
                    prefix_successor(&bound).unwrap_or(bound)
                }
            }
            None => parent_bytes.clone(),
        };

        let upper = match &range.end {
            Some(end) => {
                let mut bound = parent_bytes.clone();
                encode_component(end, &mut bound);
                if range.end_inclusive {
                    prefix_successor(&bound)
                } else {
                    Some(bound)
                }
            }
            None => prefix_successor(&parent_bytes),
        };

        Self { lower, upper }
    }

    /// True if `key` falls inside the bounds
    pub fn contains(&self, key: &[u8]) -> bool {
        key >= self.lower.as_slice() && self.upper.as_deref().map_or(true, |u| key < u)
    }
}

// =============================================================================
// Keyspace Classification
// =============================================================================

/// Which part of the keyspace a key belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeySpace {
    /// Internal keys (first component empty), not client visible
    Private,
    /// Internal schema metadata keys
    Schema,
    /// Everything else
    General,
}

impl KeySpace {
    /// Classify serialized key bytes. Pure and total over any input.
    pub fn classify(key: &[u8]) -> KeySpace {
        if key.first() != Some(&TERMINATOR) {
            return KeySpace::General;
        }
        let rest = &key[1..];
        if rest.len() > SCHEMA_COMPONENT.len()
            && rest.starts_with(SCHEMA_COMPONENT)
            && rest[SCHEMA_COMPONENT.len()] == TERMINATOR
        {
            KeySpace::Schema
        } else {
            KeySpace::Private
        }
    }
}
