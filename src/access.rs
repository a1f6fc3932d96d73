//! Privilege checking
//!
//! Every handler declares the capability it needs before touching storage.
//! A missing capability aborts the operation with `AtlasError::Unauthorized`.

use std::collections::HashSet;
use std::fmt;

use crate::error::{AtlasError, Result};
use crate::keyspace::KeySpace;
use crate::schema::{TableId, TableSchema};

/// Capability required by an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Privilege {
    Read,
    Insert,
    Delete,
}

impl fmt::Display for Privilege {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Privilege::Read => write!(f, "READ"),
            Privilege::Insert => write!(f, "INSERT"),
            Privilege::Delete => write!(f, "DELETE"),
        }
    }
}

/// Scope a grant applies to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PrivilegeScope {
    /// Every user table
    All,
    Namespace(String),
    Table(TableId),
    /// Non-table keys of one keyspace class
    Keyspace(KeySpace),
}

/// What an operation touches
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessTarget {
    Table {
        id: TableId,
        namespace: Option<String>,
    },
    Keyspace(KeySpace),
}

impl AccessTarget {
    pub fn table(schema: &TableSchema) -> Self {
        AccessTarget::Table {
            id: schema.id,
            namespace: schema.namespace.clone(),
        }
    }
}

impl fmt::Display for AccessTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessTarget::Table { id, .. } => write!(f, "table {}", id),
            AccessTarget::Keyspace(ks) => write!(f, "{:?} keyspace", ks),
        }
    }
}

/// Privilege collaborator
pub trait AccessChecker: Send + Sync {
    fn check(&self, privilege: Privilege, target: &AccessTarget) -> Result<()>;
}

/// Grants everything, including internal keyspaces
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

impl AccessChecker for AllowAll {
    fn check(&self, _privilege: Privilege, _target: &AccessTarget) -> Result<()> {
        Ok(())
    }
}

/// Explicit set of grants
#[derive(Debug, Default, Clone)]
pub struct GrantSet {
    grants: HashSet<(Privilege, PrivilegeScope)>,
}

impl GrantSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant(mut self, privilege: Privilege, scope: PrivilegeScope) -> Self {
        self.grants.insert((privilege, scope));
        self
    }

    fn has(&self, privilege: Privilege, scope: PrivilegeScope) -> bool {
        self.grants.contains(&(privilege, scope))
    }
}

impl AccessChecker for GrantSet {
    fn check(&self, privilege: Privilege, target: &AccessTarget) -> Result<()> {
        let allowed = match target {
            AccessTarget::Table { id, namespace } => {
                self.has(privilege, PrivilegeScope::All)
                    || self.has(privilege, PrivilegeScope::Table(*id))
                    || namespace
                        .as_ref()
                        .is_some_and(|ns| self.has(privilege, PrivilegeScope::Namespace(ns.clone())))
            }
            // Internal keyspaces are never covered by the all-tables grant
            AccessTarget::Keyspace(KeySpace::General) => {
                self.has(privilege, PrivilegeScope::All)
                    || self.has(privilege, PrivilegeScope::Keyspace(KeySpace::General))
            }
            AccessTarget::Keyspace(ks) => self.has(privilege, PrivilegeScope::Keyspace(*ks)),
        };

        if allowed {
            Ok(())
        } else {
            Err(AtlasError::Unauthorized(format!(
                "Insufficient access rights: {} on {}",
                privilege, target
            )))
        }
    }
}
