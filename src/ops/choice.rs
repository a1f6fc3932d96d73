//! Previous-record return choice

use crate::error::{AtlasError, Result};

/// What a write reports about the record it replaced or failed against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum ReturnChoice {
    #[default]
    None = 0,
    Value = 1,
    Version = 2,
    All = 3,
}

impl ReturnChoice {
    pub fn needs_value(self) -> bool {
        matches!(self, ReturnChoice::Value | ReturnChoice::All)
    }

    pub fn needs_version(self) -> bool {
        matches!(self, ReturnChoice::Version | ReturnChoice::All)
    }

    /// True if any previous information is requested
    pub fn needs_previous(self) -> bool {
        self != ReturnChoice::None
    }
}

impl TryFrom<u8> for ReturnChoice {
    type Error = AtlasError;

    fn try_from(byte: u8) -> Result<Self> {
        match byte {
            0 => Ok(ReturnChoice::None),
            1 => Ok(ReturnChoice::Value),
            2 => Ok(ReturnChoice::Version),
            3 => Ok(ReturnChoice::All),
            _ => Err(AtlasError::Protocol(format!(
                "Unknown return choice: {}",
                byte
            ))),
        }
    }
}
