//! Serial versions
//!
//! A serial version is negotiated per connection. Fields introduced by a
//! later version are defaulted when decoding an older frame and rejected when
//! encoding for an older peer.

use crate::error::{AtlasError, Result};

/// Base protocol
pub const MINIMUM_SERIAL_VERSION: u16 = 20;

/// TTL on puts, expiration time in results
pub const TTL_SERIAL_VERSION: u16 = 21;

/// PutResolve, tombstones, include-tombstones, region ids
pub const MULTI_REGION_SERIAL_VERSION: u16 = 22;

/// Creation / modification time of previous records; PutResolve expiration
pub const CREATION_TIME_SERIAL_VERSION: u16 = 23;

/// TableCharge, metadata sequence number in results
pub const TABLE_CHARGE_SERIAL_VERSION: u16 = 24;

pub const CURRENT_SERIAL_VERSION: u16 = TABLE_CHARGE_SERIAL_VERSION;

/// Reject versions outside the supported window
pub fn check_serial_version(serial_version: u16) -> Result<()> {
    if serial_version < MINIMUM_SERIAL_VERSION {
        return Err(AtlasError::UnsupportedSerialVersion {
            feature: "protocol",
            found: serial_version,
            required: MINIMUM_SERIAL_VERSION,
        });
    }
    if serial_version > CURRENT_SERIAL_VERSION {
        return Err(AtlasError::Protocol(format!(
            "Serial version {} is newer than {}",
            serial_version, CURRENT_SERIAL_VERSION
        )));
    }
    Ok(())
}

/// Fail when `feature` is in use but `serial_version` predates `required`
pub(crate) fn require(
    in_use: bool,
    feature: &'static str,
    serial_version: u16,
    required: u16,
) -> Result<()> {
    if in_use && serial_version < required {
        return Err(AtlasError::UnsupportedSerialVersion {
            feature,
            found: serial_version,
            required,
        });
    }
    Ok(())
}
