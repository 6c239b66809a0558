//! Core types for the CrossComm protocol
//!
//! Client identifiers, reserved routing addresses, and the clock and random
//! helpers used to stamp envelopes and store keys.

use core::fmt;
use core::ops::Deref;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

// ----------------------------------------------------------------------------
// Reserved Addresses
// ----------------------------------------------------------------------------

/// Address of the relay server itself
pub const SERVER_ID: &str = "server";

/// Broadcast target: every connected client
pub const BROADCAST_ID: &str = "all";

/// Files consulted for a device-stable identifier, in order
const MACHINE_ID_PATHS: &[&str] = &["/etc/machine-id", "/var/lib/dbus/machine-id"];

// ----------------------------------------------------------------------------
// Client Identifier
// ----------------------------------------------------------------------------

/// Identity of one client on the relay
///
/// Either supplied by the caller or generated once per client instance from a
/// device-stable identifier plus a short random suffix.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(String);

impl ClientId {
    /// Wrap an explicit identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate `{deviceId}_{random8}`
    pub fn generate() -> Self {
        Self(format!("{}_{}", device_identifier(), short_random()))
    }

    /// Borrow the identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Deref for ClientId {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<&str> for ClientId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ClientId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl PartialEq<str> for ClientId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for ClientId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

// ----------------------------------------------------------------------------
// Identity Helpers
// ----------------------------------------------------------------------------

/// Stable identifier for this machine, formatted as a UUID
///
/// Derived by hashing the OS machine id so the raw value never leaves the
/// host. Falls back to a random UUID when no machine id is readable.
pub fn device_identifier() -> String {
    for path in MACHINE_ID_PATHS {
        if let Ok(raw) = std::fs::read_to_string(path) {
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                continue;
            }
            let digest = Sha256::digest(trimmed.as_bytes());
            let mut bytes = [0u8; 16];
            bytes.copy_from_slice(&digest[..16]);
            return uuid::Uuid::from_bytes(bytes).to_string().to_uppercase();
        }
    }
    uuid::Uuid::new_v4().to_string().to_uppercase()
}

/// Eight random hex characters
pub fn short_random() -> String {
    let simple = uuid::Uuid::new_v4().simple().to_string();
    simple[..8].to_uppercase()
}

/// Message id of the form `{clientId}_{epochMillis}_{random8}`
pub fn generate_message_id(client_id: &ClientId) -> String {
    format!("{}_{}_{}", client_id, unix_time_millis(), short_random())
}

// ----------------------------------------------------------------------------
// Clock Helpers
// ----------------------------------------------------------------------------

/// Seconds since the Unix epoch with sub-second precision
pub fn unix_time_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

/// Milliseconds since the Unix epoch
pub fn unix_time_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
