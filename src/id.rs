//! Session identifier generation
//!
//! Identifiers follow the shape of `uid-safe(24)` used by express-session:
//! 24 bytes from the OS random source, base64url encoded without padding.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::SessionError;

/// Number of random bytes behind every identifier (192 bits).
pub const ID_BYTES: usize = 24;

/// Length of the encoded identifier.
pub const ID_LEN: usize = 32;

/// Opaque, unguessable session identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Generate a fresh identifier from the OS random source.
    ///
    /// Fails only when the entropy source itself fails, which callers must
    /// treat as fatal.
    pub fn generate() -> Result<Self, SessionError> {
        let mut bytes = [0u8; ID_BYTES];
        OsRng.try_fill_bytes(&mut bytes)?;
        Ok(Self(URL_SAFE_NO_PAD.encode(bytes)))
    }

    /// Accept a client-presented identifier if it has the generated shape.
    pub fn parse(candidate: &str) -> Option<Self> {
        let well_formed = candidate.len() == ID_LEN
            && candidate
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
        well_formed.then(|| Self(candidate.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SessionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
