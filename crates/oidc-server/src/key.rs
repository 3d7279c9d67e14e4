//! Signing key provisioning.
//!
//! The key is 32 bytes from the operating system random source, generated once
//! per process and held only in memory.

use rand::TryRngCore;
use rand::rngs::OsRng;

use crate::error::KeyError;

/// Length of the raw key material in bytes.
pub const KEY_LEN: usize = 32;

/// Random key backing session and token protection for the process lifetime.
#[derive(Clone, PartialEq, Eq)]
pub struct SigningKey {
    hex: String,
}

impl SigningKey {
    /// Wrap raw key material.
    #[must_use]
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self {
            hex: hex::encode(bytes),
        }
    }

    /// Hex encoding of the key (64 characters).
    #[must_use]
    pub fn as_hex(&self) -> &str {
        &self.hex
    }

    /// Secret bytes handed to the token signer.
    #[must_use]
    pub fn secret(&self) -> &[u8] {
        self.hex.as_bytes()
    }
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKey").field("len", &KEY_LEN).finish()
    }
}

/// Generate a fresh signing key.
///
/// There is no retry: a failing random source means the environment is broken.
pub fn provision_key() -> Result<SigningKey, KeyError> {
    let mut bytes = [0u8; KEY_LEN];
    OsRng.try_fill_bytes(&mut bytes)?;
    Ok(SigningKey::from_bytes(bytes))
}
