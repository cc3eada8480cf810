//! # Typed key material
//!
//! Every node of the derivation graph gets its own byte-array type tagged
//! by purpose, so the compiler refuses a server auth token where a local
//! decryption key is expected. All of them zeroize on drop, which keeps
//! the wipe-on-logout discipline local to each type instead of scattered
//! through the orchestrator.
//!
//! | Type | Graph symbol | Purpose |
//! |------|--------------|---------|
//! | [`AuthId`] | `L1` | server identifier for the account |
//! | [`PasswordAuth`] | `P1` | server-visible password token |
//! | [`RecoveryAuth`] | `LRA1` | server-visible recovery token |
//! | [`SyncDirKey`] | `L2` | local key for the encrypted sync-repo key |
//! | [`LoginKey`] | `LP2` | local key for the encrypted master key |
//! | [`RecoveryKey`] | `LRA2` | local key for the recovery copy of `LP2` |
//! | [`MasterKey`] | `MK` | root secret for per-wallet keys |
//! | [`SyncKey`] | `SyncKey` | path token for the personal sync repo |

use zeroize::ZeroizeOnDrop;

use crate::crypto::encoding;
use crate::crypto::{random_bytes, EncryptionKey};
use crate::error::{Error, Result};

/// Length of every scrypt-derived token and of the master key.
pub const DERIVED_KEY_LEN: usize = 32;

/// Length of the sync-repo path token in raw bytes (40 hex characters).
pub const SYNC_KEY_LEN: usize = 20;

/// Server identifier for the account (`L1`).
#[derive(Clone, PartialEq, Eq, ZeroizeOnDrop)]
pub struct AuthId([u8; DERIVED_KEY_LEN]);

/// Server-visible password token (`P1`).
#[derive(Clone, PartialEq, Eq, ZeroizeOnDrop)]
pub struct PasswordAuth([u8; DERIVED_KEY_LEN]);

/// Server-visible recovery token (`LRA1`).
#[derive(Clone, PartialEq, Eq, ZeroizeOnDrop)]
pub struct RecoveryAuth([u8; DERIVED_KEY_LEN]);

/// Local key for the encrypted sync-repo key and recovery questions (`L2`).
#[derive(Clone, PartialEq, Eq, ZeroizeOnDrop)]
pub struct SyncDirKey([u8; DERIVED_KEY_LEN]);

/// Local key for the encrypted master key (`LP2`).
#[derive(Clone, PartialEq, Eq, ZeroizeOnDrop)]
pub struct LoginKey([u8; DERIVED_KEY_LEN]);

/// Local key for the recovery copy of `LP2` (`LRA2`).
#[derive(Clone, PartialEq, Eq, ZeroizeOnDrop)]
pub struct RecoveryKey([u8; DERIVED_KEY_LEN]);

/// The master key (`MK`): random 32 bytes minted at account creation.
#[derive(Clone, PartialEq, Eq, ZeroizeOnDrop)]
pub struct MasterKey([u8; DERIVED_KEY_LEN]);

/// The sync-repo path token: random 20 bytes, handled as lowercase hex.
#[derive(Clone, PartialEq, Eq, ZeroizeOnDrop)]
pub struct SyncKey([u8; SYNC_KEY_LEN]);

macro_rules! derived_token {
    ($name:ident) => {
        impl $name {
            /// Wrap raw derived bytes.
            pub fn from_bytes(bytes: [u8; DERIVED_KEY_LEN]) -> Self {
                Self(bytes)
            }

            /// The raw bytes.
            pub fn as_bytes(&self) -> &[u8; DERIVED_KEY_LEN] {
                &self.0
            }

            /// The wire form: standard base64.
            pub fn to_base64(&self) -> String {
                encoding::base64_encode(&self.0)
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                // Never print key material
                write!(f, concat!(stringify!($name), "(..)"))
            }
        }
    };
}

macro_rules! local_key {
    ($name:ident) => {
        derived_token!($name);

        impl $name {
            /// View as a symmetric encryption key.
            pub fn encryption_key(&self) -> EncryptionKey {
                EncryptionKey::from_bytes(self.0)
            }
        }
    };
}

derived_token!(AuthId);
derived_token!(PasswordAuth);
derived_token!(RecoveryAuth);
local_key!(SyncDirKey);
local_key!(LoginKey);
local_key!(RecoveryKey);
local_key!(MasterKey);

impl MasterKey {
    /// Mint a fresh random master key.
    pub fn generate() -> Self {
        let bytes = random_bytes(DERIVED_KEY_LEN);
        let mut key = [0u8; DERIVED_KEY_LEN];
        key.copy_from_slice(&bytes);
        Self(key)
    }
}

impl SyncKey {
    /// Mint a fresh random sync-repo token.
    pub fn generate() -> Self {
        let bytes = random_bytes(SYNC_KEY_LEN);
        let mut key = [0u8; SYNC_KEY_LEN];
        key.copy_from_slice(&bytes);
        Self(key)
    }

    /// Parse the lowercase-hex form stored in the Login Package.
    pub fn from_hex(text: &str) -> Result<Self> {
        let bytes = encoding::base16_decode(text)
            .map_err(|_| Error::Corrupt("bad sync key hex".into()))?;
        let bytes: [u8; SYNC_KEY_LEN] = bytes
            .try_into()
            .map_err(|_| Error::Corrupt("bad sync key length".into()))?;
        Ok(Self(bytes))
    }

    /// The hex path token.
    pub fn to_hex(&self) -> String {
        encoding::base16_encode(&self.0)
    }

    /// The raw bytes.
    pub fn as_bytes(&self) -> &[u8; SYNC_KEY_LEN] {
        &self.0
    }
}

impl std::fmt::Debug for SyncKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SyncKey(..)")
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_never_leaks_bytes() {
        let mk = MasterKey::from_bytes([0xAB; 32]);
        let debug = format!("{mk:?}");
        assert_eq!(debug, "MasterKey(..)");
        assert!(!debug.contains("ab"));
    }

    #[test]
    fn test_generate_is_random() {
        assert_ne!(MasterKey::generate(), MasterKey::generate());
        assert_ne!(SyncKey::generate(), SyncKey::generate());
    }

    #[test]
    fn test_sync_key_hex_round_trip() {
        let key = SyncKey::generate();
        let hex = key.to_hex();
        assert_eq!(hex.len(), 40);
        assert_eq!(SyncKey::from_hex(&hex).unwrap(), key);
    }

    #[test]
    fn test_sync_key_rejects_bad_hex() {
        assert!(SyncKey::from_hex("zz").is_err());
        assert!(SyncKey::from_hex("00ff").is_err()); // wrong length
    }

    #[test]
    fn test_base64_wire_form() {
        let l1 = AuthId::from_bytes([0u8; 32]);
        assert_eq!(
            l1.to_base64(),
            "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA="
        );
    }

    #[test]
    fn test_local_key_views_as_encryption_key() {
        let lp2 = LoginKey::from_bytes([3u8; 32]);
        assert_eq!(lp2.encryption_key().as_bytes(), &[3u8; 32]);
    }
}
