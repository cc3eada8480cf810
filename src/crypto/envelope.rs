//! # Encrypted JSON envelope
//!
//! The sole at-rest format for sensitive values. An envelope is a small
//! tagged JSON record:
//!
//! ```text
//! { "data": base64(ciphertext), "iv": hex(iv), "type": 0 }
//! ```
//!
//! where the ciphertext is the authenticated AES-256-CBC output of
//! [`crate::crypto::encryption`] (the HMAC tag travels inside it,
//! length-prefixed ahead of the payload). Type code `0` is the only one
//! defined; anything else fails with `DecryptFailure` so that a future
//! format bump cannot be silently misread.
//!
//! Field order is irrelevant on read. On write the keys are emitted in the
//! order above.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::crypto::encryption::{self, EncryptionKey, Iv, IV_SIZE};
use crate::error::{Error, Result};

/// Type code for AES-256-CBC with an HMAC-SHA256 authenticator.
pub const ENVELOPE_TYPE_AES256_HMAC: u32 = 0;

/// The tagged encrypted record wrapping any JSON payload under a key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Base64 of the authenticated ciphertext
    pub data: String,
    /// Hex of the 16-byte CBC initialization vector
    pub iv: String,
    /// Format type code
    #[serde(rename = "type")]
    pub type_code: u32,
}

impl Envelope {
    /// Encrypt raw bytes into an envelope.
    pub fn seal_bytes(payload: &[u8], key: &EncryptionKey) -> Self {
        let (iv, ciphertext) = encryption::encrypt(key, payload);
        Self {
            data: crate::crypto::encoding::base64_encode(&ciphertext),
            iv: crate::crypto::encoding::base16_encode(iv.as_bytes()),
            type_code: ENVELOPE_TYPE_AES256_HMAC,
        }
    }

    /// Decrypt an envelope back to raw bytes.
    pub fn open_bytes(&self, key: &EncryptionKey) -> Result<Vec<u8>> {
        if self.type_code != ENVELOPE_TYPE_AES256_HMAC {
            return Err(Error::DecryptFailure(format!(
                "unknown envelope type {}",
                self.type_code
            )));
        }
        let iv_bytes = crate::crypto::encoding::base16_decode(&self.iv)
            .map_err(|_| Error::DecryptFailure("bad envelope iv".into()))?;
        let iv_bytes: [u8; IV_SIZE] = iv_bytes
            .try_into()
            .map_err(|_| Error::DecryptFailure("bad envelope iv length".into()))?;
        let ciphertext = crate::crypto::encoding::base64_decode(&self.data)
            .map_err(|_| Error::DecryptFailure("bad envelope data".into()))?;
        encryption::decrypt(key, &Iv::from_bytes(iv_bytes), &ciphertext)
    }

    /// Serialize a value to JSON and seal it.
    pub fn seal_json<T: Serialize>(payload: &T, key: &EncryptionKey) -> Result<Self> {
        let bytes = serde_json::to_vec(payload)?;
        Ok(Self::seal_bytes(&bytes, key))
    }

    /// Open an envelope and deserialize the payload.
    ///
    /// A payload that decrypts but does not parse is `DecryptFailure`
    /// rather than `Corrupt`: the overwhelmingly likely cause is a wrong
    /// key producing garbage that happened to unpad.
    pub fn open_json<T: DeserializeOwned>(&self, key: &EncryptionKey) -> Result<T> {
        let bytes = self.open_bytes(key)?;
        serde_json::from_slice(&bytes)
            .map_err(|e| Error::DecryptFailure(format!("payload did not parse: {e}")))
    }
}

// ============================================================================
// TESTS
// ============================================================================
