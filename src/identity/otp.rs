//! Time-based one-time password key for the multi-device second factor.
//!
//! The key lives in cleartext at `<account>/OtpKey.json` as
//! `{"TOTP": base32(key)}`; the login flow computes the current RFC-6238
//! code from it when the server issues a challenge.

use serde::{Deserialize, Serialize};
use totp_rs::{Algorithm, TOTP};
use zeroize::ZeroizeOnDrop;

use crate::crypto::encoding;
use crate::error::{Error, Result};

/// Raw key length in bytes. 20 bytes is the RFC 4226 recommendation.
pub const OTP_KEY_LEN: usize = 20;

/// Code length and time step of the generated passwords.
const OTP_DIGITS: usize = 6;
const OTP_STEP_SECONDS: u64 = 30;

/// A TOTP secret key.
#[derive(Clone, PartialEq, Eq, ZeroizeOnDrop)]
pub struct OtpKey(Vec<u8>);

impl OtpKey {
    /// Mint a fresh random key.
    pub fn generate() -> Self {
        Self(crate::crypto::random_bytes(OTP_KEY_LEN))
    }

    /// Parse the base32 form used by the key file and the server upload.
    pub fn from_base32(text: &str) -> Result<Self> {
        let bytes = encoding::base32_decode(text)
            .map_err(|_| Error::Corrupt("bad TOTP key encoding".into()))?;
        if bytes.len() < 16 {
            return Err(Error::Corrupt("TOTP key too short".into()));
        }
        Ok(Self(bytes))
    }

    /// The base32 form.
    pub fn to_base32(&self) -> String {
        encoding::base32_encode(&self.0)
    }

    /// The current six-digit code for the running 30-second window.
    pub fn current_code(&self) -> Result<String> {
        let totp = TOTP::new(
            Algorithm::SHA1,
            OTP_DIGITS,
            1,
            OTP_STEP_SECONDS,
            self.0.clone(),
        )
        .map_err(|e| Error::Corrupt(format!("bad TOTP key: {e}")))?;
        totp.generate_current()
            .map_err(|e| Error::Corrupt(format!("system clock unavailable: {e}")))
    }
}

impl std::fmt::Debug for OtpKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OtpKey(..)")
    }
}

/// On-disk shape of `OtpKey.json`.
#[derive(Serialize, Deserialize)]
pub struct OtpKeyFile {
    /// Base32 of the TOTP secret
    #[serde(rename = "TOTP")]
    pub totp: String,
}

impl OtpKeyFile {
    /// Wrap a key for writing.
    pub fn from_key(key: &OtpKey) -> Self {
        Self {
            totp: key.to_base32(),
        }
    }

    /// Decode the stored key.
    pub fn key(&self) -> Result<OtpKey> {
        OtpKey::from_base32(&self.totp)
    }
}

// ============================================================================
// TESTS
// ============================================================================
