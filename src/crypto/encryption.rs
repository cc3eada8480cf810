//! # Authenticated AES-256-CBC
//!
//! The at-rest cipher for every sensitive value. CBC with PKCS#7 padding is
//! not authenticated on its own, so an HMAC-SHA256 tag over the payload is
//! prepended (length-prefixed) to the plaintext before encryption and
//! verified after decryption:
//!
//! ```text
//! plaintext on the wire = [tag_len: 1 byte] || hmac_sha256(payload, key) || payload
//! ciphertext            = AES-256-CBC(plaintext, key, random 16-byte IV)
//! ```
//!
//! Decryption fails with `DecryptFailure` on bad padding, a missing tag, or
//! a tag mismatch. The check is not optional: skipping it would let an
//! attacker splice ciphertext blocks undetected.

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use zeroize::ZeroizeOnDrop;

use crate::error::{Error, Result};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;
type HmacSha256 = Hmac<Sha256>;

/// Size of the AES-CBC initialization vector in bytes
pub const IV_SIZE: usize = 16;

/// Size of the encryption key in bytes (256 bits)
pub const KEY_SIZE: usize = 32;

/// Size of the HMAC-SHA256 authenticator tag in bytes
pub const TAG_SIZE: usize = 32;

/// A random per-message initialization vector.
///
/// Never reused; [`encrypt`] draws a fresh one from the OS RNG for every
/// call and returns it alongside the ciphertext.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Iv(pub [u8; IV_SIZE]);

impl Iv {
    /// Generate a cryptographically random IV
    pub fn random() -> Self {
        let mut bytes = [0u8; IV_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Create from existing bytes
    pub fn from_bytes(bytes: [u8; IV_SIZE]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8; IV_SIZE] {
        &self.0
    }
}

/// A 256-bit symmetric key, zeroized when dropped.
#[derive(Clone, ZeroizeOnDrop)]
pub struct EncryptionKey([u8; KEY_SIZE]);

impl EncryptionKey {
    /// Create from raw bytes
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Get the raw key bytes
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

/// Generate `n` cryptographically secure random bytes.
pub fn random_bytes(n: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; n];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    bytes
}

/// HMAC-SHA256 of `msg` under `key`.
pub fn hmac_sha256(msg: &[u8], key: &[u8]) -> [u8; TAG_SIZE] {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(msg);
    mac.finalize().into_bytes().into()
}

/// Encrypt `payload` under `key`, returning `(iv, ciphertext)`.
///
/// The authenticator tag is computed over the bare payload and travels
/// inside the ciphertext; see the module docs for the layout.
pub fn encrypt(key: &EncryptionKey, payload: &[u8]) -> (Iv, Vec<u8>) {
    let iv = Iv::random();

    let tag = hmac_sha256(payload, key.as_bytes());
    let mut plaintext = Vec::with_capacity(1 + TAG_SIZE + payload.len());
    plaintext.push(TAG_SIZE as u8);
    plaintext.extend_from_slice(&tag);
    plaintext.extend_from_slice(payload);

    let ciphertext = Aes256CbcEnc::new(&(*key.as_bytes()).into(), &iv.0.into())
        .encrypt_padded_vec_mut::<Pkcs7>(&plaintext);

    (iv, ciphertext)
}

/// Decrypt and authenticate, returning the bare payload.
///
/// ## Errors
///
/// `DecryptFailure` if the padding is invalid, the tag is absent or
/// malformed, or the tag does not verify.
pub fn decrypt(key: &EncryptionKey, iv: &Iv, ciphertext: &[u8]) -> Result<Vec<u8>> {
    let plaintext = Aes256CbcDec::new(&(*key.as_bytes()).into(), &iv.0.into())
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| Error::DecryptFailure("bad padding".into()))?;

    if plaintext.len() < 1 + TAG_SIZE || plaintext[0] as usize != TAG_SIZE {
        return Err(Error::DecryptFailure("missing authenticator tag".into()));
    }
    let tag = &plaintext[1..1 + TAG_SIZE];
    let payload = &plaintext[1 + TAG_SIZE..];

    let mut mac = HmacSha256::new_from_slice(key.as_bytes()).expect("HMAC accepts any key length");
    mac.update(payload);
    mac.verify_slice(tag)
        .map_err(|_| Error::DecryptFailure("authenticator tag mismatch".into()))?;

    Ok(payload.to_vec())
}

// ============================================================================
// TESTS
// ============================================================================
