//! Byte-string codecs used across the wire protocol and the on-disk files.
//!
//! Base16 is lowercase hex. Base58 uses the Bitcoin alphabet. Base64 is the
//! standard alphabet with padding (the form the account server expects for
//! credential fields). Base32 is RFC 4648 without padding, the alphabet the
//! TOTP key file uses.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use data_encoding::BASE32_NOPAD;

use crate::error::{Error, Result};

/// Encode bytes as lowercase hex.
pub fn base16_encode(data: &[u8]) -> String {
    hex::encode(data)
}

/// Decode lowercase or uppercase hex.
pub fn base16_decode(text: &str) -> Result<Vec<u8>> {
    hex::decode(text).map_err(|e| Error::Corrupt(format!("bad hex: {e}")))
}

/// Encode bytes with the Bitcoin base58 alphabet.
pub fn base58_encode(data: &[u8]) -> String {
    bs58::encode(data).into_string()
}

/// Decode a Bitcoin-alphabet base58 string.
pub fn base58_decode(text: &str) -> Result<Vec<u8>> {
    bs58::decode(text)
        .into_vec()
        .map_err(|e| Error::Corrupt(format!("bad base58: {e}")))
}

/// Encode bytes as standard padded base64.
pub fn base64_encode(data: &[u8]) -> String {
    BASE64.encode(data)
}

/// Decode standard padded base64.
pub fn base64_decode(text: &str) -> Result<Vec<u8>> {
    BASE64
        .decode(text)
        .map_err(|e| Error::Corrupt(format!("bad base64: {e}")))
}

/// Encode bytes as unpadded RFC 4648 base32 (the TOTP key alphabet).
pub fn base32_encode(data: &[u8]) -> String {
    BASE32_NOPAD.encode(data)
}

/// Decode unpadded RFC 4648 base32. Lowercase input is accepted.
pub fn base32_decode(text: &str) -> Result<Vec<u8>> {
    BASE32_NOPAD
        .decode(text.to_ascii_uppercase().as_bytes())
        .map_err(|e| Error::Corrupt(format!("bad base32: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base16_round_trip() {
        let data = [0u8, 1, 2, 0xfe, 0xff];
        assert_eq!(base16_encode(&data), "000102feff");
        assert_eq!(base16_decode("000102feff").unwrap(), data);
    }

    #[test]
    fn test_base58_uses_bitcoin_alphabet() {
        // Leading zero bytes become '1' in the Bitcoin alphabet
        assert_eq!(base58_encode(&[0, 0, 1]), "112");
        assert_eq!(base58_decode("112").unwrap(), vec![0, 0, 1]);
    }

    #[test]
    fn test_base64_round_trip() {
        let data = b"quiver";
        let text = base64_encode(data);
        assert_eq!(base64_decode(&text).unwrap(), data);
    }

    #[test]
    fn test_base32_round_trip_case_insensitive() {
        let data = b"otp key material";
        let text = base32_encode(data);
        assert_eq!(base32_decode(&text).unwrap(), data);
        assert_eq!(base32_decode(&text.to_ascii_lowercase()).unwrap(), data);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(base16_decode("zz").is_err());
        assert!(base58_decode("0OIl").is_err());
        assert!(base64_decode("!!!").is_err());
        assert!(base32_decode("189").is_err());
    }
}
