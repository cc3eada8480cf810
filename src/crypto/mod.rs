//! Cryptographic building blocks: codecs, scrypt parameter bundles,
//! authenticated AES-256-CBC, and the encrypted JSON envelope.
//!
//! Nothing here is a primitive implementation; this module composes the
//! RustCrypto crates into the exact shapes the login core stores and
//! transmits.

pub mod encoding;
pub mod encryption;
pub mod envelope;
pub mod snrp;

pub use encryption::{decrypt, encrypt, hmac_sha256, random_bytes, EncryptionKey, Iv};
pub use envelope::Envelope;
pub use snrp::{scrypt_snrp, SnrpProfile};
