//! # SNRP scrypt parameter bundles
//!
//! An SNRP ("Salt + N + r + p") pins down one scrypt computation. Two
//! flavors exist:
//!
//! - **Server profile**: compiled-in salt and parameters, identical on
//!   every client, so the server-visible tokens (`L1`, `P1`, `LRA1`) are
//!   reproducible anywhere the user types their credentials.
//! - **Client profile**: a fresh random 32-byte salt per account, with
//!   parameters calibrated once at account-creation time to cost roughly
//!   one second on the creating device.
//!
//! Profiles are created exactly once per account and stored intact in the
//! Care Package; every later derivation reuses the stored parameters.

use std::time::Instant;

use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Fixed salt for the server profile, shared by all clients.
const SERVER_SALT_HEX: &str = "b5865ffb9fa7b3bfe4b2384d47ce831ee22a4a9d5c34c7ef7d21467cc758f81b";

/// Server profile cost parameters.
const SERVER_N: u32 = 16384;
const SERVER_R: u32 = 1;
const SERVER_P: u32 = 1;

/// Client calibration starting point and bounds.
const CLIENT_BASE_N: u32 = 16384;
const CLIENT_BASE_R: u32 = 2;
const CLIENT_MAX_R: u32 = 8;
const CLIENT_TARGET_MS: u128 = 1000;

/// Length of every derived key in bytes.
pub const SCRYPT_OUTPUT_LEN: usize = 32;

/// One scrypt parameter bundle.
///
/// Serializes to the on-disk / on-wire JSON shape
/// `{"salt_hex": …, "n": …, "r": …, "p": …}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnrpProfile {
    /// Hex-encoded salt bytes
    pub salt_hex: String,
    /// CPU/memory cost (must be a power of two greater than one)
    pub n: u32,
    /// Block size
    pub r: u32,
    /// Parallelization
    pub p: u32,
}

impl SnrpProfile {
    /// Build a profile from explicit parameters.
    pub fn new(salt: &[u8], n: u32, r: u32, p: u32) -> Self {
        Self {
            salt_hex: hex::encode(salt),
            n,
            r,
            p,
        }
    }

    /// The fixed server profile. Identical on every client.
    pub fn server() -> Self {
        Self {
            salt_hex: SERVER_SALT_HEX.to_string(),
            n: SERVER_N,
            r: SERVER_R,
            p: SERVER_P,
        }
    }

    /// A fresh client profile: random 32-byte salt, calibrated parameters.
    ///
    /// Calibration runs a single probe at the base parameters and scales
    /// `r` toward [`CLIENT_TARGET_MS`]; a probe that misbehaves (zero or
    /// already over-target elapsed time) leaves the base parameters as-is.
    pub fn client() -> Self {
        let (r, _) = calibrate_client_r();
        Self::client_with_r(r)
    }

    fn client_with_r(r: u32) -> Self {
        let mut salt = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut salt);
        Self::new(&salt, CLIENT_BASE_N, r, 1)
    }

    /// The decoded salt bytes.
    pub fn salt(&self) -> Result<Vec<u8>> {
        hex::decode(&self.salt_hex).map_err(|e| Error::Corrupt(format!("bad SNRP salt: {e}")))
    }

    fn params(&self) -> Result<scrypt::Params> {
        if self.n < 2 || !self.n.is_power_of_two() {
            return Err(Error::Corrupt(format!("bad SNRP n: {}", self.n)));
        }
        let log_n = self.n.trailing_zeros() as u8;
        scrypt::Params::new(log_n, self.r, self.p, SCRYPT_OUTPUT_LEN)
            .map_err(|e| Error::Corrupt(format!("bad SNRP parameters: {e}")))
    }
}

/// Run scrypt over `data` with the given profile, producing 32 bytes.
pub fn scrypt_snrp(data: &[u8], snrp: &SnrpProfile) -> Result<[u8; SCRYPT_OUTPUT_LEN]> {
    let salt = snrp.salt()?;
    let params = snrp.params()?;
    let mut out = [0u8; SCRYPT_OUTPUT_LEN];
    scrypt::scrypt(data, &salt, &params, &mut out)
        .map_err(|e| Error::Corrupt(format!("scrypt failed: {e}")))?;
    Ok(out)
}

/// Time one probe run and pick an `r` aiming at the target cost.
///
/// Returns the chosen `r` and the probe's elapsed milliseconds.
fn calibrate_client_r() -> (u32, u128) {
    let probe = SnrpProfile::new(&[0u8; 32], CLIENT_BASE_N, CLIENT_BASE_R, 1);
    let start = Instant::now();
    let ok = scrypt_snrp(b"snrp-calibration-probe", &probe).is_ok();
    let elapsed = start.elapsed().as_millis();

    if !ok || elapsed == 0 || elapsed >= CLIENT_TARGET_MS {
        return (CLIENT_BASE_R, elapsed);
    }
    let scaled = (CLIENT_BASE_R as u128 * CLIENT_TARGET_MS / elapsed) as u32;
    (scaled.clamp(CLIENT_BASE_R, CLIENT_MAX_R), elapsed)
}
