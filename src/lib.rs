//! # Quiver Core
//!
//! The client-side identity and key-management core of the Quiver Bitcoin
//! wallet: a human username plus a password (or recovery answers) in, a
//! signed-in [`Session`] with materialized keys out.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        QUIVER CORE MODULES                              │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────┐   ┌──────────────┐   ┌──────────────┐                  │
//! │  │   Login     │   │   Settings   │   │    Store     │                  │
//! │  │             │   │              │   │              │                  │
//! │  │ - create    │   │ - encrypted  │   │ - Accounts/  │                  │
//! │  │ - sign in   │   │   record     │   │ - packages   │                  │
//! │  │ - recovery  │   │ - categories │   │ - OTP key    │                  │
//! │  │ - Session   │   │              │   │ - sidecars   │                  │
//! │  └──────┬──────┘   └──────┬───────┘   └──────┬───────┘                  │
//! │         │                 │                  │                          │
//! │         └────────────┬────┴──────────────────┘                          │
//! │                      │                                                  │
//! │  ┌─────────────┐   ┌─┴────────────┐   ┌──────────────┐                  │
//! │  │   Server    │   │   Identity   │   │    Crypto    │                  │
//! │  │             │   │              │   │              │                  │
//! │  │ - wire      │   │ - canonical  │   │ - SNRP/scrypt│                  │
//! │  │   protocol  │   │   username   │   │ - AES-CBC +  │                  │
//! │  │ - Transport │   │ - derivation │   │   HMAC       │                  │
//! │  │   seam      │   │ - typed keys │   │ - envelope   │                  │
//! │  └─────────────┘   └──────────────┘   └──────────────┘                  │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Security Model
//!
//! The account server never sees the username, the password, the master
//! key, or the sync key. It stores only scrypt-derived tokens (`L1`,
//! `P1`, `LRA1`) and opaque encrypted packages; every sensitive value at
//! rest is wrapped in an authenticated AES-256-CBC envelope. Derived keys
//! are purpose-tagged types that zeroize on drop, and the [`Session`] is
//! an explicit value owned by the caller: there is no process-wide key
//! cache and no hidden lock.
//!
//! ## Example
//!
//! ```ignore
//! use quiver_core::{CoreConfig, LoginManager};
//!
//! let config = CoreConfig::new(
//!     "https://auth.example.com/api/v1",
//!     "https://sync.example.com/repos",
//! )?;
//! let manager = LoginManager::new("/home/user/.quiver", &config);
//!
//! let session = manager.create_account("Alice", "correct horse battery staple")?;
//! let settings = manager.load_settings(&session)?;
//! session.logout();
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

// ============================================================================
// MODULE DECLARATIONS
// ============================================================================

pub mod crypto;
pub mod error;
pub mod identity;
pub mod login;
pub mod server;
pub mod settings;
pub mod store;

// ============================================================================
// RE-EXPORTS
// ============================================================================

pub use error::{Error, Result};
pub use identity::otp::OtpKey;
pub use identity::Username;
pub use login::session::{AccessLevel, Session};
pub use login::{CoreConfig, LoginManager, RecoveryHandle};
pub use settings::Settings;
pub use store::AccountStore;

/// Returns the version of Quiver Core
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
