//! # Session
//!
//! The in-memory identity of a signed-in user: the canonical username,
//! the account directory, the scrypt profiles, and the materialized keys.
//! A Session can only be built by an orchestrator flow that proved
//! knowledge of the password (it decrypted `EMK`) or of the recovery
//! answers (it decrypted `ELP2`); holding one *is* the authorization to
//! use the keys inside.
//!
//! There is no process-wide registry and no hidden lock. The Session is a
//! value owned by its holder; multi-threaded use is by message passing or
//! by the caller's own lock around the value. Every key field zeroizes on
//! drop, so `logout()` is simply an explicit, logged drop.

use tracing::info;

use crate::error::{Error, Result};
use crate::identity::derivation::ClientSnrps;
use crate::identity::keys::{
    AuthId, LoginKey, MasterKey, PasswordAuth, RecoveryAuth, RecoveryKey, SyncDirKey, SyncKey,
};
use crate::identity::Username;
use crate::store::AccountDir;

/// How much a Session is allowed to do.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessLevel {
    /// Password-proven: every operation is available.
    Full,
    /// Recovery-proven: enough to change the password, not enough to set
    /// new recovery questions. The expected next step is an immediate
    /// password change, which upgrades the Session to `Full`.
    RecoveryOnly,
}

/// An authenticated in-memory holder of derived keys.
#[derive(Debug)]
pub struct Session {
    pub(crate) username: Username,
    pub(crate) account: AccountDir,
    pub(crate) sync_server: String,
    pub(crate) snrps: ClientSnrps,
    pub(crate) access: AccessLevel,

    pub(crate) l1: AuthId,
    pub(crate) p1: Option<PasswordAuth>,
    pub(crate) l2: SyncDirKey,
    pub(crate) lp2: LoginKey,
    pub(crate) mk: MasterKey,
    pub(crate) sync_key: SyncKey,

    pub(crate) lra1: Option<RecoveryAuth>,
    pub(crate) lra2: Option<RecoveryKey>,
}

impl Session {
    /// The canonical username of the signed-in identity.
    pub fn username(&self) -> &Username {
        &self.username
    }

    /// The account's on-disk directory.
    pub fn account_dir(&self) -> &AccountDir {
        &self.account
    }

    /// What this Session may do.
    pub fn access(&self) -> AccessLevel {
        self.access
    }

    /// The master key; gate for per-wallet secrets.
    pub fn data_key(&self) -> &MasterKey {
        &self.mk
    }

    /// The URL of this account's personal encrypted sync repository.
    pub fn sync_repo_url(&self) -> String {
        format!(
            "{}/{}",
            self.sync_server.trim_end_matches('/'),
            self.sync_key.to_hex()
        )
    }

    /// The server auth token pair `(L1, P1)`.
    ///
    /// A recovery-born Session has no password token yet; it must change
    /// the password first.
    pub fn auth_tokens(&self) -> Result<(&AuthId, &PasswordAuth)> {
        match &self.p1 {
            Some(p1) => Ok((&self.l1, p1)),
            None => Err(Error::BadPassword),
        }
    }

    /// End the session. All key material zeroizes as the value drops.
    pub fn logout(self) {
        info!(account = %self.username, "logging out");
        drop(self);
    }
}

// ============================================================================
// TESTS
// ============================================================================
