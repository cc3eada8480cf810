//! # The derivation graph
//!
//! Computes the tokens and keys of the login scheme from the identity
//! inputs and the account's scrypt profiles:
//!
//! ```text
//! L   = utf8(canonical username)          P   = utf8(password)
//! LRA = L || recovery answers             LP  = L || P
//!
//! L1   = scrypt(L,   server profile)      server account identifier
//! P1   = scrypt(P,   server profile)      server password token
//! LRA1 = scrypt(LRA, server profile)      server recovery token
//! L2   = scrypt(L,   SNRP4)               sync-dir key
//! LP2  = scrypt(LP,  SNRP2)               login key (wraps MK)
//! LRA2 = scrypt(LRA, SNRP3)               recovery key (wraps LP2)
//! ```
//!
//! Each scrypt run costs on the order of a second, so results are
//! memoized: a [`KeyMaterial`] computes each node at most once and only
//! when asked. Intermediates are never logged and the seeds are wiped on
//! drop.

use zeroize::Zeroizing;

use crate::crypto::snrp::{scrypt_snrp, SnrpProfile};
use crate::error::{Error, Result};
use crate::identity::keys::{
    AuthId, LoginKey, PasswordAuth, RecoveryAuth, RecoveryKey, SyncDirKey,
};
use crate::identity::Username;

/// `L1` without the rest of the graph.
///
/// The account-server identifier depends only on the username and the
/// fixed server profile, so fetching a Care Package needs nothing else.
pub fn derive_auth_id(username: &Username) -> Result<AuthId> {
    let out = scrypt_snrp(username.seed_bytes(), &SnrpProfile::server())?;
    Ok(AuthId::from_bytes(out))
}

/// The three client scrypt profiles of one account, as stored in the Care
/// Package.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientSnrps {
    /// SNRP2, derives `LP2`
    pub snrp2: SnrpProfile,
    /// SNRP3, derives `LRA2`
    pub snrp3: SnrpProfile,
    /// SNRP4, derives `L2`
    pub snrp4: SnrpProfile,
}

impl ClientSnrps {
    /// Mint three fresh calibrated profiles (account creation).
    pub fn generate() -> Self {
        Self {
            snrp2: SnrpProfile::client(),
            snrp3: SnrpProfile::client(),
            snrp4: SnrpProfile::client(),
        }
    }
}

/// Lazily-memoizing holder of one identity's derivation graph.
///
/// Construct with the inputs the operation has; each accessor either
/// returns the memoized node or computes it. Asking for a node whose seed
/// was not supplied reports the same error the caller would surface for
/// wrong credentials, since the operation cannot proceed either way.
pub struct KeyMaterial {
    username: Username,
    password: Option<Zeroizing<String>>,
    recovery_answers: Option<Zeroizing<String>>,
    server_snrp: SnrpProfile,
    client: ClientSnrps,

    l1: Option<AuthId>,
    p1: Option<PasswordAuth>,
    lra1: Option<RecoveryAuth>,
    l2: Option<SyncDirKey>,
    lp2: Option<LoginKey>,
    lra2: Option<RecoveryKey>,
}

impl KeyMaterial {
    /// Start a graph with no secrets (enough for `L1` and `L2`).
    pub fn new(username: Username, client: ClientSnrps) -> Self {
        Self {
            username,
            password: None,
            recovery_answers: None,
            server_snrp: SnrpProfile::server(),
            client,
            l1: None,
            p1: None,
            lra1: None,
            l2: None,
            lp2: None,
            lra2: None,
        }
    }

    /// Supply the password seed.
    pub fn with_password(mut self, password: &str) -> Self {
        self.password = Some(Zeroizing::new(password.to_string()));
        self
    }

    /// Supply the recovery-answers seed.
    pub fn with_recovery_answers(mut self, answers: &str) -> Self {
        self.recovery_answers = Some(Zeroizing::new(answers.to_string()));
        self
    }

    /// Seed an `L1` computed earlier (for example by [`derive_auth_id`]),
    /// skipping a redundant scrypt run.
    pub fn with_l1(mut self, l1: AuthId) -> Self {
        self.l1 = Some(l1);
        self
    }

    /// The canonical username this graph is rooted at.
    pub fn username(&self) -> &Username {
        &self.username
    }

    /// The client profiles in use.
    pub fn client_snrps(&self) -> &ClientSnrps {
        &self.client
    }

    /// `L1 = scrypt(L, server profile)`
    pub fn l1(&mut self) -> Result<AuthId> {
        if let Some(l1) = &self.l1 {
            return Ok(l1.clone());
        }
        let out = scrypt_snrp(self.username.seed_bytes(), &self.server_snrp)?;
        let l1 = AuthId::from_bytes(out);
        self.l1 = Some(l1.clone());
        Ok(l1)
    }

    /// `P1 = scrypt(P, server profile)`
    pub fn p1(&mut self) -> Result<PasswordAuth> {
        if let Some(p1) = &self.p1 {
            return Ok(p1.clone());
        }
        let password = self.password.as_ref().ok_or(Error::BadPassword)?;
        let out = scrypt_snrp(password.as_bytes(), &self.server_snrp)?;
        let p1 = PasswordAuth::from_bytes(out);
        self.p1 = Some(p1.clone());
        Ok(p1)
    }

    /// `LRA1 = scrypt(L || answers, server profile)`
    pub fn lra1(&mut self) -> Result<RecoveryAuth> {
        if let Some(lra1) = &self.lra1 {
            return Ok(lra1.clone());
        }
        let seed = self.recovery_seed()?;
        let out = scrypt_snrp(&seed, &self.server_snrp)?;
        let lra1 = RecoveryAuth::from_bytes(out);
        self.lra1 = Some(lra1.clone());
        Ok(lra1)
    }

    /// `L2 = scrypt(L, SNRP4)`
    pub fn l2(&mut self) -> Result<SyncDirKey> {
        if let Some(l2) = &self.l2 {
            return Ok(l2.clone());
        }
        let out = scrypt_snrp(self.username.seed_bytes(), &self.client.snrp4)?;
        let l2 = SyncDirKey::from_bytes(out);
        self.l2 = Some(l2.clone());
        Ok(l2)
    }

    /// `LP2 = scrypt(L || P, SNRP2)`
    pub fn lp2(&mut self) -> Result<LoginKey> {
        if let Some(lp2) = &self.lp2 {
            return Ok(lp2.clone());
        }
        let password = self.password.as_ref().ok_or(Error::BadPassword)?;
        let mut seed = Zeroizing::new(Vec::with_capacity(
            self.username.seed_bytes().len() + password.len(),
        ));
        seed.extend_from_slice(self.username.seed_bytes());
        seed.extend_from_slice(password.as_bytes());
        let out = scrypt_snrp(&seed, &self.client.snrp2)?;
        let lp2 = LoginKey::from_bytes(out);
        self.lp2 = Some(lp2.clone());
        Ok(lp2)
    }

    /// `LRA2 = scrypt(L || answers, SNRP3)`
    pub fn lra2(&mut self) -> Result<RecoveryKey> {
        if let Some(lra2) = &self.lra2 {
            return Ok(lra2.clone());
        }
        let seed = self.recovery_seed()?;
        let out = scrypt_snrp(&seed, &self.client.snrp3)?;
        let lra2 = RecoveryKey::from_bytes(out);
        self.lra2 = Some(lra2.clone());
        Ok(lra2)
    }

    fn recovery_seed(&self) -> Result<Zeroizing<Vec<u8>>> {
        let answers = self
            .recovery_answers
            .as_ref()
            .ok_or(Error::BadRecoveryAnswers)?;
        let mut seed = Zeroizing::new(Vec::with_capacity(
            self.username.seed_bytes().len() + answers.len(),
        ));
        seed.extend_from_slice(self.username.seed_bytes());
        seed.extend_from_slice(answers.as_bytes());
        Ok(seed)
    }
}

// ============================================================================
// TESTS
// ============================================================================
