//! # Login orchestration
//!
//! The state machine that turns credentials into a [`Session`] and keeps
//! the local directory, the account server, and the sync repo in step.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                          LOGIN FLOWS                                │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │                                                                     │
//! │  create ───► mint SNRPs/MK/SyncKey ──► server create ──► persist    │
//! │                                                                     │
//! │  sign-in ──► packages (disk, else server fetch + OTP retry)         │
//! │          ──► derive LP2/L2 ──► decrypt EMK/ESyncKey ──► Session     │
//! │                                                                     │
//! │  change-password ──► new P1/LP2 ──► server update ──► local writes  │
//! │                      (server first; afterwards the new credentials  │
//! │                       are authoritative, local retries follow)      │
//! │                                                                     │
//! │  set-recovery ──► fresh SNRP3, LRA1/LRA2, ERQ ──► sidecars          │
//! │               ──► server upload ──► persist Care Package            │
//! │                                                                     │
//! │  recover ──► fetch questions (RecoveryHandle owns the Care Package) │
//! │          ──► answers prove LRA1 to the server, LRA2 opens ELP2      │
//! │          ──► limited Session, immediate password change expected    │
//! │                                                                     │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Ordering rules the flows must not reverse:
//!
//! - `create` touches local disk only after the server acknowledged.
//! - `change_password` and `set_recovery` change server state before
//!   local state; a device that wrote locally first could diverge from
//!   server truth.

pub mod session;

use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::identity::derivation::{derive_auth_id, ClientSnrps, KeyMaterial};
use crate::identity::keys::{MasterKey, SyncKey};
use crate::identity::otp::OtpKey;
use crate::identity::Username;
use crate::server::transport::{HttpTransport, Transport};
use crate::server::{ServerAuth, ServerClient};
use crate::settings::Settings;
use crate::store::packages::{open_elp2, seal_elp2, seal_elra2, CarePackage, LoginPackage};
use crate::store::{AccountDir, AccountStore};
use session::{AccessLevel, Session};

pub use session::AccessLevel as SessionAccess;

/// Host-supplied configuration: where the account server and the sync
/// server live.
///
/// Both URLs must be `https`; plain `http` is accepted only for loopback
/// hosts so integration setups can run a server on the same machine.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    account_server: String,
    sync_server: String,
}

impl CoreConfig {
    /// Validate and build a configuration.
    pub fn new(account_server: impl Into<String>, sync_server: impl Into<String>) -> Result<Self> {
        let account_server = account_server.into();
        let sync_server = sync_server.into();
        require_secure_url(&account_server)?;
        require_secure_url(&sync_server)?;
        Ok(Self {
            account_server,
            sync_server,
        })
    }

    /// The account-server base URL.
    pub fn account_server(&self) -> &str {
        &self.account_server
    }

    /// The sync-server base URL.
    pub fn sync_server(&self) -> &str {
        &self.sync_server
    }
}

fn require_secure_url(url: &str) -> Result<()> {
    let loopback = url.contains("://localhost") || url.contains("://127.0.0.1");
    if url.starts_with("https://") || (url.starts_with("http://") && loopback) {
        Ok(())
    } else {
        Err(Error::Network(format!("insecure server URL: {url}")))
    }
}

/// Recovery state carried between `fetch_recovery_questions` and the
/// answer-consuming calls.
///
/// The handle owns the fetched Care Package until consumed or dropped;
/// there is no ambient package cache.
pub struct RecoveryHandle {
    username: Username,
    care: CarePackage,
}

impl RecoveryHandle {
    /// Whose recovery this is.
    pub fn username(&self) -> &Username {
        &self.username
    }
}

/// The login orchestrator: every account operation enters here.
pub struct LoginManager<T: Transport> {
    store: AccountStore,
    server: ServerClient<T>,
    sync_server: String,
    snrp_factory: fn() -> crate::crypto::SnrpProfile,
}

impl LoginManager<HttpTransport> {
    /// Connect to the configured account server over HTTPS.
    pub fn new(root: impl AsRef<std::path::Path>, config: &CoreConfig) -> Self {
        Self::with_transport(root, config, HttpTransport::new(&config.account_server))
    }
}

impl<T: Transport> LoginManager<T> {
    /// Build over an explicit transport (tests use an in-memory server).
    pub fn with_transport(
        root: impl AsRef<std::path::Path>,
        config: &CoreConfig,
        transport: T,
    ) -> Self {
        Self {
            store: AccountStore::new(root),
            server: ServerClient::new(transport),
            sync_server: config.sync_server.clone(),
            snrp_factory: crate::crypto::SnrpProfile::client,
        }
    }

    /// The local account store.
    pub fn store(&self) -> &AccountStore {
        &self.store
    }

    /// Canonical usernames of all accounts on this device.
    pub fn list_accounts(&self) -> Result<Vec<Username>> {
        self.store.list()
    }

    // ------------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------------

    /// Create the account on the server and on disk, returning a signed-in
    /// Session.
    ///
    /// A local directory that already holds packages is a collision. One
    /// that holds only a pre-provisioned TOTP key is reused. Local writes
    /// happen strictly after the server acknowledged; if they fail, the
    /// next sign-in repopulates from the server.
    pub fn create_account(&self, username: &str, password: &str) -> Result<Session> {
        let username = Username::canonicalize(username)?;
        let existing = self.store.find(username.as_str())?;
        if let Some(dir) = &existing {
            if dir.read_care_package()?.is_some() || dir.read_login_package()?.is_some() {
                return Err(Error::AccountAlreadyExists);
            }
        }
        info!(account = %username, "creating account");

        let snrps = self.generate_snrps();
        let mk = MasterKey::generate();
        let sync_key = SyncKey::generate();

        let mut keys = KeyMaterial::new(username.clone(), snrps.clone()).with_password(password);
        let l1 = keys.l1()?;
        let p1 = keys.p1()?;
        let l2 = keys.l2()?;
        let lp2 = keys.lp2()?;

        // Full rewrite: a fresh account has no unknown fields to preserve.
        let care = CarePackage::new(&snrps);
        let login = LoginPackage::build(&mk, &sync_key, &lp2, &l2)?;

        self.server.create(
            &l1,
            &p1,
            &care.to_json_string()?,
            &login.to_json_string()?,
            &sync_key,
        )?;

        let created_here = existing.is_none();
        let dir = match existing {
            Some(dir) => dir,
            None => self.store.create(&username)?,
        };
        if let Err(e) = dir.write_packages(&care, &login) {
            if created_here {
                let _ = self.store.delete(&username);
            }
            return Err(e);
        }

        Ok(Session {
            username,
            account: dir,
            sync_server: self.sync_server.clone(),
            snrps,
            access: AccessLevel::Full,
            l1,
            p1: Some(p1),
            l2,
            lp2,
            mk,
            sync_key,
            lra1: None,
            lra2: None,
        })
    }

    // ------------------------------------------------------------------------
    // Sign-in
    // ------------------------------------------------------------------------

    /// Password sign-in. Loads packages from disk, falling back to a
    /// server fetch (which may carry a second-factor challenge).
    pub fn sign_in(&self, username: &str, password: &str) -> Result<Session> {
        let username = Username::canonicalize(username)?;
        let local = self.store.find(username.as_str())?;

        let local_packages = match &local {
            Some(dir) => match (dir.read_care_package()?, dir.read_login_package()?) {
                (Some(care), Some(login)) => Some((care, login)),
                _ => None,
            },
            None => None,
        };

        let (care, login, fetched) = match local_packages {
            Some((care, login)) => (care, login, false),
            None => {
                let l1 = derive_auth_id(&username)?;
                let care = CarePackage::from_json_str(&self.server.get_care_package(&l1)?)?;
                let mut keys = KeyMaterial::new(username.clone(), care.client_snrps())
                    .with_l1(l1.clone())
                    .with_password(password);
                let p1 = keys.p1()?;
                let login_json = self.with_otp_retry(local.as_ref(), |otp| {
                    self.server
                        .get_login_package(&l1, ServerAuth::Password(&p1), otp)
                })?;
                (care, LoginPackage::from_json_str(&login_json)?, true)
            }
        };

        let mut keys = KeyMaterial::new(username.clone(), care.client_snrps())
            .with_password(password);
        let lp2 = keys.lp2()?;
        let mk = login.master_key(&lp2)?;
        let l2 = keys.l2()?;
        let sync_key = login.sync_key(&l2)?;
        let l1 = keys.l1()?;
        let p1 = keys.p1()?;

        let dir = match local {
            Some(dir) => dir,
            None => self.store.create(&username)?,
        };
        if fetched {
            dir.write_packages(&care, &login)?;
        }

        info!(account = %username, "signed in");
        Ok(Session {
            username,
            account: dir,
            sync_server: self.sync_server.clone(),
            snrps: care.client_snrps(),
            access: AccessLevel::Full,
            l1,
            p1: Some(p1),
            l2,
            lp2,
            mk,
            sync_key,
            lra1: None,
            lra2: None,
        })
    }

    // ------------------------------------------------------------------------
    // Change password
    // ------------------------------------------------------------------------

    /// Rotate the password. See [`Self::change_password_with_rewrite`].
    pub fn change_password(&self, session: &mut Session, new_password: &str) -> Result<()> {
        self.change_password_with_rewrite(session, new_password, |_| Ok(()))
    }

    /// Rotate the password, running `rewrite` between server acceptance
    /// and local persistence so the wallet layer can re-wrap per-wallet
    /// keys under the new credentials.
    ///
    /// Once the server accepts, the new credentials are authoritative:
    /// a failure in the hook or in the local writes is reported, but the
    /// session keeps the new keys and the next sign-in reconciles disk
    /// state from the server.
    pub fn change_password_with_rewrite<F>(
        &self,
        session: &mut Session,
        new_password: &str,
        rewrite: F,
    ) -> Result<()>
    where
        F: FnOnce(&MasterKey) -> Result<()>,
    {
        info!(account = %session.username, "changing password");

        let mut new_keys = KeyMaterial::new(session.username.clone(), session.snrps.clone())
            .with_l1(session.l1.clone())
            .with_password(new_password);
        let new_p1 = new_keys.p1()?;
        let new_lp2 = new_keys.lp2()?;

        // Re-wrap the master key under the new login key; the sync-key
        // envelope is untouched. A device whose local package is missing
        // rebuilds the record outright.
        let new_login = match session.account.read_login_package()? {
            Some(current) => current.rewrap_master_key(&session.mk, &new_lp2),
            None => LoginPackage::build(&session.mk, &session.sync_key, &new_lp2, &session.l2)?,
        };
        let new_login_json = new_login.to_json_string()?;

        let auth = match (&session.p1, &session.lra1) {
            (Some(p1), _) => ServerAuth::Password(p1),
            (None, Some(lra1)) => ServerAuth::Recovery(lra1),
            (None, None) => return Err(Error::BadPassword),
        };
        self.with_otp_retry(Some(&session.account), |otp| {
            self.server
                .change_password(&session.l1, auth, &new_p1, &new_login_json, otp)
        })?;

        // Server truth has moved; adopt the new credentials before any
        // fallible local step.
        let old_lp2 = std::mem::replace(&mut session.lp2, new_lp2);
        session.p1 = Some(new_p1);
        session.access = AccessLevel::Full;

        let mut first_failure: Option<Error> = None;

        if let Err(e) = rewrite(&session.mk) {
            warn!(account = %session.username, "wallet key rewrite failed: {e}");
            first_failure.get_or_insert(e);
        }

        if let Err(e) = session.account.write_login_package(&new_login) {
            warn!(account = %session.username, "local login package write failed: {e}");
            first_failure.get_or_insert(e);
        }

        // Refresh the recovery sidecars if recovery is set. ELRA2 exists
        // exactly so this step can recover LRA2 from the old login key.
        match session.account.read_elra2() {
            Ok(Some(elra2_env)) => {
                let lra2 = session
                    .lra2
                    .clone()
                    .map(Ok)
                    .unwrap_or_else(|| {
                        elra2_env
                            .open_bytes(&old_lp2.encryption_key())
                            .map_err(|e| {
                                Error::DecryptFailure(format!("recovery sidecar: {e}"))
                            })
                            .and_then(|bytes| {
                                let bytes: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
                                    Error::Corrupt("recovery sidecar has wrong length".into())
                                })?;
                                Ok(crate::identity::keys::RecoveryKey::from_bytes(bytes))
                            })
                    });
                match lra2 {
                    Ok(lra2) => {
                        let elp2 = seal_elp2(&session.lp2, &lra2);
                        let elra2 = seal_elra2(&lra2, &session.lp2);
                        if let Err(e) = session.account.write_recovery_sidecars(&elp2, &elra2) {
                            warn!(account = %session.username, "sidecar rewrite failed: {e}");
                            first_failure.get_or_insert(e);
                        }
                        session.lra2 = Some(lra2);
                    }
                    Err(e) => {
                        warn!(account = %session.username, "sidecar rewrite failed: {e}");
                        first_failure.get_or_insert(e);
                    }
                }
            }
            Ok(None) => {}
            Err(e) => {
                first_failure.get_or_insert(e);
            }
        }

        match first_failure {
            None => Ok(()),
            Some(e) => Err(e),
        }
    }

    // ------------------------------------------------------------------------
    // Recovery
    // ------------------------------------------------------------------------

    /// Install recovery questions and answers for a password-proven
    /// Session.
    pub fn set_recovery(
        &self,
        session: &mut Session,
        questions: &str,
        answers: &str,
    ) -> Result<()> {
        if session.access != AccessLevel::Full {
            return Err(Error::BadPassword);
        }
        info!(account = %session.username, "setting recovery");

        let mut snrps = session.snrps.clone();
        snrps.snrp3 = (self.snrp_factory)();

        let mut keys = KeyMaterial::new(session.username.clone(), snrps.clone())
            .with_l1(session.l1.clone())
            .with_recovery_answers(answers);
        let lra1 = keys.lra1()?;
        let lra2 = keys.lra2()?;

        // Edit-style write: unknown Care Package fields survive.
        let mut care = session
            .account
            .read_care_package()?
            .ok_or(Error::AccountDoesNotExist)?;
        care.snrp3 = snrps.snrp3.clone();
        care.set_questions(questions, &session.l2)?;
        let care_json = care.to_json_string()?;

        let login_json = session
            .account
            .read_login_package()?
            .ok_or(Error::AccountDoesNotExist)?
            .to_json_string()?;

        // The sidecars live in the sync repo and never touch the server.
        let elp2 = seal_elp2(&session.lp2, &lra2);
        let elra2 = seal_elra2(&lra2, &session.lp2);
        session.account.write_recovery_sidecars(&elp2, &elra2)?;

        let (l1, p1) = session.auth_tokens()?;
        let (l1, p1) = (l1.clone(), p1.clone());
        self.with_otp_retry(Some(&session.account), |otp| {
            self.server
                .upload_care_package(&l1, &p1, Some(&lra1), &care_json, &login_json, otp)
        })?;

        session.account.write_care_package(&care)?;
        session.snrps = snrps;
        session.lra1 = Some(lra1);
        session.lra2 = Some(lra2);
        Ok(())
    }

    /// Fetch and decrypt the recovery questions, returning them with a
    /// handle that owns the Care Package for the follow-up calls.
    pub fn fetch_recovery_questions(&self, username: &str) -> Result<(String, RecoveryHandle)> {
        let username = Username::canonicalize(username)?;
        let local_care = match self.store.find(username.as_str())? {
            Some(dir) => dir.read_care_package()?,
            None => None,
        };
        let care = match local_care {
            Some(care) => care,
            None => {
                let l1 = derive_auth_id(&username)?;
                CarePackage::from_json_str(&self.server.get_care_package(&l1)?)?
            }
        };

        let mut keys = KeyMaterial::new(username.clone(), care.client_snrps());
        let l2 = keys.l2()?;
        let questions = care.questions(&l2)?;

        Ok((questions, RecoveryHandle { username, care }))
    }

    /// Check recovery answers without signing in.
    ///
    /// Prefers the purely-offline check against the local `ELP2` sidecar;
    /// only when no sidecar is on disk does it ask the server to verify
    /// `LRA1`.
    pub fn check_recovery_answers(&self, handle: &RecoveryHandle, answers: &str) -> Result<bool> {
        let mut keys = KeyMaterial::new(handle.username.clone(), handle.care.client_snrps())
            .with_recovery_answers(answers);

        if let Some(dir) = self.store.find(handle.username.as_str())? {
            if let Some(elp2) = dir.read_elp2()? {
                let lra2 = keys.lra2()?;
                return Ok(open_elp2(&elp2, &lra2).is_ok());
            }
        }

        let l1 = keys.l1()?;
        let lra1 = keys.lra1()?;
        match self
            .server
            .get_login_package(&l1, ServerAuth::Recovery(&lra1), None)
        {
            Ok(_) => Ok(true),
            Err(Error::BadRecoveryAnswers) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Sign in with recovery answers instead of a password.
    ///
    /// Consumes the handle. The resulting Session is
    /// [`AccessLevel::RecoveryOnly`]; the caller is expected to change
    /// the password immediately.
    pub fn sign_in_with_recovery(
        &self,
        handle: RecoveryHandle,
        answers: &str,
    ) -> Result<Session> {
        let RecoveryHandle { username, care } = handle;
        info!(account = %username, "recovery sign-in");

        let mut keys = KeyMaterial::new(username.clone(), care.client_snrps())
            .with_recovery_answers(answers);
        let l1 = keys.l1()?;
        let lra1 = keys.lra1()?;
        let lra2 = keys.lra2()?;
        let l2 = keys.l2()?;

        let local = self.store.find(username.as_str())?;
        let login_json = self.with_otp_retry(local.as_ref(), |otp| {
            self.server
                .get_login_package(&l1, ServerAuth::Recovery(&lra1), otp)
        })?;
        let login = LoginPackage::from_json_str(&login_json)?;

        let dir = match local {
            Some(dir) => dir,
            None => self.store.create(&username)?,
        };
        let elp2 = dir.read_elp2()?.ok_or_else(|| {
            Error::Storage("recovery sidecar not present locally; sync the account first".into())
        })?;
        let lp2 = open_elp2(&elp2, &lra2)?;

        // A wrong LP2 here means the sidecar did not match the answers.
        let mk = login
            .master_key(&lp2)
            .map_err(|_| Error::BadRecoveryAnswers)?;
        let sync_key = login.sync_key(&l2)?;

        dir.write_packages(&care, &login)?;

        Ok(Session {
            username,
            account: dir,
            sync_server: self.sync_server.clone(),
            snrps: care.client_snrps(),
            access: AccessLevel::RecoveryOnly,
            l1,
            p1: None,
            l2,
            lp2,
            mk,
            sync_key,
            lra1: Some(lra1),
            lra2: Some(lra2),
        })
    }

    // ------------------------------------------------------------------------
    // Second factor
    // ------------------------------------------------------------------------

    /// Store a TOTP key on this device (the account directory is created
    /// if it does not exist yet, so a key can be provisioned before the
    /// first sign-in).
    pub fn set_otp_key(&self, username: &str, key: &OtpKey) -> Result<()> {
        let username = Username::canonicalize(username)?;
        let dir = match self.store.find(username.as_str())? {
            Some(dir) => dir,
            None => self.store.create(&username)?,
        };
        dir.write_otp_key(key)
    }

    /// Remove the locally stored TOTP key, if any.
    pub fn remove_otp_key(&self, username: &str) -> Result<()> {
        if let Some(dir) = self.store.find(username)? {
            dir.delete_otp_key()?;
        }
        Ok(())
    }

    /// Publish this device's TOTP key to the server, turning the second
    /// factor on for every other device.
    pub fn upload_otp(&self, session: &Session) -> Result<()> {
        let key = session
            .account
            .read_otp_key()?
            .ok_or(Error::OtpRequired)?;
        let (l1, p1) = session.auth_tokens()?;
        self.server.upload_otp(l1, p1, &key.to_base32())
    }

    // ------------------------------------------------------------------------
    // Settings
    // ------------------------------------------------------------------------

    /// Load the account's encrypted settings (defaults if none saved).
    pub fn load_settings(&self, session: &Session) -> Result<Settings> {
        Settings::load(session.account_dir(), session.data_key())
    }

    /// Validate and persist the account's settings.
    pub fn save_settings(&self, session: &Session, settings: &Settings) -> Result<()> {
        settings.save(session.account_dir(), session.data_key())
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    fn generate_snrps(&self) -> ClientSnrps {
        ClientSnrps {
            snrp2: (self.snrp_factory)(),
            snrp3: (self.snrp_factory)(),
            snrp4: (self.snrp_factory)(),
        }
    }

    /// Run a server call; on a second-factor challenge, retry once with
    /// the locally stored key's current code.
    fn with_otp_retry<R>(
        &self,
        dir: Option<&AccountDir>,
        call: impl Fn(Option<&str>) -> Result<R>,
    ) -> Result<R> {
        match call(None) {
            Err(Error::OtpRequired) => {
                let key = match dir {
                    Some(dir) => dir.read_otp_key()?,
                    None => None,
                }
                .ok_or(Error::OtpRequired)?;
                let code = key.current_code()?;
                match call(Some(&code)) {
                    Err(Error::OtpRequired) => Err(Error::OtpMismatch),
                    other => other,
                }
            }
            other => other,
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::SnrpProfile;
    use crate::server::testing::MockServer;
    use std::sync::Arc;

    fn cheap_snrp() -> SnrpProfile {
        SnrpProfile::new(&crate::crypto::random_bytes(32), 1024, 1, 1)
    }

    fn config() -> CoreConfig {
        CoreConfig::new("https://auth.example.com", "https://sync.example.com").unwrap()
    }

    fn manager(
        root: &std::path::Path,
        server: &Arc<MockServer>,
    ) -> LoginManager<Arc<MockServer>> {
        let mut manager = LoginManager::with_transport(root, &config(), Arc::clone(server));
        manager.snrp_factory = cheap_snrp;
        manager
    }

    fn one_device() -> (tempfile::TempDir, LoginManager<Arc<MockServer>>) {
        let root = tempfile::tempdir().unwrap();
        let server = Arc::new(MockServer::new());
        let manager = manager(root.path(), &server);
        (root, manager)
    }

    #[test]
    fn test_config_requires_https() {
        assert!(CoreConfig::new("http://auth.example.com", "https://s").is_err());
        assert!(CoreConfig::new("https://auth.example.com", "http://sync.example.com").is_err());
        assert!(CoreConfig::new("http://localhost:8080", "http://127.0.0.1:9090").is_ok());
    }

    #[test]
    fn test_create_writes_packages_and_signs_back_in() {
        let (root, manager) = one_device();

        let session = manager.create_account("alice ", "hunter2").unwrap();
        assert_eq!(session.username().as_str(), "alice");
        assert_eq!(session.access(), AccessLevel::Full);

        let account_dir = root.path().join("Accounts").join("alice");
        assert!(account_dir.join("CarePackage.json").is_file());
        assert!(account_dir.join("LoginPackage.json").is_file());

        let mk = session.data_key().clone();
        session.logout();

        // Different surface form of the same canonical username
        let again = manager.sign_in("Alice", "hunter2").unwrap();
        assert_eq!(again.data_key(), &mk);
    }

    #[test]
    fn test_wrong_password_is_rejected() {
        let (_root, manager) = one_device();
        manager.create_account("alice", "hunter2").unwrap();
        assert!(matches!(
            manager.sign_in("alice", "hunter3"),
            Err(Error::BadPassword)
        ));
    }

    #[test]
    fn test_bad_username_surfaces() {
        let (_root, manager) = one_device();
        assert!(matches!(
            manager.create_account("héllo", "pw"),
            Err(Error::BadUsername(_))
        ));
        assert!(matches!(
            manager.sign_in("héllo", "pw"),
            Err(Error::BadUsername(_))
        ));
    }

    #[test]
    fn test_sign_in_unknown_account() {
        let (_root, manager) = one_device();
        assert!(matches!(
            manager.sign_in("nobody", "pw"),
            Err(Error::AccountDoesNotExist)
        ));
    }

    #[test]
    fn test_second_device_repopulates_from_server() {
        let server = Arc::new(MockServer::new());
        let device1 = tempfile::tempdir().unwrap();
        let device2 = tempfile::tempdir().unwrap();

        let mk = {
            let manager = manager(device1.path(), &server);
            let session = manager.create_account("alice", "hunter2").unwrap();
            session.data_key().clone()
        };

        let manager2 = manager(device2.path(), &server);
        let session = manager2.sign_in("alice", "hunter2").unwrap();
        assert_eq!(session.data_key(), &mk);

        // The fetched packages were persisted for offline sign-in
        assert!(device2
            .path()
            .join("Accounts/alice/LoginPackage.json")
            .is_file());
    }

    #[test]
    fn test_create_collision_local_and_server() {
        let server = Arc::new(MockServer::new());
        let device1 = tempfile::tempdir().unwrap();
        let device2 = tempfile::tempdir().unwrap();

        let manager1 = manager(device1.path(), &server);
        manager1.create_account("alice", "hunter2").unwrap();

        // Same device: local collision
        assert!(matches!(
            manager1.create_account("ALICE", "other"),
            Err(Error::AccountAlreadyExists)
        ));

        // Fresh device, same server: server collision, and the first
        // account keeps working afterwards
        let manager2 = manager(device2.path(), &server);
        assert!(matches!(
            manager2.create_account("alice", "other"),
            Err(Error::AccountAlreadyExists)
        ));
        assert!(manager1.sign_in("alice", "hunter2").is_ok());
    }

    #[test]
    fn test_change_password() {
        let (_root, manager) = one_device();
        let mut session = manager.create_account("alice", "hunter2").unwrap();
        let mk = session.data_key().clone();

        manager
            .change_password(&mut session, "correct horse battery staple")
            .unwrap();
        session.logout();

        assert!(matches!(
            manager.sign_in("alice", "hunter2"),
            Err(Error::BadPassword)
        ));
        let session = manager
            .sign_in("alice", "correct horse battery staple")
            .unwrap();
        assert_eq!(session.data_key(), &mk);
    }

    #[test]
    fn test_change_password_runs_rewrite_hook() {
        let (_root, manager) = one_device();
        let mut session = manager.create_account("alice", "hunter2").unwrap();
        let mk = session.data_key().clone();

        let mut seen: Option<MasterKey> = None;
        manager
            .change_password_with_rewrite(&mut session, "new password", |key| {
                seen = Some(key.clone());
                Ok(())
            })
            .unwrap();
        assert_eq!(seen.as_ref(), Some(&mk));
    }

    #[test]
    fn test_recovery_round_trip() {
        let (_root, manager) = one_device();
        let mut session = manager.create_account("alice", "hunter2").unwrap();
        let mk = session.data_key().clone();

        manager
            .set_recovery(&mut session, "Pet?\nCity?", "fido\nparis")
            .unwrap();
        session.logout();

        let (questions, handle) = manager.fetch_recovery_questions("alice").unwrap();
        assert_eq!(questions, "Pet?\nCity?");

        assert!(manager.check_recovery_answers(&handle, "fido\nparis").unwrap());
        assert!(!manager.check_recovery_answers(&handle, "fido\nlondon").unwrap());

        let recovered = manager
            .sign_in_with_recovery(handle, "fido\nparis")
            .unwrap();
        assert_eq!(recovered.data_key(), &mk);
        assert_eq!(recovered.access(), AccessLevel::RecoveryOnly);
        assert!(recovered.auth_tokens().is_err());
    }

    #[test]
    fn test_wrong_recovery_answers_contact_server_once() {
        let server = Arc::new(MockServer::new());
        let root = tempfile::tempdir().unwrap();
        let manager = manager(root.path(), &server);

        let mut session = manager.create_account("alice", "hunter2").unwrap();
        manager
            .set_recovery(&mut session, "Pet?\nCity?", "fido\nparis")
            .unwrap();
        session.logout();

        let (_, handle) = manager.fetch_recovery_questions("alice").unwrap();
        let before = server.request_count();
        let err = manager
            .sign_in_with_recovery(handle, "fido\nlondon")
            .unwrap_err();
        assert!(matches!(err, Error::BadRecoveryAnswers));
        assert_eq!(server.request_count(), before + 1);
    }

    #[test]
    fn test_no_recovery_questions() {
        let (_root, manager) = one_device();
        manager.create_account("alice", "hunter2").unwrap();
        assert!(matches!(
            manager.fetch_recovery_questions("alice"),
            Err(Error::NoRecoveryQuestions)
        ));
    }

    #[test]
    fn test_recovery_session_cannot_set_recovery() {
        let (_root, manager) = one_device();
        let mut session = manager.create_account("alice", "hunter2").unwrap();
        manager
            .set_recovery(&mut session, "Pet?", "fido")
            .unwrap();
        session.logout();

        let (_, handle) = manager.fetch_recovery_questions("alice").unwrap();
        let mut recovered = manager.sign_in_with_recovery(handle, "fido").unwrap();
        assert!(manager
            .set_recovery(&mut recovered, "New?", "answer")
            .is_err());
    }

    #[test]
    fn test_recovery_then_password_change_upgrades_session() {
        let (_root, manager) = one_device();
        let mut session = manager.create_account("alice", "hunter2").unwrap();
        let mk = session.data_key().clone();
        manager
            .set_recovery(&mut session, "Pet?", "fido")
            .unwrap();
        session.logout();

        let (_, handle) = manager.fetch_recovery_questions("alice").unwrap();
        let mut recovered = manager.sign_in_with_recovery(handle, "fido").unwrap();

        manager
            .change_password(&mut recovered, "brand new password")
            .unwrap();
        assert_eq!(recovered.access(), AccessLevel::Full);
        assert!(recovered.auth_tokens().is_ok());
        recovered.logout();

        let session = manager.sign_in("alice", "brand new password").unwrap();
        assert_eq!(session.data_key(), &mk);
    }

    #[test]
    fn test_password_change_preserves_recovery() {
        let (_root, manager) = one_device();
        let mut session = manager.create_account("alice", "hunter2").unwrap();
        let mk = session.data_key().clone();
        manager
            .set_recovery(&mut session, "Pet?", "fido")
            .unwrap();
        session.logout();

        // A fresh password session has no cached recovery key, so the
        // sidecar refresh must recover LRA2 from the old login key.
        let mut fresh = manager.sign_in("alice", "hunter2").unwrap();
        manager.change_password(&mut fresh, "rotated").unwrap();
        fresh.logout();

        let (_, handle) = manager.fetch_recovery_questions("alice").unwrap();
        let recovered = manager.sign_in_with_recovery(handle, "fido").unwrap();
        assert_eq!(recovered.data_key(), &mk);
    }

    #[test]
    fn test_otp_enforcement() {
        let server = Arc::new(MockServer::new());
        let device1 = tempfile::tempdir().unwrap();
        let device2 = tempfile::tempdir().unwrap();

        let key = OtpKey::generate();
        {
            let manager = manager(device1.path(), &server);
            let session = manager.create_account("alice", "hunter2").unwrap();
            manager.set_otp_key("alice", &key).unwrap();
            manager.upload_otp(&session).unwrap();
        }

        // Second device has no key: the server fetch is challenged
        let manager2 = manager(device2.path(), &server);
        assert!(matches!(
            manager2.sign_in("alice", "hunter2"),
            Err(Error::OtpRequired)
        ));

        // Provisioning the key lets the retry succeed
        manager2.set_otp_key("alice", &key).unwrap();
        let session = manager2.sign_in("alice", "hunter2").unwrap();
        assert_eq!(session.username().as_str(), "alice");
    }

    #[test]
    fn test_wrong_otp_key_is_mismatch() {
        let server = Arc::new(MockServer::new());
        let device1 = tempfile::tempdir().unwrap();
        let device2 = tempfile::tempdir().unwrap();

        {
            let manager = manager(device1.path(), &server);
            let session = manager.create_account("alice", "hunter2").unwrap();
            manager.set_otp_key("alice", &OtpKey::generate()).unwrap();
            manager.upload_otp(&session).unwrap();
        }

        let manager2 = manager(device2.path(), &server);
        manager2.set_otp_key("alice", &OtpKey::generate()).unwrap();
        assert!(matches!(
            manager2.sign_in("alice", "hunter2"),
            Err(Error::OtpMismatch)
        ));
    }

    #[test]
    fn test_remove_otp_key() {
        let (_root, manager) = one_device();
        manager.create_account("alice", "hunter2").unwrap();
        let key = OtpKey::generate();
        manager.set_otp_key("alice", &key).unwrap();
        manager.remove_otp_key("alice").unwrap();

        let dir = manager.store().find("alice").unwrap().unwrap();
        assert!(dir.read_otp_key().unwrap().is_none());
    }

    #[test]
    fn test_settings_through_manager() {
        let (_root, manager) = one_device();
        let session = manager.create_account("alice", "hunter2").unwrap();

        let mut settings = manager.load_settings(&session).unwrap();
        settings.pin = Some("1234".into());
        settings.minutes_auto_logout = 5;
        manager.save_settings(&session, &settings).unwrap();

        let reread = manager.load_settings(&session).unwrap();
        assert_eq!(reread.pin.as_deref(), Some("1234"));
        assert_eq!(reread.minutes_auto_logout, 5);
    }

    #[test]
    fn test_list_accounts() {
        let (_root, manager) = one_device();
        manager.create_account("zed", "pw1").unwrap();
        manager.create_account("alice", "pw2").unwrap();
        let names: Vec<String> = manager
            .list_accounts()
            .unwrap()
            .into_iter()
            .map(|u| u.as_str().to_string())
            .collect();
        assert_eq!(names, vec!["alice", "zed"]);
    }

    #[test]
    fn test_network_failure_leaves_no_local_account() {
        let server = Arc::new(MockServer::new());
        let root = tempfile::tempdir().unwrap();
        let manager = manager(root.path(), &server);

        server.fail_next_with(1, "backend down");
        assert!(matches!(
            manager.create_account("alice", "hunter2"),
            Err(Error::Server(_))
        ));
        assert!(manager.store().find("alice").unwrap().is_none());
    }
}
