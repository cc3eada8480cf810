//! # Account store
//!
//! The per-user on-disk directory tree, rooted at `<root>/Accounts/`:
//!
//! ```text
//! Accounts/
//!   <dirname>/                   canonical username, ' ' rewritten to '_'
//!      UserName.json             cleartext canonical username
//!      CarePackage.json
//!      LoginPackage.json
//!      OtpKey.json               optional
//!      sync/                     managed by the sync capability
//!          Settings.json         encrypted
//!          Categories.json       cleartext list
//!          ELP2.json             optional recovery sidecar
//!          ELRA2.json            optional recovery sidecar
//! ```
//!
//! The directory name is only a filesystem handle; the identity input is
//! always the canonical username string, which `UserName.json` records
//! exactly so `list()` can report it even after the `' '` → `'_'` rewrite.

pub mod files;
pub mod packages;

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::crypto::Envelope;
use crate::error::{Error, Result};
use crate::identity::otp::{OtpKey, OtpKeyFile};
use crate::identity::Username;
use packages::{CarePackage, LoginPackage};

const ACCOUNTS_DIR: &str = "Accounts";
const SYNC_DIR: &str = "sync";

const USERNAME_FILE: &str = "UserName.json";
const CARE_PACKAGE_FILE: &str = "CarePackage.json";
const LOGIN_PACKAGE_FILE: &str = "LoginPackage.json";
const OTP_KEY_FILE: &str = "OtpKey.json";
const SETTINGS_FILE: &str = "Settings.json";
const CATEGORIES_FILE: &str = "Categories.json";
const ELP2_FILE: &str = "ELP2.json";
const ELRA2_FILE: &str = "ELRA2.json";

/// Cleartext `UserName.json` shape.
#[derive(Serialize, Deserialize)]
struct UserNameFile {
    #[serde(rename = "userName")]
    user_name: String,
}

/// Root handle over all local accounts.
#[derive(Clone, Debug)]
pub struct AccountStore {
    accounts_root: PathBuf,
}

impl AccountStore {
    /// Open a store under the host-supplied filesystem root.
    ///
    /// Nothing is created until the first account is.
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            accounts_root: root.as_ref().join(ACCOUNTS_DIR),
        }
    }

    fn dir_path(&self, username: &Username) -> PathBuf {
        self.accounts_root.join(username.as_str().replace(' ', "_"))
    }

    /// Enumerate the canonical usernames of all local accounts.
    pub fn list(&self) -> Result<Vec<Username>> {
        let mut usernames = Vec::new();
        let entries = match fs::read_dir(&self.accounts_root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(usernames),
            Err(e) => return Err(e.into()),
        };
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name_file: Option<UserNameFile> =
                files::read_json_opt(&entry.path().join(USERNAME_FILE)).unwrap_or(None);
            let raw = match name_file {
                Some(file) => file.user_name,
                // Legacy directory without a username file
                None => entry.file_name().to_string_lossy().replace('_', " "),
            };
            match Username::canonicalize(&raw) {
                Ok(username) => usernames.push(username),
                Err(_) => debug!(dir = %entry.path().display(), "skipping unreadable account dir"),
            }
        }
        usernames.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        Ok(usernames)
    }

    /// Look up an account by (raw) username.
    pub fn find(&self, username: &str) -> Result<Option<AccountDir>> {
        let username = Username::canonicalize(username)?;
        let path = self.dir_path(&username);
        if path.is_dir() {
            Ok(Some(AccountDir { username, path }))
        } else {
            Ok(None)
        }
    }

    /// Create the directory tree for a new account.
    ///
    /// `AccountAlreadyExists` if the directory is already present.
    pub fn create(&self, username: &Username) -> Result<AccountDir> {
        let path = self.dir_path(username);
        if path.exists() {
            return Err(Error::AccountAlreadyExists);
        }
        fs::create_dir_all(&path)?;
        fs::create_dir_all(path.join(SYNC_DIR))?;
        files::write_json(
            &path.join(USERNAME_FILE),
            &UserNameFile {
                user_name: username.as_str().to_string(),
            },
        )?;
        debug!(account = %username, "created account directory");
        Ok(AccountDir {
            username: username.clone(),
            path,
        })
    }

    /// Remove an account directory and everything under it.
    pub fn delete(&self, username: &Username) -> Result<()> {
        let path = self.dir_path(username);
        match fs::remove_dir_all(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::AccountDoesNotExist)
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Handle over one account's directory.
#[derive(Clone, Debug)]
pub struct AccountDir {
    username: Username,
    path: PathBuf,
}

impl AccountDir {
    /// The canonical username this directory belongs to.
    pub fn username(&self) -> &Username {
        &self.username
    }

    /// The directory path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The sync-repo working directory (created on first use).
    pub fn sync_dir(&self) -> Result<PathBuf> {
        let dir = self.path.join(SYNC_DIR);
        if !dir.is_dir() {
            fs::create_dir_all(&dir)?;
        }
        Ok(dir)
    }

    /// Where the encrypted settings record lives.
    pub fn settings_path(&self) -> PathBuf {
        self.path.join(SYNC_DIR).join(SETTINGS_FILE)
    }

    /// Where the cleartext category list lives.
    pub fn categories_path(&self) -> PathBuf {
        self.path.join(SYNC_DIR).join(CATEGORIES_FILE)
    }

    // ------------------------------------------------------------------------
    // Packages
    // ------------------------------------------------------------------------

    /// Read both packages. Missing files are `AccountDoesNotExist`; the
    /// directory may predate a completed creation.
    pub fn read_packages(&self) -> Result<(CarePackage, LoginPackage)> {
        let care = self
            .read_care_package()?
            .ok_or(Error::AccountDoesNotExist)?;
        let login = self
            .read_login_package()?
            .ok_or(Error::AccountDoesNotExist)?;
        Ok((care, login))
    }

    /// Read the Care Package if present.
    pub fn read_care_package(&self) -> Result<Option<CarePackage>> {
        files::read_json_opt(&self.path.join(CARE_PACKAGE_FILE))
    }

    /// Read the Login Package if present.
    pub fn read_login_package(&self) -> Result<Option<LoginPackage>> {
        files::read_json_opt(&self.path.join(LOGIN_PACKAGE_FILE))
    }

    /// Persist both packages.
    pub fn write_packages(&self, care: &CarePackage, login: &LoginPackage) -> Result<()> {
        self.write_care_package(care)?;
        self.write_login_package(login)
    }

    /// Persist the Care Package.
    pub fn write_care_package(&self, care: &CarePackage) -> Result<()> {
        files::write_json(&self.path.join(CARE_PACKAGE_FILE), care)
    }

    /// Persist the Login Package.
    pub fn write_login_package(&self, login: &LoginPackage) -> Result<()> {
        files::write_json(&self.path.join(LOGIN_PACKAGE_FILE), login)
    }

    // ------------------------------------------------------------------------
    // TOTP key file
    // ------------------------------------------------------------------------

    /// Read the TOTP key if one is stored on this device.
    pub fn read_otp_key(&self) -> Result<Option<OtpKey>> {
        let file: Option<OtpKeyFile> = files::read_json_opt(&self.path.join(OTP_KEY_FILE))?;
        file.map(|f| f.key()).transpose()
    }

    /// Store the TOTP key.
    pub fn write_otp_key(&self, key: &OtpKey) -> Result<()> {
        files::write_json(&self.path.join(OTP_KEY_FILE), &OtpKeyFile::from_key(key))
    }

    /// Remove the TOTP key file; `Ok` even if none existed.
    pub fn delete_otp_key(&self) -> Result<()> {
        files::delete_if_exists(&self.path.join(OTP_KEY_FILE))?;
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Recovery sidecars (inside the sync repo)
    // ------------------------------------------------------------------------

    /// Read the `ELP2` sidecar if present.
    pub fn read_elp2(&self) -> Result<Option<Envelope>> {
        files::read_json_opt(&self.path.join(SYNC_DIR).join(ELP2_FILE))
    }

    /// Read the `ELRA2` sidecar if present.
    pub fn read_elra2(&self) -> Result<Option<Envelope>> {
        files::read_json_opt(&self.path.join(SYNC_DIR).join(ELRA2_FILE))
    }

    /// Write both recovery sidecars into the sync repo.
    pub fn write_recovery_sidecars(&self, elp2: &Envelope, elra2: &Envelope) -> Result<()> {
        let sync = self.sync_dir()?;
        files::write_json(&sync.join(ELP2_FILE), elp2)?;
        files::write_json(&sync.join(ELRA2_FILE), elra2)
    }
}

// ============================================================================
// TESTS
// ============================================================================
