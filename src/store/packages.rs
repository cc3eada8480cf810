//! # The Care Package and the Login Package
//!
//! The two on-disk records of the login scheme, stored both locally and on
//! the account server:
//!
//! - **Care Package** (cleartext JSON): the three client scrypt profiles
//!   plus, once recovery is set, the encrypted recovery-questions string.
//!   Anyone may read it; it contains no secrets, only parameters and an
//!   envelope nobody without `L2` can open.
//! - **Login Package** (cleartext JSON): the master key encrypted under
//!   `LP2` and the sync-repo key encrypted under `L2`.
//!
//! Unknown top-level fields round-trip through reads and edit-style writes
//! (set-recovery). Full rewrites (account creation and password change)
//! rebuild the record from scratch and drop them; those call sites say so.

use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::crypto::{Envelope, SnrpProfile};
use crate::error::{Error, Result};
use crate::identity::derivation::ClientSnrps;
use crate::identity::keys::{LoginKey, MasterKey, RecoveryKey, SyncDirKey, SyncKey};

/// The server-stored record holding the scrypt profiles and the encrypted
/// recovery questions.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CarePackage {
    /// Client profile deriving `LP2`
    #[serde(rename = "SNRP2")]
    pub snrp2: SnrpProfile,
    /// Client profile deriving `LRA2`
    #[serde(rename = "SNRP3")]
    pub snrp3: SnrpProfile,
    /// Client profile deriving `L2`
    #[serde(rename = "SNRP4")]
    pub snrp4: SnrpProfile,
    /// Recovery questions, encrypted under `L2`; absent until recovery is set
    #[serde(rename = "ERQ", skip_serializing_if = "Option::is_none")]
    pub erq: Option<Envelope>,
    /// Unknown fields, preserved on round-trip
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl CarePackage {
    /// A fresh package with no recovery questions (account creation).
    pub fn new(snrps: &ClientSnrps) -> Self {
        Self {
            snrp2: snrps.snrp2.clone(),
            snrp3: snrps.snrp3.clone(),
            snrp4: snrps.snrp4.clone(),
            erq: None,
            extra: serde_json::Map::new(),
        }
    }

    /// The client profiles as a derivation input set.
    pub fn client_snrps(&self) -> ClientSnrps {
        ClientSnrps {
            snrp2: self.snrp2.clone(),
            snrp3: self.snrp3.clone(),
            snrp4: self.snrp4.clone(),
        }
    }

    /// Store the recovery-questions string, encrypted under `L2`.
    pub fn set_questions(&mut self, questions: &str, l2: &SyncDirKey) -> Result<()> {
        self.erq = Some(Envelope::seal_json(&questions, &l2.encryption_key())?);
        Ok(())
    }

    /// Decrypt the recovery-questions string.
    ///
    /// `NoRecoveryQuestions` if none were ever set.
    pub fn questions(&self, l2: &SyncDirKey) -> Result<String> {
        let erq = self.erq.as_ref().ok_or(Error::NoRecoveryQuestions)?;
        erq.open_json(&l2.encryption_key())
    }

    /// Parse the string-encoded form used on the wire.
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Corrupt(format!("care package: {e}")))
    }

    /// The string-encoded form used on the wire.
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// The server-stored record holding the encrypted master key and the
/// encrypted sync-repo key.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LoginPackage {
    /// Master key, encrypted under `LP2`
    #[serde(rename = "EMK")]
    pub emk: Envelope,
    /// Hex sync-repo key, encrypted under `L2`
    #[serde(rename = "ESyncKey")]
    pub esync_key: Envelope,
    /// Unknown fields, preserved on round-trip
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl LoginPackage {
    /// Build a package from freshly minted or re-wrapped secrets.
    pub fn build(
        mk: &MasterKey,
        sync_key: &SyncKey,
        lp2: &LoginKey,
        l2: &SyncDirKey,
    ) -> Result<Self> {
        Ok(Self {
            emk: Envelope::seal_bytes(mk.as_bytes(), &lp2.encryption_key()),
            esync_key: Envelope::seal_json(&sync_key.to_hex(), &l2.encryption_key())?,
            extra: serde_json::Map::new(),
        })
    }

    /// Decrypt the master key. A wrong `LP2` surfaces as `BadPassword`.
    pub fn master_key(&self, lp2: &LoginKey) -> Result<MasterKey> {
        let bytes = Zeroizing::new(
            self.emk
                .open_bytes(&lp2.encryption_key())
                .map_err(|_| Error::BadPassword)?,
        );
        let bytes: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| Error::Corrupt("master key has wrong length".into()))?;
        Ok(MasterKey::from_bytes(bytes))
    }

    /// Decrypt the sync-repo key.
    pub fn sync_key(&self, l2: &SyncDirKey) -> Result<SyncKey> {
        let hex: String = self.esync_key.open_json(&l2.encryption_key())?;
        SyncKey::from_hex(&hex)
    }

    /// Re-wrap the master key under a new `LP2` (password change), keeping
    /// the sync-key envelope untouched.
    pub fn rewrap_master_key(&self, mk: &MasterKey, new_lp2: &LoginKey) -> Self {
        Self {
            emk: Envelope::seal_bytes(mk.as_bytes(), &new_lp2.encryption_key()),
            esync_key: self.esync_key.clone(),
            extra: serde_json::Map::new(),
        }
    }

    /// Parse the string-encoded form used on the wire.
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Corrupt(format!("login package: {e}")))
    }

    /// The string-encoded form used on the wire.
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Sidecar: `LP2` encrypted under `LRA2`, stored in the sync repo.
pub fn seal_elp2(lp2: &LoginKey, lra2: &RecoveryKey) -> Envelope {
    Envelope::seal_bytes(lp2.as_bytes(), &lra2.encryption_key())
}

/// Open the `ELP2` sidecar. A wrong `LRA2` surfaces as `BadRecoveryAnswers`.
pub fn open_elp2(envelope: &Envelope, lra2: &RecoveryKey) -> Result<LoginKey> {
    let bytes = Zeroizing::new(
        envelope
            .open_bytes(&lra2.encryption_key())
            .map_err(|_| Error::BadRecoveryAnswers)?,
    );
    let bytes: [u8; 32] = bytes
        .as_slice()
        .try_into()
        .map_err(|_| Error::Corrupt("ELP2 has wrong length".into()))?;
    Ok(LoginKey::from_bytes(bytes))
}

/// Sidecar: `LRA2` encrypted under `LP2`, the mirror image of [`seal_elp2`].
pub fn seal_elra2(lra2: &RecoveryKey, lp2: &LoginKey) -> Envelope {
    Envelope::seal_bytes(lra2.as_bytes(), &lp2.encryption_key())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn snrps() -> ClientSnrps {
        ClientSnrps {
            snrp2: SnrpProfile::new(&[2u8; 32], 1024, 1, 1),
            snrp3: SnrpProfile::new(&[3u8; 32], 1024, 1, 1),
            snrp4: SnrpProfile::new(&[4u8; 32], 1024, 1, 1),
        }
    }

    #[test]
    fn test_care_package_round_trip() {
        let care = CarePackage::new(&snrps());
        let json = care.to_json_string().unwrap();
        let reread = CarePackage::from_json_str(&json).unwrap();
        assert_eq!(reread, care);
        assert!(reread.erq.is_none());
    }

    #[test]
    fn test_care_package_questions() {
        let l2 = SyncDirKey::from_bytes([9u8; 32]);
        let mut care = CarePackage::new(&snrps());

        assert!(matches!(
            care.questions(&l2),
            Err(Error::NoRecoveryQuestions)
        ));

        care.set_questions("Pet?\nCity?", &l2).unwrap();
        assert_eq!(care.questions(&l2).unwrap(), "Pet?\nCity?");
    }

    #[test]
    fn test_unknown_fields_survive_round_trip() {
        let care = CarePackage::new(&snrps());
        let mut value: serde_json::Value =
            serde_json::from_str(&care.to_json_string().unwrap()).unwrap();
        value["futureField"] = serde_json::json!({"nested": [1, 2, 3]});

        let reread = CarePackage::from_json_str(&value.to_string()).unwrap();
        let rewritten = reread.to_json_string().unwrap();
        let reparsed: serde_json::Value = serde_json::from_str(&rewritten).unwrap();
        assert_eq!(reparsed["futureField"], value["futureField"]);
    }

    #[test]
    fn test_care_package_missing_field_is_corrupt() {
        let err = CarePackage::from_json_str(r#"{"SNRP2": null}"#).unwrap_err();
        assert!(matches!(err, Error::Corrupt(_)));
    }

    #[test]
    fn test_login_package_wraps_and_unwraps() {
        let mk = MasterKey::generate();
        let sync_key = SyncKey::generate();
        let lp2 = LoginKey::from_bytes([1u8; 32]);
        let l2 = SyncDirKey::from_bytes([2u8; 32]);

        let login = LoginPackage::build(&mk, &sync_key, &lp2, &l2).unwrap();
        assert_eq!(login.master_key(&lp2).unwrap(), mk);
        assert_eq!(login.sync_key(&l2).unwrap(), sync_key);
    }

    #[test]
    fn test_wrong_login_key_is_bad_password() {
        let mk = MasterKey::generate();
        let sync_key = SyncKey::generate();
        let lp2 = LoginKey::from_bytes([1u8; 32]);
        let l2 = SyncDirKey::from_bytes([2u8; 32]);

        let login = LoginPackage::build(&mk, &sync_key, &lp2, &l2).unwrap();
        let wrong = LoginKey::from_bytes([7u8; 32]);
        assert!(matches!(login.master_key(&wrong), Err(Error::BadPassword)));
    }

    #[test]
    fn test_rewrap_preserves_master_key() {
        let mk = MasterKey::generate();
        let sync_key = SyncKey::generate();
        let old_lp2 = LoginKey::from_bytes([1u8; 32]);
        let new_lp2 = LoginKey::from_bytes([5u8; 32]);
        let l2 = SyncDirKey::from_bytes([2u8; 32]);

        let login = LoginPackage::build(&mk, &sync_key, &old_lp2, &l2).unwrap();
        let rewrapped = login.rewrap_master_key(&mk, &new_lp2);

        assert!(matches!(
            rewrapped.master_key(&old_lp2),
            Err(Error::BadPassword)
        ));
        assert_eq!(rewrapped.master_key(&new_lp2).unwrap(), mk);
        assert_eq!(rewrapped.sync_key(&l2).unwrap(), sync_key);
    }

    #[test]
    fn test_recovery_sidecars_mutual() {
        let lp2 = LoginKey::from_bytes([1u8; 32]);
        let lra2 = RecoveryKey::from_bytes([6u8; 32]);

        let elp2 = seal_elp2(&lp2, &lra2);
        assert_eq!(open_elp2(&elp2, &lra2).unwrap(), lp2);

        let wrong = RecoveryKey::from_bytes([7u8; 32]);
        assert!(matches!(
            open_elp2(&elp2, &wrong),
            Err(Error::BadRecoveryAnswers)
        ));

        // The mirror sidecar opens with LP2
        let elra2 = seal_elra2(&lra2, &lp2);
        let opened = elra2.open_bytes(&lp2.encryption_key()).unwrap();
        assert_eq!(opened.as_slice(), lra2.as_bytes());
    }
}
