//! # Account-server client
//!
//! The wire protocol with the backend account server: JSON-over-HTTPS,
//! POST-only, every response wrapped in a status envelope. The server
//! never sees a password, username, master key, or sync key; only the
//! scrypt-derived tokens `L1`/`P1`/`LRA1` and opaque encrypted packages.
//!
//! | Operation | Auth | Success result |
//! |---|---|---|
//! | `create` | `L1, P1` | `{}` |
//! | `activated` | `L1` | account exists? |
//! | `get_care_package` | `L1` | `{care_package}` |
//! | `get_login_package` | `L1, P1` or `L1, LRA1` | `{login_package}` |
//! | `upload_care_package` | `L1, P1` (+ `LRA1`) | `{}` |
//! | `change_password` | `L1, P1` or `L1, LRA1` | `{}` |
//! | `upload_otp` | `L1, P1` | `{}` |
//!
//! A non-success response whose results carry `"otp": true` is a
//! second-factor challenge and surfaces as `OtpRequired`; the login
//! orchestrator retries once with a computed code.

pub mod protocol;
#[cfg(test)]
#[allow(missing_docs)]
pub mod testing;
pub mod transport;

use serde_json::json;
use tracing::debug;

use crate::error::{Error, Result};
use crate::identity::keys::{AuthId, PasswordAuth, RecoveryAuth, SyncKey};
use protocol::{fields, paths, status, ResponseEnvelope};
use transport::Transport;

/// Which credential authenticates a request; decides how the server's
/// `InvalidPassword` status is reported.
#[derive(Clone, Copy)]
pub enum ServerAuth<'a> {
    /// `P1` authenticates
    Password(&'a PasswordAuth),
    /// `LRA1` authenticates
    Recovery(&'a RecoveryAuth),
}

impl ServerAuth<'_> {
    fn field(&self) -> (&'static str, String) {
        match self {
            ServerAuth::Password(p1) => (fields::P1, p1.to_base64()),
            ServerAuth::Recovery(lra1) => (fields::LRA1, lra1.to_base64()),
        }
    }

    fn rejection(&self) -> Error {
        match self {
            ServerAuth::Password(_) => Error::BadPassword,
            ServerAuth::Recovery(_) => Error::BadRecoveryAnswers,
        }
    }
}

/// Typed client over the wire protocol.
pub struct ServerClient<T: Transport> {
    transport: T,
}

impl<T: Transport> ServerClient<T> {
    /// Wrap a transport.
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    fn post(&self, path: &str, body: serde_json::Value) -> Result<ResponseEnvelope> {
        debug!(path, "posting to account server");
        let raw = self.transport.post(path, &body)?;
        ResponseEnvelope::from_value(raw)
    }

    /// Map a response's status code onto the error taxonomy.
    fn check(&self, envelope: ResponseEnvelope, auth_rejection: Error) -> Result<ResponseEnvelope> {
        if envelope.otp_challenged() {
            return Err(Error::OtpRequired);
        }
        match envelope.status_code {
            status::SUCCESS => Ok(envelope),
            status::NO_ACCOUNT => Err(Error::AccountDoesNotExist),
            status::INVALID_PASSWORD => Err(auth_rejection),
            status::ACCOUNT_EXISTS => Err(Error::AccountAlreadyExists),
            code => Err(Error::Server(format!(
                "status {code}: {}",
                envelope.message.as_deref().unwrap_or("no message")
            ))),
        }
    }

    /// Create the account in one atomic request.
    pub fn create(
        &self,
        l1: &AuthId,
        p1: &PasswordAuth,
        care_package: &str,
        login_package: &str,
        sync_key: &SyncKey,
    ) -> Result<()> {
        let body = json!({
            fields::L1: l1.to_base64(),
            fields::P1: p1.to_base64(),
            fields::CARE_PACKAGE: care_package,
            fields::LOGIN_PACKAGE: login_package,
            fields::REPO_ACCOUNT_KEY: sync_key.to_hex(),
        });
        let envelope = self.post(paths::CREATE, body)?;
        self.check(envelope, Error::BadPassword)?;
        Ok(())
    }

    /// Whether an account exists for this `L1`.
    pub fn activated(&self, l1: &AuthId) -> Result<bool> {
        let body = json!({ fields::L1: l1.to_base64() });
        let envelope = self.post(paths::ACTIVATED, body)?;
        match envelope.status_code {
            status::SUCCESS => Ok(true),
            status::NO_ACCOUNT => Ok(false),
            _ => self.check(envelope, Error::BadPassword).map(|_| false),
        }
    }

    /// Fetch the Care Package JSON string. Needs no secret: the package
    /// holds only scrypt parameters and an envelope.
    pub fn get_care_package(&self, l1: &AuthId) -> Result<String> {
        let body = json!({ fields::L1: l1.to_base64() });
        let envelope = self.post(paths::CARE_PACKAGE_GET, body)?;
        let envelope = self.check(envelope, Error::BadPassword)?;
        envelope
            .result_str(fields::CARE_PACKAGE)
            .map(str::to_string)
            .ok_or_else(|| Error::Server("missing care_package in results".into()))
    }

    /// Fetch the Login Package JSON string, authenticating with either
    /// credential. Accepts the legacy `erepo_account_key` results field.
    pub fn get_login_package(
        &self,
        l1: &AuthId,
        auth: ServerAuth<'_>,
        otp: Option<&str>,
    ) -> Result<String> {
        let (auth_field, auth_value) = auth.field();
        let mut body = json!({
            fields::L1: l1.to_base64(),
            auth_field: auth_value,
        });
        attach_otp(&mut body, otp);
        let envelope = self.post(paths::LOGIN_PACKAGE_GET, body)?;
        let envelope = self.check(envelope, auth.rejection())?;
        envelope
            .result_str(fields::LOGIN_PACKAGE)
            .or_else(|| envelope.result_str("erepo_account_key"))
            .map(str::to_string)
            .ok_or_else(|| Error::Server("missing login_package in results".into()))
    }

    /// Publish a rewritten Care Package (set-recovery), carrying the
    /// current Login Package so the server verifies the pair.
    pub fn upload_care_package(
        &self,
        l1: &AuthId,
        p1: &PasswordAuth,
        lra1: Option<&RecoveryAuth>,
        care_package: &str,
        login_package: &str,
        otp: Option<&str>,
    ) -> Result<()> {
        let mut body = json!({
            fields::L1: l1.to_base64(),
            fields::P1: p1.to_base64(),
            fields::CARE_PACKAGE: care_package,
            fields::LOGIN_PACKAGE: login_package,
        });
        if let Some(lra1) = lra1 {
            body[fields::LRA1] = json!(lra1.to_base64());
        }
        attach_otp(&mut body, otp);
        let envelope = self.post(paths::UPLOAD_CARE_PACKAGE, body)?;
        self.check(envelope, Error::BadPassword)?;
        Ok(())
    }

    /// Rotate the password token, shipping the re-wrapped Login Package.
    pub fn change_password(
        &self,
        l1: &AuthId,
        auth: ServerAuth<'_>,
        new_p1: &PasswordAuth,
        login_package: &str,
        otp: Option<&str>,
    ) -> Result<()> {
        let (auth_field, auth_value) = auth.field();
        let mut body = json!({
            fields::L1: l1.to_base64(),
            auth_field: auth_value,
            fields::NEW_P1: new_p1.to_base64(),
            fields::LOGIN_PACKAGE: login_package,
        });
        attach_otp(&mut body, otp);
        let envelope = self.post(paths::PASSWORD_UPDATE, body)?;
        self.check(envelope, auth.rejection())?;
        Ok(())
    }

    /// Publish the TOTP key so other devices can be challenged.
    pub fn upload_otp(&self, l1: &AuthId, p1: &PasswordAuth, otp_key_base32: &str) -> Result<()> {
        let body = json!({
            fields::L1: l1.to_base64(),
            fields::P1: p1.to_base64(),
            fields::OTP: otp_key_base32,
        });
        let envelope = self.post(paths::OTP_UPDATE, body)?;
        self.check(envelope, Error::BadPassword)?;
        Ok(())
    }
}

fn attach_otp(body: &mut serde_json::Value, otp: Option<&str>) {
    if let Some(code) = otp {
        body[fields::OTP] = json!(code);
    }
}

// ============================================================================
// TESTS
// ============================================================================
