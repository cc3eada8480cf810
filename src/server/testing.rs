//! In-memory account server implementing the wire contract, so the login
//! flows can be exercised end-to-end without a network.

use std::collections::HashMap;
use std::sync::Mutex;

use serde_json::json;

use crate::error::Result;
use crate::identity::otp::OtpKey;
use crate::server::protocol::{fields, paths, status};
use crate::server::transport::Transport;

#[derive(Clone, Default)]
struct MockAccount {
    p1: String,
    lra1: Option<String>,
    care_package: String,
    login_package: String,
    repo_key: String,
    otp_key: Option<String>,
}

#[derive(Default)]
struct MockState {
    accounts: HashMap<String, MockAccount>,
    requests: u32,
    fail_next: Option<(i64, String)>,
}

/// A deterministic stand-in for the account server.
#[derive(Default)]
pub struct MockServer {
    state: Mutex<MockState>,
}

impl MockServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total requests seen, for asserting "contacted once" properties.
    pub fn request_count(&self) -> u32 {
        self.state.lock().unwrap().requests
    }

    /// Make the next request fail with an arbitrary status code.
    pub fn fail_next_with(&self, code: i64, message: &str) {
        self.state.lock().unwrap().fail_next = Some((code, message.to_string()));
    }

    fn failure(code: i64, message: &str) -> serde_json::Value {
        json!({"status_code": code, "message": message})
    }

    fn success(results: Option<serde_json::Value>) -> serde_json::Value {
        match results {
            Some(results) => json!({"status_code": status::SUCCESS, "results": results}),
            None => json!({"status_code": status::SUCCESS}),
        }
    }

    fn otp_challenge() -> serde_json::Value {
        json!({
            "status_code": status::INVALID_PASSWORD,
            "message": "otp required",
            "results": {"otp": true}
        })
    }

    /// Check the second factor: enforced whenever the account has a key.
    fn otp_ok(account: &MockAccount, body: &serde_json::Value) -> bool {
        let Some(key_b32) = &account.otp_key else {
            return true;
        };
        let Some(code) = body.get(fields::OTP).and_then(|v| v.as_str()) else {
            return false;
        };
        let Ok(key) = OtpKey::from_base32(key_b32) else {
            return false;
        };
        key.current_code().map(|c| c == code).unwrap_or(false)
    }

    /// The password or recovery credential check used by the
    /// authenticated endpoints.
    fn auth_ok(account: &MockAccount, body: &serde_json::Value) -> bool {
        if let Some(p1) = body.get(fields::P1).and_then(|v| v.as_str()) {
            return p1 == account.p1;
        }
        if let Some(lra1) = body.get(fields::LRA1).and_then(|v| v.as_str()) {
            return Some(lra1) == account.lra1.as_deref();
        }
        false
    }

    fn str_field(body: &serde_json::Value, key: &str) -> String {
        body.get(key)
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string()
    }

    fn handle(&self, path: &str, body: &serde_json::Value) -> serde_json::Value {
        let mut state = self.state.lock().unwrap();
        state.requests += 1;
        if let Some((code, message)) = state.fail_next.take() {
            return Self::failure(code, &message);
        }

        let l1 = Self::str_field(body, fields::L1);
        match path {
            paths::CREATE => {
                if state.accounts.contains_key(&l1) {
                    return Self::failure(status::ACCOUNT_EXISTS, "account exists");
                }
                state.accounts.insert(
                    l1,
                    MockAccount {
                        p1: Self::str_field(body, fields::P1),
                        lra1: None,
                        care_package: Self::str_field(body, fields::CARE_PACKAGE),
                        login_package: Self::str_field(body, fields::LOGIN_PACKAGE),
                        repo_key: Self::str_field(body, fields::REPO_ACCOUNT_KEY),
                        otp_key: None,
                    },
                );
                Self::success(None)
            }

            paths::ACTIVATED => {
                if state.accounts.contains_key(&l1) {
                    Self::success(None)
                } else {
                    Self::failure(status::NO_ACCOUNT, "no account")
                }
            }

            paths::CARE_PACKAGE_GET => match state.accounts.get(&l1) {
                Some(account) => {
                    Self::success(Some(json!({fields::CARE_PACKAGE: account.care_package})))
                }
                None => Self::failure(status::NO_ACCOUNT, "no account"),
            },

            paths::LOGIN_PACKAGE_GET => match state.accounts.get(&l1) {
                Some(account) => {
                    if !Self::auth_ok(account, body) {
                        return Self::failure(status::INVALID_PASSWORD, "bad credential");
                    }
                    if !Self::otp_ok(account, body) {
                        return Self::otp_challenge();
                    }
                    Self::success(Some(json!({fields::LOGIN_PACKAGE: account.login_package})))
                }
                None => Self::failure(status::NO_ACCOUNT, "no account"),
            },

            paths::UPLOAD_CARE_PACKAGE => {
                let care = Self::str_field(body, fields::CARE_PACKAGE);
                let login = Self::str_field(body, fields::LOGIN_PACKAGE);
                let lra1 = body
                    .get(fields::LRA1)
                    .and_then(|v| v.as_str())
                    .map(str::to_string);
                match state.accounts.get_mut(&l1) {
                    Some(account) => {
                        if body.get(fields::P1).and_then(|v| v.as_str())
                            != Some(account.p1.as_str())
                        {
                            return Self::failure(status::INVALID_PASSWORD, "bad credential");
                        }
                        if !Self::otp_ok(account, body) {
                            return Self::otp_challenge();
                        }
                        account.care_package = care;
                        account.login_package = login;
                        if lra1.is_some() {
                            account.lra1 = lra1;
                        }
                        Self::success(None)
                    }
                    None => Self::failure(status::NO_ACCOUNT, "no account"),
                }
            }

            paths::PASSWORD_UPDATE => match state.accounts.get_mut(&l1) {
                Some(account) => {
                    if !Self::auth_ok(account, body) {
                        return Self::failure(status::INVALID_PASSWORD, "bad credential");
                    }
                    if !Self::otp_ok(account, body) {
                        return Self::otp_challenge();
                    }
                    account.p1 = Self::str_field(body, fields::NEW_P1);
                    account.login_package = Self::str_field(body, fields::LOGIN_PACKAGE);
                    Self::success(None)
                }
                None => Self::failure(status::NO_ACCOUNT, "no account"),
            },

            paths::OTP_UPDATE => match state.accounts.get_mut(&l1) {
                Some(account) => {
                    if body.get(fields::P1).and_then(|v| v.as_str()) != Some(account.p1.as_str()) {
                        return Self::failure(status::INVALID_PASSWORD, "bad credential");
                    }
                    account.otp_key = Some(Self::str_field(body, fields::OTP));
                    Self::success(None)
                }
                None => Self::failure(status::NO_ACCOUNT, "no account"),
            },

            _ => Self::failure(status::BAD_REQUEST, "unknown path"),
        }
    }

    /// Peek at the stored repo key, for create-flow assertions.
    pub fn repo_key(&self, l1_base64: &str) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .accounts
            .get(l1_base64)
            .map(|a| a.repo_key.clone())
    }
}

impl Transport for MockServer {
    fn post(&self, path: &str, body: &serde_json::Value) -> Result<serde_json::Value> {
        Ok(self.handle(path, body))
    }
}
