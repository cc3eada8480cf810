//! Wire shapes of the account-server protocol.
//!
//! Every request is a POST with a JSON body; every response is the
//! envelope `{"status_code": N, "message"?: str, "results"?: obj}`.
//! Byte-valued credential fields travel as base64; package fields are
//! string-encoded JSON.

use serde::Deserialize;

/// Endpoint paths, relative to the configured base URL.
#[allow(missing_docs)]
pub mod paths {
    pub const CREATE: &str = "/account/create";
    pub const ACTIVATED: &str = "/account/activated";
    pub const CARE_PACKAGE_GET: &str = "/account/carepackage/get";
    pub const LOGIN_PACKAGE_GET: &str = "/account/loginpackage/get";
    pub const UPLOAD_CARE_PACKAGE: &str = "/account/upload_carepackage";
    pub const PASSWORD_UPDATE: &str = "/account/password/update";
    pub const OTP_UPDATE: &str = "/account/otp/update";
}

/// JSON field keys of the request bodies.
#[allow(missing_docs)]
pub mod fields {
    pub const L1: &str = "l1";
    pub const P1: &str = "p1";
    pub const LRA1: &str = "lra1";
    pub const NEW_P1: &str = "new_p1";
    pub const CARE_PACKAGE: &str = "care_package";
    pub const LOGIN_PACKAGE: &str = "login_package";
    pub const REPO_ACCOUNT_KEY: &str = "repo_account_key";
    pub const OTP: &str = "otp";
}

/// Server status codes.
#[allow(missing_docs)]
pub mod status {
    pub const SUCCESS: i64 = 0;
    pub const ERROR: i64 = 1;
    pub const NO_ACCOUNT: i64 = 2;
    pub const INVALID_PASSWORD: i64 = 3;
    pub const ACCOUNT_EXISTS: i64 = 4;
    pub const BAD_REQUEST: i64 = 5;
}

/// The response envelope every endpoint returns.
#[derive(Debug, Deserialize)]
pub struct ResponseEnvelope {
    /// One of the [`status`] codes
    pub status_code: i64,
    /// Optional human-readable detail
    #[serde(default)]
    pub message: Option<String>,
    /// Endpoint-specific payload
    #[serde(default)]
    pub results: Option<serde_json::Value>,
}

impl ResponseEnvelope {
    /// Parse the raw transport response.
    pub fn from_value(value: serde_json::Value) -> crate::error::Result<Self> {
        serde_json::from_value(value)
            .map_err(|e| crate::error::Error::Server(format!("malformed response: {e}")))
    }

    /// Whether a non-success response carries a second-factor challenge.
    pub fn otp_challenged(&self) -> bool {
        self.status_code != status::SUCCESS
            && self
                .results
                .as_ref()
                .and_then(|r| r.get("otp"))
                .and_then(|v| v.as_bool())
                .unwrap_or(false)
    }

    /// Fetch a string field out of `results`.
    pub fn result_str(&self, key: &str) -> Option<&str> {
        self.results
            .as_ref()
            .and_then(|r| r.get(key))
            .and_then(|v| v.as_str())
    }
}
