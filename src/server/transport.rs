//! The HTTP seam.
//!
//! The wire client only needs one capability: POST a JSON body to a path
//! and get a JSON value back. [`Transport`] captures that, [`HttpTransport`]
//! implements it over `ureq` with a per-operation deadline, and the test
//! suite substitutes an in-memory server.

use std::time::Duration;

use crate::error::{Error, Result};

/// Default per-operation deadline.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// `post(path, json) -> json` over some medium.
pub trait Transport {
    /// POST `body` to `path` (relative to the transport's base) and return
    /// the parsed response body.
    fn post(&self, path: &str, body: &serde_json::Value) -> Result<serde_json::Value>;
}

impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    fn post(&self, path: &str, body: &serde_json::Value) -> Result<serde_json::Value> {
        (**self).post(path, body)
    }
}

/// JSON-over-HTTPS transport to the account server.
pub struct HttpTransport {
    base_url: String,
    agent: ureq::Agent,
}

impl HttpTransport {
    /// Connect to `base_url` with the default deadline.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    /// Connect with an explicit per-operation deadline.
    ///
    /// A request that exceeds the deadline fails with `Network` and leaves
    /// all local state untouched.
    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            agent,
        }
    }
}

impl Transport for HttpTransport {
    fn post(&self, path: &str, body: &serde_json::Value) -> Result<serde_json::Value> {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        let response = self
            .agent
            .post(&url)
            .send_json(body.clone())
            .map_err(|e| match e {
                // The server always answers 200 with a status envelope;
                // anything else is a transport-level failure.
                ureq::Error::Status(code, _) => Error::Network(format!("HTTP {code} from {url}")),
                ureq::Error::Transport(t) => Error::Network(t.to_string()),
            })?;
        response
            .into_json()
            .map_err(|e| Error::Server(format!("malformed response body: {e}")))
    }
}
