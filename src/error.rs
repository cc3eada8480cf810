//! # Error Handling
//!
//! One closed error taxonomy for the whole library. Every public operation
//! returns [`Result<T>`]; callers can match exhaustively on [`Error`] and
//! react per kind (retry on `Network`, re-prompt on `BadPassword`, and so
//! on) without string inspection.
//!
//! Internal failures fold into the public set at the boundary where they
//! occur: filesystem I/O becomes [`Error::Storage`], JSON parse failures
//! and missing package fields become [`Error::Corrupt`], and any envelope
//! MAC or padding mismatch that is not a password/answer check becomes
//! [`Error::DecryptFailure`].

use thiserror::Error;

/// Result type alias for Quiver Core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Quiver Core
///
/// The set is closed: new failure modes must map onto one of these kinds.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Identity errors
    // ========================================================================

    /// Username canonicalization rejected the input
    #[error("Bad username: {0}")]
    BadUsername(String),

    /// Local or server collision on account creation
    #[error("An account with this username already exists.")]
    AccountAlreadyExists,

    /// Local lookup or server lookup found no such account
    #[error("No account with this username exists.")]
    AccountDoesNotExist,

    /// The master-key envelope would not decrypt, or the server rejected P1
    #[error("The password is incorrect.")]
    BadPassword,

    /// The recovery copy would not decrypt, or the server rejected LRA1
    #[error("The recovery answers are incorrect.")]
    BadRecoveryAnswers,

    /// The Care Package carries no encrypted recovery questions
    #[error("No recovery questions have been set for this account.")]
    NoRecoveryQuestions,

    // ========================================================================
    // Second factor
    // ========================================================================

    /// The server demands a one-time password and none is available locally
    #[error("A two-factor code is required and no key is stored on this device.")]
    OtpRequired,

    /// The locally computed one-time password was rejected
    #[error("The two-factor code was rejected.")]
    OtpMismatch,

    // ========================================================================
    // Crypto / settings
    // ========================================================================

    /// Envelope MAC or padding failure not otherwise classified
    #[error("Decryption failed: {0}")]
    DecryptFailure(String),

    /// Settings save with a PIN containing non-digit characters
    #[error("The PIN must contain only digits.")]
    NonNumericPin,

    // ========================================================================
    // Transport / storage
    // ========================================================================

    /// Transport failure or deadline exceeded
    #[error("Network error: {0}")]
    Network(String),

    /// Non-success server status code not otherwise classified
    #[error("Server error: {0}")]
    Server(String),

    /// Filesystem I/O failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// JSON parse failure or missing required field in a package
    #[error("Corrupt data: {0}")]
    Corrupt(String),
}

impl Error {
    /// Whether retrying or different user input can resolve this error.
    ///
    /// `Corrupt` and `Storage` on a package read are fatal for the
    /// operation; everything else is either transient or fixable by the
    /// user supplying different credentials.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Error::Corrupt(_) | Error::Storage(_))
    }
}

// ============================================================================
// ERROR CONVERSIONS
// ============================================================================

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Corrupt(err.to_string())
    }
}

// ============================================================================
// TESTS
// ============================================================================
