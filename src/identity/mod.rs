//! # Identity
//!
//! Identity inputs and the keys derived from them. The username is the
//! anchor: everywhere a username becomes an identity input it first passes
//! through [`Username::canonicalize`], so that `"Alice "` and `"alice"`
//! name the same account and the same derivation seeds.
//!
//! Canonicalization rules, applied to the raw UTF-8 bytes:
//!
//! 1. Collapse any run of ASCII whitespace bytes to a single space.
//! 2. Trim leading and trailing spaces.
//! 3. Reject any remaining byte outside printable ASCII `[0x20, 0x7E]`.
//! 4. Map ASCII `A–Z` to `a–z`. No other case folding.
//!
//! The scan is byte-wise on purpose: non-ASCII whitespace such as U+00A0
//! is not collapsed, its encoding bytes fall through to rule 3 and the
//! name is rejected.

pub mod derivation;
pub mod keys;
pub mod otp;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A canonical username.
///
/// The only way to obtain one is [`Username::canonicalize`], so holding a
/// `Username` is proof the rules above were applied.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Username(String);

impl Username {
    /// Apply the canonicalization rules to raw user input.
    pub fn canonicalize(input: &str) -> Result<Self> {
        let mut out: Vec<u8> = Vec::with_capacity(input.len());

        // Collapse leading and internal ASCII whitespace runs. 0x0b is
        // vertical tab, the one whitespace byte is_ascii_whitespace omits.
        let mut in_space = true;
        for &b in input.as_bytes() {
            if b.is_ascii_whitespace() || b == 0x0b {
                if !in_space {
                    out.push(b' ');
                }
                in_space = true;
            } else {
                out.push(b);
                in_space = false;
            }
        }

        // Drop the trailing space, if any
        if out.last() == Some(&b' ') {
            out.pop();
        }

        if out.is_empty() {
            return Err(Error::BadUsername("empty after trimming".into()));
        }

        // Scan for bad bytes and lowercase ASCII letters
        for b in &mut out {
            if !(0x20..=0x7E).contains(b) {
                return Err(Error::BadUsername(format!(
                    "byte 0x{b:02x} is outside printable ASCII"
                )));
            }
            b.make_ascii_lowercase();
        }

        // Every byte is printable ASCII at this point
        let canonical = String::from_utf8(out)
            .map_err(|_| Error::BadUsername("not valid ASCII".into()))?;
        Ok(Self(canonical))
    }

    /// The canonical string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The identity seed bytes (`L` in the derivation graph).
    pub fn seed_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl std::fmt::Display for Username {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collapse_and_trim() {
        assert_eq!(
            Username::canonicalize("  Foo  Bar  ").unwrap().as_str(),
            "foo bar"
        );
    }

    #[test]
    fn test_tab_collapses_to_space() {
        assert_eq!(Username::canonicalize("x\ty").unwrap().as_str(), "x y");
        assert_eq!(Username::canonicalize("x\u{0b}y").unwrap().as_str(), "x y");
    }

    #[test]
    fn test_unicode_whitespace_rejected() {
        // Only ASCII whitespace collapses; NBSP and ideographic space
        // leave non-ASCII bytes behind and the name is rejected
        assert!(matches!(
            Username::canonicalize("foo\u{a0}bar"),
            Err(Error::BadUsername(_))
        ));
        assert!(matches!(
            Username::canonicalize("foo\u{3000}bar"),
            Err(Error::BadUsername(_))
        ));
    }

    #[test]
    fn test_ascii_lowercasing_only() {
        assert_eq!(
            Username::canonicalize("AlIcE 99!").unwrap().as_str(),
            "alice 99!"
        );
    }

    #[test]
    fn test_non_ascii_rejected() {
        assert!(matches!(
            Username::canonicalize("héllo"),
            Err(Error::BadUsername(_))
        ));
    }

    #[test]
    fn test_control_characters_rejected() {
        // NUL is not whitespace, so it survives collapsing and must be caught
        assert!(Username::canonicalize("a\u{0}b").is_err());
    }

    #[test]
    fn test_empty_rejected() {
        assert!(Username::canonicalize("   ").is_err());
        assert!(Username::canonicalize("").is_err());
    }

    #[test]
    fn test_already_canonical_is_identity() {
        assert_eq!(Username::canonicalize("alice").unwrap().as_str(), "alice");
    }
}
