//! Login input validation.
//!
//! Validates the username field of a login attempt before it reaches the
//! credential store. This is shape validation only; it must not reveal
//! anything about which usernames exist.

use crate::error::{AuthErrorKind, DaemonError};

/// Maximum accepted username length.
const MAX_USERNAME_LENGTH: usize = 64;

/// Validate a login username.
///
/// Rules:
/// - Must not be empty (after the caller trims whitespace)
/// - Must not exceed 64 characters
/// - Must not contain whitespace or ASCII control characters
///
/// Violations are reported as `InvalidCredentials` so a rejected shape is
/// indistinguishable from a failed login.
pub fn validate_username(username: &str) -> Result<(), DaemonError> {
    let invalid = || DaemonError::Auth {
        kind: AuthErrorKind::InvalidCredentials,
    };

    if username.is_empty() || username.len() > MAX_USERNAME_LENGTH {
        return Err(invalid());
    }

    if username
        .chars()
        .any(|c| c.is_whitespace() || c.is_control())
    {
        return Err(invalid());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_usernames() {
        for name in ["admin", "alice", "ops-team", "user_01", "Ops.Admin", "观察员"] {
            assert!(validate_username(name).is_ok(), "{name} should be valid");
        }
    }

    #[test]
    fn test_empty_rejected() {
        assert!(validate_username("").is_err());
    }

    #[test]
    fn test_overlong_rejected() {
        let name = "a".repeat(MAX_USERNAME_LENGTH + 1);
        assert!(validate_username(&name).is_err());
    }

    #[test]
    fn test_whitespace_and_control_rejected() {
        for name in ["has space", "tab\there", "line\nbreak", "bell\x07"] {
            assert!(validate_username(name).is_err(), "{name:?} should be rejected");
        }
    }

    #[test]
    fn test_rejection_is_invalid_credentials() {
        let err = validate_username("").unwrap_err();
        assert!(matches!(
            err,
            DaemonError::Auth {
                kind: AuthErrorKind::InvalidCredentials
            }
        ));
    }
}
