//! Salted password hashing and verification.
//!
//! Credentials are derived with PBKDF2-HMAC-SHA256 and stored as a single
//! string embedding the algorithm, iteration count, salt, and derived key:
//!
//! `pbkdf2-sha256$<iterations>$<base64url(salt)>$<base64url(key)>`

use std::num::NonZeroU32;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use ring::rand::{SecureRandom, SystemRandom};
use ring::{digest, pbkdf2};
use tracing::warn;

use crate::error::{AuthErrorKind, DaemonError};

/// Length of the random salt in bytes.
pub const SALT_LEN: usize = 16;

/// Length of the derived key in bytes (SHA-256 output).
pub const DERIVED_KEY_LEN: usize = digest::SHA256_OUTPUT_LEN;

/// Default PBKDF2 iteration count for newly hashed passwords.
pub const DEFAULT_ITERATIONS: u32 = 120_000;

/// Identifier stored in the record encoding.
const ALGORITHM_ID: &str = "pbkdf2-sha256";

static PBKDF2_ALG: pbkdf2::Algorithm = pbkdf2::PBKDF2_HMAC_SHA256;

/// Hash a password with a fresh random salt and the default iteration count.
///
/// Returns the storable record encoding.
pub fn hash_password(password: &str) -> Result<String, DaemonError> {
    hash_password_with_iterations(password, DEFAULT_ITERATIONS)
}

/// Hash a password with a fresh random salt and an explicit iteration count.
pub fn hash_password_with_iterations(
    password: &str,
    iterations: u32,
) -> Result<String, DaemonError> {
    let mut salt = [0u8; SALT_LEN];
    SystemRandom::new()
        .fill(&mut salt)
        .map_err(|_| DaemonError::Auth {
            kind: AuthErrorKind::SecretError {
                message: "Failed to generate random salt".to_string(),
            },
        })?;

    hash_password_with_salt(password, &salt, iterations)
}

/// Hash a password with a caller-supplied salt (deterministic, for tests
/// and for re-derivation).
pub fn hash_password_with_salt(
    password: &str,
    salt: &[u8],
    iterations: u32,
) -> Result<String, DaemonError> {
    let iterations_nz = NonZeroU32::new(iterations).ok_or_else(|| DaemonError::Config {
        message: "Password iteration count must be non-zero".to_string(),
    })?;

    let mut derived = [0u8; DERIVED_KEY_LEN];
    pbkdf2::derive(
        PBKDF2_ALG,
        iterations_nz,
        salt,
        password.as_bytes(),
        &mut derived,
    );

    Ok(format!(
        "{}${}${}${}",
        ALGORITHM_ID,
        iterations,
        URL_SAFE_NO_PAD.encode(salt),
        URL_SAFE_NO_PAD.encode(derived)
    ))
}

/// Verify a candidate password against a stored credential record.
///
/// Returns `false` for a wrong password AND for a corrupted record
/// encoding; callers must not be able to distinguish the two. A corrupted
/// record additionally produces a server-side warning, since that is a
/// provisioning problem rather than a bad login attempt.
///
/// The comparison of derived keys is constant-time (`ring::pbkdf2::verify`).
pub fn verify_password(password: &str, record: &str) -> bool {
    let parsed = match parse_record(record) {
        Some(parsed) => parsed,
        None => {
            warn!("Stored credential record is malformed; rejecting login");
            return false;
        }
    };

    let iterations = match NonZeroU32::new(parsed.iterations) {
        Some(n) => n,
        None => {
            warn!("Stored credential record has zero iterations; rejecting login");
            return false;
        }
    };

    pbkdf2::verify(
        PBKDF2_ALG,
        iterations,
        &parsed.salt,
        password.as_bytes(),
        &parsed.derived_key,
    )
    .is_ok()
}

struct ParsedRecord {
    iterations: u32,
    salt: Vec<u8>,
    derived_key: Vec<u8>,
}

/// Parse the `alg$iterations$salt$key` record encoding. Returns `None` on
/// any structural problem.
fn parse_record(record: &str) -> Option<ParsedRecord> {
    let mut parts = record.split('$');
    let alg = parts.next()?;
    let iterations = parts.next()?;
    let salt_b64 = parts.next()?;
    let key_b64 = parts.next()?;
    if parts.next().is_some() || alg != ALGORITHM_ID {
        return None;
    }

    let iterations: u32 = iterations.parse().ok()?;
    let salt = URL_SAFE_NO_PAD.decode(salt_b64).ok()?;
    let derived_key = URL_SAFE_NO_PAD.decode(key_b64).ok()?;
    if salt.is_empty() || derived_key.is_empty() {
        return None;
    }

    Some(ParsedRecord {
        iterations,
        salt,
        derived_key,
    })
}
