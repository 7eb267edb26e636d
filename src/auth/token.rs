//! Stateless session tokens signed with HMAC-SHA256.
//!
//! Wire form is three `.`-joined, URL-safe, padding-free base64 segments:
//! `b64(header_json).b64(payload_json).b64(hmac_sha256(header.payload))`.
//! The header is always `{"alg":"HS256","typ":"JWT"}`. Verification never
//! consults server-side state; a token is trusted only after the signature
//! checks out and the expiry is still in the future.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use ring::hmac;
use serde::{Deserialize, Serialize};

use crate::error::{AuthErrorKind, DaemonError};

/// Token header fields. Serialized in declaration order, so the encoding
/// is byte-stable across issuances.
#[derive(Debug, Serialize, Deserialize)]
struct TokenHeader {
    alg: String,
    typ: String,
}

impl TokenHeader {
    fn hs256() -> Self {
        Self {
            alg: "HS256".to_string(),
            typ: "JWT".to_string(),
        }
    }
}

/// Claims carried inside a session token.
///
/// Field order is part of the wire contract: issuing twice with identical
/// claims and timestamps must produce identical bytes, since the signature
/// is a pure function of the encoded payload. Extra claims live in a
/// `BTreeMap` for the same reason.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject (username).
    pub sub: String,
    /// Role granted to the subject.
    pub role: String,
    /// Issued-at, epoch seconds.
    pub iat: u64,
    /// Expiry, epoch seconds.
    pub exp: u64,
    /// Caller-supplied extra claims.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Issues and verifies session tokens.
///
/// The secret is bound at construction (read-only after process start)
/// and is never logged. The codec itself holds no mutable state.
pub struct TokenCodec {
    key: hmac::Key,
    ttl_seconds: u64,
}

impl TokenCodec {
    /// Create a codec from a raw secret and a token TTL.
    pub fn new(secret: &[u8], ttl_seconds: u64) -> Self {
        Self {
            key: hmac::Key::new(hmac::HMAC_SHA256, secret),
            ttl_seconds,
        }
    }

    /// Load the token secret from a file.
    ///
    /// Security: the file must have restrictive permissions (0600 or 0400)
    /// so the secret is not readable by other users.
    pub fn load_secret(path: &Path) -> Result<Vec<u8>, DaemonError> {
        let metadata = std::fs::metadata(path).map_err(|e| DaemonError::Auth {
            kind: AuthErrorKind::SecretError {
                message: format!(
                    "Failed to read secret metadata from {}: {}",
                    path.display(),
                    e
                ),
            },
        })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = metadata.permissions().mode();
            // Group and world bits must all be zero
            if mode & 0o077 != 0 {
                return Err(DaemonError::Auth {
                    kind: AuthErrorKind::SecretError {
                        message: format!(
                            "Secret file {} has insecure permissions {:04o}, expected 0600 or 0400",
                            path.display(),
                            mode & 0o777
                        ),
                    },
                });
            }
        }

        std::fs::read(path).map_err(|e| DaemonError::Auth {
            kind: AuthErrorKind::SecretError {
                message: format!("Failed to read secret from {}: {}", path.display(), e),
            },
        })
    }

    /// Issue a token for the given subject and role, stamped with the
    /// current time and the configured TTL.
    pub fn issue(
        &self,
        subject: &str,
        role: &str,
        extra: BTreeMap<String, serde_json::Value>,
    ) -> Result<String, DaemonError> {
        self.issue_at(subject, role, extra, unix_now())
    }

    /// Issue a token with an explicit issued-at timestamp.
    pub fn issue_at(
        &self,
        subject: &str,
        role: &str,
        extra: BTreeMap<String, serde_json::Value>,
        now: u64,
    ) -> Result<String, DaemonError> {
        let claims = TokenClaims {
            sub: subject.to_string(),
            role: role.to_string(),
            iat: now,
            exp: now + self.ttl_seconds,
            extra,
        };

        let header = serde_json::to_vec(&TokenHeader::hs256())?;
        let payload = serde_json::to_vec(&claims)?;

        let mut signing_input = String::with_capacity(header.len() + payload.len() + 1);
        signing_input.push_str(&URL_SAFE_NO_PAD.encode(header));
        signing_input.push('.');
        signing_input.push_str(&URL_SAFE_NO_PAD.encode(payload));

        let tag = hmac::sign(&self.key, signing_input.as_bytes());

        Ok(format!(
            "{}.{}",
            signing_input,
            URL_SAFE_NO_PAD.encode(tag.as_ref())
        ))
    }

    /// Verify a token and return its claims.
    ///
    /// Checks, in order:
    /// 1. Exactly three segments (`MalformedToken` otherwise)
    /// 2. Signature over the first two segments, compared in constant time
    ///    (`BadSignature` on mismatch)
    /// 3. Payload decodes to claims (`MalformedToken` otherwise)
    /// 4. Expiry still in the future (`Expired` otherwise)
    pub fn verify(&self, token: &str) -> Result<TokenClaims, DaemonError> {
        self.verify_at(token, unix_now())
    }

    /// Verify a token against an explicit current time.
    pub fn verify_at(&self, token: &str, now: u64) -> Result<TokenClaims, DaemonError> {
        let mut segments = token.split('.');
        let (header_b64, payload_b64, sig_b64) =
            match (segments.next(), segments.next(), segments.next()) {
                (Some(h), Some(p), Some(s)) if segments.next().is_none() => (h, p, s),
                _ => {
                    return Err(DaemonError::Auth {
                        kind: AuthErrorKind::MalformedToken,
                    })
                }
            };

        let signature = URL_SAFE_NO_PAD
            .decode(sig_b64)
            .map_err(|_| DaemonError::Auth {
                kind: AuthErrorKind::MalformedToken,
            })?;

        let signing_input = format!("{}.{}", header_b64, payload_b64);
        hmac::verify(&self.key, signing_input.as_bytes(), &signature).map_err(|_| {
            DaemonError::Auth {
                kind: AuthErrorKind::BadSignature,
            }
        })?;

        let payload = URL_SAFE_NO_PAD
            .decode(payload_b64)
            .map_err(|_| DaemonError::Auth {
                kind: AuthErrorKind::MalformedToken,
            })?;
        let claims: TokenClaims =
            serde_json::from_slice(&payload).map_err(|_| DaemonError::Auth {
                kind: AuthErrorKind::MalformedToken,
            })?;

        if claims.exp < now {
            return Err(DaemonError::Auth {
                kind: AuthErrorKind::Expired,
            });
        }

        Ok(claims)
    }

    /// Configured token TTL in seconds.
    pub fn ttl_seconds(&self) -> u64 {
        self.ttl_seconds
    }
}

/// Current Unix time in seconds.
fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
