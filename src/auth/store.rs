//! Credential store.
//!
//! Relational user storage is owned by an external collaborator; the core
//! only needs username lookup. This module defines that seam as a trait
//! plus a file-backed implementation loaded from a TOML users file.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::config::UsersConfig;
use crate::error::{AuthErrorKind, DaemonError};

use super::password::{hash_password_with_iterations, verify_password};

/// Username and password seeded when no users file is configured, matching
/// the provisioning default of the dashboard installer. The startup log
/// warns loudly when this account is active.
const DEFAULT_ADMIN_USER: &str = "admin";
const DEFAULT_ADMIN_PASSWORD: &str = "admin123";

/// A provisioned user as seen by the authentication layer.
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub username: String,
    pub role: String,
    pub email: Option<String>,
    pub enabled: bool,
    /// Encoded credential record (see `auth::password`).
    pub password_record: String,
}

/// Lookup seam consumed by the authentication layer.
pub trait CredentialStore: Send + Sync {
    /// Fetch a user by username. Returns `None` for unknown users.
    fn get_by_username(&self, username: &str) -> Option<UserRecord>;
}

/// TOML row shape of the users file.
#[derive(Debug, Deserialize)]
struct UserFileEntry {
    username: String,
    role: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default = "default_enabled")]
    enabled: bool,
    password: String,
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct UsersFile {
    #[serde(default)]
    users: Vec<UserFileEntry>,
}

/// In-memory credential store loaded once at startup.
pub struct StaticCredentialStore {
    users: HashMap<String, UserRecord>,
}

impl StaticCredentialStore {
    /// Build the store from configuration: load the users file when one is
    /// configured and readable, otherwise seed the default admin account
    /// hashed at the configured iteration count.
    pub fn from_config(config: &UsersConfig, password_iterations: u32) -> Result<Self, DaemonError> {
        match &config.file {
            Some(path) if path.exists() => Self::load(path),
            Some(path) => {
                warn!(
                    path = %path.display(),
                    "Users file not found, seeding default admin account"
                );
                Self::seeded(password_iterations)
            }
            None => {
                warn!("No users file configured, seeding default admin account");
                Self::seeded(password_iterations)
            }
        }
    }

    /// Load users from a TOML file.
    pub fn load(path: &Path) -> Result<Self, DaemonError> {
        let content = std::fs::read_to_string(path).map_err(|e| DaemonError::Config {
            message: format!("Failed to read users file '{}': {}", path.display(), e),
        })?;

        let parsed: UsersFile = toml::from_str(&content).map_err(|e| DaemonError::Config {
            message: format!("Failed to parse users file '{}': {}", path.display(), e),
        })?;

        if parsed.users.is_empty() {
            return Err(DaemonError::Config {
                message: format!("Users file '{}' contains no users", path.display()),
            });
        }

        let mut users = HashMap::new();
        for entry in parsed.users {
            if users.contains_key(&entry.username) {
                return Err(DaemonError::Config {
                    message: format!("Duplicate username '{}' in users file", entry.username),
                });
            }
            users.insert(
                entry.username.clone(),
                UserRecord {
                    username: entry.username,
                    role: entry.role,
                    email: entry.email,
                    enabled: entry.enabled,
                    password_record: entry.password,
                },
            );
        }

        info!(count = users.len(), path = %path.display(), "Users loaded");
        Ok(Self { users })
    }

    /// Build a store containing only the default admin account.
    pub fn seeded(password_iterations: u32) -> Result<Self, DaemonError> {
        warn!(
            username = DEFAULT_ADMIN_USER,
            "Default admin account active; change its password before exposing the daemon"
        );

        let record = hash_password_with_iterations(DEFAULT_ADMIN_PASSWORD, password_iterations)?;
        let mut users = HashMap::new();
        users.insert(
            DEFAULT_ADMIN_USER.to_string(),
            UserRecord {
                username: DEFAULT_ADMIN_USER.to_string(),
                role: "admin".to_string(),
                email: Some("admin@local".to_string()),
                enabled: true,
                password_record: record,
            },
        );

        Ok(Self { users })
    }

    /// Build a store from explicit records (for tests).
    pub fn from_records(records: Vec<UserRecord>) -> Self {
        let users = records
            .into_iter()
            .map(|r| (r.username.clone(), r))
            .collect();
        Self { users }
    }

    /// Number of provisioned users.
    pub fn len(&self) -> usize {
        self.users.len()
    }

    /// True when no users are provisioned.
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

impl CredentialStore for StaticCredentialStore {
    fn get_by_username(&self, username: &str) -> Option<UserRecord> {
        self.users.get(username).cloned()
    }
}

/// Verify a username/password pair against the store.
///
/// Unknown user, disabled account, malformed stored record, and wrong
/// password all collapse into `InvalidCredentials` so that callers (and
/// ultimately clients) cannot tell which check failed. The specific reason
/// is logged at debug level for operators.
pub fn verify_login(
    store: &dyn CredentialStore,
    username: &str,
    password: &str,
) -> Result<UserRecord, DaemonError> {
    let invalid = || DaemonError::Auth {
        kind: AuthErrorKind::InvalidCredentials,
    };

    let user = match store.get_by_username(username) {
        Some(user) => user,
        None => {
            debug!(username = %username, "Login rejected: unknown user");
            return Err(invalid());
        }
    };

    if !user.enabled {
        debug!(username = %username, "Login rejected: account disabled");
        return Err(invalid());
    }

    if !verify_password(password, &user.password_record) {
        debug!(username = %username, "Login rejected: password mismatch");
        return Err(invalid());
    }

    Ok(user)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::password::hash_password_with_iterations;

    fn test_user(username: &str, password: &str, enabled: bool) -> UserRecord {
        UserRecord {
            username: username.to_string(),
            role: "admin".to_string(),
            email: None,
            enabled,
            password_record: hash_password_with_iterations(password, 1_000).unwrap(),
        }
    }

    #[test]
    fn test_load_users_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.toml");
        let record = hash_password_with_iterations("s3cret", 1_000).unwrap();
        std::fs::write(
            &path,
            format!(
                r#"
                [[users]]
                username = "alice"
                role = "admin"
                email = "alice@local"
                password = "{record}"

                [[users]]
                username = "bob"
                role = "viewer"
                enabled = false
                password = "{record}"
                "#
            ),
        )
        .unwrap();

        let store = StaticCredentialStore::load(&path).unwrap();
        assert_eq!(store.len(), 2);

        let alice = store.get_by_username("alice").unwrap();
        assert_eq!(alice.role, "admin");
        assert!(alice.enabled);

        let bob = store.get_by_username("bob").unwrap();
        assert!(!bob.enabled);

        assert!(store.get_by_username("mallory").is_none());
    }

    #[test]
    fn test_duplicate_usernames_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.toml");
        std::fs::write(
            &path,
            r#"
            [[users]]
            username = "alice"
            role = "admin"
            password = "x"

            [[users]]
            username = "alice"
            role = "viewer"
            password = "y"
            "#,
        )
        .unwrap();

        assert!(StaticCredentialStore::load(&path).is_err());
    }

    #[test]
    fn test_empty_users_file_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.toml");
        std::fs::write(&path, "").unwrap();
        assert!(StaticCredentialStore::load(&path).is_err());
    }

    #[test]
    fn test_seeded_store_verifies_default_admin() {
        let store = StaticCredentialStore::seeded(1_000).unwrap();
        assert!(verify_login(&store, "admin", "admin123").is_ok());
        assert!(verify_login(&store, "admin", "wrong").is_err());
    }

    #[test]
    fn test_verify_login_success() {
        let store = StaticCredentialStore::from_records(vec![test_user("alice", "pw", true)]);
        let user = verify_login(&store, "alice", "pw").unwrap();
        assert_eq!(user.username, "alice");
    }

    #[test]
    fn test_all_failures_collapse_to_invalid_credentials() {
        let store = StaticCredentialStore::from_records(vec![
            test_user("alice", "pw", true),
            test_user("carol", "pw", false),
            UserRecord {
                username: "dave".to_string(),
                role: "admin".to_string(),
                email: None,
                enabled: true,
                password_record: "garbage-record".to_string(),
            },
        ]);

        // Wrong password, unknown user, disabled account, malformed record:
        // all indistinguishable.
        for (user, pass) in [
            ("alice", "wrong"),
            ("nobody", "pw"),
            ("carol", "pw"),
            ("dave", "pw"),
        ] {
            let err = verify_login(&store, user, pass).unwrap_err();
            assert!(
                matches!(
                    err,
                    DaemonError::Auth {
                        kind: AuthErrorKind::InvalidCredentials
                    }
                ),
                "({user}, {pass}) gave {err:?}"
            );
        }
    }
}
