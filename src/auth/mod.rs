//! Authentication module.
//!
//! Handles salted password verification, stateless session tokens, and
//! the credential-store seam.

mod password;
mod store;
mod token;

pub use password::{hash_password, hash_password_with_iterations, verify_password};
pub use store::{verify_login, CredentialStore, StaticCredentialStore, UserRecord};
pub use token::{TokenClaims, TokenCodec};
