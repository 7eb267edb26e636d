//! Input validation.

mod username;

pub use username::validate_username;
