//! HTTP surface: router, shared state, session cookie, handlers.

pub mod cookie;
mod handlers;
mod router;
mod state;

pub use router::build_router;
pub use state::AppState;
