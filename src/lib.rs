//! Vigil Daemon Library
//!
//! This crate provides the core functionality for the Vigil monitoring
//! dashboard backend: stateless session authentication and live host
//! telemetry streaming over HTTP.

pub mod audit;
pub mod auth;
pub mod config;
pub mod error;
pub mod http;
pub mod metrics;
pub mod stream;
pub mod validation;
