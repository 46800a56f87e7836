//! passport-spa - OAuth 2.0 authorization code + PKCE client library
//!
//! This library signs a client application in against a Laravel Passport
//! style authorization server, keeps the resulting bearer token, and
//! refreshes it on demand.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `auth`: PKCE requests, correlation entries, silent and redirect
//!   transports, token exchange and the [`PassportClient`] session
//! - `platform`: capability traits (randomness, digest, storage, HTTP,
//!   background frames, the page) with native and fake implementations
//! - `config`: client options, YAML loading and environment overrides
//! - `error`: error types and result aliases
//! - `util`: URL normalization and query parsing
//! - `cli` / `commands`: the `passport-spa` command-line interface
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use passport_spa::platform::{Platform, SqliteStore};
//! use passport_spa::{ClientOptions, PassportClient};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let options = ClientOptions::load("passport-spa.yaml")?;
//!     let platform = Platform::native(&options, Arc::new(SqliteStore::new()?))?;
//!     let client = PassportClient::new(options, platform)?;
//!
//!     if let Some(token) = client.get_token().await {
//!         println!("Bearer {}", token);
//!     }
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod platform;
pub mod util;

// Re-export commonly used types
pub use auth::{AuthorizationRequest, DecodedToken, PassportClient};
pub use config::ClientOptions;
pub use error::{PassportError, Result};
pub use platform::Platform;
