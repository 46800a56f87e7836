//! Platform capabilities the session depends on
//!
//! Everything the authorization state machine needs from its surroundings
//! is expressed as a trait here and injected through [`Platform`]:
//!
//! - [`RandomSource`] -- secure random bytes for `state` and `code_verifier`
//! - [`DigestSource`] -- SHA-256 for the PKCE challenge
//! - [`KeyValueStore`] -- persistent storage for correlation entries
//! - [`JsonFetcher`] -- JSON POST requests to the token endpoint
//! - [`FrameHost`] / [`Frame`] -- isolated background contexts for silent
//!   authorization
//! - [`Page`] -- the current page: its query string and navigation
//!
//! Native implementations live in the submodules; [`fake`] holds
//! deterministic substitutes for tests.

use std::sync::Arc;

use crate::config::ClientOptions;
use crate::error::Result;

pub mod crypto;
pub mod fake;
pub mod frame;
pub mod http;
pub mod page;
pub mod storage;

pub use crypto::{OsRandom, Sha256Digest};
pub use frame::HttpFrameHost;
pub use http::ReqwestFetcher;
pub use page::SystemBrowser;
pub use storage::{MemoryStore, SqliteStore};

/// Source of cryptographically secure random bytes
pub trait RandomSource: Send + Sync {
    /// Fill `dest` with random bytes.
    fn fill_bytes(&self, dest: &mut [u8]);
}

/// SHA-256 digest primitive
#[async_trait::async_trait]
pub trait DigestSource: Send + Sync {
    /// Hash `data` and return the 32-byte digest.
    ///
    /// # Errors
    ///
    /// Implementations backed by an external primitive may fail.
    async fn sha256(&self, data: &[u8]) -> Result<Vec<u8>>;
}

/// String key-value storage that outlives a page navigation
///
/// Implementations are not required to make a read-then-delete atomic;
/// [`CorrelationStore`](crate::auth::correlation::CorrelationStore)
/// serializes that itself.
pub trait KeyValueStore: Send + Sync {
    /// Read the value stored under `key`.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store `value` under `key`, replacing any previous value.
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Delete `key`. Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<()>;
}

/// Performs a JSON request and returns the parsed JSON answer
#[async_trait::async_trait]
pub trait JsonFetcher: Send + Sync {
    /// POST `body` as JSON to `url`.
    ///
    /// # Errors
    ///
    /// Returns [`PassportError::Transport`](crate::error::PassportError::Transport)
    /// when the server answers with a non-success status; the server's
    /// `error` and `error_description` fields are carried when present.
    async fn post_json(&self, url: &str, body: &serde_json::Value) -> Result<serde_json::Value>;
}

/// Load-like signals a background frame can emit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameEvent {
    /// The frame's document has been parsed
    DomContentLoaded,
    /// The frame finished loading
    Load,
}

/// Creates isolated background contexts
#[async_trait::async_trait]
pub trait FrameHost: Send + Sync {
    /// Create a hidden frame and start loading `url` in it.
    async fn attach(&self, url: &str) -> Result<Box<dyn Frame>>;
}

/// A single isolated background context
#[async_trait::async_trait]
pub trait Frame: Send {
    /// Wait for the next load-like signal; `None` once no more can arrive.
    async fn next_event(&mut self) -> Option<FrameEvent>;

    /// The frame's current query string including the leading `?`, or
    /// `None` when it cannot be read (for example a foreign origin).
    fn query(&self) -> Option<String>;

    /// Tear the frame down.
    ///
    /// # Errors
    ///
    /// Fails when the frame is already gone.
    fn detach(&mut self) -> Result<()>;
}

/// The page the client runs in
pub trait Page: Send + Sync {
    /// Current query string including the leading `?`, or an empty string.
    fn search(&self) -> String;

    /// `false` when running inside a background frame.
    fn is_top_level(&self) -> bool;

    /// Navigate the page to `url`.
    fn assign(&self, url: &str) -> Result<()>;
}

/// The set of capabilities handed to a
/// [`PassportClient`](crate::auth::session::PassportClient)
#[derive(Clone)]
pub struct Platform {
    /// Random bytes for request parameters
    pub random: Arc<dyn RandomSource>,
    /// Digest for the PKCE challenge
    pub digest: Arc<dyn DigestSource>,
    /// Correlation entry storage
    pub store: Arc<dyn KeyValueStore>,
    /// Token endpoint transport
    pub fetcher: Arc<dyn JsonFetcher>,
    /// Silent authorization contexts
    pub frames: Arc<dyn FrameHost>,
    /// The current page
    pub page: Arc<dyn Page>,
}

impl Platform {
    /// Native capabilities for a process acting as the top-level page
    ///
    /// Uses the OS random generator, `sha2`, `reqwest` for both the token
    /// endpoint and silent authorization, the system browser for redirects,
    /// and the given store for correlation entries.
    ///
    /// # Errors
    ///
    /// Returns error if the options' `redirect_uri` does not parse or an
    /// HTTP client cannot be built.
    pub fn native(options: &ClientOptions, store: Arc<dyn KeyValueStore>) -> Result<Self> {
        let redirect_uri = url::Url::parse(&options.redirect_uri)?;
        Ok(Self {
            random: Arc::new(OsRandom),
            digest: Arc::new(Sha256Digest),
            store,
            fetcher: Arc::new(ReqwestFetcher::new()?),
            frames: Arc::new(HttpFrameHost::new(redirect_uri)?),
            page: Arc::new(SystemBrowser::new()),
        })
    }
}

impl std::fmt::Debug for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Platform").finish_non_exhaustive()
    }
}
