//! Deterministic platform substitutes for tests
//!
//! Every capability in [`crate::platform`] has a fake here that is scripted
//! up front and records how it was used, so tests can assert on call
//! counts, requested URLs, and navigation without touching the network, a
//! browser, or the OS random generator.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use passport_spa::platform::fake::{
//!     CountingDigest, FakeFetcher, FakeFrameHost, FakePage, SeededRandom,
//! };
//! use passport_spa::platform::{MemoryStore, Platform};
//!
//! let frames = Arc::new(FakeFrameHost::echo_state("auth-code"));
//! let platform = Platform {
//!     random: Arc::new(SeededRandom::new(7)),
//!     digest: Arc::new(CountingDigest::new()),
//!     store: Arc::new(MemoryStore::new()),
//!     fetcher: Arc::new(FakeFetcher::failing("server_error", "down")),
//!     frames: frames.clone(),
//!     page: Arc::new(FakePage::new()),
//! };
//! assert_eq!(frames.attach_count(), 0);
//! # let _ = platform;
//! ```

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use base64::Engine as _;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use serde_json::Value;
use url::Url;

use crate::error::{PassportError, Result};
use crate::platform::{
    DigestSource, Frame, FrameEvent, FrameHost, JsonFetcher, Page, RandomSource, Sha256Digest,
};

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

// ---------------------------------------------------------------------------
// Random and digest
// ---------------------------------------------------------------------------

/// Seeded, reproducible [`RandomSource`]
#[derive(Debug)]
pub struct SeededRandom {
    rng: Mutex<StdRng>,
}

impl SeededRandom {
    /// Create a generator from `seed`
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl RandomSource for SeededRandom {
    fn fill_bytes(&self, dest: &mut [u8]) {
        lock(&self.rng).fill_bytes(dest);
    }
}

/// Real SHA-256 that counts how often it is invoked
#[derive(Debug, Default)]
pub struct CountingDigest {
    calls: AtomicUsize,
}

impl CountingDigest {
    /// Create a digest with a zero call count
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of digests computed so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl DigestSource for CountingDigest {
    async fn sha256(&self, data: &[u8]) -> Result<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        // Suspend like an external digest primitive would.
        tokio::task::yield_now().await;
        Sha256Digest.sha256(data).await
    }
}

// ---------------------------------------------------------------------------
// Fetcher
// ---------------------------------------------------------------------------

type FetchResponder = Box<dyn Fn(&str, &Value) -> Result<Value> + Send + Sync>;

/// Scripted [`JsonFetcher`] that records every request
pub struct FakeFetcher {
    responder: FetchResponder,
    requests: Mutex<Vec<(String, Value)>>,
}

impl FakeFetcher {
    /// Answer every request through `responder`
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&str, &Value) -> Result<Value> + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Answer every request with `{"access_token": token}`
    pub fn token(token: impl Into<String>) -> Self {
        let token = token.into();
        Self::new(move |_, _| Ok(serde_json::json!({ "access_token": token })))
    }

    /// Fail every request with a transport error
    pub fn failing(error: &str, description: &str) -> Self {
        let error = error.to_string();
        let description = description.to_string();
        Self::new(move |_, _| {
            Err(PassportError::Transport {
                error: error.clone(),
                description: description.clone(),
            }
            .into())
        })
    }

    /// Requests received so far as `(url, body)` pairs
    pub fn requests(&self) -> Vec<(String, Value)> {
        lock(&self.requests).clone()
    }
}

#[async_trait::async_trait]
impl JsonFetcher for FakeFetcher {
    async fn post_json(&self, url: &str, body: &Value) -> Result<Value> {
        lock(&self.requests).push((url.to_string(), body.clone()));
        (self.responder)(url, body)
    }
}

// ---------------------------------------------------------------------------
// Frames
// ---------------------------------------------------------------------------

/// What a fake frame does once attached
#[derive(Debug, Clone)]
pub enum FrameBehavior {
    /// Emit `events` (after the host's delay) and expose `query`
    Load {
        /// Signals delivered in order
        events: Vec<FrameEvent>,
        /// Value returned by [`Frame::query`]
        query: Option<String>,
    },
    /// Never emit anything
    Hang,
}

impl FrameBehavior {
    /// A single `Load` event exposing `query`
    pub fn loaded(query: impl Into<String>) -> Self {
        Self::Load {
            events: vec![FrameEvent::Load],
            query: Some(query.into()),
        }
    }
}

type FrameResponder = Box<dyn Fn(&Url) -> FrameBehavior + Send + Sync>;

/// Scripted [`FrameHost`] that counts attaches, detaches, and reads
pub struct FakeFrameHost {
    responder: FrameResponder,
    delay: Duration,
    detach_fails: bool,
    attaches: AtomicUsize,
    detaches: Arc<AtomicUsize>,
    delivered: Arc<AtomicUsize>,
    query_reads: Arc<AtomicUsize>,
    urls: Mutex<Vec<String>>,
}

impl FakeFrameHost {
    /// Decide each frame's behavior from its URL
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&Url) -> FrameBehavior + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            delay: Duration::ZERO,
            detach_fails: false,
            attaches: AtomicUsize::new(0),
            detaches: Arc::new(AtomicUsize::new(0)),
            delivered: Arc::new(AtomicUsize::new(0)),
            query_reads: Arc::new(AtomicUsize::new(0)),
            urls: Mutex::new(Vec::new()),
        }
    }

    /// Behave like an authorization server with an active session:
    /// load with `?code={code}&state={state from the URL}`
    pub fn echo_state(code: &str) -> Self {
        let code = code.to_string();
        Self::new(move |url| {
            let state = url
                .query_pairs()
                .find(|(k, _)| k == "state")
                .map(|(_, v)| v.into_owned())
                .unwrap_or_default();
            let query = url::form_urlencoded::Serializer::new(String::new())
                .append_pair("code", &code)
                .append_pair("state", &state)
                .finish();
            FrameBehavior::loaded(format!("?{}", query))
        })
    }

    /// Frames that never load
    pub fn hanging() -> Self {
        Self::new(|_| FrameBehavior::Hang)
    }

    /// Wait `delay` before delivering the first event
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Make every detach fail, as if the frame had been removed elsewhere
    pub fn with_failing_detach(mut self) -> Self {
        self.detach_fails = true;
        self
    }

    /// Number of frames attached
    pub fn attach_count(&self) -> usize {
        self.attaches.load(Ordering::SeqCst)
    }

    /// Number of detach calls across all frames
    pub fn detach_count(&self) -> usize {
        self.detaches.load(Ordering::SeqCst)
    }

    /// Number of events handed out across all frames
    pub fn delivered_count(&self) -> usize {
        self.delivered.load(Ordering::SeqCst)
    }

    /// Number of times any frame's location was read
    pub fn query_read_count(&self) -> usize {
        self.query_reads.load(Ordering::SeqCst)
    }

    /// URLs frames were attached with
    pub fn urls(&self) -> Vec<String> {
        lock(&self.urls).clone()
    }
}

#[async_trait::async_trait]
impl FrameHost for FakeFrameHost {
    async fn attach(&self, url: &str) -> Result<Box<dyn Frame>> {
        let parsed = Url::parse(url)?;
        self.attaches.fetch_add(1, Ordering::SeqCst);
        lock(&self.urls).push(url.to_string());

        let (events, query, hang) = match (self.responder)(&parsed) {
            FrameBehavior::Load { events, query } => (events.into(), query, false),
            FrameBehavior::Hang => (VecDeque::new(), None, true),
        };

        Ok(Box::new(FakeFrame {
            events,
            query,
            hang,
            delay: Some(self.delay),
            detach_fails: self.detach_fails,
            detached: AtomicBool::new(false),
            detaches: Arc::clone(&self.detaches),
            delivered: Arc::clone(&self.delivered),
            query_reads: Arc::clone(&self.query_reads),
        }))
    }
}

struct FakeFrame {
    events: VecDeque<FrameEvent>,
    query: Option<String>,
    hang: bool,
    delay: Option<Duration>,
    detach_fails: bool,
    detached: AtomicBool,
    detaches: Arc<AtomicUsize>,
    delivered: Arc<AtomicUsize>,
    query_reads: Arc<AtomicUsize>,
}

#[async_trait::async_trait]
impl Frame for FakeFrame {
    async fn next_event(&mut self) -> Option<FrameEvent> {
        if self.hang {
            return std::future::pending().await;
        }
        if let Some(delay) = self.delay.take() {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
        let event = self.events.pop_front();
        if event.is_some() {
            self.delivered.fetch_add(1, Ordering::SeqCst);
        }
        event
    }

    fn query(&self) -> Option<String> {
        self.query_reads.fetch_add(1, Ordering::SeqCst);
        self.query.clone()
    }

    fn detach(&mut self) -> Result<()> {
        self.detaches.fetch_add(1, Ordering::SeqCst);
        if self.detach_fails || self.detached.swap(true, Ordering::SeqCst) {
            return Err(PassportError::Frame("frame is not attached".to_string()).into());
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Page
// ---------------------------------------------------------------------------

/// Scripted [`Page`] that records navigations
#[derive(Debug)]
pub struct FakePage {
    search: Mutex<String>,
    top_level: AtomicBool,
    assigned: Mutex<Vec<String>>,
}

impl Default for FakePage {
    fn default() -> Self {
        Self {
            search: Mutex::new(String::new()),
            top_level: AtomicBool::new(true),
            assigned: Mutex::new(Vec::new()),
        }
    }
}

impl FakePage {
    /// A top-level page with an empty query string
    pub fn new() -> Self {
        Self::default()
    }

    /// A page whose location carries `search` (with or without `?`)
    pub fn with_search(search: &str) -> Self {
        let page = Self::new();
        page.set_search(search);
        page
    }

    /// Replace the page's query string
    pub fn set_search(&self, search: &str) {
        let normalized = if search.is_empty() || search.starts_with('?') {
            search.to_string()
        } else {
            format!("?{}", search)
        };
        *lock(&self.search) = normalized;
    }

    /// Pretend to run inside a background frame
    pub fn set_top_level(&self, top_level: bool) {
        self.top_level.store(top_level, Ordering::SeqCst);
    }

    /// URLs the page was navigated to
    pub fn assigned(&self) -> Vec<String> {
        lock(&self.assigned).clone()
    }
}

impl Page for FakePage {
    fn search(&self) -> String {
        lock(&self.search).clone()
    }

    fn is_top_level(&self) -> bool {
        self.top_level.load(Ordering::SeqCst)
    }

    fn assign(&self, url: &str) -> Result<()> {
        lock(&self.assigned).push(url.to_string());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tokens
// ---------------------------------------------------------------------------

/// Encode `claims` as an unsigned three-segment token
///
/// The header and signature segments are placeholders; only the payload is
/// meaningful to [`DecodedToken`](crate::auth::token::DecodedToken).
pub fn unsigned_token(claims: &Value) -> String {
    let engine = base64::engine::general_purpose::URL_SAFE_NO_PAD;
    let header = engine.encode(br#"{"typ":"JWT","alg":"none"}"#);
    let payload = engine.encode(claims.to_string().as_bytes());
    format!("{}.{}.signature", header, payload)
}
