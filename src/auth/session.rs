//! The client session
//!
//! [`PassportClient`] owns the cached token and drives sign-in attempts.
//! An attempt first tries to obtain a code silently in a background frame
//! and falls back to a full-page redirect when that fails. Concurrent
//! `sign_in` calls share the attempt already in flight instead of starting
//! their own.
//!
//! Each attempt moves through the same states:
//!
//! ```text
//! Idle -> ParametersBuilt -> StatePersisted -> AwaitingResponse
//!      -> TokenExchanged -> Validated -> Cached
//!                                     \-> Failed (signs out) -> Idle
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use url::Url;

use crate::auth::authorization::Authorization;
use crate::auth::correlation::CorrelationStore;
use crate::auth::exchange::TokenExchange;
use crate::auth::redirect::RedirectTransport;
use crate::auth::request::AuthorizationRequest;
use crate::auth::silent::SilentTransport;
use crate::auth::token::DecodedToken;
use crate::config::ClientOptions;
use crate::error::{kind, PassportError, Result};
use crate::platform::Platform;
use crate::util::short_state;

type SharedAttempt = Shared<BoxFuture<'static, bool>>;

// ---------------------------------------------------------------------------
// PassportClient
// ---------------------------------------------------------------------------

/// OAuth 2.0 authorization code + PKCE client for a Passport server
///
/// Cloning is cheap; clones share the token and the in-flight attempt.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use passport_spa::auth::session::PassportClient;
/// use passport_spa::config::ClientOptions;
/// use passport_spa::platform::fake::{
///     unsigned_token, CountingDigest, FakeFetcher, FakeFrameHost, FakePage, SeededRandom,
/// };
/// use passport_spa::platform::{MemoryStore, Platform};
///
/// # tokio_test::block_on(async {
/// let token = unsigned_token(&serde_json::json!({ "exp": 4_000_000_000_i64, "sub": "1" }));
/// let platform = Platform {
///     random: Arc::new(SeededRandom::new(1)),
///     digest: Arc::new(CountingDigest::new()),
///     store: Arc::new(MemoryStore::new()),
///     fetcher: Arc::new(FakeFetcher::token(token)),
///     frames: Arc::new(FakeFrameHost::echo_state("code")),
///     page: Arc::new(FakePage::new()),
/// };
/// let options = ClientOptions::new("auth.example.com", "1", "https://app.example.com/cb");
/// let client = PassportClient::new(options, platform).unwrap();
///
/// assert!(client.sign_in(None).await);
/// assert_eq!(client.get_signed_in_user_id().as_deref(), Some("1"));
/// # });
/// ```
#[derive(Clone)]
pub struct PassportClient {
    inner: Arc<Inner>,
}

struct Inner {
    options: ClientOptions,
    platform: Platform,
    correlation: CorrelationStore,
    exchange: TokenExchange,
    silent: SilentTransport,
    redirect: RedirectTransport,
    token: RwLock<Option<DecodedToken>>,
    in_flight: Mutex<Option<(u64, SharedAttempt)>>,
    next_attempt: AtomicU64,
}

impl PassportClient {
    /// Create a client from validated options and platform capabilities
    ///
    /// # Errors
    ///
    /// Returns [`PassportError::Config`] if the options are invalid
    pub fn new(options: ClientOptions, platform: Platform) -> Result<Self> {
        options.validate()?;

        let correlation =
            CorrelationStore::new(Arc::clone(&platform.store), options.storage_prefix.clone());
        let exchange = TokenExchange::new(Arc::clone(&platform.fetcher), options.leeway);
        let silent = SilentTransport::new(Arc::clone(&platform.frames));
        let redirect = RedirectTransport::new(Arc::clone(&platform.page));

        Ok(Self {
            inner: Arc::new(Inner {
                options,
                platform,
                correlation,
                exchange,
                silent,
                redirect,
                token: RwLock::new(None),
                in_flight: Mutex::new(None),
                next_attempt: AtomicU64::new(1),
            }),
        })
    }

    /// Options this client was built with
    pub fn options(&self) -> &ClientOptions {
        &self.inner.options
    }

    // -----------------------------------------------------------------------
    // Token queries
    // -----------------------------------------------------------------------

    /// The cached token, signing in first when auto refresh is on and the
    /// cached token is missing or expired
    ///
    /// A refresh asks for the scopes of the expiring token, or the default
    /// scope when there is none.
    pub async fn get_token(&self) -> Option<String> {
        if self.inner.options.is_auto_refresh && !self.is_token_valid() {
            let scope = self.inner.current_token().map(|t| t.scopes_as_string());
            tracing::debug!("Cached token missing or expired, refreshing");
            self.sign_in(scope.as_deref()).await;
        }
        self.inner.current_token().map(|t| t.raw().to_string())
    }

    /// The cached token as issued, without refreshing
    pub fn cached_token(&self) -> Option<String> {
        self.inner.current_token().map(|t| t.raw().to_string())
    }

    /// Scopes of the cached token
    pub fn get_token_scopes(&self) -> Option<Vec<String>> {
        self.inner.current_token().map(|t| t.scopes().to_vec())
    }

    /// Leeway-adjusted expiration of the cached token
    pub fn get_token_expiration(&self) -> Option<DateTime<Utc>> {
        self.inner.current_token().map(|t| t.expiration())
    }

    /// Whether a token is cached and not expired
    pub fn is_token_valid(&self) -> bool {
        self.inner
            .current_token()
            .map(|t| !t.is_expired())
            .unwrap_or(false)
    }

    /// Subject of the cached token, only while it is valid
    pub fn get_signed_in_user_id(&self) -> Option<String> {
        self.inner
            .current_token()
            .filter(|t| !t.is_expired())
            .and_then(|t| t.user_id().map(str::to_string))
    }

    // -----------------------------------------------------------------------
    // Sign-in
    // -----------------------------------------------------------------------

    /// Sign in silently, falling back to a redirect
    ///
    /// Returns `true` when a token was obtained without leaving the page.
    /// `false` means the silent attempt failed; the page has then been sent
    /// to the authorize endpoint and the outcome arrives through
    /// [`handle_redirect_callback`](Self::handle_redirect_callback).
    ///
    /// While an attempt is in flight, further calls wait for it and receive
    /// its result; their `scope` argument is ignored.
    ///
    /// The attempt runs on a spawned task, so it must be called from within
    /// a tokio runtime. Dropping the returned future does not cancel the
    /// attempt: it still tears down its frame and falls back to a redirect.
    pub async fn sign_in(&self, scope: Option<&str>) -> bool {
        let attempt = {
            let mut slot = self
                .inner
                .in_flight
                .lock()
                .unwrap_or_else(|e| e.into_inner());

            match slot.as_ref() {
                Some((id, attempt)) => {
                    tracing::debug!("Joining sign-in attempt {}", id);
                    attempt.clone()
                }
                None => {
                    let id = self.inner.next_attempt.fetch_add(1, Ordering::SeqCst);
                    let scope = scope.unwrap_or(&self.inner.options.scope).to_string();
                    let inner = Arc::clone(&self.inner);

                    // The attempt runs on its own task so it settles even
                    // when every caller stops waiting.
                    let task_inner = Arc::clone(&inner);
                    let task = tokio::spawn(async move {
                        let signed_in = task_inner.sign_in_attempt(id, &scope).await;
                        task_inner.finish_attempt(id);
                        signed_in
                    });

                    let attempt = async move {
                        match task.await {
                            Ok(signed_in) => signed_in,
                            Err(e) => {
                                tracing::error!("Attempt {} did not complete: {}", id, e);
                                inner.finish_attempt(id);
                                false
                            }
                        }
                    }
                    .boxed()
                    .shared();

                    *slot = Some((id, attempt.clone()));
                    attempt
                }
            }
        };

        attempt.await
    }

    /// Send the page to the authorize endpoint
    ///
    /// # Errors
    ///
    /// Returns error if the request cannot be persisted or built, or the
    /// page refuses the navigation
    pub async fn sign_in_with_redirect(&self, scope: Option<&str>) -> Result<()> {
        let url = self.prepare_redirect(scope).await?;
        self.inner.redirect.run(url.as_str())
    }

    /// Persist a new request and return its authorize URL without navigating
    ///
    /// Useful when something other than the page opens the URL.
    ///
    /// # Errors
    ///
    /// Returns error if the request cannot be persisted or built
    pub async fn prepare_redirect(&self, scope: Option<&str>) -> Result<Url> {
        let mut request = self.inner.new_request(scope.unwrap_or(&self.inner.options.scope));
        self.inner.prepare(0, &mut request).await
    }

    /// Authorize URL for `request` on this client's server
    ///
    /// # Errors
    ///
    /// Returns error if the domain is not a valid host or the challenge
    /// cannot be computed
    pub async fn authorize_url(&self, request: &mut AuthorizationRequest) -> Result<Url> {
        request
            .authorize_url(
                &self.inner.options.domain,
                &self.inner.options.oauth_prefix,
                self.inner.platform.digest.as_ref(),
            )
            .await
    }

    /// Complete a redirect sign-in from the page's query string
    ///
    /// Returns `Ok(false)` without doing anything when running inside a
    /// background frame. Otherwise returns whether a token was obtained;
    /// every failure past parsing signs the client out and yields
    /// `Ok(false)`.
    ///
    /// # Errors
    ///
    /// Returns [`PassportError::NoQueryParameters`] when the page has no
    /// query string
    pub async fn handle_redirect_callback(&self) -> Result<bool> {
        let page = &self.inner.platform.page;
        if !page.is_top_level() {
            tracing::debug!("Not the top-level page, ignoring redirect callback");
            return Ok(false);
        }

        let search = page.search();
        let query = search.strip_prefix('?').unwrap_or(&search);
        if query.is_empty() {
            return Err(PassportError::NoQueryParameters.into());
        }

        Ok(self.inner.convert_to_token(query).await)
    }

    /// Forget the cached token
    pub fn sign_out(&self) {
        self.inner.sign_out();
    }
}

impl std::fmt::Debug for PassportClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PassportClient")
            .field("domain", &self.inner.options.domain)
            .field("client_id", &self.inner.options.client_id)
            .field("signed_in", &self.is_token_valid())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Attempt state machine
// ---------------------------------------------------------------------------

impl Inner {
    fn current_token(&self) -> Option<DecodedToken> {
        self.token
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn store_token(&self, token: DecodedToken) {
        *self.token.write().unwrap_or_else(|e| e.into_inner()) = Some(token);
    }

    fn sign_out(&self) {
        *self.token.write().unwrap_or_else(|e| e.into_inner()) = None;
    }

    fn finish_attempt(&self, id: u64) {
        let mut slot = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        if matches!(slot.as_ref(), Some((current, _)) if *current == id) {
            *slot = None;
        }
    }

    fn new_request(&self, scope: &str) -> AuthorizationRequest {
        AuthorizationRequest::new(
            self.options.client_id.clone(),
            self.options.redirect_uri.clone(),
            scope,
            self.platform.random.as_ref(),
        )
    }

    /// Persist the request's entry, then build its URL
    async fn prepare(&self, id: u64, request: &mut AuthorizationRequest) -> Result<Url> {
        let state = short_state(request.state()).to_string();
        tracing::debug!("Attempt {} [{}]: parameters built", id, state);

        request.store_state(&self.correlation)?;
        tracing::debug!("Attempt {} [{}]: state persisted", id, state);

        request
            .authorize_url(
                &self.options.domain,
                &self.options.oauth_prefix,
                self.platform.digest.as_ref(),
            )
            .await
    }

    async fn sign_in_attempt(&self, id: u64, scope: &str) -> bool {
        if self.sign_in_silently(id, scope).await {
            return true;
        }

        tracing::warn!("Attempt {}: silent sign-in failed, falling back to redirect", id);
        let mut request = self.new_request(scope);
        let redirected = match self.prepare(id, &mut request).await {
            Ok(url) => self.redirect.run(url.as_str()),
            Err(e) => Err(e),
        };
        if let Err(e) = redirected {
            tracing::warn!("Attempt {}: redirect sign-in could not start: {}", id, e);
            let _ = request.clear_state(&self.correlation);
        }
        false
    }

    async fn sign_in_silently(&self, id: u64, scope: &str) -> bool {
        let mut request = self.new_request(scope);
        let state = short_state(request.state()).to_string();

        let url = match self.prepare(id, &mut request).await {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!("Attempt {} [{}]: could not build request: {}", id, state, e);
                let _ = request.clear_state(&self.correlation);
                self.sign_out();
                return false;
            }
        };

        tracing::debug!("Attempt {} [{}]: awaiting silent response", id, state);
        let query = match self
            .silent
            .run(url.as_str(), self.options.authorize_timeout())
            .await
        {
            Ok(query) => query,
            Err(e) => {
                tracing::debug!("Attempt {} [{}]: silent response failed: {}", id, state, e);
                let _ = request.clear_state(&self.correlation);
                self.sign_out();
                return false;
            }
        };

        let signed_in = self.convert_to_token(&query).await;
        if !signed_in {
            // The response may not have reached our entry; drop it if it is still there.
            let _ = request.clear_state(&self.correlation);
        }
        signed_in
    }

    /// Resolve a response query into a cached token; sign out on failure
    async fn convert_to_token(&self, query: &str) -> bool {
        match self.sign_in_with_query(query).await {
            Ok(token) => {
                tracing::info!(
                    "Signed in{}",
                    token
                        .user_id()
                        .map(|u| format!(" as user {}", u))
                        .unwrap_or_default()
                );
                self.store_token(token);
                true
            }
            Err(e) => {
                match kind(&e) {
                    // Routine for a silent attempt without a server session.
                    Some(PassportError::AuthorizationDenied { error, .. }) => {
                        tracing::info!("Authorization server declined sign-in: {}", error)
                    }
                    _ => tracing::warn!("Sign-in failed: {}", e),
                }
                self.sign_out();
                false
            }
        }
    }

    async fn sign_in_with_query(&self, query: &str) -> Result<DecodedToken> {
        let mut authorization = Authorization::from_query(query)?;
        let state = short_state(authorization.state()).to_string();

        let signature = authorization.signature(&self.correlation)?;
        let token = self
            .exchange
            .exchange(
                &self.options.domain,
                &self.options.oauth_prefix,
                &self.options.client_id,
                &self.options.redirect_uri,
                &signature,
            )
            .await?;
        tracing::debug!("[{}]: token exchanged", state);

        let requested = authorization.scope().unwrap_or_default();
        let granted = token.scopes_as_string();
        if requested != granted {
            return Err(PassportError::ScopeMismatch {
                requested: requested.to_string(),
                granted,
            }
            .into());
        }
        tracing::debug!("[{}]: token validated", state);

        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::fake::{
        unsigned_token, CountingDigest, FakeFetcher, FakeFrameHost, FakePage, SeededRandom,
    };
    use crate::platform::{KeyValueStore, MemoryStore};
    use serde_json::json;

    fn valid_token(scopes: &[&str]) -> String {
        unsigned_token(&json!({ "exp": 4_000_000_000_i64, "sub": 9, "scopes": scopes }))
    }

    fn client_with(
        frames: FakeFrameHost,
        fetcher: FakeFetcher,
        page: Arc<FakePage>,
    ) -> (PassportClient, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let platform = Platform {
            random: Arc::new(SeededRandom::new(42)),
            digest: Arc::new(CountingDigest::new()),
            store: store.clone(),
            fetcher: Arc::new(fetcher),
            frames: Arc::new(frames),
            page,
        };
        let options =
            ClientOptions::new("auth.example.com", "client-1", "https://app.example.com/cb");
        (PassportClient::new(options, platform).unwrap(), store)
    }

    #[test]
    fn test_new_rejects_invalid_options() {
        let platform = Platform {
            random: Arc::new(SeededRandom::new(1)),
            digest: Arc::new(CountingDigest::new()),
            store: Arc::new(MemoryStore::new()),
            fetcher: Arc::new(FakeFetcher::failing("x", "y")),
            frames: Arc::new(FakeFrameHost::hanging()),
            page: Arc::new(FakePage::new()),
        };
        let options = ClientOptions::new("", "client-1", "https://app.example.com/cb");
        assert!(PassportClient::new(options, platform).is_err());
    }

    #[tokio::test]
    async fn test_silent_sign_in_caches_token() {
        let page = Arc::new(FakePage::new());
        let (client, store) = client_with(
            FakeFrameHost::echo_state("c1"),
            FakeFetcher::token(valid_token(&[])),
            page.clone(),
        );

        assert!(client.sign_in(None).await);
        assert!(client.is_token_valid());
        assert_eq!(client.get_signed_in_user_id().as_deref(), Some("9"));
        assert_eq!(client.get_token_scopes(), Some(vec![]));
        assert!(page.assigned().is_empty());
        assert!(store.is_empty(), "correlation entry must be consumed");
    }

    #[tokio::test]
    async fn test_scope_mismatch_signs_out_and_redirects() {
        let page = Arc::new(FakePage::new());
        let (client, _) = client_with(
            FakeFrameHost::echo_state("c1"),
            FakeFetcher::token(valid_token(&["read"])),
            page.clone(),
        );

        assert!(!client.sign_in(Some("write")).await);
        assert!(!client.is_token_valid());
        assert_eq!(page.assigned().len(), 1);
        assert!(page.assigned()[0].contains("scope=write"));
    }

    #[tokio::test]
    async fn test_sign_in_with_redirect_persists_state_first() {
        let page = Arc::new(FakePage::new());
        let (client, store) = client_with(
            FakeFrameHost::hanging(),
            FakeFetcher::failing("x", "y"),
            page.clone(),
        );

        client.sign_in_with_redirect(Some("read")).await.unwrap();

        let assigned = page.assigned();
        assert_eq!(assigned.len(), 1);
        let url = Url::parse(&assigned[0]).unwrap();
        let state = url
            .query_pairs()
            .find(|(k, _)| k == "state")
            .map(|(_, v)| v.into_owned())
            .unwrap();
        let entry = store.get(&format!("lpjs.{}", state)).unwrap().unwrap();
        assert!(entry.contains(r#""s":"read""#));
    }

    #[tokio::test]
    async fn test_handle_redirect_callback_ignored_in_frame() {
        let page = Arc::new(FakePage::with_search("?code=a&state=b"));
        page.set_top_level(false);
        let (client, _) = client_with(
            FakeFrameHost::hanging(),
            FakeFetcher::token(valid_token(&[])),
            page,
        );

        assert!(!client.handle_redirect_callback().await.unwrap());
    }

    #[tokio::test]
    async fn test_get_token_without_auto_refresh_returns_cache_only() {
        let store = Arc::new(MemoryStore::new());
        let frames = Arc::new(FakeFrameHost::echo_state("c1"));
        let platform = Platform {
            random: Arc::new(SeededRandom::new(3)),
            digest: Arc::new(CountingDigest::new()),
            store,
            fetcher: Arc::new(FakeFetcher::token(valid_token(&[]))),
            frames: frames.clone(),
            page: Arc::new(FakePage::new()),
        };
        let mut options =
            ClientOptions::new("auth.example.com", "client-1", "https://app.example.com/cb");
        options.is_auto_refresh = false;
        let client = PassportClient::new(options, platform).unwrap();

        assert_eq!(client.get_token().await, None);
        assert_eq!(frames.attach_count(), 0);
    }

    #[tokio::test]
    async fn test_sign_out_is_idempotent() {
        let (client, _) = client_with(
            FakeFrameHost::echo_state("c1"),
            FakeFetcher::token(valid_token(&[])),
            Arc::new(FakePage::new()),
        );
        assert!(client.sign_in(None).await);

        client.sign_out();
        client.sign_out();
        assert!(!client.is_token_valid());
        assert_eq!(client.get_token_expiration(), None);
    }
}
