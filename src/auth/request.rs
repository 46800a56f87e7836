//! PKCE authorization request parameters
//!
//! An [`AuthorizationRequest`] carries everything the authorize endpoint
//! needs for one sign-in attempt. `state` and `code_verifier` are drawn
//! once, when the request is built; the S256 `code_challenge` is derived
//! from the verifier on first use and then reused.
//!
//! # References
//!
//! - RFC 7636 <https://www.rfc-editor.org/rfc/rfc7636>

use base64::Engine as _;
use url::Url;

use crate::auth::correlation::CorrelationStore;
use crate::error::Result;
use crate::platform::{DigestSource, RandomSource};
use crate::util::endpoint_url;

/// Unreserved characters allowed in a `code_verifier` (RFC 7636 section 4.1)
const VERIFIER_CHARSET: &[u8] =
    b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz-_~.";

/// Length of generated verifiers; the allowed range is 43 to 128
pub const CODE_VERIFIER_LENGTH: usize = 43;

const STATE_BYTES: usize = 32;

/// The only challenge method this client sends
pub const CODE_CHALLENGE_METHOD: &str = "S256";

/// The only response type this client requests
pub const RESPONSE_TYPE: &str = "code";

// ---------------------------------------------------------------------------
// AuthorizationRequest
// ---------------------------------------------------------------------------

/// Parameters of a single authorization attempt
///
/// # Examples
///
/// ```
/// use passport_spa::auth::request::AuthorizationRequest;
/// use passport_spa::platform::fake::{CountingDigest, SeededRandom};
///
/// # tokio_test::block_on(async {
/// let digest = CountingDigest::new();
/// let mut request =
///     AuthorizationRequest::new("client-1", "https://app.example.com/cb", "*", &SeededRandom::new(1));
///
/// let url = request
///     .authorize_url("auth.example.com", "oauth", &digest)
///     .await
///     .unwrap();
/// assert!(url.as_str().starts_with("https://auth.example.com/oauth/authorize?client_id=client-1"));
/// assert_eq!(request.code_verifier().len(), 43);
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    client_id: String,
    redirect_uri: String,
    scope: String,
    state: String,
    code_verifier: String,
    code_challenge: Option<String>,
}

impl AuthorizationRequest {
    /// Build a request, drawing `state` and `code_verifier` from `random`
    pub fn new(
        client_id: impl Into<String>,
        redirect_uri: impl Into<String>,
        scope: impl Into<String>,
        random: &dyn RandomSource,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            redirect_uri: redirect_uri.into(),
            scope: scope.into(),
            state: generate_state(random),
            code_verifier: generate_code_verifier(random),
            code_challenge: None,
        }
    }

    /// Client identifier sent to the authorize endpoint
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Redirect URI registered for the client
    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    /// Requested scope
    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// Opaque value correlating the callback with this request
    pub fn state(&self) -> &str {
        &self.state
    }

    /// PKCE secret proven at the token endpoint
    pub fn code_verifier(&self) -> &str {
        &self.code_verifier
    }

    /// `base64url(SHA-256(code_verifier))` without padding
    ///
    /// The digest is computed on the first call only.
    ///
    /// # Errors
    ///
    /// Returns error if the digest primitive fails
    pub async fn code_challenge(&mut self, digest: &dyn DigestSource) -> Result<String> {
        if let Some(challenge) = &self.code_challenge {
            return Ok(challenge.clone());
        }

        let hash = digest.sha256(self.code_verifier.as_bytes()).await?;
        let challenge = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(hash);
        self.code_challenge = Some(challenge.clone());
        Ok(challenge)
    }

    /// Authorize endpoint parameters in wire order
    ///
    /// # Errors
    ///
    /// Returns error if the code challenge cannot be computed
    pub async fn parameters(
        &mut self,
        digest: &dyn DigestSource,
    ) -> Result<Vec<(&'static str, String)>> {
        let challenge = self.code_challenge(digest).await?;
        Ok(vec![
            ("client_id", self.client_id.clone()),
            ("redirect_uri", self.redirect_uri.clone()),
            ("response_type", RESPONSE_TYPE.to_string()),
            ("scope", self.scope.clone()),
            ("state", self.state.clone()),
            ("code_challenge", challenge),
            ("code_challenge_method", CODE_CHALLENGE_METHOD.to_string()),
        ])
    }

    /// Full authorize URL: `https://{domain}/{oauth_prefix}/authorize?...`
    ///
    /// # Errors
    ///
    /// Returns error if the domain does not form a valid URL or the code
    /// challenge cannot be computed
    pub async fn authorize_url(
        &mut self,
        domain: &str,
        oauth_prefix: &str,
        digest: &dyn DigestSource,
    ) -> Result<Url> {
        let mut url = Url::parse(&endpoint_url(domain, oauth_prefix, "authorize"))?;
        let parameters = self.parameters(digest).await?;
        {
            let mut query = url.query_pairs_mut();
            for (key, value) in &parameters {
                query.append_pair(key, value);
            }
        }
        Ok(url)
    }

    /// Persist this request's correlation entry
    ///
    /// # Errors
    ///
    /// Returns error if the store rejects the write
    pub fn store_state(&self, store: &CorrelationStore) -> Result<()> {
        store.put(&self.state, &self.code_verifier, &self.scope)
    }

    /// Remove this request's correlation entry, if still present
    ///
    /// # Errors
    ///
    /// Returns error if the store rejects the delete
    pub fn clear_state(&self, store: &CorrelationStore) -> Result<()> {
        store.remove(&self.state)
    }
}

// ---------------------------------------------------------------------------
// Generators
// ---------------------------------------------------------------------------

fn generate_state(random: &dyn RandomSource) -> String {
    let mut bytes = [0u8; STATE_BYTES];
    random.fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

fn generate_code_verifier(random: &dyn RandomSource) -> String {
    let mut bytes = [0u8; CODE_VERIFIER_LENGTH];
    random.fill_bytes(&mut bytes);
    bytes
        .iter()
        .map(|b| VERIFIER_CHARSET[*b as usize % VERIFIER_CHARSET.len()] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine as _;
    use crate::platform::fake::{CountingDigest, SeededRandom};
    use sha2::{Digest, Sha256};

    fn request(seed: u64) -> AuthorizationRequest {
        AuthorizationRequest::new(
            "client-1",
            "https://app.example.com/callback",
            "*",
            &SeededRandom::new(seed),
        )
    }

    #[test]
    fn test_verifier_uses_unreserved_charset() {
        let req = request(3);
        assert_eq!(req.code_verifier().len(), CODE_VERIFIER_LENGTH);
        assert!(req
            .code_verifier()
            .bytes()
            .all(|b| VERIFIER_CHARSET.contains(&b)));
    }

    #[test]
    fn test_state_is_url_safe_and_non_empty() {
        let req = request(3);
        assert_eq!(req.state().len(), 43);
        assert!(req
            .state()
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn test_different_draws_produce_different_parameters() {
        let a = request(1);
        let b = request(2);
        assert_ne!(a.state(), b.state());
        assert_ne!(a.code_verifier(), b.code_verifier());
    }

    #[tokio::test]
    async fn test_code_challenge_is_s256_of_verifier() {
        let mut req = request(5);
        let challenge = req.code_challenge(&CountingDigest::new()).await.unwrap();

        let expected = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .encode(Sha256::digest(req.code_verifier().as_bytes()));
        assert_eq!(challenge, expected);
        assert!(!challenge.contains('='));
    }

    #[tokio::test]
    async fn test_code_challenge_digests_once() {
        let digest = CountingDigest::new();
        let mut req = request(5);

        let first = req.code_challenge(&digest).await.unwrap();
        let second = req.code_challenge(&digest).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(digest.calls(), 1);
    }

    #[tokio::test]
    async fn test_parameters_are_ordered() {
        let mut req = request(8);
        let keys: Vec<&str> = req
            .parameters(&CountingDigest::new())
            .await
            .unwrap()
            .into_iter()
            .map(|(k, _)| k)
            .collect();

        assert_eq!(
            keys,
            vec![
                "client_id",
                "redirect_uri",
                "response_type",
                "scope",
                "state",
                "code_challenge",
                "code_challenge_method"
            ]
        );
    }

    #[tokio::test]
    async fn test_authorize_url_encodes_parameters() {
        let mut req = request(8);
        let url = req
            .authorize_url("http://auth.example.com/", "oauth", &CountingDigest::new())
            .await
            .unwrap();

        assert_eq!(url.scheme(), "https");
        assert_eq!(url.path(), "/oauth/authorize");

        let pairs: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs["redirect_uri"], "https://app.example.com/callback");
        assert_eq!(pairs["response_type"], "code");
        assert_eq!(pairs["code_challenge_method"], "S256");
        assert_eq!(pairs["state"], req.state());
    }
}
