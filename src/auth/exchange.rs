//! Authorization code exchange at the token endpoint

use std::sync::Arc;

use serde_json::json;

use crate::auth::authorization::AuthorizationSignature;
use crate::auth::token::DecodedToken;
use crate::error::{PassportError, Result};
use crate::platform::JsonFetcher;
use crate::util::endpoint_url;

/// Trades an [`AuthorizationSignature`] for a [`DecodedToken`]
pub struct TokenExchange {
    fetcher: Arc<dyn JsonFetcher>,
    leeway: i64,
}

impl TokenExchange {
    /// Create an exchange that decodes tokens with `leeway` seconds
    pub fn new(fetcher: Arc<dyn JsonFetcher>, leeway: i64) -> Self {
        Self { fetcher, leeway }
    }

    /// POST the `authorization_code` grant and decode the returned token
    ///
    /// # Errors
    ///
    /// - [`PassportError::Transport`] from the fetcher, unchanged
    /// - [`PassportError::InvalidTokenResponse`] when `access_token` is
    ///   missing, empty, or not a string
    /// - [`PassportError::MalformedToken`] when the token cannot be decoded
    pub async fn exchange(
        &self,
        domain: &str,
        oauth_prefix: &str,
        client_id: &str,
        redirect_uri: &str,
        signature: &AuthorizationSignature,
    ) -> Result<DecodedToken> {
        let url = endpoint_url(domain, oauth_prefix, "token");
        let body = json!({
            "grant_type": "authorization_code",
            "client_id": client_id,
            "redirect_uri": redirect_uri,
            "code": signature.code,
            "code_verifier": signature.code_verifier,
        });

        tracing::debug!("Exchanging authorization code at {}", url);
        let response = self.fetcher.post_json(&url, &body).await?;

        let access_token = response
            .get("access_token")
            .and_then(|v| v.as_str())
            .filter(|t| !t.is_empty())
            .ok_or(PassportError::InvalidTokenResponse)?;

        DecodedToken::parse(access_token, self.leeway)
    }
}

impl std::fmt::Debug for TokenExchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenExchange")
            .field("leeway", &self.leeway)
            .finish_non_exhaustive()
    }
}
