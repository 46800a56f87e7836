/*!
Command handlers for the CLI

This module provides command handlers invoked by the CLI entrypoint:

- `login`    - Sign in silently, or start a browser sign-in
- `callback` - Complete a browser sign-in from the redirect URL
- `decode`   - Print the claims carried by a token

A browser sign-in spans two processes, so the correlation entries live in
a SQLite store that both invocations open.
*/

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::auth::{DecodedToken, PassportClient};
use crate::config::ClientOptions;
use crate::error::Result;
use crate::platform::{KeyValueStore, Platform, SqliteStore};

/// What a successful sign-in reports on stdout
#[derive(Debug, Clone, Serialize)]
pub struct TokenSummary {
    /// Bearer token to send to the API
    pub access_token: String,
    /// `sub` claim
    pub user_id: Option<String>,
    /// Granted scopes
    pub scopes: Vec<String>,
    /// Leeway-adjusted expiration
    pub expires_at: Option<DateTime<Utc>>,
}

impl TokenSummary {
    fn from_client(client: &PassportClient, access_token: String) -> Self {
        Self {
            access_token,
            user_id: client.get_signed_in_user_id(),
            scopes: client.get_token_scopes().unwrap_or_default(),
            expires_at: client.get_token_expiration(),
        }
    }
}

/// Open the correlation store at `path`, or the default location
///
/// # Errors
///
/// Returns error if the database cannot be created or opened
pub fn open_store(path: Option<&str>) -> Result<Arc<dyn KeyValueStore>> {
    let store = match path {
        Some(path) => SqliteStore::new_with_path(path)?,
        None => SqliteStore::new()?,
    };
    tracing::debug!("Using correlation store at {}", store.path().display());
    Ok(Arc::new(store))
}

fn native_client(options: ClientOptions, store: Arc<dyn KeyValueStore>) -> Result<PassportClient> {
    let platform = Platform::native(&options, store)?;
    PassportClient::new(options, platform)
}

/// Login command
pub mod login {
    use super::*;

    /// Sign in, falling back to the browser when no silent sign-in is possible
    ///
    /// # Arguments
    ///
    /// * `options` - Client options (consumed)
    /// * `store` - Correlation store shared with `callback`
    /// * `scope` - Scope override
    /// * `no_open` - Only persist the request and print its URL
    pub async fn run_login(
        options: ClientOptions,
        store: Arc<dyn KeyValueStore>,
        scope: Option<String>,
        no_open: bool,
    ) -> Result<()> {
        let client = native_client(options, store)?;

        if no_open {
            let url = client.prepare_redirect(scope.as_deref()).await?;
            println!("{}", url);
            return Ok(());
        }

        if client.sign_in(scope.as_deref()).await {
            let token = client.cached_token().unwrap_or_default();
            let summary = TokenSummary::from_client(&client, token);
            println!("{}", serde_json::to_string_pretty(&summary)?);
        } else {
            println!("Finish signing in in your browser, then run:");
            println!("  passport-spa callback '<redirect URL>'");
        }
        Ok(())
    }
}

/// Callback command
pub mod callback {
    use super::*;
    use crate::error::PassportError;
    use crate::platform::SystemBrowser;
    use url::Url;

    /// Exchange the code in `redirect_url` for a token
    ///
    /// # Errors
    ///
    /// Returns [`PassportError::NoQueryParameters`] when the URL has no
    /// query, and a [`PassportError::Config`] error when the sign-in did not
    /// produce a token
    pub async fn complete(
        options: ClientOptions,
        store: Arc<dyn KeyValueStore>,
        redirect_url: &str,
    ) -> Result<TokenSummary> {
        let location = Url::parse(redirect_url)?;
        let mut platform = Platform::native(&options, store)?;
        platform.page = Arc::new(SystemBrowser::with_location(location));
        let client = PassportClient::new(options, platform)?;

        if !client.handle_redirect_callback().await? {
            return Err(PassportError::Config(
                "sign-in did not complete; run `login` again".to_string(),
            )
            .into());
        }

        let token = client.cached_token().unwrap_or_default();
        Ok(TokenSummary::from_client(&client, token))
    }

    /// Complete the sign-in and print the token summary as JSON
    pub async fn run_callback(
        options: ClientOptions,
        store: Arc<dyn KeyValueStore>,
        redirect_url: &str,
    ) -> Result<()> {
        let summary = complete(options, store, redirect_url).await?;
        println!("{}", serde_json::to_string_pretty(&summary)?);
        Ok(())
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use crate::platform::MemoryStore;

        fn options() -> ClientOptions {
            ClientOptions::new("auth.example.com", "client-1", "https://app.example.com/cb")
        }

        #[tokio::test]
        async fn test_complete_without_query_fails() {
            let err = complete(
                options(),
                Arc::new(MemoryStore::new()),
                "https://app.example.com/cb",
            )
            .await
            .unwrap_err();
            assert!(matches!(
                err.downcast_ref::<PassportError>(),
                Some(PassportError::NoQueryParameters)
            ));
        }

        #[tokio::test]
        async fn test_complete_with_unknown_state_fails() {
            let res = complete(
                options(),
                Arc::new(MemoryStore::new()),
                "https://app.example.com/cb?code=abc&state=unknown",
            )
            .await;
            assert!(res.is_err());
        }
    }
}

/// Decode command
pub mod decode {
    use super::*;
    use crate::config::DEFAULT_LEEWAY;

    /// Decode `token` and render its claims as pretty JSON
    ///
    /// # Errors
    ///
    /// Returns error if the token is malformed
    pub fn render(token: &str, leeway: Option<i64>) -> Result<String> {
        let decoded = DecodedToken::parse(token, leeway.unwrap_or(DEFAULT_LEEWAY))?;
        let mut value = serde_json::to_value(&decoded)?;
        if let Some(object) = value.as_object_mut() {
            object.insert("expired".to_string(), decoded.is_expired().into());
            object.insert("scope".to_string(), decoded.scopes_as_string().into());
        }
        Ok(serde_json::to_string_pretty(&value)?)
    }

    /// Print the decoded claims of `token`
    pub fn run_decode(token: &str, leeway: Option<i64>) -> Result<()> {
        println!("{}", render(token, leeway)?);
        Ok(())
    }

}
