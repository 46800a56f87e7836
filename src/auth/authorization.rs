//! Authorization responses from the authorize endpoint

use crate::auth::correlation::CorrelationStore;
use crate::error::{PassportError, Result};
use crate::util::{parse_query, short_state};

/// Code and verifier pair presented at the token endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationSignature {
    /// Authorization code returned by the server
    pub code: String,
    /// Verifier stored when the request was built
    pub code_verifier: String,
}

/// A `code` and `state` received on the redirect URI
///
/// Resolving the `state` against the correlation store consumes the stored
/// entry, so the result is cached: asking for the signature again returns
/// the same value without touching the store.
#[derive(Debug, Clone)]
pub struct Authorization {
    code: String,
    state: String,
    resolved: Option<(AuthorizationSignature, String)>,
}

impl Authorization {
    /// Create from an already extracted code and state
    pub fn new(code: impl Into<String>, state: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            state: state.into(),
            resolved: None,
        }
    }

    /// Parse a callback query string (leading `?` optional)
    ///
    /// # Errors
    ///
    /// - [`PassportError::NoQueryParameters`] when the query holds nothing
    /// - [`PassportError::AuthorizationDenied`] when the server sent `error`
    /// - [`PassportError::MissingParameter`] when `code` or `state` is absent
    ///
    /// # Examples
    ///
    /// ```
    /// use passport_spa::auth::authorization::Authorization;
    ///
    /// let auth = Authorization::from_query("?code=abc&state=xyz").unwrap();
    /// assert_eq!(auth.code(), "abc");
    /// assert_eq!(auth.state(), "xyz");
    ///
    /// assert!(Authorization::from_query("?error=login_required").is_err());
    /// ```
    pub fn from_query(query: &str) -> Result<Self> {
        let mut params = parse_query(query);
        if params.is_empty() {
            return Err(PassportError::NoQueryParameters.into());
        }

        if let Some(error) = params.remove("error") {
            return Err(PassportError::AuthorizationDenied {
                error,
                description: params.remove("error_description").unwrap_or_default(),
            }
            .into());
        }

        let code = params
            .remove("code")
            .filter(|c| !c.is_empty())
            .ok_or(PassportError::MissingParameter("code"))?;
        let state = params
            .remove("state")
            .filter(|s| !s.is_empty())
            .ok_or(PassportError::MissingParameter("state"))?;

        Ok(Self::new(code, state))
    }

    /// Authorization code
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Correlation state
    pub fn state(&self) -> &str {
        &self.state
    }

    /// Resolve the stored verifier for this response's `state`
    ///
    /// # Errors
    ///
    /// Returns [`PassportError::InvalidState`] on the first call when no
    /// entry is stored; a successful resolution is never repeated.
    pub fn signature(&mut self, store: &CorrelationStore) -> Result<AuthorizationSignature> {
        if let Some((signature, _)) = &self.resolved {
            return Ok(signature.clone());
        }

        let entry = store.take(&self.state)?;
        tracing::debug!("Resolved authorization for state {}", short_state(&self.state));

        let signature = AuthorizationSignature {
            code: self.code.clone(),
            code_verifier: entry.code_verifier,
        };
        self.resolved = Some((signature.clone(), entry.scope));
        Ok(signature)
    }

    /// Scope stored with the request, once resolved
    pub fn scope(&self) -> Option<&str> {
        self.resolved.as_ref().map(|(_, scope)| scope.as_str())
    }
}
