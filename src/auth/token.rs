//! Access tokens decoded from their JWT payload
//!
//! The signature is not verified: the client only reads the claims it
//! needs to schedule refreshes and answer scope and user questions. The
//! resource server remains the authority on whether a token is genuine.

use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{PassportError, Result};

// ---------------------------------------------------------------------------
// Claims
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct Claims {
    #[serde(default, deserialize_with = "string_or_number")]
    aud: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    jti: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    sub: Option<String>,
    #[serde(default)]
    iat: Option<serde_json::Number>,
    #[serde(default)]
    nbf: Option<serde_json::Number>,
    #[serde(default)]
    exp: Option<serde_json::Number>,
    #[serde(default)]
    scopes: Vec<String>,
}

/// Passport serializes some identifiers as numbers and others as strings.
fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn seconds(number: &serde_json::Number) -> Option<i64> {
    number
        .as_i64()
        .or_else(|| number.as_f64().map(|f| f.trunc() as i64))
}

fn timestamp(number: Option<&serde_json::Number>) -> Option<DateTime<Utc>> {
    number
        .and_then(seconds)
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
}

// ---------------------------------------------------------------------------
// DecodedToken
// ---------------------------------------------------------------------------

/// A bearer token together with the claims read from its payload
///
/// # Examples
///
/// ```
/// use passport_spa::auth::token::DecodedToken;
/// use passport_spa::platform::fake::unsigned_token;
///
/// let raw = unsigned_token(&serde_json::json!({
///     "aud": "1",
///     "sub": 42,
///     "exp": 1_700_000_000,
///     "scopes": ["read", "write"],
/// }));
/// let token = DecodedToken::parse(&raw, 10).unwrap();
///
/// assert_eq!(token.user_id(), Some("42"));
/// assert_eq!(token.scopes_as_string(), "read write");
/// assert_eq!(token.expiration_millis(), (1_700_000_000 - 10) * 1000);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecodedToken {
    #[serde(skip)]
    raw: String,
    client_id: Option<String>,
    token_id: Option<String>,
    issued_at: Option<DateTime<Utc>>,
    expiration: DateTime<Utc>,
    not_before: Option<DateTime<Utc>>,
    user_id: Option<String>,
    scopes: Vec<String>,
}

impl DecodedToken {
    /// Decode `raw`, moving the expiration `leeway_seconds` earlier
    ///
    /// The signature is not checked. A payload without an `exp` claim is
    /// rejected rather than treated as never expiring.
    ///
    /// # Errors
    ///
    /// Returns [`PassportError::MalformedToken`] unless `raw` has exactly
    /// three non-empty dot-separated segments whose middle one is base64url
    /// JSON carrying an `exp` claim
    pub fn parse(raw: &str, leeway_seconds: i64) -> Result<Self> {
        let segments: Vec<&str> = raw.split('.').collect();
        if segments.len() != 3 || segments.iter().any(|s| s.is_empty()) {
            return Err(PassportError::MalformedToken(
                "expected three dot-separated segments".to_string(),
            )
            .into());
        }

        let payload = decode_segment(segments[1])?;
        let claims: Claims = serde_json::from_slice(&payload)
            .map_err(|e| PassportError::MalformedToken(format!("payload is not JSON: {}", e)))?;

        let exp = claims
            .exp
            .as_ref()
            .and_then(seconds)
            .ok_or_else(|| PassportError::MalformedToken("missing exp claim".to_string()))?;
        let expiration = DateTime::<Utc>::from_timestamp(exp.saturating_sub(leeway_seconds), 0)
            .ok_or_else(|| PassportError::MalformedToken("exp out of range".to_string()))?;

        Ok(Self {
            raw: raw.to_string(),
            client_id: claims.aud,
            token_id: claims.jti,
            issued_at: timestamp(claims.iat.as_ref()),
            expiration,
            not_before: timestamp(claims.nbf.as_ref()),
            user_id: claims.sub,
            scopes: claims.scopes,
        })
    }

    /// The token exactly as issued
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// `aud` claim
    pub fn client_id(&self) -> Option<&str> {
        self.client_id.as_deref()
    }

    /// `jti` claim
    pub fn token_id(&self) -> Option<&str> {
        self.token_id.as_deref()
    }

    /// `iat` claim
    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        self.issued_at
    }

    /// `nbf` claim
    pub fn not_before(&self) -> Option<DateTime<Utc>> {
        self.not_before
    }

    /// `sub` claim
    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    /// Granted scopes, in token order
    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    /// `exp` minus the leeway
    pub fn expiration(&self) -> DateTime<Utc> {
        self.expiration
    }

    /// [`expiration`](Self::expiration) in milliseconds since the epoch
    pub fn expiration_millis(&self) -> i64 {
        self.expiration.timestamp_millis()
    }

    /// Whether `now` is past the (leeway-adjusted) expiration
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expiration
    }

    /// [`is_expired_at`](Self::is_expired_at) against the system clock
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Scopes joined by spaces; `"*"` when the token carries none
    pub fn scopes_as_string(&self) -> String {
        if self.scopes.is_empty() {
            "*".to_string()
        } else {
            self.scopes.join(" ")
        }
    }
}

fn decode_segment(segment: &str) -> Result<Vec<u8>> {
    // Some issuers pad their segments; the URL-safe alphabet is the same.
    let trimmed = segment.trim_end_matches('=');
    base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(trimmed)
        .map_err(|e| {
            PassportError::MalformedToken(format!("payload is not base64url: {}", e)).into()
        })
}
