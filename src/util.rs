//! URL and query string helpers
//!
//! Small utilities shared by the authorize and token endpoints and by the
//! callback parser.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

fn scheme_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^https?://").expect("static regex"))
}

fn slashes_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"/{2,}").expect("static regex"))
}

/// Normalize an endpoint URL and force the `https` scheme
///
/// Any leading `http://` or `https://` is dropped, a single trailing slash
/// is removed, and runs of slashes are collapsed.
///
/// # Examples
///
/// ```
/// use passport_spa::util::clean_url;
///
/// assert_eq!(
///     clean_url("http://login.example.com////authorize"),
///     "https://login.example.com/authorize"
/// );
/// assert_eq!(clean_url("login.example.com/oauth/"), "https://login.example.com/oauth");
/// ```
pub fn clean_url(url: &str) -> String {
    let without_scheme = scheme_re().replace(url, "");
    let without_trailing = without_scheme
        .strip_suffix('/')
        .unwrap_or(&*without_scheme);
    let collapsed = slashes_re().replace_all(without_trailing, "/");
    format!("https://{}", collapsed)
}

/// Build `https://{domain}/{prefix}/{endpoint}` through [`clean_url`]
pub fn endpoint_url(domain: &str, oauth_prefix: &str, endpoint: &str) -> String {
    clean_url(&format!("{}/{}/{}", domain, oauth_prefix, endpoint))
}

/// Parse a query string into a key-value map
///
/// A leading `?` is ignored and anything from the first `#` on is dropped.
/// Values are percent-decoded; duplicate keys keep the last occurrence.
///
/// # Examples
///
/// ```
/// use passport_spa::util::parse_query;
///
/// let params = parse_query("?code=abc&state=x%2By#fragment");
/// assert_eq!(params.get("code").map(String::as_str), Some("abc"));
/// assert_eq!(params.get("state").map(String::as_str), Some("x+y"));
/// ```
pub fn parse_query(query: &str) -> HashMap<String, String> {
    let query = query.strip_prefix('?').unwrap_or(query);
    let query = match query.find('#') {
        Some(idx) => &query[..idx],
        None => query,
    };

    url::form_urlencoded::parse(query.as_bytes())
        .filter(|(k, _)| !k.is_empty())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}

/// Shorten a `state` value for log output
pub(crate) fn short_state(state: &str) -> &str {
    match state.char_indices().nth(8) {
        Some((idx, _)) => &state[..idx],
        None => state,
    }
}
