use std::sync::Arc;

use passport_spa::config::ClientOptions;
use passport_spa::platform::fake::{
    unsigned_token, CountingDigest, FakeFetcher, FakeFrameHost, FakePage, SeededRandom,
};
use passport_spa::platform::{KeyValueStore, MemoryStore, Platform};
use passport_spa::PassportClient;

pub const DOMAIN: &str = "auth.example.com";
pub const CLIENT_ID: &str = "client-1";
pub const REDIRECT_URI: &str = "https://app.example.com/callback";

/// A client wired to fakes, with handles to inspect each of them
#[allow(dead_code)]
pub struct Harness {
    pub client: PassportClient,
    pub store: Arc<dyn KeyValueStore>,
    pub frames: Arc<FakeFrameHost>,
    pub fetcher: Arc<FakeFetcher>,
    pub page: Arc<FakePage>,
    pub digest: Arc<CountingDigest>,
}

#[allow(dead_code)]
pub fn options() -> ClientOptions {
    ClientOptions::new(DOMAIN, CLIENT_ID, REDIRECT_URI)
}

#[allow(dead_code)]
pub fn harness(frames: FakeFrameHost, fetcher: FakeFetcher) -> Harness {
    harness_with(options(), Arc::new(MemoryStore::new()), frames, fetcher)
}

#[allow(dead_code)]
pub fn harness_with(
    options: ClientOptions,
    store: Arc<dyn KeyValueStore>,
    frames: FakeFrameHost,
    fetcher: FakeFetcher,
) -> Harness {
    let frames = Arc::new(frames);
    let fetcher = Arc::new(fetcher);
    let page = Arc::new(FakePage::new());
    let digest = Arc::new(CountingDigest::new());

    let platform = Platform {
        random: Arc::new(SeededRandom::new(2024)),
        digest: digest.clone(),
        store: store.clone(),
        fetcher: fetcher.clone(),
        frames: frames.clone(),
        page: page.clone(),
    };
    let client = PassportClient::new(options, platform).expect("valid test options");

    Harness {
        client,
        store,
        frames,
        fetcher,
        page,
        digest,
    }
}

/// A token that expires far in the future
#[allow(dead_code)]
pub fn valid_token(scopes: &[&str]) -> String {
    unsigned_token(&serde_json::json!({
        "aud": CLIENT_ID,
        "jti": "token-id",
        "sub": 77,
        "exp": 4_000_000_000_i64,
        "scopes": scopes,
    }))
}

/// A token that expired long ago
#[allow(dead_code)]
pub fn expired_token(scopes: &[&str]) -> String {
    unsigned_token(&serde_json::json!({
        "sub": 77,
        "exp": 1_000,
        "scopes": scopes,
    }))
}

/// Value of `name` in the query of `url`
#[allow(dead_code)]
pub fn query_param(url: &str, name: &str) -> Option<String> {
    url::Url::parse(url)
        .ok()?
        .query_pairs()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
}
