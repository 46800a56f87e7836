//! Sign-in integration tests
//!
//! Drives [`PassportClient::sign_in`] and [`PassportClient::get_token`]
//! against fake platform capabilities:
//!
//! - Concurrent sign-ins share one attempt.
//! - A failed silent attempt falls back to a redirect.
//! - Auto refresh re-requests the expiring token's scopes.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use passport_spa::platform::fake::{FakeFetcher, FakeFrameHost};
use passport_spa::platform::{KeyValueStore, MemoryStore};

use common::{expired_token, harness, harness_with, options, query_param, valid_token};

// ---------------------------------------------------------------------------
// Coalescing
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_concurrent_sign_ins_share_one_attempt() {
    let h = harness(
        FakeFrameHost::echo_state("code-1").with_delay(Duration::from_millis(200)),
        FakeFetcher::token(valid_token(&[])),
    );

    let (a, b, c, d, e) = tokio::join!(
        h.client.sign_in(None),
        h.client.sign_in(None),
        h.client.sign_in(None),
        h.client.sign_in(None),
        h.client.sign_in(None),
    );

    assert!(a && b && c && d && e);
    assert_eq!(h.frames.attach_count(), 1);
    assert_eq!(h.fetcher.requests().len(), 1);
    assert_eq!(h.digest.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_sign_ins_from_clones_share_one_attempt() {
    let h = harness(
        FakeFrameHost::echo_state("code-1").with_delay(Duration::from_millis(200)),
        FakeFetcher::token(valid_token(&[])),
    );

    let handles: Vec<_> = (0..5)
        .map(|_| {
            let client = h.client.clone();
            tokio::spawn(async move { client.sign_in(None).await })
        })
        .collect();

    for handle in handles {
        assert!(handle.await.unwrap());
    }
    assert_eq!(h.frames.attach_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_first_caller_scope_wins() {
    let h = harness(
        FakeFrameHost::echo_state("code-1").with_delay(Duration::from_millis(50)),
        FakeFetcher::token(valid_token(&["read"])),
    );

    let (first, second) = tokio::join!(
        h.client.sign_in(Some("read")),
        h.client.sign_in(Some("write"))
    );

    assert!(first);
    assert!(second);
    let urls = h.frames.urls();
    assert_eq!(urls.len(), 1);
    assert_eq!(query_param(&urls[0], "scope").as_deref(), Some("read"));
}

#[tokio::test]
async fn test_settled_attempt_is_not_reused() {
    let h = harness(
        FakeFrameHost::echo_state("code-1"),
        FakeFetcher::token(valid_token(&[])),
    );

    assert!(h.client.sign_in(None).await);
    assert!(h.client.sign_in(None).await);

    assert_eq!(h.frames.attach_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_attempt_settles_after_caller_gives_up() {
    let h = harness(FakeFrameHost::hanging(), FakeFetcher::token(valid_token(&[])));

    let waited = tokio::time::timeout(Duration::from_secs(1), h.client.sign_in(None)).await;
    assert!(waited.is_err());
    assert_eq!(h.frames.attach_count(), 1);

    // Nobody polls the attempt now; it must still time out and redirect.
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(h.frames.detach_count(), 1);
    assert_eq!(h.page.assigned().len(), 1);

    // The slot is free again, so the next call starts a fresh attempt.
    assert!(!h.client.sign_in(None).await);
    assert_eq!(h.frames.attach_count(), 2);
    assert_eq!(h.frames.detach_count(), 2);
}

// ---------------------------------------------------------------------------
// Redirect fallback
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_silent_timeout_falls_back_to_redirect() {
    let store = Arc::new(MemoryStore::new());
    let h = harness_with(
        options(),
        store.clone(),
        FakeFrameHost::hanging(),
        FakeFetcher::token(valid_token(&[])),
    );

    assert!(!h.client.sign_in(Some("read")).await);

    let assigned = h.page.assigned();
    assert_eq!(assigned.len(), 1);
    assert_eq!(query_param(&assigned[0], "scope").as_deref(), Some("read"));

    // Only the redirect request's entry is left for the callback.
    assert_eq!(store.len(), 1);
    let state = query_param(&assigned[0], "state").unwrap();
    assert!(store.get(&format!("lpjs.{}", state)).unwrap().is_some());
}

#[tokio::test]
async fn test_exchange_failure_signs_out_and_redirects() {
    let h = harness(
        FakeFrameHost::echo_state("code-1"),
        FakeFetcher::failing("invalid_grant", "code expired"),
    );

    assert!(!h.client.sign_in(None).await);
    assert!(!h.client.is_token_valid());
    assert_eq!(h.page.assigned().len(), 1);
}

#[tokio::test]
async fn test_unreadable_frame_falls_back_to_redirect() {
    let h = harness(
        FakeFrameHost::new(|_| passport_spa::platform::fake::FrameBehavior::Load {
            events: vec![passport_spa::platform::FrameEvent::Load],
            query: None,
        }),
        FakeFetcher::token(valid_token(&[])),
    );

    assert!(!h.client.sign_in(None).await);
    assert!(h.fetcher.requests().is_empty());
    assert_eq!(h.page.assigned().len(), 1);
}

// ---------------------------------------------------------------------------
// Token access
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_get_token_signs_in_when_empty() {
    let raw = valid_token(&[]);
    let h = harness(FakeFrameHost::echo_state("code-1"), FakeFetcher::token(raw.clone()));

    assert_eq!(h.client.get_token().await, Some(raw));
    assert_eq!(h.client.get_signed_in_user_id().as_deref(), Some("77"));
    assert_eq!(h.frames.attach_count(), 1);
}

#[tokio::test]
async fn test_get_token_refreshes_with_current_scopes() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let fetcher = FakeFetcher::new(move |_, _| {
        let token = if counter.fetch_add(1, Ordering::SeqCst) == 0 {
            expired_token(&["read", "write"])
        } else {
            valid_token(&["read", "write"])
        };
        Ok(serde_json::json!({ "access_token": token }))
    });
    let h = harness(FakeFrameHost::echo_state("code-1"), fetcher);

    assert!(h.client.sign_in(Some("read write")).await);
    assert!(!h.client.is_token_valid());
    assert_eq!(h.client.get_signed_in_user_id(), None);

    let token = h.client.get_token().await;

    assert_eq!(token, Some(valid_token(&["read", "write"])));
    let urls = h.frames.urls();
    assert_eq!(urls.len(), 2);
    assert_eq!(query_param(&urls[1], "scope").as_deref(), Some("read write"));
}

#[tokio::test]
async fn test_valid_token_is_returned_without_sign_in() {
    let h = harness(
        FakeFrameHost::echo_state("code-1"),
        FakeFetcher::token(valid_token(&[])),
    );
    assert!(h.client.sign_in(None).await);

    assert!(h.client.get_token().await.is_some());
    assert_eq!(h.frames.attach_count(), 1);
    assert!(h.client.get_token_expiration().is_some());
}
