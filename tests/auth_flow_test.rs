//! End-to-end login flow tests
//!
//! A stand-in browser reads the authorization URL and sends the redirect to
//! the real loopback listener over HTTP, so these tests exercise the whole
//! path from cache lookup to cache write.

use std::sync::Arc;
use std::time::Duration;

use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use tenantauth::auth::exchange::HttpTokenExchanger;
use tenantauth::auth::pkce;
use tenantauth::{TenantAuthError, TokenRecord};

mod common;

use common::{query_param, Redirect, RedirectingBrowser, SpyExchanger, StubProvider};

// ---------------------------------------------------------------------------
// Happy path
// ---------------------------------------------------------------------------

/// proj_123 against https://api.example.com on port 9090: the code ABC123
/// is exchanged exactly once and the resulting record is cached.
#[tokio::test]
async fn test_login_end_to_end_on_fixed_port() {
    let (_tmp, cache) = common::temp_cache();
    let provider = Arc::new(StubProvider::default());
    let exchanger = Arc::new(SpyExchanger::returning("session-token", "refresh-token"));
    let browser = Arc::new(RedirectingBrowser::new(Redirect::Code("ABC123".to_string())));
    let flow = common::flow(cache, provider, exchanger.clone(), browser.clone())
        .with_callback_timeout(Duration::from_secs(10));

    let record = flow
        .login("proj_123", "https://api.example.com", 9090)
        .await
        .expect("login should succeed");

    assert_eq!(record, TokenRecord::success("session-token", "refresh-token"));
    assert_eq!(exchanger.call_count(), 1);
    assert_eq!(browser.open_count(), 1);

    let auth_url = browser.last_url().unwrap();
    assert_eq!(auth_url.host_str(), Some("api.example.com"));
    assert_eq!(auth_url.path(), "/oauth2/v1/authorize");
    assert_eq!(query_param(&auth_url, "client_id").as_deref(), Some("proj_123"));
    assert_eq!(
        query_param(&auth_url, "redirect_uri").as_deref(),
        Some("http://localhost:9090/callback")
    );

    let calls = exchanger.calls.lock().unwrap();
    let (endpoint, request) = &calls[0];
    assert_eq!(endpoint.as_str(), "https://api.example.com/oauth2/v1/token");
    assert_eq!(request.client_id, "proj_123");
    assert_eq!(request.code, "ABC123");
    assert_eq!(request.redirect_uri, "http://localhost:9090/callback");
    assert_eq!(
        Some(pkce::challenge_for(&request.code_verifier)),
        query_param(&auth_url, "code_challenge")
    );

    assert_eq!(flow.cache().load("proj_123"), Some(record));
}

#[tokio::test]
async fn test_login_through_http_exchanger() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth2/v1/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code=code-xyz"))
        .and(body_string_contains("code_verifier="))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "sess-http",
            "refresh_token": "ref-http",
            "token_type": "Bearer"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (_tmp, cache) = common::temp_cache();
    let browser = Arc::new(RedirectingBrowser::new(Redirect::Code("code-xyz".to_string())));
    let flow = common::flow(
        cache,
        Arc::new(StubProvider::default()),
        Arc::new(HttpTokenExchanger::new(reqwest::Client::new())),
        browser,
    )
    .with_callback_timeout(Duration::from_secs(10));

    let record = flow.login("proj_http", &server.uri(), 0).await.unwrap();

    assert_eq!(record.session_token, "sess-http");
    assert_eq!(flow.cache().load("proj_http").unwrap().refresh_token, "ref-http");
}

// ---------------------------------------------------------------------------
// Cache reuse
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_second_login_reuses_cached_session() {
    let (_tmp, cache) = common::temp_cache();
    let provider = Arc::new(StubProvider::default());
    let exchanger = Arc::new(SpyExchanger::returning("session-token", "refresh-token"));
    let browser = Arc::new(RedirectingBrowser::new(Redirect::Code("ABC123".to_string())));
    let flow = common::flow(cache, provider.clone(), exchanger.clone(), browser.clone())
        .with_callback_timeout(Duration::from_secs(10));

    flow.login("proj_123", "https://api.example.com", 0)
        .await
        .unwrap();
    provider.accept("session-token");

    let second = flow
        .login("proj_123", "https://api.example.com", 0)
        .await
        .unwrap();

    assert_eq!(second.session_token, "session-token");
    assert_eq!(exchanger.call_count(), 1);
    assert_eq!(browser.open_count(), 1);
}

#[tokio::test]
async fn test_rejected_cached_session_triggers_new_login() {
    let (_tmp, cache) = common::temp_cache();
    cache
        .save("proj_123", &TokenRecord::success("stale", "stale-ref"))
        .unwrap();
    let exchanger = Arc::new(SpyExchanger::returning("fresh", "fresh-ref"));
    let browser = Arc::new(RedirectingBrowser::new(Redirect::Code("c1".to_string())));
    let flow = common::flow(
        cache,
        Arc::new(StubProvider::default()),
        exchanger.clone(),
        browser.clone(),
    )
    .with_callback_timeout(Duration::from_secs(10));

    let record = flow
        .login("proj_123", "https://api.example.com", 0)
        .await
        .unwrap();

    assert_eq!(record.session_token, "fresh");
    assert_eq!(browser.open_count(), 1);
    assert_eq!(exchanger.call_count(), 1);
}

// ---------------------------------------------------------------------------
// Failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_wrong_state_never_reaches_exchanger() {
    let (_tmp, cache) = common::temp_cache();
    let exchanger = Arc::new(SpyExchanger::returning("s", "r"));
    let browser = Arc::new(RedirectingBrowser::new(Redirect::WrongState("ABC123".to_string())));
    let flow = common::flow(
        cache,
        Arc::new(StubProvider::default()),
        exchanger.clone(),
        browser,
    )
    .with_callback_timeout(Duration::from_secs(10));

    let err = flow
        .login("proj_123", "https://api.example.com", 0)
        .await
        .unwrap_err();

    assert!(matches!(
        err.downcast_ref::<TenantAuthError>(),
        Some(TenantAuthError::StateMismatch)
    ));
    assert_eq!(exchanger.call_count(), 0);
    assert!(flow.cache().load("proj_123").is_none());
}

#[tokio::test]
async fn test_provider_error_is_reported_with_description() {
    let (_tmp, cache) = common::temp_cache();
    let exchanger = Arc::new(SpyExchanger::returning("s", "r"));
    let browser = Arc::new(RedirectingBrowser::new(Redirect::Error("access_denied".to_string())));
    let flow = common::flow(
        cache,
        Arc::new(StubProvider::default()),
        exchanger.clone(),
        browser,
    )
    .with_callback_timeout(Duration::from_secs(10));

    let err = flow
        .login("proj_123", "https://api.example.com", 0)
        .await
        .unwrap_err();

    match err.downcast_ref::<TenantAuthError>() {
        Some(TenantAuthError::ProviderRejected { error, description }) => {
            assert_eq!(error, "access_denied");
            assert_eq!(description.as_deref(), Some("The user denied access"));
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(exchanger.call_count(), 0);
}

#[tokio::test]
async fn test_busy_port_fails_before_browser_opens() {
    let blocker = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = blocker.local_addr().unwrap().port();

    let (_tmp, cache) = common::temp_cache();
    let browser = Arc::new(RedirectingBrowser::new(Redirect::Code("c".to_string())));
    let flow = common::flow(
        cache,
        Arc::new(StubProvider::default()),
        Arc::new(SpyExchanger::returning("s", "r")),
        browser.clone(),
    );

    let err = flow
        .login("proj_123", "https://api.example.com", port)
        .await
        .unwrap_err();

    assert!(matches!(
        err.downcast_ref::<TenantAuthError>(),
        Some(TenantAuthError::PortBind { port: p, .. }) if *p == port
    ));
    assert_eq!(browser.open_count(), 0);
}

#[tokio::test]
async fn test_exchange_rejection_caches_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth2/v1/token"))
        .respond_with(ResponseTemplate::new(400).set_body_string(r#"{"error":"invalid_grant"}"#))
        .mount(&server)
        .await;

    let (_tmp, cache) = common::temp_cache();
    let flow = common::flow(
        cache,
        Arc::new(StubProvider::default()),
        Arc::new(HttpTokenExchanger::new(reqwest::Client::new())),
        Arc::new(RedirectingBrowser::new(Redirect::Code("used-code".to_string()))),
    )
    .with_callback_timeout(Duration::from_secs(10));

    let err = flow.login("proj_123", &server.uri(), 0).await.unwrap_err();

    match err.downcast_ref::<TenantAuthError>() {
        Some(TenantAuthError::ExchangeRejected { status, body }) => {
            assert_eq!(*status, 400);
            assert!(body.contains("invalid_grant"));
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert!(flow.cache().load("proj_123").is_none());
}
