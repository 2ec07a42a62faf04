use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;
use url::Url;

use tenantauth::auth::browser::BrowserLauncher;
use tenantauth::auth::exchange::{ExchangeRequest, TokenExchanger};
use tenantauth::auth::flow::LoginFlow;
use tenantauth::auth::provider::{IdentityProvider, SessionClaims, SignInChallenge};
use tenantauth::{Result, TenantAuthError, TokenCache, TokenRecord};

#[allow(dead_code)]
pub fn temp_config_file(contents: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("failed to create tempdir");
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, contents).expect("failed to write config file");
    (temp_dir, config_path)
}

#[allow(dead_code)]
pub fn temp_cache() -> (TempDir, TokenCache) {
    let tmp = TempDir::new().expect("failed to create tempdir");
    let cache = TokenCache::new(tmp.path().join("tokens"));
    (tmp, cache)
}

/// Query parameters of `url` as owned pairs.
#[allow(dead_code)]
pub fn query_param(url: &Url, key: &str) -> Option<String> {
    url.query_pairs()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}

// ---------------------------------------------------------------------------
// Identity provider stub
// ---------------------------------------------------------------------------

/// Accepts only the session tokens it was told about.
#[derive(Default)]
#[allow(dead_code)]
pub struct StubProvider {
    valid_tokens: Mutex<Vec<String>>,
    pub validations: AtomicUsize,
}

#[allow(dead_code)]
impl StubProvider {
    pub fn accepting(tokens: &[&str]) -> Self {
        Self {
            valid_tokens: Mutex::new(tokens.iter().map(|t| t.to_string()).collect()),
            validations: AtomicUsize::new(0),
        }
    }

    pub fn accept(&self, token: &str) {
        self.valid_tokens.lock().unwrap().push(token.to_string());
    }
}

#[async_trait]
impl IdentityProvider for StubProvider {
    async fn sign_in_with_code(&self, _identifier: &str) -> Result<SignInChallenge> {
        Ok(SignInChallenge::default())
    }

    async fn verify_code(&self, _identifier: &str, _code: &str) -> Result<TokenRecord> {
        Ok(TokenRecord::success("otp-session", "otp-refresh"))
    }

    async fn validate_session(&self, session_token: &str) -> Result<SessionClaims> {
        self.validations.fetch_add(1, Ordering::SeqCst);
        if self
            .valid_tokens
            .lock()
            .unwrap()
            .iter()
            .any(|t| t == session_token)
        {
            Ok(SessionClaims {
                sub: "user-1".to_string(),
                ..Default::default()
            })
        } else {
            Err(TenantAuthError::SessionInvalid("unknown token".to_string()).into())
        }
    }

    async fn refresh_session(&self, _refresh_token: &str) -> Result<TokenRecord> {
        Err(TenantAuthError::SessionInvalid("refresh not supported".to_string()).into())
    }

    async fn exchange_access_key(&self, _access_key: &str) -> Result<TokenRecord> {
        Err(TenantAuthError::ProviderRejected {
            error: "unsupported".to_string(),
            description: None,
        }
        .into())
    }
}

// ---------------------------------------------------------------------------
// Exchanger spy
// ---------------------------------------------------------------------------

/// Records every exchange and answers with a fixed record.
#[allow(dead_code)]
pub struct SpyExchanger {
    response: TokenRecord,
    pub calls: Mutex<Vec<(Url, ExchangeRequest)>>,
}

#[allow(dead_code)]
impl SpyExchanger {
    pub fn returning(session: &str, refresh: &str) -> Self {
        Self {
            response: TokenRecord::success(session, refresh),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl TokenExchanger for SpyExchanger {
    async fn exchange(&self, token_endpoint: &Url, request: &ExchangeRequest) -> Result<TokenRecord> {
        self.calls
            .lock()
            .unwrap()
            .push((token_endpoint.clone(), request.clone()));
        Ok(self.response.clone())
    }
}

// ---------------------------------------------------------------------------
// Browser stand-in
// ---------------------------------------------------------------------------

/// What the simulated identity provider sends back to the callback.
#[derive(Debug, Clone)]
#[allow(dead_code)]
pub enum Redirect {
    /// Echo the issued state with this code.
    Code(String),
    /// Send a different state with this code.
    WrongState(String),
    /// Report a provider error.
    Error(String),
}

/// Plays the user's browser: remembers the authorization URL and sends the
/// configured redirect to its `redirect_uri`.
#[allow(dead_code)]
pub struct RedirectingBrowser {
    redirect: Redirect,
    pub opened: Mutex<Vec<Url>>,
}

#[allow(dead_code)]
impl RedirectingBrowser {
    pub fn new(redirect: Redirect) -> Self {
        Self {
            redirect,
            opened: Mutex::new(Vec::new()),
        }
    }

    pub fn open_count(&self) -> usize {
        self.opened.lock().unwrap().len()
    }

    pub fn last_url(&self) -> Option<Url> {
        self.opened.lock().unwrap().last().cloned()
    }
}

impl BrowserLauncher for RedirectingBrowser {
    fn open(&self, url: &str) -> Result<()> {
        let auth_url = Url::parse(url)?;
        self.opened.lock().unwrap().push(auth_url.clone());

        let redirect_uri = query_param(&auth_url, "redirect_uri")
            .ok_or_else(|| anyhow::anyhow!("authorization URL has no redirect_uri"))?;
        let state = query_param(&auth_url, "state").unwrap_or_default();

        let mut callback = Url::parse(&redirect_uri.replace("localhost", "127.0.0.1"))?;
        match &self.redirect {
            Redirect::Code(code) => {
                callback
                    .query_pairs_mut()
                    .append_pair("state", &state)
                    .append_pair("code", code);
            }
            Redirect::WrongState(code) => {
                callback
                    .query_pairs_mut()
                    .append_pair("state", "forged-state")
                    .append_pair("code", code);
            }
            Redirect::Error(error) => {
                callback
                    .query_pairs_mut()
                    .append_pair("error", error)
                    .append_pair("error_description", "The user denied access")
                    .append_pair("state", &state);
            }
        }

        tokio::spawn(async move {
            let _ = reqwest::get(callback).await;
        });
        Ok(())
    }
}

/// A flow over `cache` with the given collaborators.
#[allow(dead_code)]
pub fn flow(
    cache: TokenCache,
    provider: Arc<StubProvider>,
    exchanger: Arc<dyn TokenExchanger>,
    browser: Arc<RedirectingBrowser>,
) -> LoginFlow {
    LoginFlow::new(cache, provider, exchanger, browser)
}
