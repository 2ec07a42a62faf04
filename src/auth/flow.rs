//! Login orchestration
//!
//! [`LoginFlow`] ties the pieces of this module together:
//!
//! 1. Reuse the cached session for the tenant if the provider still accepts it.
//! 2. Otherwise generate PKCE parameters and start the loopback callback
//!    listener.
//! 3. Build the authorization URL and open it in the system browser (or
//!    print it when no browser can be launched).
//! 4. Wait for the redirect, exchange the code for tokens, and cache them.
//!
//! The flow also covers the lighter operations that share the cache: email
//! one-time-code login, session refresh, and reading the current session.
//! Service access keys are exchanged on demand and never cached.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use url::Url;

use crate::auth::browser::BrowserLauncher;
use crate::auth::callback::{CallbackListener, DEFAULT_CALLBACK_TIMEOUT};
use crate::auth::exchange::{ExchangeRequest, TokenExchanger};
use crate::auth::pkce::{self, PkceParams, CHALLENGE_METHOD};
use crate::auth::provider::{IdentityProvider, SessionClaims, SignInChallenge};
use crate::auth::token_cache::{validate_tenant_id, TokenCache, TokenRecord};
use crate::error::{Result, TenantAuthError};

/// Path of the authorization endpoint, relative to the provider base URL.
pub const AUTHORIZE_PATH: &str = "/oauth2/v1/authorize";

/// Path of the token endpoint, relative to the provider base URL.
pub const TOKEN_PATH: &str = "/oauth2/v1/token";

/// Scopes requested by every browser login.
pub const LOGIN_SCOPE: &str = "openid profile email";

/// A cached record together with the claims the provider reported for it.
#[derive(Debug, Clone)]
pub struct Session {
    pub record: TokenRecord,
    pub claims: SessionClaims,
}

/// Drives logins for one identity provider.
///
/// Collaborators are injected so tests can substitute the browser, the
/// provider API and the token exchange.
pub struct LoginFlow {
    cache: TokenCache,
    provider: Arc<dyn IdentityProvider>,
    exchanger: Arc<dyn TokenExchanger>,
    browser: Arc<dyn BrowserLauncher>,
    callback_timeout: Duration,
    cancel: CancellationToken,
}

impl LoginFlow {
    /// Creates a flow with the default callback timeout and no external
    /// cancellation.
    pub fn new(
        cache: TokenCache,
        provider: Arc<dyn IdentityProvider>,
        exchanger: Arc<dyn TokenExchanger>,
        browser: Arc<dyn BrowserLauncher>,
    ) -> Self {
        Self {
            cache,
            provider,
            exchanger,
            browser,
            callback_timeout: DEFAULT_CALLBACK_TIMEOUT,
            cancel: CancellationToken::new(),
        }
    }

    /// Sets how long [`login`](Self::login) waits for the browser redirect.
    pub fn with_callback_timeout(mut self, timeout: Duration) -> Self {
        self.callback_timeout = timeout;
        self
    }

    /// Uses `cancel` to abort a pending [`login`](Self::login).
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// The cache this flow reads and writes.
    pub fn cache(&self) -> &TokenCache {
        &self.cache
    }

    /// Logs in to `tenant_id` through the browser, reusing a valid cached
    /// session when there is one.
    ///
    /// # Arguments
    ///
    /// * `tenant_id` - Tenant (project) identifier; also the OAuth client id.
    /// * `base_url` - Identity provider base URL.
    /// * `callback_port` - Loopback port for the redirect; 0 picks a free one.
    ///
    /// # Errors
    ///
    /// - [`TenantAuthError::Configuration`] for an invalid tenant or base URL.
    /// - [`TenantAuthError::PortBind`] if the callback port is taken. The
    ///   browser is not opened in that case.
    /// - Any callback outcome from [`CallbackListener::wait`].
    /// - Any exchange error from [`TokenExchanger::exchange`].
    /// - [`TenantAuthError::CacheWrite`] if the new record cannot be saved.
    ///
    /// Nothing is cached unless the whole flow succeeds.
    pub async fn login(
        &self,
        tenant_id: &str,
        base_url: &str,
        callback_port: u16,
    ) -> Result<TokenRecord> {
        validate_tenant_id(tenant_id)?;
        let token_endpoint = endpoint_url(base_url, TOKEN_PATH)?;

        if let Some(record) = self.cached_valid_session(tenant_id).await {
            tracing::info!(tenant = tenant_id, "using cached session");
            return Ok(record);
        }

        let params = pkce::generate();
        let mut listener = CallbackListener::new(callback_port, params.state.clone());
        listener.start().await?;
        let redirect_uri = listener.redirect_uri()?;

        let auth_url = build_authorization_url(base_url, tenant_id, &redirect_uri, &params)?;
        tracing::info!(tenant = tenant_id, "waiting for browser login");
        if let Err(e) = self.browser.open(auth_url.as_str()) {
            tracing::warn!("could not open a browser: {:#}", e);
            eprintln!(
                "Open the following URL in your browser to continue:\n\n  {}\n",
                auth_url
            );
        }

        let code = listener.wait(self.callback_timeout, &self.cancel).await?;
        tracing::debug!("authorization code received");

        let request = ExchangeRequest {
            client_id: tenant_id.to_string(),
            code,
            redirect_uri,
            code_verifier: params.code_verifier.clone(),
        };
        let record = self.exchanger.exchange(&token_endpoint, &request).await?;

        let saved = self.cache.save(tenant_id, &record)?;
        tracing::info!(tenant = tenant_id, "login complete");
        Ok(saved)
    }

    /// Logs in with an emailed one-time code.
    ///
    /// `prompt` is called after the code was sent and must return the code
    /// the user entered.
    ///
    /// # Errors
    ///
    /// [`TenantAuthError::ProviderRejected`] if the provider refuses to send
    /// the code or rejects the entered code. Prompt errors are propagated.
    pub async fn login_with_code<F>(
        &self,
        tenant_id: &str,
        identifier: &str,
        prompt: F,
    ) -> Result<TokenRecord>
    where
        F: FnOnce(&SignInChallenge) -> Result<String>,
    {
        validate_tenant_id(tenant_id)?;

        let challenge = self.provider.sign_in_with_code(identifier).await?;
        tracing::info!(
            destination = challenge.masked_address.as_deref().unwrap_or(identifier),
            "one-time code sent"
        );

        let code = prompt(&challenge)?;
        let code = code.trim();
        if code.is_empty() {
            return Err(TenantAuthError::MissingCode.into());
        }

        let record = self.provider.verify_code(identifier, code).await?;
        if !record.ok {
            let (error, description) = match record.error {
                Some(detail) => (detail.error_code, detail.error_description),
                None => (format!("http_{}", record.code), None),
            };
            return Err(TenantAuthError::ProviderRejected { error, description }.into());
        }

        self.cache.save(tenant_id, &record)
    }

    /// Refreshes the cached session for `tenant_id` and saves the result.
    ///
    /// # Errors
    ///
    /// [`TenantAuthError::NotLoggedIn`] when there is no cached refresh
    /// token; provider errors otherwise.
    pub async fn refresh(&self, tenant_id: &str) -> Result<TokenRecord> {
        validate_tenant_id(tenant_id)?;

        let record = self
            .cache
            .load(tenant_id)
            .filter(|r| r.ok && r.has_refresh_token())
            .ok_or_else(|| TenantAuthError::NotLoggedIn(tenant_id.to_string()))?;

        let refreshed = self.provider.refresh_session(&record.refresh_token).await?;
        tracing::info!(tenant = tenant_id, "session refreshed");
        self.cache.save(tenant_id, &refreshed)
    }

    /// Returns the cached session for `tenant_id` with its validated claims.
    ///
    /// # Errors
    ///
    /// [`TenantAuthError::NotLoggedIn`] when nothing usable is cached, and
    /// [`TenantAuthError::SessionInvalid`] when the provider rejects it.
    pub async fn current_session(&self, tenant_id: &str) -> Result<Session> {
        validate_tenant_id(tenant_id)?;

        let record = self
            .cache
            .load(tenant_id)
            .filter(|r| r.ok && !r.session_token.is_empty())
            .ok_or_else(|| TenantAuthError::NotLoggedIn(tenant_id.to_string()))?;

        let claims = self.provider.validate_session(&record.session_token).await?;
        Ok(Session { record, claims })
    }

    /// Exchanges a service access key for a session token.
    ///
    /// The result is returned as-is and not cached; cached interactive
    /// sessions for the tenant are left untouched.
    ///
    /// # Errors
    ///
    /// [`TenantAuthError::Configuration`] for an invalid tenant or a blank
    /// key, [`TenantAuthError::ProviderRejected`] if the provider refuses it.
    pub async fn access_key_session(
        &self,
        tenant_id: &str,
        access_key: &str,
    ) -> Result<TokenRecord> {
        validate_tenant_id(tenant_id)?;
        if access_key.trim().is_empty() {
            return Err(TenantAuthError::Configuration("access key is empty".to_string()).into());
        }

        let record = self.provider.exchange_access_key(access_key.trim()).await?;
        tracing::info!(tenant = tenant_id, "access key exchanged");
        Ok(record)
    }

    /// Removes the cached session for `tenant_id`. Returns whether one
    /// existed.
    pub fn logout(&self, tenant_id: &str) -> Result<bool> {
        let removed = self.cache.clear(tenant_id)?;
        if removed {
            tracing::info!(tenant = tenant_id, "cached session removed");
        }
        Ok(removed)
    }

    /// Cached record for `tenant_id` if the provider still accepts it. Every
    /// failure along the way counts as a miss.
    async fn cached_valid_session(&self, tenant_id: &str) -> Option<TokenRecord> {
        let record = self.cache.load(tenant_id)?;
        if !record.ok || record.session_token.is_empty() {
            tracing::debug!(tenant = tenant_id, "cached record is not usable");
            return None;
        }

        match self.provider.validate_session(&record.session_token).await {
            Ok(_) => Some(record),
            Err(e) => {
                tracing::debug!(tenant = tenant_id, "cached session rejected: {:#}", e);
                None
            }
        }
    }
}

/// Builds the authorization URL for one login attempt.
///
/// # Examples
///
/// ```
/// use tenantauth::auth::flow::build_authorization_url;
/// use tenantauth::auth::pkce::generate;
///
/// let params = generate();
/// let url = build_authorization_url(
///     "https://api.example.com",
///     "proj_123",
///     "http://localhost:9090/callback",
///     &params,
/// )
/// .unwrap();
///
/// assert_eq!(url.path(), "/oauth2/v1/authorize");
/// assert!(url
///     .query_pairs()
///     .any(|(k, v)| k == "code_challenge" && v == params.code_challenge.as_str()));
/// ```
pub fn build_authorization_url(
    base_url: &str,
    tenant_id: &str,
    redirect_uri: &str,
    params: &PkceParams,
) -> Result<Url> {
    let mut url = endpoint_url(base_url, AUTHORIZE_PATH)?;
    url.query_pairs_mut()
        .append_pair("response_type", "code")
        .append_pair("client_id", tenant_id)
        .append_pair("redirect_uri", redirect_uri)
        .append_pair("scope", LOGIN_SCOPE)
        .append_pair("state", &params.state)
        .append_pair("code_challenge", &params.code_challenge)
        .append_pair("code_challenge_method", CHALLENGE_METHOD)
        .append_pair("flow", "sign-in");
    Ok(url)
}

/// Appends `path` to `base_url`, keeping any path prefix the base carries.
fn endpoint_url(base_url: &str, path: &str) -> Result<Url> {
    let joined = format!("{}{}", base_url.trim_end_matches('/'), path);
    let url = Url::parse(&joined).map_err(|e| {
        TenantAuthError::Configuration(format!("invalid base URL '{}': {}", base_url, e))
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(TenantAuthError::Configuration(format!(
            "base URL must use http or https: {}",
            base_url
        ))
        .into());
    }
    Ok(url)
}
