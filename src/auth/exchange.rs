//! Authorization-code-for-token exchange
//!
//! Performs the single form-encoded `POST` to the identity provider's token
//! endpoint that completes the authorization code flow. The exchange is
//! never retried; any retry policy belongs to the caller.

use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

use crate::auth::token_cache::TokenRecord;
use crate::error::{Result, TenantAuthError};

/// Parameters of one authorization code exchange.
#[derive(Clone)]
pub struct ExchangeRequest {
    /// OAuth client id; the tenant identifier.
    pub client_id: String,
    /// Authorization code delivered by the callback.
    pub code: String,
    /// Redirect URI used in the authorization request.
    pub redirect_uri: String,
    /// PKCE code verifier matching the challenge sent earlier.
    pub code_verifier: String,
}

impl ExchangeRequest {
    /// Form fields in the order they are sent.
    pub fn form_fields(&self) -> [(&'static str, &str); 5] {
        [
            ("grant_type", "authorization_code"),
            ("client_id", &self.client_id),
            ("code", &self.code),
            ("redirect_uri", &self.redirect_uri),
            ("code_verifier", &self.code_verifier),
        ]
    }
}

impl std::fmt::Debug for ExchangeRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExchangeRequest")
            .field("client_id", &self.client_id)
            .field("redirect_uri", &self.redirect_uri)
            .finish_non_exhaustive()
    }
}

/// Exchanges an authorization code for tokens.
#[async_trait]
pub trait TokenExchanger: Send + Sync {
    /// Posts `request` to `token_endpoint` and returns the resulting record.
    ///
    /// # Errors
    ///
    /// - [`TenantAuthError::Network`] for transport failures.
    /// - [`TenantAuthError::ExchangeRejected`] for non-2xx responses.
    /// - [`TenantAuthError::MalformedTokenResponse`] for unusable bodies.
    async fn exchange(&self, token_endpoint: &Url, request: &ExchangeRequest)
        -> Result<TokenRecord>;
}

// ---------------------------------------------------------------------------
// Token endpoint response (raw deserialization)
// ---------------------------------------------------------------------------

/// Raw JSON body returned by the token endpoint.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    id_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
}

impl TokenResponse {
    /// Converts the raw response into a [`TokenRecord`].
    ///
    /// The session token is `access_token`, falling back to `id_token`. A
    /// missing refresh token becomes an empty string.
    fn into_record(self) -> Result<TokenRecord> {
        let session_token = self
            .access_token
            .filter(|t| !t.is_empty())
            .or(self.id_token.filter(|t| !t.is_empty()))
            .ok_or_else(|| {
                TenantAuthError::MalformedTokenResponse(
                    "response contains neither access_token nor id_token".to_string(),
                )
            })?;

        Ok(TokenRecord::success(
            session_token,
            self.refresh_token.unwrap_or_default(),
        ))
    }
}

// ---------------------------------------------------------------------------
// HttpTokenExchanger
// ---------------------------------------------------------------------------

/// [`TokenExchanger`] backed by `reqwest`.
///
/// # Examples
///
/// ```no_run
/// use tenantauth::auth::exchange::{ExchangeRequest, HttpTokenExchanger, TokenExchanger};
/// use url::Url;
///
/// # async fn example() -> tenantauth::Result<()> {
/// let exchanger = HttpTokenExchanger::new(reqwest::Client::new());
/// let endpoint = Url::parse("https://auth.example.com/oauth2/v1/token")?;
/// let record = exchanger
///     .exchange(
///         &endpoint,
///         &ExchangeRequest {
///             client_id: "proj_123".to_string(),
///             code: "ABC123".to_string(),
///             redirect_uri: "http://localhost:8088/callback".to_string(),
///             code_verifier: "verifier".to_string(),
///         },
///     )
///     .await?;
/// assert!(record.ok);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HttpTokenExchanger {
    http: reqwest::Client,
}

impl HttpTokenExchanger {
    /// Creates an exchanger that sends requests with `http`.
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl TokenExchanger for HttpTokenExchanger {
    async fn exchange(
        &self,
        token_endpoint: &Url,
        request: &ExchangeRequest,
    ) -> Result<TokenRecord> {
        tracing::debug!(endpoint = %token_endpoint, "exchanging authorization code");

        let resp = self
            .http
            .post(token_endpoint.clone())
            .form(&request.form_fields()[..])
            .send()
            .await
            .map_err(|e| TenantAuthError::Network(format!("token exchange request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(TenantAuthError::ExchangeRejected {
                status: status.as_u16(),
                body,
            }
            .into());
        }

        let raw: TokenResponse = resp.json().await.map_err(|e| {
            TenantAuthError::MalformedTokenResponse(format!("failed to parse token response: {e}"))
        })?;

        raw.into_record()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
