//! Identity provider session API
//!
//! Besides the browser-based authorization code flow, a login tool needs a
//! handful of direct calls to the identity provider: checking that a cached
//! session is still valid, refreshing it, and the email one-time-code
//! sign-in. [`IdentityProvider`] is the seam the login flow talks to;
//! [`HttpIdentityClient`] implements it over HTTP.
//!
//! Every request authenticates with a bearer value of the form
//! `<tenant_id>:<token>`, where the token part is omitted for calls that
//! have no session yet. Service accounts use an access key in the token
//! position instead of a session.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

use crate::auth::token_cache::{ErrorDetail, TokenRecord};
use crate::error::{Result, TenantAuthError};

/// Claims describing the signed-in user, as returned by session validation.
///
/// # Examples
///
/// ```
/// use tenantauth::auth::provider::SessionClaims;
///
/// let claims: SessionClaims = serde_json::from_str(
///     r#"{"sub":"U2abc","email":"ada@example.com","roles":["admin"],"exp":1700000000}"#,
/// )
/// .unwrap();
/// assert_eq!(claims.sub, "U2abc");
/// assert_eq!(claims.roles, vec!["admin"]);
/// assert!(claims.extra.contains_key("exp"));
/// ```
///
/// Claims the provider sends as `null` decode to their empty value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Subject (user id). Numeric subjects are kept in their text form.
    #[serde(default, deserialize_with = "lenient_string")]
    pub sub: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub roles: Vec<String>,

    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub permissions: Vec<String>,

    /// Tenant assignments as sent by the provider: either a map keyed by
    /// tenant id or a list of `{id, name, ...}` objects.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub tenants: serde_json::Value,

    /// Any other claim (`exp`, `iss`, custom claims, ...).
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl SessionClaims {
    /// Ids of the tenants the user belongs to, in the order the provider
    /// listed them (map keys are sorted).
    pub fn tenant_ids(&self) -> Vec<String> {
        match &self.tenants {
            serde_json::Value::Object(map) => {
                let mut ids: Vec<_> = map.keys().cloned().collect();
                ids.sort();
                ids
            }
            serde_json::Value::Array(items) => items
                .iter()
                .filter_map(|item| match item {
                    serde_json::Value::String(id) => Some(id.clone()),
                    other => other
                        .get("id")
                        .or_else(|| other.get("tenantId"))
                        .and_then(|id| id.as_str())
                        .map(str::to_string),
                })
                .collect(),
            _ => Vec::new(),
        }
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn lenient_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<serde_json::Value>::deserialize(deserializer)? {
        None | Some(serde_json::Value::Null) => String::new(),
        Some(serde_json::Value::String(s)) => s,
        Some(other) => other.to_string(),
    })
}

/// Returned when a one-time code was sent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignInChallenge {
    /// Masked destination, e.g. `a***@example.com`, when the provider
    /// reports one.
    pub masked_address: Option<String>,
}

/// External identity provider capabilities used by the login flow.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Sends a one-time code to `identifier`.
    async fn sign_in_with_code(&self, identifier: &str) -> Result<SignInChallenge>;

    /// Verifies a one-time code.
    ///
    /// A provider-side rejection is reported as a record with `ok == false`
    /// and an [`ErrorDetail`], not as an `Err`.
    async fn verify_code(&self, identifier: &str, code: &str) -> Result<TokenRecord>;

    /// Validates a session token and returns its claims.
    ///
    /// # Errors
    ///
    /// [`TenantAuthError::SessionInvalid`] if the provider rejects the token.
    async fn validate_session(&self, session_token: &str) -> Result<SessionClaims>;

    /// Exchanges a refresh token for a new session.
    async fn refresh_session(&self, refresh_token: &str) -> Result<TokenRecord>;

    /// Exchanges a service access key for a session.
    ///
    /// # Errors
    ///
    /// [`TenantAuthError::ProviderRejected`] if the key is refused.
    async fn exchange_access_key(&self, access_key: &str) -> Result<TokenRecord>;
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SignInBody<'a> {
    login_id: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VerifyBody<'a> {
    login_id: &'a str,
    code: &'a str,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignInResponse {
    #[serde(default)]
    masked_email: Option<String>,
}

/// Token-bearing body of verify and refresh responses. Accepts both the
/// provider's native field names and the OAuth ones.
#[derive(Debug, Deserialize)]
struct SessionResponse {
    #[serde(default, rename = "sessionJwt", alias = "access_token")]
    session_jwt: Option<String>,
    #[serde(default, rename = "refreshJwt", alias = "refresh_token")]
    refresh_jwt: Option<String>,
}

/// Validation responses either wrap the claims in `token` or are the claims.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ValidateResponse {
    Wrapped { token: SessionClaims },
    Bare(SessionClaims),
}

impl ValidateResponse {
    fn into_claims(self) -> SessionClaims {
        match self {
            ValidateResponse::Wrapped { token } => token,
            ValidateResponse::Bare(claims) => claims,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProviderErrorBody {
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    error_message: Option<String>,
}

impl ProviderErrorBody {
    fn parse(status: u16, body: &str) -> ErrorDetail {
        let parsed: ProviderErrorBody = serde_json::from_str(body).unwrap_or_default();
        let description = parsed
            .error_description
            .or(parsed.error_message)
            .or_else(|| (!body.trim().is_empty()).then(|| body.trim().to_string()));
        ErrorDetail {
            error_code: parsed.error_code.unwrap_or_else(|| format!("http_{status}")),
            error_description: description,
        }
    }
}

/// Name of the cookie that carries the refresh token when the provider
/// keeps it out of the response body.
const REFRESH_COOKIE: &str = "DSR";

/// Value of the cookie `name` among raw `Set-Cookie` header values.
fn cookie_value<'a>(set_cookies: &'a [String], name: &str) -> Option<&'a str> {
    set_cookies.iter().find_map(|header| {
        let pair = header.split(';').next()?;
        let (key, value) = pair.split_once('=')?;
        (key.trim() == name).then(|| value.trim())
    })
}

/// Status, body text and `Set-Cookie` values of a provider response.
#[derive(Debug)]
struct ProviderResponse {
    status: u16,
    body: String,
    set_cookies: Vec<String>,
}

impl ProviderResponse {
    fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    fn error_detail(&self) -> ErrorDetail {
        ProviderErrorBody::parse(self.status, &self.body)
    }
}

// ---------------------------------------------------------------------------
// HttpIdentityClient
// ---------------------------------------------------------------------------

/// [`IdentityProvider`] over the provider's HTTP API.
#[derive(Debug, Clone)]
pub struct HttpIdentityClient {
    http: reqwest::Client,
    base_url: String,
    tenant_id: String,
}

impl HttpIdentityClient {
    /// Creates a client for `tenant_id` at `base_url`.
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        tenant_id: impl Into<String>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            tenant_id: tenant_id.into(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn bearer(&self, token: Option<&str>) -> String {
        match token {
            Some(token) => format!("{}:{}", self.tenant_id, token),
            None => self.tenant_id.clone(),
        }
    }

    /// POSTs `body` and returns the status, raw response text and cookies.
    async fn post<B: Serialize + ?Sized>(
        &self,
        path: &str,
        token: Option<&str>,
        body: &B,
    ) -> Result<ProviderResponse> {
        let url = self.endpoint(path);
        tracing::debug!(%url, "identity provider request");

        let resp = self
            .http
            .post(&url)
            .bearer_auth(self.bearer(token))
            .json(body)
            .send()
            .await
            .map_err(|e| TenantAuthError::Network(format!("request to {} failed: {}", url, e)))?;

        let status = resp.status().as_u16();
        let set_cookies = resp
            .headers()
            .get_all(reqwest::header::SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .map(str::to_string)
            .collect();
        let body = resp
            .text()
            .await
            .map_err(|e| TenantAuthError::Network(format!("reading {} response failed: {}", url, e)))?;
        Ok(ProviderResponse {
            status,
            body,
            set_cookies,
        })
    }

    fn decode<T: DeserializeOwned>(path: &str, body: &str) -> Result<T> {
        serde_json::from_str(body).map_err(|e| {
            TenantAuthError::MalformedTokenResponse(format!("unexpected {} response: {}", path, e))
                .into()
        })
    }

    /// Builds a record from a token-bearing response. The refresh token
    /// falls back to the refresh cookie when the body has none.
    fn session_record(path: &str, response: &ProviderResponse) -> Result<TokenRecord> {
        let raw: SessionResponse = Self::decode(path, &response.body)?;
        let session = raw.session_jwt.filter(|t| !t.is_empty()).ok_or_else(|| {
            TenantAuthError::MalformedTokenResponse(format!("{} response has no session token", path))
        })?;
        let refresh = raw
            .refresh_jwt
            .filter(|t| !t.is_empty())
            .or_else(|| cookie_value(&response.set_cookies, REFRESH_COOKIE).map(str::to_string))
            .unwrap_or_default();
        Ok(TokenRecord::success(session, refresh))
    }
}

const VALIDATE_PATH: &str = "/v1/auth/validate";
const REFRESH_PATH: &str = "/v1/auth/refresh";
const OTP_SIGN_IN_PATH: &str = "/v1/auth/otp/signin/email";
const OTP_VERIFY_PATH: &str = "/v1/auth/otp/verify/email";
const ACCESS_KEY_EXCHANGE_PATH: &str = "/v1/auth/accesskey/exchange";

#[async_trait]
impl IdentityProvider for HttpIdentityClient {
    async fn sign_in_with_code(&self, identifier: &str) -> Result<SignInChallenge> {
        let response = self
            .post(OTP_SIGN_IN_PATH, None, &SignInBody { login_id: identifier })
            .await?;

        if !response.is_success() {
            let detail = response.error_detail();
            return Err(TenantAuthError::ProviderRejected {
                error: detail.error_code,
                description: detail.error_description,
            }
            .into());
        }

        let raw: SignInResponse = if response.body.trim().is_empty() {
            SignInResponse::default()
        } else {
            Self::decode(OTP_SIGN_IN_PATH, &response.body)?
        };
        Ok(SignInChallenge {
            masked_address: raw.masked_email,
        })
    }

    async fn verify_code(&self, identifier: &str, code: &str) -> Result<TokenRecord> {
        let response = self
            .post(
                OTP_VERIFY_PATH,
                None,
                &VerifyBody {
                    login_id: identifier,
                    code,
                },
            )
            .await?;

        if !response.is_success() {
            return Ok(TokenRecord {
                ok: false,
                code: response.status,
                session_token: String::new(),
                refresh_token: String::new(),
                error: Some(response.error_detail()),
            });
        }

        Self::session_record(OTP_VERIFY_PATH, &response)
    }

    async fn validate_session(&self, session_token: &str) -> Result<SessionClaims> {
        let response = self
            .post(VALIDATE_PATH, Some(session_token), &serde_json::json!({}))
            .await?;

        if !response.is_success() {
            let detail = response.error_detail();
            return Err(TenantAuthError::SessionInvalid(format!(
                "{} ({})",
                detail.error_code,
                detail
                    .error_description
                    .unwrap_or_else(|| format!("HTTP {}", response.status))
            ))
            .into());
        }

        let raw: ValidateResponse = Self::decode(VALIDATE_PATH, &response.body)?;
        Ok(raw.into_claims())
    }

    async fn refresh_session(&self, refresh_token: &str) -> Result<TokenRecord> {
        let response = self
            .post(REFRESH_PATH, Some(refresh_token), &serde_json::json!({}))
            .await?;

        if !response.is_success() {
            let detail = response.error_detail();
            return Err(TenantAuthError::SessionInvalid(format!(
                "refresh rejected: {}",
                detail.error_description.unwrap_or(detail.error_code)
            ))
            .into());
        }

        let mut record = Self::session_record(REFRESH_PATH, &response)?;
        // Providers may omit the refresh token when it is not rotated.
        if record.refresh_token.is_empty() {
            record.refresh_token = refresh_token.to_string();
        }
        Ok(record)
    }

    async fn exchange_access_key(&self, access_key: &str) -> Result<TokenRecord> {
        let response = self
            .post(ACCESS_KEY_EXCHANGE_PATH, Some(access_key), &serde_json::json!({}))
            .await?;

        if !response.is_success() {
            let detail = response.error_detail();
            return Err(TenantAuthError::ProviderRejected {
                error: detail.error_code,
                description: detail.error_description,
            }
            .into());
        }

        Self::session_record(ACCESS_KEY_EXCHANGE_PATH, &response)
    }
}
