//! Error types for tenantauth
//!
//! This module defines all error types used throughout the crate, using
//! `thiserror` for the typed enum and `anyhow` for propagation.
//!
//! Every failure a login attempt can end with has its own variant so that
//! callers can classify an error with
//! `err.downcast_ref::<TenantAuthError>()` instead of matching on message
//! text.

use thiserror::Error;

/// Main error type for tenantauth operations
#[derive(Error, Debug)]
pub enum TenantAuthError {
    /// Missing or invalid configuration (for example no tenant identifier)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The local callback port could not be bound
    #[error("Failed to bind callback listener on port {port}: {message}")]
    PortBind {
        /// Port that was requested
        port: u16,
        /// Underlying OS error text
        message: String,
    },

    /// The identity provider redirected back with an `error` parameter
    #[error("Identity provider rejected the login: {error}{}", format_description(.description))]
    ProviderRejected {
        /// Value of the `error` query parameter
        error: String,
        /// Value of the `error_description` query parameter, if any
        description: Option<String>,
    },

    /// The callback carried a `state` that does not match the issued one
    #[error("State mismatch in login callback (possible CSRF attempt)")]
    StateMismatch,

    /// The callback carried a valid `state` but no authorization code
    #[error("Authorization code missing from login callback")]
    MissingCode,

    /// No callback arrived within the allowed time
    #[error("Timed out after {0} seconds waiting for the login callback")]
    CallbackTimeout(u64),

    /// The login attempt was aborted by the caller
    #[error("Login attempt was cancelled")]
    Cancelled,

    /// Transport-level failure talking to the identity provider
    #[error("Network error: {0}")]
    Network(String),

    /// The token endpoint answered with a non-success status
    #[error("Token endpoint returned {status}: {body}")]
    ExchangeRejected {
        /// HTTP status code
        status: u16,
        /// Response body as text
        body: String,
    },

    /// The token endpoint answered 2xx but the body is unusable
    #[error("Malformed token response: {0}")]
    MalformedTokenResponse(String),

    /// A cached record could not be read (always recovered as a cache miss)
    #[error("Token cache read error: {0}")]
    CacheRead(String),

    /// A record could not be persisted
    #[error("Token cache write error: {0}")]
    CacheWrite(String),

    /// The identity provider refused a session or refresh token
    #[error("Session rejected by identity provider: {0}")]
    SessionInvalid(String),

    /// No usable credentials are cached for the tenant
    #[error("Not logged in to tenant '{0}'. Run `tenantauth login` first")]
    NotLoggedIn(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

fn format_description(description: &Option<String>) -> String {
    match description {
        Some(d) if !d.is_empty() => format!(" - {}", d),
        _ => String::new(),
    }
}

/// Result type alias for tenantauth operations
///
/// Uses `anyhow::Error` so context can be attached while the typed
/// [`TenantAuthError`] stays recoverable through `downcast_ref`.
pub type Result<T> = anyhow::Result<T>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_error_display() {
        let error = TenantAuthError::Configuration("tenant_id is required".to_string());
        assert_eq!(
            error.to_string(),
            "Configuration error: tenant_id is required"
        );
    }

    #[test]
    fn test_port_bind_error_display() {
        let error = TenantAuthError::PortBind {
            port: 8088,
            message: "address in use".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Failed to bind callback listener on port 8088: address in use"
        );
    }

    #[test]
    fn test_provider_rejected_display_with_description() {
        let error = TenantAuthError::ProviderRejected {
            error: "access_denied".to_string(),
            description: Some("user cancelled".to_string()),
        };
        assert_eq!(
            error.to_string(),
            "Identity provider rejected the login: access_denied - user cancelled"
        );
    }

    #[test]
    fn test_provider_rejected_display_without_description() {
        let error = TenantAuthError::ProviderRejected {
            error: "server_error".to_string(),
            description: None,
        };
        assert_eq!(
            error.to_string(),
            "Identity provider rejected the login: server_error"
        );
    }

    #[test]
    fn test_exchange_rejected_display() {
        let error = TenantAuthError::ExchangeRejected {
            status: 400,
            body: "invalid_grant".to_string(),
        };
        assert!(error.to_string().contains("400"));
        assert!(error.to_string().contains("invalid_grant"));
    }

    #[test]
    fn test_not_logged_in_mentions_tenant() {
        let error = TenantAuthError::NotLoggedIn("proj_123".to_string());
        assert!(error.to_string().contains("proj_123"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let error: TenantAuthError = io_error.into();
        assert!(matches!(error, TenantAuthError::Io(_)));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_error = serde_json::from_str::<serde_json::Value>("{invalid json}").unwrap_err();
        let error: TenantAuthError = json_error.into();
        assert!(matches!(error, TenantAuthError::Serialization(_)));
    }

    #[test]
    fn test_yaml_error_conversion() {
        let yaml_error = serde_yaml::from_str::<serde_yaml::Value>("invalid: : yaml").unwrap_err();
        let error: TenantAuthError = yaml_error.into();
        assert!(matches!(error, TenantAuthError::Yaml(_)));
    }

    #[test]
    fn test_downcast_from_anyhow_preserves_kind() {
        let err: anyhow::Error = TenantAuthError::StateMismatch.into();
        assert!(matches!(
            err.downcast_ref::<TenantAuthError>(),
            Some(TenantAuthError::StateMismatch)
        ));
    }
}
