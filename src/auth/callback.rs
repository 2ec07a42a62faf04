//! One-shot loopback listener for the OAuth redirect callback
//!
//! The listener binds `127.0.0.1:<port>`, serves `GET /callback` until the
//! first request arrives, then shuts itself down. Its lifecycle is an
//! explicit state machine:
//!
//! ```text
//! Idle --start()--> Listening --first /callback | timeout | cancel | drop--> Terminated
//! ```
//!
//! The first `/callback` request is evaluated in a fixed order: provider
//! `error` parameter, then `state`, then `code`. The `state` check always
//! happens before the code is looked at, so a forged redirect can never get
//! its code exchanged. The outcome is delivered to the waiting orchestrator
//! through a `oneshot` channel that fires at most once; any request that
//! races in after that gets `410 Gone` and changes nothing. Requests for
//! other paths get `404` and change nothing.

use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, TenantAuthError};

/// Path the identity provider redirects the browser to.
pub const CALLBACK_PATH: &str = "/callback";

/// Port used when none is configured.
pub const DEFAULT_CALLBACK_PORT: u16 = 8088;

/// How long a login attempt waits for the browser redirect.
pub const DEFAULT_CALLBACK_TIMEOUT: Duration = Duration::from_secs(300);

/// Upper bound on waiting for the server task to exit after shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

const SUCCESS_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head><title>Login successful</title></head>
<body style="font-family: system-ui; text-align: center; padding-top: 80px;">
<h2>Login successful!</h2>
<p>You may close this window and return to the terminal.</p>
</body>
</html>"#;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Lifecycle of a [`CallbackListener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    /// Created, no socket bound yet.
    Idle,
    /// Port bound, waiting for the callback.
    Listening,
    /// Port released; no further request has any effect.
    Terminated,
}

/// Why a callback request was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackError {
    /// The provider redirected with `error` (and maybe `error_description`).
    ProviderError {
        /// Value of `error`.
        error: String,
        /// Value of `error_description`.
        description: Option<String>,
    },
    /// `state` absent or different from the issued value.
    StateMismatch,
    /// `state` valid but no `code`.
    MissingCode,
}

impl From<CallbackError> for TenantAuthError {
    fn from(err: CallbackError) -> Self {
        match err {
            CallbackError::ProviderError { error, description } => {
                TenantAuthError::ProviderRejected { error, description }
            }
            CallbackError::StateMismatch => TenantAuthError::StateMismatch,
            CallbackError::MissingCode => TenantAuthError::MissingCode,
        }
    }
}

/// Outcome of one callback request: the authorization code or the reason
/// it was rejected.
pub type CallbackResult = std::result::Result<String, CallbackError>;

/// Validates the query parameters of a callback request.
///
/// Checks run in order: provider error, state, code.
///
/// # Examples
///
/// ```
/// use std::collections::HashMap;
/// use tenantauth::auth::callback::{evaluate_callback, CallbackError};
///
/// let mut params = HashMap::new();
/// params.insert("state".to_string(), "s1".to_string());
/// params.insert("code".to_string(), "abc".to_string());
/// assert_eq!(evaluate_callback(&params, "s1"), Ok("abc".to_string()));
/// assert_eq!(evaluate_callback(&params, "s2"), Err(CallbackError::StateMismatch));
/// ```
pub fn evaluate_callback(params: &HashMap<String, String>, expected_state: &str) -> CallbackResult {
    if let Some(error) = params.get("error").filter(|e| !e.is_empty()) {
        return Err(CallbackError::ProviderError {
            error: error.clone(),
            description: params
                .get("error_description")
                .filter(|d| !d.is_empty())
                .cloned(),
        });
    }

    match params.get("state") {
        Some(state) if state == expected_state => {}
        _ => return Err(CallbackError::StateMismatch),
    }

    match params.get("code") {
        Some(code) if !code.is_empty() => Ok(code.clone()),
        _ => Err(CallbackError::MissingCode),
    }
}

// ---------------------------------------------------------------------------
// Shared handler state
// ---------------------------------------------------------------------------

struct Lifecycle {
    state: ListenerState,
    completion: Option<oneshot::Sender<CallbackResult>>,
}

struct Shared {
    expected_state: String,
    lifecycle: Mutex<Lifecycle>,
    shutdown: CancellationToken,
}

impl Shared {
    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn callback_router(shared: Arc<Shared>) -> Router {
    Router::new()
        .route(CALLBACK_PATH, get(handle_callback))
        .with_state(shared)
}

async fn handle_callback(
    State(shared): State<Arc<Shared>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let completion = {
        let mut lifecycle = shared.lifecycle();
        if lifecycle.state != ListenerState::Listening {
            tracing::debug!("ignoring callback request after listener termination");
            return plain(StatusCode::GONE, "This login attempt has already completed.");
        }
        lifecycle.state = ListenerState::Terminated;
        lifecycle.completion.take()
    };

    let result = evaluate_callback(&params, &shared.expected_state);
    shared.shutdown.cancel();

    let response = match &result {
        Ok(_) => (
            StatusCode::OK,
            [(header::CONNECTION, "close")],
            Html(SUCCESS_PAGE),
        )
            .into_response(),
        Err(CallbackError::ProviderError { error, description }) => plain(
            StatusCode::BAD_REQUEST,
            &format!(
                "Login error: {} - {}",
                error,
                description.as_deref().unwrap_or("")
            ),
        ),
        Err(CallbackError::StateMismatch) => plain(StatusCode::BAD_REQUEST, "Invalid state"),
        Err(CallbackError::MissingCode) => plain(StatusCode::BAD_REQUEST, "Missing code"),
    };

    if let Some(tx) = completion {
        let _ = tx.send(result);
    }

    response
}

fn plain(status: StatusCode, body: &str) -> Response {
    (
        status,
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8"),
            (header::CONNECTION, "close"),
        ],
        body.to_string(),
    )
        .into_response()
}

// ---------------------------------------------------------------------------
// CallbackListener
// ---------------------------------------------------------------------------

/// Loopback HTTP listener that receives exactly one OAuth callback.
///
/// # Examples
///
/// ```no_run
/// use tenantauth::auth::callback::{CallbackListener, DEFAULT_CALLBACK_TIMEOUT};
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() -> tenantauth::Result<()> {
/// let mut listener = CallbackListener::new(8088, "expected-state");
/// listener.start().await?;
/// println!("redirect to {}", listener.redirect_uri()?);
///
/// let code = listener
///     .wait(DEFAULT_CALLBACK_TIMEOUT, &CancellationToken::new())
///     .await?;
/// # let _ = code;
/// # Ok(())
/// # }
/// ```
pub struct CallbackListener {
    port: u16,
    shared: Arc<Shared>,
    receiver: Option<oneshot::Receiver<CallbackResult>>,
    local_addr: Option<SocketAddr>,
    server: Option<JoinHandle<()>>,
}

impl CallbackListener {
    /// Creates an idle listener for `port` (0 lets the OS choose) that will
    /// accept only callbacks carrying `expected_state`.
    pub fn new(port: u16, expected_state: impl Into<String>) -> Self {
        let (tx, rx) = oneshot::channel();
        let shared = Arc::new(Shared {
            expected_state: expected_state.into(),
            lifecycle: Mutex::new(Lifecycle {
                state: ListenerState::Idle,
                completion: Some(tx),
            }),
            shutdown: CancellationToken::new(),
        });

        Self {
            port,
            shared,
            receiver: Some(rx),
            local_addr: None,
            server: None,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ListenerState {
        self.shared.lifecycle().state
    }

    /// Address actually bound, once listening.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Redirect URI to register in the authorization request,
    /// `http://localhost:<bound port>/callback`.
    ///
    /// # Errors
    ///
    /// Fails if the listener has not been started.
    pub fn redirect_uri(&self) -> Result<String> {
        let addr = self
            .local_addr
            .ok_or_else(|| anyhow::anyhow!("callback listener has not been started"))?;
        Ok(format!("http://localhost:{}{}", addr.port(), CALLBACK_PATH))
    }

    /// Binds the loopback port and starts serving: Idle -> Listening.
    ///
    /// # Errors
    ///
    /// Returns [`TenantAuthError::PortBind`] if the port cannot be bound.
    /// Starting a listener that is not idle is an error too.
    pub async fn start(&mut self) -> Result<SocketAddr> {
        if self.state() != ListenerState::Idle {
            anyhow::bail!("callback listener can only be started once");
        }

        let listener = tokio::net::TcpListener::bind((Ipv4Addr::LOCALHOST, self.port))
            .await
            .map_err(|e| TenantAuthError::PortBind {
                port: self.port,
                message: e.to_string(),
            })?;
        let local_addr = listener.local_addr().map_err(|e| TenantAuthError::PortBind {
            port: self.port,
            message: e.to_string(),
        })?;

        let app = callback_router(Arc::clone(&self.shared));
        let shutdown = self.shared.shutdown.clone();
        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown.cancelled_owned())
                .await
            {
                tracing::warn!("callback listener stopped with error: {}", e);
            }
        });

        self.shared.lifecycle().state = ListenerState::Listening;
        self.local_addr = Some(local_addr);
        self.server = Some(handle);

        tracing::debug!(addr = %local_addr, "callback listener started");
        Ok(local_addr)
    }

    /// Waits for the callback, a timeout, or cancellation, whichever comes
    /// first. The listener is terminated and its port released before this
    /// returns, on every path.
    ///
    /// # Returns
    ///
    /// The authorization code from a valid callback.
    ///
    /// # Errors
    ///
    /// - [`TenantAuthError::ProviderRejected`], [`TenantAuthError::StateMismatch`]
    ///   or [`TenantAuthError::MissingCode`] for a rejected callback.
    /// - [`TenantAuthError::CallbackTimeout`] when `timeout` elapses.
    /// - [`TenantAuthError::Cancelled`] when `cancel` fires or the listener
    ///   was terminated elsewhere.
    pub async fn wait(&mut self, timeout: Duration, cancel: &CancellationToken) -> Result<String> {
        let receiver = self
            .receiver
            .take()
            .ok_or_else(|| anyhow::anyhow!("callback listener result was already consumed"))?;

        if self.state() == ListenerState::Idle {
            self.terminate().await;
            anyhow::bail!("callback listener was never started");
        }

        let outcome: std::result::Result<CallbackResult, TenantAuthError> = tokio::select! {
            received = receiver => received.map_err(|_| TenantAuthError::Cancelled),
            _ = tokio::time::sleep(timeout) => Err(TenantAuthError::CallbackTimeout(timeout.as_secs())),
            _ = cancel.cancelled() => Err(TenantAuthError::Cancelled),
        };

        self.terminate().await;

        match outcome {
            Ok(Ok(code)) => Ok(code),
            Ok(Err(rejected)) => Err(TenantAuthError::from(rejected).into()),
            Err(e) => Err(e.into()),
        }
    }

    /// Moves to Terminated and releases the port. Calling it again is a
    /// no-op.
    pub async fn terminate(&mut self) {
        let previous = self.mark_terminated();
        self.shared.shutdown.cancel();

        if let Some(mut handle) = self.server.take() {
            if tokio::time::timeout(SHUTDOWN_GRACE, &mut handle)
                .await
                .is_err()
            {
                tracing::warn!("callback listener did not stop in time, aborting it");
                handle.abort();
            }
        }

        if previous != ListenerState::Terminated {
            tracing::debug!("callback listener terminated");
        }
    }

    fn mark_terminated(&self) -> ListenerState {
        let mut lifecycle = self.shared.lifecycle();
        let previous = lifecycle.state;
        lifecycle.state = ListenerState::Terminated;
        lifecycle.completion.take();
        previous
    }
}

impl Drop for CallbackListener {
    fn drop(&mut self) {
        self.mark_terminated();
        self.shared.shutdown.cancel();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
