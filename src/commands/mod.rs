//! Command handlers for the tenantauth CLI
//!
//! Tokens go to stdout only when a command's purpose is to print them;
//! progress and status lines go to stderr.

use std::sync::Arc;

use colored::Colorize;
use tokio_util::sync::CancellationToken;

use crate::auth::browser::system_launcher;
use crate::auth::exchange::HttpTokenExchanger;
use crate::auth::flow::LoginFlow;
use crate::auth::provider::HttpIdentityClient;
use crate::auth::token_cache::TokenRecord;
use crate::cli::OutputFormat;
use crate::config::Config;
use crate::error::{Result, TenantAuthError};

pub mod cache;

/// Builds a [`LoginFlow`] wired to the HTTP provider client, the system
/// browser and the configured cache.
pub fn build_flow(config: &Config) -> Result<LoginFlow> {
    let tenant = config.tenant()?;
    let http = reqwest::Client::builder()
        .timeout(config.request_timeout())
        .build()
        .map_err(|e| TenantAuthError::Network(format!("Failed to build HTTP client: {}", e)))?;

    let provider = HttpIdentityClient::new(http.clone(), config.base_url.clone(), tenant);
    Ok(LoginFlow::new(
        config.token_cache()?,
        Arc::new(provider),
        Arc::new(HttpTokenExchanger::new(http)),
        system_launcher(),
    )
    .with_callback_timeout(config.callback_timeout()))
}

/// Renders the part of `record` selected by `format`.
pub fn render_record(record: &TokenRecord, format: OutputFormat) -> Result<String> {
    Ok(match format {
        OutputFormat::Session => record.session_token.clone(),
        OutputFormat::Refresh => record.refresh_token.clone(),
        OutputFormat::Json => serde_json::to_string_pretty(record)?,
    })
}

/// Cancellation token fired by Ctrl-C.
fn interrupt_token() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            trigger.cancel();
        }
    });
    cancel
}

fn status(message: &str) {
    eprintln!("{}", message.green());
}

pub mod login {
    //! Browser and one-time-code login commands.

    use super::*;
    use crate::auth::provider::SignInChallenge;
    use rustyline::error::ReadlineError;
    use rustyline::DefaultEditor;

    /// Runs the browser login and prints the selected output.
    ///
    /// # Arguments
    ///
    /// * `config` - Effective configuration
    /// * `port` - Callback port override
    /// * `timeout` - Callback timeout override (seconds)
    /// * `output` - What to print on success
    pub async fn login(
        mut config: Config,
        port: Option<u16>,
        timeout: Option<u64>,
        output: OutputFormat,
    ) -> Result<()> {
        if let Some(port) = port {
            config.callback_port = port;
        }
        if let Some(timeout) = timeout {
            config.callback_timeout_seconds = timeout;
        }
        config.validate()?;

        let tenant = config.tenant()?.to_string();
        let flow = build_flow(&config)?.with_cancellation(interrupt_token());

        eprintln!(
            "Logging in to tenant {} (waiting up to {}s for the browser)...",
            tenant.bold(),
            config.callback_timeout_seconds
        );
        let record = flow
            .login(&tenant, &config.base_url, config.callback_port)
            .await?;

        status(&format!("Logged in to tenant {}", tenant));
        println!("{}", render_record(&record, output)?);
        Ok(())
    }

    /// Runs the email one-time-code login, prompting for the code.
    pub async fn login_code(config: Config, email: String, output: OutputFormat) -> Result<()> {
        config.validate()?;
        let tenant = config.tenant()?.to_string();
        let flow = build_flow(&config)?;

        let record = flow.login_with_code(&tenant, &email, prompt_for_code).await?;

        status(&format!("Logged in to tenant {}", tenant));
        println!("{}", render_record(&record, output)?);
        Ok(())
    }

    fn prompt_for_code(challenge: &SignInChallenge) -> Result<String> {
        match &challenge.masked_address {
            Some(address) => eprintln!("A one-time code was sent to {}", address.bold()),
            None => eprintln!("A one-time code was sent"),
        }

        let mut rl = DefaultEditor::new()?;
        match rl.readline("Code: ") {
            Ok(line) => Ok(line),
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => {
                Err(TenantAuthError::Cancelled.into())
            }
            Err(e) => Err(e.into()),
        }
    }
}

pub mod session {
    //! Commands over an existing session.

    use super::*;

    /// Prints the claims of the current session as JSON.
    pub async fn whoami(config: Config) -> Result<()> {
        config.validate()?;
        let tenant = config.tenant()?;
        let session = build_flow(&config)?.current_session(tenant).await?;

        let who = session
            .claims
            .email
            .as_deref()
            .or(session.claims.name.as_deref())
            .unwrap_or(&session.claims.sub);
        status(&format!("Logged in to tenant {} as {}", tenant, who));
        let tenants = session.claims.tenant_ids();
        if !tenants.is_empty() {
            eprintln!("{} {}", "member of:".bold(), tenants.join(", "));
        }
        println!("{}", serde_json::to_string_pretty(&session.claims)?);
        Ok(())
    }

    /// Prints a session token: one exchanged from the configured access
    /// key, or else the cached session after checking it is still valid.
    pub async fn token(config: Config) -> Result<()> {
        config.validate()?;
        let tenant = config.tenant()?;
        let flow = build_flow(&config)?;

        let session_token = match config.access_key() {
            Some(key) => flow.access_key_session(tenant, key).await?.session_token,
            None => flow.current_session(tenant).await?.record.session_token,
        };
        println!("{}", session_token);
        Ok(())
    }

    /// Refreshes the cached session.
    pub async fn refresh(config: Config, output: OutputFormat) -> Result<()> {
        config.validate()?;
        let tenant = config.tenant()?;
        let record = build_flow(&config)?.refresh(tenant).await?;

        status(&format!("Session for tenant {} refreshed", tenant));
        println!("{}", render_record(&record, output)?);
        Ok(())
    }
}
