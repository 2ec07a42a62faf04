//! tenantauth - terminal login for a multi-tenant identity provider
//!
//! This library implements the OAuth 2.0 authorization code flow with PKCE
//! against a loopback redirect listener, plus the session operations a
//! login tool needs around it.
//!
//! # Architecture
//!
//! - `auth`: PKCE, token cache, callback listener, code exchange, browser
//!   launching, provider session API, and the login orchestration
//! - `config`: Configuration management and validation
//! - `error`: Error types and result aliases
//! - `cli`: Command-line interface definition
//! - `commands`: Handlers behind each CLI command
//!
//! # Example
//!
//! ```no_run
//! use tenantauth::cli::Cli;
//! use tenantauth::commands::build_flow;
//! use tenantauth::Config;
//! use clap::Parser;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let cli = Cli::parse_from(["tenantauth", "--tenant", "proj_123", "login"]);
//!     let config = Config::load(None, &cli)?;
//!     config.validate()?;
//!
//!     let flow = build_flow(&config)?;
//!     let record = flow
//!         .login(config.tenant()?, &config.base_url, config.callback_port)
//!         .await?;
//!     println!("{}", record.session_token);
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;

// Re-export commonly used types
pub use auth::flow::LoginFlow;
pub use auth::token_cache::{TokenCache, TokenRecord};
pub use config::Config;
pub use error::{Result, TenantAuthError};
