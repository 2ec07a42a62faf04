//! Command-line interface definition for tenantauth
//!
//! This module defines the CLI structure using clap's derive API.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// tenantauth - log in to a multi-tenant identity provider from the terminal
///
/// Runs the browser-based OAuth login (authorization code with PKCE) or an
/// email one-time-code login, and caches the resulting session per tenant.
#[derive(Parser, Debug, Clone)]
#[command(name = "tenantauth")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (defaults to the platform config directory)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Tenant (project) identifier
    #[arg(short, long, global = true)]
    pub tenant: Option<String>,

    /// Identity provider base URL
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    /// Directory holding cached sessions
    #[arg(long, global = true)]
    pub cache_dir: Option<PathBuf>,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// What a login-style command writes to stdout.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// The session token only
    #[default]
    Session,
    /// The refresh token only
    Refresh,
    /// The whole cached record as JSON
    Json,
}

/// Available commands for tenantauth
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Log in through the system browser
    Login {
        /// Loopback port for the OAuth redirect (0 picks a free port)
        #[arg(short, long)]
        port: Option<u16>,

        /// Seconds to wait for the browser redirect
        #[arg(long)]
        timeout: Option<u64>,

        /// What to print on success
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Session)]
        output: OutputFormat,
    },

    /// Log in with a one-time code sent by email
    LoginCode {
        /// Email address to send the code to
        #[arg(short, long)]
        email: String,

        /// What to print on success
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Session)]
        output: OutputFormat,
    },

    /// Show the claims of the current session
    Whoami,

    /// Print the cached session token if it is still valid
    Token,

    /// Refresh the cached session
    Refresh {
        /// What to print on success
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Session)]
        output: OutputFormat,
    },

    /// Remove the cached session for the tenant
    Logout,

    /// Remove cached sessions
    ClearCache {
        /// Only remove the configured tenant's session
        #[arg(long)]
        tenant_only: bool,
    },

    /// Print the effective configuration
    Config,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
