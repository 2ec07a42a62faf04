//! tenantauth - terminal login for a multi-tenant identity provider
//!
//! Main entry point for the tenantauth binary.

use colored::Colorize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use tenantauth::cli::{Cli, Commands};
use tenantauth::commands;
use tenantauth::config::Config;

#[tokio::main]
async fn main() {
    let cli = Cli::parse_args();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load(cli.config.as_deref(), &cli)?;

    match cli.command {
        Commands::Login {
            port,
            timeout,
            output,
        } => {
            tracing::debug!("Starting browser login");
            commands::login::login(config, port, timeout, output).await
        }
        Commands::LoginCode { email, output } => {
            tracing::debug!("Starting one-time code login");
            commands::login::login_code(config, email, output).await
        }
        Commands::Whoami => commands::session::whoami(config).await,
        Commands::Token => commands::session::token(config).await,
        Commands::Refresh { output } => commands::session::refresh(config, output).await,
        Commands::Logout => commands::cache::logout(&config),
        Commands::ClearCache { tenant_only } => commands::cache::clear_cache(&config, tenant_only),
        Commands::Config => commands::cache::show_config(&config),
    }
}

/// Initialize tracing subscriber with environment filter, writing to stderr
fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "tenantauth=debug"
    } else {
        "tenantauth=info"
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
