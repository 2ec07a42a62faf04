//! Cache and configuration commands. None of these contact the identity
//! provider.

use colored::Colorize;

use crate::config::Config;
use crate::error::Result;

/// Removes the cached session for the configured tenant.
pub fn logout(config: &Config) -> Result<()> {
    let tenant = config.tenant()?;
    let cache = config.token_cache()?;

    if cache.clear(tenant)? {
        eprintln!("{}", format!("Logged out of tenant {}", tenant).green());
    } else {
        eprintln!("{}", format!("No cached session for tenant {}", tenant).yellow());
    }
    Ok(())
}

/// Removes cached sessions: every tenant's, or only the configured one.
pub fn clear_cache(config: &Config, tenant_only: bool) -> Result<()> {
    let cache = config.token_cache()?;

    if tenant_only {
        let tenant = config.tenant()?;
        let removed = usize::from(cache.clear(tenant)?);
        eprintln!(
            "{}",
            format!("Removed {} cached session(s) for tenant {}", removed, tenant).green()
        );
    } else {
        let removed = cache.clear_all()?;
        eprintln!(
            "{}",
            format!(
                "Removed {} cached session(s) from {}",
                removed,
                cache.dir().display()
            )
            .green()
        );
    }
    Ok(())
}

/// Prints the effective configuration as YAML, with the access key masked.
pub fn show_config(config: &Config) -> Result<()> {
    print!("{}", serde_yaml::to_string(&config.redacted())?);
    if let Ok(cache) = config.token_cache() {
        eprintln!("{} {}", "cache directory:".bold(), cache.dir().display());
    }
    Ok(())
}
