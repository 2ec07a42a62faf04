//! System browser launching
//!
//! Opening a URL is platform specific. Each platform gets one
//! [`BrowserLauncher`] implementation and [`system_launcher`] picks the
//! right one at startup, so the login flow itself has no platform
//! conditionals.

use std::process::{Command, Stdio};
use std::sync::Arc;

use crate::error::{Result, TenantAuthError};

/// Capability to show a URL to the user in a browser.
pub trait BrowserLauncher: Send + Sync {
    /// Opens `url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the launcher could not be started. Callers treat
    /// this as non-fatal.
    fn open(&self, url: &str) -> Result<()>;
}

/// Uses `open` (macOS).
#[derive(Debug, Default, Clone, Copy)]
pub struct MacOsLauncher;

/// Uses `cmd /C start` (Windows).
#[derive(Debug, Default, Clone, Copy)]
pub struct WindowsLauncher;

/// Uses `xdg-open` (Linux and other Unix desktops).
#[derive(Debug, Default, Clone, Copy)]
pub struct XdgLauncher;

impl BrowserLauncher for MacOsLauncher {
    fn open(&self, url: &str) -> Result<()> {
        spawn_detached("open", &[url])
    }
}

impl BrowserLauncher for WindowsLauncher {
    fn open(&self, url: &str) -> Result<()> {
        // The empty string is the window title `start` expects before the target.
        spawn_detached("cmd", &["/C", "start", "", url])
    }
}

impl BrowserLauncher for XdgLauncher {
    fn open(&self, url: &str) -> Result<()> {
        spawn_detached("xdg-open", &[url])
    }
}

/// Returns the launcher for the platform this binary was built for.
pub fn system_launcher() -> Arc<dyn BrowserLauncher> {
    if cfg!(target_os = "macos") {
        Arc::new(MacOsLauncher)
    } else if cfg!(target_os = "windows") {
        Arc::new(WindowsLauncher)
    } else {
        Arc::new(XdgLauncher)
    }
}

/// Spawns `program` with `args` and does not wait for it. The URL is passed
/// as a single argument, never through a shell string.
fn spawn_detached(program: &str, args: &[&str]) -> Result<()> {
    Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| TenantAuthError::Io(std::io::Error::new(e.kind(), format!("{program}: {e}"))))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spawn_missing_program_is_error() {
        let err = spawn_detached("definitely-not-a-browser-tenantauth", &["http://x"]).unwrap_err();
        assert!(err.to_string().contains("definitely-not-a-browser-tenantauth"));
    }

    #[test]
    fn test_system_launcher_is_available() {
        // Only checks selection; opening a real browser is not exercised.
        let _launcher: Arc<dyn BrowserLauncher> = system_launcher();
    }
}
