//! Per-tenant token persistence on the local filesystem
//!
//! Each tenant's [`TokenRecord`] is stored as JSON in
//! `<cache_dir>/<tenant_id>.json`. Writes go to a temporary sibling file
//! that is renamed over the target, so a concurrent reader sees either the
//! old record or the new one, never a partial file.
//!
//! Reads fail soft: a missing, unreadable or corrupt file is reported as
//! "no record" so that a broken cache can never block a fresh login.

use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TenantAuthError};

/// Extension used for record files.
const RECORD_EXTENSION: &str = "json";

/// File permissions for record files (Unix only): owner read/write.
#[cfg(unix)]
const FILE_MODE: u32 = 0o600;

/// Directory permissions (Unix only): owner read/write/execute.
#[cfg(unix)]
const DIR_MODE: u32 = 0o700;

/// Distinguishes temporary files of concurrent saves within one process.
static TEMP_SEQUENCE: AtomicU64 = AtomicU64::new(0);

// ---------------------------------------------------------------------------
// TokenRecord
// ---------------------------------------------------------------------------

/// Structured error detail reported by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDetail {
    /// Provider error code, e.g. `"E061103"` or `"invalid_grant"`.
    pub error_code: String,

    /// Human-readable description, when the provider sent one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

/// Credentials obtained from one successful login, exchange or refresh.
///
/// The JSON form uses camelCase keys (`sessionToken`, `refreshToken`).
/// Unknown keys are ignored on read so newer writers stay compatible.
///
/// # Examples
///
/// ```
/// use tenantauth::auth::token_cache::TokenRecord;
///
/// let record = TokenRecord::success("sess", "ref");
/// let json = serde_json::to_string(&record).unwrap();
/// assert!(json.contains("\"sessionToken\":\"sess\""));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenRecord {
    /// Whether the operation that produced this record succeeded.
    pub ok: bool,

    /// HTTP-style status code of that operation.
    pub code: u16,

    /// Short-lived session (access) token.
    #[serde(default)]
    pub session_token: String,

    /// Long-lived refresh token. Empty when the provider did not issue one.
    #[serde(default)]
    pub refresh_token: String,

    /// Provider error, present only on failed records.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,
}

impl TokenRecord {
    /// Builds a successful record with status 200.
    pub fn success(session_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            ok: true,
            code: 200,
            session_token: session_token.into(),
            refresh_token: refresh_token.into(),
            error: None,
        }
    }

    /// Returns `true` when a refresh token is available.
    pub fn has_refresh_token(&self) -> bool {
        !self.refresh_token.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tenant identifiers
// ---------------------------------------------------------------------------

/// Checks that a tenant identifier can safely name a file in the cache
/// directory.
///
/// Allowed: ASCII alphanumerics plus `-`, `_` and `.`, not starting with a
/// dot. This rules out path separators and `..`.
///
/// # Errors
///
/// Returns [`TenantAuthError::Configuration`] when the identifier is empty
/// or contains other characters.
///
/// # Examples
///
/// ```
/// use tenantauth::auth::token_cache::validate_tenant_id;
///
/// assert!(validate_tenant_id("proj_123").is_ok());
/// assert!(validate_tenant_id("../etc").is_err());
/// ```
pub fn validate_tenant_id(tenant_id: &str) -> Result<()> {
    if tenant_id.is_empty() {
        return Err(TenantAuthError::Configuration("tenant id cannot be empty".to_string()).into());
    }

    let valid_chars = tenant_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.');

    if !valid_chars || tenant_id.starts_with('.') {
        return Err(TenantAuthError::Configuration(format!(
            "invalid tenant id '{}': only letters, digits, '-', '_' and '.' are allowed",
            tenant_id
        ))
        .into());
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// TokenCache
// ---------------------------------------------------------------------------

/// Directory-backed store of one [`TokenRecord`] per tenant.
///
/// # Examples
///
/// ```
/// use tenantauth::auth::token_cache::{TokenCache, TokenRecord};
///
/// let dir = tempfile::tempdir().unwrap();
/// let cache = TokenCache::new(dir.path());
///
/// cache.save("proj_1", &TokenRecord::success("s", "r")).unwrap();
/// assert_eq!(cache.load("proj_1").unwrap().session_token, "s");
/// assert!(cache.clear("proj_1").unwrap());
/// assert!(cache.load("proj_1").is_none());
/// ```
#[derive(Debug, Clone)]
pub struct TokenCache {
    dir: PathBuf,
}

impl TokenCache {
    /// Creates a cache rooted at `dir`. The directory is created lazily on
    /// the first [`save`](Self::save).
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Creates a cache in the platform configuration directory
    /// (`~/.config/tenantauth` on Linux).
    ///
    /// # Errors
    ///
    /// Returns [`TenantAuthError::Configuration`] if no home directory can
    /// be determined.
    pub fn default_location() -> Result<Self> {
        let proj_dirs = ProjectDirs::from("dev", "tenantauth", "tenantauth").ok_or_else(|| {
            TenantAuthError::Configuration("Could not determine config directory".to_string())
        })?;
        Ok(Self::new(proj_dirs.config_dir()))
    }

    /// Directory holding the record files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the record file for `tenant_id`.
    ///
    /// # Errors
    ///
    /// Returns [`TenantAuthError::Configuration`] if the identifier is not
    /// a safe file name.
    pub fn record_path(&self, tenant_id: &str) -> Result<PathBuf> {
        validate_tenant_id(tenant_id)?;
        Ok(self
            .dir
            .join(format!("{}.{}", tenant_id, RECORD_EXTENSION)))
    }

    /// Loads the cached record for `tenant_id`.
    ///
    /// Never fails: any problem is logged at debug level and reported as
    /// `None`.
    pub fn load(&self, tenant_id: &str) -> Option<TokenRecord> {
        match self.try_load(tenant_id) {
            Ok(record) => record,
            Err(e) => {
                tracing::debug!(tenant = tenant_id, "treating cache entry as missing: {}", e);
                None
            }
        }
    }

    fn try_load(&self, tenant_id: &str) -> Result<Option<TokenRecord>> {
        let path = self.record_path(tenant_id)?;
        let contents = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(TenantAuthError::CacheRead(format!(
                    "failed to read '{}': {}",
                    path.display(),
                    e
                ))
                .into())
            }
        };

        let record: TokenRecord = serde_json::from_str(&contents).map_err(|e| {
            TenantAuthError::CacheRead(format!("failed to parse '{}': {}", path.display(), e))
        })?;

        Ok(Some(record))
    }

    /// Persists `record` for `tenant_id`, replacing any previous record.
    ///
    /// Returns the record that was written so callers can chain on it.
    ///
    /// # Errors
    ///
    /// Returns [`TenantAuthError::CacheWrite`] if the directory cannot be
    /// created or the file cannot be written or renamed, and
    /// [`TenantAuthError::Configuration`] for an unusable tenant id.
    pub fn save(&self, tenant_id: &str, record: &TokenRecord) -> Result<TokenRecord> {
        let path = self.record_path(tenant_id)?;
        self.ensure_dir()?;

        let contents = serde_json::to_string_pretty(record)?;
        let temp_path = self.dir.join(format!(
            ".{}.{}.{}.tmp",
            tenant_id,
            std::process::id(),
            TEMP_SEQUENCE.fetch_add(1, Ordering::Relaxed)
        ));

        if let Err(e) = write_private_file(&temp_path, contents.as_bytes()) {
            let _ = fs::remove_file(&temp_path);
            return Err(TenantAuthError::CacheWrite(format!(
                "failed to write '{}': {}",
                temp_path.display(),
                e
            ))
            .into());
        }

        if let Err(e) = fs::rename(&temp_path, &path) {
            let _ = fs::remove_file(&temp_path);
            return Err(TenantAuthError::CacheWrite(format!(
                "failed to rename '{}' to '{}': {}",
                temp_path.display(),
                path.display(),
                e
            ))
            .into());
        }

        tracing::debug!(tenant = tenant_id, path = %path.display(), "saved token record");
        Ok(record.clone())
    }

    /// Removes the record for `tenant_id`.
    ///
    /// Returns `true` if a record existed and was removed.
    ///
    /// # Errors
    ///
    /// Returns [`TenantAuthError::Io`] if the file exists but cannot be
    /// removed.
    pub fn clear(&self, tenant_id: &str) -> Result<bool> {
        let path = self.record_path(tenant_id)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(TenantAuthError::Io(e).into()),
        }
    }

    /// Removes every record in the cache directory.
    ///
    /// Returns the number of records removed. A missing directory counts as
    /// an empty cache.
    ///
    /// # Errors
    ///
    /// Returns [`TenantAuthError::Io`] if the directory cannot be listed or
    /// a record cannot be removed.
    pub fn clear_all(&self) -> Result<usize> {
        let mut removed = 0;
        for tenant_id in self.list()? {
            if self.clear(&tenant_id)? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Lists the tenant identifiers that currently have a record, sorted.
    ///
    /// # Errors
    ///
    /// Returns [`TenantAuthError::Io`] if the directory exists but cannot be
    /// read.
    pub fn list(&self) -> Result<Vec<String>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(TenantAuthError::Io(e).into()),
        };

        let mut tenants = Vec::new();
        for entry in entries {
            let path = entry.map_err(TenantAuthError::Io)?.path();
            if !path.is_file() {
                continue;
            }
            if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if validate_tenant_id(stem).is_ok() {
                    tenants.push(stem.to_string());
                }
            }
        }
        tenants.sort();
        Ok(tenants)
    }

    fn ensure_dir(&self) -> Result<()> {
        if self.dir.is_dir() {
            return Ok(());
        }

        fs::create_dir_all(&self.dir).map_err(|e| {
            TenantAuthError::CacheWrite(format!(
                "failed to create directory '{}': {}",
                self.dir.display(),
                e
            ))
        })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.dir, fs::Permissions::from_mode(DIR_MODE)).map_err(|e| {
                TenantAuthError::CacheWrite(format!(
                    "failed to set permissions on '{}': {}",
                    self.dir.display(),
                    e
                ))
            })?;
        }

        Ok(())
    }
}

/// Creates (or truncates) `path` with owner-only permissions and writes
/// `contents` to it.
fn write_private_file(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);

    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(FILE_MODE);
    }

    let mut file = options.open(path)?;
    file.write_all(contents)?;
    file.sync_all()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
