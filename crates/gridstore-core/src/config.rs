//! Configuration management for gridstore
//!
//! Loads configuration with priority:
//! 1. Specified config file (or `gridstore.toml` found in the current directory or a parent)
//! 2. Environment variables (`GRIDSTORE_*`, `.env` honoured)
//! 3. Defaults

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use uuid::Uuid;

const CONFIG_FILE_NAME: &str = "gridstore.toml";

/// gridstore configuration, built once and shared by reference
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Sandbox this process writes into
    #[serde(default = "default_sandbox_id")]
    pub sandbox_id: String,

    /// Largest payload accepted by a single write
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: u64,

    /// Default deadline for each back-end round trip, in milliseconds
    #[serde(default = "default_operation_timeout_ms")]
    pub operation_timeout_ms: u64,

    /// TTL applied by the legacy `store` call, in seconds
    #[serde(default = "default_ttl_secs")]
    pub default_ttl_secs: u64,

    /// How long sweep leaves superseded objects of a recently written
    /// namespace alone, in milliseconds. Lock-free reads that loaded the
    /// previous record are still fetching them.
    #[serde(default = "default_sweep_grace_ms")]
    pub sweep_grace_ms: u64,

    #[serde(default)]
    pub presign: PresignConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub cache: CacheConfig,
}

/// Presigned URL lifetimes, in seconds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresignConfig {
    #[serde(default = "default_presign_short")]
    pub short_secs: u64,
    #[serde(default = "default_presign_medium")]
    pub medium_secs: u64,
    #[serde(default = "default_presign_long")]
    pub long_secs: u64,
}

/// Storage back-end selection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// "memory" or "filesystem"
    #[serde(default = "default_storage_provider")]
    pub provider: String,

    /// Root directory for the filesystem provider (can reference env var with ${VAR_NAME})
    pub root: Option<String>,
}

/// Metadata cache back-end selection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_provider")]
    pub provider: String,
}

impl Default for PresignConfig {
    fn default() -> Self {
        Self {
            short_secs: default_presign_short(),
            medium_secs: default_presign_medium(),
            long_secs: default_presign_long(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            provider: default_storage_provider(),
            root: None,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            provider: default_cache_provider(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            sandbox_id: default_sandbox_id(),
            max_payload_bytes: default_max_payload_bytes(),
            operation_timeout_ms: default_operation_timeout_ms(),
            default_ttl_secs: default_ttl_secs(),
            sweep_grace_ms: default_sweep_grace_ms(),
            presign: PresignConfig::default(),
            storage: StorageConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

impl StoreConfig {
    /// Load configuration from `gridstore.toml` if one exists, otherwise from
    /// the environment
    pub fn load() -> Result<Self> {
        match Self::find_config_file() {
            Some(path) => Self::load_from(&path),
            None => Self::from_env(),
        }
    }

    /// Load configuration from a specific file
    pub fn load_from(path: &Path) -> Result<Self> {
        tracing::debug!("Loading configuration from: {:?}", path);

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let mut config: StoreConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        config.resolve_env_vars();
        config.apply_env_overrides()?;
        config.validate()?;

        Ok(config)
    }

    /// Defaults overridden by `GRIDSTORE_*` environment variables
    pub fn from_env() -> Result<Self> {
        // A missing .env file is fine
        let _ = dotenvy::dotenv();

        let mut config = Self::default();
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Create test-friendly defaults: fixed sandbox, in-memory back-ends, short deadline
    pub fn test_defaults() -> Self {
        Self {
            sandbox_id: "test-sandbox".to_string(),
            max_payload_bytes: 1024 * 1024,
            operation_timeout_ms: 5_000,
            sweep_grace_ms: 0,
            ..Self::default()
        }
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }

    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }

    pub fn sweep_grace(&self) -> Duration {
        Duration::from_millis(self.sweep_grace_ms)
    }

    /// Reject values the coordinator cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.sandbox_id.is_empty()
            || self.sandbox_id.contains('/')
            || self.sandbox_id == "."
            || self.sandbox_id == ".."
        {
            return Err(anyhow!(
                "sandbox_id must be non-empty and must not contain '/': {:?}",
                self.sandbox_id
            ));
        }
        if self.max_payload_bytes == 0 {
            return Err(anyhow!("max_payload_bytes must be greater than zero"));
        }
        if self.operation_timeout_ms == 0 {
            return Err(anyhow!("operation_timeout_ms must be greater than zero"));
        }
        match self.storage.provider.as_str() {
            "memory" => {}
            "filesystem" if self.storage.root.is_some() => {}
            "filesystem" => {
                return Err(anyhow!("storage.root is required for the filesystem provider"));
            }
            other => return Err(anyhow!("unknown storage provider '{}'", other)),
        }
        if self.cache.provider != "memory" {
            return Err(anyhow!("unknown cache provider '{}'", self.cache.provider));
        }
        Ok(())
    }

    /// Find gridstore.toml by searching current directory and parents
    fn find_config_file() -> Option<PathBuf> {
        let mut current = env::current_dir().ok()?;

        loop {
            let config_path = current.join(CONFIG_FILE_NAME);
            if config_path.exists() {
                return Some(config_path);
            }

            if !current.pop() {
                return None;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(sandbox_id) = env::var("GRIDSTORE_SANDBOX_ID") {
            self.sandbox_id = sandbox_id;
        }
        if let Ok(provider) = env::var("GRIDSTORE_STORAGE_PROVIDER") {
            self.storage.provider = provider;
        }
        if let Ok(root) = env::var("GRIDSTORE_FS_ROOT") {
            self.storage.root = Some(root);
        }
        if let Ok(max) = env::var("GRIDSTORE_MAX_PAYLOAD_BYTES") {
            self.max_payload_bytes = max
                .parse()
                .with_context(|| format!("Invalid GRIDSTORE_MAX_PAYLOAD_BYTES: {:?}", max))?;
        }
        if let Ok(timeout) = env::var("GRIDSTORE_OPERATION_TIMEOUT_MS") {
            self.operation_timeout_ms = timeout
                .parse()
                .with_context(|| format!("Invalid GRIDSTORE_OPERATION_TIMEOUT_MS: {:?}", timeout))?;
        }
        if let Ok(grace) = env::var("GRIDSTORE_SWEEP_GRACE_MS") {
            self.sweep_grace_ms = grace
                .parse()
                .with_context(|| format!("Invalid GRIDSTORE_SWEEP_GRACE_MS: {:?}", grace))?;
        }
        Ok(())
    }

    /// Resolve ${VAR_NAME} references to environment variables
    fn resolve_env_vars(&mut self) {
        if let Some(resolved) = Self::resolve_env_var(&self.sandbox_id) {
            self.sandbox_id = resolved;
        }
        if let Some(ref root) = self.storage.root {
            self.storage.root = Self::resolve_env_var(root);
        }
    }

    /// Resolve a single ${VAR_NAME} reference
    fn resolve_env_var(value: &str) -> Option<String> {
        if value.starts_with("${") && value.ends_with('}') {
            let var_name = &value[2..value.len() - 1];
            env::var(var_name).ok()
        } else {
            Some(value.to_string())
        }
    }
}

fn default_sandbox_id() -> String {
    format!("sandbox-{}", &Uuid::new_v4().simple().to_string()[..8])
}

fn default_max_payload_bytes() -> u64 {
    64 * 1024 * 1024
}

fn default_operation_timeout_ms() -> u64 {
    30_000
}

fn default_ttl_secs() -> u64 {
    900
}

fn default_sweep_grace_ms() -> u64 {
    2 * default_operation_timeout_ms()
}

fn default_presign_short() -> u64 {
    15 * 60
}

fn default_presign_medium() -> u64 {
    60 * 60
}

fn default_presign_long() -> u64 {
    24 * 60 * 60
}

fn default_storage_provider() -> String {
    "memory".to_string()
}

fn default_cache_provider() -> String {
    "memory".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = StoreConfig::test_defaults();
        assert_eq!(config.sandbox_id, "test-sandbox");
        assert_eq!(config.storage.provider, "memory");
        assert_eq!(config.presign.short_secs, 900);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_generated_sandbox_id() {
        let config = StoreConfig::default();
        assert!(config.sandbox_id.starts_with("sandbox-"));
        assert_eq!(config.sandbox_id.len(), "sandbox-".len() + 8);
    }

    #[test]
    fn test_resolve_env_var() {
        unsafe {
            env::set_var("GRIDSTORE_TEST_ROOT", "/tmp/grid");
        }

        let resolved = StoreConfig::resolve_env_var("${GRIDSTORE_TEST_ROOT}");
        assert_eq!(resolved, Some("/tmp/grid".to_string()));

        let not_var = StoreConfig::resolve_env_var("plain_value");
        assert_eq!(not_var, Some("plain_value".to_string()));

        unsafe {
            env::remove_var("GRIDSTORE_TEST_ROOT");
        }
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
sandbox_id = "file-sandbox"
max_payload_bytes = 2048

[presign]
short_secs = 60

[storage]
provider = "filesystem"
root = "/var/lib/gridstore"
"#
        )
        .unwrap();

        let config = StoreConfig::load_from(file.path()).unwrap();
        assert_eq!(config.max_payload_bytes, 2048);
        assert_eq!(config.presign.short_secs, 60);
        assert_eq!(config.presign.long_secs, 86_400);
        assert_eq!(config.sweep_grace(), Duration::from_secs(60));
        assert_eq!(config.storage.root.as_deref(), Some("/var/lib/gridstore"));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = StoreConfig::test_defaults();
        config.sandbox_id = "a/b".to_string();
        assert!(config.validate().is_err());

        let mut config = StoreConfig::test_defaults();
        config.storage.provider = "filesystem".to_string();
        assert!(config.validate().is_err());

        let mut config = StoreConfig::test_defaults();
        config.operation_timeout_ms = 0;
        assert!(config.validate().is_err());

        let mut config = StoreConfig::test_defaults();
        config.sandbox_id = "..".to_string();
        assert!(config.validate().is_err());
    }
}
