//! Configuration management for safe apply
//!
//! Stores settings in ~/.config/cosmos/safe_apply.json

use crate::project::ProjectRoot;
use crate::util::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONFIG_DIR: &str = "cosmos";
const CONFIG_FILE: &str = "safe_apply.json";

const ENV_CACHE_DIR: &str = "COSMOS_CACHE_DIR";
const ENV_RETENTION_DAYS: &str = "COSMOS_BACKUP_RETENTION_DAYS";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Where backups are kept. Defaults to `<project>/.cosmos`.
    pub cache_dir: Option<PathBuf>,
    /// Backups older than this are removed by `cleanup`
    pub backup_retention_days: u64,
    /// Files larger than this get a size warning during verification
    pub max_file_size_bytes: u64,
    /// Python lines longer than this get a style warning
    pub max_python_line_length: usize,
    pub io_retry_attempts: u32,
    pub io_retry_backoff_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_dir: None,
            backup_retention_days: 7,
            max_file_size_bytes: 1024 * 1024,
            max_python_line_length: 120,
            io_retry_attempts: 3,
            io_retry_backoff_ms: 50,
        }
    }
}

impl Config {
    /// Get the config directory path
    fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join(CONFIG_DIR))
    }

    /// Get the config file path
    fn config_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join(CONFIG_FILE))
    }

    /// Load config from disk (or defaults), then apply environment overrides
    pub fn load() -> Self {
        let mut config = Self::config_path()
            .map(|path| Self::load_from(&path))
            .unwrap_or_default();
        config.apply_env_overrides();
        config
    }

    /// Load a config file. A missing file gives defaults; a corrupt one is set
    /// aside as `*.json.corrupt` and defaults are used.
    pub fn load_from(path: &Path) -> Self {
        let Ok(content) = fs::read_to_string(path) else {
            return Self::default();
        };
        match serde_json::from_str(&content) {
            Ok(config) => config,
            Err(err) => {
                preserve_corrupt_config(path, &content);
                tracing::warn!(
                    path = %path.display(),
                    error = %err,
                    "config file was corrupted; a backup was saved and defaults were loaded"
                );
                Self::default()
            }
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(dir) = std::env::var(ENV_CACHE_DIR) {
            if !dir.trim().is_empty() {
                self.cache_dir = Some(PathBuf::from(dir));
            }
        }
        if let Ok(days) = std::env::var(ENV_RETENTION_DAYS) {
            match days.trim().parse() {
                Ok(days) => self.backup_retention_days = days,
                Err(_) => tracing::warn!(value = %days, "ignoring invalid {}", ENV_RETENTION_DAYS),
            }
        }
    }

    /// Save config to the standard location, returning where it went
    pub fn save(&self) -> Result<PathBuf, String> {
        let path = Self::config_path()
            .ok_or_else(|| "Could not determine config directory".to_string())?;
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), String> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .map_err(|e| format!("Failed to create config directory: {}", e))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize config: {}", e))?;

        write_config_atomic(path, &content).map_err(|e| format!("Failed to write config: {}", e))
    }

    /// Resolve the cache directory for a project
    pub fn cache_dir(&self, project: &ProjectRoot) -> PathBuf {
        match &self.cache_dir {
            Some(dir) => project.absolute(dir),
            None => project.default_cache_dir(),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.io_retry_attempts.max(1),
            backoff: Duration::from_millis(self.io_retry_backoff_ms),
        }
    }

    /// Get the config file location for display
    pub fn config_location() -> String {
        Self::config_path()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| format!("~/.config/{}/{}", CONFIG_DIR, CONFIG_FILE))
    }
}

fn preserve_corrupt_config(path: &Path, content: &str) {
    let corrupt_path = path.with_extension("json.corrupt");
    if fs::rename(path, &corrupt_path).is_err() {
        let _ = fs::write(&corrupt_path, content);
    }
}

fn write_config_atomic(path: &Path, content: &str) -> std::io::Result<()> {
    let tmp_path = path.with_extension("tmp");
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&tmp_path)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) = file.set_permissions(fs::Permissions::from_mode(0o600)) {
            tracing::warn!(error = %e, "failed to set temp config file permissions");
        }
    }

    file.write_all(content.as_bytes())?;
    drop(file);

    if let Err(err) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(err);
    }
    Ok(())
}
