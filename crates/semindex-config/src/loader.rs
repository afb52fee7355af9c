//! Configuration loader with layered inheritance.
//!
//! Loads configuration from multiple sources and merges them:
//! 1. Built-in defaults
//! 2. Global config: `~/.semindex/config.toml`
//! 3. Local config: `.semindex/config.toml` (in the workspace)
//! 4. `SEMINDEX_*` environment variables
//! 5. Programmatic overrides
//!
//! Later sources override earlier ones, field by field.

use crate::error::ConfigError;
use crate::{ConfigOverrides, SemindexConfig};
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

const CONFIG_FILE_NAME: &str = "config.toml";
const GLOBAL_CONFIG_DIR: &str = ".semindex";
const LOCAL_CONFIG_DIR: &str = ".semindex";
const ENV_PREFIX: &str = "SEMINDEX_";

/// Configuration loader with caching of the global config file.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    global_config_dir: Option<PathBuf>,
    global_config: Option<ConfigOverrides>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Creates a loader, detecting the global config directory (`~/.semindex`).
    pub fn new() -> Self {
        let global_config_dir = dirs::home_dir().map(|h| h.join(GLOBAL_CONFIG_DIR));
        Self { global_config_dir, global_config: None }
    }

    /// Creates a loader with a custom global config directory, for tests.
    pub fn with_global_dir(global_dir: impl Into<PathBuf>) -> Self {
        Self { global_config_dir: Some(global_dir.into()), global_config: None }
    }

    pub fn global_config_path(&self) -> Option<PathBuf> {
        self.global_config_dir.as_ref().map(|d| d.join(CONFIG_FILE_NAME))
    }

    pub fn local_config_path(&self, workspace_root: &Path) -> PathBuf {
        workspace_root.join(LOCAL_CONFIG_DIR).join(CONFIG_FILE_NAME)
    }

    /// Loads configuration for a workspace, merging defaults, global file,
    /// local file, `SEMINDEX_*` env vars, and optional programmatic
    /// overrides, in that order of increasing precedence.
    pub fn load(
        &mut self,
        workspace_root: &Path,
        overrides: Option<&ConfigOverrides>,
    ) -> Result<SemindexConfig, ConfigError> {
        let mut config = SemindexConfig::default();

        if let Some(global) = self.load_global()? {
            config = global.apply(config);
        }

        if let Some(local) = self.load_local(workspace_root)? {
            config = local.apply(config);
        }

        let env_overrides = load_env_overrides()?;
        config = env_overrides.apply(config);

        if let Some(ovr) = overrides {
            config = ovr.apply(config);
        }

        config.validate()?;
        Ok(config)
    }

    /// Loads only the global configuration layer.
    pub fn load_global(&mut self) -> Result<Option<ConfigOverrides>, ConfigError> {
        if let Some(ref cached) = self.global_config {
            return Ok(Some(cached.clone()));
        }

        let Some(global_path) = self.global_config_path() else {
            debug!("no home directory found, skipping global config");
            return Ok(None);
        };

        if !global_path.exists() {
            trace!(path = ?global_path, "global config not found");
            return Ok(None);
        }

        debug!(path = ?global_path, "loading global config");
        let overrides = load_config_file(&global_path)?;
        self.global_config = Some(overrides.clone());
        Ok(Some(overrides))
    }

    /// Loads only the local configuration layer for a workspace.
    pub fn load_local(&self, workspace_root: &Path) -> Result<Option<ConfigOverrides>, ConfigError> {
        let local_path = self.local_config_path(workspace_root);

        if !local_path.exists() {
            trace!(path = ?local_path, "local config not found");
            return Ok(None);
        }

        debug!(path = ?local_path, "loading local config");
        load_config_file(&local_path).map(Some)
    }

    /// Writes `overrides` to the global config file.
    pub fn save_global(&self, overrides: &ConfigOverrides) -> Result<(), ConfigError> {
        let Some(ref global_dir) = self.global_config_dir else {
            return Err(ConfigError::NoHomeDir);
        };
        save_config_file(&global_dir.join(CONFIG_FILE_NAME), overrides)
    }

    /// Writes `overrides` to the local config file for a workspace.
    pub fn save_local(
        &self,
        workspace_root: &Path,
        overrides: &ConfigOverrides,
    ) -> Result<(), ConfigError> {
        save_config_file(&self.local_config_path(workspace_root), overrides)
    }

    /// Creates `~/.semindex/config.toml` with empty overrides, if missing.
    pub fn init_global(&self) -> Result<PathBuf, ConfigError> {
        let Some(ref global_dir) = self.global_config_dir else {
            return Err(ConfigError::NoHomeDir);
        };

        if !global_dir.exists() {
            std::fs::create_dir_all(global_dir).map_err(|e| ConfigError::create_dir(global_dir, e))?;
        }

        let config_path = global_dir.join(CONFIG_FILE_NAME);
        if !config_path.exists() {
            save_config_file(&config_path, &ConfigOverrides::default())?;
        }
        Ok(config_path)
    }

    /// Creates `.semindex/config.toml` with empty overrides, if missing.
    pub fn init_local(&self, workspace_root: &Path) -> Result<PathBuf, ConfigError> {
        let local_dir = workspace_root.join(LOCAL_CONFIG_DIR);

        if !local_dir.exists() {
            std::fs::create_dir_all(&local_dir).map_err(|e| ConfigError::create_dir(&local_dir, e))?;
        }

        let config_path = local_dir.join(CONFIG_FILE_NAME);
        if !config_path.exists() {
            save_config_file(&config_path, &ConfigOverrides::default())?;
        }
        Ok(config_path)
    }

    /// Forces the next `load_global()` call to re-read from disk.
    pub fn clear_cache(&mut self) {
        self.global_config = None;
    }
}

fn load_config_file(path: &Path) -> Result<ConfigOverrides, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;
    toml::from_str(&content).map_err(|e| ConfigError::parse_toml(path, e))
}

fn save_config_file(path: &Path, overrides: &ConfigOverrides) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::create_dir(parent, e))?;
        }
    }
    let content = toml::to_string_pretty(overrides)?;
    std::fs::write(path, content).map_err(|e| ConfigError::write_file(path, e))
}

/// Keys recognized under the `SEMINDEX_` prefix. Anything else is rejected.
const KNOWN_ENV_KEYS: &[&str] = &[
    "MODEL_LLM_PROVIDER_TYPE",
    "MODEL_LLM_MODEL_NAME",
    "MODEL_API_KEY",
    "MODEL_BASE_URL",
    "MODEL_TIMEOUT_SECS",
    "EMBEDDING_PROVIDER_TYPE",
    "EMBEDDING_MODEL_NAME",
    "EMBEDDING_API_KEY",
    "EMBEDDING_BASE_URL",
    "EMBEDDING_BATCH_SIZE",
    "EMBEDDING_TIMEOUT_SECS",
    "STORAGE_STORAGE_BACKEND",
    "STORAGE_VECTOR_BACKEND",
    "STORAGE_BASE_PATH",
    "STORAGE_CACHE_ENABLED",
    "STORAGE_CACHE_SIZE",
    "STORAGE_AUTO_BACKUP",
    "STORAGE_BACKUP_INTERVAL_SECS",
    "LOG_LEVEL",
];

/// Reads `SEMINDEX_*` environment variables into a [`ConfigOverrides`].
/// Any `SEMINDEX_`-prefixed var not in the known-key list is an error.
fn load_env_overrides() -> Result<ConfigOverrides, ConfigError> {
    let mut overrides = ConfigOverrides::default();

    for (key, value) in std::env::vars() {
        let Some(suffix) = key.strip_prefix(ENV_PREFIX) else { continue };
        if !KNOWN_ENV_KEYS.contains(&suffix) {
            return Err(ConfigError::UnknownKey(key));
        }
        apply_env_var(&mut overrides, suffix, &value)?;
    }

    Ok(overrides)
}

fn apply_env_var(overrides: &mut ConfigOverrides, key: &str, value: &str) -> Result<(), ConfigError> {
    use std::str::FromStr;

    match key {
        "MODEL_LLM_PROVIDER_TYPE" => overrides.model.llm_provider_type = Some(value.to_string()),
        "MODEL_LLM_MODEL_NAME" => overrides.model.llm_model_name = Some(value.to_string()),
        "MODEL_API_KEY" => overrides.model.api_key = Some(value.to_string()),
        "MODEL_BASE_URL" => overrides.model.base_url = Some(value.to_string()),
        "MODEL_TIMEOUT_SECS" => overrides.model.timeout_secs = Some(parse_env(key, value)?),
        "EMBEDDING_PROVIDER_TYPE" => overrides.embedding.provider_type = Some(value.to_string()),
        "EMBEDDING_MODEL_NAME" => overrides.embedding.model_name = Some(value.to_string()),
        "EMBEDDING_API_KEY" => overrides.embedding.api_key = Some(value.to_string()),
        "EMBEDDING_BASE_URL" => overrides.embedding.base_url = Some(value.to_string()),
        "EMBEDDING_BATCH_SIZE" => overrides.embedding.batch_size = Some(parse_env(key, value)?),
        "EMBEDDING_TIMEOUT_SECS" => overrides.embedding.timeout_secs = Some(parse_env(key, value)?),
        "STORAGE_STORAGE_BACKEND" => {
            overrides.storage.storage_backend = Some(
                crate::StorageBackend::from_str(value)
                    .map_err(|_| ConfigError::invalid_value("storage.storage_backend", value))?,
            )
        }
        "STORAGE_VECTOR_BACKEND" => {
            overrides.storage.vector_backend = Some(
                crate::VectorBackend::from_str(value)
                    .map_err(|_| ConfigError::invalid_value("storage.vector_backend", value))?,
            )
        }
        "STORAGE_BASE_PATH" => overrides.storage.base_path = Some(PathBuf::from(value)),
        "STORAGE_CACHE_ENABLED" => overrides.storage.cache_enabled = Some(parse_env(key, value)?),
        "STORAGE_CACHE_SIZE" => overrides.storage.cache_size = Some(parse_env(key, value)?),
        "STORAGE_AUTO_BACKUP" => overrides.storage.auto_backup = Some(parse_env(key, value)?),
        "STORAGE_BACKUP_INTERVAL_SECS" => {
            overrides.storage.backup_interval_secs = Some(parse_env(key, value)?)
        }
        "LOG_LEVEL" => overrides.log_level = Some(value.to_string()),
        other => return Err(ConfigError::UnknownKey(other.to_string())),
    }
    Ok(())
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .parse()
        .map_err(|_| ConfigError::invalid_value(format!("env:{ENV_PREFIX}{key}"), format!("cannot parse '{value}'")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::VectorBackend;
    use std::sync::Mutex;
    use tempfile::tempdir;

    // SEMINDEX_* env vars are process-global; serialize tests that touch them.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn load_with_no_files_returns_defaults() {
        let dir = tempdir().unwrap();
        let mut loader = ConfigLoader::with_global_dir(dir.path().join("global"));
        let config = loader.load(dir.path(), None).unwrap();
        assert_eq!(config, SemindexConfig::default());
    }

    #[test]
    fn local_config_overrides_global() {
        let dir = tempdir().unwrap();
        let mut loader = ConfigLoader::with_global_dir(dir.path().join("global"));

        let mut global = ConfigOverrides::default();
        global.log_level = Some("warn".to_string());
        loader.save_global(&global).unwrap();

        let mut local = ConfigOverrides::default();
        local.log_level = Some("debug".to_string());
        loader.save_local(dir.path(), &local).unwrap();

        let config = loader.load(dir.path(), None).unwrap();
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn programmatic_overrides_win_over_everything() {
        let dir = tempdir().unwrap();
        let mut loader = ConfigLoader::with_global_dir(dir.path().join("global"));

        let mut local = ConfigOverrides::default();
        local.log_level = Some("debug".to_string());
        loader.save_local(dir.path(), &local).unwrap();

        let mut program = ConfigOverrides::default();
        program.log_level = Some("trace".to_string());

        let config = loader.load(dir.path(), Some(&program)).unwrap();
        assert_eq!(config.log_level, "trace");
    }

    #[test]
    fn env_var_overrides_vector_backend() {
        let _guard = ENV_LOCK.lock().unwrap();
        let dir = tempdir().unwrap();
        let mut loader = ConfigLoader::with_global_dir(dir.path().join("global"));

        std::env::set_var("SEMINDEX_STORAGE_VECTOR_BACKEND", "ann-a");
        let result = loader.load(dir.path(), None);
        std::env::remove_var("SEMINDEX_STORAGE_VECTOR_BACKEND");

        let config = result.unwrap();
        assert_eq!(config.storage.vector_backend, VectorBackend::AnnA);
    }

    #[test]
    fn unknown_env_key_is_rejected() {
        let _guard = ENV_LOCK.lock().unwrap();
        let dir = tempdir().unwrap();
        let mut loader = ConfigLoader::with_global_dir(dir.path().join("global"));

        std::env::set_var("SEMINDEX_NOT_A_REAL_KEY", "x");
        let result = loader.load(dir.path(), None);
        std::env::remove_var("SEMINDEX_NOT_A_REAL_KEY");

        assert!(matches!(result, Err(ConfigError::UnknownKey(_))));
    }

    #[test]
    fn init_local_writes_empty_overrides_file() {
        let dir = tempdir().unwrap();
        let loader = ConfigLoader::with_global_dir(dir.path().join("global"));
        let path = loader.init_local(dir.path()).unwrap();
        assert!(path.exists());

        let config = ConfigLoader::with_global_dir(dir.path().join("global"))
            .load_local(dir.path())
            .unwrap();
        assert_eq!(config, Some(ConfigOverrides::default()));
    }

    #[test]
    fn global_config_is_cached_until_cleared() {
        let dir = tempdir().unwrap();
        let mut loader = ConfigLoader::with_global_dir(dir.path().join("global"));

        let mut global = ConfigOverrides::default();
        global.log_level = Some("warn".to_string());
        loader.save_global(&global).unwrap();

        loader.load_global().unwrap();

        let mut updated = ConfigOverrides::default();
        updated.log_level = Some("error".to_string());
        loader.save_global(&updated).unwrap();

        let cached = loader.load_global().unwrap().unwrap();
        assert_eq!(cached.log_level, Some("warn".to_string()));

        loader.clear_cache();
        let fresh = loader.load_global().unwrap().unwrap();
        assert_eq!(fresh.log_level, Some("error".to_string()));
    }
}
