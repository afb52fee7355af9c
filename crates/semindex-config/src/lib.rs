//! Layered configuration for semindex.
//!
//! Sources merge in order, later winning on a per-field basis:
//! global `~/.semindex/config.toml` -> local `.semindex/config.toml` ->
//! `SEMINDEX_*` environment variables -> programmatic [`ConfigOverrides`].
//! Unknown keys, in a file or an env var, are rejected rather than
//! silently ignored.

mod error;
mod loader;

pub use error::ConfigError;
pub use loader::ConfigLoader;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Fully resolved configuration: every field has a concrete value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SemindexConfig {
    pub model: ModelConfig,
    pub embedding: EmbeddingConfig,
    pub storage: StorageConfig,
    pub log_level: String,
}

impl Default for SemindexConfig {
    fn default() -> Self {
        Self {
            model: ModelConfig::default(),
            embedding: EmbeddingConfig::default(),
            storage: StorageConfig::default(),
            log_level: "info".to_string(),
        }
    }
}

impl SemindexConfig {
    /// Checks that provider-dependent fields are present for the selected
    /// providers.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.model.llm_provider_type != "local" && self.model.base_url.is_none() {
            return Err(ConfigError::invalid_value(
                "model.base_url",
                format!("required when model.llm_provider_type = '{}'", self.model.llm_provider_type),
            ));
        }
        if self.embedding.batch_size == 0 {
            return Err(ConfigError::invalid_value("embedding.batch_size", "must be >= 1"));
        }
        Ok(())
    }
}

/// `model.*`: the LLM used for any natural-language-facing features.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelConfig {
    pub llm_provider_type: String,
    pub llm_model_name: String,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            llm_provider_type: "openai".to_string(),
            llm_model_name: "gpt-4o-mini".to_string(),
            api_key: None,
            base_url: Some("https://api.openai.com/v1".to_string()),
            timeout_secs: 30,
        }
    }
}

/// `embedding.*`: the embedding provider used by the Embedding Client (C4).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddingConfig {
    pub provider_type: String,
    pub model_name: String,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub batch_size: usize,
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider_type: "openai".to_string(),
            model_name: "text-embedding-3-small".to_string(),
            api_key: None,
            base_url: Some("https://api.openai.com/v1".to_string()),
            batch_size: 64,
            timeout_secs: 30,
        }
    }
}

/// `storage.*`: where and how persisted state (C5/C6/C7) is kept.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StorageConfig {
    pub storage_backend: StorageBackend,
    pub vector_backend: VectorBackend,
    pub base_path: PathBuf,
    pub cache_enabled: bool,
    pub cache_size: usize,
    pub auto_backup: bool,
    pub backup_interval_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            storage_backend: StorageBackend::Local,
            vector_backend: VectorBackend::Memory,
            base_path: PathBuf::from(".semindex"),
            cache_enabled: true,
            cache_size: 1000,
            auto_backup: false,
            backup_interval_secs: 3600,
        }
    }
}

/// Code-block/metadata storage backend. Only `local` exists today; the
/// field is an enum (not a bare string) so a future remote backend is an
/// additive variant rather than a breaking config change.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum StorageBackend {
    #[default]
    Local,
}

impl std::fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
        }
    }
}

impl std::str::FromStr for StorageBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local" => Ok(Self::Local),
            other => Err(ConfigError::invalid_value(
                "storage.storage_backend",
                format!("unknown backend '{other}', valid values: local"),
            )),
        }
    }
}

/// Vector store backend (C6). `memory` is the exact-cosine reference
/// implementation; `ann-a` and `ann-b` name the two pluggable ANN backends
/// from the persisted-layout contract. Only `ann-a` (Qdrant) has a concrete
/// `VectorStore` implementation in this repo; `ann-b` is accepted here as a
/// recognized value but has no backend to construct it, by design (see
/// DESIGN.md).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum VectorBackend {
    #[default]
    Memory,
    AnnA,
    AnnB,
}

impl std::fmt::Display for VectorBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Memory => write!(f, "memory"),
            Self::AnnA => write!(f, "ann-a"),
            Self::AnnB => write!(f, "ann-b"),
        }
    }
}

impl std::str::FromStr for VectorBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "memory" => Ok(Self::Memory),
            "ann-a" => Ok(Self::AnnA),
            "ann-b" => Ok(Self::AnnB),
            other => Err(ConfigError::invalid_value(
                "storage.vector_backend",
                format!("unknown backend '{other}', valid values: memory, ann-a, ann-b"),
            )),
        }
    }
}

/// A partially-specified configuration: every field optional, `None`
/// meaning "not set by this source". Used for parsed config files, for
/// `SEMINDEX_*` env var overrides, and for programmatic overrides — the
/// same shape at every layer, merged with later-wins-on-`Some`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct ConfigOverrides {
    pub model: ModelOverrides,
    pub embedding: EmbeddingOverrides,
    pub storage: StorageOverrides,
    pub log_level: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct ModelOverrides {
    pub llm_provider_type: Option<String>,
    pub llm_model_name: Option<String>,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct EmbeddingOverrides {
    pub provider_type: Option<String>,
    pub model_name: Option<String>,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub batch_size: Option<usize>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct StorageOverrides {
    pub storage_backend: Option<StorageBackend>,
    pub vector_backend: Option<VectorBackend>,
    pub base_path: Option<PathBuf>,
    pub cache_enabled: Option<bool>,
    pub cache_size: Option<usize>,
    pub auto_backup: Option<bool>,
    pub backup_interval_secs: Option<u64>,
}

impl ConfigOverrides {
    /// Layers `self` over `base`, with `self`'s `Some` values winning.
    pub fn apply(&self, base: SemindexConfig) -> SemindexConfig {
        SemindexConfig {
            model: ModelConfig {
                llm_provider_type: self.model.llm_provider_type.clone().unwrap_or(base.model.llm_provider_type),
                llm_model_name: self.model.llm_model_name.clone().unwrap_or(base.model.llm_model_name),
                api_key: self.model.api_key.clone().or(base.model.api_key),
                base_url: self.model.base_url.clone().or(base.model.base_url),
                timeout_secs: self.model.timeout_secs.unwrap_or(base.model.timeout_secs),
            },
            embedding: EmbeddingConfig {
                provider_type: self.embedding.provider_type.clone().unwrap_or(base.embedding.provider_type),
                model_name: self.embedding.model_name.clone().unwrap_or(base.embedding.model_name),
                api_key: self.embedding.api_key.clone().or(base.embedding.api_key),
                base_url: self.embedding.base_url.clone().or(base.embedding.base_url),
                batch_size: self.embedding.batch_size.unwrap_or(base.embedding.batch_size),
                timeout_secs: self.embedding.timeout_secs.unwrap_or(base.embedding.timeout_secs),
            },
            storage: StorageConfig {
                storage_backend: self.storage.storage_backend.unwrap_or(base.storage.storage_backend),
                vector_backend: self.storage.vector_backend.unwrap_or(base.storage.vector_backend),
                base_path: self.storage.base_path.clone().unwrap_or(base.storage.base_path),
                cache_enabled: self.storage.cache_enabled.unwrap_or(base.storage.cache_enabled),
                cache_size: self.storage.cache_size.unwrap_or(base.storage.cache_size),
                auto_backup: self.storage.auto_backup.unwrap_or(base.storage.auto_backup),
                backup_interval_secs: self
                    .storage
                    .backup_interval_secs
                    .unwrap_or(base.storage.backup_interval_secs),
            },
            log_level: self.log_level.clone().unwrap_or(base.log_level),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = SemindexConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.storage.vector_backend, VectorBackend::Memory);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn overrides_apply_only_set_fields() {
        let base = SemindexConfig::default();
        let overrides = ConfigOverrides {
            log_level: Some("debug".to_string()),
            storage: StorageOverrides {
                vector_backend: Some(VectorBackend::AnnA),
                ..Default::default()
            },
            ..Default::default()
        };
        let merged = overrides.apply(base.clone());
        assert_eq!(merged.log_level, "debug");
        assert_eq!(merged.storage.vector_backend, VectorBackend::AnnA);
        assert_eq!(merged.model.llm_model_name, base.model.llm_model_name);
    }

    #[test]
    fn vector_backend_parses_known_values_and_rejects_others() {
        assert_eq!("memory".parse::<VectorBackend>().unwrap(), VectorBackend::Memory);
        assert_eq!("ann-a".parse::<VectorBackend>().unwrap(), VectorBackend::AnnA);
        assert!("bogus".parse::<VectorBackend>().is_err());
    }

    #[test]
    fn unknown_toml_key_is_rejected() {
        let result: Result<ConfigOverrides, _> = toml::from_str("unknown_section = true");
        assert!(result.is_err());
    }

    #[test]
    fn validate_rejects_zero_batch_size() {
        let mut config = SemindexConfig::default();
        config.embedding.batch_size = 0;
        assert!(config.validate().is_err());
    }
}
