use std::collections::HashMap;
use std::path::{Path, PathBuf};

use config::{Config, Environment, File};
use serde::Deserialize;
use tracing::warn;

/// Per-model override. Points at a single model file, not a directory; this
/// is the legacy configuration shape and takes precedence over everything.
#[derive(Debug, Deserialize, Clone)]
pub struct ModelOverride {
    pub path: PathBuf,
}

/// Logging configuration for the binary.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    pub level: String,
    /// Optional log directory; when set, logs roll daily into files there.
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

/// Main settings struct covering model storage, the remote registry and
/// logging.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Settings {
    /// Directory holding `namespace/name` model subdirectories. Overridden
    /// at resolve time by the AGENTYARD_MODELS_PATH environment variable.
    pub models_dir: Option<PathBuf>,
    /// Per-model file overrides keyed by identifier.
    pub models: HashMap<String, ModelOverride>,
    /// Base URL of the model registry API.
    pub registry_api: String,
    /// Host serving raw file downloads.
    pub registry_host: String,
    /// Root of the on-disk lookup cache.
    pub cache_dir: Option<PathBuf>,
    pub logging: LoggingConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            models_dir: None,
            models: HashMap::new(),
            registry_api: "https://huggingface.co/api".to_string(),
            registry_host: "https://huggingface.co".to_string(),
            cache_dir: None,
            logging: LoggingConfig::default(),
        }
    }
}

impl Settings {
    /// Loads settings from an optional TOML file plus AGENTYARD__-prefixed
    /// environment variables.
    ///
    /// A missing or malformed configuration is never fatal: the error is
    /// logged and defaults are used instead, since every recognized key has
    /// a sensible fallback.
    pub fn load(config_path: Option<&Path>) -> Self {
        let mut builder = Config::builder();

        if let Some(path) = config_path {
            builder = builder.add_source(File::from(path).required(false));
        } else if let Some(default_path) = default_config_path() {
            builder = builder.add_source(File::from(default_path).required(false));
        }

        let result = builder
            .add_source(Environment::with_prefix("AGENTYARD").separator("__"))
            .build()
            .and_then(|c| c.try_deserialize::<Settings>());

        match result {
            Ok(settings) => settings,
            Err(e) => {
                warn!("failed to load config, falling back to defaults: {}", e);
                Settings::default()
            }
        }
    }

    /// Cache root for registry lookups, `~/.agentyard/.cache` by default.
    pub fn cache_root(&self) -> Option<PathBuf> {
        self.cache_dir
            .clone()
            .or_else(|| dirs::home_dir().map(|h| h.join(".agentyard").join(".cache")))
    }
}

fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join("agentyard").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_degrades_to_defaults() {
        let settings = Settings::load(Some(Path::new("/nonexistent/config.toml")));
        assert!(settings.models_dir.is_none());
        assert_eq!(settings.registry_api, "https://huggingface.co/api");
    }

    #[test]
    fn malformed_file_degrades_to_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(b"models_dir = [this is not toml").unwrap();
        file.flush().unwrap();

        let settings = Settings::load(Some(file.path()));
        assert!(settings.models.is_empty());
    }

    #[test]
    fn reads_models_dir_and_overrides() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(
            b"models_dir = \"/srv/models\"\n\n[models.\"mistralai/mistral-7b\"]\npath = \"/data/custom.gguf\"\n",
        )
        .unwrap();
        file.flush().unwrap();

        let settings = Settings::load(Some(file.path()));
        assert_eq!(settings.models_dir.as_deref(), Some(Path::new("/srv/models")));
        assert_eq!(
            settings.models["mistralai/mistral-7b"].path,
            Path::new("/data/custom.gguf")
        );
    }
}
