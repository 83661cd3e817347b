use std::path::{Path, PathBuf};

use tether_common::config::SystemConfig;

use super::validation;

/// Complete engine configuration loaded from the config directory.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Parsed system.toml.
    pub system: SystemConfig,
    /// Base config directory path.
    pub config_dir: PathBuf,
}

/// Load all configuration from the given config directory.
///
/// Fails loudly with clear error messages if anything is misconfigured.
/// The engine refuses to start on validation failure.
pub fn load_config(config_dir: &Path) -> Result<EngineConfig, ConfigError> {
    tracing::info!(config_dir = %config_dir.display(), "Loading configuration");

    let system_path = config_dir.join("system.toml");
    let system = load_system_config(&system_path)?;

    let config = EngineConfig {
        system,
        config_dir: config_dir.to_path_buf(),
    };

    validation::validate(&config)?;

    tracing::info!(
        max_connections = config.system.store.max_connections,
        max_page_size = config.system.listing.max_page_size,
        reconciliation_enabled = config.system.reconciliation.enabled,
        "Configuration loaded successfully"
    );

    Ok(config)
}

fn load_system_config(path: &Path) -> Result<SystemConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    parse_system_config(&content).map_err(|detail| ConfigError::Parse {
        path: path.to_path_buf(),
        detail,
    })
}

fn parse_system_config(content: &str) -> Result<SystemConfig, String> {
    SystemConfig::from_toml_str(content).map_err(|e| e.to_string())
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {detail}")]
    Parse { path: PathBuf, detail: String },

    #[error("Validation failed: {0}")]
    Validation(String),
}

impl From<ConfigError> for tether_common::TetherError {
    fn from(e: ConfigError) -> Self {
        tether_common::TetherError::Config(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [store]
        max_connections = 16
        acquire_timeout_seconds = 3

        [listing]
        default_page_size = 25
        max_page_size = 200

        [reconciliation]
        enabled = true
        interval_minutes = 30
        batch_size = 250
    "#;

    #[test]
    fn test_parse_system_config() {
        let system = parse_system_config(SAMPLE).unwrap();
        assert_eq!(system.store.max_connections, 16);
        assert_eq!(system.listing.default_page_size, 25);
        assert!(system.reconciliation.enabled);
        assert_eq!(system.reconciliation.batch_size, 250);
    }

    #[test]
    fn test_missing_section_is_parse_error() {
        let err = parse_system_config("[store]\nmax_connections = 4\n").unwrap_err();
        assert!(err.contains("acquire_timeout_seconds") || err.contains("missing"));
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let err = load_config(Path::new("/nonexistent/tether-config")).unwrap_err();
        assert!(matches!(err, ConfigError::FileRead { .. }));
    }
}
