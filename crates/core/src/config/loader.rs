use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use std::path::Path;

use super::{types::Config, ConfigError};

/// Load configuration from file with environment variable overrides
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.display().to_string()));
    }

    let config: Config = Figment::new()
        .merge(Toml::file(path))
        .merge(Env::prefixed("ZAPTV_").split("_"))
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))?;

    Ok(config)
}

/// Load configuration from TOML string (useful for testing)
pub fn load_config_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    toml::from_str(toml_str).map_err(|e| ConfigError::ParseError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_config_from_str_valid() {
        let toml = r#"
[database]
path = "catalog.db"
busy_timeout_ms = 2000

[sync]
fetch_concurrency = 3
"#;
        let config = load_config_from_str(toml).unwrap();
        assert_eq!(config.database.path.to_str().unwrap(), "catalog.db");
        assert_eq!(config.database.busy_timeout_ms, 2000);
        assert_eq!(config.sync.fetch_concurrency, 3);
        // Unspecified fields fall back to defaults.
        assert_eq!(config.database.max_bound_params, 999);
        assert_eq!(config.sync.delete_grace_secs, 30);
    }

    #[test]
    fn test_load_config_from_str_empty_uses_defaults() {
        let config = load_config_from_str("").unwrap();
        assert_eq!(config.database.path.to_str().unwrap(), "zaptv.db");
        assert_eq!(config.sync.fetch_concurrency, 5);
    }

    #[test]
    fn test_load_config_from_str_invalid() {
        assert!(load_config_from_str("not valid [[ toml").is_err());
    }

    #[test]
    fn test_load_config_missing_file() {
        let result = load_config(Path::new("/nonexistent/zaptv.toml"));
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_load_config_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[database]\nmax_bound_params = 500").unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.database.max_bound_params, 500);
    }
}
