use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Every generated statement can hold at least one full row
/// - Sync concurrency and busy timeout are non-zero
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let widest = crate::store::schema::KINDS
        .iter()
        .map(|k| k.columns.len())
        .max()
        .unwrap_or(0);
    if config.database.max_bound_params < widest {
        return Err(ConfigError::ValidationError(format!(
            "database.max_bound_params must be at least {} (widest table)",
            widest
        )));
    }

    if config.database.busy_timeout_ms == 0 {
        return Err(ConfigError::ValidationError(
            "database.busy_timeout_ms cannot be 0".to_string(),
        ));
    }

    if config.sync.fetch_concurrency == 0 {
        return Err(ConfigError::ValidationError(
            "sync.fetch_concurrency cannot be 0".to_string(),
        ));
    }

    Ok(())
}
