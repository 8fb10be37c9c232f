use crate::config::ConfigError;
use crate::datasource::RecordError;
use thiserror::Error;

/// Errors that stop a reporting run before any fund is processed.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Record error: {0}")]
    Records(#[from] RecordError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use std::collections::HashMap;

    #[test]
    fn test_config_error_converts() {
        let err: AppError = Config::from_env_map(HashMap::new()).unwrap_err().into();
        assert!(matches!(err, AppError::Config(ConfigError::MissingEnv(_))));
        assert_eq!(
            err.to_string(),
            "Configuration error: Missing required environment variable: DATABASE_PATH"
        );
    }
}
