use thiserror::Error;

/// Startup failures shared by every binary in the workspace.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    ConfigError(anyhow::Error),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(anyhow::Error::new(err))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::InternalError(anyhow::Error::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_source_errors_become_config_errors() {
        let err: AppError = config::ConfigError::NotFound("port".to_string()).into();
        assert!(matches!(err, AppError::ConfigError(_)));
        assert!(err.to_string().starts_with("Configuration error"));
    }

    #[test]
    fn io_errors_are_internal() {
        let err: AppError = std::io::Error::new(std::io::ErrorKind::Other, "disk").into();
        assert!(matches!(err, AppError::InternalError(_)));
    }
}
