use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Failed to load configuration: {0}")]
    Config(#[from] config::ConfigError),

    #[error(transparent)]
    Pipeline(#[from] analyst_common::Error),

    #[error("Failed to encode report: {0}")]
    Json(#[from] serde_json::Error),
}
