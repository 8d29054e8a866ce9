use thiserror::Error;

/// Unified error type for analyst crates.
///
/// The variants follow the pipeline's failure taxonomy: configuration problems
/// abort a whole invocation, everything else is scoped to one computation or
/// ledger record by the orchestration processes.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Remote API error: {message}")]
    Remote {
        /// HTTP status of the last failed attempt, if a response was received.
        status: Option<u16>,
        message: String,
    },
    #[error("Persistence error: {0}")]
    Persistence(String),
    #[error("Timed out: {0}")]
    Timeout(String),
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn remote(status: Option<u16>, message: impl Into<String>) -> Self {
        Error::Remote {
            status,
            message: message.into(),
        }
    }

    /// Only configuration failures may abort an entire process invocation.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Configuration(_))
    }
}
