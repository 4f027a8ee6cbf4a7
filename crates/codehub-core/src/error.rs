use thiserror::Error;

/// All the ways a dashboard operation can fail
///
/// The first three variants are the domain taxonomy reported verbatim to
/// callers. Everything else is infrastructure and stays opaque.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("{entity} already exists: {key}")]
    Duplicate { entity: &'static str, key: String },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("API request failed: {0}")]
    ApiError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Error::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn duplicate(entity: &'static str, key: impl Into<String>) -> Self {
        Error::Duplicate {
            entity,
            key: key.into(),
        }
    }

    /// True for validation, not-found and duplicate errors
    pub fn is_domain(&self) -> bool {
        matches!(
            self,
            Error::Validation(_) | Error::NotFound { .. } | Error::Duplicate { .. }
        )
    }
}

impl From<codehub_api::GitHubError> for Error {
    fn from(err: codehub_api::GitHubError) -> Self {
        Error::ApiError(err.to_string())
    }
}
