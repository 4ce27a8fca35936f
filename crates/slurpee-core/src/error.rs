//! Unified error type for Slurpee using thiserror.

use thiserror::Error;

/// The unified error type for Slurpee operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("database error: {message}")]
    Database {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("{entity_type} not found: {id}")]
    NotFound { entity_type: String, id: String },

    #[error("{entity_type} already exists: {field}")]
    Duplicate { entity_type: String, field: String },

    #[error("missing or invalid API secret")]
    Authentication,

    #[error("subject '{subject}' is out of scope for this secret")]
    OutOfScope { subject: String },

    #[error("invalid input: {field} - {message}")]
    InvalidInput { field: String, message: String },

    #[error("configuration error: {message}")]
    Configuration { message: String },

    #[error("shutdown in progress")]
    ShutdownInProgress,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn database(message: impl Into<String>) -> Self {
        Error::Database {
            message: message.into(),
            source: None,
        }
    }

    pub fn database_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Error::Database {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn not_found(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Error::NotFound {
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }

    pub fn invalid_input(field: impl Into<String>, message: impl Into<String>) -> Self {
        Error::InvalidInput {
            field: field.into(),
            message: message.into(),
        }
    }

    /// HTTP status code this error maps to at the API boundary.
    pub fn status_code(&self) -> u16 {
        match self {
            Error::NotFound { .. } => 404,
            Error::Authentication => 401,
            Error::OutOfScope { .. } => 403,
            Error::InvalidInput { .. } => 400,
            Error::Duplicate { .. } => 409,
            Error::ShutdownInProgress => 503,
            _ => 500,
        }
    }
}

/// Result type alias for Slurpee operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_match_the_ingest_contract() {
        assert_eq!(Error::not_found("event", "123").status_code(), 404);
        assert_eq!(Error::Authentication.status_code(), 401);
        assert_eq!(
            Error::OutOfScope {
                subject: "order.created".into()
            }
            .status_code(),
            403
        );
        assert_eq!(
            Error::invalid_input("data", "must be an object").status_code(),
            400
        );
    }
}
