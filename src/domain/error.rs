use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    #[error("invalid post identity: {message}")]
    InvalidIdentity { message: String },
    #[error("invalid `{field}` value `{value}`")]
    InvalidMetadata { field: &'static str, value: String },
}

impl DomainError {
    pub fn invalid_identity(message: impl Into<String>) -> Self {
        Self::InvalidIdentity {
            message: message.into(),
        }
    }

    pub fn invalid_metadata(field: &'static str, value: impl Into<String>) -> Self {
        Self::InvalidMetadata {
            field,
            value: value.into(),
        }
    }
}
