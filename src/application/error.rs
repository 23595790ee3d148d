use std::error::Error as StdError;

use thiserror::Error;

use crate::{
    application::{repos::StoreError, source::SourceError, sync::SyncError},
    domain::error::DomainError,
    infra::error::InfraError,
};

/// Error messages of `error` and every error in its source chain, outermost first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorReport {
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(error: &dyn StdError) -> Self {
        let mut messages = vec![error.to_string()];
        let mut current = error.source();
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        Self { messages }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Sync(#[from] SyncError),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }

    pub fn report(&self) -> ErrorReport {
        ErrorReport::from_error(self)
    }

    pub fn is_not_found(&self) -> bool {
        match self {
            AppError::Store(err) => err.is_not_found(),
            AppError::Source(err) => err.is_not_found(),
            AppError::Sync(err) => err.is_not_found(),
            _ => false,
        }
    }
}
