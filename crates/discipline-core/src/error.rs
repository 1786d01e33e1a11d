//! Core error type

use discipline_config::ValidationError;
use discipline_executor_api::ExecutorError;
use discipline_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid document: {}", join(.0))]
    Validation(Vec<ValidationError>),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Executor error: {0}")]
    Executor(#[from] ExecutorError),

    #[error("Privileged executor is not ready")]
    ExecutorNotReady,
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

pub type CoreResult<T> = Result<T, CoreError>;
