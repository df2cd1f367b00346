use serde::Serialize;
use thiserror::Error;
use ulid::Ulid;

/// One rejected input field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("validation failed: {}", summarize(.0))]
    Validation(Vec<FieldError>),
    #[error("unknown location: {0}")]
    UnknownLocation(Ulid),
    #[error("slot no longer available: conflicts with {conflicting}")]
    SlotConflict { conflicting: Ulid },
    #[error("limit exceeded: {0}")]
    LimitExceeded(&'static str),
    #[error("store failure: {0}")]
    StoreFailure(String),
}

impl EngineError {
    /// Stable machine-readable kind, used by the protocol layer.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::Validation(_) => "validation",
            EngineError::UnknownLocation(_) => "unknown_location",
            EngineError::SlotConflict { .. } => "slot_conflict",
            EngineError::LimitExceeded(_) => "limit_exceeded",
            EngineError::StoreFailure(_) => "store_failure",
        }
    }

    pub fn fields(&self) -> &[FieldError] {
        match self {
            EngineError::Validation(fields) => fields,
            _ => &[],
        }
    }
}

fn summarize(fields: &[FieldError]) -> String {
    fields
        .iter()
        .map(|f| format!("{}: {}", f.field, f.message))
        .collect::<Vec<_>>()
        .join("; ")
}
