use serde::Serialize;
use thiserror::Error;

/// A single failed rule reported by the validation gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self { field: field.into(), message: message.into() }
    }
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("validation failed: {}", summarize(.0))]
    Validation(Vec<FieldError>),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("duplicate key on {field}: {value}")]
    DuplicateKey { field: String, value: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("query execution failed{}: {message}", stage_suffix(.stage))]
    QueryExecution { stage: Option<usize>, message: String },

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("password hashing error: {0}")]
    Hash(String),

    #[error("collection not found: {0}")]
    NoSuchCollection(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serde JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("BSON: {0}")]
    Bson(#[from] bson::error::Error),

    #[error("config error: {0}")]
    Config(String),
}

impl RegistryError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation(vec![FieldError::new(field, message)])
    }

    pub fn stage(stage: usize, message: impl Into<String>) -> Self {
        Self::QueryExecution { stage: Some(stage), message: message.into() }
    }
}

pub type Result<T> = std::result::Result<T, RegistryError>;

fn summarize(errors: &[FieldError]) -> String {
    errors.iter().map(|e| format!("{}: {}", e.field, e.message)).collect::<Vec<_>>().join("; ")
}

fn stage_suffix(stage: &Option<usize>) -> String {
    stage.map(|i| format!(" at stage {i}")).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_stage_index() {
        let e = RegistryError::stage(3, "limit must be positive");
        assert_eq!(e.to_string(), "query execution failed at stage 3: limit must be positive");
        let e = RegistryError::QueryExecution { stage: None, message: "boom".into() };
        assert_eq!(e.to_string(), "query execution failed: boom");
    }

    #[test]
    fn display_joins_field_errors() {
        let e = RegistryError::Validation(vec![
            FieldError::new("basic.email", "email is required"),
            FieldError::new("basic.zipCode", "zipCode is required"),
        ]);
        assert_eq!(
            e.to_string(),
            "validation failed: basic.email: email is required; basic.zipCode: zipCode is required"
        );
    }
}
