// Error types for the directory core

use crate::entities::token::TokenError;
use crate::validation::ValidationError;
use thiserror::Error;

/// Illegal move in one of the small lifecycle state machines
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot move {entity} from '{from}' to '{to}'")]
pub struct TransitionError {
    pub entity: &'static str,
    pub from: String,
    pub to: String,
}

impl TransitionError {
    pub fn new(entity: &'static str, from: impl ToString, to: impl ToString) -> Self {
        TransitionError {
            entity,
            from: from.to_string(),
            to: to.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("validation failed: {}", format_validation(.0))]
    Validation(Vec<ValidationError>),

    #[error("review token rejected: {0}")]
    Token(#[from] TokenError),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("conflict: {0}")]
    Conflict(String),
}

impl DirectoryError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        DirectoryError::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn invalid(field: &str, message: &str) -> Self {
        DirectoryError::Validation(vec![ValidationError::new(field, message)])
    }
}

impl From<Vec<ValidationError>> for DirectoryError {
    fn from(errors: Vec<ValidationError>) -> Self {
        DirectoryError::Validation(errors)
    }
}

fn format_validation(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

pub type Result<T> = std::result::Result<T, DirectoryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_message_joins_fields() {
        let err = DirectoryError::Validation(vec![
            ValidationError::new("rating", "must be between 1 and 5"),
            ValidationError::new("treatment_month", "must be between 1 and 12"),
        ]);

        assert_eq!(
            err.to_string(),
            "validation failed: rating: must be between 1 and 5; \
             treatment_month: must be between 1 and 12"
        );
    }

    #[test]
    fn test_transition_error_display() {
        let err = TransitionError::new("review", "approved", "pending");
        assert_eq!(err.to_string(), "cannot move review from 'approved' to 'pending'");
    }
}
