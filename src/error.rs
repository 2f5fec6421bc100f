use serde_json::json;
use thiserror::Error;

/// Failure of one request. Nothing is written when any of these is returned.
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("{message}")]
    Validation {
        field: Option<String>,
        message: String,
    },
    #[error("{0}")]
    Forbidden(String),
    #[error("{message}")]
    State {
        code: &'static str,
        message: String,
    },
    #[error("{0}")]
    Integrity(String),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("select a workspace first")]
    NoWorkspace,
    #[error(transparent)]
    Db(#[from] rusqlite::Error),
}

impl ActionError {
    pub fn field(field: &str, message: impl Into<String>) -> Self {
        Self::Validation {
            field: Some(field.to_string()),
            message: message.into(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Validation {
            field: None,
            message: message.into(),
        }
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }

    pub fn state(message: impl Into<String>) -> Self {
        Self::State {
            code: "invalid_state",
            message: message.into(),
        }
    }

    pub fn integrity(message: impl Into<String>) -> Self {
        Self::Integrity(message.into())
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "bad_params",
            Self::Forbidden(_) => "forbidden",
            Self::State { code, .. } => code,
            Self::Integrity(_) => "integrity",
            Self::NotFound(_) => "not_found",
            Self::NoWorkspace => "no_workspace",
            Self::Db(_) => "db_query_failed",
        }
    }

    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            Self::Validation {
                field: Some(field), ..
            } => Some(json!({ "field": field })),
            Self::NotFound(entity) => Some(json!({ "entity": entity })),
            _ => None,
        }
    }
}

pub type ActionResult<T> = Result<T, ActionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_keep_forbidden_and_validation_apart() {
        assert_eq!(ActionError::forbidden("no").code(), "forbidden");
        assert_eq!(ActionError::field("marks", "must be >= 0").code(), "bad_params");
        assert_eq!(
            ActionError::field("marks", "x").details(),
            Some(json!({ "field": "marks" }))
        );
        assert_eq!(ActionError::state("nope").code(), "invalid_state");
        assert_eq!(ActionError::NotFound("course").to_string(), "course not found");
    }
}
