// 🚨 Commit Error Taxonomy
// Structured errors carrying entity type, natural key and field detail,
// aggregated per run so one pass surfaces the maximal diagnostic set

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// ============================================================================
// FIELD-LEVEL DETAIL
// ============================================================================

/// One field that failed validation on the create path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &str, message: impl Into<String>) -> Self {
        FieldError {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

// ============================================================================
// COMMIT ERROR
// ============================================================================

/// Error raised by a committer. Never aborts the run on its own: committers
/// append these to the shared [`ErrorLog`] and the orchestrator decides
/// commit vs rollback once, after all phases have run.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
pub enum CommitError {
    /// Guard clause: a required key is missing before resolution can start
    #[error("{entity}: missing required key ({detail})")]
    MissingKey { entity: String, detail: String },

    /// A dependent entity could not be resolved and on-demand creation
    /// is not permitted on this path
    #[error("{entity} `{key}`: unresolved dependency ({detail})")]
    Unresolved {
        entity: String,
        key: String,
        detail: String,
    },

    /// The assembled entity failed field-level constraints on the create path
    #[error("{entity} `{key}`: validation failed")]
    Validation {
        entity: String,
        key: String,
        fields: Vec<FieldError>,
    },
}

impl CommitError {
    pub fn missing_key(entity: &str, detail: impl Into<String>) -> Self {
        CommitError::MissingKey {
            entity: entity.to_string(),
            detail: detail.into(),
        }
    }

    pub fn unresolved(entity: &str, key: impl Into<String>, detail: impl Into<String>) -> Self {
        CommitError::Unresolved {
            entity: entity.to_string(),
            key: key.into(),
            detail: detail.into(),
        }
    }

    pub fn validation(entity: &str, key: impl Into<String>, fields: Vec<FieldError>) -> Self {
        CommitError::Validation {
            entity: entity.to_string(),
            key: key.into(),
            fields,
        }
    }

    pub fn entity(&self) -> &str {
        match self {
            CommitError::MissingKey { entity, .. } => entity,
            CommitError::Unresolved { entity, .. } => entity,
            CommitError::Validation { entity, .. } => entity,
        }
    }

    /// Multi-line rendering for the audit log, field detail included
    pub fn detail_lines(&self) -> Vec<String> {
        match self {
            CommitError::Validation { fields, .. } => {
                let mut lines = vec![self.to_string()];
                for field in fields {
                    lines.push(format!("    - {}", field));
                }
                lines
            }
            other => vec![other.to_string()],
        }
    }
}

// ============================================================================
// ERROR LOG
// ============================================================================

/// Per-run aggregate of every committer error. Owned by one orchestrator
/// run; never shared across runs.
#[derive(Debug, Default, Clone)]
pub struct ErrorLog {
    errors: Vec<CommitError>,
}

impl ErrorLog {
    pub fn new() -> Self {
        ErrorLog::default()
    }

    pub fn push(&mut self, error: CommitError) {
        self.errors.push(error);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn errors(&self) -> &[CommitError] {
        &self.errors
    }

    pub fn into_errors(self) -> Vec<CommitError> {
        self.errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_detail_lines() {
        let err = CommitError::validation(
            "Swimmer",
            "DOE|JOHN|1970",
            vec![
                FieldError::new("year_of_birth", "out of plausible range"),
                FieldError::new("gender", "unknown code"),
            ],
        );

        let lines = err.detail_lines();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("Swimmer"));
        assert!(lines[0].contains("DOE|JOHN|1970"));
        assert!(lines[1].contains("year_of_birth"));
        assert!(lines[2].contains("gender"));
    }

    #[test]
    fn test_error_log_aggregates() {
        let mut log = ErrorLog::new();
        assert!(log.is_empty());

        log.push(CommitError::missing_key("Badge", "swimmer key absent"));
        log.push(CommitError::unresolved("Badge", "DOE|JOHN|1970|Team X", "no affiliation"));

        assert_eq!(log.len(), 2);
        assert_eq!(log.errors()[0].entity(), "Badge");
    }
}
