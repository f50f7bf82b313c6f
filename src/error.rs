use serde_json::json;
use thiserror::Error;

use crate::model::Role;

pub type PortalResult<T> = Result<T, PortalError>;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum PortalError {
    #[error("User not found. Try the demo accounts below.")]
    UserNotFound { email: String },

    /// Seed data references a user or school that does not exist, or the
    /// records disagree with each other. Fatal for the current login attempt.
    #[error("Configuration error.")]
    Configuration { defect: String },

    #[error("unknown role: {0}")]
    UnknownRole(String),

    #[error("no affiliation with school {school_id}")]
    SchoolNotAffiliated { school_id: String },

    #[error("several affiliations match; choose one of {candidates}")]
    SelectionRequired { candidates: usize },

    #[error("invalid school selection: {0}")]
    InvalidSelection(String),

    #[error("{0}")]
    InvalidState(String),

    #[error("not signed in")]
    NoSession,

    #[error("{role} cannot {action}")]
    Forbidden { role: Role, action: &'static str },

    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    Conflict(String),
}

impl PortalError {
    pub fn code(&self) -> &'static str {
        match self {
            PortalError::UserNotFound { .. } => "user_not_found",
            PortalError::Configuration { .. } => "configuration_error",
            PortalError::UnknownRole(_) => "unknown_role",
            PortalError::SchoolNotAffiliated { .. } => "school_not_affiliated",
            PortalError::SelectionRequired { .. } => "selection_required",
            PortalError::InvalidSelection(_) => "invalid_selection",
            PortalError::InvalidState(_) => "invalid_state",
            PortalError::NoSession => "no_session",
            PortalError::Forbidden { .. } => "forbidden",
            PortalError::NotFound { .. } => "not_found",
            PortalError::InvalidInput(_) => "bad_params",
            PortalError::Conflict(_) => "conflict",
        }
    }

    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            PortalError::UserNotFound { email } => Some(json!({ "email": email })),
            PortalError::Configuration { defect } => Some(json!({ "defect": defect })),
            PortalError::SchoolNotAffiliated { school_id } => {
                Some(json!({ "schoolId": school_id }))
            }
            _ => None,
        }
    }

    pub fn configuration(defect: impl Into<String>) -> Self {
        PortalError::Configuration {
            defect: defect.into(),
        }
    }

    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        PortalError::NotFound {
            kind,
            id: id.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_error_hides_defect_from_message() {
        let e = PortalError::configuration("affiliation 5 references missing school s9");
        assert_eq!(e.to_string(), "Configuration error.");
        assert_eq!(e.code(), "configuration_error");
        let d = e.details().expect("details");
        assert!(d["defect"].as_str().unwrap_or("").contains("s9"));
    }
}
