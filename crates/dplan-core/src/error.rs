use thiserror::Error;

use crate::requirements::RequirementError;

/// Input-shape failures that abort a planning run before any collaborator is
/// contacted.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlanError {
    #[error("could not read requirements: {0}")]
    Requirements(#[from] RequirementError),
    #[error("graduation year is required")]
    MissingGraduationYear,
    #[error("unknown graduation quarter '{0}' (expected Fall, Winter, Spring or Summer)")]
    InvalidQuarter(String),
    #[error("invalid preferences: {0}")]
    InvalidPreferences(String),
}
