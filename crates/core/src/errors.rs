use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::estimate::{EstimateId, EstimateStatus};

/// Stable error kinds surfaced to presentation collaborators.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    InvalidTransition,
    Validation,
    InputRange,
    Conflict,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("{entity} `{id}` was not found")]
    NotFound { entity: &'static str, id: String },
    #[error("invalid estimate transition from {from:?} to {to:?}")]
    InvalidTransition { from: EstimateStatus, to: EstimateStatus },
    #[error("estimate `{}` is {status:?} and cannot be {operation}", .id.0)]
    EstimateLocked { id: EstimateId, status: EstimateStatus, operation: &'static str },
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("missing required fields before leaving draft: {missing_fields:?}")]
    MissingRequiredFields { missing_fields: Vec<String> },
    #[error("{field} is out of range: {value}")]
    InputRange { field: String, value: Decimal },
    #[error("estimate `{}` changed concurrently (expected v{expected}, found v{found})", .id.0)]
    VersionConflict { id: EstimateId, expected: u32, found: u32 },
}

impl DomainError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound { entity, id: id.into() }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::InvalidTransition { .. } | Self::EstimateLocked { .. } => {
                ErrorKind::InvalidTransition
            }
            Self::Validation(_) | Self::MissingRequiredFields { .. } => ErrorKind::Validation,
            Self::InputRange { .. } => ErrorKind::InputRange,
            Self::VersionConflict { .. } => ErrorKind::Conflict,
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("configuration failure: {0}")]
    Configuration(String),
    #[error("input failure: {0}")]
    Input(String),
}

impl ApplicationError {
    pub fn error_class(&self) -> &'static str {
        match self {
            Self::Domain(error) => match error.kind() {
                ErrorKind::NotFound => "not_found",
                ErrorKind::InvalidTransition => "invalid_transition",
                ErrorKind::Validation => "validation",
                ErrorKind::InputRange => "input_range",
                ErrorKind::Conflict => "version_conflict",
            },
            Self::Configuration(_) => "config_validation",
            Self::Input(_) => "input",
        }
    }

    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Configuration(_) => 2,
            Self::Input(_) => 3,
            Self::Domain(_) => 4,
        }
    }

    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Domain(error) => match error.kind() {
                ErrorKind::NotFound => "The requested record does not exist.",
                ErrorKind::InvalidTransition => {
                    "The estimate cannot move to that status from its current status."
                }
                ErrorKind::Validation => "Some required details are missing or invalid.",
                ErrorKind::InputRange => "A price, discount, or tax rate is out of range.",
                ErrorKind::Conflict => {
                    "The estimate was changed by another operation. Reload it and try again."
                }
            },
            Self::Configuration(_) => "The application configuration is invalid.",
            Self::Input(_) => "The input file could not be read. Check the path and format.",
        }
    }
}
