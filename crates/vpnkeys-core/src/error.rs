//! Error taxonomy shared by every engine component

use sea_orm::DbErr;
use thiserror::Error;

/// Errors returned by engine operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Service control failed for {unit}: {output}")]
    ServiceControl { unit: String, output: String },

    #[error("Provisioning failed: {0}")]
    Provisioning(String),

    #[error("Notification failed: {0}")]
    Notification(String),

    #[error("Dependency unavailable: {0}")]
    DependencyUnavailable(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn key_not_found(id: i32) -> Self {
        Error::NotFound {
            entity: "Key",
            id: id.to_string(),
        }
    }

    pub fn config_not_found(id: i32) -> Self {
        Error::NotFound {
            entity: "Config",
            id: id.to_string(),
        }
    }

    pub fn session_not_found(id: i32) -> Self {
        Error::NotFound {
            entity: "Session",
            id: id.to_string(),
        }
    }

    /// Per-item errors a bulk batch skips over instead of reporting
    pub fn is_skippable(&self) -> bool {
        matches!(self, Error::NotFound { .. } | Error::Validation(_))
    }

    /// Errors that abort a bulk batch
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::DependencyUnavailable(_))
    }

    /// Stable machine-readable code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            Error::NotFound { .. } => "NOT_FOUND",
            Error::Validation(_) => "VALIDATION_ERROR",
            Error::Conflict(_) => "CONFLICT",
            Error::ServiceControl { .. } => "SERVICE_CONTROL_ERROR",
            Error::Provisioning(_) => "PROVISIONING_ERROR",
            Error::Notification(_) => "NOTIFICATION_ERROR",
            Error::DependencyUnavailable(_) => "DEPENDENCY_UNAVAILABLE",
        }
    }
}

impl From<DbErr> for Error {
    fn from(err: DbErr) -> Self {
        Error::DependencyUnavailable(format!("database: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skippable_and_fatal_are_disjoint() {
        let errors = [
            Error::key_not_found(1),
            Error::Validation("bad".into()),
            Error::Conflict("dup".into()),
            Error::Notification("smtp".into()),
            Error::DependencyUnavailable("db".into()),
        ];

        for err in errors {
            assert!(!(err.is_skippable() && err.is_fatal()), "{:?}", err);
        }
    }

    #[test]
    fn test_db_error_maps_to_dependency_unavailable() {
        let err: Error = DbErr::Custom("connection refused".into()).into();
        assert!(err.is_fatal());
        assert_eq!(err.code(), "DEPENDENCY_UNAVAILABLE");
    }

    #[test]
    fn test_not_found_message() {
        assert_eq!(Error::key_not_found(42).to_string(), "Key 42 not found");
    }
}
