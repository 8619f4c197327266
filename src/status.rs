use std::fmt::{Display, Formatter};

use thiserror::Error;

/// HTTP-style status code attached to every store response and to every
/// sub-operation of a grouped write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatusCode(pub u16);

impl StatusCode {
    pub const OK: StatusCode = StatusCode(200);
    pub const CREATED: StatusCode = StatusCode(201);
    pub const NO_CONTENT: StatusCode = StatusCode(204);
    pub const BAD_REQUEST: StatusCode = StatusCode(400);
    pub const NOT_FOUND: StatusCode = StatusCode(404);
    pub const CONFLICT: StatusCode = StatusCode(409);
    pub const PRECONDITION_FAILED: StatusCode = StatusCode(412);
    /// Sentinel for sub-operations skipped because another one in the same
    /// grouped write failed.
    pub const FAILED_DEPENDENCY: StatusCode = StatusCode(424);
    pub const TOO_MANY_REQUESTS: StatusCode = StatusCode(429);
    pub const INTERNAL_SERVER_ERROR: StatusCode = StatusCode(500);
    pub const SERVICE_UNAVAILABLE: StatusCode = StatusCode(503);

    pub fn is_success(self) -> bool {
        (200..300).contains(&self.0)
    }

    pub fn is_conflict(self) -> bool {
        self == StatusCode::CONFLICT
    }

    pub fn is_dependency_skipped(self) -> bool {
        self == StatusCode::FAILED_DEPENDENCY
    }

    /// Throttling and availability errors are worth retrying by the caller.
    pub fn is_transient(self) -> bool {
        self == StatusCode::TOO_MANY_REQUESTS || self == StatusCode::SERVICE_UNAVAILABLE
    }

    fn reason(self) -> &'static str {
        match self.0 {
            200 => "OK",
            201 => "Created",
            204 => "No Content",
            400 => "Bad Request",
            404 => "Not Found",
            409 => "Conflict",
            412 => "Precondition Failed",
            424 => "Failed Dependency",
            429 => "Too Many Requests",
            500 => "Internal Server Error",
            503 => "Service Unavailable",
            _ => "Unknown",
        }
    }
}

impl Display for StatusCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.0, self.reason())
    }
}

/// Typed classification of a failed store request.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StoreError {
    #[error("item [{id}] not found in partition [{partition_key}]")]
    NotFound { partition_key: String, id: String },

    #[error("item [{id}] already exists in partition [{partition_key}]")]
    Conflict { partition_key: String, id: String },

    #[error("item [{id}] was modified since it was read")]
    PreconditionFailed { id: String },

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("stored item is corrupted: {0}")]
    Corrupted(String),

    #[error("store unavailable: {0}")]
    Transient(String),
}

impl StoreError {
    pub fn transient(err: impl Display) -> Self {
        StoreError::Transient(err.to_string())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            StoreError::NotFound { .. } => StatusCode::NOT_FOUND,
            StoreError::Conflict { .. } => StatusCode::CONFLICT,
            StoreError::PreconditionFailed { .. } => StatusCode::PRECONDITION_FAILED,
            StoreError::BadRequest(_) => StatusCode::BAD_REQUEST,
            StoreError::Corrupted(_) => StatusCode::INTERNAL_SERVER_ERROR,
            StoreError::Transient(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    pub fn is_conflict(&self) -> bool {
        self.status().is_conflict()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_statuses() {
        assert!(StatusCode::CREATED.is_success());
        assert!(!StatusCode::FAILED_DEPENDENCY.is_success());
        assert!(StatusCode::FAILED_DEPENDENCY.is_dependency_skipped());
        assert!(StatusCode::TOO_MANY_REQUESTS.is_transient());
        assert!(StatusCode::SERVICE_UNAVAILABLE.is_transient());
        assert!(!StatusCode::CONFLICT.is_transient());
        assert!(!StatusCode::INTERNAL_SERVER_ERROR.is_transient());
        assert_eq!(StatusCode::PRECONDITION_FAILED.to_string(), "412 Precondition Failed");
    }

    #[test]
    fn store_errors_map_to_statuses() {
        let err = StoreError::Conflict {
            partition_key: "c1".into(),
            id: "o1".into(),
        };
        assert!(err.is_conflict());
        assert_eq!(StoreError::transient("io").status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
