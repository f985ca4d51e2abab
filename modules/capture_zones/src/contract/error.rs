//! Contract error types for the capture zones runtime
//!
//! These errors are transport-agnostic. They never cross the API boundary:
//! the native client folds them into failed action results.

/// Capture zones domain errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CaptureZonesError {
    /// Target (zone, shop, koth member, player) not found
    #[error("{resource} not found: {id}")]
    NotFound {
        /// Resource kind (zone, shop, koth_member)
        resource: String,
        /// Resource identifier
        id: String,
    },

    /// Create on an id that already exists
    #[error("zone already exists: {id}")]
    DuplicateId { id: String },

    /// Malformed input or violated bounds
    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },

    /// Degenerate zone geometry
    #[error("invalid geometry: {message}")]
    InvalidGeometry { message: String },

    /// Config value does not match the schema of its path
    #[error("schema mismatch at '{path}': {details}")]
    SchemaMismatch { path: String, details: String },

    /// Config path has no schema entry
    #[error("unknown config path: {path}")]
    UnknownPath { path: String },

    /// Operation not valid for the target's current state
    #[error("invalid state: {reason}")]
    InvalidState { reason: String },

    /// Unparseable or unknown admin command line
    #[error("invalid command: {message}")]
    InvalidCommand { message: String },

    /// Backing store unreachable or corrupt
    #[error("persistence failure: {message}")]
    PersistenceFailure { message: String },
}

impl CaptureZonesError {
    /// Stable identifier reported in failed action results
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::DuplicateId { .. } => "duplicate_id",
            Self::InvalidArgument { .. } => "invalid_argument",
            Self::InvalidGeometry { .. } => "invalid_geometry",
            Self::SchemaMismatch { .. } => "schema_mismatch",
            Self::UnknownPath { .. } => "unknown_path",
            Self::InvalidState { .. } => "invalid_state",
            Self::InvalidCommand { .. } => "invalid_command",
            Self::PersistenceFailure { .. } => "persistence_failure",
        }
    }

    pub fn zone_not_found(id: &str) -> Self {
        Self::NotFound {
            resource: "zone".to_string(),
            id: id.to_string(),
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    pub fn persistence(error: anyhow::Error) -> Self {
        Self::PersistenceFailure {
            message: format!("{:#}", error),
        }
    }
}
