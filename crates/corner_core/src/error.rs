use thiserror::Error;

use crate::catalog::{CornerCaseId, SchemaViolation};
use crate::world::ActorId;

/// Catalog registration / lookup errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CatalogError {
    #[error("Duplicate corner case id: {id}")]
    DuplicateId { id: CornerCaseId },

    #[error("Duplicate corner case slug: {slug}")]
    DuplicateSlug { slug: String },

    #[error("Corner case not found: {0}")]
    NotFound(String),

    #[error("Invalid definition {id}: {reason}")]
    InvalidDefinition { id: CornerCaseId, reason: String },
}

/// Simulator boundary errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimulatorError {
    #[error("Simulator did not acknowledge {operation} within {timeout_ms}ms")]
    Timeout { operation: &'static str, timeout_ms: u64 },

    #[error("Spawn rejected for blueprint {blueprint}: {reason}")]
    SpawnRejected { blueprint: String, reason: String },

    #[error("Unknown actor: {0}")]
    UnknownActor(ActorId),

    #[error("Simulator connection lost: {0}")]
    ConnectionLost(String),

    #[error("Simulator not connected")]
    NotConnected,
}

impl SimulatorError {
    /// Connection-level failures end the run; everything else is retried or absorbed.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SimulatorError::ConnectionLost(_) | SimulatorError::NotConnected)
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, SimulatorError::Timeout { .. } | SimulatorError::SpawnRejected { .. })
    }
}

/// Environment controller errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EnvironmentError {
    #[error("Invalid weather preset: {0} (expected 1-9)")]
    InvalidPreset(i64),

    #[error("{field} = {value} is out of range [{min}, {max}]")]
    OutOfRange { field: &'static str, value: f64, min: f64, max: f64 },

    #[error("Environment apply timed out after {timeout_ms}ms")]
    ApplyTimeout { timeout_ms: u64 },

    #[error("Simulator error while applying environment: {0}")]
    Simulator(SimulatorError),
}

impl EnvironmentError {
    pub fn is_transient(&self) -> bool {
        matches!(self, EnvironmentError::ApplyTimeout { .. })
    }
}

/// Actor choreography errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChoreographyError {
    #[error("Actor spawn failed for role '{role}' ({blueprint}): {source}")]
    ActorSpawn { role: String, blueprint: String, source: SimulatorError },

    #[error("Actor {actor} is already owned by another instance")]
    HandleConflict { actor: ActorId },

    #[error("No blueprint resolved for role '{role}'")]
    UnresolvedBlueprint { role: String },

    #[error(transparent)]
    Simulator(SimulatorError),
}

impl ChoreographyError {
    pub fn is_fatal(&self) -> bool {
        match self {
            ChoreographyError::ActorSpawn { source, .. } => source.is_fatal(),
            ChoreographyError::HandleConflict { .. } | ChoreographyError::UnresolvedBlueprint { .. } => false,
            ChoreographyError::Simulator(err) => err.is_fatal(),
        }
    }
}

/// Assessment record export errors
#[derive(Error, Debug)]
pub enum RecorderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] rmp_serde::encode::Error),

    #[error("Deserialization error: {0}")]
    Deserialization(#[from] rmp_serde::decode::Error),

    #[error("Decompression error")]
    Decompression,

    #[error("Checksum mismatch")]
    ChecksumMismatch,

    #[error("Record data corrupted")]
    Corrupted,

    #[error("Record schema {found} is newer than supported {expected}")]
    VersionMismatch { found: u32, expected: u32 },

    #[error("Destination rejected write: {0}")]
    Destination(String),
}

/// Orchestrator-level errors
#[derive(Error, Debug)]
pub enum RunError {
    #[error("Entry {entry} ({corner_case}) parameter mismatch: {violation}")]
    SchemaMismatch { entry: usize, corner_case: CornerCaseId, violation: SchemaViolation },

    #[error("Invalid run configuration: {0}")]
    Validation(String),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Environment(#[from] EnvironmentError),

    #[error("Fatal simulator failure: {0}")]
    Fatal(SimulatorError),

    #[error("Operation '{operation}' not allowed in phase {phase}")]
    InvalidPhase { operation: &'static str, phase: &'static str },

    #[error(transparent)]
    Recorder(#[from] RecorderError),
}

impl RunError {
    /// Validation failures surface at start() and are never corrected silently.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            RunError::SchemaMismatch { .. }
                | RunError::Validation(_)
                | RunError::Catalog(_)
                | RunError::Environment(EnvironmentError::InvalidPreset(_))
                | RunError::Environment(EnvironmentError::OutOfRange { .. })
        )
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, RunError::Fatal(_))
    }
}
