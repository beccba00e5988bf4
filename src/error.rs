use std::fmt;

/// Failures surfaced by the simulation core.
///
/// Per-plant and per-zone variants are isolated by the scheduler: they are
/// logged and the affected plant or zone is revisited on the next tick.
/// Only `Configuration` is fatal, and only at startup.
#[derive(Debug)]
pub enum SimError {
    /// Weather or geocode call failed or timed out
    TransientExternal { zone: String, reason: String },
    /// Optimistic concurrency mismatch persisted past the retry budget
    WriteConflict { plant_id: String, attempts: u32 },
    /// Plant missing, deleted mid-tick, or not simulatable
    InvalidEntity { plant_id: String, reason: String },
    /// Missing or inconsistent startup parameters
    Configuration(String),
    /// Underlying store failure
    Storage(anyhow::Error),
}

impl SimError {
    pub fn invalid(plant_id: &str, reason: impl Into<String>) -> Self {
        SimError::InvalidEntity {
            plant_id: plant_id.to_string(),
            reason: reason.into(),
        }
    }

    /// True for errors that are expected during normal operation and only
    /// delay convergence.
    pub fn is_skippable(&self) -> bool {
        matches!(
            self,
            SimError::TransientExternal { .. }
                | SimError::WriteConflict { .. }
                | SimError::InvalidEntity { .. }
        )
    }
}

impl fmt::Display for SimError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimError::TransientExternal { zone, reason } => {
                write!(f, "external lookup failed for zone {}: {}", zone, reason)
            }
            SimError::WriteConflict { plant_id, attempts } => write!(
                f,
                "write conflict on plant '{}' after {} attempt(s)",
                plant_id, attempts
            ),
            SimError::InvalidEntity { plant_id, reason } => {
                write!(f, "plant '{}' skipped: {}", plant_id, reason)
            }
            SimError::Configuration(msg) => write!(f, "invalid configuration: {}", msg),
            SimError::Storage(e) => write!(f, "storage error: {:#}", e),
        }
    }
}

impl std::error::Error for SimError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SimError::Storage(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

impl From<anyhow::Error> for SimError {
    fn from(e: anyhow::Error) -> Self {
        SimError::Storage(e)
    }
}
