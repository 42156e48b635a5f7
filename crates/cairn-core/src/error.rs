//! Error types for the Cairn control core.
//!
//! One enum per subsystem: mesh lookups, the communication substrate,
//! startup/configuration, and the driver. Recoverable conditions (a
//! not-yet-arrived receive) are handled by polling inside the boundary
//! machine and never surface here; everything in this module propagates
//! to the driver, the single point that converts failures into a
//! terminal status.

use std::error::Error;
use std::fmt;

use crate::id::{BlockId, ChannelTag, Rank};

/// Aggregate result of running the per-block task list for one cycle.
///
/// Anything other than `Complete` is fatal for the run — there is no
/// partial-cycle retry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskListStatus {
    /// Every task on every block completed.
    Complete,
    /// At least one task did not complete.
    Incomplete,
}

/// Errors from mesh, field-container, and swarm lookups.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MeshError {
    /// Named grid variable is not present in a field container.
    VariableNotFound {
        /// The requested label.
        label: String,
    },
    /// Named swarm is not present in a swarm container.
    SwarmNotFound {
        /// The requested label.
        label: String,
    },
    /// Named attribute is not present in a swarm.
    AttributeNotFound {
        /// The owning swarm.
        swarm: String,
        /// The requested attribute label.
        label: String,
    },
    /// No block with this ID exists on this process.
    BlockNotFound {
        /// The requested block.
        id: BlockId,
    },
}

impl fmt::Display for MeshError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::VariableNotFound { label } => write!(f, "variable '{label}' not found"),
            Self::SwarmNotFound { label } => write!(f, "swarm '{label}' not found"),
            Self::AttributeNotFound { swarm, label } => {
                write!(f, "attribute '{label}' not found in swarm '{swarm}'")
            }
            Self::BlockNotFound { id } => write!(f, "block {id} not owned by this process"),
        }
    }
}

impl Error for MeshError {}

/// Errors from the boundary-exchange substrate.
///
/// Call-order violations are programming defects, rejected at the
/// interface so they fail loudly instead of corrupting ghost data.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommError {
    /// A boundary operation was called in a state that does not permit it.
    IllegalTransition {
        /// The operation that was attempted.
        op: &'static str,
        /// Name of the state the entity was in.
        state: &'static str,
    },
    /// `clear_boundary` was called with a phase other than the one passed
    /// to the matching `start_receiving`.
    PhaseMismatch {
        /// Phase name given to `start_receiving`.
        started: &'static str,
        /// Phase name given to `clear_boundary`.
        cleared: &'static str,
    },
    /// Boundary operations were called before persistent channels were
    /// set up for the current topology.
    ChannelsNotReady,
    /// A topology link references a tag in the fabric-reserved namespace.
    ReservedTag {
        /// The offending tag.
        tag: ChannelTag,
    },
    /// A peer rank index is outside the fabric world.
    RankOutOfRange {
        /// The requested rank.
        rank: Rank,
        /// Number of ranks in the world.
        world: u32,
    },
    /// The peer side of a channel has been dropped.
    ChannelClosed {
        /// The peer rank.
        rank: Rank,
    },
    /// A received payload length does not match the destination range.
    SizeMismatch {
        /// Elements expected by the destination range.
        expected: usize,
        /// Elements actually received.
        got: usize,
    },
    /// A topology link or departure references a block this process does
    /// not own — the topology is stale.
    UnknownBlock {
        /// The referenced block.
        id: BlockId,
    },
}

impl fmt::Display for CommError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IllegalTransition { op, state } => {
                write!(f, "boundary op '{op}' illegal in state {state}")
            }
            Self::PhaseMismatch { started, cleared } => {
                write!(f, "clear_boundary({cleared}) does not match start_receiving({started})")
            }
            Self::ChannelsNotReady => {
                write!(f, "persistent channels not set up for current topology")
            }
            Self::ReservedTag { tag } => write!(f, "tag {tag} is in the reserved namespace"),
            Self::RankOutOfRange { rank, world } => {
                write!(f, "rank {rank} outside world of {world} ranks")
            }
            Self::ChannelClosed { rank } => write!(f, "channel to rank {rank} closed"),
            Self::SizeMismatch { expected, got } => {
                write!(f, "payload size mismatch: expected {expected} elements, got {got}")
            }
            Self::UnknownBlock { id } => {
                write!(f, "block {id} not owned by this process (stale topology)")
            }
        }
    }
}

impl Error for CommError {}

/// Fatal startup failures, detected before the evolution loop begins.
#[derive(Debug)]
pub enum SetupError {
    /// The run directory could not be created or entered.
    RunDir {
        /// The requested directory.
        path: String,
        /// The underlying I/O error.
        source: std::io::Error,
    },
    /// Time configuration failed validation.
    InvalidTimeConfig {
        /// Description of the violated invariant.
        reason: String,
    },
    /// Driver configuration failed validation.
    InvalidDriverConfig {
        /// Description of the violated invariant.
        reason: String,
    },
    /// The communication fabric could not be constructed.
    Fabric {
        /// Description of the failure.
        reason: String,
    },
}

impl fmt::Display for SetupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RunDir { path, source } => {
                write!(f, "cannot enter run directory '{path}': {source}")
            }
            Self::InvalidTimeConfig { reason } => write!(f, "invalid time config: {reason}"),
            Self::InvalidDriverConfig { reason } => write!(f, "invalid driver config: {reason}"),
            Self::Fabric { reason } => write!(f, "fabric setup failed: {reason}"),
        }
    }
}

impl Error for SetupError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::RunDir { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Errors surfaced by the evolution driver.
///
/// The driver maps these onto its terminal status: every variant ends the
/// run as `Failed` except where the stop token records a wall-clock cause.
#[derive(Debug)]
pub enum DriverError {
    /// The task-list executor reported an incomplete cycle.
    TasksIncomplete {
        /// The cycle that failed.
        cycle: u64,
    },
    /// A boundary-exchange failure.
    Comm(CommError),
    /// A mesh lookup failure during exchange or estimation.
    Mesh(MeshError),
    /// A startup failure.
    Setup(SetupError),
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TasksIncomplete { cycle } => {
                write!(f, "task list failed to complete all tasks in cycle {cycle}")
            }
            Self::Comm(e) => write!(f, "boundary exchange: {e}"),
            Self::Mesh(e) => write!(f, "mesh: {e}"),
            Self::Setup(e) => write!(f, "setup: {e}"),
        }
    }
}

impl Error for DriverError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Comm(e) => Some(e),
            Self::Mesh(e) => Some(e),
            Self::Setup(e) => Some(e),
            Self::TasksIncomplete { .. } => None,
        }
    }
}

impl From<CommError> for DriverError {
    fn from(e: CommError) -> Self {
        Self::Comm(e)
    }
}

impl From<MeshError> for DriverError {
    fn from(e: MeshError) -> Self {
        Self::Mesh(e)
    }
}

impl From<SetupError> for DriverError {
    fn from(e: SetupError) -> Self {
        Self::Setup(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_formats_name_context() {
        let e = MeshError::VariableNotFound {
            label: "density".to_string(),
        };
        assert_eq!(e.to_string(), "variable 'density' not found");

        let e = CommError::IllegalTransition {
            op: "send_boundary_buffers",
            state: "Idle",
        };
        assert!(e.to_string().contains("send_boundary_buffers"));
        assert!(e.to_string().contains("Idle"));
    }

    #[test]
    fn driver_error_chains_source() {
        let e = DriverError::Comm(CommError::ChannelsNotReady);
        assert!(e.source().is_some());
        let e = DriverError::TasksIncomplete { cycle: 5 };
        assert!(e.source().is_none());
        assert!(e.to_string().contains("cycle 5"));
    }
}
