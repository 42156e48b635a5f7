//! External collaborator traits consumed by the evolution driver.
//!
//! The driver sequences these; it does not implement them. Numerical
//! kernels, refinement criteria, and output formats all live behind
//! these seams in application crates.

use cairn_comm::Topology;
use cairn_core::{TaskListStatus, TimeManager};
use cairn_mesh::{Block, Mesh};

/// Runs the ordered set of per-block operations for one cycle.
///
/// The driver treats any aggregate result other than
/// [`TaskListStatus::Complete`] as fatal for the whole run — there is no
/// partial-cycle retry.
pub trait TaskExecutor {
    /// Execute this cycle's task list on one block.
    fn run(&mut self, block: &mut Block, tm: &TimeManager) -> TaskListStatus;
}

/// Computes a block's stable time-step estimate.
///
/// Must be callable any number of times without side effects on
/// simulation state; the driver re-runs it from scratch after every
/// topology change.
pub trait TimestepEstimator {
    /// Estimate the time step for one block.
    fn estimate(&self, block: &Block) -> f64;
}

/// What a refinement/load-balance pass did to the mesh.
#[derive(Debug, Default)]
pub struct RebalanceOutcome {
    /// Whether the set of blocks or their adjacency changed. When true,
    /// every block's time-step estimate is stale and persistent
    /// channels must be rebuilt.
    pub topology_changed: bool,
    /// The replacement neighbor graph, when it changed.
    pub topology: Option<Topology>,
}

/// Decides block refinement/derefinement and redistributes blocks.
///
/// The only component allowed to create or destroy blocks.
pub trait RebalanceEngine {
    /// Run one adaptation/load-balance pass over the mesh.
    fn rebalance(&mut self, mesh: &mut Mesh) -> RebalanceOutcome;
}

/// Emits scheduled output artifacts (checkpoints, visualization dumps).
///
/// Called once before the loop, on every in-loop cadence the sink
/// chooses to honor, and once after the loop on a normal exit. Formats
/// are the sink's business; the driver only supplies the mesh and the
/// clock.
pub trait OutputSink {
    /// Write whatever artifacts are due at the current cycle.
    fn write_outputs(&mut self, mesh: &Mesh, tm: &TimeManager);
}

/// User-level post-processing hook, run once after a normal loop exit.
pub type PostLoopHook = Box<dyn FnMut(&mut Mesh, &TimeManager)>;
