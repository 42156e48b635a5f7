//! Evolution driver loop and terminal reporting for Cairn simulations.
//!
//! [`EvolutionDriver`] runs the outer time-evolution loop: per-cycle
//! task execution, the globally-consistent time-step selection, halo
//! exchange, adaptive refinement/rebalancing hooks, cooperative
//! termination, and the one terminal report. The numerical work itself
//! lives behind the collaborator traits in [`collab`] — the driver
//! sequences it, it never computes physics.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod collab;
pub mod diagnostics;
pub mod driver;
pub mod rundir;

pub use collab::{
    OutputSink, PostLoopHook, RebalanceEngine, RebalanceOutcome, TaskExecutor, TimestepEstimator,
};
pub use diagnostics::DiagnosticsSink;
pub use driver::{DriverConfig, DriverStatus, EvolutionDriver};
pub use rundir::prepare_run_dir;
