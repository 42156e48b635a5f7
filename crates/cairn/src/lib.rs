//! Cairn: the control core for block-structured adaptive simulation
//! engines.
//!
//! This is the top-level facade crate that re-exports the public API
//! from all Cairn sub-crates. For most users, adding `cairn` as a
//! single dependency is sufficient.
//!
//! Cairn advances a distributed collection of mesh blocks through
//! discrete time steps: per-cycle task execution, globally-consistent
//! time-step selection, halo exchange between neighboring blocks,
//! adaptive refinement/rebalance hooks, and graceful termination. The
//! physics itself — flux kernels, refinement criteria, output formats —
//! plugs in behind the collaborator traits in [`driver::collab`].
//!
//! # Quick start
//!
//! ```rust
//! use cairn::prelude::*;
//! use cairn::comm::{Fabric, SoloCollective};
//! use cairn::mesh::{Block, BlockExtents};
//!
//! // One block, no neighbors: the smallest possible world.
//! struct Idle;
//! impl TaskExecutor for Idle {
//!     fn run(&mut self, _: &mut Block, _: &TimeManager) -> TaskListStatus {
//!         TaskListStatus::Complete
//!     }
//! }
//! struct Fixed;
//! impl TimestepEstimator for Fixed {
//!     fn estimate(&self, _: &Block) -> f64 { 0.25 }
//! }
//! struct NoAmr;
//! impl RebalanceEngine for NoAmr {
//!     fn rebalance(&mut self, _: &mut Mesh) -> RebalanceOutcome {
//!         RebalanceOutcome::default()
//!     }
//! }
//! struct NoOut;
//! impl OutputSink for NoOut {
//!     fn write_outputs(&mut self, _: &Mesh, _: &TimeManager) {}
//! }
//!
//! let mut mesh = Mesh::new(false);
//! mesh.seed_block(Block::new(BlockId(0), BlockExtents::new([4, 4, 4], 1)));
//!
//! let transport = Fabric::connect(1).unwrap().pop().unwrap();
//! let mut driver = EvolutionDriver::new(DriverConfig {
//!     rank: Rank(0),
//!     time: TimeConfig { time_limit: 1.0, cycle_limit: 10, output_cadence: 0 },
//!     mesh,
//!     topology: Topology::default(),
//!     transport: Box::new(transport),
//!     collective: Box::new(SoloCollective),
//!     executor: Box::new(Idle),
//!     estimator: Box::new(Fixed),
//!     rebalancer: Box::new(NoAmr),
//!     outputs: Box::new(NoOut),
//!     post_loop: None,
//!     stop: StopToken::new(),
//!     diagnostics: DiagnosticsSink::new(Rank(0), Box::new(std::io::sink())),
//!     wall_clock_budget: None,
//!     run_dir: None,
//! }).unwrap();
//!
//! assert_eq!(driver.execute(), DriverStatus::Complete);
//! assert_eq!(driver.time().time, 1.0);
//! ```
//!
//! # Modules
//!
//! Each module corresponds to a sub-crate. Use them for types not in
//! the prelude:
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `cairn-core` | IDs, time manager, stop token, errors |
//! | [`mesh`] | `cairn-mesh` | Blocks, field containers, swarms |
//! | [`comm`] | `cairn-comm` | Buffer codec, fabric, boundary machines |
//! | [`driver`] | `cairn-driver` | Evolution loop and reporting |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Core types, the time manager, and error enums (`cairn-core`).
pub use cairn_core as types;

/// Blocks, field containers, and particle swarms (`cairn-mesh`).
pub use cairn_mesh as mesh;

/// Buffer codec, rank fabric, and boundary exchange (`cairn-comm`).
pub use cairn_comm as comm;

/// The evolution driver loop and diagnostics (`cairn-driver`).
pub use cairn_driver as driver;

/// Common imports for typical Cairn usage.
///
/// ```rust
/// use cairn::prelude::*;
/// ```
pub mod prelude {
    // Core types and errors
    pub use cairn_core::{
        BlockId, ChannelTag, CommError, DriverError, MeshError, Rank, SetupError, StopCause,
        StopToken, TaskListStatus, TimeConfig, TimeManager,
    };

    // Mesh
    pub use cairn_mesh::{Block, FieldContainer, Mesh, Swarm, SwarmContainer, VarArray4};

    // Communication substrate
    pub use cairn_comm::{
        BoundaryState, Collective, ExchangePhase, FieldBoundarySet, Route, SwarmBoundarySet,
        TopoLink, Topology, Transport,
    };

    // Driver
    pub use cairn_driver::{
        DiagnosticsSink, DriverConfig, DriverStatus, EvolutionDriver, OutputSink, RebalanceEngine,
        RebalanceOutcome, TaskExecutor, TimestepEstimator,
    };
}
