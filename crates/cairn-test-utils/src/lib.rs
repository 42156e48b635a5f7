//! Test utilities and mock collaborators for Cairn development.
//!
//! Provides mock implementations of the driver's collaborator traits
//! ([`TaskExecutor`], [`TimestepEstimator`], [`RebalanceEngine`],
//! [`OutputSink`]), a capturing diagnostics stream, and small mesh
//! builders for exchange scenarios.

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use cairn_comm::Topology;
use cairn_core::{BlockId, TaskListStatus, TimeManager};
use cairn_driver::{OutputSink, RebalanceEngine, RebalanceOutcome, TaskExecutor, TimestepEstimator};
use cairn_mesh::{Block, BlockExtents, Mesh, VarArray4};

// ── Task execution ──────────────────────────────────────────────

/// Task executor that completes every cycle.
#[derive(Debug, Default)]
pub struct CompletingExecutor;

impl TaskExecutor for CompletingExecutor {
    fn run(&mut self, _: &mut Block, _: &TimeManager) -> TaskListStatus {
        TaskListStatus::Complete
    }
}

/// Task executor that reports incomplete once a configured cycle is
/// reached, completing everything before it.
#[derive(Debug)]
pub struct FailingExecutor {
    pub fail_at_cycle: u64,
}

impl FailingExecutor {
    pub fn new(fail_at_cycle: u64) -> Self {
        Self { fail_at_cycle }
    }
}

impl TaskExecutor for FailingExecutor {
    fn run(&mut self, _: &mut Block, tm: &TimeManager) -> TaskListStatus {
        if tm.cycle >= self.fail_at_cycle {
            TaskListStatus::Incomplete
        } else {
            TaskListStatus::Complete
        }
    }
}

// ── Time-step estimation ────────────────────────────────────────

/// Estimator returning the same value for every block.
#[derive(Debug)]
pub struct FixedEstimator(pub f64);

impl TimestepEstimator for FixedEstimator {
    fn estimate(&self, _: &Block) -> f64 {
        self.0
    }
}

/// Estimator with a per-block table; blocks not in the table get
/// infinity (they never constrain the step).
#[derive(Debug, Default)]
pub struct TableEstimator {
    pub estimates: Vec<(BlockId, f64)>,
}

impl TableEstimator {
    pub fn new(estimates: Vec<(BlockId, f64)>) -> Self {
        Self { estimates }
    }
}

impl TimestepEstimator for TableEstimator {
    fn estimate(&self, block: &Block) -> f64 {
        self.estimates
            .iter()
            .find(|(id, _)| *id == block.id)
            .map(|&(_, dt)| dt)
            .unwrap_or(f64::INFINITY)
    }
}

// ── Rebalancing ─────────────────────────────────────────────────

/// Rebalancer that never changes the topology.
#[derive(Debug, Default)]
pub struct StaticRebalancer;

impl RebalanceEngine for StaticRebalancer {
    fn rebalance(&mut self, _: &mut Mesh) -> RebalanceOutcome {
        RebalanceOutcome::default()
    }
}

/// Rebalancer that inserts one block and swaps in a new topology when
/// the mesh reaches a scripted cycle (tracked by call count).
pub struct SplittingRebalancer {
    split_on_call: u64,
    calls: u64,
    new_block: Option<Block>,
    new_topology: Option<Topology>,
}

impl SplittingRebalancer {
    /// Split on the `split_on_call`-th rebalance pass (1-based),
    /// inserting `block` and publishing `topology`.
    pub fn new(split_on_call: u64, block: Block, topology: Topology) -> Self {
        Self {
            split_on_call,
            calls: 0,
            new_block: Some(block),
            new_topology: Some(topology),
        }
    }
}

impl RebalanceEngine for SplittingRebalancer {
    fn rebalance(&mut self, mesh: &mut Mesh) -> RebalanceOutcome {
        self.calls += 1;
        if self.calls != self.split_on_call {
            return RebalanceOutcome::default();
        }
        if let Some(block) = self.new_block.take() {
            mesh.insert_block(block);
        }
        RebalanceOutcome {
            topology_changed: true,
            topology: self.new_topology.take(),
        }
    }
}

// ── Outputs and diagnostics capture ─────────────────────────────

/// Output sink that drops everything.
#[derive(Debug, Default)]
pub struct NullOutputs;

impl OutputSink for NullOutputs {
    fn write_outputs(&mut self, _: &Mesh, _: &TimeManager) {}
}

/// Output sink that records the clock at every call.
#[derive(Debug, Default)]
pub struct RecordingOutputs {
    pub calls: Vec<(u64, f64)>,
}

impl OutputSink for RecordingOutputs {
    fn write_outputs(&mut self, _: &Mesh, tm: &TimeManager) {
        self.calls.push((tm.cycle, tm.time));
    }
}

/// Shared in-memory stream for capturing diagnostics output.
///
/// Clone it, hand one copy to a `DiagnosticsSink`, and read the other
/// back with [`text`](CaptureStream::text).
#[derive(Clone, Debug, Default)]
pub struct CaptureStream(Arc<Mutex<Vec<u8>>>);

impl CaptureStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far, as UTF-8.
    pub fn text(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }

    /// The captured lines.
    pub fn lines(&self) -> Vec<String> {
        self.text().lines().map(str::to_string).collect()
    }
}

impl Write for CaptureStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

// ── Mesh builders ───────────────────────────────────────────────

/// A mesh of `n` cubic blocks with one scalar variable `"rho"` each,
/// interiors filled with `id + 1` so exchanges are distinguishable.
pub fn uniform_mesh(n: u64, dims: [usize; 3], nghost: usize) -> Mesh {
    let mut mesh = Mesh::new(false);
    for id in 0..n {
        mesh.seed_block(filled_block(BlockId(id), dims, nghost, (id + 1) as f64));
    }
    mesh
}

/// One block with a scalar `"rho"` variable filled with `value`.
pub fn filled_block(id: BlockId, dims: [usize; 3], nghost: usize, value: f64) -> Block {
    let extents = BlockExtents::new(dims, nghost);
    let [nx1, nx2, nx3] = extents.alloc_dims();
    let mut rho = VarArray4::new(1, nx3, nx2, nx1);
    rho.fill(value);
    let mut block = Block::new(id, extents);
    block.fields.add("rho", rho);
    block
}
