//! The evolution driver: the outer time-evolution loop.
//!
//! [`EvolutionDriver::execute`] runs cycles until a bound is reached, a
//! failure occurs, or a stop is requested. Each cycle: emit the cycle
//! diagnostics line, run the task list on every block, exchange halo
//! data, advance the clock, give the refinement/load-balance engine its
//! pass, re-derive the global step, emit scheduled outputs, and poll
//! the stop token. The driver is the single writer of the
//! [`TimeManager`] and the single point that converts failures into a
//! terminal status.
//!
//! # Ownership model
//!
//! The driver owns the mesh, both boundary sets, the transport and
//! collective endpoints, and every collaborator. All mutating methods
//! take `&mut self`; one control thread per process drives the loop.

use std::fmt;
use std::time::{Duration, Instant};

use cairn_comm::{
    Collective, ExchangePhase, FieldBoundarySet, SwarmBoundarySet, Topology, Transport,
};
use cairn_core::{
    DriverError, Rank, SetupError, StopCause, StopToken, TaskListStatus, TimeConfig, TimeManager,
};
use cairn_mesh::Mesh;

use crate::collab::{OutputSink, PostLoopHook, RebalanceEngine, TaskExecutor, TimestepEstimator};
use crate::diagnostics::DiagnosticsSink;
use crate::rundir::prepare_run_dir;

// ── DriverStatus ────────────────────────────────────────────────

/// How a run ended. Mutually exclusive; reported exactly once, at loop
/// exit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DriverStatus {
    /// A configured bound (time or cycle limit) was reached normally.
    Complete,
    /// Task execution did not complete, or an unrecoverable error
    /// occurred (operator interrupt included).
    Failed,
    /// The wall-clock budget ended the run early.
    Timeout,
}

// ── DriverConfig ────────────────────────────────────────────────

/// Everything the driver needs to run: the world, its channel
/// endpoints, and the external collaborators. Consumed by
/// [`EvolutionDriver::new`].
pub struct DriverConfig {
    /// This process's rank (rank 0 reports).
    pub rank: Rank,
    /// Run bounds and diagnostics cadence.
    pub time: TimeConfig,
    /// The process-local block collection.
    pub mesh: Mesh,
    /// The initial neighbor graph.
    pub topology: Topology,
    /// Point-to-point channel endpoint.
    pub transport: Box<dyn Transport>,
    /// The distributed minimum-reduction.
    pub collective: Box<dyn Collective>,
    /// Per-block task execution.
    pub executor: Box<dyn TaskExecutor>,
    /// Per-block time-step estimation.
    pub estimator: Box<dyn TimestepEstimator>,
    /// Refinement/load-balance passes.
    pub rebalancer: Box<dyn RebalanceEngine>,
    /// Scheduled output artifacts.
    pub outputs: Box<dyn OutputSink>,
    /// Post-loop user hook, run on a normal exit only.
    pub post_loop: Option<PostLoopHook>,
    /// Cooperative termination flag, polled once per cycle.
    pub stop: StopToken,
    /// Cycle-line and report stream.
    pub diagnostics: DiagnosticsSink,
    /// Wall-clock budget; exceeding it ends the run as `Timeout`.
    pub wall_clock_budget: Option<Duration>,
    /// Run directory to create and enter before the loop; empty or
    /// `None` runs in place.
    pub run_dir: Option<String>,
}

// ── EvolutionDriver ─────────────────────────────────────────────

/// The top-level control loop for one process of the distributed run.
pub struct EvolutionDriver {
    rank: Rank,
    mesh: Mesh,
    tm: TimeManager,
    topology: Topology,
    field_bounds: FieldBoundarySet,
    swarm_bounds: SwarmBoundarySet,
    transport: Box<dyn Transport>,
    collective: Box<dyn Collective>,
    executor: Box<dyn TaskExecutor>,
    estimator: Box<dyn TimestepEstimator>,
    rebalancer: Box<dyn RebalanceEngine>,
    outputs: Box<dyn OutputSink>,
    post_loop: Option<PostLoopHook>,
    stop: StopToken,
    diag: DiagnosticsSink,
    wall_clock_budget: Option<Duration>,
    started: Instant,
}

impl EvolutionDriver {
    /// Validate the configuration, enter the run directory, and set up
    /// persistent channels for the initial topology.
    ///
    /// # Errors
    ///
    /// [`SetupError`] for an invalid configuration, an unusable run
    /// directory, or a channel-setup failure — all fatal before the
    /// loop begins.
    pub fn new(config: DriverConfig) -> Result<Self, SetupError> {
        config.time.validate()?;
        if let Some(dir) = &config.run_dir {
            prepare_run_dir(dir)?;
        }

        let mut field_bounds = FieldBoundarySet::new();
        let mut swarm_bounds = SwarmBoundarySet::new();
        field_bounds
            .setup_persistent_channels(&config.topology, &config.mesh)
            .map_err(|e| SetupError::Fabric {
                reason: e.to_string(),
            })?;
        swarm_bounds
            .setup_persistent_channels(&config.topology, &config.mesh)
            .map_err(|e| SetupError::Fabric {
                reason: e.to_string(),
            })?;

        let tm = TimeManager::new(&config.time);
        Ok(Self {
            rank: config.rank,
            mesh: config.mesh,
            tm,
            topology: config.topology,
            field_bounds,
            swarm_bounds,
            transport: config.transport,
            collective: config.collective,
            executor: config.executor,
            estimator: config.estimator,
            rebalancer: config.rebalancer,
            outputs: config.outputs,
            post_loop: config.post_loop,
            stop: config.stop,
            diag: config.diagnostics,
            wall_clock_budget: config.wall_clock_budget,
            started: Instant::now(),
        })
    }

    /// Run the evolution loop to a terminal status.
    ///
    /// Exactly one terminal report is emitted, whichever way the run
    /// ends. The post-loop hook and final outputs run only on a normal
    /// exit.
    pub fn execute(&mut self) -> DriverStatus {
        self.started = Instant::now();
        let status = match self.run() {
            Ok(status) => status,
            Err(err) => {
                self.diag.error_line(&err);
                DriverStatus::Failed
            }
        };
        if status == DriverStatus::Complete {
            if let Some(hook) = self.post_loop.as_mut() {
                hook(&mut self.mesh, &self.tm);
            }
            self.outputs.write_outputs(&self.mesh, &self.tm);
        }
        self.diag.report(status, &self.tm, &self.mesh);
        status
    }

    fn run(&mut self) -> Result<DriverStatus, DriverError> {
        self.initialize_block_time_steps();
        self.set_global_time_step()?;
        // Fill ghosts once before the first cycle so the task list
        // starts from consistent boundaries.
        self.exchange_boundaries(ExchangePhase::Initialization)?;
        self.outputs.write_outputs(&self.mesh, &self.tm);
        self.mesh.mbcnt = 0;

        while self.tm.keep_going() {
            self.diag.cycle_line(&self.tm);

            self.step_cycle()?;

            self.tm.advance();
            self.mesh.mbcnt += self.mesh.nbtotal() as u64;
            self.mesh.steps_since_balance += 1;

            let outcome = self.rebalancer.rebalance(&mut self.mesh);
            if outcome.topology_changed {
                self.mesh.steps_since_balance = 0;
                if let Some(topo) = outcome.topology {
                    self.topology = topo;
                }
                // Stale estimates are unsafe after a topology change.
                self.initialize_block_time_steps();
                self.field_bounds
                    .setup_persistent_channels(&self.topology, &self.mesh)?;
                self.swarm_bounds
                    .setup_persistent_channels(&self.topology, &self.mesh)?;
            }

            self.set_global_time_step()?;

            if self.tm.time < self.tm.time_limit {
                // Skip the final output here; it happens after the loop.
                self.outputs.write_outputs(&self.mesh, &self.tm);
            }

            if let Some(budget) = self.wall_clock_budget {
                if self.started.elapsed() >= budget {
                    self.stop.request(StopCause::WallClock);
                }
            }
            if let Some(cause) = self.stop.cause() {
                return Ok(match cause {
                    StopCause::WallClock => DriverStatus::Timeout,
                    StopCause::Interrupt => DriverStatus::Failed,
                });
            }
        }

        Ok(DriverStatus::Complete)
    }

    /// One cycle's work: the task list on every block, then the
    /// full-step halo exchange.
    fn step_cycle(&mut self) -> Result<(), DriverError> {
        for block in self.mesh.blocks_mut() {
            if self.executor.run(block, &self.tm) != TaskListStatus::Complete {
                return Err(DriverError::TasksIncomplete {
                    cycle: self.tm.cycle,
                });
            }
        }
        self.exchange_boundaries(ExchangePhase::FullStep)?;
        Ok(())
    }

    /// One complete exchange for fields then swarms, with the
    /// clear-per-start discipline held on every exit path: whatever
    /// send/wait does, the phase is cleared before this returns.
    fn exchange_boundaries(&mut self, phase: ExchangePhase) -> Result<(), DriverError> {
        self.field_bounds.start_receiving(phase)?;
        let mut result = self
            .field_bounds
            .send_boundary_buffers(&self.mesh, self.transport.as_mut());
        if result.is_ok() {
            result = self
                .field_bounds
                .receive_and_set_boundaries_with_wait(&mut self.mesh, self.transport.as_mut());
        }
        let cleared = self.field_bounds.clear_boundary(phase);
        result?;
        cleared?;

        self.swarm_bounds.start_receiving(phase)?;
        let mut result = self
            .swarm_bounds
            .send_boundary_buffers(&mut self.mesh, self.transport.as_mut());
        if result.is_ok() {
            result = self
                .swarm_bounds
                .receive_and_set_boundaries_with_wait(&mut self.mesh, self.transport.as_mut());
        }
        let cleared = self.swarm_bounds.clear_boundary(phase);
        result?;
        cleared?;
        Ok(())
    }

    /// Recompute every block's time-step estimate from scratch.
    fn initialize_block_time_steps(&mut self) {
        for block in self.mesh.blocks_mut() {
            let dt = self.estimator.estimate(block);
            block.set_block_timestep(dt);
        }
    }

    /// Select the global step: local minimum over block estimates,
    /// clamped to twice the previous step, reduced to the world-wide
    /// minimum, then clamped so the run cannot overshoot the end time.
    fn set_global_time_step(&mut self) -> Result<(), DriverError> {
        let dt_max = 2.0 * self.tm.dt;
        let mut dt = f64::MAX;
        for block in self.mesh.blocks() {
            dt = dt.min(block.new_dt());
        }
        dt = dt.min(dt_max);

        dt = self.collective.min_reduce(dt)?;

        if self.tm.time < self.tm.time_limit && (self.tm.time_limit - self.tm.time) < dt {
            // The step would take us past the desired endpoint.
            dt = self.tm.time_limit - self.tm.time;
        }
        self.tm.dt = dt;
        Ok(())
    }

    /// This process's rank.
    pub fn rank(&self) -> Rank {
        self.rank
    }

    /// The process clock (read-only outside the driver).
    pub fn time(&self) -> &TimeManager {
        &self.tm
    }

    /// The process-local mesh.
    pub fn mesh(&self) -> &Mesh {
        &self.mesh
    }

    /// A clone of the stop token, for wiring into signal handlers.
    pub fn stop_token(&self) -> StopToken {
        self.stop.clone()
    }
}

impl fmt::Debug for EvolutionDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvolutionDriver")
            .field("cycle", &self.tm.cycle)
            .field("time", &self.tm.time)
            .field("dt", &self.tm.dt)
            .field("nbtotal", &self.mesh.nbtotal())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cairn_comm::Fabric;
    use cairn_core::BlockId;
    use cairn_mesh::{Block, BlockExtents};

    struct AlwaysComplete;
    impl TaskExecutor for AlwaysComplete {
        fn run(&mut self, _: &mut Block, _: &TimeManager) -> TaskListStatus {
            TaskListStatus::Complete
        }
    }

    /// Estimates looked up per block ID; unknown blocks get infinity.
    struct TableEstimator(Vec<(BlockId, f64)>);
    impl TimestepEstimator for TableEstimator {
        fn estimate(&self, block: &Block) -> f64 {
            self.0
                .iter()
                .find(|(id, _)| *id == block.id)
                .map(|&(_, dt)| dt)
                .unwrap_or(f64::INFINITY)
        }
    }

    struct NoRebalance;
    impl RebalanceEngine for NoRebalance {
        fn rebalance(&mut self, _: &mut Mesh) -> crate::collab::RebalanceOutcome {
            crate::collab::RebalanceOutcome::default()
        }
    }

    struct NoOutputs;
    impl OutputSink for NoOutputs {
        fn write_outputs(&mut self, _: &Mesh, _: &TimeManager) {}
    }

    fn four_block_mesh() -> Mesh {
        let mut mesh = Mesh::new(false);
        for id in 0..4u64 {
            mesh.seed_block(Block::new(BlockId(id), BlockExtents::new([4, 4, 4], 1)));
        }
        mesh
    }

    fn driver_with(estimates: Vec<(BlockId, f64)>, time: TimeConfig) -> EvolutionDriver {
        let transport = Fabric::connect(1).unwrap().pop().unwrap();
        EvolutionDriver::new(DriverConfig {
            rank: Rank(0),
            time,
            mesh: four_block_mesh(),
            topology: Topology::default(),
            transport: Box::new(transport),
            collective: Box::new(cairn_comm::SoloCollective),
            executor: Box::new(AlwaysComplete),
            estimator: Box::new(TableEstimator(estimates)),
            rebalancer: Box::new(NoRebalance),
            outputs: Box::new(NoOutputs),
            post_loop: None,
            stop: StopToken::new(),
            diagnostics: DiagnosticsSink::new(Rank(0), Box::new(std::io::sink())),
            wall_clock_budget: None,
            run_dir: None,
        })
        .unwrap()
    }

    fn staggered_estimates() -> Vec<(BlockId, f64)> {
        vec![
            (BlockId(0), 0.5),
            (BlockId(1), 0.3),
            (BlockId(2), 0.8),
            (BlockId(3), 0.3),
        ]
    }

    fn bounds(time_limit: f64, cycle_limit: u64) -> TimeConfig {
        TimeConfig {
            time_limit,
            cycle_limit,
            output_cadence: 0,
        }
    }

    #[test]
    fn global_step_takes_block_minimum_when_rate_cap_is_slack() {
        // Estimates {0.5, 0.3, 0.8, 0.3}, previous dt 0.2, headroom 1.0:
        // min estimate 0.3 < 2×0.2, no end clamp → dt = 0.3.
        let mut d = driver_with(staggered_estimates(), bounds(1.0, 100));
        d.initialize_block_time_steps();
        d.tm.dt = 0.2;
        d.set_global_time_step().unwrap();
        assert_eq!(d.tm.dt, 0.3);
    }

    #[test]
    fn global_step_is_capped_at_twice_previous() {
        // Same estimates, previous dt 0.1 → the 2× cap binds at 0.2.
        let mut d = driver_with(staggered_estimates(), bounds(1.0, 100));
        d.initialize_block_time_steps();
        d.tm.dt = 0.1;
        d.set_global_time_step().unwrap();
        assert_eq!(d.tm.dt, 0.2);
    }

    #[test]
    fn global_step_clamps_exactly_onto_the_end_time() {
        let mut d = driver_with(staggered_estimates(), bounds(1.0, 100));
        d.initialize_block_time_steps();
        d.tm.dt = 1.0;
        d.tm.time = 0.9;
        d.set_global_time_step().unwrap();
        // Exactly the remaining headroom, never less, never more.
        assert_eq!(d.tm.dt, 1.0 - 0.9);
    }

    #[test]
    fn first_cycle_step_is_estimate_driven() {
        // dt starts infinite, so 2×dt cannot bind on the first pass.
        let mut d = driver_with(staggered_estimates(), bounds(1.0, 100));
        d.initialize_block_time_steps();
        d.set_global_time_step().unwrap();
        assert_eq!(d.tm.dt, 0.3);
    }

    #[test]
    fn execute_stops_at_cycle_limit() {
        let mut d = driver_with(vec![(BlockId(0), 0.25)], bounds(1.0e9, 3));
        assert_eq!(d.execute(), DriverStatus::Complete);
        assert_eq!(d.time().cycle, 3);
    }

    #[test]
    fn execute_lands_exactly_on_the_time_limit() {
        // Estimates of 0.4 everywhere: 0.4 + 0.4 + clamped 0.2 = 1.0.
        let estimates = (0..4).map(|i| (BlockId(i), 0.4)).collect();
        let mut d = driver_with(estimates, bounds(1.0, 100));
        assert_eq!(d.execute(), DriverStatus::Complete);
        assert_eq!(d.time().time, 1.0);
        assert_eq!(d.time().cycle, 3);
    }

    #[test]
    fn wall_clock_budget_reports_timeout() {
        let mut d = driver_with(vec![(BlockId(0), 0.25)], bounds(1.0e9, 1_000_000));
        d.wall_clock_budget = Some(Duration::ZERO);
        assert_eq!(d.execute(), DriverStatus::Timeout);
        // The budget is polled at cycle end, so exactly one cycle ran.
        assert_eq!(d.time().cycle, 1);
    }

    #[test]
    fn operator_interrupt_reports_failed() {
        let mut d = driver_with(vec![(BlockId(0), 0.25)], bounds(1.0e9, 1_000_000));
        d.stop_token().request(StopCause::Interrupt);
        assert_eq!(d.execute(), DriverStatus::Failed);
        assert_eq!(d.time().cycle, 1);
    }

    #[test]
    fn mbcnt_accumulates_block_updates() {
        let mut d = driver_with(vec![(BlockId(0), 0.25)], bounds(1.0e9, 5));
        d.execute();
        // 4 blocks × 5 cycles.
        assert_eq!(d.mesh().mbcnt, 20);
    }

    #[test]
    fn post_loop_hook_runs_on_normal_exit_only() {
        use std::sync::atomic::{AtomicU32, Ordering};
        use std::sync::Arc;

        let calls = Arc::new(AtomicU32::new(0));
        let seen = calls.clone();

        let mut d = driver_with(vec![(BlockId(0), 0.25)], bounds(1.0e9, 2));
        d.post_loop = Some(Box::new(move |_, _| {
            seen.fetch_add(1, Ordering::Relaxed);
        }));
        d.execute();
        assert_eq!(calls.load(Ordering::Relaxed), 1);

        let calls = Arc::new(AtomicU32::new(0));
        let seen = calls.clone();
        let mut d = driver_with(vec![(BlockId(0), 0.25)], bounds(1.0e9, 10));
        d.post_loop = Some(Box::new(move |_, _| {
            seen.fetch_add(1, Ordering::Relaxed);
        }));
        d.stop_token().request(StopCause::Interrupt);
        d.execute();
        assert_eq!(calls.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn invalid_time_config_fails_at_construction() {
        let transport = Fabric::connect(1).unwrap().pop().unwrap();
        let result = EvolutionDriver::new(DriverConfig {
            rank: Rank(0),
            time: bounds(0.0, 1),
            mesh: four_block_mesh(),
            topology: Topology::default(),
            transport: Box::new(transport),
            collective: Box::new(cairn_comm::SoloCollective),
            executor: Box::new(AlwaysComplete),
            estimator: Box::new(TableEstimator(vec![])),
            rebalancer: Box::new(NoRebalance),
            outputs: Box::new(NoOutputs),
            post_loop: None,
            stop: StopToken::new(),
            diagnostics: DiagnosticsSink::new(Rank(0), Box::new(std::io::sink())),
            wall_clock_budget: None,
            run_dir: None,
        });
        assert!(matches!(result, Err(SetupError::InvalidTimeConfig { .. })));
    }
}
