//! End-to-end evolution-loop scenarios: failure handling, terminal
//! reporting, adaptive re-setup, and a two-rank world driven as
//! threads over the in-process fabric.

use std::thread;
use std::time::Duration;

use cairn_comm::{Endpoint, Fabric, Route, SoloCollective, TopoLink, Topology, Transport};
use cairn_core::{BlockId, ChannelTag, CommError, Rank, StopToken, TimeConfig};
use cairn_driver::{DiagnosticsSink, DriverConfig, DriverStatus, EvolutionDriver};
use cairn_mesh::Face;
use cairn_test_utils::{
    filled_block, uniform_mesh, CaptureStream, CompletingExecutor, FailingExecutor, FixedEstimator,
    NullOutputs, SplittingRebalancer, StaticRebalancer,
};

const DIMS: [usize; 3] = [4, 4, 4];
const NG: usize = 1;

fn time_config(time_limit: f64, cycle_limit: u64) -> TimeConfig {
    TimeConfig {
        time_limit,
        cycle_limit,
        output_cadence: 1,
    }
}

fn solo_transport() -> Endpoint {
    Fabric::connect(1).unwrap().pop().unwrap()
}

#[test]
fn task_failure_on_cycle_five_stops_the_run() {
    let capture = CaptureStream::new();
    let mut driver = EvolutionDriver::new(DriverConfig {
        rank: Rank(0),
        time: time_config(1.0e9, 100),
        mesh: uniform_mesh(2, DIMS, NG),
        topology: Topology::default(),
        transport: Box::new(solo_transport()),
        collective: Box::new(SoloCollective),
        executor: Box::new(FailingExecutor::new(5)),
        estimator: Box::new(FixedEstimator(0.25)),
        rebalancer: Box::new(StaticRebalancer),
        outputs: Box::new(NullOutputs),
        post_loop: None,
        stop: StopToken::new(),
        diagnostics: DiagnosticsSink::new(Rank(0), Box::new(capture.clone())),
        wall_clock_budget: None,
        run_dir: None,
    })
    .unwrap();

    assert_eq!(driver.execute(), DriverStatus::Failed);
    // The loop exits before cycle 6.
    assert_eq!(driver.time().cycle, 5);

    let text = capture.text();
    // The cycle-5 diagnostics line was printed before the failure.
    assert!(text.contains("cycle=5 time="), "missing cycle-5 line:\n{text}");
    assert!(text.contains("failed to complete all tasks in cycle 5"));
    assert!(text.contains("Driver failed."));
    // One report, not two.
    assert_eq!(text.matches("Driver failed.").count(), 1);
}

#[test]
fn complete_run_reports_clock_and_bounds() {
    let capture = CaptureStream::new();
    let mut driver = EvolutionDriver::new(DriverConfig {
        rank: Rank(0),
        time: time_config(1.0, 100),
        mesh: uniform_mesh(2, DIMS, NG),
        topology: Topology::default(),
        transport: Box::new(solo_transport()),
        collective: Box::new(SoloCollective),
        executor: Box::new(CompletingExecutor),
        estimator: Box::new(FixedEstimator(0.5)),
        rebalancer: Box::new(StaticRebalancer),
        outputs: Box::new(NullOutputs),
        post_loop: None,
        stop: StopToken::new(),
        diagnostics: DiagnosticsSink::new(Rank(0), Box::new(capture.clone())),
        wall_clock_budget: None,
        run_dir: None,
    })
    .unwrap();

    assert_eq!(driver.execute(), DriverStatus::Complete);
    assert_eq!(driver.time().time, 1.0);

    let text = capture.text();
    assert!(text.contains("Driver completed."));
    assert!(text.contains("time=1 cycle=2"));
    assert!(text.contains("tlim=1 nlim=100"));
}

#[test]
fn topology_change_reestimates_and_resetups_channels() {
    // The rebalancer splits on its second pass, adding block 2 next to
    // block 1 with a fresh topology epoch. The run must re-estimate the
    // new block and keep exchanging without protocol errors.
    let mut mesh = uniform_mesh(2, DIMS, NG);
    mesh.adaptive = true;

    let initial_topo = Topology {
        epoch: 1,
        links: vec![
            TopoLink {
                from: BlockId(0),
                to: BlockId(1),
                face: Face::X1Plus,
                route: Route::Local,
            },
            TopoLink {
                from: BlockId(1),
                to: BlockId(0),
                face: Face::X1Minus,
                route: Route::Local,
            },
        ],
    };
    let mut split_topo = initial_topo.clone();
    split_topo.epoch = 2;
    split_topo.links.push(TopoLink {
        from: BlockId(1),
        to: BlockId(2),
        face: Face::X1Plus,
        route: Route::Local,
    });
    split_topo.links.push(TopoLink {
        from: BlockId(2),
        to: BlockId(1),
        face: Face::X1Minus,
        route: Route::Local,
    });

    let capture = CaptureStream::new();
    let mut driver = EvolutionDriver::new(DriverConfig {
        rank: Rank(0),
        time: time_config(1.0e9, 6),
        mesh,
        topology: initial_topo,
        transport: Box::new(solo_transport()),
        collective: Box::new(SoloCollective),
        executor: Box::new(CompletingExecutor),
        estimator: Box::new(FixedEstimator(0.25)),
        rebalancer: Box::new(SplittingRebalancer::new(
            2,
            filled_block(BlockId(2), DIMS, NG, 3.0),
            split_topo,
        )),
        outputs: Box::new(NullOutputs),
        post_loop: None,
        stop: StopToken::new(),
        diagnostics: DiagnosticsSink::new(Rank(0), Box::new(capture.clone())),
        wall_clock_budget: None,
        run_dir: None,
    })
    .unwrap();

    assert_eq!(driver.execute(), DriverStatus::Complete);
    assert_eq!(driver.mesh().nbtotal(), 3);
    assert_eq!(driver.mesh().nbnew, 1);

    // The new block's estimate was recomputed, not left at the
    // constructor's placeholder.
    let b2 = driver.mesh().block(BlockId(2)).unwrap();
    assert_eq!(b2.new_dt(), 0.25);

    // After the split, block 2's ghosts carry block 1's interior.
    let rho = b2.fields.get("rho").unwrap();
    assert_eq!(rho.get(0, 2, 2, 0), 2.0);

    let text = capture.text();
    assert!(text.contains("Number of blocks = 3; 1 created, 0 destroyed during this simulation."));
}

#[test]
fn two_rank_world_agrees_on_the_global_step() {
    // Rank 0 owns block 0 (estimate 0.5), rank 1 owns block 1
    // (estimate 0.3). Both must select dt = 0.3 every cycle and walk
    // the identical clock. Boundary traffic and reductions ride
    // separate fabrics, the way MPI codes give collectives their own
    // communicator.
    let mut transports = Fabric::connect(2).unwrap();
    let tp1 = transports.pop().unwrap();
    let tp0 = transports.pop().unwrap();
    let mut collectives = Fabric::connect(2).unwrap();
    let co1 = collectives.pop().unwrap();
    let co0 = collectives.pop().unwrap();

    let topology = Topology {
        epoch: 1,
        links: vec![
            TopoLink {
                from: BlockId(0),
                to: BlockId(1),
                face: Face::X1Plus,
                route: Route::Remote {
                    rank: Rank(1),
                    tag: ChannelTag(10),
                },
            },
            TopoLink {
                from: BlockId(1),
                to: BlockId(0),
                face: Face::X1Minus,
                route: Route::Remote {
                    rank: Rank(0),
                    tag: ChannelTag(11),
                },
            },
        ],
    };

    let spawn_rank = |rank: u32,
                      transport: Endpoint,
                      collective: Endpoint,
                      estimate: f64,
                      topology: Topology| {
        thread::spawn(move || {
            let mut mesh = cairn_mesh::Mesh::new(false);
            mesh.seed_block(filled_block(BlockId(rank as u64), DIMS, NG, (rank + 1) as f64));

            let mut driver = EvolutionDriver::new(DriverConfig {
                rank: Rank(rank),
                time: time_config(1.2, 4),
                mesh,
                topology,
                transport: Box::new(transport),
                collective: Box::new(collective),
                executor: Box::new(CompletingExecutor),
                estimator: Box::new(FixedEstimator(estimate)),
                rebalancer: Box::new(StaticRebalancer),
                outputs: Box::new(NullOutputs),
                post_loop: None,
                stop: StopToken::new(),
                diagnostics: DiagnosticsSink::new(Rank(rank), Box::new(std::io::sink())),
                wall_clock_budget: None,
                run_dir: None,
            })
            .unwrap();
            let status = driver.execute();
            (status, driver.time().clone())
        })
    };

    let h0 = spawn_rank(0, tp0, co0, 0.5, topology.clone());
    let h1 = spawn_rank(1, tp1, co1, 0.3, topology);

    let (s0, t0) = h0.join().unwrap();
    let (s1, t1) = h1.join().unwrap();

    assert_eq!(s0, DriverStatus::Complete);
    assert_eq!(s1, DriverStatus::Complete);
    assert_eq!(t0.cycle, t1.cycle);
    assert_eq!(t0.time, t1.time);
    assert_eq!(t0.dt.to_bits(), t1.dt.to_bits(), "dt must be bit-identical");
    // The slower block's estimate won the reduction.
    assert_eq!(t0.time, 0.3 * t0.cycle as f64);
}

#[test]
fn transport_failure_surfaces_as_failed_with_report() {
    // Inject a post failure on the first full-step exchange; the run
    // must end as Failed with exactly one report.
    struct FailingTransport {
        inner: Endpoint,
        posts_before_failure: usize,
    }

    impl Transport for FailingTransport {
        fn rank(&self) -> Rank {
            self.inner.rank()
        }
        fn post(
            &mut self,
            to: Rank,
            tag: ChannelTag,
            payload: Vec<f64>,
        ) -> Result<(), CommError> {
            if self.posts_before_failure == 0 {
                return Err(CommError::ChannelClosed { rank: to });
            }
            self.posts_before_failure -= 1;
            self.inner.post(to, tag, payload)
        }
        fn poll(&mut self, tag: ChannelTag) -> Option<Vec<f64>> {
            self.inner.poll(tag)
        }
        fn wait(&mut self, tag: ChannelTag) -> Result<Vec<f64>, CommError> {
            self.inner.wait(tag)
        }
    }

    // Self-loop remote links on a one-rank world: the serialized path
    // without a second thread. Four posts succeed (the initialization
    // exchange: two field buffers, two swarm buffers), then the first
    // full-step field post fails.
    let topology = Topology {
        epoch: 1,
        links: vec![
            TopoLink {
                from: BlockId(0),
                to: BlockId(1),
                face: Face::X1Plus,
                route: Route::Remote {
                    rank: Rank(0),
                    tag: ChannelTag(20),
                },
            },
            TopoLink {
                from: BlockId(1),
                to: BlockId(0),
                face: Face::X1Minus,
                route: Route::Remote {
                    rank: Rank(0),
                    tag: ChannelTag(21),
                },
            },
        ],
    };

    let capture = CaptureStream::new();
    let mut driver = EvolutionDriver::new(DriverConfig {
        rank: Rank(0),
        time: time_config(1.0e9, 100),
        mesh: uniform_mesh(2, DIMS, NG),
        topology,
        transport: Box::new(FailingTransport {
            inner: solo_transport(),
            posts_before_failure: 4,
        }),
        collective: Box::new(SoloCollective),
        executor: Box::new(CompletingExecutor),
        estimator: Box::new(FixedEstimator(0.25)),
        rebalancer: Box::new(StaticRebalancer),
        outputs: Box::new(NullOutputs),
        post_loop: None,
        stop: StopToken::new(),
        diagnostics: DiagnosticsSink::new(Rank(0), Box::new(capture.clone())),
        wall_clock_budget: None,
        run_dir: None,
    })
    .unwrap();

    assert_eq!(driver.execute(), DriverStatus::Failed);
    let text = capture.text();
    assert!(text.contains("boundary exchange"), "unexpected output:\n{text}");
    assert_eq!(text.matches("Driver failed.").count(), 1);
}

#[test]
fn wall_clock_budget_is_reported_as_timeout() {
    let capture = CaptureStream::new();
    let mut driver = EvolutionDriver::new(DriverConfig {
        rank: Rank(0),
        time: time_config(1.0e9, 1_000_000),
        mesh: uniform_mesh(1, DIMS, NG),
        topology: Topology::default(),
        transport: Box::new(solo_transport()),
        collective: Box::new(SoloCollective),
        executor: Box::new(CompletingExecutor),
        estimator: Box::new(FixedEstimator(0.25)),
        rebalancer: Box::new(StaticRebalancer),
        outputs: Box::new(NullOutputs),
        post_loop: None,
        stop: StopToken::new(),
        diagnostics: DiagnosticsSink::new(Rank(0), Box::new(capture.clone())),
        wall_clock_budget: Some(Duration::ZERO),
        run_dir: None,
    })
    .unwrap();

    assert_eq!(driver.execute(), DriverStatus::Timeout);
    assert!(capture.text().contains("Driver timed out.  Restart to continue."));
}
