//! Operator-facing diagnostics: cycle lines and the terminal report.
//!
//! One line per cadence-matched cycle, in a fixed high-precision
//! scientific format so log scrapers can parse it deterministically:
//!
//! ```text
//! cycle=<int> time=<sci-notation> dt=<sci-notation>
//! ```
//!
//! Everything here is gated on rank 0 except error lines, which any
//! rank may emit. The stream is injectable so tests capture output
//! instead of scraping stdout.

use std::fmt;
use std::io::{self, Write};

use cairn_core::{Rank, TimeManager};
use cairn_mesh::Mesh;

use crate::driver::DriverStatus;

/// Fractional digits in the scientific cycle-line fields — enough to
/// round-trip an `f64` exactly.
const DT_PRECISION: usize = 16;

/// The designated diagnostics stream for one rank.
pub struct DiagnosticsSink {
    rank: Rank,
    out: Box<dyn Write + Send>,
}

impl DiagnosticsSink {
    /// Wrap an output stream for the given rank.
    pub fn new(rank: Rank, out: Box<dyn Write + Send>) -> Self {
        Self { rank, out }
    }

    /// The conventional production sink: stdout.
    pub fn stdout(rank: Rank) -> Self {
        Self::new(rank, Box::new(io::stdout()))
    }

    fn is_root(&self) -> bool {
        self.rank == Rank(0)
    }

    /// Emit the cycle line when this rank is root and the cycle is on
    /// the configured cadence.
    pub fn cycle_line(&mut self, tm: &TimeManager) {
        if !self.is_root() || !tm.output_due() {
            return;
        }
        let _ = writeln!(
            self.out,
            "cycle={} time={:.prec$e} dt={:.prec$e}",
            tm.cycle,
            tm.time,
            tm.dt,
            prec = DT_PRECISION,
        );
    }

    /// Emit a failure description. Not rank-gated: the failing rank is
    /// the one that knows what happened.
    pub fn error_line(&mut self, err: &dyn fmt::Display) {
        let _ = writeln!(self.out, "{err}");
        let _ = self.out.flush();
    }

    /// Emit the one terminal summary for the run: status, final clock,
    /// configured bounds, and — for adaptive meshes — block churn.
    pub fn report(&mut self, status: DriverStatus, tm: &TimeManager, mesh: &Mesh) {
        if !self.is_root() {
            return;
        }
        self.cycle_line(tm);

        let headline = match status {
            DriverStatus::Complete => "Driver completed.",
            DriverStatus::Timeout => "Driver timed out.  Restart to continue.",
            DriverStatus::Failed => "Driver failed.",
        };
        let _ = writeln!(self.out);
        let _ = writeln!(self.out, "{headline}");
        let _ = writeln!(self.out, "time={} cycle={}", tm.time, tm.cycle);
        let _ = writeln!(self.out, "tlim={} nlim={}", tm.time_limit, tm.cycle_limit);

        if mesh.adaptive {
            let _ = writeln!(self.out);
            let _ = writeln!(
                self.out,
                "Number of blocks = {}; {} created, {} destroyed during this simulation.",
                mesh.nbtotal(),
                mesh.nbnew,
                mesh.nbdel,
            );
        }
        let _ = self.out.flush();
    }
}

impl fmt::Debug for DiagnosticsSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiagnosticsSink")
            .field("rank", &self.rank)
            .finish()
    }
}
