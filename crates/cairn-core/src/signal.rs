//! Cooperative termination signalling.
//!
//! The hosting environment (operator interrupt handler, wall-clock alarm)
//! sets the flag from any thread; the driver polls it once per cycle and
//! drains in-flight communication before exiting. No asynchronous
//! preemption is involved.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

const CAUSE_NONE: u8 = 0;
const CAUSE_INTERRUPT: u8 = 1;
const CAUSE_WALL_CLOCK: u8 = 2;

/// Why a stop was requested.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopCause {
    /// Operator-requested stop (e.g. SIGINT relayed by the host).
    Interrupt,
    /// Wall-clock budget exhausted.
    WallClock,
}

/// Shared stop flag, cloneable across threads.
///
/// The first recorded cause wins; later requests are ignored so the
/// terminal status reflects what actually ended the run.
#[derive(Clone, Debug, Default)]
pub struct StopToken {
    inner: Arc<AtomicU8>,
}

impl StopToken {
    /// Create an unset token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a stop with the given cause. First writer wins.
    pub fn request(&self, cause: StopCause) {
        let v = match cause {
            StopCause::Interrupt => CAUSE_INTERRUPT,
            StopCause::WallClock => CAUSE_WALL_CLOCK,
        };
        let _ = self
            .inner
            .compare_exchange(CAUSE_NONE, v, Ordering::AcqRel, Ordering::Acquire);
    }

    /// The recorded cause, if any.
    pub fn cause(&self) -> Option<StopCause> {
        match self.inner.load(Ordering::Acquire) {
            CAUSE_INTERRUPT => Some(StopCause::Interrupt),
            CAUSE_WALL_CLOCK => Some(StopCause::WallClock),
            _ => None,
        }
    }

    /// Whether any stop has been requested.
    pub fn is_set(&self) -> bool {
        self.inner.load(Ordering::Acquire) != CAUSE_NONE
    }
}
