//! Core types and errors for the Cairn simulation control framework.
//!
//! This is the leaf crate with zero internal dependencies. It defines
//! the fundamental abstractions used throughout the Cairn workspace:
//! type IDs, the process-wide time manager, the cooperative stop token,
//! and the per-subsystem error types.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod error;
pub mod id;
pub mod signal;
pub mod time;

pub use error::{CommError, DriverError, MeshError, SetupError, TaskListStatus};
pub use id::{BlockId, ChannelTag, Rank};
pub use signal::{StopCause, StopToken};
pub use time::{TimeConfig, TimeManager};
