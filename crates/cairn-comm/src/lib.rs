//! Buffer codec, rank fabric, and boundary exchange for Cairn
//! simulations.
//!
//! Three layers, bottom up:
//!
//! - [`codec`] — packs/unpacks hyper-rectangular sub-ranges of block
//!   arrays into flat transfer buffers at a running offset.
//! - [`fabric`] — the rank substrate: persistent point-to-point channels
//!   ([`Transport`]) and the blocking minimum-reduction ([`Collective`]),
//!   built on crossbeam channels so a multi-rank world can run as
//!   threads in one process.
//! - [`boundary`] — the per-entity phase machines that drive one halo
//!   exchange for field containers ([`FieldBoundarySet`]) and particle
//!   swarms ([`SwarmBoundarySet`]).
//!
//! A transfer buffer is owned by the sending phase until it is handed to
//! the fabric, then by the receiving phase; no two phases ever hold the
//! same buffer.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod boundary;
pub mod codec;
pub mod fabric;

pub use boundary::{
    BoundaryState, ExchangePhase, FieldBoundarySet, Route, SwarmBoundarySet, TopoLink, Topology,
};
pub use fabric::{Collective, Endpoint, Envelope, Fabric, SoloCollective, Transport};
