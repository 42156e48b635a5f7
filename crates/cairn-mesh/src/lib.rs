//! Blocks, field containers, and particle swarms for Cairn simulations.
//!
//! A process owns an ordered sequence of [`Block`]s — the units of task
//! execution and load balancing. Each block carries dense grid variables
//! in a [`FieldContainer`] and discrete particles in a [`SwarmContainer`].
//! Block creation and destruction is the refinement/load-balance engine's
//! job; everything here only stores and hands out the data.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod array;
pub mod block;
pub mod field;
pub mod mesh;
pub mod swarm;

pub use array::VarArray4;
pub use block::{Block, BlockExtents, CellRange, Face};
pub use field::FieldContainer;
pub use mesh::Mesh;
pub use swarm::{Departure, Swarm, SwarmContainer};
