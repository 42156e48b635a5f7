//! Strongly-typed identifiers for blocks, ranks, and channels.

use std::fmt;

/// Globally-unique identifier of a mesh block.
///
/// Blocks are created and destroyed by the refinement/load-balance engine;
/// an ID is never reused within a run, so a stale ID in a topology
/// description is detectable rather than silently aliasing a new block.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u64);

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for BlockId {
    fn from(v: u64) -> Self {
        Self(v)
    }
}

/// Index of a process within the distributed set.
///
/// Rank 0 is the reporting rank: cycle diagnostics and the terminal
/// summary are emitted there only.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Rank(pub u32);

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for Rank {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

/// Matching tag for a persistent point-to-point channel.
///
/// Assigned by the topology builder, one per directed neighbor link.
/// Tags at or above [`ChannelTag::RESERVED_BASE`] are claimed by the
/// fabric for collectives and must not appear in a topology.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelTag(pub u64);

impl ChannelTag {
    /// First tag value reserved for fabric-internal traffic (reductions).
    pub const RESERVED_BASE: u64 = 1 << 62;
}

impl fmt::Display for ChannelTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for ChannelTag {
    fn from(v: u64) -> Self {
        Self(v)
    }
}
