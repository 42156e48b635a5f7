//! Blocks: the owned units of the spatial domain.

use cairn_core::BlockId;
use smallvec::SmallVec;

use crate::field::FieldContainer;
use crate::swarm::SwarmContainer;

/// An inclusive index range along one dimension.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CellRange {
    /// First index in the range.
    pub lo: usize,
    /// Last index in the range (inclusive).
    pub hi: usize,
}

impl CellRange {
    /// Build a range; `lo <= hi` is a caller-checked precondition.
    pub fn new(lo: usize, hi: usize) -> Self {
        Self { lo, hi }
    }

    /// Number of cells covered.
    pub fn len(&self) -> usize {
        self.hi - self.lo + 1
    }

    /// Ranges always cover at least one cell.
    pub fn is_empty(&self) -> bool {
        false
    }
}

/// One of the six faces of a block, named by axis and direction.
///
/// Axis order follows storage order: `x1` is the fastest-varying index,
/// `x3` the slowest.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Face {
    /// Low-`x1` face.
    X1Minus,
    /// High-`x1` face.
    X1Plus,
    /// Low-`x2` face.
    X2Minus,
    /// High-`x2` face.
    X2Plus,
    /// Low-`x3` face.
    X3Minus,
    /// High-`x3` face.
    X3Plus,
}

impl Face {
    /// All six faces, in axis order.
    pub const ALL: [Face; 6] = [
        Face::X1Minus,
        Face::X1Plus,
        Face::X2Minus,
        Face::X2Plus,
        Face::X3Minus,
        Face::X3Plus,
    ];

    /// The face a neighbor sees from the other side of this one.
    pub fn opposite(self) -> Face {
        match self {
            Face::X1Minus => Face::X1Plus,
            Face::X1Plus => Face::X1Minus,
            Face::X2Minus => Face::X2Plus,
            Face::X2Plus => Face::X2Minus,
            Face::X3Minus => Face::X3Plus,
            Face::X3Plus => Face::X3Minus,
        }
    }

    /// Axis index: 0 for `x1`, 1 for `x2`, 2 for `x3`.
    pub fn axis(self) -> usize {
        match self {
            Face::X1Minus | Face::X1Plus => 0,
            Face::X2Minus | Face::X2Plus => 1,
            Face::X3Minus | Face::X3Plus => 2,
        }
    }

    /// Whether this is the high side of its axis.
    pub fn is_plus(self) -> bool {
        matches!(self, Face::X1Plus | Face::X2Plus | Face::X3Plus)
    }
}

/// Real and ghost index ranges of a block along each dimension.
///
/// `interior` holds the real-cell ranges in storage coordinates, i.e.
/// already offset by the ghost width; the full array extent along axis
/// `a` is `interior[a].len() + 2 * nghost` cells starting at 0. The
/// ghost margin mirrors neighboring blocks' boundary values and is
/// refreshed each exchange.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockExtents {
    /// Real-cell range per axis, `[x1, x2, x3]`.
    pub interior: [CellRange; 3],
    /// Ghost-margin width, shared by all axes.
    pub nghost: usize,
}

impl BlockExtents {
    /// Build extents for an interior of `dims` real cells per axis
    /// (`[x1, x2, x3]`) with a ghost margin of `nghost`.
    ///
    /// `nghost` must be at least 1, and each `dims[a]` at least
    /// `nghost` so a face's send strip never overlaps the opposite
    /// face's.
    pub fn new(dims: [usize; 3], nghost: usize) -> Self {
        let interior = [
            CellRange::new(nghost, nghost + dims[0] - 1),
            CellRange::new(nghost, nghost + dims[1] - 1),
            CellRange::new(nghost, nghost + dims[2] - 1),
        ];
        Self { interior, nghost }
    }

    /// Full (real + ghost) range along an axis.
    pub fn full(&self, axis: usize) -> CellRange {
        CellRange::new(0, self.interior[axis].hi + self.nghost)
    }

    /// Allocated cell count per axis, `[x1, x2, x3]`.
    pub fn alloc_dims(&self) -> [usize; 3] {
        [self.full(0).len(), self.full(1).len(), self.full(2).len()]
    }

    /// The interior strip packed when sending across `face`: the real
    /// cells abutting the face, `nghost` deep along the face's axis and
    /// the full interior extent along the other axes. Returned in
    /// storage order `[x1, x2, x3]`.
    pub fn send_range(&self, face: Face) -> SmallVec<[CellRange; 3]> {
        let mut r: SmallVec<[CellRange; 3]> = self.interior.iter().copied().collect();
        let a = face.axis();
        let int = self.interior[a];
        r[a] = if face.is_plus() {
            CellRange::new(int.hi - self.nghost + 1, int.hi)
        } else {
            CellRange::new(int.lo, int.lo + self.nghost - 1)
        };
        r
    }

    /// The ghost strip filled when receiving across `face`. Same shape
    /// as the matching sender's [`send_range`](Self::send_range) on the
    /// opposite face.
    pub fn recv_range(&self, face: Face) -> SmallVec<[CellRange; 3]> {
        let mut r: SmallVec<[CellRange; 3]> = self.interior.iter().copied().collect();
        let a = face.axis();
        let int = self.interior[a];
        r[a] = if face.is_plus() {
            CellRange::new(int.hi + 1, int.hi + self.nghost)
        } else {
            CellRange::new(int.lo - self.nghost, int.lo - 1)
        };
        r
    }

    /// Cells in one variable's face strip.
    pub fn strip_len(&self, face: Face) -> usize {
        self.send_range(face).iter().map(CellRange::len).product()
    }
}

/// An owned unit of the spatial domain.
///
/// Blocks live in the process-local [`Mesh`](crate::mesh::Mesh) sequence
/// and are created/destroyed only by the refinement/load-balance engine.
/// The per-block time-step estimate is stored here between the estimator
/// pass and the global minimum selection.
#[derive(Debug)]
pub struct Block {
    /// Globally-unique block ID.
    pub id: BlockId,
    /// Real/ghost index geometry.
    pub extents: BlockExtents,
    /// Grid variables on this block.
    pub fields: FieldContainer,
    /// Particle swarms on this block.
    pub swarms: SwarmContainer,
    block_dt: f64,
}

impl Block {
    /// Create an empty block with the given geometry.
    pub fn new(id: BlockId, extents: BlockExtents) -> Self {
        Self {
            id,
            extents,
            fields: FieldContainer::new(),
            swarms: SwarmContainer::new(),
            block_dt: f64::INFINITY,
        }
    }

    /// Store this block's time-step estimate.
    pub fn set_block_timestep(&mut self, dt: f64) {
        self.block_dt = dt;
    }

    /// This block's current time-step estimate.
    pub fn new_dt(&self) -> f64 {
        self.block_dt
    }
}
