//! The process-local block collection and its adaptation counters.

use cairn_core::{BlockId, MeshError};

use crate::block::Block;

/// The ordered sequence of blocks owned by this process.
///
/// Traversal is plain iteration; insertion and removal are mediated by
/// the refinement/load-balance engine, which is the only component
/// allowed to change which blocks exist. The counters feed the terminal
/// report: `nbnew`/`nbdel` accumulate over the whole run, `mbcnt` counts
/// block-updates (blocks × cycles), and `steps_since_balance` tracks the
/// cycles since the last rebalance pass.
#[derive(Debug, Default)]
pub struct Mesh {
    blocks: Vec<Block>,
    /// Whether the mesh adapts at runtime (drives the terminal report's
    /// created/destroyed lines).
    pub adaptive: bool,
    /// Blocks created since the start of the run.
    pub nbnew: usize,
    /// Blocks destroyed since the start of the run.
    pub nbdel: usize,
    /// Accumulated block-updates (total blocks summed each cycle).
    pub mbcnt: u64,
    /// Cycles since the last load-balance pass.
    pub steps_since_balance: u64,
}

impl Mesh {
    /// Create an empty mesh.
    pub fn new(adaptive: bool) -> Self {
        Self {
            adaptive,
            ..Self::default()
        }
    }

    /// Total blocks currently owned by this process.
    pub fn nbtotal(&self) -> usize {
        self.blocks.len()
    }

    /// Whether this process owns no blocks.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Add a block (refinement/rebalance engine only).
    pub fn insert_block(&mut self, block: Block) {
        self.nbnew += 1;
        self.blocks.push(block);
    }

    /// Seed a block at startup without counting it as created.
    pub fn seed_block(&mut self, block: Block) {
        self.blocks.push(block);
    }

    /// Remove a block (refinement/rebalance engine only).
    ///
    /// # Errors
    ///
    /// [`MeshError::BlockNotFound`] when this process does not own `id`.
    pub fn remove_block(&mut self, id: BlockId) -> Result<Block, MeshError> {
        match self.blocks.iter().position(|b| b.id == id) {
            Some(pos) => {
                self.nbdel += 1;
                Ok(self.blocks.remove(pos))
            }
            None => Err(MeshError::BlockNotFound { id }),
        }
    }

    /// Look up a block by ID.
    ///
    /// # Errors
    ///
    /// [`MeshError::BlockNotFound`] when this process does not own `id`.
    pub fn block(&self, id: BlockId) -> Result<&Block, MeshError> {
        self.blocks
            .iter()
            .find(|b| b.id == id)
            .ok_or(MeshError::BlockNotFound { id })
    }

    /// Look up a block mutably by ID.
    ///
    /// # Errors
    ///
    /// [`MeshError::BlockNotFound`] when this process does not own `id`.
    pub fn block_mut(&mut self, id: BlockId) -> Result<&mut Block, MeshError> {
        self.blocks
            .iter_mut()
            .find(|b| b.id == id)
            .ok_or(MeshError::BlockNotFound { id })
    }

    /// Iterate blocks in ownership order.
    pub fn blocks(&self) -> impl Iterator<Item = &Block> {
        self.blocks.iter()
    }

    /// Iterate blocks mutably in ownership order.
    pub fn blocks_mut(&mut self) -> impl Iterator<Item = &mut Block> {
        self.blocks.iter_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::BlockExtents;

    fn block(id: u64) -> Block {
        Block::new(BlockId(id), BlockExtents::new([4, 4, 4], 1))
    }

    #[test]
    fn seed_does_not_count_as_created() {
        let mut m = Mesh::new(false);
        m.seed_block(block(0));
        m.seed_block(block(1));
        assert_eq!(m.nbtotal(), 2);
        assert_eq!(m.nbnew, 0);
    }

    #[test]
    fn insert_and_remove_update_counters() {
        let mut m = Mesh::new(true);
        m.seed_block(block(0));
        m.insert_block(block(1));
        m.insert_block(block(2));
        assert_eq!(m.nbtotal(), 3);
        assert_eq!(m.nbnew, 2);

        m.remove_block(BlockId(1)).unwrap();
        assert_eq!(m.nbtotal(), 2);
        assert_eq!(m.nbdel, 1);
    }

    #[test]
    fn remove_unknown_block_is_an_error() {
        let mut m = Mesh::new(false);
        assert_eq!(
            m.remove_block(BlockId(5)).unwrap_err(),
            MeshError::BlockNotFound { id: BlockId(5) }
        );
        assert_eq!(m.nbdel, 0);
    }

    #[test]
    fn lookup_by_id() {
        let mut m = Mesh::new(false);
        m.seed_block(block(3));
        assert_eq!(m.block(BlockId(3)).unwrap().id, BlockId(3));
        assert!(m.block(BlockId(4)).is_err());
    }
}
