//! Module-owned allocation arena
//!
//! Buffers handed to a module's scripts (strings, structs, scratch space
//! crossing the hook boundary) are carved out of the owning module's arena.
//! Cleanup is a bulk reset: every block is dropped exactly once, and a
//! second reset has nothing left to drop, so double-free is impossible by
//! construction.

/// arena of buffers owned by one plugin module
#[derive(Default)]
pub struct ModuleArena {
    blocks: Vec<Box<[u8]>>,
}

impl ModuleArena {
    /// create an empty arena
    pub fn new() -> Self {
        Self::default()
    }

    /// allocate a zeroed block, returning a view into it
    ///
    /// the block lives until the next [`reset`](Self::reset).
    pub fn alloc(&mut self, size: usize) -> &mut [u8] {
        self.blocks.push(vec![0u8; size].into_boxed_slice());
        // just pushed, cannot be empty
        self.blocks.last_mut().map(|b| &mut **b).unwrap_or(&mut [])
    }

    /// take ownership of an externally produced buffer
    pub fn adopt(&mut self, block: Box<[u8]>) {
        self.blocks.push(block);
    }

    /// number of live blocks
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// total bytes across live blocks
    pub fn allocated_bytes(&self) -> usize {
        self.blocks.iter().map(|b| b.len()).sum()
    }

    /// whether the arena holds no blocks
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// release every block
    pub fn reset(&mut self) {
        self.blocks.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alloc_tracks_blocks() {
        let mut arena = ModuleArena::new();

        let block = arena.alloc(32);
        assert_eq!(block.len(), 32);
        block[0] = 0xAB;

        arena.alloc(16);
        assert_eq!(arena.block_count(), 2);
        assert_eq!(arena.allocated_bytes(), 48);
    }

    #[test]
    fn test_reset_is_idempotent() {
        let mut arena = ModuleArena::new();
        arena.alloc(8);
        arena.adopt(vec![1, 2, 3].into_boxed_slice());

        arena.reset();
        assert!(arena.is_empty());
        assert_eq!(arena.block_count(), 0);

        // nothing left to release the second time
        arena.reset();
        assert!(arena.is_empty());
    }
}
