//! Per-slot arena.
//!
//! Every string or buffer a slot owns (its filename, a composed archive path,
//! enrichment copies, driver scratch space) lives in the slot's arena and is
//! addressed by an [`ArenaHandle`]. Unloading the slot releases the whole
//! arena in one call. Handles carry the arena generation they were issued in,
//! so a handle kept across a release resolves to `None` instead of to
//! whatever the next load allocated.

/// Handle to a block allocated from a [`SlotArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArenaHandle {
    generation: u32,
    index: u32,
}

/// Scoped allocator bound to one slot's lifetime.
#[derive(Debug, Default)]
pub struct SlotArena {
    generation: u32,
    blocks: Vec<Vec<u8>>,
}

impl SlotArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a zero-filled block of `size` bytes.
    pub fn alloc(&mut self, size: usize) -> ArenaHandle {
        self.push(vec![0; size])
    }

    /// Allocate a block holding a copy of `data`.
    pub fn alloc_bytes(&mut self, data: &[u8]) -> ArenaHandle {
        self.push(data.to_vec())
    }

    /// Copy a string into the arena.
    pub fn strdup(&mut self, s: &str) -> ArenaHandle {
        self.push(s.as_bytes().to_vec())
    }

    /// Resize a block in place, zero-filling any growth.
    /// Returns `None` for a stale or foreign handle.
    pub fn realloc(&mut self, handle: ArenaHandle, size: usize) -> Option<ArenaHandle> {
        let block = self.block_mut(handle)?;
        block.resize(size, 0);
        Some(handle)
    }

    pub fn bytes(&self, handle: ArenaHandle) -> Option<&[u8]> {
        if handle.generation != self.generation {
            return None;
        }
        self.blocks.get(handle.index as usize).map(Vec::as_slice)
    }

    pub fn bytes_mut(&mut self, handle: ArenaHandle) -> Option<&mut [u8]> {
        self.block_mut(handle).map(Vec::as_mut_slice)
    }

    /// Resolve a handle created with [`SlotArena::strdup`].
    pub fn str(&self, handle: ArenaHandle) -> Option<&str> {
        self.bytes(handle)
            .and_then(|bytes| std::str::from_utf8(bytes).ok())
    }

    /// Number of live blocks.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Total bytes held by live blocks.
    pub fn allocated_bytes(&self) -> usize {
        self.blocks.iter().map(Vec::len).sum()
    }

    /// Free every block. All outstanding handles become stale.
    pub fn release(&mut self) {
        self.blocks.clear();
        self.generation = self.generation.wrapping_add(1);
    }

    fn push(&mut self, block: Vec<u8>) -> ArenaHandle {
        let index = self.blocks.len() as u32;
        self.blocks.push(block);
        ArenaHandle {
            generation: self.generation,
            index,
        }
    }

    fn block_mut(&mut self, handle: ArenaHandle) -> Option<&mut Vec<u8>> {
        if handle.generation != self.generation {
            return None;
        }
        self.blocks.get_mut(handle.index as usize)
    }
}
