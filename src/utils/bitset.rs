//! A compact set of block identifiers.
//!
//! [`BlockSet`] stores one bit per block of a graph, 64 blocks per word. It backs the
//! membership questions the lowering asks over and over: "is this block in the loop
//! body", "was this block already emitted", "has the DFS seen this block".
//!
//! # Example
//!
//! ```rust,ignore
//! use crate::{analysis::BlockId, utils::BlockSet};
//!
//! let mut set = BlockSet::new(100);
//! assert!(set.insert(BlockId::new(50)));
//! assert!(!set.insert(BlockId::new(50)));
//! assert!(set.contains(BlockId::new(50)));
//! ```

use crate::analysis::BlockId;

/// A fixed-capacity bit set over [`BlockId`]s.
#[derive(Clone, PartialEq, Eq, Hash)]
pub(crate) struct BlockSet {
    /// The bits, stored as a vector of words.
    words: Vec<u64>,
    /// The number of blocks this set can hold.
    capacity: usize,
}

impl BlockSet {
    /// Creates a new empty set able to hold blocks `0..capacity`.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            words: vec![0; capacity.div_ceil(64)],
            capacity,
        }
    }

    /// Returns the number of blocks this set can hold.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Adds a block to the set.
    ///
    /// Returns `true` if the block was not present before.
    ///
    /// # Panics
    ///
    /// Panics if the block index is outside the capacity.
    pub fn insert(&mut self, block: BlockId) -> bool {
        let (word, mask) = self.locate(block);
        let was_set = self.words[word] & mask != 0;
        self.words[word] |= mask;
        !was_set
    }

    /// Removes a block from the set.
    ///
    /// Returns `true` if the block was present.
    ///
    /// # Panics
    ///
    /// Panics if the block index is outside the capacity.
    pub fn remove(&mut self, block: BlockId) -> bool {
        let (word, mask) = self.locate(block);
        let was_set = self.words[word] & mask != 0;
        self.words[word] &= !mask;
        was_set
    }

    /// Returns `true` if the block is in the set.
    ///
    /// # Panics
    ///
    /// Panics if the block index is outside the capacity.
    #[must_use]
    pub fn contains(&self, block: BlockId) -> bool {
        let (word, mask) = self.locate(block);
        self.words[word] & mask != 0
    }

    /// Returns the number of blocks in the set.
    #[must_use]
    pub fn count(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Returns an iterator over the blocks in the set, in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = BlockId> + '_ {
        self.words
            .iter()
            .enumerate()
            .flat_map(|(word_idx, &word)| {
                (0..64usize)
                    .filter(move |bit| word & (1u64 << bit) != 0)
                    .map(move |bit| word_idx * 64 + bit)
            })
            .filter_map(|index| u16::try_from(index).ok().map(BlockId::new))
    }

    fn locate(&self, block: BlockId) -> (usize, u64) {
        let index = block.index();
        assert!(index < self.capacity, "block {block} outside set capacity");
        (index / 64, 1u64 << (index % 64))
    }
}

impl std::fmt::Debug for BlockSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}
