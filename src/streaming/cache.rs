//! LRU cache for resident chunks
//!
//! Keeps decompressed chunks in memory, keyed by chunk coordinate. When the
//! cache is full, the least recently used chunk is handed back to the caller
//! so it can be paged out before it is dropped.

use std::collections::HashMap;

use crate::core::types::IVec3;

struct Entry<C> {
    chunk: C,
    /// Value of the access counter at the last touch
    last_used: u64,
}

/// LRU cache for chunks
///
/// Access order is tracked with a monotonically increasing counter instead of
/// a list, so touching a chunk is O(1) and only eviction scans the entries.
pub struct ChunkCache<C> {
    chunks: HashMap<IVec3, Entry<C>>,
    /// Incremented on every access
    tick: u64,
    /// Maximum number of chunks to keep in cache
    max_chunks: usize,
}

impl<C> ChunkCache<C> {
    /// Create a new chunk cache with the given capacity
    ///
    /// # Arguments
    /// * `max_chunks` - Maximum number of chunks to keep in memory (at least 1)
    pub fn new(max_chunks: usize) -> Self {
        let max_chunks = max_chunks.max(1);
        Self {
            chunks: HashMap::with_capacity(max_chunks.min(4096)),
            tick: 0,
            max_chunks,
        }
    }

    /// Get a mutable chunk by coordinate, marking it as recently used
    pub fn get_mut(&mut self, coord: IVec3) -> Option<&mut C> {
        self.tick += 1;
        let tick = self.tick;
        self.chunks.get_mut(&coord).map(|entry| {
            entry.last_used = tick;
            &mut entry.chunk
        })
    }

    /// Insert a chunk into the cache
    ///
    /// If the cache is at capacity, the least recently used chunk is evicted first.
    /// If a chunk with the same coordinate already exists, it is replaced.
    ///
    /// # Returns
    /// The evicted or replaced chunk, with its coordinate
    pub fn insert(&mut self, coord: IVec3, chunk: C) -> Option<(IVec3, C)> {
        self.tick += 1;
        let entry = Entry { chunk, last_used: self.tick };

        if let Some(old) = self.chunks.insert(coord, entry) {
            return Some((coord, old.chunk));
        }

        if self.chunks.len() > self.max_chunks {
            return self.evict_oldest_except(coord);
        }
        None
    }

    /// Remove a chunk from the cache
    pub fn remove(&mut self, coord: IVec3) -> Option<C> {
        self.chunks.remove(&coord).map(|entry| entry.chunk)
    }

    /// Check if the cache contains a chunk
    pub fn contains(&self, coord: IVec3) -> bool {
        self.chunks.contains_key(&coord)
    }

    /// Get the number of chunks in the cache
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Check if the cache is empty
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.max_chunks
    }

    /// Evict the least recently used chunk
    pub fn evict_oldest(&mut self) -> Option<(IVec3, C)> {
        let coord = self
            .chunks
            .iter()
            .min_by_key(|(_, entry)| entry.last_used)
            .map(|(coord, _)| *coord)?;
        self.remove(coord).map(|chunk| (coord, chunk))
    }

    /// Remove every chunk, oldest first
    pub fn drain(&mut self) -> Vec<(IVec3, C)> {
        let mut entries: Vec<_> = self.chunks.drain().collect();
        entries.sort_by_key(|(_, entry)| entry.last_used);
        entries.into_iter().map(|(coord, entry)| (coord, entry.chunk)).collect()
    }

    /// Mutable iterator over all resident chunks, in no particular order
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (IVec3, &mut C)> {
        self.chunks.iter_mut().map(|(coord, entry)| (*coord, &mut entry.chunk))
    }

    fn evict_oldest_except(&mut self, keep: IVec3) -> Option<(IVec3, C)> {
        let coord = self
            .chunks
            .iter()
            .filter(|(coord, _)| **coord != keep)
            .min_by_key(|(_, entry)| entry.last_used)
            .map(|(coord, _)| *coord)?;
        self.remove(coord).map(|chunk| (coord, chunk))
    }
}
