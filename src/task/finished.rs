//! Priority queue of tasks whose meshes are ready to be applied

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::task::ExtractionTask;
use crate::voxel::Voxel;

struct Finished<V: Voxel> {
    task: ExtractionTask<V>,
    /// Insertion order, earlier wins ties
    sequence: u64,
}

impl<V: Voxel> PartialEq for Finished<V> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<V: Voxel> Eq for Finished<V> {}

impl<V: Voxel> Ord for Finished<V> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Max-heap: higher priority first, then lower sequence first
        self.task
            .priority
            .cmp(&other.task.priority)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

impl<V: Voxel> PartialOrd for Finished<V> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Finished tasks ordered by priority, ties broken by insertion order
pub struct FinishedTaskQueue<V: Voxel> {
    heap: BinaryHeap<Finished<V>>,
    next_sequence: u64,
}

impl<V: Voxel> Default for FinishedTaskQueue<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Voxel> FinishedTaskQueue<V> {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            next_sequence: 0,
        }
    }

    pub fn push(&mut self, task: ExtractionTask<V>) {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.heap.push(Finished { task, sequence });
    }

    /// Remove the highest priority task
    pub fn pop(&mut self) -> Option<ExtractionTask<V>> {
        self.heap.pop().map(|f| f.task)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}
