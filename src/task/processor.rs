//! Strategies for draining queued extraction tasks
//!
//! Both processors are FIFO queues run on the calling thread during
//! [`crate::octree::Octree::update`]. The main-thread processor holds work for
//! nodes that are on screen and is always drained completely; the background
//! processor holds everything else and is drained a little at a time.

use std::collections::VecDeque;

use rayon::prelude::*;

use crate::core::types::Result;
use crate::streaming::VoxelSource;
use crate::task::{ExtractionTask, FinishedTaskQueue};
use crate::voxel::Voxel;

/// Queue-drain strategy for extraction tasks.
///
/// Processing a task computes its mesh and pushes the task onto `finished`;
/// it never touches the octree node itself. A task that fails is dropped and
/// its error returned.
pub trait TaskProcessor<V: Voxel> {
    fn add_task(&mut self, task: ExtractionTask<V>);

    fn has_tasks(&self) -> bool;

    /// Process the oldest task, if any
    fn process_one_task(
        &mut self,
        source: &mut dyn VoxelSource<V>,
        finished: &mut FinishedTaskQueue<V>,
    ) -> Result<()>;

    /// Process tasks until the queue is empty
    fn process_all_tasks(
        &mut self,
        source: &mut dyn VoxelSource<V>,
        finished: &mut FinishedTaskQueue<V>,
    ) -> Result<()> {
        while self.has_tasks() {
            self.process_one_task(source, finished)?;
        }
        Ok(())
    }
}

fn process_front<V: Voxel>(
    tasks: &mut VecDeque<ExtractionTask<V>>,
    source: &mut dyn VoxelSource<V>,
    finished: &mut FinishedTaskQueue<V>,
) -> Result<()> {
    if let Some(mut task) = tasks.pop_front() {
        task.process(source)?;
        finished.push(task);
    }
    Ok(())
}

/// Tasks for nodes that were rendered last tick
pub struct MainThreadTaskProcessor<V: Voxel> {
    tasks: VecDeque<ExtractionTask<V>>,
}

impl<V: Voxel> Default for MainThreadTaskProcessor<V> {
    fn default() -> Self {
        Self { tasks: VecDeque::new() }
    }
}

impl<V: Voxel> TaskProcessor<V> for MainThreadTaskProcessor<V> {
    fn add_task(&mut self, task: ExtractionTask<V>) {
        self.tasks.push_back(task);
    }

    fn has_tasks(&self) -> bool {
        !self.tasks.is_empty()
    }

    fn process_one_task(
        &mut self,
        source: &mut dyn VoxelSource<V>,
        finished: &mut FinishedTaskQueue<V>,
    ) -> Result<()> {
        process_front(&mut self.tasks, source, finished)
    }
}

/// Tasks for nodes that are not on screen yet
pub struct BackgroundTaskProcessor<V: Voxel> {
    tasks: VecDeque<ExtractionTask<V>>,
}

impl<V: Voxel> Default for BackgroundTaskProcessor<V> {
    fn default() -> Self {
        Self { tasks: VecDeque::new() }
    }
}

impl<V: Voxel> BackgroundTaskProcessor<V> {
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Process up to `count` tasks.
    ///
    /// Voxel data is read serially, then the meshes are extracted on the rayon
    /// pool. Finished tasks are pushed in queue order.
    pub fn process_tasks(
        &mut self,
        count: usize,
        source: &mut dyn VoxelSource<V>,
        finished: &mut FinishedTaskQueue<V>,
    ) -> Result<()> {
        if count <= 1 {
            return self.process_one_task(source, finished);
        }

        let mut prepared = Vec::with_capacity(count.min(self.tasks.len()));
        let mut error = None;
        while prepared.len() < count {
            let Some(task) = self.tasks.pop_front() else {
                break;
            };
            match task.prepare(source) {
                Ok(block) => prepared.push((task, block)),
                Err(e) => {
                    error = Some(e);
                    break;
                }
            }
        }

        let done: Vec<ExtractionTask<V>> = prepared
            .into_par_iter()
            .map(|(mut task, block)| {
                task.complete(&block);
                task
            })
            .collect();
        log::trace!("Extracted {} background meshes", done.len());

        for task in done {
            finished.push(task);
        }
        error.map_or(Ok(()), Err)
    }
}

impl<V: Voxel> TaskProcessor<V> for BackgroundTaskProcessor<V> {
    fn add_task(&mut self, task: ExtractionTask<V>) {
        self.tasks.push_back(task);
    }

    fn has_tasks(&self) -> bool {
        !self.tasks.is_empty()
    }

    fn process_one_task(
        &mut self,
        source: &mut dyn VoxelSource<V>,
        finished: &mut FinishedTaskQueue<V>,
    ) -> Result<()> {
        process_front(&mut self.tasks, source, finished)
    }
}

/// The pair of processors owned by a volume
pub struct TaskProcessors<V: Voxel> {
    pub main_thread: MainThreadTaskProcessor<V>,
    pub background: BackgroundTaskProcessor<V>,
    /// Background tasks drained per update
    background_batch: usize,
}

impl<V: Voxel> TaskProcessors<V> {
    pub fn new(background_batch: usize) -> Self {
        Self {
            main_thread: MainThreadTaskProcessor::default(),
            background: BackgroundTaskProcessor::default(),
            background_batch: background_batch.max(1),
        }
    }

    pub fn has_tasks(&self) -> bool {
        self.main_thread.has_tasks() || self.background.has_tasks()
    }

    /// Drain all main-thread work if there is any, otherwise one background batch
    pub fn drain(
        &mut self,
        source: &mut dyn VoxelSource<V>,
        finished: &mut FinishedTaskQueue<V>,
    ) -> Result<()> {
        if self.main_thread.has_tasks() {
            self.main_thread.process_all_tasks(source, finished)
        } else {
            self.background.process_tasks(self.background_batch, source, finished)
        }
    }
}
