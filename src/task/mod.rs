//! Deferred mesh extraction work

pub mod finished;
pub mod processor;

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use crate::core::clock;
use crate::core::types::{Result, Timestamp};
use crate::math::Region;
use crate::mesh::Mesh;
use crate::octree::NodeIndex;
use crate::streaming::VoxelSource;
use crate::voxel::{Voxel, VoxelBlock};

pub use finished::FinishedTaskQueue;
pub use processor::{BackgroundTaskProcessor, MainThreadTaskProcessor, TaskProcessor, TaskProcessors};

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

/// State of a task shared with the node it was created for
#[derive(Debug)]
pub struct TaskStatus {
    id: u64,
    /// Zero until processing starts
    processing_started: AtomicU32,
}

impl TaskStatus {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn processing_started(&self) -> Option<Timestamp> {
        match self.processing_started.load(Ordering::Acquire) {
            0 => None,
            t => Some(t),
        }
    }
}

/// Shared handle to a task's status, held by the node while the task is in flight
pub type TaskRef = Arc<TaskStatus>;

/// Extract the mesh of one octree node
pub struct ExtractionTask<V: Voxel> {
    /// Higher runs first when finished tasks are applied
    pub priority: u32,
    pub node: NodeIndex,
    pub region: Region,
    pub height: u8,
    status: TaskRef,
    mesh: Option<Mesh<V::Vertex>>,
}

impl<V: Voxel> ExtractionTask<V> {
    pub fn new(node: NodeIndex, region: Region, height: u8, priority: u32) -> Self {
        Self {
            priority,
            node,
            region,
            height,
            status: Arc::new(TaskStatus {
                id: NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed),
                processing_started: AtomicU32::new(0),
            }),
            mesh: None,
        }
    }

    pub fn status(&self) -> &TaskRef {
        &self.status
    }

    /// When the voxel data was read. Meshes are versioned by this value.
    pub fn processing_started(&self) -> Option<Timestamp> {
        self.status.processing_started()
    }

    /// Stamp the start time and read the voxels this task needs
    pub fn prepare(&self, source: &mut dyn VoxelSource<V>) -> Result<VoxelBlock<V>> {
        self.status.processing_started.store(clock::timestamp(), Ordering::Release);
        source.sample_block(VoxelBlock::<V>::footprint(&self.region, self.height))
    }

    /// Build the mesh from a block returned by [`ExtractionTask::prepare`]
    pub fn complete(&mut self, block: &VoxelBlock<V>) {
        self.mesh = Some(V::extract_mesh(block, &self.region, self.height));
    }

    /// Run the whole task on the calling thread
    pub fn process(&mut self, source: &mut dyn VoxelSource<V>) -> Result<()> {
        let block = self.prepare(source)?;
        self.complete(&block);
        Ok(())
    }

    pub fn mesh(&self) -> Option<&Mesh<V::Vertex>> {
        self.mesh.as_ref()
    }

    pub fn take_mesh(&mut self) -> Option<Mesh<V::Vertex>> {
        self.mesh.take()
    }
}

impl<V: Voxel> std::fmt::Debug for ExtractionTask<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtractionTask")
            .field("id", &self.status.id)
            .field("priority", &self.priority)
            .field("node", &self.node)
            .field("height", &self.height)
            .field("has_mesh", &self.mesh.is_some())
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::collections::HashMap;

    use super::*;
    use crate::core::error::Error;
    use crate::core::types::IVec3;

    /// Voxel source backed by a map, optionally failing on one position
    #[derive(Default)]
    pub struct MapSource<V> {
        pub voxels: HashMap<IVec3, V>,
        pub fail_at: Option<IVec3>,
        pub reads: usize,
    }

    impl<V: Voxel> VoxelSource<V> for MapSource<V> {
        fn voxel(&mut self, position: IVec3) -> Result<V> {
            self.reads += 1;
            if self.fail_at == Some(position) {
                return Err(Error::Compression("corrupt chunk".into()));
            }
            Ok(self.voxels.get(&position).copied().unwrap_or_default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::MapSource;
    use super::*;
    use crate::core::types::IVec3;
    use crate::voxel::Color;

    #[test]
    fn test_process_stamps_and_meshes() {
        let mut source = MapSource::<Color>::default();
        source.voxels.insert(IVec3::new(1, 1, 1), Color::rgb(255, 255, 255));

        let mut task = ExtractionTask::<Color>::new(
            NodeIndex(0),
            Region::from_coords(0, 0, 0, 7, 7, 7),
            0,
            10,
        );
        assert!(task.processing_started().is_none());

        let before = clock::current_time();
        task.process(&mut source).unwrap();

        assert!(task.processing_started().unwrap() > before);
        assert_eq!(task.mesh().unwrap().triangle_count(), 12);
        assert!(task.take_mesh().is_some());
        assert!(task.mesh().is_none());
    }

    #[test]
    fn test_status_is_shared() {
        let task = ExtractionTask::<Color>::new(NodeIndex(3), Region::from_coords(0, 0, 0, 7, 7, 7), 0, 0);
        let status = task.status().clone();
        assert!(Arc::ptr_eq(&status, task.status()));

        let mut source = MapSource::<Color>::default();
        task.prepare(&mut source).unwrap();
        assert!(status.processing_started().is_some());
    }

    #[test]
    fn test_ids_are_unique() {
        let region = Region::from_coords(0, 0, 0, 7, 7, 7);
        let a = ExtractionTask::<Color>::new(NodeIndex(0), region, 0, 0);
        let b = ExtractionTask::<Color>::new(NodeIndex(0), region, 0, 0);
        assert_ne!(a.status().id(), b.status().id());
    }
}
