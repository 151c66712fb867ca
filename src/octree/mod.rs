//! LOD octree over a volume
//!
//! The tree is built once from the volume's bounds and never changes shape.
//! Each [`Octree::update`] decides which nodes are active for the current view,
//! queues mesh extraction for stale nodes, applies finished meshes and then
//! picks a render set in which every part of the volume is drawn by exactly one
//! node, or not at all while its meshes are still being built.

pub mod node;

use glam::Vec3;

use crate::core::clock;
use crate::core::error::Error;
use crate::core::types::{IVec3, Result, Timestamp};
use crate::math::Region;
use crate::streaming::VoxelSource;
use crate::task::{ExtractionTask, FinishedTaskQueue, TaskProcessor, TaskProcessors};
use crate::voxel::{OctreeBounds, Voxel};

pub use node::{NodeHandle, NodeIndex, OctreeNode};

/// Node arena plus LOD settings
pub struct Octree<V: Voxel> {
    /// All nodes, root at `root`
    nodes: Vec<OctreeNode<V>>,
    root: NodeIndex,
    bounds: OctreeBounds,
    /// Volume bounds widened so meshes can close off at the edges
    region_to_cover: Region,
    base_node_size: u32,
    /// Coarsest height that is meshed
    minimum_lod: u8,
    /// Finest height that is meshed
    maximum_lod: u8,
    finished: FinishedTaskQueue<V>,
}

impl<V: Voxel> Octree<V> {
    /// Build the full node tree covering `region`.
    ///
    /// The root is a power-of-two cube centred on the covered region. Nodes are
    /// halved until they reach `base_node_size`; children that miss the
    /// covered region are never created.
    pub fn new(region: &Region, bounds: OctreeBounds, base_node_size: u32) -> Result<Self> {
        if !region.is_valid() {
            return Err(Error::invalid_argument(format!("invalid octree region {region:?}")));
        }
        if base_node_size < 2 || !base_node_size.is_power_of_two() {
            return Err(Error::invalid_argument(format!(
                "base node size must be a power of two >= 2, got {base_node_size}"
            )));
        }

        let region_to_cover = match bounds {
            OctreeBounds::BoundVoxels => region.grown_by(IVec3::ZERO, IVec3::ONE),
            OctreeBounds::BoundCells => region.grown(1),
        };
        let dims = side_lengths(&region_to_cover, bounds);
        let largest = dims.max_element() as u32;
        let target = largest
            .max(base_node_size)
            .checked_next_power_of_two()
            .filter(|size| *size <= 1 << 30)
            .ok_or_else(|| Error::invalid_argument(format!("region {region:?} is too large")))?;

        // Grow to a cube of the target size, odd growth going to the upper side
        let mut lower = region_to_cover.lower();
        let mut upper = region_to_cover.upper();
        for axis in 0..3 {
            let mut increase = target as i32 - dims[axis];
            if increase % 2 == 1 {
                upper[axis] += 1;
                increase -= 1;
            }
            lower[axis] -= increase / 2;
            upper[axis] += increase / 2;
        }

        let root_height = (target / base_node_size).trailing_zeros() as u8;
        let mut root = OctreeNode::new(Region::new(lower, upper), root_height, None);
        root.active = true;
        root.is_leaf = true;

        let mut octree = Self {
            nodes: vec![root],
            root: NodeIndex(0),
            bounds,
            region_to_cover,
            base_node_size,
            minimum_lod: 2,
            maximum_lod: 0,
            finished: FinishedTaskQueue::new(),
        };
        octree.build_children(octree.root)?;

        log::debug!(
            "Built octree with {} nodes, root {:?} at height {}",
            octree.nodes.len(),
            octree.nodes[0].region,
            root_height
        );
        Ok(octree)
    }

    fn create_node(&mut self, region: Region, height: u8, parent: NodeIndex) -> Result<NodeIndex> {
        if self.nodes.len() >= NodeIndex::INVALID.as_usize() {
            return Err(Error::invalid_argument(format!(
                "octree would exceed {} nodes; use a larger base node size",
                NodeIndex::INVALID.0
            )));
        }
        let index = NodeIndex(self.nodes.len() as u16);
        self.nodes.push(OctreeNode::new(region, height, Some(parent)));
        Ok(index)
    }

    fn build_children(&mut self, parent: NodeIndex) -> Result<()> {
        let region = self.nodes[parent.as_usize()].region;
        let height = self.nodes[parent.as_usize()].height;
        let side = side_lengths(&region, self.bounds).x;
        if side <= self.base_node_size as i32 {
            return Ok(());
        }

        let child_side = side / 2;
        let extent = match self.bounds {
            OctreeBounds::BoundVoxels => child_side - 1,
            OctreeBounds::BoundCells => child_side,
        };

        for z in 0..2 {
            for y in 0..2 {
                for x in 0..2 {
                    let lower = region.lower() + IVec3::new(x as i32, y as i32, z as i32) * child_side;
                    let child_region = Region::new(lower, lower + IVec3::splat(extent));
                    if child_region.intersects(&self.region_to_cover) {
                        let child = self.create_node(child_region, height - 1, parent)?;
                        self.nodes[parent.as_usize()].children[x][y][z] = Some(child);
                    }
                }
            }
        }

        for child in self.nodes[parent.as_usize()].structural_children() {
            self.build_children(child)?;
        }
        Ok(())
    }

    pub fn bounds(&self) -> OctreeBounds {
        self.bounds
    }

    pub fn region_to_cover(&self) -> &Region {
        &self.region_to_cover
    }

    pub fn base_node_size(&self) -> u32 {
        self.base_node_size
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn root_index(&self) -> NodeIndex {
        self.root
    }

    /// Always true once constructed
    pub fn has_root(&self) -> bool {
        !self.nodes.is_empty()
    }

    /// Handle to the root. The root is always active so this never goes stale.
    pub fn root_node_handle(&self) -> NodeHandle {
        NodeHandle {
            index: self.root,
            generation: self.nodes[self.root.as_usize()].generation,
        }
    }

    /// Current handle for a node index
    pub fn handle(&self, index: NodeIndex) -> Option<NodeHandle> {
        self.nodes.get(index.as_usize()).map(|node| NodeHandle {
            index,
            generation: node.generation,
        })
    }

    /// Get node by index, ignoring generations
    pub fn node_at(&self, index: NodeIndex) -> Option<&OctreeNode<V>> {
        self.nodes.get(index.as_usize())
    }

    /// Resolve a handle, rejecting it if the node has been (de)activated since
    pub fn node(&self, handle: NodeHandle) -> Result<&OctreeNode<V>> {
        match self.nodes.get(handle.index.as_usize()) {
            Some(node) if node.generation == handle.generation => Ok(node),
            Some(_) => Err(Error::runtime(format!("stale node handle {:?}", handle.index))),
            None => Err(Error::runtime(format!("no node with index {}", handle.index.0))),
        }
    }

    /// Active child at `[x][y][z]`, or `None` if it is inactive or was never created
    pub fn child(&self, handle: NodeHandle, x: u32, y: u32, z: u32) -> Result<Option<NodeHandle>> {
        if x > 1 || y > 1 || z > 1 {
            return Err(Error::invalid_argument(format!("child position ({x}, {y}, {z}) out of range")));
        }
        let node = self.node(handle)?;
        Ok(node.children[x as usize][y as usize][z as usize]
            .filter(|child| self.nodes[child.as_usize()].active)
            .and_then(|child| self.handle(child)))
    }

    /// All nodes with their indices
    pub fn nodes(&self) -> impl Iterator<Item = (NodeIndex, &OctreeNode<V>)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, node)| (NodeIndex(i as u16), node))
    }

    pub fn minimum_lod(&self) -> u8 {
        self.minimum_lod
    }

    pub fn maximum_lod(&self) -> u8 {
        self.maximum_lod
    }

    /// Restrict meshing to heights in `maximum_lod..=minimum_lod`.
    ///
    /// Nodes at `minimum_lod` or above stay active regardless of distance.
    pub fn set_lod_range(&mut self, minimum_lod: u8, maximum_lod: u8) -> Result<()> {
        if minimum_lod < maximum_lod {
            return Err(Error::invalid_argument(format!(
                "minimum LOD ({minimum_lod}) must not be less than maximum LOD ({maximum_lod})"
            )));
        }
        self.minimum_lod = minimum_lod;
        self.maximum_lod = maximum_lod;
        Ok(())
    }

    /// Run one LOD tick for a viewer at `view_position`.
    ///
    /// Returns `Ok(true)` once no extraction work is left queued. An error
    /// from reading voxel data is returned after the tick's bookkeeping is
    /// done; the node whose task failed is scheduled again on the next tick.
    pub fn update(
        &mut self,
        view_position: Vec3,
        lod_threshold: f32,
        source: &mut dyn VoxelSource<V>,
        processors: &mut TaskProcessors<V>,
    ) -> Result<bool> {
        self.determine_active_nodes(self.root, view_position, lod_threshold);
        self.schedule_updates(self.root, view_position, processors);

        let drained = processors.drain(source, &mut self.finished);
        self.apply_finished_tasks();
        if drained.is_err() {
            self.release_failed_tasks();
        }

        self.determine_whether_to_render(self.root);
        self.propagate_timestamps(self.root);

        drained?;
        Ok(!processors.has_tasks())
    }

    /// Record that the voxel at `position` changed.
    ///
    /// Every node whose region, grown by one, contains the position is
    /// stamped, since neighbouring meshes sample one voxel past their edge.
    pub fn mark_data_as_modified(&mut self, position: IVec3, timestamp: Timestamp) {
        self.mark_point_modified(self.root, position, timestamp);
    }

    /// Record that every voxel in `region` may have changed
    pub fn mark_region_as_modified(&mut self, region: &Region, timestamp: Timestamp) {
        self.mark_region_modified(self.root, region, timestamp);
    }

    fn mark_point_modified(&mut self, index: NodeIndex, position: IVec3, timestamp: Timestamp) {
        let node = &mut self.nodes[index.as_usize()];
        if !node.region.grown(1).contains_point(position) {
            return;
        }
        node.data_last_modified = timestamp;
        for child in node.structural_children() {
            self.mark_point_modified(child, position, timestamp);
        }
    }

    fn mark_region_modified(&mut self, index: NodeIndex, region: &Region, timestamp: Timestamp) {
        let node = &mut self.nodes[index.as_usize()];
        if !node.region.intersects(region) {
            return;
        }
        node.data_last_modified = timestamp;
        for child in node.structural_children() {
            self.mark_region_modified(child, region, timestamp);
        }
    }

    fn set_node_active(&mut self, index: NodeIndex, active: bool) {
        let node = &mut self.nodes[index.as_usize()];
        if node.active == active {
            return;
        }
        node.active = active;
        node.generation = node.generation.wrapping_add(1);
        // Activating a node changes what its parent looks like
        if let Some(parent) = node.parent {
            self.nodes[parent.as_usize()].structure_last_changed = clock::timestamp();
        }
    }

    fn determine_active_nodes(&mut self, index: NodeIndex, view_position: Vec3, lod_threshold: f32) {
        let node = &self.nodes[index.as_usize()];
        let active = match node.parent {
            None => true,
            Some(parent) => {
                let parent_region = &self.nodes[parent.as_usize()].region;
                let distance = view_position.distance(parent_region.centre().as_vec3());
                let projected_size = parent_region.diagonal_length() / distance;
                projected_size > lod_threshold || node.height >= self.minimum_lod
            }
        };
        self.set_node_active(index, active);

        let mut is_leaf = true;
        for child in self.nodes[index.as_usize()].structural_children() {
            self.determine_active_nodes(child, view_position, lod_threshold);
            if self.nodes[child.as_usize()].active {
                is_leaf = false;
            }
        }
        self.nodes[index.as_usize()].is_leaf = is_leaf;
    }

    fn schedule_updates(&mut self, index: NodeIndex, view_position: Vec3, processors: &mut TaskProcessors<V>) {
        let (minimum_lod, maximum_lod) = (self.minimum_lod, self.maximum_lod);
        let node = &mut self.nodes[index.as_usize()];

        if !node.is_mesh_up_to_date()
            && !node.is_scheduled_for_update()
            && !node.has_queued_task()
            && (maximum_lod..=minimum_lod).contains(&node.height)
        {
            node.last_scheduled_for_update = clock::timestamp();

            let mut task = ExtractionTask::new(index, node.region, node.height, 0);
            node.pending_task = Some(task.status().clone());
            if node.render_this_node {
                // On screen: must not leave a hole, so it is finished this tick
                task.priority = u32::MAX;
                processors.main_thread.add_task(task);
            } else {
                let distance = view_position.distance(node.region.centre().as_vec3());
                task.priority = (u32::MAX - 1).saturating_sub(distance as u32);
                processors.background.add_task(task);
            }
        }

        for child in self.nodes[index.as_usize()].structural_children() {
            if self.nodes[child.as_usize()].active {
                self.schedule_updates(child, view_position, processors);
            }
        }
    }

    fn apply_finished_tasks(&mut self) {
        while let Some(mut task) = self.finished.pop() {
            let Some(node) = self.nodes.get_mut(task.node.as_usize()) else {
                continue;
            };
            node.clear_pending_task(task.status());

            // Results read before the latest edit, or older than the mesh
            // already in place, are dropped
            let data_version = task.processing_started().unwrap_or_default();
            if data_version < node.data_last_modified || data_version < node.mesh_data_version {
                log::debug!(
                    "Dropping stale mesh for node {} read at {} (data modified {}, current mesh read {})",
                    task.node.0,
                    data_version,
                    node.data_last_modified,
                    node.mesh_data_version
                );
                continue;
            }
            node.set_mesh(task.take_mesh(), data_version);
        }
    }

    /// Forget tasks that started but never came back, so their nodes are
    /// scheduled again. Only valid right after the finished queue is drained.
    fn release_failed_tasks(&mut self) {
        for (i, node) in self.nodes.iter_mut().enumerate() {
            let started = node
                .pending_task
                .as_ref()
                .is_some_and(|task| task.processing_started().is_some());
            if started {
                log::warn!("Extraction for node {i} failed, rescheduling");
                node.pending_task = None;
                node.last_scheduled_for_update = 0;
            }
        }
    }

    /// Pick the render set. A node draws its own mesh only when its active
    /// children cannot all be drawn, so no region is drawn twice.
    fn determine_whether_to_render(&mut self, index: NodeIndex) {
        let node = &mut self.nodes[index.as_usize()];
        let up_to_date = node.is_mesh_up_to_date();
        if node.is_leaf {
            node.can_render_node_or_children = up_to_date;
            node.set_render_this_node(up_to_date);
            // Children that were just deactivated may still be flagged
            for child in self.nodes[index.as_usize()].structural_children() {
                self.hide_subtree(child);
            }
            return;
        }

        let mut can_render_all_children = true;
        for child in node.structural_children() {
            if self.nodes[child.as_usize()].active {
                self.determine_whether_to_render(child);
                can_render_all_children &= self.nodes[child.as_usize()].can_render_node_or_children;
            } else {
                can_render_all_children = false;
            }
        }

        let node = &mut self.nodes[index.as_usize()];
        node.can_render_node_or_children = up_to_date || can_render_all_children;
        if can_render_all_children {
            node.set_render_this_node(false);
        } else {
            for child in node.structural_children() {
                self.hide_subtree(child);
            }
            self.nodes[index.as_usize()].set_render_this_node(up_to_date);
        }
    }

    fn hide_subtree(&mut self, index: NodeIndex) {
        let node = &mut self.nodes[index.as_usize()];
        node.set_render_this_node(false);
        for child in node.structural_children() {
            self.hide_subtree(child);
        }
    }

    fn propagate_timestamps(&mut self, index: NodeIndex) -> Timestamp {
        let node = &self.nodes[index.as_usize()];
        let mut latest = node
            .structure_last_changed
            .max(node.properties_last_changed)
            .max(node.mesh_last_changed);
        for child in node.structural_children() {
            if self.nodes[child.as_usize()].active {
                latest = latest.max(self.propagate_timestamps(child));
            }
        }
        self.nodes[index.as_usize()].node_or_children_last_changed = latest;
        latest
    }
}

/// Side lengths as counted by the construction mode
fn side_lengths(region: &Region, bounds: OctreeBounds) -> IVec3 {
    match bounds {
        OctreeBounds::BoundVoxels => region.dimensions_in_voxels(),
        OctreeBounds::BoundCells => region.dimensions_in_cells(),
    }
}
