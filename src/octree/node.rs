//! Octree node: LOD state, change timestamps and the node's mesh

use std::sync::Arc;

use crate::core::clock;
use crate::core::types::Timestamp;
use crate::math::Region;
use crate::mesh::Mesh;
use crate::task::TaskRef;
use crate::voxel::Voxel;

/// Position of a node in its octree's arena
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeIndex(pub u16);

impl NodeIndex {
    /// Reserved value meaning "no node"
    pub const INVALID: NodeIndex = NodeIndex(u16::MAX);

    pub fn as_usize(self) -> usize {
        self.0 as usize
    }
}

/// Node index plus the slot generation it was issued for.
///
/// The generation changes whenever the node is activated or deactivated, so a
/// handle taken before such a change is rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeHandle {
    pub index: NodeIndex,
    pub generation: u32,
}

/// Per-region LOD state
pub struct OctreeNode<V: Voxel> {
    pub(crate) region: Region,
    /// 0 for the finest nodes, increasing towards the root
    pub(crate) height: u8,
    pub(crate) parent: Option<NodeIndex>,
    /// Structural children, indexed `[x][y][z]`
    pub(crate) children: [[[Option<NodeIndex>; 2]; 2]; 2],
    pub(crate) generation: u32,

    pub(crate) active: bool,
    pub(crate) is_leaf: bool,
    pub(crate) can_render_node_or_children: bool,
    pub(crate) render_this_node: bool,

    pub(crate) mesh: Option<Mesh<V::Vertex>>,
    pub(crate) pending_task: Option<TaskRef>,
    /// When the voxel data behind the current mesh was read
    pub(crate) mesh_data_version: Timestamp,

    pub(crate) data_last_modified: Timestamp,
    pub(crate) mesh_last_changed: Timestamp,
    pub(crate) structure_last_changed: Timestamp,
    pub(crate) properties_last_changed: Timestamp,
    pub(crate) node_or_children_last_changed: Timestamp,
    pub(crate) last_scheduled_for_update: Timestamp,
}

impl<V: Voxel> OctreeNode<V> {
    /// New node. Its mesh starts out of date.
    pub(crate) fn new(region: Region, height: u8, parent: Option<NodeIndex>) -> Self {
        Self {
            region,
            height,
            parent,
            children: [[[None; 2]; 2]; 2],
            generation: 0,
            active: false,
            is_leaf: false,
            can_render_node_or_children: false,
            render_this_node: false,
            mesh: None,
            pending_task: None,
            mesh_data_version: 0,
            data_last_modified: 2,
            mesh_last_changed: 1,
            structure_last_changed: 1,
            properties_last_changed: 1,
            node_or_children_last_changed: 1,
            last_scheduled_for_update: 0,
        }
    }

    pub fn region(&self) -> &Region {
        &self.region
    }

    pub fn height(&self) -> u8 {
        self.height
    }

    pub fn parent(&self) -> Option<NodeIndex> {
        self.parent
    }

    /// Structural child, whether or not it is active
    pub fn structural_child(&self, x: usize, y: usize, z: usize) -> Option<NodeIndex> {
        self.children[x][y][z]
    }

    /// Every structural child in z, y, x order
    pub fn structural_children(&self) -> impl Iterator<Item = NodeIndex> + use<V> {
        let children = self.children;
        (0..2).flat_map(move |z| {
            (0..2).flat_map(move |y| (0..2).filter_map(move |x| children[x][y][z]))
        })
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_leaf(&self) -> bool {
        self.is_leaf
    }

    pub fn can_render_node_or_children(&self) -> bool {
        self.can_render_node_or_children
    }

    pub fn render_this_node(&self) -> bool {
        self.render_this_node
    }

    pub fn mesh(&self) -> Option<&Mesh<V::Vertex>> {
        self.mesh.as_ref()
    }

    /// True if the node has a mesh with at least one triangle
    pub fn has_mesh(&self) -> bool {
        self.mesh.as_ref().is_some_and(Mesh::has_geometry)
    }

    pub fn data_last_modified(&self) -> Timestamp {
        self.data_last_modified
    }

    pub fn mesh_last_changed(&self) -> Timestamp {
        self.mesh_last_changed
    }

    pub fn structure_last_changed(&self) -> Timestamp {
        self.structure_last_changed
    }

    pub fn properties_last_changed(&self) -> Timestamp {
        self.properties_last_changed
    }

    pub fn node_or_children_last_changed(&self) -> Timestamp {
        self.node_or_children_last_changed
    }

    pub fn is_mesh_up_to_date(&self) -> bool {
        self.mesh_last_changed > self.data_last_modified
    }

    /// Scheduled more recently than the last data or mesh change
    pub fn is_scheduled_for_update(&self) -> bool {
        self.last_scheduled_for_update > self.data_last_modified
            && self.last_scheduled_for_update > self.mesh_last_changed
    }

    /// A task was created for this node and has not started processing yet
    pub fn has_queued_task(&self) -> bool {
        self.pending_task
            .as_ref()
            .is_some_and(|task| task.processing_started().is_none())
    }

    pub(crate) fn set_render_this_node(&mut self, render: bool) {
        if self.render_this_node != render {
            self.render_this_node = render;
            self.properties_last_changed = clock::timestamp();
        }
    }

    /// Replace the mesh. `data_version` is when the voxels behind it were read.
    pub(crate) fn set_mesh(&mut self, mesh: Option<Mesh<V::Vertex>>, data_version: Timestamp) {
        self.mesh = mesh;
        self.mesh_data_version = data_version;
        self.mesh_last_changed = clock::timestamp();
    }

    /// Forget the in-flight task if it is the one given
    pub(crate) fn clear_pending_task(&mut self, task: &TaskRef) {
        if self.pending_task.as_ref().is_some_and(|t| Arc::ptr_eq(t, task)) {
            self.pending_task = None;
        }
    }
}

impl<V: Voxel> std::fmt::Debug for OctreeNode<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OctreeNode")
            .field("region", &self.region)
            .field("height", &self.height)
            .field("active", &self.active)
            .field("is_leaf", &self.is_leaf)
            .field("render_this_node", &self.render_this_node)
            .field("up_to_date", &self.is_mesh_up_to_date())
            .finish()
    }
}
