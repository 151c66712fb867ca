//! Volume: paged voxel grid, chunk store, LOD octree and task processors
//! behind one owner.

use std::path::Path;

use glam::Vec3;

use crate::core::clock;
use crate::core::config::VolumeConfig;
use crate::core::error::Error;
use crate::core::types::{IVec3, Result};
use crate::math::Region;
use crate::octree::Octree;
use crate::streaming::{ChunkStore, PagedGrid, WritePermission};
use crate::task::TaskProcessors;
use crate::voxel::{Voxel, VoxelKind};

/// Property names persisted alongside the chunks
const BOUNDS_PROPERTIES: [&str; 6] = ["lowerX", "lowerY", "lowerZ", "upperX", "upperY", "upperZ"];
const VOXEL_TYPE_PROPERTY: &str = "VoxelType";

/// Upper corner assumed when a store does not record its bounds
const DEFAULT_UPPER_BOUND: i32 = 512;

/// A persistent voxel volume with incrementally maintained LOD meshes.
///
/// Edits go to the store's override table through the paged grid and become
/// permanent only when accepted. Dropping a volume without accepting loses
/// them.
pub struct Volume<V: Voxel> {
    region: Region,
    grid: PagedGrid<V, ChunkStore>,
    octree: Octree<V>,
    processors: TaskProcessors<V>,
    config: VolumeConfig,
}

impl<V: Voxel> Volume<V> {
    /// Create a volume covering `region` in a new store at `path`.
    ///
    /// An empty path creates an in-memory volume.
    pub fn new(region: Region, path: impl AsRef<Path>, config: VolumeConfig) -> Result<Self> {
        config.validate()?;
        if !region.is_valid() {
            return Err(Error::invalid_argument(format!("invalid volume region {region:?}")));
        }

        let mut store = ChunkStore::create_empty(path)?;
        let corners = [region.lower(), region.upper()];
        for (i, name) in BOUNDS_PROPERTIES.iter().enumerate() {
            store.set_property(name, corners[i / 3][i % 3])?;
        }
        store.set_property(VOXEL_TYPE_PROPERTY, V::KIND.type_tag())?;
        store.sync()?;

        Self::from_store(region, store, config)
    }

    /// Open the volume stored at `path`.
    pub fn open(path: impl AsRef<Path>, permission: WritePermission, config: VolumeConfig) -> Result<Self> {
        config.validate()?;
        let store = ChunkStore::open(path.as_ref(), permission)?;

        let tag = store.get_property_as_string(VOXEL_TYPE_PROPERTY, "");
        if tag != V::KIND.type_tag() {
            return Err(Error::runtime(format!(
                "{} holds '{}' voxels, expected '{}'",
                path.as_ref().display(),
                tag,
                V::KIND.type_tag()
            )));
        }

        let bound = |i: usize| {
            let default = if i < 3 { 0 } else { DEFAULT_UPPER_BOUND };
            store.get_property_as_int(BOUNDS_PROPERTIES[i], default)
        };
        let region = Region::from_coords(bound(0), bound(1), bound(2), bound(3), bound(4), bound(5));
        if !region.is_valid() {
            return Err(Error::database(format!("stored volume bounds {region:?} are invalid")));
        }

        Self::from_store(region, store, config)
    }

    fn from_store(region: Region, store: ChunkStore, config: VolumeConfig) -> Result<Self> {
        let mut octree = Octree::new(&region, V::KIND.octree_bounds(), config.base_node_size)?;
        octree.set_lod_range(config.minimum_lod, config.maximum_lod)?;
        octree.mark_region_as_modified(&region, clock::timestamp());

        log::info!(
            "Volume of {:?} voxels over {:?}, {} octree nodes",
            V::KIND,
            region,
            octree.node_count()
        );

        Ok(Self {
            region,
            grid: PagedGrid::new(store, config.cache_budget_bytes),
            octree,
            processors: TaskProcessors::new(config.background_tasks_per_update),
            config,
        })
    }

    pub fn kind(&self) -> VoxelKind {
        V::KIND
    }

    pub fn enclosing_region(&self) -> &Region {
        &self.region
    }

    pub fn config(&self) -> &VolumeConfig {
        &self.config
    }

    pub fn octree(&self) -> &Octree<V> {
        &self.octree
    }

    pub fn octree_mut(&mut self) -> &mut Octree<V> {
        &mut self.octree
    }

    pub fn store(&self) -> &ChunkStore {
        self.grid.pager()
    }

    /// Voxel at `position`; the default voxel outside the volume
    pub fn voxel(&mut self, position: IVec3) -> Result<V> {
        if !self.region.contains_point(position) {
            return Ok(V::default());
        }
        self.grid.voxel(position)
    }

    /// Write a voxel. With `mark_as_modified` the meshes touching it are
    /// rebuilt on later updates.
    pub fn set_voxel(&mut self, position: IVec3, value: V, mark_as_modified: bool) -> Result<()> {
        if !self.region.contains_point(position) {
            return Err(Error::invalid_argument(format!(
                "voxel {position} is outside the volume {:?}",
                self.region
            )));
        }
        self.grid.set_voxel(position, value)?;
        if mark_as_modified {
            self.octree.mark_data_as_modified(position, clock::timestamp());
        }
        Ok(())
    }

    /// Schedule every mesh overlapping `region` for rebuilding
    pub fn mark_as_modified(&mut self, region: &Region) {
        self.octree.mark_region_as_modified(region, clock::timestamp());
    }

    /// Make all edits so far permanent
    pub fn accept_override_chunks(&mut self) -> Result<()> {
        self.grid.flush_all()?;
        self.grid.pager_mut().accept_override_chunks()
    }

    /// Throw away all edits since the last accept
    pub fn discard_override_chunks(&mut self) -> Result<()> {
        self.grid.flush_all()?;
        self.grid.pager_mut().discard_override_chunks();
        // Meshes may show the discarded edits
        self.octree.mark_region_as_modified(&self.region, clock::timestamp());
        Ok(())
    }

    /// Advance the LOD state for a viewer at `view_position`.
    ///
    /// Returns `Ok(true)` once every mesh that should exist is current.
    pub fn update(&mut self, view_position: Vec3, lod_threshold: f32) -> Result<bool> {
        self.octree
            .update(view_position, lod_threshold, &mut self.grid, &mut self.processors)
    }
}
