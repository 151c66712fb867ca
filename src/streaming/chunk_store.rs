//! Persistent chunk store with committed and override tables
//!
//! Writes from the paged grid only ever land in the override table. Accepting
//! copies the overrides over the committed blocks and persists the file;
//! discarding just forgets them. Volume metadata lives in a small string
//! property table next to the blocks.

use std::path::{Path, PathBuf};


use crate::core::error::Error;
use crate::core::types::Result;
use crate::math::morton::{linear_to_morton, morton_to_linear};
use crate::math::Region;
use crate::streaming::disk_io::{self, StoreTables};
use crate::streaming::paged_grid::{Pager, CHUNK_SIDE_LENGTH, VOXELS_PER_CHUNK};
use crate::streaming::region_key::region_to_key;
use crate::voxel::Voxel;

/// Whether a store may persist changes
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WritePermission {
    ReadOnly,
    ReadWrite,
}

/// Chunk-granular key/value store for one volume
pub struct ChunkStore {
    /// `None` for in-memory stores
    path: Option<PathBuf>,
    permission: WritePermission,
    tables: StoreTables,
    /// Committed state differs from the file
    dirty: bool,
}

impl ChunkStore {
    /// Create a new, empty store at `path`.
    ///
    /// Fails with `InvalidArgument` if something already exists there. An
    /// empty path gives an in-memory store that is never written to disk.
    pub fn create_empty(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Ok(Self::in_memory());
        }
        if path.exists() {
            return Err(Error::invalid_argument(format!(
                "cannot create volume at {}, the file already exists",
                path.display()
            )));
        }

        let mut store = Self {
            path: Some(path.to_path_buf()),
            permission: WritePermission::ReadWrite,
            tables: StoreTables::default(),
            dirty: true,
        };
        store.sync()?;
        log::info!("Created chunk store {}", path.display());
        Ok(store)
    }

    /// Open an existing store.
    pub fn open(path: impl AsRef<Path>, permission: WritePermission) -> Result<Self> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(Error::invalid_argument("a path is required to open a volume"));
        }

        let metadata = std::fs::metadata(path)
            .map_err(|e| Error::database(format!("cannot open {}: {}", path.display(), e)))?;
        if permission == WritePermission::ReadWrite && metadata.permissions().readonly() {
            return Err(Error::runtime(format!(
                "{} is read-only but write access was requested",
                path.display()
            )));
        }

        let tables = disk_io::read_store(path)
            .map_err(|e| Error::database(format!("cannot read {}: {}", path.display(), e)))?;
        log::info!(
            "Opened chunk store {} ({:?}, {} blocks)",
            path.display(),
            permission,
            tables.blocks.len()
        );

        Ok(Self {
            path: Some(path.to_path_buf()),
            permission,
            tables,
            dirty: false,
        })
    }

    /// Store that lives only as long as this value
    pub fn in_memory() -> Self {
        Self {
            path: None,
            permission: WritePermission::ReadWrite,
            tables: StoreTables::default(),
            dirty: false,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn permission(&self) -> WritePermission {
        self.permission
    }

    /// Number of provisional chunks waiting to be accepted or discarded
    pub fn override_chunk_count(&self) -> usize {
        self.tables.override_chunks.len()
    }

    /// Number of committed chunks
    pub fn committed_chunk_count(&self) -> usize {
        self.tables.blocks.len()
    }

    /// Commit: copy every override chunk over the committed blocks, clear the
    /// overrides and persist.
    pub fn accept_override_chunks(&mut self) -> Result<()> {
        self.require_writable("accept override chunks")?;

        let count = self.tables.override_chunks.len();
        self.tables.blocks.extend(self.tables.override_chunks.drain());
        if count > 0 {
            self.dirty = true;
        }
        self.sync()?;
        log::debug!("Accepted {} override chunks", count);
        Ok(())
    }

    /// Rollback: forget every override chunk.
    pub fn discard_override_chunks(&mut self) {
        let count = self.tables.override_chunks.len();
        self.tables.override_chunks.clear();
        log::debug!("Discarded {} override chunks", count);
    }

    pub fn get_property_as_string(&self, name: &str, default: &str) -> String {
        self.tables
            .properties
            .get(name)
            .cloned()
            .unwrap_or_else(|| default.to_string())
    }

    pub fn get_property_as_int(&self, name: &str, default: i32) -> i32 {
        self.parse_property(name, default)
    }

    pub fn get_property_as_float(&self, name: &str, default: f32) -> f32 {
        self.parse_property(name, default)
    }

    /// Set a property. Persisted on the next [`ChunkStore::sync`] or accept.
    pub fn set_property(&mut self, name: &str, value: impl ToString) -> Result<()> {
        self.require_writable("set a property")?;
        self.tables.properties.insert(name.to_string(), value.to_string());
        self.dirty = true;
        Ok(())
    }

    /// Write committed state and properties to disk if anything changed.
    ///
    /// Override chunks are never persisted.
    pub fn sync(&mut self) -> Result<()> {
        let Some(path) = self.path.as_deref() else {
            return Ok(());
        };
        if !self.dirty || self.permission == WritePermission::ReadOnly {
            return Ok(());
        }

        disk_io::write_store(
            path,
            &self.tables.properties,
            &self.tables.blocks,
            &Default::default(),
        )
        .map_err(|e| Error::database(format!("cannot write {}: {}", path.display(), e)))?;
        self.dirty = false;
        Ok(())
    }

    fn parse_property<T: std::str::FromStr + Copy + std::fmt::Display>(&self, name: &str, default: T) -> T {
        match self.tables.properties.get(name) {
            None => default,
            Some(value) => value.trim().parse().unwrap_or_else(|_| {
                log::warn!(
                    "Property '{}' has unparsable value '{}', using default {}",
                    name, value, default
                );
                default
            }),
        }
    }

    fn require_writable(&self, operation: &str) -> Result<()> {
        match self.permission {
            WritePermission::ReadWrite => Ok(()),
            WritePermission::ReadOnly => Err(Error::database(format!(
                "cannot {} on a read-only volume",
                operation
            ))),
        }
    }

    fn lookup(&self, key: u64) -> Option<&[u8]> {
        self.tables
            .override_chunks
            .get(&key)
            .or_else(|| self.tables.blocks.get(&key))
            .map(Vec::as_slice)
    }
}

impl<V: Voxel> Pager<V> for ChunkStore {
    fn page_in(&mut self, region: &Region, chunk: &mut [V]) -> Result<()> {
        let key = region_to_key(region)?;
        let Some(blob) = self.lookup(key) else {
            return Ok(());
        };

        let bytes = disk_io::decompress_chunk(blob, V::chunk_byte_size())?;
        let linear: Vec<V> = bytemuck::pod_collect_to_vec(&bytes);
        linear_to_morton(&linear, chunk, CHUNK_SIDE_LENGTH);
        log::trace!("Paged in {:?} ({} compressed bytes)", region.lower(), blob.len());
        Ok(())
    }

    fn page_out(&mut self, region: &Region, chunk: &[V]) -> Result<()> {
        let key = region_to_key(region)?;

        let mut linear = vec![V::zeroed(); VOXELS_PER_CHUNK];
        morton_to_linear(chunk, &mut linear, CHUNK_SIDE_LENGTH);
        let blob = disk_io::compress_chunk(bytemuck::cast_slice(&linear));
        log::trace!("Paged out {:?} ({} compressed bytes)", region.lower(), blob.len());

        self.tables.override_chunks.insert(key, blob);
        Ok(())
    }
}

impl Drop for ChunkStore {
    fn drop(&mut self) {
        if let Err(e) = self.sync() {
            log::error!("Failed to write chunk store on close: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::IVec3;
    use crate::math::morton::encode_morton_3d;
    use crate::streaming::paged_grid::chunk_region;
    use crate::voxel::{Color, MaterialSet};
    use tempfile::TempDir;

    fn chunk_with(local: IVec3, value: Color) -> Vec<Color> {
        let mut chunk = vec![Color::EMPTY; VOXELS_PER_CHUNK];
        chunk[encode_morton_3d(local.x as u32, local.y as u32, local.z as u32) as usize] = value;
        chunk
    }

    fn page_out_color(store: &mut ChunkStore, region: &Region, chunk: &[Color]) -> Result<()> {
        Pager::<Color>::page_out(store, region, chunk)
    }

    fn page_in_color(store: &mut ChunkStore, region: &Region) -> Result<Vec<Color>> {
        let mut chunk = vec![Color::EMPTY; VOXELS_PER_CHUNK];
        Pager::<Color>::page_in(store, region, &mut chunk)?;
        Ok(chunk)
    }

    #[test]
    fn test_create_rejects_existing_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("v.vxdb");
        drop(ChunkStore::create_empty(&path).unwrap());
        assert!(path.exists());
        assert!(matches!(ChunkStore::create_empty(&path), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_open_errors() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing.vxdb");
        assert!(matches!(ChunkStore::open(&missing, WritePermission::ReadOnly), Err(Error::Database(_))));
        assert!(matches!(ChunkStore::open("", WritePermission::ReadOnly), Err(Error::InvalidArgument(_))));

        let garbage = dir.path().join("garbage.vxdb");
        std::fs::write(&garbage, b"definitely not a volume").unwrap();
        assert!(matches!(ChunkStore::open(&garbage, WritePermission::ReadOnly), Err(Error::Database(_))));
    }

    #[test]
    fn test_empty_path_is_in_memory() {
        let store = ChunkStore::create_empty("").unwrap();
        assert!(store.path().is_none());
    }

    #[test]
    fn test_properties() {
        let mut store = ChunkStore::in_memory();
        store.set_property("lowerX", -12).unwrap();
        store.set_property("scale", 0.5).unwrap();
        store.set_property("VoxelType", "Color").unwrap();
        store.set_property("junk", "twelve").unwrap();

        assert_eq!(store.get_property_as_int("lowerX", 0), -12);
        assert_eq!(store.get_property_as_float("scale", 1.0), 0.5);
        assert_eq!(store.get_property_as_string("VoxelType", ""), "Color");
        assert_eq!(store.get_property_as_int("missing", 512), 512);
        assert_eq!(store.get_property_as_int("junk", 7), 7);
    }

    #[test]
    fn test_page_in_missing_leaves_default() {
        let mut store = ChunkStore::in_memory();
        let chunk = page_in_color(&mut store, &chunk_region(IVec3::new(3, -2, 1))).unwrap();
        assert!(chunk.iter().all(|c| *c == Color::EMPTY));
    }

    #[test]
    fn test_page_out_goes_to_override_only() {
        let mut store = ChunkStore::in_memory();
        let region = chunk_region(IVec3::ZERO);
        let chunk = chunk_with(IVec3::new(1, 2, 3), Color::rgb(255, 0, 0));

        page_out_color(&mut store, &region, &chunk).unwrap();
        assert_eq!(store.override_chunk_count(), 1);
        assert_eq!(store.committed_chunk_count(), 0);
        assert_eq!(page_in_color(&mut store, &region).unwrap(), chunk);
    }

    #[test]
    fn test_disk_order_is_linear() {
        let mut store = ChunkStore::in_memory();
        let region = chunk_region(IVec3::ZERO);
        let value = Color::rgb(0, 255, 0);
        page_out_color(&mut store, &region, &chunk_with(IVec3::new(1, 1, 0), value)).unwrap();

        let key = region_to_key(&region).unwrap();
        let bytes = disk_io::decompress_chunk(store.lookup(key).unwrap(), Color::chunk_byte_size()).unwrap();
        let linear: Vec<Color> = bytemuck::pod_collect_to_vec(&bytes);
        assert_eq!(linear[1 + 32], value);
    }

    #[test]
    fn test_override_shadows_committed() {
        let mut store = ChunkStore::in_memory();
        let region = chunk_region(IVec3::ZERO);
        let first = chunk_with(IVec3::ZERO, Color::rgb(255, 0, 0));
        let second = chunk_with(IVec3::ZERO, Color::rgb(0, 0, 255));

        page_out_color(&mut store, &region, &first).unwrap();
        store.accept_override_chunks().unwrap();
        page_out_color(&mut store, &region, &second).unwrap();
        assert_eq!(page_in_color(&mut store, &region).unwrap(), second);

        store.discard_override_chunks();
        assert_eq!(page_in_color(&mut store, &region).unwrap(), first);
    }

    #[test]
    fn test_accept_last_writer_wins() {
        let mut store = ChunkStore::in_memory();
        let region = chunk_region(IVec3::new(1, 0, 0));
        page_out_color(&mut store, &region, &chunk_with(IVec3::ZERO, Color::rgb(255, 0, 0))).unwrap();
        store.accept_override_chunks().unwrap();

        let newer = chunk_with(IVec3::ZERO, Color::rgb(0, 255, 0));
        page_out_color(&mut store, &region, &newer).unwrap();
        store.accept_override_chunks().unwrap();

        assert_eq!(store.override_chunk_count(), 0);
        assert_eq!(store.committed_chunk_count(), 1);
        assert_eq!(page_in_color(&mut store, &region).unwrap(), newer);
    }

    #[test]
    fn test_discard_is_idempotent() {
        let mut store = ChunkStore::in_memory();
        page_out_color(&mut store, &chunk_region(IVec3::ZERO), &chunk_with(IVec3::ZERO, Color::rgb(1, 1, 1))).unwrap();

        store.discard_override_chunks();
        assert_eq!(store.override_chunk_count(), 0);
        store.discard_override_chunks();
        assert_eq!(store.override_chunk_count(), 0);
        assert_eq!(store.committed_chunk_count(), 0);
    }

    #[test]
    fn test_accept_persists_and_overrides_do_not() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("persist.vxdb");
        let committed_region = chunk_region(IVec3::ZERO);
        let pending_region = chunk_region(IVec3::new(0, 1, 0));
        let committed = chunk_with(IVec3::new(4, 4, 4), Color::rgb(200, 100, 50));

        {
            let mut store = ChunkStore::create_empty(&path).unwrap();
            store.set_property("VoxelType", "Color").unwrap();
            page_out_color(&mut store, &committed_region, &committed).unwrap();
            store.accept_override_chunks().unwrap();
            page_out_color(&mut store, &pending_region, &chunk_with(IVec3::ZERO, Color::rgb(9, 9, 9)))
                .unwrap();
        }

        let mut store = ChunkStore::open(&path, WritePermission::ReadOnly).unwrap();
        assert_eq!(store.get_property_as_string("VoxelType", ""), "Color");
        assert_eq!(store.override_chunk_count(), 0);
        assert_eq!(page_in_color(&mut store, &committed_region).unwrap(), committed);
        assert!(page_in_color(&mut store, &pending_region).unwrap().iter().all(|c| *c == Color::EMPTY));
    }

    #[test]
    fn test_read_only_store() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ro.vxdb");
        drop(ChunkStore::create_empty(&path).unwrap());

        let mut store = ChunkStore::open(&path, WritePermission::ReadOnly).unwrap();
        assert!(matches!(store.set_property("a", 1), Err(Error::Database(_))));

        // Provisional writes are allowed, committing them is not
        page_out_color(&mut store, &chunk_region(IVec3::ZERO), &chunk_with(IVec3::ZERO, Color::rgb(1, 1, 1))).unwrap();
        assert!(matches!(store.accept_override_chunks(), Err(Error::Database(_))));
    }

    #[test]
    fn test_read_write_on_read_only_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("locked.vxdb");
        drop(ChunkStore::create_empty(&path).unwrap());

        let mut permissions = std::fs::metadata(&path).unwrap().permissions();
        permissions.set_readonly(true);
        std::fs::set_permissions(&path, permissions).unwrap();

        assert!(matches!(ChunkStore::open(&path, WritePermission::ReadWrite), Err(Error::Runtime(_))));
        assert!(ChunkStore::open(&path, WritePermission::ReadOnly).is_ok());
    }

    #[test]
    fn test_corrupt_chunk_is_compression_error() {
        let mut store = ChunkStore::in_memory();
        let bad = chunk_region(IVec3::ZERO);
        let good = chunk_region(IVec3::new(1, 0, 0));
        let good_chunk = chunk_with(IVec3::ZERO, Color::rgb(3, 3, 3));
        page_out_color(&mut store, &good, &good_chunk).unwrap();
        store
            .tables
            .override_chunks
            .insert(region_to_key(&bad).unwrap(), disk_io::compress_chunk(&[0u8; 10]));

        assert!(matches!(page_in_color(&mut store, &bad), Err(Error::Compression(_))));
        assert_eq!(page_in_color(&mut store, &good).unwrap(), good_chunk);
    }

    #[test]
    fn test_chunk_size_depends_on_voxel_type() {
        let mut store = ChunkStore::in_memory();
        let region = chunk_region(IVec3::ZERO);
        page_out_color(&mut store, &region, &chunk_with(IVec3::ZERO, Color::rgb(1, 2, 3))).unwrap();

        // A colour chunk is too small to be read as material sets
        let mut chunk = vec![MaterialSet::EMPTY; VOXELS_PER_CHUNK];
        assert!(matches!(
            Pager::<MaterialSet>::page_in(&mut store, &region, &mut chunk),
            Err(Error::Compression(_))
        ));
    }
}
