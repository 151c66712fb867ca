//! C handle API for voxtree volumes
//!
//! Every function returns a status code (`VT_OK` on success) and hands its
//! results back through out-pointers. Volumes and octree nodes are named by
//! 32-bit handles, see [`registry`] for the layout.
//!
//! ```text
//! vt_initialize()
//! vt_new_empty_colored_cubes_volume(..., &volume)
//! loop {
//!     vt_update_volume(volume, eye, threshold, &up_to_date)
//!     vt_get_root_octree_node(volume, &root)  // walk child_handles
//!     vt_get_mesh(node, ...)                  // upload when mesh timestamp moved
//! }
//! vt_delete_volume(volume)
//! vt_shutdown()
//! ```
//!
//! Mesh pointers stay valid until the next call that updates or deletes the
//! volume they came from.

pub mod error;
pub mod registry;

use std::ffi::{c_char, c_void, CStr};
use std::sync::{Mutex, PoisonError};

use glam::{IVec3, Vec3};

use voxtree::core::{clock, logging, Error, Result, VolumeConfig};
use voxtree::math::Region;
use voxtree::streaming::WritePermission;
use voxtree::voxel::{Color, Voxel, VoxelKind};
use voxtree::Volume;

use error::guard;
use registry::{resolve_node, AnyVolume, VolumeRegistry, INVALID_HANDLE};

pub use error::{
    VT_COMPRESSION_ERROR, VT_DATABASE_ERROR, VT_INVALID_ARGUMENT, VT_OK, VT_RUNTIME_ERROR,
    VT_UNKNOWN_ERROR,
};

pub const VT_COLORED_CUBES: u32 = 0;
pub const VT_TERRAIN: u32 = 1;

pub const VT_READONLY: u32 = 0;
pub const VT_READWRITE: u32 = 1;

const VERSION: [u32; 4] = [1, 3, 0, 0];

static REGISTRY: Mutex<Option<VolumeRegistry>> = Mutex::new(None);

/// Octree node descriptor filled by [`vt_get_octree_node`]
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct VtOctreeNode {
    /// Lower corner of the node's region
    pub pos_x: i32,
    pub pos_y: i32,
    pub pos_z: i32,
    pub structure_last_changed: u32,
    pub properties_last_changed: u32,
    pub mesh_last_changed: u32,
    pub node_or_children_last_changed: u32,
    /// Indexed `[x][y][z]`. `0xFFFFFFFF` where there is no active child.
    pub child_handles: [[[u32; 2]; 2]; 2],
    pub has_mesh: u8,
    pub height: u8,
    pub render_this_node: u8,
    pub _pad: u8,
}

fn with_registry<T>(body: impl FnOnce(&mut VolumeRegistry) -> Result<T>) -> Result<T> {
    let mut registry = REGISTRY.lock().unwrap_or_else(PoisonError::into_inner);
    let registry = registry
        .as_mut()
        .ok_or_else(|| Error::runtime("vt_initialize has not been called"))?;
    body(registry)
}

/// Borrow an out-pointer, rejecting null
unsafe fn out<'a, T>(ptr: *mut T) -> Result<&'a mut T> {
    unsafe { ptr.as_mut() }.ok_or_else(|| Error::invalid_argument("output pointer is null"))
}

unsafe fn path_arg<'a>(path: *const c_char) -> Result<&'a str> {
    if path.is_null() {
        return Err(Error::invalid_argument("path is null"));
    }
    unsafe { CStr::from_ptr(path) }
        .to_str()
        .map_err(|_| Error::invalid_argument("path is not valid UTF-8"))
}

fn config_with_base(base_node_size: u32) -> VolumeConfig {
    VolumeConfig {
        base_node_size,
        ..VolumeConfig::default()
    }
}

fn permission_arg(permission: u32) -> Result<WritePermission> {
    match permission {
        VT_READONLY => Ok(WritePermission::ReadOnly),
        VT_READWRITE => Ok(WritePermission::ReadWrite),
        other => Err(Error::invalid_argument(format!("unknown write permission {other}"))),
    }
}

fn create_volume(
    kind: VoxelKind,
    region: Region,
    path: &str,
    base_node_size: u32,
) -> Result<AnyVolume> {
    let config = config_with_base(base_node_size);
    Ok(match kind {
        VoxelKind::Color => AnyVolume::Color(Volume::new(region, path, config)?),
        VoxelKind::MaterialBlend => AnyVolume::MaterialBlend(Volume::new(region, path, config)?),
    })
}

fn open_volume(kind: VoxelKind, path: &str, permission: u32, base_node_size: u32) -> Result<AnyVolume> {
    let permission = permission_arg(permission)?;
    let config = config_with_base(base_node_size);
    Ok(match kind {
        VoxelKind::Color => AnyVolume::Color(Volume::open(path, permission, config)?),
        VoxelKind::MaterialBlend => AnyVolume::MaterialBlend(Volume::open(path, permission, config)?),
    })
}

fn register(volume: AnyVolume, result: &mut u32) -> Result<()> {
    *result = with_registry(|registry| registry.insert(volume))?;
    Ok(())
}

unsafe fn read_voxel<V: Voxel>(volume: &mut Volume<V>, position: IVec3, result: *mut c_void) -> Result<()> {
    if result.is_null() {
        return Err(Error::invalid_argument("output pointer is null"));
    }
    let value = volume.voxel(position)?;
    let bytes = bytemuck::bytes_of(&value);
    let target = unsafe { std::slice::from_raw_parts_mut(result as *mut u8, bytes.len()) };
    target.copy_from_slice(bytes);
    Ok(())
}

unsafe fn write_voxel<V: Voxel>(volume: &mut Volume<V>, position: IVec3, value: *const c_void) -> Result<()> {
    if value.is_null() {
        return Err(Error::invalid_argument("voxel pointer is null"));
    }
    let bytes = unsafe { std::slice::from_raw_parts(value as *const u8, size_of::<V>()) };
    volume.set_voxel(position, bytemuck::pod_read_unaligned(bytes), true)
}

// ---------------------------------------------------------------------------
// Library lifecycle and diagnostics
// ---------------------------------------------------------------------------

/// Set up logging and the volume registry. Calling it again is harmless.
#[unsafe(no_mangle)]
pub extern "C" fn vt_initialize() -> i32 {
    guard("vt_initialize", || {
        logging::init();
        let mut registry = REGISTRY.lock().unwrap_or_else(PoisonError::into_inner);
        if registry.is_none() {
            *registry = Some(VolumeRegistry::new());
            log::info!("voxtree {}.{}.{}.{} initialized", VERSION[0], VERSION[1], VERSION[2], VERSION[3]);
        }
        Ok(())
    })
}

/// Delete every remaining volume. Unaccepted edits are lost.
#[unsafe(no_mangle)]
pub extern "C" fn vt_shutdown() -> i32 {
    guard("vt_shutdown", || {
        let registry = REGISTRY.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(registry) = registry {
            if !registry.is_empty() {
                log::warn!("Shutting down with {} volumes still open", registry.len());
            }
        }
        Ok(())
    })
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn vt_get_version_number(
    major: *mut u32,
    minor: *mut u32,
    patch: *mut u32,
    build: *mut u32,
) -> i32 {
    guard("vt_get_version_number", || {
        let outputs = unsafe { [out(major)?, out(minor)?, out(patch)?, out(build)?] };
        for (slot, value) in outputs.into_iter().zip(VERSION) {
            *slot = value;
        }
        Ok(())
    })
}

/// Static name of a status code
#[unsafe(no_mangle)]
pub extern "C" fn vt_get_error_code_as_string(code: i32) -> *const c_char {
    error::error_code_name(code).as_ptr()
}

/// Message for the last failing call on this thread
#[unsafe(no_mangle)]
pub extern "C" fn vt_get_last_error_message() -> *const c_char {
    error::last_error_ptr()
}

/// Latest logical timestamp, without advancing the clock
#[unsafe(no_mangle)]
pub extern "C" fn vt_get_current_time() -> u32 {
    clock::current_time()
}

// ---------------------------------------------------------------------------
// Colours
// ---------------------------------------------------------------------------

#[unsafe(no_mangle)]
pub extern "C" fn vt_make_color(red: u8, green: u8, blue: u8, alpha: u8) -> u32 {
    Color::new(red, green, blue, alpha).to_bits()
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn vt_get_all_components(
    color: u32,
    red: *mut u8,
    green: *mut u8,
    blue: *mut u8,
    alpha: *mut u8,
) -> i32 {
    guard("vt_get_all_components", || {
        let color = Color::from_bits(color);
        unsafe {
            *out(red)? = color.red();
            *out(green)? = color.green();
            *out(blue)? = color.blue();
            *out(alpha)? = color.alpha();
        }
        Ok(())
    })
}

// ---------------------------------------------------------------------------
// Volume lifetime
// ---------------------------------------------------------------------------

/// Create a colour volume in a new file. An empty path keeps it in memory.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn vt_new_empty_colored_cubes_volume(
    lower_x: i32,
    lower_y: i32,
    lower_z: i32,
    upper_x: i32,
    upper_y: i32,
    upper_z: i32,
    path: *const c_char,
    base_node_size: u32,
    result: *mut u32,
) -> i32 {
    guard("vt_new_empty_colored_cubes_volume", || {
        let (path, result) = unsafe { (path_arg(path)?, out(result)?) };
        let region = Region::from_coords(lower_x, lower_y, lower_z, upper_x, upper_y, upper_z);
        register(create_volume(VoxelKind::Color, region, path, base_node_size)?, result)
    })
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn vt_new_colored_cubes_volume_from_vdb(
    path: *const c_char,
    write_permissions: u32,
    base_node_size: u32,
    result: *mut u32,
) -> i32 {
    guard("vt_new_colored_cubes_volume_from_vdb", || {
        let (path, result) = unsafe { (path_arg(path)?, out(result)?) };
        register(open_volume(VoxelKind::Color, path, write_permissions, base_node_size)?, result)
    })
}

/// Create a terrain volume in a new file. An empty path keeps it in memory.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn vt_new_empty_terrain_volume(
    lower_x: i32,
    lower_y: i32,
    lower_z: i32,
    upper_x: i32,
    upper_y: i32,
    upper_z: i32,
    path: *const c_char,
    base_node_size: u32,
    result: *mut u32,
) -> i32 {
    guard("vt_new_empty_terrain_volume", || {
        let (path, result) = unsafe { (path_arg(path)?, out(result)?) };
        let region = Region::from_coords(lower_x, lower_y, lower_z, upper_x, upper_y, upper_z);
        register(create_volume(VoxelKind::MaterialBlend, region, path, base_node_size)?, result)
    })
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn vt_new_terrain_volume_from_vdb(
    path: *const c_char,
    write_permissions: u32,
    base_node_size: u32,
    result: *mut u32,
) -> i32 {
    guard("vt_new_terrain_volume_from_vdb", || {
        let (path, result) = unsafe { (path_arg(path)?, out(result)?) };
        register(open_volume(VoxelKind::MaterialBlend, path, write_permissions, base_node_size)?, result)
    })
}

/// Delete a volume without accepting its pending edits
#[unsafe(no_mangle)]
pub extern "C" fn vt_delete_volume(volume: u32) -> i32 {
    guard("vt_delete_volume", || {
        with_registry(|registry| registry.remove(volume).map(drop))
    })
}

// ---------------------------------------------------------------------------
// Volume queries and edits
// ---------------------------------------------------------------------------

/// `VT_COLORED_CUBES` or `VT_TERRAIN`
#[unsafe(no_mangle)]
pub unsafe extern "C" fn vt_get_volume_type(volume: u32, result: *mut u32) -> i32 {
    guard("vt_get_volume_type", || {
        let result = unsafe { out(result)? };
        *result = with_registry(|registry| {
            Ok(match registry.get(volume)?.kind() {
                VoxelKind::Color => VT_COLORED_CUBES,
                VoxelKind::MaterialBlend => VT_TERRAIN,
            })
        })?;
        Ok(())
    })
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn vt_get_enclosing_region(
    volume: u32,
    lower_x: *mut i32,
    lower_y: *mut i32,
    lower_z: *mut i32,
    upper_x: *mut i32,
    upper_y: *mut i32,
    upper_z: *mut i32,
) -> i32 {
    guard("vt_get_enclosing_region", || {
        let outputs = unsafe {
            [out(lower_x)?, out(lower_y)?, out(lower_z)?, out(upper_x)?, out(upper_y)?, out(upper_z)?]
        };
        let region = with_registry(|registry| {
            Ok(with_volume!(registry.get(volume)?, v => *v.enclosing_region()))
        })?;
        let corners = region.lower().to_array().into_iter().chain(region.upper().to_array());
        for (slot, value) in outputs.into_iter().zip(corners) {
            *slot = value;
        }
        Ok(())
    })
}

/// Copy the voxel at a position into `result`, which must hold a packed
/// colour (4 bytes) or material set (8 bytes) depending on the volume type.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn vt_get_voxel(volume: u32, x: i32, y: i32, z: i32, result: *mut c_void) -> i32 {
    guard("vt_get_voxel", || {
        with_registry(|registry| {
            let position = IVec3::new(x, y, z);
            with_volume!(registry.get_mut(volume)?, v => unsafe { read_voxel(v, position, result) })
        })
    })
}

/// Write a voxel and mark the nodes around it for remeshing
#[unsafe(no_mangle)]
pub unsafe extern "C" fn vt_set_voxel(volume: u32, x: i32, y: i32, z: i32, value: *const c_void) -> i32 {
    guard("vt_set_voxel", || {
        with_registry(|registry| {
            let position = IVec3::new(x, y, z);
            with_volume!(registry.get_mut(volume)?, v => unsafe { write_voxel(v, position, value) })
        })
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn vt_accept_override_chunks(volume: u32) -> i32 {
    guard("vt_accept_override_chunks", || {
        with_registry(|registry| with_volume!(registry.get_mut(volume)?, v => v.accept_override_chunks()))
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn vt_discard_override_chunks(volume: u32) -> i32 {
    guard("vt_discard_override_chunks", || {
        with_registry(|registry| with_volume!(registry.get_mut(volume)?, v => v.discard_override_chunks()))
    })
}

/// Run one update tick. `is_up_to_date` is set to 1 when no extraction work
/// remains queued.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn vt_update_volume(
    volume: u32,
    eye_x: f32,
    eye_y: f32,
    eye_z: f32,
    lod_threshold: f32,
    is_up_to_date: *mut u32,
) -> i32 {
    guard("vt_update_volume", || {
        let is_up_to_date = unsafe { out(is_up_to_date)? };
        let eye = Vec3::new(eye_x, eye_y, eye_z);
        let done = with_registry(|registry| {
            with_volume!(registry.get_mut(volume)?, v => v.update(eye, lod_threshold))
        })?;
        *is_up_to_date = done as u32;
        Ok(())
    })
}

/// Restrict meshing to heights `maximum_lod..=minimum_lod`
#[unsafe(no_mangle)]
pub extern "C" fn vt_set_lod_range(volume: u32, minimum_lod: i32, maximum_lod: i32) -> i32 {
    guard("vt_set_lod_range", || {
        let to_height = |lod: i32| {
            u8::try_from(lod).map_err(|_| Error::invalid_argument(format!("LOD {lod} is out of range")))
        };
        let (minimum_lod, maximum_lod) = (to_height(minimum_lod)?, to_height(maximum_lod)?);
        with_registry(|registry| {
            with_volume!(registry.get_mut(volume)?, v => v.octree_mut().set_lod_range(minimum_lod, maximum_lod))
        })
    })
}

// ---------------------------------------------------------------------------
// Octree traversal
// ---------------------------------------------------------------------------

#[unsafe(no_mangle)]
pub unsafe extern "C" fn vt_has_root_octree_node(volume: u32, result: *mut u32) -> i32 {
    guard("vt_has_root_octree_node", || {
        let result = unsafe { out(result)? };
        let has_root = with_registry(|registry| {
            Ok(with_volume!(registry.get(volume)?, v => v.octree().has_root()))
        })?;
        *result = has_root as u32;
        Ok(())
    })
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn vt_get_root_octree_node(volume: u32, result: *mut u32) -> i32 {
    guard("vt_get_root_octree_node", || {
        let result = unsafe { out(result)? };
        *result = with_registry(|registry| {
            let root = with_volume!(registry.get(volume)?, v => {
                if !v.octree().has_root() {
                    return Err(Error::runtime("volume has no root octree node"));
                }
                v.octree().root_index()
            });
            Ok(registry.node_handle(volume, root))
        })?;
        Ok(())
    })
}

/// Describe the node behind a node handle
#[unsafe(no_mangle)]
pub unsafe extern "C" fn vt_get_octree_node(node: u32, result: *mut VtOctreeNode) -> i32 {
    guard("vt_get_octree_node", || {
        let result = unsafe { out(result)? };
        *result = with_registry(|registry| {
            with_volume!(registry.get(node)?, v => {
                let octree = v.octree();
                let n = resolve_node(v, node)?;
                let lower = n.region().lower();
                let mut descriptor = VtOctreeNode {
                    pos_x: lower.x,
                    pos_y: lower.y,
                    pos_z: lower.z,
                    structure_last_changed: n.structure_last_changed(),
                    properties_last_changed: n.properties_last_changed(),
                    mesh_last_changed: n.mesh_last_changed(),
                    node_or_children_last_changed: n.node_or_children_last_changed(),
                    child_handles: [[[INVALID_HANDLE; 2]; 2]; 2],
                    has_mesh: n.has_mesh() as u8,
                    height: n.height(),
                    render_this_node: n.render_this_node() as u8,
                    _pad: 0,
                };
                for x in 0..2 {
                    for y in 0..2 {
                        for z in 0..2 {
                            let child = n
                                .structural_child(x, y, z)
                                .filter(|&c| octree.node_at(c).is_some_and(|c| c.is_active()));
                            if let Some(child) = child {
                                descriptor.child_handles[x][y][z] = registry.node_handle(node, child);
                            }
                        }
                    }
                }
                Ok(descriptor)
            })
        })?;
        Ok(())
    })
}

/// Raw mesh buffers of a node. Pointers are null and counts zero when the
/// node has no mesh. Vertex layout depends on the volume type.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn vt_get_mesh(
    node: u32,
    vertices: *mut *const c_void,
    vertex_count: *mut u32,
    indices: *mut *const u32,
    index_count: *mut u32,
) -> i32 {
    guard("vt_get_mesh", || {
        let (vertices, vertex_count, indices, index_count) =
            unsafe { (out(vertices)?, out(vertex_count)?, out(indices)?, out(index_count)?) };
        let buffers = with_registry(|registry| {
            with_volume!(registry.get(node)?, v => {
                Ok(resolve_node(v, node)?.mesh().map(|mesh| {
                    (
                        mesh.vertices.as_ptr() as *const c_void,
                        mesh.vertex_count() as u32,
                        mesh.indices.as_ptr(),
                        mesh.index_count() as u32,
                    )
                }))
            })
        })?;
        (*vertices, *vertex_count, *indices, *index_count) =
            buffers.unwrap_or((std::ptr::null(), 0, std::ptr::null(), 0));
        Ok(())
    })
}
