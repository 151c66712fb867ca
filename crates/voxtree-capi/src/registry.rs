//! Live volumes and the 32-bit handles that refer to them
//!
//! Handle layout, most significant bit first:
//!
//! ```text
//! 31      | 30..24     | 23..16 | 15..0
//! kind    | generation | slot   | node index
//! ```
//!
//! A volume handle carries the root's node index. The generation is bumped
//! every time a slot is emptied, so a handle to a deleted volume stays
//! invalid after the slot is reused.

use voxtree::core::{Error, Result};
use voxtree::octree::{NodeIndex, OctreeNode};
use voxtree::voxel::{Color, MaterialSet, Voxel, VoxelKind};
use voxtree::Volume;

/// Maximum number of live volumes
pub const MAX_VOLUMES: usize = 256;

/// Marks an absent child in node descriptors
pub const INVALID_HANDLE: u32 = 0xFFFF_FFFF;

const KIND_SHIFT: u32 = 31;
const GENERATION_SHIFT: u32 = 24;
const GENERATION_MASK: u32 = 0x7F;
const SLOT_SHIFT: u32 = 16;
const SLOT_MASK: u32 = 0xFF;
const NODE_MASK: u32 = 0xFFFF;

/// Either kind of volume
pub enum AnyVolume {
    Color(Volume<Color>),
    MaterialBlend(Volume<MaterialSet>),
}

impl AnyVolume {
    pub fn kind(&self) -> VoxelKind {
        match self {
            AnyVolume::Color(_) => VoxelKind::Color,
            AnyVolume::MaterialBlend(_) => VoxelKind::MaterialBlend,
        }
    }

    fn root_index(&self) -> NodeIndex {
        match self {
            AnyVolume::Color(v) => v.octree().root_index(),
            AnyVolume::MaterialBlend(v) => v.octree().root_index(),
        }
    }
}

/// Run `$body` with `$v` bound to the concrete volume inside an [`AnyVolume`]
#[macro_export]
macro_rules! with_volume {
    ($volume:expr, $v:ident => $body:expr) => {
        match $volume {
            $crate::registry::AnyVolume::Color($v) => $body,
            $crate::registry::AnyVolume::MaterialBlend($v) => $body,
        }
    };
}

/// Decoded form of a 32-bit handle
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Handle {
    pub kind: VoxelKind,
    pub generation: u8,
    pub slot: u8,
    pub node: NodeIndex,
}

impl Handle {
    pub fn encode(self) -> u32 {
        let kind = match self.kind {
            VoxelKind::Color => 0,
            VoxelKind::MaterialBlend => 1,
        };
        (kind << KIND_SHIFT)
            | ((self.generation as u32 & GENERATION_MASK) << GENERATION_SHIFT)
            | ((self.slot as u32) << SLOT_SHIFT)
            | self.node.0 as u32
    }

    pub fn decode(raw: u32) -> Self {
        let kind = if raw >> KIND_SHIFT == 0 {
            VoxelKind::Color
        } else {
            VoxelKind::MaterialBlend
        };
        Self {
            kind,
            generation: ((raw >> GENERATION_SHIFT) & GENERATION_MASK) as u8,
            slot: ((raw >> SLOT_SHIFT) & SLOT_MASK) as u8,
            node: NodeIndex((raw & NODE_MASK) as u16),
        }
    }
}

#[derive(Default)]
struct Slot {
    generation: u8,
    volume: Option<AnyVolume>,
}

/// Fixed-size table of live volumes
pub struct VolumeRegistry {
    slots: Vec<Slot>,
}

impl Default for VolumeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl VolumeRegistry {
    pub fn new() -> Self {
        Self {
            slots: (0..MAX_VOLUMES).map(|_| Slot::default()).collect(),
        }
    }

    /// Number of live volumes
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.volume.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Store a volume in the first free slot and return its handle
    pub fn insert(&mut self, volume: AnyVolume) -> Result<u32> {
        let Some((index, slot)) = self
            .slots
            .iter_mut()
            .enumerate()
            .find(|(_, slot)| slot.volume.is_none())
        else {
            return Err(Error::invalid_argument(format!(
                "cannot create a new volume, there is a limit of {MAX_VOLUMES}"
            )));
        };

        let handle = Handle {
            kind: volume.kind(),
            generation: slot.generation,
            slot: index as u8,
            node: volume.root_index(),
        };
        slot.volume = Some(volume);
        log::debug!("Created {:?} volume in slot {}", handle.kind, index);
        Ok(handle.encode())
    }

    /// Drop the volume behind `handle`
    pub fn remove(&mut self, raw: u32) -> Result<AnyVolume> {
        let handle = self.check(raw)?;
        let slot = &mut self.slots[handle.slot as usize];
        slot.generation = (slot.generation + 1) & GENERATION_MASK as u8;
        log::debug!("Deleting volume in slot {}", handle.slot);
        slot.volume
            .take()
            .ok_or_else(|| Error::runtime("handle represents a deleted volume"))
    }

    pub fn get(&self, raw: u32) -> Result<&AnyVolume> {
        let handle = self.check(raw)?;
        self.slots[handle.slot as usize]
            .volume
            .as_ref()
            .ok_or_else(|| Error::runtime("handle represents a deleted volume"))
    }

    pub fn get_mut(&mut self, raw: u32) -> Result<&mut AnyVolume> {
        let handle = self.check(raw)?;
        self.slots[handle.slot as usize]
            .volume
            .as_mut()
            .ok_or_else(|| Error::runtime("handle represents a deleted volume"))
    }

    /// Handle for `node` in the same volume as `raw`
    pub fn node_handle(&self, raw: u32, node: NodeIndex) -> u32 {
        Handle { node, ..Handle::decode(raw) }.encode()
    }

    fn check(&self, raw: u32) -> Result<Handle> {
        let handle = Handle::decode(raw);
        let slot = &self.slots[handle.slot as usize];
        match &slot.volume {
            Some(volume) if slot.generation == handle.generation && volume.kind() == handle.kind => Ok(handle),
            Some(_) => Err(Error::runtime(format!("stale or mismatched volume handle {raw:#010x}"))),
            None => Err(Error::runtime(format!("handle {raw:#010x} represents a null volume"))),
        }
    }
}

/// Node named by a handle's node index.
///
/// Nodes other than the root can only be reached while they are active.
pub fn resolve_node<V: Voxel>(volume: &Volume<V>, raw: u32) -> Result<&OctreeNode<V>> {
    let octree = volume.octree();
    let index = Handle::decode(raw).node;
    let node = octree
        .node_at(index)
        .ok_or_else(|| Error::runtime(format!("no octree node with index {}", index.0)))?;
    if index != octree.root_index() && !node.is_active() {
        return Err(Error::runtime(format!("octree node {} is no longer active", index.0)));
    }
    Ok(node)
}
