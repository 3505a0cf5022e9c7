//! Dense per-cell grids backing the power domain cache.

use bitflags::bitflags;
use serde::Serialize;

use crate::map::CardinalDir;

/// Conduit subtype stored per cell. Encoded as a byte in the grid; zero
/// means no conduit.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ConduitKind {
    Standard = 1,
    Hidden = 2,
    Waterproof = 3,
}

impl ConduitKind {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(ConduitKind::Standard),
            2 => Some(ConduitKind::Hidden),
            3 => Some(ConduitKind::Waterproof),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

bitflags! {
    /// Cardinal adjacency of a conduit cell to other conduit cells.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct NeighborMask: u8 {
        const NORTH = 1 << 0;
        const SOUTH = 1 << 1;
        const EAST = 1 << 2;
        const WEST = 1 << 3;
    }
}

impl NeighborMask {
    pub fn for_dir(dir: CardinalDir) -> Self {
        match dir {
            CardinalDir::North => NeighborMask::NORTH,
            CardinalDir::South => NeighborMask::SOUTH,
            CardinalDir::East => NeighborMask::EAST,
            CardinalDir::West => NeighborMask::WEST,
        }
    }

    pub fn neighbor_count(self) -> u32 {
        self.bits().count_ones()
    }
}

/// Sentinel net id for cells that belong to no network.
pub const NET_UNASSIGNED: i32 = -1;

/// The dense grid set: presence, subtype, neighbor mask, and net id, each
/// sized to the map's cell count. Point queries are index-based and degrade
/// to neutral values when the index is out of range.
#[derive(Debug, Clone, Default)]
pub struct ConduitGrids {
    presence: Vec<bool>,
    kind: Vec<u8>,
    neighbor_mask: Vec<NeighborMask>,
    net_id: Vec<i32>,
}

impl ConduitGrids {
    pub fn len(&self) -> usize {
        self.presence.len()
    }

    pub fn is_empty(&self) -> bool {
        self.presence.is_empty()
    }

    /// Resize all four grids to `cell_count`, resetting every cell. Returns
    /// `true` when a resize happened; otherwise the grids are untouched.
    pub fn ensure_size(&mut self, cell_count: usize) -> bool {
        if self.presence.len() == cell_count {
            return false;
        }
        self.presence = vec![false; cell_count];
        self.kind = vec![0; cell_count];
        self.neighbor_mask = vec![NeighborMask::empty(); cell_count];
        self.net_id = vec![NET_UNASSIGNED; cell_count];
        true
    }

    /// Reset one cell to its empty state.
    pub fn clear_cell(&mut self, index: usize) {
        if index >= self.presence.len() {
            return;
        }
        self.presence[index] = false;
        self.kind[index] = 0;
        self.neighbor_mask[index] = NeighborMask::empty();
        self.net_id[index] = NET_UNASSIGNED;
    }

    pub fn set_conduit(&mut self, index: usize, kind: ConduitKind) {
        if index >= self.presence.len() {
            return;
        }
        self.presence[index] = true;
        self.kind[index] = kind.as_u8();
    }

    pub fn set_neighbor_mask(&mut self, index: usize, mask: NeighborMask) {
        if let Some(slot) = self.neighbor_mask.get_mut(index) {
            *slot = mask;
        }
    }

    pub fn set_net_id(&mut self, index: usize, net_id: i32) {
        if let Some(slot) = self.net_id.get_mut(index) {
            *slot = net_id;
        }
    }

    #[inline]
    pub fn present_at(&self, index: usize) -> bool {
        self.presence.get(index).copied().unwrap_or(false)
    }

    #[inline]
    pub fn kind_at(&self, index: usize) -> Option<ConduitKind> {
        self.kind.get(index).copied().and_then(ConduitKind::from_u8)
    }

    #[inline]
    pub fn neighbor_mask_at(&self, index: usize) -> NeighborMask {
        self.neighbor_mask.get(index).copied().unwrap_or_default()
    }

    #[inline]
    pub fn net_id_at(&self, index: usize) -> i32 {
        self.net_id.get(index).copied().unwrap_or(NET_UNASSIGNED)
    }
}
