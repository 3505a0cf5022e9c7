//! The per-map power domain cache: double-buffered entity lists plus the
//! dense grid set.
//!
//! A rebuild follows a strict protocol: [`PowerDomainCache::prepare`], the
//! accumulation calls, [`PowerDomainCache::rebuild_neighbor_masks`],
//! [`PowerDomainCache::rebuild_net_groups`], state resolution, then
//! [`PowerDomainCache::finalize`]. Neighbor masks must only be computed once
//! every conduit has been accumulated; computing them inline would read a
//! partially populated grid and make the result depend on scan order.
//! Publication is the buffer swap in `finalize`, after which the dirty flag
//! clears and the generation counter advances.

use std::{any::Any, collections::VecDeque, mem};

use bevy::{math::UVec2, prelude::*};

use crate::{
    classify::PowerNodeMarker,
    grids::{ConduitGrids, ConduitKind, NeighborMask, NET_UNASSIGNED},
    labeling::{label_networks, NetGroup},
    map::MapGrid,
    net_state::NetState,
};

/// Object-safe surface shared by every domain cache, for host bookkeeping
/// and diagnostics. Typed access goes through [`DomainCache::as_any`].
pub trait DomainCache: Send + Sync + 'static {
    fn dirty(&self) -> bool;
    fn set_dirty(&mut self, dirty: bool);
    /// Monotonically increasing; bumped once per successful rebuild so
    /// consumers can detect regrouping without diffing contents.
    fn generation(&self) -> u64;
    fn primary_count(&self) -> usize;
    fn secondary_count(&self) -> usize;
    fn primary_label(&self) -> &'static str;
    fn secondary_label(&self) -> &'static str;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// One cached conduit.
#[derive(Debug, Clone, Copy)]
pub struct ConduitRecord {
    pub entity: Entity,
    pub cell: UVec2,
    pub kind: ConduitKind,
}

/// Derived, query-optimized snapshot of one map's power network. Never
/// persisted; always reconstructable from the live world.
#[derive(Debug)]
pub struct PowerDomainCache {
    map: MapGrid,
    dirty: bool,
    generation: u64,

    conduits: Vec<ConduitRecord>,
    conduits_back: Vec<ConduitRecord>,
    users: Vec<PowerNodeMarker>,
    users_back: Vec<PowerNodeMarker>,
    user_cells: Vec<UVec2>,
    user_cells_back: Vec<UVec2>,
    net_groups: Vec<NetGroup>,
    net_groups_back: Vec<NetGroup>,

    grids: ConduitGrids,
    flood_queue: VecDeque<usize>,

    conduit_count: usize,
    user_count: usize,
}

impl PowerDomainCache {
    pub fn new(map: &MapGrid) -> Self {
        Self {
            map: map.clone(),
            dirty: true,
            generation: 0,
            conduits: Vec::new(),
            conduits_back: Vec::new(),
            users: Vec::new(),
            users_back: Vec::new(),
            user_cells: Vec::new(),
            user_cells_back: Vec::new(),
            net_groups: Vec::new(),
            net_groups_back: Vec::new(),
            grids: ConduitGrids::default(),
            flood_queue: VecDeque::new(),
            conduit_count: 0,
            user_count: 0,
        }
    }

    #[inline]
    pub fn map(&self) -> &MapGrid {
        &self.map
    }

    /// Step 1 of the rebuild protocol: reset back buffers and bring the
    /// grids up to the map's current cell count. When the cell count is
    /// unchanged, only cells that were conduits in the previously published
    /// snapshot are cleared, bounding the cost by conduit count rather than
    /// map area.
    pub fn prepare(&mut self, map: &MapGrid) {
        self.map = map.clone();

        let resized = self.grids.ensure_size(map.cell_count());
        if !resized {
            // Staged records left by an aborted rebuild also marked cells.
            for record in self.conduits.iter().chain(self.conduits_back.iter()) {
                if let Some(cell_index) = map.cell_to_index(record.cell) {
                    self.grids.clear_cell(cell_index);
                }
            }
        }

        self.conduits_back.clear();
        self.users_back.clear();
        self.user_cells_back.clear();
        self.net_groups_back.clear();
    }

    /// Step 2: record a conduit and mark its cell immediately.
    pub fn add_conduit(&mut self, entity: Entity, cell: UVec2, kind: ConduitKind) {
        self.conduits_back.push(ConduitRecord { entity, cell, kind });
        if let Some(index) = self.map.cell_to_index(cell) {
            self.grids.set_conduit(index, kind);
        }
    }

    /// Step 3: record a power user and flatten its footprint for simple
    /// consumers.
    pub fn add_user(&mut self, marker: PowerNodeMarker) {
        self.user_cells_back.extend(marker.rect.cells());
        self.users_back.push(marker);
    }

    /// Step 4: second pass over the staged conduit cells, deriving each
    /// cell's cardinal adjacency from the now fully populated presence grid.
    pub fn rebuild_neighbor_masks(&mut self) {
        for index in 0..self.conduits_back.len() {
            let cell = self.conduits_back[index].cell;
            let Some(cell_index) = self.map.cell_to_index(cell) else {
                continue;
            };
            let mut mask = NeighborMask::empty();
            for dir in crate::map::CardinalDir::ALL {
                let present = dir
                    .offset_from(cell, self.map.size())
                    .and_then(|neighbor| self.map.cell_to_index(neighbor))
                    .map_or(false, |neighbor_index| self.grids.present_at(neighbor_index));
                if present {
                    mask |= NeighborMask::for_dir(dir);
                }
            }
            self.grids.set_neighbor_mask(cell_index, mask);
        }
    }

    /// Step 5: label connected components over the presence grid, walking
    /// staged conduit cells in discovery order.
    pub fn rebuild_net_groups(&mut self) {
        let cells = self.conduits_back.iter().map(|record| record.cell);
        self.net_groups_back =
            label_networks(&self.map, &mut self.grids, cells, &mut self.flood_queue);
    }

    /// Step 7: publish. Swaps every back buffer to the front, recomputes
    /// counts, clears the dirty flag and bumps the generation counter.
    pub fn finalize(&mut self) {
        mem::swap(&mut self.conduits, &mut self.conduits_back);
        mem::swap(&mut self.users, &mut self.users_back);
        mem::swap(&mut self.user_cells, &mut self.user_cells_back);
        mem::swap(&mut self.net_groups, &mut self.net_groups_back);

        self.conduit_count = self.conduits.len();
        self.user_count = self.users.len();
        self.dirty = false;
        self.generation += 1;
    }

    pub(crate) fn staged_conduits(&self) -> &[ConduitRecord] {
        &self.conduits_back
    }

    pub(crate) fn staged_net_group_count(&self) -> usize {
        self.net_groups_back.len()
    }

    pub(crate) fn set_staged_net_state(&mut self, net_id: usize, state: NetState) {
        if let Some(group) = self.net_groups_back.get_mut(net_id) {
            group.state = state;
        }
    }

    // --- point queries; all degrade to neutral values out of bounds ---

    pub fn has_conduit_at(&self, cell: UVec2) -> bool {
        self.map
            .cell_to_index(cell)
            .map_or(false, |index| self.grids.present_at(index))
    }

    pub fn conduit_kind_at(&self, cell: UVec2) -> Option<ConduitKind> {
        self.map
            .cell_to_index(cell)
            .and_then(|index| self.grids.kind_at(index))
    }

    pub fn neighbor_mask_at(&self, cell: UVec2) -> NeighborMask {
        self.map
            .cell_to_index(cell)
            .map_or_else(NeighborMask::empty, |index| self.grids.neighbor_mask_at(index))
    }

    pub fn net_id_at(&self, cell: UVec2) -> i32 {
        self.map
            .cell_to_index(cell)
            .map_or(NET_UNASSIGNED, |index| self.grids.net_id_at(index))
    }

    pub fn color_seed(&self, net_id: i32) -> Option<u32> {
        if net_id < 0 {
            return None;
        }
        self.net_groups
            .get(net_id as usize)
            .map(|group| group.color_seed)
    }

    pub fn net_state(&self, net_id: i32) -> Option<NetState> {
        if net_id < 0 {
            return None;
        }
        self.net_groups.get(net_id as usize).map(|group| group.state)
    }

    // --- bulk iteration over the published snapshot ---

    pub fn conduits(&self) -> &[ConduitRecord] {
        &self.conduits
    }

    pub fn users(&self) -> &[PowerNodeMarker] {
        &self.users
    }

    pub fn user_cells(&self) -> &[UVec2] {
        &self.user_cells
    }

    pub fn net_groups(&self) -> &[NetGroup] {
        &self.net_groups
    }

    pub fn net_group(&self, net_id: u32) -> Option<&NetGroup> {
        self.net_groups.get(net_id as usize)
    }

    pub fn conduit_count(&self) -> usize {
        self.conduit_count
    }

    pub fn user_count(&self) -> usize {
        self.user_count
    }

    pub(crate) fn grid_len(&self) -> usize {
        self.grids.len()
    }
}

impl DomainCache for PowerDomainCache {
    fn dirty(&self) -> bool {
        self.dirty
    }

    fn set_dirty(&mut self, dirty: bool) {
        self.dirty = dirty;
    }

    fn generation(&self) -> u64 {
        self.generation
    }

    fn primary_count(&self) -> usize {
        self.conduit_count
    }

    fn secondary_count(&self) -> usize {
        self.user_count
    }

    fn primary_label(&self) -> &'static str {
        "conduits"
    }

    fn secondary_label(&self) -> &'static str {
        "users"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map_3x3() -> MapGrid {
        MapGrid::new(UVec2::new(3, 3))
    }

    fn rebuild_with_conduits(cache: &mut PowerDomainCache, map: &MapGrid, cells: &[UVec2]) {
        cache.prepare(map);
        for (offset, &cell) in cells.iter().enumerate() {
            // Entity identity is irrelevant to grid state in these tests.
            let entity = Entity::from_raw(offset as u32);
            cache.add_conduit(entity, cell, ConduitKind::Standard);
        }
        cache.rebuild_neighbor_masks();
        cache.rebuild_net_groups();
        cache.finalize();
    }

    #[test]
    fn new_cache_starts_dirty_and_empty() {
        let map = map_3x3();
        let cache = PowerDomainCache::new(&map);
        assert!(cache.dirty());
        assert_eq!(cache.generation(), 0);
        assert_eq!(cache.conduit_count(), 0);
        assert!(!cache.has_conduit_at(UVec2::ZERO));
    }

    #[test]
    fn rebuild_publishes_grids_and_bumps_generation() {
        let map = map_3x3();
        let mut cache = PowerDomainCache::new(&map);
        rebuild_with_conduits(
            &mut cache,
            &map,
            &[UVec2::new(0, 0), UVec2::new(1, 0), UVec2::new(2, 0)],
        );

        assert!(!cache.dirty());
        assert_eq!(cache.generation(), 1);
        assert_eq!(cache.conduit_count(), 3);
        assert_eq!(cache.grid_len(), map.cell_count());

        assert!(cache.has_conduit_at(UVec2::new(1, 0)));
        assert_eq!(cache.conduit_kind_at(UVec2::new(1, 0)), Some(ConduitKind::Standard));
        assert_eq!(
            cache.neighbor_mask_at(UVec2::new(1, 0)),
            NeighborMask::EAST | NeighborMask::WEST
        );
        assert_eq!(cache.neighbor_mask_at(UVec2::new(0, 0)), NeighborMask::EAST);
        assert_eq!(cache.net_id_at(UVec2::new(2, 0)), 0);
        assert_eq!(cache.net_groups().len(), 1);
    }

    #[test]
    fn isolated_conduit_has_empty_mask_and_unit_group() {
        let map = map_3x3();
        let mut cache = PowerDomainCache::new(&map);
        rebuild_with_conduits(&mut cache, &map, &[UVec2::new(1, 1)]);

        assert_eq!(cache.neighbor_mask_at(UVec2::new(1, 1)), NeighborMask::empty());
        let groups = cache.net_groups();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].cell_count, 1);
        assert_eq!(cache.color_seed(0), Some(4));
    }

    #[test]
    fn removed_conduit_cells_are_cleared_on_next_rebuild() {
        let map = map_3x3();
        let mut cache = PowerDomainCache::new(&map);
        rebuild_with_conduits(&mut cache, &map, &[UVec2::new(0, 0), UVec2::new(1, 0)]);
        assert!(cache.has_conduit_at(UVec2::new(1, 0)));

        rebuild_with_conduits(&mut cache, &map, &[UVec2::new(0, 0)]);
        assert!(cache.has_conduit_at(UVec2::new(0, 0)));
        assert!(!cache.has_conduit_at(UVec2::new(1, 0)));
        assert_eq!(cache.net_id_at(UVec2::new(1, 0)), NET_UNASSIGNED);
        assert_eq!(cache.neighbor_mask_at(UVec2::new(0, 0)), NeighborMask::empty());
        assert_eq!(cache.generation(), 2);
    }

    #[test]
    fn grid_resizes_to_new_cell_count() {
        let map = map_3x3();
        let mut cache = PowerDomainCache::new(&map);
        rebuild_with_conduits(&mut cache, &map, &[UVec2::new(2, 2)]);
        assert_eq!(cache.grid_len(), 9);

        let bigger = MapGrid::new(UVec2::new(4, 4));
        rebuild_with_conduits(&mut cache, &bigger, &[UVec2::new(3, 3)]);
        assert_eq!(cache.grid_len(), 16);
        assert!(cache.has_conduit_at(UVec2::new(3, 3)));
        assert!(!cache.has_conduit_at(UVec2::new(2, 2)));
    }

    #[test]
    fn out_of_bounds_queries_are_neutral() {
        let map = map_3x3();
        let cache = PowerDomainCache::new(&map);
        let outside = UVec2::new(9, 9);
        assert!(!cache.has_conduit_at(outside));
        assert_eq!(cache.conduit_kind_at(outside), None);
        assert_eq!(cache.neighbor_mask_at(outside), NeighborMask::empty());
        assert_eq!(cache.net_id_at(outside), NET_UNASSIGNED);
        assert_eq!(cache.color_seed(NET_UNASSIGNED), None);
        assert_eq!(cache.net_state(7), None);
    }

    #[test]
    fn identical_rebuilds_are_idempotent_modulo_generation() {
        let map = map_3x3();
        let cells = [UVec2::new(0, 1), UVec2::new(1, 1), UVec2::new(2, 2)];
        let mut cache = PowerDomainCache::new(&map);
        rebuild_with_conduits(&mut cache, &map, &cells);

        let first_ids: Vec<i32> = (0..map.cell_count())
            .map(|index| cache.net_id_at(map.index_to_cell(index)))
            .collect();
        let first_masks: Vec<NeighborMask> = (0..map.cell_count())
            .map(|index| cache.neighbor_mask_at(map.index_to_cell(index)))
            .collect();
        let first_generation = cache.generation();

        rebuild_with_conduits(&mut cache, &map, &cells);
        let second_ids: Vec<i32> = (0..map.cell_count())
            .map(|index| cache.net_id_at(map.index_to_cell(index)))
            .collect();
        let second_masks: Vec<NeighborMask> = (0..map.cell_count())
            .map(|index| cache.neighbor_mask_at(map.index_to_cell(index)))
            .collect();

        assert_eq!(first_ids, second_ids);
        assert_eq!(first_masks, second_masks);
        assert_eq!(cache.generation(), first_generation + 1);
    }

    #[test]
    fn present_cells_have_ids_absent_cells_do_not() {
        let map = MapGrid::new(UVec2::new(5, 4));
        let cells = [
            UVec2::new(0, 0),
            UVec2::new(1, 0),
            UVec2::new(4, 3),
            UVec2::new(4, 2),
        ];
        let mut cache = PowerDomainCache::new(&map);
        rebuild_with_conduits(&mut cache, &map, &cells);

        for index in 0..map.cell_count() {
            let cell = map.index_to_cell(index);
            if cache.has_conduit_at(cell) {
                assert!(cache.net_id_at(cell) >= 0);
            } else {
                assert_eq!(cache.net_id_at(cell), NET_UNASSIGNED);
            }
        }
    }
}
