//! Connected-component labeling of conduit cells.
//!
//! Networks are maximal 4-connected sets of present cells. Labeling walks
//! conduit cells in discovery order and breadth-first-fills each unlabeled
//! component, so total cost is linear in the number of conduit cells.

use std::collections::VecDeque;

use bevy::math::UVec2;

use crate::{
    grids::{ConduitGrids, NET_UNASSIGNED},
    map::{CardinalDir, MapGrid},
    net_state::NetState,
};

/// One labeled network: a maximal 4-connected run of conduit cells.
#[derive(Debug, Clone)]
pub struct NetGroup {
    /// Sequential id, valid only for the lifetime of one published snapshot.
    pub net_id: u32,
    /// The cell the labeling pass discovered this network from.
    pub representative_cell: UVec2,
    pub cell_count: u32,
    /// Minimum flat cell index in the network. Unlike `net_id` this is
    /// derived from the network's shape, so it stays stable across rebuilds
    /// of an unchanged layout and is suitable for seeding display colors.
    pub color_seed: u32,
    pub state: NetState,
}

/// Label every network reachable from `conduit_cells`, assigning sequential
/// net ids into the grid. Cells already labeled this pass are skipped, so
/// duplicate entries are harmless. `queue` is caller-owned scratch storage.
pub(crate) fn label_networks(
    map: &MapGrid,
    grids: &mut ConduitGrids,
    conduit_cells: impl Iterator<Item = UVec2>,
    queue: &mut VecDeque<usize>,
) -> Vec<NetGroup> {
    let mut groups = Vec::new();
    queue.clear();

    for cell in conduit_cells {
        let Some(start) = map.cell_to_index(cell) else {
            continue;
        };
        if !grids.present_at(start) || grids.net_id_at(start) != NET_UNASSIGNED {
            continue;
        }

        let net_id = groups.len() as i32;
        let mut cell_count = 0u32;
        let mut min_index = start;

        grids.set_net_id(start, net_id);
        queue.push_back(start);
        while let Some(index) = queue.pop_front() {
            cell_count += 1;
            min_index = min_index.min(index);

            let at = map.index_to_cell(index);
            for dir in CardinalDir::ALL {
                let Some(neighbor) = dir.offset_from(at, map.size()) else {
                    continue;
                };
                let Some(neighbor_index) = map.cell_to_index(neighbor) else {
                    continue;
                };
                if !grids.present_at(neighbor_index)
                    || grids.net_id_at(neighbor_index) != NET_UNASSIGNED
                {
                    continue;
                }
                grids.set_net_id(neighbor_index, net_id);
                queue.push_back(neighbor_index);
            }
        }

        groups.push(NetGroup {
            net_id: net_id as u32,
            representative_cell: cell,
            cell_count,
            color_seed: min_index as u32,
            state: NetState::Unlinked,
        });
    }

    groups
}
