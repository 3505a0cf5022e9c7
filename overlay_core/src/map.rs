//! Grid geometry shared by every overlay domain.
//!
//! Cells are addressed either as `UVec2` coordinates or as row-major flat
//! indices (`y * width + x`). All lookups are bounds-checked; out-of-range
//! coordinates resolve to `None` rather than panicking.

use std::collections::HashMap;

use bevy::{math::UVec2, prelude::*};

/// Identifier for one simulated map. Maps are registered and torn down
/// explicitly via [`crate::MapLifecycleEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MapId(pub u32);

/// Dimensions and cell indexing for a single map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapGrid {
    size: UVec2,
}

impl MapGrid {
    pub fn new(size: UVec2) -> Self {
        Self { size }
    }

    #[inline]
    pub fn size(&self) -> UVec2 {
        self.size
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.size.x
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.size.y
    }

    #[inline]
    pub fn cell_count(&self) -> usize {
        (self.size.x as usize) * (self.size.y as usize)
    }

    #[inline]
    pub fn in_bounds(&self, cell: UVec2) -> bool {
        cell.x < self.size.x && cell.y < self.size.y
    }

    /// Row-major flat index for a cell, or `None` when out of bounds.
    #[inline]
    pub fn cell_to_index(&self, cell: UVec2) -> Option<usize> {
        if self.in_bounds(cell) {
            Some((cell.y as usize) * (self.size.x as usize) + cell.x as usize)
        } else {
            None
        }
    }

    /// Inverse of [`MapGrid::cell_to_index`]. Callers must pass an index
    /// below `cell_count()`.
    #[inline]
    pub fn index_to_cell(&self, index: usize) -> UVec2 {
        let width = self.size.x as usize;
        UVec2::new((index % width) as u32, (index / width) as u32)
    }
}

/// The four cardinal directions used for conduit adjacency. North is +y.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardinalDir {
    North,
    South,
    East,
    West,
}

impl CardinalDir {
    pub const ALL: [CardinalDir; 4] = [
        CardinalDir::North,
        CardinalDir::South,
        CardinalDir::East,
        CardinalDir::West,
    ];

    /// The neighboring cell in this direction, or `None` at the map edge.
    #[inline]
    pub fn offset_from(self, cell: UVec2, size: UVec2) -> Option<UVec2> {
        match self {
            CardinalDir::North => {
                (cell.y + 1 < size.y).then(|| UVec2::new(cell.x, cell.y + 1))
            }
            CardinalDir::South => cell.y.checked_sub(1).map(|y| UVec2::new(cell.x, y)),
            CardinalDir::East => {
                (cell.x + 1 < size.x).then(|| UVec2::new(cell.x + 1, cell.y))
            }
            CardinalDir::West => cell.x.checked_sub(1).map(|x| UVec2::new(x, cell.y)),
        }
    }
}

/// Rectangular footprint of an entity, in cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellRect {
    pub min: UVec2,
    pub size: UVec2,
}

impl CellRect {
    pub fn new(min: UVec2, size: UVec2) -> Self {
        Self { min, size }
    }

    pub fn single_cell(cell: UVec2) -> Self {
        Self {
            min: cell,
            size: UVec2::ONE,
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.size.x == 0 || self.size.y == 0
    }

    #[inline]
    pub fn cell_count(&self) -> usize {
        (self.size.x as usize) * (self.size.y as usize)
    }

    pub fn contains(&self, cell: UVec2) -> bool {
        cell.x >= self.min.x
            && cell.y >= self.min.y
            && cell.x < self.min.x + self.size.x
            && cell.y < self.min.y + self.size.y
    }

    /// Iterate the covered cells in row-major order.
    pub fn cells(&self) -> impl Iterator<Item = UVec2> {
        let min = self.min;
        let size = self.size;
        (0..size.y).flat_map(move |dy| (0..size.x).map(move |dx| UVec2::new(min.x + dx, min.y + dy)))
    }
}

/// Registry of live map grids, maintained alongside [`crate::OverlayHosts`].
#[derive(Resource, Debug, Default, Clone)]
pub struct MapTable {
    maps: HashMap<MapId, MapGrid>,
}

impl MapTable {
    pub fn insert(&mut self, map: MapId, grid: MapGrid) {
        self.maps.insert(map, grid);
    }

    pub fn remove(&mut self, map: MapId) -> Option<MapGrid> {
        self.maps.remove(&map)
    }

    pub fn get(&self, map: MapId) -> Option<&MapGrid> {
        self.maps.get(&map)
    }

    pub fn contains(&self, map: MapId) -> bool {
        self.maps.contains_key(&map)
    }

    pub fn len(&self) -> usize {
        self.maps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&MapId, &MapGrid)> {
        self.maps.iter()
    }
}
