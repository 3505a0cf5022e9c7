//! Capability components attached by the embedding simulation.
//!
//! The overlay never simulates power flow; it reads these components and the
//! [`NetLedger`] telemetry the simulation keeps up to date, and aggregates
//! them into per-network display state.

use std::collections::HashMap;

use bevy::{math::UVec2, prelude::*};

use crate::{
    grids::ConduitKind,
    map::{CellRect, MapId},
    resources::DefId,
};

/// Which map an entity lives on.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq)]
pub struct OnMap(pub MapId);

/// The entity's anchor cell.
#[derive(Component, Debug, Clone, Copy)]
pub struct Placed {
    pub cell: UVec2,
}

/// Multi-cell footprint. Entities without one occupy their anchor cell only.
#[derive(Component, Debug, Clone, Copy)]
pub struct Footprint(pub CellRect);

/// Reference to the entity's static definition in [`crate::DefCatalog`].
#[derive(Component, Debug, Clone, Copy)]
pub struct DefRef(pub DefId);

/// An entity that draws and/or produces power.
///
/// `power_output` is the current net flow in units per tick: positive while
/// producing, negative while drawing. `powered_on` reports whether the
/// simulation currently satisfies this entity's demand.
#[derive(Component, Debug, Clone)]
pub struct PowerTrader {
    pub power_output: f32,
    pub base_consumption: f32,
    pub idle_draw: f32,
    pub powered_on: bool,
}

impl Default for PowerTrader {
    fn default() -> Self {
        Self {
            power_output: 0.0,
            base_consumption: 0.0,
            idle_draw: 0.0,
            powered_on: false,
        }
    }
}

impl PowerTrader {
    /// Whether this trader presents any consumer-shaped load.
    #[inline]
    pub fn has_consumer_load(&self) -> bool {
        self.power_output < 0.0 || self.base_consumption > 0.0 || self.idle_draw > 0.0
    }
}

/// Energy storage capability.
#[derive(Component, Debug, Clone, Default)]
pub struct PowerBattery {
    pub stored: f32,
    pub capacity: f32,
}

/// A manual on/off switch.
#[derive(Component, Debug, Clone)]
pub struct Switchable {
    pub on: bool,
}

impl Default for Switchable {
    fn default() -> Self {
        Self { on: true }
    }
}

/// Marker for dedicated generators; combined with positive output it makes an
/// entity producer-capable.
#[derive(Component, Debug, Clone, Copy, Default)]
pub struct PowerPlant;

/// Handle of an underlying transmission segment owned by the simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NetHandle(pub u32);

/// Membership of an entity in an underlying transmission segment.
#[derive(Component, Debug, Clone, Copy)]
pub struct NetLink {
    pub net: NetHandle,
}

/// Per-segment operating signals computed by the simulation's power phase.
#[derive(Debug, Clone, Copy, Default)]
pub struct NetTelemetry {
    pub has_active_source: bool,
    pub energy_gain_rate: f32,
}

/// Lookup of [`NetTelemetry`] by segment handle, refreshed by the simulation.
#[derive(Resource, Debug, Default, Clone)]
pub struct NetLedger {
    nets: HashMap<NetHandle, NetTelemetry>,
}

impl NetLedger {
    pub fn set(&mut self, net: NetHandle, telemetry: NetTelemetry) {
        self.nets.insert(net, telemetry);
    }

    pub fn get(&self, net: NetHandle) -> Option<NetTelemetry> {
        self.nets.get(&net).copied()
    }

    pub fn remove(&mut self, net: NetHandle) -> Option<NetTelemetry> {
        self.nets.remove(&net)
    }

    pub fn clear(&mut self) {
        self.nets.clear();
    }

    pub fn len(&self) -> usize {
        self.nets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nets.is_empty()
    }
}

/// Per-entity classification override, the highest precedence tier.
///
/// `domain` limits the override to one overlay domain; `None` applies it to
/// all of them.
#[derive(Component, Debug, Clone)]
pub struct OverlayOverride {
    pub domain: Option<String>,
    pub relevant: bool,
    pub conduit: bool,
    pub user: bool,
    pub conduit_kind: Option<ConduitKind>,
}

impl Default for OverlayOverride {
    fn default() -> Self {
        Self {
            domain: None,
            relevant: true,
            conduit: false,
            user: false,
            conduit_kind: None,
        }
    }
}
