//! Network health resolution.
//!
//! Each labeled network aggregates the operating signals of its connected
//! users plus the telemetry of the underlying transmission segments that
//! touch it, then resolves a discrete display state through a fixed
//! precedence ladder. When several underlying segments collapse into one
//! labeled network, the worst energy balance observed dominates.

use std::collections::HashMap;

use bevy::prelude::*;
use serde::Serialize;

use crate::{
    cache::PowerDomainCache,
    components::{Footprint, NetHandle, NetLedger, NetLink, NetTelemetry, OnMap, Placed, PowerTrader, Switchable},
    map::{CardinalDir, CellRect, MapId},
};

/// Display health of one labeled network.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NetState {
    Powered = 0,
    Transient = 1,
    Unpowered = 2,
    Unlinked = 3,
    Distressed = 4,
}

/// A network whose unmet-demand ratio reaches this value reads as
/// distressed rather than merely unpowered.
pub const DISTRESSED_UNMET_RATIO: f32 = 0.75;

/// Signals gathered for one network before state resolution.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct NetStateAccumulator {
    pub is_connected: bool,
    pub has_active_source: bool,
    pub has_enabled_consumer_demand: bool,
    pub has_met_consumer_demand: bool,
    pub has_unmet_consumer_demand: bool,
    pub has_energy_gain_rate: bool,
    pub min_energy_gain_rate: f32,
    pub enabled_consumer_count: u32,
    pub unmet_consumer_count: u32,
}

impl NetStateAccumulator {
    /// Record that an underlying segment touches this network, folding in
    /// its telemetry when the ledger knows about it.
    fn observe_link(&mut self, telemetry: Option<NetTelemetry>) {
        self.is_connected = true;
        let Some(telemetry) = telemetry else {
            return;
        };
        if telemetry.has_active_source {
            self.has_active_source = true;
        }
        if !self.has_energy_gain_rate {
            self.has_energy_gain_rate = true;
            self.min_energy_gain_rate = telemetry.energy_gain_rate;
        } else if telemetry.energy_gain_rate < self.min_energy_gain_rate {
            self.min_energy_gain_rate = telemetry.energy_gain_rate;
        }
    }
}

/// Resolve the display state for one network. First matching rule wins; the
/// rule order is observable behavior and must not be rearranged.
pub(crate) fn resolve_state(acc: &NetStateAccumulator) -> NetState {
    if !acc.is_connected {
        return NetState::Unlinked;
    }

    if acc.enabled_consumer_count > 0 {
        let unmet_ratio = acc.unmet_consumer_count as f32 / acc.enabled_consumer_count as f32;
        if unmet_ratio >= 1.0 {
            return NetState::Unpowered;
        }
        if unmet_ratio >= DISTRESSED_UNMET_RATIO {
            return NetState::Distressed;
        }
    }

    let negative_balance = acc.has_energy_gain_rate && acc.min_energy_gain_rate < 0.0;
    let sustained_by_storage = acc.has_met_consumer_demand && !acc.has_active_source;
    if (acc.has_met_consumer_demand && negative_balance) || sustained_by_storage {
        // Load is covered right now but not sustainably.
        return NetState::Transient;
    }

    if acc.has_met_consumer_demand || acc.has_active_source {
        return NetState::Powered;
    }

    if acc.has_enabled_consumer_demand || acc.has_unmet_consumer_demand {
        return NetState::Unpowered;
    }

    if acc.has_active_source && acc.has_energy_gain_rate && acc.min_energy_gain_rate <= 0.0 {
        return NetState::Transient;
    }

    // Connected with no demand or source signals at all: healthy idle.
    NetState::Powered
}

fn valid_net_id(raw: i32, net_count: usize) -> Option<usize> {
    if raw >= 0 && (raw as usize) < net_count {
        Some(raw as usize)
    } else {
        None
    }
}

/// Find the labeled network a user entity belongs to: prefer its segment
/// handle when a conduit already mapped that handle to a net id, otherwise
/// probe the entity's footprint cells and their four neighbors, and finally
/// the anchor cell itself. Entities that match nothing contribute to no
/// network this rebuild.
fn resolve_net_id_for_user(
    cache: &PowerDomainCache,
    net_id_by_handle: &HashMap<NetHandle, usize>,
    net_count: usize,
    link: Option<&NetLink>,
    rect: CellRect,
    anchor: UVec2,
) -> Option<usize> {
    if let Some(link) = link {
        if let Some(&net_id) = net_id_by_handle.get(&link.net) {
            if net_id < net_count {
                return Some(net_id);
            }
        }
    }

    let size = cache.map().size();
    for cell in rect.cells() {
        if let Some(net_id) = valid_net_id(cache.net_id_at(cell), net_count) {
            return Some(net_id);
        }
        for dir in CardinalDir::ALL {
            let Some(neighbor) = dir.offset_from(cell, size) else {
                continue;
            };
            if let Some(net_id) = valid_net_id(cache.net_id_at(neighbor), net_count) {
                return Some(net_id);
            }
        }
    }

    // A footprint does not have to cover the anchor cell.
    valid_net_id(cache.net_id_at(anchor), net_count)
}

/// Aggregate per-network signals and resolve each network's state. Runs
/// after labeling and before the cache finalizes, so conduit records are
/// read from the staged buffers.
pub(crate) fn resolve_net_states(world: &World, map_id: MapId, cache: &mut PowerDomainCache) {
    let net_count = cache.staged_net_group_count();
    if net_count == 0 {
        return;
    }

    let default_ledger = NetLedger::default();
    let ledger = world
        .get_resource::<NetLedger>()
        .unwrap_or(&default_ledger);

    // Cross-reference staged conduits' segment handles against their labeled
    // net ids; the first conduit seen for a handle wins.
    let mut net_id_by_handle: HashMap<NetHandle, usize> = HashMap::new();
    for record in cache.staged_conduits() {
        let Some(net_id) = valid_net_id(cache.net_id_at(record.cell), net_count) else {
            continue;
        };
        let Some(link) = world.get::<NetLink>(record.entity) else {
            continue;
        };
        net_id_by_handle.entry(link.net).or_insert(net_id);
    }

    let mut accumulators = vec![NetStateAccumulator::default(); net_count];

    // Seed from conduit segments so conduit-only networks still resolve as
    // connected and carry source/balance telemetry.
    for (&handle, &net_id) in &net_id_by_handle {
        accumulators[net_id].observe_link(ledger.get(handle));
    }

    for entity_ref in world.iter_entities() {
        let Some(on_map) = entity_ref.get::<OnMap>() else {
            continue;
        };
        if on_map.0 != map_id {
            continue;
        }
        let Some(trader) = entity_ref.get::<PowerTrader>() else {
            continue;
        };
        let Some(placed) = entity_ref.get::<Placed>() else {
            continue;
        };

        let rect = entity_ref
            .get::<Footprint>()
            .map(|footprint| footprint.0)
            .filter(|rect| !rect.is_empty())
            .unwrap_or_else(|| CellRect::single_cell(placed.cell));
        let link = entity_ref.get::<NetLink>();

        let Some(net_id) =
            resolve_net_id_for_user(cache, &net_id_by_handle, net_count, link, rect, placed.cell)
        else {
            continue;
        };

        let acc = &mut accumulators[net_id];
        let switched_off = entity_ref
            .get::<Switchable>()
            .map_or(false, |switch| !switch.on);
        if trader.has_consumer_load() && !switched_off {
            acc.has_enabled_consumer_demand = true;
            acc.enabled_consumer_count += 1;
            if trader.powered_on {
                acc.has_met_consumer_demand = true;
            } else {
                acc.has_unmet_consumer_demand = true;
                acc.unmet_consumer_count += 1;
            }
        }
        if let Some(link) = link {
            acc.observe_link(ledger.get(link.net));
        }
    }

    for (net_id, acc) in accumulators.iter().enumerate() {
        cache.set_staged_net_state(net_id, resolve_state(acc));
    }
}
