//! Pure classification of world entities for the power domain.
//!
//! Three precedence tiers, later tiers overriding earlier ones:
//! 1. built-in defaults derived from the entity's static definition and its
//!    capability components,
//! 2. the descriptor table keyed by definition name,
//! 3. a per-entity [`OverlayOverride`].
//!
//! Classification reads world state but never mutates it, and is stable for
//! the duration of one rebuild pass.

use bevy::prelude::*;
use bitflags::bitflags;
use serde::Serialize;

use crate::{
    components::{
        DefRef, Footprint, NetLink, OverlayOverride, Placed, PowerBattery, PowerPlant, PowerTrader,
        Switchable,
    },
    grids::ConduitKind,
    map::CellRect,
    resources::DefCatalog,
};

/// Domain id of the power overlay.
pub const POWER_DOMAIN_ID: &str = "power";

/// Flow readings within this band of zero are treated as idle, so dual-role
/// entities do not flicker between import and export at equilibrium.
pub(crate) const NEAR_ZERO_FLOW_EPSILON: f32 = 1.0;

bitflags! {
    /// Capability components found on an entity, probed once per
    /// classification instead of repeatedly during aggregation.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct CapabilityFlags: u8 {
        const TRADER = 1 << 0;
        const BATTERY = 1 << 1;
        const SWITCHABLE = 1 << 2;
        const PLANT = 1 << 3;
        const NET_LINK = 1 << 4;
    }
}

/// Result of classifying one entity for the power domain.
#[derive(Debug, Clone, Copy, Default)]
pub struct PowerClassification {
    /// Whether lifecycle or operational changes to this entity should
    /// invalidate the power cache.
    pub is_overlay_relevant: bool,
    pub is_conduit: bool,
    pub is_user: bool,
    pub conduit_kind: Option<ConduitKind>,
    pub caps: CapabilityFlags,
}

fn capability_flags(world: &World, entity: Entity) -> CapabilityFlags {
    let mut caps = CapabilityFlags::empty();
    if world.get::<PowerTrader>(entity).is_some() {
        caps |= CapabilityFlags::TRADER;
    }
    if world.get::<PowerBattery>(entity).is_some() {
        caps |= CapabilityFlags::BATTERY;
    }
    if world.get::<Switchable>(entity).is_some() {
        caps |= CapabilityFlags::SWITCHABLE;
    }
    if world.get::<PowerPlant>(entity).is_some() {
        caps |= CapabilityFlags::PLANT;
    }
    if world.get::<NetLink>(entity).is_some() {
        caps |= CapabilityFlags::NET_LINK;
    }
    caps
}

fn is_power_domain(domain: Option<&str>) -> bool {
    domain.map_or(true, |d| d.eq_ignore_ascii_case(POWER_DOMAIN_ID))
}

fn apply_tier(
    result: &mut PowerClassification,
    relevant: bool,
    conduit: bool,
    user: bool,
    conduit_kind: Option<ConduitKind>,
) {
    if relevant {
        result.is_overlay_relevant = true;
    }
    if conduit {
        result.is_conduit = true;
        result.is_overlay_relevant = true;
    }
    if user {
        result.is_user = true;
        result.is_overlay_relevant = true;
    }
    if let Some(kind) = conduit_kind {
        result.is_conduit = true;
        result.conduit_kind = Some(kind);
        result.is_overlay_relevant = true;
    }
}

/// Classify an entity for the power domain.
pub fn classify_power_entity(
    world: &World,
    entity: Entity,
    catalog: &DefCatalog,
) -> PowerClassification {
    let mut result = PowerClassification {
        caps: capability_flags(world, entity),
        ..PowerClassification::default()
    };

    let def = world
        .get::<DefRef>(entity)
        .and_then(|def_ref| catalog.def(def_ref.0));

    // Tier 1: built-in defaults from definition flags and capabilities.
    if let Some(def) = def {
        if def.is_conduit {
            result.is_conduit = true;
            result.is_overlay_relevant = true;
            if result.conduit_kind.is_none() {
                result.conduit_kind = def.conduit_kind;
            }
        }
    }
    if result
        .caps
        .intersects(CapabilityFlags::TRADER | CapabilityFlags::BATTERY)
    {
        result.is_user = true;
        result.is_overlay_relevant = true;
    }
    if result.caps.contains(CapabilityFlags::NET_LINK) {
        result.is_overlay_relevant = true;
    }

    // Tier 2: descriptor table keyed by definition name.
    if let Some(descriptor) = def.and_then(|d| catalog.descriptor_for(&d.name)) {
        if is_power_domain(descriptor.domain.as_deref()) {
            apply_tier(
                &mut result,
                descriptor.relevant,
                descriptor.conduit,
                descriptor.user,
                descriptor.conduit_kind,
            );
        }
    }

    // Tier 3: per-entity override.
    if let Some(overlay) = world.get::<OverlayOverride>(entity) {
        if is_power_domain(overlay.domain.as_deref()) {
            apply_tier(
                &mut result,
                overlay.relevant,
                overlay.conduit,
                overlay.user,
                overlay.conduit_kind,
            );
        }
    }

    if result.is_conduit {
        result.is_overlay_relevant = true;
        if result.conduit_kind.is_none() {
            result.conduit_kind = Some(ConduitKind::Standard);
        }
    }

    result
}

/// Role of a power user in the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NodeIdentity {
    ProducerCapable,
    Consumer,
    Storage,
}

/// Display state of a single power user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NodeCoreState {
    Neutral,
    FlowExport,
    FlowImport,
    ToggledOff,
    Fault,
    StorageCharge,
}

/// Snapshot record for one power user: role, state, and a normalized value
/// whose meaning depends on the state (charge ratio for storage, flow
/// magnitude for import/export).
#[derive(Debug, Clone)]
pub struct PowerNodeMarker {
    pub entity: Entity,
    pub rect: CellRect,
    pub identity: NodeIdentity,
    pub core_state: NodeCoreState,
    pub value01: f32,
}

/// Quantize to quarter steps, damping visual flicker from small changes.
pub(crate) fn quantize_quarter(value01: f32) -> f32 {
    (value01.clamp(0.0, 1.0) * 4.0).round() / 4.0
}

/// Derive the node marker for a classified power user.
///
/// Returns `None` only when the entity has no position to anchor the marker.
pub fn build_node_marker(world: &World, entity: Entity) -> Option<PowerNodeMarker> {
    let placed = world.get::<Placed>(entity)?;
    let rect = world
        .get::<Footprint>(entity)
        .map(|footprint| footprint.0)
        .filter(|rect| !rect.is_empty())
        .unwrap_or_else(|| CellRect::single_cell(placed.cell));

    if let Some(battery) = world.get::<PowerBattery>(entity) {
        let ratio = if battery.capacity > 0.0 {
            (battery.stored / battery.capacity).clamp(0.0, 1.0)
        } else {
            0.0
        };
        return Some(PowerNodeMarker {
            entity,
            rect,
            identity: NodeIdentity::Storage,
            core_state: NodeCoreState::StorageCharge,
            value01: quantize_quarter(ratio),
        });
    }

    let Some(trader) = world.get::<PowerTrader>(entity) else {
        return Some(PowerNodeMarker {
            entity,
            rect,
            identity: NodeIdentity::Consumer,
            core_state: NodeCoreState::Neutral,
            value01: 0.0,
        });
    };

    let producer_capable =
        world.get::<PowerPlant>(entity).is_some() || trader.power_output > 0.0;
    let identity = if producer_capable {
        NodeIdentity::ProducerCapable
    } else {
        NodeIdentity::Consumer
    };

    if let Some(switch) = world.get::<Switchable>(entity) {
        if !switch.on {
            return Some(PowerNodeMarker {
                entity,
                rect,
                identity,
                core_state: NodeCoreState::ToggledOff,
                value01: 0.0,
            });
        }
    }

    let has_consumer_load = trader.has_consumer_load();
    if has_consumer_load && !trader.powered_on {
        return Some(PowerNodeMarker {
            entity,
            rect,
            identity,
            core_state: NodeCoreState::Fault,
            value01: 0.0,
        });
    }

    let mut core_state = NodeCoreState::Neutral;
    let mut value01 = 0.0;
    if has_consumer_load && producer_capable {
        let flow = trader.power_output;
        if flow > NEAR_ZERO_FLOW_EPSILON {
            core_state = NodeCoreState::FlowExport;
            value01 = 1.0;
        } else if flow < -NEAR_ZERO_FLOW_EPSILON {
            core_state = NodeCoreState::FlowImport;
            value01 = 1.0;
        }
    }

    Some(PowerNodeMarker {
        entity,
        rect,
        identity,
        core_state,
        value01,
    })
}
