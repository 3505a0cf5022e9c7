//! Incremental spatial overlay cache for grid-based simulation maps.
//!
//! Each registered map owns a set of per-domain caches holding dense,
//! query-optimized snapshots of the live entity state (conduit grids,
//! connected network groups, per-network health). Caches are rebuilt lazily:
//! gameplay marks them dirty through [`OverlayInvalidationEvent`]s and the
//! per-tick driver rebuilds whatever is due when [`run_tick`] is invoked.

mod cache;
mod classify;
mod components;
mod grids;
mod host;
mod labeling;
mod map;
pub mod metrics;
mod net_state;
mod provider;
mod resources;

use bevy::prelude::*;

pub use cache::{ConduitRecord, DomainCache, PowerDomainCache};
pub use classify::{
    build_node_marker, classify_power_entity, CapabilityFlags, NodeCoreState, NodeIdentity,
    PowerClassification, PowerNodeMarker, POWER_DOMAIN_ID,
};
pub use components::{
    DefRef, Footprint, NetHandle, NetLedger, NetLink, NetTelemetry, OnMap, OverlayOverride,
    Placed, PowerBattery, PowerPlant, PowerTrader, Switchable,
};
pub use grids::{ConduitKind, NeighborMask, NET_UNASSIGNED};
pub use host::{
    ensure_interactive_current, InvalidationKind, MapLifecycleEvent, MapOverlayHost,
    OverlayHosts, OverlayInvalidationEvent,
};
pub use labeling::NetGroup;
pub use map::{CardinalDir, CellRect, MapGrid, MapId, MapTable};
pub use metrics::OverlayMetrics;
pub use net_state::{NetState, DISTRESSED_UNMET_RATIO};
pub use provider::{
    DomainProvider, DomainRegistry, PowerDomainProvider, RebuildError,
};
pub use resources::{
    DefCatalog, DefId, EntityDef, OverlayConfig, OverlayConfigError, OverlayDescriptor,
    RenderFrame, SimTick, OVERLAY_CONFIG_ENV,
};

/// Construct a Bevy [`App`] wired with the overlay pipeline and the standard
/// provider registry.
pub fn build_overlay_app() -> App {
    let config = OverlayConfig::load_or_default();
    let registry = DomainRegistry::standard(&config);
    build_overlay_app_with(config, registry)
}

/// Construct an overlay [`App`] with an explicit config and provider set.
pub fn build_overlay_app_with(config: OverlayConfig, registry: DomainRegistry) -> App {
    let mut app = App::new();

    app.insert_resource(config)
        .insert_resource(registry)
        .insert_resource(SimTick::default())
        .insert_resource(RenderFrame::default())
        .insert_resource(MapTable::default())
        .insert_resource(OverlayHosts::default())
        .insert_resource(DefCatalog::default())
        .insert_resource(NetLedger::default())
        .insert_resource(OverlayMetrics::default())
        .add_plugins(MinimalPlugins)
        .add_event::<MapLifecycleEvent>()
        .add_event::<OverlayInvalidationEvent>()
        .add_systems(
            Update,
            (
                host::apply_map_lifecycle,
                host::drain_invalidation_events,
                host::step_hosts,
                resources::advance_tick,
                metrics::collect_metrics,
            )
                .chain(),
        );

    app
}

/// Advance the simulation by one tick.
///
/// Processes the chained systems configured in [`build_overlay_app_with`]
/// (map lifecycle, invalidation routing, host rebuilds, tick increment,
/// metrics collection).
pub fn run_tick(app: &mut App) {
    app.update();
}

/// Install the process-wide tracing subscriber. Safe to call more than once;
/// later calls are ignored.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info")
        }))
        .try_init();
}
