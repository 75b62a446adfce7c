//! Spell casting engine
//!
//! The cast pipeline: catalog, target set, precondition checker, target
//! resolver, lifecycle state machine, hit resolution, diminishing returns
//! and effect dispatch, driven by a cooperative tick loop.
//!
//! One tick runs the phases in a fixed chain: clock advance, new cast
//! requests, scheduler re-entries for in-flight casts, pending side events
//! (reflect procs), aura upkeep, then cleanup.

pub mod cast;
pub mod catalog;
pub mod check;
pub mod constants;
pub mod diminishing;
pub mod effects;
pub mod events;
pub mod hit;
pub mod resolver;
pub mod targets;

use bevy::prelude::*;

use crate::combat::log::CombatLog;
use crate::spell::constants::MAX_TICK_DELTA_MS;
use crate::world::auras::{process_periodic_auras, update_auras};
use crate::world::map::ArenaMap;
use crate::world::unit::Unit;
use crate::world::GameRng;

/// Simulated time, in milliseconds. The engine never reads a wall clock;
/// everything schedules against this resource.
#[derive(Resource, Default)]
pub struct SimClock {
    pub now_ms: u64,
    /// Time advanced by the current tick.
    pub delta_ms: u64,
}

/// When present, the clock advances by this fixed step every tick instead
/// of following host time. Headless runs and tests insert it so the same
/// seed always produces the same simulation.
#[derive(Resource, Clone, Copy)]
pub struct FixedSimTimestep {
    pub step_ms: u64,
}

/// Phase ordering for the engine's systems within one tick.
#[derive(SystemSet, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpellSystemPhase {
    Clock,
    Requests,
    Drive,
    Pending,
    Auras,
    Cleanup,
}

/// Advance simulated time by a bounded per-tick delta.
pub fn advance_sim_clock(
    time: Res<Time>,
    fixed: Option<Res<FixedSimTimestep>>,
    mut clock: ResMut<SimClock>,
    mut combat_log: ResMut<CombatLog>,
) {
    let dt_ms = match fixed {
        Some(step) => step.step_ms,
        None => ((time.delta_secs() as f64) * 1000.0) as u64,
    };
    let dt_ms = dt_ms.min(MAX_TICK_DELTA_MS);
    clock.delta_ms = dt_ms;
    clock.now_ms += dt_ms;
    combat_log.now_ms = clock.now_ms;
}

/// Regenerate power for living units.
pub fn regenerate_power(clock: Res<SimClock>, mut units: Query<&mut Unit>) {
    let dt = clock.delta_ms as f32 / 1000.0;
    for mut unit in units.iter_mut() {
        if !unit.is_alive() {
            continue;
        }
        if unit.power_regen > 0.0 {
            let regen = unit.power_regen * dt;
            unit.give_power(regen);
        }
    }
}

/// Plugin wiring the whole cast engine into an app. The spell catalog is
/// loaded separately (`SpellCatalogPlugin`), mirroring how ability data is
/// provided to the simulation rather than owned by it.
pub struct SpellPlugin;

impl Plugin for SpellPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<SimClock>()
            .init_resource::<diminishing::DiminishingLedger>()
            .init_resource::<CombatLog>()
            .init_resource::<GameRng>()
            .init_resource::<ArenaMap>()
            // Notification events
            .add_event::<events::CastRequested>()
            .add_event::<events::SpellCastStarted>()
            .add_event::<events::SpellCastFailed>()
            .add_event::<events::SpellWentOff>()
            .add_event::<events::SpellCastInterrupted>()
            .add_event::<events::ChannelUpdate>()
            .add_event::<events::SpellDamageDealt>()
            .add_event::<events::SpellHealingDone>()
            .add_event::<events::ProcTriggered>()
            // Phase ordering
            .configure_sets(
                Update,
                (
                    SpellSystemPhase::Clock,
                    SpellSystemPhase::Requests,
                    SpellSystemPhase::Drive,
                    SpellSystemPhase::Pending,
                    SpellSystemPhase::Auras,
                    SpellSystemPhase::Cleanup,
                )
                    .chain(),
            )
            .add_systems(
                Update,
                (advance_sim_clock, regenerate_power)
                    .chain()
                    .in_set(SpellSystemPhase::Clock),
            )
            .add_systems(
                Update,
                cast::start_requested_casts.in_set(SpellSystemPhase::Requests),
            )
            .add_systems(
                Update,
                cast::drive_spell_casts.in_set(SpellSystemPhase::Drive),
            )
            .add_systems(
                Update,
                hit::flush_reflect_procs.in_set(SpellSystemPhase::Pending),
            )
            .add_systems(
                Update,
                (process_periodic_auras, update_auras)
                    .chain()
                    .in_set(SpellSystemPhase::Auras),
            )
            .add_systems(
                Update,
                cast::cleanup_finished_casts.in_set(SpellSystemPhase::Cleanup),
            );
    }
}
