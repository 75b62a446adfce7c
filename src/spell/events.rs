//! Notification events
//!
//! The "send to observers" surface of the engine. Wire encoding is out of
//! scope; observers (the headless runner, tests, a future network layer)
//! consume these as plain Bevy events.

use bevy::ecs::system::SystemParam;
use bevy::prelude::*;

use crate::combat::math::HitResult;
use crate::spell::catalog::{SpellId, SpellSchool};
use crate::spell::check::CastError;
use crate::spell::targets::SpellTargets;

/// Request to begin a cast. The entry point into the engine.
#[derive(Event, Clone)]
pub struct CastRequested {
    pub caster: Entity,
    pub spell: SpellId,
    pub targets: SpellTargets,
    /// Triggered casts skip initiator-facing checks and failure reporting.
    pub triggered: bool,
    /// The original initiator when this request was itself triggered by
    /// another spell's effect.
    pub original_caster: Option<Entity>,
}

/// A cast entered its preparation phase.
#[derive(Event, Clone, Copy)]
pub struct SpellCastStarted {
    pub caster: Entity,
    pub spell: SpellId,
    pub cast_time_ms: u64,
}

/// A cast was refused or aborted with a typed failure.
#[derive(Event, Clone)]
pub struct SpellCastFailed {
    pub caster: Entity,
    pub spell: SpellId,
    pub error: CastError,
}

/// A cast launched its effects (the "go" notification).
#[derive(Event, Clone, Copy)]
pub struct SpellWentOff {
    pub caster: Entity,
    pub spell: SpellId,
}

/// An in-flight cast was cancelled or interrupted.
#[derive(Event, Clone, Copy)]
pub struct SpellCastInterrupted {
    pub caster: Entity,
    pub spell: SpellId,
}

/// Channel progress notification, sent on every channel re-entry.
#[derive(Event, Clone, Copy)]
pub struct ChannelUpdate {
    pub caster: Entity,
    pub spell: SpellId,
    /// Remaining channel time; u64::MAX for unbounded channels.
    pub remaining_ms: u64,
}

/// Damage committed to a unit by a spell effect.
#[derive(Event, Clone, Copy)]
pub struct SpellDamageDealt {
    pub caster: Option<Entity>,
    pub target: Entity,
    pub spell: SpellId,
    pub school: SpellSchool,
    pub amount: f32,
    pub critical: bool,
    pub periodic: bool,
}

/// Healing committed to a unit by a spell effect.
#[derive(Event, Clone, Copy)]
pub struct SpellHealingDone {
    pub caster: Option<Entity>,
    pub target: Entity,
    pub spell: SpellId,
    pub amount: f32,
    pub periodic: bool,
}

/// Bits describing what happened to one target, accumulated across effect
/// slots and reported once per (cast, target).
pub mod hit_mask {
    pub const NORMAL: u32 = 1 << 0;
    pub const CRITICAL: u32 = 1 << 1;
    pub const MISS: u32 = 1 << 2;
    pub const RESIST: u32 = 1 << 3;
    pub const DODGE: u32 = 1 << 4;
    pub const PARRY: u32 = 1 << 5;
    pub const DEFLECT: u32 = 1 << 6;
    pub const IMMUNE: u32 = 1 << 7;
    pub const REFLECT: u32 = 1 << 8;
}

/// Lifecycle point a proc batch belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcPhase {
    /// Emitted while targets are being hit.
    Hit,
    /// Emitted once from finish bookkeeping.
    Finish,
}

/// Proc-trigger bookkeeping side channel. Exactly one Hit-phase batch is
/// emitted per target per cast, regardless of how many effect slots landed.
#[derive(Event, Clone, Copy)]
pub struct ProcTriggered {
    pub actor: Entity,
    pub target: Option<Entity>,
    pub spell: SpellId,
    pub hit_mask: u32,
    pub phase: ProcPhase,
}

/// The notification writers the drive system feeds. Bundled so the fat
/// systems stay under the parameter limit without losing named access.
#[derive(SystemParam)]
pub struct CastNotifications<'w> {
    pub failed: EventWriter<'w, SpellCastFailed>,
    pub went_off: EventWriter<'w, SpellWentOff>,
    pub interrupted: EventWriter<'w, SpellCastInterrupted>,
    pub channel: EventWriter<'w, ChannelUpdate>,
    pub damage: EventWriter<'w, SpellDamageDealt>,
    pub healing: EventWriter<'w, SpellHealingDone>,
    pub procs: EventWriter<'w, ProcTriggered>,
    pub requests: EventWriter<'w, CastRequested>,
}

impl From<HitResult> for u32 {
    fn from(result: HitResult) -> u32 {
        match result {
            HitResult::Hit => hit_mask::NORMAL,
            HitResult::Miss => hit_mask::MISS,
            HitResult::Resist => hit_mask::RESIST,
            HitResult::Dodge => hit_mask::DODGE,
            HitResult::Parry => hit_mask::PARRY,
            HitResult::Deflect => hit_mask::DEFLECT,
            HitResult::Immune => hit_mask::IMMUNE,
            HitResult::Reflect => hit_mask::REFLECT,
        }
    }
}
