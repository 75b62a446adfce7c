//! Cast Lifecycle State Machine
//!
//! Owns one in-flight cast (an "Action") from creation through preparation,
//! execution-phase dispatch (instant / travel-delayed / channeled) and
//! termination.
//!
//! Suspension is explicit re-entry, not coroutine suspension: each step
//! returns `CastProgress::{Continue(next_offset), Complete}` and the drive
//! system re-invokes the same cast entity once the simulated clock reaches
//! the stored offset. The cast is fully self-describing - nothing survives
//! between re-entries except its own component state.
//!
//! Cancellation is cooperative: interrupts and pre-emptions set
//! `cancel_requested` and the transition is honored at the next re-entry.

use bevy::prelude::*;

use crate::combat::log::CombatLog;
use crate::combat::math::{self, HitResult, HitTableInputs};
use crate::spell::catalog::{SelectorKind, SpellCatalog, SpellDefinition, SpellId};
use crate::spell::check::{
    check_cast, CastError, CasterView, CheckContext, GameObjectView, TargetUnitView,
};
use crate::spell::constants::{CHANNEL_RANGE_PAD, CHANNEL_UPDATE_INTERVAL_MS, MISSILE_MIN_DISTANCE};
use crate::spell::diminishing::DiminishingLedger;
use crate::spell::effects::{self, EffectAction};
use crate::spell::events::{
    hit_mask, CastNotifications, CastRequested, ProcPhase, ProcTriggered, SpellCastFailed,
    SpellCastInterrupted, SpellCastStarted, SpellWentOff,
};
use crate::spell::hit;
use crate::spell::resolver::{self, UnitSnapshot, WorldSnapshot};
use crate::spell::targets::SpellTargets;
use crate::spell::SimClock;
use crate::world::auras::ActiveAuras;
use crate::world::map::ArenaMap;
use crate::world::unit::{
    ComboPoints, Cooldowns, GameObject, Inventory, ItemId, OutOfWorld, Unit,
};
use crate::world::GameRng;

/// Query shape every spell system uses to reach units.
pub type UnitQueryData = (
    Entity,
    &'static mut Unit,
    &'static mut Transform,
    Option<&'static mut ActiveAuras>,
    Option<&'static mut Cooldowns>,
    Option<&'static mut ComboPoints>,
    Option<&'static mut Inventory>,
    Option<&'static OutOfWorld>,
);

/// Query shape for world objects. `Without<Unit>` keeps the transform access
/// disjoint from the unit query.
pub type ObjectQueryData = (Entity, &'static mut GameObject, &'static Transform);

/// Lifecycle states of one cast.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CastState {
    /// Cast-time countdown running.
    Preparing,
    /// Effects launched; missiles in flight, re-entered per impact.
    Delayed,
    /// Channel running; re-validated every update interval.
    Channeling,
    /// Terminal. Finalizing again is a no-op.
    Finished,
}

/// What a state-machine step tells the scheduler.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CastProgress {
    /// Re-enter after this many simulated milliseconds.
    Continue(u64),
    /// Terminal state reached; never re-enter.
    Complete,
}

/// Cast categories that may each hold one current Action per caster.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CastSlot {
    Generic = 0,
    Channeled = 1,
    AutoRepeat = 2,
}

/// Per-caster registry of current casts, one slot per category. A new cast
/// pre-empts or is rejected against the occupant depending on category.
#[derive(Component, Default)]
pub struct CurrentCasts {
    slots: [Option<Entity>; 3],
}

impl CurrentCasts {
    pub fn get(&self, slot: CastSlot) -> Option<Entity> {
        self.slots[slot as usize]
    }

    pub fn set(&mut self, slot: CastSlot, cast: Entity) {
        self.slots[slot as usize] = Some(cast);
    }

    /// Clear every slot holding `cast`.
    pub fn clear_entity(&mut self, cast: Entity) {
        for slot in self.slots.iter_mut() {
            if *slot == Some(cast) {
                *slot = None;
            }
        }
    }

    pub fn generic(&self) -> Option<Entity> {
        self.get(CastSlot::Generic)
    }

    pub fn channeled(&self) -> Option<Entity> {
        self.get(CastSlot::Channeled)
    }
}

/// Per-target ledger entry: which effect slots apply to this entity and
/// whether execution has occurred. Once `processed` is true the entry is
/// never re-executed, no matter how many re-entries visit it.
#[derive(Clone, Debug)]
pub struct UnitTargetEntry {
    pub target: Entity,
    pub effect_mask: u8,
    pub processed: bool,
    /// Hit outcome, locked at resolution time.
    pub hit: HitResult,
    /// Outcome of the bounced instance against the original caster, rolled
    /// when the primary outcome is a reflect.
    pub reflect_hit: Option<HitResult>,
    /// Damage accumulated across slots, combined into one damage event.
    pub damage: f32,
    /// Healing accumulated across slots.
    pub healing: f32,
    pub critical: bool,
    /// Travel delay from launch, in ms.
    pub delay_ms: u64,
    pub alive_at_resolve: bool,
}

#[derive(Clone, Debug)]
pub struct ObjectTargetEntry {
    pub target: Entity,
    pub effect_mask: u8,
    pub processed: bool,
}

#[derive(Clone, Debug)]
pub struct ItemTargetEntry {
    pub owner: Entity,
    pub item: ItemId,
    pub effect_mask: u8,
}

/// One in-flight cast. Spawned as its own entity; the entity id is the
/// opaque Action handle casters and the scheduler hold.
#[derive(Component)]
pub struct SpellCast {
    pub spell: SpellId,
    pub caster: Entity,
    /// Distinct from `caster` when this cast was itself triggered by
    /// another spell's effect.
    pub original_caster: Entity,
    pub targets: SpellTargets,
    pub state: CastState,
    pub triggered: bool,
    pub cancel_requested: bool,
    /// When the preparation countdown expires.
    pub cast_end_ms: u64,
    /// When effects launched (travel delays count from here).
    pub launched_ms: u64,
    /// Next scheduler re-entry time.
    pub next_event_ms: u64,
    /// Channel end; u64::MAX for unbounded channels.
    pub channel_end_ms: u64,
    /// Spell-wide Hit phase has run (guards once-per-cast effects).
    pub hit_phase_done: bool,
    pub executed: bool,
    /// Focus object captured by the precondition checker.
    pub focus_object: Option<Entity>,
    /// Combo points captured at execution for finishing magnitudes.
    pub combo_spent: u8,
    pub unit_targets: Vec<UnitTargetEntry>,
    pub object_targets: Vec<ObjectTargetEntry>,
    pub item_targets: Vec<ItemTargetEntry>,
    /// Targets that received auras from this (channeled) cast, for rollback
    /// on cancellation.
    pub applied_aura_targets: Vec<Entity>,
}

impl SpellCast {
    pub fn new(
        spell: SpellId,
        caster: Entity,
        original_caster: Entity,
        targets: SpellTargets,
        triggered: bool,
    ) -> Self {
        Self {
            spell,
            caster,
            original_caster,
            targets,
            state: CastState::Preparing,
            triggered,
            cancel_requested: false,
            cast_end_ms: 0,
            launched_ms: 0,
            next_event_ms: 0,
            channel_end_ms: u64::MAX,
            hit_phase_done: false,
            executed: false,
            focus_object: None,
            combo_spent: 0,
            unit_targets: Vec::new(),
            object_targets: Vec::new(),
            item_targets: Vec::new(),
            applied_aura_targets: Vec::new(),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.state == CastState::Finished
    }

    /// Add a unit to the ledger through the dedup/immunity/delay path.
    /// Entities already present accumulate the slot bit instead of gaining a
    /// second entry; slots the target is immune to are cleared before the
    /// entry is finalized, and an entry with no surviving slots is never
    /// created.
    pub fn add_unit_target(
        &mut self,
        target: &UnitSnapshot,
        slot_index: usize,
        def: &SpellDefinition,
        caster: &UnitSnapshot,
        rng: &mut GameRng,
    ) {
        let bit = 1u8 << slot_index;
        let slot = &def.effects[slot_index];
        if target.immune_to_slot(def, slot) {
            return;
        }

        if let Some(entry) = self
            .unit_targets
            .iter_mut()
            .find(|e| e.target == target.entity)
        {
            entry.effect_mask |= bit;
            return;
        }

        let harmful = def.is_harmful() && target.entity != self.caster;
        let hit = if harmful {
            let inputs = HitTableInputs {
                miss: target.unit.miss_chance,
                dodge: target.unit.dodge_chance,
                parry: target.unit.parry_chance,
                resist: target.unit.resist_chance,
                deflect: target.unit.deflect_chance,
                can_reflect: !def.attributes.cant_be_reflected && target.can_reflect(),
            };
            math::roll_hit_table(def.school, &inputs, rng)
        } else {
            HitResult::Hit
        };

        // A reflect rolls the bounced instance against the caster up front,
        // so a delayed missile's outcome is locked at launch.
        let reflect_hit = (hit == HitResult::Reflect).then(|| {
            let inputs = HitTableInputs {
                miss: caster.unit.miss_chance,
                dodge: caster.unit.dodge_chance,
                parry: caster.unit.parry_chance,
                resist: caster.unit.resist_chance,
                deflect: caster.unit.deflect_chance,
                can_reflect: false,
            };
            math::roll_hit_table(def.school, &inputs, rng)
        });

        let delay_ms = if def.speed > 0.0 {
            let distance = caster
                .position
                .distance(target.position)
                .max(MISSILE_MIN_DISTANCE);
            ((distance / def.speed) * 1000.0).floor() as u64
        } else {
            0
        };

        self.unit_targets.push(UnitTargetEntry {
            target: target.entity,
            effect_mask: bit,
            processed: false,
            hit,
            reflect_hit,
            damage: 0.0,
            healing: 0.0,
            critical: false,
            delay_ms,
            alive_at_resolve: target.alive(),
        });
    }

    pub fn add_object_target(&mut self, target: Entity, slot_index: usize) {
        let bit = 1u8 << slot_index;
        if let Some(entry) = self.object_targets.iter_mut().find(|e| e.target == target) {
            entry.effect_mask |= bit;
            return;
        }
        self.object_targets.push(ObjectTargetEntry {
            target,
            effect_mask: bit,
            processed: false,
        });
    }

    pub fn add_item_target(&mut self, owner: Entity, item: ItemId, slot_index: usize) {
        let bit = 1u8 << slot_index;
        if let Some(entry) = self
            .item_targets
            .iter_mut()
            .find(|e| e.owner == owner && e.item == item)
        {
            entry.effect_mask |= bit;
            return;
        }
        self.item_targets.push(ItemTargetEntry {
            owner,
            item,
            effect_mask: bit,
        });
    }

    pub fn all_unit_targets_processed(&self) -> bool {
        self.unit_targets.iter().all(|e| e.processed)
    }

    /// Absolute time of the earliest unprocessed impact, if any.
    pub fn min_pending_impact_ms(&self) -> Option<u64> {
        self.unit_targets
            .iter()
            .filter(|e| !e.processed)
            .map(|e| self.launched_ms + e.delay_ms)
            .min()
    }
}

/// Everything one state-machine step wants to tell the outside world.
/// Collected per step and flushed by the drive system, so handler work never
/// mutates the world mid-iteration.
#[derive(Default)]
pub struct StepOutput {
    pub actions: Vec<EffectAction>,
    pub failed: Option<CastError>,
    pub went_off: bool,
    pub interrupted: bool,
    pub channel_update: Option<u64>,
    pub procs: Vec<ProcTriggered>,
}

/// Advance one cast by one scheduler re-entry.
#[allow(clippy::too_many_arguments)]
pub fn step_cast(
    cast: &mut SpellCast,
    def: &SpellDefinition,
    snapshot: &WorldSnapshot,
    objects: &[GameObjectView],
    map: &ArenaMap,
    clock: &SimClock,
    rng: &mut GameRng,
    dr: &mut DiminishingLedger,
    log: &mut CombatLog,
    out: &mut StepOutput,
) -> CastProgress {
    if cast.is_finished() {
        return CastProgress::Complete;
    }
    let now = clock.now_ms;

    // The caster is resolved through the world registry on every use; a
    // vanished or dead caster terminates the Action as a normal outcome.
    let caster_ok = snapshot
        .get(cast.caster)
        .map_or(false, |c| c.alive() && !c.departed);
    if !caster_ok || cast.cancel_requested {
        cancel_cast(cast, out, log);
        return CastProgress::Complete;
    }

    match cast.state {
        CastState::Preparing => {
            let caster = snapshot.get(cast.caster).expect("caster checked above");
            if caster.unit.is_moving
                && (def.cast_time_ms > 0 || def.channeled)
                && def.interrupt_on_movement
                && !def.attributes.usable_while_moving
            {
                out.failed = Some(CastError::Moving);
                cancel_cast(cast, out, log);
                return CastProgress::Complete;
            }
            if now >= cast.cast_end_ms {
                execute_cast(cast, def, snapshot, objects, map, clock, rng, dr, log, out)
            } else {
                CastProgress::Continue(cast.cast_end_ms - now)
            }
        }
        CastState::Delayed => {
            hit::process_due_unit_targets(cast, def, snapshot, clock, rng, dr, log, out);
            if cast.all_unit_targets_processed() {
                finish_cast(cast, def, true, out, log);
                CastProgress::Complete
            } else {
                let next = cast
                    .min_pending_impact_ms()
                    .map(|t| t.saturating_sub(now))
                    .unwrap_or(0)
                    .max(1);
                CastProgress::Continue(next)
            }
        }
        CastState::Channeling => update_channel(cast, def, snapshot, map, clock, out, log),
        CastState::Finished => CastProgress::Complete,
    }
}

/// Launch the cast: relaxed re-validation, target resolution, cost debits,
/// launch phases, then dispatch into the delayed/channeled/instant branch.
#[allow(clippy::too_many_arguments)]
fn execute_cast(
    cast: &mut SpellCast,
    def: &SpellDefinition,
    snapshot: &WorldSnapshot,
    objects: &[GameObjectView],
    map: &ArenaMap,
    clock: &SimClock,
    rng: &mut GameRng,
    dr: &mut DiminishingLedger,
    log: &mut CombatLog,
    out: &mut StepOutput,
) -> CastProgress {
    let now = clock.now_ms;
    cast.executed = true;

    // Relaxed re-validation: world state may have changed during the
    // cast-time delay.
    {
        let caster_snap = snapshot.get(cast.caster).expect("caster checked by step");
        let target_view = cast
            .targets
            .unit()
            .and_then(|e| snapshot.get(e))
            .map(|t| TargetUnitView {
                entity: t.entity,
                unit: &t.unit,
                position: t.position,
                auras: t.auras.as_ref(),
            });
        let ctx = CheckContext {
            def,
            spell: cast.spell,
            targets: &cast.targets,
            caster: CasterView {
                entity: cast.caster,
                unit: &caster_snap.unit,
                position: caster_snap.position,
                auras: caster_snap.auras.as_ref(),
                cooldowns: &caster_snap.cooldowns,
                inventory: caster_snap.inventory.as_ref(),
            },
            target: target_view,
            objects,
            map,
            now_ms: now,
            triggered: cast.triggered,
        };
        match check_cast(&ctx, false, rng) {
            Ok(outcome) => {
                if cast.focus_object.is_none() {
                    cast.focus_object = outcome.focus_object;
                }
            }
            Err(error) => {
                out.failed = Some(error);
                finish_cast(cast, def, false, out, log);
                return CastProgress::Complete;
            }
        }
    }

    // Target resolution. A mandated target that cannot be resolved
    // terminates the Action with a typed failure - expected, not an error.
    if let Err(error) = resolver::select_spell_targets(cast, def, snapshot, map, rng) {
        out.failed = Some(error);
        finish_cast(cast, def, false, out, log);
        return CastProgress::Complete;
    }

    let caster_snap = snapshot.get(cast.caster).expect("caster checked by step");
    cast.combo_spent = cast
        .targets
        .unit()
        .map(|t| caster_snap.combo.points_on(t))
        .unwrap_or(0);

    // Debits: the engine decides whether and how much; the ledgers apply it.
    if !cast.triggered {
        if def.power_cost > 0.0 {
            out.actions.push(EffectAction::SpendPower {
                caster: cast.caster,
                amount: def.power_cost,
            });
        }
        if def.cooldown_ms > 0 {
            out.actions.push(EffectAction::StartCooldown {
                caster: cast.caster,
                spell: cast.spell,
                cooldown_ms: def.cooldown_ms,
            });
        }
        if !def.reagents.is_empty() {
            out.actions.push(EffectAction::ConsumeReagents {
                caster: cast.caster,
                spell: cast.spell,
            });
        }
    }
    if def.attributes.breaks_stealth {
        out.actions.push(EffectAction::BreakStealth {
            caster: cast.caster,
        });
    }

    out.went_off = true;
    log.log_cast_success(cast.caster, cast.spell);

    // Launch phases: Launch per slot, then LaunchTarget magnitude rolls per
    // resolved target, before any Hit work.
    effects::launch_actions(cast, def, &mut out.actions);
    hit::launch_target_phase(cast, def, caster_snap, rng);
    cast.launched_ms = now;

    if def.channeled {
        hit::process_due_unit_targets(cast, def, snapshot, clock, rng, dr, log, out);
        hit::ensure_spell_hit_phase(cast, def, snapshot, &mut out.actions);
        cast.state = CastState::Channeling;
        cast.channel_end_ms = if def.channel_duration_ms == 0 {
            u64::MAX
        } else {
            now + def.channel_duration_ms
        };
        let remaining = if cast.channel_end_ms == u64::MAX {
            u64::MAX
        } else {
            cast.channel_end_ms - now
        };
        out.channel_update = Some(remaining);
        CastProgress::Continue(CHANNEL_UPDATE_INTERVAL_MS.min(remaining.max(1)))
    } else if def.speed > 0.0 && !cast.unit_targets.is_empty() {
        cast.state = CastState::Delayed;
        let next = cast
            .min_pending_impact_ms()
            .map(|t| t.saturating_sub(now))
            .unwrap_or(0)
            .max(1);
        CastProgress::Continue(next)
    } else {
        hit::process_due_unit_targets(cast, def, snapshot, clock, rng, dr, log, out);
        hit::ensure_spell_hit_phase(cast, def, snapshot, &mut out.actions);
        finish_cast(cast, def, true, out, log);
        CastProgress::Complete
    }
}

/// Channel maintenance: every update interval, re-validate that the channel
/// targets still qualify (with a padded range), emit a progress update, or
/// finalize when the duration elapses.
fn update_channel(
    cast: &mut SpellCast,
    def: &SpellDefinition,
    snapshot: &WorldSnapshot,
    map: &ArenaMap,
    clock: &SimClock,
    out: &mut StepOutput,
    log: &mut CombatLog,
) -> CastProgress {
    let now = clock.now_ms;

    if cast.channel_end_ms != u64::MAX && now >= cast.channel_end_ms {
        finish_cast(cast, def, true, out, log);
        return CastProgress::Complete;
    }

    if !channel_targets_valid(cast, def, snapshot, map) {
        // Required slots lost their targets: finalize early.
        cancel_cast(cast, out, log);
        return CastProgress::Complete;
    }

    let remaining = if cast.channel_end_ms == u64::MAX {
        u64::MAX
    } else {
        cast.channel_end_ms - now
    };
    out.channel_update = Some(remaining);
    CastProgress::Continue(CHANNEL_UPDATE_INTERVAL_MS.min(remaining.max(1)))
}

/// A channel with channel-selector slots needs its target alive, visible,
/// and within the padded range for continuity.
fn channel_targets_valid(
    cast: &SpellCast,
    def: &SpellDefinition,
    snapshot: &WorldSnapshot,
    map: &ArenaMap,
) -> bool {
    let needs_channel_target = def.effects.iter().any(|slot| {
        slot.target_a.kind == SelectorKind::Channel || slot.target_b.kind == SelectorKind::Channel
    });
    if !needs_channel_target {
        return true;
    }

    let Some(target_entity) = cast.targets.unit() else {
        return false;
    };
    if target_entity == cast.caster {
        return true;
    }
    let (Some(caster), Some(target)) =
        (snapshot.get(cast.caster), snapshot.get(target_entity))
    else {
        return false;
    };
    if !target.alive() || target.departed || !target.visible_to(caster) {
        return false;
    }

    let padded = def.range_max * CHANNEL_RANGE_PAD;
    if caster.position.distance_squared(target.position) > padded * padded {
        return false;
    }
    if !def.attributes.ignore_line_of_sight
        && !map.line_of_sight(caster.position, target.position)
    {
        return false;
    }
    true
}

/// Terminate the cast. Success-only bookkeeping (combo consumption,
/// finish-phase proc, swing-timer reset) runs exactly once; finalizing an
/// already-finished cast is a no-op.
pub fn finish_cast(
    cast: &mut SpellCast,
    def: &SpellDefinition,
    success: bool,
    out: &mut StepOutput,
    _log: &mut CombatLog,
) {
    if cast.is_finished() {
        return;
    }

    if success && !cast.cancel_requested {
        if def.attributes.finishing_move {
            out.actions.push(EffectAction::ConsumeCombo {
                caster: cast.caster,
            });
        }
        out.actions.push(EffectAction::ResetSwingTimer {
            caster: cast.caster,
        });
        out.procs.push(ProcTriggered {
            actor: cast.caster,
            target: None,
            spell: cast.spell,
            hit_mask: hit_mask::NORMAL,
            phase: ProcPhase::Finish,
        });
    }

    cast.state = CastState::Finished;
}

/// Cancellation path: roll back speculative channel auras, notify the
/// initiator, and transition to Finished without success bookkeeping.
pub fn cancel_cast(cast: &mut SpellCast, out: &mut StepOutput, log: &mut CombatLog) {
    if cast.is_finished() {
        return;
    }

    for target in cast.applied_aura_targets.drain(..) {
        out.actions.push(EffectAction::RemoveAurasFrom {
            target,
            caster: cast.caster,
            spell: cast.spell,
        });
    }

    out.interrupted = true;
    log.log_interrupted(cast.caster, cast.spell);
    cast.state = CastState::Finished;
}

// ============================================================================
// Systems
// ============================================================================

/// Capture the world into an immutable snapshot for one resolution pass.
pub fn build_world_snapshot(units: &Query<UnitQueryData, With<Unit>>) -> WorldSnapshot {
    let mut list = Vec::new();
    for (entity, unit, transform, auras, cooldowns, combo, inventory, out_of_world) in units.iter()
    {
        list.push(UnitSnapshot {
            entity,
            position: transform.translation,
            departed: out_of_world.is_some(),
            unit: unit.clone(),
            auras: auras.map(|a| a.clone()),
            cooldowns: cooldowns.map(|c| c.clone()).unwrap_or_default(),
            combo: combo.copied().unwrap_or_default(),
            inventory: inventory.map(|i| i.clone()),
        });
    }
    WorldSnapshot::new(list)
}

/// Capture world objects for the checker and resolver.
pub fn build_object_views(
    objects: &Query<ObjectQueryData, Without<Unit>>,
) -> Vec<GameObjectView> {
    objects
        .iter()
        .map(|(entity, object, transform)| GameObjectView {
            entity,
            kind: object.kind,
            lock: object.lock,
            open: object.open,
            position: transform.translation,
        })
        .collect()
}

/// Consume cast requests: run the strict precondition check, resolve
/// category pre-emption, spawn the cast entity and start its countdown.
#[allow(clippy::too_many_arguments)]
pub fn start_requested_casts(
    mut commands: Commands,
    clock: Res<SimClock>,
    catalog: Res<SpellCatalog>,
    map: Res<ArenaMap>,
    mut rng: ResMut<GameRng>,
    mut combat_log: ResMut<CombatLog>,
    mut requests: EventReader<CastRequested>,
    mut units: Query<UnitQueryData, With<Unit>>,
    objects: Query<ObjectQueryData, Without<Unit>>,
    mut casts: Query<(Entity, &mut SpellCast)>,
    mut current_casts: Query<&mut CurrentCasts>,
    mut started: EventWriter<SpellCastStarted>,
    mut failed: EventWriter<SpellCastFailed>,
) {
    if requests.is_empty() {
        return;
    }
    let now = clock.now_ms;
    let object_views = build_object_views(&objects);

    for request in requests.read().cloned().collect::<Vec<_>>() {
        let Some(def) = catalog.get(request.spell) else {
            warn!("Cast request for unknown spell {:?}", request.spell);
            continue;
        };
        let report = !(request.triggered || def.attributes.dont_report_failure);

        // Rebuilt per request: an earlier request this tick may have
        // triggered the caster's global cooldown.
        let snapshot = build_world_snapshot(&units);
        let Some(caster_snap) = snapshot.get(request.caster) else {
            continue;
        };

        // Category occupancy: a busy generic slot rejects the newcomer.
        if !def.channeled && !request.triggered {
            if let Ok(current) = current_casts.get(request.caster) {
                if let Some(existing) = current.generic() {
                    if casts
                        .get(existing)
                        .map_or(false, |(_, c)| !c.is_finished())
                    {
                        combat_log.log_cast_failed(
                            request.caster,
                            request.spell,
                            &CastError::SpellInProgress,
                        );
                        if report {
                            failed.send(SpellCastFailed {
                                caster: request.caster,
                                spell: request.spell,
                                error: CastError::SpellInProgress,
                            });
                        }
                        continue;
                    }
                }
            }
        }

        // Strict precondition check.
        let target_view = request
            .targets
            .unit()
            .and_then(|e| snapshot.get(e))
            .map(|t| TargetUnitView {
                entity: t.entity,
                unit: &t.unit,
                position: t.position,
                auras: t.auras.as_ref(),
            });
        let ctx = CheckContext {
            def,
            spell: request.spell,
            targets: &request.targets,
            caster: CasterView {
                entity: request.caster,
                unit: &caster_snap.unit,
                position: caster_snap.position,
                auras: caster_snap.auras.as_ref(),
                cooldowns: &caster_snap.cooldowns,
                inventory: caster_snap.inventory.as_ref(),
            },
            target: target_view,
            objects: &object_views,
            map: &map,
            now_ms: now,
            triggered: request.triggered,
        };
        let outcome = match check_cast(&ctx, true, &mut rng) {
            Ok(outcome) => outcome,
            Err(error) => {
                combat_log.log_cast_failed(request.caster, request.spell, &error);
                if report {
                    failed.send(SpellCastFailed {
                        caster: request.caster,
                        spell: request.spell,
                        error,
                    });
                }
                continue;
            }
        };

        // A running channel is pre-empted by any new cast of its caster.
        if let Ok(current) = current_casts.get(request.caster) {
            if let Some(channel) = current.channeled() {
                if let Ok((_, mut channel_cast)) = casts.get_mut(channel) {
                    if !channel_cast.is_finished() {
                        channel_cast.cancel_requested = true;
                    }
                }
            }
        }

        // Spawn the Action.
        let mut cast = SpellCast::new(
            request.spell,
            request.caster,
            request.original_caster.unwrap_or(request.caster),
            request.targets.clone(),
            request.triggered,
        );
        cast.cast_end_ms = now + def.cast_time_ms;
        cast.next_event_ms = cast.cast_end_ms;
        cast.focus_object = outcome.focus_object;
        let cast_time_ms = def.cast_time_ms;
        let cast_entity = commands.spawn(cast).id();

        // Register as the current cast of its category. Triggered instants
        // stay out of the slots, the way automated casts don't occupy the
        // player's cast bar.
        let slot = if def.channeled {
            Some(CastSlot::Channeled)
        } else if !request.triggered {
            Some(CastSlot::Generic)
        } else {
            None
        };
        if let Some(slot) = slot {
            if let Ok(mut current) = current_casts.get_mut(request.caster) {
                current.set(slot, cast_entity);
            }
        }

        // The global cooldown triggers when the cast begins, not when it
        // lands.
        if !request.triggered && def.gcd_ms > 0 {
            if let Ok((_, _, _, _, Some(mut cooldowns), _, _, _)) = units.get_mut(request.caster)
            {
                cooldowns.trigger_global(now, def.gcd_ms);
            }
        }

        combat_log.log_cast_start(request.caster, request.spell, cast_time_ms);
        started.send(SpellCastStarted {
            caster: request.caster,
            spell: request.spell,
            cast_time_ms,
        });
    }
}

/// The scheduler: re-enter every cast whose re-entry time has arrived (or
/// that has a pending cancellation), then apply the deferred actions its
/// step produced.
#[allow(clippy::too_many_arguments)]
pub fn drive_spell_casts(
    mut commands: Commands,
    clock: Res<SimClock>,
    catalog: Res<SpellCatalog>,
    map: Res<ArenaMap>,
    mut rng: ResMut<GameRng>,
    mut dr: ResMut<DiminishingLedger>,
    mut combat_log: ResMut<CombatLog>,
    mut casts: Query<(Entity, &mut SpellCast)>,
    mut units: Query<UnitQueryData, With<Unit>>,
    mut objects: Query<ObjectQueryData, Without<Unit>>,
    mut current_casts: Query<&mut CurrentCasts>,
    mut notify: CastNotifications,
) {
    let now = clock.now_ms;

    let due: Vec<Entity> = casts
        .iter()
        .filter(|(_, cast)| {
            !cast.is_finished() && (cast.cancel_requested || now >= cast.next_event_ms)
        })
        .map(|(entity, _)| entity)
        .collect();

    if due.is_empty() {
        return;
    }

    // One world snapshot per drive pass. Interleaving between Actions
    // processed in the same pass is legal; there is no cross-Action
    // ordering guarantee.
    let snapshot = build_world_snapshot(&units);
    let object_views = build_object_views(&objects);
    let mut fresh_auras: std::collections::HashMap<Entity, Vec<crate::world::auras::Aura>> =
        std::collections::HashMap::new();

    for cast_entity in due {
        let Ok((_, cast)) = casts.get(cast_entity) else {
            continue;
        };
        let spell = cast.spell;
        let caster = cast.caster;
        let triggered = cast.triggered;
        let def = catalog.get_unchecked(spell);

        let mut out = StepOutput::default();
        {
            let Ok((_, mut cast)) = casts.get_mut(cast_entity) else {
                continue;
            };
            let progress = step_cast(
                &mut cast,
                def,
                &snapshot,
                &object_views,
                &map,
                &clock,
                &mut rng,
                &mut dr,
                &mut combat_log,
                &mut out,
            );
            if let CastProgress::Continue(offset) = progress {
                cast.next_event_ms = now + offset.max(1);
            }
        }

        // Notifications.
        if let Some(error) = out.failed.take() {
            if !(triggered || def.attributes.dont_report_failure) {
                combat_log.log_cast_failed(caster, spell, &error);
                notify.failed.send(SpellCastFailed {
                    caster,
                    spell,
                    error,
                });
            }
        }
        if out.went_off {
            notify.went_off.send(SpellWentOff { caster, spell });
        }
        if out.interrupted {
            notify
                .interrupted
                .send(SpellCastInterrupted { caster, spell });
        }
        if let Some(remaining_ms) = out.channel_update {
            notify.channel.send(crate::spell::events::ChannelUpdate {
                caster,
                spell,
                remaining_ms,
            });
        }
        for proc in out.procs.drain(..) {
            notify.procs.send(proc);
        }

        // Deferred world mutations, applied after the step so ledger
        // iteration can never observe them mid-flight.
        effects::apply_actions(
            out.actions,
            &mut commands,
            &clock,
            &catalog,
            &map,
            &mut combat_log,
            &mut units,
            &mut objects,
            &mut casts,
            &mut current_casts,
            &mut notify,
            &mut fresh_auras,
        );
    }

    effects::flush_fresh_auras(fresh_auras, &mut commands);
}

/// Reap terminal casts, expire departed units past their grace window, and
/// prune the diminishing-returns ledger.
pub fn cleanup_finished_casts(
    mut commands: Commands,
    clock: Res<SimClock>,
    mut dr: ResMut<DiminishingLedger>,
    casts: Query<(Entity, &SpellCast)>,
    mut current_casts: Query<&mut CurrentCasts>,
    departed: Query<(Entity, &OutOfWorld)>,
) {
    for (entity, cast) in casts.iter() {
        if cast.is_finished() {
            if let Ok(mut current) = current_casts.get_mut(cast.caster) {
                current.clear_entity(entity);
            }
            commands.entity(entity).despawn();
        }
    }

    let mut gone = Vec::new();
    for (entity, out_of_world) in departed.iter() {
        if clock.now_ms.saturating_sub(out_of_world.since_ms)
            >= crate::spell::constants::DEPARTED_GRACE_MS
        {
            gone.push(entity);
            commands.entity(entity).despawn();
        }
    }
    dr.prune(clock.now_ms, &gone);
}
