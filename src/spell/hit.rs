//! Hit Resolution Pipeline
//!
//! Per affected entity: immunity re-check at impact time (the world may have
//! changed while a missile was in flight), the locked hit-table outcome,
//! reflect handling (the bounced instance lands on the original caster and
//! its proc notification fires as a *delayed* follow-up event, never
//! synchronously), diminishing-returns consultation and increment for
//! aura-applying slots, combined damage commit, and exactly one proc
//! notification batch per (cast, target).
//!
//! Every entry is processed at most once, enforced by the `processed` guard;
//! the due-entry list is snapshotted per re-entry so entries logically added
//! during traversal are picked up on the next re-entry instead.

use bevy::prelude::*;

use crate::combat::log::CombatLog;
use crate::combat::math::{
    self, HitResult, CRIT_DAMAGE_MULTIPLIER, CRIT_HEALING_MULTIPLIER,
};
use crate::spell::cast::{SpellCast, StepOutput};
use crate::spell::catalog::{EffectKind, SpellDefinition, SpellId};
use crate::spell::diminishing::{DiminishLevel, DiminishingLedger};
use crate::spell::effects::{self, EffectAction};
use crate::spell::events::{hit_mask, ProcPhase, ProcTriggered};
use crate::spell::resolver::{UnitSnapshot, WorldSnapshot};
use crate::spell::SimClock;
use crate::world::GameRng;

/// Pending reflect-proc notification. The reflecting hit schedules this as
/// a time-delayed side event; collapsing it to synchronous would change the
/// proc ordering downstream consumers observe.
#[derive(Component)]
pub struct ReflectProcPending {
    pub actor: Entity,
    pub reflector: Entity,
    pub spell: SpellId,
    pub due_ms: u64,
}

/// Emit due reflect procs.
pub fn flush_reflect_procs(
    mut commands: Commands,
    clock: Res<SimClock>,
    pending: Query<(Entity, &ReflectProcPending)>,
    mut procs: EventWriter<ProcTriggered>,
) {
    for (entity, reflect) in pending.iter() {
        if clock.now_ms >= reflect.due_ms {
            procs.send(ProcTriggered {
                actor: reflect.actor,
                target: Some(reflect.reflector),
                spell: reflect.spell,
                hit_mask: hit_mask::REFLECT,
                phase: ProcPhase::Hit,
            });
            commands.entity(entity).despawn();
        }
    }
}

/// LaunchTarget phase: roll damage/heal magnitudes into the ledger entries.
/// Outcomes and amounts are locked at launch; impact later only re-checks
/// immunity.
pub fn launch_target_phase(
    cast: &mut SpellCast,
    def: &SpellDefinition,
    caster: &UnitSnapshot,
    rng: &mut GameRng,
) {
    let combo = cast.combo_spent;
    for entry in cast.unit_targets.iter_mut() {
        for (index, slot) in def.effects.iter().enumerate() {
            if entry.effect_mask & (1 << index) == 0 {
                continue;
            }
            match slot.kind {
                EffectKind::SchoolDamage | EffectKind::WeaponDamage => {
                    let mut amount = math::roll_magnitude(
                        slot.base_min,
                        slot.base_max,
                        slot.scaling,
                        slot.coefficient,
                        caster.unit.attack_power,
                        caster.unit.spell_power,
                        combo,
                        slot.per_combo_bonus,
                        rng,
                    );
                    let critical = math::roll_crit(caster.unit.crit_chance, rng);
                    if critical {
                        amount *= CRIT_DAMAGE_MULTIPLIER;
                    }
                    entry.damage += amount;
                    entry.critical |= critical;
                }
                EffectKind::Heal => {
                    let mut amount = math::roll_magnitude(
                        slot.base_min,
                        slot.base_max,
                        slot.scaling,
                        slot.coefficient,
                        caster.unit.attack_power,
                        caster.unit.spell_power,
                        combo,
                        slot.per_combo_bonus,
                        rng,
                    );
                    let critical = math::roll_crit(caster.unit.crit_chance, rng);
                    if critical {
                        amount *= CRIT_HEALING_MULTIPLIER;
                    }
                    entry.healing += amount;
                    entry.critical |= critical;
                }
                _ => {}
            }
        }
    }
}

/// Run the spell-wide Hit phase exactly once per cast.
pub fn ensure_spell_hit_phase(
    cast: &mut SpellCast,
    def: &SpellDefinition,
    snapshot: &WorldSnapshot,
    actions: &mut Vec<EffectAction>,
) {
    if cast.hit_phase_done {
        return;
    }
    cast.hit_phase_done = true;
    effects::spell_hit_actions(cast, def, snapshot, actions);
}

/// Process every not-yet-processed ledger entry whose travel delay has
/// elapsed (all of them for instant and single-missile casts), in
/// travel-delay order.
#[allow(clippy::too_many_arguments)]
pub fn process_due_unit_targets(
    cast: &mut SpellCast,
    def: &SpellDefinition,
    snapshot: &WorldSnapshot,
    clock: &SimClock,
    rng: &mut GameRng,
    dr: &mut DiminishingLedger,
    log: &mut CombatLog,
    out: &mut StepOutput,
) {
    let now = clock.now_ms;

    // Stable snapshot of due indices for this re-entry.
    let mut due: Vec<(usize, u64)> = cast
        .unit_targets
        .iter()
        .enumerate()
        .filter(|(_, entry)| !entry.processed)
        .filter(|(_, entry)| {
            def.speed <= 0.0
                || def.attributes.single_missile
                || now >= cast.launched_ms + entry.delay_ms
        })
        .map(|(index, entry)| (index, entry.delay_ms))
        .collect();
    due.sort_by_key(|(_, delay)| *delay);

    for (index, _) in due {
        process_one_target(cast, index, def, snapshot, clock, rng, dr, log, out);
    }
}

/// Resolve one ledger entry. Exactly-once is enforced here.
#[allow(clippy::too_many_arguments)]
fn process_one_target(
    cast: &mut SpellCast,
    index: usize,
    def: &SpellDefinition,
    snapshot: &WorldSnapshot,
    clock: &SimClock,
    rng: &mut GameRng,
    dr: &mut DiminishingLedger,
    log: &mut CombatLog,
    out: &mut StepOutput,
) {
    {
        let entry = &mut cast.unit_targets[index];
        if entry.processed {
            return;
        }
        entry.processed = true;
    }
    let entry = cast.unit_targets[index].clone();
    let target_entity = entry.target;

    // Spell-wide Hit phase precedes the first HitTarget.
    ensure_spell_hit_phase(cast, def, snapshot, &mut out.actions);

    let Some(target) = snapshot.get(target_entity) else {
        // Entity left the world entirely between resolution and execution:
        // skipped silently, not a failure.
        return;
    };

    let mut effect_mask = entry.effect_mask;
    if target.departed {
        // Out-of-map-aware lookup: only effects flagged usable on departed
        // targets survive; the rest are skipped silently.
        effect_mask &= departed_effect_mask(def);
        if effect_mask == 0 {
            return;
        }
    }

    // Immunity re-check: a delayed missile must respect immunities gained
    // while it was in flight.
    let mut gained_immunity = false;
    for (slot_index, slot) in def.effects.iter().enumerate() {
        if effect_mask & (1 << slot_index) != 0 && target.immune_to_slot(def, slot) {
            effect_mask &= !(1 << slot_index);
            gained_immunity = true;
        }
    }
    if effect_mask == 0 {
        log.log_hit_outcome(cast.caster, target_entity, cast.spell, HitResult::Immune);
        out.procs.push(ProcTriggered {
            actor: cast.caster,
            target: Some(target_entity),
            spell: cast.spell,
            hit_mask: hit_mask::IMMUNE,
            phase: ProcPhase::Hit,
        });
        return;
    }

    match entry.hit {
        HitResult::Miss
        | HitResult::Resist
        | HitResult::Dodge
        | HitResult::Parry
        | HitResult::Deflect
        | HitResult::Immune => {
            log.log_hit_outcome(cast.caster, target_entity, cast.spell, entry.hit);
            out.procs.push(ProcTriggered {
                actor: cast.caster,
                target: Some(target_entity),
                spell: cast.spell,
                hit_mask: entry.hit.into(),
                phase: ProcPhase::Hit,
            });
        }
        HitResult::Reflect => {
            log.log_hit_outcome(cast.caster, target_entity, cast.spell, HitResult::Reflect);
            out.actions.push(EffectAction::ConsumeReflectCharge {
                target: target_entity,
            });
            // Two-phase timing: the reflect proc is a delayed side event.
            out.actions.push(EffectAction::ScheduleReflectProc {
                actor: cast.caster,
                reflector: target_entity,
                spell: cast.spell,
            });

            // The bounced instance lands on the original caster, using the
            // second determination rolled at resolution.
            let reflect_hit = entry.reflect_hit.unwrap_or(HitResult::Hit);
            let bounce_victim = cast.caster;
            if reflect_hit == HitResult::Hit {
                deliver_effects(
                    cast,
                    def,
                    effect_mask,
                    bounce_victim,
                    &entry,
                    clock,
                    snapshot,
                    rng,
                    dr,
                    log,
                    out,
                );
            } else {
                log.log_hit_outcome(target_entity, cast.caster, cast.spell, reflect_hit);
            }

            out.procs.push(ProcTriggered {
                actor: cast.caster,
                target: Some(target_entity),
                spell: cast.spell,
                hit_mask: hit_mask::REFLECT,
                phase: ProcPhase::Hit,
            });
        }
        HitResult::Hit => {
            let dropped_by_dr = deliver_effects(
                cast,
                def,
                effect_mask,
                target_entity,
                &entry,
                clock,
                snapshot,
                rng,
                dr,
                log,
                out,
            );

            let mut mask = hit_mask::NORMAL;
            if entry.critical {
                mask |= hit_mask::CRITICAL;
            }
            if gained_immunity || dropped_by_dr {
                mask |= hit_mask::IMMUNE;
            }
            out.procs.push(ProcTriggered {
                actor: cast.caster,
                target: Some(target_entity),
                spell: cast.spell,
                hit_mask: mask,
                phase: ProcPhase::Hit,
            });
        }
    }
}

/// Commit one target's surviving effect slots against `victim` (the target
/// itself, or the caster for a reflected instance). Returns true when the
/// diminishing-returns ledger dropped at least one aura slot at the immune
/// level.
#[allow(clippy::too_many_arguments)]
fn deliver_effects(
    cast: &mut SpellCast,
    def: &SpellDefinition,
    effect_mask: u8,
    victim: Entity,
    entry: &crate::spell::cast::UnitTargetEntry,
    clock: &SimClock,
    snapshot: &WorldSnapshot,
    rng: &mut GameRng,
    dr: &mut DiminishingLedger,
    log: &mut CombatLog,
    out: &mut StepOutput,
) -> bool {
    let now = clock.now_ms;
    let mut dropped_by_dr = false;

    for slot_index in 0..def.effects.len() {
        if effect_mask & (1 << slot_index) == 0 {
            continue;
        }
        let slot = &def.effects[slot_index];

        // Diminishing returns gate aura applications: the immune level
        // drops the slot; lesser levels scale the committed duration.
        let mut duration_scale = 1.0;
        if slot.kind == EffectKind::ApplyAura
            && def.dr_group != crate::spell::diminishing::DiminishGroup::None
        {
            let level = dr.consult(victim, def.dr_group, now);
            if level == DiminishLevel::Immune {
                log.log_diminished(victim, cast.spell, 0.0);
                dropped_by_dr = true;
                continue;
            }
            duration_scale = level.multiplier();
            if duration_scale < 1.0 {
                log.log_diminished(victim, cast.spell, duration_scale);
            }
            dr.increment(victim, def.dr_group, now);
        }

        effects::hit_target_actions(
            cast,
            def,
            slot_index,
            victim,
            duration_scale,
            snapshot,
            rng,
            &mut out.actions,
        );
    }

    // Combined damage/heal events: one per target regardless of how many
    // slots contributed.
    if entry.damage > 0.0 {
        out.actions.push(EffectAction::Damage {
            caster: cast.caster,
            target: victim,
            spell: cast.spell,
            school: def.school,
            amount: entry.damage,
            critical: entry.critical,
        });
    }
    if entry.healing > 0.0 {
        out.actions.push(EffectAction::Heal {
            caster: cast.caster,
            target: victim,
            spell: cast.spell,
            amount: entry.healing,
        });
    }

    dropped_by_dr
}

/// Bitmask of effect slots explicitly marked usable on departed targets.
fn departed_effect_mask(def: &SpellDefinition) -> u8 {
    let mut mask = 0u8;
    for (index, slot) in def.effects.iter().enumerate() {
        if slot.usable_on_departed {
            mask |= 1 << index;
        }
    }
    mask
}
