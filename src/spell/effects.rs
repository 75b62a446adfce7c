//! Effect application
//!
//! The effect-handler surface of the engine. The cast pipeline guarantees
//! call order across the four phases (`Launch` before any `Hit`,
//! `LaunchTarget` once per resolved target before that target's
//! `HitTarget`); the handlers themselves are deliberately compact - the full
//! per-ability catalog is an external concern.
//!
//! Handlers never touch the world directly. They emit `EffectAction`s which
//! the drive system applies after the owning cast's step completes, the same
//! deferred-mutation shape the rest of the engine uses for pending work.

use bevy::prelude::*;
use std::collections::HashMap;

use crate::combat::log::{CombatLog, CombatLogEventType};
use crate::combat::math;
use crate::spell::cast::{CurrentCasts, SpellCast};
use crate::spell::catalog::{
    EffectKind, SpellCatalog, SpellDefinition, SpellId, SpellSchool,
};
use crate::spell::constants::REFLECT_PROC_DELAY_MS;
use crate::spell::events::{
    CastNotifications, CastRequested, SpellDamageDealt, SpellHealingDone,
};
use crate::spell::hit::ReflectProcPending;
use crate::spell::resolver::WorldSnapshot;
use crate::spell::targets::SpellTargets;
use crate::spell::SimClock;
use crate::world::auras::{Aura, AuraKind, AURA_UNBOUNDED_MS};
use crate::world::map::ArenaMap;
use crate::world::unit::{Pet, PowerKind, Unit};
use crate::world::GameRng;

/// Invocation phases, in guaranteed order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EffectPhase {
    Launch,
    LaunchTarget,
    Hit,
    HitTarget,
}

/// A deferred world mutation produced by an effect handler.
pub enum EffectAction {
    Damage {
        caster: Entity,
        target: Entity,
        spell: SpellId,
        school: SpellSchool,
        amount: f32,
        critical: bool,
    },
    Heal {
        caster: Entity,
        target: Entity,
        spell: SpellId,
        amount: f32,
    },
    Energize {
        target: Entity,
        power: PowerKind,
        amount: f32,
    },
    ApplyAura {
        target: Entity,
        aura: Aura,
    },
    DispelOne {
        target: Entity,
    },
    InterruptTarget {
        caster: Entity,
        target: Entity,
        lockout_ms: u64,
    },
    Teleport {
        target: Entity,
        to: Vec3,
    },
    SummonPet {
        owner: Entity,
        at: Vec3,
    },
    OpenObject {
        object: Entity,
    },
    TriggerCast {
        caster: Entity,
        original_caster: Entity,
        spell: SpellId,
        targets: SpellTargets,
    },
    SpendPower {
        caster: Entity,
        amount: f32,
    },
    StartCooldown {
        caster: Entity,
        spell: SpellId,
        cooldown_ms: u64,
    },
    ConsumeReagents {
        caster: Entity,
        spell: SpellId,
    },
    BreakStealth {
        caster: Entity,
    },
    ConsumeCombo {
        caster: Entity,
    },
    ResetSwingTimer {
        caster: Entity,
    },
    ConsumeReflectCharge {
        target: Entity,
    },
    ScheduleReflectProc {
        actor: Entity,
        reflector: Entity,
        spell: SpellId,
    },
    RemoveAurasFrom {
        target: Entity,
        caster: Entity,
        spell: SpellId,
    },
}

/// Launch-phase hook, invoked once per effect slot before any target work.
/// The compact handler set has no launch behavior, but the call point is
/// part of the guaranteed phase order.
pub fn launch_actions(_cast: &SpellCast, _def: &SpellDefinition, _out: &mut Vec<EffectAction>) {}

/// Hit-phase handlers: spell-wide effects that run once per cast at first
/// impact (summons, lock opening, triggered detonations).
pub fn spell_hit_actions(
    cast: &SpellCast,
    def: &SpellDefinition,
    snapshot: &WorldSnapshot,
    out: &mut Vec<EffectAction>,
) {
    let lookup = |e: Entity| snapshot.position_of(e);
    let dest = cast.targets.dest().and_then(|loc| loc.resolve(&lookup));

    for (index, slot) in def.effects.iter().enumerate() {
        match slot.kind {
            EffectKind::Summon => {
                let at = dest.or_else(|| {
                    snapshot.get(cast.caster).map(|c| {
                        let facing = c.unit.facing;
                        c.position + Vec3::new(facing.sin(), 0.0, facing.cos()) * 2.0
                    })
                });
                if let Some(at) = at {
                    out.push(EffectAction::SummonPet {
                        owner: cast.caster,
                        at,
                    });
                }
            }
            EffectKind::OpenLock => {
                for entry in &cast.object_targets {
                    if entry.effect_mask & (1 << index) != 0 {
                        out.push(EffectAction::OpenObject {
                            object: entry.target,
                        });
                    }
                }
            }
            EffectKind::TriggerSpell => {
                if let Some(spell) = slot.trigger {
                    let mut targets = SpellTargets::default();
                    if let Some(dest) = dest {
                        targets.set_dest(crate::spell::targets::SpellLocation::Fixed(dest));
                    }
                    if let Some(unit) = cast.targets.unit() {
                        targets.set_unit(unit);
                    }
                    out.push(EffectAction::TriggerCast {
                        caster: cast.caster,
                        original_caster: cast.original_caster,
                        spell,
                        targets,
                    });
                }
            }
            _ => {}
        }
    }
}

/// HitTarget-phase handlers for one (slot, victim) pair. Damage and heal
/// amounts are not produced here - they were rolled at LaunchTarget into the
/// ledger entry and are committed as one combined event per target.
#[allow(clippy::too_many_arguments)]
pub fn hit_target_actions(
    cast: &mut SpellCast,
    def: &SpellDefinition,
    slot_index: usize,
    victim: Entity,
    aura_duration_scale: f32,
    snapshot: &WorldSnapshot,
    rng: &mut GameRng,
    out: &mut Vec<EffectAction>,
) {
    let slot = &def.effects[slot_index];
    match slot.kind {
        // Committed via the ledger entry's accumulated amounts.
        EffectKind::SchoolDamage | EffectKind::WeaponDamage | EffectKind::Heal => {}
        EffectKind::Energize => {
            let amount = math::roll_magnitude(
                slot.base_min,
                slot.base_max,
                slot.scaling,
                slot.coefficient,
                0.0,
                0.0,
                0,
                0.0,
                rng,
            );
            out.push(EffectAction::Energize {
                target: victim,
                power: slot.power_kind,
                amount,
            });
        }
        EffectKind::ApplyAura => {
            if let Some(spec) = slot.aura {
                let base_duration = spec.duration_ms;
                let duration = if base_duration == 0 {
                    AURA_UNBOUNDED_MS
                } else {
                    ((base_duration as f32) * aura_duration_scale).floor() as u64
                };
                if duration == 0 {
                    return;
                }
                let aura = Aura {
                    kind: spec.kind,
                    school: spec.school_override.unwrap_or(def.school),
                    mechanic: spec
                        .mechanic_override
                        .unwrap_or_else(|| slot.mechanic_or(def.mechanic)),
                    magnitude: spec.magnitude,
                    remaining_ms: duration,
                    amplitude_ms: spec.amplitude_ms,
                    until_next_tick_ms: spec.amplitude_ms,
                    caster: Some(cast.caster),
                    spell: cast.spell,
                    charges: spec.charges,
                };
                out.push(EffectAction::ApplyAura {
                    target: victim,
                    aura,
                });
                // Channels roll their auras back if cancelled early.
                if def.channeled && !cast.applied_aura_targets.contains(&victim) {
                    cast.applied_aura_targets.push(victim);
                }
            }
        }
        EffectKind::Dispel => {
            out.push(EffectAction::DispelOne { target: victim });
        }
        EffectKind::Interrupt => {
            out.push(EffectAction::InterruptTarget {
                caster: cast.caster,
                target: victim,
                lockout_ms: slot.base_min as u64,
            });
        }
        EffectKind::Teleport => {
            let lookup = |e: Entity| snapshot.position_of(e);
            if let Some(to) = cast.targets.dest().and_then(|loc| loc.resolve(&lookup)) {
                out.push(EffectAction::Teleport { target: victim, to });
            }
        }
        // Spell-wide kinds handled in the Hit phase.
        EffectKind::Summon | EffectKind::OpenLock | EffectKind::TriggerSpell => {}
        EffectKind::Dummy => {}
    }
}

/// Apply a batch of deferred actions to the world. Runs after the owning
/// cast's step so handler-side ledger iteration can never observe these
/// mutations mid-flight.
#[allow(clippy::too_many_arguments)]
pub fn apply_actions(
    actions: Vec<EffectAction>,
    commands: &mut Commands,
    clock: &SimClock,
    catalog: &SpellCatalog,
    map: &ArenaMap,
    log: &mut CombatLog,
    units: &mut Query<crate::spell::cast::UnitQueryData, With<Unit>>,
    objects: &mut Query<crate::spell::cast::ObjectQueryData, Without<Unit>>,
    casts: &mut Query<(Entity, &mut SpellCast)>,
    current_casts: &mut Query<&mut CurrentCasts>,
    notify: &mut CastNotifications,
    fresh_aura_components: &mut HashMap<Entity, Vec<Aura>>,
) {
    for action in actions {
        match action {
            EffectAction::Damage {
                caster,
                target,
                spell,
                school,
                amount,
                critical,
            } => {
                let Ok((_, mut unit, _, _, _, _, _, _)) = units.get_mut(target) else {
                    continue;
                };
                if !unit.is_alive() {
                    continue;
                }
                let dealt = unit.take_damage(amount);
                let killing_blow = !unit.is_alive();
                log.log_damage(Some(caster), target, spell, dealt, killing_blow, false);
                notify.damage.send(SpellDamageDealt {
                    caster: Some(caster),
                    target,
                    spell,
                    school,
                    amount: dealt,
                    critical,
                    periodic: false,
                });
                if killing_blow {
                    let name = unit.name.clone();
                    log.log(CombatLogEventType::Death, format!("{} dies", name));
                }
            }
            EffectAction::Heal {
                caster,
                target,
                spell,
                amount,
            } => {
                let Ok((_, mut unit, _, _, _, _, _, _)) = units.get_mut(target) else {
                    continue;
                };
                if !unit.is_alive() {
                    continue;
                }
                let healed = unit.receive_heal(amount);
                log.log_healing(Some(caster), target, spell, healed, false);
                notify.healing.send(SpellHealingDone {
                    caster: Some(caster),
                    target,
                    spell,
                    amount: healed,
                    periodic: false,
                });
            }
            EffectAction::Energize {
                target,
                power,
                amount,
            } => {
                if let Ok((_, mut unit, _, _, _, _, _, _)) = units.get_mut(target) {
                    if unit.power_kind == power {
                        unit.give_power(amount);
                    }
                }
            }
            EffectAction::ApplyAura { target, aura } => {
                let Ok((_, _, _, auras, _, _, _, _)) = units.get_mut(target) else {
                    continue;
                };
                log.log_aura_applied(target, aura.spell, aura.remaining_ms);
                match auras {
                    Some(mut auras) => auras.auras.push(aura),
                    // Component inserts stay queued until the drive pass
                    // finishes, so first-ever auras are grouped per target.
                    None => fresh_aura_components.entry(target).or_default().push(aura),
                }
            }
            EffectAction::DispelOne { target } => {
                if let Ok((_, unit, _, Some(mut auras), _, _, _, _)) = units.get_mut(target) {
                    if let Some(index) = auras.dispellable_index() {
                        let removed = auras.auras.remove(index);
                        let name = unit.name.clone();
                        log.log(
                            CombatLogEventType::AuraRemoved,
                            format!("{:?} is dispelled from {}", removed.spell, name),
                        );
                    }
                }
            }
            EffectAction::InterruptTarget {
                caster,
                target,
                lockout_ms,
            } => {
                apply_interrupt(
                    caster,
                    target,
                    lockout_ms,
                    catalog,
                    log,
                    casts,
                    current_casts,
                    fresh_aura_components,
                    units,
                );
            }
            EffectAction::Teleport { target, to } => {
                let Ok((_, unit, mut transform, _, _, _, _, _)) = units.get_mut(target) else {
                    continue;
                };
                if !map.contains(to) {
                    // Destination outside the world: the effect fizzles.
                    let name = unit.name.clone();
                    log.log(
                        CombatLogEventType::Event,
                        format!("{}'s teleport fizzles (no path)", name),
                    );
                    continue;
                }
                transform.translation = to;
                let name = unit.name.clone();
                log.log(
                    CombatLogEventType::Event,
                    format!("{} blinks to ({:.1}, {:.1})", name, to.x, to.z),
                );
            }
            EffectAction::SummonPet { owner, at } => {
                let Ok((_, owner_unit, _, _, _, _, _, _)) = units.get(owner) else {
                    continue;
                };
                let team = owner_unit.team;
                let owner_name = owner_unit.name.clone();

                let mut pet_unit = Unit::new(format!("{}'s Imp", owner_name), team);
                pet_unit.creature_type = crate::world::unit::CreatureType::Demon;
                pet_unit.max_health = 400.0;
                pet_unit.current_health = 400.0;
                pet_unit.player_controlled = false;

                let pet_entity = commands
                    .spawn((
                        pet_unit,
                        Transform::from_translation(at),
                        Pet { owner },
                        CurrentCasts::default(),
                        crate::world::unit::Cooldowns::default(),
                    ))
                    .id();
                log.register_actor(pet_entity, format!("{}'s Imp", owner_name));
                log.log(
                    CombatLogEventType::Event,
                    format!("{} summons an Imp", owner_name),
                );

                if let Ok((_, mut owner_unit, _, _, _, _, _, _)) = units.get_mut(owner) {
                    owner_unit.pet = Some(pet_entity);
                }
            }
            EffectAction::OpenObject { object } => {
                if let Ok((_, mut game_object, _)) = objects.get_mut(object) {
                    game_object.open = true;
                    log.log(
                        CombatLogEventType::Event,
                        format!("{:?} is opened", game_object.kind),
                    );
                }
            }
            EffectAction::TriggerCast {
                caster,
                original_caster,
                spell,
                targets,
            } => {
                // Nested casts are queued as fresh requests, never run
                // inline; the outer cast's ledger iteration stays intact.
                notify.requests.send(CastRequested {
                    caster,
                    spell,
                    targets,
                    triggered: true,
                    original_caster: Some(original_caster),
                });
            }
            EffectAction::SpendPower { caster, amount } => {
                if let Ok((_, mut unit, _, _, _, _, _, _)) = units.get_mut(caster) {
                    unit.spend_power(amount);
                }
            }
            EffectAction::StartCooldown {
                caster,
                spell,
                cooldown_ms,
            } => {
                if let Ok((_, _, _, _, Some(mut cooldowns), _, _, _)) = units.get_mut(caster) {
                    cooldowns.start(spell, clock.now_ms, cooldown_ms);
                }
            }
            EffectAction::ConsumeReagents { caster, spell } => {
                if let Some(def) = catalog.get(spell) {
                    if let Ok((_, _, _, _, _, _, Some(mut inventory), _)) = units.get_mut(caster) {
                        for &(item, count) in &def.reagents {
                            inventory.consume(item, count);
                        }
                    }
                }
            }
            EffectAction::BreakStealth { caster } => {
                if let Ok((_, mut unit, _, _, _, _, _, _)) = units.get_mut(caster) {
                    if unit.stealthed {
                        unit.stealthed = false;
                        let name = unit.name.clone();
                        log.log(
                            CombatLogEventType::Event,
                            format!("{} breaks stealth", name),
                        );
                    }
                }
            }
            EffectAction::ConsumeCombo { caster } => {
                if let Ok((_, _, _, _, _, Some(mut combo), _, _)) = units.get_mut(caster) {
                    combo.clear();
                }
            }
            EffectAction::ResetSwingTimer { caster } => {
                if let Ok((_, mut unit, _, _, _, _, _, _)) = units.get_mut(caster) {
                    unit.attack_timer = 0.0;
                }
            }
            EffectAction::ConsumeReflectCharge { target } => {
                if let Ok((_, _, _, Some(mut auras), _, _, _, _)) = units.get_mut(target) {
                    auras.consume_reflect_charge();
                }
            }
            EffectAction::ScheduleReflectProc {
                actor,
                reflector,
                spell,
            } => {
                commands.spawn(ReflectProcPending {
                    actor,
                    reflector,
                    spell,
                    due_ms: clock.now_ms + REFLECT_PROC_DELAY_MS,
                });
            }
            EffectAction::RemoveAurasFrom {
                target,
                caster,
                spell,
            } => {
                if let Ok((_, unit, _, Some(mut auras), _, _, _, _)) = units.get_mut(target) {
                    let removed = auras.remove_applied_by(caster, spell);
                    if removed > 0 {
                        let name = unit.name.clone();
                        log.log(
                            CombatLogEventType::AuraRemoved,
                            format!("{:?} fades from {}", spell, name),
                        );
                    }
                }
            }
        }
    }

}

/// Insert the grouped first-ever aura components collected during a drive
/// pass. Called once per pass, after every cast's actions have been applied.
pub fn flush_fresh_auras(
    fresh_aura_components: HashMap<Entity, Vec<Aura>>,
    commands: &mut Commands,
) {
    for (target, auras) in fresh_aura_components {
        commands
            .entity(target)
            .insert(crate::world::auras::ActiveAuras { auras });
    }
}

/// Interrupt the target's current cast or channel and apply a school
/// lockout for the interrupted spell's school. No lockout is applied when
/// nothing was interrupted.
#[allow(clippy::too_many_arguments)]
fn apply_interrupt(
    interrupter: Entity,
    target: Entity,
    lockout_ms: u64,
    catalog: &SpellCatalog,
    log: &mut CombatLog,
    casts: &mut Query<(Entity, &mut SpellCast)>,
    current_casts: &mut Query<&mut CurrentCasts>,
    fresh_aura_components: &mut HashMap<Entity, Vec<Aura>>,
    units: &mut Query<crate::spell::cast::UnitQueryData, With<Unit>>,
) {
    let Ok(current) = current_casts.get(target) else {
        return;
    };

    let mut victim_entity = None;
    for candidate in [current.channeled(), current.generic()].into_iter().flatten() {
        if let Ok((_, cast)) = casts.get(candidate) {
            if !cast.is_finished() && !cast.cancel_requested {
                victim_entity = Some(candidate);
                break;
            }
        }
    }
    let Some(victim_entity) = victim_entity else {
        return;
    };
    let Ok((_, mut victim)) = casts.get_mut(victim_entity) else {
        return;
    };

    victim.cancel_requested = true;
    let interrupted_spell = victim.spell;
    let interrupted_school = catalog
        .get(interrupted_spell)
        .map(|d| d.school)
        .unwrap_or(SpellSchool::None);
    log.log_interrupted(target, interrupted_spell);

    if lockout_ms == 0 || interrupted_school == SpellSchool::Physical {
        return;
    }

    let lockout = Aura {
        kind: AuraKind::SchoolLockout,
        school: interrupted_school,
        mechanic: crate::spell::catalog::Mechanic::Silence,
        magnitude: 0.0,
        remaining_ms: lockout_ms,
        amplitude_ms: 0,
        until_next_tick_ms: 0,
        caster: Some(interrupter),
        spell: interrupted_spell,
        charges: 0,
    };
    if let Ok((_, _, _, auras, _, _, _, _)) = units.get_mut(target) {
        match auras {
            Some(mut auras) => auras.auras.push(lockout),
            None => fresh_aura_components.entry(target).or_default().push(lockout),
        }
    }
    let target_name = log.name_of(target).to_string();
    log.log(
        CombatLogEventType::Event,
        format!(
            "{} locks {:?} casting for {} ms",
            target_name, interrupted_school, lockout_ms
        ),
    );
}
