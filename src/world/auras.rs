//! Aura & status effect tracking
//!
//! Auras carry the status state the cast engine consults: action-preventing
//! mechanics (stun, silence, ...), immunity grants, school lockouts applied by
//! interrupts, spell reflection charges, and periodic damage/heal effects
//! committed by channel ticks and DoT-style effect slots.
//!
//! System ordering: `process_periodic_auras` must run BEFORE `update_auras`
//! so a periodic aura can apply its final tick on the very frame it expires.

use bevy::prelude::*;

use crate::combat::log::{CombatLog, CombatLogEventType};
use crate::spell::catalog::{Mechanic, SpellId, SpellSchool};
use crate::spell::events::{SpellDamageDealt, SpellHealingDone};
use crate::spell::SimClock;
use crate::world::unit::Unit;

/// Duration value meaning "until removed".
pub const AURA_UNBOUNDED_MS: u64 = u64::MAX;

/// Kinds of aura effects the engine understands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum AuraKind {
    /// Prevents all action. Magnitude unused.
    Stun,
    /// Prevents movement only.
    Root,
    /// Prevents casting non-physical spells.
    Silence,
    /// Prevents harmful casts.
    Pacify,
    /// Target flees, unable to act.
    Fear,
    /// Target wanders, unable to act.
    Confuse,
    /// Reduces movement speed (magnitude = multiplier).
    Snare,
    /// Periodic damage; magnitude = damage per tick.
    PeriodicDamage,
    /// Periodic healing; magnitude = healing per tick.
    PeriodicHeal,
    /// Grants immunity to the aura's `school`.
    SchoolImmunity,
    /// Grants immunity to the aura's `mechanic`.
    MechanicImmunity,
    /// Bounces incoming spells back at their caster; `charges` counts down.
    SpellReflect,
    /// Interrupt lockout: casts of the aura's `school` are refused while
    /// this is active.
    SchoolLockout,
    /// Flat attack power bonus (magnitude = AP).
    ModAttackPower,
}

/// An active aura on a unit.
#[derive(Clone, Debug)]
pub struct Aura {
    pub kind: AuraKind,
    /// School payload: the immune school for `SchoolImmunity`, the locked
    /// school for `SchoolLockout`, otherwise the school of the applying spell.
    pub school: SpellSchool,
    /// Mechanic payload for `MechanicImmunity`; the applying spell's mechanic
    /// otherwise.
    pub mechanic: Mechanic,
    pub magnitude: f32,
    /// Remaining duration in simulated ms; `AURA_UNBOUNDED_MS` never expires.
    pub remaining_ms: u64,
    /// Tick period for periodic kinds (0 = no ticks).
    pub amplitude_ms: u64,
    pub until_next_tick_ms: u64,
    pub caster: Option<Entity>,
    pub spell: SpellId,
    /// Consumable charges (spell reflection). 0 means "not charge-counted".
    pub charges: u32,
}

impl Aura {
    pub fn is_periodic(&self) -> bool {
        matches!(self.kind, AuraKind::PeriodicDamage | AuraKind::PeriodicHeal)
            && self.amplitude_ms > 0
    }
}

/// Component tracking active auras on a unit.
#[derive(Component, Default, Clone)]
pub struct ActiveAuras {
    pub auras: Vec<Aura>,
}

impl ActiveAuras {
    pub fn has_kind(&self, kind: AuraKind) -> bool {
        self.auras.iter().any(|a| a.kind == kind)
    }

    pub fn is_stunned(&self) -> bool {
        self.has_kind(AuraKind::Stun)
    }

    pub fn is_confused(&self) -> bool {
        self.has_kind(AuraKind::Confuse)
    }

    pub fn is_fleeing(&self) -> bool {
        self.has_kind(AuraKind::Fear)
    }

    pub fn is_silenced(&self) -> bool {
        self.has_kind(AuraKind::Silence)
    }

    pub fn is_pacified(&self) -> bool {
        self.has_kind(AuraKind::Pacify)
    }

    pub fn immune_to_school(&self, school: SpellSchool) -> bool {
        self.auras
            .iter()
            .any(|a| a.kind == AuraKind::SchoolImmunity && a.school == school)
    }

    pub fn immune_to_mechanic(&self, mechanic: Mechanic) -> bool {
        mechanic != Mechanic::None
            && self
                .auras
                .iter()
                .any(|a| a.kind == AuraKind::MechanicImmunity && a.mechanic == mechanic)
    }

    /// Whether an interrupt lockout currently refuses casts of `school`.
    pub fn locked_out(&self, school: SpellSchool) -> bool {
        school != SpellSchool::Physical
            && self
                .auras
                .iter()
                .any(|a| a.kind == AuraKind::SchoolLockout && a.school == school)
    }

    pub fn reflect_available(&self) -> bool {
        self.auras
            .iter()
            .any(|a| a.kind == AuraKind::SpellReflect && a.charges > 0)
    }

    /// Consume one reflect charge. Returns false if none were available.
    /// Depleted reflect auras are dropped immediately.
    pub fn consume_reflect_charge(&mut self) -> bool {
        for aura in self.auras.iter_mut() {
            if aura.kind == AuraKind::SpellReflect && aura.charges > 0 {
                aura.charges -= 1;
                let depleted = aura.charges == 0;
                if depleted {
                    self.auras
                        .retain(|a| !(a.kind == AuraKind::SpellReflect && a.charges == 0));
                }
                return true;
            }
        }
        false
    }

    /// Remove auras applied by `spell` from `caster`. Used for channel
    /// rollback on cancellation. Returns how many were removed.
    pub fn remove_applied_by(&mut self, caster: Entity, spell: SpellId) -> usize {
        let before = self.auras.len();
        self.auras
            .retain(|a| !(a.caster == Some(caster) && a.spell == spell));
        before - self.auras.len()
    }

    /// Index of the first dispellable (magic, non-lockout) aura, if any.
    pub fn dispellable_index(&self) -> Option<usize> {
        self.auras.iter().position(|a| {
            a.school != SpellSchool::Physical
                && !matches!(a.kind, AuraKind::SchoolLockout | AuraKind::SpellReflect)
        })
    }

    pub fn attack_power_bonus(&self) -> f32 {
        self.auras
            .iter()
            .filter(|a| a.kind == AuraKind::ModAttackPower)
            .map(|a| a.magnitude)
            .sum()
    }
}

/// Update all active auras: tick down durations and remove expired ones.
pub fn update_auras(
    clock: Res<SimClock>,
    mut commands: Commands,
    mut units: Query<(Entity, &mut ActiveAuras)>,
) {
    let dt = clock.delta_ms;

    for (entity, mut auras) in units.iter_mut() {
        for aura in auras.auras.iter_mut() {
            if aura.remaining_ms != AURA_UNBOUNDED_MS {
                aura.remaining_ms = aura.remaining_ms.saturating_sub(dt);
            }
        }

        auras.auras.retain(|a| a.remaining_ms > 0);

        // Drop the component once empty so absence stays queryable.
        if auras.auras.is_empty() {
            commands.entity(entity).remove::<ActiveAuras>();
        }
    }
}

/// Process periodic aura ticks (DoTs and HoTs).
///
/// A tick fires when the amplitude timer runs out, and additionally on the
/// frame the aura expires if the timer hasn't fired yet - an 18s DoT with 3s
/// ticks lands ticks at t=3,6,9,12,15,18.
pub fn process_periodic_auras(
    clock: Res<SimClock>,
    mut combat_log: ResMut<CombatLog>,
    mut units: Query<(Entity, &mut Unit, Option<&mut ActiveAuras>)>,
    mut damage_events: EventWriter<SpellDamageDealt>,
    mut heal_events: EventWriter<SpellHealingDone>,
) {
    let dt = clock.delta_ms;

    // First pass: advance tick timers and queue tick applications.
    // (target, caster, spell, school, amount, is_heal)
    let mut ticks: Vec<(Entity, Option<Entity>, SpellId, SpellSchool, f32, bool)> = Vec::new();

    for (entity, unit, auras) in units.iter_mut() {
        let Some(mut auras) = auras else {
            continue;
        };
        if !unit.is_alive() {
            continue;
        }

        for aura in auras.auras.iter_mut() {
            if !aura.is_periodic() {
                continue;
            }

            aura.until_next_tick_ms = aura.until_next_tick_ms.saturating_sub(dt);
            let normal_tick = aura.until_next_tick_ms == 0;
            let final_tick = !normal_tick
                && aura.remaining_ms != AURA_UNBOUNDED_MS
                && aura.remaining_ms <= dt;

            if normal_tick || final_tick {
                ticks.push((
                    entity,
                    aura.caster,
                    aura.spell,
                    aura.school,
                    aura.magnitude,
                    aura.kind == AuraKind::PeriodicHeal,
                ));
                if normal_tick {
                    aura.until_next_tick_ms = aura.amplitude_ms;
                }
            }
        }
    }

    // Second pass: apply queued ticks.
    for (target_entity, caster, spell, school, amount, is_heal) in ticks {
        let Ok((_, mut target, _)) = units.get_mut(target_entity) else {
            continue;
        };
        if !target.is_alive() {
            continue;
        }

        if is_heal {
            let healed = target.receive_heal(amount);
            combat_log.log_healing(caster, target_entity, spell, healed, true);
            heal_events.send(SpellHealingDone {
                caster,
                target: target_entity,
                spell,
                amount: healed,
                periodic: true,
            });
        } else {
            let dealt = target.take_damage(amount);
            let killing_blow = !target.is_alive();
            combat_log.log_damage(caster, target_entity, spell, dealt, killing_blow, true);
            damage_events.send(SpellDamageDealt {
                caster,
                target: target_entity,
                spell,
                school,
                amount: dealt,
                critical: false,
                periodic: true,
            });
            if killing_blow {
                combat_log.log(
                    CombatLogEventType::Death,
                    format!("{} dies to a periodic effect", target.name),
                );
            }
        }
    }
}
