//! Precondition Checker
//!
//! Validates a cast against caster state, target state, resources, cooldowns,
//! geometry and environment. Invoked at least twice per cast: once at prepare
//! time with `strict = true` (movement/stealth/GCD checks only make sense
//! before any commitment) and once immediately before effect execution with
//! `strict = false` (the world may have changed during the cast-time delay,
//! so range gets a leeway pad and the commitment-only checks are skipped).
//!
//! Checks run in a fixed order, cheap and local before spatial and
//! inventory-shaped ones, so the common refusals short-circuit early.
//!
//! All checks are pure with respect to the cast except the spell-focus check,
//! which captures the focus object entity for later effect use.

use bevy::prelude::*;

use crate::spell::catalog::{
    EffectKind, ExplicitUnitRequirement, Mechanic, SpellDefinition, SpellId, SpellSchool,
    TargetCheck,
};
use crate::spell::constants::GATHER_SAFE_SKILL_MARGIN;
use crate::spell::targets::SpellTargets;
use crate::world::auras::ActiveAuras;
use crate::world::map::ArenaMap;
use crate::world::unit::{
    Cooldowns, GameObjectKind, Inventory, ItemClass, ItemId, LockInfo, SkillKind, Unit,
};
use crate::world::GameRng;

/// How close a required spell-focus object must be.
const SPELL_FOCUS_RANGE: f32 = 10.0;

/// The closed failure taxonomy. Variants carry the one-or-two numeric
/// parameters presentation needs; `params()` flattens them for transport.
#[derive(Clone, Debug, PartialEq)]
pub enum CastError {
    CasterDead,
    Stunned,
    Confused,
    Fleeing,
    Silenced,
    Pacified,
    /// School locked by an interrupt.
    LockedOut,
    /// Spell cooldown has not elapsed.
    NotReady,
    OnGlobalCooldown,
    /// Another cast of the same category is in progress.
    SpellInProgress,
    /// Explicit target incompatible with the spell.
    BadTargets,
    /// Implicit target resolution produced nothing usable.
    BadImplicitTargets,
    TargetsDead,
    TargetFriendly,
    TargetEnemy,
    TargetInvisible,
    OutOfRange,
    LineOfSight,
    NoPower,
    MissingReagent { item: ItemId, count: u32 },
    EquippedItemRequired { class: ItemClass },
    WrongStance,
    OnlyStealthed,
    Moving,
    Mounted,
    OnlyOutdoors,
    OnlyIndoors,
    NotInArena,
    RequiresSpellFocus { focus: GameObjectKind },
    NoPet,
    AlreadyHaveSummon,
    AlreadyHaveCharm,
    LowSkill { skill: SkillKind, required: u32 },
    /// Probabilistic gathering failure near the skill threshold.
    TryAgain,
    NothingToDispel,
    ItemNotReady,
    /// Nearby search found no candidate for a mandated slot.
    NearbyTargetNotFound,
    NoValidTargets,
    /// Target immune to every applicable effect.
    Immune,
    /// Destination unreachable.
    NoPath,
    /// Cast aborted by an external interrupt.
    Interrupted,
    /// Only castable as a triggered effect.
    TriggeredOnly,
}

impl CastError {
    /// The optional numeric payload attached to the failure, for
    /// presentation only.
    pub fn params(&self) -> (Option<u32>, Option<u32>) {
        match self {
            CastError::MissingReagent { item, count } => (Some(*item as u32), Some(*count)),
            CastError::EquippedItemRequired { class } => (Some(*class as u32), None),
            CastError::RequiresSpellFocus { focus } => (Some(*focus as u32), None),
            CastError::LowSkill { skill, required } => (Some(*skill as u32), Some(*required)),
            _ => (None, None),
        }
    }
}

/// Everything the checker needs to know about the caster.
pub struct CasterView<'a> {
    pub entity: Entity,
    pub unit: &'a Unit,
    pub position: Vec3,
    pub auras: Option<&'a ActiveAuras>,
    pub cooldowns: &'a Cooldowns,
    pub inventory: Option<&'a Inventory>,
}

/// Everything the checker needs to know about the explicit unit target.
pub struct TargetUnitView<'a> {
    pub entity: Entity,
    pub unit: &'a Unit,
    pub position: Vec3,
    pub auras: Option<&'a ActiveAuras>,
}

/// A game object visible to the checker (an owned snapshot, so the checker
/// can run against world copies as easily as live queries).
#[derive(Clone, Copy)]
pub struct GameObjectView {
    pub entity: Entity,
    pub kind: GameObjectKind,
    pub lock: Option<LockInfo>,
    pub open: bool,
    pub position: Vec3,
}

/// Inputs shared by both check entry points.
pub struct CheckContext<'a> {
    pub def: &'a SpellDefinition,
    pub spell: SpellId,
    pub targets: &'a SpellTargets,
    pub caster: CasterView<'a>,
    pub target: Option<TargetUnitView<'a>>,
    pub objects: &'a [GameObjectView],
    pub map: &'a ArenaMap,
    pub now_ms: u64,
    pub triggered: bool,
}

/// Side effects a successful check produced.
#[derive(Default)]
pub struct CheckOutcome {
    /// Focus object captured by the spell-focus check.
    pub focus_object: Option<Entity>,
}

/// Validate a cast. Returns OK plus captured side effects, or the first
/// failure in check order.
pub fn check_cast(
    ctx: &CheckContext,
    strict: bool,
    rng: &mut GameRng,
) -> Result<CheckOutcome, CastError> {
    let def = ctx.def;
    let caster = &ctx.caster;
    let mut outcome = CheckOutcome::default();

    if def.attributes.is_triggered_only && !ctx.triggered {
        return Err(CastError::TriggeredOnly);
    }

    // --- Caster liveness and aura-state prohibitions ---
    if !caster.unit.is_alive() {
        return Err(CastError::CasterDead);
    }

    if let Some(auras) = caster.auras {
        // Escalation: a spell that grants immunity to the very mechanic
        // blocking it is allowed through.
        if auras.is_stunned() && !def.grants_immunity_to(Mechanic::Stun) {
            return Err(CastError::Stunned);
        }
        if auras.is_confused() && !def.grants_immunity_to(Mechanic::Charm) {
            return Err(CastError::Confused);
        }
        if auras.is_fleeing() && !def.grants_immunity_to(Mechanic::Fear) {
            return Err(CastError::Fleeing);
        }
        if auras.is_silenced() && def.school != SpellSchool::Physical {
            return Err(CastError::Silenced);
        }
        if auras.is_pacified() && def.is_harmful() {
            return Err(CastError::Pacified);
        }
        if auras.locked_out(def.school) {
            return Err(CastError::LockedOut);
        }
    }

    // --- Cooldowns ---
    if !caster.cooldowns.is_ready(ctx.spell, ctx.now_ms) {
        return Err(CastError::NotReady);
    }
    if strict
        && !ctx.triggered
        && def.gcd_ms > 0
        && caster.cooldowns.on_global_cooldown(ctx.now_ms)
    {
        return Err(CastError::OnGlobalCooldown);
    }

    // --- Explicit target validity ---
    if def.explicit_unit != ExplicitUnitRequirement::None {
        let Some(target) = ctx.target.as_ref() else {
            return Err(CastError::BadTargets);
        };

        if !def.creature_type_mask.is_empty()
            && !def.creature_type_mask.contains(&target.unit.creature_type)
        {
            return Err(CastError::BadTargets);
        }
        if !target.unit.is_alive() && !def.attributes.allow_dead_target {
            return Err(CastError::TargetsDead);
        }
        if !target.unit.visible_to(caster.unit) {
            return Err(CastError::TargetInvisible);
        }
        match def.explicit_unit {
            ExplicitUnitRequirement::Enemy if caster.unit.friendly_to(target.unit) => {
                return Err(CastError::TargetFriendly);
            }
            ExplicitUnitRequirement::Ally if caster.unit.hostile_to(target.unit) => {
                return Err(CastError::TargetEnemy);
            }
            _ => {}
        }
    }
    if def.needs_object && ctx.targets.game_object().is_none() {
        return Err(CastError::BadTargets);
    }
    if def.needs_item && ctx.targets.item().is_none() {
        return Err(CastError::BadTargets);
    }

    // --- Range (squared distances; leeway when relaxed) ---
    let range_reference = ctx
        .target
        .as_ref()
        .filter(|t| t.entity != caster.entity)
        .map(|t| t.position)
        .or_else(|| {
            ctx.targets
                .dest()
                .and_then(|d| d.resolve(&|e| position_of(ctx, e)))
        });
    if let Some(reference) = range_reference {
        let d2 = caster.position.distance_squared(reference);
        let max = def.effective_max_range(strict);
        if d2 > max * max {
            return Err(CastError::OutOfRange);
        }
        if def.range_min > 0.0 && d2 < def.range_min * def.range_min {
            return Err(CastError::OutOfRange);
        }
    }

    // --- Line of sight ---
    if !def.attributes.ignore_line_of_sight {
        if let Some(reference) = range_reference {
            if !ctx.map.line_of_sight(caster.position, reference) {
                return Err(CastError::LineOfSight);
            }
        }
    }

    // --- Power ---
    if !ctx.triggered && def.power_cost > 0.0 {
        if !caster.unit.has_power(def.power_kind, def.power_cost) {
            return Err(CastError::NoPower);
        }
    }

    // --- Reagents and required equipment ---
    if !ctx.triggered {
        for &(item, count) in &def.reagents {
            let have = caster.inventory.map_or(0, |inv| inv.count_of(item));
            if have < count {
                return Err(CastError::MissingReagent { item, count });
            }
        }
    }
    if let Some(class) = def.equipped_item_class {
        if !caster.inventory.map_or(false, |inv| inv.has_class(class)) {
            return Err(CastError::EquippedItemRequired { class });
        }
    }

    // --- Stance, stealth, movement, mount ---
    if !def.allowed_stances.is_empty() && !def.allowed_stances.contains(&caster.unit.stance) {
        return Err(CastError::WrongStance);
    }
    if strict && def.attributes.requires_stealth && !caster.unit.stealthed {
        return Err(CastError::OnlyStealthed);
    }
    if strict
        && caster.unit.is_moving
        && (def.cast_time_ms > 0 || def.channeled)
        && def.interrupt_on_movement
        && !def.attributes.usable_while_moving
    {
        return Err(CastError::Moving);
    }
    if caster.unit.mounted && !ctx.triggered {
        return Err(CastError::Mounted);
    }

    // --- Environment ---
    if def.attributes.only_outdoors && ctx.map.indoor {
        return Err(CastError::OnlyOutdoors);
    }
    if def.attributes.only_indoors && !ctx.map.indoor {
        return Err(CastError::OnlyIndoors);
    }
    if def.attributes.not_in_arena && ctx.map.is_arena {
        return Err(CastError::NotInArena);
    }

    // --- Spell focus (captures the object as a side effect) ---
    if let Some(focus_kind) = def.spell_focus {
        let focus = ctx
            .objects
            .iter()
            .filter(|o| o.kind == focus_kind)
            .filter(|o| {
                o.position.distance_squared(caster.position)
                    <= SPELL_FOCUS_RANGE * SPELL_FOCUS_RANGE
            })
            .min_by(|a, b| {
                let da = a.position.distance_squared(caster.position);
                let db = b.position.distance_squared(caster.position);
                da.partial_cmp(&db).unwrap()
            });
        match focus {
            Some(object) => outcome.focus_object = Some(object.entity),
            None => return Err(CastError::RequiresSpellFocus { focus: focus_kind }),
        }
    }

    // --- Per-effect special cases ---
    for slot in &def.effects {
        match slot.kind {
            EffectKind::Summon => {
                if caster.unit.pet.is_some() {
                    return Err(CastError::AlreadyHaveSummon);
                }
            }
            EffectKind::ApplyAura => {
                if slot.mechanic_or(def.mechanic) == Mechanic::Charm
                    && caster.unit.charm.is_some()
                {
                    return Err(CastError::AlreadyHaveCharm);
                }
            }
            EffectKind::Dispel => {
                if let Some(target) = ctx.target.as_ref() {
                    let has_dispellable = target
                        .auras
                        .map_or(false, |a| a.dispellable_index().is_some());
                    if !has_dispellable {
                        return Err(CastError::NothingToDispel);
                    }
                }
            }
            EffectKind::OpenLock => {
                let object = ctx
                    .targets
                    .game_object()
                    .and_then(|e| ctx.objects.iter().find(|o| o.entity == e));
                let Some(object) = object else {
                    return Err(CastError::BadTargets);
                };
                if let Some(lock) = object.lock {
                    // The slot declares which skill this spell opens with;
                    // a mismatched lock is not a valid target for it.
                    if let Some(slot_lock) = slot.lock {
                        if slot_lock.skill != lock.skill {
                            return Err(CastError::BadTargets);
                        }
                    }
                    let skill = caster.unit.skill_value(lock.skill);
                    if skill < lock.required_value {
                        return Err(CastError::LowSkill {
                            skill: lock.skill,
                            required: lock.required_value,
                        });
                    }
                    // Near the threshold gathering can still fizzle; the
                    // curve ramps down linearly over the safe margin. Rolled
                    // only at execute time so the strict pass can't consume
                    // a different number of rolls than the relaxed one.
                    if !strict {
                        let margin = skill - lock.required_value;
                        if margin < GATHER_SAFE_SKILL_MARGIN {
                            let fail_chance = 0.25
                                * (GATHER_SAFE_SKILL_MARGIN - margin) as f32
                                / GATHER_SAFE_SKILL_MARGIN as f32;
                            if rng.random_f32() < fail_chance {
                                return Err(CastError::TryAgain);
                            }
                        }
                    }
                }
            }
            _ => {}
        }
    }

    // Pet-targeted slots need a pet to exist.
    if def
        .effects
        .iter()
        .any(|slot| slot.target_a.check == TargetCheck::Pet || slot.target_b.check == TargetCheck::Pet)
        && caster.unit.pet.is_none()
    {
        return Err(CastError::NoPet);
    }

    // --- Item cast readiness ---
    if let Some((owner, item)) = ctx.targets.item() {
        if owner == caster.entity {
            let Some(inventory) = caster.inventory else {
                return Err(CastError::BadTargets);
            };
            if !inventory.has(item, 1) {
                return Err(CastError::BadTargets);
            }
            if !inventory.item_ready(item, ctx.now_ms) {
                return Err(CastError::ItemNotReady);
            }
        }
    }

    Ok(outcome)
}

/// Reduced variant for pet/automated casts: initiator-facing commitment
/// checks (GCD, movement, stealth, mount) don't apply, and failures from
/// these casts are typically not reported.
pub fn check_pet_cast(ctx: &CheckContext, rng: &mut GameRng) -> Result<CheckOutcome, CastError> {
    // Automated casts always run the relaxed variant as a triggered cast.
    let relaxed = CheckContext {
        def: ctx.def,
        spell: ctx.spell,
        targets: ctx.targets,
        caster: CasterView {
            entity: ctx.caster.entity,
            unit: ctx.caster.unit,
            position: ctx.caster.position,
            auras: ctx.caster.auras,
            cooldowns: ctx.caster.cooldowns,
            inventory: ctx.caster.inventory,
        },
        target: ctx.target.as_ref().map(|t| TargetUnitView {
            entity: t.entity,
            unit: t.unit,
            position: t.position,
            auras: t.auras,
        }),
        objects: ctx.objects,
        map: ctx.map,
        now_ms: ctx.now_ms,
        triggered: true,
    };
    check_cast(&relaxed, false, rng)
}

fn position_of(ctx: &CheckContext, entity: Entity) -> Option<Vec3> {
    if entity == ctx.caster.entity {
        return Some(ctx.caster.position);
    }
    if let Some(target) = ctx.target.as_ref() {
        if target.entity == entity {
            return Some(target.position);
        }
    }
    ctx.objects
        .iter()
        .find(|o| o.entity == entity)
        .map(|o| o.position)
}
