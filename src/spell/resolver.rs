//! Target Resolver
//!
//! Given a spell definition and an Action's target set, populates the
//! per-target ledgers for every effect slot that declares a selector.
//!
//! Resolution runs over an immutable `WorldSnapshot` captured once per pass:
//! the spec's re-entrancy rule (nested casts must not corrupt an outer
//! Action's ledger iteration) falls out of this for free, and the pure
//! functions here stay testable without an ECS app.
//!
//! Strategies: explicit-target correction with fallback, nearby, cone, area
//! (with caster/target/source/dest/last reference points), chain, channel
//! passthrough, relative-point computation and trajectory sweeps. Entities
//! hit by several slots share one ledger entry with OR-ed effect masks;
//! immunity clears slots before the entry is finalized; candidate lists over
//! the slot's cap are truncated by seeded uniform random selection.

use bevy::prelude::*;
use smallvec::SmallVec;

use crate::spell::cast::SpellCast;
use crate::spell::catalog::{
    EffectKind, EffectSlot, ExplicitUnitRequirement, PointDirection, SelectorKind,
    SelectorReference, SpellDefinition, SpellSchool, TargetCheck, TargetSelector,
};
use crate::spell::check::CastError;
use crate::spell::constants::{
    CHAIN_FORWARD_ARC, CHAIN_JUMP_RADIUS_MAGIC, CHAIN_JUMP_RADIUS_MELEE,
    CHAIN_JUMP_RADIUS_RANGED, TRAJECTORY_HEIGHT_TOLERANCE, TRAJECTORY_MAX_TANGENT,
    TRAJECTORY_WIDTH,
};
use crate::spell::targets::SpellLocation;
use crate::world::auras::ActiveAuras;
use crate::world::map::ArenaMap;
use crate::world::unit::{ComboPoints, Cooldowns, Inventory, Unit};
use crate::world::GameRng;

/// Cone width used when an effect slot doesn't configure one.
const DEFAULT_CONE_ANGLE_DEG: f32 = 90.0;

/// Everything the resolver (and execute-time checker) needs to know about
/// one unit, captured at the start of a resolution pass.
#[derive(Clone)]
pub struct UnitSnapshot {
    pub entity: Entity,
    pub position: Vec3,
    /// Unit has left the world but is inside the departed grace window.
    pub departed: bool,
    pub unit: Unit,
    pub auras: Option<ActiveAuras>,
    pub cooldowns: Cooldowns,
    pub combo: ComboPoints,
    pub inventory: Option<Inventory>,
}

impl UnitSnapshot {
    pub fn alive(&self) -> bool {
        self.unit.is_alive()
    }

    pub fn hostile_to(&self, other: &UnitSnapshot) -> bool {
        self.unit.hostile_to(&other.unit)
    }

    pub fn friendly_to(&self, other: &UnitSnapshot) -> bool {
        self.unit.friendly_to(&other.unit)
    }

    pub fn visible_to(&self, observer: &UnitSnapshot) -> bool {
        self.unit.visible_to(&observer.unit)
    }

    pub fn immune_to_school(&self, school: SpellSchool) -> bool {
        self.auras
            .as_ref()
            .map_or(false, |a| a.immune_to_school(school))
    }

    pub fn immune_to_mechanic(&self, mechanic: crate::spell::catalog::Mechanic) -> bool {
        self.auras
            .as_ref()
            .map_or(false, |a| a.immune_to_mechanic(mechanic))
    }

    pub fn can_reflect(&self) -> bool {
        self.auras.as_ref().map_or(false, |a| a.reflect_available())
    }

    /// Whether this unit is immune to one specific effect slot of `def`.
    pub fn immune_to_slot(&self, def: &SpellDefinition, slot: &EffectSlot) -> bool {
        self.immune_to_school(def.school)
            || self.immune_to_mechanic(slot.mechanic_or(def.mechanic))
    }

    /// Whether every declared slot of `def` is cleared by immunity.
    pub fn immune_to_all_slots(&self, def: &SpellDefinition) -> bool {
        def.effects.iter().all(|slot| self.immune_to_slot(def, slot))
    }
}

/// Immutable world view for one resolution pass.
pub struct WorldSnapshot {
    pub units: Vec<UnitSnapshot>,
}

impl WorldSnapshot {
    pub fn new(units: Vec<UnitSnapshot>) -> Self {
        Self { units }
    }

    pub fn get(&self, entity: Entity) -> Option<&UnitSnapshot> {
        self.units.iter().find(|u| u.entity == entity)
    }

    pub fn position_of(&self, entity: Entity) -> Option<Vec3> {
        self.get(entity).map(|u| u.position)
    }
}

/// Key identifying a spatial query; consecutive slots with an equal key are
/// resolved together and share the candidate list. An optimization only -
/// results must equal resolving each slot independently.
#[derive(PartialEq)]
struct BatchKey {
    selector: TargetSelector,
    radius: f32,
    cone_angle: f32,
    required_creature: Option<crate::world::unit::CreatureType>,
    max_affected: u32,
}

impl BatchKey {
    fn of(selector: &TargetSelector, slot: &EffectSlot) -> Self {
        Self {
            selector: *selector,
            radius: slot.radius,
            cone_angle: slot.cone_angle_deg,
            required_creature: slot.required_creature,
            max_affected: slot.max_affected,
        }
    }
}

/// Populate the cast's ledgers for every effect slot. Returns a typed
/// failure when a mandated target cannot be resolved - a normal, expected
/// outcome that terminates the Action.
pub fn select_spell_targets(
    cast: &mut SpellCast,
    def: &SpellDefinition,
    snapshot: &WorldSnapshot,
    map: &ArenaMap,
    rng: &mut GameRng,
) -> Result<(), CastError> {
    let Some(caster) = snapshot.get(cast.caster) else {
        return Err(CastError::CasterDead);
    };

    correct_explicit_target(cast, def, caster, snapshot)?;

    // An explicit target immune to every declared slot refuses the whole
    // cast instead of silently resolving to nothing.
    if def.explicit_unit != ExplicitUnitRequirement::None {
        if let Some(target) = cast.targets.unit().and_then(|e| snapshot.get(e)) {
            if target.immune_to_all_slots(def) {
                return Err(CastError::Immune);
            }
        }
    }

    let mut last_resolved: Option<Entity> = None;
    let mut batch: Option<(BatchKey, Vec<Entity>)> = None;

    for index in 0..def.effects.len() {
        let slot = &def.effects[index];
        for selector in [&slot.target_a, &slot.target_b] {
            if selector.is_none() {
                continue;
            }
            resolve_selector(
                cast,
                def,
                index,
                selector,
                caster,
                snapshot,
                map,
                rng,
                &mut last_resolved,
                &mut batch,
            )?;
        }
    }

    Ok(())
}

/// Verify the initiator-supplied unit target against the spell's target
/// requirements; discard incompatible targets and substitute the documented
/// fallback chain (current selection, current attack target, self).
fn correct_explicit_target(
    cast: &mut SpellCast,
    def: &SpellDefinition,
    caster: &UnitSnapshot,
    snapshot: &WorldSnapshot,
) -> Result<(), CastError> {
    if def.explicit_unit == ExplicitUnitRequirement::None {
        return Ok(());
    }

    if let Some(unit) = cast.targets.unit() {
        match snapshot.get(unit) {
            Some(target) if explicit_compatible(def, caster, target) => return Ok(()),
            _ => cast.targets.clear_unit(),
        }
    }

    for fallback in [caster.unit.selection, caster.unit.attack_target] {
        if let Some(candidate) = fallback {
            if let Some(target) = snapshot.get(candidate) {
                if explicit_compatible(def, caster, target) {
                    cast.targets.set_unit(candidate);
                    return Ok(());
                }
            }
        }
    }

    // Beneficial casts fall back to the caster itself.
    if matches!(
        def.explicit_unit,
        ExplicitUnitRequirement::Ally | ExplicitUnitRequirement::Any
    ) {
        cast.targets.set_unit(cast.caster);
        return Ok(());
    }

    Err(CastError::BadImplicitTargets)
}

fn explicit_compatible(
    def: &SpellDefinition,
    caster: &UnitSnapshot,
    target: &UnitSnapshot,
) -> bool {
    if target.departed {
        return false;
    }
    if !target.alive() && !def.attributes.allow_dead_target {
        return false;
    }
    if !target.visible_to(caster) {
        return false;
    }
    if !def.creature_type_mask.is_empty()
        && !def.creature_type_mask.contains(&target.unit.creature_type)
    {
        return false;
    }
    match def.explicit_unit {
        ExplicitUnitRequirement::Enemy => caster.hostile_to(target),
        ExplicitUnitRequirement::Ally => caster.friendly_to(target),
        _ => true,
    }
}

#[allow(clippy::too_many_arguments)]
fn resolve_selector(
    cast: &mut SpellCast,
    def: &SpellDefinition,
    slot_index: usize,
    selector: &TargetSelector,
    caster: &UnitSnapshot,
    snapshot: &WorldSnapshot,
    map: &ArenaMap,
    rng: &mut GameRng,
    last_resolved: &mut Option<Entity>,
    batch: &mut Option<(BatchKey, Vec<Entity>)>,
) -> Result<(), CastError> {
    let slot = &def.effects[slot_index];

    match selector.kind {
        SelectorKind::None => {}
        SelectorKind::Caster => {
            add_unit(cast, def, slot_index, caster.entity, caster, snapshot, rng);
        }
        SelectorKind::Explicit => {
            if selector.check == TargetCheck::Pet {
                if let Some(pet) = caster.unit.pet {
                    add_unit(cast, def, slot_index, pet, caster, snapshot, rng);
                }
                return Ok(());
            }
            if let Some(unit) = cast.targets.unit() {
                add_unit(cast, def, slot_index, unit, caster, snapshot, rng);
                *last_resolved = Some(unit);
                if slot.chain_targets > 1 {
                    chain_from(
                        cast, def, slot_index, unit, caster, snapshot, map, rng,
                    );
                }
            } else if let Some(object) = cast.targets.game_object() {
                cast.add_object_target(object, slot_index);
            } else if let Some((owner, item)) = cast.targets.item() {
                cast.add_item_target(owner, item, slot_index);
            }
        }
        SelectorKind::Nearby => {
            let radius = if slot.radius > 0.0 {
                slot.radius
            } else {
                def.range_max
            };
            let nearest = snapshot
                .units
                .iter()
                .filter(|u| u.entity != caster.entity && !u.departed && u.alive())
                .filter(|u| matches_check(selector.check, def, slot, caster, u))
                .filter(|u| u.visible_to(caster))
                .filter(|u| u.position.distance_squared(caster.position) <= radius * radius)
                .filter(|u| map.line_of_sight(caster.position, u.position))
                .min_by(|a, b| {
                    let da = a.position.distance_squared(caster.position);
                    let db = b.position.distance_squared(caster.position);
                    da.partial_cmp(&db).unwrap()
                });
            match nearest {
                Some(unit) => {
                    let entity = unit.entity;
                    add_unit(cast, def, slot_index, entity, caster, snapshot, rng);
                    *last_resolved = Some(entity);
                    if slot.chain_targets > 1 {
                        chain_from(
                            cast, def, slot_index, entity, caster, snapshot, map, rng,
                        );
                    }
                }
                // Nearby slots mandate a target; nothing in range terminates
                // the Action with a typed failure.
                None => return Err(CastError::NearbyTargetNotFound),
            }
        }
        SelectorKind::Cone | SelectorKind::Area => {
            let key = BatchKey::of(selector, slot);
            let reuse = batch
                .as_ref()
                .map_or(false, |(cached, _)| *cached == key);
            let candidates: Vec<Entity> = if reuse {
                batch.as_ref().map(|(_, list)| list.clone()).unwrap_or_default()
            } else {
                let list = collect_spatial_candidates(
                    cast, def, slot, selector, caster, snapshot, map, rng, *last_resolved,
                )?;
                *batch = Some((key, list.clone()));
                list
            };
            for entity in &candidates {
                add_unit(cast, def, slot_index, *entity, caster, snapshot, rng);
            }
            if let Some(first) = candidates.first() {
                *last_resolved = Some(*first);
            }
        }
        SelectorKind::Channel => {
            // The entity currently being channeled at lives in the target
            // set; channels re-enter the resolver every tick.
            if let Some(unit) = cast.targets.unit() {
                add_unit(cast, def, slot_index, unit, caster, snapshot, rng);
                *last_resolved = Some(unit);
            }
        }
        SelectorKind::Point => {
            let position = compute_point(cast, selector, slot, caster, snapshot, rng)?;
            // A computed point the world cannot reach is a typed failure,
            // not a silent clamp.
            if !map.contains(position) {
                return Err(CastError::NoPath);
            }
            cast.targets.set_dest(SpellLocation::Fixed(position));
        }
        SelectorKind::Trajectory => {
            let candidates =
                collect_trajectory_candidates(cast, def, slot, selector, caster, snapshot, rng)?;
            for entity in &candidates {
                add_unit(cast, def, slot_index, *entity, caster, snapshot, rng);
            }
            if let Some(first) = candidates.first() {
                *last_resolved = Some(*first);
            }
        }
    }

    Ok(())
}

/// Shared spatial scan for cone and area selectors. Returns the (possibly
/// randomly truncated) candidate list.
#[allow(clippy::too_many_arguments)]
fn collect_spatial_candidates(
    cast: &SpellCast,
    def: &SpellDefinition,
    slot: &EffectSlot,
    selector: &TargetSelector,
    caster: &UnitSnapshot,
    snapshot: &WorldSnapshot,
    map: &ArenaMap,
    rng: &mut GameRng,
    last_resolved: Option<Entity>,
) -> Result<Vec<Entity>, CastError> {
    let reference = match selector.kind {
        SelectorKind::Cone => caster.position,
        _ => reference_point(cast, selector.reference, caster, snapshot, last_resolved)
            .ok_or(CastError::BadImplicitTargets)?,
    };

    let cone_half_angle = if slot.cone_angle_deg > 0.0 {
        slot.cone_angle_deg.to_radians() / 2.0
    } else {
        DEFAULT_CONE_ANGLE_DEG.to_radians() / 2.0
    };

    let mut candidates: Vec<(Entity, f32)> = snapshot
        .units
        .iter()
        .filter(|u| !u.departed && u.alive())
        .filter(|u| matches_check(selector.check, def, slot, caster, u))
        .filter(|u| u.visible_to(caster))
        .filter(|u| {
            let d2 = u.position.distance_squared(reference);
            d2 <= slot.radius * slot.radius
        })
        .filter(|u| {
            selector.kind != SelectorKind::Cone
                || u.entity == caster.entity
                || in_forward_arc(
                    caster.position,
                    caster.unit.facing,
                    u.position,
                    cone_half_angle * 2.0,
                )
        })
        .filter(|u| map.line_of_sight(reference, u.position))
        .map(|u| (u.entity, u.position.distance_squared(reference)))
        .collect();

    // Deterministic base order before any random truncation.
    candidates.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap());
    let mut list: Vec<Entity> = candidates.into_iter().map(|(e, _)| e).collect();

    list = truncate_randomly(list, slot.max_affected, rng);
    Ok(list)
}

/// Uniform random truncation of an over-long candidate list. Reproducible
/// through the injected RNG; never by distance or load order.
fn truncate_randomly(list: Vec<Entity>, max_affected: u32, rng: &mut GameRng) -> Vec<Entity> {
    if max_affected == 0 || list.len() <= max_affected as usize {
        return list;
    }
    let picked = rng.pick_indices(list.len(), max_affected as usize);
    picked.into_iter().map(|i| list[i]).collect()
}

/// Resolve an area selector's reference point.
fn reference_point(
    cast: &SpellCast,
    reference: SelectorReference,
    caster: &UnitSnapshot,
    snapshot: &WorldSnapshot,
    last_resolved: Option<Entity>,
) -> Option<Vec3> {
    let lookup = |e: Entity| snapshot.position_of(e);
    match reference {
        SelectorReference::Caster => Some(caster.position),
        SelectorReference::Target => cast.targets.unit().and_then(&lookup),
        SelectorReference::Source => cast
            .targets
            .source()
            .and_then(|loc| loc.resolve(&lookup))
            .or(Some(caster.position)),
        SelectorReference::Dest => cast.targets.dest().and_then(|loc| loc.resolve(&lookup)),
        SelectorReference::Last => last_resolved.and_then(&lookup),
    }
}

/// Whether a candidate satisfies the selector's hostility predicate.
fn matches_check(
    check: TargetCheck,
    def: &SpellDefinition,
    slot: &EffectSlot,
    caster: &UnitSnapshot,
    candidate: &UnitSnapshot,
) -> bool {
    match check {
        TargetCheck::Enemy => caster.hostile_to(candidate),
        TargetCheck::Ally => caster.friendly_to(candidate),
        TargetCheck::Pet => caster.unit.pet == Some(candidate.entity),
        TargetCheck::Entry => match slot.required_creature {
            Some(creature) => candidate.unit.creature_type == creature,
            // No condition list configured: fall back to the hostility
            // predicate the slot's own nature implies.
            None => default_check(def, slot, caster, candidate),
        },
        TargetCheck::Default => default_check(def, slot, caster, candidate),
    }
}

fn default_check(
    def: &SpellDefinition,
    slot: &EffectSlot,
    caster: &UnitSnapshot,
    candidate: &UnitSnapshot,
) -> bool {
    if slot_is_harmful(def, slot) {
        caster.hostile_to(candidate)
    } else {
        caster.friendly_to(candidate)
    }
}

fn slot_is_harmful(def: &SpellDefinition, slot: &EffectSlot) -> bool {
    match slot.kind {
        EffectKind::SchoolDamage
        | EffectKind::WeaponDamage
        | EffectKind::Dispel
        | EffectKind::Interrupt => true,
        EffectKind::Heal | EffectKind::Energize => false,
        _ => def.is_harmful(),
    }
}

/// Chain-target search: collect up to N-1 additional entities beyond the
/// primary, excluding entities already chained. The jump radius depends on
/// the spell class; heal chains prefer the largest missing-health deficit,
/// damage chains the nearest candidate with line of sight. Candidates
/// outside the caster's forward arc are excluded unless the spell is
/// flagged far-jumping.
#[allow(clippy::too_many_arguments)]
fn chain_from(
    cast: &mut SpellCast,
    def: &SpellDefinition,
    slot_index: usize,
    primary: Entity,
    caster: &UnitSnapshot,
    snapshot: &WorldSnapshot,
    map: &ArenaMap,
    rng: &mut GameRng,
) {
    let slot = &def.effects[slot_index];
    let jumps = slot.chain_targets.saturating_sub(1) as usize;
    if jumps == 0 {
        return;
    }
    let is_heal = slot.kind == EffectKind::Heal;
    let jump_radius = chain_jump_radius(def);

    let mut chained: SmallVec<[Entity; 8]> = SmallVec::new();
    chained.push(primary);
    let mut current = primary;

    for _ in 0..jumps {
        let Some(current_pos) = snapshot.position_of(current) else {
            break;
        };
        let next = snapshot
            .units
            .iter()
            .filter(|u| !chained.contains(&u.entity) && u.entity != caster.entity)
            .filter(|u| !u.departed && u.alive())
            .filter(|u| {
                if is_heal {
                    caster.friendly_to(u)
                } else {
                    caster.hostile_to(u)
                }
            })
            .filter(|u| u.visible_to(caster))
            .filter(|u| u.position.distance_squared(current_pos) <= jump_radius * jump_radius)
            .filter(|u| {
                def.attributes.far_jump_chain
                    || in_forward_arc(
                        caster.position,
                        caster.unit.facing,
                        u.position,
                        CHAIN_FORWARD_ARC,
                    )
            })
            .filter(|u| map.line_of_sight(current_pos, u.position))
            .max_by(|a, b| {
                if is_heal {
                    // Largest deficit wins.
                    a.unit
                        .missing_health()
                        .partial_cmp(&b.unit.missing_health())
                        .unwrap()
                } else {
                    // Nearest wins (max of negated distance).
                    let da = a.position.distance_squared(current_pos);
                    let db = b.position.distance_squared(current_pos);
                    db.partial_cmp(&da).unwrap()
                }
            });

        let Some(next) = next else {
            break;
        };
        let entity = next.entity;
        chained.push(entity);
        add_unit(cast, def, slot_index, entity, caster, snapshot, rng);
        current = entity;
    }
}

/// Class-dependent chain jump radius: melee, ranged physical, magic.
fn chain_jump_radius(def: &SpellDefinition) -> f32 {
    if def.school == SpellSchool::Physical {
        if def.range_max <= CHAIN_JUMP_RADIUS_MELEE {
            CHAIN_JUMP_RADIUS_MELEE
        } else {
            CHAIN_JUMP_RADIUS_RANGED
        }
    } else {
        CHAIN_JUMP_RADIUS_MAGIC
    }
}

/// Compute a concrete position for a Point selector.
fn compute_point(
    cast: &SpellCast,
    selector: &TargetSelector,
    slot: &EffectSlot,
    caster: &UnitSnapshot,
    snapshot: &WorldSnapshot,
    rng: &mut GameRng,
) -> Result<Vec3, CastError> {
    if selector.direction == PointDirection::Bound {
        return caster
            .unit
            .bound_location
            .ok_or(CastError::BadImplicitTargets);
    }

    let (anchor_pos, anchor_facing) = match selector.reference {
        SelectorReference::Target => {
            let target = cast
                .targets
                .unit()
                .and_then(|e| snapshot.get(e))
                .ok_or(CastError::BadImplicitTargets)?;
            (target.position, target.unit.facing)
        }
        _ => (caster.position, caster.unit.facing),
    };

    let angle = match selector.direction {
        PointDirection::Front | PointDirection::None => anchor_facing,
        PointDirection::Behind => anchor_facing + std::f32::consts::PI,
        PointDirection::Left => anchor_facing + std::f32::consts::FRAC_PI_2,
        PointDirection::Right => anchor_facing - std::f32::consts::FRAC_PI_2,
        PointDirection::Random => rng.random_range(0.0, std::f32::consts::TAU),
        PointDirection::Bound => unreachable!("handled above"),
    };

    let offset = Vec3::new(angle.sin(), 0.0, angle.cos()) * slot.radius;
    Ok(anchor_pos + offset)
}

/// Clamped tangent: the arc coefficient derivation divides by values driven
/// by tan(elevation), which blows up near the vertical asymptote.
fn tangent(x: f32) -> f32 {
    let t = x.tan();
    if t.is_finite() {
        t.clamp(-TRAJECTORY_MAX_TANGENT, TRAJECTORY_MAX_TANGENT)
    } else {
        TRAJECTORY_MAX_TANGENT
    }
}

/// Entities intersected by the parabolic missile arc from source to dest.
///
/// The arc height at horizontal progress `x` is `src.y + b*x + a*x²` where
/// `b = tan(elevation)` and `a` is derived by matching the measured height
/// delta between source and destination. Candidates within the corridor
/// whose height the arc passes through are selected, nearest-first along
/// the path.
fn collect_trajectory_candidates(
    cast: &SpellCast,
    def: &SpellDefinition,
    slot: &EffectSlot,
    selector: &TargetSelector,
    caster: &UnitSnapshot,
    snapshot: &WorldSnapshot,
    rng: &mut GameRng,
) -> Result<Vec<Entity>, CastError> {
    let lookup = |e: Entity| snapshot.position_of(e);
    let src = cast
        .targets
        .source()
        .and_then(|loc| loc.resolve(&lookup))
        .unwrap_or(caster.position);
    let dest = cast
        .targets
        .dest()
        .and_then(|loc| loc.resolve(&lookup))
        .ok_or(CastError::BadImplicitTargets)?;

    let (elevation, _speed) = match cast.targets.trajectory() {
        Some(traj) => (traj.elevation, traj.speed),
        None => (0.0, def.speed),
    };

    let flat_src = Vec2::new(src.x, src.z);
    let flat_dest = Vec2::new(dest.x, dest.z);
    let dist2d = flat_src.distance(flat_dest).max(f32::EPSILON);
    let dz = dest.y - src.y;

    let b = tangent(elevation);
    let mut a = (dz - dist2d * b) / (dist2d * dist2d);
    if a > -0.0001 {
        a = 0.0;
    }

    let path = (flat_dest - flat_src) / dist2d;

    let mut hits: Vec<(Entity, f32)> = snapshot
        .units
        .iter()
        .filter(|u| u.entity != caster.entity && !u.departed && u.alive())
        .filter(|u| matches_check(selector.check, def, slot, caster, u))
        .filter(|u| u.visible_to(caster))
        .filter_map(|u| {
            let flat = Vec2::new(u.position.x, u.position.z);
            let along = (flat - flat_src).dot(path);
            if along < 0.0 || along > dist2d {
                return None;
            }
            let lateral = (flat - (flat_src + path * along)).length();
            if lateral > TRAJECTORY_WIDTH {
                return None;
            }
            let arc_height = src.y + b * along + a * along * along;
            if (arc_height - u.position.y).abs() > TRAJECTORY_HEIGHT_TOLERANCE {
                return None;
            }
            Some((u.entity, along))
        })
        .collect();

    hits.sort_by(|x, y| x.1.partial_cmp(&y.1).unwrap());
    let list: Vec<Entity> = hits.into_iter().map(|(e, _)| e).collect();
    Ok(truncate_randomly(list, slot.max_affected, rng))
}

/// Whether `candidate_pos` lies inside the arc of `arc_width` radians
/// centered on `facing` as seen from `origin`.
pub fn in_forward_arc(origin: Vec3, facing: f32, candidate_pos: Vec3, arc_width: f32) -> bool {
    let to = Vec2::new(candidate_pos.x - origin.x, candidate_pos.z - origin.z);
    if to.length_squared() <= f32::EPSILON {
        return true;
    }
    let angle = to.x.atan2(to.y);
    let mut diff = angle - facing;
    while diff > std::f32::consts::PI {
        diff -= std::f32::consts::TAU;
    }
    while diff < -std::f32::consts::PI {
        diff += std::f32::consts::TAU;
    }
    diff.abs() <= arc_width / 2.0
}

/// Add one unit to the cast ledger through the dedup/immunity/delay path.
fn add_unit(
    cast: &mut SpellCast,
    def: &SpellDefinition,
    slot_index: usize,
    target: Entity,
    caster: &UnitSnapshot,
    snapshot: &WorldSnapshot,
    rng: &mut GameRng,
) {
    let Some(target_snapshot) = snapshot.get(target) else {
        return;
    };
    cast.add_unit_target(target_snapshot, slot_index, def, caster, rng);
}
