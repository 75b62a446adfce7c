//! Unit tests for target resolution
//!
//! Exercises the resolver over hand-built world snapshots: explicit-target
//! correction and fallback, dedup by OR-ing effect masks, immunity
//! filtering, nearby/cone/area/chain strategies, randomized truncation and
//! travel-delay derivation - all without spinning up an app.

use bevy::prelude::*;

use spellsim::spell::cast::SpellCast;
use spellsim::spell::catalog::{
    EffectKind, EffectSlot, ExplicitUnitRequirement, Mechanic, PointDirection, ScalingStat,
    SelectorKind, SelectorReference, SpellAttributes, SpellDefinition, SpellSchool, TargetCheck,
    TargetSelector,
};
use spellsim::spell::check::CastError;
use spellsim::spell::diminishing::DiminishGroup;
use spellsim::spell::resolver::{select_spell_targets, UnitSnapshot, WorldSnapshot};
use spellsim::spell::targets::{SpellLocation, SpellTargets};
use spellsim::world::auras::{ActiveAuras, Aura, AuraKind};
use spellsim::world::map::ArenaMap;
use spellsim::world::unit::{ComboPoints, Cooldowns, PowerKind, Unit};
use spellsim::world::GameRng;
use spellsim::SpellId;

// =============================================================================
// Builders
// =============================================================================

fn slot(kind: EffectKind) -> EffectSlot {
    EffectSlot {
        kind,
        target_a: TargetSelector::default(),
        target_b: TargetSelector::default(),
        base_min: 10.0,
        base_max: 10.0,
        scaling: ScalingStat::None,
        coefficient: 0.0,
        per_combo_bonus: 0.0,
        radius: 0.0,
        cone_angle_deg: 0.0,
        chain_targets: 0,
        max_affected: 0,
        mechanic: Mechanic::None,
        aura: None,
        trigger: None,
        lock: None,
        power_kind: PowerKind::Mana,
        required_creature: None,
        usable_on_departed: false,
    }
}

fn selector(kind: SelectorKind, check: TargetCheck) -> TargetSelector {
    TargetSelector {
        kind,
        reference: SelectorReference::Caster,
        check,
        direction: PointDirection::None,
    }
}

fn spell_def(effects: Vec<EffectSlot>) -> SpellDefinition {
    SpellDefinition {
        name: "Test Spell".to_string(),
        school: SpellSchool::Fire,
        mechanic: Mechanic::None,
        dr_group: DiminishGroup::None,
        explicit_unit: ExplicitUnitRequirement::None,
        needs_dest: false,
        needs_object: false,
        needs_item: false,
        creature_type_mask: vec![],
        cast_time_ms: 0,
        channeled: false,
        channel_duration_ms: 0,
        range_min: 0.0,
        range_max: 40.0,
        speed: 0.0,
        power_kind: PowerKind::Mana,
        power_cost: 0.0,
        cooldown_ms: 0,
        gcd_ms: 1500,
        reagents: vec![],
        equipped_item_class: None,
        allowed_stances: vec![],
        spell_focus: None,
        interrupt_on_movement: true,
        attributes: SpellAttributes::default(),
        effects,
    }
}

fn snap(id: u32, name: &str, team: u8, pos: Vec3) -> UnitSnapshot {
    let mut unit = Unit::new(name, team);
    // Deterministic hit tables for targeting tests.
    unit.miss_chance = 0.0;
    unit.dodge_chance = 0.0;
    unit.parry_chance = 0.0;
    unit.resist_chance = 0.0;
    UnitSnapshot {
        entity: Entity::from_raw(id),
        position: pos,
        departed: false,
        unit,
        auras: None,
        cooldowns: Cooldowns::default(),
        combo: ComboPoints::default(),
        inventory: None,
    }
}

fn open_map() -> ArenaMap {
    ArenaMap {
        pillars: vec![],
        ..Default::default()
    }
}

fn cast_for(caster: Entity, targets: SpellTargets) -> SpellCast {
    SpellCast::new(SpellId::FireBlast, caster, caster, targets, false)
}

// =============================================================================
// Explicit-target correction
// =============================================================================

#[test]
fn test_incompatible_explicit_target_falls_back_to_selection() {
    let caster = snap(1, "caster", 1, Vec3::ZERO);
    let friend = snap(2, "friend", 1, Vec3::new(5.0, 0.0, 0.0));
    let enemy = snap(3, "enemy", 2, Vec3::new(8.0, 0.0, 0.0));

    let mut caster = caster;
    caster.unit.selection = Some(enemy.entity);

    let mut def = spell_def(vec![EffectSlot {
        target_a: selector(SelectorKind::Explicit, TargetCheck::Enemy),
        ..slot(EffectKind::SchoolDamage)
    }]);
    def.explicit_unit = ExplicitUnitRequirement::Enemy;

    // Initiator supplied a friendly target for an enemy-only spell.
    let mut cast = cast_for(caster.entity, SpellTargets::on_unit(friend.entity));
    let snapshot = WorldSnapshot::new(vec![caster.clone(), friend, enemy.clone()]);
    let mut rng = GameRng::from_seed(1);

    select_spell_targets(&mut cast, &def, &snapshot, &open_map(), &mut rng).unwrap();

    // Corrected to the caster's current selection.
    assert_eq!(cast.targets.unit(), Some(enemy.entity));
    assert_eq!(cast.unit_targets.len(), 1);
    assert_eq!(cast.unit_targets[0].target, enemy.entity);
}

#[test]
fn test_enemy_spell_with_no_fallback_fails_typed() {
    let caster = snap(1, "caster", 1, Vec3::ZERO);
    let friend = snap(2, "friend", 1, Vec3::new(5.0, 0.0, 0.0));

    let mut def = spell_def(vec![EffectSlot {
        target_a: selector(SelectorKind::Explicit, TargetCheck::Enemy),
        ..slot(EffectKind::SchoolDamage)
    }]);
    def.explicit_unit = ExplicitUnitRequirement::Enemy;

    let mut cast = cast_for(caster.entity, SpellTargets::on_unit(friend.entity));
    let snapshot = WorldSnapshot::new(vec![caster, friend]);
    let mut rng = GameRng::from_seed(1);

    let result = select_spell_targets(&mut cast, &def, &snapshot, &open_map(), &mut rng);
    assert_eq!(result.unwrap_err(), CastError::BadImplicitTargets);
}

#[test]
fn test_ally_spell_falls_back_to_self() {
    let caster = snap(1, "caster", 1, Vec3::ZERO);

    let mut def = spell_def(vec![EffectSlot {
        target_a: selector(SelectorKind::Explicit, TargetCheck::Ally),
        ..slot(EffectKind::Heal)
    }]);
    def.explicit_unit = ExplicitUnitRequirement::Ally;

    let mut cast = cast_for(caster.entity, SpellTargets::default());
    let snapshot = WorldSnapshot::new(vec![caster.clone()]);
    let mut rng = GameRng::from_seed(1);

    select_spell_targets(&mut cast, &def, &snapshot, &open_map(), &mut rng).unwrap();
    assert_eq!(cast.targets.unit(), Some(caster.entity));
}

// =============================================================================
// Dedup & immunity
// =============================================================================

#[test]
fn test_two_slots_same_target_share_one_entry() {
    let caster = snap(1, "caster", 1, Vec3::ZERO);
    let enemy = snap(2, "enemy", 2, Vec3::new(10.0, 0.0, 0.0));

    let mut def = spell_def(vec![
        EffectSlot {
            target_a: selector(SelectorKind::Explicit, TargetCheck::Enemy),
            ..slot(EffectKind::SchoolDamage)
        },
        EffectSlot {
            target_a: selector(SelectorKind::Explicit, TargetCheck::Enemy),
            aura: Some(spellsim::spell::catalog::AuraSpec {
                kind: AuraKind::Snare,
                duration_ms: 6000,
                amplitude_ms: 0,
                magnitude: 0.6,
                charges: 0,
                school_override: None,
                mechanic_override: None,
            }),
            ..slot(EffectKind::ApplyAura)
        },
    ]);
    def.explicit_unit = ExplicitUnitRequirement::Enemy;

    let mut cast = cast_for(caster.entity, SpellTargets::on_unit(enemy.entity));
    let snapshot = WorldSnapshot::new(vec![caster, enemy.clone()]);
    let mut rng = GameRng::from_seed(1);

    select_spell_targets(&mut cast, &def, &snapshot, &open_map(), &mut rng).unwrap();

    assert_eq!(cast.unit_targets.len(), 1);
    assert_eq!(cast.unit_targets[0].effect_mask, 0b11);
    // Mask conservation: never includes a slot the spell doesn't declare.
    assert_eq!(
        cast.unit_targets[0].effect_mask & !def.declared_effect_mask(),
        0
    );
}

#[test]
fn test_school_immunity_refuses_the_cast() {
    let caster = snap(1, "caster", 1, Vec3::ZERO);
    let mut enemy = snap(2, "enemy", 2, Vec3::new(10.0, 0.0, 0.0));
    enemy.auras = Some(ActiveAuras {
        auras: vec![Aura {
            kind: AuraKind::SchoolImmunity,
            school: SpellSchool::Fire,
            mechanic: Mechanic::None,
            magnitude: 0.0,
            remaining_ms: 10_000,
            amplitude_ms: 0,
            until_next_tick_ms: 0,
            caster: None,
            spell: SpellId::FireBlast,
            charges: 0,
        }],
    });

    let mut def = spell_def(vec![EffectSlot {
        target_a: selector(SelectorKind::Explicit, TargetCheck::Enemy),
        ..slot(EffectKind::SchoolDamage)
    }]);
    def.explicit_unit = ExplicitUnitRequirement::Enemy;

    let mut cast = cast_for(caster.entity, SpellTargets::on_unit(enemy.entity));
    let snapshot = WorldSnapshot::new(vec![caster, enemy]);
    let mut rng = GameRng::from_seed(1);

    let result = select_spell_targets(&mut cast, &def, &snapshot, &open_map(), &mut rng);
    assert_eq!(result.unwrap_err(), CastError::Immune);
}

#[test]
fn test_mechanic_immunity_clears_only_that_slot() {
    let caster = snap(1, "caster", 1, Vec3::ZERO);
    let mut enemy = snap(2, "enemy", 2, Vec3::new(10.0, 0.0, 0.0));
    enemy.auras = Some(ActiveAuras {
        auras: vec![Aura {
            kind: AuraKind::MechanicImmunity,
            school: SpellSchool::None,
            mechanic: Mechanic::Snare,
            magnitude: 0.0,
            remaining_ms: 10_000,
            amplitude_ms: 0,
            until_next_tick_ms: 0,
            caster: None,
            spell: SpellId::FireBlast,
            charges: 0,
        }],
    });

    let mut def = spell_def(vec![
        EffectSlot {
            target_a: selector(SelectorKind::Explicit, TargetCheck::Enemy),
            ..slot(EffectKind::SchoolDamage)
        },
        EffectSlot {
            target_a: selector(SelectorKind::Explicit, TargetCheck::Enemy),
            mechanic: Mechanic::Snare,
            aura: Some(spellsim::spell::catalog::AuraSpec {
                kind: AuraKind::Snare,
                duration_ms: 6000,
                amplitude_ms: 0,
                magnitude: 0.6,
                charges: 0,
                school_override: None,
                mechanic_override: None,
            }),
            ..slot(EffectKind::ApplyAura)
        },
    ]);
    def.explicit_unit = ExplicitUnitRequirement::Enemy;

    let mut cast = cast_for(caster.entity, SpellTargets::on_unit(enemy.entity));
    let snapshot = WorldSnapshot::new(vec![caster, enemy.clone()]);
    let mut rng = GameRng::from_seed(1);

    select_spell_targets(&mut cast, &def, &snapshot, &open_map(), &mut rng).unwrap();

    // The snare slot was cleared before the entry was finalized; only the
    // damage bit remains.
    assert_eq!(cast.unit_targets.len(), 1);
    assert_eq!(cast.unit_targets[0].effect_mask, 0b01);
}

// =============================================================================
// Nearby / cone / area
// =============================================================================

#[test]
fn test_nearby_picks_closest_and_fails_when_empty() {
    let caster = snap(1, "caster", 1, Vec3::ZERO);
    let near = snap(2, "near", 2, Vec3::new(6.0, 0.0, 0.0));
    let far = snap(3, "far", 2, Vec3::new(12.0, 0.0, 0.0));

    let def = spell_def(vec![EffectSlot {
        target_a: selector(SelectorKind::Nearby, TargetCheck::Enemy),
        radius: 20.0,
        ..slot(EffectKind::SchoolDamage)
    }]);

    let mut cast = cast_for(caster.entity, SpellTargets::default());
    let snapshot = WorldSnapshot::new(vec![caster.clone(), near.clone(), far]);
    let mut rng = GameRng::from_seed(1);
    select_spell_targets(&mut cast, &def, &snapshot, &open_map(), &mut rng).unwrap();
    assert_eq!(cast.unit_targets.len(), 1);
    assert_eq!(cast.unit_targets[0].target, near.entity);

    // No candidate at all: typed failure, normal outcome.
    let mut cast = cast_for(caster.entity, SpellTargets::default());
    let snapshot = WorldSnapshot::new(vec![caster]);
    let result = select_spell_targets(&mut cast, &def, &snapshot, &open_map(), &mut rng);
    assert_eq!(result.unwrap_err(), CastError::NearbyTargetNotFound);
}

#[test]
fn test_cone_only_hits_the_forward_sector() {
    // Caster faces +Z.
    let caster = snap(1, "caster", 1, Vec3::ZERO);
    let in_front = snap(2, "front", 2, Vec3::new(0.0, 0.0, 8.0));
    let behind = snap(3, "behind", 2, Vec3::new(0.0, 0.0, -8.0));

    let def = spell_def(vec![EffectSlot {
        target_a: selector(SelectorKind::Cone, TargetCheck::Enemy),
        radius: 15.0,
        cone_angle_deg: 90.0,
        ..slot(EffectKind::SchoolDamage)
    }]);

    let mut cast = cast_for(caster.entity, SpellTargets::default());
    let snapshot = WorldSnapshot::new(vec![caster, in_front.clone(), behind]);
    let mut rng = GameRng::from_seed(1);
    select_spell_targets(&mut cast, &def, &snapshot, &open_map(), &mut rng).unwrap();

    assert_eq!(cast.unit_targets.len(), 1);
    assert_eq!(cast.unit_targets[0].target, in_front.entity);
}

#[test]
fn test_area_around_destination() {
    let caster = snap(1, "caster", 1, Vec3::ZERO);
    let near_dest = snap(2, "near", 2, Vec3::new(20.0, 0.0, 2.0));
    let far_from_dest = snap(3, "far", 2, Vec3::new(5.0, 0.0, 0.0));

    let def = spell_def(vec![EffectSlot {
        target_a: TargetSelector {
            kind: SelectorKind::Area,
            reference: SelectorReference::Dest,
            check: TargetCheck::Enemy,
            direction: PointDirection::None,
        },
        radius: 6.0,
        ..slot(EffectKind::SchoolDamage)
    }]);

    let mut targets = SpellTargets::default();
    targets.set_dest(SpellLocation::Fixed(Vec3::new(20.0, 0.0, 0.0)));
    let mut cast = cast_for(caster.entity, targets);
    let snapshot = WorldSnapshot::new(vec![caster, near_dest.clone(), far_from_dest]);
    let mut rng = GameRng::from_seed(1);
    select_spell_targets(&mut cast, &def, &snapshot, &open_map(), &mut rng).unwrap();

    assert_eq!(cast.unit_targets.len(), 1);
    assert_eq!(cast.unit_targets[0].target, near_dest.entity);
}

#[test]
fn test_area_truncation_is_reproducible() {
    let caster = snap(1, "caster", 1, Vec3::ZERO);
    let mut units = vec![caster.clone()];
    for i in 0..10 {
        units.push(snap(
            10 + i,
            "enemy",
            2,
            Vec3::new(i as f32 - 5.0, 0.0, 3.0),
        ));
    }

    let def = spell_def(vec![EffectSlot {
        target_a: selector(SelectorKind::Area, TargetCheck::Enemy),
        radius: 20.0,
        max_affected: 3,
        ..slot(EffectKind::SchoolDamage)
    }]);

    let run = |seed: u64| {
        let mut cast = cast_for(caster.entity, SpellTargets::default());
        let snapshot = WorldSnapshot::new(units.clone());
        let mut rng = GameRng::from_seed(seed);
        select_spell_targets(&mut cast, &def, &snapshot, &open_map(), &mut rng).unwrap();
        let mut picked: Vec<Entity> = cast.unit_targets.iter().map(|e| e.target).collect();
        picked.sort();
        picked
    };

    let first = run(123);
    let second = run(123);
    assert_eq!(first.len(), 3);
    assert_eq!(first, second, "same seed must truncate identically");
}

// =============================================================================
// Chain targeting
// =============================================================================

#[test]
fn test_chain_never_repeats_and_respects_jump_radius() {
    let caster = snap(1, "caster", 1, Vec3::ZERO);
    let primary = snap(2, "primary", 2, Vec3::new(0.0, 0.0, 10.0));
    let second = snap(3, "second", 2, Vec3::new(0.0, 0.0, 14.0));
    let third = snap(4, "third", 2, Vec3::new(0.0, 0.0, 20.0));
    let out_of_reach = snap(5, "far", 2, Vec3::new(0.0, 0.0, 38.0));

    let mut def = spell_def(vec![EffectSlot {
        target_a: selector(SelectorKind::Explicit, TargetCheck::Enemy),
        chain_targets: 4,
        ..slot(EffectKind::SchoolDamage)
    }]);
    def.school = SpellSchool::Nature;
    def.explicit_unit = ExplicitUnitRequirement::Enemy;

    let mut cast = cast_for(caster.entity, SpellTargets::on_unit(primary.entity));
    let snapshot = WorldSnapshot::new(vec![
        caster,
        primary.clone(),
        second.clone(),
        third.clone(),
        out_of_reach.clone(),
    ]);
    let mut rng = GameRng::from_seed(1);
    select_spell_targets(&mut cast, &def, &snapshot, &open_map(), &mut rng).unwrap();

    let hit: Vec<Entity> = cast.unit_targets.iter().map(|e| e.target).collect();
    assert!(hit.contains(&primary.entity));
    assert!(hit.contains(&second.entity));
    assert!(hit.contains(&third.entity));
    // 38 - 20 = 18 units from the last link, outside the magic jump radius.
    assert!(!hit.contains(&out_of_reach.entity));

    // Chain exclusivity: no entity appears twice.
    let mut sorted = hit.clone();
    sorted.sort();
    sorted.dedup();
    assert_eq!(sorted.len(), hit.len());
}

#[test]
fn test_heal_chain_prefers_largest_deficit() {
    let caster = snap(1, "caster", 1, Vec3::ZERO);
    let primary = snap(2, "primary", 1, Vec3::new(0.0, 0.0, 5.0));
    let mut scratched = snap(3, "scratched", 1, Vec3::new(2.0, 0.0, 7.0));
    scratched.unit.current_health = 900.0;
    let mut wounded = snap(4, "wounded", 1, Vec3::new(-2.0, 0.0, 7.0));
    wounded.unit.current_health = 300.0;

    let mut def = spell_def(vec![EffectSlot {
        target_a: selector(SelectorKind::Explicit, TargetCheck::Ally),
        chain_targets: 2,
        ..slot(EffectKind::Heal)
    }]);
    def.school = SpellSchool::Holy;
    def.explicit_unit = ExplicitUnitRequirement::Ally;
    def.attributes.far_jump_chain = true;

    let mut cast = cast_for(caster.entity, SpellTargets::on_unit(primary.entity));
    let snapshot = WorldSnapshot::new(vec![caster, primary.clone(), scratched, wounded.clone()]);
    let mut rng = GameRng::from_seed(1);
    select_spell_targets(&mut cast, &def, &snapshot, &open_map(), &mut rng).unwrap();

    let hit: Vec<Entity> = cast.unit_targets.iter().map(|e| e.target).collect();
    assert_eq!(hit.len(), 2);
    assert!(hit.contains(&wounded.entity), "heal jumps to the most hurt ally");
}

// =============================================================================
// Travel delay
// =============================================================================

#[test]
fn test_travel_delay_from_distance_and_speed() {
    let caster = snap(1, "caster", 1, Vec3::ZERO);
    let target = snap(2, "target", 2, Vec3::new(60.0, 0.0, 0.0));

    let mut def = spell_def(vec![EffectSlot {
        target_a: selector(SelectorKind::Explicit, TargetCheck::Enemy),
        ..slot(EffectKind::SchoolDamage)
    }]);
    def.speed = 20.0;
    def.range_max = 100.0;

    let mut cast = cast_for(caster.entity, SpellTargets::on_unit(target.entity));
    let mut rng = GameRng::from_seed(1);
    cast.add_unit_target(&target, 0, &def, &caster, &mut rng);

    // 60 units at 20 units/sec = 3000 ms, floored.
    assert_eq!(cast.unit_targets[0].delay_ms, 3000);
}

#[test]
fn test_travel_delay_floor_distance_never_zero() {
    let caster = snap(1, "caster", 1, Vec3::ZERO);
    let target = snap(2, "target", 2, Vec3::ZERO);

    let mut def = spell_def(vec![EffectSlot {
        target_a: selector(SelectorKind::Explicit, TargetCheck::Enemy),
        ..slot(EffectKind::SchoolDamage)
    }]);
    def.speed = 20.0;

    let mut cast = cast_for(caster.entity, SpellTargets::on_unit(target.entity));
    let mut rng = GameRng::from_seed(1);
    cast.add_unit_target(&target, 0, &def, &caster, &mut rng);

    // Distance 0 still flies the floor distance: 5 / 20 = 250 ms.
    assert_eq!(cast.unit_targets[0].delay_ms, 250);
}
