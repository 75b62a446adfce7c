//! Unit tests for the precondition checker
//!
//! Covers the failure taxonomy ordering, the strict/relaxed split, range
//! boundary semantics, caster-state escalation against granted immunities,
//! and the spell-focus capture side effect.

use bevy::prelude::*;

use spellsim::spell::catalog::{
    AuraSpec, EffectKind, EffectSlot, ExplicitUnitRequirement, Mechanic, PointDirection,
    ScalingStat, SelectorKind, SelectorReference, SpellAttributes, SpellDefinition, SpellSchool,
    TargetCheck, TargetSelector,
};
use spellsim::spell::check::{
    check_cast, CastError, CasterView, CheckContext, GameObjectView, TargetUnitView,
};
use spellsim::spell::diminishing::DiminishGroup;
use spellsim::spell::targets::SpellTargets;
use spellsim::world::auras::{ActiveAuras, Aura, AuraKind};
use spellsim::world::map::ArenaMap;
use spellsim::world::unit::{Cooldowns, GameObjectKind, PowerKind, Stance, Unit};
use spellsim::world::GameRng;
use spellsim::SpellId;

fn damage_slot() -> EffectSlot {
    EffectSlot {
        kind: EffectKind::SchoolDamage,
        target_a: TargetSelector {
            kind: SelectorKind::Explicit,
            reference: SelectorReference::Caster,
            check: TargetCheck::Enemy,
            direction: PointDirection::None,
        },
        target_b: TargetSelector::default(),
        base_min: 10.0,
        base_max: 20.0,
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

fn enemy_spell() -> SpellDefinition {
    SpellDefinition {
        name: "Test Bolt".to_string(),
        school: SpellSchool::Fire,
        mechanic: Mechanic::None,
        dr_group: DiminishGroup::None,
        explicit_unit: ExplicitUnitRequirement::Enemy,
        needs_dest: false,
        needs_object: false,
        needs_item: false,
        creature_type_mask: vec![],
        cast_time_ms: 0,
        channeled: false,
        channel_duration_ms: 0,
        range_min: 0.0,
        range_max: 30.0,
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
        effects: vec![damage_slot()],
    }
}

fn aura(kind: AuraKind) -> Aura {
    Aura {
        kind,
        school: SpellSchool::Shadow,
        mechanic: Mechanic::None,
        magnitude: 0.0,
        remaining_ms: 10_000,
        amplitude_ms: 0,
        until_next_tick_ms: 0,
        caster: None,
        spell: SpellId::FireBlast,
        charges: 0,
    }
}

struct Fixture {
    def: SpellDefinition,
    caster_unit: Unit,
    caster_auras: Option<ActiveAuras>,
    caster_cooldowns: Cooldowns,
    target_unit: Unit,
    target_position: Vec3,
    targets: SpellTargets,
    map: ArenaMap,
    objects: Vec<GameObjectView>,
    now_ms: u64,
}

impl Fixture {
    fn new() -> Self {
        let target_entity = Entity::from_raw(2);
        Self {
            def: enemy_spell(),
            caster_unit: Unit::new("caster", 1),
            caster_auras: None,
            caster_cooldowns: Cooldowns::default(),
            target_unit: Unit::new("target", 2),
            target_position: Vec3::new(10.0, 0.0, 0.0),
            targets: SpellTargets::on_unit(target_entity),
            map: ArenaMap {
                pillars: vec![],
                ..Default::default()
            },
            objects: vec![],
            now_ms: 1_000,
        }
    }

    fn check(&self, strict: bool) -> Result<(), CastError> {
        let ctx = CheckContext {
            def: &self.def,
            spell: SpellId::FireBlast,
            targets: &self.targets,
            caster: CasterView {
                entity: Entity::from_raw(1),
                unit: &self.caster_unit,
                position: Vec3::ZERO,
                auras: self.caster_auras.as_ref(),
                cooldowns: &self.caster_cooldowns,
                inventory: None,
            },
            target: Some(TargetUnitView {
                entity: Entity::from_raw(2),
                unit: &self.target_unit,
                position: self.target_position,
                auras: None,
            }),
            objects: &self.objects,
            map: &self.map,
            now_ms: self.now_ms,
            triggered: false,
        };
        let mut rng = GameRng::from_seed(7);
        check_cast(&ctx, strict, &mut rng).map(|_| ())
    }
}

#[test]
fn test_happy_path_passes_both_variants() {
    let fixture = Fixture::new();
    assert!(fixture.check(true).is_ok());
    assert!(fixture.check(false).is_ok());
}

#[test]
fn test_dead_caster_fails_first() {
    let mut fixture = Fixture::new();
    fixture.caster_unit.current_health = 0.0;
    // Also stunned: liveness is checked before aura state.
    fixture.caster_auras = Some(ActiveAuras {
        auras: vec![aura(AuraKind::Stun)],
    });
    assert_eq!(fixture.check(true), Err(CastError::CasterDead));
}

#[test]
fn test_stunned_caster_refused() {
    let mut fixture = Fixture::new();
    fixture.caster_auras = Some(ActiveAuras {
        auras: vec![aura(AuraKind::Stun)],
    });
    assert_eq!(fixture.check(true), Err(CastError::Stunned));
}

#[test]
fn test_stun_escalation_against_granted_immunity() {
    // A spell whose own effect grants stun immunity is not blocked by the
    // stun that would otherwise refuse it.
    let mut fixture = Fixture::new();
    fixture.caster_auras = Some(ActiveAuras {
        auras: vec![aura(AuraKind::Stun)],
    });
    fixture.def.effects.push(EffectSlot {
        kind: EffectKind::ApplyAura,
        target_a: TargetSelector {
            kind: SelectorKind::Caster,
            ..TargetSelector::default()
        },
        aura: Some(AuraSpec {
            kind: AuraKind::MechanicImmunity,
            duration_ms: 5_000,
            amplitude_ms: 0,
            magnitude: 0.0,
            charges: 0,
            school_override: None,
            mechanic_override: Some(Mechanic::Stun),
        }),
        ..damage_slot()
    });
    assert!(fixture.check(true).is_ok());
}

#[test]
fn test_silence_blocks_magic_but_not_physical() {
    let mut fixture = Fixture::new();
    fixture.caster_auras = Some(ActiveAuras {
        auras: vec![aura(AuraKind::Silence)],
    });
    assert_eq!(fixture.check(true), Err(CastError::Silenced));

    fixture.def.school = SpellSchool::Physical;
    assert!(fixture.check(true).is_ok());
}

#[test]
fn test_school_lockout_refuses_that_school() {
    let mut fixture = Fixture::new();
    let mut lockout = aura(AuraKind::SchoolLockout);
    lockout.school = SpellSchool::Fire;
    fixture.caster_auras = Some(ActiveAuras {
        auras: vec![lockout],
    });
    assert_eq!(fixture.check(true), Err(CastError::LockedOut));

    fixture.def.school = SpellSchool::Frost;
    assert!(fixture.check(true).is_ok());
}

#[test]
fn test_cooldown_and_gcd() {
    let mut fixture = Fixture::new();
    fixture
        .caster_cooldowns
        .start(SpellId::FireBlast, 0, 8_000);
    assert_eq!(fixture.check(true), Err(CastError::NotReady));

    let mut fixture = Fixture::new();
    fixture.caster_cooldowns.trigger_global(900, 1_500);
    // Strict sees the global cooldown...
    assert_eq!(fixture.check(true), Err(CastError::OnGlobalCooldown));
    // ...but the relaxed re-check at execute time does not.
    assert!(fixture.check(false).is_ok());
}

#[test]
fn test_range_boundary_exact_max_passes() {
    let mut fixture = Fixture::new();
    // Exactly at max range: squared comparison admits it.
    fixture.target_position = Vec3::new(30.0, 0.0, 0.0);
    assert!(fixture.check(true).is_ok());

    // A hair beyond fails.
    fixture.target_position = Vec3::new(30.01, 0.0, 0.0);
    assert_eq!(fixture.check(true), Err(CastError::OutOfRange));

    // The relaxed variant absorbs movement since the strict check.
    assert!(fixture.check(false).is_ok());
}

#[test]
fn test_min_range_violation_is_out_of_range() {
    let mut fixture = Fixture::new();
    fixture.def.range_min = 5.0;
    fixture.target_position = Vec3::new(4.9, 0.0, 0.0);
    assert_eq!(fixture.check(true), Err(CastError::OutOfRange));
}

#[test]
fn test_line_of_sight_blocked_by_pillar() {
    let mut fixture = Fixture::new();
    fixture.map.pillars.push(spellsim::world::map::Pillar {
        x: 5.0,
        z: 0.0,
        radius: 2.0,
    });
    assert_eq!(fixture.check(true), Err(CastError::LineOfSight));

    fixture.def.attributes.ignore_line_of_sight = true;
    assert!(fixture.check(true).is_ok());
}

#[test]
fn test_insufficient_power() {
    let mut fixture = Fixture::new();
    fixture.def.power_cost = 50.0;
    fixture.caster_unit.current_power = 10.0;
    assert_eq!(fixture.check(true), Err(CastError::NoPower));
}

#[test]
fn test_missing_reagent_carries_payload() {
    let mut fixture = Fixture::new();
    fixture.def.reagents = vec![(spellsim::world::unit::ItemId::ArcanePowder, 2)];
    let error = fixture.check(true).unwrap_err();
    assert_eq!(
        error,
        CastError::MissingReagent {
            item: spellsim::world::unit::ItemId::ArcanePowder,
            count: 2
        }
    );
    let (p1, p2) = error.params();
    assert!(p1.is_some());
    assert_eq!(p2, Some(2));
}

#[test]
fn test_stance_and_stealth_gates() {
    let mut fixture = Fixture::new();
    fixture.def.allowed_stances = vec![Stance::Defensive];
    assert_eq!(fixture.check(true), Err(CastError::WrongStance));

    let mut fixture = Fixture::new();
    fixture.def.attributes.requires_stealth = true;
    assert_eq!(fixture.check(true), Err(CastError::OnlyStealthed));
    // Stealth is a commitment-time check only.
    assert!(fixture.check(false).is_ok());
}

#[test]
fn test_movement_aborts_strict_only() {
    let mut fixture = Fixture::new();
    fixture.def.cast_time_ms = 2_000;
    fixture.caster_unit.is_moving = true;
    assert_eq!(fixture.check(true), Err(CastError::Moving));
    assert!(fixture.check(false).is_ok());

    fixture.def.attributes.usable_while_moving = true;
    assert!(fixture.check(true).is_ok());
}

#[test]
fn test_environment_gates() {
    let mut fixture = Fixture::new();
    fixture.def.attributes.only_outdoors = true;
    fixture.map.indoor = true;
    assert_eq!(fixture.check(true), Err(CastError::OnlyOutdoors));

    let mut fixture = Fixture::new();
    fixture.def.attributes.not_in_arena = true;
    fixture.map.is_arena = true;
    assert_eq!(fixture.check(true), Err(CastError::NotInArena));
}

#[test]
fn test_spell_focus_captured_or_missing() {
    let mut fixture = Fixture::new();
    fixture.def.spell_focus = Some(GameObjectKind::Campfire);

    assert_eq!(
        fixture.check(true),
        Err(CastError::RequiresSpellFocus {
            focus: GameObjectKind::Campfire
        })
    );

    let focus_entity = Entity::from_raw(40);
    fixture.objects.push(GameObjectView {
        entity: focus_entity,
        kind: GameObjectKind::Campfire,
        lock: None,
        open: false,
        position: Vec3::new(2.0, 0.0, 0.0),
    });

    // Re-run and inspect the side effect.
    let ctx = CheckContext {
        def: &fixture.def,
        spell: SpellId::FireBlast,
        targets: &fixture.targets,
        caster: CasterView {
            entity: Entity::from_raw(1),
            unit: &fixture.caster_unit,
            position: Vec3::ZERO,
            auras: None,
            cooldowns: &fixture.caster_cooldowns,
            inventory: None,
        },
        target: Some(TargetUnitView {
            entity: Entity::from_raw(2),
            unit: &fixture.target_unit,
            position: fixture.target_position,
            auras: None,
        }),
        objects: &fixture.objects,
        map: &fixture.map,
        now_ms: fixture.now_ms,
        triggered: false,
    };
    let mut rng = GameRng::from_seed(7);
    let outcome = check_cast(&ctx, true, &mut rng).unwrap();
    assert_eq!(outcome.focus_object, Some(focus_entity));
}

#[test]
fn test_dead_target_refused_unless_allowed() {
    let mut fixture = Fixture::new();
    fixture.target_unit.current_health = 0.0;
    assert_eq!(fixture.check(true), Err(CastError::TargetsDead));

    fixture.def.attributes.allow_dead_target = true;
    assert!(fixture.check(true).is_ok());
}

#[test]
fn test_friendly_target_refused_for_enemy_spell() {
    let mut fixture = Fixture::new();
    fixture.target_unit.team = 1;
    assert_eq!(fixture.check(true), Err(CastError::TargetFriendly));
}

#[test]
fn test_stealthed_target_not_visible() {
    let mut fixture = Fixture::new();
    fixture.target_unit.stealthed = true;
    assert_eq!(fixture.check(true), Err(CastError::TargetInvisible));
}

#[test]
fn test_pet_variant_skips_commitment_checks() {
    use spellsim::spell::check::check_pet_cast;

    let mut fixture = Fixture::new();
    fixture.def.cast_time_ms = 2_000;
    fixture.caster_unit.is_moving = true;
    fixture.caster_unit.player_controlled = false;

    // The strict check refuses a moving caster...
    assert_eq!(fixture.check(true), Err(CastError::Moving));

    // ...but the automated-cast variant does not care about movement.
    let ctx = CheckContext {
        def: &fixture.def,
        spell: SpellId::FireBlast,
        targets: &fixture.targets,
        caster: CasterView {
            entity: Entity::from_raw(1),
            unit: &fixture.caster_unit,
            position: Vec3::ZERO,
            auras: None,
            cooldowns: &fixture.caster_cooldowns,
            inventory: None,
        },
        target: Some(TargetUnitView {
            entity: Entity::from_raw(2),
            unit: &fixture.target_unit,
            position: fixture.target_position,
            auras: None,
        }),
        objects: &fixture.objects,
        map: &fixture.map,
        now_ms: fixture.now_ms,
        triggered: false,
    };
    let mut rng = GameRng::from_seed(7);
    assert!(check_pet_cast(&ctx, &mut rng).is_ok());
}
