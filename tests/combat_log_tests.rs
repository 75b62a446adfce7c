//! Integration tests for combat log output
//!
//! These tests verify that:
//! - Cast lifecycle events produce well-formed log lines
//! - Damage lines follow the expected format (checked with regexes)
//! - The JSON export round-trips

use bevy::prelude::*;
use regex::Regex;

use spellsim::combat::log::{ScenarioMetadata, UnitSummary};
use spellsim::spell::cast::CurrentCasts;
use spellsim::spell::catalog::load_spell_catalog;
use spellsim::spell::events::CastRequested;
use spellsim::spell::targets::SpellTargets;
use spellsim::spell::{FixedSimTimestep, SpellPlugin};
use spellsim::world::unit::{ComboPoints, Cooldowns, Inventory, Unit};
use spellsim::world::GameRng;
use spellsim::{CombatLog, CombatLogEventType, SpellId};

fn run_fire_blast() -> Vec<(CombatLogEventType, String)> {
    let mut app = App::new();
    app.add_plugins(MinimalPlugins)
        .add_plugins(TransformPlugin)
        .insert_resource(FixedSimTimestep { step_ms: 50 })
        .insert_resource(GameRng::from_seed(9))
        .insert_resource(load_spell_catalog().expect("catalog loads"))
        .add_plugins(SpellPlugin);

    let mut mage = Unit::new("Mage", 1);
    mage.miss_chance = 0.0;
    mage.resist_chance = 0.0;
    let mut dummy = Unit::new("Dummy", 2);
    dummy.miss_chance = 0.0;
    dummy.resist_chance = 0.0;
    dummy.crit_chance = 0.0;

    let caster = app
        .world_mut()
        .spawn((
            mage,
            Transform::from_xyz(0.0, 0.0, 0.0),
            CurrentCasts::default(),
            Cooldowns::default(),
            ComboPoints::default(),
            Inventory::default(),
        ))
        .id();
    let target = app
        .world_mut()
        .spawn((
            dummy,
            Transform::from_xyz(10.0, 0.0, 0.0),
            CurrentCasts::default(),
            Cooldowns::default(),
            ComboPoints::default(),
            Inventory::default(),
        ))
        .id();

    {
        let mut log = app.world_mut().resource_mut::<CombatLog>();
        log.register_actor(caster, "Mage");
        log.register_actor(target, "Dummy");
    }

    app.world_mut().send_event(CastRequested {
        caster,
        spell: SpellId::FireBlast,
        targets: SpellTargets::on_unit(target),
        triggered: false,
        original_caster: None,
    });
    for _ in 0..4 {
        app.update();
    }

    app.world()
        .resource::<CombatLog>()
        .entries
        .iter()
        .map(|e| (e.event_type, e.message.clone()))
        .collect()
}

#[test]
fn test_cast_lifecycle_lines() {
    let entries = run_fire_blast();

    let start = Regex::new(r"^Mage begins casting FireBlast \(\d+ ms\)$").unwrap();
    assert!(
        entries
            .iter()
            .any(|(t, m)| *t == CombatLogEventType::CastStart && start.is_match(m)),
        "missing cast-start line in {:?}",
        entries
    );

    let success = Regex::new(r"^Mage casts FireBlast$").unwrap();
    assert!(entries
        .iter()
        .any(|(t, m)| *t == CombatLogEventType::CastSuccess && success.is_match(m)));
}

#[test]
fn test_damage_line_format() {
    let entries = run_fire_blast();

    let damage = Regex::new(r"^Mage's FireBlast hits Dummy for \d+ damage$").unwrap();
    assert!(
        entries
            .iter()
            .any(|(t, m)| *t == CombatLogEventType::Damage && damage.is_match(m)),
        "missing damage line in {:?}",
        entries
    );
}

#[test]
fn test_hit_outcome_line_format() {
    let entries = run_fire_blast();

    let outcome = Regex::new(r"^Mage's FireBlast -> Dummy: Hit$").unwrap();
    assert!(entries
        .iter()
        .any(|(t, m)| *t == CombatLogEventType::HitOutcome && outcome.is_match(m)));
}

#[test]
fn test_export_round_trips() {
    let metadata = ScenarioMetadata {
        scenario_name: "roundtrip".to_string(),
        arena_name: "BasicArena".to_string(),
        duration_ms: 1234,
        random_seed: Some(5),
        units: vec![UnitSummary {
            name: "Mage".to_string(),
            team: 1,
            max_health: 800.0,
            final_health: 800.0,
            survived: true,
        }],
    };

    let json = serde_json::to_string(&metadata).unwrap();
    let parsed: ScenarioMetadata = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed.scenario_name, "roundtrip");
    assert_eq!(parsed.units.len(), 1);
    assert_eq!(parsed.random_seed, Some(5));
}
