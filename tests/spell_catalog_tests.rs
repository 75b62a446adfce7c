//! Unit tests for the spell catalog
//!
//! These tests verify that:
//! - The shipped spells.ron parses and passes structural validation
//! - All expected spells are present with sane values
//! - Selector and effect invariants hold for every definition

use spellsim::spell::catalog::{
    load_spell_catalog, EffectKind, SelectorKind, SpellCatalog, SpellId, EXPECTED_SPELLS,
};

/// Helper to load the shipped catalog for tests
fn load_catalog() -> SpellCatalog {
    load_spell_catalog().expect("spells.ron should load and validate")
}

#[test]
fn test_catalog_loads_and_validates() {
    let catalog = load_catalog();
    assert!(catalog.validate().is_ok());
    assert!(catalog.validate_definitions().is_ok());
    assert_eq!(catalog.len(), EXPECTED_SPELLS.len());
}

#[test]
fn test_all_spells_have_names() {
    let catalog = load_catalog();
    for spell in EXPECTED_SPELLS {
        let def = catalog.get_unchecked(spell);
        assert!(!def.name.is_empty(), "{:?} should have a name", spell);
    }
}

#[test]
fn test_all_spells_have_non_negative_ranges() {
    let catalog = load_catalog();
    for spell in EXPECTED_SPELLS {
        let def = catalog.get_unchecked(spell);
        assert!(
            def.range_max >= 0.0,
            "{:?} should have non-negative max range, got {}",
            spell,
            def.range_max
        );
        assert!(
            def.range_min >= 0.0 && def.range_min <= def.range_max.max(def.range_min),
            "{:?} has inconsistent min range {}",
            spell,
            def.range_min
        );
    }
}

#[test]
fn test_all_spells_declare_effects_within_cap() {
    let catalog = load_catalog();
    for spell in EXPECTED_SPELLS {
        let def = catalog.get_unchecked(spell);
        assert!(
            !def.effects.is_empty(),
            "{:?} should declare at least one effect",
            spell
        );
        assert!(
            def.effects.len() <= spellsim::spell::catalog::MAX_SPELL_EFFECTS,
            "{:?} declares too many effects",
            spell
        );
    }
}

#[test]
fn test_channeled_spells_have_no_cast_time() {
    let catalog = load_catalog();
    for spell in EXPECTED_SPELLS {
        let def = catalog.get_unchecked(spell);
        if def.channeled {
            assert_eq!(
                def.cast_time_ms, 0,
                "{:?} is channeled and must not also have a cast time",
                spell
            );
        }
    }
}

#[test]
fn test_aura_slots_carry_aura_specs() {
    let catalog = load_catalog();
    for spell in EXPECTED_SPELLS {
        let def = catalog.get_unchecked(spell);
        for (index, slot) in def.effects.iter().enumerate() {
            if slot.kind == EffectKind::ApplyAura {
                assert!(
                    slot.aura.is_some(),
                    "{:?} effect {} applies an aura without a spec",
                    spell,
                    index
                );
            }
        }
    }
}

#[test]
fn test_trigger_slots_name_triggered_spells() {
    let catalog = load_catalog();
    for spell in EXPECTED_SPELLS {
        let def = catalog.get_unchecked(spell);
        for slot in &def.effects {
            if slot.kind == EffectKind::TriggerSpell {
                let triggered = slot.trigger.expect("trigger slot names a spell");
                assert!(
                    catalog.get(triggered).is_some(),
                    "{:?} triggers unknown spell {:?}",
                    spell,
                    triggered
                );
            }
        }
    }
}

#[test]
fn test_chain_spells_are_damage_or_heal() {
    let catalog = load_catalog();
    for spell in EXPECTED_SPELLS {
        let def = catalog.get_unchecked(spell);
        for slot in &def.effects {
            if slot.chain_targets > 1 {
                assert!(
                    matches!(slot.kind, EffectKind::SchoolDamage | EffectKind::Heal),
                    "{:?} chains a non-damage, non-heal effect",
                    spell
                );
            }
        }
    }
}

#[test]
fn test_trajectory_spells_take_destinations() {
    let catalog = load_catalog();
    for spell in EXPECTED_SPELLS {
        let def = catalog.get_unchecked(spell);
        for slot in &def.effects {
            if slot.target_a.kind == SelectorKind::Trajectory {
                assert!(
                    def.needs_dest,
                    "{:?} sweeps a trajectory but takes no destination",
                    spell
                );
            }
        }
    }
}

#[test]
fn test_known_spell_values() {
    let catalog = load_catalog();

    let frostbolt = catalog.get_unchecked(SpellId::Frostbolt);
    assert_eq!(frostbolt.cast_time_ms, 2500);
    assert!(frostbolt.speed > 0.0);
    assert_eq!(frostbolt.effects.len(), 2);

    let drain = catalog.get_unchecked(SpellId::DrainLife);
    assert!(drain.channeled);
    assert_eq!(drain.channel_duration_ms, 5000);

    let blast = catalog.get_unchecked(SpellId::DynamiteBlast);
    assert!(blast.attributes.is_triggered_only);
}

#[test]
fn test_get_unknown_spell_returns_none_gracefully() {
    let catalog = load_catalog();
    // Every expected spell resolves; get() never panics.
    for spell in EXPECTED_SPELLS {
        assert!(catalog.get(spell).is_some());
    }
}
