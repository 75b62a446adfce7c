//! Data-Driven Spell Catalog
//!
//! Spell definitions are loaded from `assets/config/spells.ron` instead of
//! being hardcoded in Rust.
//!
//! ## Benefits
//! - Balance changes don't require recompilation
//! - Easier to review and modify spell values
//! - Validates all spells exist at startup
//!
//! The catalog is read-only at runtime: the cast engine receives it as an
//! injected resource and never mutates a definition.

use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::spell::diminishing::DiminishGroup;
use crate::world::auras::AuraKind;
use crate::world::unit::{
    CreatureType, GameObjectKind, ItemClass, ItemId, PowerKind, SkillKind, Stance,
};

/// Hard cap on effect slots per spell definition.
pub const MAX_SPELL_EFFECTS: usize = 3;

/// Spell schools - determine lockouts, resistibility and reflectability.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum SpellSchool {
    /// Physical effects (weapon strikes, thrown objects)
    Physical,
    Frost,
    Fire,
    Arcane,
    Shadow,
    Holy,
    Nature,
    /// No spell school (can't be locked out)
    None,
}

/// Crowd-control mechanic carried by a spell or effect slot, consulted by
/// immunity grants.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default, Serialize, Deserialize)]
pub enum Mechanic {
    #[default]
    None,
    Stun,
    Root,
    Silence,
    Fear,
    Snare,
    Charm,
}

/// What stat an effect's magnitude scales with.
#[derive(Clone, Copy, PartialEq, Debug, Default, Serialize, Deserialize)]
pub enum ScalingStat {
    /// Scales with Attack Power (physical effects)
    AttackPower,
    /// Scales with Spell Power (magical effects and healing)
    SpellPower,
    /// Doesn't scale with any stat (CC, utility)
    #[default]
    None,
}

/// Enum of all spells the engine knows.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum SpellId {
    FireBlast,
    Frostbolt,
    ChainLightning,
    ChainHeal,
    ArcaneExplosion,
    Shockwave,
    Blink,
    SummonImp,
    Counterspell,
    Purge,
    DrainLife,
    ArcaneMissiles,
    HammerOfJustice,
    EntanglingRoots,
    PsychicScream,
    GreaterHeal,
    GatherHerbs,
    ThrowDynamite,
    DynamiteBlast,
    MultiShot,
    SpellReflection,
}

/// How a spell's effect slots pick their targets.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
pub enum SelectorKind {
    /// Slot declares no targeting of its own.
    #[default]
    None,
    /// The caster itself.
    Caster,
    /// The explicit unit/item/object target supplied by the initiator.
    Explicit,
    /// Single closest entity within the slot radius satisfying the check.
    Nearby,
    /// Angular sector in front of the caster.
    Cone,
    /// All entities within the slot radius of the reference point.
    Area,
    /// The entity/point currently being channeled at.
    Channel,
    /// Computes a concrete position relative to the reference.
    Point,
    /// Entities intersected by the missile arc between source and dest.
    Trajectory,
}

/// Reference point an area/point selector measures from.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
pub enum SelectorReference {
    #[default]
    Caster,
    /// The explicit unit target.
    Target,
    /// The target set's source position.
    Source,
    /// The target set's destination position.
    Dest,
    /// The last successfully resolved target of a previous slot.
    Last,
}

/// Hostility predicate a selector applies to candidates.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
pub enum TargetCheck {
    /// Harmful slots treat this as Enemy, beneficial slots as Ally.
    #[default]
    Default,
    Enemy,
    Ally,
    /// Restrict by creature type (`required_creature` on the slot). Falls
    /// back to the Enemy predicate when no creature type is configured.
    Entry,
    /// The caster's summoned pet.
    Pet,
}

/// Direction for `Point` selectors.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
pub enum PointDirection {
    #[default]
    None,
    Front,
    Behind,
    Left,
    Right,
    /// A uniformly random direction.
    Random,
    /// The caster's bound (home) location, ignoring reference and radius.
    Bound,
}

/// One target-selection descriptor (a spell effect declares a pair of them).
#[derive(Clone, Copy, PartialEq, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetSelector {
    pub kind: SelectorKind,
    pub reference: SelectorReference,
    pub check: TargetCheck,
    pub direction: PointDirection,
}

impl TargetSelector {
    pub fn is_none(&self) -> bool {
        self.kind == SelectorKind::None
    }
}

/// The behavior unit an effect slot invokes.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum EffectKind {
    SchoolDamage,
    WeaponDamage,
    Heal,
    Energize,
    ApplyAura,
    Dispel,
    Interrupt,
    Summon,
    Teleport,
    OpenLock,
    TriggerSpell,
    Dummy,
}

impl EffectKind {
    /// Whether this effect is hostile toward its target by default.
    pub fn is_harmful(&self) -> bool {
        matches!(
            self,
            EffectKind::SchoolDamage
                | EffectKind::WeaponDamage
                | EffectKind::Dispel
                | EffectKind::Interrupt
        )
    }
}

/// Aura payload for `ApplyAura` effect slots.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct AuraSpec {
    pub kind: AuraKind,
    /// Duration in ms; 0 = until removed.
    #[serde(default)]
    pub duration_ms: u64,
    /// Tick period for periodic kinds.
    #[serde(default)]
    pub amplitude_ms: u64,
    #[serde(default)]
    pub magnitude: f32,
    #[serde(default)]
    pub charges: u32,
    /// School payload override (immunity grants, lockouts).
    #[serde(default)]
    pub school_override: Option<SpellSchool>,
    /// Mechanic payload override (mechanic immunity grants).
    #[serde(default)]
    pub mechanic_override: Option<Mechanic>,
}

/// Skill gate for `OpenLock` effect slots.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct LockRequirement {
    pub skill: SkillKind,
    pub value: u32,
}

/// One effect slot of a spell definition.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EffectSlot {
    pub kind: EffectKind,
    /// Primary target selector.
    #[serde(default)]
    pub target_a: TargetSelector,
    /// Secondary target selector.
    #[serde(default)]
    pub target_b: TargetSelector,

    // === Magnitude ===
    #[serde(default)]
    pub base_min: f32,
    #[serde(default)]
    pub base_max: f32,
    #[serde(default)]
    pub scaling: ScalingStat,
    #[serde(default)]
    pub coefficient: f32,
    /// Extra magnitude per combo point spent (finishing moves).
    #[serde(default)]
    pub per_combo_bonus: f32,

    // === Geometry ===
    #[serde(default)]
    pub radius: f32,
    #[serde(default)]
    pub cone_angle_deg: f32,
    /// Total chain targets including the primary (>1 enables chaining).
    #[serde(default)]
    pub chain_targets: u32,
    /// Cap on affected entities; candidate lists above it are truncated by
    /// uniform random selection. 0 = uncapped.
    #[serde(default)]
    pub max_affected: u32,

    // === Behavior payloads ===
    /// Mechanic override; `None` falls back to the spell-wide mechanic.
    #[serde(default)]
    pub mechanic: Mechanic,
    #[serde(default)]
    pub aura: Option<AuraSpec>,
    #[serde(default)]
    pub trigger: Option<SpellId>,
    #[serde(default)]
    pub lock: Option<LockRequirement>,
    /// Power pool an `Energize` effect fills.
    #[serde(default)]
    pub power_kind: PowerKind,
    /// Condition list for `Entry` checks.
    #[serde(default)]
    pub required_creature: Option<CreatureType>,
    /// Effect may still land on a target that left the world in flight.
    #[serde(default)]
    pub usable_on_departed: bool,
}

impl EffectSlot {
    pub fn has_magnitude(&self) -> bool {
        self.base_max > 0.0 || self.base_min > 0.0 || self.coefficient > 0.0
    }

    /// Mechanic this slot carries, falling back to the spell's.
    pub fn mechanic_or(&self, spell_mechanic: Mechanic) -> Mechanic {
        if self.mechanic != Mechanic::None {
            self.mechanic
        } else {
            spell_mechanic
        }
    }
}

/// Which explicit unit target a spell demands from the initiator.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
pub enum ExplicitUnitRequirement {
    #[default]
    None,
    Enemy,
    Ally,
    Any,
}

/// Named attribute flags controlling targeting, checks and reporting.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SpellAttributes {
    pub ignore_line_of_sight: bool,
    pub usable_while_moving: bool,
    pub requires_stealth: bool,
    pub breaks_stealth: bool,
    pub allow_dead_target: bool,
    pub only_outdoors: bool,
    pub only_indoors: bool,
    pub not_in_arena: bool,
    pub cant_be_reflected: bool,
    /// Chain jumps may leave the caster's forward arc.
    pub far_jump_chain: bool,
    /// One missile for all targets: every ledger entry lands at the first
    /// impact re-entry instead of per-target delays.
    pub single_missile: bool,
    /// Failures are not reported to the initiator (automated casts).
    pub dont_report_failure: bool,
    /// Only castable as a triggered effect of another spell.
    pub is_triggered_only: bool,
    /// Consumes the caster's combo points on a successful finish.
    pub finishing_move: bool,
}

fn default_gcd() -> u64 {
    crate::spell::constants::GCD_MS
}

fn default_true() -> bool {
    true
}

fn default_school() -> SpellSchool {
    SpellSchool::None
}

/// Complete spell definition loaded from RON.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SpellDefinition {
    /// Display name of the spell
    pub name: String,
    #[serde(default = "default_school")]
    pub school: SpellSchool,
    #[serde(default)]
    pub mechanic: Mechanic,
    #[serde(default)]
    pub dr_group: DiminishGroup,

    // === Explicit target requirements ===
    #[serde(default)]
    pub explicit_unit: ExplicitUnitRequirement,
    #[serde(default)]
    pub needs_dest: bool,
    #[serde(default)]
    pub needs_object: bool,
    #[serde(default)]
    pub needs_item: bool,
    /// Creature types a unit target must be one of (empty = any).
    #[serde(default)]
    pub creature_type_mask: Vec<CreatureType>,

    // === Casting ===
    /// Cast time in ms (0 = instant)
    #[serde(default)]
    pub cast_time_ms: u64,
    #[serde(default)]
    pub channeled: bool,
    /// Channel length in ms; 0 = unbounded when `channeled`.
    #[serde(default)]
    pub channel_duration_ms: u64,
    #[serde(default)]
    pub range_min: f32,
    /// Maximum range in units
    pub range_max: f32,
    /// Missile propagation speed in units/second (0 = instant effect)
    #[serde(default)]
    pub speed: f32,

    // === Costs & cooldowns ===
    #[serde(default)]
    pub power_kind: PowerKind,
    #[serde(default)]
    pub power_cost: f32,
    #[serde(default)]
    pub cooldown_ms: u64,
    #[serde(default = "default_gcd")]
    pub gcd_ms: u64,
    #[serde(default)]
    pub reagents: Vec<(ItemId, u32)>,
    #[serde(default)]
    pub equipped_item_class: Option<ItemClass>,
    /// Stances the caster must be in (empty = any).
    #[serde(default)]
    pub allowed_stances: Vec<Stance>,
    /// Nearby focus object required and captured at check time.
    #[serde(default)]
    pub spell_focus: Option<GameObjectKind>,

    // === Interrupts ===
    /// Movement aborts the preparation phase.
    #[serde(default = "default_true")]
    pub interrupt_on_movement: bool,

    #[serde(default)]
    pub attributes: SpellAttributes,

    pub effects: Vec<EffectSlot>,
}

impl SpellDefinition {
    /// Bitmask with one bit per declared effect slot.
    pub fn declared_effect_mask(&self) -> u8 {
        ((1u16 << self.effects.len()) - 1) as u8
    }

    pub fn is_channeled(&self) -> bool {
        self.channeled
    }

    pub fn has_effect(&self, kind: EffectKind) -> bool {
        self.effects.iter().any(|e| e.kind == kind)
    }

    /// A spell is harmful when it demands an enemy target or carries any
    /// harmful effect slot.
    pub fn is_harmful(&self) -> bool {
        self.explicit_unit == ExplicitUnitRequirement::Enemy
            || self.effects.iter().any(|e| e.kind.is_harmful())
    }

    /// Whether one of this spell's own effect slots grants immunity to the
    /// given mechanic. Consulted when escalating caster-state failures: a
    /// spell that grants stun immunity is not itself blocked by a stun.
    pub fn grants_immunity_to(&self, mechanic: Mechanic) -> bool {
        self.effects.iter().any(|e| {
            e.kind == EffectKind::ApplyAura
                && e.aura.map_or(false, |a| {
                    a.kind == AuraKind::MechanicImmunity
                        && a.mechanic_override == Some(mechanic)
                })
        })
    }

    /// Max range with the post-cast leeway applied when `strict` is false.
    pub fn effective_max_range(&self, strict: bool) -> f32 {
        if strict {
            self.range_max
        } else {
            self.range_max + crate::spell::constants::RANGE_CHECK_LEEWAY
        }
    }
}

/// Root structure for the spells.ron file
#[derive(Debug, Serialize, Deserialize)]
pub struct SpellsConfig {
    pub spells: HashMap<SpellId, SpellDefinition>,
}

/// Resource containing all spell definitions.
///
/// Loaded from `assets/config/spells.ron` at startup.
/// Access via `Res<SpellCatalog>` in systems.
#[derive(Resource)]
pub struct SpellCatalog {
    definitions: HashMap<SpellId, SpellDefinition>,
}

impl Default for SpellCatalog {
    /// Load spell definitions from the default config file.
    /// Panics if the file cannot be loaded - use for tests only.
    fn default() -> Self {
        load_spell_catalog().expect("Failed to load spell catalog in Default impl")
    }
}

/// Every spell the engine expects the config to define.
pub const EXPECTED_SPELLS: [SpellId; 21] = [
    SpellId::FireBlast,
    SpellId::Frostbolt,
    SpellId::ChainLightning,
    SpellId::ChainHeal,
    SpellId::ArcaneExplosion,
    SpellId::Shockwave,
    SpellId::Blink,
    SpellId::SummonImp,
    SpellId::Counterspell,
    SpellId::Purge,
    SpellId::DrainLife,
    SpellId::ArcaneMissiles,
    SpellId::HammerOfJustice,
    SpellId::EntanglingRoots,
    SpellId::PsychicScream,
    SpellId::GreaterHeal,
    SpellId::GatherHerbs,
    SpellId::ThrowDynamite,
    SpellId::DynamiteBlast,
    SpellId::MultiShot,
    SpellId::SpellReflection,
];

impl SpellCatalog {
    /// Create from a loaded config
    pub fn new(config: SpellsConfig) -> Self {
        Self {
            definitions: config.spells,
        }
    }

    /// Get the definition for a spell
    pub fn get(&self, spell: SpellId) -> Option<&SpellDefinition> {
        self.definitions.get(&spell)
    }

    /// Get the definition for a spell, panicking if not found.
    /// Use this when you know the spell must exist (validated at startup).
    pub fn get_unchecked(&self, spell: SpellId) -> &SpellDefinition {
        self.definitions
            .get(&spell)
            .unwrap_or_else(|| panic!("Spell {:?} not found in catalog", spell))
    }

    /// Check if all expected spells are defined
    pub fn validate(&self) -> Result<(), Vec<SpellId>> {
        let missing: Vec<SpellId> = EXPECTED_SPELLS
            .into_iter()
            .filter(|spell| !self.definitions.contains_key(spell))
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(missing)
        }
    }

    /// Structural validation of every definition.
    pub fn validate_definitions(&self) -> Result<(), String> {
        for (id, def) in &self.definitions {
            if def.effects.is_empty() {
                return Err(format!("{:?} declares no effect slots", id));
            }
            if def.effects.len() > MAX_SPELL_EFFECTS {
                return Err(format!(
                    "{:?} declares {} effect slots (max {})",
                    id,
                    def.effects.len(),
                    MAX_SPELL_EFFECTS
                ));
            }
            if def.channeled && def.cast_time_ms > 0 {
                return Err(format!("{:?} is channeled but has a cast time", id));
            }
            if !def.channeled && def.channel_duration_ms > 0 {
                return Err(format!(
                    "{:?} has a channel duration but is not channeled",
                    id
                ));
            }
            for (index, slot) in def.effects.iter().enumerate() {
                if slot.chain_targets > 1
                    && !matches!(slot.kind, EffectKind::SchoolDamage | EffectKind::Heal)
                {
                    return Err(format!(
                        "{:?} effect {} chains but is not damage or heal",
                        id, index
                    ));
                }
                if matches!(
                    slot.kind,
                    EffectKind::SchoolDamage | EffectKind::WeaponDamage | EffectKind::Heal
                ) && !slot.has_magnitude()
                {
                    return Err(format!("{:?} effect {} has no magnitude", id, index));
                }
                if slot.kind == EffectKind::ApplyAura && slot.aura.is_none() {
                    return Err(format!(
                        "{:?} effect {} applies an aura but has no aura spec",
                        id, index
                    ));
                }
                if slot.kind == EffectKind::TriggerSpell && slot.trigger.is_none() {
                    return Err(format!(
                        "{:?} effect {} triggers a spell but names none",
                        id, index
                    ));
                }
                if slot.target_a.kind == SelectorKind::Trajectory && !def.needs_dest {
                    return Err(format!(
                        "{:?} effect {} uses a trajectory but the spell takes no destination",
                        id, index
                    ));
                }
            }
        }
        Ok(())
    }

    /// Get all spells that are defined
    pub fn spell_ids(&self) -> impl Iterator<Item = &SpellId> {
        self.definitions.keys()
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

/// Load spell definitions from assets/config/spells.ron
pub fn load_spell_catalog() -> Result<SpellCatalog, String> {
    load_spell_catalog_from("assets/config/spells.ron")
}

/// Load spell definitions from an explicit path (used by tests).
pub fn load_spell_catalog_from(config_path: &str) -> Result<SpellCatalog, String> {
    let contents = std::fs::read_to_string(config_path)
        .map_err(|e| format!("Failed to read {}: {}", config_path, e))?;

    let config: SpellsConfig = ron::from_str(&contents)
        .map_err(|e| format!("Failed to parse {}: {}", config_path, e))?;

    let catalog = SpellCatalog::new(config);

    catalog
        .validate()
        .map_err(|missing| format!("Missing spell definitions: {:?}", missing))?;
    catalog.validate_definitions()?;

    info!(
        "Loaded {} spell definitions from {}",
        catalog.len(),
        config_path
    );

    Ok(catalog)
}

/// Bevy plugin for spell catalog loading
pub struct SpellCatalogPlugin;

impl Plugin for SpellCatalogPlugin {
    fn build(&self, app: &mut App) {
        match load_spell_catalog() {
            Ok(catalog) => {
                app.insert_resource(catalog);
            }
            Err(e) => {
                // Panic to ensure config is always valid at startup.
                panic!("Failed to load spell catalog: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bare_slot(kind: EffectKind) -> EffectSlot {
        EffectSlot {
            kind,
            target_a: TargetSelector::default(),
            target_b: TargetSelector::default(),
            base_min: 0.0,
            base_max: 0.0,
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

    fn bare_def(effects: Vec<EffectSlot>) -> SpellDefinition {
        SpellDefinition {
            name: "Test".to_string(),
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
            effects,
        }
    }

    #[test]
    fn test_declared_effect_mask() {
        let def = bare_def(vec![
            bare_slot(EffectKind::SchoolDamage),
            bare_slot(EffectKind::ApplyAura),
        ]);
        assert_eq!(def.declared_effect_mask(), 0b11);
    }

    #[test]
    fn test_harmful_detection() {
        let damage = bare_def(vec![bare_slot(EffectKind::SchoolDamage)]);
        assert!(damage.is_harmful());

        let heal = bare_def(vec![bare_slot(EffectKind::Heal)]);
        assert!(!heal.is_harmful());
    }

    #[test]
    fn test_grants_immunity_to() {
        let mut slot = bare_slot(EffectKind::ApplyAura);
        slot.aura = Some(AuraSpec {
            kind: AuraKind::MechanicImmunity,
            duration_ms: 5_000,
            amplitude_ms: 0,
            magnitude: 0.0,
            charges: 0,
            school_override: None,
            mechanic_override: Some(Mechanic::Fear),
        });
        let def = bare_def(vec![slot]);

        assert!(def.grants_immunity_to(Mechanic::Fear));
        assert!(!def.grants_immunity_to(Mechanic::Stun));
    }

    #[test]
    fn test_mechanic_fallback() {
        let mut slot = bare_slot(EffectKind::ApplyAura);
        assert_eq!(slot.mechanic_or(Mechanic::Stun), Mechanic::Stun);
        slot.mechanic = Mechanic::Root;
        assert_eq!(slot.mechanic_or(Mechanic::Stun), Mechanic::Root);
    }
}
