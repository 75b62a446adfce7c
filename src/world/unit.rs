//! Unit, item and game-object components
//!
//! The combat-relevant state of everything that can cast, be targeted, or be
//! consumed by a cast: units with health/power/stats, per-caster cooldown and
//! combo ledgers, inventories (reagents, equipped weapon class), and world
//! objects (spell focuses, lockable resource nodes).

use std::collections::HashMap;

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::spell::catalog::SpellId;

/// Resource pool a unit spends to cast (Mana, Energy, Rage).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PowerKind {
    /// Regenerates slowly over time. Casters start full.
    #[default]
    Mana,
    /// Regenerates rapidly. Caps low.
    Energy,
    /// Starts at 0, builds from dealing and taking damage.
    Rage,
}

/// Broad classification used by creature-type target masks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CreatureType {
    #[default]
    Humanoid,
    Beast,
    Undead,
    Elemental,
    Demon,
    Mechanical,
}

/// Gathering/utility skills consulted by lock checks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SkillKind {
    Herbalism,
    Mining,
    Lockpicking,
}

/// Stances/forms a unit can be in; spells may restrict which are allowed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stance {
    #[default]
    Normal,
    Battle,
    Defensive,
    Shadowform,
}

/// Item identifiers known to the engine (reagents and cast-target items).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItemId {
    ArcanePowder,
    SacredCandle,
    HealingHerb,
    DynamiteBundle,
    Lockpick,
    WornBlade,
}

/// Coarse item class for equipped-item requirements.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItemClass {
    Weapon,
    Consumable,
    Reagent,
    TradeGoods,
}

/// A stack of one item kind in an inventory.
#[derive(Clone, Debug)]
pub struct ItemStack {
    pub item: ItemId,
    pub class: ItemClass,
    pub count: u32,
    /// Per-item cooldown gate in simulated ms (0 = ready).
    pub ready_at_ms: u64,
}

/// What a unit is carrying. Reagent checks and item-targeted casts read this;
/// successful casts consume from it.
#[derive(Component, Default, Clone)]
pub struct Inventory {
    pub items: Vec<ItemStack>,
}

impl Inventory {
    pub fn count_of(&self, item: ItemId) -> u32 {
        self.items
            .iter()
            .filter(|s| s.item == item)
            .map(|s| s.count)
            .sum()
    }

    pub fn has(&self, item: ItemId, count: u32) -> bool {
        self.count_of(item) >= count
    }

    pub fn has_class(&self, class: ItemClass) -> bool {
        self.items.iter().any(|s| s.class == class && s.count > 0)
    }

    /// Remove `count` of `item`. Returns false (and removes nothing) if the
    /// inventory holds fewer than `count`.
    pub fn consume(&mut self, item: ItemId, count: u32) -> bool {
        if !self.has(item, count) {
            return false;
        }
        let mut remaining = count;
        for stack in self.items.iter_mut() {
            if stack.item != item || remaining == 0 {
                continue;
            }
            let taken = stack.count.min(remaining);
            stack.count -= taken;
            remaining -= taken;
        }
        self.items.retain(|s| s.count > 0);
        true
    }

    pub fn item_ready(&self, item: ItemId, now_ms: u64) -> bool {
        self.items
            .iter()
            .any(|s| s.item == item && s.ready_at_ms <= now_ms)
    }
}

/// Core unit component: everything the cast engine needs to know about a
/// combatant. Positions live on `Transform`; facing is kept here because the
/// engine only ever needs the yaw.
#[derive(Component, Clone)]
pub struct Unit {
    pub name: String,
    /// Team identifier (1 or 2); units on different teams are hostile.
    pub team: u8,
    pub level: u32,
    pub creature_type: CreatureType,
    pub max_health: f32,
    pub current_health: f32,
    pub power_kind: PowerKind,
    pub max_power: f32,
    pub current_power: f32,
    /// Power regenerated per second.
    pub power_regen: f32,
    /// Scales physical effect magnitudes.
    pub attack_power: f32,
    /// Scales magical effect and healing magnitudes.
    pub spell_power: f32,
    pub crit_chance: f32,
    /// Defender-side avoidance, consulted by the hit table.
    pub miss_chance: f32,
    pub dodge_chance: f32,
    pub parry_chance: f32,
    pub resist_chance: f32,
    pub deflect_chance: f32,
    /// Facing yaw in radians (0 = +Z), used by cone and forward-arc checks.
    pub facing: f32,
    /// Set by whatever drives movement; casts with a cast time abort on it.
    pub is_moving: bool,
    pub stealthed: bool,
    pub mounted: bool,
    pub stance: Stance,
    pub player_controlled: bool,
    /// Current selection, used as an implicit-target fallback.
    pub selection: Option<Entity>,
    /// Current auto-attack victim, second implicit-target fallback.
    pub attack_target: Option<Entity>,
    /// Home point for bind/recall style destination effects.
    pub bound_location: Option<Vec3>,
    pub pet: Option<Entity>,
    pub charm: Option<Entity>,
    /// Seconds between auto-attacks; the swing timer resets when a cast
    /// finishes successfully.
    pub attack_speed: f32,
    pub attack_timer: f32,
    pub skills: HashMap<SkillKind, u32>,
}

impl Unit {
    pub fn new(name: impl Into<String>, team: u8) -> Self {
        Self {
            name: name.into(),
            team,
            level: 60,
            creature_type: CreatureType::Humanoid,
            max_health: 1000.0,
            current_health: 1000.0,
            power_kind: PowerKind::Mana,
            max_power: 1000.0,
            current_power: 1000.0,
            power_regen: 20.0,
            attack_power: 100.0,
            spell_power: 100.0,
            crit_chance: 0.05,
            miss_chance: 0.05,
            dodge_chance: 0.05,
            parry_chance: 0.05,
            resist_chance: 0.04,
            deflect_chance: 0.0,
            facing: 0.0,
            is_moving: false,
            stealthed: false,
            mounted: false,
            stance: Stance::Normal,
            player_controlled: true,
            selection: None,
            attack_target: None,
            bound_location: None,
            pet: None,
            charm: None,
            attack_speed: 2.0,
            attack_timer: 0.0,
            skills: HashMap::new(),
        }
    }

    pub fn is_alive(&self) -> bool {
        self.current_health > 0.0
    }

    pub fn hostile_to(&self, other: &Unit) -> bool {
        self.team != other.team
    }

    pub fn friendly_to(&self, other: &Unit) -> bool {
        self.team == other.team
    }

    /// Whether this unit can currently be seen by `observer`. Stealth hides a
    /// unit from hostile observers only.
    pub fn visible_to(&self, observer: &Unit) -> bool {
        !(self.stealthed && self.hostile_to(observer))
    }

    pub fn missing_health(&self) -> f32 {
        (self.max_health - self.current_health).max(0.0)
    }

    pub fn has_power(&self, kind: PowerKind, amount: f32) -> bool {
        self.power_kind == kind && self.current_power >= amount
    }

    /// Debit power. The checker has already verified sufficiency; clamp at
    /// zero anyway so a stale ledger can't drive power negative.
    pub fn spend_power(&mut self, amount: f32) {
        self.current_power = (self.current_power - amount).max(0.0);
    }

    pub fn give_power(&mut self, amount: f32) {
        self.current_power = (self.current_power + amount).min(self.max_power);
    }

    /// Apply damage. Returns the health actually removed.
    pub fn take_damage(&mut self, amount: f32) -> f32 {
        debug_assert!(amount >= 0.0, "damage cannot be negative, got {}", amount);
        let actual = amount.min(self.current_health);
        self.current_health = (self.current_health - amount).max(0.0);
        actual
    }

    /// Apply healing. Returns the health actually restored.
    pub fn receive_heal(&mut self, amount: f32) -> f32 {
        debug_assert!(amount >= 0.0, "healing cannot be negative, got {}", amount);
        let actual = amount.min(self.missing_health());
        self.current_health = (self.current_health + amount).min(self.max_health);
        actual
    }

    pub fn skill_value(&self, skill: SkillKind) -> u32 {
        self.skills.get(&skill).copied().unwrap_or(0)
    }

    /// Validate unit invariants. Debug builds panic on violations.
    #[inline]
    pub fn debug_validate(&self) {
        debug_assert!(
            self.current_health >= 0.0 && self.current_health <= self.max_health,
            "unit health out of bounds: {}/{}",
            self.current_health,
            self.max_health
        );
        debug_assert!(
            self.current_power >= 0.0 && self.current_power <= self.max_power,
            "unit power out of bounds: {}/{}",
            self.current_power,
            self.max_power
        );
    }
}

/// Marker linking a summoned unit back to its owner.
#[derive(Component)]
pub struct Pet {
    pub owner: Entity,
}

/// Marks a unit that has left the world but is kept around for a grace
/// window so delayed missiles can account for it. Only effects explicitly
/// flagged as usable on departed targets may still land; everything else
/// skips the entry silently.
#[derive(Component)]
pub struct OutOfWorld {
    pub since_ms: u64,
}

/// Per-caster combo point ledger. Points are bound to one victim and consumed
/// by finishing spells.
#[derive(Component, Default, Clone, Copy)]
pub struct ComboPoints {
    pub target: Option<Entity>,
    pub count: u8,
}

impl ComboPoints {
    pub fn points_on(&self, target: Entity) -> u8 {
        if self.target == Some(target) {
            self.count
        } else {
            0
        }
    }

    pub fn clear(&mut self) {
        self.target = None;
        self.count = 0;
    }
}

/// Per-caster cooldown ledger: per-spell ready timestamps plus the global
/// cooldown, all in simulated milliseconds.
#[derive(Component, Default, Clone)]
pub struct Cooldowns {
    ready_at: HashMap<SpellId, u64>,
    global_until_ms: u64,
}

impl Cooldowns {
    pub fn is_ready(&self, spell: SpellId, now_ms: u64) -> bool {
        self.ready_at.get(&spell).copied().unwrap_or(0) <= now_ms
    }

    pub fn on_global_cooldown(&self, now_ms: u64) -> bool {
        self.global_until_ms > now_ms
    }

    pub fn start(&mut self, spell: SpellId, now_ms: u64, cooldown_ms: u64) {
        if cooldown_ms > 0 {
            self.ready_at.insert(spell, now_ms + cooldown_ms);
        }
    }

    pub fn trigger_global(&mut self, now_ms: u64, gcd_ms: u64) {
        if gcd_ms > 0 {
            self.global_until_ms = self.global_until_ms.max(now_ms + gcd_ms);
        }
    }

    /// Drop expired entries so the map doesn't grow for long-lived casters.
    pub fn prune(&mut self, now_ms: u64) {
        self.ready_at.retain(|_, ready| *ready > now_ms);
    }
}

/// Kinds of world objects a cast can reference or require.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GameObjectKind {
    /// Spell focus objects (a campfire, a moonwell); some casts require one
    /// nearby and capture it for later effect use.
    Campfire,
    Moonwell,
    /// Lockable resource nodes opened by gathering casts.
    HerbNode,
    OreNode,
    Chest,
    Door,
}

/// Skill gate on a lockable object.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct LockInfo {
    pub skill: SkillKind,
    pub required_value: u32,
}

/// A static world object. Position lives on `Transform`.
#[derive(Component)]
pub struct GameObject {
    pub kind: GameObjectKind,
    pub lock: Option<LockInfo>,
    /// Lockables flip to open once a gathering cast succeeds.
    pub open: bool,
}

impl GameObject {
    pub fn new(kind: GameObjectKind) -> Self {
        Self {
            kind,
            lock: None,
            open: false,
        }
    }

    pub fn locked(kind: GameObjectKind, skill: SkillKind, required_value: u32) -> Self {
        Self {
            kind,
            lock: Some(LockInfo {
                skill,
                required_value,
            }),
            open: false,
        }
    }
}
