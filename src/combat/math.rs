//! Combat math
//!
//! The hit-table and magnitude collaborator. Everything here is a pure
//! function of its inputs plus the injected RNG; the cast engine owns the
//! control flow around these rolls (reflect bounces, immunity, diminishing
//! returns) but never the dice themselves.

use serde::{Deserialize, Serialize};

use crate::spell::catalog::{ScalingStat, SpellSchool};
use crate::world::GameRng;

/// Base chance for any spell to miss outright.
pub const BASE_MISS_CHANCE: f32 = 0.05;

/// Damage multiplier on a critical hit.
pub const CRIT_DAMAGE_MULTIPLIER: f32 = 2.0;

/// Healing multiplier on a critical heal.
pub const CRIT_HEALING_MULTIPLIER: f32 = 1.5;

/// Outcome of the combined hit determination for one target.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum HitResult {
    Hit,
    Miss,
    Resist,
    Dodge,
    Parry,
    Deflect,
    Immune,
    Reflect,
}

impl HitResult {
    pub fn is_hit(&self) -> bool {
        matches!(self, HitResult::Hit)
    }
}

/// Defender-side chances consulted by the hit table. Built from the target's
/// stats at resolution time.
#[derive(Clone, Copy, Debug, Default)]
pub struct HitTableInputs {
    pub miss: f32,
    pub dodge: f32,
    pub parry: f32,
    pub resist: f32,
    pub deflect: f32,
    /// Target has a spell-reflection charge available.
    pub can_reflect: bool,
}

/// Roll the combined hit table: one roll walks the cumulative segments, so
/// the individual chances never compete with each other.
///
/// Physical spells can be dodged/parried; magic can be resisted/deflected.
/// Reflection is checked only after the spell would otherwise land, and only
/// for reflectable (non-physical) spells - the caller is responsible for
/// consuming the reflect charge.
pub fn roll_hit_table(
    school: SpellSchool,
    inputs: &HitTableInputs,
    rng: &mut GameRng,
) -> HitResult {
    let roll = rng.random_f32();
    let physical = school == SpellSchool::Physical;

    let mut threshold = inputs.miss;
    if roll < threshold {
        return HitResult::Miss;
    }

    if physical {
        threshold += inputs.dodge;
        if roll < threshold {
            return HitResult::Dodge;
        }
        threshold += inputs.parry;
        if roll < threshold {
            return HitResult::Parry;
        }
    } else {
        threshold += inputs.resist;
        if roll < threshold {
            return HitResult::Resist;
        }
        threshold += inputs.deflect;
        if roll < threshold {
            return HitResult::Deflect;
        }
    }

    if inputs.can_reflect && !physical {
        return HitResult::Reflect;
    }

    HitResult::Hit
}

/// Roll a critical strike check. Returns true if the roll is a crit.
pub fn roll_crit(crit_chance: f32, rng: &mut GameRng) -> bool {
    rng.random_f32() < crit_chance
}

/// Roll an effect magnitude: random base in `[base_min, base_max)` plus stat
/// scaling plus combo-point bonus.
#[allow(clippy::too_many_arguments)]
pub fn roll_magnitude(
    base_min: f32,
    base_max: f32,
    scaling: ScalingStat,
    coefficient: f32,
    attack_power: f32,
    spell_power: f32,
    combo_points: u8,
    per_combo_bonus: f32,
    rng: &mut GameRng,
) -> f32 {
    let base = if base_max > base_min {
        rng.random_range(base_min, base_max)
    } else {
        base_min
    };
    let stat_value = match scaling {
        ScalingStat::AttackPower => attack_power,
        ScalingStat::SpellPower => spell_power,
        ScalingStat::None => 0.0,
    };
    base + stat_value * coefficient + combo_points as f32 * per_combo_bonus
}
