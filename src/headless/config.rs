//! JSON configuration parsing for headless scenarios
//!
//! A scenario describes the units in the arena, optional world objects, and
//! a script of timed cast requests to fire at them.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::spell::catalog::SpellId;
use crate::world::unit::{GameObjectKind, SkillKind};

/// Stat template for scenario units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Archetype {
    /// Mana pool, spell power, middling health.
    #[default]
    Caster,
    /// Mana pool, spell power, extra power regen.
    Healer,
    /// Rage, attack power, big health pool.
    Bruiser,
    /// Energy, attack power, light on health.
    Skirmisher,
}

/// One unit to spawn at scenario start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioUnit {
    pub name: String,
    /// Team identifier (1 or 2)
    pub team: u8,
    #[serde(default)]
    pub archetype: Archetype,
    pub position: [f32; 3],
    /// Facing yaw in radians (0 = +Z)
    #[serde(default)]
    pub facing: f32,
}

/// One world object to spawn at scenario start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioObject {
    pub kind: GameObjectKind,
    pub position: [f32; 3],
    /// Lock gate: (skill, required value)
    #[serde(default)]
    pub lock: Option<(SkillKind, u32)>,
}

/// One scripted cast request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptedCast {
    /// Simulated time at which the request fires.
    pub at_ms: u64,
    /// Index into the scenario's unit list.
    pub caster: usize,
    pub spell: SpellId,
    /// Unit-target index, if the spell takes one.
    #[serde(default)]
    pub target: Option<usize>,
    /// Destination, if the spell takes one.
    #[serde(default)]
    pub dest: Option<[f32; 3]>,
    /// Object-target index into the scenario's object list.
    #[serde(default)]
    pub object: Option<usize>,
}

fn default_max_duration() -> f32 {
    60.0
}

fn default_tick_ms() -> u64 {
    50
}

/// Headless scenario configuration loaded from JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioConfig {
    pub name: String,
    pub units: Vec<ScenarioUnit>,
    #[serde(default)]
    pub objects: Vec<ScenarioObject>,
    #[serde(default)]
    pub script: Vec<ScriptedCast>,
    /// Maximum scenario duration in seconds (default: 60)
    #[serde(default = "default_max_duration")]
    pub max_duration_secs: f32,
    /// Fixed simulation timestep per tick (default: 50 ms)
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
    /// Random seed for deterministic reproduction
    #[serde(default)]
    pub random_seed: Option<u64>,
    /// Custom output path for the combat log (optional)
    #[serde(default)]
    pub output_path: Option<String>,
}

impl ScenarioConfig {
    /// Load configuration from a JSON file
    pub fn load_from_file(path: &Path) -> Result<Self, String> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
        let config: ScenarioConfig = serde_json::from_str(&contents)
            .map_err(|e| format!("Failed to parse {}: {}", path.display(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Structural validation: script indices must reference real units.
    pub fn validate(&self) -> Result<(), String> {
        if self.units.is_empty() {
            return Err("Scenario has no units".to_string());
        }
        if self.tick_ms == 0 {
            return Err("tick_ms must be positive".to_string());
        }
        for (index, cast) in self.script.iter().enumerate() {
            if cast.caster >= self.units.len() {
                return Err(format!(
                    "Script entry {} references caster index {} (only {} units)",
                    index,
                    cast.caster,
                    self.units.len()
                ));
            }
            if let Some(target) = cast.target {
                if target >= self.units.len() {
                    return Err(format!(
                        "Script entry {} references target index {} (only {} units)",
                        index,
                        target,
                        self.units.len()
                    ));
                }
            }
            if let Some(object) = cast.object {
                if object >= self.objects.len() {
                    return Err(format!(
                        "Script entry {} references object index {} (only {} objects)",
                        index,
                        object,
                        self.objects.len()
                    ));
                }
            }
        }
        Ok(())
    }
}
