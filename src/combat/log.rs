//! Combat logging
//!
//! Records cast lifecycle and hit resolution events for post-run analysis,
//! and exports them as JSON alongside scenario metadata.

use std::collections::HashMap;

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::combat::math::HitResult;
use crate::spell::catalog::SpellId;
use crate::spell::check::CastError;

/// A single entry in the combat log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CombatLogEntry {
    /// Timestamp in simulated milliseconds since scenario start
    pub timestamp_ms: u64,
    /// The type of event
    pub event_type: CombatLogEventType,
    /// Human-readable description of the event
    pub message: String,
}

/// Types of combat log events for filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CombatLogEventType {
    /// A cast began its preparation phase
    CastStart,
    /// A cast launched its effects
    CastSuccess,
    /// A cast was refused by the precondition checker
    CastFailed,
    /// An in-flight cast was interrupted or cancelled
    Interrupted,
    /// Channel progress update
    Channel,
    /// Hit table outcome for one target
    HitOutcome,
    /// Damage dealt
    Damage,
    /// Healing done
    Healing,
    /// Buff/debuff applied
    AuraApplied,
    /// Buff/debuff removed or dispelled
    AuraRemoved,
    /// Diminishing returns reduced or blocked an application
    Diminished,
    /// Proc notification batch
    Proc,
    /// A unit died
    Death,
    /// Scenario event (start, end, summon, teleport, ...)
    Event,
}

/// The combat log resource storing all events
#[derive(Resource, Default)]
pub struct CombatLog {
    /// All log entries in chronological order
    pub entries: Vec<CombatLogEntry>,
    /// Current simulated time in ms, advanced by the clock system
    pub now_ms: u64,
    /// Display names for entities, registered at spawn time
    names: HashMap<Entity, String>,
}

impl CombatLog {
    /// Clear the log for a new run
    pub fn clear(&mut self) {
        self.entries.clear();
        self.names.clear();
        self.now_ms = 0;
    }

    /// Register a display name for an entity.
    pub fn register_actor(&mut self, entity: Entity, name: impl Into<String>) {
        self.names.insert(entity, name.into());
    }

    pub fn name_of(&self, entity: Entity) -> &str {
        self.names
            .get(&entity)
            .map(String::as_str)
            .unwrap_or("Unknown")
    }

    fn name_of_opt(&self, entity: Option<Entity>) -> &str {
        match entity {
            Some(e) => self.name_of(e),
            None => "Unknown",
        }
    }

    /// Add a new entry to the log
    pub fn log(&mut self, event_type: CombatLogEventType, message: String) {
        self.entries.push(CombatLogEntry {
            timestamp_ms: self.now_ms,
            event_type,
            message,
        });
    }

    pub fn log_cast_start(&mut self, caster: Entity, spell: SpellId, cast_time_ms: u64) {
        let message = format!(
            "{} begins casting {:?} ({} ms)",
            self.name_of(caster),
            spell,
            cast_time_ms
        );
        self.log(CombatLogEventType::CastStart, message);
    }

    pub fn log_cast_success(&mut self, caster: Entity, spell: SpellId) {
        let message = format!("{} casts {:?}", self.name_of(caster), spell);
        self.log(CombatLogEventType::CastSuccess, message);
    }

    pub fn log_cast_failed(&mut self, caster: Entity, spell: SpellId, error: &CastError) {
        let message = format!(
            "{} fails to cast {:?}: {:?}",
            self.name_of(caster),
            spell,
            error
        );
        self.log(CombatLogEventType::CastFailed, message);
    }

    pub fn log_interrupted(&mut self, caster: Entity, spell: SpellId) {
        let message = format!("{}'s {:?} is interrupted", self.name_of(caster), spell);
        self.log(CombatLogEventType::Interrupted, message);
    }

    pub fn log_hit_outcome(
        &mut self,
        caster: Entity,
        target: Entity,
        spell: SpellId,
        outcome: HitResult,
    ) {
        let message = format!(
            "{}'s {:?} -> {}: {:?}",
            self.name_of(caster),
            spell,
            self.name_of(target),
            outcome
        );
        self.log(CombatLogEventType::HitOutcome, message);
    }

    pub fn log_damage(
        &mut self,
        caster: Option<Entity>,
        target: Entity,
        spell: SpellId,
        amount: f32,
        killing_blow: bool,
        periodic: bool,
    ) {
        let verb = if periodic { "ticks" } else { "hits" };
        let mut message = format!(
            "{}'s {:?} {} {} for {:.0} damage",
            self.name_of_opt(caster),
            spell,
            verb,
            self.name_of(target),
            amount
        );
        if killing_blow {
            message.push_str(" (killing blow)");
        }
        self.log(CombatLogEventType::Damage, message);
    }

    pub fn log_healing(
        &mut self,
        caster: Option<Entity>,
        target: Entity,
        spell: SpellId,
        amount: f32,
        periodic: bool,
    ) {
        let verb = if periodic { "restores" } else { "heals" };
        let message = format!(
            "{}'s {:?} {} {} for {:.0}",
            self.name_of_opt(caster),
            spell,
            verb,
            self.name_of(target),
            amount
        );
        self.log(CombatLogEventType::Healing, message);
    }

    pub fn log_aura_applied(&mut self, target: Entity, spell: SpellId, duration_ms: u64) {
        let message = format!(
            "{} is afflicted by {:?} ({} ms)",
            self.name_of(target),
            spell,
            duration_ms
        );
        self.log(CombatLogEventType::AuraApplied, message);
    }

    pub fn log_diminished(&mut self, target: Entity, spell: SpellId, multiplier: f32) {
        let message = if multiplier <= 0.0 {
            format!(
                "{} is immune to {:?} (diminishing returns)",
                self.name_of(target),
                spell
            )
        } else {
            format!(
                "{:?} on {} diminished to {:.0}% duration",
                spell,
                self.name_of(target),
                multiplier * 100.0
            )
        };
        self.log(CombatLogEventType::Diminished, message);
    }

    /// Get entries filtered by event type
    pub fn filter_by_type(&self, event_type: CombatLogEventType) -> Vec<&CombatLogEntry> {
        self.entries
            .iter()
            .filter(|e| e.event_type == event_type)
            .collect()
    }

    /// Get the last N entries
    pub fn recent(&self, count: usize) -> Vec<&CombatLogEntry> {
        self.entries.iter().rev().take(count).rev().collect()
    }

    /// Serialize the log plus scenario metadata and write it to `path`.
    /// Returns the path written.
    pub fn save_to_file(
        &self,
        metadata: &ScenarioMetadata,
        path: Option<&str>,
    ) -> Result<String, String> {
        let filename = path.map(String::from).unwrap_or_else(|| {
            format!(
                "spellsim_log_{}.json",
                metadata.scenario_name.replace(' ', "_")
            )
        });

        let export = CombatLogExport {
            metadata: metadata.clone(),
            entries: self.entries.clone(),
        };

        let json = serde_json::to_string_pretty(&export)
            .map_err(|e| format!("Failed to serialize combat log: {}", e))?;
        std::fs::write(&filename, json)
            .map_err(|e| format!("Failed to write {}: {}", filename, e))?;

        Ok(filename)
    }
}

/// Final state of one unit, captured for the log export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitSummary {
    pub name: String,
    pub team: u8,
    pub max_health: f32,
    pub final_health: f32,
    pub survived: bool,
}

/// Scenario metadata attached to a saved combat log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioMetadata {
    pub scenario_name: String,
    pub arena_name: String,
    pub duration_ms: u64,
    pub random_seed: Option<u64>,
    pub units: Vec<UnitSummary>,
}

#[derive(Serialize, Deserialize)]
struct CombatLogExport {
    metadata: ScenarioMetadata,
    entries: Vec<CombatLogEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_entries_carry_current_time() {
        let mut log = CombatLog::default();
        log.now_ms = 1234;
        log.log(CombatLogEventType::Event, "hello".to_string());
        assert_eq!(log.entries.len(), 1);
        assert_eq!(log.entries[0].timestamp_ms, 1234);
    }

    #[test]
    fn test_name_registry() {
        let mut log = CombatLog::default();
        let e = Entity::from_raw(1);
        assert_eq!(log.name_of(e), "Unknown");
        log.register_actor(e, "Mage");
        assert_eq!(log.name_of(e), "Mage");
    }

    #[test]
    fn test_filter_by_type() {
        let mut log = CombatLog::default();
        log.log(CombatLogEventType::Damage, "a".to_string());
        log.log(CombatLogEventType::Healing, "b".to_string());
        log.log(CombatLogEventType::Damage, "c".to_string());
        assert_eq!(log.filter_by_type(CombatLogEventType::Damage).len(), 2);
        assert_eq!(log.filter_by_type(CombatLogEventType::Healing).len(), 1);
    }
}
