//! Diminishing Returns
//!
//! Per-entity, per-group decaying resistance ledger. Repeated control effects
//! in the same group land at 100% / 50% / 25% duration and then not at all;
//! the level decays back to full only after a fixed window with no refresh.
//!
//! The ledger is consulted and mutated exclusively by the hit resolution
//! pipeline while it processes that entity's own ledger entries.

use std::collections::HashMap;

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::spell::constants::DIMINISHING_RESET_MS;

/// Diminishing-returns category. Spells in the same group share a level.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiminishGroup {
    #[default]
    None,
    Stun,
    Root,
    Fear,
    Incapacitate,
    Silence,
}

/// Current reduction step for one (entity, group) pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DiminishLevel {
    Full,
    Half,
    Quarter,
    Immune,
}

impl DiminishLevel {
    pub fn multiplier(&self) -> f32 {
        match self {
            DiminishLevel::Full => 1.0,
            DiminishLevel::Half => 0.5,
            DiminishLevel::Quarter => 0.25,
            DiminishLevel::Immune => 0.0,
        }
    }

    fn from_count(count: u8) -> Self {
        match count {
            0 => DiminishLevel::Full,
            1 => DiminishLevel::Half,
            2 => DiminishLevel::Quarter,
            _ => DiminishLevel::Immune,
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct DiminishEntry {
    /// How many applications have landed inside the current window.
    count: u8,
    /// When the window elapses and the level decays back to full.
    expires_at_ms: u64,
}

/// The diminishing-returns ledger for every entity in the world.
///
/// Invariant: within one window the level only ever advances
/// (Full -> Half -> Quarter -> Immune); it resets to Full only once the
/// window fully elapses with no intervening application.
#[derive(Resource, Default)]
pub struct DiminishingLedger {
    entries: HashMap<(Entity, DiminishGroup), DiminishEntry>,
}

impl DiminishingLedger {
    /// The level that would apply to a fresh application right now. Expired
    /// entries read as `Full` (the decay is observed lazily).
    pub fn consult(&self, entity: Entity, group: DiminishGroup, now_ms: u64) -> DiminishLevel {
        if group == DiminishGroup::None {
            return DiminishLevel::Full;
        }
        match self.entries.get(&(entity, group)) {
            Some(entry) if entry.expires_at_ms > now_ms => DiminishLevel::from_count(entry.count),
            _ => DiminishLevel::Full,
        }
    }

    /// Record an application: bumps the level and restarts the window.
    /// Must be called only for applications that actually landed.
    pub fn increment(&mut self, entity: Entity, group: DiminishGroup, now_ms: u64) {
        if group == DiminishGroup::None {
            return;
        }
        let entry = self
            .entries
            .entry((entity, group))
            .or_insert(DiminishEntry {
                count: 0,
                expires_at_ms: 0,
            });
        if entry.expires_at_ms <= now_ms {
            // Window elapsed; this application starts a fresh ladder.
            entry.count = 0;
        }
        entry.count = entry.count.saturating_add(1).min(3);
        entry.expires_at_ms = now_ms + DIMINISHING_RESET_MS;
    }

    /// Drop expired entries and everything belonging to `gone` entities.
    pub fn prune(&mut self, now_ms: u64, gone: &[Entity]) {
        self.entries
            .retain(|(entity, _), entry| entry.expires_at_ms > now_ms && !gone.contains(entity));
    }

    #[cfg(test)]
    fn window_expiry(&self, entity: Entity, group: DiminishGroup) -> Option<u64> {
        self.entries.get(&(entity, group)).map(|e| e.expires_at_ms)
    }
}
