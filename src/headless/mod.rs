//! Headless mode for agentic testing
//!
//! Runs scripted cast scenarios without any graphical output, suitable for
//! automated testing and integration with analysis tooling.
//!
//! ## Usage
//!
//! ```bash
//! # Run a headless scenario
//! cargo run --release -- --scenario scenario.json
//! ```
//!
//! ## JSON Configuration
//!
//! ```json
//! {
//!   "name": "frostbolt duel",
//!   "units": [
//!     { "name": "Mage", "team": 1, "archetype": "Caster", "position": [-20.0, 0.0, 0.0] },
//!     { "name": "Warrior", "team": 2, "archetype": "Bruiser", "position": [20.0, 0.0, 0.0] }
//!   ],
//!   "script": [
//!     { "at_ms": 100, "caster": 0, "spell": "Frostbolt", "target": 1 }
//!   ],
//!   "random_seed": 42
//! }
//! ```

pub mod config;
pub mod runner;

pub use config::{Archetype, ScenarioConfig, ScenarioObject, ScenarioUnit, ScriptedCast};
pub use runner::{run_headless_scenario, HeadlessPlugin, ScenarioResult, ScenarioState, UnitResult};
