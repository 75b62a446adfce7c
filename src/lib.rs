//! SpellSim - Spell Casting Engine Prototype
//!
//! The ability/spell-casting engine of a realtime arena simulation: target
//! resolution, precondition checking, a tick-driven cast lifecycle state
//! machine, hit resolution with diminishing returns, and a headless
//! scenario harness.
//!
//! This library exposes the engine modules for testing and reuse.

pub mod cli;
pub mod combat;
pub mod headless;
pub mod spell;
pub mod world;

// Re-export commonly used types
pub use combat::log::{CombatLog, CombatLogEventType};
pub use combat::math::HitResult;
pub use headless::ScenarioConfig;
pub use spell::catalog::{SpellCatalog, SpellId};
pub use spell::check::CastError;
pub use spell::SpellPlugin;
pub use world::map::ArenaMap;
pub use world::unit::Unit;
pub use world::GameRng;
