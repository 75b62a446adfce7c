//! Headless scenario execution
//!
//! Runs a scripted cast scenario without any graphical output, suitable for
//! automated testing. The simulation advances on a fixed timestep so a
//! seeded run is reproducible tick for tick.

use bevy::app::ScheduleRunnerPlugin;
use bevy::prelude::*;
use std::time::Duration;

use crate::combat::log::{CombatLog, CombatLogEventType, ScenarioMetadata, UnitSummary};
use crate::spell::cast::{CurrentCasts, SpellCast};
use crate::spell::catalog::SpellCatalogPlugin;
use crate::spell::events::CastRequested;
use crate::spell::targets::{SpellTargets, Trajectory};
use crate::spell::{FixedSimTimestep, SimClock, SpellPlugin, SpellSystemPhase};
use crate::world::map::ArenaMap;
use crate::world::unit::{
    ComboPoints, Cooldowns, GameObject, Inventory, ItemClass, ItemId, ItemStack, PowerKind,
    SkillKind, Unit,
};
use crate::world::GameRng;

use super::config::{Archetype, ScenarioConfig};

/// Result of a completed headless scenario.
#[derive(Debug, Clone)]
pub struct ScenarioResult {
    /// Total simulated duration in ms
    pub duration_ms: u64,
    pub units: Vec<UnitResult>,
    /// Random seed used (if deterministic mode)
    pub random_seed: Option<u64>,
    /// Number of combat log entries recorded
    pub log_entries: usize,
}

/// Final state of a single unit after the scenario.
#[derive(Debug, Clone)]
pub struct UnitResult {
    pub name: String,
    pub team: u8,
    pub max_health: f32,
    pub final_health: f32,
    pub survived: bool,
}

/// Resource tracking headless scenario state.
#[derive(Resource)]
pub struct ScenarioState {
    pub config: ScenarioConfig,
    /// Entities of the spawned scenario units, in config order.
    pub unit_entities: Vec<Entity>,
    /// Entities of the spawned scenario objects, in config order.
    pub object_entities: Vec<Entity>,
    /// How many script entries have fired.
    pub fired: usize,
    pub max_duration_ms: u64,
    pub complete: bool,
    pub result: Option<ScenarioResult>,
}

/// Plugin for headless scenario execution.
pub struct HeadlessPlugin {
    pub config: ScenarioConfig,
}

impl Plugin for HeadlessPlugin {
    fn build(&self, app: &mut App) {
        let max_duration_ms = (self.config.max_duration_secs * 1000.0) as u64;
        app.insert_resource(FixedSimTimestep {
            step_ms: self.config.tick_ms,
        })
        .insert_resource(ScenarioState {
            config: self.config.clone(),
            unit_entities: Vec::new(),
            object_entities: Vec::new(),
            fired: 0,
            max_duration_ms,
            complete: false,
            result: None,
        })
        .add_systems(Startup, headless_setup_scenario)
        .add_systems(
            Update,
            fire_scripted_casts
                .in_set(SpellSystemPhase::Requests)
                .before(crate::spell::cast::start_requested_casts),
        )
        .add_systems(
            Update,
            headless_check_scenario_end.after(SpellSystemPhase::Cleanup),
        )
        .add_systems(PostUpdate, headless_exit_on_complete);
    }
}

/// Build a unit from its archetype template.
fn build_unit(name: &str, team: u8, archetype: Archetype, facing: f32) -> Unit {
    let mut unit = Unit::new(name, team);
    unit.facing = facing;
    match archetype {
        Archetype::Caster => {
            unit.max_health = 800.0;
            unit.current_health = 800.0;
            unit.power_kind = PowerKind::Mana;
            unit.max_power = 1200.0;
            unit.current_power = 1200.0;
            unit.power_regen = 15.0;
            unit.spell_power = 150.0;
            unit.attack_power = 20.0;
        }
        Archetype::Healer => {
            unit.max_health = 900.0;
            unit.current_health = 900.0;
            unit.power_kind = PowerKind::Mana;
            unit.max_power = 1100.0;
            unit.current_power = 1100.0;
            unit.power_regen = 25.0;
            unit.spell_power = 120.0;
            unit.attack_power = 20.0;
        }
        Archetype::Bruiser => {
            unit.max_health = 1600.0;
            unit.current_health = 1600.0;
            unit.power_kind = PowerKind::Rage;
            unit.max_power = 100.0;
            unit.current_power = 40.0;
            unit.power_regen = 0.0;
            unit.spell_power = 0.0;
            unit.attack_power = 180.0;
        }
        Archetype::Skirmisher => {
            unit.max_health = 1100.0;
            unit.current_health = 1100.0;
            unit.power_kind = PowerKind::Energy;
            unit.max_power = 100.0;
            unit.current_power = 100.0;
            unit.power_regen = 10.0;
            unit.spell_power = 0.0;
            unit.attack_power = 140.0;
        }
    }
    // Gathering scenarios assume a competent herbalist.
    unit.skills.insert(SkillKind::Herbalism, 150);
    unit
}

/// Reagents every scenario caster starts with.
fn starting_inventory() -> Inventory {
    Inventory {
        items: vec![
            ItemStack {
                item: ItemId::ArcanePowder,
                class: ItemClass::Reagent,
                count: 20,
                ready_at_ms: 0,
            },
            ItemStack {
                item: ItemId::SacredCandle,
                class: ItemClass::Reagent,
                count: 20,
                ready_at_ms: 0,
            },
            ItemStack {
                item: ItemId::DynamiteBundle,
                class: ItemClass::Consumable,
                count: 5,
                ready_at_ms: 0,
            },
            ItemStack {
                item: ItemId::WornBlade,
                class: ItemClass::Weapon,
                count: 1,
                ready_at_ms: 0,
            },
        ],
    }
}

/// Setup system for the headless scenario.
fn headless_setup_scenario(
    mut commands: Commands,
    mut state: ResMut<ScenarioState>,
    mut combat_log: ResMut<CombatLog>,
    mut rng: ResMut<GameRng>,
) {
    combat_log.clear();
    combat_log.log(
        CombatLogEventType::Event,
        format!("Scenario '{}' started (headless mode)", state.config.name),
    );

    if let Some(seed) = state.config.random_seed {
        info!("Using deterministic RNG with seed: {}", seed);
        *rng = GameRng::from_seed(seed);
    } else {
        info!("Using non-deterministic RNG (no seed provided)");
    }

    let units = state.config.units.clone();
    for spec in &units {
        let unit = build_unit(&spec.name, spec.team, spec.archetype, spec.facing);
        let entity = commands
            .spawn((
                unit,
                Transform::from_xyz(spec.position[0], spec.position[1], spec.position[2]),
                CurrentCasts::default(),
                Cooldowns::default(),
                ComboPoints::default(),
                starting_inventory(),
            ))
            .id();
        combat_log.register_actor(entity, spec.name.clone());
        state.unit_entities.push(entity);
    }

    let objects = state.config.objects.clone();
    for spec in &objects {
        let object = match spec.lock {
            Some((skill, value)) => GameObject::locked(spec.kind, skill, value),
            None => GameObject::new(spec.kind),
        };
        let entity = commands
            .spawn((
                object,
                Transform::from_xyz(spec.position[0], spec.position[1], spec.position[2]),
            ))
            .id();
        state.object_entities.push(entity);
    }

    info!(
        "Headless scenario setup complete: {} units, {} objects, {} scripted casts",
        state.config.units.len(),
        state.config.objects.len(),
        state.config.script.len()
    );
}

/// Fire scripted cast requests whose time has come.
fn fire_scripted_casts(
    clock: Res<SimClock>,
    mut state: ResMut<ScenarioState>,
    mut requests: EventWriter<CastRequested>,
) {
    while state.fired < state.config.script.len() {
        let entry = state.config.script[state.fired].clone();
        if entry.at_ms > clock.now_ms {
            break;
        }
        state.fired += 1;

        let Some(&caster) = state.unit_entities.get(entry.caster) else {
            continue;
        };
        let mut targets = SpellTargets::default();
        if let Some(index) = entry.target {
            if let Some(&target) = state.unit_entities.get(index) {
                targets.set_unit(target);
            }
        }
        if let Some(dest) = entry.dest {
            targets.set_dest(crate::spell::targets::SpellLocation::Fixed(Vec3::new(
                dest[0], dest[1], dest[2],
            )));
            // Thrown arcs launch shallow by default; the resolver derives
            // the rest from the measured height delta.
            targets.set_trajectory(Trajectory {
                elevation: 0.3,
                speed: 25.0,
            });
        }
        if let Some(index) = entry.object {
            if let Some(&object) = state.object_entities.get(index) {
                targets.set_game_object(object);
            }
        }

        requests.send(CastRequested {
            caster,
            spell: entry.spell,
            targets,
            triggered: false,
            original_caster: None,
        });
    }
}

/// Check whether the scenario has finished: the script is exhausted and no
/// casts remain in flight, or the duration cap was hit.
fn headless_check_scenario_end(
    clock: Res<SimClock>,
    map: Res<ArenaMap>,
    mut state: ResMut<ScenarioState>,
    mut combat_log: ResMut<CombatLog>,
    rng: Res<GameRng>,
    units: Query<&Unit>,
    casts: Query<&SpellCast>,
    pending: Query<&crate::spell::hit::ReflectProcPending>,
) {
    if state.complete {
        return;
    }

    let script_done = state.fired >= state.config.script.len();
    let idle = casts.is_empty() && pending.is_empty();
    let timed_out = clock.now_ms >= state.max_duration_ms;

    if !(timed_out || (script_done && idle && clock.now_ms > 0)) {
        return;
    }

    if timed_out {
        info!("Scenario timed out after {} ms", clock.now_ms);
    } else {
        info!("Scenario complete after {} ms", clock.now_ms);
    }
    combat_log.log(
        CombatLogEventType::Event,
        format!("Scenario '{}' finished", state.config.name),
    );

    let mut summaries = Vec::new();
    let mut results = Vec::new();
    for &entity in &state.unit_entities {
        let Ok(unit) = units.get(entity) else {
            continue;
        };
        summaries.push(UnitSummary {
            name: unit.name.clone(),
            team: unit.team,
            max_health: unit.max_health,
            final_health: unit.current_health,
            survived: unit.is_alive(),
        });
        results.push(UnitResult {
            name: unit.name.clone(),
            team: unit.team,
            max_health: unit.max_health,
            final_health: unit.current_health,
            survived: unit.is_alive(),
        });
    }

    let metadata = ScenarioMetadata {
        scenario_name: state.config.name.clone(),
        arena_name: map.name.clone(),
        duration_ms: clock.now_ms,
        random_seed: rng.seed,
        units: summaries,
    };

    match combat_log.save_to_file(&metadata, state.config.output_path.as_deref()) {
        Ok(filename) => println!("Scenario complete. Log saved to: {}", filename),
        Err(e) => eprintln!("Failed to save combat log: {}", e),
    }

    state.result = Some(ScenarioResult {
        duration_ms: clock.now_ms,
        units: results,
        random_seed: rng.seed,
        log_entries: combat_log.entries.len(),
    });
    state.complete = true;
}

/// Exit the app when the scenario is complete.
fn headless_exit_on_complete(state: Res<ScenarioState>, mut exit: EventWriter<AppExit>) {
    if state.complete {
        exit.send(AppExit::Success);
    }
}

/// Run a headless scenario to completion.
pub fn run_headless_scenario(config: ScenarioConfig) -> Result<(), String> {
    config.validate()?;

    println!("Starting headless scenario '{}'...", config.name);
    println!("  Units: {}", config.units.len());
    println!("  Scripted casts: {}", config.script.len());
    println!("  Max duration: {:.0}s", config.max_duration_secs);

    let rng = match config.random_seed {
        Some(seed) => GameRng::from_seed(seed),
        None => GameRng::from_entropy(),
    };

    App::new()
        // Minimal plugins - no window, no rendering
        .add_plugins(MinimalPlugins.set(ScheduleRunnerPlugin::run_loop(Duration::ZERO)))
        // Transform plugin needed for entity positions
        .add_plugins(TransformPlugin)
        .insert_resource(rng)
        // Load spell definitions from config
        .add_plugins(SpellCatalogPlugin)
        // The cast engine
        .add_plugins(SpellPlugin)
        // Our scenario driver
        .add_plugins(HeadlessPlugin { config })
        .run();

    Ok(())
}
