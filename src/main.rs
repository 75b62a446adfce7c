//! SpellSim - Spell Casting Engine Prototype
//!
//! Runs scripted cast scenarios through the engine headlessly and writes a
//! structured combat log for analysis.

use spellsim::cli;
use spellsim::headless::{run_headless_scenario, ScenarioConfig};

fn main() {
    let args = cli::parse_args();

    let mut config = match ScenarioConfig::load_from_file(&args.scenario) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load scenario: {}", e);
            std::process::exit(1);
        }
    };

    if let Some(output) = args.output {
        config.output_path = Some(output.display().to_string());
    }
    if let Some(max_duration) = args.max_duration {
        config.max_duration_secs = max_duration;
    }
    if let Some(seed) = args.seed {
        config.random_seed = Some(seed);
    }

    if let Err(e) = run_headless_scenario(config) {
        eprintln!("Scenario failed: {}", e);
        std::process::exit(1);
    }
}
