//! Command-line interface for SpellSim
//!
//! The binary runs scripted scenarios headlessly.

use clap::Parser;
use std::path::PathBuf;

/// Spell casting engine scenario runner
#[derive(Parser, Debug)]
#[command(name = "spellsim")]
#[command(about = "Spell casting engine scenario runner")]
#[command(version)]
pub struct Args {
    /// JSON scenario file to run
    #[arg(long, value_name = "SCENARIO_FILE")]
    pub scenario: PathBuf,

    /// Output path for the combat log
    #[arg(long, value_name = "OUTPUT_PATH")]
    pub output: Option<PathBuf>,

    /// Override the scenario's maximum duration in seconds
    #[arg(long)]
    pub max_duration: Option<f32>,

    /// Override the scenario's random seed for deterministic reproduction
    #[arg(long)]
    pub seed: Option<u64>,
}

pub fn parse_args() -> Args {
    Args::parse()
}
