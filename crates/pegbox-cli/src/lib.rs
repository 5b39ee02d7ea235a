//! # Pegbox CLI
//!
//! Command-line runner for headless pegbox simulations.
//!
//! ## Commands
//! - `drop` - Drop a ball on flat ground and wait for it to sleep
//! - `board` - Pour balls through a peg board into chutes
//! - `stack` - Settle a pyramid of boxes
//! - `config` - Print the effective world configuration
//!
//! Every command prints a JSON report on stdout.

pub mod scenes;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;

use pegbox_physics::WorldConfig;

use scenes::{BoardLayout, Timing};

/// Pegbox physics scenario runner
#[derive(Parser)]
#[command(name = "pegbox")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// World configuration file (JSON); missing fields use defaults
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Physics rate in hertz
    #[arg(long, default_value = "60", global = true)]
    pub hz: f64,

    /// Render frame rate driving the step clock
    #[arg(long, default_value = "60", global = true)]
    pub fps: f64,

    /// Disable sleeping regardless of the configuration file
    #[arg(long, global = true)]
    pub no_sleep: bool,

    /// Write the report here instead of stdout
    #[arg(short, long, global = true)]
    pub output: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Drop a ball on flat ground
    Drop {
        /// Start height of the ball centre
        #[arg(long, default_value = "5")]
        height: f32,

        /// Ball radius
        #[arg(short, long, default_value = "0.5")]
        radius: f32,

        /// Ball restitution
        #[arg(short = 'e', long, default_value = "0")]
        restitution: f32,

        /// Simulated seconds before giving up
        #[arg(short, long, default_value = "10")]
        seconds: f64,
    },

    /// Pour balls through a peg board
    Board {
        /// Rows of pegs
        #[arg(long, default_value = "10")]
        rows: u32,

        /// Pegs per row
        #[arg(long, default_value = "11")]
        columns: u32,

        /// Number of balls
        #[arg(short, long, default_value = "50")]
        balls: u32,

        /// Number of collection chutes
        #[arg(long, default_value = "12")]
        chutes: u32,

        /// Seed for the spawn jitter
        #[arg(long, default_value = "7")]
        seed: u64,

        /// Simulated seconds
        #[arg(short, long, default_value = "15")]
        seconds: f64,
    },

    /// Settle a pyramid of boxes
    Stack {
        /// Boxes in the bottom row
        #[arg(short, long, default_value = "10")]
        base: u32,

        /// Simulated seconds
        #[arg(short, long, default_value = "10")]
        seconds: f64,
    },

    /// Print the effective world configuration
    Config,
}

/// Read a world configuration, falling back to defaults without a path
pub fn load_config(path: Option<&Path>) -> Result<WorldConfig> {
    let Some(path) = path else {
        return Ok(WorldConfig::default());
    };
    let text = fs::read_to_string(path).with_context(|| format!("failed to read config {}", path.display()))?;
    let config = serde_json::from_str(&text).with_context(|| format!("invalid config {}", path.display()))?;
    log::debug!("loaded world config from {}", path.display());
    Ok(config)
}

fn emit<T: Serialize>(report: &T, output: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(report)?;
    match output {
        Some(path) => {
            fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;
            log::info!("report written to {}", path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}

fn timing(hz: f64, fps: f64, seconds: f64) -> Result<Timing> {
    anyhow::ensure!(hz > 0.0 && hz.is_finite(), "--hz must be positive");
    anyhow::ensure!(fps > 0.0 && fps.is_finite(), "--fps must be positive");
    anyhow::ensure!(seconds >= 0.0, "--seconds must not be negative");
    Ok(Timing {
        hz,
        frame: 1.0 / fps,
        seconds,
    })
}

/// Execute the CLI command
pub fn execute(cli: Cli) -> Result<()> {
    let filter = if cli.verbose { "debug" } else { "info" };
    // A second init (tests, embedding) keeps the first logger.
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter)).try_init();

    let mut config = load_config(cli.config.as_deref())?;
    if cli.no_sleep {
        config.allow_sleep = false;
    }
    let output = cli.output.as_deref();

    match cli.command {
        Commands::Drop {
            height,
            radius,
            restitution,
            seconds,
        } => {
            log::info!("dropping a ball of radius {radius} from {height} m");
            let report = scenes::drop_ball(config, height, radius, restitution, &timing(cli.hz, cli.fps, seconds)?)?;
            emit(&report, output)
        }
        Commands::Board {
            rows,
            columns,
            balls,
            chutes,
            seed,
            seconds,
        } => {
            let layout = BoardLayout {
                rows,
                columns,
                balls,
                chutes,
                seed,
                ..BoardLayout::default()
            };
            let report = scenes::peg_board(config, layout, &timing(cli.hz, cli.fps, seconds)?)?;
            emit(&report, output)
        }
        Commands::Stack { base, seconds } => {
            log::info!("stacking a pyramid with a base of {base}");
            let report = scenes::box_stack(config, base, &timing(cli.hz, cli.fps, seconds)?)?;
            emit(&report, output)
        }
        Commands::Config => emit(&config, output),
    }
}
