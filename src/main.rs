//! PolyTile Command Line Interface
//!
//! Usage:
//!   polytile [OPTIONS] (--kernel <NAME> | --input <FILE>)
//!   polytile --help
//!
//! Examples:
//!   polytile --kernel heat-1d                                # Plain tiling, 32x32
//!   polytile --kernel heat-1d --strategy split --tile-sizes 4,4
//!   polytile --kernel heat-2d --strategy overlapped --multi-dim 2 --tile-sizes 2,4,4
//!   polytile --input scop.json --config tiling.json --emit json -o out.json

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use log::{debug, error, info, warn};
use polytile::analysis::Scop;
use polytile::config::{Strategy, TilingConfig};
use polytile::kernels;
use polytile::transform::TilingOutcome;
use polytile::schedule::Schedule;
use polytile::utils::{print_schedule, visualize_phases};
use serde::Serialize;
use std::fmt::Write as _;
use std::fs;
use std::path::PathBuf;

/// PolyTile - split and overlapped tiling of stencil schedules
#[derive(Parser, Debug)]
#[command(name = "polytile")]
#[command(author = "PolyTile Contributors")]
#[command(version)]
#[command(about = "Split and overlapped tiling of polyhedral schedule trees", long_about = None)]
struct Cli {
    /// Built-in kernel to tile
    #[arg(short, long, value_name = "NAME", conflicts_with = "input")]
    kernel: Option<String>,

    /// SCoP to tile (JSON)
    #[arg(short, long, value_name = "FILE")]
    input: Option<PathBuf>,

    /// Output file (defaults to stdout)
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Tiling configuration (JSON); flags below override it
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Tiling strategy
    #[arg(short, long)]
    strategy: Option<StrategyArg>,

    /// Tile sizes, time first (comma-separated)
    #[arg(long, value_delimiter = ',', num_args = 1..)]
    tile_sizes: Option<Vec<i64>>,

    /// Number of overlapped space dimensions
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u8).range(1..=2))]
    multi_dim: Option<u8>,

    /// Stretch time tiles so a single synchronization per tile suffices
    #[arg(long)]
    min_sync: bool,

    /// Overlap after mapping: keep the tile loops outside the expansion
    #[arg(long)]
    after_mapping: bool,

    /// What to emit
    #[arg(long, default_value = "tree")]
    emit: EmitKind,

    /// Verbose output (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (suppress warnings)
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum StrategyArg {
    /// Parallelogram tiling
    Plain,
    /// Phases per time tile
    Split,
    /// Redundant halos per tile
    Overlapped,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum EmitKind {
    /// Transformed schedule tree
    Tree,
    /// Phase map of every 2-D statement
    Phases,
    /// Outcome and schedule tree as JSON
    Json,
    /// Dependence probe result
    Probe,
}

/// Document written by `--emit json`
#[derive(Serialize)]
struct Report<'a> {
    outcome: &'a TilingOutcome,
    schedule: &'a Schedule,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.quiet {
        log::LevelFilter::Error
    } else {
        match cli.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            2 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .format_timestamp(None)
        .init();

    info!("PolyTile v{}", polytile::VERSION);

    let scop = load_scop(&cli)?;
    let config = build_config(&cli)?;
    debug!("Tiling config: {:?}", config);

    info!("Tiling {} with {} strategy...", scop.name, config.strategy.name());
    let (schedule, outcome) = match polytile::tile(&scop, &config) {
        Ok(result) => result,
        Err(e) => {
            error!("Tiling failed: {}", e);
            return Err(e).with_context(|| format!("Failed to tile {}", scop.name));
        }
    };
    for diagnostic in &outcome.diagnostics {
        if diagnostic.is_problem() {
            warn!("{}", diagnostic);
        } else {
            info!("{}", diagnostic);
        }
    }

    let output = render(&cli, &scop, &schedule, &outcome)?;
    write_output(&cli.output, &output)
}

fn load_scop(cli: &Cli) -> Result<Scop> {
    match (&cli.kernel, &cli.input) {
        (Some(name), _) => match kernels::by_name(name) {
            Some(scop) => Ok(scop),
            None => bail!("Unknown kernel {:?}, expected one of {}", name, kernels::KERNELS.join(", ")),
        },
        (None, Some(path)) => {
            debug!("Input file: {:?}", path);
            let text = fs::read_to_string(path)
                .with_context(|| format!("Failed to read input file: {:?}", path))?;
            Scop::from_json(&text).with_context(|| format!("Failed to parse SCoP: {:?}", path))
        }
        (None, None) => bail!("Either --kernel or --input is required"),
    }
}

fn build_config(cli: &Cli) -> Result<TilingConfig> {
    let mut config = match cli.config {
        Some(ref path) => TilingConfig::from_file(path)
            .with_context(|| format!("Failed to load config file: {:?}", path))?,
        None => TilingConfig::default(),
    };

    // Override with CLI flags
    let multi_dim = match (cli.multi_dim, config.strategy) {
        (Some(n), _) => usize::from(n),
        (None, Strategy::Overlapped { multi_dim }) => multi_dim,
        (None, _) => 1,
    };
    match cli.strategy {
        Some(StrategyArg::Plain) => config.strategy = Strategy::Plain,
        Some(StrategyArg::Split) => config.strategy = Strategy::Split,
        Some(StrategyArg::Overlapped) => config.strategy = Strategy::Overlapped { multi_dim },
        None => {
            if let Strategy::Overlapped { .. } = config.strategy {
                config.strategy = Strategy::Overlapped { multi_dim };
            }
        }
    }
    if let Some(ref sizes) = cli.tile_sizes {
        config.tile_sizes = sizes.clone();
    }
    if cli.min_sync {
        config.min_sync = true;
    }
    if cli.after_mapping {
        config.after_mapping = true;
    }

    config.validate().context("Invalid tiling configuration")?;
    Ok(config)
}

fn render(cli: &Cli, scop: &Scop, schedule: &Schedule, outcome: &TilingOutcome) -> Result<String> {
    let mut output = String::new();
    match cli.emit {
        EmitKind::Tree => {
            output.push_str(&print_schedule(schedule, scop));
            for diagnostic in &outcome.diagnostics {
                let _ = writeln!(output, "{}", diagnostic);
            }
        }
        EmitKind::Phases => {
            if outcome.phases.is_empty() {
                let _ = writeln!(output, "no phases: {} tiling applied", outcome.strategy_applied.name());
                return Ok(output);
            }
            for stmt in scop.statements.iter().filter(|s| s.domain.dim() == 2) {
                let _ = writeln!(output, "{}:", stmt.name);
                output.push_str(&visualize_phases(&outcome.phases, &stmt.name));
            }
            for (k, phase) in outcome.phases.iter().enumerate() {
                let parallel = outcome.phase_parallel.get(k).copied().unwrap_or(false);
                let _ = writeln!(output, "phase {}: {} instances, parallel: {}", k, phase.len(), parallel);
            }
        }
        EmitKind::Json => {
            let report = Report { outcome, schedule };
            output = serde_json::to_string_pretty(&report).context("Failed to serialize outcome")?;
        }
        EmitKind::Probe => match outcome.probe {
            Some(ref probe) => {
                output = serde_json::to_string_pretty(probe).context("Failed to serialize probe")?;
            }
            None => {
                let _ = writeln!(output, "no probe: {} tiling applied", outcome.strategy_applied.name());
            }
        },
    }
    Ok(output)
}

fn write_output(path: &Option<PathBuf>, content: &str) -> Result<()> {
    match path {
        Some(p) => {
            fs::write(p, content)
                .with_context(|| format!("Failed to write output file: {:?}", p))?;
        }
        None => {
            println!("{}", content);
        }
    }
    Ok(())
}
