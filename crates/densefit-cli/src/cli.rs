use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
";

#[derive(Parser, Debug)]
#[command(
    author = "Tony Kan, Ted Yu",
    version,
    about = "densefit CLI - Bayesian scoring of molecular structures against density maps represented as Gaussian mixtures.",
    help_template = HELP_TEMPLATE,
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity level (-v for INFO, -vv for DEBUG, -vvv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all log output except for errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Write logs to a specified file in addition to the console output
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Set the number of threads for parallel precomputation.
    /// Defaults to the number of available logical cores.
    #[arg(short = 'j', long, global = true, value_name = "NUM")]
    pub threads: Option<usize>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Score a structure or a trajectory against a density-map mixture.
    Score(ScoreArgs),
    /// Load a density-map mixture and print its precomputed self overlaps.
    Inspect(InspectArgs),
}

/// Arguments for the `score` subcommand.
#[derive(Args, Debug, Clone)]
pub struct ScoreArgs {
    // --- Core Arguments ---
    /// Path to the TOML restraint configuration file.
    #[arg(short, long, required = true, value_name = "PATH")]
    pub config: PathBuf,

    /// Path to the structure CSV (columns: serial,name,x,y,z).
    #[arg(short, long, required = true, value_name = "PATH")]
    pub structure: PathBuf,

    /// Path to a trajectory CSV (columns: step,serial,x,y,z).
    /// When omitted, the structure coordinates are scored as step 0.
    #[arg(short, long, value_name = "PATH")]
    pub trajectory: Option<PathBuf>,

    /// Path for the per-frame score CSV. Written to stdout when omitted.
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Number of cooperating workers that split each step's work.
    #[arg(short, long, default_value_t = 1, value_name = "NUM")]
    pub workers: usize,

    // --- Overrides ---
    /// Override the density-map mixture file from the configuration.
    #[arg(long, value_name = "PATH", help_heading = "Overrides")]
    pub gmm_file: Option<PathBuf>,

    /// Override the Monte Carlo seed from the configuration.
    #[arg(long, value_name = "NUM", help_heading = "Overrides")]
    pub seed: Option<u64>,

    /// Evaluate every pair on every worker instead of splitting the work.
    #[arg(long, help_heading = "Overrides")]
    pub serial: bool,

    /// Set a configuration value, e.g. `-S restraint.sigma-max=2.0`.
    /// Can be used multiple times; applied after the configuration file.
    #[arg(short = 'S', long = "set", value_name = "KEY=VALUE", help_heading = "Overrides")]
    pub set_values: Vec<String>,
}

/// Arguments for the `inspect` subcommand.
#[derive(Args, Debug, Clone)]
pub struct InspectArgs {
    /// Path to the density-map mixture file.
    #[arg(short, long, required = true, value_name = "PATH")]
    pub gmm_file: PathBuf,

    /// Fraction of each component's self overlap the neighbor list may discard.
    #[arg(short, long, default_value_t = 0.01, value_name = "FRACTION")]
    pub cutoff: f64,
}
