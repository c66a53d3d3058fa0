// ABOUTME: Command-line interface definition using clap derive macros.
// ABOUTME: One invocation deploys one version to one environment.

use std::path::PathBuf;

use clap::{ArgAction, Parser};
use shipwright::output::OutputMode;

#[derive(Parser, Debug)]
#[command(name = "shipwright")]
#[command(about = "Deploy a versioned service to one environment, rolling back on failure")]
#[command(version, disable_version_flag = true)]
pub struct Cli {
    /// Target environment: dev, staging, or production
    pub environment: String,

    /// Version to deploy, in the form vMAJOR.MINOR.PATCH
    pub version: String,

    /// Log at DEBUG level
    #[arg(long)]
    pub debug: bool,

    /// Validate and print the plan without building or deploying
    #[arg(long)]
    pub dry_run: bool,

    /// Deployment descriptor (defaults to shipwright.yml in the current directory)
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Emit JSON lines instead of human-readable output
    #[arg(long, conflicts_with = "quiet")]
    pub json: bool,

    /// Print only the final result
    #[arg(short, long)]
    pub quiet: bool,

    /// Print version
    #[arg(short = 'v', long = "version", action = ArgAction::Version)]
    print_version: Option<bool>,
}

impl Cli {
    pub fn output_mode(&self) -> OutputMode {
        if self.json {
            OutputMode::Json
        } else if self.quiet {
            OutputMode::Quiet
        } else {
            OutputMode::Normal
        }
    }
}
