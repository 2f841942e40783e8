mod cmd;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use wheelhouse_lib::consts::CONFIG_FILENAME;

use crate::cmd::RunOptions;
use crate::output::{OutputFormat, print_error};

/// Build, verify and publish Python distributions across a build matrix
#[derive(Parser)]
#[command(name = "wheelhouse")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Increase log verbosity (-v info, -vv debug)
  #[arg(short, long, global = true, action = clap::ArgAction::Count)]
  verbose: u8,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Run the pipeline: build and verify every unit, then publish on a tag push
  Run {
    /// Pipeline configuration file
    #[arg(short, long, env = "WHEELHOUSE_CONFIG", default_value = CONFIG_FILENAME)]
    config: PathBuf,

    /// Git ref that triggered the run (e.g. refs/tags/1.0.0)
    #[arg(long = "ref", env = "WHEELHOUSE_REF")]
    git_ref: Option<String>,

    /// Treat the run as a tag push
    #[arg(long, conflicts_with = "pull_request")]
    tag: bool,

    /// Treat the run as a pull request build
    #[arg(long)]
    pull_request: bool,

    /// Maximum number of units running at once
    #[arg(long)]
    max_parallel: Option<usize>,

    /// Where logs, artifacts and pipeline.json are written
    #[arg(long)]
    artifacts_dir: Option<PathBuf>,

    /// Package source tree
    #[arg(long)]
    source: Option<PathBuf>,

    /// Toolchain timeout per unit (e.g. "30m")
    #[arg(long, value_parser = humantime::parse_duration)]
    build_timeout: Option<Duration>,

    /// Verification timeout per unit (e.g. "5m")
    #[arg(long, value_parser = humantime::parse_duration)]
    verify_timeout: Option<Duration>,

    /// Build and verify but never upload
    #[arg(long)]
    dry_run: bool,

    /// Output format
    #[arg(short = 'o', long, value_enum, default_value = "text")]
    output: OutputFormat,
  },

  /// Expand and print the build matrix without executing it
  Plan {
    /// Pipeline configuration file
    #[arg(short, long, env = "WHEELHOUSE_CONFIG", default_value = CONFIG_FILENAME)]
    config: PathBuf,

    /// Output format
    #[arg(short = 'o', long, value_enum, default_value = "text")]
    output: OutputFormat,
  },

  /// Remove environments and build outputs left under the work root
  Clean {
    /// Pipeline configuration file (optional; only its work_dir is used)
    #[arg(short, long, env = "WHEELHOUSE_CONFIG", default_value = CONFIG_FILENAME)]
    config: PathBuf,

    /// Show what would be removed without removing it
    #[arg(long)]
    dry_run: bool,

    /// Output format
    #[arg(short = 'o', long, value_enum, default_value = "text")]
    output: OutputFormat,
  },
}

fn init_tracing(verbose: u8) {
  let default = match verbose {
    0 => "warn",
    1 => "info",
    _ => "debug",
  };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();
}

fn main() -> ExitCode {
  let cli = Cli::parse();
  init_tracing(cli.verbose);

  let result = match cli.command {
    Commands::Run {
      config,
      git_ref,
      tag,
      pull_request,
      max_parallel,
      artifacts_dir,
      source,
      build_timeout,
      verify_timeout,
      dry_run,
      output,
    } => cmd::cmd_run(
      &config,
      RunOptions {
        trigger: cmd::resolve_trigger(git_ref.as_deref(), tag, pull_request),
        max_parallel,
        artifacts_dir,
        source,
        build_timeout,
        verify_timeout,
        dry_run,
      },
      output,
    ),
    Commands::Plan { config, output } => cmd::cmd_plan(&config, output).map(|()| true),
    Commands::Clean {
      config,
      dry_run,
      output,
    } => cmd::cmd_clean(&config, dry_run, output).map(|()| true),
  };

  match result {
    Ok(true) => ExitCode::SUCCESS,
    Ok(false) => ExitCode::from(1),
    Err(e) => {
      print_error(&format!("{:#}", e));
      if cmd::is_config_error(&e) {
        ExitCode::from(2)
      } else {
        ExitCode::from(1)
      }
    }
  }
}
