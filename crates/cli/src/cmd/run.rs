//! Implementation of the `wheelhouse run` command.
//!
//! Loads the pipeline config, applies command-line overrides, and runs the
//! whole matrix. Ctrl-C cancels outstanding units; environments are still
//! torn down before the command exits.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tracing::warn;

use wheelhouse_lib::pipeline::{Pipeline, PipelineError, PipelineRun, PublishOutcome, Trigger, UnitStatus};
use wheelhouse_lib::publish::Credentials;

use super::load_config;
use crate::output::{
  OutputFormat, format_millis, print_error, print_failure, print_info, print_json, print_stat, print_success,
  print_warning, symbols,
};

/// Command-line overrides for a run.
#[derive(Debug, Clone)]
pub struct RunOptions {
  pub trigger: Trigger,
  pub max_parallel: Option<usize>,
  pub artifacts_dir: Option<PathBuf>,
  pub source: Option<PathBuf>,
  pub build_timeout: Option<Duration>,
  pub verify_timeout: Option<Duration>,
  pub dry_run: bool,
}

/// Returns whether the pipeline, publish included, succeeded.
pub fn cmd_run(config_path: &Path, options: RunOptions, output: OutputFormat) -> Result<bool> {
  let mut config = load_config(config_path)?;

  if let Some(max_parallel) = options.max_parallel {
    config.max_parallel = max_parallel;
  }
  if let Some(source) = options.source {
    config.source_dir = dunce::canonicalize(&source).unwrap_or(source);
  }
  if let Some(artifacts_dir) = options.artifacts_dir {
    config.artifacts_dir = artifacts_dir;
  }
  if let Some(timeout) = options.build_timeout {
    config.build.timeout = Some(timeout.as_secs().max(1));
  }
  if let Some(timeout) = options.verify_timeout {
    config.verify.timeout = Some(timeout.as_secs().max(1));
  }
  config.validate()?;

  let matrix = config.effective_matrix();
  let credentials = Credentials::from_env();
  let pipeline = Pipeline::from_config(&config).with_dry_run(options.dry_run);

  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let result = rt.block_on(async {
    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
      if tokio::signal::ctrl_c().await.is_ok() {
        warn!("interrupted, cancelling remaining units");
        let _ = cancel_tx.send(true);
      }
    });

    pipeline
      .with_cancel(cancel_rx)
      .run(&matrix, options.trigger, credentials.as_ref())
      .await
  });

  match result {
    Ok(run) => {
      report(&run, &config.artifacts_dir, output)?;
      Ok(run.succeeded())
    }
    Err(PipelineError::Publish { run, source }) => {
      report(&run, &config.artifacts_dir, output)?;
      print_error(&format!("Publish failed: {}", source));
      Ok(false)
    }
    Err(PipelineError::Artifacts {
      dir,
      run,
      publish_error,
      source,
    }) => {
      report(&run, &config.artifacts_dir, output)?;
      if let Some(e) = publish_error {
        print_error(&format!("Publish failed: {}", e));
      }
      print_error(&format!("Failed to write artifacts to {}: {}", dir.display(), source));
      Ok(false)
    }
    Err(e) => Err(e).context("Pipeline run failed"),
  }
}

fn report(run: &PipelineRun, artifacts_dir: &Path, output: OutputFormat) -> Result<()> {
  if output.is_json() {
    return print_json(run);
  }

  print_info(&format!("Run {} ({} units)", run.id, run.units.len()));
  if let Some(hash) = &run.source_hash {
    print_stat("Source", hash.short(12));
  }
  println!();

  for report in run.reports() {
    let slug = report.unit.id().slug();
    let took = format_millis(report.duration_ms);
    let optional = if report.unit.required { "" } else { " (optional)" };

    match report.status {
      UnitStatus::Passed => {
        let artifact = report
          .artifact
          .as_ref()
          .map(|a| format!(" {} {}", symbols::ARROW, a.file_name()))
          .unwrap_or_default();
        print_success(&format!("{}{}{} [{}]", slug, optional, artifact, took));
      }
      UnitStatus::Failed => {
        let stage = report.stage.map(|s| s.to_string()).unwrap_or_else(|| "unknown".to_string());
        let reason = report.error.as_deref().unwrap_or("verification failed");
        print_failure(&format!("{}{} failed at {}: {} [{}]", slug, optional, stage, reason, took));
      }
      UnitStatus::Cancelled => print_warning(&format!("{} cancelled", slug)),
    }
  }

  for leaked in &run.leaked_envs {
    print_failure(&format!("environment {} was not destroyed: {}", leaked.name, leaked.error));
  }

  println!();
  match &run.publish {
    PublishOutcome::Skipped { reason } => print_stat("Publish", &format!("skipped ({})", reason)),
    PublishOutcome::Published(result) => print_stat(
      "Publish",
      &format!("{} artifact(s) to {}", result.uploaded.len(), result.index),
    ),
    PublishOutcome::Failed { error, uploaded } => print_stat(
      "Publish",
      &format!("failed after {} upload(s): {}", uploaded.len(), error),
    ),
  }
  print_stat("Artifacts", &artifacts_dir.display().to_string());

  if run.succeeded() {
    print_success("Pipeline succeeded");
  } else {
    print_failure("Pipeline failed");
  }
  Ok(())
}
