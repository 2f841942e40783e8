//! Implementation of the `wheelhouse plan` command.
//!
//! Expands the configured matrix and prints the units a run would execute.

use std::path::Path;

use anyhow::Result;

use wheelhouse_lib::matrix::BuildKind;

use super::load_config;
use crate::output::{OutputFormat, print_info, print_json, print_stat, symbols};

pub fn cmd_plan(config_path: &Path, output: OutputFormat) -> Result<()> {
  let config = load_config(config_path)?;
  let units = config.effective_matrix().expand()?;

  if output.is_json() {
    return print_json(&units);
  }

  print_info(&format!("{} unit(s)", units.len()));
  for unit in &units {
    let mut line = format!("  {} {}", symbols::INFO, unit.id().slug());
    if unit.build_kind == BuildKind::Wheel && !unit.toolchain_generator.is_empty() {
      line.push_str(&format!(" {} {}", symbols::ARROW, unit.toolchain_generator));
    }
    if !unit.required {
      line.push_str(" (optional)");
    }
    println!("{}", line);
  }

  println!();
  print_stat("Source", &config.source_dir.display().to_string());
  print_stat("Artifacts", &config.artifacts_dir.display().to_string());
  print_stat("Max parallel", &config.max_parallel.to_string());

  Ok(())
}
