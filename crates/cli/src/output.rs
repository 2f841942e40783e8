//! Terminal output: status lines for humans, pretty JSON for machines.

use std::time::Duration;

use anyhow::Context;
use clap::ValueEnum;
use owo_colors::{OwoColorize, Stream};

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
  #[default]
  Text,
  Json,
}

impl OutputFormat {
  pub fn is_json(self) -> bool {
    matches!(self, OutputFormat::Json)
  }
}

pub mod symbols {
  pub const SUCCESS: &str = "✓";
  pub const ERROR: &str = "✗";
  pub const WARNING: &str = "⚠";
  pub const INFO: &str = "•";
  pub const ARROW: &str = "→";
}

/// Kind of status line; decides symbol, color and stream.
#[derive(Debug, Clone, Copy)]
enum Status {
  Success,
  Failure,
  Error,
  Warning,
  Info,
}

impl Status {
  fn symbol(self) -> &'static str {
    match self {
      Status::Success => symbols::SUCCESS,
      Status::Failure | Status::Error => symbols::ERROR,
      Status::Warning => symbols::WARNING,
      Status::Info => symbols::INFO,
    }
  }

  fn print(self, message: &str) {
    let symbol = self.symbol();
    match self {
      Status::Success => println!("{} {}", symbol.if_supports_color(Stream::Stdout, |s| s.green()), message),
      Status::Failure => println!("{} {}", symbol.if_supports_color(Stream::Stdout, |s| s.red()), message),
      Status::Info => println!("{} {}", symbol.if_supports_color(Stream::Stdout, |s| s.blue()), message),
      Status::Error => eprintln!(
        "{} {}",
        symbol.if_supports_color(Stream::Stderr, |s| s.red()),
        message.if_supports_color(Stream::Stderr, |s| s.red())
      ),
      Status::Warning => eprintln!(
        "{} {}",
        symbol.if_supports_color(Stream::Stderr, |s| s.yellow()),
        message.if_supports_color(Stream::Stderr, |s| s.yellow())
      ),
    }
  }
}

pub fn print_success(message: &str) {
  Status::Success.print(message);
}

/// A failed unit or run; goes to stdout with the rest of the report.
pub fn print_failure(message: &str) {
  Status::Failure.print(message);
}

pub fn print_error(message: &str) {
  Status::Error.print(message);
}

pub fn print_warning(message: &str) {
  Status::Warning.print(message);
}

pub fn print_info(message: &str) {
  Status::Info.print(message);
}

pub fn print_stat(label: &str, value: &str) {
  println!("  {}: {}", label.if_supports_color(Stream::Stdout, |s| s.dimmed()), value);
}

pub fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
  let json = serde_json::to_string_pretty(value).context("Failed to serialize to JSON")?;
  println!("{}", json);
  Ok(())
}

pub fn format_bytes(bytes: u64) -> String {
  const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];

  if bytes < 1024 {
    return format!("{} B", bytes);
  }
  let mut value = bytes as f64 / 1024.0;
  let mut unit = 0;
  while value >= 1024.0 && unit < UNITS.len() - 1 {
    value /= 1024.0;
    unit += 1;
  }
  format!("{:.1} {}", value, UNITS[unit])
}

/// Unit durations at millisecond precision, e.g. `1m 5s 20ms`.
pub fn format_millis(millis: u64) -> String {
  humantime::format_duration(Duration::from_millis(millis)).to_string()
}
