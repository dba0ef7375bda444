//! Terminal rendering for zbuild commands.

use std::time::Duration;

use anyhow::Context;
use clap::ValueEnum;
use owo_colors::{OwoColorize, Stream};
use serde::Serialize;

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

/// Leading marker of a status line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
  Done,
  Changed,
  Kept,
}

impl Status {
  fn marker(self) -> &'static str {
    match self {
      Status::Done => "✓",
      Status::Changed => "~",
      Status::Kept => "•",
    }
  }
}

/// Prints `message` after the colored marker of `status`.
pub fn status_line(status: Status, message: &str) {
  let marker = status.marker();
  let painted = match status {
    Status::Done => marker.if_supports_color(Stream::Stdout, |m| m.green()).to_string(),
    Status::Changed => marker.if_supports_color(Stream::Stdout, |m| m.yellow()).to_string(),
    Status::Kept => marker.if_supports_color(Stream::Stdout, |m| m.dimmed()).to_string(),
  };
  println!("{} {}", painted, message);
}

/// Prints an indented `label: value` pair.
pub fn field(label: &str, value: &str) {
  println!("  {}: {}", label.if_supports_color(Stream::Stdout, |l| l.dimmed()), value);
}

/// First 12 characters of a hash or digest.
pub fn short_hash(hash: &str) -> &str {
  hash.get(..12).unwrap_or(hash)
}

/// Human-readable elapsed time, rounded to the millisecond.
pub fn elapsed(duration: Duration) -> String {
  let millis = Duration::from_millis(duration.as_millis() as u64);
  humantime::format_duration(millis).to_string()
}

pub fn json<T: Serialize>(value: &T) -> anyhow::Result<()> {
  let out = serde_json::to_string_pretty(value).context("Failed to encode the output as JSON")?;
  println!("{}", out);
  Ok(())
}
