use serde::Deserialize;
use std::{error::Error, fs, path::Path, path::PathBuf};

/// Settings of the `walk` subcommand.
/// Also defines the config file format (Option fields can be omitted).
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
  /// Number of proposed moves
  pub iterations: Option<usize>,
  /// Seed of the move generator and of the demo data
  pub seed: Option<u64>,
  /// Rows and columns of the assignment problem
  pub size: Option<usize>,
  /// Replay every diff and recompute the objective from scratch
  pub audit: Option<bool>,
  /// Where to write the JSON report
  pub report: Option<PathBuf>,
}

impl AppConfig {
  pub fn from_file(path: &Path) -> Result<Self, Box<dyn Error>> {
    let text = fs::read_to_string(path)?;
    Ok(serde_yaml::from_str(&text)?)
  }

  // merge configs where the second overwrites the first
  pub fn merge(self, other: Self) -> Self {
    Self {
      iterations: other.iterations.or(self.iterations),
      seed: other.seed.or(self.seed),
      size: other.size.or(self.size),
      audit: other.audit.or(self.audit),
      report: other.report.or(self.report),
    }
  }

  pub fn iterations(&self) -> usize {
    self.iterations.unwrap_or(1000)
  }

  pub fn seed(&self) -> u64 {
    self.seed.unwrap_or(0)
  }

  pub fn size(&self) -> usize {
    self.size.unwrap_or(8)
  }

  pub fn audit(&self) -> bool {
    self.audit.unwrap_or(false)
  }
}
