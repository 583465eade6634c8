mod app_config;
mod model;
mod walk;

use app_config::AppConfig;
use clap::{Parser, Subcommand, ValueEnum};
use diffgraph::{export, utils};
use model::Model;
use rand::{rngs::StdRng, SeedableRng};
use std::{error::Error, fs, path::PathBuf};
use tracing::info;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
  #[command(subcommand)]
  command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
  Dot,
  Graphml,
}

#[derive(Subcommand)]
enum Command {
  /// Local search over the demo assignment model
  Walk {
    /// YAML file with walk settings, overridden by the flags below
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,
    #[arg(short, long, value_name = "INT")]
    iterations: Option<usize>,
    #[arg(long, value_name = "INT")]
    seed: Option<u64>,
    #[arg(long, value_name = "INT")]
    size: Option<usize>,
    /// Check every diff against a full recomputation
    #[arg(long)]
    audit: bool,
    /// Write the JSON report here
    #[arg(short, long, value_name = "PATH")]
    report: Option<PathBuf>,
  },
  /// Dump the demo model graph
  Export {
    #[arg(short, long, value_enum, default_value_t = Format::Dot)]
    format: Format,
    #[arg(short, long, value_name = "PATH")]
    out: PathBuf,
    #[arg(long, value_name = "INT", default_value_t = 4)]
    size: usize,
    #[arg(long, value_name = "INT", default_value_t = 0)]
    seed: u64,
  },
}

fn main() -> Result<(), Box<dyn Error>> {
  utils::init_logging()?;
  let args = Cli::parse();

  match args.command {
    Command::Walk {
      config,
      iterations,
      seed,
      size,
      audit,
      report,
    } => {
      let file_config = match config {
        Some(path) => AppConfig::from_file(&path)?,
        None => AppConfig::default(),
      };
      let cli_config = AppConfig {
        iterations,
        seed,
        size,
        audit: audit.then_some(true),
        report,
      };
      let config = file_config.merge(cli_config);
      let outcome = walk::run(&config)?;
      println!(
        "objective {} -> {} ({} accepted, {} rejected)",
        outcome.initial, outcome.objective, outcome.accepted, outcome.rejected
      );
      if let Some(path) = &config.report {
        utils::serialize_to_file(path, &outcome)?;
        info!(path = %path.display(), "report written");
      }
    }
    Command::Export {
      format,
      out,
      size,
      seed,
    } => {
      let mut rng = StdRng::seed_from_u64(seed);
      let model = Model::build(size, &mut rng)?;
      match format {
        Format::Dot => export::save_graphviz(&out, &model.graph)?,
        Format::Graphml => fs::write(&out, export::to_graphml(&model.graph)?)?,
      }
      info!(path = %out.display(), nodes = model.graph.len(), "graph exported");
    }
  }
  Ok(())
}
