use std::error::Error;

use diffgraph::{array::apply_diff, Graph, NodeId, State, Update};
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::{app_config::AppConfig, model::Model};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Move {
  Exchange(usize, usize),
  Grow(usize),
  Shrink,
  Set(usize, usize),
}

#[derive(Debug, Default, Serialize)]
pub struct MoveCounts {
  pub exchange: usize,
  pub grow: usize,
  pub shrink: usize,
  pub set: usize,
}

#[derive(Debug, Serialize)]
pub struct Report {
  pub size: usize,
  pub seed: u64,
  pub iterations: usize,
  pub audited: bool,
  pub initial: f64,
  pub best: f64,
  pub objective: f64,
  pub accepted: usize,
  pub rejected: usize,
  pub moves: MoveCounts,
  pub assignment: Vec<f64>,
  pub picks: Vec<f64>,
}

/// Net change of the sum of an array, read from its diff.
fn sum_delta(diff: &[Update]) -> f64 {
  diff
    .iter()
    .map(|u| u.value.unwrap_or(0.0) - u.old.unwrap_or(0.0))
    .sum()
}

fn propose(rng: &mut StdRng, size: usize, picked: usize) -> Move {
  match rng.gen_range(0..4) {
    1 if picked < size => Move::Grow(rng.gen_range(0..size)),
    2 if picked > 0 => Move::Shrink,
    3 if picked > 0 => Move::Set(rng.gen_range(0..picked), rng.gen_range(0..size)),
    _ => Move::Exchange(rng.gen_range(0..size), rng.gen_range(0..size)),
  }
}

/// Views of the objective terms before a move, for replay checks.
struct Snapshot {
  assigned: Vec<f64>,
  bonus: Vec<f64>,
}

fn audit(model: &Model, state: &State, before: &Snapshot, expected: f64) -> Result<(), Box<dyn Error>> {
  let graph: &Graph = &model.graph;
  for (id, prior) in [(model.assigned, &before.assigned), (model.bonus, &before.bonus)] {
    let replayed = apply_diff(prior, graph.diff(state, id)?);
    if replayed != graph.view(state, id)? {
      return Err(format!("diff of node {id} does not replay onto its previous buffer").into());
    }
  }
  let recomputed = model.objective(state)?;
  if (recomputed - expected).abs() > 1e-9 {
    return Err(format!("incremental objective {expected} disagrees with recomputed {recomputed}").into());
  }
  Ok(())
}

#[instrument(skip_all, fields(size = config.size(), iterations = config.iterations()))]
pub fn run(config: &AppConfig) -> Result<Report, Box<dyn Error>> {
  let mut rng = StdRng::seed_from_u64(config.seed());
  let model = Model::build(config.size(), &mut rng)?;
  let graph = &model.graph;
  let mut state = graph.initialize_state()?;

  let initial = model.objective(&state)?;
  let mut objective = initial;
  let mut best = initial;
  let (mut accepted, mut rejected) = (0, 0);
  let mut moves = MoveCounts::default();
  info!(objective, "starting walk");

  for step in 0..config.iterations() {
    if model.size == 0 {
      break;
    }
    let picked = graph.size(&state, model.picks)?;
    let mv = propose(&mut rng, model.size, picked);
    let before = config.audit().then(|| -> Result<Snapshot, Box<dyn Error>> {
      Ok(Snapshot {
        assigned: graph.view(&state, model.assigned)?.to_vec(),
        bonus: graph.view(&state, model.bonus)?.to_vec(),
      })
    });
    let before = before.transpose()?;

    let root: NodeId = match mv {
      Move::Exchange(i, j) => {
        moves.exchange += 1;
        graph.exchange(&mut state, model.perm, i, j)?;
        model.perm
      }
      Move::Grow(column) => {
        moves.grow += 1;
        graph.grow(&mut state, model.picks, &[column as f64])?;
        model.picks
      }
      Move::Shrink => {
        moves.shrink += 1;
        graph.shrink(&mut state, model.picks)?;
        model.picks
      }
      Move::Set(position, column) => {
        moves.set += 1;
        graph.set(&mut state, model.picks, position, column as f64)?;
        model.picks
      }
    };
    graph.propagate(&mut state, Some(&[root]))?;

    let delta = sum_delta(graph.diff(&state, model.assigned)?) - sum_delta(graph.diff(&state, model.bonus)?);
    if let Some(before) = &before {
      audit(&model, &state, before, objective + delta)?;
    }

    if delta <= 0.0 {
      graph.commit(&mut state, Some(&[root]))?;
      objective += delta;
      accepted += 1;
    } else {
      graph.revert(&mut state, Some(&[root]))?;
      rejected += 1;
    }
    best = best.min(objective);
    debug!(step, ?mv, delta, objective, "move");
  }

  info!(objective, best, accepted, rejected, "walk finished");
  Ok(Report {
    size: model.size,
    seed: config.seed(),
    iterations: config.iterations(),
    audited: config.audit(),
    initial,
    best,
    objective,
    accepted,
    rejected,
    moves,
    assignment: graph.view(&state, model.perm)?.to_vec(),
    picks: graph.view(&state, model.picks)?.to_vec(),
  })
}
