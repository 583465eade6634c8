use diffgraph::{
  nodes::{AdvancedIndexing, BasicIndex, BasicIndexing, DynamicArray, IntegerVariable, Slice},
  utils, Graph,
};
use rand::{rngs::StdRng, Rng, SeedableRng};
use tracing::info;

// Random single-cell moves on a 4x4 integer grid, watching a row slice and a
// gather driven by a growing list of flat positions.
pub fn main() -> Result<(), Box<dyn std::error::Error>> {
  utils::init_logging()?;
  let mut rng = StdRng::seed_from_u64(7);

  let mut graph = Graph::new();
  let grid = graph.add(IntegerVariable::new(&[4, 4], 0.0, 9.0)?)?;
  let row = BasicIndexing::new(
    &graph,
    grid,
    vec![BasicIndex::Index(2), BasicIndex::Slice(Slice::new(None, None, Some(2)))],
  )?;
  let row = graph.add(row)?;
  let which = graph.add(DynamicArray::new(&[], 0.0, 3.0, true, 4)?)?;
  let column = AdvancedIndexing::new(&graph, grid, vec![which.into(), Slice::full().into()])?;
  let column = graph.add(column)?;

  let mut state = graph.empty_state();
  let seed: Vec<f64> = (0..16).map(|_| f64::from(rng.gen_range(0..10u8))).collect();
  graph.seed_node(&mut state, grid, seed)?;
  graph.initialize_remaining(&mut state)?;

  for step in 0..8 {
    let cell = rng.gen_range(0..16);
    graph.set(&mut state, grid, cell, f64::from(rng.gen_range(0..10u8)))?;
    if graph.size(&state, which)? < 4 {
      graph.grow(&mut state, which, &[f64::from(rng.gen_range(0..4u8))])?;
    }
    graph.propagate(&mut state, Some(&[grid, which]))?;
    info!(
      step,
      cell,
      row = ?graph.view(&state, row)?,
      row_changes = graph.diff(&state, row)?.len(),
      gathered = ?graph.view(&state, column)?,
      "after move"
    );
    graph.commit(&mut state, None)?;
  }
  Ok(())
}
