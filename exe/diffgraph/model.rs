use diffgraph::{
  nodes::{AdvancedIndexing, Constant, DynamicArray, ListVariable},
  Graph, NodeId, State,
};
use rand::{rngs::StdRng, Rng};

/// Demo assignment model.
///
/// Row `r` is assigned column `perm[r]` at `costs[r, perm[r]]`. A variable-size
/// list of picked columns earns `weights[c]` each, subtracted from the total.
#[derive(Debug)]
pub struct Model {
  pub graph: Graph,
  pub size: usize,
  pub perm: NodeId,
  pub picks: NodeId,
  pub assigned: NodeId,
  pub bonus: NodeId,
}

impl Model {
  pub fn build(size: usize, rng: &mut StdRng) -> diffgraph::Result<Self> {
    let mut graph = Graph::new();
    let costs: Vec<f64> = (0..size * size).map(|_| f64::from(rng.gen_range(0..100u8))).collect();
    let costs = graph.add(Constant::with_shape(costs, &[size, size])?)?;
    let rows = graph.add(Constant::vector((0..size).map(|r| r as f64).collect()))?;
    let perm = graph.add(ListVariable::new(size))?;
    let assigned = AdvancedIndexing::new(&graph, costs, vec![rows.into(), perm.into()])?;
    let assigned = graph.add(assigned)?;

    let weights: Vec<f64> = (0..size).map(|_| f64::from(rng.gen_range(0..20u8))).collect();
    let weights = graph.add(Constant::vector(weights))?;
    let last = size.saturating_sub(1) as f64;
    let picks = graph.add(DynamicArray::new(&[], 0.0, last, true, size)?)?;
    let bonus = AdvancedIndexing::new(&graph, weights, vec![picks.into()])?;
    let bonus = graph.add(bonus)?;

    Ok(Model {
      graph,
      size,
      perm,
      picks,
      assigned,
      bonus,
    })
  }

  /// Total assignment cost minus the picked weights, from the full buffers.
  pub fn objective(&self, state: &State) -> diffgraph::Result<f64> {
    let cost: f64 = self.graph.view(state, self.assigned)?.iter().sum();
    let bonus: f64 = self.graph.view(state, self.bonus)?.iter().sum();
    Ok(cost - bonus)
  }
}
