use std::{
  collections::HashSet,
  sync::atomic::{AtomicU64, Ordering},
};

use petgraph::{graph::DiGraph, Direction::Outgoing};
use tracing::{debug, instrument, trace, warn};

use crate::{
  array::{ArrayState, Update},
  error::{DataError, GraphError, Result, StructuralError},
  node::{ArrayNode, NodeId, Variable},
  state::{NodeState, State},
};

/// Edge weight: the position of the source node in the target's predecessor
/// list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dependency {
  pub input_order: usize,
}

// 0 is left for `State::default()`, which no graph accepts.
static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

/// Arena owning every node and edge of the computation.
///
/// Topology is fixed once a node is added, so a graph can be shared read-only
/// between any number of states.
#[derive(Debug)]
pub struct Graph {
  graph: DiGraph<Box<dyn ArrayNode>, Dependency>,
  token: u64,
}

impl Default for Graph {
  fn default() -> Self {
    Graph {
      graph: DiGraph::new(),
      token: NEXT_TOKEN.fetch_add(1, Ordering::Relaxed),
    }
  }
}

impl Graph {
  pub fn new() -> Self {
    Self::default()
  }

  /// Link `node` into the graph. Predecessors must already exist, which
  /// keeps ids in topological order.
  pub fn add<N: ArrayNode + 'static>(&mut self, node: N) -> Result<NodeId> {
    let predecessors = node.predecessors().to_vec();
    if let Some(missing) = predecessors.iter().find(|p| !self.contains(**p)) {
      return Err(StructuralError::UnknownPredecessor(*missing).into());
    }
    let name = node.name();
    let shape = node.shape().to_string();
    let id = NodeId(self.graph.add_node(Box::new(node)));
    for (input_order, p) in predecessors.iter().enumerate() {
      self.graph.add_edge(p.0, id.0, Dependency { input_order });
    }
    debug!(node = %id, kind = name, %shape, predecessors = predecessors.len(), "added node");
    Ok(id)
  }

  pub fn len(&self) -> usize {
    self.graph.node_count()
  }

  pub fn is_empty(&self) -> bool {
    self.graph.node_count() == 0
  }

  pub fn contains(&self, id: NodeId) -> bool {
    id.index() < self.graph.node_count()
  }

  pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
    self.graph.node_indices().map(NodeId)
  }

  pub fn node(&self, id: NodeId) -> Result<&dyn ArrayNode> {
    self
      .graph
      .node_weight(id.0)
      .map(|n| n.as_ref())
      .ok_or(GraphError::UnknownNode(id))
  }

  pub fn predecessors(&self, id: NodeId) -> Result<&[NodeId]> {
    Ok(self.node(id)?.predecessors())
  }

  pub fn successors(&self, id: NodeId) -> Result<Vec<NodeId>> {
    self.node(id)?;
    let mut out: Vec<NodeId> = self.graph.neighbors_directed(id.0, Outgoing).map(NodeId).collect();
    out.sort_unstable();
    out.dedup();
    Ok(out)
  }

  /// `roots` and everything reachable from them, in topological order.
  pub fn descendants(&self, roots: &[NodeId]) -> Result<Vec<NodeId>> {
    let mut seen: HashSet<NodeId> = HashSet::with_capacity(roots.len());
    let mut stack = Vec::with_capacity(roots.len());
    for root in roots {
      self.node(*root)?;
      if seen.insert(*root) {
        stack.push(*root);
      }
    }
    while let Some(id) = stack.pop() {
      for next in self.graph.neighbors_directed(id.0, Outgoing) {
        if seen.insert(NodeId(next)) {
          stack.push(NodeId(next));
        }
      }
    }
    let mut order: Vec<NodeId> = seen.into_iter().collect();
    order.sort_unstable();
    Ok(order)
  }

  pub(crate) fn inner(&self) -> &DiGraph<Box<dyn ArrayNode>, Dependency> {
    &self.graph
  }

  // States *******************************************************************

  /// A state with no node initialized yet, ready for per-leaf seeding.
  pub fn empty_state(&self) -> State {
    State::with_len(self.len(), self.token)
  }

  /// Initialize every node with its default value.
  pub fn initialize_state(&self) -> Result<State> {
    let mut state = self.empty_state();
    self.initialize_remaining(&mut state)?;
    Ok(state)
  }

  /// Seed a decision variable with explicit values before the graph-wide
  /// initialization.
  pub fn seed_node(&self, state: &mut State, id: NodeId, values: Vec<f64>) -> Result<()> {
    self.check_state(state)?;
    let node = self.node(id)?;
    let variable = node.variable().ok_or(GraphError::NotMutable(id, node.name()))?;
    if state.is_initialized(id) {
      return Err(GraphError::AlreadyInitialized(id));
    }
    let array = variable.seed(values).map_err(|e| GraphError::data(id, e))?;
    state.nodes[id.index()] = Some(NodeState::Array(array));
    Ok(())
  }

  /// Initialize every node not seeded yet, in topological order.
  #[instrument(level = "debug", skip_all)]
  pub fn initialize_remaining(&self, state: &mut State) -> Result<()> {
    self.check_state(state)?;
    for id in self.ids() {
      if state.is_initialized(id) {
        continue;
      }
      let node = self.node(id)?;
      let (done, rest) = state.nodes.split_at_mut(id.index());
      let inputs = gather_inputs(node, done)?;
      let initial = node.initialize(&inputs).map_err(|e| GraphError::data(id, e))?;
      rest[0] = Some(initial);
    }
    Ok(())
  }

  /// Recompute the nodes reachable from `roots` (every node when `None`).
  ///
  /// A node is visited when it is one of the roots or when one of its
  /// predecessors has a pending diff. After an error the state must be
  /// discarded.
  #[instrument(level = "debug", skip_all, fields(roots = roots.map(<[NodeId]>::len)))]
  pub fn propagate(&self, state: &mut State, roots: Option<&[NodeId]>) -> Result<()> {
    self.check_state(state)?;
    let (order, explicit): (Vec<NodeId>, HashSet<NodeId>) = match roots {
      Some(roots) => (self.descendants(roots)?, roots.iter().copied().collect()),
      None => (self.ids().collect(), HashSet::new()),
    };
    for id in order {
      let node = self.node(id)?;
      let (done, rest) = state.nodes.split_at_mut(id.index());
      let inputs = gather_inputs(node, done)?;
      let changed = explicit.contains(&id) || inputs.iter().any(|i| i.has_changes());
      if !changed {
        continue;
      }
      let own = rest[0].as_mut().ok_or(GraphError::Uninitialized(id))?;
      trace!(node = %id, kind = node.name(), "propagate");
      if let Err(source) = node.propagate(&inputs, own) {
        warn!(node = %id, kind = node.name(), error = %source, "propagation failed");
        return Err(GraphError::data(id, source));
      }
    }
    Ok(())
  }

  /// Accept pending diffs of `roots` and their descendants (every node when
  /// `None`) as the new baseline.
  #[instrument(level = "debug", skip_all)]
  pub fn commit(&self, state: &mut State, roots: Option<&[NodeId]>) -> Result<()> {
    self.finish(state, roots, |node, own| node.commit(own))
  }

  /// Undo pending diffs of `roots` and their descendants (every node when
  /// `None`).
  #[instrument(level = "debug", skip_all)]
  pub fn revert(&self, state: &mut State, roots: Option<&[NodeId]>) -> Result<()> {
    self.finish(state, roots, |node, own| node.revert(own))
  }

  fn finish(
    &self,
    state: &mut State,
    roots: Option<&[NodeId]>,
    step: impl Fn(&dyn ArrayNode, &mut NodeState),
  ) -> Result<()> {
    self.check_state(state)?;
    let order = match roots {
      Some(roots) => self.descendants(roots)?,
      None => self.ids().collect(),
    };
    for id in order {
      let node = self.node(id)?;
      let own = state.nodes[id.index()]
        .as_mut()
        .ok_or(GraphError::Uninitialized(id))?;
      step(node, own);
    }
    Ok(())
  }

  fn check_state(&self, state: &State) -> Result<()> {
    if state.graph != self.token {
      return Err(GraphError::ForeignState);
    }
    if state.len() != self.len() {
      return Err(GraphError::StateMismatch {
        state: state.len(),
        graph: self.len(),
      });
    }
    Ok(())
  }

  // Reads ********************************************************************

  fn array<'s>(&self, state: &'s State, id: NodeId) -> Result<&'s ArrayState> {
    self.check_state(state)?;
    self.node(id)?;
    state
      .node(id)
      .map(NodeState::array)
      .ok_or(GraphError::Uninitialized(id))
  }

  /// Current values in row-major order.
  pub fn view<'s>(&self, state: &'s State, id: NodeId) -> Result<&'s [f64]> {
    Ok(self.array(state, id)?.view())
  }

  /// Changes since the last commit, in the order they were made.
  pub fn diff<'s>(&self, state: &'s State, id: NodeId) -> Result<&'s [Update]> {
    Ok(self.array(state, id)?.diff())
  }

  pub fn size(&self, state: &State, id: NodeId) -> Result<usize> {
    Ok(self.array(state, id)?.len())
  }

  /// Net change in element count since the last commit.
  pub fn size_diff(&self, state: &State, id: NodeId) -> Result<isize> {
    Ok(self.array(state, id)?.size_diff())
  }

  /// Concrete dims in this state.
  pub fn shape(&self, state: &State, id: NodeId) -> Result<Vec<usize>> {
    let size = self.size(state, id)?;
    Ok(self.node(id)?.shape().resolve(size))
  }

  // Mutations ****************************************************************

  fn mutate(
    &self,
    state: &mut State,
    id: NodeId,
    op: impl FnOnce(&dyn Variable, &mut ArrayState) -> Result<(), DataError>,
  ) -> Result<()> {
    self.check_state(state)?;
    let node = self.node(id)?;
    let variable = node.variable().ok_or(GraphError::NotMutable(id, node.name()))?;
    let own = state.nodes[id.index()]
      .as_mut()
      .ok_or(GraphError::Uninitialized(id))?;
    op(variable, own.array_mut()).map_err(|e| GraphError::data(id, e))
  }

  pub fn set(&self, state: &mut State, id: NodeId, index: usize, value: f64) -> Result<()> {
    self.mutate(state, id, |v, s| v.set(s, index, value))
  }

  pub fn exchange(&self, state: &mut State, id: NodeId, i: usize, j: usize) -> Result<()> {
    self.mutate(state, id, |v, s| v.exchange(s, i, j))
  }

  pub fn grow(&self, state: &mut State, id: NodeId, values: &[f64]) -> Result<()> {
    self.mutate(state, id, |v, s| v.grow(s, values))
  }

  pub fn shrink(&self, state: &mut State, id: NodeId) -> Result<()> {
    self.mutate(state, id, |v, s| v.shrink(s))
  }
}

fn gather_inputs<'s>(node: &dyn ArrayNode, done: &'s [Option<NodeState>]) -> Result<Vec<&'s ArrayState>> {
  node
    .predecessors()
    .iter()
    .map(|p| {
      done
        .get(p.index())
        .and_then(Option::as_ref)
        .map(NodeState::array)
        .ok_or(GraphError::Uninitialized(*p))
    })
    .collect()
}
