use std::fmt;

use petgraph::graph::NodeIndex;

use crate::{
  array::ArrayState,
  error::DataError,
  shape::Shape,
  state::NodeState,
};

/// Handle to a node owned by a [`Graph`](crate::graph::Graph).
///
/// Ids are handed out in insertion order, and a node can only depend on nodes
/// added before it, so ascending id order is a topological order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) NodeIndex);

impl NodeId {
  pub fn index(&self) -> usize {
    self.0.index()
  }
}

impl fmt::Display for NodeId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "#{}", self.0.index())
  }
}

/// Capability shared by every array-producing node.
///
/// A node only describes how to compute; all evaluation data lives in a
/// `State`. `inputs` are the predecessors' states in the order given by
/// [`ArrayNode::predecessors`].
pub trait ArrayNode: fmt::Debug + Send + Sync {
  fn name(&self) -> &'static str;

  fn predecessors(&self) -> &[NodeId];

  /// State-independent shape. A dynamic axis is resolved per state.
  fn shape(&self) -> &Shape;

  fn min(&self) -> f64;

  fn max(&self) -> f64;

  /// Whether every value the node can take is an integer.
  fn integral(&self) -> bool;

  /// Upper bound on the number of elements the node holds in any state.
  fn max_size(&self) -> usize;

  fn initialize(&self, inputs: &[&ArrayState]) -> Result<NodeState, DataError>;

  /// Bring `state` up to date with the predecessors' current buffers and
  /// pending diffs, appending to the node's own diff.
  fn propagate(&self, _inputs: &[&ArrayState], _state: &mut NodeState) -> Result<(), DataError> {
    Ok(())
  }

  fn commit(&self, state: &mut NodeState) {
    state.commit();
  }

  fn revert(&self, state: &mut NodeState) {
    state.revert();
  }

  /// Mutation entry points, for nodes that are decision variables.
  fn variable(&self) -> Option<&dyn Variable> {
    None
  }
}

/// Leaf nodes that a search loop mutates directly.
///
/// Mutations append to the node's own diff and are only meaningful before the
/// next `propagate` of the state.
pub trait Variable {
  /// Build an initial state from explicit values.
  fn seed(&self, values: Vec<f64>) -> Result<ArrayState, DataError>;

  fn set(&self, _state: &mut ArrayState, _index: usize, _value: f64) -> Result<(), DataError> {
    Err(DataError::UnsupportedMutation("set"))
  }

  fn exchange(&self, _state: &mut ArrayState, _i: usize, _j: usize) -> Result<(), DataError> {
    Err(DataError::UnsupportedMutation("exchange"))
  }

  /// Append whole rows.
  fn grow(&self, _state: &mut ArrayState, _values: &[f64]) -> Result<(), DataError> {
    Err(DataError::UnsupportedMutation("grow"))
  }

  /// Remove exactly one row from the tail.
  fn shrink(&self, _state: &mut ArrayState) -> Result<(), DataError> {
    Err(DataError::UnsupportedMutation("shrink"))
  }
}
