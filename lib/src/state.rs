use crate::{array::ArrayState, node::NodeId, nodes::indexing::IndexedState};

/// Evaluation data of one node.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeState {
  Array(ArrayState),
  /// Buffer plus the coordinate mapping of an advanced indexing node.
  Indexed(IndexedState),
}

impl NodeState {
  pub fn array(&self) -> &ArrayState {
    match self {
      NodeState::Array(array) => array,
      NodeState::Indexed(indexed) => indexed.array(),
    }
  }

  pub(crate) fn array_mut(&mut self) -> &mut ArrayState {
    match self {
      NodeState::Array(array) => array,
      NodeState::Indexed(indexed) => indexed.array_mut(),
    }
  }

  pub fn commit(&mut self) {
    match self {
      NodeState::Array(array) => array.commit(),
      NodeState::Indexed(indexed) => indexed.commit(),
    }
  }

  pub fn revert(&mut self) {
    match self {
      NodeState::Array(array) => array.revert(),
      NodeState::Indexed(indexed) => indexed.revert(),
    }
  }
}

/// One evaluation context over a graph.
///
/// A state refers to nodes by id only. Several states can be evaluated
/// against the same graph, each owning its buffers exclusively. The state
/// remembers which graph created it and is rejected by any other.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct State {
  pub(crate) nodes: Vec<Option<NodeState>>,
  pub(crate) graph: u64,
}

impl State {
  pub(crate) fn with_len(len: usize, graph: u64) -> Self {
    State {
      nodes: vec![None; len],
      graph,
    }
  }

  pub fn len(&self) -> usize {
    self.nodes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.nodes.is_empty()
  }

  pub fn is_initialized(&self, id: NodeId) -> bool {
    matches!(self.nodes.get(id.index()), Some(Some(_)))
  }

  pub fn node(&self, id: NodeId) -> Option<&NodeState> {
    self.nodes.get(id.index()).and_then(Option::as_ref)
  }
}
