use thiserror::Error;

use crate::node::NodeId;

/// Contract violations detected while a node is being built.
///
/// These never touch a `State`: the offending node is rejected before it is
/// linked into the graph, so the graph stays valid.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StructuralError {
  #[error("a shape may have at most one dynamic axis, and only on axis 0 (got {0:?})")]
  InvalidDynamicAxis(Vec<Option<usize>>),

  #[error("expected {expected} index specifiers, got {got}")]
  SpecifierCount { expected: usize, got: usize },

  #[error("axis {axis} is out of range for a rank-{ndim} array")]
  AxisOutOfRange { axis: usize, ndim: usize },

  #[error("index {index} is out of range for an axis of extent {extent}")]
  IndexOutOfRange { index: isize, extent: usize },

  #[error("slice step cannot be zero")]
  ZeroStep,

  #[error("only a full slice is allowed on a dynamic axis")]
  DynamicAxisNotFullySliced,

  #[error("a scalar index on a dynamic axis is ambiguous under resizing")]
  ScalarIndexOnDynamicAxis,

  #[error("advanced indexing needs at least one index array")]
  NoIndexArrays,

  #[error("index arrays must form one contiguous block of axes")]
  NonContiguousIndices,

  #[error("multi-dimensional index arrays cannot be combined with slices")]
  MultiDimensionalWithSlices,

  #[error("index arrays must share one shape, got {0} and {1}")]
  IndexShapeMismatch(String, String),

  #[error("dynamic index arrays must index a block that starts at axis 0")]
  DynamicIndexBlockNotLeading,

  #[error("predecessor {0} is not part of the graph")]
  UnknownPredecessor(NodeId),

  #[error("invalid parameter: {0}")]
  InvalidParameter(String),
}

/// Failures that depend on the values held in a `State`.
///
/// A state that returned one of these from `propagate` must be discarded or
/// fully reinitialized.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DataError {
  #[error("index value {value} at position {position} is out of bounds for an axis of extent {extent}")]
  IndexOutOfBounds { position: usize, value: f64, extent: usize },

  #[error("index arrays disagree on their current size: {0:?}")]
  MismatchedIndexSizes(Vec<usize>),

  #[error("position {position} is out of range for an array of size {size}")]
  PositionOutOfRange { position: usize, size: usize },

  #[error("value {value} is outside the domain of the node")]
  ValueOutOfDomain { value: f64 },

  #[error("expected {expected} values, got {got}")]
  WrongValueCount { expected: usize, got: usize },

  #[error("growing to {requested} rows exceeds the maximum of {max}")]
  CapacityExceeded { requested: usize, max: usize },

  #[error("cannot shrink below {min} rows")]
  BelowMinimumSize { min: usize },

  #[error("{0} is not supported by this node")]
  UnsupportedMutation(&'static str),

  #[error("node state does not match the node kind")]
  StateKindMismatch,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum GraphError {
  #[error(transparent)]
  Structural(#[from] StructuralError),

  #[error("node {node}: {source}")]
  Data { node: NodeId, source: DataError },

  #[error("node {0} does not exist")]
  UnknownNode(NodeId),

  #[error("node {0} has not been initialized in this state")]
  Uninitialized(NodeId),

  #[error("node {0} is already initialized in this state")]
  AlreadyInitialized(NodeId),

  #[error("state holds {state} nodes but the graph has {graph}")]
  StateMismatch { state: usize, graph: usize },

  #[error("state was created for a different graph")]
  ForeignState,

  #[error("node {0} ({1}) does not support this mutation")]
  NotMutable(NodeId, &'static str),
}

impl GraphError {
  pub fn data(node: NodeId, source: DataError) -> Self {
    GraphError::Data { node, source }
  }
}

pub type Result<T, E = GraphError> = std::result::Result<T, E>;
