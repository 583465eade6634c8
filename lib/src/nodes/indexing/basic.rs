use std::collections::HashMap;

use crate::{
  array::ArrayState,
  error::{DataError, GraphError, StructuralError},
  graph::Graph,
  node::{ArrayNode, NodeId},
  shape::Shape,
  state::NodeState,
};

use super::{slice_offsets, Slice};

/// One axis of a basic indexing expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BasicIndex {
  /// Select one coordinate and drop the axis. Negative values count from the
  /// end.
  Index(isize),
  Slice(Slice),
}

impl From<isize> for BasicIndex {
  fn from(index: isize) -> Self {
    BasicIndex::Index(index)
  }
}

impl From<Slice> for BasicIndex {
  fn from(slice: Slice) -> Self {
    BasicIndex::Slice(slice)
  }
}

/// `source[i0, i1, ...]` with scalar indices and slices only.
///
/// The element mapping is fixed at construction. A dynamic source keeps its
/// dynamic axis, and every source row maps to one output row.
#[derive(Debug, Clone)]
pub struct BasicIndexing {
  predecessors: [NodeId; 1],
  shape: Shape,
  dynamic: bool,
  /// Source offset, within one block, of every output element of that block.
  /// A block is one row when the source is dynamic and the whole array
  /// otherwise.
  forward: Vec<usize>,
  backward: HashMap<usize, usize>,
  source_block: usize,
  min: f64,
  max: f64,
  integral: bool,
  max_size: usize,
}

impl BasicIndexing {
  pub fn new(graph: &Graph, source: NodeId, specifiers: Vec<BasicIndex>) -> Result<Self, GraphError> {
    let node = graph.node(source)?;
    let source_shape = node.shape();
    let ndim = source_shape.ndim();
    if specifiers.len() > ndim {
      return Err(StructuralError::AxisOutOfRange { axis: ndim, ndim }.into());
    }
    let dynamic = source_shape.is_dynamic();
    let strides = source_shape.strides();

    let mut base = 0;
    let mut kept = Vec::new();
    let mut extents = Vec::new();
    for axis in 0..ndim {
      let index = specifiers.get(axis).copied().unwrap_or(BasicIndex::Slice(Slice::full()));
      match (source_shape.extents()[axis], index) {
        (None, BasicIndex::Index(_)) => {
          return Err(StructuralError::ScalarIndexOnDynamicAxis.into())
        }
        (None, BasicIndex::Slice(s)) if !s.is_full() => {
          return Err(StructuralError::DynamicAxisNotFullySliced.into())
        }
        // rows are enumerated per state
        (None, BasicIndex::Slice(_)) => extents.push(None),
        (Some(extent), BasicIndex::Index(i)) => {
          let wrapped = if i < 0 { i + extent as isize } else { i };
          if wrapped < 0 || wrapped >= extent as isize {
            return Err(StructuralError::IndexOutOfRange { index: i, extent }.into());
          }
          base += wrapped as usize * strides[axis];
        }
        (Some(extent), BasicIndex::Slice(s)) => {
          let resolved = s.resolve(extent)?;
          extents.push(Some(resolved.len()));
          kept.push((resolved, strides[axis]));
        }
      }
    }

    let shape = Shape::from_extents(extents)?;
    let forward = slice_offsets(base, &kept);
    let backward = forward.iter().enumerate().map(|(p, s)| (*s, p)).collect();
    let source_block = if dynamic { source_shape.row_size() } else { 0 };
    let max_size = match dynamic {
      true if source_block > 0 => node.max_size() / source_block * forward.len(),
      true => 0,
      false => forward.len(),
    };
    Ok(BasicIndexing {
      predecessors: [source],
      shape,
      dynamic,
      forward,
      backward,
      source_block,
      min: node.min(),
      max: node.max(),
      integral: node.integral(),
      max_size,
    })
  }

  fn block(&self) -> usize {
    self.forward.len()
  }

  fn size_for(&self, source: &ArrayState) -> usize {
    match self.dynamic {
      true if self.source_block > 0 => source.len() / self.source_block * self.block(),
      true => 0,
      false => self.block(),
    }
  }

  fn source_offset(&self, position: usize) -> usize {
    let (row, inner) = (position / self.block(), position % self.block());
    row * self.source_block + self.forward[inner]
  }

  /// Output position reading source element `offset`, if any.
  fn position_of(&self, offset: usize) -> Option<usize> {
    let (row, inner) = match self.dynamic {
      true if self.source_block == 0 => return None,
      true => (offset / self.source_block, offset % self.source_block),
      false => (0, offset),
    };
    self.backward.get(&inner).map(|p| row * self.block() + p)
  }
}

impl ArrayNode for BasicIndexing {
  fn name(&self) -> &'static str {
    "BasicIndexing"
  }

  fn predecessors(&self) -> &[NodeId] {
    &self.predecessors
  }

  fn shape(&self) -> &Shape {
    &self.shape
  }

  fn min(&self) -> f64 {
    self.min
  }

  fn max(&self) -> f64 {
    self.max
  }

  fn integral(&self) -> bool {
    self.integral
  }

  fn max_size(&self) -> usize {
    self.max_size
  }

  fn initialize(&self, inputs: &[&ArrayState]) -> Result<NodeState, DataError> {
    let source = inputs[0];
    let values = (0..self.size_for(source))
      .map(|p| source.view()[self.source_offset(p)])
      .collect();
    Ok(NodeState::Array(ArrayState::with_capacity(values, self.max_size)))
  }

  fn propagate(&self, inputs: &[&ArrayState], state: &mut NodeState) -> Result<(), DataError> {
    let NodeState::Array(own) = state else {
      return Err(DataError::StateKindMismatch);
    };
    let source = inputs[0];
    let new_size = self.size_for(source);
    let keep = own.len().min(new_size);

    let mut affected: Vec<usize> = source
      .diff()
      .iter()
      .filter_map(|u| self.position_of(u.index))
      .filter(|p| *p < keep)
      .collect();
    affected.sort_unstable();
    affected.dedup();
    for p in affected {
      own.set(p, source.view()[self.source_offset(p)]);
    }

    while own.len() > new_size {
      own.pop_back();
    }
    for p in own.len()..new_size {
      own.emplace_back(source.view()[self.source_offset(p)]);
    }
    Ok(())
  }
}
