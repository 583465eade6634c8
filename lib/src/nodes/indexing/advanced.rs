use std::{collections::HashMap, mem};

use crate::{
  array::ArrayState,
  error::{DataError, GraphError, StructuralError},
  graph::Graph,
  node::{ArrayNode, NodeId},
  shape::Shape,
  state::NodeState,
};

use super::{slice_offsets, ResolvedSlice, Slice};

/// One axis of an advanced indexing expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvancedIndex {
  Slice(Slice),
  /// Coordinates along this axis are read from another node.
  Array(NodeId),
}

impl From<Slice> for AdvancedIndex {
  fn from(slice: Slice) -> Self {
    AdvancedIndex::Slice(slice)
  }
}

impl From<NodeId> for AdvancedIndex {
  fn from(id: NodeId) -> Self {
    AdvancedIndex::Array(id)
  }
}

/// `source[i0, i1, ...]` where some axes are indexed by arrays.
///
/// The index arrays share one shape and occupy a contiguous block of axes
/// `[block_start, block_start + n)`. Output shape is
/// `pre slices ++ index shape ++ post slices`, so output position `p`
/// decomposes as `((pre * q) + t) * post_len + post`, where `t` is the
/// position inside the index arrays.
///
/// Two layouts have a dynamic output:
/// - the index arrays are dynamic (then the block starts at axis 0), or
/// - the source is dynamic and its axis 0 is kept by a full slice.
#[derive(Debug, Clone)]
pub struct AdvancedIndexing {
  predecessors: Vec<NodeId>,
  shape: Shape,
  /// Source axis 0 is dynamic and kept by the leading slice.
  pre_dynamic: bool,
  /// Source extent and stride of every indexed axis. A dynamic extent is
  /// read from the state.
  indexed: Vec<(Option<usize>, usize)>,
  /// Offsets of the pre-block slices, without the dynamic axis.
  pre: Vec<usize>,
  pre_row_stride: usize,
  post: Vec<usize>,
  source_row: usize,
  min: f64,
  max: f64,
  integral: bool,
  max_size: usize,
}

impl AdvancedIndexing {
  pub fn new(graph: &Graph, source: NodeId, specifiers: Vec<AdvancedIndex>) -> Result<Self, GraphError> {
    let node = graph.node(source)?;
    let source_shape = node.shape();
    let ndim = source_shape.ndim();
    if specifiers.len() > ndim {
      return Err(StructuralError::AxisOutOfRange { axis: ndim, ndim }.into());
    }
    if specifiers.len() < ndim {
      return Err(
        StructuralError::SpecifierCount {
          expected: ndim,
          got: specifiers.len(),
        }
        .into(),
      );
    }

    let arrays: Vec<(usize, NodeId)> = specifiers
      .iter()
      .enumerate()
      .filter_map(|(axis, s)| match s {
        AdvancedIndex::Array(id) => Some((axis, *id)),
        AdvancedIndex::Slice(_) => None,
      })
      .collect();
    let (block_start, block_end) = match (arrays.first(), arrays.last()) {
      (Some(first), Some(last)) => (first.0, last.0 + 1),
      _ => return Err(StructuralError::NoIndexArrays.into()),
    };
    if block_end - block_start != arrays.len() {
      return Err(StructuralError::NonContiguousIndices.into());
    }

    let index_shape = graph.node(arrays[0].1)?.shape().clone();
    for (_, id) in &arrays[1..] {
      let other = graph.node(*id)?.shape();
      if *other != index_shape {
        let mismatch = StructuralError::IndexShapeMismatch(index_shape.to_string(), other.to_string());
        return Err(mismatch.into());
      }
    }
    if index_shape.ndim() > 1 && arrays.len() < ndim {
      return Err(StructuralError::MultiDimensionalWithSlices.into());
    }
    if index_shape.is_dynamic() && block_start != 0 {
      return Err(StructuralError::DynamicIndexBlockNotLeading.into());
    }

    let strides = source_shape.strides();
    let pre_dynamic = source_shape.is_dynamic() && block_start > 0;
    let mut extents = Vec::with_capacity(ndim);
    let mut pre = Vec::new();
    let mut post = Vec::new();
    for (axis, s) in specifiers.iter().enumerate() {
      let AdvancedIndex::Slice(slice) = s else {
        continue;
      };
      let Some(extent) = source_shape.extents()[axis] else {
        if !slice.is_full() {
          return Err(StructuralError::DynamicAxisNotFullySliced.into());
        }
        extents.push(None);
        continue;
      };
      let resolved: ResolvedSlice = slice.resolve(extent)?;
      extents.push(Some(resolved.len()));
      if axis < block_start {
        pre.push((resolved, strides[axis]));
      } else {
        post.push((resolved, strides[axis]));
      }
    }
    let post_extents = extents.split_off(block_start);
    extents.extend(index_shape.extents().iter().copied());
    extents.extend(post_extents);
    let shape = Shape::from_extents(extents)?;

    let indexed = arrays
      .iter()
      .map(|(axis, _)| (source_shape.extents()[*axis], strides[*axis]))
      .collect();
    let pre = slice_offsets(0, &pre);
    let post = slice_offsets(0, &post);
    let source_row = source_shape.row_size();

    let max_size = if pre_dynamic {
      let rows = if source_row == 0 { 0 } else { node.max_size() / source_row };
      rows * pre.len() * index_shape.size().unwrap_or(0) * post.len()
    } else if index_shape.is_dynamic() {
      let mut q = usize::MAX;
      for (_, id) in &arrays {
        q = q.min(graph.node(*id)?.max_size());
      }
      q * pre.len() * post.len()
    } else {
      shape.size().unwrap_or(0)
    };

    let mut predecessors = Vec::with_capacity(arrays.len() + 1);
    predecessors.push(source);
    predecessors.extend(arrays.iter().map(|(_, id)| *id));
    Ok(AdvancedIndexing {
      predecessors,
      shape,
      pre_dynamic,
      indexed,
      pre,
      pre_row_stride: if pre_dynamic { strides[0] } else { 0 },
      post,
      source_row,
      min: node.min(),
      max: node.max(),
      integral: node.integral(),
      max_size,
    })
  }

  fn source_rows(&self, source: &ArrayState) -> usize {
    match self.source_row {
      0 => 0,
      row => source.len() / row,
    }
  }

  /// Current length shared by every index array.
  fn index_len(&self, indices: &[&ArrayState]) -> Result<usize, DataError> {
    let q = indices[0].len();
    if indices.iter().any(|i| i.len() != q) {
      return Err(DataError::MismatchedIndexSizes(indices.iter().map(|i| i.len()).collect()));
    }
    Ok(q)
  }

  /// Number of pre-block combinations in this state.
  fn pre_count(&self, source: &ArrayState) -> usize {
    match self.pre_dynamic {
      true => self.source_rows(source) * self.pre.len(),
      false => self.pre.len(),
    }
  }

  /// Source offset read by output `position`, checking every index value.
  fn offset(
    &self,
    position: usize,
    q: usize,
    source: &ArrayState,
    indices: &[&ArrayState],
  ) -> Result<usize, DataError> {
    let post_len = self.post.len();
    let (rest, post) = (position / post_len, position % post_len);
    let (pre, t) = (rest / q, rest % q);
    let (pre_row, pre_inner) = (pre / self.pre.len(), pre % self.pre.len());
    let mut offset = pre_row * self.pre_row_stride + self.pre[pre_inner] + self.post[post];
    for (index, (extent, stride)) in indices.iter().zip(&self.indexed) {
      let extent = extent.unwrap_or_else(|| self.source_rows(source));
      let value = index.view()[t];
      if value.fract() != 0.0 || value < 0.0 || value >= extent as f64 {
        return Err(DataError::IndexOutOfBounds {
          position: t,
          value,
          extent,
        });
      }
      offset += value as usize * stride;
    }
    Ok(offset)
  }

  /// Recompute `affected` positions, then resize to the current size.
  fn update(
    &self,
    source: &ArrayState,
    indices: &[&ArrayState],
    q: usize,
    own: &mut IndexedState,
    affected: Vec<usize>,
  ) -> Result<(), DataError> {
    for p in affected {
      let offset = self.offset(p, q, source, indices)?;
      own.update(p, offset, source.view()[offset]);
    }
    let new_size = self.pre_count(source) * q * self.post.len();
    while own.len() > new_size {
      own.pop();
    }
    for p in own.len()..new_size {
      let offset = self.offset(p, q, source, indices)?;
      own.push(offset, source.view()[offset]);
    }
    Ok(())
  }
}

impl ArrayNode for AdvancedIndexing {
  fn name(&self) -> &'static str {
    "AdvancedIndexing"
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
    let (source, indices) = (inputs[0], &inputs[1..]);
    let q = self.index_len(indices)?;
    let mut own = IndexedState::with_capacity(self.max_size);
    self.update(source, indices, q, &mut own, Vec::new())?;
    own.commit();
    Ok(NodeState::Indexed(own))
  }

  fn propagate(&self, inputs: &[&ArrayState], state: &mut NodeState) -> Result<(), DataError> {
    let NodeState::Indexed(own) = state else {
      return Err(DataError::StateKindMismatch);
    };
    let (source, indices) = (inputs[0], &inputs[1..]);
    let q = self.index_len(indices)?;
    let post_len = self.post.len();
    let keep = own.len().min(self.pre_count(source) * q * post_len);

    let mut affected = Vec::new();
    for index in indices {
      for u in index.diff().iter().filter(|u| u.index < q) {
        for pre in 0..self.pre_count(source) {
          let first = (pre * q + u.index) * post_len;
          affected.extend((first..first + post_len).filter(|p| *p < keep));
        }
      }
    }
    // only elements some output currently reads from
    for u in source.diff() {
      if let Some(positions) = own.referrers.get(&u.index) {
        affected.extend(positions.iter().copied().filter(|p| *p < keep));
      }
    }
    affected.sort_unstable();
    affected.dedup();

    self.update(source, indices, q, own, affected)
  }
}

/// Buffer of an advanced indexing node plus the source offset behind every
/// output position.
///
/// `referrers` inverts `offsets` so a source change finds the outputs reading
/// it. Offset changes are logged so a revert restores the mapping together
/// with the values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexedState {
  array: ArrayState,
  offsets: Vec<usize>,
  referrers: HashMap<usize, Vec<usize>>,
  log: Vec<(usize, Option<usize>)>,
}

impl IndexedState {
  fn with_capacity(capacity: usize) -> Self {
    IndexedState {
      array: ArrayState::with_capacity(Vec::new(), capacity),
      offsets: Vec::with_capacity(capacity),
      ..Default::default()
    }
  }

  pub fn array(&self) -> &ArrayState {
    &self.array
  }

  pub(crate) fn array_mut(&mut self) -> &mut ArrayState {
    &mut self.array
  }

  /// Source offset read by every output position.
  pub fn offsets(&self) -> &[usize] {
    &self.offsets
  }

  fn len(&self) -> usize {
    self.offsets.len()
  }

  fn update(&mut self, position: usize, offset: usize, value: f64) {
    self.relink(position, Some(offset));
    self.array.set(position, value);
  }

  fn push(&mut self, offset: usize, value: f64) {
    self.relink(self.offsets.len(), Some(offset));
    self.array.emplace_back(value);
  }

  fn pop(&mut self) {
    if let Some(position) = self.offsets.len().checked_sub(1) {
      self.array.pop_back();
      self.relink(position, None);
    }
  }

  fn relink(&mut self, position: usize, target: Option<usize>) {
    let previous = self.offsets.get(position).copied();
    if previous == target {
      return;
    }
    self.log.push((position, previous));
    self.apply(position, target);
  }

  /// `None` removes the tail position.
  fn apply(&mut self, position: usize, target: Option<usize>) {
    if let Some(old) = self.offsets.get(position).copied() {
      if let Some(list) = self.referrers.get_mut(&old) {
        if let Some(i) = list.iter().position(|p| *p == position) {
          list.swap_remove(i);
        }
        if list.is_empty() {
          self.referrers.remove(&old);
        }
      }
    }
    match target {
      Some(offset) => {
        if position == self.offsets.len() {
          self.offsets.push(offset);
        } else {
          self.offsets[position] = offset;
        }
        self.referrers.entry(offset).or_default().push(position);
      }
      None => self.offsets.truncate(position),
    }
  }

  pub fn commit(&mut self) {
    self.array.commit();
    self.log.clear();
  }

  pub fn revert(&mut self) {
    self.array.revert();
    for (position, previous) in mem::take(&mut self.log).into_iter().rev() {
      self.apply(position, previous);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    array::{apply_diff, Update},
    nodes::{BasicIndex, BasicIndexing, Constant, DynamicArray, IntegerVariable, ListVariable},
  };
  use proptest::prelude::*;

  fn arange(dims: &[usize]) -> Constant {
    let n = dims.iter().product::<usize>();
    Constant::with_shape((0..n).map(|v| v as f64).collect(), dims).unwrap()
  }

  fn ints(values: &[usize]) -> Constant {
    Constant::vector(values.iter().map(|v| *v as f64).collect())
  }

  fn full() -> AdvancedIndex {
    Slice::full().into()
  }

  fn view(graph: &Graph, state: &crate::state::State, id: NodeId) -> Vec<f64> {
    graph.view(state, id).unwrap().to_vec()
  }

  fn f(values: &[i32]) -> Vec<f64> {
    values.iter().map(|v| f64::from(*v)).collect()
  }

  #[test]
  fn matrix_by_two_index_arrays() {
    let mut graph = Graph::new();
    let a = graph.add(arange(&[3, 3])).unwrap();
    let i = graph.add(ints(&[0, 1, 2])).unwrap();
    let j = graph.add(ints(&[1, 2, 0])).unwrap();
    let b = AdvancedIndexing::new(&graph, a, vec![i.into(), j.into()]).unwrap();
    assert_eq!(b.shape(), &Shape::fixed(&[3]));
    assert_eq!(b.predecessors(), &[a, i, j]);
    assert_eq!((b.min(), b.max(), b.integral()), (0.0, 8.0, true));
    let b = graph.add(b).unwrap();

    let state = graph.initialize_state().unwrap();
    assert_eq!(view(&graph, &state, b), f(&[1, 5, 6]));
    assert_eq!(graph.shape(&state, b).unwrap(), vec![3]);
  }

  #[test]
  fn source_changes_outside_the_footprint_are_silent() {
    let mut graph = Graph::new();
    let a = graph.add(IntegerVariable::new(&[3, 3], -10.0, 10.0).unwrap()).unwrap();
    let i = graph.add(ints(&[0, 1, 2])).unwrap();
    let j = graph.add(ints(&[1, 2, 0])).unwrap();
    let b = AdvancedIndexing::new(&graph, a, vec![i.into(), j.into()]).unwrap();
    let b = graph.add(b).unwrap();

    let mut state = graph.empty_state();
    graph.seed_node(&mut state, a, f(&[0, 1, 2, 3, 4, 5, 6, 7, 8])).unwrap();
    graph.initialize_remaining(&mut state).unwrap();

    graph.set(&mut state, a, 0, -1.0).unwrap();
    graph.propagate(&mut state, Some(&[a])).unwrap();
    assert!(graph.diff(&state, b).unwrap().is_empty());
    graph.commit(&mut state, None).unwrap();

    graph.set(&mut state, a, 1, -1.0).unwrap();
    graph.propagate(&mut state, Some(&[a])).unwrap();
    assert_eq!(graph.diff(&state, b).unwrap(), &[Update::new(0, 1.0, -1.0)]);
    assert_eq!(view(&graph, &state, b), f(&[-1, 5, 6]));
  }

  #[test]
  fn index_arrays_must_be_contiguous() {
    let mut graph = Graph::new();
    let a = graph.add(arange(&[2, 3, 5, 4])).unwrap();
    let i = graph.add(ints(&[1, 0])).unwrap();
    let k = graph.add(ints(&[1, 2])).unwrap();

    assert_eq!(
      AdvancedIndexing::new(&graph, a, vec![full(), i.into(), full(), k.into()]).unwrap_err(),
      StructuralError::NonContiguousIndices.into()
    );
    assert!(AdvancedIndexing::new(&graph, a, vec![i.into(), k.into(), full(), full()]).is_ok());
    assert!(AdvancedIndexing::new(&graph, a, vec![full(), i.into(), k.into(), full()]).is_ok());
  }

  #[test]
  fn construction_errors() {
    let mut graph = Graph::new();
    let a = graph.add(arange(&[3, 4])).unwrap();
    let v = graph.add(ints(&[0, 1])).unwrap();
    let w = graph.add(ints(&[0, 1, 2])).unwrap();
    let m = graph.add(Constant::with_shape(vec![0.0; 4], &[2, 2]).unwrap()).unwrap();
    let d = graph.add(DynamicArray::new(&[], 0.0, 2.0, true, 3).unwrap()).unwrap();
    let rows = graph.add(DynamicArray::new(&[4], 0.0, 2.0, true, 3).unwrap()).unwrap();
    let err = |source, specifiers| AdvancedIndexing::new(&graph, source, specifiers).unwrap_err();

    assert_eq!(
      err(a, vec![v.into()]),
      StructuralError::SpecifierCount { expected: 2, got: 1 }.into()
    );
    assert_eq!(
      err(a, vec![v.into(), v.into(), v.into()]),
      StructuralError::AxisOutOfRange { axis: 2, ndim: 2 }.into()
    );
    assert_eq!(err(a, vec![full(), full()]), StructuralError::NoIndexArrays.into());
    assert_eq!(
      err(a, vec![v.into(), w.into()]),
      StructuralError::IndexShapeMismatch("(2,)".into(), "(3,)".into()).into()
    );
    assert_eq!(err(a, vec![m.into(), full()]), StructuralError::MultiDimensionalWithSlices.into());
    assert!(AdvancedIndexing::new(&graph, a, vec![m.into(), m.into()]).is_ok());
    assert_eq!(
      err(a, vec![full(), d.into()]),
      StructuralError::DynamicIndexBlockNotLeading.into()
    );
    assert_eq!(
      err(rows, vec![Slice::range(0, 1).into(), v.into()]),
      StructuralError::DynamicAxisNotFullySliced.into()
    );
  }

  #[test]
  fn grows_with_a_dynamic_index_array() {
    let mut graph = Graph::new();
    let a = graph.add(ints(&[4, 3, 2, 1, 0])).unwrap();
    let s = graph.add(DynamicArray::new(&[], 0.0, 4.0, true, 5).unwrap()).unwrap();
    let b = AdvancedIndexing::new(&graph, a, vec![s.into()]).unwrap();
    assert_eq!(b.shape().to_string(), "(-1,)");
    assert_eq!((b.min(), b.max(), b.max_size()), (0.0, 4.0, 5));
    let b = graph.add(b).unwrap();

    let mut state = graph.initialize_state().unwrap();
    assert!(view(&graph, &state, b).is_empty());

    graph.grow(&mut state, s, &[0.0]).unwrap();
    graph.propagate(&mut state, Some(&[s])).unwrap();
    assert_eq!(view(&graph, &state, b), f(&[4]));
    assert_eq!(graph.diff(&state, b).unwrap(), &[Update::placement(0, 4.0)]);

    let mut reverted = state.clone();
    graph.commit(&mut state, None).unwrap();
    assert!(graph.diff(&state, b).unwrap().is_empty());
    assert_eq!(view(&graph, &state, b), f(&[4]));

    graph.revert(&mut reverted, None).unwrap();
    assert!(view(&graph, &reverted, b).is_empty());
    assert!(graph.diff(&reverted, b).unwrap().is_empty());
  }

  /// Two index arrays taken as columns of one dynamic `(-1, 2)` array.
  fn column_indexed() -> (Graph, NodeId, NodeId) {
    let mut graph = Graph::new();
    let a = graph.add(arange(&[3, 3])).unwrap();
    let dy = graph.add(DynamicArray::new(&[2], 0.0, 2.0, true, 3).unwrap()).unwrap();
    let i = BasicIndexing::new(&graph, dy, vec![Slice::full().into(), BasicIndex::Index(0)]).unwrap();
    let i = graph.add(i).unwrap();
    let j = BasicIndexing::new(&graph, dy, vec![Slice::full().into(), BasicIndex::Index(1)]).unwrap();
    let j = graph.add(j).unwrap();
    let b = AdvancedIndexing::new(&graph, a, vec![i.into(), j.into()]).unwrap();
    let b = graph.add(b).unwrap();
    (graph, dy, b)
  }

  #[test]
  fn dynamic_index_columns() {
    let (graph, dy, b) = column_indexed();
    assert!(graph.node(b).unwrap().shape().is_dynamic());

    let mut empty = graph.initialize_state().unwrap();
    assert_eq!(graph.size(&empty, b).unwrap(), 0);
    graph.grow(&mut empty, dy, &[0.0, 0.0]).unwrap();
    graph.propagate(&mut empty, None).unwrap();
    assert_eq!(view(&graph, &empty, b), f(&[0]));
    assert_eq!(graph.diff(&empty, b).unwrap(), &[Update::placement(0, 0.0)]);

    let mut state = graph.empty_state();
    graph.seed_node(&mut state, dy, f(&[0, 2, 2, 1])).unwrap();
    graph.initialize_remaining(&mut state).unwrap();
    assert_eq!(view(&graph, &state, b), f(&[2, 7]));
    let committed = state.clone();

    // grow
    graph.grow(&mut state, dy, &[1.0, 0.0]).unwrap();
    graph.propagate(&mut state, None).unwrap();
    assert_eq!(view(&graph, &state, b), f(&[2, 7, 3]));
    assert_eq!(apply_diff(&f(&[2, 7]), graph.diff(&state, b).unwrap()), f(&[2, 7, 3]));
    graph.revert(&mut state, None).unwrap();
    assert_eq!(view(&graph, &state, b), f(&[2, 7]));
    assert!(graph.diff(&state, b).unwrap().is_empty());

    // shrink
    graph.shrink(&mut state, dy).unwrap();
    graph.propagate(&mut state, None).unwrap();
    assert_eq!(view(&graph, &state, b), f(&[2]));
    graph.revert(&mut state, None).unwrap();

    // change and shrink
    graph.set(&mut state, dy, 1, 1.0).unwrap();
    graph.shrink(&mut state, dy).unwrap();
    graph.propagate(&mut state, None).unwrap();
    assert_eq!(view(&graph, &state, b), f(&[1]));
    assert_eq!(apply_diff(&f(&[2, 7]), graph.diff(&state, b).unwrap()), f(&[1]));
    graph.revert(&mut state, None).unwrap();

    // grow, update, shrink
    graph.grow(&mut state, dy, &[1.0, 0.0]).unwrap();
    graph.set(&mut state, dy, 1, 0.0).unwrap();
    graph.set(&mut state, dy, 5, 2.0).unwrap();
    graph.set(&mut state, dy, 1, 2.0).unwrap();
    graph.set(&mut state, dy, 5, 0.0).unwrap();
    graph.shrink(&mut state, dy).unwrap();
    graph.propagate(&mut state, None).unwrap();
    assert_eq!(view(&graph, &state, b), f(&[2, 7]));
    assert_eq!(apply_diff(&f(&[2, 7]), graph.diff(&state, b).unwrap()), f(&[2, 7]));
    graph.revert(&mut state, None).unwrap();
    assert_eq!(view(&graph, &state, b), f(&[2, 7]));
    assert_eq!(state, committed);
  }

  #[test]
  fn three_dimensional_source() {
    let mut graph = Graph::new();
    let a = graph.add(arange(&[2, 3, 5])).unwrap();
    let i = graph.add(ints(&[1, 0])).unwrap();
    let j = graph.add(ints(&[1, 1])).unwrap();
    let b = AdvancedIndexing::new(&graph, a, vec![i.into(), j.into(), full()]).unwrap();
    assert_eq!(b.shape(), &Shape::fixed(&[2, 5]));
    let b = graph.add(b).unwrap();
    assert!(AdvancedIndexing::new(&graph, a, vec![i.into(), full(), j.into()]).is_err());

    let state = graph.initialize_state().unwrap();
    assert_eq!(view(&graph, &state, b), f(&[20, 21, 22, 23, 24, 5, 6, 7, 8, 9]));
  }

  #[test]
  fn four_dimensional_source() {
    let mut graph = Graph::new();
    let a = graph.add(arange(&[2, 3, 5, 4])).unwrap();
    let i = graph.add(ints(&[1, 0])).unwrap();
    let j = graph.add(ints(&[1, 1])).unwrap();
    let k = graph.add(ints(&[1, 2])).unwrap();
    let mut add = |specifiers| {
      let node = AdvancedIndexing::new(&graph, a, specifiers).unwrap();
      graph.add(node).unwrap()
    };
    let ijk = add(vec![i.into(), j.into(), k.into(), full()]);
    let ik = add(vec![full(), i.into(), k.into(), full()]);
    for specifiers in [
      vec![i.into(), j.into(), full(), k.into()],
      vec![i.into(), full(), j.into(), k.into()],
      vec![i.into(), full(), full(), k.into()],
    ] {
      assert_eq!(
        AdvancedIndexing::new(&graph, a, specifiers).unwrap_err(),
        StructuralError::NonContiguousIndices.into()
      );
    }

    let state = graph.initialize_state().unwrap();
    assert_eq!(graph.shape(&state, ijk).unwrap(), vec![2, 4]);
    assert_eq!(view(&graph, &state, ijk), f(&[84, 85, 86, 87, 28, 29, 30, 31]));
    assert_eq!(graph.shape(&state, ik).unwrap(), vec![2, 2, 4]);
    assert_eq!(
      view(&graph, &state, ik),
      f(&[24, 25, 26, 27, 8, 9, 10, 11, 84, 85, 86, 87, 68, 69, 70, 71])
    );
  }

  #[test]
  fn dynamic_index_arrays_with_trailing_slice() {
    let mut graph = Graph::new();
    let a = graph.add(arange(&[2, 3, 5, 4])).unwrap();
    let dy = graph.add(DynamicArray::new(&[3], 0.0, 4.0, true, 4).unwrap()).unwrap();
    let mut column = |c: isize| {
      let node = BasicIndexing::new(&graph, dy, vec![Slice::full().into(), BasicIndex::Index(c)]).unwrap();
      graph.add(node).unwrap()
    };
    let (i, j, k) = (column(0), column(1), column(2));
    let b = AdvancedIndexing::new(&graph, a, vec![i.into(), j.into(), k.into(), full()]).unwrap();
    assert_eq!(b.shape().to_string(), "(-1, 4)");
    let b = graph.add(b).unwrap();

    let mut state = graph.initialize_state().unwrap();
    assert!(view(&graph, &state, b).is_empty());
    graph.grow(&mut state, dy, &f(&[0, 1, 4, 1, 2, 4])).unwrap();
    graph.propagate(&mut state, Some(&[dy])).unwrap();
    let grown = f(&[36, 37, 38, 39, 116, 117, 118, 119]);
    assert_eq!(view(&graph, &state, b), grown);
    assert_eq!(apply_diff(&[], graph.diff(&state, b).unwrap()), grown);
    graph.commit(&mut state, Some(&[dy])).unwrap();

    graph.shrink(&mut state, dy).unwrap();
    graph.propagate(&mut state, Some(&[dy])).unwrap();
    assert_eq!(view(&graph, &state, b), f(&[36, 37, 38, 39]));
    assert_eq!(graph.size_diff(&state, b).unwrap(), -4);
    graph.revert(&mut state, Some(&[dy])).unwrap();
    assert_eq!(view(&graph, &state, b), grown);
  }

  #[test]
  fn dynamic_source_keeps_its_rows() {
    let mut graph = Graph::new();
    let a = graph.add(DynamicArray::new(&[3, 5, 4], -200.0, 200.0, true, 3).unwrap()).unwrap();
    let i = graph.add(IntegerVariable::new(&[3], 0.0, 2.0).unwrap()).unwrap();
    let j = graph.add(IntegerVariable::new(&[3], 0.0, 4.0).unwrap()).unwrap();
    let k = graph.add(IntegerVariable::new(&[3], 0.0, 4.0).unwrap()).unwrap();
    let b = AdvancedIndexing::new(&graph, a, vec![full(), i.into(), j.into(), k.into()]).unwrap();
    assert_eq!(b.shape().to_string(), "(-1, 3)");
    assert_eq!(b.max_size(), 9);
    let b = graph.add(b).unwrap();

    let values: Vec<f64> = (0..120).map(f64::from).collect();
    let mut state = graph.empty_state();
    graph.seed_node(&mut state, a, values.clone()).unwrap();
    graph.seed_node(&mut state, i, f(&[1, 0, 2])).unwrap();
    graph.seed_node(&mut state, j, f(&[1, 2, 1])).unwrap();
    graph.seed_node(&mut state, k, f(&[0, 0, 2])).unwrap();
    graph.initialize_remaining(&mut state).unwrap();
    assert_eq!(view(&graph, &state, b), f(&[24, 8, 46, 84, 68, 106]));

    // a new source row, one visible change and one outside the footprint
    graph.grow(&mut state, a, &values[..60]).unwrap();
    graph.set(&mut state, a, 84, -1.0).unwrap();
    graph.set(&mut state, a, 85, -2.0).unwrap();
    graph.propagate(&mut state, Some(&[a])).unwrap();
    assert_eq!(view(&graph, &state, b), f(&[24, 8, 46, -1, 68, 106, 24, 8, 46]));
    let diff = graph.diff(&state, b).unwrap();
    assert_eq!(diff[0], Update::new(3, 84.0, -1.0));
    assert_eq!(diff.len(), 4);
    graph.commit(&mut state, None).unwrap();

    // an index change moves one column of every row
    graph.set(&mut state, i, 1, 1.0).unwrap();
    graph.propagate(&mut state, Some(&[i])).unwrap();
    assert_eq!(view(&graph, &state, b), f(&[24, 28, 46, -1, 88, 106, 24, 28, 46]));
    assert_eq!(graph.diff(&state, b).unwrap().len(), 3);
    graph.revert(&mut state, None).unwrap();

    // an index past the last axis is a data error
    graph.set(&mut state, k, 0, 4.0).unwrap();
    let err = graph.propagate(&mut state, Some(&[k])).unwrap_err();
    assert_eq!(
      err,
      GraphError::data(b, DataError::IndexOutOfBounds { position: 0, value: 4.0, extent: 4 })
    );
  }

  #[test]
  fn dynamic_source_indexed_on_rows() {
    let mut graph = Graph::new();
    let a = graph.add(DynamicArray::new(&[2], 0.0, 9.0, true, 4).unwrap()).unwrap();
    let r = graph.add(ints(&[1, 0])).unwrap();
    let b = AdvancedIndexing::new(&graph, a, vec![r.into(), full()]).unwrap();
    assert_eq!(b.shape(), &Shape::fixed(&[2, 2]));
    let b = graph.add(b).unwrap();

    let mut state = graph.empty_state();
    graph.seed_node(&mut state, a, f(&[1, 2, 3, 4])).unwrap();
    graph.initialize_remaining(&mut state).unwrap();
    assert_eq!(view(&graph, &state, b), f(&[3, 4, 1, 2]));

    graph.grow(&mut state, a, &[5.0, 6.0]).unwrap();
    graph.propagate(&mut state, None).unwrap();
    assert!(graph.diff(&state, b).unwrap().is_empty());
    graph.commit(&mut state, None).unwrap();

    graph.shrink(&mut state, a).unwrap();
    graph.shrink(&mut state, a).unwrap();
    assert!(matches!(
      graph.propagate(&mut state, None),
      Err(GraphError::Data { node, source: DataError::IndexOutOfBounds { extent: 1, .. } }) if node == b
    ));
  }

  #[test]
  fn mismatched_index_growth_is_a_data_error() {
    let mut graph = Graph::new();
    let a = graph.add(arange(&[3, 3])).unwrap();
    let i = graph.add(DynamicArray::new(&[], 0.0, 2.0, true, 3).unwrap()).unwrap();
    let j = graph.add(DynamicArray::new(&[], 0.0, 2.0, true, 3).unwrap()).unwrap();
    let b = AdvancedIndexing::new(&graph, a, vec![i.into(), j.into()]).unwrap();
    let b = graph.add(b).unwrap();

    let mut state = graph.initialize_state().unwrap();
    graph.grow(&mut state, i, &[1.0]).unwrap();
    assert_eq!(
      graph.propagate(&mut state, None),
      Err(GraphError::data(b, DataError::MismatchedIndexSizes(vec![1, 0])))
    );
  }

  #[test]
  fn permutation_index() {
    let mut graph = Graph::new();
    let costs = graph.add(arange(&[3, 3])).unwrap();
    let rows = graph.add(ints(&[0, 1, 2])).unwrap();
    let perm = graph.add(ListVariable::new(3)).unwrap();
    let b = AdvancedIndexing::new(&graph, costs, vec![rows.into(), perm.into()]).unwrap();
    let b = graph.add(b).unwrap();

    let mut state = graph.initialize_state().unwrap();
    assert_eq!(view(&graph, &state, b), f(&[0, 4, 8]));
    graph.exchange(&mut state, perm, 0, 2).unwrap();
    graph.propagate(&mut state, Some(&[perm])).unwrap();
    assert_eq!(view(&graph, &state, b), f(&[2, 4, 6]));
    graph.propagate(&mut state, Some(&[perm])).unwrap();
    assert_eq!(graph.diff(&state, b).unwrap().len(), 2);
    graph.commit(&mut state, None).unwrap();
    graph.commit(&mut state, None).unwrap();
    assert_eq!(view(&graph, &state, b), f(&[2, 4, 6]));
  }

  fn offsets(state: &crate::state::State, id: NodeId) -> Vec<usize> {
    match state.node(id) {
      Some(crate::state::NodeState::Indexed(indexed)) => indexed.offsets().to_vec(),
      other => panic!("not an indexed state: {other:?}"),
    }
  }

  #[test]
  fn scalar_index_arrays() {
    let mut graph = Graph::new();
    let a = graph.add(IntegerVariable::new(&[2, 3, 5, 4], -200.0, 200.0).unwrap()).unwrap();
    let i = graph.add(IntegerVariable::new(&[], 0.0, 1.0).unwrap()).unwrap();
    let j = graph.add(IntegerVariable::new(&[], 0.0, 2.0).unwrap()).unwrap();
    let leading = AdvancedIndexing::new(&graph, a, vec![i.into(), j.into(), full(), full()]).unwrap();
    assert_eq!(leading.shape(), &Shape::fixed(&[5, 4]));
    let leading = graph.add(leading).unwrap();
    let inner = AdvancedIndexing::new(&graph, a, vec![full(), i.into(), j.into(), full()]).unwrap();
    assert_eq!(inner.shape(), &Shape::fixed(&[2, 4]));
    let inner = graph.add(inner).unwrap();

    let values: Vec<f64> = (0..120).map(f64::from).collect();
    let mut state = graph.empty_state();
    graph.seed_node(&mut state, a, values).unwrap();
    graph.seed_node(&mut state, i, vec![1.0]).unwrap();
    graph.seed_node(&mut state, j, vec![1.0]).unwrap();
    graph.initialize_remaining(&mut state).unwrap();
    let leading_rows: Vec<f64> = (80..100).map(f64::from).collect();
    let inner_rows = f(&[24, 25, 26, 27, 84, 85, 86, 87]);
    assert_eq!(view(&graph, &state, leading), leading_rows);
    assert_eq!(view(&graph, &state, inner), inner_rows);
    assert_eq!(offsets(&state, inner), [24, 25, 26, 27, 84, 85, 86, 87]);

    // each output only sees the source cell it reads
    graph.set(&mut state, a, 81, -81.0).unwrap();
    graph.set(&mut state, a, 25, -25.0).unwrap();
    graph.propagate(&mut state, Some(&[a])).unwrap();
    assert_eq!(graph.diff(&state, leading).unwrap(), &[Update::new(1, 81.0, -81.0)]);
    assert_eq!(graph.diff(&state, inner).unwrap(), &[Update::new(1, 25.0, -25.0)]);
    graph.revert(&mut state, None).unwrap();
    assert_eq!(view(&graph, &state, inner), inner_rows);

    graph.set(&mut state, i, 0, 0.0).unwrap();
    graph.set(&mut state, j, 0, 2.0).unwrap();
    graph.propagate(&mut state, Some(&[i, j])).unwrap();
    let moved_leading: Vec<f64> = (40..60).map(f64::from).collect();
    let moved_inner = f(&[8, 9, 10, 11, 68, 69, 70, 71]);
    assert_eq!(view(&graph, &state, leading), moved_leading);
    assert_eq!(view(&graph, &state, inner), moved_inner);
    assert_eq!(apply_diff(&leading_rows, graph.diff(&state, leading).unwrap()), moved_leading);
    assert_eq!(apply_diff(&inner_rows, graph.diff(&state, inner).unwrap()), moved_inner);
    assert_eq!(offsets(&state, inner), [8, 9, 10, 11, 68, 69, 70, 71]);
    graph.commit(&mut state, None).unwrap();
    assert!(graph.diff(&state, inner).unwrap().is_empty());
  }

  #[test]
  fn dynamic_source_and_dynamic_index_rows() {
    let mut graph = Graph::new();
    let a = graph.add(DynamicArray::new(&[3], 0.0, 60.0, true, 4).unwrap()).unwrap();
    let r = graph.add(DynamicArray::new(&[], 0.0, 3.0, true, 4).unwrap()).unwrap();
    let b = AdvancedIndexing::new(&graph, a, vec![r.into(), full()]).unwrap();
    assert_eq!(b.shape().to_string(), "(-1, 3)");
    assert_eq!(b.max_size(), 12);
    let b = graph.add(b).unwrap();

    let mut state = graph.empty_state();
    graph.seed_node(&mut state, a, f(&[0, 1, 2, 3, 4, 5, 6, 7, 8])).unwrap();
    graph.seed_node(&mut state, r, f(&[2, 0])).unwrap();
    graph.initialize_remaining(&mut state).unwrap();
    let committed = f(&[6, 7, 8, 0, 1, 2]);
    assert_eq!(view(&graph, &state, b), committed);
    let before = state.clone();

    // a new source row picked by a new index entry, plus a referenced cell
    graph.grow(&mut state, a, &f(&[9, 10, 11])).unwrap();
    graph.grow(&mut state, r, &[3.0]).unwrap();
    graph.set(&mut state, a, 1, 50.0).unwrap();
    graph.propagate(&mut state, None).unwrap();
    let grown = f(&[6, 7, 8, 0, 50, 2, 9, 10, 11]);
    assert_eq!(view(&graph, &state, b), grown);
    assert_eq!(graph.size_diff(&state, b).unwrap(), 3);
    assert_eq!(apply_diff(&committed, graph.diff(&state, b).unwrap()), grown);

    graph.revert(&mut state, None).unwrap();
    assert_eq!(view(&graph, &state, b), committed);
    assert!(graph.diff(&state, b).unwrap().is_empty());
    graph.propagate(&mut state, None).unwrap();
    assert!(graph.diff(&state, b).unwrap().is_empty());
    assert_eq!(state, before);

    // the index may not outrun the source
    graph.grow(&mut state, r, &[3.0]).unwrap();
    assert_eq!(
      graph.propagate(&mut state, None),
      Err(GraphError::data(b, DataError::IndexOutOfBounds { position: 2, value: 3.0, extent: 3 }))
    );
  }

  // Moves: 0 sets the source, 1 and 2 set the index vectors, 3 grows the
  // row subset and 4 shrinks it.
  proptest! {
    #[test]
    fn incremental_matches_recompute(
      steps in prop::collection::vec(
        (prop::collection::vec((0u8..5, 0usize..12, 0u8..10), 1..4), any::<bool>()),
        1..30,
      )
    ) {
      let mut graph = Graph::new();
      let src = graph.add(IntegerVariable::new(&[4, 3], 0.0, 9.0).unwrap()).unwrap();
      let i = graph.add(IntegerVariable::new(&[5], 0.0, 3.0).unwrap()).unwrap();
      let j = graph.add(IntegerVariable::new(&[5], 0.0, 2.0).unwrap()).unwrap();
      let d = graph.add(DynamicArray::new(&[], 0.0, 3.0, true, 6).unwrap()).unwrap();
      let pairs = AdvancedIndexing::new(&graph, src, vec![i.into(), j.into()]).unwrap();
      let pairs = graph.add(pairs).unwrap();
      let rows = AdvancedIndexing::new(&graph, src, vec![i.into(), full()]).unwrap();
      let rows = graph.add(rows).unwrap();
      let subset = AdvancedIndexing::new(&graph, src, vec![d.into(), full()]).unwrap();
      let subset = graph.add(subset).unwrap();
      let outputs = [pairs, rows, subset];

      let mut state = graph.empty_state();
      graph.seed_node(&mut state, src, (0..12).map(|v| f64::from(v % 10)).collect()).unwrap();
      graph.initialize_remaining(&mut state).unwrap();

      let recompute = |state: &crate::state::State| {
        let s = view(&graph, state, src);
        let (iv, jv, dv) = (view(&graph, state, i), view(&graph, state, j), view(&graph, state, d));
        let at = |r: f64, c: usize| s[r as usize * 3 + c];
        let a: Vec<f64> = iv.iter().zip(&jv).map(|(r, c)| at(*r, *c as usize)).collect();
        let b: Vec<f64> = iv.iter().flat_map(|r| (0..3).map(move |c| (*r, c))).map(|(r, c)| at(r, c)).collect();
        let c: Vec<f64> = dv.iter().flat_map(|r| (0..3).map(move |c| (*r, c))).map(|(r, c)| at(r, c)).collect();
        [a, b, c]
      };

      for (moves, accept) in steps {
        let before: Vec<Vec<f64>> = outputs.iter().map(|o| view(&graph, &state, *o)).collect();
        for (kind, pos, value) in moves {
          let rows_now = graph.size(&state, d).unwrap();
          match kind {
            0 => graph.set(&mut state, src, pos, f64::from(value)).unwrap(),
            1 => graph.set(&mut state, i, pos % 5, f64::from(value % 4)).unwrap(),
            2 => graph.set(&mut state, j, pos % 5, f64::from(value % 3)).unwrap(),
            3 if rows_now < 6 => graph.grow(&mut state, d, &[f64::from(value % 4)]).unwrap(),
            _ if rows_now > 0 => graph.shrink(&mut state, d).unwrap(),
            _ => {}
          }
        }
        graph.propagate(&mut state, None).unwrap();

        let expected = recompute(&state);
        for (k, o) in outputs.iter().enumerate() {
          let now = view(&graph, &state, *o);
          prop_assert_eq!(&now, &expected[k]);
          prop_assert_eq!(&apply_diff(&before[k], graph.diff(&state, *o).unwrap()), &now);
        }

        if accept {
          graph.commit(&mut state, None).unwrap();
        } else {
          graph.revert(&mut state, None).unwrap();
          for (k, o) in outputs.iter().enumerate() {
            prop_assert_eq!(&view(&graph, &state, *o), &before[k]);
          }
        }
        for o in outputs {
          prop_assert!(graph.diff(&state, o).unwrap().is_empty());
        }
      }
    }
  }
}
