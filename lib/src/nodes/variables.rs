use crate::{
  array::ArrayState,
  error::{DataError, StructuralError},
  node::{ArrayNode, NodeId, Variable},
  shape::Shape,
  state::NodeState,
};

fn check_bounds(lower: f64, upper: f64) -> Result<(), StructuralError> {
  if lower.is_nan() || upper.is_nan() || lower > upper {
    return Err(StructuralError::InvalidParameter(format!(
      "empty value domain [{lower}, {upper}]"
    )));
  }
  Ok(())
}

fn check_position(state: &ArrayState, position: usize) -> Result<(), DataError> {
  if position >= state.len() {
    return Err(DataError::PositionOutOfRange {
      position,
      size: state.len(),
    });
  }
  Ok(())
}

/// Values must lie in `[lower, upper]`, and be whole numbers when `integral`.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Domain {
  lower: f64,
  upper: f64,
  integral: bool,
}

impl Domain {
  fn check(&self, value: f64) -> Result<(), DataError> {
    let inside = value >= self.lower && value <= self.upper;
    if !inside || (self.integral && value.fract() != 0.0) {
      return Err(DataError::ValueOutOfDomain { value });
    }
    Ok(())
  }

  fn check_all(&self, values: &[f64]) -> Result<(), DataError> {
    values.iter().try_for_each(|v| self.check(*v))
  }

  /// Smallest admissible value.
  fn first(&self) -> f64 {
    if self.integral {
      self.lower.ceil()
    } else {
      self.lower
    }
  }
}

// IntegerVariable *************************************************************

/// Fixed-shape array of integers within `[lower, upper]`.
#[derive(Debug, Clone, PartialEq)]
pub struct IntegerVariable {
  shape: Shape,
  domain: Domain,
}

impl IntegerVariable {
  /// Bounds are tightened to the enclosed integers.
  pub fn new(dims: &[usize], lower: f64, upper: f64) -> Result<Self, StructuralError> {
    let (lower, upper) = (lower.ceil(), upper.floor());
    check_bounds(lower, upper)?;
    Ok(IntegerVariable {
      shape: Shape::fixed(dims),
      domain: Domain {
        lower,
        upper,
        integral: true,
      },
    })
  }

  fn size(&self) -> usize {
    self.shape.size().unwrap_or(0)
  }
}

impl ArrayNode for IntegerVariable {
  fn name(&self) -> &'static str {
    "IntegerVariable"
  }

  fn predecessors(&self) -> &[NodeId] {
    &[]
  }

  fn shape(&self) -> &Shape {
    &self.shape
  }

  fn min(&self) -> f64 {
    self.domain.lower
  }

  fn max(&self) -> f64 {
    self.domain.upper
  }

  fn integral(&self) -> bool {
    true
  }

  fn max_size(&self) -> usize {
    self.size()
  }

  fn initialize(&self, _inputs: &[&ArrayState]) -> Result<NodeState, DataError> {
    Ok(NodeState::Array(ArrayState::new(vec![self.domain.first(); self.size()])))
  }

  fn variable(&self) -> Option<&dyn Variable> {
    Some(self)
  }
}

impl Variable for IntegerVariable {
  fn seed(&self, values: Vec<f64>) -> Result<ArrayState, DataError> {
    if values.len() != self.size() {
      return Err(DataError::WrongValueCount {
        expected: self.size(),
        got: values.len(),
      });
    }
    self.domain.check_all(&values)?;
    Ok(ArrayState::new(values))
  }

  fn set(&self, state: &mut ArrayState, index: usize, value: f64) -> Result<(), DataError> {
    check_position(state, index)?;
    self.domain.check(value)?;
    state.set(index, value);
    Ok(())
  }
}

// ListVariable ****************************************************************

/// Permutation of `0..n`, changed by exchanging two positions.
#[derive(Debug, Clone, PartialEq)]
pub struct ListVariable {
  shape: Shape,
  n: usize,
}

impl ListVariable {
  pub fn new(n: usize) -> Self {
    ListVariable {
      shape: Shape::fixed(&[n]),
      n,
    }
  }
}

impl ArrayNode for ListVariable {
  fn name(&self) -> &'static str {
    "ListVariable"
  }

  fn predecessors(&self) -> &[NodeId] {
    &[]
  }

  fn shape(&self) -> &Shape {
    &self.shape
  }

  fn min(&self) -> f64 {
    0.0
  }

  fn max(&self) -> f64 {
    self.n.saturating_sub(1) as f64
  }

  fn integral(&self) -> bool {
    true
  }

  fn max_size(&self) -> usize {
    self.n
  }

  fn initialize(&self, _inputs: &[&ArrayState]) -> Result<NodeState, DataError> {
    Ok(NodeState::Array(ArrayState::new((0..self.n).map(|v| v as f64).collect())))
  }

  fn variable(&self) -> Option<&dyn Variable> {
    Some(self)
  }
}

impl Variable for ListVariable {
  fn seed(&self, values: Vec<f64>) -> Result<ArrayState, DataError> {
    if values.len() != self.n {
      return Err(DataError::WrongValueCount {
        expected: self.n,
        got: values.len(),
      });
    }
    let mut seen = vec![false; self.n];
    for value in &values {
      let valid = value.fract() == 0.0 && *value >= 0.0 && (*value as usize) < self.n;
      if !valid || std::mem::replace(&mut seen[*value as usize], true) {
        return Err(DataError::ValueOutOfDomain { value: *value });
      }
    }
    Ok(ArrayState::new(values))
  }

  fn exchange(&self, state: &mut ArrayState, i: usize, j: usize) -> Result<(), DataError> {
    check_position(state, i)?;
    check_position(state, j)?;
    state.exchange(i, j);
    Ok(())
  }
}

// DynamicArray ****************************************************************

/// Array whose axis 0 grows and shrinks by whole rows at its tail.
#[derive(Debug, Clone, PartialEq)]
pub struct DynamicArray {
  shape: Shape,
  domain: Domain,
  min_rows: usize,
  max_rows: usize,
}

impl DynamicArray {
  /// Rows of shape `rest`, at most `max_rows` of them.
  pub fn new(
    rest: &[usize],
    lower: f64,
    upper: f64,
    integral: bool,
    max_rows: usize,
  ) -> Result<Self, StructuralError> {
    check_bounds(lower, upper)?;
    if rest.contains(&0) {
      return Err(StructuralError::InvalidParameter(
        "rows of a dynamic array cannot be empty".to_string(),
      ));
    }
    let domain = Domain {
      lower,
      upper,
      integral,
    };
    if integral && domain.first() > upper {
      return Err(StructuralError::InvalidParameter(format!(
        "no integer in [{lower}, {upper}]"
      )));
    }
    Ok(DynamicArray {
      shape: Shape::dynamic(rest),
      domain,
      min_rows: 0,
      max_rows,
    })
  }

  /// Require at least `min_rows` rows. The default value holds exactly that
  /// many.
  pub fn with_min_rows(mut self, min_rows: usize) -> Result<Self, StructuralError> {
    if min_rows > self.max_rows {
      return Err(StructuralError::InvalidParameter(format!(
        "min_rows {min_rows} exceeds max_rows {}",
        self.max_rows
      )));
    }
    self.min_rows = min_rows;
    Ok(self)
  }

  fn row_size(&self) -> usize {
    self.shape.row_size()
  }

  fn rows(&self, state: &ArrayState) -> usize {
    state.len() / self.row_size()
  }

  fn check_rows(&self, values: &[f64]) -> Result<usize, DataError> {
    let row = self.row_size();
    if values.len() % row != 0 {
      return Err(DataError::WrongValueCount {
        expected: (values.len() / row + 1) * row,
        got: values.len(),
      });
    }
    Ok(values.len() / row)
  }
}

impl ArrayNode for DynamicArray {
  fn name(&self) -> &'static str {
    "DynamicArray"
  }

  fn predecessors(&self) -> &[NodeId] {
    &[]
  }

  fn shape(&self) -> &Shape {
    &self.shape
  }

  fn min(&self) -> f64 {
    self.domain.first()
  }

  fn max(&self) -> f64 {
    if self.domain.integral {
      self.domain.upper.floor()
    } else {
      self.domain.upper
    }
  }

  fn integral(&self) -> bool {
    self.domain.integral
  }

  fn max_size(&self) -> usize {
    self.max_rows * self.row_size()
  }

  fn initialize(&self, _inputs: &[&ArrayState]) -> Result<NodeState, DataError> {
    let values = vec![self.domain.first(); self.min_rows * self.row_size()];
    Ok(NodeState::Array(ArrayState::with_capacity(values, self.max_size())))
  }

  fn variable(&self) -> Option<&dyn Variable> {
    Some(self)
  }
}

impl Variable for DynamicArray {
  fn seed(&self, values: Vec<f64>) -> Result<ArrayState, DataError> {
    let rows = self.check_rows(&values)?;
    if rows > self.max_rows {
      return Err(DataError::CapacityExceeded {
        requested: rows,
        max: self.max_rows,
      });
    }
    if rows < self.min_rows {
      return Err(DataError::BelowMinimumSize { min: self.min_rows });
    }
    self.domain.check_all(&values)?;
    Ok(ArrayState::with_capacity(values, self.max_size()))
  }

  fn set(&self, state: &mut ArrayState, index: usize, value: f64) -> Result<(), DataError> {
    check_position(state, index)?;
    self.domain.check(value)?;
    state.set(index, value);
    Ok(())
  }

  fn grow(&self, state: &mut ArrayState, values: &[f64]) -> Result<(), DataError> {
    let requested = self.rows(state) + self.check_rows(values)?;
    if requested > self.max_rows {
      return Err(DataError::CapacityExceeded {
        requested,
        max: self.max_rows,
      });
    }
    self.domain.check_all(values)?;
    values.iter().for_each(|v| state.emplace_back(*v));
    Ok(())
  }

  fn shrink(&self, state: &mut ArrayState) -> Result<(), DataError> {
    if self.rows(state) <= self.min_rows {
      return Err(DataError::BelowMinimumSize { min: self.min_rows });
    }
    for _ in 0..self.row_size() {
      state.pop_back();
    }
    Ok(())
  }
}
