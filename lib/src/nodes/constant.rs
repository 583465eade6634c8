use crate::{
  array::ArrayState,
  error::{DataError, StructuralError},
  node::{ArrayNode, NodeId},
  shape::Shape,
  state::NodeState,
};

use super::value_stats;

/// Fixed data. Its diff is always empty.
#[derive(Debug, Clone, PartialEq)]
pub struct Constant {
  data: Vec<f64>,
  shape: Shape,
  min: f64,
  max: f64,
  integral: bool,
}

impl Constant {
  pub fn scalar(value: f64) -> Self {
    Self::build(vec![value], Shape::scalar())
  }

  pub fn vector(values: Vec<f64>) -> Self {
    let len = values.len();
    Self::build(values, Shape::fixed(&[len]))
  }

  /// Row-major `values` shaped as `dims`.
  pub fn with_shape(values: Vec<f64>, dims: &[usize]) -> Result<Self, StructuralError> {
    let shape = Shape::fixed(dims);
    let expected = shape.size().unwrap_or(0);
    if values.len() != expected {
      return Err(StructuralError::InvalidParameter(format!(
        "{} values cannot fill shape {}",
        values.len(),
        shape
      )));
    }
    Ok(Self::build(values, shape))
  }

  fn build(data: Vec<f64>, shape: Shape) -> Self {
    let (min, max, integral) = value_stats(&data);
    Constant {
      data,
      shape,
      min,
      max,
      integral,
    }
  }
}

impl ArrayNode for Constant {
  fn name(&self) -> &'static str {
    "Constant"
  }

  fn predecessors(&self) -> &[NodeId] {
    &[]
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
    self.data.len()
  }

  fn initialize(&self, _inputs: &[&ArrayState]) -> Result<NodeState, DataError> {
    Ok(NodeState::Array(ArrayState::new(self.data.clone())))
  }
}
