use std::fmt;

use itertools::Itertools;

use crate::error::StructuralError;

/// Per-axis extents of an array node.
///
/// `None` marks the dynamic axis. There is at most one, and it is axis 0: the
/// array grows and shrinks by whole rows at its tail. Strides are row-major and
/// counted in elements.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Shape {
  extents: Vec<Option<usize>>,
}

impl Shape {
  pub fn scalar() -> Self {
    Shape { extents: vec![] }
  }

  pub fn fixed(dims: &[usize]) -> Self {
    Shape {
      extents: dims.iter().map(|d| Some(*d)).collect(),
    }
  }

  /// A shape whose axis 0 is dynamic, followed by the fixed `rest`.
  pub fn dynamic(rest: &[usize]) -> Self {
    let mut extents = Vec::with_capacity(rest.len() + 1);
    extents.push(None);
    extents.extend(rest.iter().map(|d| Some(*d)));
    Shape { extents }
  }

  pub fn from_extents(extents: Vec<Option<usize>>) -> Result<Self, StructuralError> {
    let misplaced = extents.iter().skip(1).any(Option::is_none);
    if misplaced {
      return Err(StructuralError::InvalidDynamicAxis(extents));
    }
    Ok(Shape { extents })
  }

  pub fn ndim(&self) -> usize {
    self.extents.len()
  }

  pub fn is_dynamic(&self) -> bool {
    matches!(self.extents.first(), Some(None))
  }

  pub fn extents(&self) -> &[Option<usize>] {
    &self.extents
  }

  /// Total number of elements, or `None` when the size is state-dependent.
  pub fn size(&self) -> Option<usize> {
    self.extents.iter().copied().product()
  }

  /// Number of elements in one step along axis 0. A scalar has a single
  /// element per row.
  pub fn row_size(&self) -> usize {
    self.extents.iter().skip(1).map(|e| e.unwrap_or(0)).product()
  }

  pub fn strides(&self) -> Vec<usize> {
    let mut strides = vec![1; self.ndim()];
    for axis in (0..self.ndim().saturating_sub(1)).rev() {
      strides[axis] = strides[axis + 1] * self.extents[axis + 1].unwrap_or(0);
    }
    strides
  }

  /// Flat offset of `coords`.
  pub fn ravel(&self, coords: &[usize]) -> usize {
    debug_assert_eq!(coords.len(), self.ndim());
    coords
      .iter()
      .zip(self.strides())
      .map(|(c, s)| c * s)
      .sum()
  }

  /// Coordinates of the flat offset `flat`. The leading coordinate is not
  /// bounded when axis 0 is dynamic.
  pub fn unravel(&self, mut flat: usize) -> Vec<usize> {
    let mut coords = vec![0; self.ndim()];
    for axis in (0..self.ndim()).rev() {
      match self.extents[axis] {
        Some(extent) if axis > 0 => {
          coords[axis] = flat % extent.max(1);
          flat /= extent.max(1);
        }
        _ => coords[axis] = flat,
      }
    }
    coords
  }

  /// Concrete dims for a state holding `size` elements.
  pub fn resolve(&self, size: usize) -> Vec<usize> {
    self
      .extents
      .iter()
      .enumerate()
      .map(|(axis, e)| match e {
        Some(d) => *d,
        None if self.row_size() == 0 => 0,
        None => {
          debug_assert_eq!(axis, 0);
          size / self.row_size()
        }
      })
      .collect()
  }
}

impl fmt::Display for Shape {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let dims = self
      .extents
      .iter()
      .map(|e| match e {
        Some(d) => d.to_string(),
        None => "-1".to_string(),
      })
      .join(", ");
    if self.ndim() == 1 {
      write!(f, "({},)", dims)
    } else {
      write!(f, "({})", dims)
    }
  }
}
