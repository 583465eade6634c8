//! NumPy-style indexing nodes.
//!
//! [`BasicIndexing`] takes scalar indices and slices. [`AdvancedIndexing`]
//! takes slices and index-array nodes, where the index arrays form one
//! contiguous block of axes. Both keep a dynamic leading axis dynamic and
//! resize their output at the tail only.

mod advanced;
mod basic;

pub use advanced::{AdvancedIndex, AdvancedIndexing, IndexedState};
pub use basic::{BasicIndex, BasicIndexing};

use crate::error::StructuralError;

/// `start:stop:step`, any part of which may be omitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Slice {
  pub start: Option<isize>,
  pub stop: Option<isize>,
  pub step: Option<isize>,
}

impl Slice {
  pub fn new(start: Option<isize>, stop: Option<isize>, step: Option<isize>) -> Self {
    Slice { start, stop, step }
  }

  /// `:`
  pub fn full() -> Self {
    Self::default()
  }

  /// `start:stop`
  pub fn range(start: isize, stop: isize) -> Self {
    Self::new(Some(start), Some(stop), None)
  }

  pub fn is_full(&self) -> bool {
    self.start.is_none() && self.stop.is_none() && matches!(self.step, None | Some(1))
  }

  /// Clamp against an axis of `extent` the way NumPy does.
  pub fn resolve(&self, extent: usize) -> Result<ResolvedSlice, StructuralError> {
    let step = self.step.unwrap_or(1);
    if step == 0 {
      return Err(StructuralError::ZeroStep);
    }
    let len = extent as isize;
    let clamp = |bound: isize| {
      if bound < 0 {
        let wrapped = bound + len;
        if wrapped < 0 {
          if step < 0 {
            -1
          } else {
            0
          }
        } else {
          wrapped
        }
      } else if bound >= len {
        if step < 0 {
          len - 1
        } else {
          len
        }
      } else {
        bound
      }
    };
    let start = match self.start {
      Some(s) => clamp(s),
      None if step < 0 => len - 1,
      None => 0,
    };
    let stop = match self.stop {
      Some(s) => clamp(s),
      None if step < 0 => -1,
      None => len,
    };
    let count = if step < 0 {
      if stop < start {
        (start - stop - 1) / (-step) + 1
      } else {
        0
      }
    } else if start < stop {
      (stop - start - 1) / step + 1
    } else {
      0
    };
    Ok(ResolvedSlice {
      start,
      step,
      len: count as usize,
    })
  }
}

/// A slice resolved against a concrete extent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedSlice {
  start: isize,
  step: isize,
  len: usize,
}

impl ResolvedSlice {
  pub fn len(&self) -> usize {
    self.len
  }

  pub fn is_empty(&self) -> bool {
    self.len == 0
  }

  /// Coordinate of the `k`-th selected element.
  pub fn nth(&self, k: usize) -> usize {
    debug_assert!(k < self.len);
    (self.start + k as isize * self.step) as usize
  }
}

/// Row-major flat offsets of every element selected by `axes`, each a slice
/// paired with the stride of the axis it selects from.
pub(crate) fn slice_offsets(base: usize, axes: &[(ResolvedSlice, usize)]) -> Vec<usize> {
  axes.iter().fold(vec![base], |acc, (slice, stride)| {
    acc
      .iter()
      .flat_map(|offset| (0..slice.len()).map(move |k| offset + slice.nth(k) * stride))
      .collect()
  })
}
