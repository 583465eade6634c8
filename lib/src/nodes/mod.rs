//! Node kinds: leaves that a search mutates or that hold fixed data, and the
//! indexing nodes built on top of them.

pub mod constant;
pub mod indexing;
pub mod variables;

pub use constant::Constant;
pub use indexing::{AdvancedIndex, AdvancedIndexing, BasicIndex, BasicIndexing, Slice};
pub use variables::{DynamicArray, IntegerVariable, ListVariable};

/// `(min, max, integral)` of `values`. An empty array reports `(0, 0, true)`.
pub(crate) fn value_stats(values: &[f64]) -> (f64, f64, bool) {
  if values.is_empty() {
    return (0.0, 0.0, true);
  }
  let min = values.iter().copied().fold(f64::INFINITY, f64::min);
  let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
  let integral = values.iter().all(|v| v.fract() == 0.0);
  (min, max, integral)
}
