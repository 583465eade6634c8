/// One recorded change to a node's buffer.
///
/// `old == None` is a tail placement, `value == None` a tail removal. An
/// update with both set overwrites an interior position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Update {
  pub index: usize,
  pub old: Option<f64>,
  pub value: Option<f64>,
}

impl Update {
  pub fn new(index: usize, old: f64, value: f64) -> Self {
    Update {
      index,
      old: Some(old),
      value: Some(value),
    }
  }

  pub fn placement(index: usize, value: f64) -> Self {
    Update {
      index,
      old: None,
      value: Some(value),
    }
  }

  pub fn removal(index: usize, old: f64) -> Self {
    Update {
      index,
      old: Some(old),
      value: None,
    }
  }

  pub fn is_placement(&self) -> bool {
    self.old.is_none()
  }

  pub fn is_removal(&self) -> bool {
    self.value.is_none()
  }
}

/// Buffer and pending diff of one node within one state.
///
/// Every mutation goes through this type so the diff always replays: applying
/// the new values in order to the committed buffer gives the current one, and
/// applying the old values in reverse restores it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArrayState {
  buffer: Vec<f64>,
  diff: Vec<Update>,
  committed_size: usize,
}

impl ArrayState {
  pub fn new(values: Vec<f64>) -> Self {
    let committed_size = values.len();
    ArrayState {
      buffer: values,
      diff: Vec::new(),
      committed_size,
    }
  }

  /// Like [`ArrayState::new`] but reserves room for `capacity` elements up
  /// front, so growing within that bound never reallocates.
  pub fn with_capacity(mut values: Vec<f64>, capacity: usize) -> Self {
    values.reserve(capacity.saturating_sub(values.len()));
    Self::new(values)
  }

  pub fn view(&self) -> &[f64] {
    &self.buffer
  }

  pub fn len(&self) -> usize {
    self.buffer.len()
  }

  pub fn is_empty(&self) -> bool {
    self.buffer.is_empty()
  }

  pub fn diff(&self) -> &[Update] {
    &self.diff
  }

  pub fn has_changes(&self) -> bool {
    !self.diff.is_empty()
  }

  pub fn committed_size(&self) -> usize {
    self.committed_size
  }

  pub fn size_diff(&self) -> isize {
    self.buffer.len() as isize - self.committed_size as isize
  }

  /// Overwrite an existing position. Returns whether anything changed.
  pub fn set(&mut self, index: usize, value: f64) -> bool {
    let old = self.buffer[index];
    if old == value {
      return false;
    }
    self.buffer[index] = value;
    self.diff.push(Update::new(index, old, value));
    true
  }

  pub fn exchange(&mut self, i: usize, j: usize) -> bool {
    if i == j || self.buffer[i] == self.buffer[j] {
      return false;
    }
    let (a, b) = (self.buffer[i], self.buffer[j]);
    self.set(i, b);
    self.set(j, a);
    true
  }

  pub fn emplace_back(&mut self, value: f64) {
    self.diff.push(Update::placement(self.buffer.len(), value));
    self.buffer.push(value);
  }

  pub fn pop_back(&mut self) -> Option<f64> {
    let old = self.buffer.pop()?;
    self.diff.push(Update::removal(self.buffer.len(), old));
    Some(old)
  }

  /// Replace the whole buffer, recording the smallest diff that does so.
  pub fn assign(&mut self, values: &[f64]) {
    let shared = values.len().min(self.buffer.len());
    for (index, value) in values.iter().take(shared).enumerate() {
      self.set(index, *value);
    }
    while self.buffer.len() > values.len() {
      self.pop_back();
    }
    for value in &values[shared..] {
      self.emplace_back(*value);
    }
  }

  pub fn commit(&mut self) {
    self.diff.clear();
    self.committed_size = self.buffer.len();
  }

  pub fn revert(&mut self) {
    for update in self.diff.drain(..).rev() {
      match (update.old, update.value) {
        (None, _) => {
          debug_assert_eq!(update.index + 1, self.buffer.len());
          self.buffer.pop();
        }
        (Some(old), None) => {
          debug_assert_eq!(update.index, self.buffer.len());
          self.buffer.push(old);
        }
        (Some(old), Some(_)) => self.buffer[update.index] = old,
      }
    }
    debug_assert_eq!(self.buffer.len(), self.committed_size);
  }
}

/// Replay `diff` forward onto a copy of `prior`.
pub fn apply_diff(prior: &[f64], diff: &[Update]) -> Vec<f64> {
  let mut out = prior.to_vec();
  for update in diff {
    match update.value {
      None => out.truncate(update.index),
      Some(value) if update.is_placement() => out.push(value),
      Some(value) => out[update.index] = value,
    }
  }
  out
}

/// Replay `diff` backwards from `current`, recovering the committed buffer.
pub fn undo_diff(current: &[f64], diff: &[Update]) -> Vec<f64> {
  let mut out = current.to_vec();
  for update in diff.iter().rev() {
    match update.old {
      None => out.truncate(update.index),
      Some(old) if update.is_removal() => out.push(old),
      Some(old) => out[update.index] = old,
    }
  }
  out
}
