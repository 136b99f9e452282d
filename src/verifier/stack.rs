/*!
  The simulated evaluation stack.

  An entry records the stack type of a value (`int32`, `int64`, `native int`, `F`, `O`, a managed
  pointer, or a value type) and, where known, the concrete type that produced it. The concrete
  type is absent only for the null reference pushed by `ldnull`.
*/

use std::fmt::{Display, Formatter};

use crate::bytecode::Opcode;
use crate::error::VerificationError;
use crate::types::{DataType, TypeRef, BUILTINS};

#[derive(Clone, Debug)]
pub struct StackEntry {
  pub data_type : DataType,
  pub concrete  : Option<TypeRef>,
}

impl StackEntry {

  /// A value of type `t`, decayed to its stack type.
  pub fn of(t: &TypeRef) -> StackEntry {
    StackEntry {
      data_type : t.data_type().to_stack_type(),
      concrete  : Some(t.clone())
    }
  }

  /// A value known only by its data type, typed as the matching builtin where there is one.
  pub fn of_data_type(data_type: DataType) -> StackEntry {
    StackEntry {
      data_type : data_type.to_stack_type(),
      concrete  : BUILTINS.for_data_type(data_type)
    }
  }

  pub fn null() -> StackEntry {
    StackEntry {
      data_type : DataType::ObjectReference,
      concrete  : None
    }
  }

  pub fn is_null(&self) -> bool {
    self.concrete.is_none() && self.data_type == DataType::ObjectReference
  }

  /**
    Can the two entries meet at a branch target? They must have the same stack type; the concrete
    types may differ. A null reference has the `O` tag, so it meets any object reference.
  */
  pub fn compatible_with(&self, other: &StackEntry) -> bool {
    self.data_type == other.data_type
  }
}

impl Display for StackEntry {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match &self.concrete {
      Some(t) => write!(f, "{}", t.name),
      None if self.is_null() => write!(f, "null"),
      None => write!(f, "{}", self.data_type)
    }
  }
}

/// Renders a stack state bottom to top, for diagnostics.
pub fn describe(entries: &[StackEntry]) -> String {
  entries
    .iter()
    .map(StackEntry::to_string)
    .collect::<Vec<String>>()
    .join(", ")
}


/**
  A bounded stack of `StackEntry`. It counts the pushes and pops since the last call to
  `reset_counts`, so the verifier can compare an instruction's effect with its declared stack
  behavior.
*/
#[derive(Clone, Debug)]
pub struct Stack {
  entries   : Vec<StackEntry>,
  max_depth : usize,
  pushes    : usize,
  pops      : usize,
}

impl Stack {

  pub fn new(max_depth: usize) -> Stack {
    Stack {
      entries: Vec::with_capacity(max_depth),
      max_depth,
      pushes: 0,
      pops: 0,
    }
  }

  pub fn push(&mut self, opcode: Opcode, entry: StackEntry) -> Result<(), VerificationError> {
    if self.entries.len() >= self.max_depth {
      return Err(VerificationError::StackOverflow { opcode, max_stack: self.max_depth });
    }
    self.entries.push(entry);
    self.pushes += 1;
    Ok(())
  }

  pub fn pop(&mut self, opcode: Opcode) -> Result<StackEntry, VerificationError> {
    let entry = self.entries.pop().ok_or(VerificationError::StackUnderflow { opcode })?;
    self.pops += 1;
    Ok(entry)
  }

  pub fn peek(&self) -> Option<&StackEntry> {
    self.entries.last()
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  /// Empties the stack, as `leave` and `endfinally` do.
  pub fn clear(&mut self) {
    self.pops += self.entries.len();
    self.entries.clear();
  }

  pub fn entries(&self) -> &[StackEntry] {
    &self.entries
  }

  pub fn snapshot(&self) -> Vec<StackEntry> {
    self.entries.clone()
  }

  /// Replaces the contents with a snapshot, without counting pushes or pops.
  pub fn restore(&mut self, snapshot: &[StackEntry]) {
    self.entries = snapshot.to_vec();
  }

  /// Same depth, and each entry compatible with the snapshot's.
  pub fn matches(&self, snapshot: &[StackEntry]) -> bool {
    self.entries.len() == snapshot.len()
      && self.entries.iter().zip(snapshot).all(|(a, b)| a.compatible_with(b))
  }

  pub fn reset_counts(&mut self) {
    self.pushes = 0;
    self.pops   = 0;
  }

  /// `(pops, pushes)` since the last reset.
  pub fn counts(&self) -> (usize, usize) {
    (self.pops, self.pushes)
  }
}

impl Display for Stack {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    write!(f, "[{}]", describe(&self.entries))
  }
}


#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn entries_decay_to_stack_types() {
    let entry = StackEntry::of(&BUILTINS.uint8);
    assert_eq!(entry.data_type, DataType::Int32);
    assert_eq!(entry.to_string(), "uint8");
    assert_eq!(StackEntry::of_data_type(DataType::Float32).data_type, DataType::NativeFloat);
    assert!(StackEntry::null().is_null());
    assert!(!StackEntry::of(&BUILTINS.string).is_null());
  }

  #[test]
  fn bounded() {
    let mut stack = Stack::new(1);
    stack.push(Opcode::LdcI40, StackEntry::of(&BUILTINS.int32)).unwrap();
    assert!(matches!(
      stack.push(Opcode::LdcI41, StackEntry::of(&BUILTINS.int32)),
      Err(VerificationError::StackOverflow { max_stack: 1, .. })
    ));
    stack.pop(Opcode::Pop).unwrap();
    assert!(matches!(stack.pop(Opcode::Pop), Err(VerificationError::StackUnderflow { .. })));
  }

  #[test]
  fn counts_and_snapshots() {
    let mut stack = Stack::new(4);
    stack.push(Opcode::Ldnull, StackEntry::null()).unwrap();
    stack.push(Opcode::LdcI40, StackEntry::of(&BUILTINS.int32)).unwrap();
    let snapshot = stack.snapshot();
    stack.reset_counts();
    stack.pop(Opcode::Pop).unwrap();
    assert_eq!(stack.counts(), (1, 0));
    assert!(!stack.matches(&snapshot));
    stack.restore(&snapshot);
    assert!(stack.matches(&snapshot));
    assert_eq!(stack.to_string(), "[null, int32]");
  }

  #[test]
  fn snapshots_match_by_stack_type() {
    let mut stack = Stack::new(4);
    stack.push(Opcode::Ldarg0, StackEntry::of(&BUILTINS.uint8)).unwrap();
    stack.push(Opcode::Ldstr, StackEntry::of(&BUILTINS.string)).unwrap();
    let snapshot = vec![StackEntry::of(&BUILTINS.int32), StackEntry::null()];
    assert!(stack.matches(&snapshot));

    let widened = vec![StackEntry::of(&BUILTINS.int64), StackEntry::null()];
    assert!(!stack.matches(&widened));
  }
}
