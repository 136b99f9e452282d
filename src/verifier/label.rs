use string_cache::DefaultAtom;

use crate::error::{Result, UnsupportedOperation, VerificationError};
use crate::sink::Label;
use super::stack::{describe, Stack, StackEntry};

/// The verifier's record of one branch target.
#[derive(Clone, Debug)]
pub struct LabelInfo {
  pub name       : DefaultAtom,
  pub marked     : bool,
  /// Whether any branch names this label.
  pub targeted   : bool,
  /// The stack state captured the first time control reaches the label.
  pub snapshot   : Option<Vec<StackEntry>>,
  /// The downstream sink's handle for the same label.
  pub downstream : Label,
}

/// An arena of labels. A `Label` is an index into it.
#[derive(Default, Debug)]
pub struct LabelTable {
  labels: Vec<LabelInfo>,
}

impl LabelTable {

  pub fn create(&mut self, name: &str, downstream: Label) -> Label {
    self.labels.push(LabelInfo {
      name       : DefaultAtom::from(name),
      marked     : false,
      targeted   : false,
      snapshot   : None,
      downstream
    });
    Label(self.labels.len() - 1)
  }

  pub fn get(&self, label: Label) -> std::result::Result<&LabelInfo, VerificationError> {
    self.labels.get(label.0).ok_or(VerificationError::UnknownLabel { index: label.0 })
  }

  fn get_mut(&mut self, label: Label) -> std::result::Result<&mut LabelInfo, VerificationError> {
    self.labels.get_mut(label.0).ok_or(VerificationError::UnknownLabel { index: label.0 })
  }

  /// Binds the label to the current position. A label is marked at most once.
  pub fn mark(&mut self, label: Label) -> std::result::Result<(), VerificationError> {
    let info = self.get_mut(label)?;
    if info.marked {
      return Err(VerificationError::LabelAlreadyMarked { label: info.name.to_string() });
    }
    info.marked = true;
    Ok(())
  }

  /**
    Records that control reaches `label` with the given stack. The first state seen is kept;
    any later state must match it, since stack states are never merged.
  */
  pub fn reach(&mut self, label: Label, stack: &Stack, by_branch: bool) -> Result<()> {
    let info = self.get_mut(label)?;
    info.targeted |= by_branch;
    if let Some(snapshot) = &info.snapshot {
      return match stack.matches(snapshot) {
        true  => Ok(()),
        false => Err(UnsupportedOperation::StackMerge {
          label  : info.name.to_string(),
          first  : describe(snapshot),
          second : describe(stack.entries())
        }.into())
      };
    }
    info.snapshot = Some(stack.snapshot());
    Ok(())
  }

  /// The first label some branch targets that was never marked.
  pub fn first_unmarked_target(&self) -> Option<&LabelInfo> {
    self.labels.iter().find(|info| info.targeted && !info.marked)
  }
}


#[cfg(test)]
mod tests {
  use super::*;
  use crate::bytecode::Opcode;
  use crate::error::Error;
  use crate::types::BUILTINS;

  #[test]
  fn marked_once() {
    let mut table = LabelTable::default();
    let label = table.create("exit", Label(7));
    assert_eq!(table.get(label).unwrap().downstream, Label(7));
    table.mark(label).unwrap();
    assert!(matches!(table.mark(label), Err(VerificationError::LabelAlreadyMarked { .. })));
    assert!(matches!(table.mark(Label(3)), Err(VerificationError::UnknownLabel { index: 3 })));
  }

  #[test]
  fn differing_states_are_not_merged() {
    let mut table = LabelTable::default();
    let label = table.create("join", Label(0));
    let mut stack = Stack::new(4);

    table.reach(label, &stack, true).unwrap();
    assert_eq!(table.first_unmarked_target().map(|i| i.name.to_string()), Some("join".to_string()));
    table.reach(label, &stack, false).unwrap();

    stack.push(Opcode::LdcI40, StackEntry::of(&BUILTINS.int32)).unwrap();
    assert!(matches!(
      table.reach(label, &stack, true),
      Err(Error::Unsupported(UnsupportedOperation::StackMerge { .. }))
    ));
  }
}
