/*!
  The narrow surface through which instructions are delivered, one call at a time, to whatever
  consumes them: the verifier, the bytecode writer, or a test recorder. Sinks compose: the
  verifier is a sink that owns another sink and forwards each call to it once the call passes
  verification.

  Labels and locals are opaque index handles handed out by the sink that created them.
*/

use std::fmt::{Display, Formatter};

use string_cache::DefaultAtom;

use crate::bytecode::{Opcode, NumericalOperand};
use crate::error::Result;
use crate::types::{FieldRef, Member, MethodRef, TypeRef};

/// A branch target.
#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
pub struct Label(pub(crate) usize);

impl Label {
  pub fn index(self) -> usize {
    self.0
  }
}

impl Display for Label {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    write!(f, "L{}", self.0)
  }
}

/// The index of a declared local variable, as used by `ldloc` and friends.
#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
pub struct LocalIndex(pub(crate) u16);

impl LocalIndex {
  pub fn index(self) -> u16 {
    self.0
  }
}

/**
  Receives the instructions of one method body in order.

  Each `emit_*` method takes the opcode together with the operand shape it needs: a label for
  branches, a method for calls, and so on. `emit` is for opcodes with no operand or a numeric one.
*/
pub trait InstructionSink {
  fn declare_local(&mut self, local_type: &TypeRef, name: &str) -> Result<LocalIndex>;

  fn create_label(&mut self, name: &str) -> Result<Label>;

  /// Binds `label` to the position of the next instruction.
  fn mark_label(&mut self, label: Label) -> Result<()>;

  fn emit(&mut self, opcode: Opcode, operand: NumericalOperand) -> Result<()>;

  fn emit_branch(&mut self, opcode: Opcode, target: Label) -> Result<()>;

  fn emit_switch(&mut self, targets: &[Label]) -> Result<()>;

  fn emit_call(&mut self, opcode: Opcode, method: &MethodRef) -> Result<()>;

  fn emit_field(&mut self, opcode: Opcode, field: &FieldRef) -> Result<()>;

  fn emit_type(&mut self, opcode: Opcode, operand_type: &TypeRef) -> Result<()>;

  fn emit_token(&mut self, opcode: Opcode, member: &Member) -> Result<()>;

  fn emit_string(&mut self, opcode: Opcode, value: &str) -> Result<()>;

  /// Ends the method body.
  fn finish(&mut self) -> Result<()> {
    Ok(())
  }
}

impl<S: InstructionSink + ?Sized> InstructionSink for &mut S {
  fn declare_local(&mut self, local_type: &TypeRef, name: &str) -> Result<LocalIndex> {
    (**self).declare_local(local_type, name)
  }

  fn create_label(&mut self, name: &str) -> Result<Label> {
    (**self).create_label(name)
  }

  fn mark_label(&mut self, label: Label) -> Result<()> {
    (**self).mark_label(label)
  }

  fn emit(&mut self, opcode: Opcode, operand: NumericalOperand) -> Result<()> {
    (**self).emit(opcode, operand)
  }

  fn emit_branch(&mut self, opcode: Opcode, target: Label) -> Result<()> {
    (**self).emit_branch(opcode, target)
  }

  fn emit_switch(&mut self, targets: &[Label]) -> Result<()> {
    (**self).emit_switch(targets)
  }

  fn emit_call(&mut self, opcode: Opcode, method: &MethodRef) -> Result<()> {
    (**self).emit_call(opcode, method)
  }

  fn emit_field(&mut self, opcode: Opcode, field: &FieldRef) -> Result<()> {
    (**self).emit_field(opcode, field)
  }

  fn emit_type(&mut self, opcode: Opcode, operand_type: &TypeRef) -> Result<()> {
    (**self).emit_type(opcode, operand_type)
  }

  fn emit_token(&mut self, opcode: Opcode, member: &Member) -> Result<()> {
    (**self).emit_token(opcode, member)
  }

  fn emit_string(&mut self, opcode: Opcode, value: &str) -> Result<()> {
    (**self).emit_string(opcode, value)
  }

  fn finish(&mut self) -> Result<()> {
    (**self).finish()
  }
}


/// One call received by a `RecordingSink`.
#[derive(Clone, Debug)]
pub enum SinkCall {
  DeclareLocal { local_type: TypeRef, name: DefaultAtom },
  CreateLabel(DefaultAtom),
  MarkLabel(Label),
  Emit(Opcode, NumericalOperand),
  Branch(Opcode, Label),
  Switch(Vec<Label>),
  Call(Opcode, MethodRef),
  Field(Opcode, FieldRef),
  Type(Opcode, TypeRef),
  Token(Opcode, Member),
  String(Opcode, String),
  Finish,
}

impl SinkCall {
  /// The opcode of an instruction call, or `None` for bookkeeping calls.
  pub fn opcode(&self) -> Option<Opcode> {
    match self {
      | SinkCall::Emit(opcode, _)
      | SinkCall::Branch(opcode, _)
      | SinkCall::Call(opcode, _)
      | SinkCall::Field(opcode, _)
      | SinkCall::Type(opcode, _)
      | SinkCall::Token(opcode, _)
      | SinkCall::String(opcode, _) => Some(*opcode),
      SinkCall::Switch(_) => Some(Opcode::Switch),
      _ => None
    }
  }
}

/// Keeps every call it receives, in order.
#[derive(Default, Debug)]
pub struct RecordingSink {
  calls  : Vec<SinkCall>,
  labels : usize,
  locals : u16,
}

impl RecordingSink {
  pub fn new() -> RecordingSink {
    RecordingSink::default()
  }

  pub fn calls(&self) -> &[SinkCall] {
    &self.calls
  }

  /// The opcodes of the instructions received, in order.
  pub fn opcodes(&self) -> Vec<Opcode> {
    self.calls.iter().filter_map(SinkCall::opcode).collect()
  }
}

impl InstructionSink for RecordingSink {
  fn declare_local(&mut self, local_type: &TypeRef, name: &str) -> Result<LocalIndex> {
    self.calls.push(SinkCall::DeclareLocal {
      local_type : local_type.clone(),
      name       : DefaultAtom::from(name)
    });
    self.locals += 1;
    Ok(LocalIndex(self.locals - 1))
  }

  fn create_label(&mut self, name: &str) -> Result<Label> {
    self.calls.push(SinkCall::CreateLabel(DefaultAtom::from(name)));
    self.labels += 1;
    Ok(Label(self.labels - 1))
  }

  fn mark_label(&mut self, label: Label) -> Result<()> {
    self.calls.push(SinkCall::MarkLabel(label));
    Ok(())
  }

  fn emit(&mut self, opcode: Opcode, operand: NumericalOperand) -> Result<()> {
    self.calls.push(SinkCall::Emit(opcode, operand));
    Ok(())
  }

  fn emit_branch(&mut self, opcode: Opcode, target: Label) -> Result<()> {
    self.calls.push(SinkCall::Branch(opcode, target));
    Ok(())
  }

  fn emit_switch(&mut self, targets: &[Label]) -> Result<()> {
    self.calls.push(SinkCall::Switch(targets.to_vec()));
    Ok(())
  }

  fn emit_call(&mut self, opcode: Opcode, method: &MethodRef) -> Result<()> {
    self.calls.push(SinkCall::Call(opcode, method.clone()));
    Ok(())
  }

  fn emit_field(&mut self, opcode: Opcode, field: &FieldRef) -> Result<()> {
    self.calls.push(SinkCall::Field(opcode, field.clone()));
    Ok(())
  }

  fn emit_type(&mut self, opcode: Opcode, operand_type: &TypeRef) -> Result<()> {
    self.calls.push(SinkCall::Type(opcode, operand_type.clone()));
    Ok(())
  }

  fn emit_token(&mut self, opcode: Opcode, member: &Member) -> Result<()> {
    self.calls.push(SinkCall::Token(opcode, member.clone()));
    Ok(())
  }

  fn emit_string(&mut self, opcode: Opcode, value: &str) -> Result<()> {
    self.calls.push(SinkCall::String(opcode, value.to_string()));
    Ok(())
  }

  fn finish(&mut self) -> Result<()> {
    self.calls.push(SinkCall::Finish);
    Ok(())
  }
}


/// Discards everything. For verifying without emitting.
#[derive(Default, Debug)]
pub struct NullSink {
  labels : usize,
  locals : u16,
}

impl InstructionSink for NullSink {
  fn declare_local(&mut self, _: &TypeRef, _: &str) -> Result<LocalIndex> {
    self.locals += 1;
    Ok(LocalIndex(self.locals - 1))
  }

  fn create_label(&mut self, _: &str) -> Result<Label> {
    self.labels += 1;
    Ok(Label(self.labels - 1))
  }

  fn mark_label(&mut self, _: Label) -> Result<()> { Ok(()) }
  fn emit(&mut self, _: Opcode, _: NumericalOperand) -> Result<()> { Ok(()) }
  fn emit_branch(&mut self, _: Opcode, _: Label) -> Result<()> { Ok(()) }
  fn emit_switch(&mut self, _: &[Label]) -> Result<()> { Ok(()) }
  fn emit_call(&mut self, _: Opcode, _: &MethodRef) -> Result<()> { Ok(()) }
  fn emit_field(&mut self, _: Opcode, _: &FieldRef) -> Result<()> { Ok(()) }
  fn emit_type(&mut self, _: Opcode, _: &TypeRef) -> Result<()> { Ok(()) }
  fn emit_token(&mut self, _: Opcode, _: &Member) -> Result<()> { Ok(()) }
  fn emit_string(&mut self, _: Opcode, _: &str) -> Result<()> { Ok(()) }
}
