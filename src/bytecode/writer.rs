/*!
  `BytecodeWriter` is the instruction sink at the end of a pipeline: it encodes each instruction
  it receives into CIL bytes.

  Symbolic operands become metadata tokens from a `TokenProvider`. Branches to labels that are
  not yet marked are written with a zero offset and a fixup is recorded; the fixup is patched
  when the label is marked. Offsets are relative to the end of the branch instruction, which for
  `switch` is the end of its whole jump table.
*/

use string_cache::DefaultAtom;
use tracing::trace;

use crate::error::{EmitError, Result};
use crate::sink::{InstructionSink, Label, LocalIndex};
use crate::symboltable::TokenProvider;
use crate::types::{FieldRef, Member, MethodRef, TypeRef};
use super::binary::encode_instruction_into;
use super::category::{BranchKind, CallKind, Category};
use super::instruction::RawInstruction;
use super::opcode::Opcode;
use super::operand::{MetadataToken, NumericalOperand};

struct LabelSlot {
  name   : DefaultAtom,
  offset : Option<usize>,
}

/// An offset waiting for its label to be marked.
struct Fixup {
  label      : Label,
  opcode     : Opcode,
  /// Where the offset bytes go.
  position   : usize,
  /// The offset the branch is relative to.
  origin     : usize,
  short_form : bool,
}

pub struct BytecodeWriter<P: TokenProvider> {
  code   : Vec<u8>,
  labels : Vec<LabelSlot>,
  fixups : Vec<Fixup>,
  locals : Vec<(TypeRef, DefaultAtom)>,
  tokens : P,
}

impl<P: TokenProvider> BytecodeWriter<P> {

  pub fn new(tokens: P) -> BytecodeWriter<P> {
    BytecodeWriter {
      code   : Vec::new(),
      labels : Vec::new(),
      fixups : Vec::new(),
      locals : Vec::new(),
      tokens
    }
  }

  /// The offset the next instruction will be written at.
  pub fn offset(&self) -> usize {
    self.code.len()
  }

  pub fn bytes(&self) -> &[u8] {
    &self.code
  }

  pub fn into_bytes(self) -> Vec<u8> {
    self.code
  }

  pub fn tokens(&self) -> &P {
    &self.tokens
  }

  /// The declared locals, in index order.
  pub fn locals(&self) -> impl Iterator<Item = (&TypeRef, &DefaultAtom)> {
    self.locals.iter().map(|(t, name)| (t, name))
  }

  fn slot(&self, label: Label) -> std::result::Result<&LabelSlot, EmitError> {
    self.labels.get(label.0).ok_or(EmitError::UnknownLabel { index: label.0 })
  }

  fn write(&mut self, instruction: RawInstruction) -> Result<()> {
    trace!(offset = self.code.len(), %instruction, "writing");
    encode_instruction_into(&instruction, &mut self.code)?;
    Ok(())
  }

  fn write_token(&mut self, opcode: Opcode, token: MetadataToken) -> Result<()> {
    self.write(RawInstruction::new(opcode, NumericalOperand::Token(token)))
  }

  /// Writes the offset to `fixup.label`, which must be marked.
  fn patch(&mut self, fixup: &Fixup) -> Result<()> {
    let slot = self.slot(fixup.label)?;
    let target =
      match slot.offset {
        Some(target) => target,
        None => return Err(EmitError::UnmarkedLabel { label: slot.name.to_string() }.into())
      };
    let relative = target as i64 - fixup.origin as i64;

    match fixup.short_form {
      true  => {
        let relative =
          i8::try_from(relative).map_err(|_| EmitError::BranchOutOfRange {
            opcode : fixup.opcode,
            label  : slot.name.to_string(),
            offset : relative
          })?;
        self.code[fixup.position] = relative as u8;
      }
      false => {
        let relative =
          i32::try_from(relative).map_err(|_| EmitError::BranchOutOfRange {
            opcode : fixup.opcode,
            label  : slot.name.to_string(),
            offset : relative
          })?;
        self.code[fixup.position..fixup.position + 4].copy_from_slice(&relative.to_le_bytes());
      }
    }
    Ok(())
  }

  /// Patches now if the label is marked, otherwise when it is.
  fn refer(&mut self, fixup: Fixup) -> Result<()> {
    match self.slot(fixup.label)?.offset {
      Some(_) => self.patch(&fixup),
      None    => {
        self.fixups.push(fixup);
        Ok(())
      }
    }
  }
}

impl<P: TokenProvider> InstructionSink for BytecodeWriter<P> {

  fn declare_local(&mut self, local_type: &TypeRef, name: &str) -> Result<LocalIndex> {
    self.locals.push((local_type.clone(), DefaultAtom::from(name)));
    Ok(LocalIndex((self.locals.len() - 1) as u16))
  }

  fn create_label(&mut self, name: &str) -> Result<Label> {
    self.labels.push(LabelSlot { name: DefaultAtom::from(name), offset: None });
    Ok(Label(self.labels.len() - 1))
  }

  fn mark_label(&mut self, label: Label) -> Result<()> {
    let offset = self.code.len();
    let slot = self.labels.get_mut(label.0).ok_or(EmitError::UnknownLabel { index: label.0 })?;
    if slot.offset.is_some() {
      return Err(EmitError::LabelAlreadyMarked { label: slot.name.to_string() }.into());
    }
    slot.offset = Some(offset);

    let (ready, waiting): (Vec<Fixup>, Vec<Fixup>) =
      std::mem::take(&mut self.fixups)
        .into_iter()
        .partition(|fixup| fixup.label == label);
    self.fixups = waiting;
    for fixup in ready {
      self.patch(&fixup)?;
    }
    Ok(())
  }

  fn emit(&mut self, opcode: Opcode, operand: NumericalOperand) -> Result<()> {
    self.write(RawInstruction::new(opcode, operand))
  }

  fn emit_branch(&mut self, opcode: Opcode, target: Label) -> Result<()> {
    let info =
      match opcode.category() {
        Category::Branch(info) if info.kind != BranchKind::Switch => info,
        _ => return Err(EmitError::InvalidOperand {
          opcode,
          kind    : opcode.operand_kind(),
          operand : format!("label {}", target)
        }.into())
      };

    self.write(RawInstruction::new(opcode, NumericalOperand::Int32(0)))?;
    let origin = self.code.len();
    let width  = match info.short_form {
      true  => 1,
      false => 4
    };
    self.refer(Fixup {
      label      : target,
      opcode,
      position   : origin - width,
      origin,
      short_form : info.short_form
    })
  }

  fn emit_switch(&mut self, targets: &[Label]) -> Result<()> {
    self.write(RawInstruction::Switch(vec![0; targets.len()]))?;
    let origin = self.code.len();
    let table  = origin - 4 * targets.len();
    for (i, target) in targets.iter().enumerate() {
      self.refer(Fixup {
        label      : *target,
        opcode     : Opcode::Switch,
        position   : table + 4 * i,
        origin,
        short_form : false
      })?;
    }
    Ok(())
  }

  fn emit_call(&mut self, opcode: Opcode, method: &MethodRef) -> Result<()> {
    let token =
      match opcode.category() {
        Category::Call(CallKind::CallIndirect) => self.tokens.signature_token(method),
        _ => self.tokens.method_token(method)
      };
    self.write_token(opcode, token)
  }

  fn emit_field(&mut self, opcode: Opcode, field: &FieldRef) -> Result<()> {
    let token = self.tokens.field_token(field);
    self.write_token(opcode, token)
  }

  fn emit_type(&mut self, opcode: Opcode, operand_type: &TypeRef) -> Result<()> {
    let token = self.tokens.type_token(operand_type);
    self.write_token(opcode, token)
  }

  fn emit_token(&mut self, opcode: Opcode, member: &Member) -> Result<()> {
    let token = self.tokens.member_token(member);
    self.write_token(opcode, token)
  }

  fn emit_string(&mut self, opcode: Opcode, value: &str) -> Result<()> {
    let token = self.tokens.string_token(value);
    self.write_token(opcode, token)
  }

  fn finish(&mut self) -> Result<()> {
    match self.fixups.first() {
      Some(fixup) => {
        let label = self.slot(fixup.label)?.name.to_string();
        Err(EmitError::UnmarkedLabel { label }.into())
      }
      None => Ok(())
    }
  }
}


#[cfg(test)]
mod tests {
  use super::*;
  use crate::bytecode::disassemble;
  use crate::error::Error;
  use crate::symboltable::{SymbolTable, USER_STRING_TABLE};

  fn writer() -> BytecodeWriter<SymbolTable> {
    BytecodeWriter::new(SymbolTable::new())
  }

  #[test]
  fn forward_and_backward_branches() {
    let mut w = writer();
    let top = w.create_label("top").unwrap();
    let end = w.create_label("end").unwrap();
    w.mark_label(top).unwrap();
    w.emit(Opcode::Nop, NumericalOperand::None).unwrap();
    w.emit_branch(Opcode::BrtrueS, end).unwrap();
    w.emit_branch(Opcode::Br, top).unwrap();
    w.mark_label(end).unwrap();
    w.emit(Opcode::Ret, NumericalOperand::None).unwrap();
    w.finish().unwrap();

    // nop; brtrue.s +5; br -8; ret
    assert_eq!(w.bytes(), &[0x00, 0x2D, 0x05, 0x38, 0xF8, 0xFF, 0xFF, 0xFF, 0x2A][..]);
    let text = disassemble(w.bytes()).unwrap();
    assert!(text.contains("IL_0001: brtrue.s IL_0008"));
    assert!(text.contains("IL_0003: br IL_0000"));
  }

  #[test]
  fn switch_offsets_are_relative_to_the_end_of_the_table() {
    let mut w = writer();
    let a = w.create_label("a").unwrap();
    let b = w.create_label("b").unwrap();
    w.emit_switch(&[a, b]).unwrap();
    w.mark_label(a).unwrap();
    w.emit(Opcode::Nop, NumericalOperand::None).unwrap();
    w.mark_label(b).unwrap();
    w.finish().unwrap();
    assert_eq!(
      w.bytes(),
      &[0x45, 2, 0, 0, 0, 0, 0, 0, 0, 1, 0, 0, 0, 0x00][..]
    );
  }

  #[test]
  fn short_branches_out_of_range() {
    let mut w = writer();
    let end = w.create_label("end").unwrap();
    w.emit_branch(Opcode::BrS, end).unwrap();
    for _ in 0..200 {
      w.emit(Opcode::Nop, NumericalOperand::None).unwrap();
    }
    assert!(matches!(
      w.mark_label(end),
      Err(Error::Emit(EmitError::BranchOutOfRange { opcode: Opcode::BrS, offset: 200, .. }))
    ));
  }

  #[test]
  fn unmarked_labels_fail_at_finish() {
    let mut w = writer();
    let end = w.create_label("end").unwrap();
    w.emit_branch(Opcode::Leave, end).unwrap();
    assert!(matches!(w.finish(), Err(Error::Emit(EmitError::UnmarkedLabel { .. }))));
    w.mark_label(end).unwrap();
    assert!(matches!(w.mark_label(end), Err(Error::Emit(EmitError::LabelAlreadyMarked { .. }))));
    w.finish().unwrap();
  }

  #[test]
  fn symbolic_operands_become_tokens() {
    let mut w = writer();
    w.emit_string(Opcode::Ldstr, "hello").unwrap();
    w.emit_string(Opcode::Ldstr, "hello").unwrap();
    let token = MetadataToken::new(USER_STRING_TABLE, 1).0.to_le_bytes();
    assert_eq!(&w.bytes()[1..5], &token[..]);
    assert_eq!(&w.bytes()[6..10], &token[..]);
    assert_eq!(w.tokens().len(), 1);
  }

  #[test]
  fn non_branches_cannot_take_labels() {
    let mut w = writer();
    let end = w.create_label("end").unwrap();
    assert!(matches!(
      w.emit_branch(Opcode::LdcI4, end),
      Err(Error::Emit(EmitError::InvalidOperand { .. }))
    ));
    assert!(w.bytes().is_empty());
  }
}
