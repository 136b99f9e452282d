use std::fmt::{Display, Formatter};

use super::opcode::Opcode;
use super::operand::{NumericalOperand, OperandKind};

/**
  Holds the undecoded components of an instruction: the opcode and its operand. `switch` is the
  one opcode whose operand is not a single number; it carries its jump table of offsets,
  relative to the end of the instruction, instead.
*/
#[derive(Clone, PartialEq, Debug)]
pub enum RawInstruction {
  Numerical {
    opcode  : Opcode,
    operand : NumericalOperand
  },
  Switch(Vec<i32>),
}

impl RawInstruction {

  pub fn new(opcode: Opcode, operand: NumericalOperand) -> RawInstruction {
    RawInstruction::Numerical { opcode, operand }
  }

  /// An instruction whose opcode takes no operand.
  pub fn simple(opcode: Opcode) -> RawInstruction {
    RawInstruction::new(opcode, NumericalOperand::None)
  }

  pub fn opcode(&self) -> Opcode {
    match self {
      RawInstruction::Numerical { opcode, .. } => *opcode,
      RawInstruction::Switch(_)                => Opcode::Switch
    }
  }

  /// The numeric operand, or `None` for `switch`.
  pub fn operand(&self) -> Option<NumericalOperand> {
    match self {
      RawInstruction::Numerical { operand, .. } => Some(*operand),
      RawInstruction::Switch(_)                 => None
    }
  }

  pub fn jump_table(&self) -> Option<&[i32]> {
    match self {
      RawInstruction::Switch(targets) => Some(targets),
      _ => None
    }
  }

  /// Encoded size in bytes, including the opcode.
  pub fn size(&self) -> usize {
    match self {
      RawInstruction::Switch(targets) => 1 + 4 + 4 * targets.len(),
      RawInstruction::Numerical { opcode, .. } => {
        opcode.size() + opcode.operand_kind().size().unwrap_or(0)
      }
    }
  }

  /// Is the operand one the opcode's operand kind can hold?
  pub fn is_well_formed(&self) -> bool {
    match self {
      RawInstruction::Switch(_) => true,
      RawInstruction::Numerical { opcode, operand } => {
        let kind = opcode.operand_kind();
        kind != OperandKind::InlineSwitch && operand.fits(kind)
      }
    }
  }
}

impl Display for RawInstruction {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self {

      RawInstruction::Numerical { opcode, operand: NumericalOperand::None } => {
        write!(f, "{}", opcode)
      }

      RawInstruction::Numerical { opcode, operand } => {
        write!(f, "{} {}", opcode, operand)
      }

      RawInstruction::Switch(targets) => {
        write!(
          f,
          "switch ({})",
          targets
            .iter()
            .map(i32::to_string)
            .collect::<Vec<String>>()
            .join(", ")
        )
      }

    }
  }
}


#[cfg(test)]
mod tests {
  use super::*;
  use crate::bytecode::operand::MetadataToken;

  #[test]
  fn sizes() {
    assert_eq!(RawInstruction::simple(Opcode::Ret).size(), 1);
    assert_eq!(RawInstruction::new(Opcode::LdcI4S, NumericalOperand::Int32(-5)).size(), 2);
    assert_eq!(RawInstruction::new(Opcode::Ldarg, NumericalOperand::Int32(300)).size(), 4);
    assert_eq!(RawInstruction::Switch(vec![1, 2, 3]).size(), 5 + 12);
  }

  #[test]
  fn display() {
    assert_eq!(RawInstruction::new(Opcode::LdcI4S, NumericalOperand::Int32(-5)).to_string(), "ldc.i4.s -5");
    assert_eq!(RawInstruction::Switch(vec![3, -7]).to_string(), "switch (3, -7)");
    let call = RawInstruction::new(Opcode::Call, NumericalOperand::Token(MetadataToken::new(6, 2)));
    assert_eq!(call.to_string(), "call 0x06000002");
  }

  #[test]
  fn well_formedness() {
    assert!(RawInstruction::new(Opcode::LdcI8, NumericalOperand::Int64(1)).is_well_formed());
    assert!(!RawInstruction::new(Opcode::LdcI8, NumericalOperand::Int32(1)).is_well_formed());
    assert!(!RawInstruction::new(Opcode::Switch, NumericalOperand::None).is_well_formed());
  }
}
