/*!
  Inline operands: the shapes an opcode's operand can take, and `NumericalOperand`, the tagged
  container for whichever operand value was decoded.
*/

use std::fmt::{Display, Formatter};

use strum_macros::{Display as StrumDisplay, IntoStaticStr};

use crate::types::DataType;

/// The shape of an opcode's inline operand (ECMA-335 Partition VI, C.3 operand types).
#[derive(StrumDisplay, IntoStaticStr, Clone, Copy, Eq, PartialEq, Debug, Hash)]
pub enum OperandKind {
  InlineNone,
  ShortInlineI,
  InlineI,
  InlineI8,
  ShortInlineR,
  InlineR,
  ShortInlineVar,
  InlineVar,
  ShortInlineBrTarget,
  InlineBrTarget,
  InlineField,
  InlineMethod,
  InlineType,
  InlineString,
  InlineSig,
  InlineTok,
  /// A `u32` count followed by that many `i32` offsets.
  InlineSwitch,
}

impl OperandKind {

  /// Encoded size in bytes. The jump table of `switch` has no fixed size.
  pub fn size(self) -> Option<usize> {
    match self {
      OperandKind::InlineNone          => Some(0),
      | OperandKind::ShortInlineI
      | OperandKind::ShortInlineVar
      | OperandKind::ShortInlineBrTarget => Some(1),
      OperandKind::InlineVar           => Some(2),
      | OperandKind::InlineI
      | OperandKind::ShortInlineR
      | OperandKind::InlineBrTarget
      | OperandKind::InlineField
      | OperandKind::InlineMethod
      | OperandKind::InlineType
      | OperandKind::InlineString
      | OperandKind::InlineSig
      | OperandKind::InlineTok         => Some(4),
      OperandKind::InlineI8 | OperandKind::InlineR => Some(8),
      OperandKind::InlineSwitch        => None,
    }
  }

  /// The type the operand's bytes are read as.
  pub fn data_type(self) -> Option<DataType> {
    match self {
      OperandKind::InlineNone | OperandKind::InlineSwitch => None,
      OperandKind::ShortInlineI | OperandKind::ShortInlineBrTarget => Some(DataType::Int8),
      OperandKind::InlineI | OperandKind::InlineBrTarget => Some(DataType::Int32),
      OperandKind::InlineI8       => Some(DataType::Int64),
      OperandKind::ShortInlineR   => Some(DataType::Float32),
      OperandKind::InlineR        => Some(DataType::Float64),
      OperandKind::ShortInlineVar => Some(DataType::UInt8),
      OperandKind::InlineVar      => Some(DataType::UInt16),
      | OperandKind::InlineField
      | OperandKind::InlineMethod
      | OperandKind::InlineType
      | OperandKind::InlineString
      | OperandKind::InlineSig
      | OperandKind::InlineTok    => Some(DataType::UInt32),
    }
  }

  pub fn is_token(self) -> bool {
    matches!(
      self,
      | OperandKind::InlineField
      | OperandKind::InlineMethod
      | OperandKind::InlineType
      | OperandKind::InlineString
      | OperandKind::InlineSig
      | OperandKind::InlineTok
    )
  }

  pub fn is_branch_target(self) -> bool {
    matches!(
      self,
      OperandKind::ShortInlineBrTarget | OperandKind::InlineBrTarget | OperandKind::InlineSwitch
    )
  }

  /// Does this operand need a symbolic description (a label, member, or type) to be verified?
  pub fn is_symbolic(self) -> bool {
    self.is_token() || self.is_branch_target()
  }
}


/**
  A metadata token: the table number in the high byte and the 1-based row in the low three bytes
  (ECMA-335 Partition II, 22).
*/
#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
pub struct MetadataToken(pub u32);

impl MetadataToken {
  pub fn new(table: u8, row: u32) -> MetadataToken {
    MetadataToken(((table as u32) << 24) | (row & 0x00FF_FFFF))
  }

  pub fn table(self) -> u8 {
    (self.0 >> 24) as u8
  }

  pub fn row(self) -> u32 {
    self.0 & 0x00FF_FFFF
  }
}

impl Display for MetadataToken {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    write!(f, "0x{:08X}", self.0)
  }
}


/**
  The value of a decoded operand. Which variant is present depends on the `OperandKind` that
  produced it: 1, 2 and 4 byte integers and branch offsets are `Int32`, metadata tokens are
  `Token`, and so on.

  Accessors return `None` when asked for a kind other than the one stored. The only cross-kind
  readings are between `Token` and the 32 bit integers, which share their bits.
*/
#[derive(Clone, Copy, PartialEq, Debug)]
pub enum NumericalOperand {
  None,
  Int32(i32),
  UInt32(u32),
  Int64(i64),
  Float32(f32),
  Float64(f64),
  Token(MetadataToken),
}

impl NumericalOperand {

  pub fn as_int32(&self) -> Option<i32> {
    match *self {
      NumericalOperand::Int32(v) => Some(v),
      NumericalOperand::Token(t) => Some(t.0 as i32),
      _ => None
    }
  }

  pub fn as_uint32(&self) -> Option<u32> {
    match *self {
      NumericalOperand::UInt32(v) => Some(v),
      NumericalOperand::Token(t) => Some(t.0),
      _ => None
    }
  }

  pub fn as_int64(&self) -> Option<i64> {
    match *self {
      NumericalOperand::Int64(v) => Some(v),
      _ => None
    }
  }

  pub fn as_float32(&self) -> Option<f32> {
    match *self {
      NumericalOperand::Float32(v) => Some(v),
      _ => None
    }
  }

  pub fn as_float64(&self) -> Option<f64> {
    match *self {
      NumericalOperand::Float64(v) => Some(v),
      _ => None
    }
  }

  /// Reads a token, reinterpreting the bits of an `Int32` if that is what was stored.
  pub fn as_token(&self) -> Option<MetadataToken> {
    match *self {
      NumericalOperand::Token(t) => Some(t),
      NumericalOperand::Int32(v) => Some(MetadataToken(v as u32)),
      _ => None
    }
  }

  /// Is this a value an operand of `kind` could hold?
  pub fn fits(&self, kind: OperandKind) -> bool {
    match (kind, self) {
      (OperandKind::InlineNone, NumericalOperand::None) => true,
      (OperandKind::ShortInlineI, NumericalOperand::Int32(v))
      | (OperandKind::ShortInlineBrTarget, NumericalOperand::Int32(v)) => i8::try_from(*v).is_ok(),
      (OperandKind::ShortInlineVar, NumericalOperand::Int32(v)) => u8::try_from(*v).is_ok(),
      (OperandKind::InlineVar, NumericalOperand::Int32(v)) => u16::try_from(*v).is_ok(),
      (OperandKind::InlineI, NumericalOperand::Int32(_))
      | (OperandKind::InlineBrTarget, NumericalOperand::Int32(_)) => true,
      (OperandKind::InlineI8, NumericalOperand::Int64(_)) => true,
      (OperandKind::ShortInlineR, NumericalOperand::Float32(_)) => true,
      (OperandKind::InlineR, NumericalOperand::Float64(_)) => true,
      (kind, NumericalOperand::Token(_)) | (kind, NumericalOperand::Int32(_)) => kind.is_token(),
      _ => false
    }
  }
}

impl Display for NumericalOperand {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self {
      NumericalOperand::None       => Ok(()),
      NumericalOperand::Int32(v)   => write!(f, "{}", v),
      NumericalOperand::UInt32(v)  => write!(f, "{}", v),
      NumericalOperand::Int64(v)   => write!(f, "{}", v),
      NumericalOperand::Float32(v) => write!(f, "{:?}", v),
      NumericalOperand::Float64(v) => write!(f, "{:?}", v),
      NumericalOperand::Token(t)   => write!(f, "{}", t),
    }
  }
}
