/*!
  Behavioral categories of opcodes. Each opcode belongs to exactly one `Category`, and each
  variant carries only the fields meaningful to it. Consumers dispatch with an exhaustive
  `match` on the category rather than inspecting opcode values.
*/

use strum_macros::{Display as StrumDisplay, IntoStaticStr};

use crate::types::DataType;

#[derive(Clone, Copy, Eq, PartialEq, Debug, Hash)]
pub enum Category {
  Branch(BranchInfo),
  Arithmetic(ArithmeticInfo),
  Comparison(ComparisonInfo),
  Conversion(ConversionInfo),
  Cast(CastKind),
  Field(FieldAccess),
  ArrayElement(ElementAccess),
  Indirect(IndirectAccess),
  Variable(VariableAccess),
  Call(CallKind),
  Constant(ConstantInfo),
  Prefix(Prefixes),
  /// Opcodes with no special category: `nop`, `dup`, `pop`, `ret`, `throw`, `sizeof`, ...
  Other,
}

impl Category {
  /// The shared view of the four location reference categories.
  pub fn location_reference(&self) -> Option<&dyn LocationReference> {
    match self {
      Category::Field(access)        => Some(access as &dyn LocationReference),
      Category::ArrayElement(access) => Some(access as &dyn LocationReference),
      Category::Indirect(access)     => Some(access as &dyn LocationReference),
      Category::Variable(access)     => Some(access as &dyn LocationReference),
      _ => None
    }
  }
}


// region Branches

#[derive(Clone, Copy, Eq, PartialEq, Debug, Hash)]
pub struct BranchInfo {
  pub kind       : BranchKind,
  /// Short forms take a 1 byte offset.
  pub short_form : bool,
}

#[derive(Clone, Copy, Eq, PartialEq, Debug, Hash)]
pub enum BranchKind {
  Unconditional,
  /// Exits a protected region, emptying the evaluation stack.
  Leave,
  /// `brtrue` (`branch_if: true`) and `brfalse`.
  Boolean { branch_if: bool },
  Comparison(ComparisonInfo),
  Switch,
}

impl BranchKind {
  /// Can control continue with the next instruction?
  pub fn falls_through(self) -> bool {
    !matches!(self, BranchKind::Unconditional | BranchKind::Leave)
  }
}

// endregion

// region Arithmetic and comparison

#[derive(StrumDisplay, IntoStaticStr, Clone, Copy, Eq, PartialEq, Debug, Hash)]
pub enum ArithmeticOperation {
  Add, Subtract, Multiply, Divide, Remainder,
  And, Or, Xor,
  ShiftLeft, ShiftRight,
  Negate, Not,
}

#[derive(Clone, Copy, Eq, PartialEq, Debug, Hash)]
pub struct ArithmeticInfo {
  pub operation        : ArithmeticOperation,
  pub unsigned         : bool,
  pub overflow_checked : bool,
}

impl ArithmeticInfo {
  pub fn arity(&self) -> usize {
    match self.operation {
      ArithmeticOperation::Negate | ArithmeticOperation::Not => 1,
      _ => 2
    }
  }

  /// Can this operation take floating point operands?
  pub fn valid_for_floats(&self) -> bool {
    !self.unsigned
      && !self.overflow_checked
      && matches!(
        self.operation,
        | ArithmeticOperation::Add
        | ArithmeticOperation::Subtract
        | ArithmeticOperation::Multiply
        | ArithmeticOperation::Divide
        | ArithmeticOperation::Remainder
        | ArithmeticOperation::Negate
      )
  }
}

#[derive(StrumDisplay, Clone, Copy, Eq, PartialEq, Debug, Hash)]
pub enum ComparisonOperator {
  Equal, NotEqual, Greater, GreaterOrEqual, Less, LessOrEqual,
}

#[derive(Clone, Copy, Eq, PartialEq, Debug, Hash)]
pub struct ComparisonInfo {
  pub operator : ComparisonOperator,
  /// Unsigned for integers, unordered for floats.
  pub unsigned : bool,
}

// endregion

#[derive(Clone, Copy, Eq, PartialEq, Debug, Hash)]
pub struct ConversionInfo {
  pub target           : DataType,
  pub overflow_checked : bool,
  /// The source is treated as unsigned (`.un` forms).
  pub unsigned_source  : bool,
}

#[derive(StrumDisplay, Clone, Copy, Eq, PartialEq, Debug, Hash)]
pub enum CastKind {
  CastClass,
  IsInstance,
  Box,
  Unbox,
  UnboxAny,
}

#[derive(StrumDisplay, Clone, Copy, Eq, PartialEq, Debug, Hash)]
pub enum CallKind {
  Call,
  CallVirtual,
  CallIndirect,
  NewObject,
  Jump,
  LoadFunction,
  LoadVirtualFunction,
}

#[derive(Clone, Copy, Eq, PartialEq, Debug, Hash)]
pub enum ConstantInfo {
  /// `ldc.i4.<n>` carries its value; the other forms read it from the operand.
  Int32(Option<i32>),
  Int64,
  Float32,
  Float64,
  Null,
  String,
}


// region Location references

#[derive(StrumDisplay, Clone, Copy, Eq, PartialEq, Debug, Hash)]
pub enum AccessKind {
  Load,
  LoadAddress,
  Store,
}

#[derive(StrumDisplay, Clone, Copy, Eq, PartialEq, Debug, Hash)]
pub enum LocationKind {
  Field,
  StaticField,
  ArrayElement,
  Indirect,
  Argument,
  Local,
}

/// What the field, array element, indirect, and variable categories have in common.
pub trait LocationReference {
  fn access(&self) -> AccessKind;
  fn location(&self) -> LocationKind;

  fn is_load(&self) -> bool {
    self.access() == AccessKind::Load
  }

  fn is_load_address(&self) -> bool {
    self.access() == AccessKind::LoadAddress
  }

  fn is_store(&self) -> bool {
    self.access() == AccessKind::Store
  }
}

#[derive(Clone, Copy, Eq, PartialEq, Debug, Hash)]
pub struct FieldAccess {
  pub access    : AccessKind,
  pub is_static : bool,
}

#[derive(Clone, Copy, Eq, PartialEq, Debug, Hash)]
pub struct ElementAccess {
  pub access       : AccessKind,
  /// `None` for the forms taking a type operand (`ldelem`, `stelem`, `ldelema`).
  pub element_type : Option<DataType>,
}

#[derive(Clone, Copy, Eq, PartialEq, Debug, Hash)]
pub struct IndirectAccess {
  pub access    : AccessKind,
  /// `None` for `ldobj` and `stobj`, which take a type operand.
  pub data_type : Option<DataType>,
}

#[derive(Clone, Copy, Eq, PartialEq, Debug, Hash)]
pub struct VariableAccess {
  pub access   : AccessKind,
  pub variable : VariableKind,
  /// The `.0` to `.3` forms carry their index; the others read it from the operand.
  pub index    : Option<u16>,
}

#[derive(StrumDisplay, Clone, Copy, Eq, PartialEq, Debug, Hash)]
pub enum VariableKind {
  Argument,
  Local,
}

impl LocationReference for FieldAccess {
  fn access(&self) -> AccessKind { self.access }
  fn location(&self) -> LocationKind {
    match self.is_static {
      true  => LocationKind::StaticField,
      false => LocationKind::Field
    }
  }
}

impl LocationReference for ElementAccess {
  fn access(&self) -> AccessKind { self.access }
  fn location(&self) -> LocationKind { LocationKind::ArrayElement }
}

impl LocationReference for IndirectAccess {
  fn access(&self) -> AccessKind { self.access }
  fn location(&self) -> LocationKind { LocationKind::Indirect }
}

impl LocationReference for VariableAccess {
  fn access(&self) -> AccessKind { self.access }
  fn location(&self) -> LocationKind {
    match self.variable {
      VariableKind::Argument => LocationKind::Argument,
      VariableKind::Local    => LocationKind::Local
    }
  }
}

// endregion


/// A set of instruction prefixes, as a bitmask.
#[derive(Clone, Copy, Eq, PartialEq, Debug, Hash, Default)]
pub struct Prefixes(u8);

impl Prefixes {
  pub const NONE        : Prefixes = Prefixes(0);
  pub const UNALIGNED   : Prefixes = Prefixes(1 << 0);
  pub const VOLATILE    : Prefixes = Prefixes(1 << 1);
  pub const TAIL        : Prefixes = Prefixes(1 << 2);
  pub const CONSTRAINED : Prefixes = Prefixes(1 << 3);
  pub const READONLY    : Prefixes = Prefixes(1 << 4);
  pub const NO          : Prefixes = Prefixes(1 << 5);

  pub const fn union(self, other: Prefixes) -> Prefixes {
    Prefixes(self.0 | other.0)
  }

  pub const fn contains(self, other: Prefixes) -> bool {
    self.0 & other.0 == other.0
  }

  pub const fn intersects(self, other: Prefixes) -> bool {
    self.0 & other.0 != 0
  }

  pub const fn is_empty(self) -> bool {
    self.0 == 0
  }
}
