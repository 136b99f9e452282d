/*!
  The CIL opcodes (ECMA-335 Partition III) and their descriptors.

  Each opcode is listed exactly once below, in numeric order, with its mnemonic, its declared
  stack behavior, its operand kind, the prefixes that may precede it, and its category. The
  `opcodes!` macro turns that table into the `Opcode` enum and the `describe` function, so the
  enum and the descriptors cannot drift apart.

  One byte opcodes have their byte as their value. Two byte opcodes are `0xFE` followed by a
  second byte, and have the value `0xFE00 | second`, so the two code spaces cannot overlap.

  Pop and push counts of `var` mean the count depends on the operand (calls) or that the opcode
  empties the stack (`leave`, `endfinally`, `ret`).
*/

use std::fmt::{Display, Formatter};

use num_enum::{IntoPrimitive, TryFromPrimitive};
use strum_macros::{Display as StrumDisplay, EnumIter, EnumString, IntoStaticStr};

use crate::types::DataType;
use super::category::*;
use super::operand::OperandKind;

/// The first byte of every two byte opcode.
pub const TWO_BYTE_ESCAPE: u8 = 0xFE;

/// An immutable description of one opcode.
#[derive(Clone, Copy, Eq, PartialEq, Debug, Hash)]
pub struct OpcodeDescriptor {
  pub opcode   : Opcode,
  /// `None` when the count varies.
  pub pop      : Option<u8>,
  /// `None` when the count varies.
  pub push     : Option<u8>,
  pub operand  : OperandKind,
  /// The prefixes that may legally precede this opcode.
  pub prefixes : Prefixes,
  pub category : Category,
}

impl OpcodeDescriptor {
  pub fn name(&self) -> &'static str {
    self.opcode.into()
  }

  pub fn value(&self) -> u16 {
    self.opcode.into()
  }
}

impl Display for OpcodeDescriptor {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    let count = |c: Option<u8>| c.map_or("var".to_string(), |c| c.to_string());
    write!(
      f,
      "{} (0x{:02X}) pop {} push {} {}",
      self.opcode, self.value(), count(self.pop), count(self.push), self.operand
    )
  }
}


macro_rules! stack_count {
  (var)        => { None };
  ($n:literal) => { Some($n) };
}

macro_rules! opcodes {
  (
    $(
      $variant:ident = $value:literal, $name:literal,
        $pop:tt, $push:tt, $operand:ident, $prefixes:expr, $category:expr;
    )*
  ) => {
    /**
      Every CIL opcode. The discriminant is the numeric opcode value, and the `Display` and
      `FromStr` forms are the ILasm mnemonic.
    */
    #[derive(
      StrumDisplay, IntoStaticStr, EnumString, EnumIter, TryFromPrimitive, IntoPrimitive,
      Clone,        Copy,          Eq,         PartialEq, Ord,              PartialOrd,   Debug, Hash
    )]
    #[repr(u16)]
    pub enum Opcode {
      $(
        #[strum(serialize = $name)]
        $variant = $value,
      )*
    }

    pub(crate) fn describe(opcode: Opcode) -> OpcodeDescriptor {
      match opcode {
        $(
          Opcode::$variant => OpcodeDescriptor {
            opcode,
            pop      : stack_count!($pop),
            push     : stack_count!($push),
            operand  : OperandKind::$operand,
            prefixes : $prefixes,
            category : $category,
          },
        )*
      }
    }
  };
}


// region Row helpers

const NONE      : Prefixes = Prefixes::NONE;
const NO        : Prefixes = Prefixes::NO;
const VOLATILE  : Prefixes = Prefixes::VOLATILE;
const TAIL      : Prefixes = Prefixes::TAIL;
const MEMORY    : Prefixes = Prefixes::UNALIGNED.union(Prefixes::VOLATILE);
const MEMORY_NO : Prefixes = MEMORY.union(Prefixes::NO);
const VIRTUAL   : Prefixes = Prefixes::TAIL.union(Prefixes::CONSTRAINED).union(Prefixes::NO);
const ADDRESS   : Prefixes = Prefixes::READONLY.union(Prefixes::NO);

use crate::types::DataType as T;
use super::category::AccessKind::{Load, LoadAddress, Store};
use super::category::ArithmeticOperation as Op;
use super::category::ComparisonOperator as Cmp;
use super::category::VariableKind::{Argument, Local};

const fn br(kind: BranchKind, short_form: bool) -> Category {
  Category::Branch(BranchInfo { kind, short_form })
}

const fn br_cmp(operator: ComparisonOperator, unsigned: bool, short_form: bool) -> Category {
  br(BranchKind::Comparison(ComparisonInfo { operator, unsigned }), short_form)
}

const fn br_bool(branch_if: bool, short_form: bool) -> Category {
  br(BranchKind::Boolean { branch_if }, short_form)
}

const fn arith(operation: ArithmeticOperation, unsigned: bool, overflow_checked: bool) -> Category {
  Category::Arithmetic(ArithmeticInfo { operation, unsigned, overflow_checked })
}

const fn cmp(operator: ComparisonOperator, unsigned: bool) -> Category {
  Category::Comparison(ComparisonInfo { operator, unsigned })
}

const fn conv(target: DataType, overflow_checked: bool, unsigned_source: bool) -> Category {
  Category::Conversion(ConversionInfo { target, overflow_checked, unsigned_source })
}

const fn field(access: AccessKind, is_static: bool) -> Category {
  Category::Field(FieldAccess { access, is_static })
}

const fn elem(access: AccessKind, element_type: Option<DataType>) -> Category {
  Category::ArrayElement(ElementAccess { access, element_type })
}

const fn ind(access: AccessKind, data_type: Option<DataType>) -> Category {
  Category::Indirect(IndirectAccess { access, data_type })
}

const fn var(access: AccessKind, variable: VariableKind, index: Option<u16>) -> Category {
  Category::Variable(VariableAccess { access, variable, index })
}

const fn call(kind: CallKind) -> Category {
  Category::Call(kind)
}

const fn ldc(info: ConstantInfo) -> Category {
  Category::Constant(info)
}

const fn cast(kind: CastKind) -> Category {
  Category::Cast(kind)
}

const fn prefix(prefix: Prefixes) -> Category {
  Category::Prefix(prefix)
}

const OTHER: Category = Category::Other;

// endregion


opcodes! {
  Nop          = 0x00, "nop",         0, 0, InlineNone, NONE, OTHER;
  Break        = 0x01, "break",       0, 0, InlineNone, NONE, OTHER;
  Ldarg0       = 0x02, "ldarg.0",     0, 1, InlineNone, NONE, var(Load, Argument, Some(0));
  Ldarg1       = 0x03, "ldarg.1",     0, 1, InlineNone, NONE, var(Load, Argument, Some(1));
  Ldarg2       = 0x04, "ldarg.2",     0, 1, InlineNone, NONE, var(Load, Argument, Some(2));
  Ldarg3       = 0x05, "ldarg.3",     0, 1, InlineNone, NONE, var(Load, Argument, Some(3));
  Ldloc0       = 0x06, "ldloc.0",     0, 1, InlineNone, NONE, var(Load, Local, Some(0));
  Ldloc1       = 0x07, "ldloc.1",     0, 1, InlineNone, NONE, var(Load, Local, Some(1));
  Ldloc2       = 0x08, "ldloc.2",     0, 1, InlineNone, NONE, var(Load, Local, Some(2));
  Ldloc3       = 0x09, "ldloc.3",     0, 1, InlineNone, NONE, var(Load, Local, Some(3));
  Stloc0       = 0x0A, "stloc.0",     1, 0, InlineNone, NONE, var(Store, Local, Some(0));
  Stloc1       = 0x0B, "stloc.1",     1, 0, InlineNone, NONE, var(Store, Local, Some(1));
  Stloc2       = 0x0C, "stloc.2",     1, 0, InlineNone, NONE, var(Store, Local, Some(2));
  Stloc3       = 0x0D, "stloc.3",     1, 0, InlineNone, NONE, var(Store, Local, Some(3));
  LdargS       = 0x0E, "ldarg.s",     0, 1, ShortInlineVar, NONE, var(Load, Argument, None);
  LdargaS      = 0x0F, "ldarga.s",    0, 1, ShortInlineVar, NONE, var(LoadAddress, Argument, None);
  StargS       = 0x10, "starg.s",     1, 0, ShortInlineVar, NONE, var(Store, Argument, None);
  LdlocS       = 0x11, "ldloc.s",     0, 1, ShortInlineVar, NONE, var(Load, Local, None);
  LdlocaS      = 0x12, "ldloca.s",    0, 1, ShortInlineVar, NONE, var(LoadAddress, Local, None);
  StlocS       = 0x13, "stloc.s",     1, 0, ShortInlineVar, NONE, var(Store, Local, None);
  Ldnull       = 0x14, "ldnull",      0, 1, InlineNone, NONE, ldc(ConstantInfo::Null);
  LdcI4M1      = 0x15, "ldc.i4.m1",   0, 1, InlineNone, NONE, ldc(ConstantInfo::Int32(Some(-1)));
  LdcI40       = 0x16, "ldc.i4.0",    0, 1, InlineNone, NONE, ldc(ConstantInfo::Int32(Some(0)));
  LdcI41       = 0x17, "ldc.i4.1",    0, 1, InlineNone, NONE, ldc(ConstantInfo::Int32(Some(1)));
  LdcI42       = 0x18, "ldc.i4.2",    0, 1, InlineNone, NONE, ldc(ConstantInfo::Int32(Some(2)));
  LdcI43       = 0x19, "ldc.i4.3",    0, 1, InlineNone, NONE, ldc(ConstantInfo::Int32(Some(3)));
  LdcI44       = 0x1A, "ldc.i4.4",    0, 1, InlineNone, NONE, ldc(ConstantInfo::Int32(Some(4)));
  LdcI45       = 0x1B, "ldc.i4.5",    0, 1, InlineNone, NONE, ldc(ConstantInfo::Int32(Some(5)));
  LdcI46       = 0x1C, "ldc.i4.6",    0, 1, InlineNone, NONE, ldc(ConstantInfo::Int32(Some(6)));
  LdcI47       = 0x1D, "ldc.i4.7",    0, 1, InlineNone, NONE, ldc(ConstantInfo::Int32(Some(7)));
  LdcI48       = 0x1E, "ldc.i4.8",    0, 1, InlineNone, NONE, ldc(ConstantInfo::Int32(Some(8)));
  LdcI4S       = 0x1F, "ldc.i4.s",    0, 1, ShortInlineI, NONE, ldc(ConstantInfo::Int32(None));
  LdcI4        = 0x20, "ldc.i4",      0, 1, InlineI, NONE, ldc(ConstantInfo::Int32(None));
  LdcI8        = 0x21, "ldc.i8",      0, 1, InlineI8, NONE, ldc(ConstantInfo::Int64);
  LdcR4        = 0x22, "ldc.r4",      0, 1, ShortInlineR, NONE, ldc(ConstantInfo::Float32);
  LdcR8        = 0x23, "ldc.r8",      0, 1, InlineR, NONE, ldc(ConstantInfo::Float64);
  Dup          = 0x25, "dup",         1, 2, InlineNone, NONE, OTHER;
  Pop          = 0x26, "pop",         1, 0, InlineNone, NONE, OTHER;
  Jmp          = 0x27, "jmp",         0, 0, InlineMethod, NONE, call(CallKind::Jump);
  Call         = 0x28, "call",        var, var, InlineMethod, TAIL, call(CallKind::Call);
  Calli        = 0x29, "calli",       var, var, InlineSig, TAIL, call(CallKind::CallIndirect);
  Ret          = 0x2A, "ret",         var, 0, InlineNone, NONE, OTHER;
  BrS          = 0x2B, "br.s",        0, 0, ShortInlineBrTarget, NONE, br(BranchKind::Unconditional, true);
  BrfalseS     = 0x2C, "brfalse.s",   1, 0, ShortInlineBrTarget, NONE, br_bool(false, true);
  BrtrueS      = 0x2D, "brtrue.s",    1, 0, ShortInlineBrTarget, NONE, br_bool(true, true);
  BeqS         = 0x2E, "beq.s",       2, 0, ShortInlineBrTarget, NONE, br_cmp(Cmp::Equal, false, true);
  BgeS         = 0x2F, "bge.s",       2, 0, ShortInlineBrTarget, NONE, br_cmp(Cmp::GreaterOrEqual, false, true);
  BgtS         = 0x30, "bgt.s",       2, 0, ShortInlineBrTarget, NONE, br_cmp(Cmp::Greater, false, true);
  BleS         = 0x31, "ble.s",       2, 0, ShortInlineBrTarget, NONE, br_cmp(Cmp::LessOrEqual, false, true);
  BltS         = 0x32, "blt.s",       2, 0, ShortInlineBrTarget, NONE, br_cmp(Cmp::Less, false, true);
  BneUnS       = 0x33, "bne.un.s",    2, 0, ShortInlineBrTarget, NONE, br_cmp(Cmp::NotEqual, true, true);
  BgeUnS       = 0x34, "bge.un.s",    2, 0, ShortInlineBrTarget, NONE, br_cmp(Cmp::GreaterOrEqual, true, true);
  BgtUnS       = 0x35, "bgt.un.s",    2, 0, ShortInlineBrTarget, NONE, br_cmp(Cmp::Greater, true, true);
  BleUnS       = 0x36, "ble.un.s",    2, 0, ShortInlineBrTarget, NONE, br_cmp(Cmp::LessOrEqual, true, true);
  BltUnS       = 0x37, "blt.un.s",    2, 0, ShortInlineBrTarget, NONE, br_cmp(Cmp::Less, true, true);
  Br           = 0x38, "br",          0, 0, InlineBrTarget, NONE, br(BranchKind::Unconditional, false);
  Brfalse      = 0x39, "brfalse",     1, 0, InlineBrTarget, NONE, br_bool(false, false);
  Brtrue       = 0x3A, "brtrue",      1, 0, InlineBrTarget, NONE, br_bool(true, false);
  Beq          = 0x3B, "beq",         2, 0, InlineBrTarget, NONE, br_cmp(Cmp::Equal, false, false);
  Bge          = 0x3C, "bge",         2, 0, InlineBrTarget, NONE, br_cmp(Cmp::GreaterOrEqual, false, false);
  Bgt          = 0x3D, "bgt",         2, 0, InlineBrTarget, NONE, br_cmp(Cmp::Greater, false, false);
  Ble          = 0x3E, "ble",         2, 0, InlineBrTarget, NONE, br_cmp(Cmp::LessOrEqual, false, false);
  Blt          = 0x3F, "blt",         2, 0, InlineBrTarget, NONE, br_cmp(Cmp::Less, false, false);
  BneUn        = 0x40, "bne.un",      2, 0, InlineBrTarget, NONE, br_cmp(Cmp::NotEqual, true, false);
  BgeUn        = 0x41, "bge.un",      2, 0, InlineBrTarget, NONE, br_cmp(Cmp::GreaterOrEqual, true, false);
  BgtUn        = 0x42, "bgt.un",      2, 0, InlineBrTarget, NONE, br_cmp(Cmp::Greater, true, false);
  BleUn        = 0x43, "ble.un",      2, 0, InlineBrTarget, NONE, br_cmp(Cmp::LessOrEqual, true, false);
  BltUn        = 0x44, "blt.un",      2, 0, InlineBrTarget, NONE, br_cmp(Cmp::Less, true, false);
  Switch       = 0x45, "switch",      1, 0, InlineSwitch, NONE, br(BranchKind::Switch, false);
  LdindI1      = 0x46, "ldind.i1",    1, 1, InlineNone, MEMORY, ind(Load, Some(T::Int8));
  LdindU1      = 0x47, "ldind.u1",    1, 1, InlineNone, MEMORY, ind(Load, Some(T::UInt8));
  LdindI2      = 0x48, "ldind.i2",    1, 1, InlineNone, MEMORY, ind(Load, Some(T::Int16));
  LdindU2      = 0x49, "ldind.u2",    1, 1, InlineNone, MEMORY, ind(Load, Some(T::UInt16));
  LdindI4      = 0x4A, "ldind.i4",    1, 1, InlineNone, MEMORY, ind(Load, Some(T::Int32));
  LdindU4      = 0x4B, "ldind.u4",    1, 1, InlineNone, MEMORY, ind(Load, Some(T::UInt32));
  LdindI8      = 0x4C, "ldind.i8",    1, 1, InlineNone, MEMORY, ind(Load, Some(T::Int64));
  LdindI       = 0x4D, "ldind.i",     1, 1, InlineNone, MEMORY, ind(Load, Some(T::NativeInt));
  LdindR4      = 0x4E, "ldind.r4",    1, 1, InlineNone, MEMORY, ind(Load, Some(T::Float32));
  LdindR8      = 0x4F, "ldind.r8",    1, 1, InlineNone, MEMORY, ind(Load, Some(T::Float64));
  LdindRef     = 0x50, "ldind.ref",   1, 1, InlineNone, MEMORY, ind(Load, Some(T::ObjectReference));
  StindRef     = 0x51, "stind.ref",   2, 0, InlineNone, MEMORY, ind(Store, Some(T::ObjectReference));
  StindI1      = 0x52, "stind.i1",    2, 0, InlineNone, MEMORY, ind(Store, Some(T::Int8));
  StindI2      = 0x53, "stind.i2",    2, 0, InlineNone, MEMORY, ind(Store, Some(T::Int16));
  StindI4      = 0x54, "stind.i4",    2, 0, InlineNone, MEMORY, ind(Store, Some(T::Int32));
  StindI8      = 0x55, "stind.i8",    2, 0, InlineNone, MEMORY, ind(Store, Some(T::Int64));
  StindR4      = 0x56, "stind.r4",    2, 0, InlineNone, MEMORY, ind(Store, Some(T::Float32));
  StindR8      = 0x57, "stind.r8",    2, 0, InlineNone, MEMORY, ind(Store, Some(T::Float64));
  Add          = 0x58, "add",         2, 1, InlineNone, NONE, arith(Op::Add, false, false);
  Sub          = 0x59, "sub",         2, 1, InlineNone, NONE, arith(Op::Subtract, false, false);
  Mul          = 0x5A, "mul",         2, 1, InlineNone, NONE, arith(Op::Multiply, false, false);
  Div          = 0x5B, "div",         2, 1, InlineNone, NONE, arith(Op::Divide, false, false);
  DivUn        = 0x5C, "div.un",      2, 1, InlineNone, NONE, arith(Op::Divide, true, false);
  Rem          = 0x5D, "rem",         2, 1, InlineNone, NONE, arith(Op::Remainder, false, false);
  RemUn        = 0x5E, "rem.un",      2, 1, InlineNone, NONE, arith(Op::Remainder, true, false);
  And          = 0x5F, "and",         2, 1, InlineNone, NONE, arith(Op::And, false, false);
  Or           = 0x60, "or",          2, 1, InlineNone, NONE, arith(Op::Or, false, false);
  Xor          = 0x61, "xor",         2, 1, InlineNone, NONE, arith(Op::Xor, false, false);
  Shl          = 0x62, "shl",         2, 1, InlineNone, NONE, arith(Op::ShiftLeft, false, false);
  Shr          = 0x63, "shr",         2, 1, InlineNone, NONE, arith(Op::ShiftRight, false, false);
  ShrUn        = 0x64, "shr.un",      2, 1, InlineNone, NONE, arith(Op::ShiftRight, true, false);
  Neg          = 0x65, "neg",         1, 1, InlineNone, NONE, arith(Op::Negate, false, false);
  Not          = 0x66, "not",         1, 1, InlineNone, NONE, arith(Op::Not, false, false);
  ConvI1       = 0x67, "conv.i1",     1, 1, InlineNone, NONE, conv(T::Int8, false, false);
  ConvI2       = 0x68, "conv.i2",     1, 1, InlineNone, NONE, conv(T::Int16, false, false);
  ConvI4       = 0x69, "conv.i4",     1, 1, InlineNone, NONE, conv(T::Int32, false, false);
  ConvI8       = 0x6A, "conv.i8",     1, 1, InlineNone, NONE, conv(T::Int64, false, false);
  ConvR4       = 0x6B, "conv.r4",     1, 1, InlineNone, NONE, conv(T::Float32, false, false);
  ConvR8       = 0x6C, "conv.r8",     1, 1, InlineNone, NONE, conv(T::Float64, false, false);
  ConvU4       = 0x6D, "conv.u4",     1, 1, InlineNone, NONE, conv(T::UInt32, false, false);
  ConvU8       = 0x6E, "conv.u8",     1, 1, InlineNone, NONE, conv(T::UInt64, false, false);
  Callvirt     = 0x6F, "callvirt",    var, var, InlineMethod, VIRTUAL, call(CallKind::CallVirtual);
  Cpobj        = 0x70, "cpobj",       2, 0, InlineType, NONE, OTHER;
  Ldobj        = 0x71, "ldobj",       1, 1, InlineType, MEMORY, ind(Load, None);
  Ldstr        = 0x72, "ldstr",       0, 1, InlineString, NONE, ldc(ConstantInfo::String);
  Newobj       = 0x73, "newobj",      var, 1, InlineMethod, NONE, call(CallKind::NewObject);
  Castclass    = 0x74, "castclass",   1, 1, InlineType, NO, cast(CastKind::CastClass);
  Isinst       = 0x75, "isinst",      1, 1, InlineType, NONE, cast(CastKind::IsInstance);
  ConvRUn      = 0x76, "conv.r.un",   1, 1, InlineNone, NONE, conv(T::NativeFloat, false, true);
  Unbox        = 0x79, "unbox",       1, 1, InlineType, NO, cast(CastKind::Unbox);
  Throw        = 0x7A, "throw",       1, 0, InlineNone, NONE, OTHER;
  Ldfld        = 0x7B, "ldfld",       1, 1, InlineField, MEMORY_NO, field(Load, false);
  Ldflda       = 0x7C, "ldflda",      1, 1, InlineField, NO, field(LoadAddress, false);
  Stfld        = 0x7D, "stfld",       2, 0, InlineField, MEMORY_NO, field(Store, false);
  Ldsfld       = 0x7E, "ldsfld",      0, 1, InlineField, VOLATILE, field(Load, true);
  Ldsflda      = 0x7F, "ldsflda",     0, 1, InlineField, NONE, field(LoadAddress, true);
  Stsfld       = 0x80, "stsfld",      1, 0, InlineField, VOLATILE, field(Store, true);
  Stobj        = 0x81, "stobj",       2, 0, InlineType, MEMORY, ind(Store, None);
  ConvOvfI1Un  = 0x82, "conv.ovf.i1.un", 1, 1, InlineNone, NONE, conv(T::Int8, true, true);
  ConvOvfI2Un  = 0x83, "conv.ovf.i2.un", 1, 1, InlineNone, NONE, conv(T::Int16, true, true);
  ConvOvfI4Un  = 0x84, "conv.ovf.i4.un", 1, 1, InlineNone, NONE, conv(T::Int32, true, true);
  ConvOvfI8Un  = 0x85, "conv.ovf.i8.un", 1, 1, InlineNone, NONE, conv(T::Int64, true, true);
  ConvOvfU1Un  = 0x86, "conv.ovf.u1.un", 1, 1, InlineNone, NONE, conv(T::UInt8, true, true);
  ConvOvfU2Un  = 0x87, "conv.ovf.u2.un", 1, 1, InlineNone, NONE, conv(T::UInt16, true, true);
  ConvOvfU4Un  = 0x88, "conv.ovf.u4.un", 1, 1, InlineNone, NONE, conv(T::UInt32, true, true);
  ConvOvfU8Un  = 0x89, "conv.ovf.u8.un", 1, 1, InlineNone, NONE, conv(T::UInt64, true, true);
  ConvOvfIUn   = 0x8A, "conv.ovf.i.un",  1, 1, InlineNone, NONE, conv(T::NativeInt, true, true);
  ConvOvfUUn   = 0x8B, "conv.ovf.u.un",  1, 1, InlineNone, NONE, conv(T::NativeUInt, true, true);
  Box          = 0x8C, "box",         1, 1, InlineType, NONE, cast(CastKind::Box);
  Newarr       = 0x8D, "newarr",      1, 1, InlineType, NONE, OTHER;
  Ldlen        = 0x8E, "ldlen",       1, 1, InlineNone, NONE, OTHER;
  Ldelema      = 0x8F, "ldelema",     2, 1, InlineType, ADDRESS, elem(LoadAddress, None);
  LdelemI1     = 0x90, "ldelem.i1",   2, 1, InlineNone, NO, elem(Load, Some(T::Int8));
  LdelemU1     = 0x91, "ldelem.u1",   2, 1, InlineNone, NO, elem(Load, Some(T::UInt8));
  LdelemI2     = 0x92, "ldelem.i2",   2, 1, InlineNone, NO, elem(Load, Some(T::Int16));
  LdelemU2     = 0x93, "ldelem.u2",   2, 1, InlineNone, NO, elem(Load, Some(T::UInt16));
  LdelemI4     = 0x94, "ldelem.i4",   2, 1, InlineNone, NO, elem(Load, Some(T::Int32));
  LdelemU4     = 0x95, "ldelem.u4",   2, 1, InlineNone, NO, elem(Load, Some(T::UInt32));
  LdelemI8     = 0x96, "ldelem.i8",   2, 1, InlineNone, NO, elem(Load, Some(T::Int64));
  LdelemI      = 0x97, "ldelem.i",    2, 1, InlineNone, NO, elem(Load, Some(T::NativeInt));
  LdelemR4     = 0x98, "ldelem.r4",   2, 1, InlineNone, NO, elem(Load, Some(T::Float32));
  LdelemR8     = 0x99, "ldelem.r8",   2, 1, InlineNone, NO, elem(Load, Some(T::Float64));
  LdelemRef    = 0x9A, "ldelem.ref",  2, 1, InlineNone, NO, elem(Load, Some(T::ObjectReference));
  StelemI      = 0x9B, "stelem.i",    3, 0, InlineNone, NO, elem(Store, Some(T::NativeInt));
  StelemI1     = 0x9C, "stelem.i1",   3, 0, InlineNone, NO, elem(Store, Some(T::Int8));
  StelemI2     = 0x9D, "stelem.i2",   3, 0, InlineNone, NO, elem(Store, Some(T::Int16));
  StelemI4     = 0x9E, "stelem.i4",   3, 0, InlineNone, NO, elem(Store, Some(T::Int32));
  StelemI8     = 0x9F, "stelem.i8",   3, 0, InlineNone, NO, elem(Store, Some(T::Int64));
  StelemR4     = 0xA0, "stelem.r4",   3, 0, InlineNone, NO, elem(Store, Some(T::Float32));
  StelemR8     = 0xA1, "stelem.r8",   3, 0, InlineNone, NO, elem(Store, Some(T::Float64));
  StelemRef    = 0xA2, "stelem.ref",  3, 0, InlineNone, NO, elem(Store, Some(T::ObjectReference));
  Ldelem       = 0xA3, "ldelem",      2, 1, InlineType, NO, elem(Load, None);
  Stelem       = 0xA4, "stelem",      3, 0, InlineType, NO, elem(Store, None);
  UnboxAny     = 0xA5, "unbox.any",   1, 1, InlineType, NONE, cast(CastKind::UnboxAny);
  ConvOvfI1    = 0xB3, "conv.ovf.i1", 1, 1, InlineNone, NONE, conv(T::Int8, true, false);
  ConvOvfU1    = 0xB4, "conv.ovf.u1", 1, 1, InlineNone, NONE, conv(T::UInt8, true, false);
  ConvOvfI2    = 0xB5, "conv.ovf.i2", 1, 1, InlineNone, NONE, conv(T::Int16, true, false);
  ConvOvfU2    = 0xB6, "conv.ovf.u2", 1, 1, InlineNone, NONE, conv(T::UInt16, true, false);
  ConvOvfI4    = 0xB7, "conv.ovf.i4", 1, 1, InlineNone, NONE, conv(T::Int32, true, false);
  ConvOvfU4    = 0xB8, "conv.ovf.u4", 1, 1, InlineNone, NONE, conv(T::UInt32, true, false);
  ConvOvfI8    = 0xB9, "conv.ovf.i8", 1, 1, InlineNone, NONE, conv(T::Int64, true, false);
  ConvOvfU8    = 0xBA, "conv.ovf.u8", 1, 1, InlineNone, NONE, conv(T::UInt64, true, false);
  Refanyval    = 0xC2, "refanyval",   1, 1, InlineType, NONE, OTHER;
  Ckfinite     = 0xC3, "ckfinite",    1, 1, InlineNone, NONE, OTHER;
  Mkrefany     = 0xC6, "mkrefany",    1, 1, InlineType, NONE, OTHER;
  Ldtoken      = 0xD0, "ldtoken",     0, 1, InlineTok, NONE, OTHER;
  ConvU2       = 0xD1, "conv.u2",     1, 1, InlineNone, NONE, conv(T::UInt16, false, false);
  ConvU1       = 0xD2, "conv.u1",     1, 1, InlineNone, NONE, conv(T::UInt8, false, false);
  ConvI        = 0xD3, "conv.i",      1, 1, InlineNone, NONE, conv(T::NativeInt, false, false);
  ConvOvfI     = 0xD4, "conv.ovf.i",  1, 1, InlineNone, NONE, conv(T::NativeInt, true, false);
  ConvOvfU     = 0xD5, "conv.ovf.u",  1, 1, InlineNone, NONE, conv(T::NativeUInt, true, false);
  AddOvf       = 0xD6, "add.ovf",     2, 1, InlineNone, NONE, arith(Op::Add, false, true);
  AddOvfUn     = 0xD7, "add.ovf.un",  2, 1, InlineNone, NONE, arith(Op::Add, true, true);
  MulOvf       = 0xD8, "mul.ovf",     2, 1, InlineNone, NONE, arith(Op::Multiply, false, true);
  MulOvfUn     = 0xD9, "mul.ovf.un",  2, 1, InlineNone, NONE, arith(Op::Multiply, true, true);
  SubOvf       = 0xDA, "sub.ovf",     2, 1, InlineNone, NONE, arith(Op::Subtract, false, true);
  SubOvfUn     = 0xDB, "sub.ovf.un",  2, 1, InlineNone, NONE, arith(Op::Subtract, true, true);
  Endfinally   = 0xDC, "endfinally",  var, 0, InlineNone, NONE, OTHER;
  Leave        = 0xDD, "leave",       var, 0, InlineBrTarget, NONE, br(BranchKind::Leave, false);
  LeaveS       = 0xDE, "leave.s",     var, 0, ShortInlineBrTarget, NONE, br(BranchKind::Leave, true);
  StindI       = 0xDF, "stind.i",     2, 0, InlineNone, MEMORY, ind(Store, Some(T::NativeInt));
  ConvU        = 0xE0, "conv.u",      1, 1, InlineNone, NONE, conv(T::NativeUInt, false, false);

  Arglist      = 0xFE00, "arglist",   0, 1, InlineNone, NONE, OTHER;
  Ceq          = 0xFE01, "ceq",       2, 1, InlineNone, NONE, cmp(Cmp::Equal, false);
  Cgt          = 0xFE02, "cgt",       2, 1, InlineNone, NONE, cmp(Cmp::Greater, false);
  CgtUn        = 0xFE03, "cgt.un",    2, 1, InlineNone, NONE, cmp(Cmp::Greater, true);
  Clt          = 0xFE04, "clt",       2, 1, InlineNone, NONE, cmp(Cmp::Less, false);
  CltUn        = 0xFE05, "clt.un",    2, 1, InlineNone, NONE, cmp(Cmp::Less, true);
  Ldftn        = 0xFE06, "ldftn",     0, 1, InlineMethod, NONE, call(CallKind::LoadFunction);
  Ldvirtftn    = 0xFE07, "ldvirtftn", 1, 1, InlineMethod, NO, call(CallKind::LoadVirtualFunction);
  Ldarg        = 0xFE09, "ldarg",     0, 1, InlineVar, NONE, var(Load, Argument, None);
  Ldarga       = 0xFE0A, "ldarga",    0, 1, InlineVar, NONE, var(LoadAddress, Argument, None);
  Starg        = 0xFE0B, "starg",     1, 0, InlineVar, NONE, var(Store, Argument, None);
  Ldloc        = 0xFE0C, "ldloc",     0, 1, InlineVar, NONE, var(Load, Local, None);
  Ldloca       = 0xFE0D, "ldloca",    0, 1, InlineVar, NONE, var(LoadAddress, Local, None);
  Stloc        = 0xFE0E, "stloc",     1, 0, InlineVar, NONE, var(Store, Local, None);
  Localloc     = 0xFE0F, "localloc",  1, 1, InlineNone, NONE, OTHER;
  Endfilter    = 0xFE11, "endfilter", 1, 0, InlineNone, NONE, OTHER;
  Unaligned    = 0xFE12, "unaligned.", 0, 0, ShortInlineI, NONE, prefix(Prefixes::UNALIGNED);
  Volatile     = 0xFE13, "volatile.", 0, 0, InlineNone, NONE, prefix(Prefixes::VOLATILE);
  Tail         = 0xFE14, "tail.",     0, 0, InlineNone, NONE, prefix(Prefixes::TAIL);
  Initobj      = 0xFE15, "initobj",   1, 0, InlineType, NONE, OTHER;
  Constrained  = 0xFE16, "constrained.", 0, 0, InlineType, NONE, prefix(Prefixes::CONSTRAINED);
  Cpblk        = 0xFE17, "cpblk",     3, 0, InlineNone, MEMORY, OTHER;
  Initblk      = 0xFE18, "initblk",   3, 0, InlineNone, MEMORY, OTHER;
  No           = 0xFE19, "no.",       0, 0, ShortInlineI, NONE, prefix(Prefixes::NO);
  Rethrow      = 0xFE1A, "rethrow",   0, 0, InlineNone, NONE, OTHER;
  Sizeof       = 0xFE1C, "sizeof",    0, 1, InlineType, NONE, OTHER;
  Refanytype   = 0xFE1D, "refanytype", 1, 1, InlineNone, NONE, OTHER;
  Readonly     = 0xFE1E, "readonly.", 0, 0, InlineNone, NONE, prefix(Prefixes::READONLY);
}


impl Opcode {

  /// The numeric opcode value, `0xFE00 | second` for two byte opcodes.
  pub fn value(self) -> u16 {
    self.into()
  }

  pub fn name(self) -> &'static str {
    self.into()
  }

  pub fn is_two_byte(self) -> bool {
    self.value() > 0xFF
  }

  /// The encoded size of the opcode itself, excluding its operand.
  pub fn size(self) -> usize {
    match self.is_two_byte() {
      true  => 2,
      false => 1
    }
  }

  pub fn descriptor(self) -> &'static OpcodeDescriptor {
    super::catalog::descriptor(self)
  }

  pub fn category(self) -> Category {
    self.descriptor().category
  }

  pub fn operand_kind(self) -> OperandKind {
    self.descriptor().operand
  }

  // region Category-specific accessors
  // Calling one of these on an opcode of another category is a programming error.

  pub fn branch(self) -> BranchInfo {
    match self.category() {
      Category::Branch(info) => info,
      other => unreachable!("Error: {} is not a branch opcode: {:?}", self, other)
    }
  }

  pub fn arithmetic(self) -> ArithmeticInfo {
    match self.category() {
      Category::Arithmetic(info) => info,
      other => unreachable!("Error: {} is not an arithmetic opcode: {:?}", self, other)
    }
  }

  pub fn comparison(self) -> ComparisonInfo {
    match self.category() {
      Category::Comparison(info) => info,
      Category::Branch(BranchInfo { kind: BranchKind::Comparison(info), .. }) => info,
      other => unreachable!("Error: {} is not a comparison opcode: {:?}", self, other)
    }
  }

  pub fn cast_kind(self) -> CastKind {
    match self.category() {
      Category::Cast(kind) => kind,
      other => unreachable!("Error: {} is not a cast opcode: {:?}", self, other)
    }
  }

  pub fn call_kind(self) -> CallKind {
    match self.category() {
      Category::Call(kind) => kind,
      other => unreachable!("Error: {} is not a call opcode: {:?}", self, other)
    }
  }

  // endregion

  /// Does control never continue with the following instruction?
  pub fn ends_flow(self) -> bool {
    match self {
      | Opcode::Ret
      | Opcode::Throw
      | Opcode::Rethrow
      | Opcode::Jmp
      | Opcode::Endfinally
      | Opcode::Endfilter => true,
      _ => match self.category() {
        Category::Branch(info) => !info.kind.falls_through(),
        _ => false
      }
    }
  }
}
