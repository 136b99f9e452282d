/*!
  The operand tables of ECMA-335 Partition III, 1.5: which stack types each arithmetic operation
  accepts and what it produces, and which stack types may be compared.

  All lookups are over stack types (`int32`, `int64`, `native int`, `F`, `O`, `&`).
*/

use crate::bytecode::category::{ArithmeticInfo, ArithmeticOperation, ComparisonInfo, ComparisonOperator};
use crate::types::DataType;
use crate::types::DataType::{
  Int32, Int64, NativeInt, NativeFloat, ObjectReference, MutablePointer, ReadonlyPointer
};

/// `(left, right, result)`
type BinaryRule = (DataType, DataType, DataType);

const INTEGER_RULES: &[BinaryRule] = &[
  (Int32,     Int32,     Int32),
  (Int32,     NativeInt, NativeInt),
  (NativeInt, Int32,     NativeInt),
  (NativeInt, NativeInt, NativeInt),
  (Int64,     Int64,     Int64),
];

const FLOAT_RULES: &[BinaryRule] = &[
  (NativeFloat, NativeFloat, NativeFloat),
];

const POINTER_ADDITION_RULES: &[BinaryRule] = &[
  (MutablePointer,  Int32,           MutablePointer),
  (MutablePointer,  NativeInt,       MutablePointer),
  (Int32,           MutablePointer,  MutablePointer),
  (NativeInt,       MutablePointer,  MutablePointer),
  (ReadonlyPointer, Int32,           ReadonlyPointer),
  (ReadonlyPointer, NativeInt,       ReadonlyPointer),
  (Int32,           ReadonlyPointer, ReadonlyPointer),
  (NativeInt,       ReadonlyPointer, ReadonlyPointer),
];

const POINTER_SUBTRACTION_RULES: &[BinaryRule] = &[
  (MutablePointer,  Int32,           MutablePointer),
  (MutablePointer,  NativeInt,       MutablePointer),
  (ReadonlyPointer, Int32,           ReadonlyPointer),
  (ReadonlyPointer, NativeInt,       ReadonlyPointer),
  (MutablePointer,  MutablePointer,  NativeInt),
  (ReadonlyPointer, ReadonlyPointer, NativeInt),
  (MutablePointer,  ReadonlyPointer, NativeInt),
  (ReadonlyPointer, MutablePointer,  NativeInt),
];

const SHIFTED_TYPES : &[DataType] = &[Int32, Int64, NativeInt];
const SHIFT_AMOUNTS : &[DataType] = &[Int32, NativeInt];
const NEGATABLE     : &[DataType] = &[Int32, Int64, NativeInt, NativeFloat];
const COMPLEMENTABLE: &[DataType] = &[Int32, Int64, NativeInt];

/// The binary rule tables that apply to `info`.
fn binary_rules(info: ArithmeticInfo) -> Vec<&'static [BinaryRule]> {
  let mut tables = vec![INTEGER_RULES];
  if info.valid_for_floats() {
    tables.push(FLOAT_RULES);
  }
  // `add`, `sub`, and their unsigned overflow checked forms also do pointer arithmetic.
  let pointer_form = info.unsigned == info.overflow_checked;
  match info.operation {
    ArithmeticOperation::Add      if pointer_form => tables.push(POINTER_ADDITION_RULES),
    ArithmeticOperation::Subtract if pointer_form => tables.push(POINTER_SUBTRACTION_RULES),
    _ => {}
  }
  tables
}

/**
  The stack type an arithmetic operation produces from operands of the given stack types, or
  `None` if there is no rule for them. `operands` holds one type for unary operations and two,
  left then right, for binary ones.
*/
pub fn arithmetic_result(info: ArithmeticInfo, operands: &[DataType]) -> Option<DataType> {
  match (info.operation, operands) {

    (ArithmeticOperation::Negate, [value]) => {
      // `valid_for_floats` is true of `neg`, which has no unsigned or checked form.
      NEGATABLE.contains(value).then(|| *value)
    }

    (ArithmeticOperation::Not, [value]) => COMPLEMENTABLE.contains(value).then(|| *value),

    (ArithmeticOperation::ShiftLeft, [value, amount])
    | (ArithmeticOperation::ShiftRight, [value, amount]) => {
      (SHIFTED_TYPES.contains(value) && SHIFT_AMOUNTS.contains(amount)).then(|| *value)
    }

    (_, [left, right]) if info.arity() == 2 => {
      binary_rules(info)
        .into_iter()
        .flat_map(|table| table.iter())
        .find(|(l, r, _)| l == left && r == right)
        .map(|(_, _, result)| *result)
    }

    _ => None
  }
}

/**
  Can values of these stack types be compared by `ceq`, `cgt`, `clt` and their unsigned forms
  (ECMA-335 Partition III, 1.5 table 4)? Object references support only equality, and
  `cgt.un`, which compilers use to test for non-null.
*/
pub fn comparable(info: ComparisonInfo, left: DataType, right: DataType) -> bool {
  match (left, right) {
    | (Int32, Int32)
    | (Int32, NativeInt)
    | (NativeInt, Int32)
    | (NativeInt, NativeInt)
    | (Int64, Int64)
    | (NativeFloat, NativeFloat) => true,

    (ObjectReference, ObjectReference) => {
      matches!(info.operator, ComparisonOperator::Equal | ComparisonOperator::NotEqual)
        || (info.operator == ComparisonOperator::Greater && info.unsigned)
    }

    (l, r) => l.is_pointer() && r.is_pointer()
  }
}


#[cfg(test)]
mod tests {
  use super::*;
  use crate::bytecode::Opcode;

  fn result(opcode: Opcode, operands: &[DataType]) -> Option<DataType> {
    arithmetic_result(opcode.arithmetic(), operands)
  }

  #[test]
  fn binary_numeric_rules() {
    assert_eq!(result(Opcode::Add, &[Int32, Int32]), Some(Int32));
    assert_eq!(result(Opcode::Add, &[NativeInt, Int32]), Some(NativeInt));
    assert_eq!(result(Opcode::Mul, &[Int64, Int64]), Some(Int64));
    assert_eq!(result(Opcode::Div, &[NativeFloat, NativeFloat]), Some(NativeFloat));
    assert_eq!(result(Opcode::Add, &[NativeFloat, Int32]), None);
    assert_eq!(result(Opcode::Add, &[Int32, Int64]), None);
    assert_eq!(result(Opcode::Add, &[ObjectReference, ObjectReference]), None);
  }

  #[test]
  fn modifiers_exclude_floats() {
    assert_eq!(result(Opcode::AddOvf, &[NativeFloat, NativeFloat]), None);
    assert_eq!(result(Opcode::DivUn, &[NativeFloat, NativeFloat]), None);
    assert_eq!(result(Opcode::Xor, &[NativeFloat, NativeFloat]), None);
    assert_eq!(result(Opcode::AddOvfUn, &[Int32, Int32]), Some(Int32));
  }

  #[test]
  fn pointer_arithmetic() {
    assert_eq!(result(Opcode::Add, &[MutablePointer, Int32]), Some(MutablePointer));
    assert_eq!(result(Opcode::AddOvfUn, &[NativeInt, ReadonlyPointer]), Some(ReadonlyPointer));
    assert_eq!(result(Opcode::AddOvf, &[MutablePointer, Int32]), None);
    assert_eq!(result(Opcode::Sub, &[MutablePointer, MutablePointer]), Some(NativeInt));
    assert_eq!(result(Opcode::Sub, &[Int32, MutablePointer]), None);
    assert_eq!(result(Opcode::Mul, &[MutablePointer, Int32]), None);
  }

  #[test]
  fn unary_and_shift_rules() {
    assert_eq!(result(Opcode::Neg, &[NativeFloat]), Some(NativeFloat));
    assert_eq!(result(Opcode::Not, &[NativeFloat]), None);
    assert_eq!(result(Opcode::Shl, &[Int64, Int32]), Some(Int64));
    assert_eq!(result(Opcode::ShrUn, &[Int32, Int64]), None);
  }

  #[test]
  fn comparisons() {
    let ceq   = Opcode::Ceq.comparison();
    let clt   = Opcode::Clt.comparison();
    let cgtun = Opcode::CgtUn.comparison();
    assert!(comparable(ceq, Int32, NativeInt));
    assert!(!comparable(ceq, Int32, Int64));
    assert!(comparable(ceq, ObjectReference, ObjectReference));
    assert!(comparable(cgtun, ObjectReference, ObjectReference));
    assert!(!comparable(clt, ObjectReference, ObjectReference));
    assert!(!comparable(clt, NativeFloat, Int32));
  }
}
