/*!
  The data types the CLI supports directly (ECMA-335 Partition I, 12.1) and the rules relating
  them: classification, decay to evaluation stack types, and the numeric conversion table.

  Classification is by membership in a `DataTypeSet`, a bitmask with one bit per `DataType`
  variant, so every predicate is a single `and` against a constant.
*/

use std::fmt::{Display, Formatter};

use strum_macros::{Display as StrumDisplay, EnumIter, IntoStaticStr};

/// Bytes occupied by native-sized integers and pointers. We model a 64 bit platform.
pub const POINTER_SIZE: u8 = 8;

#[derive(
  StrumDisplay, IntoStaticStr, EnumIter,
  Clone,        Copy,          Eq, PartialEq, Ord, PartialOrd, Debug, Hash
)]
#[repr(u8)]
pub enum DataType {
  #[strum(serialize = "int8")]      Int8,
  #[strum(serialize = "uint8")]     UInt8,
  #[strum(serialize = "int16")]     Int16,
  #[strum(serialize = "uint16")]    UInt16,
  #[strum(serialize = "int32")]     Int32,
  #[strum(serialize = "uint32")]    UInt32,
  #[strum(serialize = "int64")]     Int64,
  #[strum(serialize = "uint64")]    UInt64,
  #[strum(serialize = "float32")]   Float32,
  #[strum(serialize = "float64")]   Float64,
  #[strum(serialize = "native int")]      NativeInt,
  #[strum(serialize = "native uint")]     NativeUInt,
  /// The `F` type of the evaluation stack.
  #[strum(serialize = "F")]         NativeFloat,
  #[strum(serialize = "O")]         ObjectReference,
  #[strum(serialize = "&")]         MutablePointer,
  #[strum(serialize = "readonly &")] ReadonlyPointer,
  /// Any user-defined value type. Its layout is opaque to the verifier.
  #[strum(serialize = "valuetype")] ValueType,
}

impl DataType {
  pub const CHAR    : DataType = DataType::UInt16;
  pub const BOOLEAN : DataType = DataType::UInt8;

  #[inline]
  pub const fn bit(self) -> u32 {
    1u32 << (self as u8)
  }

  pub fn is_integer(self)    -> bool { DataTypeSet::INTEGER.contains(self) }
  pub fn is_float(self)      -> bool { DataTypeSet::FLOAT.contains(self) }
  pub fn is_numeric(self)    -> bool { DataTypeSet::NUMERIC.contains(self) }
  pub fn is_signed(self)     -> bool { DataTypeSet::SIGNED.contains(self) }
  pub fn is_unsigned(self)   -> bool { DataTypeSet::UNSIGNED.contains(self) }
  pub fn is_pointer(self)    -> bool { DataTypeSet::POINTER.contains(self) }
  pub fn is_reference(self)  -> bool { DataTypeSet::REFERENCE.contains(self) }
  pub fn is_stack_type(self) -> bool { DataTypeSet::STACK.contains(self) }
  pub fn is_native(self)     -> bool { DataTypeSet::NATIVE.contains(self) }

  /// Size in bytes. The opaque value type marker has no size.
  pub fn size(self) -> Option<u8> {
    match self {
      DataType::Int8  | DataType::UInt8  => Some(1),
      DataType::Int16 | DataType::UInt16 => Some(2),
      DataType::Int32 | DataType::UInt32 | DataType::Float32 => Some(4),
      DataType::Int64 | DataType::UInt64 | DataType::Float64 | DataType::NativeFloat => Some(8),
      | DataType::NativeInt
      | DataType::NativeUInt
      | DataType::ObjectReference
      | DataType::MutablePointer
      | DataType::ReadonlyPointer => Some(POINTER_SIZE),
      DataType::ValueType => None
    }
  }

  /**
    The type a value of this type has once it is loaded onto the evaluation stack
    (ECMA-335 Partition I, 12.3.2.1). Total and idempotent.
  */
  pub fn to_stack_type(self) -> DataType {
    match self {
      | DataType::Int8
      | DataType::UInt8
      | DataType::Int16
      | DataType::UInt16
      | DataType::Int32
      | DataType::UInt32 => DataType::Int32,

      DataType::Int64 | DataType::UInt64 => DataType::Int64,

      DataType::NativeInt | DataType::NativeUInt => DataType::NativeInt,

      DataType::Float32 | DataType::Float64 | DataType::NativeFloat => DataType::NativeFloat,

      | DataType::ObjectReference
      | DataType::MutablePointer
      | DataType::ReadonlyPointer
      | DataType::ValueType => self
    }
  }
}


/// A set of `DataType`s stored as a bitmask.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug, Default)]
pub struct DataTypeSet(u32);

impl DataTypeSet {
  pub const EMPTY: DataTypeSet = DataTypeSet(0);

  pub const SIGNED_INTEGER: DataTypeSet = DataTypeSet(
      DataType::Int8.bit()  | DataType::Int16.bit() | DataType::Int32.bit()
    | DataType::Int64.bit() | DataType::NativeInt.bit()
  );
  pub const UNSIGNED: DataTypeSet = DataTypeSet(
      DataType::UInt8.bit()  | DataType::UInt16.bit() | DataType::UInt32.bit()
    | DataType::UInt64.bit() | DataType::NativeUInt.bit()
  );
  pub const INTEGER: DataTypeSet = DataTypeSet(Self::SIGNED_INTEGER.0 | Self::UNSIGNED.0);
  pub const FLOAT: DataTypeSet = DataTypeSet(
    DataType::Float32.bit() | DataType::Float64.bit() | DataType::NativeFloat.bit()
  );
  pub const SIGNED: DataTypeSet = DataTypeSet(Self::SIGNED_INTEGER.0 | Self::FLOAT.0);
  pub const NUMERIC: DataTypeSet = DataTypeSet(Self::INTEGER.0 | Self::FLOAT.0);
  pub const POINTER: DataTypeSet = DataTypeSet(
    DataType::MutablePointer.bit() | DataType::ReadonlyPointer.bit()
  );
  pub const REFERENCE: DataTypeSet = DataTypeSet(DataType::ObjectReference.bit());
  pub const NATIVE: DataTypeSet = DataTypeSet(
    DataType::NativeInt.bit() | DataType::NativeUInt.bit() | DataType::NativeFloat.bit()
  );
  pub const STACK: DataTypeSet = DataTypeSet(
      DataType::Int32.bit()           | DataType::Int64.bit()          | DataType::NativeInt.bit()
    | DataType::NativeFloat.bit()     | DataType::ObjectReference.bit()
    | DataType::MutablePointer.bit()  | DataType::ReadonlyPointer.bit() | DataType::ValueType.bit()
  );
  /// Integer types conversions to which a reference or pointer may be converted.
  pub const POINTER_SIZED_INTEGER: DataTypeSet = DataTypeSet(
      DataType::NativeInt.bit() | DataType::NativeUInt.bit()
    | DataType::Int64.bit()     | DataType::UInt64.bit()
  );
  /// Operands a boolean branch (`brtrue`/`brfalse`) accepts.
  pub const BOOLEAN_TESTABLE: DataTypeSet = DataTypeSet(
      DataType::Int32.bit()           | DataType::Int64.bit() | DataType::NativeInt.bit()
    | DataType::ObjectReference.bit() | Self::POINTER.0
  );
  /// Operands usable as an array index, `switch` selector, or element count.
  pub const INDEX: DataTypeSet = DataTypeSet(DataType::Int32.bit() | DataType::NativeInt.bit());

  pub const fn of(data_type: DataType) -> DataTypeSet {
    DataTypeSet(data_type.bit())
  }

  pub const fn union(self, other: DataTypeSet) -> DataTypeSet {
    DataTypeSet(self.0 | other.0)
  }

  #[inline]
  pub const fn contains(self, data_type: DataType) -> bool {
    self.0 & data_type.bit() != 0
  }
}

impl Display for DataTypeSet {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    use strum::IntoEnumIterator;
    let names =
      DataType::iter()
        .filter(|t| self.contains(*t))
        .map(|t| t.to_string())
        .collect::<Vec<String>>()
        .join(" | ");
    write!(f, "{{{}}}", names)
  }
}


/// How a numeric conversion transforms the bits of its operand.
#[derive(StrumDisplay, Clone, Copy, Eq, PartialEq, Debug, Hash)]
pub enum ConversionKind {
  Identity,
  Truncate,
  ZeroExtend,
  SignExtend,
  ChangePrecision,
  FloatToInt,
  IntToFloat,
}

/**
  Looks up the numeric conversion table (ECMA-335 Partition III, 1.5 table 8). Returns the kind of
  conversion and whether it is verifiable, or `None` if no conversion exists.

  Converting an object reference or managed pointer to an integer is allowed but defeats garbage
  collector tracking, so it is never verifiable.
*/
pub fn conversion(source: DataType, target: DataType) -> Option<(ConversionKind, bool)> {
  let convertible_source =
    DataTypeSet::NUMERIC
      .union(DataTypeSet::REFERENCE)
      .union(DataTypeSet::POINTER);
  if !convertible_source.contains(source) || !target.is_numeric() {
    return None;
  }

  if source == target {
    return Some((ConversionKind::Identity, true));
  }

  if source.is_reference() || source.is_pointer() {
    return match DataTypeSet::POINTER_SIZED_INTEGER.contains(target) {
      true  => Some((ConversionKind::Identity, false)),
      false => None
    };
  }

  let kind =
    match (source.is_float(), target.is_float()) {
      (true, true)   => ConversionKind::ChangePrecision,
      (true, false)  => ConversionKind::FloatToInt,
      (false, true)  => ConversionKind::IntToFloat,
      (false, false) => {
        // Both are integers, so both have a size.
        let source_size = source.size().unwrap_or(POINTER_SIZE);
        let target_size = target.size().unwrap_or(POINTER_SIZE);
        if target_size <= source_size {
          ConversionKind::Truncate
        } else if source.is_signed() && target.is_signed() {
          ConversionKind::SignExtend
        } else {
          ConversionKind::ZeroExtend
        }
      }
    };

  Some((kind, true))
}


#[cfg(test)]
mod tests {
  use super::*;
  use strum::IntoEnumIterator;

  #[test]
  fn stack_decay_is_total_and_idempotent() {
    for t in DataType::iter() {
      let s = t.to_stack_type();
      assert!(s.is_stack_type(), "{} decays to non-stack type {}", t, s);
      assert_eq!(s.to_stack_type(), s);
    }
  }

  #[test]
  fn decay_of_short_and_unsigned_types() {
    assert_eq!(DataType::UInt8.to_stack_type(), DataType::Int32);
    assert_eq!(DataType::CHAR.to_stack_type(), DataType::Int32);
    assert_eq!(DataType::UInt64.to_stack_type(), DataType::Int64);
    assert_eq!(DataType::NativeUInt.to_stack_type(), DataType::NativeInt);
    assert_eq!(DataType::Float32.to_stack_type(), DataType::NativeFloat);
  }

  #[test]
  fn classification() {
    assert!(DataType::NativeUInt.is_integer());
    assert!(DataType::NativeUInt.is_unsigned());
    assert!(!DataType::NativeUInt.is_signed());
    assert!(DataType::Float64.is_signed());
    assert!(DataType::ReadonlyPointer.is_pointer());
    assert!(!DataType::ObjectReference.is_numeric());
    assert!(!DataType::UInt32.is_stack_type());
    assert_eq!(DataType::BOOLEAN, DataType::UInt8);
  }

  #[test]
  fn conversion_table() {
    use ConversionKind::*;
    assert_eq!(conversion(DataType::Int32, DataType::Int32), Some((Identity, true)));
    assert_eq!(conversion(DataType::Int64, DataType::Int32), Some((Truncate, true)));
    assert_eq!(conversion(DataType::Int32, DataType::Int64), Some((SignExtend, true)));
    assert_eq!(conversion(DataType::UInt32, DataType::Int64), Some((ZeroExtend, true)));
    assert_eq!(conversion(DataType::Int32, DataType::UInt64), Some((ZeroExtend, true)));
    assert_eq!(conversion(DataType::Float64, DataType::Float32), Some((ChangePrecision, true)));
    assert_eq!(conversion(DataType::Float64, DataType::Int32), Some((FloatToInt, true)));
    assert_eq!(conversion(DataType::Int32, DataType::NativeFloat), Some((IntToFloat, true)));
    assert_eq!(conversion(DataType::ObjectReference, DataType::NativeInt), Some((Identity, false)));
    assert_eq!(conversion(DataType::MutablePointer, DataType::UInt64), Some((Identity, false)));
    assert_eq!(conversion(DataType::ObjectReference, DataType::Int32), None);
    assert_eq!(conversion(DataType::Int32, DataType::ObjectReference), None);
    assert_eq!(conversion(DataType::ValueType, DataType::Int32), None);
  }

  #[test]
  fn set_display_lists_members() {
    assert_eq!(DataTypeSet::INDEX.to_string(), "{int32 | native int}");
  }
}
