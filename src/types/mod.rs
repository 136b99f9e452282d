//! The CLI's data types, the rules relating them, and the symbolic metadata instructions refer to.

mod data_type;
mod metadata;

pub use data_type::{conversion, ConversionKind, DataType, DataTypeSet, POINTER_SIZE};
pub use metadata::{
  Builtins, Environment, FieldInfo, FieldRef, Member, MethodInfo, MethodRef, TypeInfo, TypeKind,
  TypeRef, BUILTINS
};
