/*!
  Symbolic descriptions of the types, methods, and fields an instruction stream refers to.

  The verifier does not read real assemblies. Instead, whoever produces instructions describes the
  members it references with these values, and instructions carry them instead of metadata
  tokens. All descriptors are immutable once built and shared through `Arc`, so verifiers
  running on different threads can share them.

  Types compare equal by name. Names follow ILasm: `int32`, `object`, `string`, `Foo[]`, `Foo&`.
*/

use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use lazy_static::lazy_static;
use string_cache::DefaultAtom;

use super::data_type::DataType;

pub type TypeRef   = Arc<TypeInfo>;
pub type MethodRef = Arc<MethodInfo>;
pub type FieldRef  = Arc<FieldInfo>;

#[derive(Clone, Debug)]
pub enum TypeKind {
  Class,
  Interface,
  /// A value type. Primitive value types carry their `DataType`; user structs carry
  /// `DataType::ValueType`.
  Value(DataType),
  /// A single dimensional, zero based array of the element type.
  Array(TypeRef),
  /// A managed pointer to the element type.
  ByRef {
    element : TypeRef,
    mutable : bool
  },
}

#[derive(Clone, Debug)]
pub struct TypeInfo {
  pub name               : DefaultAtom,
  pub kind               : TypeKind,
  pub base               : Option<TypeRef>,
  pub interfaces         : Vec<TypeRef>,
  /// An uninstantiated generic type definition such as `List<T>`.
  pub generic_definition : bool,
}

impl TypeInfo {

  pub fn class(name: &str, base: Option<TypeRef>) -> TypeRef {
    Arc::new(TypeInfo {
      name: DefaultAtom::from(name),
      kind: TypeKind::Class,
      base,
      interfaces: Vec::new(),
      generic_definition: false,
    })
  }

  pub fn interface(name: &str) -> TypeRef {
    Arc::new(TypeInfo {
      name: DefaultAtom::from(name),
      kind: TypeKind::Interface,
      base: None,
      interfaces: Vec::new(),
      generic_definition: false,
    })
  }

  /// A user-defined struct deriving from `System.ValueType`.
  pub fn value_type(name: &str) -> TypeRef {
    TypeInfo::primitive(name, DataType::ValueType)
  }

  pub fn primitive(name: &str, data_type: DataType) -> TypeRef {
    Arc::new(TypeInfo {
      name: DefaultAtom::from(name),
      kind: TypeKind::Value(data_type),
      base: Some(BUILTINS.value_type.clone()),
      interfaces: Vec::new(),
      generic_definition: false,
    })
  }

  pub fn array_of(element: &TypeRef) -> TypeRef {
    Arc::new(TypeInfo {
      name: DefaultAtom::from(format!("{}[]", element.name).as_str()),
      kind: TypeKind::Array(element.clone()),
      base: Some(BUILTINS.array.clone()),
      interfaces: Vec::new(),
      generic_definition: false,
    })
  }

  pub fn pointer_to(element: &TypeRef, mutable: bool) -> TypeRef {
    let suffix = match mutable {
      true  => "&",
      false => " readonly&"
    };
    Arc::new(TypeInfo {
      name: DefaultAtom::from(format!("{}{}", element.name, suffix).as_str()),
      kind: TypeKind::ByRef { element: element.clone(), mutable },
      base: None,
      interfaces: Vec::new(),
      generic_definition: false,
    })
  }

  /// Builder-style helper to mark a freshly built type as implementing `interfaces`.
  pub fn with_interfaces(info: TypeRef, interfaces: Vec<TypeRef>) -> TypeRef {
    let mut info = (*info).clone();
    info.interfaces = interfaces;
    Arc::new(info)
  }

  /// Builder-style helper to mark a freshly built type as a generic type definition.
  pub fn as_generic_definition(info: TypeRef) -> TypeRef {
    let mut info = (*info).clone();
    info.generic_definition = true;
    Arc::new(info)
  }

  pub fn data_type(&self) -> DataType {
    match &self.kind {
      TypeKind::Class | TypeKind::Interface | TypeKind::Array(_) => DataType::ObjectReference,
      TypeKind::Value(data_type)                                 => *data_type,
      TypeKind::ByRef { mutable: true, .. }                      => DataType::MutablePointer,
      TypeKind::ByRef { mutable: false, .. }                     => DataType::ReadonlyPointer,
    }
  }

  pub fn is_value_type(&self) -> bool {
    matches!(self.kind, TypeKind::Value(_))
  }

  pub fn is_reference_type(&self) -> bool {
    self.data_type() == DataType::ObjectReference
  }

  /// The element type of an array or managed pointer.
  pub fn element(&self) -> Option<&TypeRef> {
    match &self.kind {
      TypeKind::Array(element) | TypeKind::ByRef { element, .. } => Some(element),
      _ => None
    }
  }

  pub fn is_array(&self) -> bool {
    matches!(self.kind, TypeKind::Array(_))
  }

  /**
    Is a value of this type usable where `target` is expected? Walks the base type chain and the
    interfaces, treats `object` as the root of all reference types, and applies array covariance
    for reference element types. Managed pointers are compatible only when their element types
    are identical, and a read-only pointer never stands in for a mutable one. An unboxed value
    type is a subtype of no reference type, not even `object` or `System.ValueType`.
  */
  pub fn is_subtype_of(&self, target: &TypeInfo) -> bool {
    if self == target {
      return true;
    }

    match (&self.kind, &target.kind) {

      (
        TypeKind::ByRef { element: from, mutable: from_mutable },
        TypeKind::ByRef { element: to,   mutable: to_mutable }
      ) => {
        return from == to && (*from_mutable || !*to_mutable);
      }

      (TypeKind::ByRef { .. }, _) | (_, TypeKind::ByRef { .. }) => return false,

      (TypeKind::Array(from), TypeKind::Array(to)) => {
        if from.is_reference_type() && to.is_reference_type() && from.is_subtype_of(to) {
          return true;
        }
      }

      _ => {}
    }

    if self.is_value_type() && !target.is_value_type() {
      return false;
    }

    if self.is_reference_type() && target.name == BUILTINS.object.name {
      return true;
    }

    let through_base =
      self.base
          .as_ref()
          .map_or(false, |base| base.is_subtype_of(target));

    through_base || self.interfaces.iter().any(|i| i.is_subtype_of(target))
  }
}

impl PartialEq for TypeInfo {
  fn eq(&self, other: &Self) -> bool {
    self.name == other.name
  }
}

impl Eq for TypeInfo {}

impl Hash for TypeInfo {
  fn hash<H: Hasher>(&self, state: &mut H) {
    self.name.hash(state);
  }
}

impl Display for TypeInfo {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.name)
  }
}


#[derive(Clone, Debug)]
pub struct MethodInfo {
  pub name               : DefaultAtom,
  pub declaring_type     : TypeRef,
  /// Declared parameters, excluding the implicit `this`.
  pub parameters         : Vec<TypeRef>,
  /// `None` for `void`.
  pub return_type        : Option<TypeRef>,
  pub is_static          : bool,
  pub is_constructor     : bool,
  pub is_virtual         : bool,
  /// An uninstantiated generic method definition such as `M<T>`.
  pub generic_definition : bool,
}

impl MethodInfo {

  pub fn new(
    declaring_type : &TypeRef,
    name           : &str,
    parameters     : Vec<TypeRef>,
    return_type    : Option<TypeRef>,
    is_static      : bool
  ) -> MethodInfo
  {
    MethodInfo {
      name               : DefaultAtom::from(name),
      declaring_type     : declaring_type.clone(),
      parameters,
      return_type,
      is_static,
      is_constructor     : false,
      is_virtual         : false,
      generic_definition : false,
    }
  }

  /// An instance constructor, `.ctor`.
  pub fn constructor(declaring_type: &TypeRef, parameters: Vec<TypeRef>) -> MethodInfo {
    let mut method = MethodInfo::new(declaring_type, ".ctor", parameters, None, false);
    method.is_constructor = true;
    method
  }

  pub fn qualified_name(&self) -> String {
    format!("{}::{}", self.declaring_type.name, self.name)
  }

  /**
    The type of the implicit `this` argument, if any. For a value type it is a managed pointer to
    the value, as instance methods of value types receive their instance by reference.
  */
  pub fn this_type(&self) -> Option<TypeRef> {
    match self.is_static {
      true  => None,
      false => match self.declaring_type.is_value_type() {
        true  => Some(TypeInfo::pointer_to(&self.declaring_type, true)),
        false => Some(self.declaring_type.clone())
      }
    }
  }

  /// The argument list as seen by `ldarg`: `this` first for instance methods.
  pub fn argument_types(&self) -> Vec<TypeRef> {
    self.this_type()
        .into_iter()
        .chain(self.parameters.iter().cloned())
        .collect()
  }
}

impl Display for MethodInfo {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    let return_type = match &self.return_type {
      Some(t) => t.name.to_string(),
      None    => "void".to_string()
    };
    write!(
      f,
      "{} {}({})",
      return_type,
      self.qualified_name(),
      self.parameters
          .iter()
          .map(|p| p.name.to_string())
          .collect::<Vec<String>>()
          .join(", ")
    )
  }
}


#[derive(Clone, Debug)]
pub struct FieldInfo {
  pub name           : DefaultAtom,
  pub declaring_type : TypeRef,
  pub field_type     : TypeRef,
  pub is_static      : bool,
  /// `initonly`: writable only inside a constructor of the declaring type.
  pub is_init_only   : bool,
}

impl FieldInfo {
  pub fn new(declaring_type: &TypeRef, name: &str, field_type: &TypeRef, is_static: bool) -> FieldInfo {
    FieldInfo {
      name           : DefaultAtom::from(name),
      declaring_type : declaring_type.clone(),
      field_type     : field_type.clone(),
      is_static,
      is_init_only   : false,
    }
  }

  pub fn qualified_name(&self) -> String {
    format!("{}::{}", self.declaring_type.name, self.name)
  }
}

impl Display for FieldInfo {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    write!(f, "{} {}", self.field_type.name, self.qualified_name())
  }
}


/// Anything `ldtoken` can refer to.
#[derive(Clone, Debug)]
pub enum Member {
  Type(TypeRef),
  Method(MethodRef),
  Field(FieldRef),
}

impl Display for Member {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self {
      Member::Type(t)   => write!(f, "{}", t),
      Member::Method(m) => write!(f, "{}", m.qualified_name()),
      Member::Field(d)  => write!(f, "{}", d.qualified_name()),
    }
  }
}


/// Types the instruction set itself refers to.
pub struct Builtins {
  pub object         : TypeRef,
  pub value_type     : TypeRef,
  pub array          : TypeRef,
  pub string         : TypeRef,
  pub int8           : TypeRef,
  pub uint8          : TypeRef,
  pub int16          : TypeRef,
  pub uint16         : TypeRef,
  pub int32          : TypeRef,
  pub uint32         : TypeRef,
  pub int64          : TypeRef,
  pub uint64         : TypeRef,
  pub float32        : TypeRef,
  pub float64        : TypeRef,
  pub native_int     : TypeRef,
  pub native_uint    : TypeRef,
  pub field_handle   : TypeRef,
  pub method_handle  : TypeRef,
  pub type_handle    : TypeRef,
  pub argument_handle: TypeRef,
  pub typed_reference: TypeRef,
}

impl Builtins {
  fn new() -> Builtins {
    let object     = TypeInfo::class("object", None);
    let value_type = TypeInfo::class("System.ValueType", Some(object.clone()));
    let array      = TypeInfo::class("System.Array", Some(object.clone()));
    let string     = TypeInfo::class("string", Some(object.clone()));

    // `TypeInfo::primitive` refers to `BUILTINS`, which is what we are building.
    let value = |name: &str, data_type: DataType| -> TypeRef {
      Arc::new(TypeInfo {
        name: DefaultAtom::from(name),
        kind: TypeKind::Value(data_type),
        base: Some(value_type.clone()),
        interfaces: Vec::new(),
        generic_definition: false,
      })
    };

    Builtins {
      int8            : value("int8",        DataType::Int8),
      uint8           : value("uint8",       DataType::UInt8),
      int16           : value("int16",       DataType::Int16),
      uint16          : value("uint16",      DataType::UInt16),
      int32           : value("int32",       DataType::Int32),
      uint32          : value("uint32",      DataType::UInt32),
      int64           : value("int64",       DataType::Int64),
      uint64          : value("uint64",      DataType::UInt64),
      float32         : value("float32",     DataType::Float32),
      float64         : value("float64",     DataType::Float64),
      native_int      : value("native int",  DataType::NativeInt),
      native_uint     : value("native uint", DataType::NativeUInt),
      field_handle    : value("System.RuntimeFieldHandle",    DataType::ValueType),
      method_handle   : value("System.RuntimeMethodHandle",   DataType::ValueType),
      type_handle     : value("System.RuntimeTypeHandle",     DataType::ValueType),
      argument_handle : value("System.RuntimeArgumentHandle", DataType::ValueType),
      typed_reference : value("System.TypedReference",        DataType::ValueType),
      object,
      value_type,
      array,
      string,
    }
  }

  /// The builtin type that best represents a value of `data_type` on the evaluation stack.
  pub fn for_data_type(&self, data_type: DataType) -> Option<TypeRef> {
    let t = match data_type {
      DataType::Int8            => &self.int8,
      DataType::UInt8           => &self.uint8,
      DataType::Int16           => &self.int16,
      DataType::UInt16          => &self.uint16,
      DataType::Int32           => &self.int32,
      DataType::UInt32          => &self.uint32,
      DataType::Int64           => &self.int64,
      DataType::UInt64          => &self.uint64,
      DataType::Float32         => &self.float32,
      DataType::Float64         => &self.float64,
      DataType::NativeFloat     => &self.float64,
      DataType::NativeInt       => &self.native_int,
      DataType::NativeUInt      => &self.native_uint,
      DataType::ObjectReference => &self.object,
      | DataType::MutablePointer
      | DataType::ReadonlyPointer
      | DataType::ValueType => return None,
    };
    Some(t.clone())
  }

  fn all(&self) -> Vec<&TypeRef> {
    vec![
      &self.object, &self.value_type, &self.array, &self.string,
      &self.int8, &self.uint8, &self.int16, &self.uint16, &self.int32, &self.uint32,
      &self.int64, &self.uint64, &self.float32, &self.float64, &self.native_int,
      &self.native_uint, &self.field_handle, &self.method_handle, &self.type_handle,
      &self.argument_handle, &self.typed_reference,
    ]
  }
}

lazy_static! {
  pub static ref BUILTINS: Builtins = Builtins::new();
}


/**
  A name-keyed registry of the types and members available to a front end. Starts out holding
  the builtin types, plus the aliases `bool`, `char`, `nint` and `nuint`. Methods and fields are
  keyed by their qualified name `Type::member`; a later definition with the same name replaces an
  earlier one.
*/
pub struct Environment {
  types   : HashMap<DefaultAtom, TypeRef>,
  methods : HashMap<DefaultAtom, MethodRef>,
  fields  : HashMap<DefaultAtom, FieldRef>,
}

impl Environment {

  pub fn new() -> Environment {
    let mut environment = Environment {
      types   : HashMap::new(),
      methods : HashMap::new(),
      fields  : HashMap::new(),
    };
    for t in BUILTINS.all() {
      environment.define_type(t.clone());
    }
    environment.alias("bool",  &BUILTINS.uint8);
    environment.alias("char",  &BUILTINS.uint16);
    environment.alias("nint",  &BUILTINS.native_int);
    environment.alias("nuint", &BUILTINS.native_uint);
    environment
  }

  fn alias(&mut self, name: &str, t: &TypeRef) {
    self.types.insert(DefaultAtom::from(name), t.clone());
  }

  pub fn define_type(&mut self, t: TypeRef) -> TypeRef {
    self.types.insert(t.name.clone(), t.clone());
    t
  }

  pub fn define_method(&mut self, method: MethodInfo) -> MethodRef {
    let method = Arc::new(method);
    self.methods.insert(DefaultAtom::from(method.qualified_name().as_str()), method.clone());
    method
  }

  pub fn define_field(&mut self, field: FieldInfo) -> FieldRef {
    let field = Arc::new(field);
    self.fields.insert(DefaultAtom::from(field.qualified_name().as_str()), field.clone());
    field
  }

  /// Resolves a type name, including the `T[]` and `T&` forms of registered types.
  pub fn type_named(&self, name: &str) -> Option<TypeRef> {
    if let Some(t) = self.types.get(&DefaultAtom::from(name)) {
      return Some(t.clone());
    }
    if let Some(element) = name.strip_suffix("[]") {
      return self.type_named(element.trim_end()).map(|e| TypeInfo::array_of(&e));
    }
    if let Some(element) = name.strip_suffix('&') {
      return self.type_named(element.trim_end()).map(|e| TypeInfo::pointer_to(&e, true));
    }
    None
  }

  pub fn method_named(&self, qualified_name: &str) -> Option<MethodRef> {
    self.methods.get(&DefaultAtom::from(qualified_name)).cloned()
  }

  pub fn field_named(&self, qualified_name: &str) -> Option<FieldRef> {
    self.fields.get(&DefaultAtom::from(qualified_name)).cloned()
  }

  /// Resolves a name to a field, then a method, then a type, for `ldtoken`.
  pub fn member_named(&self, name: &str) -> Option<Member> {
    self.field_named(name).map(Member::Field)
        .or_else(|| self.method_named(name).map(Member::Method))
        .or_else(|| self.type_named(name).map(Member::Type))
  }
}

impl Default for Environment {
  fn default() -> Self {
    Environment::new()
  }
}
