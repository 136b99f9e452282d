/*!
  The stack-based verifier.

  A `Verifier` checks one method body. It receives instructions one call at a time through the
  `InstructionSink` surface, simulates their effect on an abstract evaluation stack, and rejects
  the first instruction that is not type-safe. It owns a downstream sink and forwards each call to
  it only after the call passes every check, so the downstream never sees a rejected
  instruction, and sees accepted ones unchanged.

  Dispatch is by opcode category. Each category has a transition rule:

    Arithmetic    pop one or two operands, look the result up in the rule table, push it.
    Comparison    pop two comparable operands, push `int32`.
    Conversion    pop a convertible operand, push the target type.
    Branch        pop the condition or selector, then propagate the stack to every target.
    Variable      load, take the address of, or store an argument or local.
    Field         the same for fields, plus the receiver of instance fields.
    ArrayElement  pop the array and index; load, take the address of, or store an element.
    Indirect      pop an address; load or store through it.
    Call          pop the arguments right to left, then the receiver; push the return value.
    Cast          pop an object or value, push the cast, boxed, or unboxed result.
    Constant      push the constant.
    Prefix        remember the prefix for the instruction that follows.
    Other         a fixed transformation per opcode.

  Stack states are never merged: the first state to reach a label is recorded, and any other
  path reaching it must arrive with the same depth and stack types.
*/

mod label;
mod rules;
mod stack;

use std::fmt::{Display, Formatter};

use lazy_static::lazy_static;
use prettytable::{format as TableFormat, Table};
use string_cache::DefaultAtom;
use tracing::{debug, trace};

pub use label::{LabelInfo, LabelTable};
pub use rules::{arithmetic_result, comparable};
pub use stack::{Stack, StackEntry};

use crate::bytecode::{NumericalOperand, Opcode, OperandKind};
use crate::bytecode::category::{
  AccessKind, ArithmeticInfo, BranchInfo, BranchKind, CallKind, CastKind, Category,
  ComparisonInfo, ConstantInfo, ConversionInfo, ElementAccess, FieldAccess, IndirectAccess,
  Prefixes, VariableAccess, VariableKind
};
use crate::error::{Result, UnsupportedOperation, VerificationError};
use crate::sink::{InstructionSink, Label, LocalIndex};
use crate::types::{
  conversion, DataType, DataTypeSet, FieldRef, Member, MethodInfo, MethodRef, TypeInfo, TypeRef,
  BUILTINS
};

/// The `.maxstack` a method gets when it declares none.
pub const DEFAULT_MAX_STACK: usize = 8;

/// Addresses `cpblk` and `initblk` accept.
const BLOCK_ADDRESS: DataTypeSet = DataTypeSet::POINTER.union(DataTypeSet::of(DataType::NativeInt));

/// What the verifier needs to know about the method whose body it checks.
#[derive(Clone, Debug)]
pub struct MethodDescriptor {
  pub method        : MethodRef,
  pub max_stack     : usize,
  /// The method's locals are zero-initialized on entry (`.locals init`).
  pub locals_zeroed : bool,
}

impl MethodDescriptor {
  pub fn new(method: MethodRef) -> MethodDescriptor {
    MethodDescriptor {
      method,
      max_stack     : DEFAULT_MAX_STACK,
      locals_zeroed : true
    }
  }

  pub fn with_max_stack(mut self, max_stack: usize) -> MethodDescriptor {
    self.max_stack = max_stack;
    self
  }

  pub fn with_locals_zeroed(mut self, locals_zeroed: bool) -> MethodDescriptor {
    self.locals_zeroed = locals_zeroed;
    self
  }
}

#[derive(Clone, Debug)]
struct Local {
  local_type : TypeRef,
  name       : DefaultAtom,
}

/**
  Is a value described by `entry` usable where `target` is expected?

  A null reference is assignable to every reference type and nothing else. Otherwise the value's
  concrete type must be a subtype of the target, or failing that, the target's stack type must
  equal the value's. So an `int32` can be stored to a `uint8` local, and an `object` can be
  returned as a `string`.
*/
pub fn is_assignable(entry: &StackEntry, target: &TypeInfo) -> bool {
  if entry.is_null() {
    return target.is_reference_type();
  }

  let subtype =
    entry.concrete
         .as_ref()
         .map_or(false, |concrete| concrete.is_subtype_of(target));

  subtype || target.data_type().to_stack_type() == entry.data_type
}


pub struct Verifier<S: InstructionSink> {
  descriptor  : MethodDescriptor,
  arguments   : Vec<TypeRef>,
  locals      : Vec<Local>,
  labels      : LabelTable,
  stack       : Stack,
  /// Can control reach the next instruction by falling through?
  reachable   : bool,
  /// Prefixes seen but not yet consumed by an instruction.
  pending     : Prefixes,
  last_prefix : Option<Opcode>,
  /// Prefixes applying to the instruction being verified.
  active      : Prefixes,
  downstream  : S,
}

impl<S: InstructionSink> Verifier<S> {

  pub fn new(descriptor: MethodDescriptor, downstream: S) -> Verifier<S> {
    let arguments = descriptor.method.argument_types();
    let stack     = Stack::new(descriptor.max_stack);
    debug!(method = %descriptor.method, max_stack = descriptor.max_stack, "verifying");
    Verifier {
      descriptor,
      arguments,
      locals      : Vec::new(),
      labels      : LabelTable::default(),
      stack,
      reachable   : true,
      pending     : Prefixes::NONE,
      last_prefix : None,
      active      : Prefixes::NONE,
      downstream
    }
  }

  pub fn descriptor(&self) -> &MethodDescriptor {
    &self.descriptor
  }

  pub fn stack(&self) -> &Stack {
    &self.stack
  }

  pub fn labels(&self) -> &LabelTable {
    &self.labels
  }

  pub fn is_reachable(&self) -> bool {
    self.reachable
  }

  pub fn downstream(&self) -> &S {
    &self.downstream
  }

  pub fn into_inner(self) -> S {
    self.downstream
  }


  // region Instruction bookkeeping

  /// Checks and records prefixes, and resets the stack for code no fall-through reaches.
  fn begin(&mut self, opcode: Opcode) -> Result<()> {
    if !self.reachable {
      // Code following an unconditional transfer that no label introduces starts empty.
      self.stack.restore(&[]);
      self.reachable = true;
    }
    self.stack.reset_counts();

    match opcode.category() {

      Category::Prefix(prefix) => {
        if self.pending.intersects(prefix) {
          return Err(VerificationError::RepeatedPrefix { prefix: opcode }.into());
        }
        self.pending     = self.pending.union(prefix);
        self.last_prefix = Some(opcode);
      }

      _ => {
        if let Some(prefix) = self.last_prefix {
          if !opcode.descriptor().prefixes.contains(self.pending) {
            return Err(VerificationError::IllegalPrefix { prefix, opcode }.into());
          }
        }
        self.active      = self.pending;
        self.pending     = Prefixes::NONE;
        self.last_prefix = None;
      }

    }
    Ok(())
  }

  fn end(&mut self, opcode: Opcode) {
    let descriptor = opcode.descriptor();
    let (pops, pushes) = self.stack.counts();
    if let Some(expected) = descriptor.pop {
      debug_assert_eq!(pops, expected as usize, "{} popped the wrong number of values", opcode);
    }
    if let Some(expected) = descriptor.push {
      debug_assert_eq!(pushes, expected as usize, "{} pushed the wrong number of values", opcode);
    }

    if opcode.ends_flow() {
      self.reachable = false;
    }

    debug!(%opcode, depth = self.stack.len(), "accepted");
    trace!(stack = %self.stack);
    #[cfg(feature = "trace_verification")] println!("{}\n{}", opcode, self);
  }

  // endregion


  // region Stack helpers

  fn push(&mut self, opcode: Opcode, entry: StackEntry) -> Result<()> {
    self.stack.push(opcode, entry)?;
    Ok(())
  }

  fn push_type(&mut self, opcode: Opcode, t: &TypeRef) -> Result<()> {
    self.push(opcode, StackEntry::of(t))
  }

  fn pop(&mut self, opcode: Opcode) -> Result<StackEntry> {
    Ok(self.stack.pop(opcode)?)
  }

  /// Pops a value whose stack type is in `expected`.
  fn pop_of(&mut self, opcode: Opcode, expected: DataTypeSet) -> Result<StackEntry> {
    let entry = self.pop(opcode)?;
    match expected.contains(entry.data_type) {
      true  => Ok(entry),
      false => Err(VerificationError::UnexpectedStackType {
        opcode,
        expected,
        found: entry.data_type
      }.into())
    }
  }

  pub(crate) fn pop_assignable_to(&mut self, opcode: Opcode, target: &TypeRef) -> Result<StackEntry> {
    let entry = self.pop(opcode)?;
    match is_assignable(&entry, target) {
      true  => Ok(entry),
      false => Err(VerificationError::TypeMismatch {
        opcode,
        expected : target.name.to_string(),
        found    : entry.to_string()
      }.into())
    }
  }

  /// Pops a managed pointer to `element`. Any pointer will do unless `mutable` is required.
  fn pop_pointer_to(&mut self, opcode: Opcode, element: &TypeRef, mutable: bool) -> Result<StackEntry> {
    self.pop_assignable_to(opcode, &TypeInfo::pointer_to(element, mutable))
  }

  /// Pops an array reference and returns its element type, if known.
  fn pop_array(&mut self, opcode: Opcode) -> Result<Option<TypeRef>> {
    let array = self.pop(opcode)?;
    if array.is_null() {
      return Ok(None);
    }
    match &array.concrete {
      Some(t) if t.is_array() => Ok(t.element().cloned()),
      _ => Err(VerificationError::TypeMismatch {
        opcode,
        expected : "an array".to_string(),
        found    : array.to_string()
      }.into())
    }
  }

  /// Pops the instance a field or method is accessed through.
  fn pop_instance(&mut self, opcode: Opcode, declaring_type: &TypeRef, by_value: bool) -> Result<()> {
    let entry = self.pop(opcode)?;
    let accepted =
      match declaring_type.is_value_type() {
        true  => {
          is_assignable(&entry, &TypeInfo::pointer_to(declaring_type, false))
            || (by_value && is_assignable(&entry, declaring_type))
        }
        false => is_assignable(&entry, declaring_type)
      };
    match accepted {
      true  => Ok(()),
      false => Err(VerificationError::TypeMismatch {
        opcode,
        expected : declaring_type.name.to_string(),
        found    : entry.to_string()
      }.into())
    }
  }

  // endregion


  // region Transition rules

  fn arithmetic(&mut self, opcode: Opcode, info: ArithmeticInfo) -> Result<()> {
    let mut operands = Vec::with_capacity(2);
    for _ in 0..info.arity() {
      operands.push(self.pop(opcode)?);
    }
    operands.reverse();

    let types  = operands.iter().map(|e| e.data_type).collect::<Vec<DataType>>();
    let result =
      arithmetic_result(info, &types).ok_or_else(|| VerificationError::NoArithmeticRule {
        opcode,
        operands: stack::describe(&operands)
      })?;

    // Pointer arithmetic keeps the pointer's type.
    let entry =
      match result.is_pointer() {
        true  => operands.into_iter().find(|e| e.data_type == result),
        false => None
      }.unwrap_or_else(|| StackEntry::of_data_type(result));
    self.push(opcode, entry)
  }

  fn comparison(&mut self, opcode: Opcode, info: ComparisonInfo) -> Result<()> {
    let right = self.pop(opcode)?;
    let left  = self.pop(opcode)?;
    if !comparable(info, left.data_type, right.data_type) {
      return Err(VerificationError::Incomparable {
        opcode,
        left  : left.to_string(),
        right : right.to_string()
      }.into());
    }
    self.push_type(opcode, &BUILTINS.int32)
  }

  fn conversion(&mut self, opcode: Opcode, info: ConversionInfo) -> Result<()> {
    let value = self.pop(opcode)?;
    match conversion(value.data_type, info.target) {

      Some((kind, verifiable)) => {
        if !verifiable {
          debug!(%opcode, source = %value, %kind, "unverifiable conversion");
        }
        self.push(opcode, StackEntry::of_data_type(info.target))
      }

      None => Err(VerificationError::NoConversion {
        opcode,
        source_type : value.data_type,
        target      : info.target
      }.into())

    }
  }

  fn branch(&mut self, opcode: Opcode, info: BranchInfo, targets: &[Label]) -> Result<()> {
    match info.kind {
      BranchKind::Unconditional => {}
      BranchKind::Leave         => self.stack.clear(),
      BranchKind::Boolean { .. } => {
        self.pop_of(opcode, DataTypeSet::BOOLEAN_TESTABLE)?;
      }
      // The operands are not checked for compatibility with each other.
      BranchKind::Comparison(_) => {
        self.pop(opcode)?;
        self.pop(opcode)?;
      }
      BranchKind::Switch => {
        self.pop_of(opcode, DataTypeSet::INDEX)?;
      }
    }

    for target in targets {
      self.labels.reach(*target, &self.stack, true)?;
    }
    Ok(())
  }

  fn variable(&mut self, opcode: Opcode, access: VariableAccess, operand: NumericalOperand) -> Result<()> {
    let index =
      match access.index {
        Some(index) => index as i64,
        None        => operand.as_int32().map_or(-1, |i| i as i64)
      };

    let (variable_type, count) =
      match access.variable {
        VariableKind::Argument => {
          let t = usize::try_from(index).ok().and_then(|i| self.arguments.get(i)).cloned();
          (t, self.arguments.len())
        }
        VariableKind::Local => {
          let t = usize::try_from(index).ok().and_then(|i| self.locals.get(i)).map(|l| l.local_type.clone());
          (t, self.locals.len())
        }
      };
    let variable_type =
      variable_type.ok_or(VerificationError::VariableOutOfRange {
        opcode,
        kind: access.variable,
        index,
        count
      })?;

    match access.access {
      AccessKind::Load        => self.push_type(opcode, &variable_type),
      AccessKind::LoadAddress => self.push_type(opcode, &TypeInfo::pointer_to(&variable_type, true)),
      AccessKind::Store       => self.pop_assignable_to(opcode, &variable_type).map(|_| ())
    }
  }

  fn field(&mut self, opcode: Opcode, access: FieldAccess, field: &FieldRef) -> Result<()> {
    if access.is_static != field.is_static {
      return Err(VerificationError::StaticMismatch {
        opcode,
        field      : field.qualified_name(),
        staticness : match field.is_static {
          true  => "static",
          false => "not static"
        }
      }.into());
    }
    if field.declaring_type.generic_definition {
      return Err(VerificationError::GenericDefinition { opcode, member: field.qualified_name() }.into());
    }

    if access.access == AccessKind::Store {
      self.pop_assignable_to(opcode, &field.field_type)?;
    }
    if !access.is_static {
      self.pop_instance(opcode, &field.declaring_type, access.access == AccessKind::Load)?;
    }

    match access.access {
      AccessKind::Load        => self.push_type(opcode, &field.field_type),
      AccessKind::LoadAddress => {
        // Init-only fields are writable only by their own type's constructors.
        let method = &self.descriptor.method;
        let in_constructor =
          (method.is_constructor || &*method.name == ".cctor")
            && method.declaring_type == field.declaring_type;
        let mutable = !field.is_init_only || in_constructor;
        self.push_type(opcode, &TypeInfo::pointer_to(&field.field_type, mutable))
      }
      AccessKind::Store => Ok(())
    }
  }

  fn array_element(&mut self, opcode: Opcode, access: ElementAccess, operand_type: Option<&TypeRef>) -> Result<()> {
    let value = match access.access {
      AccessKind::Store => Some(self.pop(opcode)?),
      _ => None
    };
    self.pop_of(opcode, DataTypeSet::INDEX)?;
    let array_element = self.pop_array(opcode)?;

    let element = self.element_type(operand_type, access.element_type, array_element.as_ref());
    if let Some(actual) = &array_element {
      if actual.data_type().to_stack_type() != element.data_type().to_stack_type() {
        return Err(VerificationError::TypeMismatch {
          opcode,
          expected : format!("{}[]", element.name),
          found    : format!("{}[]", actual.name)
        }.into());
      }
    }

    match (access.access, value) {
      (AccessKind::Store, Some(value)) => self.check_assignable(opcode, &value, &element),
      (AccessKind::LoadAddress, _) => {
        let mutable = !self.active.contains(Prefixes::READONLY);
        self.push_type(opcode, &TypeInfo::pointer_to(&element, mutable))
      }
      _ => self.push_type(opcode, &element)
    }
  }

  fn indirect(&mut self, opcode: Opcode, access: IndirectAccess, operand_type: Option<&TypeRef>) -> Result<()> {
    let value = match access.access {
      AccessKind::Store => Some(self.pop(opcode)?),
      _ => None
    };
    let address = match access.access {
      AccessKind::Store => self.pop_of(opcode, DataTypeSet::of(DataType::MutablePointer))?,
      _ => self.pop_of(opcode, DataTypeSet::POINTER)?
    };
    let pointee = address.concrete.as_ref().and_then(|t| t.element().cloned());

    let element = self.element_type(operand_type, access.data_type, pointee.as_ref());
    if let Some(actual) = &pointee {
      if actual.data_type().to_stack_type() != element.data_type().to_stack_type() {
        return Err(VerificationError::TypeMismatch {
          opcode,
          expected : format!("{}&", element.name),
          found    : address.to_string()
        }.into());
      }
    }

    match value {
      Some(value) => self.check_assignable(opcode, &value, &element),
      None        => self.push_type(opcode, &element)
    }
  }

  /**
    The type an element or indirect access works with: the type operand if there is one, else
    the type the opcode names. For object references that is the actual element type when it is
    known.
  */
  fn element_type(&self, operand_type: Option<&TypeRef>, named: Option<DataType>, actual: Option<&TypeRef>) -> TypeRef {
    match (operand_type, named) {
      (Some(t), _) => t.clone(),
      (None, Some(DataType::ObjectReference)) => {
        actual
          .filter(|t| t.is_reference_type())
          .cloned()
          .unwrap_or_else(|| BUILTINS.object.clone())
      }
      (None, Some(data_type)) => {
        BUILTINS.for_data_type(data_type).unwrap_or_else(|| BUILTINS.object.clone())
      }
      (None, None) => unreachable!("Error: an element access names neither a type nor a data type.")
    }
  }

  fn check_assignable(&self, opcode: Opcode, value: &StackEntry, target: &TypeRef) -> Result<()> {
    match is_assignable(value, target) {
      true  => Ok(()),
      false => Err(VerificationError::TypeMismatch {
        opcode,
        expected : target.name.to_string(),
        found    : value.to_string()
      }.into())
    }
  }

  fn call(&mut self, opcode: Opcode, kind: CallKind, method: &MethodInfo) -> Result<()> {
    if method.generic_definition || method.declaring_type.generic_definition {
      return Err(VerificationError::GenericDefinition { opcode, member: method.qualified_name() }.into());
    }

    match kind {

      CallKind::Jump => {
        if !self.stack.is_empty() {
          return Err(VerificationError::NonEmptyStack { opcode, depth: self.stack.len() }.into());
        }
        Ok(())
      }

      CallKind::LoadFunction => self.push_type(opcode, &BUILTINS.native_int),

      CallKind::LoadVirtualFunction => {
        self.pop_instance(opcode, &method.declaring_type, false)?;
        self.push_type(opcode, &BUILTINS.native_int)
      }

      CallKind::NewObject => {
        if !method.is_constructor {
          return Err(VerificationError::NotAConstructor { opcode, method: method.qualified_name() }.into());
        }
        self.pop_arguments(opcode, method)?;
        self.push_type(opcode, &method.declaring_type)
      }

      CallKind::Call | CallKind::CallVirtual | CallKind::CallIndirect => {
        if kind == CallKind::CallIndirect {
          self.pop_of(opcode, DataTypeSet::of(DataType::NativeInt))?;
        }
        self.pop_arguments(opcode, method)?;
        if !method.is_static {
          match self.active.contains(Prefixes::CONSTRAINED) {
            // The constrained type is not tracked, so any pointer is accepted.
            true  => self.pop_of(opcode, DataTypeSet::POINTER).map(|_| ())?,
            false => self.pop_instance(opcode, &method.declaring_type, false)?
          }
        }
        match &method.return_type {
          Some(return_type) => self.push_type(opcode, return_type),
          None => Ok(())
        }
      }

    }
  }

  /// Pops the declared parameters, last first.
  fn pop_arguments(&mut self, opcode: Opcode, method: &MethodInfo) -> Result<()> {
    for parameter in method.parameters.iter().rev() {
      self.pop_assignable_to(opcode, parameter)?;
    }
    Ok(())
  }

  fn cast(&mut self, opcode: Opcode, kind: CastKind, t: &TypeRef) -> Result<()> {
    match kind {

      CastKind::CastClass | CastKind::IsInstance => {
        self.pop_of(opcode, DataTypeSet::REFERENCE)?;
        match t.is_reference_type() {
          true  => self.push_type(opcode, t),
          // A boxed value type.
          false => self.push_type(opcode, &BUILTINS.object)
        }
      }

      CastKind::Box => {
        self.pop_assignable_to(opcode, t)?;
        match t.is_reference_type() {
          true  => self.push_type(opcode, t),
          false => self.push_type(opcode, &BUILTINS.object)
        }
      }

      CastKind::Unbox => {
        self.pop_of(opcode, DataTypeSet::REFERENCE)?;
        self.push_type(opcode, &TypeInfo::pointer_to(t, false))
      }

      CastKind::UnboxAny => {
        self.pop_of(opcode, DataTypeSet::REFERENCE)?;
        self.push_type(opcode, t)
      }

    }
  }

  fn constant(&mut self, opcode: Opcode, info: ConstantInfo) -> Result<()> {
    match info {
      ConstantInfo::Int32(_) => self.push_type(opcode, &BUILTINS.int32),
      ConstantInfo::Int64    => self.push_type(opcode, &BUILTINS.int64),
      ConstantInfo::Float32  => self.push_type(opcode, &BUILTINS.float32),
      ConstantInfo::Float64  => self.push_type(opcode, &BUILTINS.float64),
      ConstantInfo::Null     => self.push(opcode, StackEntry::null()),
      ConstantInfo::String   => self.push_type(opcode, &BUILTINS.string),
    }
  }

  fn ret(&mut self, opcode: Opcode) -> Result<()> {
    let return_type = self.descriptor.method.return_type.clone();
    let depth = self.stack.len();
    match return_type {

      None if depth == 0 => Ok(()),

      None => Err(VerificationError::ReturnMismatch {
        opcode,
        expected : "void".to_string(),
        found    : depth
      }.into()),

      Some(return_type) if depth != 1 => Err(VerificationError::ReturnMismatch {
        opcode,
        expected : return_type.name.to_string(),
        found    : depth
      }.into()),

      Some(return_type) => self.pop_assignable_to(opcode, &return_type).map(|_| ())

    }
  }

  /// Opcodes of the `Other` category without an operand.
  fn other(&mut self, opcode: Opcode) -> Result<()> {
    let int32 = DataTypeSet::of(DataType::Int32);
    match opcode {

      Opcode::Nop | Opcode::Break | Opcode::Rethrow => Ok(()),

      Opcode::Dup => {
        let entry = self.pop(opcode)?;
        self.push(opcode, entry.clone())?;
        self.push(opcode, entry)
      }

      Opcode::Pop => self.pop(opcode).map(|_| ()),

      Opcode::Ret => self.ret(opcode),

      Opcode::Throw => self.pop_of(opcode, DataTypeSet::REFERENCE).map(|_| ()),

      Opcode::Ldlen => {
        self.pop_array(opcode)?;
        self.push_type(opcode, &BUILTINS.native_uint)
      }

      Opcode::Ckfinite => {
        let value = self.pop_of(opcode, DataTypeSet::FLOAT)?;
        self.push(opcode, value)
      }

      Opcode::Endfinally => {
        self.stack.clear();
        Ok(())
      }

      Opcode::Endfilter => {
        self.pop_of(opcode, int32)?;
        match self.stack.is_empty() {
          true  => Ok(()),
          false => Err(VerificationError::NonEmptyStack { opcode, depth: self.stack.len() }.into())
        }
      }

      Opcode::Arglist => self.push_type(opcode, &BUILTINS.argument_handle),

      Opcode::Localloc => {
        self.pop_of(opcode, DataTypeSet::INDEX)?;
        self.push_type(opcode, &BUILTINS.native_int)
      }

      Opcode::Cpblk => {
        self.pop_of(opcode, int32)?;
        self.pop_of(opcode, BLOCK_ADDRESS)?;
        self.pop_of(opcode, BLOCK_ADDRESS).map(|_| ())
      }

      Opcode::Initblk => {
        self.pop_of(opcode, int32)?;
        self.pop_of(opcode, int32)?;
        self.pop_of(opcode, BLOCK_ADDRESS).map(|_| ())
      }

      Opcode::Refanytype => {
        self.pop_assignable_to(opcode, &BUILTINS.typed_reference)?;
        self.push_type(opcode, &BUILTINS.type_handle)
      }

      _ => unreachable!("Error: {} takes an operand.", opcode)
    }
  }

  /// Opcodes of the `Other` category with a type operand.
  fn other_with_type(&mut self, opcode: Opcode, t: &TypeRef) -> Result<()> {
    match opcode {

      Opcode::Cpobj => {
        self.pop_pointer_to(opcode, t, false)?;
        self.pop_pointer_to(opcode, t, true).map(|_| ())
      }

      Opcode::Initobj => self.pop_pointer_to(opcode, t, true).map(|_| ()),

      Opcode::Newarr => {
        self.pop_of(opcode, DataTypeSet::INDEX)?;
        self.push_type(opcode, &TypeInfo::array_of(t))
      }

      Opcode::Sizeof => self.push_type(opcode, &BUILTINS.uint32),

      Opcode::Mkrefany => {
        self.pop_pointer_to(opcode, t, false)?;
        self.push_type(opcode, &BUILTINS.typed_reference)
      }

      Opcode::Refanyval => {
        self.pop_assignable_to(opcode, &BUILTINS.typed_reference)?;
        self.push_type(opcode, &TypeInfo::pointer_to(t, true))
      }

      _ => unreachable!("Error: {} does not take a type operand.", opcode)
    }
  }

  // endregion


  fn wrong_form(opcode: Opcode, form: &'static str) -> crate::error::Error {
    VerificationError::WrongOperandForm { opcode, form }.into()
  }

  fn downstream_label(&self, label: Label) -> Result<Label> {
    Ok(self.labels.get(label)?.downstream)
  }
}


impl<S: InstructionSink> InstructionSink for Verifier<S> {

  fn declare_local(&mut self, local_type: &TypeRef, name: &str) -> Result<LocalIndex> {
    let index =
      u16::try_from(self.locals.len()).map_err(|_| VerificationError::VariableOutOfRange {
        opcode : Opcode::Stloc,
        kind   : VariableKind::Local,
        index  : self.locals.len() as i64,
        count  : u16::MAX as usize
      })?;
    self.downstream.declare_local(local_type, name)?;
    self.locals.push(Local {
      local_type : local_type.clone(),
      name       : DefaultAtom::from(name)
    });
    Ok(LocalIndex(index))
  }

  fn create_label(&mut self, name: &str) -> Result<Label> {
    let downstream = self.downstream.create_label(name)?;
    Ok(self.labels.create(name, downstream))
  }

  fn mark_label(&mut self, label: Label) -> Result<()> {
    self.labels.mark(label)?;
    if !self.reachable {
      // Only branches reach this label; they define the stack here, or it is empty.
      let snapshot = self.labels.get(label)?.snapshot.clone().unwrap_or_default();
      self.stack.restore(&snapshot);
      self.reachable = true;
    }
    self.labels.reach(label, &self.stack, false)?;

    let info = self.labels.get(label)?;
    let downstream = info.downstream;
    debug!(label = %info.name, stack = %self.stack, "marked");
    self.downstream.mark_label(downstream)
  }

  fn emit(&mut self, opcode: Opcode, operand: NumericalOperand) -> Result<()> {
    let kind = opcode.operand_kind();
    if kind.is_symbolic() {
      return Err(UnsupportedOperation::RequiresSymbolicOperand { opcode }.into());
    }
    if !operand.fits(kind) {
      return Err(VerificationError::InvalidOperand { opcode, kind, operand: operand.to_string() }.into());
    }

    self.begin(opcode)?;
    match opcode.category() {
      Category::Arithmetic(info)     => self.arithmetic(opcode, info)?,
      Category::Comparison(info)     => self.comparison(opcode, info)?,
      Category::Conversion(info)     => self.conversion(opcode, info)?,
      Category::Variable(access)     => self.variable(opcode, access, operand)?,
      Category::Constant(info)       => self.constant(opcode, info)?,
      Category::ArrayElement(access) => self.array_element(opcode, access, None)?,
      Category::Indirect(access)     => self.indirect(opcode, access, None)?,
      Category::Prefix(_)            => {}
      Category::Other                => self.other(opcode)?,
      | Category::Branch(_)
      | Category::Call(_)
      | Category::Field(_)
      | Category::Cast(_) => unreachable!("Error: {} takes a symbolic operand.", opcode)
    }
    self.end(opcode);

    self.downstream.emit(opcode, operand)
  }

  fn emit_branch(&mut self, opcode: Opcode, target: Label) -> Result<()> {
    let info =
      match opcode.category() {
        Category::Branch(info) if info.kind != BranchKind::Switch => info,
        _ => return Err(Self::wrong_form(opcode, "a label"))
      };
    let downstream = self.downstream_label(target)?;

    self.begin(opcode)?;
    self.branch(opcode, info, &[target])?;
    self.end(opcode);

    self.downstream.emit_branch(opcode, downstream)
  }

  fn emit_switch(&mut self, targets: &[Label]) -> Result<()> {
    let opcode = Opcode::Switch;
    let downstream =
      targets
        .iter()
        .map(|target| self.downstream_label(*target))
        .collect::<Result<Vec<Label>>>()?;

    self.begin(opcode)?;
    self.branch(opcode, opcode.branch(), targets)?;
    self.end(opcode);

    self.downstream.emit_switch(&downstream)
  }

  fn emit_call(&mut self, opcode: Opcode, method: &MethodRef) -> Result<()> {
    let kind =
      match opcode.category() {
        Category::Call(kind) => kind,
        _ => return Err(Self::wrong_form(opcode, "a method"))
      };

    self.begin(opcode)?;
    self.call(opcode, kind, method)?;
    self.end(opcode);

    self.downstream.emit_call(opcode, method)
  }

  fn emit_field(&mut self, opcode: Opcode, field: &FieldRef) -> Result<()> {
    let access =
      match opcode.category() {
        Category::Field(access) => access,
        _ => return Err(Self::wrong_form(opcode, "a field"))
      };

    self.begin(opcode)?;
    self.field(opcode, access, field)?;
    self.end(opcode);

    self.downstream.emit_field(opcode, field)
  }

  fn emit_type(&mut self, opcode: Opcode, operand_type: &TypeRef) -> Result<()> {
    if opcode.operand_kind() != OperandKind::InlineType {
      return Err(Self::wrong_form(opcode, "a type"));
    }

    self.begin(opcode)?;
    match opcode.category() {
      Category::Cast(kind)           => self.cast(opcode, kind, operand_type)?,
      Category::ArrayElement(access) => self.array_element(opcode, access, Some(operand_type))?,
      Category::Indirect(access)     => self.indirect(opcode, access, Some(operand_type))?,
      Category::Other                => self.other_with_type(opcode, operand_type)?,
      // `constrained.`
      Category::Prefix(_)            => {}
      _ => unreachable!("Error: {} does not take a type operand.", opcode)
    }
    self.end(opcode);

    self.downstream.emit_type(opcode, operand_type)
  }

  fn emit_token(&mut self, opcode: Opcode, member: &Member) -> Result<()> {
    if opcode.operand_kind() != OperandKind::InlineTok {
      return Err(Self::wrong_form(opcode, "a member token"));
    }

    self.begin(opcode)?;
    let handle =
      match member {
        Member::Field(_)  => &BUILTINS.field_handle,
        Member::Method(_) => &BUILTINS.method_handle,
        Member::Type(_)   => &BUILTINS.type_handle,
      };
    self.push_type(opcode, handle)?;
    self.end(opcode);

    self.downstream.emit_token(opcode, member)
  }

  fn emit_string(&mut self, opcode: Opcode, value: &str) -> Result<()> {
    if opcode.operand_kind() != OperandKind::InlineString {
      return Err(Self::wrong_form(opcode, "a string"));
    }

    self.begin(opcode)?;
    self.constant(opcode, ConstantInfo::String)?;
    self.end(opcode);

    self.downstream.emit_string(opcode, value)
  }

  fn finish(&mut self) -> Result<()> {
    if let Some(prefix) = self.last_prefix {
      return Err(VerificationError::DanglingPrefix { prefix }.into());
    }
    if let Some(label) = self.labels.first_unmarked_target() {
      return Err(VerificationError::UnmarkedLabel { label: label.name.to_string() }.into());
    }
    if self.reachable {
      return Err(VerificationError::FallThroughEnd.into());
    }
    if !self.locals.is_empty() && !self.descriptor.locals_zeroed {
      return Err(VerificationError::LocalsNotZeroed.into());
    }
    debug!(method = %self.descriptor.method, "verified");
    self.downstream.finish()
  }
}


lazy_static! {
  static ref TABLE_DISPLAY_FORMAT: TableFormat::TableFormat =
    TableFormat::FormatBuilder::new()
      .column_separator('│')
      .borders(' ')
      .separator(
        TableFormat::LinePosition::Title,
        TableFormat::LineSeparator::new('─', '┼', ' ', ' ')
      )
      .separator(
        TableFormat::LinePosition::Bottom,
        TableFormat::LineSeparator::new('─', '┴', ' ', ' ')
      )
      .padding(1, 1)
      .build();
}

impl<S: InstructionSink> Display for Verifier<S> {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    let mut table = Table::new();
    table.set_format(*TABLE_DISPLAY_FORMAT);
    table.set_titles(row![ubr->"Slot", ubl->"Type"]);

    // Top of the stack first.
    for (i, entry) in self.stack.entries().iter().enumerate().rev() {
      table.add_row(row![r->format!("stack[{}] =", i), entry.to_string()]);
    }
    for (i, argument) in self.arguments.iter().enumerate() {
      table.add_row(row![r->format!("arg[{}] =", i), argument.name.to_string()]);
    }
    for (i, local) in self.locals.iter().enumerate() {
      table.add_row(row![r->format!("{} (loc[{}]) =", local.name, i), local.local_type.name.to_string()]);
    }

    let reachability = match self.reachable {
      true  => "reachable",
      false => "unreachable"
    };
    write!(f, "{} ({})\n{}", self.descriptor.method, reachability, table)
  }
}


#[cfg(test)]
mod tests {
  use super::*;
  use crate::error::Error;
  use crate::sink::{RecordingSink, SinkCall};
  use crate::types::FieldInfo;
  use std::sync::Arc;

  fn static_method(parameters: Vec<TypeRef>, return_type: Option<TypeRef>) -> MethodRef {
    let owner = TypeInfo::class("Program", Some(BUILTINS.object.clone()));
    Arc::new(MethodInfo::new(&owner, "Run", parameters, return_type, true))
  }

  fn verifier(parameters: Vec<TypeRef>, return_type: Option<TypeRef>) -> Verifier<RecordingSink> {
    Verifier::new(MethodDescriptor::new(static_method(parameters, return_type)), RecordingSink::new())
  }

  fn emit(v: &mut Verifier<RecordingSink>, opcode: Opcode) -> Result<()> {
    v.emit(opcode, NumericalOperand::None)
  }

  #[test]
  fn assignability() {
    let int32 = StackEntry::of(&BUILTINS.int32);
    assert!(is_assignable(&int32, &BUILTINS.int32));
    assert!(is_assignable(&int32, &BUILTINS.uint8));
    assert!(!is_assignable(&int32, &BUILTINS.int64));
    assert!(!is_assignable(&int32, &BUILTINS.object));
    assert!(is_assignable(&StackEntry::null(), &BUILTINS.string));
    assert!(!is_assignable(&StackEntry::null(), &BUILTINS.int32));
    assert!(is_assignable(&StackEntry::of(&BUILTINS.string), &BUILTINS.object));
    assert!(is_assignable(&StackEntry::of(&BUILTINS.object), &BUILTINS.string));
    assert!(!is_assignable(&StackEntry::of(&BUILTINS.int32), &BUILTINS.value_type));

    // Distinct value types share the value type stack tag.
    let a = TypeInfo::value_type("A");
    let b = TypeInfo::value_type("B");
    assert!(is_assignable(&StackEntry::of(&a), &b));

    let mutable  = StackEntry::of(&TypeInfo::pointer_to(&BUILTINS.int32, true));
    let readonly = TypeInfo::pointer_to(&BUILTINS.int32, false);
    assert!(is_assignable(&mutable, &readonly));
    assert!(!is_assignable(&StackEntry::of(&readonly), &TypeInfo::pointer_to(&BUILTINS.int32, true)));
  }

  #[test]
  fn dup_and_pop() {
    let mut v = verifier(vec![], None);
    emit(&mut v, Opcode::LdcI41).unwrap();
    emit(&mut v, Opcode::Dup).unwrap();
    assert_eq!(v.stack().len(), 2);
    emit(&mut v, Opcode::Pop).unwrap();
    emit(&mut v, Opcode::Pop).unwrap();
    assert!(matches!(
      emit(&mut v, Opcode::Pop),
      Err(Error::Verification(VerificationError::StackUnderflow { opcode: Opcode::Pop }))
    ));
    assert_eq!(v.downstream().opcodes(), vec![Opcode::LdcI41, Opcode::Dup, Opcode::Pop, Opcode::Pop]);
  }

  #[test]
  fn max_stack_is_enforced() {
    let method = static_method(vec![], None);
    let mut v = Verifier::new(MethodDescriptor::new(method).with_max_stack(1), RecordingSink::new());
    emit(&mut v, Opcode::LdcI40).unwrap();
    assert!(matches!(
      emit(&mut v, Opcode::LdcI40),
      Err(Error::Verification(VerificationError::StackOverflow { max_stack: 1, .. }))
    ));
  }

  #[test]
  fn conversions() {
    let mut v = verifier(vec![BUILTINS.object.clone()], None);
    emit(&mut v, Opcode::LdcR8).unwrap_err();
    v.emit(Opcode::LdcR8, NumericalOperand::Float64(1.5)).unwrap();
    emit(&mut v, Opcode::ConvI4).unwrap();
    assert_eq!(v.stack().peek().map(|e| e.data_type), Some(DataType::Int32));
    emit(&mut v, Opcode::Pop).unwrap();

    emit(&mut v, Opcode::Ldarg0).unwrap();
    emit(&mut v, Opcode::ConvU).unwrap();
    assert_eq!(v.stack().peek().map(|e| e.data_type), Some(DataType::NativeInt));
    emit(&mut v, Opcode::Pop).unwrap();

    emit(&mut v, Opcode::Ldarg0).unwrap();
    assert!(matches!(
      emit(&mut v, Opcode::ConvI4),
      Err(Error::Verification(VerificationError::NoConversion { .. }))
    ));
  }

  #[test]
  fn comparisons_push_int32() {
    let mut v = verifier(vec![BUILTINS.string.clone()], None);
    emit(&mut v, Opcode::Ldarg0).unwrap();
    emit(&mut v, Opcode::Ldnull).unwrap();
    emit(&mut v, Opcode::CgtUn).unwrap();
    assert_eq!(v.stack().peek().map(|e| e.data_type), Some(DataType::Int32));

    emit(&mut v, Opcode::Ldarg0).unwrap();
    assert!(matches!(
      emit(&mut v, Opcode::Clt),
      Err(Error::Verification(VerificationError::Incomparable { .. }))
    ));
  }

  #[test]
  fn variables() {
    let mut v = verifier(vec![BUILTINS.int32.clone()], None);
    let local = v.declare_local(&BUILTINS.int64, "total").unwrap();
    assert_eq!(local.index(), 0);

    emit(&mut v, Opcode::Ldarg0).unwrap();
    emit(&mut v, Opcode::ConvI8).unwrap();
    emit(&mut v, Opcode::Stloc0).unwrap();
    v.emit(Opcode::LdlocaS, NumericalOperand::Int32(0)).unwrap();
    assert_eq!(v.stack().peek().map(|e| e.data_type), Some(DataType::MutablePointer));
    emit(&mut v, Opcode::LdindI8).unwrap();
    emit(&mut v, Opcode::Pop).unwrap();

    assert!(matches!(
      emit(&mut v, Opcode::Ldarg1),
      Err(Error::Verification(VerificationError::VariableOutOfRange { index: 1, count: 1, .. }))
    ));
  }

  #[test]
  fn storing_the_wrong_type_is_rejected() {
    let mut v = verifier(vec![], None);
    v.declare_local(&BUILTINS.string, "name").unwrap();
    emit(&mut v, Opcode::LdcI40).unwrap();
    assert!(matches!(
      emit(&mut v, Opcode::Stloc0),
      Err(Error::Verification(VerificationError::TypeMismatch { .. }))
    ));
  }

  #[test]
  fn symbolic_opcodes_need_symbolic_operands() {
    let mut v = verifier(vec![], None);
    for opcode in [Opcode::Br, Opcode::Call, Opcode::Ldfld, Opcode::Box, Opcode::Ldstr, Opcode::Switch] {
      assert!(matches!(
        v.emit(opcode, NumericalOperand::Int32(1)),
        Err(Error::Unsupported(UnsupportedOperation::RequiresSymbolicOperand { .. }))
      ));
    }
    assert!(v.downstream().calls().is_empty());
  }

  #[test]
  fn fields() {
    let point = TypeInfo::value_type("Point");
    let x = Arc::new(FieldInfo::new(&point, "X", &BUILTINS.int32, false));
    let mut origin = FieldInfo::new(&point, "Origin", &point, true);
    origin.is_init_only = true;
    let origin = Arc::new(origin);

    let mut v = verifier(vec![TypeInfo::pointer_to(&point, true)], None);
    emit(&mut v, Opcode::Ldarg0).unwrap();
    v.emit_field(Opcode::Ldfld, &x).unwrap();
    emit(&mut v, Opcode::Pop).unwrap();

    v.emit_field(Opcode::Ldsflda, &origin).unwrap();
    assert_eq!(v.stack().peek().map(|e| e.data_type), Some(DataType::ReadonlyPointer));
    emit(&mut v, Opcode::Pop).unwrap();

    assert!(matches!(
      v.emit_field(Opcode::Ldfld, &origin),
      Err(Error::Verification(VerificationError::StaticMismatch { .. }))
    ));
  }

  #[test]
  fn calls_pop_arguments_and_receiver() {
    let widget = TypeInfo::class("Widget", Some(BUILTINS.object.clone()));
    let resize = Arc::new(MethodInfo::new(
      &widget, "Resize", vec![BUILTINS.int32.clone(), BUILTINS.float64.clone()], Some(BUILTINS.int32.clone()), false
    ));
    let mut v = verifier(vec![widget.clone()], None);
    emit(&mut v, Opcode::Ldarg0).unwrap();
    emit(&mut v, Opcode::LdcI42).unwrap();
    v.emit(Opcode::LdcR8, NumericalOperand::Float64(0.5)).unwrap();
    v.emit_call(Opcode::Callvirt, &resize).unwrap();
    assert_eq!(v.stack().len(), 1);
    emit(&mut v, Opcode::Pop).unwrap();

    // Arguments in the wrong order.
    emit(&mut v, Opcode::Ldarg0).unwrap();
    v.emit(Opcode::LdcR8, NumericalOperand::Float64(0.5)).unwrap();
    emit(&mut v, Opcode::LdcI42).unwrap();
    assert!(matches!(
      v.emit_call(Opcode::Callvirt, &resize),
      Err(Error::Verification(VerificationError::TypeMismatch { .. }))
    ));
  }

  #[test]
  fn newobj_requires_a_constructor() {
    let widget = TypeInfo::class("Widget", Some(BUILTINS.object.clone()));
    let ctor   = Arc::new(MethodInfo::constructor(&widget, vec![]));
    let run    = Arc::new(MethodInfo::new(&widget, "Run", vec![], None, true));
    let mut v = verifier(vec![], None);
    v.emit_call(Opcode::Newobj, &ctor).unwrap();
    assert_eq!(v.stack().peek().and_then(|e| e.concrete.clone()), Some(widget));
    assert!(matches!(
      v.emit_call(Opcode::Newobj, &run),
      Err(Error::Verification(VerificationError::NotAConstructor { .. }))
    ));
  }

  #[test]
  fn generic_definitions_are_rejected() {
    let list = TypeInfo::as_generic_definition(TypeInfo::class("List`1", Some(BUILTINS.object.clone())));
    let count = Arc::new(MethodInfo::new(&list, "Count", vec![], Some(BUILTINS.int32.clone()), true));
    let mut v = verifier(vec![], None);
    assert!(matches!(
      v.emit_call(Opcode::Call, &count),
      Err(Error::Verification(VerificationError::GenericDefinition { .. }))
    ));
  }

  #[test]
  fn tokens_and_strings() {
    let mut v = verifier(vec![], None);
    v.emit_token(Opcode::Ldtoken, &Member::Type(BUILTINS.string.clone())).unwrap();
    assert_eq!(v.stack().peek().and_then(|e| e.concrete.clone()), Some(BUILTINS.type_handle.clone()));
    v.emit_string(Opcode::Ldstr, "hello").unwrap();
    assert_eq!(v.stack().peek().and_then(|e| e.concrete.clone()), Some(BUILTINS.string.clone()));
    assert!(matches!(
      v.emit_string(Opcode::Ldtoken, "hello"),
      Err(Error::Verification(VerificationError::WrongOperandForm { .. }))
    ));
  }

  #[test]
  fn arrays() {
    let strings = TypeInfo::array_of(&BUILTINS.string);
    let mut v = verifier(vec![strings], None);
    emit(&mut v, Opcode::Ldarg0).unwrap();
    emit(&mut v, Opcode::LdcI40).unwrap();
    emit(&mut v, Opcode::LdelemRef).unwrap();
    assert_eq!(v.stack().peek().and_then(|e| e.concrete.clone()), Some(BUILTINS.string.clone()));
    emit(&mut v, Opcode::Pop).unwrap();

    emit(&mut v, Opcode::Ldarg0).unwrap();
    emit(&mut v, Opcode::LdcI40).unwrap();
    assert!(matches!(
      emit(&mut v, Opcode::LdelemI4),
      Err(Error::Verification(VerificationError::TypeMismatch { .. }))
    ));

    let mut v = verifier(vec![], None);
    emit(&mut v, Opcode::LdcI43).unwrap();
    v.emit_type(Opcode::Newarr, &BUILTINS.int32).unwrap();
    emit(&mut v, Opcode::Ldlen).unwrap();
    assert_eq!(v.stack().peek().map(|e| e.data_type), Some(DataType::NativeInt));
  }

  #[test]
  fn boxing() {
    let mut v = verifier(vec![], Some(BUILTINS.int32.clone()));
    emit(&mut v, Opcode::LdcI47).unwrap();
    v.emit_type(Opcode::Box, &BUILTINS.int32).unwrap();
    assert_eq!(v.stack().peek().map(|e| e.data_type), Some(DataType::ObjectReference));
    v.emit_type(Opcode::UnboxAny, &BUILTINS.int32).unwrap();
    emit(&mut v, Opcode::Ret).unwrap();
    v.finish().unwrap();
  }

  #[test]
  fn prefixes() {
    let mut v = verifier(vec![TypeInfo::pointer_to(&BUILTINS.int32, true)], None);
    emit(&mut v, Opcode::Ldarg0).unwrap();
    emit(&mut v, Opcode::Volatile).unwrap();
    emit(&mut v, Opcode::LdindI4).unwrap();
    emit(&mut v, Opcode::Pop).unwrap();

    emit(&mut v, Opcode::Volatile).unwrap();
    assert!(matches!(
      emit(&mut v, Opcode::Volatile),
      Err(Error::Verification(VerificationError::RepeatedPrefix { .. }))
    ));

    let mut v = verifier(vec![], None);
    emit(&mut v, Opcode::Tail).unwrap();
    assert!(matches!(
      emit(&mut v, Opcode::LdcI40),
      Err(Error::Verification(VerificationError::IllegalPrefix { prefix: Opcode::Tail, opcode: Opcode::LdcI40 }))
    ));

    let mut v = verifier(vec![], None);
    emit(&mut v, Opcode::Readonly).unwrap();
    assert!(matches!(
      v.finish(),
      Err(Error::Verification(VerificationError::DanglingPrefix { prefix: Opcode::Readonly }))
    ));
  }

  #[test]
  fn finishing() {
    let mut v = verifier(vec![], None);
    emit(&mut v, Opcode::Nop).unwrap();
    assert!(matches!(v.finish(), Err(Error::Verification(VerificationError::FallThroughEnd))));

    let method = static_method(vec![], None);
    let mut v = Verifier::new(MethodDescriptor::new(method).with_locals_zeroed(false), RecordingSink::new());
    v.declare_local(&BUILTINS.int32, "i").unwrap();
    emit(&mut v, Opcode::Ret).unwrap();
    assert!(matches!(v.finish(), Err(Error::Verification(VerificationError::LocalsNotZeroed))));
  }

  #[test]
  fn init_only_fields_are_writable_in_their_constructor() {
    let widget = TypeInfo::class("Widget", Some(BUILTINS.object.clone()));
    let mut size = FieldInfo::new(&widget, "size", &BUILTINS.int32, false);
    size.is_init_only = true;
    let size = Arc::new(size);

    let ctor = Arc::new(MethodInfo::constructor(&widget, vec![]));
    let mut v = Verifier::new(MethodDescriptor::new(ctor), RecordingSink::new());
    emit(&mut v, Opcode::Ldarg0).unwrap();
    v.emit_field(Opcode::Ldflda, &size).unwrap();
    assert_eq!(v.stack().peek().map(|e| e.data_type), Some(DataType::MutablePointer));

    let mut v = verifier(vec![widget.clone()], None);
    emit(&mut v, Opcode::Ldarg0).unwrap();
    v.emit_field(Opcode::Ldflda, &size).unwrap();
    assert_eq!(v.stack().peek().map(|e| e.data_type), Some(DataType::ReadonlyPointer));

    // Another type's constructor gets no exemption.
    let gadget = TypeInfo::class("Gadget", Some(BUILTINS.object.clone()));
    let other = Arc::new(MethodInfo::constructor(&gadget, vec![widget]));
    let mut v = Verifier::new(MethodDescriptor::new(other), RecordingSink::new());
    emit(&mut v, Opcode::Ldarg1).unwrap();
    v.emit_field(Opcode::Ldflda, &size).unwrap();
    assert_eq!(v.stack().peek().map(|e| e.data_type), Some(DataType::ReadonlyPointer));
  }

  #[test]
  fn calli_pops_the_function_pointer_first() {
    let target = static_method(vec![BUILTINS.int32.clone()], Some(BUILTINS.int32.clone()));
    let mut v = verifier(vec![], None);
    emit(&mut v, Opcode::LdcI41).unwrap();
    v.emit_call(Opcode::Ldftn, &target).unwrap();
    assert_eq!(v.stack().peek().map(|e| e.data_type), Some(DataType::NativeInt));
    v.emit_call(Opcode::Calli, &target).unwrap();
    assert_eq!(v.stack().len(), 1);
    assert_eq!(v.stack().peek().map(|e| e.data_type), Some(DataType::Int32));

    // An int32 where the function pointer belongs.
    emit(&mut v, Opcode::LdcI42).unwrap();
    assert!(matches!(
      v.emit_call(Opcode::Calli, &target),
      Err(Error::Verification(VerificationError::UnexpectedStackType { opcode: Opcode::Calli, .. }))
    ));
    assert_eq!(v.downstream().opcodes(), vec![Opcode::LdcI41, Opcode::Ldftn, Opcode::Calli, Opcode::LdcI42]);
  }

  #[test]
  fn jmp_requires_an_empty_stack() {
    let target = static_method(vec![], None);
    let mut v = verifier(vec![], None);
    emit(&mut v, Opcode::LdcI40).unwrap();
    assert!(matches!(
      v.emit_call(Opcode::Jmp, &target),
      Err(Error::Verification(VerificationError::NonEmptyStack { depth: 1, .. }))
    ));
    emit(&mut v, Opcode::Pop).unwrap();
    v.emit_call(Opcode::Jmp, &target).unwrap();
    v.finish().unwrap();
  }

  #[test]
  fn labels_are_marked_once() {
    let mut v = verifier(vec![], None);
    let top = v.create_label("top").unwrap();
    v.mark_label(top).unwrap();
    emit(&mut v, Opcode::Nop).unwrap();
    assert!(matches!(
      v.mark_label(top),
      Err(Error::Verification(VerificationError::LabelAlreadyMarked { .. }))
    ));
    let marks = v.downstream().calls().iter().filter(|c| matches!(c, SinkCall::MarkLabel(_))).count();
    assert_eq!(marks, 1);
  }

  #[test]
  fn leave_empties_the_stack() {
    let mut v = verifier(vec![], None);
    let exit = v.create_label("exit").unwrap();
    emit(&mut v, Opcode::LdcI41).unwrap();
    v.emit_branch(Opcode::Leave, exit).unwrap();
    v.mark_label(exit).unwrap();
    assert!(v.stack().is_empty());
    emit(&mut v, Opcode::Ret).unwrap();
    v.finish().unwrap();
  }

  #[test]
  fn unreachable_code_starts_with_an_empty_stack() {
    let mut v = verifier(vec![], Some(BUILTINS.int32.clone()));
    let target = v.create_label("target").unwrap();
    emit(&mut v, Opcode::LdcI40).unwrap();
    v.emit_branch(Opcode::BrS, target).unwrap();
    assert!(!v.is_reachable());
    // Marked after an unconditional branch: the stack comes from the branch.
    v.mark_label(target).unwrap();
    assert_eq!(v.stack().len(), 1);
    emit(&mut v, Opcode::Ret).unwrap();
    v.finish().unwrap();
  }

  #[test]
  fn display_lists_the_stack() {
    let mut v = verifier(vec![BUILTINS.int32.clone()], None);
    emit(&mut v, Opcode::Ldarg0).unwrap();
    let text = v.to_string();
    assert!(text.contains("stack[0]"));
    assert!(text.contains("arg[0]"));
  }
}
