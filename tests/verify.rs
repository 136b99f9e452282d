use std::sync::Arc;

use proptest::prelude::*;
use strum::IntoEnumIterator;

use cilverify::bytecode::{assemble, disassemble, BytecodeWriter, NumericalOperand, Opcode};
use cilverify::error::{AssemblyError, Error, UnsupportedOperation, VerificationError};
use cilverify::sink::{InstructionSink, RecordingSink};
use cilverify::symboltable::SymbolTable;
use cilverify::types::{DataType, Environment, MethodInfo, TypeInfo, TypeRef, BUILTINS};
use cilverify::verifier::{MethodDescriptor, Verifier};

fn method(parameters: Vec<TypeRef>, return_type: Option<TypeRef>) -> MethodDescriptor {
  let owner = TypeInfo::class("Program", Some(BUILTINS.object.clone()));
  MethodDescriptor::new(Arc::new(MethodInfo::new(&owner, "Main", parameters, return_type, true)))
}

fn verify(descriptor: MethodDescriptor, environment: &Environment, text: &str)
  -> (Result<(), Error>, Verifier<RecordingSink>)
{
  let mut verifier = Verifier::new(descriptor, RecordingSink::new());
  let result = assemble(text, environment, &mut verifier);
  (result, verifier)
}

/// The verification error a rejected line carries.
fn rejection(result: Result<(), Error>) -> (usize, Error) {
  match result {
    Err(Error::Assembly(AssemblyError::Rejected { line, source })) => (line, *source),
    other => panic!("expected a rejection, got {:?}", other)
  }
}

const SUM: &str = "
  ldc.i4.5
  ldc.i4.3
  add
  ret
";

#[test]
fn constant_sum_verifies_and_forwards_every_instruction() {
  let (result, verifier) = verify(method(vec![], Some(BUILTINS.int32.clone())), &Environment::new(), SUM);
  result.unwrap();
  assert_eq!(
    verifier.downstream().opcodes(),
    vec![Opcode::LdcI45, Opcode::LdcI43, Opcode::Add, Opcode::Ret]
  );
}

#[test]
fn constant_sum_cannot_return_a_reference() {
  let (result, verifier) = verify(method(vec![], Some(BUILTINS.string.clone())), &Environment::new(), SUM);
  let (line, error) = rejection(result);
  assert_eq!(line, 5);
  assert!(matches!(error, Error::Verification(_)));
  assert_eq!(verifier.downstream().opcodes(), vec![Opcode::LdcI45, Opcode::LdcI43, Opcode::Add]);
}

#[test]
fn objects_cannot_be_added() {
  let text = "
    ldarg.0
    ldarg.0
    add
    ret
  ";
  let (result, verifier) = verify(method(vec![BUILTINS.object.clone()], None), &Environment::new(), text);
  let (line, error) = rejection(result);
  assert_eq!(line, 4);
  assert!(matches!(
    error,
    Error::Verification(VerificationError::NoArithmeticRule { opcode: Opcode::Add, .. })
  ));
  assert_eq!(verifier.downstream().opcodes(), vec![Opcode::Ldarg0, Opcode::Ldarg0]);
}

#[test]
fn unsigned_checked_addition() {
  let text = "
    ldarg.0
    ldarg.1
    add.ovf.un
    ret
  ";
  let parameters = vec![BUILTINS.uint32.clone(), BUILTINS.uint32.clone()];
  let (result, verifier) = verify(method(parameters, Some(BUILTINS.uint32.clone())), &Environment::new(), text);
  result.unwrap();
  assert_eq!(verifier.downstream().opcodes().len(), 4);

  let info = Opcode::AddOvfUn.arithmetic();
  assert!(info.unsigned && info.overflow_checked);
}

#[test]
fn mixed_float_and_integer_addition_has_no_rule() {
  let mut v = Verifier::new(method(vec![], None), RecordingSink::new());
  v.emit(Opcode::LdcR8, NumericalOperand::Float64(1.0)).unwrap();
  v.emit(Opcode::LdcI41, NumericalOperand::None).unwrap();
  assert!(matches!(
    v.emit(Opcode::Add, NumericalOperand::None),
    Err(Error::Verification(VerificationError::NoArithmeticRule { .. }))
  ));
}

const SWITCH: &str = "
      ldarg.0
      switch (one, two)
      ldc.i4.0
      ret
  one:
      ldc.i4.1
      ret
  two:
      ldc.i4.2
      ret
";

#[test]
fn switch_verifies_once_both_targets_are_marked() {
  let descriptor = method(vec![BUILTINS.int32.clone()], Some(BUILTINS.int32.clone()));
  let (result, _) = verify(descriptor.clone(), &Environment::new(), SWITCH);
  result.unwrap();

  // Without `two:` the jump table has a dangling target.
  let truncated = SWITCH.replace("two:", "");
  let (result, _) = verify(descriptor, &Environment::new(), &truncated);
  let (_, error) = rejection(result);
  assert!(matches!(error, Error::Verification(VerificationError::UnmarkedLabel { .. })));
}

#[test]
fn switch_targets_must_agree_on_the_stack() {
  let text = "
        ldarg.0
        switch (join)
        ldc.i4.0
    join:
        ret
  ";
  let (result, _) = verify(method(vec![BUILTINS.int32.clone()], None), &Environment::new(), text);
  let (line, error) = rejection(result);
  assert_eq!(line, 5);
  assert!(matches!(error, Error::Unsupported(UnsupportedOperation::StackMerge { .. })));
}

#[test]
fn branches_meet_on_the_stack_type() {
  let text = "
        ldarg.0
        brfalse zero
        ldarg.0
        br join
    zero: ldc.i4.0
    join: ret
  ";
  let descriptor = method(vec![BUILTINS.uint8.clone()], Some(BUILTINS.int32.clone()));
  let (result, _) = verify(descriptor, &Environment::new(), text);
  result.unwrap();

  // A null on one path and a string on the other are both object references.
  let text = "
        ldarg.0
        brtrue other
        ldnull
        br join
    other: ldstr \"x\"
    join: ret
  ";
  let descriptor = method(vec![BUILTINS.int32.clone()], Some(BUILTINS.string.clone()));
  let (result, verifier) = verify(descriptor, &Environment::new(), text);
  result.unwrap();
  assert_eq!(verifier.downstream().opcodes().last(), Some(&Opcode::Ret));
}

#[test]
fn returns_are_checked_by_stack_type() {
  let descriptor = method(vec![BUILTINS.object.clone()], Some(BUILTINS.string.clone()));
  let (result, _) = verify(descriptor, &Environment::new(), "ldarg.0\nret");
  result.unwrap();

  let descriptor = method(vec![TypeInfo::value_type("A")], Some(TypeInfo::value_type("B")));
  let (result, _) = verify(descriptor, &Environment::new(), "ldarg.0\nret");
  result.unwrap();

  let descriptor = method(vec![BUILTINS.int32.clone()], Some(BUILTINS.object.clone()));
  let (result, _) = verify(descriptor, &Environment::new(), "ldarg.0\nret");
  let (line, error) = rejection(result);
  assert_eq!(line, 2);
  assert!(matches!(error, Error::Verification(_)));
}

#[test]
fn a_rejected_call_is_not_forwarded() {
  let mut environment = Environment::new();
  let program = environment.define_type(TypeInfo::class("Program", Some(BUILTINS.object.clone())));
  environment.define_method(
    MethodInfo::new(&program, "Length", vec![BUILTINS.string.clone()], Some(BUILTINS.int32.clone()), true)
  );
  let text = "
    ldstr \"hello\"
    call Program::Length
    pop
    ldc.i4.7
    call Program::Length
    ret
  ";
  let (result, verifier) = verify(method(vec![], None), &environment, text);
  let (line, error) = rejection(result);
  assert_eq!(line, 6);
  assert!(matches!(error, Error::Verification(_)));
  assert_eq!(
    verifier.downstream().opcodes(),
    vec![Opcode::Ldstr, Opcode::Call, Opcode::Pop, Opcode::LdcI47]
  );
}

#[test]
fn verified_bodies_reach_the_writer() {
  let descriptor = method(vec![BUILTINS.int32.clone()], Some(BUILTINS.int32.clone()));
  let mut verifier = Verifier::new(descriptor, BytecodeWriter::new(SymbolTable::new()));
  assemble(SWITCH, &Environment::new(), &mut verifier).unwrap();

  let writer = verifier.into_inner();
  let text = disassemble(writer.bytes()).unwrap();
  // ldarg.0 is 1 byte and the switch 13; `one` follows ldc.i4.0 and ret at 0x10.
  assert!(text.contains("IL_0001: switch (IL_0010, IL_0012)"), "{}", text);
  assert!(text.contains("IL_0012: ldc.i4.2"), "{}", text);
}

proptest! {
  #[test]
  fn stack_types_decay_idempotently(t in prop::sample::select(DataType::iter().collect::<Vec<_>>())) {
    let decayed = t.to_stack_type();
    prop_assert_eq!(decayed.to_stack_type(), decayed);
  }

  #[test]
  fn only_the_accepted_prefix_is_forwarded(pushes in prop::collection::vec(any::<bool>(), 0..40)) {
    let mut v = Verifier::new(method(vec![], None).with_max_stack(64), RecordingSink::new());
    let mut depth = 0usize;
    for (i, push) in pushes.iter().enumerate() {
      match push {
        true => {
          v.emit(Opcode::LdcI40, NumericalOperand::None).unwrap();
          depth += 1;
        }
        false if depth == 0 => {
          let popped = v.emit(Opcode::Pop, NumericalOperand::None);
          prop_assert!(
            matches!(popped, Err(Error::Verification(VerificationError::StackUnderflow { .. }))),
            "expected an underflow"
          );
          prop_assert_eq!(v.downstream().opcodes().len(), i);
          return Ok(());
        }
        false => {
          v.emit(Opcode::Pop, NumericalOperand::None).unwrap();
          depth -= 1;
        }
      }
      prop_assert_eq!(v.stack().len(), depth);
    }
    prop_assert_eq!(v.downstream().opcodes().len(), pushes.len());
  }
}
