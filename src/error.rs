/*!
  Error types. There is one enum per way a run can fail: decoding a byte stream, a verification
  rule violation, an operation the verifier deliberately does not implement, encoding accepted
  instructions, and reading assembly text. None of them is recovered from locally; the first
  error ends the run.
*/

use thiserror::Error;

use crate::bytecode::{Opcode, OperandKind};
use crate::bytecode::category::VariableKind;
use crate::types::{DataType, DataTypeSet};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
  #[error(transparent)]
  Decode(#[from] DecodeError),

  #[error(transparent)]
  Verification(#[from] VerificationError),

  #[error(transparent)]
  Unsupported(#[from] UnsupportedOperation),

  #[error(transparent)]
  Emit(#[from] EmitError),

  #[error(transparent)]
  Assembly(#[from] AssemblyError),
}

/// A malformed or truncated instruction stream. The stream position is undefined afterward.
#[derive(Debug, Error)]
pub enum DecodeError {
  #[error("unexpected end of stream at offset {offset}")]
  UnexpectedEndOfStream { offset: usize },

  #[error("unknown opcode 0x{value:02X} at offset {offset}")]
  UnknownOpcode { value: u16, offset: usize },

  #[error("{opcode}: unsupported operand size {size:?}")]
  UnsupportedOperandSize { opcode: Opcode, size: Option<usize> },

  #[error("read failed at offset {offset}")]
  Io {
    offset: usize,
    #[source]
    source: std::io::Error
  },
}

/// A stack or type rule violation. Fatal for the method body being verified.
#[derive(Debug, Error)]
pub enum VerificationError {
  #[error("{opcode}: stack underflow")]
  StackUnderflow { opcode: Opcode },

  #[error("{opcode}: stack overflow, the maximum depth is {max_stack}")]
  StackOverflow { opcode: Opcode, max_stack: usize },

  #[error("{opcode}: expected {expected}, found {found}")]
  TypeMismatch { opcode: Opcode, expected: String, found: String },

  #[error("{opcode}: expected one of {expected}, found {found}")]
  UnexpectedStackType { opcode: Opcode, expected: DataTypeSet, found: DataType },

  #[error("{opcode}: no arithmetic rule for ({operands})")]
  NoArithmeticRule { opcode: Opcode, operands: String },

  #[error("{opcode}: cannot convert {source_type} to {target}")]
  NoConversion { opcode: Opcode, source_type: DataType, target: DataType },

  #[error("{opcode}: operand {operand} does not fit {kind}")]
  InvalidOperand { opcode: Opcode, kind: OperandKind, operand: String },

  #[error("{opcode} does not take {form}")]
  WrongOperandForm { opcode: Opcode, form: &'static str },

  #[error("{opcode}: cannot compare {left} with {right}")]
  Incomparable { opcode: Opcode, left: String, right: String },

  #[error("{opcode}: {kind} {index} is out of range, there are {count}")]
  VariableOutOfRange { opcode: Opcode, kind: VariableKind, index: i64, count: usize },

  #[error("label {label} is already marked")]
  LabelAlreadyMarked { label: String },

  #[error("no label with index {index}")]
  UnknownLabel { index: usize },

  #[error("label {label} is targeted but never marked")]
  UnmarkedLabel { label: String },

  #[error("{opcode}: field {field} is {staticness}")]
  StaticMismatch { opcode: Opcode, field: String, staticness: &'static str },

  #[error("{opcode}: {member} belongs to an uninstantiated generic definition")]
  GenericDefinition { opcode: Opcode, member: String },

  #[error("{opcode}: {method} is not a constructor")]
  NotAConstructor { opcode: Opcode, method: String },

  #[error("{opcode}: cannot return {expected} with {found} value(s) on the stack")]
  ReturnMismatch { opcode: Opcode, expected: String, found: usize },

  #[error("{opcode}: the stack must be empty, found {depth} value(s)")]
  NonEmptyStack { opcode: Opcode, depth: usize },

  #[error("{opcode} cannot follow the prefix {prefix}")]
  IllegalPrefix { prefix: Opcode, opcode: Opcode },

  #[error("prefix {prefix} is repeated")]
  RepeatedPrefix { prefix: Opcode },

  #[error("prefix {prefix} is not followed by an instruction")]
  DanglingPrefix { prefix: Opcode },

  #[error("control can fall through the end of the method")]
  FallThroughEnd,

  #[error("the method declares locals but does not zero them")]
  LocalsNotZeroed,
}

/// Something the verifier does not implement. Raised instead of verifying incorrectly.
#[derive(Debug, Error)]
pub enum UnsupportedOperation {
  #[error("{opcode}: a numeric operand cannot be verified, a symbolic operand is required")]
  RequiresSymbolicOperand { opcode: Opcode },

  #[error("label {label}: merging differing stack states [{first}] and [{second}] is not implemented")]
  StackMerge { label: String, first: String, second: String },
}

/// Encoding accepted instructions into bytes.
#[derive(Debug, Error)]
pub enum EmitError {
  #[error("{opcode}: offset {offset} to label {label} does not fit the short form")]
  BranchOutOfRange { opcode: Opcode, label: String, offset: i64 },

  #[error("label {label} is targeted but never marked")]
  UnmarkedLabel { label: String },

  #[error("label {label} is already marked")]
  LabelAlreadyMarked { label: String },

  #[error("no label with index {index}")]
  UnknownLabel { index: usize },

  #[error("{opcode}: operand {operand} does not fit {kind}")]
  InvalidOperand { opcode: Opcode, kind: OperandKind, operand: String },
}

/// Reading assembly text. Every variant carries the 1-based source line.
#[derive(Debug, Error)]
pub enum AssemblyError {
  #[error("line {line}: syntax error: {message}")]
  Syntax { line: usize, message: String },

  #[error("line {line}: unknown opcode {name}")]
  UnknownOpcode { line: usize, name: String },

  #[error("line {line}: unknown type or member {name}")]
  UnknownMember { line: usize, name: String },

  #[error("line {line}: {opcode} expects an operand of kind {expected}")]
  OperandMismatch { line: usize, opcode: Opcode, expected: OperandKind },

  #[error("line {line}: {source}")]
  Rejected {
    line: usize,
    #[source]
    source: Box<Error>
  },
}
