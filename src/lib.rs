/*!
  A model of the ECMA-335 Common Intermediate Language instruction set, with a binary codec, an
  assembler, and a single pass stack verifier.

  The pieces compose through `InstructionSink`. A `Verifier` is a sink that checks each
  instruction against a simulated evaluation stack and forwards the ones it accepts to a
  downstream sink, typically a `BytecodeWriter`:

    text --assemble--> Verifier --> BytecodeWriter --> bytes --disassemble--> text
*/

#[macro_use] extern crate prettytable;

pub mod bytecode;
pub mod error;
pub mod sink;
pub mod symboltable;
pub mod types;
pub mod verifier;

pub use error::{Error, Result};
