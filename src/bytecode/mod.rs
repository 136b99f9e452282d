/*!

  CIL bytecode is a little-endian byte stream. An instruction is an opcode of one or two bytes
  followed by an operand whose size the opcode determines. Two byte opcodes begin with the escape
  byte `0xFE` and are written here as `0xFE00 | b`. The operand sizes are as follows:

    InlineNone:                     0 bytes
    ShortInlineI, ShortInlineVar,
    ShortInlineBrTarget:            1 byte
    InlineVar:                      2 bytes
    InlineI, ShortInlineR, tokens,
    InlineBrTarget:                 4 bytes
    InlineI8, InlineR:              8 bytes
    InlineSwitch:                   4 bytes of count N, then N 4 byte offsets

  Branch offsets are signed and relative to the end of the instruction; for `switch` that is the
  end of its whole jump table. Tokens are `table << 24 | row`.

  Every opcode has one static `OpcodeDescriptor` in the catalog. It carries the mnemonic, the
  number of stack values popped and pushed, the operand kind, the prefixes the opcode accepts,
  and a `Category` that selects the verifier's transition rule. The catalog is the only place
  these facts are written down; everything else looks them up.

  Instructions enter the system three ways: decoded from bytes (`binary`), parsed from text
  (`assembly`), or emitted directly through an `InstructionSink`. `BytecodeWriter` is the sink
  that turns them back into bytes.

*/

pub mod category;
pub mod catalog;
pub mod opcode;
pub mod operand;
pub mod instruction;
pub mod binary;
pub mod assembly;
pub mod writer;

pub use assembly::assemble;
pub use binary::{
  disassemble,
  encode_instruction,
  encode_instruction_into,
  read_instruction,
  read_instructions,
  InstructionReader,
  Instructions
};
pub use category::Category;
pub use instruction::RawInstruction;
pub use opcode::{Opcode, OpcodeDescriptor};
pub use operand::{MetadataToken, NumericalOperand, OperandKind};
pub use writer::BytecodeWriter;
