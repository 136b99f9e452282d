/*!
  Encoding and decoding of binary instructions.

  The format is the ECMA-335 one. An instruction is a 1 byte opcode, or the escape byte `0xFE`
  followed by a second byte, then the operand bytes its `OperandKind` calls for. All multi-byte
  values are little-endian. `switch` is the one variable length instruction:

    [0x45][count:32][offset:32]...[offset:32]

  Decoding reads one byte at a time from any `Read`, so it works on files and slices alike and
  never reads past the instruction it is decoding.
*/

use std::fmt::Write as FmtWrite;
use std::io::{Bytes, Read};

use tracing::trace;

use crate::error::{DecodeError, EmitError};
use super::catalog;
use super::category::{BranchKind, Category};
use super::instruction::RawInstruction;
use super::opcode::TWO_BYTE_ESCAPE;
use super::operand::{MetadataToken, NumericalOperand, OperandKind};

/// Jump tables claiming more entries than this are read without preallocating.
const SWITCH_PREALLOCATION_LIMIT: u32 = 1024;

/// A forward-only byte source with offset tracking.
pub struct InstructionReader<R: Read> {
  bytes  : Bytes<R>,
  offset : usize,
}

impl<R: Read> InstructionReader<R> {

  pub fn new(source: R) -> InstructionReader<R> {
    InstructionReader {
      bytes  : source.bytes(),
      offset : 0
    }
  }

  /// The offset of the next unread byte.
  pub fn offset(&self) -> usize {
    self.offset
  }

  /// Reads a byte, or `None` at the end of the stream.
  fn next_byte(&mut self) -> Result<Option<u8>, DecodeError> {
    match self.bytes.next() {
      None => Ok(None),
      Some(Ok(byte)) => {
        self.offset += 1;
        Ok(Some(byte))
      }
      Some(Err(source)) => Err(DecodeError::Io { offset: self.offset, source })
    }
  }

  fn read_u8(&mut self) -> Result<u8, DecodeError> {
    let offset = self.offset;
    self.next_byte()?.ok_or(DecodeError::UnexpectedEndOfStream { offset })
  }

  /// Reads `N` bytes, least significant first, into a `u64`.
  fn read_le<const N: usize>(&mut self) -> Result<u64, DecodeError> {
    let mut value = 0u64;
    for i in 0..N {
      value |= (self.read_u8()? as u64) << (8 * i);
    }
    Ok(value)
  }

  /**
    Decodes the next instruction. Returns `Ok(None)` if the stream ends cleanly before an opcode;
    a stream ending anywhere else is an error.
  */
  pub fn read_instruction(&mut self) -> Result<Option<RawInstruction>, DecodeError> {
    let start = self.offset;
    let first =
      match self.next_byte()? {
        Some(byte) => byte,
        None       => return Ok(None)
      };

    let value =
      match first == TWO_BYTE_ESCAPE {
        true  => ((TWO_BYTE_ESCAPE as u16) << 8) | self.read_u8()? as u16,
        false => first as u16
      };

    let descriptor =
      catalog::lookup(value).ok_or(DecodeError::UnknownOpcode { value, offset: start })?;
    let opcode = descriptor.opcode;
    let kind   = descriptor.operand;

    if kind == OperandKind::InlineSwitch {
      let count   = self.read_le::<4>()? as u32;
      let mut targets = Vec::with_capacity(count.min(SWITCH_PREALLOCATION_LIMIT) as usize);
      for _ in 0..count {
        targets.push(self.read_le::<4>()? as u32 as i32);
      }
      let instruction = RawInstruction::Switch(targets);
      trace!(offset = start, %instruction, "decoded");
      return Ok(Some(instruction));
    }

    let operand =
      match kind.size() {

        Some(0) => NumericalOperand::None,

        Some(1) => {
          let byte = self.read_u8()?;
          match kind {
            // Signed forms are sign-extended.
            OperandKind::ShortInlineI | OperandKind::ShortInlineBrTarget => {
              NumericalOperand::Int32(byte as i8 as i32)
            }
            _ => NumericalOperand::Int32(byte as i32)
          }
        }

        Some(2) => NumericalOperand::Int32(self.read_le::<2>()? as i32),

        Some(4) => {
          let bits = self.read_le::<4>()? as u32;
          match kind {
            OperandKind::ShortInlineR => NumericalOperand::Float32(f32::from_bits(bits)),
            OperandKind::InlineI | OperandKind::InlineBrTarget => NumericalOperand::Int32(bits as i32),
            _ => NumericalOperand::Token(MetadataToken(bits))
          }
        }

        Some(8) => {
          let bits = self.read_le::<8>()?;
          match kind {
            OperandKind::InlineR => NumericalOperand::Float64(f64::from_bits(bits)),
            _ => NumericalOperand::Int64(bits as i64)
          }
        }

        size => return Err(DecodeError::UnsupportedOperandSize { opcode, size })
      };

    let instruction = RawInstruction::new(opcode, operand);
    trace!(offset = start, %instruction, "decoded");
    Ok(Some(instruction))
  }
}

/// Decodes a single instruction from `reader`. See `InstructionReader::read_instruction`.
pub fn read_instruction<R: Read>(reader: &mut InstructionReader<R>)
  -> Result<Option<RawInstruction>, DecodeError>
{
  reader.read_instruction()
}


/**
  A lazy, single pass sequence of the instructions in a stream. It ends after the end of the
  stream or after yielding the first error.
*/
pub struct Instructions<R: Read> {
  reader : InstructionReader<R>,
  done   : bool,
}

impl<R: Read> Instructions<R> {
  /// The offset of the next instruction.
  pub fn offset(&self) -> usize {
    self.reader.offset()
  }
}

impl<R: Read> Iterator for Instructions<R> {
  type Item = Result<RawInstruction, DecodeError>;

  fn next(&mut self) -> Option<Self::Item> {
    if self.done {
      return None;
    }
    match self.reader.read_instruction() {
      Ok(Some(instruction)) => Some(Ok(instruction)),
      Ok(None) => {
        self.done = true;
        None
      }
      Err(error) => {
        self.done = true;
        Some(Err(error))
      }
    }
  }
}

pub fn read_instructions<R: Read>(source: R) -> Instructions<R> {
  Instructions {
    reader : InstructionReader::new(source),
    done   : false
  }
}


/// Appends the encoding of `instruction` to `buffer`.
pub fn encode_instruction_into(instruction: &RawInstruction, buffer: &mut Vec<u8>)
  -> Result<(), EmitError>
{
  let opcode = instruction.opcode();
  let kind   = opcode.operand_kind();
  if !instruction.is_well_formed() {
    let operand = instruction.operand().unwrap_or(NumericalOperand::None);
    return Err(EmitError::InvalidOperand { opcode, kind, operand: operand.to_string() });
  }

  let value = opcode.value();
  match opcode.is_two_byte() {
    true  => buffer.extend_from_slice(&[(value >> 8) as u8, value as u8]),
    false => buffer.push(value as u8)
  }

  let operand =
    match instruction {
      RawInstruction::Switch(targets) => {
        buffer.extend_from_slice(&(targets.len() as u32).to_le_bytes());
        for target in targets {
          buffer.extend_from_slice(&target.to_le_bytes());
        }
        return Ok(());
      }
      RawInstruction::Numerical { operand, .. } => *operand
    };

  match (kind, operand) {
    (OperandKind::InlineNone, _) => {}
    (OperandKind::ShortInlineI, NumericalOperand::Int32(v))
    | (OperandKind::ShortInlineBrTarget, NumericalOperand::Int32(v)) => buffer.push(v as i8 as u8),
    (OperandKind::ShortInlineVar, NumericalOperand::Int32(v)) => buffer.push(v as u8),
    (OperandKind::InlineVar, NumericalOperand::Int32(v)) => {
      buffer.extend_from_slice(&(v as u16).to_le_bytes())
    }
    (OperandKind::InlineI, NumericalOperand::Int32(v))
    | (OperandKind::InlineBrTarget, NumericalOperand::Int32(v)) => {
      buffer.extend_from_slice(&v.to_le_bytes())
    }
    (OperandKind::InlineI8, NumericalOperand::Int64(v)) => buffer.extend_from_slice(&v.to_le_bytes()),
    (OperandKind::ShortInlineR, NumericalOperand::Float32(v)) => {
      buffer.extend_from_slice(&v.to_bits().to_le_bytes())
    }
    (OperandKind::InlineR, NumericalOperand::Float64(v)) => {
      buffer.extend_from_slice(&v.to_bits().to_le_bytes())
    }
    (kind, operand) => {
      // Token kinds; `is_well_formed` admits nothing else.
      match operand.as_token() {
        Some(token) if kind.is_token() => buffer.extend_from_slice(&token.0.to_le_bytes()),
        _ => return Err(EmitError::InvalidOperand { opcode, kind, operand: operand.to_string() })
      }
    }
  }

  Ok(())
}

/// Encodes an instruction. The inverse of `read_instruction`.
pub fn encode_instruction(instruction: &RawInstruction) -> Result<Vec<u8>, EmitError> {
  let mut buffer = Vec::with_capacity(instruction.size());
  encode_instruction_into(instruction, &mut buffer)?;
  Ok(buffer)
}


/**
  Renders a byte stream as ILasm-like text, one instruction per line, each prefixed with its
  offset. Branch targets are shown as the absolute offsets they resolve to.
*/
pub fn disassemble(bytes: &[u8]) -> Result<String, DecodeError> {
  let mut text   = String::new();
  let mut offset = 0usize;

  for instruction in read_instructions(bytes) {
    let instruction = instruction?;
    let next = offset + instruction.size();
    let target = |relative: i32| format!("IL_{:04x}", next as i64 + relative as i64);

    let rendered =
      match &instruction {
        RawInstruction::Switch(targets) => {
          format!(
            "switch ({})",
            targets.iter().map(|t| target(*t)).collect::<Vec<String>>().join(", ")
          )
        }
        RawInstruction::Numerical { opcode, operand } => {
          match (opcode.category(), operand.as_int32()) {
            (Category::Branch(info), Some(relative)) if info.kind != BranchKind::Switch => {
              format!("{} {}", opcode, target(relative))
            }
            _ => instruction.to_string()
          }
        }
      };

    // Writing to a `String` cannot fail.
    let _ = writeln!(text, "IL_{:04x}: {}", offset, rendered);
    offset = next;
  }

  Ok(text)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::bytecode::opcode::Opcode;

  fn decode_all(bytes: &[u8]) -> Vec<RawInstruction> {
    read_instructions(bytes).collect::<Result<Vec<_>, _>>().unwrap()
  }

  #[test]
  fn decodes_one_and_two_byte_opcodes() {
    let bytes = [0x1F, 0xFB, 0xFE, 0x01, 0x2A];
    assert_eq!(
      decode_all(&bytes),
      vec![
        RawInstruction::new(Opcode::LdcI4S, NumericalOperand::Int32(-5)),
        RawInstruction::simple(Opcode::Ceq),
        RawInstruction::simple(Opcode::Ret),
      ]
    );
  }

  #[test]
  fn decodes_switch_tables() {
    let bytes = [0x45, 2, 0, 0, 0, 4, 0, 0, 0, 0xF8, 0xFF, 0xFF, 0xFF];
    let instructions = decode_all(&bytes);
    assert_eq!(instructions, vec![RawInstruction::Switch(vec![4, -8])]);
    assert_eq!(instructions[0].size(), 5 + 4 * 2);
  }

  #[test]
  fn variable_indices_are_unsigned() {
    let bytes = [0x11, 0xC8, 0xFE, 0x0C, 0x34, 0x12];
    assert_eq!(
      decode_all(&bytes),
      vec![
        RawInstruction::new(Opcode::LdlocS, NumericalOperand::Int32(200)),
        RawInstruction::new(Opcode::Ldloc, NumericalOperand::Int32(0x1234)),
      ]
    );
  }

  #[test]
  fn tokens_and_floats() {
    let mut bytes = vec![0x28, 0x02, 0x00, 0x00, 0x06, 0x23];
    bytes.extend_from_slice(&2.5f64.to_bits().to_le_bytes());
    assert_eq!(
      decode_all(&bytes),
      vec![
        RawInstruction::new(Opcode::Call, NumericalOperand::Token(MetadataToken::new(0x06, 2))),
        RawInstruction::new(Opcode::LdcR8, NumericalOperand::Float64(2.5)),
      ]
    );
  }

  #[test]
  fn unknown_opcodes_are_errors() {
    let mut instructions = read_instructions(&[0x00, 0xA6][..]);
    assert!(matches!(instructions.next(), Some(Ok(_))));
    assert!(matches!(
      instructions.next(),
      Some(Err(DecodeError::UnknownOpcode { value: 0xA6, offset: 1 }))
    ));
    assert!(instructions.next().is_none());

    let mut reader = InstructionReader::new(&[0xFE, 0x08][..]);
    assert!(matches!(
      reader.read_instruction(),
      Err(DecodeError::UnknownOpcode { value: 0xFE08, offset: 0 })
    ));
  }

  #[test]
  fn truncated_streams_are_errors() {
    let mut reader = InstructionReader::new(&[0x20, 0x01, 0x02][..]);
    assert!(matches!(
      reader.read_instruction(),
      Err(DecodeError::UnexpectedEndOfStream { offset: 3 })
    ));

    let mut reader = InstructionReader::new(&[0xFE][..]);
    assert!(matches!(
      reader.read_instruction(),
      Err(DecodeError::UnexpectedEndOfStream { offset: 1 })
    ));

    let mut reader = InstructionReader::new(&[0u8; 0][..]);
    assert!(matches!(reader.read_instruction(), Ok(None)));
  }

  #[test]
  fn encoding_is_the_inverse_of_decoding() {
    let instructions = vec![
      RawInstruction::new(Opcode::LdcI4S, NumericalOperand::Int32(-5)),
      RawInstruction::new(Opcode::Starg, NumericalOperand::Int32(65535)),
      RawInstruction::new(Opcode::LdcR4, NumericalOperand::Float32(-0.25)),
      RawInstruction::new(Opcode::Ldstr, NumericalOperand::Token(MetadataToken::new(0x70, 1))),
      RawInstruction::Switch(vec![0, 12, -3]),
      RawInstruction::simple(Opcode::Readonly),
    ];
    let mut bytes = Vec::new();
    for instruction in &instructions {
      encode_instruction_into(instruction, &mut bytes).unwrap();
    }
    assert_eq!(bytes.len(), instructions.iter().map(RawInstruction::size).sum::<usize>());
    assert_eq!(decode_all(&bytes), instructions);
  }

  #[test]
  fn ill_formed_operands_are_not_encoded() {
    let instruction = RawInstruction::new(Opcode::LdcI4S, NumericalOperand::Int32(300));
    assert!(matches!(encode_instruction(&instruction), Err(EmitError::InvalidOperand { .. })));
  }

  #[test]
  fn disassembly_resolves_branch_targets() {
    // br.s +1; nop; ret
    let text = disassemble(&[0x2B, 0x01, 0x00, 0x2A]).unwrap();
    assert_eq!(text, "IL_0000: br.s IL_0003\nIL_0002: nop\nIL_0003: ret\n");
  }
}
