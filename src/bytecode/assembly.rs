/*!
  The human readable textual form of bytecode is called assembly. This module parses an ILasm-like
  dialect of it, one method body per text, and drives any `InstructionSink` with the result. The
  `strum` derives of `Opcode` give the mnemonics.

  Each line holds at most one of each, in this order: a label definition, a statement, and a
  comment.

    // Sums its arguments.
    .locals int32 total
            ldarg.0
            ldarg.1
            add
            stloc total
    loop:   ldloc.0
            brtrue.s loop
            switch (loop, done)
            ldstr "a \"quoted\" string"
            call Program::Run
    done:   ret

  Operands are integers (decimal, or hex with `0x`), floats, double quoted strings with `\\`,
  `\"`, `\n` and `\t` escapes, names, or a parenthesized list of labels for `switch`. Names are
  resolved against an `Environment` by the kind of operand the opcode takes: labels for branches,
  `Type::member` for methods and fields, type names for types. Variable operands may name a
  local declared with `.locals`. Type names cannot contain spaces; use the aliases `nint` and
  `nuint` for the native integer types.
*/

use std::collections::HashMap;
use std::str::FromStr;

use nom::{
  branch::alt,
  bytes::complete::{escaped_transform, is_not, tag, tag_no_case, take_while, take_while1},
  character::complete::{char as one_char, hex_digit1, satisfy, space0, space1},
  combinator::{cut, map, map_res, not, opt, peek, recognize, value},
  multi::separated_list0,
  number::complete::recognize_float,
  sequence::{delimited, pair, preceded, terminated, tuple},
  IResult
};
use tracing::trace;

use crate::error::{AssemblyError, Error, Result};
use crate::sink::{InstructionSink, Label};
use crate::types::{Environment, Member};
use super::opcode::Opcode;
use super::operand::{NumericalOperand, OperandKind};

#[derive(Clone, PartialEq, Debug)]
pub enum ParsedOperand<'a> {
  None,
  Integer(i64),
  Float(f64),
  String(String),
  Name(&'a str),
  Labels(Vec<&'a str>),
}

#[derive(Clone, PartialEq, Debug)]
pub enum Statement<'a> {
  Locals {
    type_name : &'a str,
    name      : &'a str
  },
  Instruction {
    mnemonic : &'a str,
    operand  : ParsedOperand<'a>
  },
}

/// One line of assembly. Either part may be missing.
#[derive(Clone, PartialEq, Debug)]
pub struct ParsedLine<'a> {
  pub label     : Option<&'a str>,
  pub statement : Option<Statement<'a>>,
}


// region Parsers

fn identifier_p(input: &str) -> IResult<&str, &str> {
  recognize(pair(
    take_while1(|c: char| c.is_alphabetic() || c == '_'),
    take_while(|c: char| c.is_alphanumeric() || c == '_' || c == '$')
  ))(input)
}

fn label_definition_p(input: &str) -> IResult<&str, &str> {
  terminated(identifier_p, pair(space0, one_char(':')))(input)
}

fn mnemonic_p(input: &str) -> IResult<&str, &str> {
  take_while1(|c: char| c.is_ascii_alphanumeric() || c == '.')(input)
}

/// A type or member name: anything up to whitespace, a comma, or a parenthesis.
fn name_p(input: &str) -> IResult<&str, &str> {
  take_while1(|c: char| !c.is_whitespace() && !matches!(c, ',' | '(' | ')' | '"'))(input)
}

fn comment_p(input: &str) -> IResult<&str, &str> {
  recognize(pair(tag("//"), take_while(|_: char| true)))(input)
}

fn hex_p(input: &str) -> IResult<&str, i64> {
  map_res(
    preceded(tag_no_case("0x"), hex_digit1),
    |digits: &str| i64::from_str_radix(digits, 16)
  )(input)
}

/// An integer, or a float if the text has a fraction or exponent.
fn number_p(input: &str) -> IResult<&str, ParsedOperand> {
  preceded(
    peek(satisfy(|c: char| c.is_ascii_digit() || matches!(c, '-' | '+' | '.'))),
    alt((
      map(hex_p, ParsedOperand::Integer),
      map_res(recognize_float, |text: &str| {
        match text.contains(|c: char| matches!(c, '.' | 'e' | 'E')) {
          true  => text.parse::<f64>().map(ParsedOperand::Float).map_err(|_| ()),
          false => text.parse::<i64>().map(ParsedOperand::Integer).map_err(|_| ())
        }
      })
    ))
  )(input)
}

fn string_p(input: &str) -> IResult<&str, String> {
  map(
    delimited(
      one_char('"'),
      opt(escaped_transform(
        is_not("\\\""),
        '\\',
        alt((
          value("\\", tag("\\")),
          value("\"", tag("\"")),
          value("\n", tag("n")),
          value("\t", tag("t")),
        ))
      )),
      one_char('"')
    ),
    Option::unwrap_or_default
  )(input)
}

fn label_list_p(input: &str) -> IResult<&str, Vec<&str>> {
  delimited(
    pair(one_char('('), space0),
    separated_list0(tuple((space0, one_char(','), space0)), identifier_p),
    pair(space0, one_char(')'))
  )(input)
}

fn operand_p(input: &str) -> IResult<&str, ParsedOperand> {
  preceded(
    not(tag("//")),
    alt((
      map(label_list_p, ParsedOperand::Labels),
      map(string_p, ParsedOperand::String),
      number_p,
      map(name_p, ParsedOperand::Name),
    ))
  )(input)
}

fn locals_p(input: &str) -> IResult<&str, Statement> {
  preceded(
    tag(".locals"),
    cut(map(
      pair(preceded(space1, name_p), preceded(space1, identifier_p)),
      |(type_name, name)| Statement::Locals { type_name, name }
    ))
  )(input)
}

fn instruction_p(input: &str) -> IResult<&str, Statement> {
  map(
    pair(mnemonic_p, opt(preceded(space1, operand_p))),
    |(mnemonic, operand)| Statement::Instruction {
      mnemonic,
      operand: operand.unwrap_or(ParsedOperand::None)
    }
  )(input)
}

fn line_p(input: &str) -> IResult<&str, ParsedLine> {
  let (input, _)         = space0(input)?;
  let (input, label)     = opt(terminated(label_definition_p, space0))(input)?;
  let (input, statement) = opt(alt((locals_p, instruction_p)))(input)?;
  let (input, _)         = space0(input)?;
  let (input, _)         = opt(comment_p)(input)?;
  Ok((input, ParsedLine { label, statement }))
}

/// Parses one line of assembly, which must not contain a line break.
pub fn parse_line(text: &str, line: usize) -> std::result::Result<ParsedLine, AssemblyError> {
  match line_p(text) {
    Ok(("", parsed)) => Ok(parsed),
    Ok((rest, _)) => Err(AssemblyError::Syntax { line, message: format!("unexpected `{}`", rest.trim_end()) }),
    Err(e) => Err(AssemblyError::Syntax { line, message: e.to_string() })
  }
}

// endregion


/// Resolves parsed lines against an environment and feeds them to a sink.
struct Assembler<'e, 'a, S: InstructionSink + ?Sized> {
  environment : &'e Environment,
  sink        : &'e mut S,
  labels      : HashMap<&'a str, Label>,
  locals      : HashMap<&'a str, u16>,
  line        : usize,
}

impl<'e, 'a, S: InstructionSink + ?Sized> Assembler<'e, 'a, S> {

  fn rejected(&self, error: Error) -> Error {
    AssemblyError::Rejected { line: self.line, source: Box::new(error) }.into()
  }

  fn mismatch(&self, opcode: Opcode) -> Error {
    AssemblyError::OperandMismatch { line: self.line, opcode, expected: opcode.operand_kind() }.into()
  }

  fn unknown(&self, name: &str) -> Error {
    AssemblyError::UnknownMember { line: self.line, name: name.to_string() }.into()
  }

  /// The label named `name`, created on first use.
  fn label(&mut self, name: &'a str) -> Result<Label> {
    if let Some(label) = self.labels.get(name) {
      return Ok(*label);
    }
    let label = self.sink.create_label(name).map_err(|e| self.rejected(e))?;
    self.labels.insert(name, label);
    Ok(label)
  }

  fn assemble_line(&mut self, parsed: ParsedLine<'a>) -> Result<()> {
    if let Some(name) = parsed.label {
      let label = self.label(name)?;
      self.sink.mark_label(label).map_err(|e| self.rejected(e))?;
    }

    match parsed.statement {

      None => Ok(()),

      Some(Statement::Locals { type_name, name }) => {
        let local_type = self.environment.type_named(type_name).ok_or_else(|| self.unknown(type_name))?;
        let index = self.sink.declare_local(&local_type, name).map_err(|e| self.rejected(e))?;
        self.locals.insert(name, index.index());
        Ok(())
      }

      Some(Statement::Instruction { mnemonic, operand }) => {
        let opcode =
          Opcode::from_str(mnemonic).map_err(|_| AssemblyError::UnknownOpcode {
            line : self.line,
            name : mnemonic.to_string()
          })?;
        trace!(line = self.line, %opcode, ?operand);
        self.instruction(opcode, operand)
      }

    }
  }

  fn instruction(&mut self, opcode: Opcode, operand: ParsedOperand<'a>) -> Result<()> {
    let kind = opcode.operand_kind();
    let result =
      match (kind, operand) {

        (OperandKind::InlineNone, ParsedOperand::None) => self.sink.emit(opcode, NumericalOperand::None),

        | (OperandKind::ShortInlineI, ParsedOperand::Integer(v))
        | (OperandKind::InlineI, ParsedOperand::Integer(v))
        | (OperandKind::ShortInlineVar, ParsedOperand::Integer(v))
        | (OperandKind::InlineVar, ParsedOperand::Integer(v)) => {
          // Hex literals may spell negative values as their unsigned bits.
          let v =
            i32::try_from(v)
              .or_else(|_| u32::try_from(v).map(|u| u as i32))
              .map_err(|_| self.mismatch(opcode))?;
          self.sink.emit(opcode, NumericalOperand::Int32(v))
        }

        (OperandKind::ShortInlineVar, ParsedOperand::Name(name))
        | (OperandKind::InlineVar, ParsedOperand::Name(name)) => {
          let index = *self.locals.get(name).ok_or_else(|| self.unknown(name))?;
          self.sink.emit(opcode, NumericalOperand::Int32(index as i32))
        }

        (OperandKind::InlineI8, ParsedOperand::Integer(v)) => self.sink.emit(opcode, NumericalOperand::Int64(v)),

        (OperandKind::ShortInlineR, ParsedOperand::Float(v)) => self.sink.emit(opcode, NumericalOperand::Float32(v as f32)),
        (OperandKind::ShortInlineR, ParsedOperand::Integer(v)) => self.sink.emit(opcode, NumericalOperand::Float32(v as f32)),
        (OperandKind::InlineR, ParsedOperand::Float(v)) => self.sink.emit(opcode, NumericalOperand::Float64(v)),
        (OperandKind::InlineR, ParsedOperand::Integer(v)) => self.sink.emit(opcode, NumericalOperand::Float64(v as f64)),

        (OperandKind::ShortInlineBrTarget, ParsedOperand::Name(name))
        | (OperandKind::InlineBrTarget, ParsedOperand::Name(name)) => {
          let target = self.label(name)?;
          self.sink.emit_branch(opcode, target)
        }

        (OperandKind::InlineSwitch, ParsedOperand::Labels(names)) => {
          let targets =
            names
              .into_iter()
              .map(|name| self.label(name))
              .collect::<Result<Vec<Label>>>()?;
          self.sink.emit_switch(&targets)
        }

        (OperandKind::InlineMethod, ParsedOperand::Name(name))
        | (OperandKind::InlineSig, ParsedOperand::Name(name)) => {
          let method = self.environment.method_named(name).ok_or_else(|| self.unknown(name))?;
          self.sink.emit_call(opcode, &method)
        }

        (OperandKind::InlineField, ParsedOperand::Name(name)) => {
          let field = self.environment.field_named(name).ok_or_else(|| self.unknown(name))?;
          self.sink.emit_field(opcode, &field)
        }

        (OperandKind::InlineType, ParsedOperand::Name(name)) => {
          let operand_type = self.environment.type_named(name).ok_or_else(|| self.unknown(name))?;
          self.sink.emit_type(opcode, &operand_type)
        }

        (OperandKind::InlineTok, ParsedOperand::Name(name)) => {
          let member: Member = self.environment.member_named(name).ok_or_else(|| self.unknown(name))?;
          self.sink.emit_token(opcode, &member)
        }

        (OperandKind::InlineString, ParsedOperand::String(value)) => self.sink.emit_string(opcode, &value),

        _ => return Err(self.mismatch(opcode))
      };

    result.map_err(|e| self.rejected(e))
  }
}

/**
  Assembles `text` into `sink`, then finishes the sink. Stops at the first line that fails to
  parse or that the sink rejects; the sink has then seen every line before it.
*/
pub fn assemble<S: InstructionSink + ?Sized>(text: &str, environment: &Environment, sink: &mut S) -> Result<()> {
  let mut assembler = Assembler {
    environment,
    sink,
    labels : HashMap::new(),
    locals : HashMap::new(),
    line   : 0,
  };

  for (i, line) in text.lines().enumerate() {
    assembler.line = i + 1;
    let parsed = parse_line(line, assembler.line)?;
    assembler.assemble_line(parsed)?;
  }

  assembler.line += 1;
  assembler.sink.finish().map_err(|e| assembler.rejected(e))
}
