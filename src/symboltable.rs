/*!
  Metadata tokens for symbolic members.

  The bytecode writer needs a 4 byte token for every member an instruction refers to. A
  `TokenProvider` supplies them. `SymbolTable` is the provider used here: a convenience wrapper
  around a `BiMap` between symbols and tokens that hands out the next row of the right table the
  first time it sees a symbol, and can resolve a token back to its symbol afterward.
*/

use std::collections::HashMap;
use std::fmt::{Display, Formatter};

use bimap::BiMap;
use string_cache::DefaultAtom;

use crate::bytecode::MetadataToken;
use crate::types::{FieldRef, Member, MethodRef, TypeRef};

// Metadata table numbers (ECMA-335 Partition II, 22).
pub const TYPE_DEF_TABLE     : u8 = 0x02;
pub const FIELD_TABLE        : u8 = 0x04;
pub const METHOD_DEF_TABLE   : u8 = 0x06;
pub const SIGNATURE_TABLE    : u8 = 0x11;
pub const USER_STRING_TABLE  : u8 = 0x70;

/// Largest row a token can address.
const MAX_ROW: u32 = 0x00FF_FFFF;

/// Supplies the token an instruction operand refers to a member by.
pub trait TokenProvider {
  fn type_token(&mut self, t: &TypeRef) -> MetadataToken;

  fn method_token(&mut self, method: &MethodRef) -> MetadataToken;

  fn field_token(&mut self, field: &FieldRef) -> MetadataToken;

  /// The stand-alone signature `calli` refers to.
  fn signature_token(&mut self, method: &MethodRef) -> MetadataToken;

  fn string_token(&mut self, value: &str) -> MetadataToken;

  fn member_token(&mut self, member: &Member) -> MetadataToken {
    match member {
      Member::Type(t)       => self.type_token(t),
      Member::Method(m)     => self.method_token(m),
      Member::Field(field)  => self.field_token(field),
    }
  }
}

impl<P: TokenProvider + ?Sized> TokenProvider for &mut P {
  fn type_token(&mut self, t: &TypeRef) -> MetadataToken {
    (**self).type_token(t)
  }

  fn method_token(&mut self, method: &MethodRef) -> MetadataToken {
    (**self).method_token(method)
  }

  fn field_token(&mut self, field: &FieldRef) -> MetadataToken {
    (**self).field_token(field)
  }

  fn signature_token(&mut self, method: &MethodRef) -> MetadataToken {
    (**self).signature_token(method)
  }

  fn string_token(&mut self, value: &str) -> MetadataToken {
    (**self).string_token(value)
  }
}


/// What a token stands for.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub enum Symbol {
  Type(DefaultAtom),
  /// Keyed by qualified name, `Type::method`.
  Method(DefaultAtom),
  /// Keyed by qualified name, `Type::field`.
  Field(DefaultAtom),
  /// Keyed by the full signature text.
  Signature(DefaultAtom),
  String(String),
}

impl Symbol {
  pub fn table(&self) -> u8 {
    match self {
      Symbol::Type(_)      => TYPE_DEF_TABLE,
      Symbol::Method(_)    => METHOD_DEF_TABLE,
      Symbol::Field(_)     => FIELD_TABLE,
      Symbol::Signature(_) => SIGNATURE_TABLE,
      Symbol::String(_)    => USER_STRING_TABLE,
    }
  }
}

impl Display for Symbol {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self {
      Symbol::Type(name)      => write!(f, "{}", name),
      Symbol::Method(name)    => write!(f, "{}", name),
      Symbol::Field(name)     => write!(f, "{}", name),
      Symbol::Signature(name) => write!(f, "method {}", name),
      Symbol::String(value)   => write!(f, "{:?}", value),
    }
  }
}


#[derive(Default, Debug)]
pub struct SymbolTable {
  table : BiMap<Symbol, MetadataToken>,
  /// The last row handed out in each table.
  rows  : HashMap<u8, u32>,
}

impl SymbolTable {

  pub fn new() -> SymbolTable {
    SymbolTable::default()
  }

  pub fn get_symbol(&self, token: MetadataToken) -> Option<&Symbol> {
    self.table.get_by_right(&token)
  }

  pub fn get_token(&self, symbol: &Symbol) -> Option<MetadataToken> {
    self.table.get_by_left(symbol).copied()
  }

  /**
    Binds `symbol` to `token`. Neither may already be bound, in which case the pair is handed
    back unchanged.
  */
  pub fn insert(&mut self, symbol: Symbol, token: MetadataToken) -> Result<(), (Symbol, MetadataToken)> {
    self.table.insert_no_overwrite(symbol, token)?;
    let row = self.rows.entry(token.table()).or_insert(0);
    *row = (*row).max(token.row());
    Ok(())
  }

  /// The token bound to `symbol`, binding the next free row of its table if there is none yet.
  pub fn intern(&mut self, symbol: Symbol) -> MetadataToken {
    if let Some(token) = self.get_token(&symbol) {
      return token;
    }
    let table = symbol.table();
    let row = self.rows.entry(table).or_insert(0);
    // Rows are 1-based and limited to 24 bits. Past the limit the last row is reused.
    *row = (*row + 1).min(MAX_ROW);
    let token = MetadataToken::new(table, *row);
    self.table.insert(symbol, token);
    token
  }

  pub fn len(&self) -> usize {
    self.table.len()
  }

  pub fn is_empty(&self) -> bool {
    self.table.is_empty()
  }

  /// Every binding, ordered by token.
  pub fn entries(&self) -> Vec<(MetadataToken, &Symbol)> {
    let mut entries =
      self.table
          .iter()
          .map(|(symbol, token)| (*token, symbol))
          .collect::<Vec<_>>();
    entries.sort_by_key(|(token, _)| *token);
    entries
  }
}

impl TokenProvider for SymbolTable {
  fn type_token(&mut self, t: &TypeRef) -> MetadataToken {
    self.intern(Symbol::Type(t.name.clone()))
  }

  fn method_token(&mut self, method: &MethodRef) -> MetadataToken {
    self.intern(Symbol::Method(DefaultAtom::from(method.qualified_name().as_str())))
  }

  fn field_token(&mut self, field: &FieldRef) -> MetadataToken {
    self.intern(Symbol::Field(DefaultAtom::from(field.qualified_name().as_str())))
  }

  fn signature_token(&mut self, method: &MethodRef) -> MetadataToken {
    self.intern(Symbol::Signature(DefaultAtom::from(method.to_string().as_str())))
  }

  fn string_token(&mut self, value: &str) -> MetadataToken {
    self.intern(Symbol::String(value.to_string()))
  }
}


#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::Arc;
  use crate::types::{MethodInfo, TypeInfo, BUILTINS};

  #[test]
  fn tokens_are_per_table_and_stable() {
    let mut table = SymbolTable::new();
    let program = TypeInfo::class("Program", Some(BUILTINS.object.clone()));
    let main = Arc::new(MethodInfo::new(&program, "Main", vec![], None, true));

    let string = table.type_token(&BUILTINS.string);
    let method = table.method_token(&main);
    let object = table.type_token(&BUILTINS.object);
    assert_eq!(string, MetadataToken::new(TYPE_DEF_TABLE, 1));
    assert_eq!(object, MetadataToken::new(TYPE_DEF_TABLE, 2));
    assert_eq!(method, MetadataToken::new(METHOD_DEF_TABLE, 1));
    assert_eq!(table.type_token(&BUILTINS.string), string);
    assert_eq!(table.string_token("hi").table(), USER_STRING_TABLE);
    assert_eq!(table.len(), 4);
  }

  #[test]
  fn tokens_resolve_back_to_symbols() {
    let mut table = SymbolTable::new();
    let token = table.member_token(&Member::Type(BUILTINS.int32.clone()));
    assert_eq!(table.get_symbol(token), Some(&Symbol::Type(DefaultAtom::from("int32"))));
    assert_eq!(table.get_symbol(MetadataToken::new(FIELD_TABLE, 1)), None);
  }

  #[test]
  fn explicit_bindings_do_not_overwrite() {
    let mut table = SymbolTable::new();
    let token = MetadataToken::new(FIELD_TABLE, 7);
    let symbol = Symbol::Field(DefaultAtom::from("Point::X"));
    table.insert(symbol.clone(), token).unwrap();
    assert!(table.insert(Symbol::Field(DefaultAtom::from("Point::Y")), token).is_err());
    assert!(table.insert(symbol, MetadataToken::new(FIELD_TABLE, 8)).is_err());
    // Interning continues after the highest explicit row.
    let next = table.intern(Symbol::Field(DefaultAtom::from("Point::Z")));
    assert_eq!(next, MetadataToken::new(FIELD_TABLE, 8));
  }
}
