/*!
  The opcode catalog: a table of every `OpcodeDescriptor`, indexed by numeric opcode value,
  built once on first use and never mutated afterwards.

  One byte codes index `one_byte` directly. Two byte codes, `0xFE` followed by a second byte,
  index `two_byte` by their second byte.
*/

use std::str::FromStr;

use lazy_static::lazy_static;
use strum::IntoEnumIterator;

use super::opcode::{describe, Opcode, OpcodeDescriptor, TWO_BYTE_ESCAPE};

pub struct Catalog {
  one_byte   : Vec<Option<OpcodeDescriptor>>,
  two_byte   : Vec<Option<OpcodeDescriptor>>,
  /// Values claimed by more than one opcode while building. Always empty for a correct table.
  collisions : Vec<u16>,
}

impl Catalog {

  fn build() -> Catalog {
    let mut catalog = Catalog {
      one_byte   : vec![None; 256],
      two_byte   : vec![None; 256],
      collisions : Vec::new(),
    };

    for opcode in Opcode::iter() {
      let value = opcode.value();
      let slot =
        match value >> 8 {
          0 => &mut catalog.one_byte[value as usize],
          high if high == TWO_BYTE_ESCAPE as u16 => &mut catalog.two_byte[(value & 0xFF) as usize],
          _ => {
            catalog.collisions.push(value);
            continue;
          }
        };
      if slot.is_some() {
        catalog.collisions.push(value);
      }
      *slot = Some(describe(opcode));
    }

    catalog
  }

  /// Resolves a numeric opcode value. Unassigned values give `None`.
  pub fn lookup(&self, value: u16) -> Option<&OpcodeDescriptor> {
    match value >> 8 {
      0 => self.one_byte[value as usize].as_ref(),
      high if high == TWO_BYTE_ESCAPE as u16 => self.two_byte[(value & 0xFF) as usize].as_ref(),
      _ => None
    }
  }

  /// Resolves a one byte opcode.
  pub fn lookup_byte(&self, byte: u8) -> Option<&OpcodeDescriptor> {
    self.one_byte[byte as usize].as_ref()
  }

  /// Resolves the second byte of a two byte opcode.
  pub fn lookup_escaped(&self, second: u8) -> Option<&OpcodeDescriptor> {
    self.two_byte[second as usize].as_ref()
  }

  /// Resolves an ILasm mnemonic such as `ldc.i4.s`.
  pub fn lookup_name(&self, name: &str) -> Option<&OpcodeDescriptor> {
    Opcode::from_str(name).ok().and_then(|opcode| self.lookup(opcode.value()))
  }

  /// Every descriptor in numeric order.
  pub fn iter(&self) -> impl Iterator<Item = &OpcodeDescriptor> {
    self.one_byte.iter().chain(self.two_byte.iter()).filter_map(Option::as_ref)
  }

  pub fn len(&self) -> usize {
    self.iter().count()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  pub fn collisions(&self) -> &[u16] {
    &self.collisions
  }
}

lazy_static! {
  pub static ref CATALOG: Catalog = Catalog::build();
}

/// Resolves a numeric opcode value, one byte or `0xFE`-prefixed two byte.
pub fn lookup(value: u16) -> Option<&'static OpcodeDescriptor> {
  CATALOG.lookup(value)
}

pub(crate) fn descriptor(opcode: Opcode) -> &'static OpcodeDescriptor {
  match CATALOG.lookup(opcode.value()) {
    Some(descriptor) => descriptor,
    // Every opcode is inserted by `Catalog::build`.
    None => unreachable!("Error: opcode {} is missing from the catalog.", opcode)
  }
}


#[cfg(test)]
mod tests {
  use super::*;
  use crate::bytecode::category::{Category, BranchKind};
  use crate::bytecode::operand::OperandKind;

  #[test]
  fn every_opcode_has_exactly_one_entry() {
    assert!(CATALOG.collisions().is_empty(), "colliding values: {:?}", CATALOG.collisions());
    assert_eq!(CATALOG.len(), Opcode::iter().count());
    for opcode in Opcode::iter() {
      assert_eq!(lookup(opcode.value()).map(|d| d.opcode), Some(opcode));
    }
  }

  #[test]
  fn code_spaces_are_disjoint() {
    assert_eq!(lookup(0x01).map(|d| d.opcode), Some(Opcode::Break));
    assert_eq!(lookup(0xFE01).map(|d| d.opcode), Some(Opcode::Ceq));
    assert_eq!(CATALOG.lookup_escaped(0x01).map(|d| d.opcode), Some(Opcode::Ceq));
    assert_eq!(CATALOG.lookup_byte(0xFE).map(|d| d.opcode), None);
  }

  #[test]
  fn unassigned_codes_resolve_to_nothing() {
    assert!(lookup(0x24).is_none());
    assert!(lookup(0xA6).is_none());
    assert!(lookup(0xFE08).is_none());
    assert!(lookup(0xFE1F).is_none());
    assert!(lookup(0x1234).is_none());
  }

  #[test]
  fn descriptors_agree_with_their_operands() {
    for d in CATALOG.iter() {
      if let Category::Branch(info) = d.category {
        let expected = match (info.kind, info.short_form) {
          (BranchKind::Switch, _) => OperandKind::InlineSwitch,
          (_, true)               => OperandKind::ShortInlineBrTarget,
          (_, false)              => OperandKind::InlineBrTarget,
        };
        assert_eq!(d.operand, expected, "{}", d);
      }
      if d.pop.is_none() || d.push.is_none() {
        assert!(
          matches!(d.category, Category::Call(_) | Category::Branch(_) | Category::Other),
          "unexpected variable stack behavior: {}", d
        );
      }
    }
  }

  #[test]
  fn lookup_by_name() {
    let descriptor = CATALOG.lookup_name("ldc.i4.s");
    assert_eq!(descriptor.map(|d| (d.opcode, d.operand)), Some((Opcode::LdcI4S, OperandKind::ShortInlineI)));
    assert!(CATALOG.lookup_name("frobnicate").is_none());
  }
}
