// Copyright © 2024 Nathaniel Hardesty
//
// Permission is hereby granted, free of charge, to any person obtaining a copy
// of this software and associated documentation files (the “Software”), to
// deal in the Software without restriction, including without limitation the
// rights to use, copy, modify, merge, publish, distribute, sublicense, and/or
// sell copies of the Software, and to permit persons to whom the Software is
// furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in
// all copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED “AS IS”, WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING
// FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS
// IN THE SOFTWARE.

//! # SCHEMA
//! **Based on SEMI E5§9.6**
//!
//! ---------------------------------------------------------------------------
//!
//! The type algebra used to describe what the body of a message is allowed to
//! look like, without constructing it.
//!
//! Data items such as COMMACK or SVID are not distinct types: each is an
//! immutable [Data Item Schema] record naming the item, the [Item] formats it
//! accepts, and an optional size bound. A [Body Schema] composes these
//! records into the recursive shape of a full message body, and validation
//! is a structural walk of an [Item] tree against that shape.
//!
//! Validation runs identically on the send path (before encoding) and the
//! receive path (after decoding).
//!
//! [Item]:             crate::Item
//! [Data Item Schema]: DataItemSchema
//! [Body Schema]:      BodySchema

use crate::{Error, Item};

/// ## ITEM KIND
///
/// One discriminant per [Item] format, used where a format must be named
/// without carrying values.
///
/// [Item]: crate::Item
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ItemKind {
  List,
  Ascii,
  Jis8,
  Bin,
  Bool,
  I1,
  I2,
  I4,
  I8,
  U1,
  U2,
  U4,
  U8,
  F4,
  F8,
}
impl ItemKind {
  /// ### KIND OF ITEM
  pub fn of(item: &Item) -> ItemKind {
    match item {
      Item::List(_) => ItemKind::List,
      Item::Ascii(_) => ItemKind::Ascii,
      Item::Jis8(_) => ItemKind::Jis8,
      Item::Bin(_) => ItemKind::Bin,
      Item::Bool(_) => ItemKind::Bool,
      Item::I1(_) => ItemKind::I1,
      Item::I2(_) => ItemKind::I2,
      Item::I4(_) => ItemKind::I4,
      Item::I8(_) => ItemKind::I8,
      Item::U1(_) => ItemKind::U1,
      Item::U2(_) => ItemKind::U2,
      Item::U4(_) => ItemKind::U4,
      Item::U8(_) => ItemKind::U8,
      Item::F4(_) => ItemKind::F4,
      Item::F8(_) => ItemKind::F8,
    }
  }

  /// ### KIND NAME
  pub const fn name(self) -> &'static str {
    match self {
      ItemKind::List => "List",
      ItemKind::Ascii => "Ascii",
      ItemKind::Jis8 => "Jis8",
      ItemKind::Bin => "Bin",
      ItemKind::Bool => "Bool",
      ItemKind::I1 => "I1",
      ItemKind::I2 => "I2",
      ItemKind::I4 => "I4",
      ItemKind::I8 => "I8",
      ItemKind::U1 => "U1",
      ItemKind::U2 => "U2",
      ItemKind::U4 => "U4",
      ItemKind::U8 => "U8",
      ItemKind::F4 => "F4",
      ItemKind::F8 => "F8",
    }
  }
}

/// ### ANY INTEGER
///
/// The format set accepted by items the standard defines as "any integer
/// format", such as SVID or CEID.
pub const ANY_INTEGER: &[ItemKind] = &[
  ItemKind::I1,
  ItemKind::I2,
  ItemKind::I4,
  ItemKind::I8,
  ItemKind::U1,
  ItemKind::U2,
  ItemKind::U4,
  ItemKind::U8,
];

/// ## DATA ITEM SCHEMA
///
/// An immutable record describing a named data item: the formats it accepts
/// and the maximum member count it permits. The registry holds one of these
/// per catalogue entry; nothing in the stack subclasses or specializes them.
#[derive(Clone, Copy, Debug)]
pub struct DataItemSchema {
  /// ### ITEM NAME
  ///
  /// The catalogue name, such as "COMMACK".
  pub name: &'static str,

  /// ### ACCEPTED FORMATS
  pub kinds: &'static [ItemKind],

  /// ### MAXIMUM MEMBER COUNT
  ///
  /// [None] leaves the count unbounded.
  pub max_len: Option<usize>,
}
impl DataItemSchema {
  /// ### NEW DATA ITEM SCHEMA
  pub const fn new(
    name: &'static str,
    kinds: &'static [ItemKind],
    max_len: Option<usize>,
  ) -> Self {
    Self { name, kinds, max_len }
  }

  /// ### VALIDATE ITEM
  ///
  /// Checks an item against this record: the format must be one of the
  /// accepted kinds and the member count must stay within the bound.
  pub fn validate(&self, item: &Item) -> Result<(), Error> {
    let kind = ItemKind::of(item);
    if !self.kinds.contains(&kind) {
      return Err(Error::SchemaViolation(format!(
        "{} does not accept format {}",
        self.name,
        kind.name(),
      )))
    }
    if let Some(max_len) = self.max_len {
      if item.len() > max_len {
        return Err(Error::SchemaViolation(format!(
          "{} holds {} members, at most {} permitted",
          self.name,
          item.len(),
          max_len,
        )))
      }
    }
    Ok(())
  }
}

/// ## BODY SCHEMA
///
/// The recursive shape of a message body, in the same type algebra as the
/// item codec.
#[derive(Clone, Copy, Debug)]
pub enum BodySchema {
  /// ### NO BODY
  ///
  /// The message is header-only.
  Empty,

  /// ### SINGLE DATA ITEM
  Item(&'static DataItemSchema),

  /// ### FIXED LIST
  ///
  /// A list of exactly these elements, in order.
  List(&'static [BodySchema]),

  /// ### VARIABLE LIST
  ///
  /// A list of any number of elements, each matching the same shape.
  VarList(&'static BodySchema),

  /// ### OPTIONAL LIST
  ///
  /// Either a list of exactly these elements or a zero-length list. Several
  /// functions use the zero-length form to mean "all" or "nothing to
  /// report".
  OptionList(&'static [BodySchema]),

  /// ### UNCONSTRAINED
  ///
  /// Any body, or none. Used for functions whose contents are defined by
  /// the application.
  Any,
}
impl BodySchema {
  /// ### VALIDATE BODY
  ///
  /// Checks an optional message body against this shape. The same check
  /// runs before a body is encoded and after one is decoded.
  pub fn validate(&self, text: Option<&Item>) -> Result<(), Error> {
    match (self, text) {
      (BodySchema::Any, _) => Ok(()),
      (BodySchema::Empty, None) => Ok(()),
      (BodySchema::Empty, Some(_)) => {
        Err(Error::SchemaViolation("body present on a header-only function".into()))
      }
      (_, None) => Err(Error::SchemaViolation("body missing".into())),
      (schema, Some(item)) => schema.validate_item(item),
    }
  }

  /// ### VALIDATE ITEM
  fn validate_item(&self, item: &Item) -> Result<(), Error> {
    match self {
      BodySchema::Any => Ok(()),
      BodySchema::Empty => Err(Error::SchemaViolation("unexpected item on a header-only function".into())),
      BodySchema::Item(data_item) => data_item.validate(item),
      BodySchema::List(elements) => match item {
        Item::List(children) => {
          if children.len() != elements.len() {
            return Err(Error::SchemaViolation(format!(
              "list holds {} elements, exactly {} expected",
              children.len(),
              elements.len(),
            )))
          }
          for (child, element) in children.iter().zip(elements.iter()) {
            element.validate_item(child)?;
          }
          Ok(())
        }
        other => Err(Error::SchemaViolation(format!(
          "expected a list, found {}",
          ItemKind::of(other).name(),
        ))),
      },
      BodySchema::VarList(element) => match item {
        Item::List(children) => {
          for child in children {
            element.validate_item(child)?;
          }
          Ok(())
        }
        other => Err(Error::SchemaViolation(format!(
          "expected a list, found {}",
          ItemKind::of(other).name(),
        ))),
      },
      BodySchema::OptionList(elements) => match item {
        Item::List(children) if children.is_empty() => Ok(()),
        _ => BodySchema::List(elements).validate_item(item),
      },
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::items;

  #[test]
  fn data_item_format_and_size() {
    assert!(items::COMMACK.validate(&Item::bin(0)).is_ok());
    assert!(items::COMMACK.validate(&Item::u1(0)).is_err());
    assert!(items::COMMACK.validate(&Item::Bin(vec![0, 1])).is_err());
    assert!(items::MDLN.validate(&Item::ascii("model-x").unwrap()).is_ok());
    assert!(items::MDLN.validate(&Item::ascii("123456789012345678901").unwrap()).is_err());
  }

  #[test]
  fn fixed_list_shape() {
    static SHAPE: &[BodySchema] = &[
      BodySchema::Item(&items::MDLN),
      BodySchema::Item(&items::SOFTREV),
    ];
    let schema = BodySchema::List(SHAPE);
    let good = Item::List(vec![
      Item::ascii("model").unwrap(),
      Item::ascii("1.0").unwrap(),
    ]);
    assert!(schema.validate(Some(&good)).is_ok());
    assert!(schema.validate(Some(&Item::empty_list())).is_err());
    assert!(schema.validate(Some(&Item::u1(0))).is_err());
    assert!(schema.validate(None).is_err());
  }

  #[test]
  fn optional_list_accepts_zero_length() {
    static SHAPE: &[BodySchema] = &[BodySchema::Item(&items::MDLN)];
    let schema = BodySchema::OptionList(SHAPE);
    assert!(schema.validate(Some(&Item::empty_list())).is_ok());
    assert!(schema
      .validate(Some(&Item::List(vec![Item::ascii("m").unwrap()])))
      .is_ok());
    assert!(schema.validate(Some(&Item::u1(0))).is_err());
  }

  #[test]
  fn var_list_checks_each_element() {
    static ELEMENT: BodySchema = BodySchema::Item(&items::SVID);
    let schema = BodySchema::VarList(&ELEMENT);
    assert!(schema.validate(Some(&Item::empty_list())).is_ok());
    assert!(schema
      .validate(Some(&Item::List(vec![Item::u4(1), Item::u4(2)])))
      .is_ok());
    assert!(schema
      .validate(Some(&Item::List(vec![Item::u4(1), Item::ascii("x").unwrap()])))
      .is_err());
  }

  #[test]
  fn empty_schema_forbids_body() {
    assert!(BodySchema::Empty.validate(None).is_ok());
    assert!(BodySchema::Empty.validate(Some(&Item::empty_list())).is_err());
  }
}
