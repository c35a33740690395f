//! # SECS-II MESSAGE CONTENT
//! **Based on:**
//! - **[SEMI E5]-0712**
//!
//! ---------------------------------------------------------------------------
//!
//! [SECS-II] is a Presentation Protocol designed to facilitate a common
//! communications language between semiconductor equipment, particularly as
//! understood by the GEM ([SEMI E30]) Application Protocol
//! (together known as SECS/GEM). The usual Session Protocol for transporting
//! [SECS-II] messages over TCP/IP is HSMS ([SEMI E37]).
//!
//! This crate provides:
//!
//! - The self-describing binary [Item] tree and its codec.
//! - The [Message] structure pairing a [Stream] and [Function] with a body.
//! - The [Schema] algebra used to describe and check message bodies, with
//!   data items held as immutable schema records rather than distinct types.
//! - The [Function Registry] cataloguing the message subset required by GEM.
//!
//! ---------------------------------------------------------------------------
//!
//! ## REFERENCED STANDARDS
//!
//! - SEMI E30       - Generic Model for Communications and Control of Manufacturing Equipment (GEM)
//! - SEMI E37       - High-Speed SECS Message Services (HSMS) Generic Services
//! - ANSI X3.4-1977 - Code for Information Interchange (ASCII)
//! - IEEE 754       - Standards for Binary Floating Point Arithmetic
//! - JIS-6226       - JIS 8-bit Coded Character Set for Information Exchange
//!
//! [SEMI E5]:  https://store-us.semi.org/products/e00500-semi-e5-specification-for-semi-equipment-communications-standard-2-message-content-secs-ii
//! [SEMI E30]: https://store-us.semi.org/products/e03000-semi-e30-specification-for-the-generic-model-for-communications-and-control-of-manufacturing-equipment-gem
//! [SEMI E37]: https://store-us.semi.org/products/e03700-semi-e37-high-speed-secs-message-services-hsms-generic-services
//!
//! [SECS-II]:           crate
//! [Item]:              Item
//! [Message]:           Message
//! [Stream]:            Message::stream
//! [Function]:          Message::function
//! [Schema]:            schema
//! [Function Registry]: registry::FunctionRegistry

#![allow(clippy::unusual_byte_groupings)]

pub mod codes;
pub mod format;
pub mod items;
pub mod registry;
pub mod schema;

mod message;
pub use message::Message;

use encoding::{all::ISO_2022_JP, Encoding};
use thiserror::Error;

/// ## CODEC ERROR
///
/// Represents a failure to decode binary data into an [Item], to encode a
/// string into its wire code page, or to match an [Item] against an expected
/// [Body Schema].
///
/// Encoding an [Item] which was constructed through the checked constructors
/// never fails.
///
/// [Item]:        Item
/// [Body Schema]: schema::BodySchema
#[derive(Clone, Debug, PartialEq, Error)]
pub enum Error {
  /// ### BAD FORMAT CODE
  ///
  /// The upper 6 bits of an item header do not name a known format, or the
  /// lower 2 bits declare zero length bytes.
  #[error("format byte {0:#010b} does not describe a valid item")]
  BadFormatCode(u8),

  /// ### TRUNCATED ITEM
  ///
  /// The declared item length runs past the end of the available data.
  #[error("item length exceeds the remaining buffer")]
  TruncatedItem,

  /// ### INVALID LENGTH
  ///
  /// The declared byte length is not a whole multiple of the format's value
  /// width.
  #[error("byte length {length} is not valid for format {format:#04o}")]
  InvalidLength {
    format: u8,
    length: usize,
  },

  /// ### TRAILING BYTES
  ///
  /// Data remained in the buffer after the root item was fully decoded.
  #[error("{0} bytes left over after the root item")]
  TrailingBytes(usize),

  /// ### ENCODING ERROR
  ///
  /// String bytes fall outside the permitted code page: an ASCII item held a
  /// byte above 0x7F, or a JIS-8 item could not be mapped through ISO-2022-JP.
  #[error("string bytes outside the permitted code page")]
  EncodingError,

  /// ### SCHEMA VIOLATION
  ///
  /// A decoded or to-be-encoded item does not conform to the body schema
  /// expected for its function.
  #[error("body does not match schema: {0}")]
  SchemaViolation(String),

  /// ### VALUE OUT OF RANGE
  ///
  /// A field value does not fit the range its position implies, such as a
  /// stream number of 128 or above.
  #[error("value out of range for {0}")]
  ValueOutOfRange(&'static str),
}

/// ## GENERIC ITEM
/// **Based on SEMI E5§9**
///
/// An [Item] is an information packet which has a length defined by the first
/// 2, 3, or 4 bytes.
///
/// These first bytes are called the Item Header. The Item Header consists of
/// the Format Byte and the Length Bytes.
///
/// - Bits 1 to 2 of the Item Header tell how many of the following bytes
///   refer to the length of the item.
/// - The Item Length refers to the number of bytes following the Item Header,
///   called the Item Body, which is the actual data of the item. For a
///   [List], and only for a [List], it refers instead to the number of
///   [Item]s the list contains.
/// - Bits 3 to 8 of the Item Header define the format of the data which
///   follows.
///
/// [List]: Item::List
/// [Item]: Item
#[derive(Clone, Debug, PartialEq)]
pub enum Item {
  /// ### LIST
  /// **Based on SEMI E5§9.3**
  ///
  /// An ordered set of elements, where elements are [Item]s.
  ///
  /// The Item Header of a List is unique in that the Item Length refers to
  /// the length of the List in the number of [Item]s it contains, rather
  /// than the number of bytes.
  List(Vec<Item>),

  /// ### ASCII
  /// **Based on SEMI E5§9.2.2**
  ///
  /// ASCII character string. Each byte must stay within the 7-bit range;
  /// the checked [ASCII Constructor] and the decoder both enforce this.
  ///
  /// [ASCII Constructor]: Item::ascii
  Ascii(Vec<u8>),

  /// ### JIS-8
  /// **Based on SEMI E5§9.2.2**
  ///
  /// JIS-8 character string, carried on the wire as ISO-2022-JP.
  Jis8(String),

  /// ### BINARY
  /// **Based on SEMI E5§9.2.2**
  ///
  /// Single-byte quantity where the value can be anything and does not
  /// otherwise have a strictly defined meaning.
  Bin(Vec<u8>),

  /// ### BOOLEAN
  /// **Based on SEMI E5§9.2.2**
  ///
  /// Single-byte quantity where a value of 0 is equivalent to 'false' and any
  /// non-zero value is equivalent to 'true'.
  Bool(Vec<bool>),

  /// ### 1-BYTE SIGNED INTEGER
  /// **Based on SEMI E5§9.2.2**
  I1(Vec<i8>),

  /// ### 2-BYTE SIGNED INTEGER
  /// **Based on SEMI E5§9.2.2**
  I2(Vec<i16>),

  /// ### 4-BYTE SIGNED INTEGER
  /// **Based on SEMI E5§9.2.2**
  I4(Vec<i32>),

  /// ### 8-BYTE SIGNED INTEGER
  /// **Based on SEMI E5§9.2.2**
  I8(Vec<i64>),

  /// ### 1-BYTE UNSIGNED INTEGER
  /// **Based on SEMI E5§9.2.2**
  U1(Vec<u8>),

  /// ### 2-BYTE UNSIGNED INTEGER
  /// **Based on SEMI E5§9.2.2**
  U2(Vec<u16>),

  /// ### 4-BYTE UNSIGNED INTEGER
  /// **Based on SEMI E5§9.2.2**
  U4(Vec<u32>),

  /// ### 8-BYTE UNSIGNED INTEGER
  /// **Based on SEMI E5§9.2.2**
  U8(Vec<u64>),

  /// ### 4-BYTE FLOATING POINT NUMBER
  /// **Based on SEMI E5§9.2.2**
  F4(Vec<f32>),

  /// ### 8-BYTE FLOATING POINT NUMBER
  /// **Based on SEMI E5§9.2.2**
  F8(Vec<f64>),
}

/// ## SINGLE-VALUE CONSTRUCTORS
///
/// Constructs items with a single member, provided for convenient syntax of
/// this common use case.
impl Item {
  /// ### SINGLE BINARY ITEM
  pub fn bin(value: u8) -> Self {
    Self::Bin(vec![value])
  }

  /// ### SINGLE BOOLEAN ITEM
  pub fn bool(value: bool) -> Self {
    Self::Bool(vec![value])
  }

  /// ### SINGLE 1-BYTE SIGNED INTEGER ITEM
  pub fn i1(value: i8) -> Self {
    Self::I1(vec![value])
  }

  /// ### SINGLE 2-BYTE SIGNED INTEGER ITEM
  pub fn i2(value: i16) -> Self {
    Self::I2(vec![value])
  }

  /// ### SINGLE 4-BYTE SIGNED INTEGER ITEM
  pub fn i4(value: i32) -> Self {
    Self::I4(vec![value])
  }

  /// ### SINGLE 8-BYTE SIGNED INTEGER ITEM
  pub fn i8(value: i64) -> Self {
    Self::I8(vec![value])
  }

  /// ### SINGLE 1-BYTE UNSIGNED INTEGER ITEM
  pub fn u1(value: u8) -> Self {
    Self::U1(vec![value])
  }

  /// ### SINGLE 2-BYTE UNSIGNED INTEGER ITEM
  pub fn u2(value: u16) -> Self {
    Self::U2(vec![value])
  }

  /// ### SINGLE 4-BYTE UNSIGNED INTEGER ITEM
  pub fn u4(value: u32) -> Self {
    Self::U4(vec![value])
  }

  /// ### SINGLE 8-BYTE UNSIGNED INTEGER ITEM
  pub fn u8(value: u64) -> Self {
    Self::U8(vec![value])
  }

  /// ### SINGLE 4-BYTE FLOATING POINT NUMBER ITEM
  pub fn f4(value: f32) -> Self {
    Self::F4(vec![value])
  }

  /// ### SINGLE 8-BYTE FLOATING POINT NUMBER ITEM
  pub fn f8(value: f64) -> Self {
    Self::F8(vec![value])
  }

  /// ### CHECKED ASCII ITEM
  ///
  /// Constructs an [ASCII] item from a string, rejecting any character
  /// outside the 7-bit range with an [Encoding Error].
  ///
  /// [ASCII]:          Item::Ascii
  /// [Encoding Error]: Error::EncodingError
  pub fn ascii(value: &str) -> Result<Self, Error> {
    if value.bytes().any(|byte| byte > 0x7F) {
      return Err(Error::EncodingError)
    }
    Ok(Self::Ascii(value.bytes().collect()))
  }

  /// ### EMPTY LIST ITEM
  pub fn empty_list() -> Self {
    Self::List(vec![])
  }
}

/// ## INSPECTION
impl Item {
  /// ### MEMBER COUNT
  ///
  /// The number of members in the item: child items for a [List], values for
  /// every other format.
  ///
  /// [List]: Item::List
  pub fn len(&self) -> usize {
    match self {
      Item::List(vec) => vec.len(),
      Item::Ascii(vec) => vec.len(),
      Item::Jis8(string) => string.len(),
      Item::Bin(vec) => vec.len(),
      Item::Bool(vec) => vec.len(),
      Item::I1(vec) => vec.len(),
      Item::I2(vec) => vec.len(),
      Item::I4(vec) => vec.len(),
      Item::I8(vec) => vec.len(),
      Item::U1(vec) => vec.len(),
      Item::U2(vec) => vec.len(),
      Item::U4(vec) => vec.len(),
      Item::U8(vec) => vec.len(),
      Item::F4(vec) => vec.len(),
      Item::F8(vec) => vec.len(),
    }
  }

  /// ### IS EMPTY
  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// ### ASCII TEXT
  ///
  /// Reads an [ASCII] item back out as a string slice.
  ///
  /// [ASCII]: Item::Ascii
  pub fn as_ascii(&self) -> Option<&str> {
    match self {
      // Construction and decoding both guarantee 7-bit bytes, which are
      // always valid UTF-8.
      Item::Ascii(vec) => std::str::from_utf8(vec).ok(),
      _ => None,
    }
  }
}

/// ## ITEM HEADER
///
/// Appends a format byte and the smallest workable number of length bytes.
/// Item lengths above what 3 length bytes can express do not occur within
/// the message sizes HSMS permits.
fn push_item_header(vec: &mut Vec<u8>, format: u8, length: usize) {
  if length < 256 {
    vec.push(format | 1);
    vec.push(length as u8);
  } else if length < 65536 {
    vec.push(format | 2);
    vec.extend_from_slice(&(length as u16).to_be_bytes());
  } else {
    vec.push(format | 3);
    vec.extend_from_slice(&(length as u32).to_be_bytes()[1..4]);
  }
}

impl From<&Item> for Vec<u8> {
  /// ### ITEM -> BINARY DATA
  ///
  /// Encoding is infallible for items built through the checked
  /// constructors. Multi-byte values are serialized big-endian.
  fn from(item: &Item) -> Self {
    let mut vec = vec![];
    encode_into(item, &mut vec);
    vec
  }
}
impl From<Item> for Vec<u8> {
  /// ### ITEM -> BINARY DATA
  fn from(item: Item) -> Self {
    Vec::<u8>::from(&item)
  }
}

/// ## INTERNAL ENCODER
///
/// Recursively serializes an item into the provided buffer. Note the length
/// field contract: a [List] header counts elements, every other format
/// counts body bytes.
///
/// [List]: Item::List
fn encode_into(item: &Item, vec: &mut Vec<u8>) {
  match item {
    Item::List(item_vec) => {
      push_item_header(vec, format::LIST, item_vec.len());
      for child in item_vec {
        encode_into(child, vec);
      }
    }
    Item::Ascii(ascii_vec) => {
      push_item_header(vec, format::ASCII, ascii_vec.len());
      vec.extend_from_slice(ascii_vec);
    }
    Item::Jis8(jis8_string) => {
      // The ISO-2022-JP encoder ignores unmappable characters rather than
      // failing, keeping the encode path infallible.
      let encoded = ISO_2022_JP
        .encode(jis8_string, encoding::EncoderTrap::Ignore)
        .unwrap_or_default();
      push_item_header(vec, format::JIS8, encoded.len());
      vec.extend_from_slice(&encoded);
    }
    Item::Bin(bin_vec) => {
      push_item_header(vec, format::BIN, bin_vec.len());
      vec.extend_from_slice(bin_vec);
    }
    Item::Bool(bool_vec) => {
      push_item_header(vec, format::BOOL, bool_vec.len());
      for value in bool_vec {
        vec.push(*value as u8);
      }
    }
    Item::I1(i1_vec) => {
      push_item_header(vec, format::I1, i1_vec.len());
      for value in i1_vec {
        vec.extend_from_slice(&value.to_be_bytes());
      }
    }
    Item::I2(i2_vec) => {
      push_item_header(vec, format::I2, i2_vec.len() * 2);
      for value in i2_vec {
        vec.extend_from_slice(&value.to_be_bytes());
      }
    }
    Item::I4(i4_vec) => {
      push_item_header(vec, format::I4, i4_vec.len() * 4);
      for value in i4_vec {
        vec.extend_from_slice(&value.to_be_bytes());
      }
    }
    Item::I8(i8_vec) => {
      push_item_header(vec, format::I8, i8_vec.len() * 8);
      for value in i8_vec {
        vec.extend_from_slice(&value.to_be_bytes());
      }
    }
    Item::U1(u1_vec) => {
      push_item_header(vec, format::U1, u1_vec.len());
      vec.extend_from_slice(u1_vec);
    }
    Item::U2(u2_vec) => {
      push_item_header(vec, format::U2, u2_vec.len() * 2);
      for value in u2_vec {
        vec.extend_from_slice(&value.to_be_bytes());
      }
    }
    Item::U4(u4_vec) => {
      push_item_header(vec, format::U4, u4_vec.len() * 4);
      for value in u4_vec {
        vec.extend_from_slice(&value.to_be_bytes());
      }
    }
    Item::U8(u8_vec) => {
      push_item_header(vec, format::U8, u8_vec.len() * 8);
      for value in u8_vec {
        vec.extend_from_slice(&value.to_be_bytes());
      }
    }
    Item::F4(f4_vec) => {
      push_item_header(vec, format::F4, f4_vec.len() * 4);
      for value in f4_vec {
        vec.extend_from_slice(&value.to_be_bytes());
      }
    }
    Item::F8(f8_vec) => {
      push_item_header(vec, format::F8, f8_vec.len() * 8);
      for value in f8_vec {
        vec.extend_from_slice(&value.to_be_bytes());
      }
    }
  }
}

/// ## DECODING
impl Item {
  /// ### BINARY DATA -> ITEM
  ///
  /// Decodes a buffer holding exactly one item. Data left over after the
  /// root item is an error, as is an item whose declared length runs past
  /// the end of the buffer.
  pub fn decode(bytes: &[u8]) -> Result<Item, Error> {
    let mut cursor: usize = 0;
    let item = Self::decode_at(bytes, &mut cursor)?;
    if cursor != bytes.len() {
      return Err(Error::TrailingBytes(bytes.len() - cursor))
    }
    Ok(item)
  }

  /// ### INTERNAL DECODER
  ///
  /// Decodes one item starting at the cursor, advancing it past the consumed
  /// bytes, recursing for [List] children.
  ///
  /// The decoder must branch on the format code before interpreting the
  /// length field: a [List] length counts elements, every other format
  /// counts body bytes.
  ///
  /// [List]: Item::List
  fn decode_at(bytes: &[u8], cursor: &mut usize) -> Result<Item, Error> {
    // FORMAT BYTE
    let format_byte = *bytes.get(*cursor).ok_or(Error::TruncatedItem)?;
    *cursor += 1;
    let format = format_byte & 0b111111_00;
    let length_bytes = (format_byte & 0b000000_11) as usize;
    if length_bytes == 0 {
      return Err(Error::BadFormatCode(format_byte))
    }

    // LENGTH BYTES
    let length: usize = {
      let end = *cursor + length_bytes;
      let slice = bytes.get(*cursor..end).ok_or(Error::TruncatedItem)?;
      *cursor = end;
      let mut value: usize = 0;
      for byte in slice {
        value = (value << 8) | *byte as usize;
      }
      value
    };

    // ITEM BODY
    match format {
      format::LIST => {
        let mut vec: Vec<Item> = Vec::with_capacity(length.min(1024));
        for _ in 0..length {
          vec.push(Self::decode_at(bytes, cursor)?);
        }
        Ok(Item::List(vec))
      }
      format::ASCII => {
        let body = take(bytes, cursor, length)?;
        if body.iter().any(|byte| *byte > 0x7F) {
          return Err(Error::EncodingError)
        }
        Ok(Item::Ascii(body.to_vec()))
      }
      format::JIS8 => {
        let body = take(bytes, cursor, length)?;
        let string = ISO_2022_JP
          .decode(body, encoding::DecoderTrap::Strict)
          .map_err(|_| Error::EncodingError)?;
        Ok(Item::Jis8(string))
      }
      format::BIN => Ok(Item::Bin(take(bytes, cursor, length)?.to_vec())),
      format::BOOL => {
        let body = take(bytes, cursor, length)?;
        Ok(Item::Bool(body.iter().map(|byte| *byte > 0).collect()))
      }
      format::I1 => {
        let body = take(bytes, cursor, length)?;
        Ok(Item::I1(body.iter().map(|byte| *byte as i8).collect()))
      }
      format::I2 => Ok(Item::I2(decode_values(format, take(bytes, cursor, length)?, i16::from_be_bytes)?)),
      format::I4 => Ok(Item::I4(decode_values(format, take(bytes, cursor, length)?, i32::from_be_bytes)?)),
      format::I8 => Ok(Item::I8(decode_values(format, take(bytes, cursor, length)?, i64::from_be_bytes)?)),
      format::U1 => Ok(Item::U1(take(bytes, cursor, length)?.to_vec())),
      format::U2 => Ok(Item::U2(decode_values(format, take(bytes, cursor, length)?, u16::from_be_bytes)?)),
      format::U4 => Ok(Item::U4(decode_values(format, take(bytes, cursor, length)?, u32::from_be_bytes)?)),
      format::U8 => Ok(Item::U8(decode_values(format, take(bytes, cursor, length)?, u64::from_be_bytes)?)),
      format::F4 => Ok(Item::F4(decode_values(format, take(bytes, cursor, length)?, f32::from_be_bytes)?)),
      format::F8 => Ok(Item::F8(decode_values(format, take(bytes, cursor, length)?, f64::from_be_bytes)?)),
      _ => Err(Error::BadFormatCode(format_byte)),
    }
  }
}

/// ## BODY SLICE
///
/// Takes the declared number of body bytes, advancing the cursor.
fn take<'a>(bytes: &'a [u8], cursor: &mut usize, length: usize) -> Result<&'a [u8], Error> {
  let end = cursor.checked_add(length).ok_or(Error::TruncatedItem)?;
  let slice = bytes.get(*cursor..end).ok_or(Error::TruncatedItem)?;
  *cursor = end;
  Ok(slice)
}

/// ## FIXED-WIDTH VALUE VECTOR
///
/// Splits a body into N-byte big-endian values, rejecting bodies whose
/// length is not a whole multiple of the value width.
fn decode_values<const N: usize, T>(
  format: u8,
  body: &[u8],
  convert: fn([u8; N]) -> T,
) -> Result<Vec<T>, Error> {
  if body.len() % N != 0 {
    return Err(Error::InvalidLength { format, length: body.len() })
  }
  Ok(
    body
      .chunks_exact(N)
      .map(|chunk| {
        let mut array = [0u8; N];
        array.copy_from_slice(chunk);
        convert(array)
      })
      .collect(),
  )
}

#[cfg(test)]
mod tests {
  use super::*;

  fn roundtrip(item: Item) {
    let bytes: Vec<u8> = (&item).into();
    assert_eq!(Item::decode(&bytes).unwrap(), item);
  }

  #[test]
  fn canonical_form() {
    // L[2] of U2[42, 43], ASCII "ok", and an empty list.
    let item = Item::List(vec![
      Item::U2(vec![42, 43]),
      Item::ascii("ok").unwrap(),
      Item::empty_list(),
    ]);
    let bytes: Vec<u8> = (&item).into();
    // The U2 format byte is 0o52 shifted left twice, plus one length byte.
    assert_eq!(
      bytes,
      vec![
        0x01, 0x03,
        0xA9, 0x04, 0x00, 0x2A, 0x00, 0x2B,
        0x41, 0x02, b'o', b'k',
        0x01, 0x00,
      ]
    );
    assert_eq!(Item::decode(&bytes).unwrap(), item);
  }

  #[test]
  fn roundtrip_all_formats() {
    roundtrip(Item::empty_list());
    roundtrip(Item::Bin(vec![]));
    roundtrip(Item::Bin(vec![0, 255]));
    roundtrip(Item::Bool(vec![true, false]));
    roundtrip(Item::ascii("").unwrap());
    roundtrip(Item::ascii("fab tool 7").unwrap());
    roundtrip(Item::I1(vec![i8::MIN, -1, 0, i8::MAX]));
    roundtrip(Item::I2(vec![i16::MIN, i16::MAX]));
    roundtrip(Item::I4(vec![i32::MIN, i32::MAX]));
    roundtrip(Item::I8(vec![i64::MIN, i64::MAX]));
    roundtrip(Item::U1(vec![]));
    roundtrip(Item::U2(vec![0, u16::MAX]));
    roundtrip(Item::U4(vec![u32::MAX]));
    roundtrip(Item::U8(vec![u64::MAX]));
    roundtrip(Item::F4(vec![0.0, -1.5, f32::MAX]));
    roundtrip(Item::F8(vec![0.25, f64::MIN_POSITIVE]));
  }

  #[test]
  fn roundtrip_nested_lists() {
    roundtrip(Item::List(vec![
      Item::List(vec![Item::u1(1), Item::List(vec![Item::empty_list()])]),
      Item::u4(0xDEADBEEF),
    ]));
  }

  #[test]
  fn two_and_three_byte_lengths() {
    roundtrip(Item::Bin(vec![7; 300]));
    roundtrip(Item::Bin(vec![7; 70_000]));
    // A 300-element list needs 2 length bytes counting elements, not bytes.
    let item = Item::List(vec![Item::u1(0); 300]);
    let bytes: Vec<u8> = (&item).into();
    assert_eq!(&bytes[0..3], &[format::LIST | 2, 0x01, 0x2C]);
    assert_eq!(Item::decode(&bytes).unwrap(), item);
  }

  #[test]
  fn truncated_item_rejected() {
    // U2 declaring 4 body bytes but carrying only 2.
    assert_eq!(
      Item::decode(&[0xA5, 0x04, 0x00, 0x2A]),
      Err(Error::TruncatedItem)
    );
    // List declaring one child with none present.
    assert_eq!(Item::decode(&[0x01, 0x01]), Err(Error::TruncatedItem));
  }

  #[test]
  fn bad_format_code_rejected() {
    // 0o76 is not an assigned format code.
    assert!(matches!(
      Item::decode(&[0b111110_01, 0x00]),
      Err(Error::BadFormatCode(_))
    ));
    // Zero length bytes is never valid.
    assert!(matches!(
      Item::decode(&[format::BIN, 0x00]),
      Err(Error::BadFormatCode(_))
    ));
  }

  #[test]
  fn odd_numeric_length_rejected() {
    assert_eq!(
      Item::decode(&[format::U2 | 1, 0x03, 0x00, 0x01, 0x02]),
      Err(Error::InvalidLength { format: format::U2, length: 3 })
    );
  }

  #[test]
  fn trailing_bytes_rejected() {
    assert_eq!(
      Item::decode(&[format::BIN | 1, 0x01, 0xFF, 0xEE]),
      Err(Error::TrailingBytes(1))
    );
  }

  #[test]
  fn non_ascii_byte_rejected() {
    assert_eq!(Item::ascii("héllo"), Err(Error::EncodingError));
    assert_eq!(
      Item::decode(&[format::ASCII | 1, 0x01, 0x80]),
      Err(Error::EncodingError)
    );
  }
}
