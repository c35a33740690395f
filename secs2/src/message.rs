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

use crate::registry::FunctionSchema;
use crate::{Error, Item};

/// ## GENERIC MESSAGE
/// **Based on SEMI E5§6**
///
/// A message body paired with the [Stream] and [Function] identifying its
/// class and the reply expectation carried by the message transfer protocol.
///
/// The transaction correlation identifier (the system bytes) and the session
/// id belong to the transport envelope; a [Message] never carries or
/// interprets them.
///
/// [Message]:  Message
/// [Stream]:   Message::stream
/// [Function]: Message::function
#[derive(Clone, Debug, PartialEq)]
pub struct Message {
  /// ### STREAM
  /// **Based on SEMI E5§6.4.2**
  ///
  /// The message category, 0 to 127.
  pub stream: u8,

  /// ### FUNCTION
  /// **Based on SEMI E5§6.4.2**
  ///
  /// The specific message within the stream, 0 to 255. Odd functions are
  /// primaries, even functions are their replies.
  pub function: u8,

  /// ### REPLY REQUESTED
  /// **Based on SEMI E5§6.4.3**
  ///
  /// Whether a reply is requested. Only a primary may request one.
  pub w: bool,

  /// ### MESSAGE TEXT
  ///
  /// - [None] - A header-only message.
  /// - [Some] - A message with contents after the header.
  pub text: Option<Item>,
}
impl Message {
  /// ### NEW MESSAGE
  ///
  /// Constructs a message from raw parts, as on the receive path. The stream
  /// must fit in 7 bits and the reply bit may only accompany an odd
  /// function.
  pub fn new(stream: u8, function: u8, w: bool, text: Option<Item>) -> Result<Self, Error> {
    if stream > 127 {
      return Err(Error::ValueOutOfRange("stream"))
    }
    if w && function % 2 == 0 {
      return Err(Error::ValueOutOfRange("w bit on an even function"))
    }
    Ok(Self { stream, function, w, text })
  }

  /// ### MESSAGE FOR A REGISTERED FUNCTION
  ///
  /// Constructs a message from a registry entry, as on the send path. The
  /// body is validated against the entry's schema before the message
  /// exists; an invalid body surfaces here, synchronously, and nothing goes
  /// on the wire.
  pub fn for_function(schema: &FunctionSchema, text: Option<Item>) -> Result<Self, Error> {
    schema.body.validate(text.as_ref())?;
    Ok(Self {
      stream: schema.stream,
      function: schema.function,
      w: schema.w,
      text,
    })
  }

  /// ### REPLY MESSAGE
  ///
  /// Builds the secondary for this primary: same stream, function plus one,
  /// no further reply requested. The caller pairs it with the primary's
  /// system bytes at the transport layer.
  pub fn reply(&self, text: Option<Item>) -> Message {
    Message {
      stream: self.stream,
      function: self.function + 1,
      w: false,
      text,
    }
  }

  /// ### IS PRIMARY
  ///
  /// Odd functions open a transaction.
  pub fn is_primary(&self) -> bool {
    self.function % 2 == 1
  }

  /// ### IS REPLY REQUIRED
  pub fn is_reply_required(&self) -> bool {
    self.w
  }

  /// ### ENCODED TEXT
  ///
  /// The body serialized for the wire; empty when header-only.
  pub fn encoded_text(&self) -> Vec<u8> {
    match &self.text {
      Some(item) => item.into(),
      None => vec![],
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::registry;

  #[test]
  fn stream_range_enforced() {
    assert!(Message::new(128, 1, false, None).is_err());
    assert!(Message::new(127, 1, false, None).is_ok());
  }

  #[test]
  fn w_bit_requires_odd_function() {
    assert!(Message::new(1, 2, true, None).is_err());
    assert!(Message::new(1, 1, true, None).is_ok());
  }

  #[test]
  fn for_function_validates_body() {
    // S1F13 accepts {MDLN, SOFTREV} or a zero-length list, nothing else.
    let good = Message::for_function(&registry::S1F13, Some(Item::empty_list()));
    assert!(good.is_ok());
    assert!(good.unwrap().is_reply_required());
    let bad = Message::for_function(&registry::S1F13, Some(Item::u1(0)));
    assert!(matches!(bad, Err(Error::SchemaViolation(_))));
  }

  #[test]
  fn reply_increments_function() {
    let primary = Message::for_function(&registry::S1F1, None).unwrap();
    let secondary = primary.reply(Some(Item::empty_list()));
    assert_eq!(secondary.stream, 1);
    assert_eq!(secondary.function, 2);
    assert!(!secondary.w);
    assert!(!secondary.is_primary());
  }
}
