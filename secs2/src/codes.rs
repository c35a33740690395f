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

//! # ACKNOWLEDGE CODES
//!
//! Wire-enumerated values carried by the single-byte acknowledge items. Each
//! enum converts to and from its binary form through [num_enum], so a code
//! read off the wire either names a defined value or fails loudly.
//!
//! [num_enum]: https://docs.rs/num_enum

use num_enum::{IntoPrimitive, TryFromPrimitive};

/// ## COMMACK VALUES
///
/// Carried by S1F14.
#[derive(Clone, Copy, Debug, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum CommAck {
  /// Communication established.
  Accepted = 0,

  /// Communication denied, try again.
  Denied = 1,
}

/// ## ONLACK VALUES
///
/// Carried by S1F18.
#[derive(Clone, Copy, Debug, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum OnLineAck {
  /// ON-LINE accepted.
  Accepted = 0,

  /// ON-LINE not allowed.
  NotAllowed = 1,

  /// Equipment already ON-LINE.
  AlreadyOnLine = 2,
}

/// ## OFLACK VALUES
///
/// Carried by S1F16.
#[derive(Clone, Copy, Debug, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum OffLineAck {
  /// OFF-LINE accepted.
  Accepted = 0,
}

/// ## EAC VALUES
///
/// Carried by S2F16.
#[derive(Clone, Copy, Debug, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum EquipmentAck {
  /// All constants accepted.
  Accepted = 0,

  /// Denied, at least one constant does not exist.
  DeniedUnknownConstant = 1,

  /// Denied, busy.
  DeniedBusy = 2,

  /// Denied, at least one value out of range.
  DeniedOutOfRange = 3,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn commack_roundtrip() {
    assert_eq!(u8::from(CommAck::Accepted), 0);
    assert_eq!(CommAck::try_from(1u8).unwrap(), CommAck::Denied);
    assert!(CommAck::try_from(9u8).is_err());
  }

  #[test]
  fn onlack_values() {
    assert_eq!(u8::from(OnLineAck::AlreadyOnLine), 2);
    assert!(OnLineAck::try_from(3u8).is_err());
  }
}
