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

//! # FRAMING
//! **Based on SEMI E37-1109§8.2**
//!
//! ---------------------------------------------------------------------------
//!
//! The wire envelope: a big-endian u32 length, the 10-byte [Frame Header],
//! and the message body, where the length covers the header plus the body.
//!
//! The [Framer] turns the byte stream a connection delivers into whole
//! frames. Bytes arrive in whatever chunks TCP hands over, so the framer
//! buffers partial frames and remembers when the partial data last grew,
//! which is what the [T8] timer polices.
//!
//! [Frame Header]: FrameHeader
//! [Framer]:       Framer
//! [T8]:           crate::ParameterSettings::t8

use std::time::Instant;
use thiserror::Error;

/// ### HEADER LENGTH
///
/// Every message carries exactly 10 header bytes; a declared length below
/// this cannot be parsed.
pub const HEADER_LEN: u32 = 10;

/// ## FRAMING ERROR
///
/// A violation of the envelope itself. Any of these terminates the session;
/// there is no way to resynchronize a length-prefixed stream after a bad
/// length.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum FrameError {
  /// ### MALFORMED FRAME
  ///
  /// The declared length cannot hold the mandatory header.
  #[error("frame declares {length} bytes, below the 10-byte header")]
  MalformedFrame {
    length: u32,
  },

  /// ### OVERSIZED FRAME
  ///
  /// The declared length exceeds the configured maximum message size.
  #[error("frame declares {length} bytes, above the {max} byte maximum")]
  OversizedFrame {
    length: u32,
    max: u32,
  },
}

/// ## FRAME HEADER
/// **Based on SEMI E37-1109§8.2.5-8.2.6**
///
/// The 10-byte field describing a message: offsets 0..2 session id, 2 and 3
/// the type-specific bytes, 4 presentation type, 5 session type, 6..10 the
/// system bytes.
///
/// For a data message, byte 2 carries the stream with the W-bit in its top
/// bit and byte 3 carries the function. For control messages both bytes are
/// zero or carry a status, as each procedure defines.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameHeader {
  /// ### SESSION ID
  /// **Based on SEMI E37-1109§8.2.6.1**
  pub session_id: u16,

  /// ### HEADER BYTE 2
  /// **Based on SEMI E37-1109§8.2.6.2**
  pub byte_2: u8,

  /// ### HEADER BYTE 3
  /// **Based on SEMI E37-1109§8.2.6.3**
  pub byte_3: u8,

  /// ### PRESENTATION TYPE
  /// **Based on SEMI E37-1109§8.2.6.4**
  ///
  /// Always 0 for SECS-II payloads.
  pub p_type: u8,

  /// ### SESSION TYPE
  /// **Based on SEMI E37-1109§8.2.6.5-8.2.6.6**
  pub s_type: u8,

  /// ### SYSTEM BYTES
  /// **Based on SEMI E37-1109§8.2.6.7**
  ///
  /// The transaction correlation identifier.
  pub system: u32,
}
impl FrameHeader {
  /// ### DATA MESSAGE HEADER
  pub fn data(session_id: u16, stream: u8, w: bool, function: u8, system: u32) -> Self {
    Self {
      session_id,
      byte_2: ((w as u8) << 7) | (stream & 0x7F),
      byte_3: function,
      p_type: 0,
      s_type: 0,
      system,
    }
  }

  /// ### CONTROL MESSAGE HEADER
  ///
  /// The status byte lands in byte 3, which is where every response
  /// procedure carries its status; requests pass 0.
  pub fn control(session_id: u16, s_type: u8, status: u8, system: u32) -> Self {
    Self {
      session_id,
      byte_2: 0,
      byte_3: status,
      p_type: 0,
      s_type,
      system,
    }
  }

  /// ### STREAM
  ///
  /// The stream of a data message header.
  pub fn stream(&self) -> u8 {
    self.byte_2 & 0x7F
  }

  /// ### W-BIT
  pub fn w(&self) -> bool {
    self.byte_2 & 0x80 != 0
  }

  /// ### FUNCTION
  pub fn function(&self) -> u8 {
    self.byte_3
  }
}
impl From<FrameHeader> for [u8; 10] {
  /// ### SERIALIZE FRAME HEADER
  fn from(header: FrameHeader) -> Self {
    let session_id = header.session_id.to_be_bytes();
    let system = header.system.to_be_bytes();
    [
      session_id[0],
      session_id[1],
      header.byte_2,
      header.byte_3,
      header.p_type,
      header.s_type,
      system[0],
      system[1],
      system[2],
      system[3],
    ]
  }
}
impl From<[u8; 10]> for FrameHeader {
  /// ### DESERIALIZE FRAME HEADER
  ///
  /// Infallible for any 10 bytes; whether the fields make protocol sense is
  /// the session's concern.
  fn from(bytes: [u8; 10]) -> Self {
    Self {
      session_id: u16::from_be_bytes([bytes[0], bytes[1]]),
      byte_2: bytes[2],
      byte_3: bytes[3],
      p_type: bytes[4],
      s_type: bytes[5],
      system: u32::from_be_bytes([bytes[6], bytes[7], bytes[8], bytes[9]]),
    }
  }
}

/// ## FRAME
/// **Based on SEMI E37-1109§8.2**
///
/// One whole message as it crosses the wire, minus the length field, which
/// only exists while serialized.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
  /// ### FRAME HEADER
  pub header: FrameHeader,

  /// ### FRAME BODY
  ///
  /// The encoded SECS-II item for a data message; empty for every control
  /// message.
  pub body: Vec<u8>,
}
impl Frame {
  /// ### SERIALIZE FOR THE WIRE
  ///
  /// Emits `length | header | body` where the length equals 10 plus the
  /// body length.
  pub fn to_wire(&self) -> Vec<u8> {
    let length = HEADER_LEN + self.body.len() as u32;
    let mut wire = Vec::with_capacity(4 + length as usize);
    wire.extend_from_slice(&length.to_be_bytes());
    let header: [u8; 10] = self.header.into();
    wire.extend_from_slice(&header);
    wire.extend_from_slice(&self.body);
    wire
  }
}

/// ## FRAMER
///
/// The incremental decoder sitting between the connection's byte stream and
/// the session. Push bytes in as they arrive; pull whole frames out. The
/// framer never blocks and never reads; re-entering the bounded socket wait
/// on a partial frame is the connection's job.
#[derive(Debug)]
pub struct Framer {
  /// ### RECEIVE BUFFER
  ///
  /// Bytes received but not yet consumed by a whole frame.
  buffer: Vec<u8>,

  /// ### MAXIMUM MESSAGE SIZE
  max_message_size: u32,

  /// ### LAST GROWTH
  ///
  /// When the pending partial frame last received bytes. [None] whenever no
  /// partial frame is pending. The session's timer task compares this
  /// against T8.
  partial_since: Option<Instant>,
}
impl Framer {
  /// ### NEW FRAMER
  pub fn new(max_message_size: u32) -> Self {
    Self {
      buffer: vec![],
      max_message_size,
      partial_since: None,
    }
  }

  /// ### PUSH RECEIVED BYTES
  pub fn push(&mut self, bytes: &[u8]) {
    if bytes.is_empty() {
      return
    }
    self.buffer.extend_from_slice(bytes);
    self.partial_since = Some(Instant::now());
  }

  /// ### NEXT WHOLE FRAME
  ///
  /// Extracts one frame if the buffer holds one, leaving any following
  /// bytes in place. A declared length below 10 or above the maximum is a
  /// framing error; the caller must drop the session, as the stream cannot
  /// be resynchronized.
  pub fn next_frame(&mut self) -> Result<Option<Frame>, FrameError> {
    // LENGTH FIELD
    if self.buffer.len() < 4 {
      return Ok(None)
    }
    let length = u32::from_be_bytes([
      self.buffer[0],
      self.buffer[1],
      self.buffer[2],
      self.buffer[3],
    ]);
    if length < HEADER_LEN {
      return Err(FrameError::MalformedFrame { length })
    }
    if length > self.max_message_size {
      return Err(FrameError::OversizedFrame { length, max: self.max_message_size })
    }

    // WHOLE FRAME
    let total = 4 + length as usize;
    if self.buffer.len() < total {
      return Ok(None)
    }
    let mut header_bytes = [0u8; 10];
    header_bytes.copy_from_slice(&self.buffer[4..14]);
    let body = self.buffer[14..total].to_vec();
    self.buffer.drain(0..total);
    if self.buffer.is_empty() {
      self.partial_since = None;
    }
    Ok(Some(Frame {
      header: FrameHeader::from(header_bytes),
      body,
    }))
  }

  /// ### PARTIAL FRAME AGE
  ///
  /// The instant the pending partial data last grew, for T8 policing.
  pub fn partial_since(&self) -> Option<Instant> {
    self.partial_since
  }

  /// ### RESET
  ///
  /// Discards buffered bytes. Called when the connection drops.
  pub fn reset(&mut self) {
    self.buffer.clear();
    self.partial_since = None;
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn select_req(system: u32) -> Frame {
    Frame {
      header: FrameHeader::control(0xFFFF, 1, 0, system),
      body: vec![],
    }
  }

  #[test]
  fn length_prefix_invariant() {
    let frame = Frame {
      header: FrameHeader::data(1, 1, true, 13, 7),
      body: vec![0x01, 0x00],
    };
    let wire = frame.to_wire();
    let declared = u32::from_be_bytes([wire[0], wire[1], wire[2], wire[3]]);
    assert_eq!(declared as usize, 10 + frame.body.len());
    assert_eq!(wire.len(), 4 + declared as usize);
  }

  #[test]
  fn header_roundtrip() {
    let header = FrameHeader::data(0x1234, 99, true, 1, 0xDEADBEEF);
    let bytes: [u8; 10] = header.into();
    assert_eq!(bytes[2], 0x80 | 99);
    assert_eq!(FrameHeader::from(bytes), header);
    assert_eq!(header.stream(), 99);
    assert!(header.w());
  }

  #[test]
  fn whole_frame_in_one_push() {
    let mut framer = Framer::new(1 << 24);
    framer.push(&select_req(1).to_wire());
    assert_eq!(framer.next_frame().unwrap(), Some(select_req(1)));
    assert_eq!(framer.next_frame().unwrap(), None);
    assert!(framer.partial_since().is_none());
  }

  #[test]
  fn frame_split_across_pushes() {
    let wire = Frame {
      header: FrameHeader::data(0, 1, true, 1, 2),
      body: vec![1, 2, 3, 4],
    }
    .to_wire();
    let mut framer = Framer::new(1 << 24);
    framer.push(&wire[0..3]);
    assert_eq!(framer.next_frame().unwrap(), None);
    assert!(framer.partial_since().is_some());
    framer.push(&wire[3..9]);
    assert_eq!(framer.next_frame().unwrap(), None);
    framer.push(&wire[9..]);
    let frame = framer.next_frame().unwrap().unwrap();
    assert_eq!(frame.body, vec![1, 2, 3, 4]);
    assert!(framer.partial_since().is_none());
  }

  #[test]
  fn two_frames_in_one_push() {
    let mut framer = Framer::new(1 << 24);
    let mut wire = select_req(1).to_wire();
    wire.extend(select_req(2).to_wire());
    framer.push(&wire);
    assert_eq!(framer.next_frame().unwrap().unwrap().header.system, 1);
    assert_eq!(framer.next_frame().unwrap().unwrap().header.system, 2);
    assert_eq!(framer.next_frame().unwrap(), None);
  }

  #[test]
  fn short_length_rejected() {
    let mut framer = Framer::new(1 << 24);
    framer.push(&9u32.to_be_bytes());
    assert_eq!(
      framer.next_frame(),
      Err(FrameError::MalformedFrame { length: 9 })
    );
  }

  #[test]
  fn oversized_length_rejected() {
    let mut framer = Framer::new(100);
    framer.push(&101u32.to_be_bytes());
    assert_eq!(
      framer.next_frame(),
      Err(FrameError::OversizedFrame { length: 101, max: 100 })
    );
  }
}
