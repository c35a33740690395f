//! # HIGH-SPEED SECS MESSAGE SERVICES (HSMS)
//! **Based on:**
//! - **[SEMI E37]-1109**
//!
//! ---------------------------------------------------------------------------
//!
//! [HSMS] is a Session Protocol designed to facilitate communications between
//! semiconductor equipment over TCP/IP, particularly for transporting data
//! encoded in the [SECS-II] ([SEMI E5]) format.
//!
//! The crate is layered the way the protocol is:
//!
//! - [Framing] - The length-prefixed binary envelope and the 10-byte message
//!   header.
//! - [Connections] - The byte stream itself: active, passive, and
//!   multi-passive endpoints over TCP, each with one bounded-wait receiver
//!   task.
//! - [Transactions] - System-bytes allocation and the pending-reply table
//!   correlating primaries with their secondaries.
//! - [Sessions] - The Select/Deselect/Linktest/Separate state machine, the
//!   T3/T5/T6/T7/T8 timer family, and the routing of control and data
//!   messages.
//!
//! [SEMI E5]:      https://store-us.semi.org/products/e00500-semi-e5-specification-for-semi-equipment-communications-standard-2-message-content-secs-ii
//! [SEMI E37]:     https://store-us.semi.org/products/e03700-semi-e37-high-speed-secs-message-services-hsms-generic-services
//!
//! [HSMS]:         crate
//! [SECS-II]:      secs2
//! [Framing]:      frame
//! [Connections]:  connection
//! [Transactions]: transaction
//! [Sessions]:     session

pub mod connection;
pub mod frame;
pub mod session;
pub mod transaction;

pub use connection::{Connection, ConnectionEvents, MultiPassiveListener, SELECT_TIMEOUT};
pub use frame::{Frame, FrameHeader, Framer};
pub use session::{DisconnectCause, Inbound, MessageId, Session, SessionEvent};
pub use transaction::{Reply, TransactionManager};

use bytemuck::NoUninit;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use std::time::Duration;
use thiserror::Error;

/// ## HSMS ERROR
///
/// The failure taxonomy of the session layer. Transport and framing faults
/// terminate the session; the rest describe a single procedure.
#[derive(Debug, Error)]
pub enum Error {
  /// ### TRANSPORT
  ///
  /// Socket I/O failed underneath the protocol.
  #[error("transport failure: {0}")]
  Transport(#[from] std::io::Error),

  /// ### FRAMING
  ///
  /// The peer emitted a malformed envelope. The session drops.
  #[error(transparent)]
  Framing(#[from] frame::FrameError),

  /// ### CODEC
  ///
  /// A message body could not be decoded or did not fit its schema.
  #[error(transparent)]
  Codec(#[from] secs2::Error),

  /// ### PROTOCOL
  ///
  /// An HSMS procedure was attempted in a state that forbids it, or the
  /// peer violated the message exchange rules.
  #[error("protocol violation: {0}")]
  Protocol(&'static str),

  /// ### TIMEOUT
  ///
  /// A T3 or T6 bounded wait expired without the expected reply.
  #[error("timed out waiting for the reply")]
  Timeout,

  /// ### REJECTED
  ///
  /// The peer answered with Reject.req, or a response status other than
  /// success.
  #[error("peer rejected the procedure (type {s_type}, reason {reason})")]
  Rejected {
    s_type: u8,
    reason: u8,
  },

  /// ### DISCONNECTED
  ///
  /// The connection was lost while the procedure was in flight.
  #[error("connection lost")]
  Disconnected,
}

/// ## CONNECTION MODE
/// **Based on SEMI E37-1109§6.3.2**
///
/// How the TCP/IP connection is obtained: [PASSIVE] listens for the remote
/// entity, [ACTIVE] initiates and retries every [T5] until stopped.
///
/// [PASSIVE]: ConnectionMode::Passive
/// [ACTIVE]:  ConnectionMode::Active
/// [T5]:      ParameterSettings::t5
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConnectionMode {
  /// ### PASSIVE
  ///
  /// Bind a published port and accept the connect procedure when the remote
  /// entity initiates it.
  #[default]
  Passive,

  /// ### ACTIVE
  ///
  /// Initiate the connect procedure toward a published port.
  Active,
}

/// ## SESSION STATE
/// **Based on SEMI E37-1109§5.5**
///
/// The connection and selection machine collapsed into the three states the
/// protocol distinguishes. Data messages may only flow in [SELECTED].
///
/// [SELECTED]: SessionState::Selected
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, NoUninit)]
#[repr(u8)]
pub enum SessionState {
  /// ### NOT CONNECTED
  ///
  /// No TCP/IP connection exists, or a previous one was terminated.
  #[default]
  NotConnected = 0,

  /// ### NOT SELECTED
  ///
  /// A TCP/IP connection exists but the select procedure has not completed.
  /// This state is bounded by [T7].
  ///
  /// [T7]: ParameterSettings::t7
  NotSelected = 1,

  /// ### SELECTED
  ///
  /// The select procedure completed; data messages may flow.
  Selected = 2,
}

/// ## SESSION TYPE
/// **Based on SEMI E37-1109§8.2.6.5-8.2.6.6**
///
/// The s-type byte of the message header, naming the control procedure a
/// message belongs to. Type 0 carries SECS-II data.
#[derive(Clone, Copy, Debug, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum SessionType {
  DataMessage = 0,
  SelectRequest = 1,
  SelectResponse = 2,
  DeselectRequest = 3,
  DeselectResponse = 4,
  LinktestRequest = 5,
  LinktestResponse = 6,
  RejectRequest = 7,
  SeparateRequest = 9,
}

/// ## SELECT STATUS
/// **Based on SEMI E37-1109§7.4**
///
/// The status byte of a Select.rsp.
#[derive(Clone, Copy, Debug, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum SelectStatus {
  /// Communication established.
  Ok = 0,

  /// Communication already active; a duplicate select is answered with this.
  AlreadyActive = 1,

  /// Connection not ready.
  NotReady = 2,

  /// Connection exhausted.
  Exhausted = 3,
}

/// ## DESELECT STATUS
/// **Based on SEMI E37-1109§7.7**
///
/// The status byte of a Deselect.rsp.
#[derive(Clone, Copy, Debug, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum DeselectStatus {
  /// Communication ended.
  Ok = 0,

  /// Communication not established.
  NotEstablished = 1,

  /// Communication busy.
  Busy = 2,
}

/// ## REJECT REASON
/// **Based on SEMI E37-1109§7.8**
///
/// The reason byte of a Reject.req.
#[derive(Clone, Copy, Debug, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum RejectReason {
  /// The s-type byte named no supported session type.
  SessionTypeNotSupported = 1,

  /// The p-type byte named no supported presentation type.
  PresentationTypeNotSupported = 2,

  /// A response arrived for a transaction that is not open.
  TransactionNotOpen = 3,

  /// A data message arrived outside the SELECTED state.
  EntityNotSelected = 4,
}

/// ## PARAMETER SETTINGS
/// **Based on SEMI E37-1109§10.2**
///
/// The required set of parameters an HSMS implementation must provide. All
/// values are constructor-supplied; nothing here is process-wide or mutable
/// after the session exists.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ParameterSettings {
  /// ### CONNECT MODE
  ///
  /// [PASSIVE] to wait for an incoming connection, [ACTIVE] to initiate an
  /// outgoing one.
  ///
  /// [PASSIVE]: ConnectionMode::Passive
  /// [ACTIVE]:  ConnectionMode::Active
  pub connect_mode: ConnectionMode,

  /// ### SESSION ID
  ///
  /// The device id carried in the header of every message this session
  /// sends.
  pub session_id: u16,

  /// ### T3: REPLY TIMEOUT
  ///
  /// Bounds the wait for the secondary of a data message sent with the
  /// W-bit.
  pub t3: Duration,

  /// ### T5: CONNECT SEPARATION TIMEOUT
  ///
  /// The minimum delay between successive active connect attempts.
  pub t5: Duration,

  /// ### T6: CONTROL TRANSACTION TIMEOUT
  ///
  /// Bounds the wait for the response to a Select.req, Deselect.req, or
  /// Linktest.req. Expiry terminates the session.
  pub t6: Duration,

  /// ### T7: NOT SELECTED TIMEOUT
  ///
  /// Bounds the idle gap between the TCP connect and the completion of the
  /// select procedure. Expiry terminates the session.
  pub t7: Duration,

  /// ### T8: NETWORK INTERCHARACTER TIMEOUT
  ///
  /// Bounds the inactivity gap inside a single partially received frame.
  /// Expiry terminates the session.
  pub t8: Duration,

  /// ### LINKTEST INTERVAL
  ///
  /// The period of the keep-alive linktest while SELECTED. [None] disables
  /// the periodic test; received Linktest.req messages are always answered.
  pub linktest_interval: Option<Duration>,

  /// ### MAXIMUM MESSAGE SIZE
  ///
  /// Frames declaring a larger length are refused and terminate the
  /// session.
  pub max_message_size: u32,
}
impl Default for ParameterSettings {
  /// ### DEFAULT PARAMETER SETTINGS
  /// **Based on SEMI E37-1109§10.2, Table 10**
  ///
  /// Timeouts follow the 'typical values' column: T3 45 s, T5 10 s, T6 5 s,
  /// T7 10 s, T8 5 s. The periodic linktest is off.
  fn default() -> Self {
    Self {
      connect_mode: ConnectionMode::default(),
      session_id: 0,
      t3: Duration::from_secs(45),
      t5: Duration::from_secs(10),
      t6: Duration::from_secs(5),
      t7: Duration::from_secs(10),
      t8: Duration::from_secs(5),
      linktest_interval: None,
      max_message_size: 1 << 24,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn default_parameters_follow_table_10() {
    let settings = ParameterSettings::default();
    assert_eq!(settings.connect_mode, ConnectionMode::Passive);
    assert_eq!(settings.t3, Duration::from_secs(45));
    assert_eq!(settings.t5, Duration::from_secs(10));
    assert_eq!(settings.t6, Duration::from_secs(5));
    assert_eq!(settings.t7, Duration::from_secs(10));
    assert_eq!(settings.t8, Duration::from_secs(5));
    assert_eq!(settings.linktest_interval, None);
    assert_eq!(settings.max_message_size, 1 << 24);
  }

  #[test]
  fn session_type_codes() {
    assert_eq!(u8::from(SessionType::SelectRequest), 1);
    assert_eq!(u8::from(SessionType::SeparateRequest), 9);
    assert_eq!(SessionType::try_from(6u8).unwrap(), SessionType::LinktestResponse);
    // 8 is unassigned by the standard.
    assert!(SessionType::try_from(8u8).is_err());
  }
}
