//! # GENERIC EQUIPMENT MODEL (GEM)
//! **Based on:**
//! - **[SEMI E30]**
//!
//! ---------------------------------------------------------------------------
//!
//! [GEM] is the Application Protocol giving semiconductor equipment a common
//! behavioural profile on top of [SECS-II] ([SEMI E5]) message content and
//! the [HSMS] ([SEMI E37]) session layer.
//!
//! The crate provides:
//!
//! - The [Handler], the high-level send, receive, and callback surface
//!   sitting on one HSMS session.
//! - The [Communication] state machine: Disabled, WaitCRA, WaitDelay, and
//!   Communicating, driven by S1F13/S1F14.
//! - The [Control] state machine: the OFF-LINE substates and ON-LINE
//!   Local/Remote, driven by S1F15 through S1F18 and operator input.
//! - The [Variable Store] interface the application supplies for equipment
//!   constants and status variables.
//!
//! Both state machines publish timestamped [Transition] records to
//! subscribers.
//!
//! [SEMI E5]:       https://store-us.semi.org/products/e00500-semi-e5-specification-for-semi-equipment-communications-standard-2-message-content-secs-ii
//! [SEMI E30]:      https://store-us.semi.org/products/e03000-semi-e30-specification-for-the-generic-model-for-communications-and-control-of-manufacturing-equipment-gem
//! [SEMI E37]:      https://store-us.semi.org/products/e03700-semi-e37-high-speed-secs-message-services-hsms-generic-services
//!
//! [GEM]:            crate
//! [SECS-II]:        secs2
//! [HSMS]:           hsms
//! [Handler]:        handler::Handler
//! [Communication]:  communication
//! [Control]:        control
//! [Variable Store]: store::VariableStore
//! [Transition]:     Transition

pub mod communication;
pub mod control;
pub mod handler;
pub mod store;

pub use communication::CommunicationState;
pub use control::ControlState;
pub use handler::Handler;
pub use store::{MemoryStore, SetAck, Variable, VariableInfo, VariableStore};

use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;

/// ## GEM ERROR
///
/// The failure surface of the handler.
#[derive(Debug, Error)]
pub enum Error {
  /// ### SESSION FAILURE
  #[error(transparent)]
  Hsms(#[from] hsms::Error),

  /// ### CONTENT FAILURE
  ///
  /// A body failed to encode, decode, or validate.
  #[error(transparent)]
  Secs(#[from] secs2::Error),

  /// ### REPLY TIMEOUT
  ///
  /// T3 expired on a data transaction.
  #[error("reply timed out")]
  Timeout,

  /// ### DISCONNECTED
  #[error("connection lost")]
  Disconnected,

  /// ### REJECTED
  ///
  /// The peer rejected the message at the session layer.
  #[error("peer rejected the message (type {s_type}, reason {reason})")]
  Rejected {
    s_type: u8,
    reason: u8,
  },

  /// ### UNKNOWN FUNCTION
  ///
  /// The function is not in this stack's registry, so no schema exists to
  /// build or check the message with.
  #[error("S{stream}F{function} is not in the function registry")]
  UnknownFunction {
    stream: u8,
    function: u8,
  },

  /// ### NOT COMMUNICATING
  ///
  /// Data collection messages may not leave the stack before the
  /// communication machine reaches COMMUNICATING.
  #[error("communication is not established")]
  NotCommunicating,
}

/// ## STATE TRANSITION
///
/// One observed state machine edge, timestamped at the moment it was taken.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transition {
  /// ### MACHINE NAME
  ///
  /// "communication" or "control".
  pub machine: &'static str,

  /// ### SOURCE STATE
  pub from: &'static str,

  /// ### TARGET STATE
  pub to: &'static str,

  /// ### WHEN
  pub at: DateTime<Utc>,
}

/// ## TRANSITION BUS
///
/// Fans state machine transitions out to subscribers. Subscribers that have
/// gone away are pruned on the next publication.
pub(crate) struct TransitionBus {
  observers: Mutex<Vec<Sender<Transition>>>,
}
impl TransitionBus {
  pub(crate) fn new() -> Arc<TransitionBus> {
    Arc::new(TransitionBus { observers: Mutex::new(vec![]) })
  }

  /// ### PUBLISH TRANSITION
  pub(crate) fn publish(&self, machine: &'static str, from: &'static str, to: &'static str) {
    let transition = Transition { machine, from, to, at: Utc::now() };
    tracing::info!(machine, from, to, "state transition");
    self
      .observers
      .lock()
      .unwrap()
      .retain(|observer| observer.send(transition.clone()).is_ok());
  }

  /// ### SUBSCRIBE
  pub(crate) fn observe(&self) -> Receiver<Transition> {
    let (sender, receiver) = channel();
    self.observers.lock().unwrap().push(sender);
    receiver
  }
}

/// ## SETTINGS
///
/// The constructor-supplied record configuring one stack instance. The HSMS
/// session id doubles as the device id on every data message.
#[derive(Clone)]
pub struct Settings {
  /// ### SESSION PARAMETERS
  ///
  /// Connect mode, device id, and the T3/T5/T6/T7/T8 family.
  pub hsms: hsms::ParameterSettings,

  /// ### ENTITY
  ///
  /// "host:port" to dial in active mode, or to bind in passive mode.
  pub entity: String,

  /// ### ROLE
  ///
  /// True for the equipment profile, false for a host.
  pub is_equipment: bool,

  /// ### MODEL NAME
  ///
  /// MDLN, reported in S1F2, S1F13, and S1F14. At most 20 characters.
  pub mdln: String,

  /// ### SOFTWARE REVISION
  ///
  /// SOFTREV, reported alongside MDLN. At most 20 characters.
  pub softrev: String,

  /// ### ESTABLISH COMMUNICATION TIMEOUT
  ///
  /// How long the communication machine sits in WAIT DELAY between S1F13
  /// attempts.
  pub establish_communication_timeout: Duration,

  /// ### INITIAL CONTROL STATE
  ///
  /// The OFF-LINE substate a newly enabled equipment starts in.
  pub initial_control_state: ControlState,

  /// ### ONLINE SUBSTATE
  ///
  /// Where a granted ON-LINE request lands: Local keeps the operator
  /// console in control, Remote lets the host command.
  pub online_substate: ControlState,

  /// ### FUNCTION REGISTRY
  pub registry: Arc<secs2::registry::FunctionRegistry>,
}
impl Settings {
  /// ### EQUIPMENT SETTINGS
  ///
  /// A passive equipment stack with the standard registry and timer
  /// defaults.
  pub fn equipment(entity: &str, device_id: u16) -> Settings {
    Settings {
      hsms: hsms::ParameterSettings {
        connect_mode: hsms::ConnectionMode::Passive,
        session_id: device_id,
        ..Default::default()
      },
      entity: entity.into(),
      is_equipment: true,
      mdln: "equipment".into(),
      softrev: "0.1.0".into(),
      establish_communication_timeout: Duration::from_secs(10),
      initial_control_state: ControlState::HostOffline,
      online_substate: ControlState::OnlineRemote,
      registry: Arc::new(secs2::registry::FunctionRegistry::standard()),
    }
  }

  /// ### HOST SETTINGS
  ///
  /// An active host stack with the standard registry and timer defaults.
  pub fn host(entity: &str, device_id: u16) -> Settings {
    Settings {
      hsms: hsms::ParameterSettings {
        connect_mode: hsms::ConnectionMode::Active,
        session_id: device_id,
        ..Default::default()
      },
      entity: entity.into(),
      is_equipment: false,
      mdln: "host".into(),
      softrev: "0.1.0".into(),
      establish_communication_timeout: Duration::from_secs(10),
      initial_control_state: ControlState::HostOffline,
      online_substate: ControlState::OnlineRemote,
      registry: Arc::new(secs2::registry::FunctionRegistry::standard()),
    }
  }
}
