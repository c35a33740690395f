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

//! # CONTROL STATE MACHINE
//! **Based on SEMI E30§4.4**
//!
//! ---------------------------------------------------------------------------
//!
//! The equipment control model: OFF-LINE with its EQUIPMENT OFF-LINE,
//! ATTEMPT ON-LINE, and HOST OFF-LINE substates, and ON-LINE with LOCAL and
//! REMOTE. Host requests arrive as S1F17 (Request ON-LINE) and S1F15
//! (Request OFF-LINE); the operator console drives the rest.
//!
//! The machine answers each request with the acknowledge code the standard
//! defines and publishes every transition it takes.

use std::sync::{Arc, Mutex};

use secs2::codes::{OffLineAck, OnLineAck};

use crate::TransitionBus;

/// ## CONTROL STATE
/// **Based on SEMI E30§4.4**
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControlState {
  /// ### OFF-LINE / EQUIPMENT OFF-LINE
  ///
  /// The operator holds the equipment off-line; host requests to come
  /// on-line are refused.
  EquipmentOffline,

  /// ### OFF-LINE / ATTEMPT ON-LINE
  ///
  /// The operator has asked for on-line and the equipment is verifying the
  /// host answers before committing.
  AttemptOnline,

  /// ### OFF-LINE / HOST OFF-LINE
  ///
  /// The host sent the equipment off-line; a host request may bring it
  /// back.
  HostOffline,

  /// ### ON-LINE / LOCAL
  ///
  /// The operator console has control; the host observes.
  OnlineLocal,

  /// ### ON-LINE / REMOTE
  ///
  /// The host may command the equipment.
  OnlineRemote,
}
impl ControlState {
  /// ### STATE NAME
  pub const fn name(self) -> &'static str {
    match self {
      ControlState::EquipmentOffline => "EQUIPMENT OFF-LINE",
      ControlState::AttemptOnline => "ATTEMPT ON-LINE",
      ControlState::HostOffline => "HOST OFF-LINE",
      ControlState::OnlineLocal => "ON-LINE LOCAL",
      ControlState::OnlineRemote => "ON-LINE REMOTE",
    }
  }

  /// ### IS ON-LINE
  pub const fn is_online(self) -> bool {
    matches!(self, ControlState::OnlineLocal | ControlState::OnlineRemote)
  }
}

/// ## CONTROL MACHINE
pub struct ControlMachine {
  state: Mutex<ControlState>,
  bus: Arc<TransitionBus>,
}
impl ControlMachine {
  /// ### NEW MACHINE
  ///
  /// Starts in the configured default OFF-LINE substate.
  pub(crate) fn new(bus: Arc<TransitionBus>, initial: ControlState) -> ControlMachine {
    ControlMachine {
      state: Mutex::new(initial),
      bus,
    }
  }

  /// ### CURRENT STATE
  pub fn state(&self) -> ControlState {
    *self.state.lock().unwrap()
  }

  /// ### MOVE
  fn transition(&self, to: ControlState) {
    let mut state = self.state.lock().unwrap();
    if *state == to {
      return
    }
    let previous = *state;
    *state = to;
    drop(state);
    self.bus.publish("control", previous.name(), to.name());
  }

  /// ### HOST REQUESTS ON-LINE
  /// **S1F17**
  ///
  /// Grants unless the operator holds the equipment off-line. A grant
  /// lands in the configured ON-LINE substate.
  pub(crate) fn host_requests_online(&self, online_substate: ControlState) -> OnLineAck {
    let current = self.state();
    if current.is_online() {
      return OnLineAck::AlreadyOnLine
    }
    if current == ControlState::EquipmentOffline {
      return OnLineAck::NotAllowed
    }
    self.transition(online_substate);
    OnLineAck::Accepted
  }

  /// ### HOST REQUESTS OFF-LINE
  /// **S1F15**
  pub(crate) fn host_requests_offline(&self) -> OffLineAck {
    self.transition(ControlState::HostOffline);
    OffLineAck::Accepted
  }

  /// ### OPERATOR: BEGIN ATTEMPT ON-LINE
  ///
  /// The operator throws the on-line switch; the equipment verifies the
  /// host before committing.
  pub(crate) fn operator_attempts_online(&self) -> bool {
    if self.state().is_online() {
      return false
    }
    self.transition(ControlState::AttemptOnline);
    true
  }

  /// ### ATTEMPT RESOLVED
  ///
  /// The verification outcome: on-line in the given substate, or back to
  /// EQUIPMENT OFF-LINE.
  pub(crate) fn attempt_resolved(&self, success: bool, online_substate: ControlState) {
    if self.state() != ControlState::AttemptOnline {
      return
    }
    if success {
      self.transition(online_substate);
    } else {
      self.transition(ControlState::EquipmentOffline);
    }
  }

  /// ### OPERATOR: OFF-LINE
  pub(crate) fn operator_offline(&self) {
    self.transition(ControlState::EquipmentOffline);
  }

  /// ### OPERATOR: LOCAL
  ///
  /// Only meaningful while ON-LINE.
  pub(crate) fn operator_local(&self) -> bool {
    if !self.state().is_online() {
      return false
    }
    self.transition(ControlState::OnlineLocal);
    true
  }

  /// ### OPERATOR: REMOTE
  pub(crate) fn operator_remote(&self) -> bool {
    if !self.state().is_online() {
      return false
    }
    self.transition(ControlState::OnlineRemote);
    true
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn machine(initial: ControlState) -> ControlMachine {
    ControlMachine::new(TransitionBus::new(), initial)
  }

  #[test]
  fn host_online_request_grants_from_host_offline() {
    let machine = machine(ControlState::HostOffline);
    assert_eq!(
      machine.host_requests_online(ControlState::OnlineRemote),
      OnLineAck::Accepted,
    );
    assert_eq!(machine.state(), ControlState::OnlineRemote);
    // A second request is already on-line.
    assert_eq!(
      machine.host_requests_online(ControlState::OnlineRemote),
      OnLineAck::AlreadyOnLine,
    );
  }

  #[test]
  fn host_online_request_refused_while_equipment_offline() {
    let machine = machine(ControlState::EquipmentOffline);
    assert_eq!(
      machine.host_requests_online(ControlState::OnlineRemote),
      OnLineAck::NotAllowed,
    );
    assert_eq!(machine.state(), ControlState::EquipmentOffline);
  }

  #[test]
  fn host_offline_request_always_lands_in_host_offline() {
    let machine = machine(ControlState::OnlineRemote);
    assert_eq!(machine.host_requests_offline(), OffLineAck::Accepted);
    assert_eq!(machine.state(), ControlState::HostOffline);
  }

  #[test]
  fn operator_attempt_resolves_both_ways() {
    let machine = machine(ControlState::EquipmentOffline);
    assert!(machine.operator_attempts_online());
    assert_eq!(machine.state(), ControlState::AttemptOnline);
    machine.attempt_resolved(false, ControlState::OnlineLocal);
    assert_eq!(machine.state(), ControlState::EquipmentOffline);

    machine.operator_attempts_online();
    machine.attempt_resolved(true, ControlState::OnlineLocal);
    assert_eq!(machine.state(), ControlState::OnlineLocal);
  }

  #[test]
  fn local_remote_toggle_requires_online() {
    let machine = machine(ControlState::HostOffline);
    assert!(!machine.operator_local());
    machine.host_requests_online(ControlState::OnlineRemote);
    assert!(machine.operator_local());
    assert_eq!(machine.state(), ControlState::OnlineLocal);
    assert!(machine.operator_remote());
    assert_eq!(machine.state(), ControlState::OnlineRemote);
  }
}
