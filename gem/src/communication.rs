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

//! # COMMUNICATION STATE MACHINE
//! **Based on SEMI E30§4.3**
//!
//! ---------------------------------------------------------------------------
//!
//! The machine deciding whether the S1F13/S1F14 Establish Communications
//! exchange has succeeded. The ENABLED branch splits NOT COMMUNICATING into
//! WAIT CRA (an S1F13 is out, its acknowledge pending) and WAIT DELAY
//! (sitting out the establish timeout before the next attempt).
//!
//! The machine records state and publishes transitions; the [Handler] owns
//! the clock and the wire traffic that drive it.
//!
//! [Handler]: crate::handler::Handler

use std::sync::{Arc, Mutex};

use crate::TransitionBus;

/// ## COMMUNICATION STATE
/// **Based on SEMI E30§4.3**
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommunicationState {
  /// ### DISABLED
  ///
  /// Communication is administratively off. Only `enable` leaves this
  /// state.
  Disabled,

  /// ### ENABLED / NOT COMMUNICATING / WAIT CRA
  ///
  /// An S1F13 has been sent and its S1F14 acknowledge is awaited.
  WaitCra,

  /// ### ENABLED / NOT COMMUNICATING / WAIT DELAY
  ///
  /// The last attempt failed; the establish timeout runs before a retry.
  WaitDelay,

  /// ### ENABLED / COMMUNICATING
  ///
  /// The exchange succeeded in either direction.
  Communicating,
}
impl CommunicationState {
  /// ### STATE NAME
  pub const fn name(self) -> &'static str {
    match self {
      CommunicationState::Disabled => "DISABLED",
      CommunicationState::WaitCra => "WAIT CRA",
      CommunicationState::WaitDelay => "WAIT DELAY",
      CommunicationState::Communicating => "COMMUNICATING",
    }
  }
}

/// ## COMMUNICATION MACHINE
pub struct CommunicationMachine {
  state: Mutex<CommunicationState>,
  bus: Arc<TransitionBus>,
}
impl CommunicationMachine {
  /// ### NEW MACHINE
  ///
  /// Starts DISABLED.
  pub(crate) fn new(bus: Arc<TransitionBus>) -> CommunicationMachine {
    CommunicationMachine {
      state: Mutex::new(CommunicationState::Disabled),
      bus,
    }
  }

  /// ### CURRENT STATE
  pub fn state(&self) -> CommunicationState {
    *self.state.lock().unwrap()
  }

  /// ### IS COMMUNICATING
  pub fn is_communicating(&self) -> bool {
    self.state() == CommunicationState::Communicating
  }

  /// ### GUARDED TRANSITION
  ///
  /// Moves to `to` only from one of the `from` states, publishing the edge.
  /// Returns whether the move happened.
  fn transition(&self, from: &[CommunicationState], to: CommunicationState) -> bool {
    let mut state = self.state.lock().unwrap();
    if *state == to || !from.contains(&*state) {
      return false
    }
    let previous = *state;
    *state = to;
    drop(state);
    self.bus.publish("communication", previous.name(), to.name());
    true
  }

  /// ### ENABLE
  ///
  /// DISABLED to WAIT CRA. From DISABLED, nothing but this call can
  /// produce a non-disabled state.
  pub(crate) fn enable(&self) -> bool {
    self.transition(&[CommunicationState::Disabled], CommunicationState::WaitCra)
  }

  /// ### DISABLE
  pub(crate) fn disable(&self) {
    self.transition(
      &[
        CommunicationState::WaitCra,
        CommunicationState::WaitDelay,
        CommunicationState::Communicating,
      ],
      CommunicationState::Disabled,
    );
  }

  /// ### ESTABLISHED
  ///
  /// A successful S1F13/S1F14 exchange, in either direction.
  pub(crate) fn established(&self) -> bool {
    self.transition(
      &[CommunicationState::WaitCra, CommunicationState::WaitDelay],
      CommunicationState::Communicating,
    )
  }

  /// ### ATTEMPT FAILED
  ///
  /// WAIT CRA to WAIT DELAY, on a failed or unacknowledged attempt.
  pub(crate) fn wait_delay(&self) -> bool {
    self.transition(&[CommunicationState::WaitCra], CommunicationState::WaitDelay)
  }

  /// ### RETRY
  ///
  /// WAIT DELAY to WAIT CRA, once the establish timeout has run.
  pub(crate) fn retry(&self) -> bool {
    self.transition(&[CommunicationState::WaitDelay], CommunicationState::WaitCra)
  }

  /// ### COMMUNICATION LOST
  ///
  /// COMMUNICATING back to WAIT CRA, on connection loss.
  pub(crate) fn lost(&self) -> bool {
    self.transition(&[CommunicationState::Communicating], CommunicationState::WaitCra)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn machine() -> (CommunicationMachine, std::sync::mpsc::Receiver<crate::Transition>) {
    let bus = TransitionBus::new();
    let receiver = bus.observe();
    (CommunicationMachine::new(bus), receiver)
  }

  #[test]
  fn only_enable_leaves_disabled() {
    let (machine, _events) = machine();
    assert!(!machine.established());
    assert!(!machine.wait_delay());
    assert!(!machine.retry());
    assert!(!machine.lost());
    assert_eq!(machine.state(), CommunicationState::Disabled);
    assert!(machine.enable());
    assert_eq!(machine.state(), CommunicationState::WaitCra);
  }

  #[test]
  fn establish_timeout_cycles_through_wait_delay() {
    let (machine, events) = machine();
    machine.enable();
    assert!(machine.wait_delay());
    assert!(machine.retry());
    assert!(machine.established());
    assert!(machine.is_communicating());
    let names: Vec<(String, String)> = events
      .try_iter()
      .map(|t| (t.from.to_string(), t.to.to_string()))
      .collect();
    assert_eq!(
      names,
      vec![
        ("DISABLED".into(), "WAIT CRA".into()),
        ("WAIT CRA".into(), "WAIT DELAY".into()),
        ("WAIT DELAY".into(), "WAIT CRA".into()),
        ("WAIT CRA".into(), "COMMUNICATING".into()),
      ],
    );
  }

  #[test]
  fn loss_returns_to_wait_cra() {
    let (machine, _events) = machine();
    machine.enable();
    machine.established();
    assert!(machine.lost());
    assert_eq!(machine.state(), CommunicationState::WaitCra);
  }

  #[test]
  fn disable_from_anywhere_enabled() {
    let (machine, _events) = machine();
    machine.enable();
    machine.established();
    machine.disable();
    assert_eq!(machine.state(), CommunicationState::Disabled);
  }
}
