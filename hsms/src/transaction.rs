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

//! # TRANSACTIONS
//! **Based on SEMI E37-1109§7.2 and §8.2.6.7**
//!
//! ---------------------------------------------------------------------------
//!
//! The open-transaction table correlating primaries with their secondaries
//! by system bytes. Three tasks share it under one critical section: the
//! sender registers waiters, the receiver completes them, and the timer
//! sweep expires them.
//!
//! The central ordering invariant of the layer: a waiter is registered
//! **before** its frame goes on the wire, so a secondary that arrives before
//! the sender proceeds still finds its slot.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering::Relaxed};
use std::sync::Mutex;
use std::time::Instant;

use crate::frame::FrameHeader;

/// ## REPLY
///
/// The outcome a pending-reply waiter completes with.
#[derive(Clone, Debug)]
pub enum Reply {
  /// ### DATA SECONDARY
  ///
  /// The matching data message arrived and decoded.
  Data {
    header: FrameHeader,
    message: secs2::Message,
  },

  /// ### CONTROL RESPONSE
  ///
  /// The matching control message arrived; the status lives in the header.
  Control {
    header: FrameHeader,
  },

  /// ### MALFORMED SECONDARY
  ///
  /// The matching data message arrived but its body failed to decode.
  Malformed {
    header: FrameHeader,
    error: secs2::Error,
  },

  /// ### REJECTED
  ///
  /// The peer answered the transaction with Reject.req.
  Rejected {
    s_type: u8,
    reason: u8,
  },

  /// ### TIMEOUT
  ///
  /// The deadline passed before any of the above. Delivered by the sweep,
  /// so actual completion lags the deadline by at most the sweep
  /// granularity.
  Timeout,

  /// ### DISCONNECTED
  ///
  /// The connection ended with the transaction still open.
  Disconnected,
}

/// ### TRANSACTION SLOT
///
/// One open transaction: the waiter and the deadline the sweep enforces.
struct Slot {
  waiter: oneshot::Sender<Reply>,
  deadline: Instant,
}

/// ## TRANSACTION MANAGER
///
/// Allocates system bytes and owns the pending-reply table. Lifetime is
/// tied to the session; within one session lifetime no two in-flight
/// primaries ever share system bytes, because allocation is a monotonic
/// counter and slots are keyed by it.
pub struct TransactionManager {
  /// ### SYSTEM BYTES COUNTER
  ///
  /// Monotonically increasing; the first allocation yields 1.
  next_system: AtomicU32,

  /// ### OPEN TRANSACTIONS
  slots: Mutex<HashMap<u32, Slot>>,
}
impl TransactionManager {
  /// ### NEW TRANSACTION MANAGER
  pub fn new() -> Self {
    Self {
      next_system: AtomicU32::new(1),
      slots: Mutex::new(HashMap::new()),
    }
  }

  /// ### ALLOCATE SYSTEM BYTES
  pub fn allocate(&self) -> u32 {
    self.next_system.fetch_add(1, Relaxed)
  }

  /// ### REGISTER WAITER
  ///
  /// Opens a slot for the given system bytes with the given deadline and
  /// returns the receiving end. The caller must register before writing the
  /// frame. Returns [None] if the system bytes already have an open slot,
  /// which allocation makes impossible unless the caller bypassed it.
  pub fn register(&self, system: u32, deadline: Instant) -> Option<oneshot::Receiver<Reply>> {
    let mut slots = self.slots.lock().unwrap();
    if slots.contains_key(&system) {
      return None
    }
    let (waiter, receiver) = oneshot::channel();
    slots.insert(system, Slot { waiter, deadline });
    Some(receiver)
  }

  /// ### UNREGISTER WAITER
  ///
  /// Removes a slot without completing it, for a send that failed after
  /// registration.
  pub fn unregister(&self, system: u32) {
    self.slots.lock().unwrap().remove(&system);
  }

  /// ### COMPLETE TRANSACTION
  ///
  /// Resolves the slot for the given system bytes, delivering the reply to
  /// exactly one waiter. Returns false when no slot is open, in which case
  /// the session answers the peer with Reject.req.
  pub fn complete(&self, system: u32, reply: Reply) -> bool {
    match self.slots.lock().unwrap().remove(&system) {
      Some(slot) => {
        // A waiter that gave up between deadline and delivery has dropped
        // its receiver; that is not an error here.
        let _ = slot.waiter.send(reply);
        true
      }
      None => false,
    }
  }

  /// ### SWEEP EXPIRED SLOTS
  ///
  /// Completes every slot whose deadline has passed with [Timeout]. The
  /// timer task calls this with a granularity well under one second.
  ///
  /// [Timeout]: Reply::Timeout
  pub fn sweep(&self, now: Instant) {
    let mut slots = self.slots.lock().unwrap();
    let expired: Vec<u32> = slots
      .iter()
      .filter(|(_, slot)| slot.deadline <= now)
      .map(|(system, _)| *system)
      .collect();
    for system in expired {
      if let Some(slot) = slots.remove(&system) {
        let _ = slot.waiter.send(Reply::Timeout);
      }
    }
  }

  /// ### ABORT ALL
  ///
  /// Completes every open slot with [Disconnected]. Called exactly when the
  /// connection ends, so no waiter outlives the session's link.
  ///
  /// [Disconnected]: Reply::Disconnected
  pub fn abort_all(&self) {
    let mut slots = self.slots.lock().unwrap();
    for (_, slot) in slots.drain() {
      let _ = slot.waiter.send(Reply::Disconnected);
    }
  }

  /// ### OPEN TRANSACTION COUNT
  pub fn pending(&self) -> usize {
    self.slots.lock().unwrap().len()
  }
}
impl Default for TransactionManager {
  fn default() -> Self {
    Self::new()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::time::Duration;

  fn control_reply(system: u32) -> Reply {
    Reply::Control {
      header: FrameHeader::control(0, 2, 0, system),
    }
  }

  #[test]
  fn allocation_is_unique_and_monotonic() {
    let manager = TransactionManager::new();
    let first = manager.allocate();
    let second = manager.allocate();
    assert_eq!(first, 1);
    assert_eq!(second, 2);
  }

  #[test]
  fn complete_resolves_exactly_one_waiter() {
    let manager = TransactionManager::new();
    let system = manager.allocate();
    let receiver = manager
      .register(system, Instant::now() + Duration::from_secs(5))
      .unwrap();
    assert_eq!(manager.pending(), 1);
    assert!(manager.complete(system, control_reply(system)));
    assert!(matches!(receiver.recv().unwrap(), Reply::Control { .. }));
    // The slot is gone; a second completion finds nothing.
    assert!(!manager.complete(system, control_reply(system)));
    assert_eq!(manager.pending(), 0);
  }

  #[test]
  fn duplicate_registration_refused() {
    let manager = TransactionManager::new();
    let system = manager.allocate();
    let _receiver = manager
      .register(system, Instant::now() + Duration::from_secs(5))
      .unwrap();
    assert!(manager.register(system, Instant::now()).is_none());
  }

  #[test]
  fn sweep_times_out_expired_slots_only() {
    let manager = TransactionManager::new();
    let expired = manager.allocate();
    let alive = manager.allocate();
    let expired_rx = manager.register(expired, Instant::now()).unwrap();
    let alive_rx = manager
      .register(alive, Instant::now() + Duration::from_secs(60))
      .unwrap();
    manager.sweep(Instant::now() + Duration::from_millis(1));
    assert!(matches!(expired_rx.recv().unwrap(), Reply::Timeout));
    assert_eq!(manager.pending(), 1);
    assert!(alive_rx.try_recv().is_err());
  }

  #[test]
  fn abort_all_disconnects_every_waiter() {
    let manager = TransactionManager::new();
    let mut receivers = vec![];
    for _ in 0..3 {
      let system = manager.allocate();
      receivers.push(
        manager
          .register(system, Instant::now() + Duration::from_secs(60))
          .unwrap(),
      );
    }
    manager.abort_all();
    for receiver in receivers {
      assert!(matches!(receiver.recv().unwrap(), Reply::Disconnected));
    }
    assert_eq!(manager.pending(), 0);
  }

  #[test]
  fn registration_before_send_matches_early_reply() {
    // A reply processed on another thread immediately after registration
    // must find the slot even though the sender has not begun waiting.
    let manager = std::sync::Arc::new(TransactionManager::new());
    let system = manager.allocate();
    let receiver = manager
      .register(system, Instant::now() + Duration::from_secs(5))
      .unwrap();
    let remote = manager.clone();
    let completer = std::thread::spawn(move || {
      remote.complete(system, control_reply(system))
    });
    assert!(completer.join().unwrap());
    assert!(matches!(receiver.recv().unwrap(), Reply::Control { .. }));
  }
}
