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

//! Whole-stack exercises over loopback TCP: one equipment handler, one host
//! handler, real sockets, real timers.

use std::sync::mpsc::channel;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use gem::{ControlState, Handler, MemoryStore, Settings, Variable, VariableStore};
use secs2::codes::OnLineAck;
use secs2::registry::FunctionRegistry;
use secs2::schema::BodySchema;
use secs2::Item;

fn shorten(settings: &mut Settings) {
  settings.hsms.t3 = Duration::from_millis(900);
  settings.hsms.t6 = Duration::from_secs(2);
  settings.establish_communication_timeout = Duration::from_millis(500);
}

fn wait_until(what: &str, predicate: impl Fn() -> bool) {
  let deadline = Instant::now() + Duration::from_secs(15);
  while !predicate() {
    assert!(Instant::now() < deadline, "timed out waiting for {what}");
    thread::sleep(Duration::from_millis(20));
  }
}

fn equipment_with_store() -> (Arc<Handler>, Arc<MemoryStore>) {
  let store = Arc::new(MemoryStore::new());
  store.insert(1, Variable::new("Temperature", "degC", Item::f4(42.0)));
  store.insert(2, Variable::new("LotId", "", Item::ascii("LOT-0001").unwrap()));
  let mut settings = Settings::equipment("127.0.0.1:0", 7);
  shorten(&mut settings);
  let equipment = Handler::new(settings, store.clone());
  equipment.enable();
  wait_until("equipment bind", || equipment.local_addr().is_some());
  (equipment, store)
}

#[test]
fn establish_request_online_and_read_variables() {
  let (equipment, _store) = equipment_with_store();
  let address = equipment.local_addr().unwrap();

  let mut settings = Settings::host(&address.to_string(), 7);
  shorten(&mut settings);
  let host = Handler::new(settings, Arc::new(MemoryStore::new()));
  let transitions = host.transitions();
  host.enable();

  // Both communication machines reach COMMUNICATING off one S1F13/S1F14
  // exchange, whichever side wins the race to send it.
  wait_until("communication established", || {
    host.is_communicating() && equipment.is_communicating()
  });

  // Host requests ON-LINE; the equipment's default offline substate is
  // HOST OFF-LINE, so the request is granted into ON-LINE REMOTE.
  assert_eq!(host.request_online().unwrap(), OnLineAck::Accepted);
  assert_eq!(equipment.control_state(), ControlState::OnlineRemote);

  // S1F3 for one status variable.
  let reply = host
    .send_and_wait(1, 3, Some(Item::List(vec![Item::u4(1)])))
    .unwrap();
  assert_eq!((reply.stream, reply.function), (1, 4));
  assert_eq!(reply.text, Some(Item::List(vec![Item::f4(42.0)])));

  // S1F11 namelist for everything.
  let namelist = host
    .send_and_wait(1, 11, Some(Item::empty_list()))
    .unwrap();
  match namelist.text {
    Some(Item::List(entries)) => assert_eq!(entries.len(), 2),
    other => panic!("expected a namelist, got {other:?}"),
  }

  // The transition stream carries timestamped records for both machines.
  let seen: Vec<_> = transitions.try_iter().collect();
  assert!(seen
    .iter()
    .any(|transition| transition.machine == "communication" && transition.to == "COMMUNICATING"));

  host.disable();
  equipment.disable();
}

#[test]
fn host_offline_request_moves_control_state() {
  let (equipment, _store) = equipment_with_store();
  let address = equipment.local_addr().unwrap();

  let mut settings = Settings::host(&address.to_string(), 7);
  shorten(&mut settings);
  let host = Handler::new(settings, Arc::new(MemoryStore::new()));
  host.enable();
  wait_until("communication established", || {
    host.is_communicating() && equipment.is_communicating()
  });

  host.request_online().unwrap();
  wait_until("online", || equipment.control_state().is_online());
  host.request_offline().unwrap();
  assert_eq!(equipment.control_state(), ControlState::HostOffline);

  host.disable();
  equipment.disable();
}

#[test]
fn equipment_constants_round_trip() {
  let (equipment, store) = equipment_with_store();
  let address = equipment.local_addr().unwrap();

  let mut settings = Settings::host(&address.to_string(), 7);
  shorten(&mut settings);
  let host = Handler::new(settings, Arc::new(MemoryStore::new()));
  host.enable();
  wait_until("communication established", || {
    host.is_communicating() && equipment.is_communicating()
  });

  // S2F15 writes, S2F13 reads back.
  let write = host
    .send_and_wait(
      2,
      15,
      Some(Item::List(vec![Item::List(vec![
        Item::u4(1),
        Item::f4(55.5),
      ])])),
    )
    .unwrap();
  assert_eq!(write.text, Some(Item::bin(0)));
  assert_eq!(store.get(1), Some(Item::f4(55.5)));

  let read = host
    .send_and_wait(2, 13, Some(Item::List(vec![Item::u4(1)])))
    .unwrap();
  assert_eq!(read.text, Some(Item::List(vec![Item::f4(55.5)])));

  host.disable();
  equipment.disable();
}

/// A vendor extension the host knows and the equipment does not.
static S63F1: secs2::registry::FunctionSchema = secs2::registry::FunctionSchema {
  stream: 63,
  function: 1,
  name: "VendorQuery",
  w: true,
  body: BodySchema::Any,
  secondary: Some((63, 2)),
};

#[test]
fn unknown_function_is_answered_with_s9f3_and_no_callback_runs() {
  let (equipment, _store) = equipment_with_store();
  let address = equipment.local_addr().unwrap();

  let mut settings = Settings::host(&address.to_string(), 7);
  shorten(&mut settings);
  settings.registry = Arc::new(FunctionRegistry::standard().with(&S63F1));
  let host = Handler::new(settings, Arc::new(MemoryStore::new()));
  host.enable();
  wait_until("communication established", || {
    host.is_communicating() && equipment.is_communicating()
  });

  // Capture the S9F3 the equipment emits.
  let (report_sender, report_receiver) = channel();
  host.register_callback(9, 3, Arc::new(move |message| {
    let _ = report_sender.send(message.clone());
    None
  }));

  // The equipment has no schema and no callback for S63F1: it answers
  // with S9F3 rather than a S63F2 secondary, so the waiter runs out T3.
  let outcome = host.send_and_wait(63, 1, Some(Item::u1(1)));
  assert!(matches!(outcome, Err(gem::Error::Timeout)), "got {outcome:?}");

  let report = report_receiver.recv_timeout(Duration::from_secs(5)).unwrap();
  assert_eq!((report.stream, report.function), (9, 3));
  match report.text {
    Some(Item::Bin(offending_header)) => {
      assert_eq!(offending_header.len(), 10);
      // The echoed header names the stream the equipment did not know.
      assert_eq!(offending_header[2] & 0x7F, 63);
      assert_eq!(offending_header[3], 1);
    }
    other => panic!("expected the offending header, got {other:?}"),
  }

  host.disable();
  equipment.disable();
}
