//! Loopback demonstration: an equipment stack and a host stack on one
//! machine, walking the whole profile end to end. Run with
//! `RUST_LOG=debug` to watch the frame traffic.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use gem::{ControlState, Handler, MemoryStore, Settings, Variable};
use secs2::Item;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn wait_until(what: &str, predicate: impl Fn() -> bool) {
  let deadline = Instant::now() + Duration::from_secs(30);
  while !predicate() {
    if Instant::now() >= deadline {
      panic!("timed out waiting for {what}");
    }
    thread::sleep(Duration::from_millis(25));
  }
}

fn main() {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .init();

  // EQUIPMENT
  //
  // Passive on an ephemeral port, with a small variable store.
  let store = Arc::new(MemoryStore::new());
  store.insert(1, Variable::new("ChamberTemperature", "degC", Item::f4(182.5)));
  store.insert(2, Variable::new("WaferCount", "", Item::u4(125)));
  store.insert(100, Variable::new("PurgeSeconds", "s", Item::u2(30)));

  let mut equipment_settings = Settings::equipment("127.0.0.1:0", 1);
  equipment_settings.mdln = "demo-tool".into();
  equipment_settings.softrev = "1.0.0".into();
  equipment_settings.establish_communication_timeout = Duration::from_secs(1);
  let equipment = Handler::new(equipment_settings, store);
  let equipment_transitions = equipment.transitions();
  equipment.enable();
  wait_until("equipment bind", || equipment.local_addr().is_some());
  let address = equipment.local_addr().unwrap();
  info!(%address, "equipment listening");

  // HOST
  let mut host_settings = Settings::host(&address.to_string(), 1);
  host_settings.establish_communication_timeout = Duration::from_secs(1);
  let host = Handler::new(host_settings, Arc::new(MemoryStore::new()));
  host.enable();

  wait_until("communication", || {
    host.is_communicating() && equipment.is_communicating()
  });
  info!("communication established on both sides");

  // Bring the equipment on-line and read it out.
  let onlack = host.request_online().expect("request online");
  info!(?onlack, control_state = ?equipment.control_state(), "on-line request answered");
  assert_eq!(equipment.control_state(), ControlState::OnlineRemote);

  let status = host
    .send_and_wait(1, 3, Some(Item::List(vec![Item::u4(1), Item::u4(2)])))
    .expect("status request");
  info!(text = ?status.text, "selected equipment status");

  let namelist = host
    .send_and_wait(1, 11, Some(Item::empty_list()))
    .expect("namelist request");
  info!(text = ?namelist.text, "status variable namelist");

  let constants = host
    .send_and_wait(2, 13, Some(Item::List(vec![Item::u4(100)])))
    .expect("constant request");
  info!(text = ?constants.text, "equipment constants");

  // Orderly teardown: the host separates, both sessions fall back to NOT
  // CONNECTED, and nothing outlives the handlers.
  host.disable();
  equipment.disable();
  assert_eq!(equipment.session().state(), hsms::SessionState::NotConnected);

  println!("\ntransition log:");
  for transition in equipment_transitions.try_iter() {
    println!(
      "  {} {:>13}: {} -> {}",
      transition.at.format("%H:%M:%S%.3f"),
      transition.machine,
      transition.from,
      transition.to,
    );
  }
}
