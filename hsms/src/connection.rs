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

//! # CONNECTIONS
//! **Based on SEMI E37-1109§6.3-6.5**
//!
//! ---------------------------------------------------------------------------
//!
//! The byte stream underneath the protocol. A [Connection] owns one TCP
//! socket, one receiver thread, and a send guard; endpoints are obtained
//! three ways:
//!
//! - [Dial] - the active mode: initiate toward a published port, retrying
//!   every [T5] until stopped.
//! - [Accept] - the passive mode: bind once and accept one peer.
//! - [Multi-Passive Listener] - bind once and demultiplex accepted sockets
//!   by remote address to per-peer handlers.
//!
//! Every wait in this module is bounded by [SELECT TIMEOUT], so a shutdown
//! request is always observed within that bound. No busy-wait exists: the
//! receiver thread parks in the socket read, and closing hands are joined
//! through a condition variable.
//!
//! [Connection]:             Connection
//! [Dial]:                   dial
//! [Accept]:                 accept_one
//! [Multi-Passive Listener]: MultiPassiveListener
//! [SELECT TIMEOUT]:         SELECT_TIMEOUT
//! [T5]:                     crate::ParameterSettings::t5

use std::collections::HashMap;
use std::io::{ErrorKind, Read, Write};
use std::net::{IpAddr, Shutdown, SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering::Relaxed};
use std::sync::{Arc, Condvar, Mutex, RwLock};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

/// ### SELECT TIMEOUT
///
/// The bound on every socket readiness wait. Shutdown is always observed
/// within this interval.
pub const SELECT_TIMEOUT: Duration = Duration::from_millis(500);

/// ### RECEIVE BUFFER SIZE
const RECV_CHUNK: usize = 4096;

/// ## CONNECTION EVENTS
///
/// The hooks a connection owner installs before the receiver thread starts.
/// All of them run on the receiver thread.
///
/// The terminal hooks run in a fixed order: `on_disconnecting` fires before
/// the socket closes, `on_disconnected` after. By the time either runs, the
/// connection no longer accepts sends, so hooks observing session state see
/// it already torn down.
#[derive(Clone)]
pub struct ConnectionEvents {
  /// ### DATA HOOK
  ///
  /// Called with each chunk of received bytes, in arrival order.
  pub on_data: Arc<dyn Fn(&[u8]) + Send + Sync>,

  /// ### CONNECTED HOOK
  ///
  /// Called once, before the first data, with the peer address.
  pub on_connected: Arc<dyn Fn(SocketAddr) + Send + Sync>,

  /// ### DISCONNECTING HOOK
  ///
  /// Called when reception has ended, before the socket closes.
  pub on_disconnecting: Arc<dyn Fn() + Send + Sync>,

  /// ### DISCONNECTED HOOK
  ///
  /// Called after the socket has closed.
  pub on_disconnected: Arc<dyn Fn() + Send + Sync>,
}
impl Default for ConnectionEvents {
  /// ### DEFAULT EVENTS
  ///
  /// Every hook a no-op.
  fn default() -> Self {
    Self {
      on_data: Arc::new(|_| {}),
      on_connected: Arc::new(|_| {}),
      on_disconnecting: Arc::new(|| {}),
      on_disconnected: Arc::new(|| {}),
    }
  }
}

/// ## CONNECTION
///
/// One live TCP link. The receiver thread performs bounded reads and feeds
/// the data hook; sends run on the caller's thread under a send guard so
/// frames never interleave on the wire.
pub struct Connection {
  /// ### PEER ADDRESS
  peer: SocketAddr,

  /// ### SEND GUARD
  ///
  /// The write half. Holding the lock across a whole frame write is what
  /// guarantees program-order delivery.
  writer: Mutex<TcpStream>,

  /// ### STOP FLAG
  stop: Arc<AtomicBool>,

  /// ### RECEIVER LIFECYCLE
  ///
  /// True while the receiver thread runs. The paired condition variable
  /// lets [Close] wait for the thread without spinning.
  ///
  /// [Close]: Connection::close
  lifecycle: Arc<(Mutex<bool>, Condvar)>,

  /// ### RECEIVER GATE
  ///
  /// The receiver thread parks here until [Begin] opens it, so the owner
  /// can finish wiring itself up before the first byte is delivered.
  ///
  /// [Begin]: Connection::begin
  gate: Arc<(Mutex<bool>, Condvar)>,

  /// ### RECEIVER THREAD
  receiver: Mutex<Option<JoinHandle<()>>>,
}
impl Connection {
  /// ### START CONNECTION
  ///
  /// Takes ownership of a connected socket, applies the bounded read and
  /// write timeouts, fires the connected hook, and starts the receiver
  /// thread. The receiver stays parked until [Begin] releases it, so the
  /// owner may install itself before the first byte arrives.
  ///
  /// [Begin]: Connection::begin
  pub fn start(stream: TcpStream, events: ConnectionEvents) -> std::io::Result<Connection> {
    let peer = stream.peer_addr()?;
    stream.set_read_timeout(Some(SELECT_TIMEOUT))?;
    stream.set_write_timeout(Some(SELECT_TIMEOUT))?;
    let writer = stream.try_clone()?;

    let stop = Arc::new(AtomicBool::new(false));
    let lifecycle = Arc::new((Mutex::new(true), Condvar::new()));
    let gate = Arc::new((Mutex::new(false), Condvar::new()));

    (events.on_connected)(peer);

    // RECEIVER THREAD
    //
    // The one task reading this socket. Reads are bounded by the read
    // timeout, so the stop flag is observed within SELECT_TIMEOUT. A read
    // of zero bytes means the peer closed the stream.
    let receiver = {
      let stop = stop.clone();
      let lifecycle = lifecycle.clone();
      let gate = gate.clone();
      thread::spawn(move || {
        // Park until the owner is wired up or the connection closes.
        {
          let (open, signal) = &*gate;
          let mut guard = open.lock().unwrap();
          while !*guard && !stop.load(Relaxed) {
            guard = signal.wait_timeout(guard, SELECT_TIMEOUT).unwrap().0;
          }
        }
        let mut buffer = [0u8; RECV_CHUNK];
        let mut reader = &stream;
        while !stop.load(Relaxed) {
          match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(received) => (events.on_data)(&buffer[..received]),
            Err(error) => match error.kind() {
              ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted => continue,
              _ => {
                debug!(peer = %peer, error = %error, "receive failed");
                break
              }
            },
          }
        }

        // TEARDOWN
        //
        // Reception has ended, by stop request, peer closure, or fault.
        // The disconnecting hook runs first, then the socket closes, then
        // the disconnected hook, then close() is released.
        (events.on_disconnecting)();
        let _ = stream.shutdown(Shutdown::Both);
        (events.on_disconnected)();
        let (running, signal) = &*lifecycle;
        *running.lock().unwrap() = false;
        signal.notify_all();
      })
    };

    Ok(Connection {
      peer,
      writer: Mutex::new(writer),
      stop,
      lifecycle,
      gate,
      receiver: Mutex::new(Some(receiver)),
    })
  }

  /// ### BEGIN RECEPTION
  ///
  /// Releases the parked receiver thread. Data hooks fire only after this.
  pub fn begin(&self) {
    let (open, signal) = &*self.gate;
    *open.lock().unwrap() = true;
    signal.notify_all();
  }

  /// ### PEER ADDRESS
  pub fn peer(&self) -> SocketAddr {
    self.peer
  }

  /// ### IS OPEN
  ///
  /// Whether the receiver thread still runs.
  pub fn is_open(&self) -> bool {
    *self.lifecycle.0.lock().unwrap()
  }

  /// ### SEND BYTES
  ///
  /// Writes a whole buffer under the send guard, waiting for writability in
  /// bounded slices and retrying when the socket would block. A return of
  /// false means the connection is unusable and the caller must treat the
  /// session as broken.
  pub fn send(&self, bytes: &[u8]) -> bool {
    let mut writer = self.writer.lock().unwrap();
    let mut written: usize = 0;
    while written < bytes.len() {
      if self.stop.load(Relaxed) {
        return false
      }
      match writer.write(&bytes[written..]) {
        Ok(0) => return false,
        Ok(sent) => written += sent,
        Err(error) => match error.kind() {
          // The bounded write timeout expired with the socket still
          // unwritable; retry until stopped.
          ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted => continue,
          _ => {
            debug!(peer = %self.peer, error = %error, "send failed");
            return false
          }
        },
      }
    }
    true
  }

  /// ### SHUT DOWN WITHOUT JOINING
  ///
  /// Requests the receiver thread to stop and shuts the socket down, but
  /// does not wait for the teardown. This is the only form safe to call
  /// from the receiver thread itself, where [Close] would wait on its own
  /// completion.
  ///
  /// [Close]: Connection::close
  pub fn shutdown(&self) {
    self.stop.store(true, Relaxed);
    self.gate.1.notify_all();
    let _ = self.writer.lock().unwrap().shutdown(Shutdown::Both);
  }

  /// ### CLOSE CONNECTION
  ///
  /// Requests the receiver thread to stop, shuts the socket down so a
  /// blocked read returns immediately, and waits for the thread to run its
  /// teardown. Idempotent.
  pub fn close(&self) {
    self.stop.store(true, Relaxed);
    self.gate.1.notify_all();
    let _ = self.writer.lock().unwrap().shutdown(Shutdown::Both);
    let (running, signal) = &*self.lifecycle;
    let mut guard = running.lock().unwrap();
    while *guard {
      let (next, timeout) = signal
        .wait_timeout(guard, SELECT_TIMEOUT)
        .unwrap();
      guard = next;
      if timeout.timed_out() {
        // The receiver observes the stop flag within one bounded read.
        // Looping again covers a wakeup racing the flag store.
        continue
      }
    }
    drop(guard);
    if let Some(handle) = self.receiver.lock().unwrap().take() {
      let _ = handle.join();
    }
  }
}

/// ## DIAL
/// **Based on SEMI E37-1109§6.3.4-6.3.7**
///
/// The active connect procedure: resolve the entity, initiate, and on
/// failure wait out the T5 connect separation before the next attempt,
/// until a connection lands or the stop flag is raised.
///
/// Returns [None] when stopped before a connection was obtained.
pub fn dial(entity: &str, t5: Duration, stop: &AtomicBool) -> std::io::Result<Option<TcpStream>> {
  let address: SocketAddr = entity
    .to_socket_addrs()?
    .next()
    .ok_or_else(|| std::io::Error::new(ErrorKind::AddrNotAvailable, "entity resolved to no address"))?;
  loop {
    if stop.load(Relaxed) {
      return Ok(None)
    }
    match TcpStream::connect_timeout(&address, t5) {
      Ok(stream) => return Ok(Some(stream)),
      Err(error) => {
        debug!(entity, error = %error, "connect attempt failed, separating");
        // T5 CONNECT SEPARATION
        //
        // Sliced into bounded waits so the stop flag stays observable.
        let until = Instant::now() + t5;
        while Instant::now() < until {
          if stop.load(Relaxed) {
            return Ok(None)
          }
          thread::sleep(SELECT_TIMEOUT.min(until.saturating_duration_since(Instant::now())));
        }
      }
    }
  }
}

/// ## BIND
///
/// The passive bind step, separated from accepting so a caller may learn
/// the bound address before any peer arrives.
pub fn bind(entity: &str) -> std::io::Result<TcpListener> {
  let listener = TcpListener::bind(entity)?;
  listener.set_nonblocking(true)?;
  Ok(listener)
}

/// ## ACCEPT
///
/// The passive accept step: polls the listener in bounded slices until one
/// peer arrives or the stop flag is raised.
pub fn accept_one(listener: &TcpListener, stop: &AtomicBool) -> std::io::Result<Option<TcpStream>> {
  loop {
    if stop.load(Relaxed) {
      return Ok(None)
    }
    match listener.accept() {
      Ok((stream, _peer)) => {
        stream.set_nonblocking(false)?;
        return Ok(Some(stream))
      }
      Err(error) => match error.kind() {
        ErrorKind::WouldBlock => thread::sleep(SELECT_TIMEOUT),
        _ => return Err(error),
      },
    }
  }
}

/// ### PER-PEER ROUTE
///
/// The handler a multi-passive listener hands an accepted socket to.
pub type PeerRoute = Arc<dyn Fn(TcpStream, SocketAddr) + Send + Sync>;

/// ## MULTI-PASSIVE LISTENER
///
/// One bound socket serving several remote entities. Accepted sockets are
/// demultiplexed by remote IP address to the route registered for that
/// peer; a socket from an unregistered address is dropped.
///
/// Each route typically wraps the accepted socket in its own session, so
/// one listener yields one independent per-peer stack instance per remote.
pub struct MultiPassiveListener {
  /// ### BOUND ADDRESS
  local: SocketAddr,

  /// ### STOP FLAG
  stop: Arc<AtomicBool>,

  /// ### PEER ROUTES
  routes: Arc<RwLock<HashMap<IpAddr, PeerRoute>>>,

  /// ### ACCEPT THREAD
  acceptor: Mutex<Option<JoinHandle<()>>>,
}
impl MultiPassiveListener {
  /// ### LISTEN
  ///
  /// Binds the entity and starts the accept thread.
  pub fn listen(entity: &str) -> std::io::Result<MultiPassiveListener> {
    let listener = bind(entity)?;
    let local = listener.local_addr()?;
    let stop = Arc::new(AtomicBool::new(false));
    let routes: Arc<RwLock<HashMap<IpAddr, PeerRoute>>> = Arc::new(RwLock::new(HashMap::new()));

    let acceptor = {
      let stop = stop.clone();
      let routes = routes.clone();
      thread::spawn(move || {
        while !stop.load(Relaxed) {
          match listener.accept() {
            Ok((stream, peer)) => {
              let route = routes.read().unwrap().get(&peer.ip()).cloned();
              match route {
                Some(route) => {
                  if stream.set_nonblocking(false).is_ok() {
                    route(stream, peer);
                  }
                }
                None => {
                  warn!(peer = %peer, "no session registered for remote address, dropping");
                  let _ = stream.shutdown(Shutdown::Both);
                }
              }
            }
            Err(error) => match error.kind() {
              ErrorKind::WouldBlock => thread::sleep(SELECT_TIMEOUT),
              _ => break,
            },
          }
        }
      })
    };

    Ok(MultiPassiveListener {
      local,
      stop,
      routes,
      acceptor: Mutex::new(Some(acceptor)),
    })
  }

  /// ### BOUND ADDRESS
  pub fn local_addr(&self) -> SocketAddr {
    self.local
  }

  /// ### REGISTER PEER
  ///
  /// Routes future sockets from this remote address to the given handler.
  pub fn register(&self, remote: IpAddr, route: PeerRoute) {
    self.routes.write().unwrap().insert(remote, route);
  }

  /// ### DEREGISTER PEER
  pub fn deregister(&self, remote: IpAddr) {
    self.routes.write().unwrap().remove(&remote);
  }

  /// ### CLOSE LISTENER
  ///
  /// Stops the accept thread. Sessions already handed out are unaffected.
  pub fn close(&self) {
    self.stop.store(true, Relaxed);
    if let Some(handle) = self.acceptor.lock().unwrap().take() {
      let _ = handle.join();
    }
  }
}
impl Drop for MultiPassiveListener {
  fn drop(&mut self) {
    self.close();
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::mpsc::channel;

  fn loopback_pair() -> (TcpStream, TcpStream) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let address = listener.local_addr().unwrap();
    let dialed = TcpStream::connect(address).unwrap();
    let (accepted, _) = listener.accept().unwrap();
    (dialed, accepted)
  }

  #[test]
  fn bytes_flow_to_data_hook() {
    let (near, far) = loopback_pair();
    let (tx, rx) = channel::<Vec<u8>>();
    let events = ConnectionEvents {
      on_data: Arc::new(move |bytes| {
        let _ = tx.send(bytes.to_vec());
      }),
      ..Default::default()
    };
    let connection = Connection::start(near, events).unwrap();
    connection.begin();
    let remote = Connection::start(far, ConnectionEvents::default()).unwrap();
    remote.begin();

    assert!(remote.send(&[1, 2, 3]));
    let mut received = vec![];
    while received.len() < 3 {
      received.extend(rx.recv_timeout(Duration::from_secs(2)).unwrap());
    }
    assert_eq!(received, vec![1, 2, 3]);

    connection.close();
    remote.close();
  }

  #[test]
  fn close_runs_terminal_hooks_in_order() {
    let (near, far) = loopback_pair();
    let (tx, rx) = channel::<&'static str>();
    let disconnecting_tx = tx.clone();
    let events = ConnectionEvents {
      on_disconnecting: Arc::new(move || {
        let _ = disconnecting_tx.send("disconnecting");
      }),
      on_disconnected: Arc::new(move || {
        let _ = tx.send("disconnected");
      }),
      ..Default::default()
    };
    let connection = Connection::start(near, events).unwrap();
    connection.close();
    assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), "disconnecting");
    assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), "disconnected");
    assert!(!connection.is_open());
    drop(far);
  }

  #[test]
  fn peer_closure_is_observed() {
    let (near, far) = loopback_pair();
    let connection = Connection::start(near, ConnectionEvents::default()).unwrap();
    connection.begin();
    drop(far);
    let deadline = Instant::now() + Duration::from_secs(2);
    while connection.is_open() && Instant::now() < deadline {
      thread::sleep(Duration::from_millis(10));
    }
    assert!(!connection.is_open());
    assert!(!connection.send(&[0]));
    connection.close();
  }

  #[test]
  fn send_after_close_fails() {
    let (near, far) = loopback_pair();
    let connection = Connection::start(near, ConnectionEvents::default()).unwrap();
    connection.close();
    assert!(!connection.send(&[1, 2, 3]));
    drop(far);
  }

  #[test]
  fn dial_observes_stop() {
    // An address from TEST-NET-1, which does not answer.
    let stop = AtomicBool::new(false);
    stop.store(true, Relaxed);
    let result = dial("192.0.2.1:5000", Duration::from_millis(200), &stop).unwrap();
    assert!(result.is_none());
  }

  #[test]
  fn multi_passive_routes_by_remote_address() {
    let listener = MultiPassiveListener::listen("127.0.0.1:0").unwrap();
    let (tx, rx) = channel::<SocketAddr>();
    listener.register(
      IpAddr::from([127, 0, 0, 1]),
      Arc::new(move |_stream, peer| {
        let _ = tx.send(peer);
      }),
    );
    let client = TcpStream::connect(listener.local_addr()).unwrap();
    let routed = rx.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(routed.ip(), IpAddr::from([127, 0, 0, 1]));
    drop(client);
    listener.close();
  }
}
