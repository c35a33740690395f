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

//! # HANDLER
//!
//! ---------------------------------------------------------------------------
//!
//! The high-level surface of the stack: one HSMS session, the function
//! registry checking every body in both directions, callback dispatch for
//! primaries, and the supervisor task that keeps the connection, selection,
//! and the S1F13/S1F14 establish exchange alive.
//!
//! Delivery rules:
//!
//! - A secondary resolves exactly one waiter, matched by system bytes in
//!   the session layer.
//! - A primary goes to the callback registered for its (stream, function);
//!   when the primary carries the W-bit, the callback's return value is
//!   sent back as the function-plus-one secondary.
//! - A primary with no callback is answered with S9F3, the offending
//!   header echoed.
//! - A known function whose body fails its schema is answered with S9F5; a
//!   body that does not decode at all is answered with S9F7.
//!
//! Callbacks run on the receive task. A panicking callback is caught and
//! logged; a callback that must block should hand its work to a pool and
//! return promptly.

use std::collections::HashMap;
use std::net::{SocketAddr, TcpListener};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering::Relaxed};
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex, RwLock};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use hsms::connection;
use hsms::frame::FrameHeader;
use hsms::{ConnectionMode, Inbound, Reply, SessionState};
use secs2::codes::{CommAck, EquipmentAck, OffLineAck, OnLineAck};
use secs2::registry::{self, FunctionSchema};
use secs2::Item;
use tracing::{debug, error, info, warn};

use crate::communication::{CommunicationMachine, CommunicationState};
use crate::control::{ControlMachine, ControlState};
use crate::store::{SetAck, VariableStore};
use crate::{Error, Settings, Transition, TransitionBus};

/// ### SUPERVISOR TICK
///
/// The pause between supervisor passes when there is nothing to drive.
const RETRY_TICK: Duration = Duration::from_millis(100);

/// ### CALLBACK
///
/// A primary handler: receives the message, returns the reply body to send
/// when the primary requested one.
pub type Callback = Arc<dyn Fn(&secs2::Message) -> Option<Item> + Send + Sync>;

/// ## HANDLER
///
/// One stack instance serving one peer endpoint.
pub struct Handler {
  /// ### SETTINGS
  settings: Settings,

  /// ### HSMS SESSION
  session: Arc<hsms::Session>,

  /// ### COMMUNICATION MACHINE
  communication: Arc<CommunicationMachine>,

  /// ### CONTROL MACHINE
  control: Arc<ControlMachine>,

  /// ### CALLBACK TABLE
  callbacks: RwLock<HashMap<(u8, u8), Callback>>,

  /// ### VARIABLE STORE
  store: Arc<dyn VariableStore>,

  /// ### TRANSITION BUS
  bus: Arc<TransitionBus>,

  /// ### ENABLED FLAG
  enabled: AtomicBool,

  /// ### HALT FLAG
  ///
  /// Raised by disable to end the supervisor's bounded connect waits.
  halt: AtomicBool,

  /// ### SUPERVISOR TASK
  supervisor: Mutex<Option<JoinHandle<()>>>,

  /// ### PASSIVE LISTENER
  ///
  /// Bound once on the first passive connect and reused across
  /// reconnects.
  listener: Mutex<Option<TcpListener>>,

  /// ### BOUND ADDRESS
  bound: Mutex<Option<SocketAddr>>,
}

/// ## CONSTRUCTION AND LIFECYCLE
impl Handler {
  /// ### NEW HANDLER
  ///
  /// Builds the stack in the disabled state: session wired, built-in GEM
  /// callbacks registered, nothing connected yet.
  pub fn new(settings: Settings, store: Arc<dyn VariableStore>) -> Arc<Handler> {
    let bus = TransitionBus::new();
    let handler = Arc::new(Handler {
      session: hsms::Session::new(settings.hsms),
      communication: Arc::new(CommunicationMachine::new(bus.clone())),
      control: Arc::new(ControlMachine::new(bus.clone(), settings.initial_control_state)),
      callbacks: RwLock::new(HashMap::new()),
      store,
      bus,
      enabled: AtomicBool::new(false),
      halt: AtomicBool::new(false),
      supervisor: Mutex::new(None),
      listener: Mutex::new(None),
      bound: Mutex::new(None),
      settings,
    });

    let weak = Arc::downgrade(&handler);
    handler.session.set_data_handler(Arc::new(move |inbound| {
      if let Some(handler) = weak.upgrade() {
        handler.on_message(inbound);
      }
    }));
    handler.install_builtins();
    handler
  }

  /// ### ENABLE
  ///
  /// Starts the communication machine and the supervisor task that
  /// connects, selects, and drives the establish exchange.
  pub fn enable(self: &Arc<Self>) {
    if self.enabled.swap(true, Relaxed) {
      return
    }
    self.halt.store(false, Relaxed);
    self.communication.enable();
    let clone = self.clone();
    *self.supervisor.lock().unwrap() = Some(thread::spawn(move || clone.supervise()));
    info!(entity = %self.settings.entity, "handler enabled");
  }

  /// ### DISABLE
  ///
  /// Stops the supervisor, separates if selected, and closes the
  /// connection. The communication machine returns to DISABLED.
  pub fn disable(&self) {
    if !self.enabled.swap(false, Relaxed) {
      return
    }
    self.halt.store(true, Relaxed);
    self.communication.disable();
    if self.session.state() == SessionState::Selected {
      let _ = self.session.separate();
    } else {
      self.session.disconnect();
    }
    if let Some(handle) = self.supervisor.lock().unwrap().take() {
      let _ = handle.join();
    }
    info!("handler disabled");
  }

  /// ### IS COMMUNICATING
  pub fn is_communicating(&self) -> bool {
    self.communication.is_communicating()
  }

  /// ### COMMUNICATION STATE
  pub fn communication_state(&self) -> CommunicationState {
    self.communication.state()
  }

  /// ### CONTROL STATE
  pub fn control_state(&self) -> ControlState {
    self.control.state()
  }

  /// ### OBSERVE TRANSITIONS
  ///
  /// Subscribes to the timestamped transition stream of both state
  /// machines.
  pub fn transitions(&self) -> Receiver<Transition> {
    self.bus.observe()
  }

  /// ### BOUND ADDRESS
  ///
  /// The address a passive handler actually bound, once the supervisor
  /// has bound it.
  pub fn local_addr(&self) -> Option<SocketAddr> {
    *self.bound.lock().unwrap()
  }

  /// ### SESSION
  pub fn session(&self) -> &Arc<hsms::Session> {
    &self.session
  }

  /// ### VARIABLE STORE
  pub fn store(&self) -> &Arc<dyn VariableStore> {
    &self.store
  }

  /// ### REGISTER CALLBACK
  ///
  /// Installs the handler for a (stream, function), replacing any built-in
  /// registered for it.
  pub fn register_callback(&self, stream: u8, function: u8, callback: Callback) {
    self.callbacks.write().unwrap().insert((stream, function), callback);
  }
}

/// ## SEND SURFACE
impl Handler {
  /// ### SENDABILITY GATE
  ///
  /// Until the communication machine reaches COMMUNICATING, nothing but
  /// Stream 1 establishment traffic and Stream 9 reports leaves the
  /// stack. This is what keeps data collection quiet on a freshly enabled
  /// equipment.
  fn ensure_sendable(&self, stream: u8) -> Result<(), Error> {
    if matches!(stream, 1 | 9) || self.communication.is_communicating() {
      Ok(())
    } else {
      Err(Error::NotCommunicating)
    }
  }

  /// ### SEND AND WAIT FOR RESPONSE
  ///
  /// Builds the primary from the registry (validating the body before
  /// anything touches the wire), sends it, and waits up to T3. The reply
  /// body is validated against the secondary's schema before it is handed
  /// back.
  pub fn send_and_wait(
    &self,
    stream: u8,
    function: u8,
    body: Option<Item>,
  ) -> Result<secs2::Message, Error> {
    let schema = self
      .settings
      .registry
      .lookup(stream, function)
      .ok_or(Error::UnknownFunction { stream, function })?;
    self.ensure_sendable(stream)?;
    let message = secs2::Message::for_function(schema, body)?;
    if !message.w {
      return Err(Error::Hsms(hsms::Error::Protocol("function expects no reply")))
    }
    match self.session.request(message)? {
      Reply::Data { header, message } => {
        if let Some((stream, function)) = schema.secondary {
          if (message.stream, message.function) != (stream, function) {
            warn!(
              expected = %format!("S{stream}F{function}"),
              got = %format!("S{}F{}", message.stream, message.function),
              "reply named an unexpected function",
            );
          }
        }
        if let Some(reply_schema) = self
          .settings
          .registry
          .lookup(message.stream, message.function)
        {
          if let Err(error) = reply_schema.body.validate(message.text.as_ref()) {
            warn!(error = %error, "reply body failed its schema");
            self.send_s9(&registry::S9F5, header);
            return Err(Error::Secs(error))
          }
        }
        Ok(message)
      }
      Reply::Malformed { header, error } => {
        self.send_s9(&registry::S9F7, header);
        Err(Error::Secs(error))
      }
      Reply::Timeout => Err(Error::Timeout),
      Reply::Disconnected => Err(Error::Disconnected),
      Reply::Rejected { s_type, reason } => Err(Error::Rejected { s_type, reason }),
      Reply::Control { .. } => {
        Err(Error::Hsms(hsms::Error::Protocol("control reply to a data transaction")))
      }
    }
  }

  /// ### SEND STREAM FUNCTION
  ///
  /// Sends a registered function with no reply expected.
  pub fn send_stream_function(
    &self,
    stream: u8,
    function: u8,
    body: Option<Item>,
  ) -> Result<(), Error> {
    let schema = self
      .settings
      .registry
      .lookup(stream, function)
      .ok_or(Error::UnknownFunction { stream, function })?;
    self.ensure_sendable(stream)?;
    let mut message = secs2::Message::for_function(schema, body)?;
    // No waiter will be registered, so the W-bit must not solicit a
    // secondary that nothing would match.
    message.w = false;
    self.session.send(message)?;
    Ok(())
  }

  /// ### SEND RESPONSE
  ///
  /// Sends a secondary under the primary's system bytes, validating the
  /// body when the function is registered.
  pub fn send_response(
    &self,
    system: u32,
    stream: u8,
    function: u8,
    body: Option<Item>,
  ) -> Result<(), Error> {
    let message = match self.settings.registry.lookup(stream, function) {
      Some(schema) => secs2::Message::for_function(schema, body)?,
      None => secs2::Message::new(stream, function, false, body)?,
    };
    self.session.respond(system, message)?;
    Ok(())
  }

  /// ### STREAM 9 REPORT
  ///
  /// Emits an S9 primary carrying the offending header, when GEM is
  /// enabled.
  fn send_s9(&self, schema: &'static FunctionSchema, offending: FrameHeader) {
    if !self.enabled.load(Relaxed) {
      return
    }
    let header_bytes: [u8; 10] = offending.into();
    match secs2::Message::for_function(schema, Some(Item::Bin(header_bytes.to_vec()))) {
      Ok(message) => {
        if let Err(error) = self.session.send(message) {
          debug!(error = %error, "could not emit stream 9 report");
        }
      }
      Err(error) => warn!(error = %error, "stream 9 report did not build"),
    }
  }
}

/// ## RECEIVE PATH
impl Handler {
  /// ### ON MESSAGE
  ///
  /// The session's data hook: registry validation, callback dispatch, and
  /// the Stream 9 error replies. Runs on the receive task.
  fn on_message(&self, inbound: Inbound) {
    match inbound {
      Inbound::Malformed { header, error, .. } => {
        warn!(error = %error, "body did not decode, answering S9F7");
        self.send_s9(&registry::S9F7, header);
      }
      Inbound::Message { id, header, message } => {
        // RECEIVE-PATH VALIDATION
        //
        // The same schema check the send path runs. An unknown function is
        // not an error here; the message passes through raw and the
        // callback table decides its fate.
        if let Some(schema) = self
          .settings
          .registry
          .lookup(message.stream, message.function)
        {
          if let Err(error) = schema.body.validate(message.text.as_ref()) {
            warn!(
              function = schema.name,
              error = %error,
              "body failed its schema, answering S9F5",
            );
            self.send_s9(&registry::S9F5, header);
            return
          }
        } else {
          warn!(
            stream = message.stream,
            function = message.function,
            "message for an unregistered function",
          );
        }

        let callback = self
          .callbacks
          .read()
          .unwrap()
          .get(&(message.stream, message.function))
          .cloned();
        match callback {
          Some(callback) => {
            match catch_unwind(AssertUnwindSafe(|| callback(&message))) {
              Ok(reply_text) => {
                if message.w {
                  let reply = message.reply(reply_text);
                  if let Err(error) = self.session.respond(id.system, reply) {
                    warn!(error = %error, "reply did not send");
                  }
                }
              }
              // A panicking callback must never take the receive task
              // with it.
              Err(_) => error!(
                stream = message.stream,
                function = message.function,
                "callback panicked",
              ),
            }
          }
          None => {
            // A Stream 9 report is terminal; answering one with another
            // would volley indefinitely.
            if message.stream != 9 {
              warn!(
                stream = message.stream,
                function = message.function,
                "no callback registered, answering S9F3",
              );
              self.send_s9(&registry::S9F3, header);
            }
          }
        }
      }
    }
  }
}

/// ## SUPERVISOR
impl Handler {
  /// ### SUPERVISE
  ///
  /// The background task keeping the stack alive while enabled: obtain a
  /// connection (dialing with T5 separation, or accepting on the bound
  /// listener), select when active, and run the establish exchange until
  /// COMMUNICATING. Falls back to the start of the loop whenever the
  /// session drops.
  fn supervise(self: Arc<Handler>) {
    while self.enabled.load(Relaxed) {
      // CONNECTION
      if self.session.state() == SessionState::NotConnected {
        self.communication.lost();
        if !self.connect_once() {
          thread::sleep(RETRY_TICK);
          continue
        }
      }

      // SELECTION
      //
      // The active side initiates promptly after connecting; the passive
      // side waits for the remote's Select.req, bounded by T7.
      if self.session.state() == SessionState::NotSelected {
        if self.settings.hsms.connect_mode == ConnectionMode::Active {
          if let Err(error) = self.session.select() {
            debug!(error = %error, "select failed");
            thread::sleep(RETRY_TICK);
          }
        } else {
          thread::sleep(RETRY_TICK);
        }
        continue
      }

      // ESTABLISH COMMUNICATION
      match self.communication.state() {
        CommunicationState::Disabled => break,

        CommunicationState::Communicating => thread::sleep(RETRY_TICK),

        // Sit out the establish timeout, then retry. The wait breaks
        // early if the peer establishes from its side.
        CommunicationState::WaitDelay => {
          let until = Instant::now() + self.settings.establish_communication_timeout;
          while self.enabled.load(Relaxed)
            && Instant::now() < until
            && self.communication.state() == CommunicationState::WaitDelay
          {
            thread::sleep(RETRY_TICK);
          }
          self.communication.retry();
        }

        CommunicationState::WaitCra => {
          let body = if self.settings.is_equipment {
            self.mdln_softrev()
          } else {
            Item::empty_list()
          };
          let accepted = secs2::Message::for_function(&registry::S1F13, Some(body))
            .map_err(Error::from)
            .and_then(|message| self.session.request(message).map_err(Error::from))
            .map(|reply| match reply {
              Reply::Data { message, .. } => commack_accepted(&message),
              _ => false,
            })
            .unwrap_or(false);
          if accepted {
            self.communication.established();
            info!("communication established (initiator)");
          } else {
            self.communication.wait_delay();
          }
        }
      }
    }
  }

  /// ### ONE CONNECT PASS
  fn connect_once(&self) -> bool {
    match self.settings.hsms.connect_mode {
      ConnectionMode::Active => {
        match connection::dial(&self.settings.entity, self.settings.hsms.t5, &self.halt) {
          Ok(Some(stream)) => self.session.attach(stream).is_ok(),
          Ok(None) => false,
          Err(error) => {
            warn!(entity = %self.settings.entity, error = %error, "dial failed");
            false
          }
        }
      }
      ConnectionMode::Passive => {
        let mut guard = self.listener.lock().unwrap();
        if guard.is_none() {
          match connection::bind(&self.settings.entity) {
            Ok(listener) => {
              if let Ok(address) = listener.local_addr() {
                *self.bound.lock().unwrap() = Some(address);
              }
              *guard = Some(listener);
            }
            Err(error) => {
              warn!(entity = %self.settings.entity, error = %error, "bind failed");
              return false
            }
          }
        }
        let listener = guard.as_ref().expect("just bound");
        match connection::accept_one(listener, &self.halt) {
          Ok(Some(stream)) => self.session.attach(stream).is_ok(),
          _ => false,
        }
      }
    }
  }

  /// ### MDLN AND SOFTREV
  fn mdln_softrev(&self) -> Item {
    Item::List(vec![
      Item::ascii(&self.settings.mdln).unwrap_or(Item::Ascii(vec![])),
      Item::ascii(&self.settings.softrev).unwrap_or(Item::Ascii(vec![])),
    ])
  }
}

/// ## OPERATOR AND HOST PROCEDURES
impl Handler {
  /// ### OPERATOR: GO ON-LINE
  ///
  /// The equipment-side switch: enters ATTEMPT ON-LINE, verifies the host
  /// answers S1F1, and lands in ON-LINE LOCAL or falls back to EQUIPMENT
  /// OFF-LINE.
  pub fn operator_online(&self) -> Result<(), Error> {
    if !self.control.operator_attempts_online() {
      return Ok(())
    }
    match self.send_and_wait(1, 1, None) {
      Ok(_) => {
        self.control.attempt_resolved(true, ControlState::OnlineLocal);
        Ok(())
      }
      Err(error) => {
        self.control.attempt_resolved(false, ControlState::OnlineLocal);
        Err(error)
      }
    }
  }

  /// ### OPERATOR: GO OFF-LINE
  pub fn operator_offline(&self) {
    self.control.operator_offline();
  }

  /// ### OPERATOR: LOCAL CONTROL
  pub fn operator_local(&self) -> bool {
    self.control.operator_local()
  }

  /// ### OPERATOR: REMOTE CONTROL
  pub fn operator_remote(&self) -> bool {
    self.control.operator_remote()
  }

  /// ### HOST: REQUEST ON-LINE
  ///
  /// Sends S1F17 and decodes the ONLACK.
  pub fn request_online(&self) -> Result<OnLineAck, Error> {
    let reply = self.send_and_wait(1, 17, None)?;
    single_bin(&reply)
      .and_then(|code| OnLineAck::try_from(code).ok())
      .ok_or(Error::Secs(secs2::Error::SchemaViolation("ONLACK code missing".into())))
  }

  /// ### HOST: REQUEST OFF-LINE
  ///
  /// Sends S1F15 and decodes the OFLACK.
  pub fn request_offline(&self) -> Result<OffLineAck, Error> {
    let reply = self.send_and_wait(1, 15, None)?;
    single_bin(&reply)
      .and_then(|code| OffLineAck::try_from(code).ok())
      .ok_or(Error::Secs(secs2::Error::SchemaViolation("OFLACK code missing".into())))
  }
}

/// ## BUILT-IN GEM SERVICES
impl Handler {
  /// ### INSTALL BUILT-INS
  ///
  /// The default callbacks wired at construction. Applications override
  /// any of them through [Register Callback].
  ///
  /// [Register Callback]: Handler::register_callback
  fn install_builtins(self: &Arc<Self>) {
    // S1F1: Are You There.
    {
      let is_equipment = self.settings.is_equipment;
      let identity = self.mdln_softrev();
      self.register_callback(1, 1, Arc::new(move |_| {
        Some(if is_equipment { identity.clone() } else { Item::empty_list() })
      }));
    }

    // S1F13: the peer initiated the establish exchange.
    {
      let communication = self.communication.clone();
      let is_equipment = self.settings.is_equipment;
      let identity = self.mdln_softrev();
      self.register_callback(1, 13, Arc::new(move |_| {
        if communication.established() {
          info!("communication established (responder)");
        }
        let fields = if is_equipment { identity.clone() } else { Item::empty_list() };
        Some(Item::List(vec![Item::bin(CommAck::Accepted.into()), fields]))
      }));
    }

    if !self.settings.is_equipment {
      return
    }

    // S1F3: Selected Equipment Status Request.
    {
      let store = self.store.clone();
      self.register_callback(1, 3, Arc::new(move |message| {
        let ids = requested_ids(message);
        let values: Vec<Item> = if ids.is_empty() {
          store
            .list()
            .iter()
            .map(|info| store.get(info.id).unwrap_or_else(Item::empty_list))
            .collect()
        } else {
          ids
            .iter()
            .map(|id| {
              u32::try_from(*id)
                .ok()
                .and_then(|id| store.get(id))
                .unwrap_or_else(Item::empty_list)
            })
            .collect()
        };
        Some(Item::List(values))
      }));
    }

    // S1F11: Status Variable Namelist Request.
    {
      let store = self.store.clone();
      self.register_callback(1, 11, Arc::new(move |message| {
        let ids = requested_ids(message);
        let listing: Vec<Item> = store
          .list()
          .iter()
          .filter(|info| ids.is_empty() || ids.contains(&(info.id as u64)))
          .map(|info| {
            Item::List(vec![
              Item::u4(info.id),
              ascii_or_empty(&info.name),
              ascii_or_empty(&info.units),
            ])
          })
          .collect();
        Some(Item::List(listing))
      }));
    }

    // S1F15: Request OFF-LINE.
    {
      let control = self.control.clone();
      self.register_callback(1, 15, Arc::new(move |_| {
        Some(Item::bin(control.host_requests_offline() as u8))
      }));
    }

    // S1F17: Request ON-LINE.
    {
      let control = self.control.clone();
      let online_substate = self.settings.online_substate;
      self.register_callback(1, 17, Arc::new(move |_| {
        Some(Item::bin(control.host_requests_online(online_substate) as u8))
      }));
    }

    // S2F13: Equipment Constant Request.
    {
      let store = self.store.clone();
      self.register_callback(2, 13, Arc::new(move |message| {
        let ids = requested_ids(message);
        let values: Vec<Item> = if ids.is_empty() {
          store
            .list()
            .iter()
            .map(|info| store.get(info.id).unwrap_or_else(Item::empty_list))
            .collect()
        } else {
          ids
            .iter()
            .map(|id| {
              u32::try_from(*id)
                .ok()
                .and_then(|id| store.get(id))
                .unwrap_or_else(Item::empty_list)
            })
            .collect()
        };
        Some(Item::List(values))
      }));
    }

    // S2F15: New Equipment Constant Send.
    {
      let store = self.store.clone();
      self.register_callback(2, 15, Arc::new(move |message| {
        Some(Item::bin(apply_constant_writes(store.as_ref(), message).into()))
      }));
    }

    // S2F17: Date and Time Request.
    self.register_callback(2, 17, Arc::new(move |_| Some(time_of_day())));

    // S2F29: Equipment Constant Namelist Request.
    {
      let store = self.store.clone();
      self.register_callback(2, 29, Arc::new(move |message| {
        let ids = requested_ids(message);
        let listing: Vec<Item> = store
          .list()
          .iter()
          .filter(|info| ids.is_empty() || ids.contains(&(info.id as u64)))
          .map(|info| {
            Item::List(vec![
              Item::u4(info.id),
              ascii_or_empty(&info.name),
              info.min.clone().unwrap_or(Item::Ascii(vec![])),
              info.max.clone().unwrap_or(Item::Ascii(vec![])),
              store.get(info.id).unwrap_or(Item::Ascii(vec![])),
              ascii_or_empty(&info.units),
            ])
          })
          .collect();
        Some(Item::List(listing))
      }));
    }
  }
}

/// ### REQUESTED IDS
///
/// The integer ids named in a request body; empty means "all".
fn requested_ids(message: &secs2::Message) -> Vec<u64> {
  message
    .text
    .as_ref()
    .and_then(integer_values)
    .unwrap_or_default()
}

/// ### INTEGER VALUES
///
/// Flattens an item of any integer format (or a list of them) into plain
/// values. Negative values and non-integer formats yield [None].
fn integer_values(item: &Item) -> Option<Vec<u64>> {
  match item {
    Item::List(children) => {
      let mut values = vec![];
      for child in children {
        values.extend(integer_values(child)?);
      }
      Some(values)
    }
    Item::U1(vec) => Some(vec.iter().map(|value| *value as u64).collect()),
    Item::U2(vec) => Some(vec.iter().map(|value| *value as u64).collect()),
    Item::U4(vec) => Some(vec.iter().map(|value| *value as u64).collect()),
    Item::U8(vec) => Some(vec.to_vec()),
    Item::I1(vec) => vec.iter().map(|value| u64::try_from(*value).ok()).collect(),
    Item::I2(vec) => vec.iter().map(|value| u64::try_from(*value).ok()).collect(),
    Item::I4(vec) => vec.iter().map(|value| u64::try_from(*value).ok()).collect(),
    Item::I8(vec) => vec.iter().map(|value| u64::try_from(*value).ok()).collect(),
    _ => None,
  }
}

/// ### CONSTANT WRITES
///
/// Applies an S2F15 body to the store and folds the outcomes into one EAC.
fn apply_constant_writes(store: &dyn VariableStore, message: &secs2::Message) -> EquipmentAck {
  let Some(Item::List(pairs)) = &message.text else {
    return EquipmentAck::DeniedUnknownConstant
  };
  let mut ack = EquipmentAck::Accepted;
  for pair in pairs {
    let outcome = match pair {
      Item::List(fields) if fields.len() == 2 => integer_values(&fields[0])
        .and_then(|ids| ids.first().copied())
        .and_then(|id| u32::try_from(id).ok())
        .map(|id| store.set(id, fields[1].clone())),
      _ => None,
    };
    match outcome {
      Some(SetAck::Ok) => {}
      Some(SetAck::OutOfRange) => ack = EquipmentAck::DeniedOutOfRange,
      Some(SetAck::UnknownId) | None => {
        if ack == EquipmentAck::Accepted {
          ack = EquipmentAck::DeniedUnknownConstant;
        }
      }
    }
  }
  ack
}

/// ### COMMACK ACCEPTED
fn commack_accepted(message: &secs2::Message) -> bool {
  match &message.text {
    Some(Item::List(fields)) => {
      matches!(fields.first(), Some(Item::Bin(code)) if code.first() == Some(&0))
    }
    _ => false,
  }
}

/// ### SINGLE BINARY CODE
fn single_bin(message: &secs2::Message) -> Option<u8> {
  match &message.text {
    Some(Item::Bin(vec)) if vec.len() == 1 => Some(vec[0]),
    _ => None,
  }
}

/// ### ASCII OR EMPTY
fn ascii_or_empty(text: &str) -> Item {
  Item::ascii(text).unwrap_or(Item::Ascii(vec![]))
}

/// ### TIME OF DAY
///
/// The 16-byte TIME form, "YYYYMMDDhhmmsscc".
fn time_of_day() -> Item {
  let now = chrono::Utc::now();
  let centiseconds = now.timestamp_subsec_millis() / 10;
  Item::Ascii(
    format!("{}{:02}", now.format("%Y%m%d%H%M%S"), centiseconds).into_bytes(),
  )
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::store::{MemoryStore, Variable};

  #[test]
  fn integer_values_accept_every_integer_format() {
    assert_eq!(integer_values(&Item::u1(5)), Some(vec![5]));
    assert_eq!(integer_values(&Item::U8(vec![1, 2])), Some(vec![1, 2]));
    assert_eq!(
      integer_values(&Item::List(vec![Item::u2(7), Item::i4(9)])),
      Some(vec![7, 9]),
    );
    assert_eq!(integer_values(&Item::i1(-1)), None);
    assert_eq!(integer_values(&Item::ascii("7").unwrap()), None);
  }

  #[test]
  fn commack_parsing() {
    let accepted = secs2::Message::new(
      1,
      14,
      false,
      Some(Item::List(vec![Item::bin(0), Item::empty_list()])),
    )
    .unwrap();
    assert!(commack_accepted(&accepted));
    let denied = secs2::Message::new(
      1,
      14,
      false,
      Some(Item::List(vec![Item::bin(1), Item::empty_list()])),
    )
    .unwrap();
    assert!(!commack_accepted(&denied));
    let empty = secs2::Message::new(1, 14, false, None).unwrap();
    assert!(!commack_accepted(&empty));
  }

  #[test]
  fn constant_writes_fold_to_worst_ack() {
    let store = MemoryStore::new();
    store.insert(5, Variable::new("C", "", Item::u1(0)));
    let good = secs2::Message::new(
      2,
      15,
      true,
      Some(Item::List(vec![Item::List(vec![Item::u4(5), Item::u1(9)])])),
    )
    .unwrap();
    assert_eq!(apply_constant_writes(&store, &good), EquipmentAck::Accepted);
    assert_eq!(store.get(5), Some(Item::u1(9)));

    let unknown = secs2::Message::new(
      2,
      15,
      true,
      Some(Item::List(vec![Item::List(vec![Item::u4(99), Item::u1(9)])])),
    )
    .unwrap();
    assert_eq!(
      apply_constant_writes(&store, &unknown),
      EquipmentAck::DeniedUnknownConstant,
    );
  }

  #[test]
  fn time_of_day_shape() {
    let item = time_of_day();
    let text = item.as_ascii().unwrap().to_string();
    assert_eq!(text.len(), 16);
    assert!(text.bytes().all(|byte| byte.is_ascii_digit()));
  }
}
