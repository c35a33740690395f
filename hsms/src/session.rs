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

//! # SESSIONS
//! **Based on SEMI E37-1109§5-7**
//!
//! ---------------------------------------------------------------------------
//!
//! The HSMS session: one connection, one [Framer], one [Transaction Manager],
//! and the state machine over NOT CONNECTED, NOT SELECTED, and SELECTED.
//!
//! Control messages never escape this layer. The receive path absorbs the
//! Select, Deselect, Linktest, Separate, and Reject procedures; only data
//! messages travel upward, split into primaries (delivered to the installed
//! data handler) and secondaries (resolved through the transaction table).
//!
//! One timer task per session advances the T3 reply sweep, the T7 not
//! selected window, the T8 intercharacter gap, and the optional periodic
//! linktest. T5 lives in the active connect loop and T6 in each control
//! transaction's deadline. On any timer expiry the connection drops and
//! every pending waiter completes with its terminal outcome.
//!
//! [Framer]:              crate::frame::Framer
//! [Transaction Manager]: crate::transaction::TransactionManager

use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering::Relaxed};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex, RwLock};
use std::thread;
use std::time::{Duration, Instant};

use atomic::Atomic;
use tracing::{debug, info, warn};

use crate::connection::{self, Connection, ConnectionEvents};
use crate::frame::{Frame, FrameHeader, Framer};
use crate::transaction::{Reply, TransactionManager};
use crate::{
  ConnectionMode, DeselectStatus, Error, ParameterSettings, RejectReason, SelectStatus,
  SessionState, SessionType,
};

/// ### TIMER TICK
///
/// The granularity of the timer task. Well under the one second bound the
/// reply sweep requires, and small enough that T7 and T8 fire close to
/// their configured values.
const TIMER_TICK: Duration = Duration::from_millis(250);

/// ## MESSAGE ID
///
/// The envelope identity of a data message: the session id it travelled
/// under and the system bytes correlating its transaction. Opaque above the
/// session layer, except for echoing into a reply.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageId {
  /// ### SESSION ID
  pub session: u16,

  /// ### SYSTEM BYTES
  pub system: u32,
}

/// ## INBOUND DATA
///
/// What the session delivers to its data handler. Only primaries arrive
/// here; secondaries resolve through the transaction table.
#[derive(Clone, Debug)]
pub enum Inbound {
  /// ### PRIMARY MESSAGE
  Message {
    id: MessageId,
    header: FrameHeader,
    message: secs2::Message,
  },

  /// ### MALFORMED PRIMARY
  ///
  /// The envelope was sound but the body failed to decode. GEM answers
  /// these with a Stream 9 report.
  Malformed {
    id: MessageId,
    header: FrameHeader,
    error: secs2::Error,
  },
}

/// ## SESSION EVENT
///
/// State machine observations published to subscribers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionEvent {
  /// The select procedure completed; data may flow.
  Selected,

  /// The deselect procedure completed; the connection remains.
  Deselected,

  /// The connection ended, with its cause.
  Disconnected(DisconnectCause),
}

/// ## DISCONNECT CAUSE
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DisconnectCause {
  /// This side closed deliberately.
  Local,

  /// The socket closed or failed underneath the session.
  Remote,

  /// A Separate.req arrived.
  Separated,

  /// T6 expired on a control transaction.
  ControlTimeout,

  /// T7 expired before the select procedure completed.
  NotSelectedTimeout,

  /// T8 expired inside a partially received frame.
  IntercharacterTimeout,

  /// The peer emitted a malformed envelope.
  Framing,
}

/// ### DATA HANDLER
///
/// The hook primaries are delivered to. Runs on the receive task; a handler
/// that must block hands the work to its own pool.
pub type DataHandler = Arc<dyn Fn(Inbound) + Send + Sync>;

/// ## SESSION
///
/// The stateful HSMS endpoint. Owns its [Connection] exclusively; shares
/// its [Transaction Manager] between the receive task, the timer task, and
/// whichever caller threads send primaries.
///
/// [Connection]:          Connection
/// [Transaction Manager]: TransactionManager
pub struct Session {
  /// ### PARAMETER SETTINGS
  settings: ParameterSettings,

  /// ### SESSION STATE
  state: Atomic<SessionState>,

  /// ### SELECTION MUTEX
  ///
  /// The critical section for every edit of the selection half of the state
  /// machine, so a responder and an initiator never interleave a
  /// transition.
  selection_mutex: Mutex<()>,

  /// ### CONNECTION
  connection: RwLock<Option<Arc<Connection>>>,

  /// ### FRAMER
  framer: Mutex<Framer>,

  /// ### TRANSACTION MANAGER
  transactions: TransactionManager,

  /// ### DATA HANDLER
  data_handler: RwLock<Option<DataHandler>>,

  /// ### EVENT SUBSCRIBERS
  observers: Mutex<Vec<Sender<SessionEvent>>>,

  /// ### NOT SELECTED SINCE
  ///
  /// When the NOT SELECTED state was last entered, for the T7 window.
  not_selected_since: Mutex<Option<Instant>>,

  /// ### LAST LINKTEST
  last_linktest: Mutex<Instant>,

  /// ### PENDING DISCONNECT CAUSE
  ///
  /// Set by whichever path initiates a drop, read by the link-down handler
  /// when the receiver thread winds down.
  pending_cause: Mutex<Option<DisconnectCause>>,

  /// ### STOP FLAG
  ///
  /// Ends connect loops and the timer task when the session shuts down for
  /// good.
  stop: AtomicBool,
}

/// ## CONNECTION PROCEDURES
/// **Based on SEMI E37-1109§6.3-6.5**
impl Session {
  /// ### NEW SESSION
  ///
  /// Creates a session in the NOT CONNECTED state.
  pub fn new(settings: ParameterSettings) -> Arc<Session> {
    Arc::new(Session {
      settings,
      state: Atomic::new(SessionState::NotConnected),
      selection_mutex: Mutex::new(()),
      connection: RwLock::new(None),
      framer: Mutex::new(Framer::new(settings.max_message_size)),
      transactions: TransactionManager::new(),
      data_handler: RwLock::new(None),
      observers: Mutex::new(vec![]),
      not_selected_since: Mutex::new(None),
      last_linktest: Mutex::new(Instant::now()),
      pending_cause: Mutex::new(None),
      stop: AtomicBool::new(false),
    })
  }

  /// ### PARAMETER SETTINGS
  pub fn settings(&self) -> &ParameterSettings {
    &self.settings
  }

  /// ### SESSION STATE
  pub fn state(&self) -> SessionState {
    self.state.load(Relaxed)
  }

  /// ### INSTALL DATA HANDLER
  ///
  /// Installs the hook primaries are delivered to. Install before
  /// connecting; primaries arriving with no handler are logged and
  /// dropped.
  pub fn set_data_handler(&self, handler: DataHandler) {
    *self.data_handler.write().unwrap() = Some(handler);
  }

  /// ### OBSERVE EVENTS
  ///
  /// Subscribes to state machine events. Subscribers that disappear are
  /// pruned on the next emission.
  pub fn observe(&self) -> Receiver<SessionEvent> {
    let (sender, receiver) = channel();
    self.observers.lock().unwrap().push(sender);
    receiver
  }

  /// ### CONNECT PROCEDURE
  /// **Based on SEMI E37-1109§6.3.4-6.3.7**
  ///
  /// Obtains the TCP connection per the configured connect mode: active
  /// dials the entity, retrying every T5 until stopped; passive binds the
  /// entity and accepts one peer. On completion the NOT SELECTED state is
  /// entered and the T7 window opens.
  ///
  /// Returns the peer address, or [None] if the session was stopped before
  /// a connection was obtained.
  pub fn connect(self: &Arc<Self>, entity: &str) -> Result<Option<SocketAddr>, Error> {
    let stream = match self.settings.connect_mode {
      ConnectionMode::Active => connection::dial(entity, self.settings.t5, &self.stop)?,
      ConnectionMode::Passive => {
        let listener = connection::bind(entity)?;
        connection::accept_one(&listener, &self.stop)?
      }
    };
    match stream {
      Some(stream) => self.attach(stream).map(Some),
      None => Ok(None),
    }
  }

  /// ### ACCEPT FROM A BOUND LISTENER
  ///
  /// The passive connect procedure split in two: the caller binds (and may
  /// publish the bound port), then accepts here. Multi-passive listeners
  /// and tests use this form.
  pub fn accept_from(self: &Arc<Self>, listener: &TcpListener) -> Result<Option<SocketAddr>, Error> {
    match connection::accept_one(listener, &self.stop)? {
      Some(stream) => self.attach(stream).map(Some),
      None => Ok(None),
    }
  }

  /// ### ATTACH A CONNECTED SOCKET
  ///
  /// Wires an already-connected socket into the session and enters the NOT
  /// SELECTED state. The receiver stays gated until the session has stored
  /// the connection, so no frame can race the wiring.
  pub fn attach(self: &Arc<Self>, stream: TcpStream) -> Result<SocketAddr, Error> {
    if self.state.load(Relaxed) != SessionState::NotConnected {
      return Err(Error::Protocol("a connection is already managed"))
    }

    let weak_data = Arc::downgrade(self);
    let weak_down = Arc::downgrade(self);
    let events = ConnectionEvents {
      on_data: Arc::new(move |bytes| {
        if let Some(session) = weak_data.upgrade() {
          session.handle_bytes(bytes);
        }
      }),
      on_disconnecting: Arc::new(move || {
        if let Some(session) = weak_down.upgrade() {
          session.handle_link_down();
        }
      }),
      ..Default::default()
    };

    let connection = Arc::new(Connection::start(stream, events)?);
    let peer = connection.peer();
    self.framer.lock().unwrap().reset();
    *self.not_selected_since.lock().unwrap() = Some(Instant::now());
    self.state.store(SessionState::NotSelected, Relaxed);
    *self.connection.write().unwrap() = Some(connection.clone());
    connection.begin();
    self.spawn_timer();
    info!(peer = %peer, "connected, not selected");
    Ok(peer)
  }

  /// ### DISCONNECT PROCEDURE
  /// **Based on SEMI E37-1109§6.4-6.5**
  ///
  /// Closes the connection and waits for the receive task to finish its
  /// teardown. All pending reply waiters complete with Disconnected. By
  /// the time the terminal hooks run, the state is already NOT CONNECTED.
  pub fn disconnect(&self) {
    let connection = self.connection.write().unwrap().take();
    if let Some(connection) = connection {
      *self.pending_cause.lock().unwrap() = Some(DisconnectCause::Local);
      connection.close();
    }
  }

  /// ### DROP CONNECTION
  ///
  /// The non-joining teardown used from the receive and timer tasks, where
  /// waiting for the receiver thread would wait on ourselves. The receiver
  /// observes the shutdown within one bounded read and runs the link-down
  /// path.
  fn drop_connection(&self, cause: DisconnectCause) {
    let connection = self.connection.write().unwrap().take();
    if let Some(connection) = connection {
      *self.pending_cause.lock().unwrap() = Some(cause);
      connection.shutdown();
    }
  }

  /// ### LINK DOWN
  ///
  /// Runs on the receiver thread once reception has ended, before the
  /// socket closes. Terminal cleanup: the state machine falls to NOT
  /// CONNECTED first, so every hook and waiter observes the session
  /// already down.
  fn handle_link_down(&self) {
    self.connection.write().unwrap().take();
    let previous = self.state.swap(SessionState::NotConnected, Relaxed);
    *self.not_selected_since.lock().unwrap() = None;
    self.framer.lock().unwrap().reset();
    self.transactions.abort_all();
    let cause = self
      .pending_cause
      .lock()
      .unwrap()
      .take()
      .unwrap_or(DisconnectCause::Remote);
    if previous != SessionState::NotConnected {
      info!(?cause, "disconnected");
      self.emit(SessionEvent::Disconnected(cause));
    }
  }

  /// ### EMIT EVENT
  fn emit(&self, event: SessionEvent) {
    self
      .observers
      .lock()
      .unwrap()
      .retain(|observer| observer.send(event).is_ok());
  }
}

/// ## RECEIVE PATH
/// **Based on SEMI E37-1109§7**
impl Session {
  /// ### HANDLE RECEIVED BYTES
  ///
  /// Feeds the framer and dispatches every whole frame it yields. A
  /// framing error is unrecoverable for a length-prefixed stream, so the
  /// connection drops.
  fn handle_bytes(&self, bytes: &[u8]) {
    self.framer.lock().unwrap().push(bytes);
    loop {
      let next = self.framer.lock().unwrap().next_frame();
      match next {
        Ok(Some(frame)) => self.dispatch(frame),
        Ok(None) => break,
        Err(error) => {
          warn!(error = %error, "dropping session on framing error");
          self.drop_connection(DisconnectCause::Framing);
          break
        }
      }
    }
  }

  /// ### DISPATCH FRAME
  ///
  /// Routes one frame by its session type. Control procedures are handled
  /// here in full; only data messages travel further.
  fn dispatch(&self, frame: Frame) {
    let header = frame.header;

    // A presentation type other than SECS-II is rejected outright.
    if header.p_type != 0 {
      let _ = self.transmit_control(
        header.session_id,
        SessionType::RejectRequest,
        header.system,
        header.p_type,
        RejectReason::PresentationTypeNotSupported as u8,
      );
      return
    }

    match SessionType::try_from(header.s_type) {
      Err(_) => {
        let _ = self.transmit_control(
          header.session_id,
          SessionType::RejectRequest,
          header.system,
          header.s_type,
          RejectReason::SessionTypeNotSupported as u8,
        );
      }

      Ok(SessionType::DataMessage) => self.handle_data(frame),

      Ok(SessionType::SelectRequest) => self.handle_select_request(header),

      Ok(SessionType::DeselectRequest) => self.handle_deselect_request(header),

      // Any received Linktest.req is answered immediately; no state is
      // involved.
      Ok(SessionType::LinktestRequest) => {
        let _ = self.transmit_control(
          header.session_id,
          SessionType::LinktestResponse,
          header.system,
          0,
          0,
        );
      }

      Ok(SessionType::SelectResponse)
      | Ok(SessionType::DeselectResponse)
      | Ok(SessionType::LinktestResponse) => {
        if !self.transactions.complete(header.system, Reply::Control { header }) {
          let _ = self.transmit_control(
            header.session_id,
            SessionType::RejectRequest,
            header.system,
            header.s_type,
            RejectReason::TransactionNotOpen as u8,
          );
        }
      }

      Ok(SessionType::RejectRequest) => {
        warn!(
          s_type = header.byte_2,
          reason = header.byte_3,
          system = header.system,
          "peer rejected a message",
        );
        // A reject resolving no open transaction has nothing to abort and
        // is only logged.
        self.transactions.complete(
          header.system,
          Reply::Rejected { s_type: header.byte_2, reason: header.byte_3 },
        );
      }

      Ok(SessionType::SeparateRequest) => {
        info!("separate request received, closing");
        self.drop_connection(DisconnectCause::Separated);
      }
    }
  }

  /// ### HANDLE SELECT REQUEST
  /// **Based on SEMI E37-1109§7.4**
  ///
  /// The responding half of the select procedure. A first select is
  /// answered with status 0 and enters SELECTED; a duplicate is answered
  /// with status 1 and changes nothing.
  fn handle_select_request(&self, header: FrameHeader) {
    let _guard = self.selection_mutex.lock().unwrap();
    match self.state.load(Relaxed) {
      SessionState::NotSelected => {
        if self
          .transmit_control(
            header.session_id,
            SessionType::SelectResponse,
            header.system,
            0,
            SelectStatus::Ok as u8,
          )
          .is_ok()
        {
          self.state.store(SessionState::Selected, Relaxed);
          *self.not_selected_since.lock().unwrap() = None;
          info!("selected (responder)");
          self.emit(SessionEvent::Selected);
        }
      }
      SessionState::Selected => {
        let _ = self.transmit_control(
          header.session_id,
          SessionType::SelectResponse,
          header.system,
          0,
          SelectStatus::AlreadyActive as u8,
        );
      }
      SessionState::NotConnected => {}
    }
  }

  /// ### HANDLE DESELECT REQUEST
  /// **Based on SEMI E37-1109§7.7**
  fn handle_deselect_request(&self, header: FrameHeader) {
    let _guard = self.selection_mutex.lock().unwrap();
    if self.state.load(Relaxed) == SessionState::Selected {
      if self
        .transmit_control(
          header.session_id,
          SessionType::DeselectResponse,
          header.system,
          0,
          DeselectStatus::Ok as u8,
        )
        .is_ok()
      {
        self.state.store(SessionState::NotSelected, Relaxed);
        *self.not_selected_since.lock().unwrap() = Some(Instant::now());
        info!("deselected (responder)");
        self.emit(SessionEvent::Deselected);
      }
    } else {
      let _ = self.transmit_control(
        header.session_id,
        SessionType::DeselectResponse,
        header.system,
        0,
        DeselectStatus::NotEstablished as u8,
      );
    }
  }

  /// ### HANDLE DATA MESSAGE
  /// **Based on SEMI E37-1109§7.5-7.6**
  ///
  /// Data is only lawful in SELECTED. A secondary resolves its open
  /// transaction or is answered with Reject.req; a primary is decoded and
  /// delivered to the data handler.
  fn handle_data(&self, frame: Frame) {
    let header = frame.header;
    if self.state.load(Relaxed) != SessionState::Selected {
      let _ = self.transmit_control(
        header.session_id,
        SessionType::RejectRequest,
        header.system,
        header.s_type,
        RejectReason::EntityNotSelected as u8,
      );
      return
    }

    let id = MessageId { session: header.session_id, system: header.system };
    let secondary = header.function() % 2 == 0;

    // BODY DECODE
    //
    // An empty body is a header-only message, not an empty item.
    let decoded = if frame.body.is_empty() {
      Ok(None)
    } else {
      secs2::Item::decode(&frame.body).map(Some)
    };
    let message = decoded.and_then(|text| {
      secs2::Message::new(header.stream(), header.function(), header.w(), text)
    });

    match message {
      Ok(message) => {
        if secondary {
          if !self.transactions.complete(header.system, Reply::Data { header, message }) {
            debug!(system = header.system, "secondary for a transaction that is not open");
            let _ = self.transmit_control(
              header.session_id,
              SessionType::RejectRequest,
              header.system,
              header.s_type,
              RejectReason::TransactionNotOpen as u8,
            );
          }
        } else {
          self.deliver(Inbound::Message { id, header, message });
        }
      }
      Err(error) => {
        warn!(
          stream = header.stream(),
          function = header.function(),
          error = %error,
          "received undecodable message body",
        );
        if secondary {
          self.transactions.complete(header.system, Reply::Malformed { header, error });
        } else {
          self.deliver(Inbound::Malformed { id, header, error });
        }
      }
    }
  }

  /// ### DELIVER PRIMARY
  fn deliver(&self, inbound: Inbound) {
    let handler = self.data_handler.read().unwrap().clone();
    match handler {
      Some(handler) => handler(inbound),
      None => warn!("primary received with no data handler installed"),
    }
  }
}

/// ## SEND PATH AND PROCEDURES
/// **Based on SEMI E37-1109§7**
impl Session {
  /// ### TRANSMIT FRAME
  ///
  /// Serializes under the connection's send guard. A failed send means the
  /// link is unusable; the session drops it and reports Disconnected.
  fn transmit_frame(&self, frame: Frame) -> Result<(), Error> {
    let connection = self.connection.read().unwrap().clone();
    match connection {
      Some(connection) => {
        if connection.send(&frame.to_wire()) {
          Ok(())
        } else {
          self.drop_connection(DisconnectCause::Remote);
          Err(Error::Disconnected)
        }
      }
      None => Err(Error::Disconnected),
    }
  }

  /// ### TRANSMIT CONTROL MESSAGE
  fn transmit_control(
    &self,
    session_id: u16,
    s_type: SessionType,
    system: u32,
    byte_2: u8,
    byte_3: u8,
  ) -> Result<(), Error> {
    self.transmit_frame(Frame {
      header: FrameHeader {
        session_id,
        byte_2,
        byte_3,
        p_type: 0,
        s_type: s_type.into(),
        system,
      },
      body: vec![],
    })
  }

  /// ### CONTROL TRANSACTION
  ///
  /// Sends a control request and waits up to T6 for its response. The
  /// waiter is registered before the frame is written, so a response
  /// racing the send still matches. T6 expiry is a fatal communications
  /// failure and drops the connection.
  fn control_transaction(
    &self,
    request: SessionType,
    response: SessionType,
  ) -> Result<FrameHeader, Error> {
    let system = self.transactions.allocate();
    let receiver = self
      .transactions
      .register(system, Instant::now() + self.settings.t6)
      .ok_or(Error::Protocol("system bytes already in flight"))?;
    if let Err(error) = self.transmit_control(self.settings.session_id, request, system, 0, 0) {
      self.transactions.unregister(system);
      return Err(error)
    }
    match receiver.recv() {
      Ok(Reply::Control { header }) if header.s_type == response as u8 => Ok(header),
      Ok(Reply::Control { .. }) => Err(Error::Protocol("control response of the wrong type")),
      Ok(Reply::Rejected { s_type, reason }) => Err(Error::Rejected { s_type, reason }),
      Ok(Reply::Timeout) => {
        warn!(procedure = ?request, "T6 expired, dropping connection");
        self.drop_connection(DisconnectCause::ControlTimeout);
        Err(Error::Timeout)
      }
      Ok(Reply::Data { .. }) | Ok(Reply::Malformed { .. }) => {
        Err(Error::Protocol("data response to a control transaction"))
      }
      Ok(Reply::Disconnected) | Err(_) => Err(Error::Disconnected),
    }
  }

  /// ### SELECT PROCEDURE
  /// **Based on SEMI E37-1109§7.4**
  ///
  /// The initiating half: sends Select.req and waits up to T6 for the
  /// Select.rsp. On status 0 the SELECTED state is entered. An active-mode
  /// endpoint calls this promptly after connecting; the T7 window is
  /// already running.
  pub fn select(&self) -> Result<(), Error> {
    if self.state.load(Relaxed) != SessionState::NotSelected {
      return Err(Error::Protocol("select requires the NOT SELECTED state"))
    }
    let header =
      self.control_transaction(SessionType::SelectRequest, SessionType::SelectResponse)?;
    if header.byte_3 == SelectStatus::Ok as u8 {
      let _guard = self.selection_mutex.lock().unwrap();
      self.state.store(SessionState::Selected, Relaxed);
      *self.not_selected_since.lock().unwrap() = None;
      info!("selected (initiator)");
      self.emit(SessionEvent::Selected);
      Ok(())
    } else {
      Err(Error::Rejected {
        s_type: SessionType::SelectResponse as u8,
        reason: header.byte_3,
      })
    }
  }

  /// ### DESELECT PROCEDURE
  /// **Based on SEMI E37-1109§7.7**
  pub fn deselect(&self) -> Result<(), Error> {
    if self.state.load(Relaxed) != SessionState::Selected {
      return Err(Error::Protocol("deselect requires the SELECTED state"))
    }
    let header =
      self.control_transaction(SessionType::DeselectRequest, SessionType::DeselectResponse)?;
    if header.byte_3 == DeselectStatus::Ok as u8 {
      let _guard = self.selection_mutex.lock().unwrap();
      self.state.store(SessionState::NotSelected, Relaxed);
      *self.not_selected_since.lock().unwrap() = Some(Instant::now());
      info!("deselected (initiator)");
      self.emit(SessionEvent::Deselected);
      Ok(())
    } else {
      Err(Error::Rejected {
        s_type: SessionType::DeselectResponse as u8,
        reason: header.byte_3,
      })
    }
  }

  /// ### LINKTEST PROCEDURE
  /// **Based on SEMI E37-1109§7.8**
  ///
  /// Lawful whenever a connection exists.
  pub fn linktest(&self) -> Result<(), Error> {
    if self.state.load(Relaxed) == SessionState::NotConnected {
      return Err(Error::Protocol("linktest requires a connection"))
    }
    self
      .control_transaction(SessionType::LinktestRequest, SessionType::LinktestResponse)
      .map(|_| ())
  }

  /// ### SEPARATE PROCEDURE
  /// **Based on SEMI E37-1109§7.9**
  ///
  /// One-sided and immediate: sends Separate.req, then closes. The peer
  /// does not reply; it closes its socket likewise.
  pub fn separate(&self) -> Result<(), Error> {
    if self.state.load(Relaxed) != SessionState::Selected {
      return Err(Error::Protocol("separate requires the SELECTED state"))
    }
    let system = self.transactions.allocate();
    let _ = self.transmit_control(
      self.settings.session_id,
      SessionType::SeparateRequest,
      system,
      0,
      0,
    );
    self.disconnect();
    Ok(())
  }

  /// ### DATA REQUEST
  /// **Based on SEMI E37-1109§7.5**
  ///
  /// Sends a primary with the W-bit and waits for the outcome: the
  /// secondary, a Timeout after T3, Disconnected, or a rejection. The
  /// waiter is registered before the frame is written; that ordering is
  /// what lets a fast peer's reply match a sender that has not yet begun
  /// waiting.
  pub fn request(&self, message: secs2::Message) -> Result<Reply, Error> {
    if !message.w {
      return Err(Error::Protocol("request requires the W-bit; use send instead"))
    }
    if self.state.load(Relaxed) != SessionState::Selected {
      return Err(Error::Protocol("data requires the SELECTED state"))
    }
    let system = self.transactions.allocate();
    let receiver = self
      .transactions
      .register(system, Instant::now() + self.settings.t3)
      .ok_or(Error::Protocol("system bytes already in flight"))?;
    let frame = Frame {
      header: FrameHeader::data(
        self.settings.session_id,
        message.stream,
        true,
        message.function,
        system,
      ),
      body: message.encoded_text(),
    };
    if let Err(error) = self.transmit_frame(frame) {
      self.transactions.unregister(system);
      return Err(error)
    }
    // The sweep guarantees completion, so this wait is bounded by T3 plus
    // the sweep granularity.
    Ok(receiver.recv().unwrap_or(Reply::Disconnected))
  }

  /// ### DATA SEND
  ///
  /// Sends a data message with no reply expected, allocating fresh system
  /// bytes. Returns the system bytes used.
  pub fn send(&self, message: secs2::Message) -> Result<u32, Error> {
    if self.state.load(Relaxed) != SessionState::Selected {
      return Err(Error::Protocol("data requires the SELECTED state"))
    }
    let system = self.transactions.allocate();
    self.transmit_frame(Frame {
      header: FrameHeader::data(
        self.settings.session_id,
        message.stream,
        message.w,
        message.function,
        system,
      ),
      body: message.encoded_text(),
    })?;
    Ok(system)
  }

  /// ### DATA RESPONSE
  ///
  /// Sends a secondary under the primary's system bytes.
  pub fn respond(&self, system: u32, message: secs2::Message) -> Result<(), Error> {
    if self.state.load(Relaxed) != SessionState::Selected {
      return Err(Error::Protocol("data requires the SELECTED state"))
    }
    self.transmit_frame(Frame {
      header: FrameHeader::data(
        self.settings.session_id,
        message.stream,
        false,
        message.function,
        system,
      ),
      body: message.encoded_text(),
    })
  }
}

/// ## TIMER TASK
impl Session {
  /// ### SPAWN TIMER
  ///
  /// One task per connection advancing the T3 sweep, the T7 window, the T8
  /// gap, and the periodic linktest. Exits when the session returns to NOT
  /// CONNECTED.
  fn spawn_timer(self: &Arc<Self>) {
    let weak = Arc::downgrade(self);
    thread::spawn(move || loop {
      thread::sleep(TIMER_TICK);
      let Some(session) = weak.upgrade() else { break };
      if session.stop.load(Relaxed) {
        break
      }
      let state = session.state.load(Relaxed);
      if state == SessionState::NotConnected {
        break
      }

      // T3 SWEEP
      session.transactions.sweep(Instant::now());

      // T7: NOT SELECTED WINDOW
      if state == SessionState::NotSelected {
        let expired = session
          .not_selected_since
          .lock()
          .unwrap()
          .map(|since| since.elapsed() > session.settings.t7)
          .unwrap_or(false);
        if expired {
          warn!("T7 expired while not selected, dropping connection");
          session.drop_connection(DisconnectCause::NotSelectedTimeout);
          break
        }
      }

      // T8: INTERCHARACTER GAP
      let stalled = session
        .framer
        .lock()
        .unwrap()
        .partial_since()
        .map(|since| since.elapsed() > session.settings.t8)
        .unwrap_or(false);
      if stalled {
        warn!("T8 expired inside a partial frame, dropping connection");
        session.drop_connection(DisconnectCause::IntercharacterTimeout);
        break
      }

      // PERIODIC LINKTEST
      if let Some(interval) = session.settings.linktest_interval {
        if state == SessionState::Selected {
          let due = {
            let mut last = session.last_linktest.lock().unwrap();
            if last.elapsed() >= interval {
              *last = Instant::now();
              true
            } else {
              false
            }
          };
          if due {
            let clone = session.clone();
            thread::spawn(move || {
              let _ = clone.linktest();
            });
          }
        }
      }
    });
  }
}

impl Drop for Session {
  /// ### SESSION TEARDOWN
  ///
  /// No resource outlives the session: the stop flag ends the connect
  /// loops and timer task, and the connection is closed with its receiver
  /// joined.
  fn drop(&mut self) {
    self.stop.store(true, Relaxed);
    let connection = self.connection.write().unwrap().take();
    if let Some(connection) = connection {
      connection.close();
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::{Read, Write};

  fn fast_settings() -> ParameterSettings {
    ParameterSettings {
      t3: Duration::from_millis(900),
      t6: Duration::from_secs(2),
      t7: Duration::from_secs(5),
      t8: Duration::from_secs(2),
      ..Default::default()
    }
  }

  /// Builds a connected passive/active session pair over loopback.
  fn session_pair(
    passive_settings: ParameterSettings,
    active_settings: ParameterSettings,
  ) -> (Arc<Session>, Arc<Session>) {
    let listener = connection::bind("127.0.0.1:0").unwrap();
    let address = listener.local_addr().unwrap();
    let passive = Session::new(ParameterSettings {
      connect_mode: ConnectionMode::Passive,
      ..passive_settings
    });
    let active = Session::new(ParameterSettings {
      connect_mode: ConnectionMode::Active,
      ..active_settings
    });
    let acceptor = {
      let passive = passive.clone();
      thread::spawn(move || passive.accept_from(&listener).unwrap())
    };
    active.connect(&address.to_string()).unwrap().unwrap();
    acceptor.join().unwrap().unwrap();
    (passive, active)
  }

  fn wait_for(predicate: impl Fn() -> bool, what: &str) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !predicate() {
      assert!(Instant::now() < deadline, "timed out waiting for {what}");
      thread::sleep(Duration::from_millis(10));
    }
  }

  #[test]
  fn select_handshake() {
    let (passive, active) = session_pair(fast_settings(), fast_settings());
    let passive_events = passive.observe();
    active.select().unwrap();
    assert_eq!(active.state(), SessionState::Selected);
    wait_for(|| passive.state() == SessionState::Selected, "passive selection");
    assert_eq!(
      passive_events.recv_timeout(Duration::from_secs(2)).unwrap(),
      SessionEvent::Selected,
    );
  }

  #[test]
  fn duplicate_select_rejected_with_status_1() {
    // Drives the passive responder with a raw byte-level client.
    let listener = connection::bind("127.0.0.1:0").unwrap();
    let address = listener.local_addr().unwrap();
    let passive = Session::new(fast_settings());
    let acceptor = {
      let passive = passive.clone();
      thread::spawn(move || passive.accept_from(&listener).unwrap())
    };
    let mut client = TcpStream::connect(address).unwrap();
    acceptor.join().unwrap().unwrap();

    let select_req = |system: u32| {
      Frame {
        header: FrameHeader::control(0xFFFF, SessionType::SelectRequest as u8, 0, system),
        body: vec![],
      }
      .to_wire()
    };
    let mut response = [0u8; 14];

    client.write_all(&select_req(1)).unwrap();
    client.read_exact(&mut response).unwrap();
    let first = FrameHeader::from(<[u8; 10]>::try_from(&response[4..14]).unwrap());
    assert_eq!(first.s_type, SessionType::SelectResponse as u8);
    assert_eq!(first.byte_3, SelectStatus::Ok as u8);
    assert_eq!(first.system, 1);

    client.write_all(&select_req(2)).unwrap();
    client.read_exact(&mut response).unwrap();
    let second = FrameHeader::from(<[u8; 10]>::try_from(&response[4..14]).unwrap());
    assert_eq!(second.byte_3, SelectStatus::AlreadyActive as u8);
    assert_eq!(passive.state(), SessionState::Selected);
  }

  #[test]
  fn data_rejected_before_selection() {
    let listener = connection::bind("127.0.0.1:0").unwrap();
    let address = listener.local_addr().unwrap();
    let passive = Session::new(fast_settings());
    let acceptor = {
      let passive = passive.clone();
      thread::spawn(move || passive.accept_from(&listener).unwrap())
    };
    let mut client = TcpStream::connect(address).unwrap();
    acceptor.join().unwrap().unwrap();

    // S1F1 with the W-bit, before any select.
    let frame = Frame {
      header: FrameHeader::data(0, 1, true, 1, 77),
      body: vec![],
    };
    client.write_all(&frame.to_wire()).unwrap();
    let mut response = [0u8; 14];
    client.read_exact(&mut response).unwrap();
    let header = FrameHeader::from(<[u8; 10]>::try_from(&response[4..14]).unwrap());
    assert_eq!(header.s_type, SessionType::RejectRequest as u8);
    assert_eq!(header.byte_3, RejectReason::EntityNotSelected as u8);
    assert_eq!(header.system, 77);
  }

  #[test]
  fn linktest_roundtrip() {
    let (_passive, active) = session_pair(fast_settings(), fast_settings());
    active.select().unwrap();
    active.linktest().unwrap();
  }

  #[test]
  fn data_request_and_response() {
    let (passive, active) = session_pair(fast_settings(), fast_settings());

    // The passive side answers S1F1 with S1F2.
    let responder = passive.clone();
    passive.set_data_handler(Arc::new(move |inbound| {
      if let Inbound::Message { id, message, .. } = inbound {
        if message.stream == 1 && message.function == 1 {
          let reply = message.reply(Some(secs2::Item::empty_list()));
          responder.respond(id.system, reply).unwrap();
        }
      }
    }));

    active.select().unwrap();
    let message =
      secs2::Message::for_function(&secs2::registry::S1F1, None).unwrap();
    match active.request(message).unwrap() {
      Reply::Data { message, .. } => {
        assert_eq!(message.stream, 1);
        assert_eq!(message.function, 2);
        assert_eq!(message.text, Some(secs2::Item::empty_list()));
      }
      other => panic!("expected a data reply, got {other:?}"),
    }
  }

  #[test]
  fn t3_expires_when_peer_never_replies() {
    let (_passive, active) = session_pair(fast_settings(), fast_settings());
    // No data handler installed on the passive side: the primary is
    // dropped there and no secondary ever comes back.
    active.select().unwrap();
    let message =
      secs2::Message::for_function(&secs2::registry::S1F1, None).unwrap();
    let started = Instant::now();
    match active.request(message).unwrap() {
      Reply::Timeout => {
        // T3 of 900 ms, completed by a sweep of 250 ms granularity.
        assert!(started.elapsed() >= Duration::from_millis(900));
        assert!(started.elapsed() < Duration::from_secs(4));
      }
      other => panic!("expected a timeout, got {other:?}"),
    }
    // A T3 expiry does not drop the session.
    assert_eq!(active.state(), SessionState::Selected);
  }

  #[test]
  fn separate_closes_both_sides_and_drains_waiters() {
    let (passive, active) = session_pair(fast_settings(), fast_settings());
    let active_events = active.observe();
    active.select().unwrap();

    // Park a waiter on the passive side, then separate from the active
    // side; the waiter must resolve with Disconnected, not wait out T3.
    wait_for(|| passive.state() == SessionState::Selected, "passive selection");
    let parked = {
      let passive = passive.clone();
      thread::spawn(move || {
        let message =
          secs2::Message::for_function(&secs2::registry::S1F1, None).unwrap();
        passive.request(message)
      })
    };
    // Give the parked request time to register and transmit.
    thread::sleep(Duration::from_millis(100));

    active.separate().unwrap();
    assert_eq!(active.state(), SessionState::NotConnected);
    wait_for(|| passive.state() == SessionState::NotConnected, "passive closure");
    match parked.join().unwrap() {
      // Either the waiter drained with Disconnected, or the transmit raced
      // the closure and failed outright.
      Ok(Reply::Disconnected) | Err(Error::Disconnected) => {}
      other => panic!("expected Disconnected, got {other:?}"),
    }
    assert!(matches!(
      active_events.try_iter().last(),
      Some(SessionEvent::Disconnected(DisconnectCause::Local)),
    ));
  }

  #[test]
  fn no_data_is_emitted_when_not_connected() {
    let session = Session::new(fast_settings());
    let message =
      secs2::Message::for_function(&secs2::registry::S1F1, None).unwrap();
    assert!(matches!(session.request(message), Err(Error::Protocol(_))));
    assert!(matches!(
      session.send(secs2::Message::new(1, 1, false, None).unwrap()),
      Err(Error::Protocol(_)),
    ));
  }
}
