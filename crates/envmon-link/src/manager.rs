//! The connection manager.
//!
//! [`ConnectionManager`] is a cheap handle. All state lives in a single actor
//! task that handles commands, channel events and timer firings one at a
//! time, so no operation ever observes a half-applied transition. Channel and
//! timer tasks only post tagged events back; an event whose epoch or timer id
//! is no longer current is dropped.

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::{Instrument, debug, info, info_span, warn};

use envmon_core::constants::CLOSE_NORMAL;

use crate::channel::{ChannelEvent, ChannelHandle, SendError};
use crate::config::LinkConfig;
use crate::error::LinkError;
use crate::event::{ConnectionEvent, StatusEvent};
use crate::identity::IdentitySource;
use crate::listeners::{Listener, ListenerRegistry, ListenerRemover};
use crate::protocol::{self, Inbound};
use crate::state::{ConnectionState, ConnectionStatus};
use crate::timer::Timer;
use crate::transport::{Connector, WsConnector};

// ─────────────────────────────────────────────────────────────────────────────
// Handle
// ─────────────────────────────────────────────────────────────────────────────

/// Handle to the telemetry connection manager.
///
/// Clones share the same actor. The actor stops on [`shutdown`](Self::shutdown)
/// or once every strong handle is dropped. A listener owning a clone keeps the
/// actor alive until `shutdown`; listeners that call back into the manager
/// should capture a [`WeakConnectionManager`] instead.
#[derive(Clone)]
pub struct ConnectionManager {
    commands: mpsc::UnboundedSender<Command>,
    listeners: Arc<ListenerRegistry>,
    status: watch::Receiver<ConnectionStatus>,
}

/// Non-owning handle; does not keep the actor running.
#[derive(Clone)]
pub struct WeakConnectionManager {
    commands: mpsc::WeakUnboundedSender<Command>,
    listeners: Weak<ListenerRegistry>,
    status: watch::Receiver<ConnectionStatus>,
}

impl WeakConnectionManager {
    /// A strong handle, if any other strong handle is still alive.
    pub fn upgrade(&self) -> Option<ConnectionManager> {
        Some(ConnectionManager {
            commands: self.commands.upgrade()?,
            listeners: self.listeners.upgrade()?,
            status: self.status.clone(),
        })
    }
}

#[derive(Debug)]
enum Command {
    Connect(String),
    Disconnect { notify: bool },
    ForceReconnect,
    Shutdown,
}

impl ConnectionManager {
    /// Spawn the actor on the current tokio runtime.
    pub fn spawn(
        config: LinkConfig,
        connector: Arc<dyn Connector>,
        identity_source: Arc<dyn IdentitySource>,
    ) -> Self {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let listeners = Arc::new(ListenerRegistry::new());
        let (status_tx, status) = watch::channel(ConnectionStatus::initial(config.max_attempts));

        let actor = Actor {
            config,
            connector,
            identity_source,
            listeners: Arc::clone(&listeners),
            status_tx,
            internal_tx,
            session: ManagerSession::default(),
            next_id: 0,
        };
        drop(tokio::spawn(
            actor
                .run(command_rx, internal_rx)
                .instrument(info_span!("connection_manager")),
        ));

        Self {
            commands,
            listeners,
            status,
        }
    }

    /// Spawn a manager using the WebSocket transport.
    pub fn websocket(config: LinkConfig, identity_source: Arc<dyn IdentitySource>) -> Self {
        Self::spawn(config, Arc::new(WsConnector), identity_source)
    }

    /// Open the channel for `identity`, replacing any existing one.
    ///
    /// A blank identity puts the manager in `error` without opening anything.
    /// The reconnect budget is only restored by a successful open or by
    /// [`force_reconnect`](Self::force_reconnect); a plain `connect` after
    /// failures (even across `disconnect`) continues the spent count.
    pub fn connect(&self, identity: impl Into<String>) {
        self.send(Command::Connect(identity.into()));
    }

    /// Close the channel and cancel every timer; emits `disconnected` once.
    pub fn disconnect(&self) {
        self.send(Command::Disconnect { notify: true });
    }

    /// Like [`disconnect`](Self::disconnect) without the status event.
    pub fn disconnect_silently(&self) {
        self.send(Command::Disconnect { notify: false });
    }

    /// Reset the attempt budget and reconnect immediately.
    pub fn force_reconnect(&self) {
        self.send(Command::ForceReconnect);
    }

    /// Tear everything down silently and stop the actor.
    pub fn shutdown(&self) {
        self.send(Command::Shutdown);
    }

    /// Register a listener. The returned handle removes exactly this listener.
    pub fn add_listener(&self, listener: Listener) -> ListenerRemover {
        self.listeners.add(Arc::clone(&listener));
        ListenerRemover::new(&self.listeners, listener)
    }

    /// Unregister `listener`; a no-op if it is not registered.
    pub fn remove_listener(&self, listener: &Listener) {
        let removed = self.listeners.remove(listener);
        debug!(removed, "listener removed");
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Current status snapshot.
    pub fn status(&self) -> ConnectionStatus {
        self.status.borrow().clone()
    }

    /// Receiver that is updated on every state change.
    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.clone()
    }

    /// Handle for listeners and other long-lived callbacks.
    pub fn downgrade(&self) -> WeakConnectionManager {
        WeakConnectionManager {
            commands: self.commands.downgrade(),
            listeners: Arc::downgrade(&self.listeners),
            status: self.status.clone(),
        }
    }

    fn send(&self, command: Command) {
        if let Err(err) = self.commands.send(command) {
            warn!(command = ?err.0, "connection manager has stopped, command dropped");
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Actor
// ─────────────────────────────────────────────────────────────────────────────

enum Internal {
    Channel { epoch: u64, event: ChannelEvent },
    Timer { id: u64, kind: TimerKind },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TimerKind {
    ConnectTimeout,
    Heartbeat,
    Reconnect,
}

#[derive(Default)]
struct ManagerSession {
    identity: Option<String>,
    state: ConnectionState,
    attempt_count: u32,
    last_error: Option<String>,
    channel: Option<ChannelHandle>,
    heartbeat: Option<Timer>,
    reconnect_timer: Option<Timer>,
    connect_timeout: Option<Timer>,
    reconnect_in_flight: bool,
}

struct Actor {
    config: LinkConfig,
    connector: Arc<dyn Connector>,
    identity_source: Arc<dyn IdentitySource>,
    listeners: Arc<ListenerRegistry>,
    status_tx: watch::Sender<ConnectionStatus>,
    internal_tx: mpsc::UnboundedSender<Internal>,
    session: ManagerSession,
    next_id: u64,
}

impl Actor {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut internal: mpsc::UnboundedReceiver<Internal>,
    ) {
        debug!("connection manager started");
        loop {
            tokio::select! {
                biased;
                command = commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.handle_command(command),
                },
                Some(event) = internal.recv() => self.handle_internal(event),
            }
        }
        self.teardown();
        self.set_state_silently(ConnectionState::Disconnected);
        debug!("connection manager stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect(identity) => self.connect(identity),
            Command::Disconnect { notify } => self.disconnect(notify),
            Command::ForceReconnect => self.force_reconnect(),
            Command::Shutdown => {}
        }
    }

    fn handle_internal(&mut self, event: Internal) {
        match event {
            Internal::Channel { epoch, event } => self.handle_channel_event(epoch, event),
            Internal::Timer { id, kind } => self.handle_timer(id, kind),
        }
    }

    // ── Operations ──────────────────────────────────────────────────

    fn connect(&mut self, identity: String) {
        if identity.trim().is_empty() {
            self.teardown();
            self.report_config_failure("Cannot connect: no identity provided");
            return;
        }

        self.cancel_reconnect();
        self.release_channel(CLOSE_NORMAL, "superseded by a new connection");

        let url = protocol::channel_url(&self.config.url, &self.config.identity_param, &identity);
        self.session.identity = Some(identity);

        let epoch = self.next_id();
        let events = self.internal_tx.clone();
        let channel = ChannelHandle::open(
            epoch,
            url,
            Arc::clone(&self.connector),
            self.config.outbound_capacity,
            move |event| {
                let _ = events.send(Internal::Channel { epoch, event });
            },
        );
        debug!(epoch, conn_id = %channel.conn_id, "channel spawned");
        self.session.channel = Some(channel);
        self.session.connect_timeout =
            Some(self.schedule_once(TimerKind::ConnectTimeout, self.config.connect_timeout));

        let mut event = StatusEvent::new(ConnectionState::Connecting, "Connecting to telemetry channel");
        if self.session.attempt_count > 0 {
            event = event.with_attempt(self.session.attempt_count, self.config.max_attempts);
        }
        self.transition(event);
    }

    fn disconnect(&mut self, notify: bool) {
        let idle = self.session.state == ConnectionState::Disconnected
            && self.session.channel.is_none()
            && self.session.reconnect_timer.is_none();

        self.cancel_reconnect();
        self.release_channel(CLOSE_NORMAL, "client disconnect");

        if idle {
            debug!("already disconnected");
        } else if notify {
            self.transition(StatusEvent::new(ConnectionState::Disconnected, "Disconnected"));
        } else {
            self.set_state_silently(ConnectionState::Disconnected);
        }
    }

    fn force_reconnect(&mut self) {
        info!("forced reconnect requested");
        self.session.attempt_count = 0;
        self.cancel_reconnect();

        match self.resolve_identity() {
            Some(identity) => {
                self.disconnect(false);
                self.connect(identity);
            }
            None => {
                self.teardown();
                self.report_config_failure("No identity available for reconnection");
            }
        }
    }

    /// Schedule the next reconnect, or give up once the budget is spent.
    fn attempt_reconnect(&mut self) {
        if self.session.reconnect_in_flight {
            debug!("reconnect already scheduled");
            return;
        }

        self.session.attempt_count += 1;
        let attempt = self.session.attempt_count;
        let max_attempts = self.config.max_attempts;

        if attempt >= max_attempts {
            let err = LinkError::Exhausted(attempt);
            self.session.last_error = Some(err.to_string());
            self.transition(
                StatusEvent::new(
                    ConnectionState::Failed,
                    format!("Max reconnect attempts ({max_attempts}) reached"),
                )
                .with_error(&err)
                .with_attempt(attempt, max_attempts),
            );
            return;
        }

        let delay = self.config.backoff.delay(attempt);
        let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.session.reconnect_in_flight = true;
        self.session.reconnect_timer = Some(self.schedule_once(TimerKind::Reconnect, delay));

        self.transition(
            StatusEvent::new(
                ConnectionState::Reconnecting,
                format!("Reconnecting in {delay_ms}ms (attempt {attempt}/{max_attempts})"),
            )
            .with_attempt(attempt, max_attempts)
            .with_delay(delay_ms),
        );
    }

    // ── Channel events ──────────────────────────────────────────────

    fn handle_channel_event(&mut self, epoch: u64, event: ChannelEvent) {
        if self.session.channel.as_ref().map(|c| c.epoch) != Some(epoch) {
            debug!(epoch, ?event, "ignoring event from superseded channel");
            return;
        }

        match event {
            ChannelEvent::Opened => self.on_open(),
            ChannelEvent::Message(text) => self.on_message(&text),
            ChannelEvent::Closed { code, reason } => self.on_closed(code, &reason),
            ChannelEvent::ConnectFailed(err) | ChannelEvent::Failed(err) => self.on_failed(&err),
            ChannelEvent::SendFailed(err) => self.on_dead_channel(&err.to_string()),
        }
    }

    fn on_open(&mut self) {
        let Some(channel) = self.session.channel.as_mut() else {
            return;
        };
        channel.open = true;
        self.session.connect_timeout = None;
        self.session.attempt_count = 0;
        self.session.last_error = None;
        self.start_heartbeat();
        self.transition(StatusEvent::new(
            ConnectionState::Connected,
            "Connected to telemetry channel",
        ));
    }

    fn on_message(&mut self, text: &str) {
        match protocol::decode_inbound(text) {
            Ok(Inbound::KeepAlive) => debug!("heartbeat acknowledged"),
            Ok(Inbound::Payload(payload)) => {
                let report = self.listeners.dispatch(&ConnectionEvent::Telemetry(payload));
                debug!(
                    delivered = report.delivered,
                    panicked = report.panicked,
                    "telemetry dispatched"
                );
            }
            Err(err) => {
                warn!(error = %err, kind = ?err.kind(), bytes = text.len(), "dropping inbound payload");
            }
        }
    }

    fn on_closed(&mut self, code: u16, reason: &str) {
        let was_open = self.channel_open();
        self.release_channel(CLOSE_NORMAL, "");

        if was_open {
            let message = if reason.is_empty() {
                format!("Connection closed (code {code})")
            } else {
                format!("Connection closed (code {code}): {reason}")
            };
            if code != CLOSE_NORMAL {
                self.session.last_error = Some(message.clone());
            }
            self.transition(
                StatusEvent::new(ConnectionState::Disconnected, message).with_close(code, reason),
            );
        } else {
            let err = LinkError::Connect(format!("channel closed before opening (code {code})"));
            self.session.last_error = Some(err.to_string());
            self.transition(
                StatusEvent::new(ConnectionState::Error, format!("Connection error: {err}"))
                    .with_error(&err)
                    .with_close(code, reason),
            );
        }
        self.attempt_reconnect();
    }

    fn on_failed(&mut self, err: &LinkError) {
        let was_open = self.channel_open();
        self.release_channel(CLOSE_NORMAL, "");
        self.session.last_error = Some(err.to_string());

        let state = if was_open {
            ConnectionState::Disconnected
        } else {
            ConnectionState::Error
        };
        self.transition(
            StatusEvent::new(state, format!("Connection error: {err}")).with_error(err),
        );
        self.attempt_reconnect();
    }

    /// The channel claims to be open but cannot be written to.
    fn on_dead_channel(&mut self, reason: &str) {
        warn!(reason, "telemetry channel is dead, reconnecting");
        self.session.last_error = Some(reason.to_owned());
        self.disconnect(false);
        self.attempt_reconnect();
    }

    // ── Timers ──────────────────────────────────────────────────────

    fn handle_timer(&mut self, id: u64, kind: TimerKind) {
        let current = match kind {
            TimerKind::ConnectTimeout => self.session.connect_timeout.as_ref(),
            TimerKind::Heartbeat => self.session.heartbeat.as_ref(),
            TimerKind::Reconnect => self.session.reconnect_timer.as_ref(),
        };
        if current.map(Timer::id) != Some(id) {
            debug!(id, ?kind, "ignoring cancelled timer");
            return;
        }

        match kind {
            TimerKind::ConnectTimeout => self.on_connect_timeout(),
            TimerKind::Heartbeat => self.on_heartbeat(),
            TimerKind::Reconnect => self.on_reconnect_due(),
        }
    }

    fn on_connect_timeout(&mut self) {
        self.session.connect_timeout = None;
        let timeout_ms = u64::try_from(self.config.connect_timeout.as_millis()).unwrap_or(u64::MAX);
        self.release_channel(CLOSE_NORMAL, "connect timeout");

        let err = LinkError::Connect(format!("no response within {timeout_ms}ms"));
        self.session.last_error = Some(err.to_string());
        self.transition(
            StatusEvent::new(
                ConnectionState::Timeout,
                format!("Connection timed out after {timeout_ms}ms"),
            )
            .with_error(&err),
        );
        self.attempt_reconnect();
    }

    fn on_heartbeat(&mut self) {
        let sent = match self.session.channel.as_ref() {
            Some(channel) => channel.send_text(protocol::heartbeat_payload()),
            None => Err(SendError::NotOpen),
        };
        match sent {
            Ok(()) => debug!("heartbeat sent"),
            Err(SendError::Full) => warn!("outbound queue full, heartbeat skipped"),
            Err(SendError::NotOpen) => self.on_dead_channel("heartbeat failed: channel is not open"),
        }
    }

    fn on_reconnect_due(&mut self) {
        self.session.reconnect_timer = None;
        self.session.reconnect_in_flight = false;

        match self.resolve_identity() {
            Some(identity) => {
                info!(attempt = self.session.attempt_count, "reconnecting");
                self.connect(identity);
            }
            None => self.report_config_failure("No identity available for reconnection"),
        }
    }

    fn start_heartbeat(&mut self) {
        let id = self.next_id();
        let events = self.internal_tx.clone();
        self.session.heartbeat = Some(Timer::every(id, self.config.heartbeat_interval, move || {
            let _ = events.send(Internal::Timer {
                id,
                kind: TimerKind::Heartbeat,
            });
        }));
    }

    fn schedule_once(&mut self, kind: TimerKind, delay: Duration) -> Timer {
        let id = self.next_id();
        let events = self.internal_tx.clone();
        Timer::once(id, delay, move || {
            let _ = events.send(Internal::Timer { id, kind });
        })
    }

    // ── Helpers ─────────────────────────────────────────────────────

    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn channel_open(&self) -> bool {
        self.session.channel.as_ref().is_some_and(|c| c.open)
    }

    /// Stored identity first, then the identity source.
    fn resolve_identity(&mut self) -> Option<String> {
        if let Some(identity) = self
            .session
            .identity
            .clone()
            .filter(|identity| !identity.trim().is_empty())
        {
            return Some(identity);
        }

        let found = self
            .identity_source
            .lookup()
            .filter(|identity| !identity.trim().is_empty());
        if found.is_some() {
            debug!("identity recovered from identity source");
            self.session.identity.clone_from(&found);
        }
        found
    }

    fn report_config_failure(&mut self, message: &str) {
        let err = LinkError::Config(message.to_owned());
        warn!(%err, "cannot connect");
        self.session.last_error = Some(err.to_string());
        self.transition(StatusEvent::new(ConnectionState::Error, message).with_error(&err));
    }

    fn cancel_reconnect(&mut self) {
        self.session.reconnect_timer = None;
        self.session.reconnect_in_flight = false;
    }

    /// Stop channel-scoped timers and close the channel, if any.
    fn release_channel(&mut self, code: u16, reason: &str) {
        self.session.heartbeat = None;
        self.session.connect_timeout = None;
        if let Some(channel) = self.session.channel.take() {
            channel.close(code, reason);
        }
    }

    fn teardown(&mut self) {
        self.cancel_reconnect();
        self.release_channel(CLOSE_NORMAL, "client shutdown");
    }

    fn snapshot(&self) -> ConnectionStatus {
        ConnectionStatus {
            connected: self.session.state == ConnectionState::Connected,
            status: self.session.state,
            last_error: self.session.last_error.clone(),
            reconnect_attempts: self.session.attempt_count,
            max_reconnect_attempts: self.config.max_attempts,
            is_reconnecting: self.session.reconnect_in_flight,
        }
    }

    fn set_state_silently(&mut self, state: ConnectionState) {
        self.session.state = state;
        let _ = self.status_tx.send_replace(self.snapshot());
    }

    /// Enter `event.status`, publish the snapshot, then notify listeners.
    fn transition(&mut self, event: StatusEvent) {
        let previous = self.session.state;
        self.set_state_silently(event.status);

        if event.status.is_problem() {
            warn!(from = %previous, to = %event.status, attempt = self.session.attempt_count, "{}", event.message);
        } else {
            info!(from = %previous, to = %event.status, attempt = self.session.attempt_count, "{}", event.message);
        }

        let report = self.listeners.dispatch(&ConnectionEvent::Status(event));
        if report.panicked > 0 {
            debug!(panicked = report.panicked, "status listeners panicked");
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
