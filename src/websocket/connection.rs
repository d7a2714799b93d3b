// -------------------------------------------------------------------------------------------------
//  Copyright (C) 2015-2025 Nautech Systems Pty Ltd. All rights reserved.
//  https://nautechsystems.io
//
//  Licensed under the GNU Lesser General Public License Version 3.0 (the "License");
//  You may not use this file except in compliance with the License.
//  You may obtain a copy of the License at https://www.gnu.org/licenses/lgpl-3.0.en.html
//
//  Unless required by applicable law or agreed to in writing, software
//  distributed under the License is distributed on an "AS IS" BASIS,
//  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//  See the License for the specific language governing permissions and
//  limitations under the License.
// -------------------------------------------------------------------------------------------------

//! Per-channel duplex stream connection.
//!
//! A [`StreamConnection`] owns one persistent WebSocket bound to a single
//! protocol and drives it from a dedicated Tokio task: transport connect,
//! protocol login, message fan-out, and candidate failover with a growing
//! reconnect delay. At most one live connection exists per channel name; the
//! session's channel registry enforces that invariant.

use std::{
    sync::{
        atomic::{AtomicU8, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use ustr::Ustr;

use crate::{
    common::{
        consts::LOGIN_STREAM_ID,
        enums::{ConnectionState, EventCode, Protocol},
    },
    discovery::EndpointRotation,
    error::StreamError,
    session::{backend::SessionBackend, registry::SubscriptionRegistry, EventSink},
    websocket::messages::{classify, market_data_pong, InboundKind},
};

/// Commands accepted by a connection's worker task.
#[derive(Debug)]
pub(crate) enum ConnectionCommand {
    /// Write a message to the wire.
    Send(Value),
    /// Re-send the auth message with the rotated token.
    RefreshToken,
    /// Begin explicit teardown.
    Disconnect,
}

/// Readiness of a connection, observable through a watch channel.
#[derive(Clone, Debug)]
pub(crate) enum ReadyState {
    /// Not logged in yet (initial state, and again while reconnecting).
    Pending,
    /// Login acknowledged; the connection accepts subscriptions.
    Ready,
    /// Terminal failure; the readiness future rejects with this error.
    Failed(StreamError),
}

/// Tunables handed to a connection when it starts.
#[derive(Clone, Debug)]
pub(crate) struct ConnectionSettings {
    /// Timeout covering transport handshake and login acknowledgement.
    pub handshake_timeout: Duration,
    /// Maximum reconnect attempts; `None` is unbounded.
    pub max_reconnect_attempts: Option<u32>,
}

/// A single persistent duplex connection serving one channel.
pub struct StreamConnection {
    channel: Ustr,
    protocol: Protocol,
    state: Arc<AtomicU8>,
    cmd_tx: mpsc::UnboundedSender<ConnectionCommand>,
    cmd_rx: Mutex<Option<mpsc::UnboundedReceiver<ConnectionCommand>>>,
    ready_tx: watch::Sender<ReadyState>,
    cancel: CancellationToken,
    task: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl std::fmt::Debug for StreamConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamConnection")
            .field("channel", &self.channel)
            .field("protocol", &self.protocol)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl StreamConnection {
    /// Creates a connection for `(channel, protocol)` without starting it.
    pub(crate) fn new(channel: Ustr, protocol: Protocol) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (ready_tx, _) = watch::channel(ReadyState::Pending);

        Self {
            channel,
            protocol,
            state: Arc::new(AtomicU8::new(ConnectionState::Connecting.as_u8())),
            cmd_tx,
            cmd_rx: Mutex::new(Some(cmd_rx)),
            ready_tx,
            cancel: CancellationToken::new(),
            task: Mutex::new(None),
        }
    }

    /// Spawns the worker task driving this connection.
    ///
    /// Idempotent: only the first call starts a worker.
    pub(crate) fn start(
        &self,
        rotation: EndpointRotation,
        backend: Arc<dyn SessionBackend>,
        subscriptions: Arc<SubscriptionRegistry>,
        events: Arc<EventSink>,
        settings: ConnectionSettings,
    ) {
        let Some(cmd_rx) = self.cmd_rx.lock().expect("connection cmd lock poisoned").take()
        else {
            return;
        };

        let worker = ConnectionWorker {
            channel: self.channel,
            protocol: self.protocol,
            rotation,
            backend,
            subscriptions,
            events,
            state: Arc::clone(&self.state),
            ready_tx: self.ready_tx.clone(),
            cancel: self.cancel.clone(),
            settings,
            attempts: 0,
        };

        let task = tokio::spawn(worker.run(cmd_rx));
        *self.task.lock().expect("connection task lock poisoned") = Some(task);
    }

    /// Returns the channel name this connection serves.
    #[must_use]
    pub fn channel(&self) -> Ustr {
        self.channel
    }

    /// Returns the protocol this connection speaks.
    #[must_use]
    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// Returns the current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Relaxed))
    }

    /// Returns whether the connection is logged in and serving subscriptions.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.state() == ConnectionState::Ready
    }

    /// Queues a message for the wire.
    ///
    /// # Errors
    ///
    /// Returns a send error unless the connection is connected, authenticating
    /// or ready; messages are never silently dropped.
    pub fn send(&self, payload: Value) -> Result<(), StreamError> {
        let state = self.state();
        if !state.accepts_sends() {
            return Err(StreamError::Send(format!(
                "cannot send on channel {} while {state}",
                self.channel
            )));
        }

        self.cmd_tx
            .send(ConnectionCommand::Send(payload))
            .map_err(|e| StreamError::Send(format!("connection worker gone: {e}")))
    }

    /// Notifies the connection of a credential rotation.
    ///
    /// Only connections currently authenticating or ready re-send the auth
    /// message; others pick up the new token on their next login.
    pub(crate) fn refresh_token(&self) {
        if matches!(
            self.state(),
            ConnectionState::Ready | ConnectionState::Authenticating
        ) {
            let _ = self.cmd_tx.send(ConnectionCommand::RefreshToken);
        }
    }

    /// Waits until the connection is ready, or fails with the terminal error.
    ///
    /// # Errors
    ///
    /// Returns the terminal connection error, or a timeout error when the
    /// deadline expires first.
    pub async fn wait_until_ready(&self, timeout: Duration) -> Result<(), StreamError> {
        let mut rx = self.ready_tx.subscribe();
        let channel = self.channel;

        let wait = async move {
            loop {
                let state = rx.borrow().clone();
                match state {
                    ReadyState::Ready => return Ok(()),
                    ReadyState::Failed(e) => return Err(e),
                    ReadyState::Pending => {}
                }

                if rx.changed().await.is_err() {
                    return Err(StreamError::Closed(format!(
                        "connection worker for channel {channel} stopped"
                    )));
                }
            }
        };

        tokio::time::timeout(timeout, wait).await.map_err(|_| {
            StreamError::Timeout(format!("channel {} not ready after {timeout:?}", self.channel))
        })?
    }

    /// Closes the connection, waiting up to `drain_timeout` for the worker.
    pub(crate) async fn close(&self, drain_timeout: Duration) {
        tracing::debug!("Closing stream connection for channel {}", self.channel);
        self.cancel.cancel();
        let _ = self.cmd_tx.send(ConnectionCommand::Disconnect);

        let task = self.task.lock().expect("connection task lock poisoned").take();
        if let Some(task) = task {
            let abort = task.abort_handle();
            if tokio::time::timeout(drain_timeout, task).await.is_err() {
                tracing::warn!(
                    "Timeout waiting for channel {} worker to drain, aborting",
                    self.channel
                );
                abort.abort();
            }
        }
    }
}

#[cfg(test)]
impl StreamConnection {
    pub(crate) fn force_state(&self, state: ConnectionState) {
        self.state.store(state.as_u8(), Ordering::Relaxed);
    }

    pub(crate) fn take_command_rx(&self) -> mpsc::UnboundedReceiver<ConnectionCommand> {
        self.cmd_rx
            .lock()
            .expect("connection cmd lock poisoned")
            .take()
            .expect("command receiver already taken")
    }
}

/// Reason an attempt left its read/write loop.
enum Disconnect {
    /// The login was refused; terminal for the connection.
    LoginRefused(String),
    /// Transport-level failure; feeds the reconnect policy.
    Transport(String),
}

struct ConnectionWorker {
    channel: Ustr,
    protocol: Protocol,
    rotation: EndpointRotation,
    backend: Arc<dyn SessionBackend>,
    subscriptions: Arc<SubscriptionRegistry>,
    events: Arc<EventSink>,
    state: Arc<AtomicU8>,
    ready_tx: watch::Sender<ReadyState>,
    cancel: CancellationToken,
    settings: ConnectionSettings,
    attempts: u32,
}

impl ConnectionWorker {
    async fn run(mut self, mut cmd_rx: mpsc::UnboundedReceiver<ConnectionCommand>) {
        let mut was_ready = false;

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            self.set_state(ConnectionState::Connecting);
            let url = self.rotation.current().ws_url();
            self.events.event(
                EventCode::StreamConnecting,
                &format!("Connecting channel {} to {url}", self.channel),
            );

            match self.run_attempt(&url, &mut cmd_rx, &mut was_ready).await {
                Ok(()) => break,
                Err(Disconnect::LoginRefused(reason)) => {
                    let msg = format!("login refused on channel {}: {reason}", self.channel);
                    tracing::error!("{msg}");
                    self.set_state(ConnectionState::Closed);
                    self.events.event(EventCode::StreamAuthenticationFailed, &msg);
                    self
                        .ready_tx
                        .send_replace(ReadyState::Failed(StreamError::Authentication(msg)));
                    return;
                }
                Err(Disconnect::Transport(reason)) => {
                    self.ready_tx.send_replace(ReadyState::Pending);
                    self.set_state(ConnectionState::Disconnected);
                    self.events.event(
                        EventCode::StreamDisconnected,
                        &format!("Channel {} disconnected: {reason}", self.channel),
                    );

                    self.attempts += 1;
                    if let Some(max) = self.settings.max_reconnect_attempts {
                        if self.attempts > max {
                            let msg = format!(
                                "channel {} gave up after {max} reconnect attempts: {reason}",
                                self.channel
                            );
                            tracing::error!("{msg}");
                            self.set_state(ConnectionState::Closed);
                            self.events.event(EventCode::StreamDisconnected, &msg);
                            self.ready_tx
                                .send_replace(ReadyState::Failed(StreamError::Transport(msg)));
                            return;
                        }
                    }

                    self.set_state(ConnectionState::Reconnecting);
                    self.rotation.advance();
                    let delay = self.rotation.reconnect_delay();
                    self.events.event(
                        EventCode::StreamReconnecting,
                        &format!(
                            "Channel {} retrying against {} in {delay:?}",
                            self.channel,
                            self.rotation.current().host
                        ),
                    );

                    tokio::select! {
                        () = tokio::time::sleep(delay) => {}
                        () = self.cancel.cancelled() => break,
                    }
                }
            }
        }

        self.set_state(ConnectionState::Closed);
        self.ready_tx.send_replace(ReadyState::Failed(StreamError::Closed(format!(
            "channel {} connection closed",
            self.channel
        ))));
        self.events.event(
            EventCode::StreamDisconnected,
            &format!("Channel {} closed", self.channel),
        );
    }

    /// Runs a single connect/login/serve attempt.
    ///
    /// `Ok(())` means teardown was requested; errors feed the reconnect policy.
    async fn run_attempt(
        &mut self,
        url: &str,
        cmd_rx: &mut mpsc::UnboundedReceiver<ConnectionCommand>,
        was_ready: &mut bool,
    ) -> Result<(), Disconnect> {
        let cancel = self.cancel.clone();

        let connect = tokio::time::timeout(self.settings.handshake_timeout, connect_async(url));
        let result = tokio::select! {
            r = connect => r,
            () = cancel.cancelled() => return Ok(()),
        };

        let (ws, _response) = match result {
            Ok(Ok(pair)) => pair,
            Ok(Err(e)) => return Err(Disconnect::Transport(format!("connect failed: {e}"))),
            Err(_) => {
                return Err(Disconnect::Transport(format!(
                    "connect timed out after {:?}",
                    self.settings.handshake_timeout
                )))
            }
        };

        self.set_state(ConnectionState::Connected);
        tracing::debug!("Channel {} transport established: {url}", self.channel);

        let (mut sink, mut stream) = ws.split();

        let login = self
            .backend
            .login_request(self.channel, self.protocol, LOGIN_STREAM_ID)
            .map_err(|e| Disconnect::LoginRefused(e.to_string()))?;

        sink.send(Message::Text(login.to_string()))
            .await
            .map_err(|e| Disconnect::Transport(format!("login send failed: {e}")))?;
        self.set_state(ConnectionState::Authenticating);

        let login_deadline = tokio::time::sleep(self.settings.handshake_timeout);
        tokio::pin!(login_deadline);
        let mut logged_in = false;

        loop {
            tokio::select! {
                () = &mut login_deadline, if !logged_in => {
                    return Err(Disconnect::Transport(format!(
                        "login acknowledgement timed out after {:?}",
                        self.settings.handshake_timeout
                    )));
                }
                () = cancel.cancelled() => {
                    self.set_state(ConnectionState::Closing);
                    let _ = sink.send(Message::Close(None)).await;
                    return Ok(());
                }
                cmd = cmd_rx.recv() => match cmd {
                    Some(ConnectionCommand::Send(payload)) => {
                        sink.send(Message::Text(payload.to_string()))
                            .await
                            .map_err(|e| Disconnect::Transport(format!("send failed: {e}")))?;
                    }
                    Some(ConnectionCommand::RefreshToken) => {
                        match self.backend.login_request(self.channel, self.protocol, LOGIN_STREAM_ID) {
                            Ok(refresh) => {
                                tracing::debug!(
                                    "Channel {} re-sending auth after token rotation",
                                    self.channel
                                );
                                sink.send(Message::Text(refresh.to_string()))
                                    .await
                                    .map_err(|e| {
                                        Disconnect::Transport(format!("auth refresh send failed: {e}"))
                                    })?;
                            }
                            Err(e) => tracing::error!(
                                "Channel {} cannot build auth refresh: {e}",
                                self.channel
                            ),
                        }
                    }
                    Some(ConnectionCommand::Disconnect) | None => {
                        self.set_state(ConnectionState::Closing);
                        let _ = sink.send(Message::Close(None)).await;
                        return Ok(());
                    }
                },
                frame = stream.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        let parsed: Value = match serde_json::from_str(&text) {
                            Ok(value) => value,
                            Err(e) => {
                                tracing::warn!(
                                    "Channel {} dropped undecodable message: {e}",
                                    self.channel
                                );
                                continue;
                            }
                        };

                        // The market-data protocol batches messages into arrays
                        let items = match parsed {
                            Value::Array(items) => items,
                            other => vec![other],
                        };

                        for item in items {
                            match classify(self.protocol, &item) {
                                InboundKind::Ping => {
                                    sink.send(Message::Text(market_data_pong().to_string()))
                                        .await
                                        .map_err(|e| {
                                            Disconnect::Transport(format!("pong send failed: {e}"))
                                        })?;
                                }
                                InboundKind::LoginAccepted => {
                                    if !logged_in {
                                        logged_in = true;
                                        self.on_login_accepted(&mut sink, *was_ready).await?;
                                        *was_ready = true;
                                    }
                                }
                                InboundKind::LoginRejected(reason) => {
                                    if logged_in {
                                        return Err(Disconnect::Transport(format!(
                                            "login closed by server: {reason}"
                                        )));
                                    }
                                    return Err(Disconnect::LoginRefused(reason));
                                }
                                InboundKind::Other => {
                                    self.subscriptions.dispatch(self.channel, &item);
                                }
                            }
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = sink.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(frame))) => {
                        return Err(Disconnect::Transport(format!(
                            "server closed the connection: {frame:?}"
                        )));
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(Disconnect::Transport(e.to_string())),
                    None => return Err(Disconnect::Transport("stream ended".to_string())),
                },
            }
        }
    }

    /// Transitions to ready and re-homes subscriptions after a reconnect.
    async fn on_login_accepted<S>(&mut self, sink: &mut S, was_ready: bool) -> Result<(), Disconnect>
    where
        S: SinkExt<Message> + Unpin,
        S::Error: std::fmt::Display,
    {
        self.set_state(ConnectionState::Ready);
        self.rotation.reset();
        self.attempts = 0;

        self.events.event(
            EventCode::StreamAuthenticationSuccess,
            &format!("Login accepted on channel {}", self.channel),
        );
        self.events.event(
            EventCode::StreamConnected,
            &format!("Channel {} ready ({})", self.channel, self.protocol),
        );
        self.ready_tx.send_replace(ReadyState::Ready);

        if was_ready {
            // Re-home every subscription bound to this channel so the
            // reconnect stays transparent to subscribers
            let payloads = self.subscriptions.subscribe_payloads(self.channel);
            tracing::info!(
                "Channel {} re-issuing {} subscription(s) after reconnect",
                self.channel,
                payloads.len()
            );
            for payload in payloads {
                sink.send(Message::Text(payload.to_string()))
                    .await
                    .map_err(|e| Disconnect::Transport(format!("resubscribe send failed: {e}")))?;
            }
        }

        Ok(())
    }

    fn set_state(&self, state: ConnectionState) {
        tracing::trace!("Channel {} state -> {state}", self.channel);
        self.state.store(state.as_u8(), Ordering::Relaxed);
    }
}
