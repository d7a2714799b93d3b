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

//! The session façade and its open/close state machine.

use std::sync::{Arc, Mutex};

use reqwest::Method;
use serde_json::Value;
use ustr::Ustr;

use crate::{
    common::{
        credential::Grant,
        enums::{EventCode, Protocol, SessionState},
    },
    config::SessionConfig,
    error::StreamError,
    session::{
        backend::SessionBackend,
        fixed_host::FixedHostBackend,
        hybrid::HybridBackend,
        local_proxy::LocalProxyBackend,
        platform::PlatformBackend,
        registry::{ChannelRegistry, StreamListener, SubscriptionRegistry},
        EventSink,
    },
    websocket::{
        connection::ConnectionSettings,
        StreamConnection,
    },
};

/// The façade over one logical client instance.
///
/// A session owns its channel and subscription registries, drives the active
/// variant through open/close, and re-homes subscriptions across reconnects.
/// Multiple sessions in one process are fully independent.
pub struct Session {
    config: Arc<SessionConfig>,
    backend: Arc<dyn SessionBackend>,
    state: Mutex<SessionState>,
    events: Arc<EventSink>,
    channels: Arc<ChannelRegistry>,
    subscriptions: Arc<SubscriptionRegistry>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("variant", &self.backend.name())
            .field("state", &self.state())
            .field("subscriptions", &self.subscriptions.count())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Creates a platform session.
    ///
    /// The active variant is classified from the arguments: grant only →
    /// platform discovery; deployed host only → fixed host; both → hybrid
    /// (market-data channels to the host, everything else to the platform).
    ///
    /// # Errors
    ///
    /// Returns an error when neither a grant nor a deployed host is supplied,
    /// or construction of the variant fails.
    pub fn platform(
        config: SessionConfig,
        grant: Option<Grant>,
        deployed_host: Option<&str>,
    ) -> Result<Self, StreamError> {
        let config = Arc::new(config);
        let events = Arc::new(EventSink::new());
        let channels = Arc::new(ChannelRegistry::new());

        let backend: Arc<dyn SessionBackend> = match (grant, deployed_host) {
            (Some(grant), Some(host)) => {
                tracing::debug!("Creating hybrid session (platform + deployed host {host})");
                Arc::new(HybridBackend::new(
                    Arc::clone(&config),
                    grant,
                    host,
                    Arc::clone(&channels),
                    Arc::clone(&events),
                )?)
            }
            (Some(grant), None) => {
                tracing::debug!("Creating platform session");
                Arc::new(PlatformBackend::new(
                    Arc::clone(&config),
                    grant,
                    Arc::clone(&channels),
                    Arc::clone(&events),
                )?)
            }
            (None, Some(host)) => {
                tracing::debug!("Creating fixed-host session against {host}");
                Arc::new(FixedHostBackend::new(Arc::clone(&config), host))
            }
            (None, None) => {
                return Err(StreamError::Authentication(
                    "a platform session requires a grant, a deployed host, or both".to_string(),
                ))
            }
        };

        Ok(Self::from_parts(config, backend, events, channels))
    }

    /// Creates a local-proxy session against the desktop process named by the
    /// configured base URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the variant cannot be constructed.
    pub fn local_proxy(config: SessionConfig) -> Result<Self, StreamError> {
        let config = Arc::new(config);
        let events = Arc::new(EventSink::new());
        let channels = Arc::new(ChannelRegistry::new());
        let backend: Arc<dyn SessionBackend> = Arc::new(LocalProxyBackend::new(
            Arc::clone(&config),
            Arc::clone(&events),
        )?);

        Ok(Self::from_parts(config, backend, events, channels))
    }

    /// Creates a fixed-host session against `host`, bypassing discovery.
    ///
    /// # Errors
    ///
    /// Returns an error if the variant cannot be constructed.
    pub fn fixed_host(config: SessionConfig, host: &str) -> Result<Self, StreamError> {
        Self::platform(config, None, Some(host))
    }

    /// Creates a hybrid session over a grant and a deployed host.
    ///
    /// # Errors
    ///
    /// Returns an error if either leg cannot be constructed.
    pub fn hybrid(config: SessionConfig, grant: Grant, host: &str) -> Result<Self, StreamError> {
        Self::platform(config, Some(grant), Some(host))
    }

    fn from_parts(
        config: Arc<SessionConfig>,
        backend: Arc<dyn SessionBackend>,
        events: Arc<EventSink>,
        channels: Arc<ChannelRegistry>,
    ) -> Self {
        Self {
            config,
            backend,
            state: Mutex::new(SessionState::Closed),
            events,
            channels,
            subscriptions: Arc::new(SubscriptionRegistry::new()),
        }
    }

    /// Registers the state callback, invoked exactly once per transition.
    #[must_use]
    pub fn on_state(self, callback: impl Fn(SessionState, &str) + Send + Sync + 'static) -> Self {
        self.events.set_on_state(Arc::new(callback));
        self
    }

    /// Registers the event callback, invoked for every session and stream event.
    #[must_use]
    pub fn on_event(self, callback: impl Fn(EventCode, &str) + Send + Sync + 'static) -> Self {
        self.events.set_on_event(Arc::new(callback));
        self
    }

    /// Returns the variant name of this session.
    #[must_use]
    pub fn variant(&self) -> &'static str {
        self.backend.name()
    }

    /// Returns the current session state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.state.lock().expect("session state lock poisoned")
    }

    /// Returns whether the session is open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state() == SessionState::Open
    }

    /// Returns the last event code and message observed.
    #[must_use]
    pub fn last_event(&self) -> Option<(EventCode, String)> {
        self.events.last_event()
    }

    /// Opens the session: Closed → Pending → Open.
    ///
    /// Idempotent: opening a pending or open session returns the current
    /// state without side effects. A fatal authorization failure transitions
    /// back to Closed.
    ///
    /// # Errors
    ///
    /// Returns the terminal error when the variant's authorization fails.
    pub async fn open(&self) -> Result<SessionState, StreamError> {
        {
            let mut state = self.state.lock().expect("session state lock poisoned");
            if matches!(*state, SessionState::Pending | SessionState::Open) {
                return Ok(*state);
            }
            *state = SessionState::Pending;
        }
        self.events.state(SessionState::Pending, "Session is pending");
        self.events.event(
            EventCode::SessionConnecting,
            &format!("Opening {} session", self.backend.name()),
        );

        match self.backend.authorize().await {
            Ok(()) => {
                self.set_state(SessionState::Open, "Session is opened");
                self.events
                    .event(EventCode::SessionConnected, "Session is connected");
                Ok(SessionState::Open)
            }
            Err(e) => {
                tracing::error!("Session open failed: {e}");
                self.set_state(SessionState::Closed, "Session is closed");
                Err(e)
            }
        }
    }

    /// Closes the session, tearing down every owned connection.
    ///
    /// Idempotent: closing a closed session is a no-op. Each connection gets a
    /// bounded drain timeout before being aborted.
    pub async fn close(&self) -> SessionState {
        {
            let state = self.state.lock().expect("session state lock poisoned");
            if *state == SessionState::Closed {
                return *state;
            }
        }

        for conn in self.channels.drain() {
            conn.close(self.config.close_timeout).await;
        }

        self.backend.shutdown();
        self.set_state(SessionState::Closed, "Session is closed");
        self.events
            .event(EventCode::SessionDisconnected, "Session is disconnected");
        SessionState::Closed
    }

    /// Returns the live connection for `channel`, creating and starting one
    /// when none exists.
    ///
    /// Errors during bring-up of a new channel are returned to this caller;
    /// failures on channels that were already ready are reported through the
    /// event callback instead and drive the reconnect machinery.
    ///
    /// # Errors
    ///
    /// Returns an error when the session is closed, resolution fails, or the
    /// connection does not reach ready in time.
    pub async fn open_channel(
        &self,
        channel: &str,
        protocol: Protocol,
    ) -> Result<Arc<StreamConnection>, StreamError> {
        if self.state() == SessionState::Closed {
            return Err(StreamError::NotConnected(
                "the session is closed; call open() first".to_string(),
            ));
        }

        let channel = Ustr::from(channel);
        let ready_timeout = self.config.handshake_timeout * 2;

        if let Some(existing) = self.channels.live(channel) {
            existing.wait_until_ready(ready_timeout).await?;
            return Ok(existing);
        }

        let rotation = self.backend.resolve_endpoints(channel, protocol).await?;
        let conn = Arc::new(StreamConnection::new(channel, protocol));
        let (conn, created) = self.channels.insert_or_live(conn);

        if created {
            conn.start(
                rotation,
                Arc::clone(&self.backend),
                Arc::clone(&self.subscriptions),
                Arc::clone(&self.events),
                ConnectionSettings {
                    handshake_timeout: self.config.handshake_timeout,
                    max_reconnect_attempts: self.config.max_reconnect_attempts,
                },
            );
        }

        conn.wait_until_ready(ready_timeout).await?;
        Ok(conn)
    }

    /// Subscribes `listener` to `channel`, bringing the channel up when
    /// needed, and returns the subscription id.
    ///
    /// The listener's subscribe request (when it produces one) is sent
    /// immediately, and re-sent automatically whenever the channel reconnects.
    ///
    /// # Errors
    ///
    /// Returns an error when the channel cannot be brought up, the listener is
    /// already registered on the channel, or the subscribe request cannot be
    /// queued.
    pub async fn subscribe(
        &self,
        channel: &str,
        protocol: Protocol,
        listener: Arc<dyn StreamListener>,
    ) -> Result<u64, StreamError> {
        let conn = self.open_channel(channel, protocol).await?;
        let id = self.subscriptions.register(conn.channel(), &listener)?;

        if let Some(request) = listener.subscribe_request() {
            if let Err(e) = conn.send(request) {
                // Roll the registration back so the failure is not half-applied
                let _ = self.subscriptions.unregister(id);
                return Err(e);
            }
        }

        Ok(id)
    }

    /// Tears down the named channel and its connection.
    ///
    /// Subscriptions registered on the channel stay in place; they are
    /// re-issued if the channel is brought up again later.
    ///
    /// # Errors
    ///
    /// Returns an error when no connection exists for the channel.
    pub async fn close_channel(&self, channel: &str) -> Result<(), StreamError> {
        match self.channels.remove(Ustr::from(channel)) {
            Some(conn) => {
                conn.close(self.config.close_timeout).await;
                Ok(())
            }
            None => Err(StreamError::NotConnected(format!(
                "no connection for channel {channel}"
            ))),
        }
    }

    /// Removes the subscription with the given id.
    ///
    /// # Errors
    ///
    /// Returns an unknown-subscription error for ids never issued or already
    /// unregistered.
    pub fn unsubscribe(&self, id: u64) -> Result<(), StreamError> {
        self.subscriptions.unregister(id)
    }

    /// Sends a message on the named channel.
    ///
    /// # Errors
    ///
    /// Returns an error when no live connection serves the channel, or the
    /// connection no longer accepts sends.
    pub fn send(&self, channel: &str, payload: Value) -> Result<(), StreamError> {
        match self.channels.live(Ustr::from(channel)) {
            Some(conn) => conn.send(payload),
            None => Err(StreamError::NotConnected(format!(
                "no live connection for channel {channel}"
            ))),
        }
    }

    /// Performs a one-shot REST request through the active variant.
    ///
    /// # Errors
    ///
    /// Returns an error when the variant has no HTTP access or the request
    /// fails.
    pub async fn http_request(
        &self,
        method: Method,
        url: &str,
        body: Option<Value>,
    ) -> Result<Value, StreamError> {
        self.backend.http_request(method, url, body).await
    }

    fn set_state(&self, state: SessionState, message: &str) {
        {
            let mut guard = self.state.lock().expect("session state lock poisoned");
            if *guard == state {
                return;
            }
            *guard = state;
        }
        self.events.state(state, message);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use rstest::rstest;

    use super::*;
    use crate::discovery::EndpointRotation;

    /// Backend whose authorization outcome is scripted per attempt.
    struct ScriptedBackend {
        attempts: AtomicUsize,
        fail_first: bool,
    }

    #[async_trait]
    impl SessionBackend for ScriptedBackend {
        fn name(&self) -> &'static str {
            "scripted"
        }

        fn login_request(
            &self,
            _channel: Ustr,
            _protocol: Protocol,
            _stream_id: u64,
        ) -> Result<Value, StreamError> {
            Ok(Value::Null)
        }

        async fn resolve_endpoints(
            &self,
            _channel: Ustr,
            _protocol: Protocol,
        ) -> Result<EndpointRotation, StreamError> {
            Err(StreamError::Discovery("not under test".to_string()))
        }

        async fn authorize(&self) -> Result<(), StreamError> {
            let attempt = self.attempts.fetch_add(1, Ordering::Relaxed);
            if self.fail_first && attempt == 0 {
                Err(StreamError::Authentication("credential rejected".to_string()))
            } else {
                Ok(())
            }
        }

        async fn http_request(
            &self,
            _method: Method,
            _url: &str,
            _body: Option<Value>,
        ) -> Result<Value, StreamError> {
            Ok(Value::Null)
        }

        fn shutdown(&self) {}
    }

    fn session_with(backend: Arc<ScriptedBackend>) -> Session {
        Session::from_parts(
            Arc::new(SessionConfig::new("app-key", "https://api.example.com")),
            backend,
            Arc::new(EventSink::new()),
            Arc::new(ChannelRegistry::new()),
        )
    }

    #[rstest]
    fn test_platform_requires_grant_or_host() {
        let result = Session::platform(
            SessionConfig::new("app-key", "https://api.example.com"),
            None,
            None,
        );
        assert!(matches!(result, Err(StreamError::Authentication(_))));
    }

    #[rstest]
    fn test_variant_classification() {
        let config = || SessionConfig::new("app-key", "https://api.example.com");
        let grant = || Grant::password("user", "pass");

        let platform = Session::platform(config(), Some(grant()), None).unwrap();
        assert_eq!(platform.variant(), "platform");

        let fixed = Session::fixed_host(config(), "ads1:15000").unwrap();
        assert_eq!(fixed.variant(), "fixed-host");

        let hybrid = Session::hybrid(config(), grant(), "ads1:15000").unwrap();
        assert_eq!(hybrid.variant(), "hybrid");
    }

    #[tokio::test]
    async fn test_open_transitions_through_pending() {
        let backend = Arc::new(ScriptedBackend {
            attempts: AtomicUsize::new(0),
            fail_first: false,
        });
        let session = session_with(backend);

        let transitions = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&transitions);
        session.events.set_on_state(Arc::new(move |state, _msg| {
            seen.lock().unwrap().push(state);
        }));

        assert_eq!(session.state(), SessionState::Closed);
        let state = session.open().await.unwrap();
        assert_eq!(state, SessionState::Open);

        let transitions = transitions.lock().unwrap().clone();
        assert_eq!(transitions, vec![SessionState::Pending, SessionState::Open]);
    }

    #[tokio::test]
    async fn test_open_is_idempotent() {
        let backend = Arc::new(ScriptedBackend {
            attempts: AtomicUsize::new(0),
            fail_first: false,
        });
        let session = session_with(Arc::clone(&backend));

        session.open().await.unwrap();
        session.open().await.unwrap();

        assert_eq!(backend.attempts.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_fatal_first_auth_closes_without_retry() {
        let backend = Arc::new(ScriptedBackend {
            attempts: AtomicUsize::new(0),
            fail_first: true,
        });
        let session = session_with(Arc::clone(&backend));

        let result = session.open().await;
        assert!(matches!(result, Err(StreamError::Authentication(_))));
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(backend.attempts.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let backend = Arc::new(ScriptedBackend {
            attempts: AtomicUsize::new(0),
            fail_first: false,
        });
        let session = session_with(backend);

        session.open().await.unwrap();
        assert_eq!(session.close().await, SessionState::Closed);
        assert_eq!(session.close().await, SessionState::Closed);
    }

    #[tokio::test]
    async fn test_channel_request_on_closed_session_fails() {
        let backend = Arc::new(ScriptedBackend {
            attempts: AtomicUsize::new(0),
            fail_first: false,
        });
        let session = session_with(backend);

        let result = session
            .open_channel("streaming/pricing/main", Protocol::MarketData)
            .await;
        assert!(matches!(result, Err(StreamError::NotConnected(_))));
    }

    #[tokio::test]
    async fn test_send_on_unknown_channel_fails() {
        let backend = Arc::new(ScriptedBackend {
            attempts: AtomicUsize::new(0),
            fail_first: false,
        });
        let session = session_with(backend);
        session.open().await.unwrap();

        let result = session.send("streaming/pricing/main", Value::Null);
        assert!(matches!(result, Err(StreamError::NotConnected(_))));
    }
}
