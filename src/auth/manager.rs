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

//! Background access-token lifecycle management.
//!
//! The [`TokenManager`] owns the current token independent of any single
//! connection: it requests the initial token, refreshes it at half-lifetime,
//! and pushes every new token to all live stream connections through the
//! channel registry so a rotation is never missed or double-delivered.

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use arc_swap::ArcSwapOption;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::{
    auth::models::TokenResponse,
    common::{
        consts::DEFAULT_REFRESH_RETRY_DELAY_SECS,
        credential::{AccessToken, Grant},
        enums::EventCode,
    },
    config::SessionConfig,
    error::{should_retry, StreamError},
    http::HttpClient,
    session::{registry::ChannelRegistry, EventSink},
};

/// Readiness of the credential lifecycle.
#[derive(Clone, Debug)]
pub enum AuthReadiness {
    /// No token acquired yet.
    Pending,
    /// A token is current and published.
    Ready,
    /// Token acquisition failed terminally.
    Failed(String),
    /// The manager was stopped before a token was acquired.
    Stopped,
}

/// Owns the access-token lifecycle for a session.
pub struct TokenManager {
    token_url: String,
    app_key: String,
    grant: Grant,
    resilient: bool,
    take_signon_control: bool,
    token_retry_delay: Duration,
    refresh_retry_delay: Duration,
    http: HttpClient,
    token: Arc<ArcSwapOption<AccessToken>>,
    ready_tx: watch::Sender<AuthReadiness>,
    cancel: CancellationToken,
    task: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl std::fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenManager")
            .field("token_url", &self.token_url)
            .field("grant", &self.grant)
            .field("resilient", &self.resilient)
            .field("has_token", &self.token.load().is_some())
            .finish_non_exhaustive()
    }
}

impl TokenManager {
    /// Creates a new [`TokenManager`] for the given grant.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP helper cannot be constructed.
    pub fn new(
        config: &SessionConfig,
        token_url: String,
        grant: Grant,
    ) -> Result<Self, StreamError> {
        let http = HttpClient::new(config.app_key.clone(), config.http_timeout)?;
        let (ready_tx, _ready_rx) = watch::channel(AuthReadiness::Pending);

        if config.resilient && !grant.is_password() {
            tracing::warn!(
                "Resilient mode has no effect: the grant is not a password grant, so re-authorization is impossible"
            );
        }

        Ok(Self {
            token_url,
            app_key: config.app_key.clone(),
            grant,
            resilient: config.resilient,
            take_signon_control: config.take_signon_control,
            token_retry_delay: config.token_retry_delay,
            refresh_retry_delay: Duration::from_secs(DEFAULT_REFRESH_RETRY_DELAY_SECS),
            http,
            token: Arc::new(ArcSwapOption::empty()),
            ready_tx,
            cancel: CancellationToken::new(),
            task: Mutex::new(None),
        })
    }

    /// Returns the shared cell holding the current token.
    #[must_use]
    pub fn token_cell(&self) -> Arc<ArcSwapOption<AccessToken>> {
        Arc::clone(&self.token)
    }

    /// Returns the current bearer token, when one is published.
    #[must_use]
    pub fn current_token(&self) -> Option<String> {
        self.token.load().as_ref().map(|t| t.token.clone())
    }

    /// Starts the background worker.
    ///
    /// Idempotent: a second call while the worker is alive is a no-op.
    pub fn start(&self, channels: Arc<ChannelRegistry>, events: Arc<EventSink>) {
        let mut guard = self.task.lock().expect("token manager task lock poisoned");
        if guard.as_ref().is_some_and(|t| !t.is_finished()) {
            return;
        }

        let worker = TokenWorker {
            token_url: self.token_url.clone(),
            app_key: self.app_key.clone(),
            grant: self.grant.clone(),
            resilient: self.resilient,
            take_signon_control: self.take_signon_control,
            token_retry_delay: self.token_retry_delay,
            refresh_retry_delay: self.refresh_retry_delay,
            http: self.http.clone(),
            token: Arc::clone(&self.token),
            ready_tx: self.ready_tx.clone(),
            cancel: self.cancel.clone(),
            channels,
            events,
        };

        *guard = Some(tokio::spawn(worker.run()));
    }

    /// Waits until the first token is published or acquisition fails terminally.
    ///
    /// # Errors
    ///
    /// Returns the terminal authentication error when acquisition failed.
    pub async fn wait_ready(&self) -> Result<(), StreamError> {
        let mut rx = self.ready_tx.subscribe();
        loop {
            let state = rx.borrow().clone();
            match state {
                AuthReadiness::Ready => return Ok(()),
                AuthReadiness::Failed(msg) => return Err(StreamError::Authentication(msg)),
                AuthReadiness::Stopped => {
                    return Err(StreamError::Closed("token manager stopped".to_string()))
                }
                AuthReadiness::Pending => {}
            }

            if rx.changed().await.is_err() {
                return Err(StreamError::Closed("token manager stopped".to_string()));
            }
        }
    }

    /// Stops the background worker.
    ///
    /// A readiness future still pending resolves with a cancellation error
    /// rather than being left unresolved.
    pub fn stop(&self) {
        self.cancel.cancel();
        self.ready_tx.send_if_modified(|state| {
            if matches!(state, AuthReadiness::Pending) {
                *state = AuthReadiness::Stopped;
                true
            } else {
                false
            }
        });
        if let Some(task) = self.task.lock().expect("token manager task lock poisoned").take() {
            task.abort();
        }
    }
}

impl Drop for TokenManager {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct TokenWorker {
    token_url: String,
    app_key: String,
    grant: Grant,
    resilient: bool,
    take_signon_control: bool,
    token_retry_delay: Duration,
    refresh_retry_delay: Duration,
    http: HttpClient,
    token: Arc<ArcSwapOption<AccessToken>>,
    ready_tx: watch::Sender<AuthReadiness>,
    cancel: CancellationToken,
    channels: Arc<ChannelRegistry>,
    events: Arc<EventSink>,
}

impl TokenWorker {
    async fn run(self) {
        if !self.acquire_first().await {
            return;
        }

        self.refresh_cycle().await;
    }

    /// Requests the first token. Returns `false` when acquisition terminated.
    async fn acquire_first(&self) -> bool {
        loop {
            match self.request_with_grant().await {
                Ok(token) => {
                    self.publish(token);
                    self.events.event(
                        EventCode::SessionAuthenticationSuccess,
                        "Successfully authorized to the token endpoint",
                    );
                    self.ready_tx.send_replace(AuthReadiness::Ready);
                    return true;
                }
                Err(e) if e.is_credential_rejection() => {
                    // A credential-shaped first failure is operator
                    // misconfiguration: fatal in both modes.
                    let msg = format!("credential rejected on first authorization: {e}");
                    tracing::error!("{msg}");
                    self.events.event(EventCode::SessionAuthenticationFailed, &msg);
                    self.ready_tx.send_replace(AuthReadiness::Failed(msg));
                    return false;
                }
                Err(e) if !self.resilient => {
                    let msg = format!("failed to request an access token: {e}");
                    tracing::error!("{msg}");
                    self.events.event(EventCode::SessionAuthenticationFailed, &msg);
                    self.ready_tx.send_replace(AuthReadiness::Failed(msg));
                    return false;
                }
                Err(e) => {
                    let msg = format!(
                        "retrying credential request in {:?} after failure: {e}",
                        self.token_retry_delay
                    );
                    tracing::warn!("{msg}");
                    self.events.event(EventCode::SessionReconnecting, &msg);
                    if !self.sleep_or_cancel(self.token_retry_delay).await {
                        self.ready_tx.send_replace(AuthReadiness::Stopped);
                        return false;
                    }
                }
            }
        }
    }

    /// Refreshes the token at half-lifetime until stopped.
    async fn refresh_cycle(&self) {
        'lifetime: loop {
            let delay = self
                .token
                .load()
                .as_ref()
                .map(|t| t.refresh_delay())
                .unwrap_or(self.refresh_retry_delay);

            tracing::debug!("Next token refresh in {delay:?}");
            if !self.sleep_or_cancel(delay).await {
                return;
            }

            loop {
                let refresh_token = self
                    .token
                    .load()
                    .as_ref()
                    .and_then(|t| t.refresh_token.clone());

                let result = match &refresh_token {
                    Some(rt) => self.request_refresh(rt).await,
                    // No refresh token was issued; re-request with the grant
                    None => self.request_with_grant().await,
                };

                match result {
                    Ok(token) => {
                        tracing::info!("Successfully refreshed the access token");
                        self.publish(token);
                        continue 'lifetime;
                    }
                    Err(e) if should_retry(&e) => {
                        tracing::warn!(
                            "Token refresh failed, retrying in {:?}: {e}",
                            self.refresh_retry_delay
                        );
                        if !self.sleep_or_cancel(self.refresh_retry_delay).await {
                            return;
                        }
                    }
                    Err(e) => {
                        if self.resilient && self.grant.is_password() {
                            // The refresh grant was rejected; fall back to a
                            // fresh password authorization and keep trying.
                            let msg = format!("token refresh rejected, re-authorizing: {e}");
                            tracing::warn!("{msg}");
                            self.events.event(EventCode::SessionReconnecting, &msg);
                            if !self.sleep_or_cancel(self.token_retry_delay).await {
                                return;
                            }

                            match self.request_with_grant().await {
                                Ok(token) => {
                                    self.events.event(
                                        EventCode::SessionAuthenticationSuccess,
                                        "Successfully re-authorized to the token endpoint",
                                    );
                                    self.publish(token);
                                    continue 'lifetime;
                                }
                                Err(e2) => {
                                    let msg = format!("re-authorization failed: {e2}");
                                    tracing::error!("{msg}");
                                    self.events
                                        .event(EventCode::SessionAuthenticationFailed, &msg);
                                    // Resilient mode keeps requesting
                                }
                            }
                        } else {
                            let msg = format!(
                                "token refresh rejected and resilient mode is disabled: {e}"
                            );
                            tracing::error!("{msg}");
                            self.events.event(EventCode::SessionAuthenticationFailed, &msg);
                            return;
                        }
                    }
                }
            }
        }
    }

    /// Stores the token as current and fans it out to live connections.
    ///
    /// The fan-out iterates the channel registry under its lock so connection
    /// creation/removal cannot interleave with a rotation.
    fn publish(&self, token: AccessToken) {
        self.token.store(Some(Arc::new(token.clone())));
        self.channels.rotate_token(&token);
    }

    async fn request_with_grant(&self) -> Result<AccessToken, StreamError> {
        match &self.grant {
            Grant::Password {
                username,
                password,
                scope,
            } => {
                let signon = if self.take_signon_control { "true" } else { "false" };
                let form = [
                    ("grant_type", "password"),
                    ("client_id", self.app_key.as_str()),
                    ("username", username.as_str()),
                    ("password", password.as_str()),
                    ("scope", scope.as_str()),
                    ("takeExclusiveSignOnControl", signon),
                ];
                self.request_token(&form).await
            }
            Grant::RefreshToken { refresh_token, .. } => self.request_refresh(refresh_token).await,
        }
    }

    async fn request_refresh(&self, refresh_token: &str) -> Result<AccessToken, StreamError> {
        let form = [
            ("grant_type", "refresh_token"),
            ("client_id", self.app_key.as_str()),
            ("username", self.grant.username()),
            ("refresh_token", refresh_token),
        ];
        self.request_token(&form).await
    }

    async fn request_token(&self, form: &[(&str, &str)]) -> Result<AccessToken, StreamError> {
        tracing::debug!("Requesting access token from {}", self.token_url);
        let body = self.http.post_form(&self.token_url, form).await?;
        let response = TokenResponse::parse(&body)?;
        Ok(response.into_access_token())
    }

    /// Sleeps for `delay`, returning `false` when cancelled.
    async fn sleep_or_cancel(&self, delay: Duration) -> bool {
        tokio::select! {
            () = tokio::time::sleep(delay) => true,
            () = self.cancel.cancelled() => false,
        }
    }
}
