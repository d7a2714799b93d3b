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

//! Session configuration structures.

use std::{collections::HashMap, time::Duration};

use crate::common::{
    consts::{
        DEFAULT_APPLICATION_ID, DEFAULT_BASE_RECONNECT_DELAY_MS, DEFAULT_CLOSE_TIMEOUT_SECS,
        DEFAULT_HANDSHAKE_PATH, DEFAULT_HANDSHAKE_TIMEOUT_SECS, DEFAULT_HTTP_TIMEOUT_SECS,
        DEFAULT_POSITION, DEFAULT_TOKEN_PATH, DEFAULT_TOKEN_RETRY_DELAY_SECS, DEFAULT_USERNAME,
    },
    enums::Protocol,
};

/// Client identity carried in stream login messages.
#[derive(Clone, Debug)]
pub struct ClientIdentity {
    /// Application id reported on logins.
    pub application_id: String,
    /// Client position (`ip/host`) reported on logins.
    pub position: String,
    /// Username for fixed-host logins.
    pub username: String,
}

impl Default for ClientIdentity {
    fn default() -> Self {
        Self {
            application_id: DEFAULT_APPLICATION_ID.to_string(),
            position: DEFAULT_POSITION.to_string(),
            username: DEFAULT_USERNAME.to_string(),
        }
    }
}

/// Per-channel streaming configuration.
#[derive(Clone, Debug)]
pub struct ChannelConfig {
    /// Discovery request path, joined onto the session base URL.
    pub discovery_path: Option<String>,
    /// Literal endpoint override; when set, discovery is skipped entirely.
    pub endpoint_override: Option<String>,
    /// Protocols the channel supports, in preference order.
    pub protocols: Vec<Protocol>,
    /// WebSocket path applied when discovery (or an override) omits one.
    pub default_ws_path: Option<String>,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            discovery_path: None,
            endpoint_override: None,
            protocols: vec![Protocol::MarketData, Protocol::Rpc],
            default_ws_path: None,
        }
    }
}

/// Static configuration for a [`Session`](crate::session::Session).
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Application key identifying the client.
    pub app_key: String,
    /// Base URL for platform REST access (discovery, token endpoint).
    pub base_url: String,
    /// Token endpoint path on the base URL.
    pub token_path: String,
    /// Handshake endpoint path on the local proxy base URL.
    pub handshake_path: String,
    /// Client identity for stream logins.
    pub identity: ClientIdentity,
    /// Resilient (server) mode: transient credential failures retry
    /// indefinitely instead of failing fast.
    pub resilient: bool,
    /// Whether token requests take exclusive sign-on control.
    pub take_signon_control: bool,
    /// Timeout for one-shot HTTP requests.
    pub http_timeout: Duration,
    /// Timeout for transport handshake plus login acknowledgement.
    pub handshake_timeout: Duration,
    /// Bounded drain timeout applied when closing connections.
    pub close_timeout: Duration,
    /// Delay between credential retries in resilient mode.
    pub token_retry_delay: Duration,
    /// Base unit for per-candidate reconnect delays.
    pub base_reconnect_delay: Duration,
    /// Maximum reconnect attempts per connection; `None` is unbounded.
    pub max_reconnect_attempts: Option<u32>,
    /// Per-channel configuration, keyed by channel name.
    pub channels: HashMap<String, ChannelConfig>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            app_key: String::new(),
            base_url: String::new(),
            token_path: DEFAULT_TOKEN_PATH.to_string(),
            handshake_path: DEFAULT_HANDSHAKE_PATH.to_string(),
            identity: ClientIdentity::default(),
            resilient: false,
            take_signon_control: true,
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
            handshake_timeout: Duration::from_secs(DEFAULT_HANDSHAKE_TIMEOUT_SECS),
            close_timeout: Duration::from_secs(DEFAULT_CLOSE_TIMEOUT_SECS),
            token_retry_delay: Duration::from_secs(DEFAULT_TOKEN_RETRY_DELAY_SECS),
            base_reconnect_delay: Duration::from_millis(DEFAULT_BASE_RECONNECT_DELAY_MS),
            max_reconnect_attempts: None,
            channels: HashMap::new(),
        }
    }
}

impl SessionConfig {
    /// Creates a configuration with the given application key and base URL.
    #[must_use]
    pub fn new(app_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            app_key: app_key.into(),
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    /// Sets the configuration for a named channel.
    #[must_use]
    pub fn with_channel(mut self, name: impl Into<String>, config: ChannelConfig) -> Self {
        self.channels.insert(name.into(), config);
        self
    }

    /// Returns the configuration for a channel, defaulted when absent.
    #[must_use]
    pub fn channel(&self, name: &str) -> ChannelConfig {
        self.channels.get(name).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    fn test_channel_lookup_defaults() {
        let config = SessionConfig::new("app-key", "https://api.example.com");
        let channel = config.channel("streaming/pricing/main");
        assert!(channel.discovery_path.is_none());
        assert_eq!(channel.protocols, vec![Protocol::MarketData, Protocol::Rpc]);
    }

    #[rstest]
    fn test_with_channel_overrides() {
        let config = SessionConfig::new("app-key", "https://api.example.com").with_channel(
            "streaming/pricing/main",
            ChannelConfig {
                discovery_path: Some("/streaming/pricing/v1".to_string()),
                protocols: vec![Protocol::MarketData],
                ..Default::default()
            },
        );

        let channel = config.channel("streaming/pricing/main");
        assert_eq!(channel.discovery_path.as_deref(), Some("/streaming/pricing/v1"));
        assert_eq!(channel.protocols, vec![Protocol::MarketData]);
    }
}
