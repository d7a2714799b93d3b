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

//! Hybrid session variant: per-channel delegation between fixed-host and
//! platform legs.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;
use ustr::Ustr;

use crate::{
    common::{consts::DEFAULT_MARKET_DATA_CHANNEL, credential::Grant, enums::Protocol},
    config::SessionConfig,
    discovery::EndpointRotation,
    error::StreamError,
    session::{
        backend::SessionBackend, fixed_host::FixedHostBackend, platform::PlatformBackend,
        registry::ChannelRegistry, EventSink,
    },
};

/// Session variant composing a fixed-host leg and a platform leg.
///
/// Channels named with the default market-data prefix go to the fixed host;
/// every other channel goes through platform discovery. Composition is by
/// delegation, not inheritance: each leg is a complete variant of its own.
pub struct HybridBackend {
    platform: PlatformBackend,
    fixed: FixedHostBackend,
    market_data_prefix: String,
}

impl std::fmt::Debug for HybridBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HybridBackend")
            .field("market_data_prefix", &self.market_data_prefix)
            .finish_non_exhaustive()
    }
}

impl HybridBackend {
    /// Creates a new [`HybridBackend`] over both legs.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform leg cannot be constructed.
    pub fn new(
        config: Arc<SessionConfig>,
        grant: Grant,
        host: impl Into<String>,
        channels: Arc<ChannelRegistry>,
        events: Arc<EventSink>,
    ) -> Result<Self, StreamError> {
        let platform = PlatformBackend::new(Arc::clone(&config), grant, channels, events)?;
        let fixed = FixedHostBackend::new(config, host);

        Ok(Self {
            platform,
            fixed,
            market_data_prefix: DEFAULT_MARKET_DATA_CHANNEL.to_string(),
        })
    }

    fn leg(&self, channel: Ustr) -> &dyn SessionBackend {
        if channel.as_str().starts_with(&self.market_data_prefix) {
            &self.fixed
        } else {
            &self.platform
        }
    }
}

#[async_trait]
impl SessionBackend for HybridBackend {
    fn name(&self) -> &'static str {
        "hybrid"
    }

    fn login_request(
        &self,
        channel: Ustr,
        protocol: Protocol,
        stream_id: u64,
    ) -> Result<Value, StreamError> {
        self.leg(channel).login_request(channel, protocol, stream_id)
    }

    async fn resolve_endpoints(
        &self,
        channel: Ustr,
        protocol: Protocol,
    ) -> Result<EndpointRotation, StreamError> {
        self.leg(channel).resolve_endpoints(channel, protocol).await
    }

    async fn authorize(&self) -> Result<(), StreamError> {
        self.platform.authorize().await
    }

    async fn http_request(
        &self,
        method: Method,
        url: &str,
        body: Option<Value>,
    ) -> Result<Value, StreamError> {
        self.platform.http_request(method, url, body).await
    }

    fn shutdown(&self) {
        self.platform.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn backend() -> HybridBackend {
        HybridBackend::new(
            Arc::new(SessionConfig::new("app-key", "https://api.example.com")),
            Grant::password("user", "pass"),
            "ads1.example.com:15000",
            Arc::new(ChannelRegistry::new()),
            Arc::new(EventSink::new()),
        )
        .unwrap()
    }

    #[rstest]
    fn test_market_data_channel_routes_to_fixed_leg() {
        let login = backend()
            .login_request(Ustr::from("streaming/pricing/main"), Protocol::MarketData, 1)
            .unwrap();

        // The fixed-host leg logs in with the username triple, no bearer token
        assert_eq!(login["Key"]["Name"], "user");
        assert!(login["Key"]["Elements"].get("AuthenticationToken").is_none());
    }

    #[rstest]
    fn test_other_channels_route_to_platform_leg() {
        // The platform leg has published no token yet, so the routing shows in
        // the error it returns
        let result =
            backend().login_request(Ustr::from("streaming/trading/main"), Protocol::Rpc, 1);
        assert!(matches!(result, Err(StreamError::NotConnected(_))));
    }

    #[tokio::test]
    async fn test_market_data_resolution_bypasses_discovery() {
        let rotation = backend()
            .resolve_endpoints(Ustr::from("streaming/pricing/main"), Protocol::MarketData)
            .await
            .unwrap();

        assert_eq!(rotation.len(), 1);
        assert_eq!(
            rotation.current().ws_url(),
            "ws://ads1.example.com:15000/WebSocket"
        );
    }
}
