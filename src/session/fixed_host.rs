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

//! Fixed-host session variant: the operator supplies the endpoint directly.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Method;
use serde_json::{json, Value};
use ustr::Ustr;

use crate::{
    common::{
        consts::DEFAULT_WS_PATH,
        enums::Protocol,
        urls::parse_endpoint_override,
    },
    config::SessionConfig,
    discovery::EndpointRotation,
    error::StreamError,
    session::backend::SessionBackend,
    websocket::messages::market_data_login,
};

/// Session variant connecting straight to an operator-supplied host.
///
/// Discovery is bypassed, there is no credential lifecycle, and logins carry
/// the username/application-id/position triple. Only the market-data protocol
/// is served.
#[derive(Debug)]
pub struct FixedHostBackend {
    config: Arc<SessionConfig>,
    host: String,
}

impl FixedHostBackend {
    /// Creates a new [`FixedHostBackend`] for `host` (`host`, `host:port`, or
    /// a full `ws://`/`wss://` URL).
    pub fn new(config: Arc<SessionConfig>, host: impl Into<String>) -> Self {
        Self {
            config,
            host: host.into(),
        }
    }
}

#[async_trait]
impl SessionBackend for FixedHostBackend {
    fn name(&self) -> &'static str {
        "fixed-host"
    }

    fn login_request(
        &self,
        _channel: Ustr,
        protocol: Protocol,
        _stream_id: u64,
    ) -> Result<Value, StreamError> {
        match protocol {
            Protocol::MarketData => {
                let identity = &self.config.identity;
                Ok(market_data_login(json!({
                    "Name": identity.username,
                    "Elements": {
                        "ApplicationId": identity.application_id,
                        "Position": identity.position,
                    }
                })))
            }
            Protocol::Rpc => Err(StreamError::ProtocolMismatch {
                requested: Protocol::Rpc.to_string(),
                available: Protocol::MarketData.to_string(),
            }),
        }
    }

    async fn resolve_endpoints(
        &self,
        channel: Ustr,
        protocol: Protocol,
    ) -> Result<EndpointRotation, StreamError> {
        if protocol != Protocol::MarketData {
            return Err(StreamError::ProtocolMismatch {
                requested: protocol.to_string(),
                available: Protocol::MarketData.to_string(),
            });
        }

        let mut endpoint = parse_endpoint_override(&self.host)?;
        if !self.host.contains("://") {
            // A bare host:port names a distribution server inside the LAN
            endpoint.scheme = "ws".to_string();
        }
        if endpoint.path.is_empty() {
            let channel_cfg = self.config.channel(channel.as_str());
            endpoint.path = channel_cfg
                .default_ws_path
                .unwrap_or_else(|| DEFAULT_WS_PATH.to_string());
        }
        endpoint.data_formats = vec!["json".to_string()];

        EndpointRotation::new(vec![endpoint], self.config.base_reconnect_delay)
    }

    async fn authorize(&self) -> Result<(), StreamError> {
        // Stream logins carry the credentials; there is nothing to acquire
        Ok(())
    }

    async fn http_request(
        &self,
        _method: Method,
        url: &str,
        _body: Option<Value>,
    ) -> Result<Value, StreamError> {
        Err(StreamError::Authentication(format!(
            "a fixed-host session has no platform HTTP access (requested {url}); \
             configure a grant to enable platform requests"
        )))
    }

    fn shutdown(&self) {}
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn backend(host: &str) -> FixedHostBackend {
        FixedHostBackend::new(Arc::new(SessionConfig::new("app-key", "")), host)
    }

    #[tokio::test]
    async fn test_resolve_bare_host_defaults() {
        let backend = backend("ads1.example.com:15000");
        let rotation = backend
            .resolve_endpoints(Ustr::from("streaming/pricing/main"), Protocol::MarketData)
            .await
            .unwrap();

        assert_eq!(rotation.len(), 1);
        assert_eq!(
            rotation.current().ws_url(),
            "ws://ads1.example.com:15000/WebSocket"
        );
    }

    #[tokio::test]
    async fn test_resolve_rejects_rpc() {
        let backend = backend("ads1.example.com:15000");
        let result = backend
            .resolve_endpoints(Ustr::from("streaming/pricing/main"), Protocol::Rpc)
            .await;
        assert!(matches!(result, Err(StreamError::ProtocolMismatch { .. })));
    }

    #[rstest]
    fn test_login_carries_username_triple() {
        let backend = backend("ads1.example.com");
        let login = backend
            .login_request(Ustr::from("streaming/pricing/main"), Protocol::MarketData, 1)
            .unwrap();

        assert_eq!(login["Domain"], "Login");
        assert_eq!(login["Key"]["Name"], "user");
        assert_eq!(login["Key"]["Elements"]["ApplicationId"], "256");
        assert!(login["Key"]["Elements"].get("AuthenticationToken").is_none());
    }

    #[tokio::test]
    async fn test_http_access_denied() {
        let backend = backend("ads1.example.com");
        let result = backend
            .http_request(Method::GET, "https://api.example.com/data", None)
            .await;
        assert!(matches!(result, Err(StreamError::Authentication(_))));
    }
}
