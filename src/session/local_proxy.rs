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

//! Local-proxy session variant: handshake with a desktop process.

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use reqwest::Method;
use serde_json::{json, Value};
use ustr::Ustr;

use crate::{
    common::{
        consts::SDK_LIBRARY_NAME,
        credential::AccessToken,
        enums::{EventCode, Protocol},
        urls::join_url,
    },
    config::SessionConfig,
    discovery::{DiscoveryClient, EndpointRotation},
    error::StreamError,
    http::HttpClient,
    session::{
        backend::{resolve_with_discovery, SessionBackend},
        EventSink,
    },
    websocket::messages::market_data_login,
};

/// Session variant talking to a local desktop proxy process.
///
/// Authorization is a single handshake POST that yields the bearer token;
/// endpoint discovery goes through the proxy's own discovery paths.
pub struct LocalProxyBackend {
    config: Arc<SessionConfig>,
    http: HttpClient,
    discovery: DiscoveryClient,
    token: Arc<ArcSwapOption<AccessToken>>,
    events: Arc<EventSink>,
}

impl std::fmt::Debug for LocalProxyBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalProxyBackend")
            .field("base_url", &self.config.base_url)
            .field("has_token", &self.token.load().is_some())
            .finish_non_exhaustive()
    }
}

impl LocalProxyBackend {
    /// Creates a new [`LocalProxyBackend`].
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP helper cannot be constructed.
    pub fn new(config: Arc<SessionConfig>, events: Arc<EventSink>) -> Result<Self, StreamError> {
        let http = HttpClient::new(config.app_key.clone(), config.http_timeout)?;
        let discovery = DiscoveryClient::new(http.clone());

        Ok(Self {
            config,
            http,
            discovery,
            token: Arc::new(ArcSwapOption::empty()),
            events,
        })
    }

    fn current_token(&self) -> Result<String, StreamError> {
        self.token
            .load()
            .as_ref()
            .map(|t| t.token.clone())
            .ok_or_else(|| {
                StreamError::NotConnected(
                    "the local proxy handshake has not completed".to_string(),
                )
            })
    }
}

#[async_trait]
impl SessionBackend for LocalProxyBackend {
    fn name(&self) -> &'static str {
        "local-proxy"
    }

    fn login_request(
        &self,
        _channel: Ustr,
        protocol: Protocol,
        stream_id: u64,
    ) -> Result<Value, StreamError> {
        let token = self.current_token()?;
        let identity = &self.config.identity;

        let request = match protocol {
            Protocol::MarketData => market_data_login(json!({
                "Elements": {
                    "AppKey": self.config.app_key,
                    "ApplicationId": identity.application_id,
                    "Position": identity.position,
                    "Authorization": format!("Bearer {token}"),
                }
            })),
            Protocol::Rpc => json!({
                "streamID": stream_id.to_string(),
                "method": "Auth",
                "appKey": self.config.app_key,
                "authorization": format!("Bearer {token}"),
            }),
        };

        Ok(request)
    }

    async fn resolve_endpoints(
        &self,
        channel: Ustr,
        protocol: Protocol,
    ) -> Result<EndpointRotation, StreamError> {
        let token = self.token.load().as_ref().map(|t| t.token.clone());
        resolve_with_discovery(&self.config, channel, protocol, &self.discovery, token.as_deref())
            .await
    }

    async fn authorize(&self) -> Result<(), StreamError> {
        let url = join_url(&self.config.base_url, &self.config.handshake_path);
        tracing::info!("Handshaking with local proxy at {url}");

        let body = json!({
            "AppKey": self.config.app_key,
            "AppScope": "trapi",
            "ApiVersion": "1",
            "LibraryName": SDK_LIBRARY_NAME,
            "LibraryVersion": env!("CARGO_PKG_VERSION"),
        });

        let response = match self.http.post_json(&url, &body, None).await {
            Ok(response) => response,
            Err(e @ StreamError::Http { status: 400, .. }) => {
                let msg = format!("application key rejected by the local proxy: {e}");
                self.events.event(EventCode::SessionAuthenticationFailed, &msg);
                return Err(StreamError::Authentication(msg));
            }
            Err(StreamError::Transport(e)) | Err(StreamError::Timeout(e)) => {
                let msg = format!("local proxy is not reachable: {e}");
                self.events.event(EventCode::SessionAuthenticationFailed, &msg);
                return Err(StreamError::NotConnected(msg));
            }
            Err(e) => {
                self.events
                    .event(EventCode::SessionAuthenticationFailed, &e.to_string());
                return Err(e);
            }
        };

        let Some(access_token) = response.get("access_token").and_then(Value::as_str) else {
            let msg = "handshake response carried no access token".to_string();
            self.events.event(EventCode::SessionAuthenticationFailed, &msg);
            return Err(StreamError::Authentication(msg));
        };

        let expires_in = response
            .get("expires_in")
            .and_then(Value::as_f64)
            .unwrap_or(0.0);

        self.token.store(Some(Arc::new(AccessToken::new(
            access_token.to_string(),
            None,
            "trapi".to_string(),
            "Bearer".to_string(),
            expires_in,
        ))));

        self.events.event(
            EventCode::SessionAuthenticationSuccess,
            "Local proxy handshake completed",
        );
        Ok(())
    }

    async fn http_request(
        &self,
        method: Method,
        url: &str,
        body: Option<Value>,
    ) -> Result<Value, StreamError> {
        let token = self.token.load().as_ref().map(|t| t.token.clone());
        if method == Method::GET {
            self.http.get_json(url, token.as_deref()).await
        } else if method == Method::POST {
            let body = body.unwrap_or(Value::Null);
            self.http.post_json(url, &body, token.as_deref()).await
        } else {
            Err(StreamError::Send(format!(
                "unsupported HTTP method for local proxy request: {method}"
            )))
        }
    }

    fn shutdown(&self) {}
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn backend() -> LocalProxyBackend {
        LocalProxyBackend::new(
            Arc::new(SessionConfig::new("app-key", "http://127.0.0.1:9060")),
            Arc::new(EventSink::new()),
        )
        .unwrap()
    }

    fn backend_with_token() -> LocalProxyBackend {
        let backend = backend();
        backend.token.store(Some(Arc::new(AccessToken::new(
            "tok".to_string(),
            None,
            "trapi".to_string(),
            "Bearer".to_string(),
            600.0,
        ))));
        backend
    }

    #[rstest]
    fn test_market_data_login_carries_app_key_and_bearer() {
        let login = backend_with_token()
            .login_request(Ustr::from("streaming/pricing/main"), Protocol::MarketData, 1)
            .unwrap();

        assert_eq!(login["Domain"], "Login");
        assert_eq!(login["Key"]["Elements"]["AppKey"], "app-key");
        assert_eq!(login["Key"]["Elements"]["Authorization"], "Bearer tok");
        assert!(login["Key"].get("NameType").is_none());
    }

    #[rstest]
    fn test_rpc_login_carries_app_key_and_bearer() {
        let login = backend_with_token()
            .login_request(Ustr::from("streaming/trading/main"), Protocol::Rpc, 3)
            .unwrap();

        assert_eq!(
            login,
            json!({
                "streamID": "3",
                "method": "Auth",
                "appKey": "app-key",
                "authorization": "Bearer tok",
            })
        );
    }

    #[rstest]
    fn test_login_before_handshake_fails() {
        let result =
            backend().login_request(Ustr::from("streaming/pricing/main"), Protocol::MarketData, 1);
        assert!(matches!(result, Err(StreamError::NotConnected(_))));
    }
}
