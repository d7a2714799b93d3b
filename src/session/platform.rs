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

//! Platform session variant: cloud discovery plus bearer-token credentials.

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use reqwest::Method;
use serde_json::{json, Value};
use ustr::Ustr;

use crate::{
    auth::TokenManager,
    common::{
        credential::{AccessToken, Grant},
        enums::Protocol,
        urls::join_url,
    },
    config::SessionConfig,
    discovery::{DiscoveryClient, EndpointRotation},
    error::StreamError,
    http::HttpClient,
    session::{
        backend::{resolve_with_discovery, SessionBackend},
        registry::ChannelRegistry,
        EventSink,
    },
    websocket::messages::market_data_login,
};

/// Session variant talking to the cloud platform: endpoint discovery over
/// REST, OAuth2-style bearer credentials managed by a [`TokenManager`].
pub struct PlatformBackend {
    config: Arc<SessionConfig>,
    http: HttpClient,
    discovery: DiscoveryClient,
    manager: TokenManager,
    token: Arc<ArcSwapOption<AccessToken>>,
    channels: Arc<ChannelRegistry>,
    events: Arc<EventSink>,
}

impl std::fmt::Debug for PlatformBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlatformBackend")
            .field("base_url", &self.config.base_url)
            .field("has_token", &self.token.load().is_some())
            .finish_non_exhaustive()
    }
}

impl PlatformBackend {
    /// Creates a new [`PlatformBackend`] for the given grant.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP helper cannot be constructed.
    pub fn new(
        config: Arc<SessionConfig>,
        grant: Grant,
        channels: Arc<ChannelRegistry>,
        events: Arc<EventSink>,
    ) -> Result<Self, StreamError> {
        let token_url = join_url(&config.base_url, &config.token_path);
        let manager = TokenManager::new(&config, token_url, grant)?;
        let token = manager.token_cell();
        let http = HttpClient::new(config.app_key.clone(), config.http_timeout)?;
        let discovery = DiscoveryClient::new(http.clone());

        Ok(Self {
            config,
            http,
            discovery,
            manager,
            token,
            channels,
            events,
        })
    }

    fn current_token(&self) -> Result<String, StreamError> {
        self.token
            .load()
            .as_ref()
            .map(|t| t.token.clone())
            .ok_or_else(|| {
                StreamError::NotConnected("no access token has been published yet".to_string())
            })
    }
}

#[async_trait]
impl SessionBackend for PlatformBackend {
    fn name(&self) -> &'static str {
        "platform"
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
                "NameType": "AuthnToken",
                "Elements": {
                    "AuthenticationToken": token,
                    "ApplicationId": identity.application_id,
                    "Position": identity.position,
                }
            })),
            Protocol::Rpc => json!({
                "streamID": stream_id.to_string(),
                "method": "Auth",
                "token": token,
            }),
        };

        Ok(request)
    }

    async fn resolve_endpoints(
        &self,
        channel: Ustr,
        protocol: Protocol,
    ) -> Result<EndpointRotation, StreamError> {
        let token = self.manager.current_token();
        resolve_with_discovery(&self.config, channel, protocol, &self.discovery, token.as_deref())
            .await
    }

    async fn authorize(&self) -> Result<(), StreamError> {
        self.manager
            .start(Arc::clone(&self.channels), Arc::clone(&self.events));
        self.manager.wait_ready().await
    }

    async fn http_request(
        &self,
        method: Method,
        url: &str,
        body: Option<Value>,
    ) -> Result<Value, StreamError> {
        let token = self.manager.current_token();
        if method == Method::GET {
            self.http.get_json(url, token.as_deref()).await
        } else if method == Method::POST {
            let body = body.unwrap_or(Value::Null);
            self.http.post_json(url, &body, token.as_deref()).await
        } else {
            Err(StreamError::Send(format!(
                "unsupported HTTP method for platform request: {method}"
            )))
        }
    }

    fn shutdown(&self) {
        self.manager.stop();
    }
}
