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

//! The capability trait implemented by every session variant.

use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;
use ustr::Ustr;

use crate::{
    common::{enums::Protocol, urls::{join_url, parse_endpoint_override}},
    config::SessionConfig,
    discovery::{DiscoveryClient, EndpointRotation},
    error::StreamError,
};

/// Capability set a session variant provides to the façade and to stream
/// connections: login construction, endpoint resolution, authorization, and
/// one-shot HTTP access.
///
/// Variants hold no shared mutable base state; the hybrid variant composes two
/// others by delegation.
#[async_trait]
pub trait SessionBackend: Send + Sync {
    /// Returns the variant name for logging.
    fn name(&self) -> &'static str;

    /// Builds the protocol-specific login (or auth-refresh) request for a
    /// connection serving `channel`.
    ///
    /// # Errors
    ///
    /// Returns an error when the variant cannot produce a login for the
    /// protocol, or no credential is available yet.
    fn login_request(
        &self,
        channel: Ustr,
        protocol: Protocol,
        stream_id: u64,
    ) -> Result<Value, StreamError>;

    /// Resolves `channel` to its failover-ordered endpoint candidates.
    ///
    /// # Errors
    ///
    /// Returns a discovery or protocol-mismatch error when no usable candidate
    /// exists.
    async fn resolve_endpoints(
        &self,
        channel: Ustr,
        protocol: Protocol,
    ) -> Result<EndpointRotation, StreamError>;

    /// Acquires the credentials this variant needs; resolves once the session
    /// may transition to open.
    ///
    /// # Errors
    ///
    /// Returns a terminal authentication error when acquisition fails fatally.
    async fn authorize(&self) -> Result<(), StreamError>;

    /// Performs a one-shot REST request through this variant's access path.
    ///
    /// # Errors
    ///
    /// Returns an error when the variant has no HTTP access or the request
    /// fails.
    async fn http_request(
        &self,
        method: Method,
        url: &str,
        body: Option<Value>,
    ) -> Result<Value, StreamError>;

    /// Releases background resources on session close.
    fn shutdown(&self);
}

/// Resolves a channel using its configuration: a literal endpoint override
/// wins, otherwise the discovery path is requested.
pub(crate) async fn resolve_with_discovery(
    config: &SessionConfig,
    channel: Ustr,
    protocol: Protocol,
    discovery: &DiscoveryClient,
    bearer: Option<&str>,
) -> Result<EndpointRotation, StreamError> {
    let channel_cfg = config.channel(channel.as_str());

    if !channel_cfg.protocols.contains(&protocol) {
        let available: Vec<String> =
            channel_cfg.protocols.iter().map(ToString::to_string).collect();
        return Err(StreamError::ProtocolMismatch {
            requested: protocol.to_string(),
            available: available.join(", "),
        });
    }

    if let Some(override_url) = &channel_cfg.endpoint_override {
        tracing::debug!("Channel {channel} using endpoint override {override_url}");
        let mut endpoint = parse_endpoint_override(override_url)?;
        if endpoint.path.is_empty() {
            endpoint.path = channel_cfg.default_ws_path.clone().unwrap_or_default();
        }
        return EndpointRotation::new(vec![endpoint], config.base_reconnect_delay);
    }

    let Some(path) = &channel_cfg.discovery_path else {
        return Err(StreamError::Discovery(format!(
            "channel {channel} has neither a discovery path nor an endpoint override configured"
        )));
    };

    let url = join_url(&config.base_url, path);
    let endpoints = discovery
        .resolve(&url, protocol, bearer, channel_cfg.default_ws_path.as_deref())
        .await?;

    EndpointRotation::new(endpoints, config.base_reconnect_delay)
}
