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

//! Service discovery client resolving a channel name to candidate endpoints.

use crate::{
    common::enums::Protocol,
    discovery::{
        models::{DiscoveredService, DiscoveryResponse},
        rotation::ServiceEndpoint,
    },
    error::StreamError,
    http::HttpClient,
};

/// Resolves a discovery endpoint into candidate service endpoints.
#[derive(Clone, Debug)]
pub struct DiscoveryClient {
    http: HttpClient,
}

impl DiscoveryClient {
    /// Creates a new [`DiscoveryClient`] over the given HTTP helper.
    #[must_use]
    pub const fn new(http: HttpClient) -> Self {
        Self { http }
    }

    /// Requests the discovery document at `url` and returns the candidates
    /// supporting `protocol`, preserving the server's preference order.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Discovery`] when the response holds no usable
    /// service, and [`StreamError::ProtocolMismatch`] when candidates exist but
    /// none speaks the requested protocol.
    pub async fn resolve(
        &self,
        url: &str,
        protocol: Protocol,
        bearer: Option<&str>,
        default_ws_path: Option<&str>,
    ) -> Result<Vec<ServiceEndpoint>, StreamError> {
        tracing::debug!("Resolving stream endpoints from {url}");

        let body = self.http.get_json(url, bearer).await?;
        let response: DiscoveryResponse = serde_json::from_value(body)
            .map_err(|e| StreamError::Discovery(format!("invalid discovery response: {e}")))?;

        Self::select_endpoints(&response.services, protocol, default_ws_path)
    }

    /// Filters discovered services down to WebSocket candidates speaking
    /// `protocol` and maps them to [`ServiceEndpoint`] records.
    pub(crate) fn select_endpoints(
        services: &[DiscoveredService],
        protocol: Protocol,
        default_ws_path: Option<&str>,
    ) -> Result<Vec<ServiceEndpoint>, StreamError> {
        let websocket: Vec<&DiscoveredService> =
            services.iter().filter(|s| s.is_websocket()).collect();

        if websocket.is_empty() {
            return Err(StreamError::Discovery(
                "discovery returned no WebSocket service location".to_string(),
            ));
        }

        let candidates: Vec<ServiceEndpoint> = websocket
            .iter()
            .filter(|s| s.supports_protocol(protocol.as_ref()))
            .map(|s| ServiceEndpoint {
                scheme: "wss".to_string(),
                host: s.endpoint.clone(),
                port: s.port,
                path: s
                    .path
                    .clone()
                    .or_else(|| default_ws_path.map(str::to_string))
                    .unwrap_or_default(),
                data_formats: s.data_format.clone(),
            })
            .collect();

        if candidates.is_empty() {
            let available: Vec<&str> = websocket
                .iter()
                .flat_map(|s| s.protocols.as_deref().unwrap_or_default())
                .map(String::as_str)
                .collect();
            return Err(StreamError::ProtocolMismatch {
                requested: protocol.to_string(),
                available: available.join(", "),
            });
        }

        tracing::debug!(
            "Discovery produced {} candidate(s) for protocol {protocol}",
            candidates.len()
        );

        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn service(endpoint: &str, protocols: Option<Vec<&str>>) -> DiscoveredService {
        DiscoveredService {
            endpoint: endpoint.to_string(),
            port: Some(443),
            transport: Some("websocket".to_string()),
            path: None,
            data_format: vec!["json".to_string()],
            location: vec!["eu-west-1a".to_string()],
            protocols: protocols.map(|ps| ps.into_iter().map(str::to_string).collect()),
        }
    }

    #[rstest]
    fn test_server_order_preserved() {
        let services = vec![
            service("primary.example.com", None),
            service("secondary.example.com", None),
        ];

        let endpoints =
            DiscoveryClient::select_endpoints(&services, Protocol::MarketData, None).unwrap();
        assert_eq!(endpoints.len(), 2);
        assert_eq!(endpoints[0].host, "primary.example.com");
        assert_eq!(endpoints[1].host, "secondary.example.com");
    }

    #[rstest]
    fn test_protocol_filter() {
        let services = vec![
            service("md-only.example.com", Some(vec!["market-data"])),
            service("rpc-only.example.com", Some(vec!["rpc"])),
        ];

        let endpoints =
            DiscoveryClient::select_endpoints(&services, Protocol::Rpc, None).unwrap();
        assert_eq!(endpoints.len(), 1);
        assert_eq!(endpoints[0].host, "rpc-only.example.com");
    }

    #[rstest]
    fn test_default_path_applied() {
        let services = vec![service("host.example.com", None)];

        let endpoints =
            DiscoveryClient::select_endpoints(&services, Protocol::MarketData, Some("/WebSocket"))
                .unwrap();
        assert_eq!(endpoints[0].path, "/WebSocket");
    }

    #[rstest]
    fn test_no_candidates_is_discovery_error() {
        let result = DiscoveryClient::select_endpoints(&[], Protocol::MarketData, None);
        assert!(matches!(result, Err(StreamError::Discovery(_))));

        let non_websocket = vec![DiscoveredService {
            transport: Some("tcp".to_string()),
            ..service("host.example.com", None)
        }];
        let result =
            DiscoveryClient::select_endpoints(&non_websocket, Protocol::MarketData, None);
        assert!(matches!(result, Err(StreamError::Discovery(_))));
    }

    #[rstest]
    fn test_protocol_mismatch_error() {
        let services = vec![service("md.example.com", Some(vec!["market-data"]))];

        let result = DiscoveryClient::select_endpoints(&services, Protocol::Rpc, None);
        match result {
            Err(StreamError::ProtocolMismatch { requested, available }) => {
                assert_eq!(requested, "rpc");
                assert!(available.contains("market-data"));
            }
            other => panic!("expected protocol mismatch, got {other:?}"),
        }
    }
}
