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

//! Wire models for the service discovery response.

use serde::Deserialize;

/// Discovery response enumerating the service locations for a channel.
#[derive(Clone, Debug, Deserialize)]
pub struct DiscoveryResponse {
    /// Service locations in server preference order.
    #[serde(default)]
    pub services: Vec<DiscoveredService>,
}

/// One service location from the discovery response.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveredService {
    /// Host name serving the channel.
    pub endpoint: String,
    /// Port, when not implied by the scheme.
    #[serde(default)]
    pub port: Option<u16>,
    /// Transport kind (only `websocket` is usable here).
    #[serde(default)]
    pub transport: Option<String>,
    /// WebSocket path, when the service does not mount at the root.
    #[serde(default)]
    pub path: Option<String>,
    /// Data formats the service provides.
    #[serde(default)]
    pub data_format: Vec<String>,
    /// Geographic locations of the service.
    #[serde(default)]
    pub location: Vec<String>,
    /// Protocols the service speaks; absent means all protocols.
    #[serde(default)]
    pub protocols: Option<Vec<String>>,
}

impl DiscoveredService {
    /// Returns whether the service is reachable over a WebSocket transport.
    #[must_use]
    pub fn is_websocket(&self) -> bool {
        self.transport
            .as_deref()
            .is_none_or(|t| t.eq_ignore_ascii_case("websocket"))
    }

    /// Returns whether the service speaks the named protocol.
    #[must_use]
    pub fn supports_protocol(&self, protocol: &str) -> bool {
        self.protocols
            .as_deref()
            .is_none_or(|ps| ps.iter().any(|p| p.eq_ignore_ascii_case(protocol)))
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    fn test_parse_discovery_response() {
        let json = r#"{
            "services": [
                {
                    "endpoint": "eu-west-1-aws.stream.example.com",
                    "port": 443,
                    "transport": "websocket",
                    "dataFormat": ["json"],
                    "location": ["eu-west-1a", "eu-west-1b"],
                    "protocols": ["market-data"]
                },
                {
                    "endpoint": "us-east-1-aws.stream.example.com",
                    "port": 443,
                    "transport": "tcp",
                    "dataFormat": ["binary"],
                    "location": ["us-east-1a"]
                }
            ]
        }"#;

        let response: DiscoveryResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.services.len(), 2);

        let first = &response.services[0];
        assert_eq!(first.endpoint, "eu-west-1-aws.stream.example.com");
        assert_eq!(first.port, Some(443));
        assert!(first.is_websocket());
        assert!(first.supports_protocol("market-data"));
        assert!(!first.supports_protocol("rpc"));

        let second = &response.services[1];
        assert!(!second.is_websocket());
        // Absent protocol list means every protocol is accepted
        assert!(second.supports_protocol("rpc"));
    }

    #[rstest]
    fn test_parse_empty_response() {
        let response: DiscoveryResponse = serde_json::from_str("{}").unwrap();
        assert!(response.services.is_empty());
    }
}
