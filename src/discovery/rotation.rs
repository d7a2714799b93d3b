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

//! Failover-ordered endpoint candidates for one stream channel.

use std::time::Duration;

use crate::error::StreamError;

/// One concrete network location capable of serving a channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceEndpoint {
    /// URL scheme (`ws` or `wss`).
    pub scheme: String,
    /// Host name or address.
    pub host: String,
    /// Port, when not implied by the scheme.
    pub port: Option<u16>,
    /// WebSocket path (may be empty).
    pub path: String,
    /// Data formats the endpoint serves.
    pub data_formats: Vec<String>,
}

impl ServiceEndpoint {
    /// Builds the WebSocket URL `scheme://host[:port]/path` for this endpoint.
    #[must_use]
    pub fn ws_url(&self) -> String {
        let mut url = format!("{}://{}", self.scheme, self.host);
        if let Some(port) = self.port {
            url.push_str(&format!(":{port}"));
        }
        if !self.path.is_empty() {
            if !self.path.starts_with('/') {
                url.push('/');
            }
            url.push_str(&self.path);
        }
        url
    }
}

/// Ordered, failover-ordered endpoint candidates plus the reconnect cursor.
///
/// Created once per channel resolution and owned by the connection that serves
/// the channel; the cursor only moves during that connection's reconnects.
#[derive(Clone, Debug)]
pub struct EndpointRotation {
    candidates: Vec<ServiceEndpoint>,
    cursor: usize,
    base_delay: Duration,
}

impl EndpointRotation {
    /// Creates a rotation over the given candidates.
    ///
    /// # Errors
    ///
    /// Returns a discovery error if `candidates` is empty; the cursor invariant
    /// requires a non-empty sequence.
    pub fn new(candidates: Vec<ServiceEndpoint>, base_delay: Duration) -> Result<Self, StreamError> {
        if candidates.is_empty() {
            return Err(StreamError::Discovery(
                "no usable candidate endpoints".to_string(),
            ));
        }

        Ok(Self {
            candidates,
            cursor: 0,
            base_delay,
        })
    }

    /// Returns the candidate the cursor points at.
    #[must_use]
    pub fn current(&self) -> &ServiceEndpoint {
        &self.candidates[self.cursor]
    }

    /// Moves the cursor to the next candidate, wrapping past the last (round-robin).
    ///
    /// Called exactly once per failed connection attempt.
    pub fn advance(&mut self) {
        self.cursor = (self.cursor + 1) % self.candidates.len();
    }

    /// Returns the delay to wait before connecting to the current candidate:
    /// `cursor * base_delay`.
    #[must_use]
    pub fn reconnect_delay(&self) -> Duration {
        self.base_delay * self.cursor as u32
    }

    /// Resets the cursor after a successful connection so a future outage does
    /// not inherit a large delay.
    pub fn reset(&mut self) {
        self.cursor = 0;
    }

    /// Returns the number of candidates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    /// Returns whether the rotation is empty (never true by construction).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Returns the current cursor position.
    #[must_use]
    pub fn cursor(&self) -> usize {
        self.cursor
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn endpoint(host: &str) -> ServiceEndpoint {
        ServiceEndpoint {
            scheme: "wss".to_string(),
            host: host.to_string(),
            port: Some(443),
            path: "/WebSocket".to_string(),
            data_formats: vec!["json".to_string()],
        }
    }

    fn rotation(n: usize) -> EndpointRotation {
        let candidates = (0..n).map(|i| endpoint(&format!("host{i}"))).collect();
        EndpointRotation::new(candidates, Duration::from_secs(5)).unwrap()
    }

    #[rstest]
    fn test_empty_candidates_rejected() {
        let result = EndpointRotation::new(vec![], Duration::from_secs(5));
        assert!(matches!(result, Err(StreamError::Discovery(_))));
    }

    #[rstest]
    #[case(1)]
    #[case(3)]
    #[case(5)]
    fn test_round_robin_returns_to_start(#[case] n: usize) {
        let mut rotation = rotation(n);
        let start = rotation.current().clone();

        for _ in 0..n {
            rotation.advance();
        }

        assert_eq!(rotation.current(), &start);
        assert_eq!(rotation.cursor(), 0);
    }

    #[rstest]
    fn test_delay_grows_with_cursor() {
        let mut rotation = rotation(4);
        assert_eq!(rotation.reconnect_delay(), Duration::ZERO);

        rotation.advance();
        assert_eq!(rotation.reconnect_delay(), Duration::from_secs(5));

        rotation.advance();
        assert_eq!(rotation.reconnect_delay(), Duration::from_secs(10));

        rotation.advance();
        assert_eq!(rotation.reconnect_delay(), Duration::from_secs(15));
    }

    #[rstest]
    fn test_reset_zeroes_cursor_and_delay() {
        let mut rotation = rotation(3);
        rotation.advance();
        rotation.advance();
        assert_eq!(rotation.reconnect_delay(), Duration::from_secs(10));

        rotation.reset();
        assert_eq!(rotation.cursor(), 0);
        assert_eq!(rotation.reconnect_delay(), Duration::ZERO);
    }

    #[rstest]
    fn test_ws_url_construction() {
        let ep = endpoint("ads1.example.com");
        assert_eq!(ep.ws_url(), "wss://ads1.example.com:443/WebSocket");

        let no_port = ServiceEndpoint {
            port: None,
            ..endpoint("ads1.example.com")
        };
        assert_eq!(no_port.ws_url(), "wss://ads1.example.com/WebSocket");

        let no_path = ServiceEndpoint {
            path: String::new(),
            port: Some(15000),
            ..endpoint("10.1.2.3")
        };
        assert_eq!(no_path.ws_url(), "wss://10.1.2.3:15000");
    }
}
