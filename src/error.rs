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

//! Error types for the streaming session SDK.

use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Error type for session, discovery and stream operations.
///
/// `Display` carries the human-readable message; [`StreamError::kind`] returns
/// the stable machine-checkable kind for alerting.
#[derive(Clone, Debug, Error)]
pub enum StreamError {
    /// Discovery produced no usable candidate endpoint.
    #[error("Discovery error: {0}")]
    Discovery(String),
    /// The requested protocol is unsupported by every discovered candidate.
    #[error("Protocol mismatch: no candidate supports {requested} (available: {available})")]
    ProtocolMismatch {
        /// The protocol that was requested.
        requested: String,
        /// The protocols offered across all candidates.
        available: String,
    },
    /// Connect/read/write failure on an established or attempted connection.
    #[error("Transport error: {0}")]
    Transport(String),
    /// The transport handshake or login acknowledgement timed out.
    #[error("Handshake timeout: {0}")]
    HandshakeTimeout(String),
    /// The credential was rejected.
    #[error("Authentication error: {0}")]
    Authentication(String),
    /// The same listener was registered twice on one channel.
    #[error("Duplicate subscription on channel {0}")]
    DuplicateSubscription(String),
    /// An unknown subscription id was unregistered.
    #[error("Unknown subscription id {0}")]
    UnknownSubscription(u64),
    /// A non-success HTTP response.
    #[error("HTTP {status}: {body}")]
    Http {
        /// The response status code.
        status: u16,
        /// The response body.
        body: String,
    },
    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(String),
    /// Failed to hand a message to a connection.
    #[error("Send error: {0}")]
    Send(String),
    /// The operation requires an open session or live connection.
    #[error("Not connected: {0}")]
    NotConnected(String),
    /// An operation exceeded its configured timeout.
    #[error("Timeout: {0}")]
    Timeout(String),
    /// The target was closed or cancelled before the operation completed.
    #[error("Closed: {0}")]
    Closed(String),
}

impl StreamError {
    /// Returns the stable machine-checkable kind of this error.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Discovery(_) => "discovery",
            Self::ProtocolMismatch { .. } => "protocol-mismatch",
            Self::Transport(_) => "transport",
            Self::HandshakeTimeout(_) => "handshake-timeout",
            Self::Authentication(_) => "authentication",
            Self::DuplicateSubscription(_) => "duplicate-subscription",
            Self::UnknownSubscription(_) => "unknown-subscription",
            Self::Http { .. } => "http",
            Self::Json(_) => "json",
            Self::Send(_) => "send",
            Self::NotConnected(_) => "not-connected",
            Self::Timeout(_) => "timeout",
            Self::Closed(_) => "closed",
        }
    }

    /// Returns whether the error is credential-shaped (operator
    /// misconfiguration rather than a transient fault).
    #[must_use]
    pub fn is_credential_rejection(&self) -> bool {
        matches!(self, Self::Authentication(_)) || matches!(self, Self::Http { status, .. } if *status >= 400 && *status < 500)
    }
}

impl From<tungstenite::Error> for StreamError {
    fn from(error: tungstenite::Error) -> Self {
        Self::Transport(error.to_string())
    }
}

impl From<serde_json::Error> for StreamError {
    fn from(error: serde_json::Error) -> Self {
        Self::Json(error.to_string())
    }
}

impl From<reqwest::Error> for StreamError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout(error.to_string())
        } else {
            Self::Transport(error.to_string())
        }
    }
}

/// Determines whether an error should feed the reconnect/retry policy.
#[must_use]
pub fn should_retry(error: &StreamError) -> bool {
    matches!(
        error,
        StreamError::Transport(_)
            | StreamError::HandshakeTimeout(_)
            | StreamError::Send(_)
            | StreamError::NotConnected(_)
            | StreamError::Timeout(_)
    ) || matches!(error, StreamError::Http { status, .. } if *status >= 500)
}
