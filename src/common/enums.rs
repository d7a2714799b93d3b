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

//! Enumerations for session, connection and event states.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// The lifecycle state of a [`Session`](crate::session::Session).
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[strum(serialize_all = "PascalCase")]
pub enum SessionState {
    /// The session is closed and ready to be opened.
    Closed,
    /// The session is opening; on success it moves to `Open`, otherwise back to `Closed`.
    Pending,
    /// The session is open and ready for use.
    Open,
}

/// The lifecycle state of a single stream connection.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[strum(serialize_all = "PascalCase")]
#[repr(u8)]
pub enum ConnectionState {
    /// Transport connect in flight.
    Connecting = 0,
    /// Transport established, login not yet sent.
    Connected = 1,
    /// Login sent, awaiting acknowledgement.
    Authenticating = 2,
    /// Login acknowledged; the connection accepts subscriptions.
    Ready = 3,
    /// Transport lost; no reconnect scheduled yet.
    Disconnected = 4,
    /// Waiting out the reconnect delay before the next candidate.
    Reconnecting = 5,
    /// Explicit teardown in progress.
    Closing = 6,
    /// Terminal state, no further transitions.
    Closed = 7,
}

impl ConnectionState {
    /// Returns the state encoded as a `u8` for atomic storage.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Decodes a state previously stored with [`Self::as_u8`].
    #[must_use]
    pub const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Connecting,
            1 => Self::Connected,
            2 => Self::Authenticating,
            3 => Self::Ready,
            4 => Self::Disconnected,
            5 => Self::Reconnecting,
            6 => Self::Closing,
            _ => Self::Closed,
        }
    }

    /// Returns whether a connection in this state can still serve subscriptions
    /// (possibly after an in-flight reconnect completes).
    #[must_use]
    pub const fn is_live(self) -> bool {
        matches!(
            self,
            Self::Connecting | Self::Connected | Self::Authenticating | Self::Ready | Self::Reconnecting
        )
    }

    /// Returns whether outbound sends are accepted in this state.
    #[must_use]
    pub const fn accepts_sends(self) -> bool {
        matches!(self, Self::Connected | Self::Authenticating | Self::Ready)
    }
}

/// Status events a session can report over its lifecycle.
///
/// Stream-level codes describe a single channel connection; session-level codes
/// describe the session as a whole. Every externally observable status change
/// is one of these codes plus a human-readable message.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[strum(serialize_all = "PascalCase")]
pub enum EventCode {
    /// Connection to a stream service is pending.
    StreamConnecting,
    /// Connection to a stream service is established and logged in.
    StreamConnected,
    /// Connection to a stream service is not established.
    StreamDisconnected,
    /// A stream login was accepted.
    StreamAuthenticationSuccess,
    /// A stream login was refused.
    StreamAuthenticationFailed,
    /// A stream connection is waiting to retry against the next candidate.
    StreamReconnecting,
    /// The session is connecting.
    SessionConnecting,
    /// The session is connected.
    SessionConnected,
    /// The session is disconnected.
    SessionDisconnected,
    /// The session credential was accepted.
    SessionAuthenticationSuccess,
    /// The session credential was rejected or could not be acquired.
    SessionAuthenticationFailed,
    /// The session is retrying credential acquisition.
    SessionReconnecting,
}

/// Wire protocol spoken on a stream connection.
#[derive(
    Clone, Copy, Debug, Display, AsRefStr, EnumString, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
pub enum Protocol {
    /// The market-data protocol (nested login key, domain-tagged messages).
    #[strum(serialize = "market-data")]
    #[serde(rename = "market-data")]
    MarketData,
    /// The generic request/stream protocol (flat JSON method messages).
    #[strum(serialize = "rpc")]
    #[serde(rename = "rpc")]
    Rpc,
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(ConnectionState::Connecting)]
    #[case(ConnectionState::Connected)]
    #[case(ConnectionState::Authenticating)]
    #[case(ConnectionState::Ready)]
    #[case(ConnectionState::Disconnected)]
    #[case(ConnectionState::Reconnecting)]
    #[case(ConnectionState::Closing)]
    #[case(ConnectionState::Closed)]
    fn test_connection_state_u8_round_trip(#[case] state: ConnectionState) {
        assert_eq!(ConnectionState::from_u8(state.as_u8()), state);
    }

    #[rstest]
    fn test_connection_state_liveness() {
        assert!(ConnectionState::Reconnecting.is_live());
        assert!(ConnectionState::Ready.is_live());
        assert!(!ConnectionState::Closing.is_live());
        assert!(!ConnectionState::Closed.is_live());
        assert!(!ConnectionState::Disconnected.is_live());
    }

    #[rstest]
    fn test_connection_state_send_gate() {
        assert!(ConnectionState::Connected.accepts_sends());
        assert!(ConnectionState::Authenticating.accepts_sends());
        assert!(ConnectionState::Ready.accepts_sends());
        assert!(!ConnectionState::Closing.accepts_sends());
        assert!(!ConnectionState::Closed.accepts_sends());
    }

    #[rstest]
    fn test_protocol_display() {
        assert_eq!(Protocol::MarketData.to_string(), "market-data");
        assert_eq!(Protocol::Rpc.to_string(), "rpc");
    }

    #[rstest]
    fn test_protocol_from_str() {
        use std::str::FromStr;

        assert_eq!(Protocol::from_str("market-data").unwrap(), Protocol::MarketData);
        assert_eq!(Protocol::from_str("rpc").unwrap(), Protocol::Rpc);
        assert!(Protocol::from_str("unknown").is_err());
    }
}
