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

//! Streaming session and connection-management core for the data platform SDK.
//!
//! The crate authenticates a client, discovers the endpoints serving a named
//! real-time feed, maintains persistent duplex connections to them, and keeps
//! subscriptions alive across reconnects:
//!
//! - [`session::Session`]: the façade over one logical client instance, with
//!   local-proxy, platform-discovery, fixed-host and hybrid variants.
//! - [`discovery`]: endpoint resolution and round-robin failover.
//! - [`auth`]: background access-token lifecycle with rotation fan-out.
//! - [`websocket`]: per-channel duplex connections with login and reconnect.

pub mod auth;
pub mod common;
pub mod config;
pub mod discovery;
pub mod error;
pub mod http;
pub mod session;
pub mod websocket;

pub use common::{
    credential::{AccessToken, Grant},
    enums::{ConnectionState, EventCode, Protocol, SessionState},
};
pub use config::{ChannelConfig, ClientIdentity, SessionConfig};
pub use error::StreamError;
pub use session::{Session, StreamListener};
pub use websocket::StreamConnection;
