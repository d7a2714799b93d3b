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

//! Core constants for the streaming session SDK.

/// User agent string sent on HTTP requests.
pub const SDK_USER_AGENT: &str = concat!("dataplatform-stream/", env!("CARGO_PKG_VERSION"));

/// Library name reported during the local proxy handshake.
pub const SDK_LIBRARY_NAME: &str = "dataplatform-stream";

/// Default channel name for the market-data feed.
///
/// The hybrid session routes channels carrying this prefix to its fixed-host leg.
pub const DEFAULT_MARKET_DATA_CHANNEL: &str = "streaming/pricing/main";

/// Default token endpoint path on the platform base URL.
pub const DEFAULT_TOKEN_PATH: &str = "/auth/oauth2/v1/token";

/// Default handshake endpoint path on the local proxy base URL.
pub const DEFAULT_HANDSHAKE_PATH: &str = "/api/handshake";

/// Default WebSocket path used when discovery (or a host override) omits one.
pub const DEFAULT_WS_PATH: &str = "/WebSocket";

/// Default DACS-style position when none is configured.
pub const DEFAULT_POSITION: &str = "127.0.0.1/net";

/// Default application id for stream logins.
pub const DEFAULT_APPLICATION_ID: &str = "256";

/// Default username for fixed-host logins.
pub const DEFAULT_USERNAME: &str = "user";

/// Default base unit for per-candidate reconnect delays.
pub const DEFAULT_BASE_RECONNECT_DELAY_MS: u64 = 5_000;

/// Delay before retrying a failed token request (resilient mode).
pub const DEFAULT_TOKEN_RETRY_DELAY_SECS: u64 = 30;

/// Delay before retrying a failed token refresh.
pub const DEFAULT_REFRESH_RETRY_DELAY_SECS: u64 = 60;

/// Fallback token lifetime when the token endpoint reports a non-positive expiry.
pub const DEFAULT_TOKEN_EXPIRES_IN_SECS: u64 = 600;

/// Default timeout for one-shot HTTP requests.
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 20;

/// Default timeout for transport handshake plus login acknowledgement.
pub const DEFAULT_HANDSHAKE_TIMEOUT_SECS: u64 = 15;

/// Bounded drain timeout applied when closing a stream connection.
pub const DEFAULT_CLOSE_TIMEOUT_SECS: u64 = 5;

/// Stream id used for the login exchange on every connection.
pub const LOGIN_STREAM_ID: u64 = 1;
