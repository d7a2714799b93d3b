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

//! URL construction and host-override parsing helpers.

use crate::{discovery::ServiceEndpoint, error::StreamError};

/// Joins a base URL and a path without doubling or dropping the separator.
#[must_use]
pub fn join_url(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{base}/{path}")
}

/// Parses an operator-supplied endpoint override into a [`ServiceEndpoint`].
///
/// Accepts a bare `host`, `host:port`, or a full `ws://`/`wss://` URL with an
/// optional path. A bare host defaults to the `wss` scheme with no explicit
/// port; the websocket path defaults to empty and is filled in by the caller's
/// protocol default when absent.
///
/// # Errors
///
/// Returns an error if the value is empty or the port is not numeric.
pub fn parse_endpoint_override(value: &str) -> Result<ServiceEndpoint, StreamError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(StreamError::Discovery(
            "endpoint override must not be empty".to_string(),
        ));
    }

    let (scheme, rest) = match value.split_once("://") {
        Some((scheme, rest)) => (scheme.to_string(), rest),
        None => ("wss".to_string(), value),
    };

    let (authority, path) = match rest.split_once('/') {
        Some((authority, path)) => (authority, format!("/{path}")),
        None => (rest, String::new()),
    };

    let (host, port) = match authority.rsplit_once(':') {
        Some((host, port)) => {
            let port: u16 = port.parse().map_err(|_| {
                StreamError::Discovery(format!("invalid port in endpoint override: {value}"))
            })?;
            (host.to_string(), Some(port))
        }
        None => (authority.to_string(), None),
    };

    if host.is_empty() {
        return Err(StreamError::Discovery(format!(
            "endpoint override has no host: {value}"
        )));
    }

    Ok(ServiceEndpoint {
        scheme,
        host,
        port,
        path,
        data_formats: vec![],
    })
}
