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

//! Credential grants and the access token they produce.

use std::{
    fmt::Debug,
    time::{Duration, Instant},
};

use crate::common::consts::DEFAULT_TOKEN_EXPIRES_IN_SECS;

/// Credential grant used to acquire an access token.
#[derive(Clone)]
pub enum Grant {
    /// OAuth2-style password grant.
    Password {
        username: String,
        password: String,
        scope: String,
    },
    /// OAuth2-style refresh-token grant (token seeded externally).
    RefreshToken {
        username: String,
        refresh_token: String,
    },
}

impl Grant {
    /// Creates a password grant with the default scope.
    #[must_use]
    pub fn password(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::Password {
            username: username.into(),
            password: password.into(),
            scope: "trapi".to_string(),
        }
    }

    /// Creates a refresh-token grant.
    #[must_use]
    pub fn refresh_token(username: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self::RefreshToken {
            username: username.into(),
            refresh_token: refresh_token.into(),
        }
    }

    /// Returns the username carried by the grant.
    #[must_use]
    pub fn username(&self) -> &str {
        match self {
            Self::Password { username, .. } | Self::RefreshToken { username, .. } => username,
        }
    }

    /// Returns whether this is a password grant (required for resilient re-authorization).
    #[must_use]
    pub fn is_password(&self) -> bool {
        matches!(self, Self::Password { .. })
    }
}

impl Debug for Grant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Password {
                username, scope, ..
            } => f
                .debug_struct("Grant::Password")
                .field("username", username)
                .field("password", &"<redacted>")
                .field("scope", scope)
                .finish(),
            Self::RefreshToken { username, .. } => f
                .debug_struct("Grant::RefreshToken")
                .field("username", username)
                .field("refresh_token", &"<redacted>")
                .finish(),
        }
    }
}

/// The current access token plus its expiry metadata.
///
/// Exactly one token is "current" for a session at any time; replacing it is an
/// atomic swap performed by the token manager.
#[derive(Clone)]
pub struct AccessToken {
    /// The opaque bearer token.
    pub token: String,
    /// Refresh token for the next rotation, when issued.
    pub refresh_token: Option<String>,
    /// Token scope as reported by the endpoint.
    pub scope: String,
    /// Token type as reported by the endpoint (normally `Bearer`).
    pub token_type: String,
    /// Reported lifetime.
    pub expires_in: Duration,
    /// When the token was acquired.
    pub acquired_at: Instant,
}

impl AccessToken {
    /// Creates a new [`AccessToken`], applying the fallback lifetime to
    /// non-positive expiries.
    #[must_use]
    pub fn new(
        token: String,
        refresh_token: Option<String>,
        scope: String,
        token_type: String,
        expires_in_secs: f64,
    ) -> Self {
        let expires_in = if expires_in_secs > 0.0 {
            Duration::from_secs_f64(expires_in_secs)
        } else {
            Duration::from_secs(DEFAULT_TOKEN_EXPIRES_IN_SECS)
        };

        Self {
            token,
            refresh_token,
            scope,
            token_type,
            expires_in,
            acquired_at: Instant::now(),
        }
    }

    /// Returns the delay until the scheduled refresh (half the token lifetime).
    #[must_use]
    pub fn refresh_delay(&self) -> Duration {
        let half = self.expires_in / 2;
        half.saturating_sub(self.acquired_at.elapsed())
    }

    /// Returns the `Authorization` header value for this token.
    #[must_use]
    pub fn auth_header(&self) -> String {
        format!("{} {}", self.token_type, self.token)
    }
}

impl Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &"<redacted>")
            .field("scope", &self.scope)
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn token(expires_in_secs: f64) -> AccessToken {
        AccessToken::new(
            "abc123".to_string(),
            Some("refresh456".to_string()),
            "trapi".to_string(),
            "Bearer".to_string(),
            expires_in_secs,
        )
    }

    #[rstest]
    fn test_refresh_delay_is_half_lifetime() {
        let tok = token(600.0);
        let delay = tok.refresh_delay();
        assert!(delay <= Duration::from_secs(300));
        assert!(delay > Duration::from_secs(295));
    }

    #[rstest]
    #[case(0.0)]
    #[case(-30.0)]
    fn test_non_positive_expiry_falls_back(#[case] expires_in: f64) {
        let tok = token(expires_in);
        assert_eq!(tok.expires_in, Duration::from_secs(DEFAULT_TOKEN_EXPIRES_IN_SECS));
    }

    #[rstest]
    fn test_auth_header() {
        assert_eq!(token(600.0).auth_header(), "Bearer abc123");
    }

    #[rstest]
    fn test_debug_redacts_secrets() {
        let grant = Grant::password("user", "hunter2");
        let repr = format!("{grant:?}");
        assert!(!repr.contains("hunter2"));
        assert!(repr.contains("<redacted>"));

        let repr = format!("{:?}", token(600.0));
        assert!(!repr.contains("abc123"));
        assert!(!repr.contains("refresh456"));
    }
}
