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

//! Wire models for the token endpoint.

use serde::Deserialize;
use serde_json::Value;

use crate::{common::credential::AccessToken, error::StreamError};

/// Successful token endpoint response.
#[derive(Clone, Debug, Deserialize)]
pub struct TokenResponse {
    /// The access token.
    pub access_token: String,
    /// Token lifetime in seconds; the endpoint may return it as a string.
    pub expires_in: Value,
    /// Refresh token for the next rotation, when issued.
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Granted scope.
    pub scope: String,
    /// Token type (normally `Bearer`).
    pub token_type: String,
}

impl TokenResponse {
    /// Parses a token endpoint response body.
    ///
    /// # Errors
    ///
    /// Returns a JSON error when required fields are missing or malformed.
    pub fn parse(body: &Value) -> Result<Self, StreamError> {
        serde_json::from_value(body.clone())
            .map_err(|e| StreamError::Json(format!("invalid token response: {e}")))
    }

    /// Converts the response into an [`AccessToken`].
    #[must_use]
    pub fn into_access_token(self) -> AccessToken {
        let expires_in = match &self.expires_in {
            Value::Number(n) => n.as_f64().unwrap_or(0.0),
            Value::String(s) => s.parse().unwrap_or(0.0),
            _ => 0.0,
        };

        AccessToken::new(
            self.access_token,
            self.refresh_token,
            self.scope,
            self.token_type,
            expires_in,
        )
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde_json::json;

    use super::*;

    #[rstest]
    fn test_parse_numeric_expiry() {
        let body = json!({
            "access_token": "tok",
            "expires_in": 600,
            "refresh_token": "ref",
            "scope": "trapi",
            "token_type": "Bearer"
        });

        let token = TokenResponse::parse(&body).unwrap().into_access_token();
        assert_eq!(token.token, "tok");
        assert_eq!(token.refresh_token.as_deref(), Some("ref"));
        assert_eq!(token.expires_in.as_secs(), 600);
    }

    #[rstest]
    fn test_parse_string_expiry() {
        let body = json!({
            "access_token": "tok",
            "expires_in": "300",
            "scope": "trapi",
            "token_type": "Bearer"
        });

        let token = TokenResponse::parse(&body).unwrap().into_access_token();
        assert_eq!(token.expires_in.as_secs(), 300);
        assert!(token.refresh_token.is_none());
    }

    #[rstest]
    fn test_parse_missing_field_is_error() {
        let body = json!({"expires_in": 600});
        assert!(TokenResponse::parse(&body).is_err());
    }
}
