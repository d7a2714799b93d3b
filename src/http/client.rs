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

//! Plain request/response HTTP helper for one-shot REST calls.

use std::time::Duration;

use reqwest::header::{ACCEPT, AUTHORIZATION, USER_AGENT};
use serde_json::Value;

use crate::{common::consts::SDK_USER_AGENT, error::StreamError};

/// Header carrying the application key on platform requests.
pub const APPLICATION_ID_HEADER: &str = "x-application-id";

/// Thin HTTP helper shared by discovery, credential and backend requests.
#[derive(Clone, Debug)]
pub struct HttpClient {
    client: reqwest::Client,
    app_key: String,
}

impl HttpClient {
    /// Creates a new [`HttpClient`] with the given request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying client cannot be constructed.
    pub fn new(app_key: impl Into<String>, timeout: Duration) -> Result<Self, StreamError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StreamError::Transport(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            app_key: app_key.into(),
        })
    }

    fn request(&self, method: reqwest::Method, url: &str, bearer: Option<&str>) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .request(method, url)
            .header(USER_AGENT, SDK_USER_AGENT)
            .header(ACCEPT, "application/json")
            .header(APPLICATION_ID_HEADER, &self.app_key);

        if let Some(token) = bearer {
            builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
        }

        builder
    }

    async fn into_json(response: reqwest::Response) -> Result<Value, StreamError> {
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(StreamError::Http {
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str(&body)
            .map_err(|e| StreamError::Json(format!("failed to parse response: {e}\nBody: {body}")))
    }

    /// Sends a GET request and parses the JSON response.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, non-2xx status, or invalid JSON.
    pub async fn get_json(&self, url: &str, bearer: Option<&str>) -> Result<Value, StreamError> {
        tracing::debug!("GET {url}");
        let response = self.request(reqwest::Method::GET, url, bearer).send().await?;
        Self::into_json(response).await
    }

    /// Sends a POST request with a JSON body and parses the JSON response.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, non-2xx status, or invalid JSON.
    pub async fn post_json(
        &self,
        url: &str,
        body: &Value,
        bearer: Option<&str>,
    ) -> Result<Value, StreamError> {
        tracing::debug!("POST {url}");
        let response = self
            .request(reqwest::Method::POST, url, bearer)
            .json(body)
            .send()
            .await?;
        Self::into_json(response).await
    }

    /// Sends a POST request with form-encoded fields and parses the JSON response.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, non-2xx status, or invalid JSON.
    pub async fn post_form(
        &self,
        url: &str,
        form: &[(&str, &str)],
    ) -> Result<Value, StreamError> {
        tracing::debug!("POST {url} (form)");
        let response = self
            .request(reqwest::Method::POST, url, None)
            .form(form)
            .send()
            .await?;
        Self::into_json(response).await
    }
}
