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

//! Wire message construction and classification for both stream protocols.

use serde_json::{json, Value};

use crate::common::{consts::LOGIN_STREAM_ID, enums::Protocol};

/// Classification of an inbound stream message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InboundKind {
    /// The login was accepted; the connection may transition to ready.
    LoginAccepted,
    /// The login was refused with the given reason.
    LoginRejected(String),
    /// A server ping that must be answered with a pong.
    Ping,
    /// Any other message, to be fanned out to subscribers.
    Other,
}

/// Wraps a market-data login key into the full login request.
#[must_use]
pub fn market_data_login(key: Value) -> Value {
    json!({
        "ID": LOGIN_STREAM_ID,
        "Domain": "Login",
        "Key": key,
    })
}

/// Builds the market-data pong answering a server ping.
#[must_use]
pub fn market_data_pong() -> Value {
    json!({"Type": "Pong"})
}

/// Classifies a single inbound message for the given protocol.
#[must_use]
pub fn classify(protocol: Protocol, message: &Value) -> InboundKind {
    match protocol {
        Protocol::MarketData => classify_market_data(message),
        Protocol::Rpc => classify_rpc(message),
    }
}

fn classify_market_data(message: &Value) -> InboundKind {
    if message.get("Type").and_then(Value::as_str) == Some("Ping") {
        return InboundKind::Ping;
    }

    if message.get("Domain").and_then(Value::as_str) == Some("Login") {
        let state = message.get("State");
        let stream = state
            .and_then(|s| s.get("Stream"))
            .and_then(Value::as_str)
            .unwrap_or_default();
        let data = state
            .and_then(|s| s.get("Data"))
            .and_then(Value::as_str)
            .unwrap_or_default();

        if stream == "Open" && data == "Ok" {
            return InboundKind::LoginAccepted;
        }

        let text = state
            .and_then(|s| s.get("Text"))
            .and_then(Value::as_str)
            .unwrap_or("login refused");
        return InboundKind::LoginRejected(text.to_string());
    }

    InboundKind::Other
}

fn classify_rpc(message: &Value) -> InboundKind {
    // The auth acknowledgement is the first message carrying a state code
    if let Some(code) = message
        .get("state")
        .and_then(|s| s.get("code"))
        .and_then(Value::as_i64)
    {
        if code == 200 {
            return InboundKind::LoginAccepted;
        }

        let text = message
            .get("state")
            .and_then(|s| s.get("text"))
            .and_then(Value::as_str)
            .unwrap_or("login refused");
        return InboundKind::LoginRejected(format!("{code}: {text}"));
    }

    InboundKind::Other
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde_json::json;

    use super::*;

    #[rstest]
    fn test_market_data_login_shape() {
        let login = market_data_login(json!({
            "NameType": "AuthnToken",
            "Elements": {
                "AuthenticationToken": "tok",
                "ApplicationId": "256",
                "Position": "127.0.0.1/net",
            }
        }));

        assert_eq!(login["ID"], 1);
        assert_eq!(login["Domain"], "Login");
        assert_eq!(login["Key"]["NameType"], "AuthnToken");
        assert_eq!(login["Key"]["Elements"]["ApplicationId"], "256");
    }

    #[rstest]
    fn test_classify_market_data_login_accepted() {
        let msg = json!({
            "ID": 1,
            "Domain": "Login",
            "State": {"Stream": "Open", "Data": "Ok", "Text": "Login accepted"}
        });
        assert_eq!(classify(Protocol::MarketData, &msg), InboundKind::LoginAccepted);
    }

    #[rstest]
    fn test_classify_market_data_login_rejected() {
        let msg = json!({
            "ID": 1,
            "Domain": "Login",
            "State": {"Stream": "Closed", "Data": "Suspect", "Text": "Invalid token"}
        });
        assert_eq!(
            classify(Protocol::MarketData, &msg),
            InboundKind::LoginRejected("Invalid token".to_string())
        );
    }

    #[rstest]
    fn test_classify_market_data_ping() {
        assert_eq!(
            classify(Protocol::MarketData, &json!({"Type": "Ping"})),
            InboundKind::Ping
        );
        assert_eq!(market_data_pong(), json!({"Type": "Pong"}));
    }

    #[rstest]
    fn test_classify_market_data_update_is_other() {
        let msg = json!({"ID": 5, "Type": "Update", "Fields": {"BID": 1.2}});
        assert_eq!(classify(Protocol::MarketData, &msg), InboundKind::Other);
    }

    #[rstest]
    fn test_classify_rpc_ack() {
        let ok = json!({"streamID": "1", "state": {"code": 200, "text": "OK"}});
        assert_eq!(classify(Protocol::Rpc, &ok), InboundKind::LoginAccepted);

        let denied = json!({"streamID": "1", "state": {"code": 401, "text": "token expired"}});
        assert_eq!(
            classify(Protocol::Rpc, &denied),
            InboundKind::LoginRejected("401: token expired".to_string())
        );
    }

    #[rstest]
    fn test_classify_rpc_update_is_other() {
        let msg = json!({"streamID": "7", "type": "Update", "data": [1, 2, 3]});
        assert_eq!(classify(Protocol::Rpc, &msg), InboundKind::Other);
    }
}
