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

//! Integration tests for endpoint discovery and the token lifecycle using a
//! mock Axum server.

use std::{
    net::SocketAddr,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use dataplatform_stream::{
    auth::TokenManager,
    common::urls::join_url,
    discovery::DiscoveryClient,
    http::HttpClient,
    session::{ChannelRegistry, EventSink},
    Grant, Protocol, Session, SessionConfig, SessionState, StreamError,
};
use serde_json::{json, Value};

// ------------------------------------------------------------------------------------------------
// Mock server
// ------------------------------------------------------------------------------------------------

#[derive(Clone)]
struct ServerState {
    token_attempts: Arc<AtomicUsize>,
    /// HTTP statuses to serve before succeeding, in order.
    token_failures: Arc<Mutex<Vec<u16>>>,
}

impl ServerState {
    fn new(token_failures: Vec<u16>) -> Self {
        Self {
            token_attempts: Arc::new(AtomicUsize::new(0)),
            token_failures: Arc::new(Mutex::new(token_failures)),
        }
    }
}

async fn token_endpoint(State(state): State<ServerState>) -> (StatusCode, Json<Value>) {
    let attempt = state.token_attempts.fetch_add(1, Ordering::SeqCst);
    let failures = state.token_failures.lock().unwrap();

    if attempt < failures.len() {
        let status = StatusCode::from_u16(failures[attempt]).unwrap();
        let body = if status.is_client_error() {
            json!({"error": "invalid_grant", "error_description": "credentials rejected"})
        } else {
            json!({"error": "temporarily_unavailable"})
        };
        return (status, Json(body));
    }

    (
        StatusCode::OK,
        Json(json!({
            "access_token": format!("token-{attempt}"),
            "expires_in": 600,
            "refresh_token": format!("refresh-{attempt}"),
            "scope": "trapi",
            "token_type": "Bearer",
        })),
    )
}

async fn discovery_endpoint() -> Json<Value> {
    Json(json!({
        "services": [
            {
                "endpoint": "eu-west-1-aws.stream.example.com",
                "port": 443,
                "transport": "websocket",
                "dataFormat": ["json"],
                "location": ["eu-west-1a", "eu-west-1b"],
            },
            {
                "endpoint": "us-east-1-aws.stream.example.com",
                "port": 443,
                "transport": "websocket",
                "dataFormat": ["json"],
                "location": ["us-east-1a"],
            },
            {
                "endpoint": "legacy.stream.example.com",
                "port": 443,
                "transport": "tcp",
                "dataFormat": ["binary"],
                "location": ["eu-west-1a"],
            }
        ]
    }))
}

async fn start_server(state: ServerState) -> SocketAddr {
    let app = Router::new()
        .route("/auth/oauth2/v1/token", post(token_endpoint))
        .route("/streaming/pricing/v1", get(discovery_endpoint))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn config_for(addr: SocketAddr) -> SessionConfig {
    let mut config = SessionConfig::new("test-app-key", format!("http://{addr}"));
    config.token_retry_delay = Duration::from_millis(50);
    config
}

fn manager_for(config: &SessionConfig, grant: Grant) -> TokenManager {
    let token_url = join_url(&config.base_url, &config.token_path);
    TokenManager::new(config, token_url, grant).unwrap()
}

// ------------------------------------------------------------------------------------------------
// Discovery
// ------------------------------------------------------------------------------------------------

#[tokio::test]
async fn test_discovery_resolves_websocket_candidates_in_order() {
    let addr = start_server(ServerState::new(vec![])).await;

    let http = HttpClient::new("test-app-key", Duration::from_secs(5)).unwrap();
    let discovery = DiscoveryClient::new(http);
    let url = format!("http://{addr}/streaming/pricing/v1");

    let endpoints = discovery
        .resolve(&url, Protocol::MarketData, Some("token"), Some("/WebSocket"))
        .await
        .unwrap();

    // The tcp location is filtered out; server preference order is preserved
    assert_eq!(endpoints.len(), 2);
    assert_eq!(endpoints[0].host, "eu-west-1-aws.stream.example.com");
    assert_eq!(endpoints[1].host, "us-east-1-aws.stream.example.com");
    assert_eq!(endpoints[0].path, "/WebSocket");
    assert_eq!(
        endpoints[0].ws_url(),
        "wss://eu-west-1-aws.stream.example.com:443/WebSocket"
    );
}

// ------------------------------------------------------------------------------------------------
// Token lifecycle
// ------------------------------------------------------------------------------------------------

#[tokio::test]
async fn test_initial_token_published() {
    let addr = start_server(ServerState::new(vec![])).await;
    let config = config_for(addr);
    let manager = manager_for(&config, Grant::password("user", "pass"));

    manager.start(Arc::new(ChannelRegistry::new()), Arc::new(EventSink::new()));
    manager.wait_ready().await.unwrap();

    assert_eq!(manager.current_token().as_deref(), Some("token-0"));
    manager.stop();
}

#[tokio::test]
async fn test_fatal_first_auth_makes_no_second_request() {
    let state = ServerState::new(vec![401]);
    let addr = start_server(state.clone()).await;
    let config = config_for(addr);
    let manager = manager_for(&config, Grant::password("user", "wrong-pass"));

    manager.start(Arc::new(ChannelRegistry::new()), Arc::new(EventSink::new()));
    let result = manager.wait_ready().await;
    assert!(matches!(result, Err(StreamError::Authentication(_))));

    // The worker must not retry a credential-shaped first failure
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(state.token_attempts.load(Ordering::SeqCst), 1);
    manager.stop();
}

#[tokio::test]
async fn test_credential_rejection_fatal_even_in_resilient_mode() {
    let state = ServerState::new(vec![400]);
    let addr = start_server(state.clone()).await;
    let mut config = config_for(addr);
    config.resilient = true;
    let manager = manager_for(&config, Grant::password("user", "wrong-pass"));

    manager.start(Arc::new(ChannelRegistry::new()), Arc::new(EventSink::new()));
    let result = manager.wait_ready().await;
    assert!(matches!(result, Err(StreamError::Authentication(_))));

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(state.token_attempts.load(Ordering::SeqCst), 1);
    manager.stop();
}

#[tokio::test]
async fn test_non_resilient_transport_failure_is_terminal() {
    let state = ServerState::new(vec![503]);
    let addr = start_server(state.clone()).await;
    let config = config_for(addr);
    let manager = manager_for(&config, Grant::password("user", "pass"));

    manager.start(Arc::new(ChannelRegistry::new()), Arc::new(EventSink::new()));
    let result = manager.wait_ready().await;
    assert!(matches!(result, Err(StreamError::Authentication(_))));

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(state.token_attempts.load(Ordering::SeqCst), 1);
    manager.stop();
}

#[tokio::test]
async fn test_resilient_mode_retries_transport_failures() {
    let state = ServerState::new(vec![500, 502]);
    let addr = start_server(state.clone()).await;
    let mut config = config_for(addr);
    config.resilient = true;
    let manager = manager_for(&config, Grant::password("user", "pass"));

    manager.start(Arc::new(ChannelRegistry::new()), Arc::new(EventSink::new()));
    manager.wait_ready().await.unwrap();

    assert_eq!(state.token_attempts.load(Ordering::SeqCst), 3);
    assert_eq!(manager.current_token().as_deref(), Some("token-2"));
    manager.stop();
}

// ------------------------------------------------------------------------------------------------
// Session-level open
// ------------------------------------------------------------------------------------------------

#[tokio::test]
async fn test_resilient_session_reaches_open_after_transient_failures() {
    let state = ServerState::new(vec![500]);
    let addr = start_server(state.clone()).await;
    let mut config = config_for(addr);
    config.resilient = true;

    let session = Session::platform(config, Some(Grant::password("user", "pass")), None).unwrap();

    let state_log = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&state_log);
    let session = session.on_state(move |state, _msg| seen.lock().unwrap().push(state));

    let final_state = session.open().await.unwrap();
    assert_eq!(final_state, SessionState::Open);
    assert_eq!(state.token_attempts.load(Ordering::SeqCst), 2);
    assert_eq!(
        state_log.lock().unwrap().clone(),
        vec![SessionState::Pending, SessionState::Open]
    );

    session.close().await;
}

#[tokio::test]
async fn test_non_resilient_session_closes_on_first_auth_failure() {
    let state = ServerState::new(vec![401]);
    let addr = start_server(state.clone()).await;
    let config = config_for(addr);

    let session =
        Session::platform(config, Some(Grant::password("user", "wrong-pass")), None).unwrap();

    let result = session.open().await;
    assert!(matches!(result, Err(StreamError::Authentication(_))));
    assert_eq!(session.state(), SessionState::Closed);
    assert_eq!(state.token_attempts.load(Ordering::SeqCst), 1);
}
