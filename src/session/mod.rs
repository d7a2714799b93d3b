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

//! Session façade, variants and registries.

pub mod backend;
pub mod fixed_host;
pub mod hybrid;
pub mod local_proxy;
pub mod platform;
pub mod registry;
#[allow(clippy::module_inception)]
pub mod session;

use std::sync::{Arc, Mutex};

pub use registry::{ChannelRegistry, StreamListener, SubscriptionRegistry};
pub use session::Session;

use crate::common::enums::{EventCode, SessionState};

/// Callback invoked exactly once per session state transition.
pub type StateCallback = Arc<dyn Fn(SessionState, &str) + Send + Sync>;

/// Callback invoked for every session and stream event.
pub type EventCallback = Arc<dyn Fn(EventCode, &str) + Send + Sync>;

/// Shared sink delivering state transitions and events to caller callbacks.
///
/// The sink is handed to every background worker so stream connections and the
/// token manager report through the same callbacks as the façade itself.
#[derive(Default)]
pub struct EventSink {
    on_state: Mutex<Option<StateCallback>>,
    on_event: Mutex<Option<EventCallback>>,
    last_event: Mutex<Option<(EventCode, String)>>,
}

impl std::fmt::Debug for EventSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSink")
            .field("last_event", &self.last_event())
            .finish_non_exhaustive()
    }
}

impl EventSink {
    /// Creates a sink with no callbacks registered.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn set_on_state(&self, callback: StateCallback) {
        *self.on_state.lock().expect("event sink lock poisoned") = Some(callback);
    }

    pub(crate) fn set_on_event(&self, callback: EventCallback) {
        *self.on_event.lock().expect("event sink lock poisoned") = Some(callback);
    }

    /// Reports a session state transition.
    pub(crate) fn state(&self, state: SessionState, message: &str) {
        tracing::info!("Session state -> {state}: {message}");
        let callback = self
            .on_state
            .lock()
            .expect("event sink lock poisoned")
            .clone();
        if let Some(callback) = callback {
            callback(state, message);
        }
    }

    /// Reports an event, recording it as the last observed event.
    pub(crate) fn event(&self, code: EventCode, message: &str) {
        tracing::debug!("Event {code}: {message}");
        *self.last_event.lock().expect("event sink lock poisoned") =
            Some((code, message.to_string()));

        let callback = self
            .on_event
            .lock()
            .expect("event sink lock poisoned")
            .clone();
        if let Some(callback) = callback {
            callback(code, message);
        }
    }

    /// Returns the last event reported through this sink.
    #[must_use]
    pub fn last_event(&self) -> Option<(EventCode, String)> {
        self.last_event
            .lock()
            .expect("event sink lock poisoned")
            .clone()
    }
}
