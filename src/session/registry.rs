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

//! Channel and subscription registries owned by a session.
//!
//! Both registries guard their maps with a single lock each, held only for the
//! duration of the map mutation. Token rotation iterates the channel registry
//! under its lock, so connection creation/removal can never interleave with a
//! rotation and a connection is never missed nor double-notified.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, Weak,
    },
};

use serde_json::Value;
use ustr::Ustr;

use crate::{
    common::credential::AccessToken, error::StreamError, websocket::StreamConnection,
};

/// Subscriber callbacks for one stream subscription.
///
/// Listeners are stored weakly: the registry relates subscriptions to
/// listeners but never owns them, so dropping the subscriber object is enough
/// to end delivery.
pub trait StreamListener: Send + Sync {
    /// Called with every non-control message arriving on the channel.
    fn on_message(&self, _payload: &Value) {}

    /// Returns the subscribe request for this subscription.
    ///
    /// Sent when the subscription is registered, and re-sent whenever the
    /// owning channel reconnects so reconnection stays transparent.
    fn subscribe_request(&self) -> Option<Value> {
        None
    }
}

/// Maps each channel name to its single live stream connection.
#[derive(Debug, Default)]
pub struct ChannelRegistry {
    inner: Mutex<HashMap<Ustr, Arc<StreamConnection>>>,
}

impl ChannelRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the live connection for `channel`, when one exists.
    #[must_use]
    pub fn live(&self, channel: Ustr) -> Option<Arc<StreamConnection>> {
        let inner = self.inner.lock().expect("channel registry lock poisoned");
        inner
            .get(&channel)
            .filter(|conn| conn.state().is_live())
            .cloned()
    }

    /// Inserts `conn` unless a live connection for the same channel appeared
    /// meanwhile; returns the winning connection and whether `conn` was the
    /// one inserted.
    ///
    /// A dead entry (closed or terminally failed) is replaced.
    pub fn insert_or_live(&self, conn: Arc<StreamConnection>) -> (Arc<StreamConnection>, bool) {
        let mut inner = self.inner.lock().expect("channel registry lock poisoned");
        let channel = conn.channel();

        if let Some(existing) = inner.get(&channel) {
            if existing.state().is_live() {
                return (Arc::clone(existing), false);
            }
        }

        inner.insert(channel, Arc::clone(&conn));
        (conn, true)
    }

    /// Removes and returns the connection for `channel`.
    pub fn remove(&self, channel: Ustr) -> Option<Arc<StreamConnection>> {
        self.inner
            .lock()
            .expect("channel registry lock poisoned")
            .remove(&channel)
    }

    /// Removes and returns every registered connection.
    pub fn drain(&self) -> Vec<Arc<StreamConnection>> {
        self.inner
            .lock()
            .expect("channel registry lock poisoned")
            .drain()
            .map(|(_, conn)| conn)
            .collect()
    }

    /// Returns a snapshot of the registered connections.
    #[must_use]
    pub fn connections(&self) -> Vec<Arc<StreamConnection>> {
        self.inner
            .lock()
            .expect("channel registry lock poisoned")
            .values()
            .cloned()
            .collect()
    }

    /// Pushes a rotated token to every live connection.
    ///
    /// Runs entirely under the registry lock; `refresh_token` only queues a
    /// command, so the lock is never held across an await.
    pub fn rotate_token(&self, token: &AccessToken) {
        let inner = self.inner.lock().expect("channel registry lock poisoned");
        tracing::debug!(
            "Rotating token (scope {}) across {} connection(s)",
            token.scope,
            inner.len()
        );
        for conn in inner.values() {
            conn.refresh_token();
        }
    }
}

struct SubscriptionEntry {
    channel: Ustr,
    listener: Weak<dyn StreamListener>,
}

/// Maps subscription ids to listeners, independent of physical connections.
#[derive(Default)]
pub struct SubscriptionRegistry {
    next_id: AtomicU64,
    inner: Mutex<HashMap<u64, SubscriptionEntry>>,
}

impl std::fmt::Debug for SubscriptionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionRegistry")
            .field("count", &self.count())
            .finish_non_exhaustive()
    }
}

impl SubscriptionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `listener` on `channel` and returns the subscription id.
    ///
    /// Ids are strictly increasing and never reused within a session, even
    /// after unsubscription.
    ///
    /// # Errors
    ///
    /// Returns a duplicate-subscription error when the exact same listener
    /// object is already registered on the channel.
    pub fn register(
        &self,
        channel: Ustr,
        listener: &Arc<dyn StreamListener>,
    ) -> Result<u64, StreamError> {
        let mut inner = self.inner.lock().expect("subscription registry lock poisoned");

        let new = Arc::downgrade(listener);
        let duplicate = inner.values().any(|entry| {
            entry.channel == channel && Weak::ptr_eq(&entry.listener, &new)
        });
        if duplicate {
            return Err(StreamError::DuplicateSubscription(channel.to_string()));
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        inner.insert(
            id,
            SubscriptionEntry {
                channel,
                listener: new,
            },
        );

        tracing::debug!("Registered subscription {id} on channel {channel}");
        Ok(id)
    }

    /// Removes the subscription with the given id.
    ///
    /// # Errors
    ///
    /// Returns an unknown-subscription error for ids that were never issued or
    /// were already unregistered, so double-unregistration bugs surface.
    pub fn unregister(&self, id: u64) -> Result<(), StreamError> {
        let mut inner = self.inner.lock().expect("subscription registry lock poisoned");
        match inner.remove(&id) {
            Some(entry) => {
                tracing::debug!("Unregistered subscription {id} from channel {}", entry.channel);
                Ok(())
            }
            None => Err(StreamError::UnknownSubscription(id)),
        }
    }

    /// Returns the number of registered subscriptions.
    #[must_use]
    pub fn count(&self) -> usize {
        self.inner
            .lock()
            .expect("subscription registry lock poisoned")
            .len()
    }

    /// Returns the subscribe requests of every live subscription on `channel`,
    /// pruning entries whose listeners have been dropped.
    pub fn subscribe_payloads(&self, channel: Ustr) -> Vec<Value> {
        let mut inner = self.inner.lock().expect("subscription registry lock poisoned");
        inner.retain(|_, entry| entry.listener.strong_count() > 0);

        inner
            .values()
            .filter(|entry| entry.channel == channel)
            .filter_map(|entry| entry.listener.upgrade())
            .filter_map(|listener| listener.subscribe_request())
            .collect()
    }

    /// Fans a message out to every listener bound to `channel`.
    pub fn dispatch(&self, channel: Ustr, payload: &Value) {
        let listeners: Vec<Arc<dyn StreamListener>> = {
            let inner = self.inner.lock().expect("subscription registry lock poisoned");
            inner
                .values()
                .filter(|entry| entry.channel == channel)
                .filter_map(|entry| entry.listener.upgrade())
                .collect()
        };

        for listener in listeners {
            listener.on_message(payload);
        }
    }
}
