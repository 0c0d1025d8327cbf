// SPDX-FileCopyrightText: 2025 Contributors to the Frame Receiver project.
// SPDX-License-Identifier: Apache-2.0

//! Process-wide lookup of producer handles by key.
//!
//! A frame source that only knows a receiver's id can find the surface to
//! write into here.

use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard, PoisonError},
};

use tracing::debug;
use uuid::Uuid;

/// Thread-safe map from a key to a producer handle.
pub struct ReceiverRegistry<P> {
    producers: Mutex<HashMap<Uuid, P>>,
}

impl<P> Default for ReceiverRegistry<P> {
    fn default() -> Self {
        Self {
            producers: Mutex::new(HashMap::new()),
        }
    }
}

impl<P: Clone> ReceiverRegistry<P> {
    pub fn new() -> Self {
        Self::default()
    }

    fn producers(&self) -> MutexGuard<'_, HashMap<Uuid, P>> {
        self.producers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Stores `producer` under a fresh key and returns the key.
    pub fn register(&self, producer: P) -> Uuid {
        let mut producers = self.producers();
        let mut key = Uuid::new_v4();
        while producers.contains_key(&key) {
            key = Uuid::new_v4();
        }
        producers.insert(key, producer);
        debug!(%key, "Registered producer");
        key
    }

    /// Stores `producer` under `key`, returning the handle it replaced.
    pub fn insert(&self, key: Uuid, producer: P) -> Option<P> {
        debug!(%key, "Registered producer");
        self.producers().insert(key, producer)
    }

    /// A clone of the producer registered under `key`.
    pub fn producer(&self, key: &Uuid) -> Option<P> {
        self.producers().get(key).cloned()
    }

    pub fn remove(&self, key: &Uuid) -> Option<P> {
        self.producers().remove(key)
    }

    pub fn len(&self) -> usize {
        self.producers().len()
    }

    pub fn is_empty(&self) -> bool {
        self.producers().is_empty()
    }
}
