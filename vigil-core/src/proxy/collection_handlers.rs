//! Collection Handlers
//!
//! Instrumented methods for proxies around Map, Set, WeakMap and WeakSet.
//!
//! Keys and values are unwrapped to their raw objects before they reach
//! the collection, so a member added through a proxy and looked up through
//! its raw object (or the other way round) is the same member. Values read
//! back out are wrapped with the proxy's flavor.
//!
//! Every mutation happens before its trigger: observers that run during
//! the trigger see the collection in its new state.

use std::fmt;
use std::vec;

use tracing::warn;

use super::value::Value;
use super::wrap::{to_raw, Proxy};
use crate::reactive::{track, trigger, DepKey, TrackOp, TriggerOp};

impl Proxy {
    pub(crate) fn get_entry(&self, key: &Value) -> Value {
        let key = to_raw(key);
        let value = self.raw().entry_get(&key);
        track(self.target(), TrackOp::Get, DepKey::Entry(key));
        self.wrap_nested(value)
    }

    pub(crate) fn has_entry(&self, key: &Value) -> bool {
        let key = to_raw(key);
        let result = self.raw().entry_has(&key);
        track(self.target(), TrackOp::Has, DepKey::Entry(key));
        result
    }

    /// Member count. Weak collections have no size and report zero.
    pub(crate) fn size(&self) -> usize {
        let Some(size) = self.raw().size() else {
            return 0;
        };
        track(self.target(), TrackOp::Iterate, DepKey::Iterate);
        size
    }

    pub(crate) fn add(&self, value: Value) -> Value {
        if self.rejects_writes() {
            warn!(target_id = %self.raw().id(), op = "add", "add on readonly collection ignored");
            return self.receiver();
        }

        let value = to_raw(&value);
        if self.raw().entry_add(value.clone()) {
            trigger(
                self.target(),
                TriggerOp::Add,
                Some(DepKey::Entry(value.clone())),
                Some(&value),
                None,
            );
        }
        self.receiver()
    }

    pub(crate) fn insert(&self, key: Value, value: Value) -> Value {
        if self.rejects_writes() {
            warn!(target_id = %self.raw().id(), op = "set", "set on readonly collection ignored");
            return self.receiver();
        }

        let key = to_raw(&key);
        let value = to_raw(&value);
        let Some(write) = self.raw().entry_insert(key.clone(), value.clone()) else {
            return self.receiver();
        };

        if !write.had_key {
            trigger(
                self.target(),
                TriggerOp::Add,
                Some(DepKey::Entry(key)),
                Some(&value),
                None,
            );
        } else if Value::has_changed(&value, &write.old_value) {
            trigger(
                self.target(),
                TriggerOp::Set,
                Some(DepKey::Entry(key)),
                Some(&value),
                Some(&write.old_value),
            );
        }
        self.receiver()
    }

    pub(crate) fn remove(&self, key: &Value) -> bool {
        if self.rejects_writes() {
            warn!(target_id = %self.raw().id(), op = "delete", "delete on readonly collection ignored");
            return false;
        }

        let key = to_raw(key);
        match self.raw().entry_remove(&key) {
            Some(old_value) => {
                trigger(
                    self.target(),
                    TriggerOp::Delete,
                    Some(DepKey::Entry(key)),
                    None,
                    Some(&old_value),
                );
                true
            }
            None => false,
        }
    }

    pub(crate) fn clear(&self) -> Value {
        if self.rejects_writes() {
            warn!(target_id = %self.raw().id(), op = "clear", "clear on readonly collection ignored");
            return self.receiver();
        }

        if self.raw().entry_clear() > 0 {
            trigger(self.target(), TriggerOp::Clear, None, None, None);
        }
        Value::Undefined
    }

    /// Call `callback(value, key, proxy)` for each member, with keys and
    /// values wrapped.
    pub(crate) fn for_each(&self, mut callback: impl FnMut(Value, Value, &Value)) {
        let receiver = self.receiver();
        for (key, value) in self.tracked_entries() {
            callback(self.wrap_nested(value), self.wrap_nested(key), &receiver);
        }
    }

    /// A wrapping iterator over a snapshot of the members.
    pub(crate) fn iteration<T>(&self, project: fn((Value, Value)) -> T) -> CollectionIter<T> {
        CollectionIter {
            pairs: self.tracked_entries().into_iter(),
            proxy: Some(self.clone()),
            project,
        }
    }

    fn tracked_entries(&self) -> Vec<(Value, Value)> {
        if self.kind().is_weak() {
            return Vec::new();
        }
        track(self.target(), TrackOp::Iterate, DepKey::Iterate);
        self.raw().entries()
    }

    fn receiver(&self) -> Value {
        Value::Proxy(self.clone())
    }
}

/// Iterator returned by `keys`, `values`, `entries` and `iter` on
/// collections.
///
/// Iterates a snapshot taken when it was created. Through a proxy, each
/// key and value is wrapped as it is yielded.
pub struct CollectionIter<T> {
    pairs: vec::IntoIter<(Value, Value)>,
    proxy: Option<Proxy>,
    project: fn((Value, Value)) -> T,
}

impl<T> CollectionIter<T> {
    /// Iterate raw pairs as they are.
    pub(crate) fn unwrapped(pairs: Vec<(Value, Value)>, project: fn((Value, Value)) -> T) -> Self {
        Self {
            pairs: pairs.into_iter(),
            proxy: None,
            project,
        }
    }
}

impl<T> Iterator for CollectionIter<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        let (key, value) = self.pairs.next()?;
        let pair = match &self.proxy {
            Some(proxy) => (proxy.wrap_nested(key), proxy.wrap_nested(value)),
            None => (key, value),
        };
        Some((self.project)(pair))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.pairs.size_hint()
    }
}

impl<T> ExactSizeIterator for CollectionIter<T> {}

impl<T> fmt::Debug for CollectionIter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectionIter")
            .field("remaining", &self.pairs.len())
            .field("wrapping", &self.proxy.is_some())
            .finish()
    }
}
