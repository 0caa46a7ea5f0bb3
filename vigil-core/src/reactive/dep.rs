//! Dependency Sets
//!
//! A dependency set holds the effects subscribed to one (target, key) pair.
//! The registry owns dependency sets strongly. Links in both directions are
//! weak: a set only refers to its effects, and an effect only refers back
//! to the sets it belongs to. Whoever holds the [`Effect`] handle owns the
//! effect; once the last handle goes, the effect leaves every set and
//! nothing in the registry keeps the objects it captured alive.

use std::fmt;
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::Mutex;

use super::effect::{Effect, EffectId, WeakEffect};
use super::target::{Target, TargetId};
use crate::proxy::{PropKey, Value};

/// Key under which a dependency set is registered for a target.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DepKey {
    /// A named or indexed property of an object or array, including the
    /// array `length` and the `value` slot of refs.
    Prop(PropKey),
    /// A member of a keyed collection, keyed by its raw key.
    Entry(Value),
    /// The synthetic structural key: some member was added or removed, or
    /// the members were enumerated.
    Iterate,
}

impl DepKey {
    /// The array `length` key.
    pub fn length() -> Self {
        Self::Prop(PropKey::length())
    }

    /// The `value` slot of refs and computed values.
    pub fn value() -> Self {
        Self::Prop(PropKey::from("value"))
    }

    pub(crate) fn is_length(&self) -> bool {
        matches!(self, Self::Prop(key) if key.is_length())
    }

    pub(crate) fn as_index(&self) -> Option<usize> {
        match self {
            Self::Prop(key) => key.as_index(),
            _ => None,
        }
    }
}

impl fmt::Display for DepKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Prop(key) => write!(f, "{key}"),
            Self::Entry(value) => write!(f, "entry({value:?})"),
            Self::Iterate => f.write_str("<iterate>"),
        }
    }
}

/// Kind of read being recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackOp {
    Get,
    Has,
    Iterate,
}

/// Kind of mutation being announced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOp {
    Set,
    Add,
    Delete,
    Clear,
}

/// Whether a debugger event reports a subscription or a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebuggerEventKind {
    Track(TrackOp),
    Trigger(TriggerOp),
}

/// Payload handed to an effect's `on_track` / `on_trigger` hooks.
#[derive(Debug, Clone)]
pub struct DebuggerEvent {
    pub effect: EffectId,
    pub target: Target,
    pub kind: DebuggerEventKind,
    pub key: Option<DepKey>,
    pub new_value: Option<Value>,
    pub old_value: Option<Value>,
}

pub(crate) struct DepInner {
    target: TargetId,
    key: DepKey,
    effects: Mutex<IndexMap<EffectId, WeakEffect>>,
}

/// The set of effects subscribed to one (target, key) pair.
#[derive(Clone)]
pub(crate) struct Dep(Arc<DepInner>);

/// Weak back-link from an effect to a dependency set.
pub(crate) type WeakDep = Weak<DepInner>;

impl Dep {
    pub fn new(target: TargetId, key: DepKey) -> Self {
        Self(Arc::new(DepInner {
            target,
            key,
            effects: Mutex::new(IndexMap::new()),
        }))
    }

    pub fn upgrade(weak: &WeakDep) -> Option<Self> {
        weak.upgrade().map(Self)
    }

    pub fn downgrade(&self) -> WeakDep {
        Arc::downgrade(&self.0)
    }

    pub fn target(&self) -> TargetId {
        self.0.target
    }

    pub fn key(&self) -> &DepKey {
        &self.0.key
    }

    pub fn ptr_eq(&self, other: &Dep) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Add an effect. Returns `false` if it was already a member.
    pub fn subscribe(&self, effect: &Effect) -> bool {
        let mut effects = self.0.effects.lock();
        if effects.contains_key(&effect.id()) {
            return false;
        }
        effects.insert(effect.id(), effect.downgrade());
        true
    }

    /// Remove an effect. Returns `false` if it was not a member.
    pub fn unsubscribe(&self, effect_id: EffectId) -> bool {
        self.0.effects.lock().shift_remove(&effect_id).is_some()
    }

    /// The live members in subscription order. Members whose last handle
    /// is gone are dropped from the set.
    pub fn snapshot(&self) -> Vec<Effect> {
        let mut effects = self.0.effects.lock();
        effects.retain(|_, effect| effect.is_alive());
        effects.values().filter_map(WeakEffect::upgrade).collect()
    }

    pub fn contains(&self, effect_id: EffectId) -> bool {
        self.0
            .effects
            .lock()
            .get(&effect_id)
            .is_some_and(WeakEffect::is_alive)
    }

    /// Number of live members.
    pub fn len(&self) -> usize {
        self.0
            .effects
            .lock()
            .values()
            .filter(|effect| effect.is_alive())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
