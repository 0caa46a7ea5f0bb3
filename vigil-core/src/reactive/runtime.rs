//! Reactive Runtime
//!
//! The runtime owns the property registry: target → key → dependency set.
//! It connects reads (`track`) to the running effect and writes (`trigger`)
//! to the effects that read the written key.
//!
//! # How It Works
//!
//! 1. When a property is read inside a running effect, [`track`] looks up
//!    (creating if absent) the dependency set for that target and key and
//!    links it with the effect in both directions.
//!
//! 2. When a property is written, [`trigger`] selects the affected
//!    dependency sets for the kind of mutation, splits their effects into
//!    computed and ordinary buckets, and runs the computed bucket first.
//!
//! 3. Each selected effect goes to its scheduler if it has one, otherwise
//!    it re-runs synchronously.
//!
//! # Thread Safety
//!
//! The registry is process-wide and keyed by target identity. Lookups never
//! hold a registry lock while user code runs: dependency sets are cloned out
//! first, then effects are executed.

use std::sync::OnceLock;

use dashmap::DashMap;
use indexmap::IndexMap;
use tracing::trace;

use super::context::ReactiveContext;
use super::dep::{DebuggerEvent, DebuggerEventKind, Dep, DepKey, TrackOp, TriggerOp};
use super::effect::{Effect, EffectId};
use super::target::{ObservableKind, Target, TargetId};
use crate::proxy::Value;

type KeyToDep = IndexMap<DepKey, Dep>;

static TARGET_MAP: OnceLock<DashMap<TargetId, KeyToDep>> = OnceLock::new();

fn target_map() -> &'static DashMap<TargetId, KeyToDep> {
    TARGET_MAP.get_or_init(DashMap::new)
}

/// The global reactive runtime.
///
/// A namespace for registry maintenance and inspection; the hot paths are
/// the free functions [`track`] and [`trigger`].
pub struct Runtime;

impl Runtime {
    /// Drop every dependency set registered for a target.
    ///
    /// Called when the target itself is destroyed.
    pub(crate) fn evict(target_id: TargetId) {
        // Bind the removed entry so the shard lock is released before the
        // dependency sets (and possibly their effects) are dropped.
        let removed = target_map().remove(&target_id);
        drop(removed);
    }

    /// Remove `dep` from the registry if it has no members left, and the
    /// target's entry with it once that is empty.
    pub(crate) fn prune(dep: &Dep) {
        let removed = {
            let Some(mut deps) = target_map().get_mut(&dep.target()) else {
                return;
            };
            let stale = deps
                .get(dep.key())
                .is_some_and(|current| current.ptr_eq(dep) && current.is_empty());
            if stale {
                deps.shift_remove_entry(dep.key())
            } else {
                None
            }
        };
        target_map().remove_if(&dep.target(), |_, deps| deps.is_empty());
        // A collection key may hold the last reference to an object whose
        // drop re-enters the registry; release it outside the shard lock.
        drop(removed);
    }

    /// Whether any dependency set exists for the target.
    pub fn is_tracked(target_id: TargetId) -> bool {
        target_map().contains_key(&target_id)
    }

    /// Number of effects subscribed to one key of a target.
    pub fn subscriber_count(target_id: TargetId, key: &DepKey) -> usize {
        let dep = target_map()
            .get(&target_id)
            .and_then(|deps| deps.get(key).cloned());
        dep.map(|dep| dep.len()).unwrap_or(0)
    }
}

/// Record that the running effect read `key` of `target`.
///
/// No-op when tracking is paused or no effect is running, so reads from
/// ordinary code never allocate registry entries.
pub fn track(target: Target, op: TrackOp, key: DepKey) {
    if !ReactiveContext::should_track() {
        return;
    }
    let Some(effect) = ReactiveContext::active_effect() else {
        return;
    };

    // Subscribe under the shard lock so `prune` never removes a set that
    // is gaining a member.
    let (dep, subscribed) = {
        let mut deps = target_map().entry(target.id()).or_default();
        let dep = deps
            .entry(key.clone())
            .or_insert_with(|| Dep::new(target.id(), key.clone()))
            .clone();
        let subscribed = dep.subscribe(&effect);
        (dep, subscribed)
    };

    if subscribed {
        effect.record_dependency(&dep);
        trace!(target = %target.id(), key = %key, effect = %effect.id(), ?op, "track");

        if let Some(on_track) = &effect.options().on_track {
            on_track(&DebuggerEvent {
                effect: effect.id(),
                target,
                kind: DebuggerEventKind::Track(op),
                key: Some(key),
                new_value: None,
                old_value: None,
            });
        }
    }
}

/// Notify the effects that depend on `key` of `target`.
///
/// `new_value` carries the new array length when `key` is the array
/// `length`; both values are forwarded to `on_trigger` hooks.
pub fn trigger(
    target: Target,
    op: TriggerOp,
    key: Option<DepKey>,
    new_value: Option<&Value>,
    old_value: Option<&Value>,
) {
    let deps = {
        let Some(key_to_dep) = target_map().get(&target.id()) else {
            return;
        };
        select_deps(&key_to_dep, target, op, key.as_ref(), new_value)
    };

    let active = ReactiveContext::active_effect().map(|effect| effect.id());
    let mut computed_runners: IndexMap<EffectId, Effect> = IndexMap::new();
    let mut effects: IndexMap<EffectId, Effect> = IndexMap::new();

    for dep in &deps {
        for effect in dep.snapshot() {
            if Some(effect.id()) == active {
                continue;
            }
            if effect.options().computed {
                computed_runners.entry(effect.id()).or_insert(effect);
            } else {
                effects.entry(effect.id()).or_insert(effect);
            }
        }
    }

    trace!(
        target = %target.id(),
        key = key.as_ref().map(tracing::field::display),
        ?op,
        computed = computed_runners.len(),
        effects = effects.len(),
        "trigger"
    );

    let schedule = |effect: &Effect| {
        if let Some(on_trigger) = &effect.options().on_trigger {
            on_trigger(&DebuggerEvent {
                effect: effect.id(),
                target,
                kind: DebuggerEventKind::Trigger(op),
                key: key.clone(),
                new_value: new_value.cloned(),
                old_value: old_value.cloned(),
            });
        }
        match &effect.options().scheduler {
            Some(scheduler) => scheduler(effect),
            None => {
                effect.run();
            }
        }
    };

    // Computed effects first, so ordinary effects never read a stale cache.
    computed_runners.values().for_each(schedule);
    effects.values().for_each(schedule);
}

/// Pick the dependency sets a mutation affects.
fn select_deps(
    key_to_dep: &KeyToDep,
    target: Target,
    op: TriggerOp,
    key: Option<&DepKey>,
    new_value: Option<&Value>,
) -> Vec<Dep> {
    let is_array = target.kind() == ObservableKind::Array;

    if op == TriggerOp::Clear {
        return key_to_dep.values().cloned().collect();
    }

    if is_array && key.is_some_and(DepKey::is_length) {
        let new_length = new_value
            .and_then(Value::as_number)
            .map(|n| n as usize)
            .unwrap_or(0);
        return key_to_dep
            .iter()
            .filter(|(k, _)| k.is_length() || k.as_index().is_some_and(|i| i >= new_length))
            .map(|(_, dep)| dep.clone())
            .collect();
    }

    let mut deps = Vec::new();
    if let Some(dep) = key.and_then(|k| key_to_dep.get(k)) {
        deps.push(dep.clone());
    }

    let shape_changed = matches!(op, TriggerOp::Add | TriggerOp::Delete)
        || (op == TriggerOp::Set && target.kind() == ObservableKind::Map);
    if shape_changed {
        let iteration_key = if is_array {
            DepKey::length()
        } else {
            DepKey::Iterate
        };
        if let Some(dep) = key_to_dep.get(&iteration_key) {
            deps.push(dep.clone());
        }
    }

    deps
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::PropKey;
    use crate::reactive::{effect, EffectOptions};
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicI32, Ordering};
    use std::sync::Arc;

    fn counting_effect(target: Target, key: DepKey) -> (Effect, Arc<AtomicI32>) {
        let runs = Arc::new(AtomicI32::new(0));
        let runs_clone = runs.clone();
        let e = effect(
            move || {
                runs_clone.fetch_add(1, Ordering::SeqCst);
                track(target, TrackOp::Get, key.clone());
            },
            EffectOptions::default(),
        );
        (e, runs)
    }

    #[test]
    fn track_outside_effect_allocates_nothing() {
        let target = Target::new(ObservableKind::Object);
        track(target, TrackOp::Get, DepKey::value());
        assert!(!Runtime::is_tracked(target.id()));
    }

    #[test]
    fn trigger_untracked_target_is_noop() {
        let target = Target::new(ObservableKind::Object);
        trigger(target, TriggerOp::Set, Some(DepKey::value()), None, None);
        assert!(!Runtime::is_tracked(target.id()));
    }

    #[test]
    fn runtime_notifies_subscribers() {
        let target = Target::new(ObservableKind::Object);
        let (_e, runs) = counting_effect(target, DepKey::value());

        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(Runtime::subscriber_count(target.id(), &DepKey::value()), 1);

        trigger(target, TriggerOp::Set, Some(DepKey::value()), None, None);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn add_notifies_iterate_key() {
        let target = Target::new(ObservableKind::Object);
        let (_e, runs) = counting_effect(target, DepKey::Iterate);

        let key = DepKey::Prop(PropKey::from("fresh"));
        trigger(target, TriggerOp::Set, Some(key.clone()), None, None);
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        trigger(target, TriggerOp::Add, Some(key), None, None);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn map_set_notifies_iterate_key() {
        let target = Target::new(ObservableKind::Map);
        let (_e, runs) = counting_effect(target, DepKey::Iterate);

        trigger(
            target,
            TriggerOp::Set,
            Some(DepKey::Entry(Value::from("k"))),
            None,
            None,
        );
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn array_add_notifies_length() {
        let target = Target::new(ObservableKind::Array);
        let (_e, runs) = counting_effect(target, DepKey::length());

        trigger(
            target,
            TriggerOp::Add,
            Some(DepKey::Prop(PropKey::from(4usize))),
            None,
            None,
        );
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn length_write_notifies_truncated_indices() {
        let target = Target::new(ObservableKind::Array);
        let (_kept, kept_runs) = counting_effect(target, DepKey::Prop(PropKey::from(0usize)));
        let (_cut, cut_runs) = counting_effect(target, DepKey::Prop(PropKey::from(2usize)));
        let (_len, len_runs) = counting_effect(target, DepKey::length());

        trigger(
            target,
            TriggerOp::Set,
            Some(DepKey::length()),
            Some(&Value::from(1)),
            Some(&Value::from(3)),
        );

        assert_eq!(kept_runs.load(Ordering::SeqCst), 1);
        assert_eq!(cut_runs.load(Ordering::SeqCst), 2);
        assert_eq!(len_runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn clear_notifies_every_key() {
        let target = Target::new(ObservableKind::Set);
        let (_a, a_runs) = counting_effect(target, DepKey::Entry(Value::from(1)));
        let (_b, b_runs) = counting_effect(target, DepKey::Iterate);

        trigger(target, TriggerOp::Clear, None, None, None);

        assert_eq!(a_runs.load(Ordering::SeqCst), 2);
        assert_eq!(b_runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn computed_bucket_runs_first() {
        let target = Target::new(ObservableKind::Object);
        let log = Arc::new(Mutex::new(Vec::new()));

        let log_clone = log.clone();
        let _ordinary = effect(
            move || {
                track(target, TrackOp::Get, DepKey::value());
                log_clone.lock().push("ordinary");
            },
            EffectOptions::default(),
        );

        let log_clone = log.clone();
        let _computed = effect(
            move || {
                track(target, TrackOp::Get, DepKey::value());
                log_clone.lock().push("computed");
            },
            EffectOptions::default().computed(),
        );

        log.lock().clear();
        trigger(target, TriggerOp::Set, Some(DepKey::value()), None, None);

        assert_eq!(*log.lock(), vec!["computed", "ordinary"]);
    }

    #[test]
    fn evict_drops_registry_entry() {
        let target = Target::new(ObservableKind::Object);
        let (e, _runs) = counting_effect(target, DepKey::value());
        assert!(Runtime::is_tracked(target.id()));

        Runtime::evict(target.id());
        assert!(!Runtime::is_tracked(target.id()));
        assert_eq!(e.dependency_count(), 0);
    }
}
