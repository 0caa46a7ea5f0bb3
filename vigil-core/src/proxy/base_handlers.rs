//! Object and Array Handlers
//!
//! Trap semantics for proxies around plain objects and arrays:
//!
//! - reads track the key and wrap nested objects on the way out, lazily,
//!   so cyclic graphs are never walked;
//! - writes store raw values and trigger `Add` for new keys or `Set` for
//!   changed ones;
//! - `has` and `own_keys` track existence and shape;
//! - readonly flavors refuse writes while the global lock is engaged, and
//!   report success anyway.

use tracing::warn;

use super::object::ArraySearch;
use super::value::{PropKey, Value};
use super::wrap::{to_raw, Proxy};
use crate::reactive::{is_locked, track, trigger, DepKey, ObservableKind, TrackOp, TriggerOp};

impl Proxy {
    pub(crate) fn get(&self, key: &PropKey) -> Value {
        let value = self.raw().get(key);

        if key.is_well_known_symbol() {
            return value;
        }

        if self.is_shallow() {
            track(self.target(), TrackOp::Get, DepKey::Prop(key.clone()));
            return value;
        }

        if let Value::Ref(r) = &value {
            if self.kind() != ObservableKind::Array {
                return r.value();
            }
        }

        track(self.target(), TrackOp::Get, DepKey::Prop(key.clone()));
        self.wrap_nested(value)
    }

    pub(crate) fn set(&self, key: PropKey, value: Value) -> bool {
        if self.rejects_writes() {
            warn!(target_id = %self.raw().id(), key = %key, op = "set", "write to readonly proxy ignored");
            return true;
        }

        let raw = self.raw();
        let value = to_raw(&value);

        if self.kind() != ObservableKind::Array && !matches!(value, Value::Ref(_)) {
            if let Value::Ref(existing) = raw.get(&key) {
                existing.set_value(value);
                return true;
            }
        }

        let Some(write) = raw.set(key.clone(), value.clone()) else {
            return false;
        };

        if !write.had_key {
            trigger(
                self.target(),
                TriggerOp::Add,
                Some(DepKey::Prop(key)),
                Some(&value),
                None,
            );
        } else if Value::has_changed(&value, &write.old_value) {
            trigger(
                self.target(),
                TriggerOp::Set,
                Some(DepKey::Prop(key)),
                Some(&value),
                Some(&write.old_value),
            );
        }
        true
    }

    pub(crate) fn delete(&self, key: &PropKey) -> bool {
        if self.rejects_writes() {
            warn!(target_id = %self.raw().id(), key = %key, op = "delete", "delete on readonly proxy ignored");
            return true;
        }

        match self.raw().delete(key) {
            Some(old_value) => {
                trigger(
                    self.target(),
                    TriggerOp::Delete,
                    Some(DepKey::Prop(key.clone())),
                    None,
                    Some(&old_value),
                );
                true
            }
            // Deleting a missing key succeeds; `length` cannot be deleted.
            None => !self.raw().contains_key(key),
        }
    }

    pub(crate) fn has(&self, key: &PropKey) -> bool {
        let result = self.raw().contains_key(key);
        if !key.is_well_known_symbol() {
            track(self.target(), TrackOp::Has, DepKey::Prop(key.clone()));
        }
        result
    }

    pub(crate) fn own_keys(&self) -> Vec<PropKey> {
        let key = if self.kind() == ObservableKind::Array {
            DepKey::length()
        } else {
            DepKey::Iterate
        };
        track(self.target(), TrackOp::Iterate, key);
        self.raw().own_keys()
    }

    /// Array search with every element and the length tracked, and proxy
    /// arguments compared by their raw objects.
    pub(crate) fn search(&self, needle: &Value, search: ArraySearch) -> Option<usize> {
        let raw = self.raw();
        let len = raw.array_len()?;

        let target = self.target();
        track(target, TrackOp::Get, DepKey::length());
        for index in 0..len {
            track(target, TrackOp::Get, DepKey::Prop(PropKey::Index(index)));
        }

        raw.find(&to_raw(needle), search)
    }

    pub(crate) fn rejects_writes(&self) -> bool {
        self.is_readonly() && is_locked()
    }
}

#[cfg(test)]
mod tests {
    use crate::proxy::{reactive, readonly, shallow_reactive, shallow_readonly, Symbol, Value};
    use crate::reactive::{effect, lock, new_ref, serial, unlock, Effect, EffectOptions};
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicI32, Ordering};
    use std::sync::Arc;

    fn watch(read: impl Fn() -> Value + Send + Sync + 'static) -> (Effect, Arc<AtomicI32>) {
        let runs = Arc::new(AtomicI32::new(0));
        let runs_clone = runs.clone();
        let e = effect(
            move || {
                read();
                runs_clone.fetch_add(1, Ordering::SeqCst);
            },
            EffectOptions::default(),
        );
        (e, runs)
    }

    #[test]
    fn effect_reruns_on_property_write() {
        let state = reactive(Value::new_object([("a", 1)]));
        let seen = Arc::new(Mutex::new(Value::Undefined));

        let state_clone = state.clone();
        let seen_clone = seen.clone();
        let _e = effect(
            move || *seen_clone.lock() = state_clone.get("a"),
            EffectOptions::default(),
        );

        state.set("a", 2);
        assert_eq!(seen.lock().as_number(), Some(2.0));
    }

    #[test]
    fn adding_a_key_notifies_enumeration() {
        let state = reactive(Value::new_object([("a", 1)]));
        let state_clone = state.clone();
        let (_e, runs) = watch(move || Value::from(state_clone.own_keys().len()));

        state.set("a", 5);
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        state.set("b", 2);
        assert_eq!(runs.load(Ordering::SeqCst), 2);

        state.delete("b");
        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn has_is_reactive() {
        let state = reactive(Value::new_object(Vec::<(&str, i32)>::new()));
        let state_clone = state.clone();
        let (_e, runs) = watch(move || Value::from(state_clone.has("x")));

        state.set("x", 1);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn nested_objects_are_wrapped_on_read() {
        let inner = Value::new_object([("b", 1)]);
        let state = reactive(Value::new_object([("a", inner.clone())]));

        let nested = state.get("a");
        assert!(crate::proxy::is_reactive(&nested));
        assert_eq!(nested, reactive(inner));

        let frozen = readonly(state.clone());
        assert!(crate::proxy::is_readonly(&frozen.get("a")));
    }

    #[test]
    fn proxies_are_stored_raw() {
        let inner = reactive(Value::new_object([("b", 1)]));
        let state = reactive(Value::new_object(Vec::<(&str, i32)>::new()));

        state.set("a", inner.clone());
        let raw_a = crate::proxy::to_raw(&state).get("a");
        assert!(!raw_a.is_proxy());
        assert_eq!(raw_a, crate::proxy::to_raw(&inner));
    }

    #[test]
    fn refs_unwrap_on_objects_but_not_arrays() {
        let r = new_ref(1);
        let state = reactive(Value::new_object([("r", Value::Ref(r.clone()))]));
        assert_eq!(state.get("r").as_number(), Some(1.0));

        state.set("r", 5);
        assert_eq!(r.value().as_number(), Some(5.0));

        let list = reactive(Value::new_array([Value::Ref(r.clone())]));
        assert!(matches!(list.get(0), Value::Ref(_)));
    }

    #[test]
    fn shallow_stops_at_first_level() {
        let inner = Value::new_object([("b", 1)]);
        let r = Value::Ref(new_ref(1));
        let state = shallow_reactive(Value::new_object([("a", inner.clone()), ("r", r.clone())]));

        assert_eq!(state.get("a"), inner);
        assert_eq!(state.get("r"), r);

        let props = shallow_readonly(Value::new_object([("r", r.clone())]));
        assert_eq!(props.get("r"), r);
    }

    #[test]
    fn nan_overwrite_is_not_a_change() {
        let state = reactive(Value::new_object([("n", f64::NAN)]));
        let state_clone = state.clone();
        let (_e, runs) = watch(move || state_clone.get("n"));

        state.set("n", f64::NAN);
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        state.set("n", 1);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn well_known_symbols_are_not_tracked() {
        let state = reactive(Value::new_object(Vec::<(&str, i32)>::new()));
        let state_clone = state.clone();
        let (_e, runs) = watch(move || state_clone.get(Symbol::iterator()));

        state.set(Symbol::iterator(), 1);
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        let tag = Symbol::new("tag");
        let tag_clone = tag.clone();
        let state_clone = state.clone();
        let (_e, tagged) = watch(move || state_clone.get(tag_clone.clone()));
        state.set(tag, 1);
        assert_eq!(tagged.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn array_search_tracks_elements_and_length() {
        let list = reactive(Value::new_array([1, 2]));
        let list_clone = list.clone();
        let (_e, runs) = watch(move || Value::from(list_clone.includes(&Value::from(3))));

        list.push(3);
        assert_eq!(runs.load(Ordering::SeqCst), 2);

        list.set(0, 7);
        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn array_search_unwraps_proxy_arguments() {
        let item = Value::new_object([("id", 1)]);
        let list = reactive(Value::new_array([item.clone()]));

        let wrapped = list.get(0);
        assert!(wrapped.is_proxy());
        assert_eq!(list.index_of(&wrapped), Some(0));
        assert!(list.includes(&wrapped));
    }

    #[test]
    fn array_length_write_notifies_cut_indices() {
        let list = reactive(Value::new_array([1, 2, 3]));

        let list_clone = list.clone();
        let (_kept_effect, kept) = watch(move || list_clone.get(0));
        let list_clone = list.clone();
        let (_cut_effect, cut) = watch(move || list_clone.get(2));

        list.set("length", 1);
        assert_eq!(kept.load(Ordering::SeqCst), 1);
        assert_eq!(cut.load(Ordering::SeqCst), 2);
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn readonly_rejects_while_locked() {
        let _guard = serial();
        let raw = Value::new_object([("a", 1)]);
        let frozen = readonly(raw.clone());

        assert!(frozen.set("a", 2));
        assert!(frozen.delete("a"));
        assert_eq!(raw.get("a").as_number(), Some(1.0));

        unlock();
        frozen.set("a", 2);
        lock();
        assert_eq!(raw.get("a").as_number(), Some(2.0));
    }
}
