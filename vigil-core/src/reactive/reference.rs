//! Refs
//!
//! A ref is a single reactive slot. Reading `value` registers the reader
//! under the ref's own `value` key; writing a different value notifies.
//!
//! Three kinds share the [`Ref`] handle:
//!
//! - value cells from [`new_ref`] / [`shallow_ref`],
//! - property refs from [`to_ref`] / [`to_refs`], which read and write one
//!   property of an object through its accessors,
//! - computed values turned into refs with [`Computed::into_ref`].
//!
//! Object proxies unwrap refs stored in their properties, so a ref can be
//! exposed as a plain-looking property.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;

use super::computed::Computed;
use super::dep::{DepKey, TrackOp, TriggerOp};
use super::runtime::{track, trigger, Runtime};
use super::target::{ObservableKind, Target};
use crate::proxy::{reactive, to_raw, PropKey, Value};

struct CellState {
    /// Raw form of the last written value, used for change detection.
    raw: Value,
    /// What reads return: reactive for deep refs, verbatim for shallow.
    value: Value,
}

enum RefKind {
    Cell {
        target: Target,
        state: RwLock<CellState>,
        shallow: bool,
    },
    Property {
        object: Value,
        key: PropKey,
    },
    Computed(Computed),
}

struct RefInner {
    kind: RefKind,
}

impl Drop for RefInner {
    fn drop(&mut self) {
        if let RefKind::Cell { target, .. } = &self.kind {
            Runtime::evict(target.id());
        }
    }
}

/// A boxed reactive value.
#[derive(Clone)]
pub struct Ref(Arc<RefInner>);

/// Create a deep ref. Object values are stored as reactive proxies.
///
/// Passing a ref returns that same ref.
pub fn new_ref(value: impl Into<Value>) -> Ref {
    Ref::cell(value.into(), false)
}

/// Create a ref that stores its value verbatim.
pub fn shallow_ref(value: impl Into<Value>) -> Ref {
    Ref::cell(value.into(), true)
}

pub fn is_ref(value: &Value) -> bool {
    matches!(value, Value::Ref(_))
}

/// The ref's value for refs, the value itself otherwise.
pub fn unref(value: Value) -> Value {
    match value {
        Value::Ref(r) => r.value(),
        other => other,
    }
}

/// A ref bound to one property of `object`.
pub fn to_ref(object: &Value, key: impl Into<PropKey>) -> Ref {
    Ref(Arc::new(RefInner {
        kind: RefKind::Property {
            object: object.clone(),
            key: key.into(),
        },
    }))
}

/// One property ref per own key of `object`, in key order.
pub fn to_refs(object: &Value) -> IndexMap<PropKey, Ref> {
    object
        .own_keys()
        .into_iter()
        .map(|key| {
            let r = to_ref(object, key.clone());
            (key, r)
        })
        .collect()
}

fn convert(value: Value) -> Value {
    if value.is_object() {
        reactive(value)
    } else {
        value
    }
}

impl Ref {
    fn cell(value: Value, shallow: bool) -> Self {
        if let Value::Ref(existing) = value {
            return existing;
        }

        let raw = to_raw(&value);
        let value = if shallow { value } else { convert(value) };
        Self(Arc::new(RefInner {
            kind: RefKind::Cell {
                target: Target::new(ObservableKind::Object),
                state: RwLock::new(CellState { raw, value }),
                shallow,
            },
        }))
    }

    pub(crate) fn from_computed(computed: Computed) -> Self {
        Self(Arc::new(RefInner {
            kind: RefKind::Computed(computed),
        }))
    }

    /// Read the value, registering the running effect as a dependent.
    pub fn value(&self) -> Value {
        match &self.0.kind {
            RefKind::Cell { target, state, .. } => {
                track(*target, TrackOp::Get, DepKey::value());
                state.read().value.clone()
            }
            RefKind::Property { object, key } => object.get(key.clone()),
            RefKind::Computed(computed) => computed.value(),
        }
    }

    /// Write the value. Writing a value equal to the current one is a no-op.
    pub fn set_value(&self, value: impl Into<Value>) {
        let value = value.into();
        match &self.0.kind {
            RefKind::Cell {
                target,
                state,
                shallow,
            } => {
                let raw = to_raw(&value);
                if !Value::has_changed(&raw, &state.read().raw) {
                    return;
                }

                let stored = if *shallow { value.clone() } else { convert(value.clone()) };
                let previous = {
                    let mut state = state.write();
                    state.raw = raw;
                    std::mem::replace(&mut state.value, stored)
                };

                trigger(
                    *target,
                    TriggerOp::Set,
                    Some(DepKey::value()),
                    Some(&value),
                    Some(&previous),
                );
            }
            RefKind::Property { object, key } => {
                object.set(key.clone(), value);
            }
            RefKind::Computed(computed) => computed.set_value(value),
        }
    }

    /// The registry target of a value cell.
    pub fn target(&self) -> Option<Target> {
        match &self.0.kind {
            RefKind::Cell { target, .. } => Some(*target),
            _ => None,
        }
    }

    pub fn is_shallow(&self) -> bool {
        matches!(&self.0.kind, RefKind::Cell { shallow: true, .. })
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }

    pub(crate) fn downgrade(&self) -> WeakRef {
        WeakRef(Arc::downgrade(&self.0))
    }
}

/// Weak handle to a ref, for weak collections.
#[derive(Clone)]
pub(crate) struct WeakRef(std::sync::Weak<RefInner>);

impl WeakRef {
    pub fn upgrade(&self) -> Option<Ref> {
        self.0.upgrade().map(Ref)
    }

    pub fn is_alive(&self) -> bool {
        self.0.strong_count() > 0
    }
}

impl fmt::Debug for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0.kind {
            RefKind::Cell {
                target, shallow, ..
            } => f
                .debug_struct("Ref")
                .field("target", &target.id())
                .field("shallow", shallow)
                .finish(),
            RefKind::Property { key, .. } => f.debug_struct("Ref").field("key", key).finish(),
            RefKind::Computed(computed) => f.debug_tuple("Ref").field(computed).finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::{is_reactive, Value};
    use crate::reactive::{effect, EffectOptions};
    use std::sync::atomic::{AtomicI32, Ordering};

    #[test]
    fn ref_notifies_on_change() {
        let r = new_ref(1);
        let doubled = Arc::new(AtomicI32::new(0));

        let r_clone = r.clone();
        let doubled_clone = doubled.clone();
        let _e = effect(
            move || {
                let v = r_clone.value().as_number().unwrap_or_default();
                doubled_clone.store((v * 2.0) as i32, Ordering::SeqCst);
            },
            EffectOptions::default(),
        );

        assert_eq!(doubled.load(Ordering::SeqCst), 2);
        r.set_value(5);
        assert_eq!(doubled.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn equal_write_is_noop() {
        let r = new_ref(f64::NAN);
        let runs = Arc::new(AtomicI32::new(0));

        let r_clone = r.clone();
        let runs_clone = runs.clone();
        let _e = effect(
            move || {
                r_clone.value();
                runs_clone.fetch_add(1, Ordering::SeqCst);
            },
            EffectOptions::default(),
        );

        r.set_value(f64::NAN);
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        r.set_value(3);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn deep_ref_wraps_objects() {
        let r = new_ref(Value::new_object([("a", 1)]));
        assert!(is_reactive(&r.value()));

        let s = shallow_ref(Value::new_object([("a", 1)]));
        assert!(!is_reactive(&s.value()));
        assert!(s.is_shallow());
    }

    #[test]
    fn ref_of_ref_is_same_ref() {
        let r = new_ref(1);
        let again = new_ref(Value::Ref(r.clone()));
        assert!(r.ptr_eq(&again));
    }

    #[test]
    fn unref_passes_plain_values() {
        assert_eq!(unref(Value::from(3)).as_number(), Some(3.0));
        assert_eq!(unref(Value::Ref(new_ref("x"))).as_str(), Some("x"));
        assert!(is_ref(&Value::Ref(new_ref(0))));
        assert!(!is_ref(&Value::from(0)));
    }

    #[test]
    fn property_refs_follow_object() {
        let state = reactive(Value::new_object([("a", 1), ("b", 2)]));
        let refs = to_refs(&state);

        assert_eq!(refs.len(), 2);
        assert_eq!(refs[&PropKey::from("a")].value().as_number(), Some(1.0));

        state.set("a", 10);
        assert_eq!(refs[&PropKey::from("a")].value().as_number(), Some(10.0));

        refs[&PropKey::from("b")].set_value(20);
        assert_eq!(state.get("b").as_number(), Some(20.0));
    }

    #[test]
    fn dropping_cell_evicts_registry() {
        let r = new_ref(1);
        let target = r.target().expect("cell ref has a target");

        let r_clone = r.clone();
        let e = effect(move || r_clone.value(), EffectOptions::default());
        assert!(Runtime::is_tracked(target.id()));

        e.stop();
        drop(e);
        drop(r);
        assert!(!Runtime::is_tracked(target.id()));
    }
}
