//! Wrapping and Identity Maps
//!
//! A [`Proxy`] pairs a raw object with a [`Flavor`]. There is at most one
//! live proxy per (raw object, flavor): the forward identity maps cache
//! each wrapper weakly, keyed by the raw object's target id, and every
//! wrap call consults them before allocating.
//!
//! The backward direction needs no map: a proxy holds its raw object, so
//! [`to_raw`], [`is_reactive`] and [`is_readonly`] read it off the wrapper.

use std::fmt;
use std::sync::{Arc, OnceLock, Weak};

use dashmap::DashMap;

use super::object::Raw;
use super::value::Value;
use crate::reactive::{ObservableKind, Target, TargetId};

/// The four proxy configurations: {mutable, readonly} × {deep, shallow}.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Flavor {
    Reactive,
    Readonly,
    ShallowReactive,
    ShallowReadonly,
}

impl Flavor {
    const ALL: [Flavor; 4] = [
        Flavor::Reactive,
        Flavor::Readonly,
        Flavor::ShallowReactive,
        Flavor::ShallowReadonly,
    ];

    pub fn is_readonly(self) -> bool {
        matches!(self, Flavor::Readonly | Flavor::ShallowReadonly)
    }

    pub fn is_shallow(self) -> bool {
        matches!(self, Flavor::ShallowReactive | Flavor::ShallowReadonly)
    }

    fn index(self) -> usize {
        match self {
            Flavor::Reactive => 0,
            Flavor::Readonly => 1,
            Flavor::ShallowReactive => 2,
            Flavor::ShallowReadonly => 3,
        }
    }
}

pub(crate) struct ProxyInner {
    raw: Raw,
    flavor: Flavor,
}

/// A reactive or readonly wrapper around a raw observable object.
#[derive(Clone)]
pub struct Proxy(Arc<ProxyInner>);

impl Proxy {
    pub fn raw(&self) -> &Raw {
        &self.0.raw
    }

    pub fn flavor(&self) -> Flavor {
        self.0.flavor
    }

    pub fn kind(&self) -> ObservableKind {
        self.0.raw.kind()
    }

    /// The registry target of the raw object; every flavor shares it.
    pub fn target(&self) -> Target {
        self.0.raw.target()
    }

    pub fn is_readonly(&self) -> bool {
        self.0.flavor.is_readonly()
    }

    pub fn is_shallow(&self) -> bool {
        self.0.flavor.is_shallow()
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }

    pub(crate) fn downgrade(&self) -> WeakProxy {
        WeakProxy(Arc::downgrade(&self.0))
    }

    /// Wrap a value read through this proxy: nested objects get this
    /// proxy's deep flavor, everything else passes through.
    pub(crate) fn wrap_nested(&self, value: Value) -> Value {
        if self.is_shallow() || !value.is_object() {
            return value;
        }
        if self.is_readonly() {
            readonly(value)
        } else {
            reactive(value)
        }
    }
}

impl fmt::Debug for Proxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Proxy")
            .field("raw", &self.0.raw.id())
            .field("kind", &self.kind())
            .field("flavor", &self.0.flavor)
            .finish()
    }
}

/// Weak handle to a proxy, as held by identity maps and weak collections.
#[derive(Clone)]
pub(crate) struct WeakProxy(Weak<ProxyInner>);

impl WeakProxy {
    pub fn upgrade(&self) -> Option<Proxy> {
        self.0.upgrade().map(Proxy)
    }

    pub fn is_alive(&self) -> bool {
        self.0.strong_count() > 0
    }
}

// ----------------------------------------------------------------------------
// Identity maps
// ----------------------------------------------------------------------------

type IdentityMap = DashMap<TargetId, WeakProxy>;

static IDENTITY_MAPS: OnceLock<[IdentityMap; 4]> = OnceLock::new();

fn identity_map(flavor: Flavor) -> &'static IdentityMap {
    let maps = IDENTITY_MAPS.get_or_init(|| std::array::from_fn(|_| DashMap::new()));
    &maps[flavor.index()]
}

/// Drop every cached wrapper of a raw object. Called when it is destroyed.
pub(crate) fn forget(target_id: TargetId) {
    if IDENTITY_MAPS.get().is_none() {
        return;
    }
    for flavor in Flavor::ALL {
        identity_map(flavor).remove(&target_id);
    }
}

/// Number of live cached wrappers across all flavors.
pub fn live_proxy_count() -> usize {
    Flavor::ALL
        .iter()
        .map(|flavor| {
            identity_map(*flavor)
                .iter()
                .filter(|entry| entry.value().is_alive())
                .count()
        })
        .sum()
}

/// Shared construction: primitives, refs and existing proxies pass through,
/// non-reactive objects are refused, everything else gets the cached or a
/// fresh wrapper.
fn create(target: Value, flavor: Flavor) -> Value {
    let raw = match &target {
        Value::Raw(raw) if !raw.is_marked_non_reactive() => raw.clone(),
        _ => return target,
    };

    let mut slot = identity_map(flavor)
        .entry(raw.id())
        .or_insert_with(|| WeakProxy(Weak::new()));
    if let Some(existing) = slot.upgrade() {
        return Value::Proxy(existing);
    }

    let proxy = Proxy(Arc::new(ProxyInner { raw, flavor }));
    *slot = proxy.downgrade();
    Value::Proxy(proxy)
}

// ----------------------------------------------------------------------------
// Public wrapping API
// ----------------------------------------------------------------------------

/// The mutable deep proxy of an object.
///
/// Readonly proxies, refs and primitives are returned unchanged; objects
/// marked readonly get their readonly proxy instead.
///
/// # Example
///
/// ```rust
/// use vigil_core::proxy::{reactive, to_raw, Value};
///
/// let raw = Value::new_object([("a", 1)]);
/// let state = reactive(raw.clone());
///
/// assert_eq!(state, reactive(state.clone()));
/// assert_eq!(to_raw(&state), raw);
/// ```
pub fn reactive(target: Value) -> Value {
    match &target {
        Value::Raw(raw) if raw.is_marked_readonly() => readonly(target),
        _ => create(target, Flavor::Reactive),
    }
}

/// The readonly deep proxy of an object. Mutable proxies are unwrapped
/// first, so both wrappers share one raw object.
pub fn readonly(target: Value) -> Value {
    create(unwrap_mutable(target), Flavor::Readonly)
}

/// A mutable proxy that tracks only its own properties and returns nested
/// values as they are stored.
pub fn shallow_reactive(target: Value) -> Value {
    create(target, Flavor::ShallowReactive)
}

/// A readonly proxy that returns nested values, refs included, as stored.
pub fn shallow_readonly(target: Value) -> Value {
    create(unwrap_mutable(target), Flavor::ShallowReadonly)
}

fn unwrap_mutable(target: Value) -> Value {
    match target {
        Value::Proxy(proxy) if !proxy.is_readonly() => Value::Raw(proxy.raw().clone()),
        other => other,
    }
}

/// The raw object behind a proxy; any other value as is.
pub fn to_raw(value: &Value) -> Value {
    match value {
        Value::Proxy(proxy) => Value::Raw(proxy.raw().clone()),
        other => other.clone(),
    }
}

/// Whether the value is a mutable proxy.
pub fn is_reactive(value: &Value) -> bool {
    matches!(value, Value::Proxy(proxy) if !proxy.is_readonly())
}

/// Whether the value is a readonly proxy.
pub fn is_readonly(value: &Value) -> bool {
    matches!(value, Value::Proxy(proxy) if proxy.is_readonly())
}

/// Make future `reactive()` calls on this object return its readonly proxy.
/// Proxies are marked through their raw object.
pub fn mark_readonly(value: &Value) -> &Value {
    if let Some(raw) = value.raw_object() {
        raw.mark_readonly();
    }
    value
}

/// Make future wrap calls on this object return it unchanged.
pub fn mark_non_reactive(value: &Value) -> &Value {
    if let Some(raw) = value.raw_object() {
        raw.mark_non_reactive();
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::new_ref;

    fn object() -> Value {
        Value::new_object([("a", 1)])
    }

    #[test]
    fn one_proxy_per_flavor() {
        let raw = object();

        assert_eq!(reactive(raw.clone()), reactive(raw.clone()));
        assert_eq!(readonly(raw.clone()), readonly(raw.clone()));
        assert_ne!(reactive(raw.clone()), readonly(raw.clone()));
        assert_ne!(readonly(raw.clone()), shallow_readonly(raw.clone()));
    }

    #[test]
    fn primitives_and_refs_pass_through() {
        assert_eq!(reactive(Value::from(5)), Value::from(5));
        assert_eq!(readonly(Value::from("s")), Value::from("s"));

        let r = Value::Ref(new_ref(1));
        assert_eq!(reactive(r.clone()), r);
    }

    #[test]
    fn readonly_wraps_the_raw_object() {
        let raw = object();
        let state = reactive(raw.clone());
        let frozen = readonly(state.clone());

        assert_eq!(to_raw(&frozen), raw);
        assert_eq!(frozen, readonly(raw));
        assert!(is_readonly(&frozen));
        assert!(!is_reactive(&frozen));
    }

    #[test]
    fn readonly_is_not_upgraded() {
        let frozen = readonly(object());
        assert_eq!(reactive(frozen.clone()), frozen);
    }

    #[test]
    fn marks_redirect_wrapping() {
        let raw = object();
        mark_readonly(&raw);
        assert!(is_readonly(&reactive(raw)));

        let raw = object();
        mark_non_reactive(&raw);
        assert_eq!(reactive(raw.clone()), raw);
        assert_eq!(readonly(raw.clone()), raw);
    }

    #[test]
    fn dropped_raw_is_forgotten() {
        let raw = object();
        let id = raw.raw_object().map(Raw::id).expect("object");
        let proxy = reactive(raw.clone());

        assert!(identity_map(Flavor::Reactive).contains_key(&id));
        drop(proxy);
        drop(raw);
        assert!(!identity_map(Flavor::Reactive).contains_key(&id));
    }

    #[test]
    fn dead_wrapper_is_replaced() {
        let raw = object();
        drop(reactive(raw.clone()));
        assert_eq!(live_proxy_count_for(&raw), 0);

        let second = reactive(raw.clone());
        assert!(is_reactive(&second));
        assert_eq!(live_proxy_count_for(&raw), 1);
    }

    fn live_proxy_count_for(raw: &Value) -> usize {
        let id = raw.raw_object().map(Raw::id).expect("object");
        Flavor::ALL
            .iter()
            .filter(|flavor| {
                identity_map(**flavor)
                    .get(&id)
                    .is_some_and(|slot| slot.is_alive())
            })
            .count()
    }
}
