//! Raw Observable Objects
//!
//! A [`Raw`] is the unwrapped storage behind every proxy: a plain object,
//! an array, or one of the four keyed collections. Its operations here are
//! plain reads and writes; tracking and triggering live in the handlers.
//!
//! The observable kind is fixed at construction and every operation
//! dispatches on it exhaustively. Operations that do not apply to a kind
//! are refused (`None` / `false`) rather than panicking.
//!
//! # Lifetime
//!
//! A raw object carries its own [`Target`]. When the last handle goes away
//! its registry entry and identity-map entries are evicted, so neither map
//! keeps data for objects that no longer exist.

use std::mem;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Weak};

use indexmap::{IndexMap, IndexSet};
use parking_lot::RwLock;

use super::value::{PropKey, Value};
use super::wrap::{self, WeakProxy};
use crate::reactive::{ObservableKind, Runtime, Target, TargetId, WeakRef};

const MARK_READONLY: u8 = 0b01;
const MARK_NON_REACTIVE: u8 = 0b10;

/// A weakly held key of a WeakMap / WeakSet.
#[derive(Clone)]
enum WeakObject {
    Raw(Weak<RawInner>),
    Proxy(WeakProxy),
    Ref(WeakRef),
}

impl WeakObject {
    /// Slot address and weak handle for an object key; `None` for
    /// primitives, which weak collections cannot hold.
    fn of(key: &Value) -> Option<(usize, WeakObject)> {
        match key {
            Value::Raw(raw) => Some((raw.addr(), WeakObject::Raw(Arc::downgrade(&raw.0)))),
            Value::Proxy(proxy) => Some((proxy.addr(), WeakObject::Proxy(proxy.downgrade()))),
            Value::Ref(r) => Some((r.addr(), WeakObject::Ref(r.downgrade()))),
            _ => None,
        }
    }

    fn upgrade(&self) -> Option<Value> {
        match self {
            WeakObject::Raw(weak) => weak.upgrade().map(|inner| Value::Raw(Raw(inner))),
            WeakObject::Proxy(weak) => weak.upgrade().map(Value::Proxy),
            WeakObject::Ref(weak) => weak.upgrade().map(Value::Ref),
        }
    }

    fn is_alive(&self) -> bool {
        match self {
            WeakObject::Raw(weak) => weak.strong_count() > 0,
            WeakObject::Proxy(weak) => weak.is_alive(),
            WeakObject::Ref(weak) => weak.is_alive(),
        }
    }
}

/// Storage of an observable object, one variant per kind.
enum ObjectData {
    Object(IndexMap<PropKey, Value>),
    Array(Vec<Value>),
    Map(IndexMap<Value, Value>),
    Set(IndexSet<Value>),
    WeakMap(IndexMap<usize, (WeakObject, Value)>),
    WeakSet(IndexMap<usize, WeakObject>),
}

impl ObjectData {
    fn empty(kind: ObservableKind) -> Self {
        match kind {
            ObservableKind::Object => ObjectData::Object(IndexMap::new()),
            ObservableKind::Array => ObjectData::Array(Vec::new()),
            ObservableKind::Map => ObjectData::Map(IndexMap::new()),
            ObservableKind::Set => ObjectData::Set(IndexSet::new()),
            ObservableKind::WeakMap => ObjectData::WeakMap(IndexMap::new()),
            ObservableKind::WeakSet => ObjectData::WeakSet(IndexMap::new()),
        }
    }
}

/// Outcome of an accepted write.
#[derive(Debug, Clone)]
pub(crate) struct Write {
    /// Whether the key existed before the write.
    pub had_key: bool,
    /// The value it held, `Undefined` if it did not exist. For an array
    /// `length` write, the previous length.
    pub old_value: Value,
}

/// Which array search to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ArraySearch {
    /// SameValueZero, first match.
    Includes,
    /// Strict equality, first match.
    IndexOf,
    /// Strict equality, last match.
    LastIndexOf,
}

pub(crate) struct RawInner {
    target: Target,
    data: RwLock<ObjectData>,
    marks: AtomicU8,
}

impl Drop for RawInner {
    fn drop(&mut self) {
        Runtime::evict(self.target.id());
        wrap::forget(self.target.id());
    }
}

/// A shared handle to an unwrapped observable object.
#[derive(Clone)]
pub struct Raw(Arc<RawInner>);

impl Raw {
    /// An empty object of the given kind.
    pub fn new(kind: ObservableKind) -> Self {
        Self::with_data(kind, ObjectData::empty(kind))
    }

    /// An array holding `items`.
    pub fn array(items: Vec<Value>) -> Self {
        Self::with_data(ObservableKind::Array, ObjectData::Array(items))
    }

    fn with_data(kind: ObservableKind, data: ObjectData) -> Self {
        Self(Arc::new(RawInner {
            target: Target::new(kind),
            data: RwLock::new(data),
            marks: AtomicU8::new(0),
        }))
    }

    pub fn id(&self) -> TargetId {
        self.0.target.id()
    }

    pub fn kind(&self) -> ObservableKind {
        self.0.target.kind()
    }

    /// The registry target for this object.
    pub fn target(&self) -> Target {
        self.0.target
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }

    // ------------------------------------------------------------------
    // Marks
    // ------------------------------------------------------------------

    /// Redirect future `reactive()` calls on this object to `readonly()`.
    pub fn mark_readonly(&self) {
        self.0.marks.fetch_or(MARK_READONLY, Ordering::SeqCst);
    }

    /// Make future wrap calls on this object return it unchanged.
    pub fn mark_non_reactive(&self) {
        self.0.marks.fetch_or(MARK_NON_REACTIVE, Ordering::SeqCst);
    }

    pub fn is_marked_readonly(&self) -> bool {
        self.0.marks.load(Ordering::SeqCst) & MARK_READONLY != 0
    }

    pub fn is_marked_non_reactive(&self) -> bool {
        self.0.marks.load(Ordering::SeqCst) & MARK_NON_REACTIVE != 0
    }

    // ------------------------------------------------------------------
    // Properties (objects and arrays)
    // ------------------------------------------------------------------

    pub fn get(&self, key: &PropKey) -> Value {
        match &*self.0.data.read() {
            ObjectData::Object(props) => props.get(key).cloned().unwrap_or_default(),
            ObjectData::Array(items) => match key {
                PropKey::Index(i) => items.get(*i).cloned().unwrap_or_default(),
                key if key.is_length() => Value::from(items.len()),
                _ => Value::Undefined,
            },
            _ => Value::Undefined,
        }
    }

    pub fn contains_key(&self, key: &PropKey) -> bool {
        match &*self.0.data.read() {
            ObjectData::Object(props) => props.contains_key(key),
            ObjectData::Array(items) => match key {
                PropKey::Index(i) => *i < items.len(),
                key => key.is_length(),
            },
            _ => false,
        }
    }

    /// Write a property. `None` if the object refuses the key.
    pub(crate) fn set(&self, key: PropKey, value: Value) -> Option<Write> {
        match &mut *self.0.data.write() {
            ObjectData::Object(props) => {
                let old = props.insert(key, value);
                Some(Write {
                    had_key: old.is_some(),
                    old_value: old.unwrap_or_default(),
                })
            }
            ObjectData::Array(items) => match key {
                PropKey::Index(i) => {
                    let had_key = i < items.len();
                    if !had_key {
                        items.resize(i + 1, Value::Undefined);
                    }
                    Some(Write {
                        had_key,
                        old_value: mem::replace(&mut items[i], value),
                    })
                }
                key if key.is_length() => {
                    let new_len = array_length(&value)?;
                    let old_len = items.len();
                    items.resize(new_len, Value::Undefined);
                    Some(Write {
                        had_key: true,
                        old_value: Value::from(old_len),
                    })
                }
                _ => None,
            },
            _ => None,
        }
    }

    /// Delete a property, returning what it held. `None` if it did not
    /// exist or cannot be deleted. Array slots are cleared, not removed.
    pub(crate) fn delete(&self, key: &PropKey) -> Option<Value> {
        match &mut *self.0.data.write() {
            ObjectData::Object(props) => props.shift_remove(key),
            ObjectData::Array(items) => match key {
                PropKey::Index(i) if *i < items.len() => {
                    Some(mem::take(&mut items[*i]))
                }
                _ => None,
            },
            _ => None,
        }
    }

    /// Own keys in order: insertion order for objects, indices for arrays.
    pub fn own_keys(&self) -> Vec<PropKey> {
        match &*self.0.data.read() {
            ObjectData::Object(props) => props.keys().cloned().collect(),
            ObjectData::Array(items) => (0..items.len()).map(PropKey::Index).collect(),
            _ => Vec::new(),
        }
    }

    /// Array length; `None` for other kinds.
    pub fn array_len(&self) -> Option<usize> {
        match &*self.0.data.read() {
            ObjectData::Array(items) => Some(items.len()),
            _ => None,
        }
    }

    pub(crate) fn find(&self, needle: &Value, search: ArraySearch) -> Option<usize> {
        let data = self.0.data.read();
        let ObjectData::Array(items) = &*data else {
            return None;
        };
        match search {
            ArraySearch::Includes => items.iter().position(|item| item.same_value_zero(needle)),
            ArraySearch::IndexOf => items.iter().position(|item| item.strict_equals(needle)),
            ArraySearch::LastIndexOf => items.iter().rposition(|item| item.strict_equals(needle)),
        }
    }

    // ------------------------------------------------------------------
    // Entries (Map, Set, WeakMap, WeakSet)
    // ------------------------------------------------------------------

    pub fn entry_get(&self, key: &Value) -> Value {
        match &*self.0.data.read() {
            ObjectData::Map(entries) => entries.get(key).cloned().unwrap_or_default(),
            ObjectData::WeakMap(entries) => weak_lookup(entries, key)
                .map(|(_, value)| value.clone())
                .unwrap_or_default(),
            _ => Value::Undefined,
        }
    }

    pub fn entry_has(&self, key: &Value) -> bool {
        match &*self.0.data.read() {
            ObjectData::Map(entries) => entries.contains_key(key),
            ObjectData::Set(members) => members.contains(key),
            ObjectData::WeakMap(entries) => weak_lookup(entries, key).is_some(),
            ObjectData::WeakSet(members) => weak_lookup(members, key).is_some(),
            _ => false,
        }
    }

    /// Map / WeakMap insert. `None` if refused: wrong kind, or a primitive
    /// key for a WeakMap.
    pub(crate) fn entry_insert(&self, key: Value, value: Value) -> Option<Write> {
        let mut data = self.0.data.write();
        match &mut *data {
            ObjectData::Map(entries) => {
                let old = entries.insert(key, value);
                Some(Write {
                    had_key: old.is_some(),
                    old_value: old.unwrap_or_default(),
                })
            }
            ObjectData::WeakMap(entries) => {
                let (addr, weak) = WeakObject::of(&key)?;
                entries.retain(|_, (held, _)| held.is_alive());
                let old = entries.insert(addr, (weak, value));
                Some(Write {
                    had_key: old.is_some(),
                    old_value: old.map(|(_, value)| value).unwrap_or_default(),
                })
            }
            _ => None,
        }
    }

    /// Set / WeakSet add. Returns whether the value was newly added.
    pub(crate) fn entry_add(&self, value: Value) -> bool {
        let mut data = self.0.data.write();
        match &mut *data {
            ObjectData::Set(members) => members.insert(value),
            ObjectData::WeakSet(members) => {
                let Some((addr, weak)) = WeakObject::of(&value) else {
                    return false;
                };
                members.retain(|_, held| held.is_alive());
                if weak_lookup(members, &value).is_some() {
                    return false;
                }
                members.insert(addr, weak);
                true
            }
            _ => false,
        }
    }

    /// Remove a member, returning its value (a set's member is its own
    /// value). `None` if it was not present.
    pub(crate) fn entry_remove(&self, key: &Value) -> Option<Value> {
        let mut data = self.0.data.write();
        match &mut *data {
            ObjectData::Map(entries) => entries.shift_remove(key),
            ObjectData::Set(members) => members.shift_take(key),
            ObjectData::WeakMap(entries) => {
                let (addr, _) = WeakObject::of(key)?;
                weak_lookup(entries, key)?;
                entries.shift_remove(&addr).map(|(_, value)| value)
            }
            ObjectData::WeakSet(members) => {
                let (addr, _) = WeakObject::of(key)?;
                weak_lookup(members, key)?;
                members.shift_remove(&addr).map(|_| key.clone())
            }
            _ => None,
        }
    }

    /// Empty a Map or Set. Returns how many members it had.
    pub(crate) fn entry_clear(&self) -> usize {
        let mut data = self.0.data.write();
        let removed = match &mut *data {
            ObjectData::Map(entries) => ObjectData::Map(mem::take(entries)),
            ObjectData::Set(members) => ObjectData::Set(mem::take(members)),
            _ => return 0,
        };
        drop(data);

        match removed {
            ObjectData::Map(entries) => entries.len(),
            ObjectData::Set(members) => members.len(),
            _ => 0,
        }
    }

    /// Member count of a Map or Set; `None` for other kinds.
    pub fn size(&self) -> Option<usize> {
        match &*self.0.data.read() {
            ObjectData::Map(entries) => Some(entries.len()),
            ObjectData::Set(members) => Some(members.len()),
            _ => None,
        }
    }

    /// Snapshot of `(key, value)` pairs of a Map or Set, in order.
    pub fn entries(&self) -> Vec<(Value, Value)> {
        match &*self.0.data.read() {
            ObjectData::Map(entries) => entries
                .iter()
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
            ObjectData::Set(members) => members
                .iter()
                .map(|member| (member.clone(), member.clone()))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Number of live members of a WeakMap or WeakSet.
    pub fn live_weak_count(&self) -> usize {
        match &*self.0.data.read() {
            ObjectData::WeakMap(entries) => entries.values().filter(|(k, _)| k.is_alive()).count(),
            ObjectData::WeakSet(members) => members.values().filter(|k| k.is_alive()).count(),
            _ => 0,
        }
    }
}

/// A weak-collection slot for `key`, if `key` is an object that is still
/// present.
fn weak_lookup<'a, T: WeakSlot>(slots: &'a IndexMap<usize, T>, key: &Value) -> Option<&'a T> {
    let (addr, _) = WeakObject::of(key)?;
    let slot = slots.get(&addr)?;
    let held = slot.held().upgrade()?;
    (held == *key).then_some(slot)
}

trait WeakSlot {
    fn held(&self) -> &WeakObject;
}

impl WeakSlot for WeakObject {
    fn held(&self) -> &WeakObject {
        self
    }
}

impl WeakSlot for (WeakObject, Value) {
    fn held(&self) -> &WeakObject {
        &self.0
    }
}

fn array_length(value: &Value) -> Option<usize> {
    let n = value.as_number()?;
    (n >= 0.0 && n.fract() == 0.0 && n <= u32::MAX as f64).then_some(n as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_write_reports_previous_state() {
        let raw = Raw::new(ObservableKind::Object);

        let first = raw.set(PropKey::from("a"), Value::from(1)).expect("accepted");
        assert!(!first.had_key);

        let second = raw.set(PropKey::from("a"), Value::from(2)).expect("accepted");
        assert!(second.had_key);
        assert_eq!(second.old_value.as_number(), Some(1.0));
    }

    #[test]
    fn array_refuses_named_keys() {
        let raw = Raw::array(vec![Value::from(1)]);
        assert!(raw.set(PropKey::from("name"), Value::from(1)).is_none());
        assert!(raw.set(PropKey::length(), Value::from(-1)).is_none());
        assert!(raw.set(PropKey::length(), Value::from(1.5)).is_none());
    }

    #[test]
    fn array_write_past_end_pads() {
        let raw = Raw::array(vec![Value::from(1)]);
        let write = raw.set(PropKey::from(3usize), Value::from(4)).expect("accepted");

        assert!(!write.had_key);
        assert_eq!(raw.array_len(), Some(4));
        assert!(raw.get(&PropKey::from(2usize)).is_undefined());
    }

    #[test]
    fn array_length_truncates() {
        let raw = Raw::array(vec![Value::from(1), Value::from(2), Value::from(3)]);
        let write = raw.set(PropKey::length(), Value::from(1)).expect("accepted");

        assert_eq!(write.old_value.as_number(), Some(3.0));
        assert_eq!(raw.array_len(), Some(1));
        assert_eq!(raw.get(&PropKey::length()).as_number(), Some(1.0));
    }

    #[test]
    fn array_delete_keeps_length() {
        let raw = Raw::array(vec![Value::from(1), Value::from(2)]);

        assert_eq!(raw.delete(&PropKey::from(0usize)).and_then(|v| v.as_number()), Some(1.0));
        assert_eq!(raw.array_len(), Some(2));
        assert!(raw.delete(&PropKey::from(5usize)).is_none());
    }

    #[test]
    fn searches_follow_equality_rules() {
        let raw = Raw::array(vec![Value::from(f64::NAN), Value::from(1), Value::from(1)]);
        let nan = Value::from(f64::NAN);

        assert_eq!(raw.find(&nan, ArraySearch::Includes), Some(0));
        assert_eq!(raw.find(&nan, ArraySearch::IndexOf), None);
        assert_eq!(raw.find(&Value::from(1), ArraySearch::LastIndexOf), Some(2));
    }

    #[test]
    fn weak_map_holds_keys_weakly() {
        let map = Raw::new(ObservableKind::WeakMap);
        let key = Value::new_object(Vec::<(&str, i32)>::new());

        assert!(map.entry_insert(Value::from("primitive"), Value::from(1)).is_none());
        map.entry_insert(key.clone(), Value::from(1)).expect("accepted");
        assert_eq!(map.entry_get(&key).as_number(), Some(1.0));
        assert_eq!(map.live_weak_count(), 1);

        drop(key);
        assert_eq!(map.live_weak_count(), 0);
    }

    #[test]
    fn set_add_dedupes() {
        let set = Raw::new(ObservableKind::Set);
        assert!(set.entry_add(Value::from("x")));
        assert!(!set.entry_add(Value::from("x")));
        assert_eq!(set.size(), Some(1));

        assert_eq!(set.entry_clear(), 1);
        assert_eq!(set.size(), Some(0));
    }

    #[test]
    fn marks_are_sticky() {
        let raw = Raw::new(ObservableKind::Object);
        assert!(!raw.is_marked_readonly());

        raw.mark_readonly();
        raw.mark_non_reactive();
        assert!(raw.is_marked_readonly());
        assert!(raw.is_marked_non_reactive());
    }
}
