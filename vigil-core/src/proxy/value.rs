//! Dynamic Values
//!
//! [`Value`] is the currency of the proxy layer: every accessor takes and
//! returns values, whether it runs on a reactive proxy, on a raw object or
//! on a primitive.
//!
//! # Equality
//!
//! Values compare with SameValueZero: numbers by value with NaN equal to
//! NaN and `+0` equal to `-0`, strings by contents, and objects, proxies and
//! refs by identity. Hashing agrees with that, so values can key maps, sets
//! and dependency sets.
//!
//! # Accessors
//!
//! Property accessors ([`Value::get`], [`Value::set`], ...) apply to plain
//! objects and arrays; collection accessors ([`Value::get_entry`],
//! [`Value::insert`], ...) to maps and sets. On a proxy they track and
//! trigger; on a raw object they are plain reads and writes; on anything
//! else they do nothing and return an empty result.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::mem;
use std::sync::{Arc, OnceLock};

use super::collection_handlers::CollectionIter;
use super::object::{ArraySearch, Raw};
use super::wrap::Proxy;
use crate::reactive::{ObservableKind, Ref};

/// A dynamically typed value.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(Arc<str>),
    /// An observable object, unwrapped.
    Raw(Raw),
    /// A reactive or readonly wrapper around an observable object.
    Proxy(Proxy),
    Ref(Ref),
}

impl Value {
    // ------------------------------------------------------------------
    // Construction
    // ------------------------------------------------------------------

    /// An empty observable object of the given kind.
    pub fn empty(kind: ObservableKind) -> Self {
        Value::Raw(Raw::new(kind))
    }

    /// A raw plain object with the given properties.
    pub fn new_object<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<PropKey>,
        V: Into<Value>,
    {
        let raw = Raw::new(ObservableKind::Object);
        for (key, value) in entries {
            raw.set(key.into(), value.into());
        }
        Value::Raw(raw)
    }

    /// A raw array with the given elements.
    pub fn new_array<V>(items: impl IntoIterator<Item = V>) -> Self
    where
        V: Into<Value>,
    {
        Value::Raw(Raw::array(items.into_iter().map(Into::into).collect()))
    }

    /// A raw map with the given entries, in order.
    pub fn new_map<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<Value>,
        V: Into<Value>,
    {
        let raw = Raw::new(ObservableKind::Map);
        for (key, value) in entries {
            raw.entry_insert(key.into(), value.into());
        }
        Value::Raw(raw)
    }

    /// A raw set with the given members, in order.
    pub fn new_set<V>(items: impl IntoIterator<Item = V>) -> Self
    where
        V: Into<Value>,
    {
        let raw = Raw::new(ObservableKind::Set);
        for item in items {
            raw.entry_add(item.into());
        }
        Value::Raw(raw)
    }

    pub fn new_weak_map() -> Self {
        Self::empty(ObservableKind::WeakMap)
    }

    pub fn new_weak_set() -> Self {
        Self::empty(ObservableKind::WeakSet)
    }

    // ------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Whether this is an observable object, raw or wrapped.
    pub fn is_object(&self) -> bool {
        matches!(self, Value::Raw(_) | Value::Proxy(_))
    }

    pub fn is_proxy(&self) -> bool {
        matches!(self, Value::Proxy(_))
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// The raw object behind this value, looking through proxies.
    pub fn raw_object(&self) -> Option<&Raw> {
        match self {
            Value::Raw(raw) => Some(raw),
            Value::Proxy(proxy) => Some(proxy.raw()),
            _ => None,
        }
    }

    /// The observable kind of the object behind this value.
    pub fn kind(&self) -> Option<ObservableKind> {
        self.raw_object().map(Raw::kind)
    }

    /// SameValueZero comparison.
    pub fn same_value_zero(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a == b || (a.is_nan() && b.is_nan()),
            _ => self.same_non_number(other),
        }
    }

    /// Strict equality: like SameValueZero, but NaN equals nothing.
    pub fn strict_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a == b,
            _ => self.same_non_number(other),
        }
    }

    fn same_non_number(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Raw(a), Value::Raw(b)) => a.ptr_eq(b),
            (Value::Proxy(a), Value::Proxy(b)) => a.ptr_eq(b),
            (Value::Ref(a), Value::Ref(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    /// Whether replacing `old` with `new` is an observable change.
    pub fn has_changed(new: &Value, old: &Value) -> bool {
        !new.same_value_zero(old)
    }

    // ------------------------------------------------------------------
    // Property access (plain objects and arrays)
    // ------------------------------------------------------------------

    /// Read a property.
    pub fn get(&self, key: impl Into<PropKey>) -> Value {
        let key = key.into();
        match self {
            Value::Proxy(proxy) if !proxy.kind().is_collection() => proxy.get(&key),
            Value::Proxy(proxy) => proxy.raw().get(&key),
            Value::Raw(raw) => raw.get(&key),
            _ => Value::Undefined,
        }
    }

    /// Write a property. Returns whether the write was accepted.
    pub fn set(&self, key: impl Into<PropKey>, value: impl Into<Value>) -> bool {
        let key = key.into();
        let value = value.into();
        match self {
            Value::Proxy(proxy) if !proxy.kind().is_collection() => proxy.set(key, value),
            Value::Proxy(proxy) => proxy.raw().set(key, value).is_some(),
            Value::Raw(raw) => raw.set(key, value).is_some(),
            _ => false,
        }
    }

    /// Delete a property. Returns whether the deletion was accepted.
    pub fn delete(&self, key: impl Into<PropKey>) -> bool {
        let key = key.into();
        match self {
            Value::Proxy(proxy) if !proxy.kind().is_collection() => proxy.delete(&key),
            Value::Proxy(proxy) => proxy.raw().delete(&key).is_some(),
            Value::Raw(raw) => raw.delete(&key).is_some(),
            _ => false,
        }
    }

    /// Whether the property exists.
    pub fn has(&self, key: impl Into<PropKey>) -> bool {
        let key = key.into();
        match self {
            Value::Proxy(proxy) if !proxy.kind().is_collection() => proxy.has(&key),
            Value::Proxy(proxy) => proxy.raw().contains_key(&key),
            Value::Raw(raw) => raw.contains_key(&key),
            _ => false,
        }
    }

    /// The own property keys, in order. Array indices come first.
    pub fn own_keys(&self) -> Vec<PropKey> {
        match self {
            Value::Proxy(proxy) if !proxy.kind().is_collection() => proxy.own_keys(),
            Value::Proxy(proxy) => proxy.raw().own_keys(),
            Value::Raw(raw) => raw.own_keys(),
            _ => Vec::new(),
        }
    }

    /// Array length, read through `length`. Zero for non-arrays.
    pub fn len(&self) -> usize {
        if self.kind() != Some(ObservableKind::Array) {
            return 0;
        }
        self.get(PropKey::length())
            .as_number()
            .map(|n| n as usize)
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append to an array by writing the next index.
    pub fn push(&self, value: impl Into<Value>) -> bool {
        if self.kind() != Some(ObservableKind::Array) {
            return false;
        }
        let index = self.len();
        self.set(index, value)
    }

    /// Whether the array contains `needle` (SameValueZero).
    pub fn includes(&self, needle: &Value) -> bool {
        self.search(needle, ArraySearch::Includes).is_some()
    }

    /// First index of `needle` (strict equality).
    pub fn index_of(&self, needle: &Value) -> Option<usize> {
        self.search(needle, ArraySearch::IndexOf)
    }

    /// Last index of `needle` (strict equality).
    pub fn last_index_of(&self, needle: &Value) -> Option<usize> {
        self.search(needle, ArraySearch::LastIndexOf)
    }

    fn search(&self, needle: &Value, search: ArraySearch) -> Option<usize> {
        match self {
            Value::Proxy(proxy) => proxy.search(needle, search),
            Value::Raw(raw) => raw.find(needle, search),
            _ => None,
        }
    }

    // ------------------------------------------------------------------
    // Collection access (Map, Set, WeakMap, WeakSet)
    // ------------------------------------------------------------------

    /// `Map.get` / `WeakMap.get`.
    pub fn get_entry(&self, key: &Value) -> Value {
        match self {
            Value::Proxy(proxy) if proxy.kind().is_collection() => proxy.get_entry(key),
            Value::Raw(raw) => raw.entry_get(key),
            _ => Value::Undefined,
        }
    }

    /// `has` on any collection.
    pub fn has_entry(&self, key: &Value) -> bool {
        match self {
            Value::Proxy(proxy) if proxy.kind().is_collection() => proxy.has_entry(key),
            Value::Raw(raw) => raw.entry_has(key),
            _ => false,
        }
    }

    /// `Map.set` / `WeakMap.set`. Returns the receiver.
    pub fn insert(&self, key: impl Into<Value>, value: impl Into<Value>) -> Value {
        let key = key.into();
        let value = value.into();
        match self {
            Value::Proxy(proxy) if proxy.kind().is_collection() => proxy.insert(key, value),
            Value::Raw(raw) => {
                raw.entry_insert(key, value);
                self.clone()
            }
            _ => self.clone(),
        }
    }

    /// `Set.add` / `WeakSet.add`. Returns the receiver.
    pub fn add(&self, value: impl Into<Value>) -> Value {
        let value = value.into();
        match self {
            Value::Proxy(proxy) if proxy.kind().is_collection() => proxy.add(value),
            Value::Raw(raw) => {
                raw.entry_add(value);
                self.clone()
            }
            _ => self.clone(),
        }
    }

    /// `delete` on any collection. Returns whether a member was removed.
    pub fn remove(&self, key: &Value) -> bool {
        match self {
            Value::Proxy(proxy) if proxy.kind().is_collection() => proxy.remove(key),
            Value::Raw(raw) => raw.entry_remove(key).is_some(),
            _ => false,
        }
    }

    /// `clear` on a sized collection.
    pub fn clear(&self) -> Value {
        match self {
            Value::Proxy(proxy) if proxy.kind().is_collection() => proxy.clear(),
            Value::Raw(raw) => {
                raw.entry_clear();
                Value::Undefined
            }
            _ => Value::Undefined,
        }
    }

    /// Member count of a sized collection. Zero for anything else.
    pub fn size(&self) -> usize {
        match self {
            Value::Proxy(proxy) if proxy.kind().is_collection() => proxy.size(),
            Value::Raw(raw) => raw.size().unwrap_or(0),
            _ => 0,
        }
    }

    /// Visit each `(value, key, collection)` of a sized collection.
    pub fn for_each(&self, mut callback: impl FnMut(Value, Value, &Value)) {
        match self {
            Value::Proxy(proxy) if proxy.kind().is_collection() => proxy.for_each(callback),
            Value::Raw(raw) => {
                for (key, value) in raw.entries() {
                    callback(value, key, self);
                }
            }
            _ => {}
        }
    }

    /// Keys of a sized collection; a set's keys are its members.
    pub fn keys(&self) -> CollectionIter<Value> {
        self.iteration(|(key, _)| key)
    }

    pub fn values(&self) -> CollectionIter<Value> {
        self.iteration(|(_, value)| value)
    }

    /// `(key, value)` pairs; a set yields each member twice.
    pub fn entries(&self) -> CollectionIter<(Value, Value)> {
        self.iteration(|pair| pair)
    }

    /// The default iteration: `[key, value]` arrays for maps, members for
    /// sets.
    pub fn iter(&self) -> CollectionIter<Value> {
        match self.kind() {
            Some(ObservableKind::Map) => self.iteration(|(key, value)| {
                Value::Raw(Raw::array(vec![key, value]))
            }),
            _ => self.values(),
        }
    }

    fn iteration<T>(&self, project: fn((Value, Value)) -> T) -> CollectionIter<T> {
        match self {
            Value::Proxy(proxy) if proxy.kind().is_collection() => proxy.iteration(project),
            Value::Raw(raw) => CollectionIter::unwrapped(raw.entries(), project),
            _ => CollectionIter::unwrapped(Vec::new(), project),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.same_value_zero(other)
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        mem::discriminant(self).hash(state);
        match self {
            Value::Undefined | Value::Null => {}
            Value::Bool(b) => b.hash(state),
            Value::Number(n) => {
                let bits = if *n == 0.0 {
                    0
                } else if n.is_nan() {
                    f64::NAN.to_bits()
                } else {
                    n.to_bits()
                };
                bits.hash(state);
            }
            Value::String(s) => s.hash(state),
            Value::Raw(raw) => raw.addr().hash(state),
            Value::Proxy(proxy) => proxy.addr().hash(state),
            Value::Ref(r) => r.addr().hash(state),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => f.write_str("Undefined"),
            Value::Null => f.write_str("Null"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Number(n) => write!(f, "Number({n})"),
            Value::String(s) => write!(f, "String({s:?})"),
            Value::Raw(raw) => write!(f, "Raw({} {:?})", raw.id(), raw.kind()),
            Value::Proxy(proxy) => write!(
                f,
                "Proxy({} {:?} {:?})",
                proxy.raw().id(),
                proxy.kind(),
                proxy.flavor()
            ),
            Value::Ref(r) => fmt::Debug::fmt(r, f),
        }
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Undefined
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

macro_rules! impl_from_number {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Value {
                fn from(n: $ty) -> Self {
                    Value::Number(n as f64)
                }
            }
        )*
    };
}

impl_from_number!(i32, i64, u32, u64, usize, f32, f64);

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(Arc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(Arc::from(s))
    }
}

impl From<Arc<str>> for Value {
    fn from(s: Arc<str>) -> Self {
        Value::String(s)
    }
}

impl From<Raw> for Value {
    fn from(raw: Raw) -> Self {
        Value::Raw(raw)
    }
}

impl From<Proxy> for Value {
    fn from(proxy: Proxy) -> Self {
        Value::Proxy(proxy)
    }
}

impl From<Ref> for Value {
    fn from(r: Ref) -> Self {
        Value::Ref(r)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}

// ----------------------------------------------------------------------------
// Property keys
// ----------------------------------------------------------------------------

/// A property key of a plain object or array.
///
/// Names that spell a canonical array index (`"0"`, `"17"`, but not `"01"`)
/// normalise to [`PropKey::Index`], so `obj.get("3")` and `obj.get(3)` name
/// the same property.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PropKey {
    Name(Arc<str>),
    Index(usize),
    Symbol(Symbol),
}

impl PropKey {
    pub fn length() -> Self {
        PropKey::Name(Arc::from("length"))
    }

    pub fn is_length(&self) -> bool {
        matches!(self, PropKey::Name(name) if &**name == "length")
    }

    pub fn as_index(&self) -> Option<usize> {
        match self {
            PropKey::Index(i) => Some(*i),
            _ => None,
        }
    }

    /// Built-in symbols are never tracked.
    pub fn is_well_known_symbol(&self) -> bool {
        matches!(self, PropKey::Symbol(symbol) if symbol.is_well_known())
    }
}

impl From<&str> for PropKey {
    fn from(name: &str) -> Self {
        match name.parse::<usize>() {
            Ok(index) if index.to_string() == name => PropKey::Index(index),
            _ => PropKey::Name(Arc::from(name)),
        }
    }
}

impl From<String> for PropKey {
    fn from(name: String) -> Self {
        PropKey::from(name.as_str())
    }
}

impl From<usize> for PropKey {
    fn from(index: usize) -> Self {
        PropKey::Index(index)
    }
}

impl From<Symbol> for PropKey {
    fn from(symbol: Symbol) -> Self {
        PropKey::Symbol(symbol)
    }
}

impl fmt::Display for PropKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropKey::Name(name) => f.write_str(name),
            PropKey::Index(i) => write!(f, "{i}"),
            PropKey::Symbol(symbol) => write!(f, "Symbol({})", symbol.description()),
        }
    }
}

// ----------------------------------------------------------------------------
// Symbols
// ----------------------------------------------------------------------------

struct SymbolInner {
    description: Arc<str>,
    well_known: bool,
}

/// A unique property key. Two symbols are equal only if they are the same
/// symbol, whatever their descriptions.
#[derive(Clone)]
pub struct Symbol(Arc<SymbolInner>);

impl Symbol {
    pub fn new(description: &str) -> Self {
        Self(Arc::new(SymbolInner {
            description: Arc::from(description),
            well_known: false,
        }))
    }

    fn well_known(slot: &'static OnceLock<Symbol>, description: &str) -> Self {
        slot.get_or_init(|| {
            Self(Arc::new(SymbolInner {
                description: Arc::from(description),
                well_known: true,
            }))
        })
        .clone()
    }

    /// The built-in iteration protocol symbol.
    pub fn iterator() -> Self {
        static ITERATOR: OnceLock<Symbol> = OnceLock::new();
        Self::well_known(&ITERATOR, "Symbol.iterator")
    }

    /// The built-in tag symbol used for string conversion.
    pub fn to_string_tag() -> Self {
        static TO_STRING_TAG: OnceLock<Symbol> = OnceLock::new();
        Self::well_known(&TO_STRING_TAG, "Symbol.toStringTag")
    }

    pub fn description(&self) -> &str {
        &self.0.description
    }

    pub fn is_well_known(&self) -> bool {
        self.0.well_known
    }
}

impl PartialEq for Symbol {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Symbol {}

impl Hash for Symbol {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (Arc::as_ptr(&self.0) as *const () as usize).hash(state);
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Symbol({})", self.0.description)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn nan_equals_nan() {
        let nan = Value::from(f64::NAN);
        assert_eq!(nan, Value::from(f64::NAN));
        assert!(!nan.strict_equals(&Value::from(f64::NAN)));
        assert!(!Value::has_changed(&nan, &Value::from(f64::NAN)));
    }

    #[test]
    fn signed_zeros_are_equal() {
        let mut set = HashSet::new();
        set.insert(Value::from(0.0));
        assert!(set.contains(&Value::from(-0.0)));
        assert!(!Value::has_changed(&Value::from(-0.0), &Value::from(0.0)));
    }

    #[test]
    fn objects_compare_by_identity() {
        let a = Value::new_object([("x", 1)]);
        let b = Value::new_object([("x", 1)]);

        assert_eq!(a, a.clone());
        assert_ne!(a, b);
    }

    #[test]
    fn index_names_normalise() {
        assert_eq!(PropKey::from("3"), PropKey::Index(3));
        assert_eq!(PropKey::from("03"), PropKey::Name(Arc::from("03")));
        assert_eq!(PropKey::from("x"), PropKey::Name(Arc::from("x")));
        assert!(PropKey::from("length").is_length());
    }

    #[test]
    fn symbols_are_unique() {
        let a = Symbol::new("tag");
        let b = Symbol::new("tag");

        assert_ne!(a, b);
        assert_eq!(Symbol::iterator(), Symbol::iterator());
        assert!(Symbol::iterator().is_well_known());
        assert!(!a.is_well_known());
    }

    #[test]
    fn primitives_ignore_accessors() {
        let five = Value::from(5);

        assert!(five.get("x").is_undefined());
        assert!(!five.set("x", 1));
        assert!(!five.has("x"));
        assert!(five.own_keys().is_empty());
        assert_eq!(five.size(), 0);
        assert_eq!(five.keys().count(), 0);
    }

    #[test]
    fn raw_array_accessors() {
        let arr = Value::new_array([1, 2, 3]);

        assert_eq!(arr.len(), 3);
        assert!(arr.push(4));
        assert_eq!(arr.len(), 4);
        assert_eq!(arr.get(3).as_number(), Some(4.0));
        assert_eq!(arr.index_of(&Value::from(2)), Some(1));
        assert!(!arr.includes(&Value::from(9)));
    }

    #[test]
    fn map_default_iteration_yields_pairs() {
        let map = Value::new_map([("a", 1)]);
        let pairs: Vec<Value> = map.iter().collect();

        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].get(0).as_str(), Some("a"));
        assert_eq!(pairs[0].get(1).as_number(), Some(1.0));
    }
}
