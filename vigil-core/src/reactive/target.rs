//! Trackable targets.
//!
//! Anything that can own dependency sets in the registry is named by a
//! [`Target`]: observable objects, refs and computed values. A target is an
//! identity token plus the observable kind that decides how triggers fan out.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Unique identifier for a trackable target.
///
/// Each observable object, ref or computed gets a unique ID when created.
/// The registry is keyed by this ID, so unrelated targets never collide even
/// when they hold equal contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetId(u64);

impl TargetId {
    /// Generate a new unique target ID.
    ///
    /// Uses an atomic counter to ensure uniqueness across threads.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for TargetId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The closed set of observable storage kinds.
///
/// Decided once when an object is created and switched on exhaustively
/// afterwards; plain objects and arrays go through the property handlers,
/// the four keyed collections through the collection handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObservableKind {
    /// A plain keyed record.
    Object,
    /// An index-addressed list with a `length`.
    Array,
    /// An insertion-ordered key/value collection.
    Map,
    /// An insertion-ordered value collection.
    Set,
    /// A key/value collection holding its object keys weakly.
    WeakMap,
    /// A value collection holding its object members weakly.
    WeakSet,
}

impl ObservableKind {
    /// Whether values of this kind are accessed through collection methods
    /// rather than property reads and writes.
    pub fn is_collection(self) -> bool {
        !matches!(self, Self::Object | Self::Array)
    }

    /// Whether this collection holds its keys weakly. Weak collections are
    /// neither sized nor iterable.
    pub fn is_weak(self) -> bool {
        matches!(self, Self::WeakMap | Self::WeakSet)
    }

    /// Whether members of this collection are key/value pairs.
    pub fn is_keyed(self) -> bool {
        matches!(self, Self::Map | Self::WeakMap)
    }
}

/// A trackable thing: identity plus observable kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Target {
    id: TargetId,
    kind: ObservableKind,
}

impl Target {
    /// Mint a fresh target. Custom reactive primitives built directly on
    /// [`track`](crate::reactive::track) and
    /// [`trigger`](crate::reactive::trigger) use this to get an identity.
    pub fn new(kind: ObservableKind) -> Self {
        Self {
            id: TargetId::new(),
            kind,
        }
    }

    pub fn id(&self) -> TargetId {
        self.id
    }

    pub fn kind(&self) -> ObservableKind {
        self.kind
    }
}
