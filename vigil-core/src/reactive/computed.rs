//! Computed Values
//!
//! A computed value is a lazy effect plus a cache and a dirty flag.
//!
//! # How Computed Values Work
//!
//! 1. The getter does not run at creation. The first read runs it under
//!    tracking, caches the result and clears the dirty flag.
//!
//! 2. Reads while clean return the cache. Every read, clean or dirty,
//!    registers the reader under the computed's own `value` key.
//!
//! 3. When a dependency of the getter changes, the effect's scheduler only
//!    marks the computed dirty and notifies the computed's readers. Nothing
//!    is recomputed until the next read.
//!
//! Because the underlying effect is flagged `computed`, a trigger always
//! invalidates computed values before it re-runs ordinary effects.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use tracing::warn;

use super::dep::{DepKey, TrackOp, TriggerOp};
use super::effect::{effect, Effect, EffectOptions, IntoEffectFn};
use super::reference::Ref;
use super::runtime::{track, trigger, Runtime};
use super::target::{ObservableKind, Target};
use crate::error::{ReactivityError, Result};
use crate::proxy::Value;

type Setter = Arc<dyn Fn(Value) + Send + Sync>;

struct ComputedInner {
    target: Target,
    dirty: AtomicBool,
    value: RwLock<Value>,
    effect: Effect,
    setter: Option<Setter>,
}

impl ComputedInner {
    fn invalidate(&self) {
        if !self.dirty.swap(true, Ordering::SeqCst) {
            trigger(self.target, TriggerOp::Set, Some(DepKey::value()), None, None);
        }
    }
}

impl Drop for ComputedInner {
    fn drop(&mut self) {
        Runtime::evict(self.target.id());
    }
}

/// A cached value derived from other reactive state.
#[derive(Clone)]
pub struct Computed(Arc<ComputedInner>);

/// Create a read-only computed value.
///
/// # Example
///
/// ```rust
/// use vigil_core::reactive::{computed, new_ref};
///
/// let count = new_ref(2);
/// let count_clone = count.clone();
/// let doubled = computed(move || count_clone.value().as_number().unwrap_or(0.0) * 2.0);
///
/// assert_eq!(doubled.value().as_number(), Some(4.0));
/// count.set_value(5);
/// assert_eq!(doubled.value().as_number(), Some(10.0));
/// ```
pub fn computed(getter: impl IntoEffectFn) -> Computed {
    Computed::build(getter, None)
}

/// Create a writable computed value. Writes are forwarded to `setter`.
pub fn computed_with<S>(getter: impl IntoEffectFn, setter: S) -> Computed
where
    S: Fn(Value) + Send + Sync + 'static,
{
    Computed::build(getter, Some(Arc::new(setter)))
}

impl Computed {
    fn build(getter: impl IntoEffectFn, setter: Option<Setter>) -> Self {
        let inner = Arc::new_cyclic(|weak: &Weak<ComputedInner>| {
            let weak = weak.clone();
            let runner = effect(
                getter,
                EffectOptions::default()
                    .lazy()
                    .computed()
                    .scheduler(move |_| {
                        if let Some(inner) = weak.upgrade() {
                            inner.invalidate();
                        }
                    }),
            );

            ComputedInner {
                target: Target::new(ObservableKind::Object),
                dirty: AtomicBool::new(true),
                value: RwLock::new(Value::Undefined),
                effect: runner,
                setter,
            }
        });

        Self(inner)
    }

    /// Read the value, recomputing first if a dependency changed.
    pub fn value(&self) -> Value {
        let inner = &self.0;
        if inner.dirty.load(Ordering::SeqCst) {
            let fresh = inner.effect.run();
            let stale = std::mem::replace(&mut *inner.value.write(), fresh);
            inner.dirty.store(false, Ordering::SeqCst);
            drop(stale);
        }

        track(inner.target, TrackOp::Get, DepKey::value());
        inner.value.read().clone()
    }

    /// Forward a write to the setter. Without one, logs and ignores it.
    pub fn set_value(&self, value: impl Into<Value>) {
        if let Err(err) = self.try_set(value) {
            warn!(target_id = %self.0.target.id(), "{err}");
        }
    }

    /// Forward a write to the setter, reporting read-only computed values.
    pub fn try_set(&self, value: impl Into<Value>) -> Result<()> {
        match &self.0.setter {
            Some(setter) => {
                setter(value.into());
                Ok(())
            }
            None => Err(ReactivityError::ReadonlyComputed),
        }
    }

    /// The lazy effect running the getter. Stopping it freezes the cache.
    pub fn effect(&self) -> &Effect {
        &self.0.effect
    }

    pub fn target(&self) -> Target {
        self.0.target
    }

    pub fn is_dirty(&self) -> bool {
        self.0.dirty.load(Ordering::SeqCst)
    }

    pub fn is_writable(&self) -> bool {
        self.0.setter.is_some()
    }

    /// View this computed value as a ref, so object proxies unwrap it.
    pub fn into_ref(self) -> Ref {
        Ref::from_computed(self)
    }
}

impl From<Computed> for Value {
    fn from(computed: Computed) -> Self {
        Value::Ref(computed.into_ref())
    }
}

impl fmt::Debug for Computed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computed")
            .field("target", &self.0.target.id())
            .field("dirty", &self.is_dirty())
            .field("writable", &self.is_writable())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
