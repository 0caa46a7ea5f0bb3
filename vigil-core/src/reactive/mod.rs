//! Reactive Primitives
//!
//! This module implements the dependency-tracking engine: effects, the
//! property registry, refs and computed values.
//!
//! # Concepts
//!
//! ## Effects
//!
//! An Effect wraps a computation. While it runs, every tracked read is
//! attributed to it; when one of those reads is invalidated by a write, the
//! effect runs again (or is handed to its scheduler).
//!
//! ## Track and Trigger
//!
//! [`track`] links the running effect to a (target, key) pair and
//! [`trigger`] notifies everything linked to a written pair. Proxies, refs
//! and computed values are all built on these two hooks, and so can custom
//! primitives.
//!
//! ## Refs and Computed Values
//!
//! A [`Ref`] is a single reactive slot. A [`Computed`] is a lazily
//! recomputed, cached value derived from other reactive state.
//!
//! # Implementation Notes
//!
//! The stack of running effects is thread-local; the registry is
//! process-wide and keyed by target identity. Execution is synchronous:
//! nothing here suspends or spawns.

mod computed;
mod context;
mod dep;
mod effect;
mod lock;
mod reference;
mod runtime;
mod scheduler;
mod target;

pub use computed::{computed, computed_with, Computed};
pub use context::{enable_tracking, pause_tracking, reset_tracking, untracked, ReactiveContext};
pub use dep::{DebuggerEvent, DebuggerEventKind, DepKey, TrackOp, TriggerOp};
pub use effect::{
    effect, stop, DebuggerHook, Effect, EffectFn, EffectId, EffectOptions, IntoEffectFn, Scheduler,
};
pub use lock::{is_locked, lock, unlock};
pub use reference::{is_ref, new_ref, shallow_ref, to_ref, to_refs, unref, Ref};
pub use runtime::{track, trigger, Runtime};
pub use scheduler::JobQueue;
pub use target::{ObservableKind, Target, TargetId};

pub(crate) use reference::WeakRef;

#[cfg(test)]
pub(crate) use lock::serial;
