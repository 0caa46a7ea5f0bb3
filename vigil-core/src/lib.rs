//! Vigil Core
//!
//! This crate provides a dependency-tracking reactivity engine. It
//! implements:
//!
//! - Effects with automatic dependency tracking and cleanup
//! - A property registry connecting reads to writes
//! - Reactive and readonly proxies over objects, arrays and keyed collections
//! - Refs, computed values and a batching job queue
//!
//! # Architecture
//!
//! The crate is organized into these modules:
//!
//! - `reactive`: effects, tracking context, registry, refs and computed values
//! - `proxy`: dynamic values, raw objects, proxies and the wrapping API
//! - `error`: the error type of the few fallible operations
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use parking_lot::Mutex;
//! use vigil_core::proxy::{reactive, Value};
//! use vigil_core::reactive::{effect, EffectOptions};
//!
//! let state = reactive(Value::new_object([("count", 1)]));
//! let seen = Arc::new(Mutex::new(Value::Undefined));
//!
//! let state_clone = state.clone();
//! let seen_clone = seen.clone();
//! let _watcher = effect(
//!     move || *seen_clone.lock() = state_clone.get("count"),
//!     EffectOptions::default(),
//! );
//!
//! state.set("count", 2);
//! assert_eq!(seen.lock().as_number(), Some(2.0));
//! ```

pub mod error;
pub mod proxy;
pub mod reactive;

pub use error::{ReactivityError, Result};
