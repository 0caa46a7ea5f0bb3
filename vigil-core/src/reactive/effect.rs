//! Effect Implementation
//!
//! An Effect is a tracked computation that re-runs whenever a property it
//! read during its last run changes.
//!
//! # How Effects Work
//!
//! 1. When created, the effect runs immediately (unless `lazy`) to establish
//!    its initial dependencies.
//!
//! 2. Before every run the effect unsubscribes from all dependency sets it
//!    belongs to. The run then re-subscribes to exactly what it reads, so a
//!    branch that is no longer taken stops being tracked.
//!
//! 3. When a dependency changes, the effect is handed to its scheduler, or
//!    re-run synchronously when it has none.
//!
//! # Lifecycle
//!
//! [`Effect::stop`] removes the effect from every dependency set, calls its
//! `on_stop` hook and marks it inactive. An inactive effect can still be
//! invoked; it then calls its function directly without any tracking.
//!
//! The registry refers to effects weakly, so an effect lives exactly as
//! long as some [`Effect`] handle does. Dropping the last handle leaves
//! every dependency set without calling `on_stop`.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use smallvec::SmallVec;
use tracing::debug;

use super::context::ReactiveContext;
use super::dep::{DebuggerEvent, Dep, WeakDep};
use super::runtime::Runtime;
use crate::proxy::Value;

/// Unique identifier for an effect.
///
/// Ids are handed out in creation order, which the job queue relies on to
/// run outer effects before the effects they create.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EffectId(u64);

impl EffectId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for EffectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "effect#{}", self.0)
    }
}

/// The computation wrapped by an effect.
pub type EffectFn = Arc<dyn Fn() -> Value + Send + Sync>;

/// Override for how a triggered effect is re-run.
pub type Scheduler = Arc<dyn Fn(&Effect) + Send + Sync>;

/// Hook receiving track/trigger notifications for one effect.
pub type DebuggerHook = Arc<dyn Fn(&DebuggerEvent) + Send + Sync>;

/// Options recognised by [`effect`].
#[derive(Clone, Default)]
pub struct EffectOptions {
    /// Do not run on creation.
    pub lazy: bool,
    /// Schedule ahead of ordinary effects within one trigger.
    pub computed: bool,
    pub scheduler: Option<Scheduler>,
    pub on_stop: Option<Arc<dyn Fn() + Send + Sync>>,
    pub on_track: Option<DebuggerHook>,
    pub on_trigger: Option<DebuggerHook>,
}

impl EffectOptions {
    pub fn lazy(mut self) -> Self {
        self.lazy = true;
        self
    }

    pub fn computed(mut self) -> Self {
        self.computed = true;
        self
    }

    pub fn scheduler<F>(mut self, scheduler: F) -> Self
    where
        F: Fn(&Effect) + Send + Sync + 'static,
    {
        self.scheduler = Some(Arc::new(scheduler));
        self
    }

    pub fn on_stop<F>(mut self, on_stop: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_stop = Some(Arc::new(on_stop));
        self
    }

    pub fn on_track<F>(mut self, hook: F) -> Self
    where
        F: Fn(&DebuggerEvent) + Send + Sync + 'static,
    {
        self.on_track = Some(Arc::new(hook));
        self
    }

    pub fn on_trigger<F>(mut self, hook: F) -> Self
    where
        F: Fn(&DebuggerEvent) + Send + Sync + 'static,
    {
        self.on_trigger = Some(Arc::new(hook));
        self
    }
}

impl fmt::Debug for EffectOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectOptions")
            .field("lazy", &self.lazy)
            .field("computed", &self.computed)
            .field("scheduler", &self.scheduler.is_some())
            .field("on_stop", &self.on_stop.is_some())
            .field("on_track", &self.on_track.is_some())
            .field("on_trigger", &self.on_trigger.is_some())
            .finish()
    }
}

/// Anything [`effect`] can wrap.
///
/// Closures returning anything convertible to [`Value`] qualify. So do
/// existing effects, in which case their underlying function is re-wrapped
/// rather than the effect itself.
pub trait IntoEffectFn {
    fn into_effect_fn(self) -> EffectFn;
}

impl<F, R> IntoEffectFn for F
where
    F: Fn() -> R + Send + Sync + 'static,
    R: Into<Value>,
{
    fn into_effect_fn(self) -> EffectFn {
        Arc::new(move || self().into())
    }
}

impl IntoEffectFn for Effect {
    fn into_effect_fn(self) -> EffectFn {
        self.raw()
    }
}

impl IntoEffectFn for &Effect {
    fn into_effect_fn(self) -> EffectFn {
        self.raw()
    }
}

struct EffectInner {
    id: EffectId,
    func: EffectFn,
    active: AtomicBool,
    options: EffectOptions,
    /// Dependency sets this effect currently belongs to.
    deps: Mutex<SmallVec<[WeakDep; 4]>>,
    run_count: AtomicUsize,
}

impl Drop for EffectInner {
    fn drop(&mut self) {
        release(self.id, std::mem::take(self.deps.get_mut()));
    }
}

/// A tracked, re-runnable computation.
///
/// Cloning an `Effect` clones the handle; all clones share one identity.
#[derive(Clone)]
pub struct Effect(Arc<EffectInner>);

/// Non-owning handle held by dependency sets.
#[derive(Clone)]
pub(crate) struct WeakEffect(Weak<EffectInner>);

impl WeakEffect {
    pub fn upgrade(&self) -> Option<Effect> {
        self.0.upgrade().map(Effect)
    }

    pub fn is_alive(&self) -> bool {
        self.0.strong_count() > 0
    }
}

/// Wrap `f` in an effect and run it once unless `options.lazy` is set.
///
/// # Example
///
/// ```rust
/// use vigil_core::proxy::{reactive, Value};
/// use vigil_core::reactive::{effect, EffectOptions};
///
/// let state = reactive(Value::new_object([("count", 1)]));
/// let state_clone = state.clone();
/// let counter = effect(move || state_clone.get("count"), EffectOptions::default());
///
/// state.set("count", 2);
/// assert_eq!(counter.run().as_number(), Some(2.0));
/// ```
pub fn effect(f: impl IntoEffectFn, options: EffectOptions) -> Effect {
    let lazy = options.lazy;
    let effect = Effect(Arc::new(EffectInner {
        id: EffectId::next(),
        func: f.into_effect_fn(),
        active: AtomicBool::new(true),
        options,
        deps: Mutex::new(SmallVec::new()),
        run_count: AtomicUsize::new(0),
    }));

    if !lazy {
        effect.run();
    }

    effect
}

/// Tear an effect down. See [`Effect::stop`].
pub fn stop(effect: &Effect) {
    effect.stop();
}

impl Effect {
    pub fn id(&self) -> EffectId {
        self.0.id
    }

    pub fn options(&self) -> &EffectOptions {
        &self.0.options
    }

    /// The underlying function, unwrapped from its bookkeeping.
    pub fn raw(&self) -> EffectFn {
        Arc::clone(&self.0.func)
    }

    pub fn is_active(&self) -> bool {
        self.0.active.load(Ordering::SeqCst)
    }

    /// Invoke the effect and return what its function returned.
    ///
    /// An inactive effect just calls its function. An effect that is already
    /// running further up the stack is skipped and yields `Undefined`.
    /// A panic in the function propagates after the tracking context has
    /// been restored.
    pub fn run(&self) -> Value {
        if !self.is_active() {
            return (self.0.func)();
        }
        if ReactiveContext::is_running(self.id()) {
            return Value::Undefined;
        }

        self.cleanup();
        let _ctx = ReactiveContext::enter(self.clone());
        self.0.run_count.fetch_add(1, Ordering::Relaxed);
        (self.0.func)()
    }

    /// Unsubscribe from everything, call `on_stop`, and go inactive.
    ///
    /// Calling `stop` on an inactive effect does nothing.
    pub fn stop(&self) {
        if !self.0.active.swap(false, Ordering::SeqCst) {
            return;
        }
        self.cleanup();
        if let Some(on_stop) = &self.0.options.on_stop {
            on_stop();
        }
        debug!(effect = %self.id(), "effect stopped");
    }

    /// Number of times the effect has executed under tracking.
    pub fn run_count(&self) -> usize {
        self.0.run_count.load(Ordering::Relaxed)
    }

    /// Number of live dependency sets this effect belongs to.
    pub fn dependency_count(&self) -> usize {
        self.0
            .deps
            .lock()
            .iter()
            .filter(|dep| dep.strong_count() > 0)
            .count()
    }

    pub(crate) fn record_dependency(&self, dep: &Dep) {
        self.0.deps.lock().push(dep.downgrade());
    }

    pub(crate) fn downgrade(&self) -> WeakEffect {
        WeakEffect(Arc::downgrade(&self.0))
    }

    fn cleanup(&self) {
        let deps = std::mem::take(&mut *self.0.deps.lock());
        release(self.id(), deps);
    }
}

/// Leave every set in `deps`, pruning the ones left empty from the registry.
fn release(effect_id: EffectId, deps: SmallVec<[WeakDep; 4]>) {
    for weak in deps {
        if let Some(dep) = Dep::upgrade(&weak) {
            if dep.unsubscribe(effect_id) {
                Runtime::prune(&dep);
            }
        }
    }
}

impl PartialEq for Effect {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}

impl Eq for Effect {}

impl std::hash::Hash for Effect {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.id.hash(state);
    }
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.0.id)
            .field("active", &self.is_active())
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependency_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
