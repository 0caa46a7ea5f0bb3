//! Tracking Context
//!
//! The tracking context records which effect is currently running so that
//! property reads can be attributed to it.
//!
//! # Implementation
//!
//! We use a thread-local stack of running effects. Entering an effect pushes
//! it and forces tracking on; the returned guard pops it and restores the
//! previous tracking flag when dropped, so the stack stays balanced even if
//! the effect function panics.
//!
//! Tracking itself can be suspended independently of the effect stack with
//! [`pause_tracking`], [`enable_tracking`] and [`reset_tracking`]. These form
//! a LIFO discipline: every pause or enable must be paired with one reset.

use std::cell::{Cell, RefCell};

use super::effect::{Effect, EffectId};

thread_local! {
    /// Effects currently executing on this thread, innermost last.
    static EFFECT_STACK: RefCell<Vec<Effect>> = const { RefCell::new(Vec::new()) };

    /// Whether reads are currently attributed to the active effect.
    static SHOULD_TRACK: Cell<bool> = const { Cell::new(true) };

    /// Saved values of `SHOULD_TRACK`, restored by `reset_tracking`.
    static TRACK_STACK: RefCell<Vec<bool>> = const { RefCell::new(Vec::new()) };
}

/// Suspend dependency tracking until the matching [`reset_tracking`].
pub fn pause_tracking() {
    TRACK_STACK.with(|stack| stack.borrow_mut().push(SHOULD_TRACK.get()));
    SHOULD_TRACK.set(false);
}

/// Force dependency tracking on until the matching [`reset_tracking`].
pub fn enable_tracking() {
    TRACK_STACK.with(|stack| stack.borrow_mut().push(SHOULD_TRACK.get()));
    SHOULD_TRACK.set(true);
}

/// Restore the tracking flag saved by the last pause or enable.
///
/// Defaults to tracking enabled when nothing was saved.
pub fn reset_tracking() {
    let last = TRACK_STACK.with(|stack| stack.borrow_mut().pop());
    SHOULD_TRACK.set(last.unwrap_or(true));
}

/// Run `f` with tracking paused. Reads inside `f` register nothing.
pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
    struct Resume;

    impl Drop for Resume {
        fn drop(&mut self) {
            reset_tracking();
        }
    }

    pause_tracking();
    let _resume = Resume;
    f()
}

/// Guard for one effect execution.
///
/// Pops the effect and restores the tracking flag when dropped.
pub struct ReactiveContext {
    effect_id: EffectId,
}

impl ReactiveContext {
    /// Enter the given effect: force tracking on and make it current.
    ///
    /// The effect stays current until the returned guard is dropped.
    pub(crate) fn enter(effect: Effect) -> Self {
        let effect_id = effect.id();
        enable_tracking();
        EFFECT_STACK.with(|stack| stack.borrow_mut().push(effect));

        Self { effect_id }
    }

    /// The innermost running effect, if any.
    pub fn active_effect() -> Option<Effect> {
        EFFECT_STACK.with(|stack| stack.borrow().last().cloned())
    }

    /// Whether the given effect is anywhere on the running stack.
    pub fn is_running(effect_id: EffectId) -> bool {
        EFFECT_STACK.with(|stack| stack.borrow().iter().any(|e| e.id() == effect_id))
    }

    /// Whether tracking is currently enabled.
    pub fn should_track() -> bool {
        SHOULD_TRACK.get()
    }

    /// Whether a read right now would register a dependency.
    pub fn is_tracking() -> bool {
        Self::should_track() && EFFECT_STACK.with(|stack| !stack.borrow().is_empty())
    }

    /// Number of nested effects currently executing.
    pub fn depth() -> usize {
        EFFECT_STACK.with(|stack| stack.borrow().len())
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        let popped = EFFECT_STACK.with(|stack| stack.borrow_mut().pop());

        if let Some(effect) = &popped {
            debug_assert_eq!(
                effect.id(),
                self.effect_id,
                "ReactiveContext mismatch: expected {:?}, got {:?}",
                self.effect_id,
                effect.id()
            );
        }

        reset_tracking();
        drop(popped);
    }
}
