//! Job Queue
//!
//! A batching scheduler for effects. Instead of re-running as soon as a
//! dependency changes, an effect whose scheduler is a queue's
//! [`JobQueue::scheduler`] is enqueued, and runs when the queue is flushed.
//!
//! # Algorithm
//!
//! 1. Enqueueing is deduplicated by effect id: any number of triggers
//!    between two flushes cause a single re-run.
//! 2. A flush repeatedly takes the queued effect with the lowest id.
//!    Ids follow creation order, so outer effects run before the effects
//!    they created.
//! 3. Effects queued while flushing run in the same flush. Stopped effects
//!    are skipped, and so are effects whose last handle was dropped: the
//!    queue does not own what it holds.
//!
//! Everything runs synchronously on the flushing thread.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;
use tracing::trace;

use super::effect::{Effect, EffectId, WeakEffect};

/// A deduplicating, id-ordered queue of pending effects.
#[derive(Clone, Default)]
pub struct JobQueue {
    jobs: Arc<Mutex<IndexMap<EffectId, WeakEffect>>>,
}

impl JobQueue {
    /// Create a new empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue an effect unless it is already pending.
    pub fn queue(&self, effect: &Effect) {
        self.jobs
            .lock()
            .entry(effect.id())
            .or_insert_with(|| effect.downgrade());
    }

    /// A scheduler callback for [`EffectOptions::scheduler`] that enqueues
    /// into this queue.
    ///
    /// [`EffectOptions::scheduler`]: super::EffectOptions::scheduler
    pub fn scheduler(&self) -> impl Fn(&Effect) + Send + Sync + 'static {
        let queue = self.clone();
        move |effect: &Effect| queue.queue(effect)
    }

    /// Run queued effects until none are left. Returns how many ran.
    pub fn flush(&self) -> usize {
        let mut ran = 0;

        while let Some(job) = self.pop_lowest() {
            if let Some(effect) = job.upgrade().filter(Effect::is_active) {
                effect.run();
                ran += 1;
            }
        }

        trace!(ran, "job queue flushed");
        ran
    }

    /// Number of pending effects.
    pub fn pending(&self) -> usize {
        self.jobs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.lock().is_empty()
    }

    fn pop_lowest(&self) -> Option<WeakEffect> {
        let mut jobs = self.jobs.lock();
        let lowest = jobs.keys().min().copied()?;
        jobs.shift_remove(&lowest)
    }
}

impl fmt::Debug for JobQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobQueue")
            .field("pending", &self.pending())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{effect, new_ref, EffectOptions};
    use std::sync::atomic::{AtomicI32, Ordering};

    #[test]
    fn triggers_are_batched_until_flush() {
        let queue = JobQueue::new();
        let source = new_ref(0);
        let runs = Arc::new(AtomicI32::new(0));

        let source_clone = source.clone();
        let runs_clone = runs.clone();
        let _e = effect(
            move || {
                source_clone.value();
                runs_clone.fetch_add(1, Ordering::SeqCst);
            },
            EffectOptions::default().scheduler(queue.scheduler()),
        );

        source.set_value(1);
        source.set_value(2);
        source.set_value(3);

        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(queue.pending(), 1);

        assert_eq!(queue.flush(), 1);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert!(queue.is_empty());
    }

    #[test]
    fn flush_runs_in_creation_order() {
        let queue = JobQueue::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        let log_clone = log.clone();
        let first = effect(
            move || log_clone.lock().push(1),
            EffectOptions::default().lazy(),
        );
        let log_clone = log.clone();
        let second = effect(
            move || log_clone.lock().push(2),
            EffectOptions::default().lazy(),
        );

        queue.queue(&second);
        queue.queue(&first);
        queue.flush();

        assert_eq!(*log.lock(), vec![1, 2]);
    }

    #[test]
    fn stopped_jobs_are_skipped() {
        let queue = JobQueue::new();
        let runs = Arc::new(AtomicI32::new(0));

        let runs_clone = runs.clone();
        let e = effect(
            move || {
                runs_clone.fetch_add(1, Ordering::SeqCst);
            },
            EffectOptions::default().lazy(),
        );

        queue.queue(&e);
        e.stop();

        assert_eq!(queue.flush(), 0);
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn dropped_jobs_are_skipped() {
        let queue = JobQueue::new();
        let runs = Arc::new(AtomicI32::new(0));

        let runs_clone = runs.clone();
        let e = effect(
            move || {
                runs_clone.fetch_add(1, Ordering::SeqCst);
            },
            EffectOptions::default().lazy(),
        );

        queue.queue(&e);
        drop(e);

        assert_eq!(queue.pending(), 1);
        assert_eq!(queue.flush(), 0);
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn jobs_queued_during_flush_run_in_same_flush() {
        let queue = JobQueue::new();
        let source = new_ref(0);
        let runs = Arc::new(AtomicI32::new(0));

        let source_clone = source.clone();
        let runs_clone = runs.clone();
        let _reader = effect(
            move || {
                source_clone.value();
                runs_clone.fetch_add(1, Ordering::SeqCst);
            },
            EffectOptions::default().scheduler(queue.scheduler()),
        );

        let source_clone = source.clone();
        let writer = effect(
            move || source_clone.set_value(42),
            EffectOptions::default().lazy(),
        );

        queue.queue(&writer);
        assert_eq!(queue.flush(), 2);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }
}
