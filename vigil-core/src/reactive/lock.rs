//! Global readonly lock.
//!
//! Readonly proxies and readonly collections only reject mutations while
//! the lock is engaged. Internal machinery that has to write through a
//! readonly facade unlocks around that write and locks again afterwards.
//! There is a single process-wide flag and no automatic re-lock.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::debug;

static LOCKED: AtomicBool = AtomicBool::new(true);

/// Engage readonly enforcement.
pub fn lock() {
    LOCKED.store(true, Ordering::SeqCst);
    debug!("readonly enforcement locked");
}

/// Suspend readonly enforcement until the next [`lock`].
pub fn unlock() {
    LOCKED.store(false, Ordering::SeqCst);
    debug!("readonly enforcement unlocked");
}

pub fn is_locked() -> bool {
    LOCKED.load(Ordering::SeqCst)
}

/// Serialises unit tests that toggle or rely on the process-wide lock.
#[cfg(test)]
pub(crate) fn serial() -> parking_lot::MutexGuard<'static, ()> {
    static SERIAL: parking_lot::Mutex<()> = parking_lot::const_mutex(());
    SERIAL.lock()
}
