use parking_lot::{Condvar, Mutex};
use std::{sync::Arc, time::Instant};

/// Called from a background thread after it queued an event, so the owning
/// context (the GUI) knows to drain its channel.
pub type Waker = Arc<dyn Fn() + Send + Sync>;

/// Cooperative cancellation flag whose waits wake as soon as it is raised.
#[derive(Default)]
pub struct StopSignal {
    stopped: Mutex<bool>,
    cv: Condvar,
}

impl StopSignal {
    pub fn new() -> Self { Self::default() }

    /// Raises the flag. Returns `true` only for the call that raised it.
    pub fn stop(&self) -> bool {
        let mut stopped = self.stopped.lock();
        let first = !*stopped;
        *stopped = true;
        self.cv.notify_all();
        first
    }

    pub fn is_stopped(&self) -> bool { *self.stopped.lock() }

    /// Sleeps until `deadline` or until stopped. Returns `true` if stopped.
    pub fn wait_until(&self, deadline: Instant) -> bool {
        let mut stopped = self.stopped.lock();
        while !*stopped && Instant::now() < deadline {
            self.cv.wait_until(&mut stopped, deadline);
        }
        *stopped
    }
}
