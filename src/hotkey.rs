//! Polls one key and reports debounced presses.
//!
//! A press fires whenever the key reads held and a full debounce window has
//! passed since the previous press, so holding the key down repeats once per
//! window rather than once per poll.

use crate::{
    keys::{Key, KeyStatePort},
    signal::{StopSignal, Waker},
};
use parking_lot::Mutex;
use std::{
    sync::{
        mpsc::{self, Receiver},
        Arc,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};
use tracing::{debug, error, info};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);
pub const POLL_INTERVAL: Duration = Duration::from_millis(50);

pub struct HotkeyWatcher {
    key: Key,
    // Guards delivery: once false, the thread sends nothing more.
    live: Arc<Mutex<bool>>,
    signal: Arc<StopSignal>,
    presses: Receiver<Instant>,
    thread: Option<JoinHandle<()>>,
}

impl HotkeyWatcher {
    /// Starts polling `key`. Debounce windows shorter than
    /// [`DEFAULT_DEBOUNCE`] are raised to it.
    pub fn start(
        key: Key,
        keys: Arc<dyn KeyStatePort>,
        debounce: Duration,
        waker: Option<Waker>,
    ) -> Self {
        let debounce = debounce.max(DEFAULT_DEBOUNCE);
        let live = Arc::new(Mutex::new(true));
        let signal = Arc::new(StopSignal::new());
        let (tx, presses) = mpsc::channel();

        info!(%key, ?debounce, "watching hotkey");

        let thread = {
            let live = Arc::clone(&live);
            let signal = Arc::clone(&signal);
            thread::spawn(move || {
                let mut last_fire: Option<Instant> = None;
                while !signal.is_stopped() {
                    let now = Instant::now();
                    let armed = last_fire.map_or(true, |t| now.duration_since(t) >= debounce);
                    if armed && keys.is_held(key) {
                        let live = live.lock();
                        if !*live { break; }
                        debug!(%key, "hotkey pressed");
                        let _ = tx.send(now);
                        last_fire = Some(now);
                        drop(live);
                        if let Some(waker) = &waker { waker(); }
                    }
                    if signal.wait_until(Instant::now() + POLL_INTERVAL) { break; }
                }
            })
        };

        Self { key, live, signal, presses, thread: Some(thread) }
    }

    /// Stops the watcher. When this returns no further press is delivered,
    /// including one the thread was about to send.
    pub fn stop(&self) {
        *self.live.lock() = false;
        if self.signal.stop() { debug!(key = %self.key, "hotkey watcher stopped"); }
    }

    pub fn is_stopped(&self) -> bool { !*self.live.lock() }

    pub fn is_alive(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Drains pending presses; always 0 after `stop`.
    pub fn try_presses(&self) -> usize {
        let count = self.presses.try_iter().count();
        if self.is_stopped() { 0 } else { count }
    }

    /// Waits up to `timeout` for a press.
    #[cfg(test)]
    pub fn next_press(&self, timeout: Duration) -> bool {
        self.presses.recv_timeout(timeout).is_ok() && !self.is_stopped()
    }

    /// Stops and waits for the thread; bounded by one poll interval.
    pub fn join(mut self) {
        self.stop();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() { error!("hotkey thread panicked"); }
        }
    }
}

impl Drop for HotkeyWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}
