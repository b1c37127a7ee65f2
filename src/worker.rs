//! Timed workers: a background thread that performs one action per interval
//! until it is stopped, its stop key is held, or its run duration elapses.
//!
//! A worker reports over its own channel: `Countdown(n)` for n = c..=1, then
//! `Countdown(0)` when the run phase begins, then exactly one `Finished`.

use crate::{
    error::{ConfigError, PortError},
    input::InputPort,
    keys::{Key, KeyStatePort},
    signal::{StopSignal, Waker},
};
use parking_lot::Mutex;
use std::{
    panic::{self, AssertUnwindSafe},
    sync::{
        mpsc::{self, Receiver, Sender},
        Arc,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};
use tracing::{debug, error, info, warn};

/// Intervals below this are clamped up to it.
pub const MIN_INTERVAL: Duration = Duration::from_millis(1);
/// Pause between characters when typing.
pub const TYPE_CHAR_DELAY: Duration = Duration::from_millis(50);

const COUNTDOWN_TICK: Duration = Duration::from_secs(1);
const STOP_KEY_POLL: Duration = Duration::from_millis(50);

#[derive(Clone, Debug, PartialEq)]
pub enum Action {
    Click,
    TypeText { text: String },
}

impl Action {
    pub fn type_text(text: impl Into<String>) -> Result<Self, ConfigError> {
        let text = text.into();
        if text.is_empty() { return Err(ConfigError::EmptyText); }
        Ok(Action::TypeText { text })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopCondition {
    None,
    KeyHeld(Key),
}

/// Everything a worker needs, validated up front and frozen at start.
#[derive(Clone, Debug, PartialEq)]
pub struct WorkerConfig {
    interval: Duration,
    action: Action,
    stop_condition: StopCondition,
    countdown_secs: u32,
    duration: Option<Duration>,
}

impl WorkerConfig {
    pub fn new(interval_secs: f64, action: Action) -> Result<Self, ConfigError> {
        if !interval_secs.is_finite() || interval_secs <= 0.0 {
            return Err(ConfigError::NonPositiveInterval);
        }
        let interval = Duration::try_from_secs_f64(interval_secs)
            .map_err(|_| ConfigError::NonPositiveInterval)?;
        let interval = if interval < MIN_INTERVAL {
            warn!(?interval, "interval below {:?}, clamping", MIN_INTERVAL);
            MIN_INTERVAL
        } else {
            interval
        };
        if let Action::TypeText { text } = &action {
            if text.is_empty() { return Err(ConfigError::EmptyText); }
        }
        Ok(Self {
            interval,
            action,
            stop_condition: StopCondition::None,
            countdown_secs: 0,
            duration: None,
        })
    }

    pub fn with_stop_condition(mut self, stop_condition: StopCondition) -> Self {
        self.stop_condition = stop_condition;
        self
    }

    pub fn with_countdown(mut self, secs: u32) -> Self {
        self.countdown_secs = secs;
        self
    }

    /// Limits the run phase to `secs` seconds; 0 means unlimited.
    pub fn with_duration(mut self, secs: f64) -> Result<Self, ConfigError> {
        if !secs.is_finite() || secs < 0.0 {
            return Err(ConfigError::InvalidDuration);
        }
        self.duration = if secs == 0.0 {
            None
        } else {
            Some(Duration::try_from_secs_f64(secs).map_err(|_| ConfigError::InvalidDuration)?)
        };
        Ok(self)
    }

    pub fn countdown_secs(&self) -> u32 { self.countdown_secs }

    #[cfg(test)]
    pub fn interval(&self) -> Duration { self.interval }
    #[cfg(test)]
    pub fn action(&self) -> &Action { &self.action }
    #[cfg(test)]
    pub fn stop_condition(&self) -> StopCondition { self.stop_condition }
    #[cfg(test)]
    pub fn duration(&self) -> Option<Duration> { self.duration }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    CountingDown(u32),
    Running,
    Stopped,
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkerState::Idle => f.write_str("Idle"),
            WorkerState::CountingDown(n) => write!(f, "Counting down ({n})"),
            WorkerState::Running => f.write_str("Running"),
            WorkerState::Stopped => f.write_str("Stopped"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FinishReason {
    Cancelled,
    StopKey,
    DurationElapsed,
    PortFailure,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkerEvent {
    /// Seconds left before the run phase; 0 means the run phase began.
    Countdown(u32),
    Finished(FinishReason),
}

/// The OS capabilities a worker drives.
#[derive(Clone)]
pub struct Ports {
    pub input: Arc<dyn InputPort>,
    pub keys: Arc<dyn KeyStatePort>,
}

impl Ports {
    pub fn new(input: Arc<dyn InputPort>, keys: Arc<dyn KeyStatePort>) -> Self {
        Self { input, keys }
    }
}

struct Shared {
    state: WorkerState,
    run_started: Option<Instant>,
}

/// Owner's side of a running worker thread.
pub struct TimedWorker {
    signal: Arc<StopSignal>,
    shared: Arc<Mutex<Shared>>,
    events: Receiver<WorkerEvent>,
    thread: Option<JoinHandle<()>>,
    finished: bool,
}

impl TimedWorker {
    pub fn start(config: WorkerConfig, ports: Ports, waker: Option<Waker>) -> Self {
        let signal = Arc::new(StopSignal::new());
        let shared = Arc::new(Mutex::new(Shared { state: WorkerState::Idle, run_started: None }));
        let (tx, events) = mpsc::channel();

        info!(
            action = ?config.action,
            interval = ?config.interval,
            countdown = config.countdown_secs,
            duration = ?config.duration,
            "starting worker"
        );

        let runner = Runner {
            config,
            ports,
            signal: Arc::clone(&signal),
            shared: Arc::clone(&shared),
            tx,
            waker,
        };
        let thread = thread::spawn(move || runner.run());

        Self { signal, shared, events, thread: Some(thread), finished: false }
    }

    /// Requests termination. Idempotent and never blocks on the worker.
    pub fn stop(&self) {
        if self.signal.stop() { debug!("worker stop requested"); }
    }

    pub fn stop_requested(&self) -> bool { self.signal.is_stopped() }

    pub fn state(&self) -> WorkerState { self.shared.lock().state }

    /// When the run phase began, if it has.
    #[cfg(test)]
    pub fn run_started(&self) -> Option<Instant> { self.shared.lock().run_started }

    /// True once `Finished` has been received by this handle.
    pub fn is_finished(&self) -> bool { self.finished }

    /// False once the thread has exited, even if `Finished` was never drained.
    pub fn is_alive(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Drains queued events without blocking.
    pub fn try_events(&mut self) -> Vec<WorkerEvent> {
        let events: Vec<_> = self.events.try_iter().collect();
        self.observe(&events);
        events
    }

    /// Waits up to `timeout` for the next event.
    #[cfg(test)]
    pub fn next_event(&mut self, timeout: Duration) -> Option<WorkerEvent> {
        let event = self.events.recv_timeout(timeout).ok()?;
        self.observe(std::slice::from_ref(&event));
        Some(event)
    }

    /// Blocks until the thread exits and returns the events not yet drained.
    /// Bounded by one action once `stop` has been called.
    pub fn join(mut self) -> Vec<WorkerEvent> {
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() { error!("worker thread panicked"); }
        }
        self.try_events()
    }

    fn observe(&mut self, events: &[WorkerEvent]) {
        if events.iter().any(|e| matches!(e, WorkerEvent::Finished(_))) {
            self.finished = true;
            // The thread sends Finished last, so this join returns promptly.
            if let Some(thread) = self.thread.take() {
                if thread.join().is_err() { error!("worker thread panicked"); }
            }
        }
    }
}

impl Drop for TimedWorker {
    fn drop(&mut self) {
        self.signal.stop();
    }
}

struct Runner {
    config: WorkerConfig,
    ports: Ports,
    signal: Arc<StopSignal>,
    shared: Arc<Mutex<Shared>>,
    tx: Sender<WorkerEvent>,
    waker: Option<Waker>,
}

impl Runner {
    fn run(self) {
        let reason = panic::catch_unwind(AssertUnwindSafe(|| self.run_phases())).unwrap_or_else(|_| {
            error!("worker action panicked, stopping worker");
            FinishReason::PortFailure
        });
        self.shared.lock().state = WorkerState::Stopped;
        info!(?reason, "worker finished");
        self.emit(WorkerEvent::Finished(reason));
    }

    fn run_phases(&self) -> FinishReason {
        for k in (1..=self.config.countdown_secs).rev() {
            if self.signal.is_stopped() { return FinishReason::Cancelled; }
            self.shared.lock().state = WorkerState::CountingDown(k);
            debug!(remaining = k, "countdown");
            self.emit(WorkerEvent::Countdown(k));
            if self.signal.wait_until(Instant::now() + COUNTDOWN_TICK) {
                return FinishReason::Cancelled;
            }
        }
        if self.signal.is_stopped() { return FinishReason::Cancelled; }

        let entry = Instant::now();
        {
            let mut shared = self.shared.lock();
            shared.state = WorkerState::Running;
            shared.run_started = Some(entry);
        }
        self.emit(WorkerEvent::Countdown(0));

        let deadline = self.config.duration.map(|d| entry + d);
        let mut next_tick = entry;
        loop {
            if self.signal.is_stopped() { return FinishReason::Cancelled; }
            if self.stop_key_held() { return FinishReason::StopKey; }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                return FinishReason::DurationElapsed;
            }

            if let Err(e) = self.perform() {
                error!("action failed, stopping worker: {e}");
                return FinishReason::PortFailure;
            }

            // Ticks stay anchored to run entry; an overrun fires the next one
            // immediately rather than replaying every missed tick.
            next_tick += self.config.interval;
            let now = Instant::now();
            if next_tick < now { next_tick = now; }
            let wake_at = deadline.map_or(next_tick, |d| d.min(next_tick));
            if let Some(reason) = self.sleep_until(wake_at) { return reason; }
        }
    }

    fn perform(&self) -> Result<(), PortError> {
        match &self.config.action {
            Action::Click => self.ports.input.click(),
            Action::TypeText { text } => self.ports.input.type_text(text, TYPE_CHAR_DELAY),
        }
    }

    fn stop_key_held(&self) -> bool {
        match self.config.stop_condition {
            StopCondition::KeyHeld(key) => self.ports.keys.is_held(key),
            StopCondition::None => false,
        }
    }

    fn sleep_until(&self, wake_at: Instant) -> Option<FinishReason> {
        let StopCondition::KeyHeld(key) = self.config.stop_condition else {
            return self.signal.wait_until(wake_at).then_some(FinishReason::Cancelled);
        };
        loop {
            let slice = wake_at.min(Instant::now() + STOP_KEY_POLL);
            if self.signal.wait_until(slice) { return Some(FinishReason::Cancelled); }
            if Instant::now() >= wake_at { return None; }
            if self.ports.keys.is_held(key) { return Some(FinishReason::StopKey); }
        }
    }

    fn emit(&self, event: WorkerEvent) {
        // The owner may already be gone; nobody is left to tell.
        let _ = self.tx.send(event);
        if let Some(waker) = &self.waker { waker(); }
    }
}
