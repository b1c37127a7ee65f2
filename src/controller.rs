//! Owns the clicker and typer workers and the start hotkey watcher on behalf
//! of the GUI, and turns their events into toggle state.

use crate::{
    error::ConfigError,
    hotkey::{HotkeyWatcher, DEFAULT_DEBOUNCE},
    keys::Key,
    prefs::{Preferences, PrefsStore},
    signal::Waker,
    worker::{
        Action, FinishReason, Ports, StopCondition, TimedWorker, WorkerConfig, WorkerEvent,
        WorkerState,
    },
};
use std::fmt;
use tracing::{debug, info, warn};

pub const CLICKER_COUNTDOWN_SECS: u32 = 5;
pub const DEFAULT_STOP_KEY: &str = "q";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimeUnit {
    Milliseconds,
    Seconds,
    Minutes,
}

impl TimeUnit {
    pub fn to_secs(self, value: f64) -> f64 {
        match self {
            TimeUnit::Milliseconds => value / 1000.0,
            TimeUnit::Seconds => value,
            TimeUnit::Minutes => value * 60.0,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            TimeUnit::Milliseconds => "Milliseconds",
            TimeUnit::Seconds => "Seconds",
            TimeUnit::Minutes => "Minutes",
        }
    }
}

/// Clicker tab fields as they read when the toggle is pressed.
#[derive(Clone, Debug, PartialEq)]
pub struct ClickerSettings {
    pub interval: u32,
    pub unit: TimeUnit,
    /// Blank means [`DEFAULT_STOP_KEY`].
    pub stop_key: String,
    pub countdown_secs: u32,
}

impl Default for ClickerSettings {
    fn default() -> Self {
        Self {
            interval: 100,
            unit: TimeUnit::Milliseconds,
            stop_key: DEFAULT_STOP_KEY.to_string(),
            countdown_secs: CLICKER_COUNTDOWN_SECS,
        }
    }
}

impl ClickerSettings {
    pub fn to_config(&self) -> Result<WorkerConfig, ConfigError> {
        let name = if self.stop_key.trim().is_empty() && self.stop_key != " " {
            DEFAULT_STOP_KEY
        } else {
            self.stop_key.as_str()
        };
        let stop_key = Key::parse(name)?;
        Ok(WorkerConfig::new(self.unit.to_secs(self.interval as f64), Action::Click)?
            .with_stop_condition(StopCondition::KeyHeld(stop_key))
            .with_countdown(self.countdown_secs))
    }
}

/// Typer tab fields as they read when the toggle is pressed.
#[derive(Clone, Debug, PartialEq)]
pub struct TyperSettings {
    pub interval: f64,
    pub unit: TimeUnit,
    /// 0 means unlimited.
    pub duration_secs: u32,
    pub text: String,
}

impl Default for TyperSettings {
    fn default() -> Self {
        Self { interval: 1.0, unit: TimeUnit::Seconds, duration_secs: 0, text: String::new() }
    }
}

impl TyperSettings {
    pub fn to_config(&self) -> Result<WorkerConfig, ConfigError> {
        let action = Action::type_text(self.text.clone())?;
        WorkerConfig::new(self.unit.to_secs(self.interval), action)?
            .with_duration(self.duration_secs as f64)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    Clicker,
    Typer,
}

/// What a toggle button shows.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ToggleStatus {
    Off,
    StartingIn(u32),
    On,
}

impl ToggleStatus {
    pub fn is_on(self) -> bool { self != ToggleStatus::Off }
}

impl fmt::Display for ToggleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToggleStatus::Off => f.write_str("OFF"),
            ToggleStatus::StartingIn(n) => write!(f, "Starting in {n}"),
            ToggleStatus::On => f.write_str("ON"),
        }
    }
}

/// Something the GUI should react to, produced by [`Controller::poll`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Notice {
    Countdown(Role, u32),
    Finished(Role, FinishReason),
    HotkeyPressed,
}

struct Slot {
    role: Role,
    worker: Option<TimedWorker>,
    // Stopped predecessors still finishing their last action.
    retired: Vec<TimedWorker>,
    status: ToggleStatus,
}

impl Slot {
    fn new(role: Role) -> Self {
        Self { role, worker: None, retired: Vec::new(), status: ToggleStatus::Off }
    }

    /// A worker that has not been asked to stop.
    fn is_live(&self) -> bool {
        self.worker.as_ref().is_some_and(|w| !w.stop_requested() && !w.is_finished())
    }

    fn start(&mut self, config: WorkerConfig, ports: &Ports, waker: &Option<Waker>) -> bool {
        if self.is_live() { return false; }
        if let Some(old) = self.worker.take() {
            old.stop();
            self.retired.push(old);
        }
        self.status = match config.countdown_secs() {
            0 => ToggleStatus::On,
            n => ToggleStatus::StartingIn(n),
        };
        self.worker = Some(TimedWorker::start(config, ports.clone(), waker.clone()));
        true
    }

    fn worker_state(&self) -> WorkerState {
        self.worker.as_ref().map_or(WorkerState::Idle, |w| w.state())
    }

    fn stop(&mut self) {
        if let Some(worker) = &self.worker { worker.stop(); }
        self.status = ToggleStatus::Off;
    }

    fn poll(&mut self, notices: &mut Vec<Notice>) {
        // Superseded workers no longer drive the toggle; their events are dropped.
        self.retired.retain_mut(|old| {
            let alive = old.is_alive();
            let events = old.try_events();
            if old.is_finished() || !alive {
                debug!(role = ?self.role, ?events, "retired worker exited");
                return false;
            }
            true
        });

        let Some(worker) = self.worker.as_mut() else { return };
        // Sampled before draining: a dead thread's events are all queued.
        let alive = worker.is_alive();
        for event in worker.try_events() {
            match event {
                WorkerEvent::Countdown(0) => {
                    if self.status.is_on() { self.status = ToggleStatus::On; }
                    notices.push(Notice::Countdown(self.role, 0));
                }
                WorkerEvent::Countdown(n) => {
                    if self.status.is_on() { self.status = ToggleStatus::StartingIn(n); }
                    notices.push(Notice::Countdown(self.role, n));
                }
                WorkerEvent::Finished(reason) => {
                    self.status = ToggleStatus::Off;
                    notices.push(Notice::Finished(self.role, reason));
                }
            }
        }
        if worker.is_finished() {
            self.worker = None;
        } else if !alive {
            warn!(role = ?self.role, "worker exited without finishing");
            self.worker = None;
            self.status = ToggleStatus::Off;
            notices.push(Notice::Finished(self.role, FinishReason::PortFailure));
        }
    }

    fn shutdown(&mut self) {
        for worker in self.worker.take().into_iter().chain(self.retired.drain(..)) {
            worker.stop();
            worker.join();
        }
        self.status = ToggleStatus::Off;
    }
}

pub struct Controller {
    ports: Ports,
    store: Box<dyn PrefsStore>,
    prefs: Preferences,
    waker: Option<Waker>,
    clicker: Slot,
    typer: Slot,
    hotkey: Option<Key>,
    watcher: Option<HotkeyWatcher>,
    retired: Vec<HotkeyWatcher>,
}

impl Controller {
    pub fn new(ports: Ports, store: Box<dyn PrefsStore>, waker: Option<Waker>) -> Self {
        let prefs = store.load();
        Self {
            ports,
            store,
            prefs,
            waker,
            clicker: Slot::new(Role::Clicker),
            typer: Slot::new(Role::Typer),
            hotkey: None,
            watcher: None,
            retired: Vec::new(),
        }
    }

    pub fn preferences(&self) -> Preferences { self.prefs }

    /// Replaces and persists the preferences. Save failures are logged only.
    pub fn set_preferences(&mut self, prefs: Preferences) {
        self.prefs = prefs;
        if let Err(e) = self.store.save(&prefs) {
            warn!("failed to save preferences: {e}");
        }
    }

    pub fn toggle_clicker(&mut self, on: bool, settings: &ClickerSettings) -> Result<(), ConfigError> {
        if on {
            let config = settings.to_config()?;
            self.start_watcher();
            self.start_worker(Role::Clicker, config);
        } else {
            self.clicker.stop();
            self.stop_watcher();
        }
        Ok(())
    }

    /// Starts the clicker unless one is already live. Returns whether a new
    /// worker was started.
    pub fn start_clicker(&mut self, settings: &ClickerSettings) -> Result<bool, ConfigError> {
        let config = settings.to_config()?;
        Ok(self.start_worker(Role::Clicker, config))
    }

    pub fn toggle_typer(&mut self, on: bool, settings: &TyperSettings) -> Result<(), ConfigError> {
        if on {
            let config = settings.to_config()?;
            self.start_worker(Role::Typer, config);
        } else {
            self.typer.stop();
        }
        Ok(())
    }

    /// Sets the key that starts the clicker. A running watcher switches to
    /// the new key.
    pub fn set_hotkey(&mut self, key: Option<Key>) {
        if key == self.hotkey { return; }
        self.hotkey = key;
        if self.watcher.is_some() {
            self.stop_watcher();
            self.start_watcher();
        }
    }

    pub fn is_watching_hotkey(&self) -> bool { self.watcher.is_some() }

    pub fn status(&self, role: Role) -> ToggleStatus {
        match role {
            Role::Clicker => self.clicker.status,
            Role::Typer => self.typer.status,
        }
    }

    /// Lifecycle of the worker currently held for `role`.
    pub fn worker_state(&self, role: Role) -> WorkerState {
        match role {
            Role::Clicker => self.clicker.worker_state(),
            Role::Typer => self.typer.worker_state(),
        }
    }

    pub fn is_live(&self, role: Role) -> bool {
        match role {
            Role::Clicker => self.clicker.is_live(),
            Role::Typer => self.typer.is_live(),
        }
    }

    /// Drains everything the background threads reported since the last
    /// call. Run on the GUI thread once per frame.
    pub fn poll(&mut self) -> Vec<Notice> {
        let mut notices = Vec::new();
        self.clicker.poll(&mut notices);
        self.typer.poll(&mut notices);
        if let Some(watcher) = &self.watcher {
            notices.extend((0..watcher.try_presses()).map(|_| Notice::HotkeyPressed));
        }
        self.retired.retain(|w| w.is_alive());
        notices
    }

    /// Stops every background thread and waits for them.
    pub fn shutdown(&mut self) {
        self.clicker.shutdown();
        self.typer.shutdown();
        if let Some(watcher) = self.watcher.take() { watcher.join(); }
        for watcher in self.retired.drain(..) { watcher.join(); }
    }

    fn start_worker(&mut self, role: Role, config: WorkerConfig) -> bool {
        let slot = match role {
            Role::Clicker => &mut self.clicker,
            Role::Typer => &mut self.typer,
        };
        let started = slot.start(config, &self.ports, &self.waker);
        if !started { info!(?role, "already running, ignoring start"); }
        started
    }

    fn start_watcher(&mut self) {
        if self.watcher.is_some() { return; }
        if let Some(key) = self.hotkey {
            self.watcher = Some(HotkeyWatcher::start(
                key,
                self.ports.keys.clone(),
                DEFAULT_DEBOUNCE,
                self.waker.clone(),
            ));
        }
    }

    fn stop_watcher(&mut self) {
        if let Some(watcher) = self.watcher.take() {
            watcher.stop();
            self.retired.push(watcher);
        }
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        self.shutdown();
    }
}
