//! Fake ports shared by the unit tests, plus controller scenarios that drive
//! real worker threads against them.

use crate::{
    controller::{ClickerSettings, Controller, Notice, Role, TimeUnit, ToggleStatus, TyperSettings},
    error::{ConfigError, PortError},
    input::InputPort,
    keys::{Key, KeyStatePort},
    prefs::{Preferences, PrefsStore},
    signal::Waker,
    worker::{FinishReason, Ports},
};
use assert_matches::assert_matches;
use parking_lot::Mutex;
use std::{
    collections::HashMap,
    io,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

/// Records every injected action instead of touching the OS.
#[derive(Default)]
pub struct RecordingInput {
    clicks: AtomicUsize,
    typed: Mutex<Vec<String>>,
    log: Mutex<Vec<&'static str>>,
    fail: bool,
    panics: bool,
    type_delay: Duration,
}

impl RecordingInput {
    pub fn new() -> Arc<Self> { Arc::new(Self::default()) }

    pub fn failing() -> Arc<Self> { Arc::new(Self { fail: true, ..Self::default() }) }

    pub fn panicking() -> Arc<Self> { Arc::new(Self { panics: true, ..Self::default() }) }

    /// Each `type_text` call takes `delay`, like a long text at 50 ms per char.
    pub fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self { type_delay: delay, ..Self::default() })
    }

    pub fn clicks(&self) -> usize { self.clicks.load(Ordering::SeqCst) }

    pub fn typed(&self) -> Vec<String> { self.typed.lock().clone() }

    /// Actions and waker calls in the order they happened.
    pub fn log(&self) -> Vec<&'static str> { self.log.lock().clone() }

    pub fn waker(self: &Arc<Self>) -> Waker {
        let me = Arc::clone(self);
        Arc::new(move || me.log.lock().push("wake"))
    }
}

impl InputPort for RecordingInput {
    fn click(&self) -> Result<(), PortError> {
        if self.fail { return Err(PortError::Failed("simulated click failure".into())); }
        if self.panics { panic!("simulated driver crash"); }
        self.clicks.fetch_add(1, Ordering::SeqCst);
        self.log.lock().push("click");
        Ok(())
    }

    fn type_text(&self, text: &str, _per_char_delay: Duration) -> Result<(), PortError> {
        if self.fail { return Err(PortError::Failed("simulated typing failure".into())); }
        if self.panics { panic!("simulated driver crash"); }
        thread::sleep(self.type_delay);
        self.typed.lock().push(text.to_string());
        self.log.lock().push("type");
        Ok(())
    }
}

/// Key state driven by the test: keys are held until released, or until a
/// deadline.
#[derive(Default)]
pub struct ScriptedKeys {
    held: Mutex<HashMap<char, Option<Instant>>>,
}

impl ScriptedKeys {
    pub fn new() -> Arc<Self> { Arc::new(Self::default()) }

    pub fn press(&self, c: char) { self.held.lock().insert(c, None); }

    pub fn release(&self, c: char) { self.held.lock().remove(&c); }

    pub fn hold_for(&self, c: char, d: Duration) {
        self.held.lock().insert(c, Some(Instant::now() + d));
    }
}

impl KeyStatePort for ScriptedKeys {
    fn is_held(&self, key: Key) -> bool {
        match self.held.lock().get(&key.as_char()) {
            Some(None) => true,
            Some(Some(until)) => Instant::now() < *until,
            None => false,
        }
    }
}

/// In-memory preferences shared between clones.
#[derive(Clone, Default)]
pub struct MemoryStore {
    saved: Arc<Mutex<Option<Preferences>>>,
    fail: bool,
}

impl PrefsStore for MemoryStore {
    fn load(&self) -> Preferences { self.saved.lock().unwrap_or_default() }

    fn save(&self, prefs: &Preferences) -> io::Result<()> {
        if self.fail { return Err(io::Error::new(io::ErrorKind::PermissionDenied, "read-only")); }
        *self.saved.lock() = Some(*prefs);
        Ok(())
    }
}

struct Rig {
    input: Arc<RecordingInput>,
    keys: Arc<ScriptedKeys>,
    store: MemoryStore,
    controller: Controller,
}

fn rig() -> Rig {
    let input = RecordingInput::new();
    let keys = ScriptedKeys::new();
    let store = MemoryStore::default();
    let ports = Ports::new(input.clone(), keys.clone());
    let controller = Controller::new(ports, Box::new(store.clone()), None);
    Rig { input, keys, store, controller }
}

fn quick_clicker() -> ClickerSettings {
    ClickerSettings { interval: 20, countdown_secs: 0, ..Default::default() }
}

fn poll_until(controller: &mut Controller, wanted: Notice, timeout: Duration) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if controller.poll().contains(&wanted) { return true; }
        thread::sleep(Duration::from_millis(10));
    }
    false
}

#[test]
fn test_invalid_typer_settings_start_nothing() {
    let mut rig = rig();
    let result = rig.controller.toggle_typer(true, &TyperSettings::default());
    assert_matches!(result, Err(ConfigError::EmptyText));
    assert_eq!(rig.controller.status(Role::Typer), ToggleStatus::Off);
    assert!(!rig.controller.is_live(Role::Typer));
}

#[test]
fn test_second_start_is_ignored() {
    let mut rig = rig();
    rig.controller.toggle_clicker(true, &quick_clicker()).unwrap();
    assert!(rig.controller.is_live(Role::Clicker));
    assert_eq!(rig.controller.start_clicker(&quick_clicker()), Ok(false));
    rig.controller.toggle_clicker(true, &quick_clicker()).unwrap();

    rig.controller.toggle_clicker(false, &quick_clicker()).unwrap();
    assert_eq!(rig.controller.status(Role::Clicker), ToggleStatus::Off);
    assert!(poll_until(
        &mut rig.controller,
        Notice::Finished(Role::Clicker, FinishReason::Cancelled),
        Duration::from_secs(2),
    ));
    // Only one Finished for the single worker that ran.
    thread::sleep(Duration::from_millis(100));
    assert!(rig.controller.poll().is_empty());
}

#[test]
fn test_countdown_reflected_in_status() {
    let mut rig = rig();
    let settings = ClickerSettings { countdown_secs: 2, ..quick_clicker() };
    rig.controller.toggle_clicker(true, &settings).unwrap();
    assert_eq!(rig.controller.status(Role::Clicker), ToggleStatus::StartingIn(2));

    assert!(poll_until(&mut rig.controller, Notice::Countdown(Role::Clicker, 1), Duration::from_secs(3)));
    assert_eq!(rig.controller.status(Role::Clicker), ToggleStatus::StartingIn(1));
    assert!(poll_until(&mut rig.controller, Notice::Countdown(Role::Clicker, 0), Duration::from_secs(3)));
    assert_eq!(rig.controller.status(Role::Clicker), ToggleStatus::On);
    rig.controller.shutdown();
}

#[test]
fn test_self_stopped_typer_resyncs_toggle() {
    let mut rig = rig();
    let settings = TyperSettings {
        interval: 0.2,
        unit: TimeUnit::Seconds,
        duration_secs: 1,
        text: "abc".into(),
    };
    rig.controller.toggle_typer(true, &settings).unwrap();
    assert_eq!(rig.controller.status(Role::Typer), ToggleStatus::On);

    assert!(poll_until(
        &mut rig.controller,
        Notice::Finished(Role::Typer, FinishReason::DurationElapsed),
        Duration::from_secs(3),
    ));
    assert_eq!(rig.controller.status(Role::Typer), ToggleStatus::Off);
    assert!(!rig.controller.is_live(Role::Typer));
    assert_eq!(rig.input.typed().len(), 5);
}

#[test]
fn test_stop_key_resyncs_clicker_toggle() {
    let mut rig = rig();
    rig.controller.toggle_clicker(true, &quick_clicker()).unwrap();
    thread::sleep(Duration::from_millis(100));
    rig.keys.press('q');

    assert!(poll_until(
        &mut rig.controller,
        Notice::Finished(Role::Clicker, FinishReason::StopKey),
        Duration::from_secs(2),
    ));
    assert_eq!(rig.controller.status(Role::Clicker), ToggleStatus::Off);
    assert!(rig.input.clicks() > 0);
}

#[test]
fn test_restart_after_stop_reuses_slot() {
    let mut rig = rig();
    rig.controller.toggle_typer(true, &TyperSettings { text: "x".into(), ..Default::default() }).unwrap();
    rig.controller.toggle_typer(false, &TyperSettings::default()).unwrap();
    // Restart before the previous worker's Finished was polled.
    rig.controller.toggle_typer(true, &TyperSettings { text: "y".into(), ..Default::default() }).unwrap();
    assert!(rig.controller.is_live(Role::Typer));
    assert_eq!(rig.controller.status(Role::Typer), ToggleStatus::On);
    rig.controller.shutdown();
    assert_eq!(rig.controller.status(Role::Typer), ToggleStatus::Off);
}

#[test]
fn test_restart_does_not_wait_for_stopping_worker() {
    let input = RecordingInput::slow(Duration::from_secs(1));
    let ports = Ports::new(input.clone(), ScriptedKeys::new());
    let mut controller = Controller::new(ports, Box::new(MemoryStore::default()), None);
    let settings = TyperSettings { text: "a long line".into(), ..Default::default() };

    controller.toggle_typer(true, &settings).unwrap();
    thread::sleep(Duration::from_millis(100));
    controller.toggle_typer(false, &settings).unwrap();

    // The first worker is still inside type_text.
    let start = Instant::now();
    controller.toggle_typer(true, &settings).unwrap();
    assert!(start.elapsed() < Duration::from_millis(100), "restart took {:?}", start.elapsed());
    assert!(controller.is_live(Role::Typer));

    // The superseded worker finishing does not turn the new one's toggle off.
    thread::sleep(Duration::from_millis(1200));
    let notices = controller.poll();
    assert!(!notices.iter().any(|n| matches!(n, Notice::Finished(Role::Typer, _))), "{notices:?}");
    assert_eq!(controller.status(Role::Typer), ToggleStatus::On);
    assert!(controller.is_live(Role::Typer));
    assert_eq!(input.typed().len(), 2);
}

#[test]
fn test_hotkey_restarts_clicker() {
    let mut rig = rig();
    rig.controller.set_hotkey(Some(Key::parse("h").unwrap()));
    rig.controller.toggle_clicker(true, &quick_clicker()).unwrap();
    assert!(rig.controller.is_watching_hotkey());

    rig.keys.press('q');
    assert!(poll_until(
        &mut rig.controller,
        Notice::Finished(Role::Clicker, FinishReason::StopKey),
        Duration::from_secs(2),
    ));
    rig.keys.release('q');

    rig.keys.hold_for('h', Duration::from_millis(200));
    assert!(poll_until(&mut rig.controller, Notice::HotkeyPressed, Duration::from_secs(2)));
    assert_eq!(rig.controller.start_clicker(&quick_clicker()), Ok(true));
    assert!(rig.controller.is_live(Role::Clicker));

    rig.controller.toggle_clicker(false, &quick_clicker()).unwrap();
    assert!(!rig.controller.is_watching_hotkey());
}

#[test]
fn test_hotkey_change_moves_watcher() {
    let mut rig = rig();
    rig.controller.set_hotkey(Some(Key::parse("h").unwrap()));
    rig.controller.toggle_clicker(true, &ClickerSettings { interval: 10, unit: TimeUnit::Seconds, ..quick_clicker() }).unwrap();
    rig.controller.set_hotkey(Some(Key::parse("j").unwrap()));
    assert!(rig.controller.is_watching_hotkey());

    rig.keys.hold_for('h', Duration::from_millis(200));
    thread::sleep(Duration::from_millis(300));
    assert!(!rig.controller.poll().contains(&Notice::HotkeyPressed));

    rig.keys.hold_for('j', Duration::from_millis(200));
    assert!(poll_until(&mut rig.controller, Notice::HotkeyPressed, Duration::from_secs(2)));

    rig.controller.set_hotkey(None);
    assert!(!rig.controller.is_watching_hotkey());
}

#[test]
fn test_preferences_persist() {
    let mut rig = rig();
    assert_eq!(rig.controller.preferences(), Preferences::default());
    let prefs = Preferences { dark_mode: true, suppress_legal_warning: true };
    rig.controller.set_preferences(prefs);
    assert_eq!(rig.store.load(), prefs);

    let ports = Ports::new(rig.input.clone(), rig.keys.clone());
    let reopened = Controller::new(ports, Box::new(rig.store.clone()), None);
    assert_eq!(reopened.preferences(), prefs);
}

#[test]
fn test_preference_save_failure_is_ignored() {
    let store = MemoryStore { fail: true, ..Default::default() };
    let ports = Ports::new(RecordingInput::new(), ScriptedKeys::new());
    let mut controller = Controller::new(ports, Box::new(store), None);
    let prefs = Preferences { dark_mode: true, suppress_legal_warning: false };
    controller.set_preferences(prefs);
    assert_eq!(controller.preferences(), prefs);
}
