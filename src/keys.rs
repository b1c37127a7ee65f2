//! Single-character keys and the key-state port.
//!
//! The default port polls `device_query`. With the `hooks` feature an
//! `rdev` global listener keeps a set of held keys instead; callers see the
//! same `is_held` answer either way.

use crate::error::{ConfigError, PortError};
use device_query::{DeviceQuery, DeviceState, Keycode};
use std::fmt;

/// One keyboard key, identified by the lowercase character it produces.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Key(char);

impl Key {
    /// Parses a one-character key name, ignoring surrounding whitespace
    /// unless it is a lone space.
    pub fn parse(name: &str) -> Result<Self, ConfigError> {
        let trimmed = if name == " " { name } else { name.trim() };
        let mut chars = trimmed.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) if !c.is_control() => {
                Ok(Key(c.to_lowercase().next().unwrap_or(c)))
            }
            _ => Err(ConfigError::InvalidKey(name.to_string())),
        }
    }

    pub fn as_char(&self) -> char { self.0 }

    /// Letters and space collide with normal typing.
    pub fn is_common(&self) -> bool {
        self.0.is_ascii_lowercase() || self.0 == ' '
    }

    fn keycode(&self) -> Option<Keycode> {
        let code = match self.0 {
            'a' => Keycode::A, 'b' => Keycode::B, 'c' => Keycode::C, 'd' => Keycode::D,
            'e' => Keycode::E, 'f' => Keycode::F, 'g' => Keycode::G, 'h' => Keycode::H,
            'i' => Keycode::I, 'j' => Keycode::J, 'k' => Keycode::K, 'l' => Keycode::L,
            'm' => Keycode::M, 'n' => Keycode::N, 'o' => Keycode::O, 'p' => Keycode::P,
            'q' => Keycode::Q, 'r' => Keycode::R, 's' => Keycode::S, 't' => Keycode::T,
            'u' => Keycode::U, 'v' => Keycode::V, 'w' => Keycode::W, 'x' => Keycode::X,
            'y' => Keycode::Y, 'z' => Keycode::Z,
            '0' => Keycode::Key0, '1' => Keycode::Key1, '2' => Keycode::Key2,
            '3' => Keycode::Key3, '4' => Keycode::Key4, '5' => Keycode::Key5,
            '6' => Keycode::Key6, '7' => Keycode::Key7, '8' => Keycode::Key8,
            '9' => Keycode::Key9,
            ' ' => Keycode::Space,
            '-' => Keycode::Minus,
            '=' => Keycode::Equal,
            '[' => Keycode::LeftBracket,
            ']' => Keycode::RightBracket,
            ';' => Keycode::Semicolon,
            '\'' => Keycode::Apostrophe,
            ',' => Keycode::Comma,
            '.' => Keycode::Dot,
            '/' => Keycode::Slash,
            '\\' => Keycode::BackSlash,
            '`' => Keycode::Grave,
            _ => return None,
        };
        Some(code)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_char() {
            ' ' => f.write_str("space"),
            c => write!(f, "{c}"),
        }
    }
}

/// Answers "is this key held right now?".
pub trait KeyStatePort: Send + Sync {
    fn is_held(&self, key: Key) -> bool;
}

thread_local! {
    // X11 connections are not Send, so every polling thread opens its own.
    static DEVICE: Option<DeviceState> = DeviceState::checked_new();
}

/// Polls the global keyboard state through `device_query`.
#[derive(Clone, Copy, Debug, Default)]
pub struct DeviceKeyState;

impl DeviceKeyState {
    /// Checks once that the keyboard can be queried on this machine.
    pub fn probe() -> Result<Self, PortError> {
        match DeviceState::checked_new() {
            Some(_) => Ok(Self),
            None => Err(PortError::Unavailable(
                "cannot read keyboard state (missing display or accessibility permission)".into(),
            )),
        }
    }
}

impl KeyStatePort for DeviceKeyState {
    fn is_held(&self, key: Key) -> bool {
        let Some(code) = key.keycode() else { return false };
        DEVICE.with(|device| match device {
            Some(device) => device.get_keys().contains(&code),
            None => false,
        })
    }
}

#[cfg(feature = "hooks")]
pub use hooks::HookKeyState;

#[cfg(feature = "hooks")]
mod hooks {
    use super::{Key, KeyStatePort};
    use crate::error::PortError;
    use parking_lot::Mutex;
    use rdev::{EventType, Key as RKey};
    use std::{
        collections::HashSet,
        sync::{
            mpsc::{self, RecvTimeoutError},
            Arc,
        },
        thread,
        time::Duration,
    };

    /// How long a failing hook has to report before it is considered up.
    const LISTEN_GRACE: Duration = Duration::from_millis(250);

    /// Tracks held keys from an `rdev` global listener thread.
    #[derive(Clone, Default)]
    pub struct HookKeyState {
        held: Arc<Mutex<HashSet<char>>>,
    }

    impl HookKeyState {
        pub fn spawn() -> Result<Self, PortError> {
            let state = Self::default();
            let held = Arc::clone(&state.held);
            start_listener(
                move || {
                    rdev::listen(move |event| match event.event_type {
                        EventType::KeyPress(k) => {
                            if let Some(c) = to_char(k) { held.lock().insert(c); }
                        }
                        EventType::KeyRelease(k) => {
                            if let Some(c) = to_char(k) { held.lock().remove(&c); }
                        }
                        _ => {}
                    })
                    .map_err(|e| format!("{e:?}"))
                },
                LISTEN_GRACE,
            )?;
            Ok(state)
        }
    }

    impl KeyStatePort for HookKeyState {
        fn is_held(&self, key: Key) -> bool {
            self.held.lock().contains(&key.as_char())
        }
    }

    /// Runs `listen` on its own thread. A working hook blocks forever, so
    /// anything it returns within `grace` means the hook never came up.
    fn start_listener<F>(listen: F, grace: Duration) -> Result<(), PortError>
    where
        F: FnOnce() -> Result<(), String> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let result = listen();
            if let Err(e) = &result {
                tracing::error!("keyboard hook stopped: {e}");
            }
            let _ = tx.send(result);
        });
        match rx.recv_timeout(grace) {
            Err(RecvTimeoutError::Timeout) => Ok(()),
            Ok(Err(e)) => Err(PortError::Unavailable(format!("cannot install keyboard hook: {e}"))),
            Ok(Ok(())) | Err(RecvTimeoutError::Disconnected) => {
                Err(PortError::Unavailable("keyboard hook exited during startup".into()))
            }
        }
    }

    fn to_char(key: RKey) -> Option<char> {
        let c = match key {
            RKey::KeyA => 'a', RKey::KeyB => 'b', RKey::KeyC => 'c', RKey::KeyD => 'd',
            RKey::KeyE => 'e', RKey::KeyF => 'f', RKey::KeyG => 'g', RKey::KeyH => 'h',
            RKey::KeyI => 'i', RKey::KeyJ => 'j', RKey::KeyK => 'k', RKey::KeyL => 'l',
            RKey::KeyM => 'm', RKey::KeyN => 'n', RKey::KeyO => 'o', RKey::KeyP => 'p',
            RKey::KeyQ => 'q', RKey::KeyR => 'r', RKey::KeyS => 's', RKey::KeyT => 't',
            RKey::KeyU => 'u', RKey::KeyV => 'v', RKey::KeyW => 'w', RKey::KeyX => 'x',
            RKey::KeyY => 'y', RKey::KeyZ => 'z',
            RKey::Num0 => '0', RKey::Num1 => '1', RKey::Num2 => '2', RKey::Num3 => '3',
            RKey::Num4 => '4', RKey::Num5 => '5', RKey::Num6 => '6', RKey::Num7 => '7',
            RKey::Num8 => '8', RKey::Num9 => '9',
            RKey::Space => ' ',
            RKey::Minus => '-',
            RKey::Equal => '=',
            RKey::LeftBracket => '[',
            RKey::RightBracket => ']',
            RKey::SemiColon => ';',
            RKey::Quote => '\'',
            RKey::Comma => ',',
            RKey::Dot => '.',
            RKey::Slash => '/',
            RKey::BackSlash => '\\',
            RKey::BackQuote => '`',
            _ => return None,
        };
        Some(c)
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_parse_normalizes_case() {
        assert_eq!(Key::parse("Q").unwrap().as_char(), 'q');
        assert_eq!(Key::parse(" x ").unwrap().as_char(), 'x');
        assert_eq!(Key::parse(" ").unwrap().as_char(), ' ');
    }

    #[test]
    fn test_parse_rejects_bad_names() {
        assert_matches!(Key::parse(""), Err(ConfigError::InvalidKey(_)));
        assert_matches!(Key::parse("ab"), Err(ConfigError::InvalidKey(_)));
        assert_matches!(Key::parse("ctrl"), Err(ConfigError::InvalidKey(_)));
        assert_matches!(Key::parse("\t"), Err(ConfigError::InvalidKey(_)));
    }

    #[test]
    fn test_common_keys() {
        assert!(Key::parse("a").unwrap().is_common());
        assert!(Key::parse(" ").unwrap().is_common());
        assert!(!Key::parse("7").unwrap().is_common());
        assert!(!Key::parse("[").unwrap().is_common());
    }

    #[test]
    fn test_keycode_mapping() {
        assert_eq!(Key::parse("q").unwrap().keycode(), Some(Keycode::Q));
        assert_eq!(Key::parse("5").unwrap().keycode(), Some(Keycode::Key5));
        assert_eq!(Key::parse("é").unwrap().keycode(), None);
    }
}
