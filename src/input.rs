use crate::error::PortError;
use enigo::{KeyboardControllable, MouseButton, MouseControllable};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::{thread, time::Duration};

/// Synthesizes mouse clicks and keystrokes.
pub trait InputPort: Send + Sync {
    fn click(&self) -> Result<(), PortError>;
    fn type_text(&self, text: &str, per_char_delay: Duration) -> Result<(), PortError>;
}

static ENIGO: Lazy<Mutex<enigo::Enigo>> = Lazy::new(|| Mutex::new(enigo::Enigo::new()));

/// Injects input at the current cursor/focus via `enigo`.
#[derive(Clone, Copy, Debug, Default)]
pub struct EnigoInput;

impl InputPort for EnigoInput {
    fn click(&self) -> Result<(), PortError> {
        ENIGO.lock().mouse_click(MouseButton::Left);
        Ok(())
    }

    fn type_text(&self, text: &str, per_char_delay: Duration) -> Result<(), PortError> {
        let mut buf = [0u8; 4];
        for c in text.chars() {
            // Hold the lock per character so a concurrent click is not starved.
            ENIGO.lock().key_sequence(c.encode_utf8(&mut buf));
            if !per_char_delay.is_zero() { thread::sleep(per_char_delay); }
        }
        Ok(())
    }
}
