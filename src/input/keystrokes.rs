use anyhow::{anyhow, Result};
use enigo::{Direction, Enigo, Key as EnigoKey, Keyboard, Settings};
use tracing::debug;

use super::ActionSink;
use crate::error::ActionFault;
use crate::layers::{ConsumerCode, KeyCode};

/// Sends keystrokes to the focused window
pub struct KeystrokeSender {
    enigo: Enigo,
}

impl KeystrokeSender {
    pub fn new() -> Result<Self> {
        let enigo = Enigo::new(&Settings::default())
            .map_err(|e| anyhow!("Failed to initialize Enigo: {}", e))?;
        Ok(Self { enigo })
    }

    fn key(&mut self, key: EnigoKey, direction: Direction) -> Result<(), ActionFault> {
        self.enigo
            .key(key, direction)
            .map_err(|e| ActionFault::Emit {
                what: "key",
                reason: e.to_string(),
            })
    }
}

impl ActionSink for KeystrokeSender {
    /// Press keys in order, then release them in reverse order
    fn send_keys(&mut self, codes: &[KeyCode]) -> Result<(), ActionFault> {
        let keys: Vec<EnigoKey> = codes.iter().map(|&code| enigo_key(code)).collect();
        debug!("Sending keys: {:?}", keys);

        if let [single] = keys.as_slice() {
            return self.key(*single, Direction::Click);
        }

        // Release whatever went down even if a later press failed
        let mut result = Ok(());
        let mut pressed = Vec::with_capacity(keys.len());
        for key in keys {
            match self.key(key, Direction::Press) {
                Ok(()) => pressed.push(key),
                Err(e) => {
                    result = Err(e);
                    break;
                }
            }
        }
        for key in pressed.into_iter().rev() {
            let released = self.key(key, Direction::Release);
            if result.is_ok() {
                result = released;
            }
        }
        result
    }

    /// Send text as typed characters
    fn write_text(&mut self, text: &str) -> Result<(), ActionFault> {
        debug!("Sending text: {:?}", text);
        self.enigo.text(text).map_err(|e| ActionFault::Emit {
            what: "text",
            reason: e.to_string(),
        })
    }

    fn send_consumer_code(&mut self, code: ConsumerCode) -> Result<(), ActionFault> {
        let key = match code {
            ConsumerCode::PlayPause => EnigoKey::MediaPlayPause,
            ConsumerCode::ScanNextTrack => EnigoKey::MediaNextTrack,
            ConsumerCode::ScanPreviousTrack => EnigoKey::MediaPrevTrack,
            ConsumerCode::Mute => EnigoKey::VolumeMute,
            ConsumerCode::VolumeIncrement => EnigoKey::VolumeUp,
            ConsumerCode::VolumeDecrement => EnigoKey::VolumeDown,
        };
        debug!("Sending consumer code {} ({:?})", code, key);
        self.enigo
            .key(key, Direction::Click)
            .map_err(|e| ActionFault::Emit {
                what: "consumer code",
                reason: e.to_string(),
            })
    }
}

/// Map a bound key code to the enigo key that produces it
fn enigo_key(code: KeyCode) -> EnigoKey {
    match code {
        KeyCode::Char(c) => EnigoKey::Unicode(c),
        KeyCode::Enter | KeyCode::KeypadEnter => EnigoKey::Return,
        KeyCode::Escape => EnigoKey::Escape,
        KeyCode::Backspace => EnigoKey::Backspace,
        KeyCode::Tab => EnigoKey::Tab,
        KeyCode::Space => EnigoKey::Space,
        KeyCode::Delete => EnigoKey::Delete,
        KeyCode::Home => EnigoKey::Home,
        KeyCode::End => EnigoKey::End,
        KeyCode::PageUp => EnigoKey::PageUp,
        KeyCode::PageDown => EnigoKey::PageDown,
        KeyCode::Up => EnigoKey::UpArrow,
        KeyCode::Down => EnigoKey::DownArrow,
        KeyCode::Left => EnigoKey::LeftArrow,
        KeyCode::Right => EnigoKey::RightArrow,
        KeyCode::CapsLock => EnigoKey::CapsLock,
        KeyCode::F(n) => function_key(n),
        KeyCode::Control => EnigoKey::Control,
        KeyCode::Shift => EnigoKey::Shift,
        KeyCode::Alt => EnigoKey::Alt,
        KeyCode::Gui => EnigoKey::Meta,
        KeyCode::KeypadPlus => EnigoKey::Unicode('+'),
        KeyCode::KeypadMinus => EnigoKey::Unicode('-'),
        KeyCode::KeypadAsterisk => EnigoKey::Unicode('*'),
        KeyCode::KeypadSlash => EnigoKey::Unicode('/'),
    }
}

fn function_key(n: u8) -> EnigoKey {
    match n {
        1 => EnigoKey::F1,
        2 => EnigoKey::F2,
        3 => EnigoKey::F3,
        4 => EnigoKey::F4,
        5 => EnigoKey::F5,
        6 => EnigoKey::F6,
        7 => EnigoKey::F7,
        8 => EnigoKey::F8,
        9 => EnigoKey::F9,
        10 => EnigoKey::F10,
        11 => EnigoKey::F11,
        12 => EnigoKey::F12,
        13 => EnigoKey::F13,
        14 => EnigoKey::F14,
        15 => EnigoKey::F15,
        16 => EnigoKey::F16,
        17 => EnigoKey::F17,
        18 => EnigoKey::F18,
        19 => EnigoKey::F19,
        _ => EnigoKey::F20,
    }
}
