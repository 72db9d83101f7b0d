//! Layers of key bindings and the actions they play

pub mod engine;
pub mod store;

use image::Rgb;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

pub use engine::{EngineReport, LayerEngine};

/// Default colour of the modifier key while layers are not being chosen
pub const READY_COLOR: Rgb<u8> = Rgb([0, 255, 25]);

/// Keyboard key codes that can be bound
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyCode {
    /// Printable character key (letters are stored lowercase)
    Char(char),
    Enter,
    Escape,
    Backspace,
    Tab,
    Space,
    Delete,
    Home,
    End,
    PageUp,
    PageDown,
    Up,
    Down,
    Left,
    Right,
    CapsLock,
    /// Function key F1-F20
    F(u8),
    Control,
    Shift,
    Alt,
    Gui,
    KeypadEnter,
    KeypadPlus,
    KeypadMinus,
    KeypadAsterisk,
    KeypadSlash,
}

impl FromStr for KeyCode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.chars();
        if let (Some(c), None) = (chars.next(), chars.next()) {
            if !c.is_whitespace() && !c.is_control() {
                return Ok(KeyCode::Char(c.to_ascii_lowercase()));
            }
        }

        let name = s.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        let code = match name.as_str() {
            "enter" | "return" => KeyCode::Enter,
            "esc" | "escape" => KeyCode::Escape,
            "backspace" => KeyCode::Backspace,
            "tab" => KeyCode::Tab,
            "space" => KeyCode::Space,
            "delete" | "del" => KeyCode::Delete,
            "home" => KeyCode::Home,
            "end" => KeyCode::End,
            "page_up" | "pageup" => KeyCode::PageUp,
            "page_down" | "pagedown" => KeyCode::PageDown,
            "up" | "up_arrow" => KeyCode::Up,
            "down" | "down_arrow" => KeyCode::Down,
            "left" | "left_arrow" => KeyCode::Left,
            "right" | "right_arrow" => KeyCode::Right,
            "caps_lock" | "capslock" => KeyCode::CapsLock,
            "ctrl" | "control" => KeyCode::Control,
            "shift" => KeyCode::Shift,
            "alt" | "option" => KeyCode::Alt,
            "gui" | "cmd" | "command" | "win" | "super" | "meta" => KeyCode::Gui,
            "keypad_enter" => KeyCode::KeypadEnter,
            "keypad_plus" => KeyCode::KeypadPlus,
            "keypad_minus" => KeyCode::KeypadMinus,
            "keypad_asterisk" => KeyCode::KeypadAsterisk,
            "keypad_slash" | "keypad_forward_slash" => KeyCode::KeypadSlash,
            other => match other.strip_prefix('f').map(str::parse::<u8>) {
                Some(Ok(n)) if (1..=20).contains(&n) => KeyCode::F(n),
                _ => return Err(ConfigError::UnknownKeyCode(s.to_string())),
            },
        };
        Ok(code)
    }
}

impl fmt::Display for KeyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            KeyCode::Char(c) => return write!(f, "{}", c),
            KeyCode::F(n) => return write!(f, "f{}", n),
            KeyCode::Enter => "enter",
            KeyCode::Escape => "escape",
            KeyCode::Backspace => "backspace",
            KeyCode::Tab => "tab",
            KeyCode::Space => "space",
            KeyCode::Delete => "delete",
            KeyCode::Home => "home",
            KeyCode::End => "end",
            KeyCode::PageUp => "page_up",
            KeyCode::PageDown => "page_down",
            KeyCode::Up => "up",
            KeyCode::Down => "down",
            KeyCode::Left => "left",
            KeyCode::Right => "right",
            KeyCode::CapsLock => "caps_lock",
            KeyCode::Control => "ctrl",
            KeyCode::Shift => "shift",
            KeyCode::Alt => "alt",
            KeyCode::Gui => "gui",
            KeyCode::KeypadEnter => "keypad_enter",
            KeyCode::KeypadPlus => "keypad_plus",
            KeyCode::KeypadMinus => "keypad_minus",
            KeyCode::KeypadAsterisk => "keypad_asterisk",
            KeyCode::KeypadSlash => "keypad_slash",
        };
        f.write_str(name)
    }
}

/// Consumer control (media) codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConsumerCode {
    PlayPause,
    ScanNextTrack,
    ScanPreviousTrack,
    Mute,
    VolumeIncrement,
    VolumeDecrement,
}

impl ConsumerCode {
    /// HID consumer page usage id
    pub fn usage_id(&self) -> u16 {
        match self {
            ConsumerCode::PlayPause => 0xCD,
            ConsumerCode::ScanNextTrack => 0xB5,
            ConsumerCode::ScanPreviousTrack => 0xB6,
            ConsumerCode::Mute => 0xE2,
            ConsumerCode::VolumeIncrement => 0xE9,
            ConsumerCode::VolumeDecrement => 0xEA,
        }
    }
}

impl fmt::Display for ConsumerCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConsumerCode::PlayPause => "play_pause",
            ConsumerCode::ScanNextTrack => "scan_next_track",
            ConsumerCode::ScanPreviousTrack => "scan_previous_track",
            ConsumerCode::Mute => "mute",
            ConsumerCode::VolumeIncrement => "volume_increment",
            ConsumerCode::VolumeDecrement => "volume_decrement",
        })
    }
}

impl FromStr for ConsumerCode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace(['-', ' '], "_").as_str() {
            "play_pause" => Ok(ConsumerCode::PlayPause),
            "scan_next_track" | "next_track" => Ok(ConsumerCode::ScanNextTrack),
            "scan_previous_track" | "previous_track" => Ok(ConsumerCode::ScanPreviousTrack),
            "mute" => Ok(ConsumerCode::Mute),
            "volume_increment" | "volume_up" => Ok(ConsumerCode::VolumeIncrement),
            "volume_decrement" | "volume_down" => Ok(ConsumerCode::VolumeDecrement),
            _ => Err(ConfigError::UnknownConsumerCode(s.to_string())),
        }
    }
}

/// What a bound key plays
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// One key tap
    Key(KeyCode),
    /// Keys pressed together in order, released together
    Chord(Vec<KeyCode>),
    /// Literal text typed character by character
    Text(String),
    /// Media / consumer control
    Consumer(ConsumerCode),
}

/// Category of an action, which decides its dispatch debounce
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Key,
    Chord,
    Text,
    Consumer,
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::Key(_) => ActionKind::Key,
            Action::Chord(_) => ActionKind::Chord,
            Action::Text(_) => ActionKind::Text,
            Action::Consumer(_) => ActionKind::Consumer,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Key(code) => write!(f, "key {}", code),
            Action::Chord(codes) => {
                let names: Vec<String> = codes.iter().map(KeyCode::to_string).collect();
                write!(f, "chord {}", names.join("+"))
            }
            Action::Text(text) => write!(f, "text {:?}", text),
            Action::Consumer(code) => write!(f, "consumer {}", code),
        }
    }
}

/// Post-dispatch debounce per action kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchWindows {
    /// Single keys, chords and consumer codes
    pub short: Duration,
    /// Text playback, which takes longer than one key event
    pub long: Duration,
}

impl Default for DispatchWindows {
    fn default() -> Self {
        Self {
            short: Duration::from_millis(30),
            long: Duration::from_millis(150),
        }
    }
}

impl DispatchWindows {
    pub fn for_kind(&self, kind: ActionKind) -> Duration {
        match kind {
            ActionKind::Key | ActionKind::Chord | ActionKind::Consumer => self.short,
            ActionKind::Text => self.long,
        }
    }
}

/// How held keys are kept from re-firing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LatchPolicy {
    /// Every bound key has its own latch; keys pressed together all fire
    #[default]
    PerKey,
    /// One latch for the whole keypad; of keys pressed in the same tick only
    /// the lowest key number fires
    Shared,
}

/// A named set of bindings with its display colour
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layer {
    pub id: u8,
    pub name: String,
    /// Key that selects this layer while the modifier is held
    pub selector: usize,
    pub color: Rgb<u8>,
    pub bindings: BTreeMap<usize, Action>,
}

impl Layer {
    pub fn new(id: u8, name: impl Into<String>, selector: usize, color: Rgb<u8>) -> Self {
        Self {
            id,
            name: name.into(),
            selector,
            color,
            bindings: BTreeMap::new(),
        }
    }

    /// Builder-style binding, used for defaults and tests
    pub fn bind(mut self, key: usize, action: Action) -> Self {
        self.bindings.insert(key, action);
        self
    }

    pub fn action(&self, key: usize) -> Option<&Action> {
        self.bindings.get(&key)
    }

    pub fn is_bound(&self, key: usize) -> bool {
        self.bindings.contains_key(&key)
    }
}

/// Validated layer configuration consumed by the engine
#[derive(Debug, Clone)]
pub struct LayerSet {
    modifier: usize,
    layers: Vec<Layer>,
    start: usize,
    pub ready_color: Rgb<u8>,
    pub latch: LatchPolicy,
    pub windows: DispatchWindows,
}

impl LayerSet {
    /// Check the layers against a grid of `key_count` keys.
    ///
    /// Layers are ordered by id; the engine starts on `start_layer` or the
    /// lowest id.
    pub fn new(
        key_count: usize,
        modifier: usize,
        mut layers: Vec<Layer>,
        start_layer: Option<u8>,
    ) -> Result<Self, ConfigError> {
        let in_range = |key: usize| {
            if key < key_count {
                Ok(())
            } else {
                Err(ConfigError::KeyOutOfRange {
                    key,
                    len: key_count,
                })
            }
        };

        if layers.is_empty() {
            return Err(ConfigError::NoLayers);
        }
        in_range(modifier)?;
        layers.sort_by_key(|l| l.id);

        let mut selectors: HashMap<usize, u8> = HashMap::new();
        for pair in layers.windows(2) {
            if pair[0].id == pair[1].id {
                return Err(ConfigError::DuplicateLayer(pair[0].id));
            }
        }

        for layer in &layers {
            in_range(layer.selector)?;
            if layer.selector == modifier {
                return Err(ConfigError::ModifierIsSelector(modifier));
            }
            if let Some(&first) = selectors.get(&layer.selector) {
                return Err(ConfigError::DuplicateSelector {
                    key: layer.selector,
                    first,
                    second: layer.id,
                });
            }
            selectors.insert(layer.selector, layer.id);

            for (&key, action) in &layer.bindings {
                in_range(key)?;
                if key == modifier {
                    return Err(ConfigError::ModifierBound {
                        key,
                        layer: layer.id,
                    });
                }
                if key == layer.selector {
                    return Err(ConfigError::SelectorBound {
                        key,
                        layer: layer.id,
                    });
                }
                if matches!(action, Action::Chord(codes) if codes.is_empty()) {
                    return Err(ConfigError::EmptyChord {
                        key,
                        layer: layer.id,
                    });
                }
            }
        }

        let start = match start_layer {
            Some(id) => layers
                .iter()
                .position(|l| l.id == id)
                .ok_or(ConfigError::UnknownLayer(id))?,
            None => 0,
        };

        Ok(Self {
            modifier,
            layers,
            start,
            ready_color: READY_COLOR,
            latch: LatchPolicy::default(),
            windows: DispatchWindows::default(),
        })
    }

    pub fn with_latch(mut self, latch: LatchPolicy) -> Self {
        self.latch = latch;
        self
    }

    pub fn with_windows(mut self, windows: DispatchWindows) -> Self {
        self.windows = windows;
        self
    }

    pub fn with_ready_color(mut self, rgb: Rgb<u8>) -> Self {
        self.ready_color = rgb;
        self
    }

    pub fn modifier(&self) -> usize {
        self.modifier
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn start_index(&self) -> usize {
        self.start
    }

    pub fn is_selector(&self, key: usize) -> bool {
        self.layers.iter().any(|l| l.selector == key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PINK: Rgb<u8> = Rgb([255, 0, 255]);
    const CYAN: Rgb<u8> = Rgb([0, 255, 255]);

    fn layers() -> Vec<Layer> {
        vec![
            Layer::new(2, "strings", 2, CYAN).bind(4, Action::Text("Quartz ".into())),
            Layer::new(1, "numpad", 1, PINK).bind(4, Action::Key(KeyCode::Char('0'))),
        ]
    }

    #[test]
    fn test_key_code_parsing() {
        assert_eq!("0".parse::<KeyCode>(), Ok(KeyCode::Char('0')));
        assert_eq!("S".parse::<KeyCode>(), Ok(KeyCode::Char('s')));
        assert_eq!("Page Up".parse::<KeyCode>(), Ok(KeyCode::PageUp));
        assert_eq!("keypad-enter".parse::<KeyCode>(), Ok(KeyCode::KeypadEnter));
        assert_eq!("CMD".parse::<KeyCode>(), Ok(KeyCode::Gui));
        assert_eq!("f12".parse::<KeyCode>(), Ok(KeyCode::F(12)));
        assert_eq!(
            "f21".parse::<KeyCode>(),
            Err(ConfigError::UnknownKeyCode("f21".into()))
        );
        assert!("hyper".parse::<KeyCode>().is_err());
    }

    #[test]
    fn test_key_code_display_parses_back() {
        for code in [
            KeyCode::Char('+'),
            KeyCode::F(7),
            KeyCode::PageDown,
            KeyCode::KeypadSlash,
            KeyCode::Control,
        ] {
            assert_eq!(code.to_string().parse::<KeyCode>(), Ok(code));
        }
    }

    #[test]
    fn test_consumer_code_parsing() {
        assert_eq!("volume-up".parse::<ConsumerCode>(), Ok(ConsumerCode::VolumeIncrement));
        assert_eq!("PLAY_PAUSE".parse::<ConsumerCode>(), Ok(ConsumerCode::PlayPause));
        assert!("eject".parse::<ConsumerCode>().is_err());
        assert_eq!(ConsumerCode::Mute.usage_id(), 0xE2);
    }

    #[test]
    fn test_window_by_action_kind() {
        let windows = DispatchWindows::default();
        let chord = Action::Chord(vec![KeyCode::Control, KeyCode::Char('s')]);
        assert_eq!(windows.for_kind(chord.kind()), Duration::from_millis(30));
        assert_eq!(
            windows.for_kind(Action::Text("Lol".into()).kind()),
            Duration::from_millis(150)
        );
        assert_eq!(
            windows.for_kind(Action::Consumer(ConsumerCode::Mute).kind()),
            Duration::from_millis(30)
        );
    }

    #[test]
    fn test_layer_set_orders_by_id() {
        let set = LayerSet::new(16, 0, layers(), None).unwrap();
        assert_eq!(set.layers()[0].id, 1);
        assert_eq!(set.start_index(), 0);
        assert!(set.is_selector(2));
        assert!(!set.is_selector(4));

        let set = LayerSet::new(16, 0, layers(), Some(2)).unwrap();
        assert_eq!(set.layers()[set.start_index()].name, "strings");
    }

    #[test]
    fn test_layer_set_rejects_bad_layouts() {
        assert_eq!(
            LayerSet::new(16, 0, vec![], None).unwrap_err(),
            ConfigError::NoLayers
        );
        assert_eq!(
            LayerSet::new(16, 0, layers(), Some(9)).unwrap_err(),
            ConfigError::UnknownLayer(9)
        );
        assert_eq!(
            LayerSet::new(4, 0, layers(), None).unwrap_err(),
            ConfigError::KeyOutOfRange { key: 4, len: 4 }
        );
        assert_eq!(
            LayerSet::new(16, 1, layers(), None).unwrap_err(),
            ConfigError::ModifierIsSelector(1)
        );
        assert_eq!(
            LayerSet::new(16, 4, layers(), None).unwrap_err(),
            ConfigError::ModifierBound { key: 4, layer: 1 }
        );

        let mut clash = layers();
        clash[0].selector = 1;
        assert_eq!(
            LayerSet::new(16, 0, clash, None).unwrap_err(),
            ConfigError::DuplicateSelector {
                key: 1,
                first: 1,
                second: 2
            }
        );

        let own = vec![Layer::new(1, "numpad", 1, PINK).bind(1, Action::Key(KeyCode::Char('1')))];
        assert_eq!(
            LayerSet::new(16, 0, own, None).unwrap_err(),
            ConfigError::SelectorBound { key: 1, layer: 1 }
        );

        let twice = vec![Layer::new(3, "a", 1, PINK), Layer::new(3, "b", 2, CYAN)];
        assert_eq!(
            LayerSet::new(16, 0, twice, None).unwrap_err(),
            ConfigError::DuplicateLayer(3)
        );

        let empty = vec![Layer::new(1, "a", 1, PINK).bind(5, Action::Chord(vec![]))];
        assert_eq!(
            LayerSet::new(16, 0, empty, None).unwrap_err(),
            ConfigError::EmptyChord { key: 5, layer: 1 }
        );
    }

    #[test]
    fn test_selector_may_be_bound_in_other_layers() {
        let layers = vec![
            Layer::new(1, "numpad", 1, PINK).bind(2, Action::Key(KeyCode::Char('4'))),
            Layer::new(2, "strings", 2, CYAN).bind(1, Action::Text("Lol".into())),
        ];
        assert!(LayerSet::new(16, 0, layers, None).is_ok());
    }
}
