//! Layer configuration types for serialization/deserialization
//!
//! These types are stored in config.toml and converted into runtime
//! `Layer`s once at startup.

use image::Rgb;
use serde::{Deserialize, Serialize};

use super::{Action, ConsumerCode, KeyCode, Layer};
use crate::error::ConfigError;

/// Action configuration for a bound key (serializable)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionConfig {
    /// Tap one key, e.g. `"0"` or `"page_up"`
    Key { value: String },
    /// Press keys together, e.g. `["ctrl", "s"]`
    Chord { value: Vec<String> },
    /// Type text
    Text { value: String },
    /// Media key, e.g. `"play_pause"`
    Consumer { value: String },
}

impl ActionConfig {
    /// Convert to runtime Action
    pub fn to_action(&self) -> Result<Action, ConfigError> {
        Ok(match self {
            ActionConfig::Key { value } => Action::Key(value.parse()?),
            ActionConfig::Chord { value } => Action::Chord(
                value
                    .iter()
                    .map(|name| name.parse::<KeyCode>())
                    .collect::<Result<_, _>>()?,
            ),
            ActionConfig::Text { value } => Action::Text(value.clone()),
            ActionConfig::Consumer { value } => {
                Action::Consumer(value.parse::<ConsumerCode>()?)
            }
        })
    }

    /// Create from runtime Action
    pub fn from_action(action: &Action) -> Self {
        match action {
            Action::Key(code) => ActionConfig::Key {
                value: code.to_string(),
            },
            Action::Chord(codes) => ActionConfig::Chord {
                value: codes.iter().map(KeyCode::to_string).collect(),
            },
            Action::Text(text) => ActionConfig::Text {
                value: text.clone(),
            },
            Action::Consumer(code) => ActionConfig::Consumer {
                value: code.to_string(),
            },
        }
    }
}

/// One key binding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindingEntry {
    /// Key number
    pub key: usize,
    pub action: ActionConfig,
}

/// Layer configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerConfig {
    pub id: u8,
    pub name: String,
    /// Key that selects this layer while the modifier is held
    pub selector: usize,
    /// Layer colour (hex string like "#FF00FF")
    pub color: String,
    #[serde(default)]
    pub bindings: Vec<BindingEntry>,
}

impl LayerConfig {
    /// Convert to runtime Layer
    pub fn to_layer(&self) -> Result<Layer, ConfigError> {
        let color =
            parse_hex_color(&self.color).ok_or_else(|| ConfigError::InvalidColor(self.color.clone()))?;
        let mut layer = Layer::new(self.id, self.name.clone(), self.selector, color);

        for entry in &self.bindings {
            let action = entry.action.to_action()?;
            if layer.bindings.insert(entry.key, action).is_some() {
                return Err(ConfigError::DuplicateBinding {
                    key: entry.key,
                    layer: self.id,
                });
            }
        }
        Ok(layer)
    }

    /// Create from runtime Layer
    pub fn from_layer(layer: &Layer) -> Self {
        Self {
            id: layer.id,
            name: layer.name.clone(),
            selector: layer.selector,
            color: rgb_to_hex(layer.color),
            bindings: layer
                .bindings
                .iter()
                .map(|(&key, action)| BindingEntry {
                    key,
                    action: ActionConfig::from_action(action),
                })
                .collect(),
        }
    }
}

/// Parse a hex color string to Rgb
pub fn parse_hex_color(hex: &str) -> Option<Rgb<u8>> {
    let hex = hex.trim_start_matches('#');
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }

    let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
    let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
    let b = u8::from_str_radix(&hex[4..6], 16).ok()?;

    Some(Rgb([r, g, b]))
}

/// Convert Rgb to hex string
pub fn rgb_to_hex(color: Rgb<u8>) -> String {
    format!("#{:02X}{:02X}{:02X}", color[0], color[1], color[2])
}

fn key(value: &str) -> ActionConfig {
    ActionConfig::Key {
        value: value.to_string(),
    }
}

fn chord(values: &[&str]) -> ActionConfig {
    ActionConfig::Chord {
        value: values.iter().map(|v| v.to_string()).collect(),
    }
}

fn text(value: &str) -> ActionConfig {
    ActionConfig::Text {
        value: value.to_string(),
    }
}

fn consumer(value: &str) -> ActionConfig {
    ActionConfig::Consumer {
        value: value.to_string(),
    }
}

fn layer(
    id: u8,
    name: &str,
    selector: usize,
    color: &str,
    bindings: Vec<(usize, ActionConfig)>,
) -> LayerConfig {
    LayerConfig {
        id,
        name: name.to_string(),
        selector,
        color: color.to_string(),
        bindings: bindings
            .into_iter()
            .map(|(key, action)| BindingEntry { key, action })
            .collect(),
    }
}

/// Default layers with the modifier on key 0 and selectors on keys 1-5,
/// laid out for a 5x2 deck. Layers and bindings that do not fit in
/// `key_count` keys are left out.
pub fn default_layers(key_count: usize) -> Vec<LayerConfig> {
    let layers = vec![
        layer(
            1,
            "numpad",
            1,
            "#FF00FF",
            vec![
                (2, key("1")),
                (3, key("2")),
                (4, key("3")),
                (5, key("0")),
                (6, key("4")),
                (7, key("5")),
                (8, key("6")),
                (9, key("keypad_enter")),
            ],
        ),
        layer(
            2,
            "strings",
            2,
            "#00FFFF",
            vec![
                (1, text("Quick")),
                (5, text("Sphinx of ")),
                (6, text("Black ")),
                (7, text("Quartz ")),
                (8, text("Judge ")),
                (9, text("my Vow.\n")),
            ],
        ),
        layer(
            3,
            "media",
            3,
            "#FFFF00",
            vec![
                (5, consumer("mute")),
                (6, consumer("volume_decrement")),
                (7, consumer("scan_previous_track")),
                (8, consumer("play_pause")),
                (9, consumer("scan_next_track")),
                (4, consumer("volume_increment")),
            ],
        ),
        layer(
            4,
            "shortcuts",
            4,
            "#14E632",
            vec![
                (1, chord(&["ctrl", "s"])),
                (2, chord(&["ctrl", "c"])),
                (3, chord(&["ctrl", "v"])),
                (5, chord(&["alt", "shift", "tab"])),
                (6, chord(&["ctrl", "x"])),
                (7, chord(&["ctrl", "a"])),
                (8, key("home")),
                (9, key("end")),
            ],
        ),
        layer(
            5,
            "meetings",
            5,
            "#505AC9",
            vec![
                (1, chord(&["ctrl", "shift", "m"])),
                (2, chord(&["ctrl", "shift", "o"])),
                (3, chord(&["ctrl", "shift", "e"])),
                (4, chord(&["ctrl", "shift", "k"])),
                (6, chord(&["ctrl", "2"])),
                (7, chord(&["ctrl", "3"])),
                (9, chord(&["ctrl", "shift", "b"])),
            ],
        ),
    ];

    layers
        .into_iter()
        .filter(|layer| layer.selector < key_count)
        .map(|mut layer| {
            layer.bindings.retain(|entry| entry.key < key_count);
            layer
        })
        .collect()
}
