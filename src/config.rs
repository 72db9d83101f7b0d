use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;
use crate::keypad::{Grid, KeyTiming, Rotation, SleepPolicy};
use crate::layers::store::{self, LayerConfig};
use crate::layers::{DispatchWindows, LatchPolicy, LayerSet};

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub device: DeviceConfig,
    pub grid: GridConfig,
    pub timing: TimingConfig,
    pub sleep: SleepConfig,
    pub layers: LayersConfig,
}

/// Everything the keypad needs at runtime, checked
#[derive(Debug, Clone)]
pub struct Validated {
    pub grid: Grid,
    pub timing: KeyTiming,
    pub sleep: SleepPolicy,
    pub layers: LayerSet,
}

impl Config {
    /// Load configuration from `path` (or the default location), creating
    /// the default file if it does not exist yet
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path()?,
        };

        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read {}", config_path.display()))?;
            let config: Config = toml::from_str(&contents)
                .with_context(|| format!("Failed to parse {}", config_path.display()))?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save(&config_path)?;
            Ok(config)
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Get config file path
    pub fn config_path() -> Result<PathBuf> {
        let home = std::env::var("HOME")?;
        Ok(PathBuf::from(home).join(".config/layerpad/config.toml"))
    }

    /// Check every section and build the runtime keypad settings
    pub fn validate(&self) -> Result<Validated, ConfigError> {
        let rotation = Rotation::from_degrees(self.grid.rotation)?;
        let grid = Grid::new(self.grid.width, self.grid.height)?.with_rotation(rotation);

        let timing = KeyTiming {
            debounce: millis("timing.debounce_ms", self.timing.debounce_ms)?,
            hold: millis("timing.hold_ms", self.timing.hold_ms)?,
        };
        let windows = DispatchWindows {
            short: millis("timing.short_dispatch_ms", self.timing.short_dispatch_ms)?,
            long: millis("timing.long_dispatch_ms", self.timing.long_dispatch_ms)?,
        };
        millis("device.poll_interval_ms", self.device.poll_interval_ms)?;
        if self.device.keepalive_secs == 0 {
            return Err(ConfigError::ZeroDuration("device.keepalive_secs"));
        }

        if self.sleep.timeout_secs == 0 {
            return Err(ConfigError::ZeroDuration("sleep.timeout_secs"));
        }
        let sleep = SleepPolicy {
            enabled: self.sleep.enabled,
            timeout: Duration::from_secs(self.sleep.timeout_secs),
        };

        let ready_color = store::parse_hex_color(&self.layers.ready_color)
            .ok_or_else(|| ConfigError::InvalidColor(self.layers.ready_color.clone()))?;
        let layers = self
            .layers
            .layer
            .iter()
            .map(LayerConfig::to_layer)
            .collect::<Result<Vec<_>, _>>()?;
        let layers = LayerSet::new(
            grid.len(),
            self.layers.modifier,
            layers,
            self.layers.start_layer,
        )?
        .with_latch(self.layers.latch)
        .with_windows(windows)
        .with_ready_color(ready_color);

        Ok(Validated {
            grid,
            timing,
            sleep,
            layers,
        })
    }
}

fn millis(name: &'static str, ms: u64) -> Result<Duration, ConfigError> {
    if ms == 0 {
        return Err(ConfigError::ZeroDuration(name));
    }
    Ok(Duration::from_millis(ms))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Device brightness (0-100)
    pub brightness: u8,
    /// Time between keypad polls
    pub poll_interval_ms: u64,
    /// Seconds between keep-alive packets
    pub keepalive_secs: u64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            brightness: 80,
            poll_interval_ms: 5,
            keepalive_secs: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    pub width: usize,
    pub height: usize,
    /// Degrees clockwise, a multiple of 90
    pub rotation: i32,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            width: 5,
            height: 2,
            rotation: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Lock time after a press edge
    pub debounce_ms: u64,
    /// Press time before a key counts as held
    pub hold_ms: u64,
    /// Dispatch debounce after a key, chord or media action
    pub short_dispatch_ms: u64,
    /// Dispatch debounce after a text action
    pub long_dispatch_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 125,
            hold_ms: 750,
            short_dispatch_ms: 30,
            long_dispatch_ms: 150,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SleepConfig {
    /// Switch LEDs off after a period without key presses
    pub enabled: bool,
    pub timeout_secs: u64,
}

impl Default for SleepConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayersConfig {
    /// Key that switches the keypad into layer selection while held
    pub modifier: usize,
    /// Modifier colour while not selecting (hex)
    pub ready_color: String,
    /// Layer id to start on; lowest id when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_layer: Option<u8>,
    pub latch: LatchPolicy,
    pub layer: Vec<LayerConfig>,
}

impl Default for LayersConfig {
    fn default() -> Self {
        let grid = GridConfig::default();
        Self {
            modifier: 0,
            ready_color: "#00FF19".to_string(),
            start_layer: None,
            latch: LatchPolicy::PerKey,
            layer: store::default_layers(grid.width * grid.height),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::{Action, ConsumerCode, KeyCode, READY_COLOR};
    use image::Rgb;

    const SMALL: &str = r##"
[grid]
width = 4
height = 4

[timing]
debounce_ms = 100

[layers]
modifier = 0
latch = "shared"
start_layer = 2

[[layers.layer]]
id = 1
name = "numpad"
selector = 1
color = "#FF00FF"

[[layers.layer.bindings]]
key = 4
action = { type = "key", value = "0" }

[[layers.layer]]
id = 2
name = "media"
selector = 2
color = "#FFFF00"

[[layers.layer.bindings]]
key = 6
action = { type = "consumer", value = "volume_decrement" }

[[layers.layer.bindings]]
key = 1
action = { type = "text", value = "Lol" }
"##;

    #[test]
    fn test_default_config_validates() {
        let validated = Config::default().validate().unwrap();
        assert_eq!(validated.grid.len(), 10);
        assert_eq!(validated.timing, KeyTiming::default());
        assert!(!validated.sleep.enabled);
        assert_eq!(validated.layers.layers().len(), 5);
        assert_eq!(validated.layers.modifier(), 0);
        assert_eq!(validated.layers.ready_color, READY_COLOR);
        assert_eq!(validated.layers.latch, LatchPolicy::PerKey);
    }

    #[test]
    fn test_parse_layers_from_toml() {
        let config: Config = toml::from_str(SMALL).unwrap();
        assert_eq!(config.device, DeviceConfig::default());
        assert_eq!(config.timing.hold_ms, 750);

        let validated = config.validate().unwrap();
        assert_eq!(validated.grid.len(), 16);
        assert_eq!(validated.timing.debounce, Duration::from_millis(100));
        assert_eq!(validated.layers.latch, LatchPolicy::Shared);

        let layers = &validated.layers;
        let start = &layers.layers()[layers.start_index()];
        assert_eq!(start.name, "media");
        assert_eq!(start.color, Rgb([255, 255, 0]));
        assert_eq!(
            start.action(6),
            Some(&Action::Consumer(ConsumerCode::VolumeDecrement))
        );
        assert_eq!(start.action(1), Some(&Action::Text("Lol".into())));
        assert_eq!(
            layers.layers()[0].action(4),
            Some(&Action::Key(KeyCode::Char('0')))
        );
    }

    #[test]
    fn test_default_config_survives_toml() {
        let config = Config::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_zero_duration_rejected() {
        let mut config = Config::default();
        config.timing.short_dispatch_ms = 0;
        assert_eq!(
            config.validate().unwrap_err(),
            ConfigError::ZeroDuration("timing.short_dispatch_ms")
        );

        let mut config = Config::default();
        config.sleep.timeout_secs = 0;
        assert_eq!(
            config.validate().unwrap_err(),
            ConfigError::ZeroDuration("sleep.timeout_secs")
        );
    }

    #[test]
    fn test_bad_grid_rejected() {
        let mut config = Config::default();
        config.grid.rotation = 45;
        assert_eq!(
            config.validate().unwrap_err(),
            ConfigError::InvalidRotation(45)
        );

        let mut config = Config::default();
        config.grid.height = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::EmptyGrid { .. })
        ));
    }

    #[test]
    fn test_default_layers_must_fit_grid() {
        let mut config = Config::default();
        config.grid = GridConfig {
            width: 3,
            height: 3,
            rotation: 0,
        };
        assert_eq!(
            config.validate().unwrap_err(),
            ConfigError::KeyOutOfRange { key: 9, len: 9 }
        );
    }

    #[test]
    fn test_layer_errors_surface() {
        let mut config: Config = toml::from_str(SMALL).unwrap();
        config.layers.start_layer = Some(7);
        assert_eq!(config.validate().unwrap_err(), ConfigError::UnknownLayer(7));

        let mut config: Config = toml::from_str(SMALL).unwrap();
        config.layers.modifier = 2;
        assert_eq!(
            config.validate().unwrap_err(),
            ConfigError::ModifierIsSelector(2)
        );

        let mut config: Config = toml::from_str(SMALL).unwrap();
        config.layers.ready_color = "green".into();
        assert_eq!(
            config.validate().unwrap_err(),
            ConfigError::InvalidColor("green".into())
        );
    }

    #[test]
    fn test_selector_bound_in_own_layer_rejected() {
        let text = SMALL.replace("key = 6", "key = 2");
        let config: Config = toml::from_str(&text).unwrap();
        assert_eq!(
            config.validate().unwrap_err(),
            ConfigError::SelectorBound { key: 2, layer: 2 }
        );
    }
}
