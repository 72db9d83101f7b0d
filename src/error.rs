//! Error types for configuration and collaborator faults

use thiserror::Error;

/// Invalid configuration, detected before the keypad starts
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Grid has a zero dimension
    #[error("Grid dimensions must be non-zero (got {width}x{height})")]
    EmptyGrid { width: usize, height: usize },

    /// Grid does not describe the connected deck's key layout
    #[error("Grid {width}x{height} does not match the deck's {columns}x{rows} keys")]
    GridMismatch {
        width: usize,
        height: usize,
        columns: usize,
        rows: usize,
    },

    /// Rotation is not a multiple of 90 degrees
    #[error("Rotation must be a multiple of 90 degrees (got {0})")]
    InvalidRotation(i32),

    /// A key number lies outside the grid
    #[error("Key {key} is outside the {len}-key grid")]
    KeyOutOfRange { key: usize, len: usize },

    /// A duration that must be positive is zero
    #[error("Duration '{0}' must be greater than zero")]
    ZeroDuration(&'static str),

    /// No layers configured
    #[error("At least one layer must be configured")]
    NoLayers,

    /// Two layers share an id
    #[error("Layer id {0} is configured more than once")]
    DuplicateLayer(u8),

    /// Start layer refers to an id that is not configured
    #[error("Layer {0} is not configured")]
    UnknownLayer(u8),

    /// The modifier key is also used as a layer selector
    #[error("Modifier key {0} cannot also select a layer")]
    ModifierIsSelector(usize),

    /// The modifier key is bound to an action
    #[error("Modifier key {key} is bound in layer {layer}")]
    ModifierBound { key: usize, layer: u8 },

    /// Two layers share a selector key
    #[error("Selector key {key} is used by layers {first} and {second}")]
    DuplicateSelector { key: usize, first: u8, second: u8 },

    /// A selector key is bound in its own layer
    #[error("Selector key {key} is bound in its own layer {layer}")]
    SelectorBound { key: usize, layer: u8 },

    /// A key is bound twice in the same layer
    #[error("Key {key} is bound more than once in layer {layer}")]
    DuplicateBinding { key: usize, layer: u8 },

    /// Key code name not recognised
    #[error("Unknown key code: {0}")]
    UnknownKeyCode(String),

    /// Consumer control name not recognised
    #[error("Unknown consumer control code: {0}")]
    UnknownConsumerCode(String),

    /// Chord with no key codes
    #[error("Chord bound to key {key} in layer {layer} is empty")]
    EmptyChord { key: usize, layer: u8 },

    /// Colour string is not `#RRGGBB`
    #[error("Invalid colour '{0}' (expected #RRGGBB)")]
    InvalidColor(String),
}

/// LED write failure reported by an `LedSink`
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedFault {
    /// Pixel coordinate outside the panel
    #[error("Pixel ({x}, {y}) is outside the panel")]
    OutOfRange { x: usize, y: usize },

    /// Key number has no LED
    #[error("Key {0} has no LED")]
    UnknownKey(usize),

    /// The LED device is not available
    #[error("LED device unavailable")]
    Unavailable,

    /// Backend reported a failure
    #[error("LED write failed: {0}")]
    Write(String),
}

/// Host-side emission failure reported by an `ActionSink`
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ActionFault {
    /// Backend could not be reached
    #[error("Action sink unavailable")]
    Unavailable,

    /// Backend reported a failure while emitting
    #[error("Failed to emit {what}: {reason}")]
    Emit { what: &'static str, reason: String },
}
