//! Per-key debounce and press/release/hold state machine

use image::Rgb;
use std::fmt;
use std::time::{Duration, Instant};

use super::io::OFF;

/// Default lock time after a press edge
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(125);

/// Default continuous press time before a key counts as held
pub const DEFAULT_HOLD: Duration = Duration::from_millis(750);

/// Callback attached to a key event
pub type KeyCallback = Box<dyn FnMut(&KeyState)>;

/// Edge reported by a single key update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEvent {
    Pressed,
    Released,
    Held,
}

/// Timing shared by every key unless overridden per key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyTiming {
    pub debounce: Duration,
    pub hold: Duration,
}

impl Default for KeyTiming {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            hold: DEFAULT_HOLD,
        }
    }
}

/// One physical key: debounced level, hold tracking and LED colour
pub struct KeyState {
    number: usize,
    xy: (usize, usize),
    raw_pressed: bool,
    pressed: bool,
    /// Last false -> true flip of `pressed`
    last_transition: Option<Instant>,
    held_for: Duration,
    held: bool,
    locked: bool,
    /// Press taken by the layer selector; stays hidden until the switch opens
    consumed: bool,
    press_fired: bool,
    hold_fired: bool,
    debounce: Duration,
    hold_threshold: Duration,
    rgb: Rgb<u8>,
    lit: bool,
    on_press: Option<KeyCallback>,
    on_release: Option<KeyCallback>,
    on_hold: Option<KeyCallback>,
}

impl KeyState {
    pub fn new(number: usize, xy: (usize, usize), timing: KeyTiming) -> Self {
        Self {
            number,
            xy,
            raw_pressed: false,
            pressed: false,
            last_transition: None,
            held_for: Duration::ZERO,
            held: false,
            locked: false,
            consumed: false,
            press_fired: false,
            hold_fired: false,
            debounce: timing.debounce,
            hold_threshold: timing.hold,
            rgb: OFF,
            lit: false,
            on_press: None,
            on_release: None,
            on_hold: None,
        }
    }

    /// Sample the switch level and advance the state machine.
    ///
    /// While locked (inside the debounce window after a press edge) the
    /// visible level keeps its previous value, so chatter right after a
    /// press cannot produce extra edges.
    pub fn update(&mut self, raw: bool, now: Instant) -> Option<KeyEvent> {
        self.raw_pressed = raw;
        if self.consumed && !raw {
            self.consumed = false;
        }

        self.locked = self
            .last_transition
            .is_some_and(|t| now.saturating_duration_since(t) < self.debounce);

        let was_pressed = self.pressed;
        if !self.locked && !self.consumed {
            self.pressed = raw;
        }

        let mut event = None;

        if self.pressed && !was_pressed {
            self.last_transition = Some(now);
            self.held_for = Duration::ZERO;
            if !self.press_fired && !self.locked {
                self.press_fired = true;
                event = Some(KeyEvent::Pressed);
                self.run_callback(KeyEvent::Pressed);
            }
        } else if !self.pressed && was_pressed {
            self.press_fired = false;
            self.held_for = Duration::ZERO;
            event = Some(KeyEvent::Released);
            self.run_callback(KeyEvent::Released);
        } else if self.pressed {
            if let Some(since) = self.last_transition {
                self.held_for = now.saturating_duration_since(since);
            }
        }

        if self.held_for > self.hold_threshold {
            self.held = true;
            if !self.hold_fired {
                self.hold_fired = true;
                event = Some(KeyEvent::Held);
                self.run_callback(KeyEvent::Held);
            }
        } else {
            self.held = false;
            self.hold_fired = false;
        }

        event
    }

    fn callback_slot(&mut self, event: KeyEvent) -> &mut Option<KeyCallback> {
        match event {
            KeyEvent::Pressed => &mut self.on_press,
            KeyEvent::Released => &mut self.on_release,
            KeyEvent::Held => &mut self.on_hold,
        }
    }

    fn run_callback(&mut self, event: KeyEvent) {
        if let Some(mut callback) = self.callback_slot(event).take() {
            callback(self);
            *self.callback_slot(event) = Some(callback);
        }
    }

    /// Swallow the current press: the key reads released until the switch
    /// opens, without a release edge. Returns false if it was not pressed.
    pub fn consume_press(&mut self) -> bool {
        if !self.pressed {
            return false;
        }
        self.pressed = false;
        self.consumed = self.raw_pressed;
        self.press_fired = false;
        self.hold_fired = false;
        self.held = false;
        self.held_for = Duration::ZERO;
        true
    }

    // === Callbacks ===

    pub fn on_press(&mut self, callback: impl FnMut(&KeyState) + 'static) {
        self.on_press = Some(Box::new(callback));
    }

    pub fn on_release(&mut self, callback: impl FnMut(&KeyState) + 'static) {
        self.on_release = Some(Box::new(callback));
    }

    pub fn on_hold(&mut self, callback: impl FnMut(&KeyState) + 'static) {
        self.on_hold = Some(Box::new(callback));
    }

    // === Timing ===

    pub fn set_debounce(&mut self, window: Duration) {
        self.debounce = window;
    }

    pub fn set_hold_threshold(&mut self, threshold: Duration) {
        self.hold_threshold = threshold;
    }

    // === LED bookkeeping (written through the controller) ===

    /// Record the colour now shown; black turns the key unlit but keeps the
    /// last colour for `color()`
    pub(crate) fn record_led(&mut self, rgb: Rgb<u8>) {
        if rgb == OFF {
            self.lit = false;
        } else {
            self.lit = true;
            self.rgb = rgb;
        }
    }

    /// Colour currently shown
    pub fn displayed(&self) -> Rgb<u8> {
        if self.lit {
            self.rgb
        } else {
            OFF
        }
    }

    /// Last non-black colour, used to turn the LED back on
    pub fn color(&self) -> Rgb<u8> {
        self.rgb
    }

    pub(crate) fn set_color(&mut self, rgb: Rgb<u8>) {
        self.rgb = rgb;
    }

    pub fn is_lit(&self) -> bool {
        self.lit
    }

    // === Accessors ===

    pub fn number(&self) -> usize {
        self.number
    }

    pub fn xy(&self) -> (usize, usize) {
        self.xy
    }

    pub fn is_pressed(&self) -> bool {
        self.pressed
    }

    pub fn raw_pressed(&self) -> bool {
        self.raw_pressed
    }

    pub fn is_held(&self) -> bool {
        self.held
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn held_for(&self) -> Duration {
        self.held_for
    }

    pub fn last_transition(&self) -> Option<Instant> {
        self.last_transition
    }

    pub fn debounce(&self) -> Duration {
        self.debounce
    }

    pub fn hold_threshold(&self) -> Duration {
        self.hold_threshold
    }
}

impl fmt::Debug for KeyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyState")
            .field("number", &self.number)
            .field("xy", &self.xy)
            .field("pressed", &self.pressed)
            .field("held", &self.held)
            .field("locked", &self.locked)
            .field("rgb", &self.rgb)
            .field("lit", &self.lit)
            .finish_non_exhaustive()
    }
}
