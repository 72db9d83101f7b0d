//! Layer selection and action dispatch
//!
//! Holding the modifier turns the keypad into a layer chooser: the selector
//! keys light up in their layer colours and tapping one switches layer.
//! With the modifier up, every pressed key bound in the active layer plays
//! its action once per press, then stays latched for a debounce window
//! chosen by the kind of action that played.

use image::Rgb;
use std::collections::{BTreeMap, BTreeSet};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::{Action, LatchPolicy, Layer, LayerSet};
use crate::error::ActionFault;
use crate::input::{self, ActionSink};
use crate::keypad::{Controller, LedFault, LedSink, OFF};

/// Blocks re-firing until its key has been up for `window`
#[derive(Debug, Clone, Copy)]
struct Latch {
    window: Duration,
    last_seen: Instant,
}

impl Latch {
    fn expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_seen) > self.window
    }
}

/// What the engine did during one tick
#[derive(Debug, Default)]
pub struct EngineReport {
    /// Id of the layer switched to this tick
    pub switched_to: Option<u8>,
    /// Actions handed to the sink, by key number
    pub dispatched: Vec<(usize, Action)>,
    /// Emissions the sink rejected; they are not retried
    pub action_faults: Vec<ActionFault>,
    pub led_faults: Vec<LedFault>,
}

/// Chooses the active layer and plays bound actions
#[derive(Debug)]
pub struct LayerEngine {
    layers: LayerSet,
    /// Index into `layers`
    active: usize,
    /// Modifier was down on the previous tick
    selecting: bool,
    /// Selector keys that were down on the previous tick
    held_selectors: BTreeSet<usize>,
    latches: BTreeMap<usize, Latch>,
    shared_latch: Option<Latch>,
}

impl LayerEngine {
    pub fn new(layers: LayerSet) -> Self {
        let active = layers.start_index();
        Self {
            layers,
            active,
            selecting: false,
            held_selectors: BTreeSet::new(),
            latches: BTreeMap::new(),
            shared_latch: None,
        }
    }

    /// Paint the active layer and the ready modifier; call once at startup
    /// or after the LEDs were reset
    pub fn show<L>(&self, pad: &mut Controller, leds: &mut L) -> Vec<LedFault>
    where
        L: LedSink + ?Sized,
    {
        let mut faults = Vec::new();
        self.paint_active(pad, leds, false, &mut faults);
        push_fault(
            &mut faults,
            pad.set_led(self.layers.modifier(), self.layers.ready_color, leds),
        );
        faults
    }

    /// Run layer selection, then dispatch, for the key states of this tick
    pub fn tick<L, A>(
        &mut self,
        now: Instant,
        pad: &mut Controller,
        leds: &mut L,
        actions: &mut A,
    ) -> EngineReport
    where
        L: LedSink + ?Sized,
        A: ActionSink + ?Sized,
    {
        let mut report = EngineReport::default();

        if pad.is_pressed(self.layers.modifier()) {
            self.select(pad, leds, &mut report);
        } else {
            if self.selecting {
                self.leave_selection(pad, leds, &mut report.led_faults);
            }
            self.dispatch(now, pad, actions, &mut report);
        }

        self.settle_latches(now, pad);
        self.held_selectors = self
            .layers
            .layers()
            .iter()
            .map(|layer| layer.selector)
            .filter(|&key| pad.is_pressed(key))
            .collect();

        for fault in &report.led_faults {
            warn!("LED update skipped: {}", fault);
        }

        report
    }

    /// Modifier held: show the selectors and switch when a selector goes
    /// down. A selector already down on the previous tick does not count.
    fn select<L>(&mut self, pad: &mut Controller, leds: &mut L, report: &mut EngineReport)
    where
        L: LedSink + ?Sized,
    {
        let faults = &mut report.led_faults;

        if !self.selecting {
            self.selecting = true;
            debug!("Modifier down, choosing layer");
            push_fault(faults, pad.led_off(self.layers.modifier(), leds));
            for layer in self.layers.layers() {
                push_fault(faults, pad.set_led(layer.selector, layer.color, leds));
            }
        }

        let chosen = self
            .layers
            .layers()
            .iter()
            .enumerate()
            .find(|&(index, layer)| {
                index != self.active
                    && pad.is_pressed(layer.selector)
                    && !self.held_selectors.contains(&layer.selector)
            })
            .map(|(index, layer)| (index, layer.selector, layer.id));

        if let Some((index, selector, id)) = chosen {
            self.active = index;
            pad.consume_press(selector);
            info!("Switched to layer {} ({})", id, self.active_layer().name);
            self.paint_active(pad, leds, true, faults);
            report.switched_to = Some(id);
        }
    }

    /// Modifier released: selectors show the active layer again
    fn leave_selection<L>(
        &mut self,
        pad: &mut Controller,
        leds: &mut L,
        faults: &mut Vec<LedFault>,
    ) where
        L: LedSink + ?Sized,
    {
        self.selecting = false;
        debug!("Modifier up, layer {} active", self.active_layer().id);

        let active = self.active_layer();
        for layer in self.layers.layers() {
            let rgb = if active.is_bound(layer.selector) {
                active.color
            } else {
                OFF
            };
            push_fault(faults, pad.set_led(layer.selector, rgb, leds));
        }
        push_fault(
            faults,
            pad.set_led(self.layers.modifier(), self.layers.ready_color, leds),
        );
    }

    /// Clear the keypad and light the keys bound in the active layer.
    /// The modifier is left alone; so are selectors while choosing.
    fn paint_active<L>(
        &self,
        pad: &mut Controller,
        leds: &mut L,
        keep_selectors: bool,
        faults: &mut Vec<LedFault>,
    ) where
        L: LedSink + ?Sized,
    {
        let layer = self.active_layer();
        let skip = |key: usize| {
            key == self.layers.modifier() || (keep_selectors && self.layers.is_selector(key))
        };

        for key in (0..pad.len()).filter(|&k| !skip(k)) {
            let rgb: Rgb<u8> = if layer.is_bound(key) { layer.color } else { OFF };
            push_fault(faults, pad.set_led(key, rgb, leds));
        }
    }

    /// Play the action of every newly pressed bound key
    fn dispatch<A>(
        &mut self,
        now: Instant,
        pad: &Controller,
        actions: &mut A,
        report: &mut EngineReport,
    ) where
        A: ActionSink + ?Sized,
    {
        let layer = &self.layers.layers()[self.active];
        let windows = self.layers.windows;

        let pressed = layer
            .bindings
            .iter()
            .filter(|&(&key, _)| pad.is_pressed(key));

        for (&key, action) in pressed {
            let latch = Latch {
                window: windows.for_kind(action.kind()),
                last_seen: now,
            };
            match self.layers.latch {
                LatchPolicy::PerKey => {
                    if self.latches.contains_key(&key) {
                        continue;
                    }
                    self.latches.insert(key, latch);
                }
                LatchPolicy::Shared => {
                    if self.shared_latch.is_some() {
                        break;
                    }
                    self.shared_latch = Some(latch);
                }
            }

            match input::play(actions, action) {
                Ok(()) => {
                    debug!("Key {} played {}", key, action);
                    report.dispatched.push((key, action.clone()));
                }
                Err(e) => {
                    warn!("Dropped {} from key {}: {}", action, key, e);
                    report.action_faults.push(e);
                }
            }
        }
    }

    /// Keep latches alive while their key (or, when shared, any bound key)
    /// is down; drop them once the window has passed since then
    fn settle_latches(&mut self, now: Instant, pad: &Controller) {
        self.latches.retain(|&key, latch| {
            if pad.is_pressed(key) {
                latch.last_seen = now;
            }
            !latch.expired(now)
        });

        let bound_pressed = self
            .active_layer()
            .bindings
            .keys()
            .any(|&key| pad.is_pressed(key));
        if let Some(latch) = self.shared_latch.as_mut() {
            if bound_pressed {
                latch.last_seen = now;
            }
            if latch.expired(now) {
                self.shared_latch = None;
            }
        }
    }

    pub fn active_layer(&self) -> &Layer {
        &self.layers.layers()[self.active]
    }

    pub fn layers(&self) -> &LayerSet {
        &self.layers
    }

    /// Modifier currently held
    pub fn is_selecting(&self) -> bool {
        self.selecting
    }

    /// Some key is still inside its dispatch debounce window
    pub fn is_latched(&self) -> bool {
        !self.latches.is_empty() || self.shared_latch.is_some()
    }
}

fn push_fault(faults: &mut Vec<LedFault>, result: Result<(), LedFault>) {
    if let Err(e) = result {
        faults.push(e);
    }
}
