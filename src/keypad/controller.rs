//! Owns every key, drives the poll tick and manages LED sleep

use image::Rgb;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::grid::Grid;
use super::io::{LedFault, LedSink, RawSwitch, OFF};
use super::key::{KeyEvent, KeyState, KeyTiming};

/// Default idle time before the LEDs are switched off
pub const DEFAULT_SLEEP_TIMEOUT: Duration = Duration::from_secs(60);

/// LED power-save settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SleepPolicy {
    pub enabled: bool,
    pub timeout: Duration,
}

impl Default for SleepPolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            timeout: DEFAULT_SLEEP_TIMEOUT,
        }
    }
}

/// What happened during one tick
#[derive(Debug, Default)]
pub struct TickReport {
    /// Key edges in key-number order
    pub events: Vec<(usize, KeyEvent)>,
    /// LED writes that failed; key state is unaffected
    pub led_faults: Vec<LedFault>,
    pub went_to_sleep: bool,
    pub woke: bool,
}

/// The keypad: one `KeyState` per key plus idle/sleep bookkeeping
#[derive(Debug)]
pub struct Controller {
    grid: Grid,
    keys: Vec<KeyState>,
    time_of_last_press: Instant,
    sleep: SleepPolicy,
    sleeping: bool,
    /// Colours to restore on wake, one per key; present only while asleep
    saved_leds: Option<Vec<Rgb<u8>>>,
}

impl Controller {
    pub fn new(grid: Grid, timing: KeyTiming, sleep: SleepPolicy, now: Instant) -> Self {
        let keys = (0..grid.len())
            .map(|n| {
                let xy = grid.xy(n).unwrap_or_default();
                KeyState::new(n, xy, timing)
            })
            .collect();

        Self {
            grid,
            keys,
            time_of_last_press: now,
            sleep,
            sleeping: false,
            saved_leds: None,
        }
    }

    /// Sample every key once, then update idle time and LED sleep
    pub fn tick<S, L>(&mut self, now: Instant, switches: &S, leds: &mut L) -> TickReport
    where
        S: RawSwitch + ?Sized,
        L: LedSink + ?Sized,
    {
        let mut report = TickReport::default();

        for key in &mut self.keys {
            let raw = switches.read(key.number());
            if let Some(event) = key.update(raw, now) {
                debug!("Key {} {:?}", key.number(), event);
                report.events.push((key.number(), event));
            }
        }

        if self.any_pressed() {
            self.time_of_last_press = now;
            self.sleeping = false;
        }

        let idle = now.saturating_duration_since(self.time_of_last_press);
        if self.sleep.enabled && !self.sleeping && idle > self.sleep.timeout {
            info!("No key pressed for {:?}, switching LEDs off", idle);
            self.saved_leds = Some(self.keys.iter().map(KeyState::displayed).collect());
            for n in 0..self.keys.len() {
                if let Err(e) = self.write_led(n, OFF, leds) {
                    report.led_faults.push(e);
                }
            }
            self.sleeping = true;
            report.went_to_sleep = true;
        }

        if !self.sleeping {
            if let Some(saved) = self.saved_leds.take() {
                info!("Key pressed, restoring LEDs");
                for (n, rgb) in saved.into_iter().enumerate() {
                    if let Err(e) = self.write_led(n, rgb, leds) {
                        report.led_faults.push(e);
                    }
                }
                report.woke = true;
            }
        }

        for fault in &report.led_faults {
            warn!("LED update skipped: {}", fault);
        }

        report
    }

    /// Record and output one pixel, ignoring sleep
    fn write_led<L>(&mut self, number: usize, rgb: Rgb<u8>, leds: &mut L) -> Result<(), LedFault>
    where
        L: LedSink + ?Sized,
    {
        let key = self
            .keys
            .get_mut(number)
            .ok_or(LedFault::UnknownKey(number))?;
        key.record_led(rgb);
        let (x, y) = key.xy();
        leds.set_pixel(x, y, rgb)
    }

    // === LEDs ===

    /// Set one key's LED. While asleep the colour is kept for wake-up and
    /// the LED stays dark.
    pub fn set_led<L>(&mut self, number: usize, rgb: Rgb<u8>, leds: &mut L) -> Result<(), LedFault>
    where
        L: LedSink + ?Sized,
    {
        if let Some(saved) = self.saved_leds.as_mut() {
            let slot = saved.get_mut(number).ok_or(LedFault::UnknownKey(number))?;
            *slot = rgb;
            if let Some(key) = self.keys.get_mut(number) {
                if rgb != OFF {
                    key.set_color(rgb);
                }
            }
            return Ok(());
        }
        self.write_led(number, rgb, leds)
    }

    /// Set every LED; reports the first failure after trying them all
    pub fn set_all_leds<L>(&mut self, rgb: Rgb<u8>, leds: &mut L) -> Result<(), LedFault>
    where
        L: LedSink + ?Sized,
    {
        let mut first_fault = None;
        for n in 0..self.keys.len() {
            if let Err(e) = self.set_led(n, rgb, leds) {
                warn!("LED update skipped: {}", e);
                first_fault.get_or_insert(e);
            }
        }
        first_fault.map_or(Ok(()), Err)
    }

    pub fn led_off<L>(&mut self, number: usize, leds: &mut L) -> Result<(), LedFault>
    where
        L: LedSink + ?Sized,
    {
        self.set_led(number, OFF, leds)
    }

    /// Light the key with its last colour
    pub fn led_on<L>(&mut self, number: usize, leds: &mut L) -> Result<(), LedFault>
    where
        L: LedSink + ?Sized,
    {
        let rgb = self.key(number).ok_or(LedFault::UnknownKey(number))?.color();
        self.set_led(number, rgb, leds)
    }

    /// Flip a key's LED, optionally choosing the colour it comes back on with
    pub fn toggle_led<L>(
        &mut self,
        number: usize,
        rgb: Option<Rgb<u8>>,
        leds: &mut L,
    ) -> Result<(), LedFault>
    where
        L: LedSink + ?Sized,
    {
        let lit = self.led_state(number).ok_or(LedFault::UnknownKey(number))? != OFF;
        if let (Some(rgb), Some(key)) = (rgb, self.keys.get_mut(number)) {
            key.set_color(rgb);
        }
        if lit {
            self.led_off(number, leds)
        } else {
            self.led_on(number, leds)
        }
    }

    /// Colour a key shows when awake (the saved colour while asleep)
    pub fn led_state(&self, number: usize) -> Option<Rgb<u8>> {
        match &self.saved_leds {
            Some(saved) => saved.get(number).copied(),
            None => self.key(number).map(KeyState::displayed),
        }
    }

    // === Keys ===

    pub fn key(&self, number: usize) -> Option<&KeyState> {
        self.keys.get(number)
    }

    /// Mutable access for attaching callbacks or per-key timing
    pub fn key_mut(&mut self, number: usize) -> Option<&mut KeyState> {
        self.keys.get_mut(number)
    }

    pub fn keys(&self) -> &[KeyState] {
        &self.keys
    }

    pub fn is_pressed(&self, number: usize) -> bool {
        self.key(number).is_some_and(KeyState::is_pressed)
    }

    /// Swallow a key's current press (layer selection)
    pub fn consume_press(&mut self, number: usize) -> bool {
        self.keys
            .get_mut(number)
            .is_some_and(KeyState::consume_press)
    }

    /// Debounced level of every key
    pub fn states(&self) -> Vec<bool> {
        self.keys.iter().map(KeyState::is_pressed).collect()
    }

    pub fn pressed_keys(&self) -> Vec<usize> {
        self.keys
            .iter()
            .filter(|k| k.is_pressed())
            .map(KeyState::number)
            .collect()
    }

    pub fn any_pressed(&self) -> bool {
        self.keys.iter().any(KeyState::is_pressed)
    }

    pub fn none_pressed(&self) -> bool {
        !self.any_pressed()
    }

    // === Idle / sleep ===

    pub fn time_of_last_press(&self) -> Instant {
        self.time_of_last_press
    }

    pub fn time_since_last_press(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.time_of_last_press)
    }

    pub fn is_sleeping(&self) -> bool {
        self.sleeping
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::HashMap;

    /// Frame buffer LED sink for tests
    #[derive(Debug, Default)]
    pub(crate) struct FrameSink {
        pub pixels: HashMap<(usize, usize), Rgb<u8>>,
        pub writes: usize,
        pub failing: bool,
    }

    impl FrameSink {
        pub fn at(&self, x: usize, y: usize) -> Rgb<u8> {
            self.pixels.get(&(x, y)).copied().unwrap_or(OFF)
        }
    }

    impl LedSink for FrameSink {
        fn set_pixel(&mut self, x: usize, y: usize, rgb: Rgb<u8>) -> Result<(), LedFault> {
            if self.failing {
                return Err(LedFault::Unavailable);
            }
            self.writes += 1;
            self.pixels.insert((x, y), rgb);
            Ok(())
        }
    }

    fn controller(t0: Instant, sleep: bool) -> Controller {
        let policy = SleepPolicy {
            enabled: sleep,
            timeout: DEFAULT_SLEEP_TIMEOUT,
        };
        Controller::new(Grid::new(4, 4).unwrap(), KeyTiming::default(), policy, t0)
    }

    fn secs(t0: Instant, s: u64) -> Instant {
        t0 + Duration::from_secs(s)
    }

    fn pressed(keys: &[usize]) -> Vec<bool> {
        (0..16).map(|n| keys.contains(&n)).collect()
    }

    #[test]
    fn test_pressed_keys_and_states() {
        let t0 = Instant::now();
        let mut pad = controller(t0, false);
        let mut leds = FrameSink::default();

        let report = pad.tick(t0, &pressed(&[2, 7]), &mut leds);
        assert_eq!(
            report.events,
            vec![(2, KeyEvent::Pressed), (7, KeyEvent::Pressed)]
        );
        assert_eq!(pad.pressed_keys(), vec![2, 7]);
        assert!(pad.any_pressed());
        assert!(!pad.none_pressed());
        assert!(pad.states()[7]);
        assert!(!pad.states()[0]);
    }

    #[test]
    fn test_sleep_and_wake_restore_every_led() {
        let t0 = Instant::now();
        let mut pad = controller(t0, true);
        let mut leds = FrameSink::default();
        let idle = pressed(&[]);

        for n in 0..16u8 {
            // Every third key stays dark
            let rgb = if n % 3 == 0 {
                OFF
            } else {
                Rgb([n * 10, 255 - n, n])
            };
            pad.set_led(n as usize, rgb, &mut leds).unwrap();
        }
        let before: Vec<_> = (0..16).map(|n| pad.key(n).unwrap().displayed()).collect();
        let frame_before = leds.pixels.clone();

        pad.tick(secs(t0, 30), &idle, &mut leds);
        assert!(!pad.is_sleeping());

        let report = pad.tick(secs(t0, 61), &idle, &mut leds);
        assert!(report.went_to_sleep);
        assert!(pad.is_sleeping());
        assert!(leds.pixels.values().all(|&rgb| rgb == OFF));

        // Staying asleep does not rewrite anything
        let writes = leds.writes;
        pad.tick(secs(t0, 90), &idle, &mut leds);
        assert_eq!(leds.writes, writes);

        let report = pad.tick(secs(t0, 120), &pressed(&[5]), &mut leds);
        assert!(report.woke);
        assert!(!pad.is_sleeping());
        assert_eq!(leds.writes, writes + 16);
        assert_eq!(leds.pixels, frame_before);
        let after: Vec<_> = (0..16).map(|n| pad.key(n).unwrap().displayed()).collect();
        assert_eq!(after, before);
    }

    #[test]
    fn test_wake_replays_once() {
        let t0 = Instant::now();
        let mut pad = controller(t0, true);
        let mut leds = FrameSink::default();

        pad.tick(secs(t0, 61), &pressed(&[]), &mut leds);
        pad.tick(secs(t0, 62), &pressed(&[1]), &mut leds);
        let writes = leds.writes;
        let report = pad.tick(secs(t0, 63), &pressed(&[1]), &mut leds);
        assert!(!report.woke);
        assert_eq!(leds.writes, writes);
    }

    #[test]
    fn test_sleep_disabled_never_dims() {
        let t0 = Instant::now();
        let mut pad = controller(t0, false);
        let mut leds = FrameSink::default();
        pad.set_led(4, Rgb([1, 2, 3]), &mut leds).unwrap();

        pad.tick(secs(t0, 600), &pressed(&[]), &mut leds);
        assert!(!pad.is_sleeping());
        assert_eq!(leds.at(0, 1), Rgb([1, 2, 3]));
        assert_eq!(pad.time_since_last_press(secs(t0, 600)), Duration::from_secs(600));
    }

    #[test]
    fn test_set_led_while_asleep_is_restored_on_wake() {
        let t0 = Instant::now();
        let mut pad = controller(t0, true);
        let mut leds = FrameSink::default();

        pad.tick(secs(t0, 61), &pressed(&[]), &mut leds);
        pad.set_led(0, Rgb([0, 255, 25]), &mut leds).unwrap();
        assert_eq!(leds.at(0, 0), OFF);
        assert_eq!(pad.led_state(0), Some(Rgb([0, 255, 25])));

        pad.set_all_leds(Rgb([9, 9, 9]), &mut leds).unwrap();
        assert!(leds.pixels.values().all(|&rgb| rgb == OFF));

        pad.tick(secs(t0, 62), &pressed(&[3]), &mut leds);
        assert_eq!(leds.at(0, 0), Rgb([9, 9, 9]));
        assert_eq!(leds.at(3, 3), Rgb([9, 9, 9]));
    }

    #[test]
    fn test_led_fault_does_not_disturb_keys() {
        let t0 = Instant::now();
        let mut pad = controller(t0, true);
        let mut leds = FrameSink {
            failing: true,
            ..Default::default()
        };

        assert_eq!(
            pad.set_led(1, Rgb([1, 1, 1]), &mut leds),
            Err(LedFault::Unavailable)
        );

        let report = pad.tick(secs(t0, 61), &pressed(&[]), &mut leds);
        assert!(report.went_to_sleep);
        assert_eq!(report.led_faults.len(), 16);

        let report = pad.tick(secs(t0, 62), &pressed(&[6]), &mut leds);
        assert_eq!(report.events, vec![(6, KeyEvent::Pressed)]);
        assert!(report.woke);
        assert_eq!(pad.pressed_keys(), vec![6]);
    }

    #[test]
    fn test_toggle_and_led_on_use_last_colour() {
        let t0 = Instant::now();
        let mut pad = controller(t0, false);
        let mut leds = FrameSink::default();

        pad.toggle_led(5, Some(Rgb([10, 20, 30])), &mut leds).unwrap();
        assert_eq!(leds.at(1, 1), Rgb([10, 20, 30]));
        pad.toggle_led(5, None, &mut leds).unwrap();
        assert_eq!(leds.at(1, 1), OFF);
        pad.led_on(5, &mut leds).unwrap();
        assert_eq!(leds.at(1, 1), Rgb([10, 20, 30]));
    }

    #[test]
    fn test_unknown_key_led() {
        let t0 = Instant::now();
        let mut pad = controller(t0, false);
        let mut leds = FrameSink::default();
        assert_eq!(
            pad.set_led(16, Rgb([1, 1, 1]), &mut leds),
            Err(LedFault::UnknownKey(16))
        );
    }
}
