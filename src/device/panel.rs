//! Bridge between the async deck connection and the synchronous keypad tick
//!
//! Button events update a level cache that the controller polls through
//! `RawSwitch`; LED writes land in a pending buffer that the runtime loop
//! flushes to the deck after each tick.

use image::Rgb;
use std::collections::BTreeMap;

use super::manager::InputEvent;
use super::protocol::{KEY_COLUMNS, KEY_COUNT};
use crate::error::ConfigError;
use crate::keypad::{Grid, KeyState, LedFault, LedSink, RawSwitch};

/// Last known button levels plus LED writes waiting for the device
#[derive(Debug)]
pub struct Panel {
    grid: Grid,
    /// Physical row-major levels
    levels: Vec<bool>,
    /// Latest colour per button
    pending: BTreeMap<usize, Rgb<u8>>,
    connected: bool,
}

impl Panel {
    /// The grid must describe the deck's physical key layout
    pub fn new(grid: Grid) -> Result<Self, ConfigError> {
        if grid.width() != KEY_COLUMNS || grid.len() != KEY_COUNT {
            return Err(ConfigError::GridMismatch {
                width: grid.width(),
                height: grid.height(),
                columns: KEY_COLUMNS,
                rows: KEY_COUNT / KEY_COLUMNS,
            });
        }
        Ok(Self {
            grid,
            levels: vec![false; KEY_COUNT],
            pending: BTreeMap::new(),
            connected: false,
        })
    }

    /// Apply one device event; buttons outside the grid are ignored
    pub fn apply(&mut self, event: InputEvent) {
        let (button, pressed) = match event {
            InputEvent::ButtonDown(b) => (b, true),
            InputEvent::ButtonUp(b) => (b, false),
            InputEvent::Ignored => return,
        };
        if let Some(level) = self.levels.get_mut(button) {
            *level = pressed;
        }
    }

    /// Mark the deck present or missing. A missing deck reads as all keys
    /// released and rejects LED writes.
    pub fn set_connected(&mut self, connected: bool) {
        self.connected = connected;
        if !connected {
            self.levels.iter_mut().for_each(|level| *level = false);
            self.pending.clear();
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Queue every key's current colour, e.g. after a reconnect
    pub fn repaint<'a>(&mut self, keys: impl IntoIterator<Item = &'a KeyState>) {
        for key in keys {
            let (x, y) = key.xy();
            let button = self.button(x, y);
            self.pending.insert(button, key.displayed());
        }
    }

    /// Take pending writes as (button, colour) pairs in button order
    pub fn take_pending(&mut self) -> Vec<(usize, Rgb<u8>)> {
        std::mem::take(&mut self.pending).into_iter().collect()
    }

    /// Row-major button number of a physical position
    fn button(&self, x: usize, y: usize) -> usize {
        y * KEY_COLUMNS + x
    }

    /// Levels of every key, by key number, for one controller tick
    pub fn snapshot(&self) -> Vec<bool> {
        (0..self.grid.len()).map(|n| self.read(n)).collect()
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}

impl RawSwitch for Panel {
    fn read(&self, number: usize) -> bool {
        self.grid
            .xy(number)
            .and_then(|(x, y)| self.levels.get(self.button(x, y)))
            .copied()
            .unwrap_or(false)
    }
}

impl LedSink for Panel {
    fn set_pixel(&mut self, x: usize, y: usize, rgb: Rgb<u8>) -> Result<(), LedFault> {
        if x >= self.grid.width() || y >= self.grid.height() {
            return Err(LedFault::OutOfRange { x, y });
        }
        if !self.connected {
            return Err(LedFault::Unavailable);
        }
        let button = self.button(x, y);
        self.pending.insert(button, rgb);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keypad::{Controller, KeyTiming, Rotation, SleepPolicy};
    use std::time::Instant;

    fn panel() -> Panel {
        let mut panel = Panel::new(Grid::new(5, 2).unwrap()).unwrap();
        panel.set_connected(true);
        panel
    }

    #[test]
    fn test_events_update_levels() {
        let mut panel = panel();
        panel.apply(InputEvent::ButtonDown(7));
        assert!(panel.read(7));
        assert!(!panel.read(6));

        panel.apply(InputEvent::ButtonUp(7));
        assert!(!panel.read(7));

        // Strip buttons and other extras are not keys
        panel.apply(InputEvent::ButtonDown(12));
        assert!(!panel.read(12));
    }

    #[test]
    fn test_grid_must_match_deck() {
        for (width, height) in [(4, 4), (2, 5), (5, 3), (10, 1)] {
            let grid = Grid::new(width, height).unwrap();
            assert_eq!(
                Panel::new(grid).unwrap_err(),
                ConfigError::GridMismatch {
                    width,
                    height,
                    columns: 5,
                    rows: 2
                }
            );
        }

        // Rotation relabels keys on the same physical layout
        let grid = Grid::new(5, 2).unwrap().with_rotation(Rotation::Cw90);
        assert!(Panel::new(grid).is_ok());
    }

    #[test]
    fn test_ignored_event_changes_nothing() {
        let mut panel = panel();
        panel.apply(InputEvent::ButtonDown(4));
        panel.apply(InputEvent::Ignored);
        assert_eq!(panel.snapshot().iter().filter(|&&l| l).count(), 1);
        assert!(panel.read(4));
    }

    #[test]
    fn test_rotated_grid_reads_physical_button() {
        let grid = Grid::new(5, 2).unwrap().with_rotation(Rotation::Cw180);
        let mut panel = Panel::new(grid).unwrap();
        panel.set_connected(true);

        // Top-left button is the last key when turned upside down
        panel.apply(InputEvent::ButtonDown(0));
        assert!(panel.read(9));
        assert!(!panel.read(0));

        let levels = panel.snapshot();
        assert_eq!(levels.len(), 10);
        assert_eq!(levels.iter().position(|&l| l), Some(9));
    }

    #[test]
    fn test_pending_writes_keep_latest_colour() {
        let mut panel = panel();
        panel.set_pixel(1, 1, Rgb([1, 1, 1])).unwrap();
        panel.set_pixel(1, 1, Rgb([2, 2, 2])).unwrap();
        panel.set_pixel(0, 0, Rgb([3, 3, 3])).unwrap();
        assert!(panel.has_pending());

        assert_eq!(
            panel.take_pending(),
            vec![(0, Rgb([3, 3, 3])), (6, Rgb([2, 2, 2]))]
        );
        assert!(!panel.has_pending());
    }

    #[test]
    fn test_out_of_range_pixel() {
        let mut panel = panel();
        assert_eq!(
            panel.set_pixel(5, 0, Rgb([1, 1, 1])),
            Err(LedFault::OutOfRange { x: 5, y: 0 })
        );
        assert_eq!(
            panel.set_pixel(0, 2, Rgb([1, 1, 1])),
            Err(LedFault::OutOfRange { x: 0, y: 2 })
        );
    }

    #[test]
    fn test_disconnected_panel_releases_keys_and_rejects_leds() {
        let mut panel = panel();
        panel.apply(InputEvent::ButtonDown(3));
        panel.set_connected(false);

        assert!(!panel.read(3));
        assert_eq!(
            panel.set_pixel(0, 0, Rgb([1, 1, 1])),
            Err(LedFault::Unavailable)
        );
    }

    #[test]
    fn test_repaint_queues_every_key() {
        let t0 = Instant::now();
        let grid = Grid::new(5, 2).unwrap();
        let mut panel = panel();
        let mut pad = Controller::new(grid, KeyTiming::default(), SleepPolicy::default(), t0);
        pad.set_led(4, Rgb([9, 9, 9]), &mut panel).unwrap();
        panel.take_pending();

        panel.repaint(pad.keys());
        let pending = panel.take_pending();
        assert_eq!(pending.len(), 10);
        assert_eq!(pending[4], (4, Rgb([9, 9, 9])));
        assert_eq!(pending[0], (0, Rgb([0, 0, 0])));
    }

    #[test]
    fn test_controller_reads_panel() {
        let t0 = Instant::now();
        let grid = Grid::new(5, 2).unwrap();
        let mut panel = panel();
        let mut pad = Controller::new(grid, KeyTiming::default(), SleepPolicy::default(), t0);

        panel.apply(InputEvent::ButtonDown(2));
        let switches = &panel;
        let mut leds = crate::keypad::controller::tests::FrameSink::default();
        pad.tick(t0, switches, &mut leds);
        assert_eq!(pad.pressed_keys(), vec![2]);
    }
}
