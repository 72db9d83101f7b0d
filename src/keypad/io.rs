//! Collaborator interfaces for reading switches and driving LEDs

use image::Rgb;

pub use crate::error::LedFault;

/// LED off
pub const OFF: Rgb<u8> = Rgb([0, 0, 0]);

/// Instantaneous switch levels, polled once per key per tick
pub trait RawSwitch {
    /// True while key `number` is physically pressed
    fn read(&self, number: usize) -> bool;
}

/// Per-pixel LED output
pub trait LedSink {
    fn set_pixel(&mut self, x: usize, y: usize, rgb: Rgb<u8>) -> Result<(), LedFault>;
}

impl RawSwitch for [bool] {
    fn read(&self, number: usize) -> bool {
        self.get(number).copied().unwrap_or(false)
    }
}

impl RawSwitch for Vec<bool> {
    fn read(&self, number: usize) -> bool {
        self.as_slice().read(number)
    }
}
