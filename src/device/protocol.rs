//! N4/AKP05E device constants
//!
//! Display index mapping (for set_button_image):
//!   - Top row (5 keys):    display keys 10-14
//!   - Bottom row (5 keys): display keys 5-9
//!
//! Input mapping (button presses):
//!   - Top row:    IDs 1-5  (0x01-0x05) → buttons 0-4
//!   - Bottom row: IDs 6-10 (0x06-0x0a) → buttons 5-9
//!
//! Buttons are numbered row-major from the top left, the same order the
//! keypad uses for physical (x, y) positions.

// Key image dimensions (N4 uses 112x112 for square LCD keys)
pub const BUTTON_WIDTH: u32 = 112;
pub const BUTTON_HEIGHT: u32 = 112;

/// Square keys usable as keypad keys
pub const KEY_COUNT: usize = 10;

/// Keys per row
pub const KEY_COLUMNS: usize = 5;

/// Addressable displays reported to mirajazz (10 keys + LCD strip)
pub const DISPLAY_COUNT: usize = 15;

/// Rotary encoders; their events are ignored
pub const ENCODER_COUNT: usize = 4;

/// USB Vendor ID for AJAZZ/Mirabox (HOTSPOTEKUSB)
pub const VENDOR_ID: u16 = 0x0300;

/// USB Product ID for AKP05E/N4
pub const PRODUCT_ID: u16 = 0x3004;

/// Convert a button number (0-9) to its display key
#[inline]
pub fn button_to_display_key(button: usize) -> Option<u8> {
    match button {
        0..=4 => Some(button as u8 + 10), // top row
        5..=9 => Some(button as u8),      // bottom row
        _ => None,
    }
}

/// Convert a HID event id to a button number
#[inline]
pub fn event_to_button(event_type: u8) -> Option<usize> {
    match event_type {
        0x01..=0x0a => Some((event_type - 1) as usize),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_key_mapping() {
        assert_eq!(button_to_display_key(0), Some(10));
        assert_eq!(button_to_display_key(4), Some(14));
        assert_eq!(button_to_display_key(5), Some(5));
        assert_eq!(button_to_display_key(9), Some(9));
        assert_eq!(button_to_display_key(10), None);
    }

    #[test]
    fn test_event_mapping() {
        assert_eq!(event_to_button(0x01), Some(0));
        assert_eq!(event_to_button(0x0a), Some(9));
        assert_eq!(event_to_button(0x40), None);
        assert_eq!(event_to_button(0x00), None);
    }
}
