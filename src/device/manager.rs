use anyhow::{anyhow, Result};
use image::{DynamicImage, Rgb, RgbImage};
use mirajazz::{
    device::{list_devices, Device},
    types::{DeviceInput, ImageFormat, ImageMirroring, ImageMode, ImageRotation},
};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::protocol::*;

/// Input events from the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    ButtonDown(usize),
    ButtonUp(usize),
    /// A report with no key edge: encoder, strip, swipe or a repeated level
    Ignored,
}

/// Device information
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub name: String,
    pub firmware_version: String,
    pub serial_number: String,
}

/// Manages connection to the AJAZZ AKP05E / Mirabox N4
pub struct DeviceManager {
    device: Device,
    /// Previous button states for edge detection
    buttons: Vec<bool>,
}

impl DeviceManager {
    /// Find and return device info without connecting
    pub async fn find_device() -> Result<DeviceInfo> {
        let devices = list_devices(&[VENDOR_ID])
            .await
            .map_err(|e| anyhow!("Failed to enumerate devices: {}", e))?;

        devices
            .into_iter()
            .find(|(vid, pid, _)| *vid == VENDOR_ID && *pid == PRODUCT_ID)
            .map(|(_, _, serial)| DeviceInfo {
                name: "AJAZZ AKP05E".to_string(),
                firmware_version: "Unknown".to_string(),
                serial_number: serial,
            })
            .ok_or_else(|| anyhow!("No compatible device found"))
    }

    /// Connect to the device
    pub async fn connect() -> Result<Self> {
        info!("Connecting to device...");

        let serial = Self::find_device().await?.serial_number;
        info!("Found device with serial: {}", serial);

        // N4/AKP05E: v2 protocol, supports both states
        let device = Device::connect(
            VENDOR_ID,
            PRODUCT_ID,
            serial,
            true, // is_v2 (1024-byte packets)
            true, // supports_both_states
            DISPLAY_COUNT,
            ENCODER_COUNT,
        )
        .await
        .map_err(|e| anyhow!("Failed to connect to device: {}", e))?;

        info!("Connected to device");

        Ok(Self {
            device,
            buttons: vec![false; KEY_COUNT],
        })
    }

    /// Image format for square keys (112x112 JPEG)
    fn button_image_format() -> ImageFormat {
        ImageFormat {
            mode: ImageMode::JPEG,
            size: (BUTTON_WIDTH as usize, BUTTON_HEIGHT as usize),
            rotation: ImageRotation::Rot180,
            mirror: ImageMirroring::None,
        }
    }

    /// Fill a key with one colour; takes effect on the next flush
    pub async fn set_key_color(&self, button: usize, rgb: Rgb<u8>) -> Result<()> {
        let display_key = button_to_display_key(button)
            .ok_or_else(|| anyhow!("Invalid button index: {}", button))?;

        let image = RgbImage::from_pixel(BUTTON_WIDTH, BUTTON_HEIGHT, rgb);
        self.device
            .set_button_image(
                display_key,
                Self::button_image_format(),
                DynamicImage::ImageRgb8(image),
            )
            .await
            .map_err(|e| anyhow!("Failed to set button image: {}", e))
    }

    /// Flush pending image updates to the device
    pub async fn flush(&self) -> Result<()> {
        self.device
            .flush()
            .await
            .map_err(|e| anyhow!("Failed to flush images: {}", e))
    }

    /// Reset the device (clear display)
    pub async fn reset(&self) -> Result<()> {
        debug!("Resetting device");
        self.device
            .reset()
            .await
            .map_err(|e| anyhow!("Failed to reset device: {}", e))
    }

    /// Send keep-alive to prevent device timeout
    pub async fn keep_alive(&self) -> Result<()> {
        self.device
            .keep_alive()
            .await
            .map_err(|e| anyhow!("Failed to send keep-alive: {}", e))
    }

    /// Set device brightness (0-100)
    pub async fn set_brightness(&self, percent: u8) -> Result<()> {
        let percent = percent.min(100);
        debug!("Setting brightness to {}%", percent);
        self.device
            .set_brightness(percent)
            .await
            .map_err(|e| anyhow!("Failed to set brightness: {}", e))
    }

    /// Input processing function for mirajazz
    ///
    /// - event_type (data[9]): 0x01-0x0a are the square keys; encoders,
    ///   the LCD strip and swipes come back as an empty state list so they
    ///   are not mistaken for a read timeout (`NoData`)
    /// - state (data[10]): 0x00 = release, non-zero = press
    fn process_input(
        event_type: u8,
        state: u8,
    ) -> Result<DeviceInput, mirajazz::error::MirajazzError> {
        debug!("HID: type=0x{:02x}, state=0x{:02x}", event_type, state);

        // One report covers one key: the vector ends at that key
        match event_to_button(event_type) {
            Some(button) => {
                let mut buttons = vec![false; button + 1];
                buttons[button] = state != 0;
                Ok(DeviceInput::ButtonStateChange(buttons))
            }
            None => Ok(DeviceInput::ButtonStateChange(Vec::new())),
        }
    }

    /// Poll for one input event (1ms timeout); `None` means nothing arrived
    pub async fn poll_event(&mut self) -> Result<Option<InputEvent>> {
        let timeout = Duration::from_millis(1);

        let input = match self
            .device
            .read_input(Some(timeout), Self::process_input)
            .await
        {
            Ok(input) => input,
            Err(e) => {
                let error_str = format!("{}", e);
                if error_str.contains("Disconnected") {
                    warn!("Device disconnected");
                    return Err(anyhow!("Device disconnected"));
                }
                warn!("Error reading device input: {}", e);
                return Ok(None);
            }
        };

        Ok(match input {
            DeviceInput::NoData => None,
            DeviceInput::ButtonStateChange(states) => {
                Some(button_edge(&mut self.buttons, &states))
            }
            _ => Some(InputEvent::Ignored),
        })
    }

    /// Disconnect from device gracefully
    pub async fn disconnect(self) {
        info!("Disconnecting from device...");
        // Dropping the device releases the HID connection
        drop(self.device);
        info!("Device disconnected");
    }
}

/// Edge carried by one key report; the report's last entry is its key
fn button_edge(buttons: &mut [bool], states: &[bool]) -> InputEvent {
    let button = states.len().saturating_sub(1);
    let (Some(&pressed), Some(was_pressed)) = (states.last(), buttons.get_mut(button)) else {
        return InputEvent::Ignored;
    };

    // Report edges only; repeats of the same level are dropped
    if pressed == *was_pressed {
        return InputEvent::Ignored;
    }
    *was_pressed = pressed;
    if pressed {
        InputEvent::ButtonDown(button)
    } else {
        InputEvent::ButtonUp(button)
    }
}
