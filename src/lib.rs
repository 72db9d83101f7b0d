pub mod config;
pub mod device;
pub mod error;
pub mod input;
pub mod keypad;
pub mod layers;

use anyhow::Result;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use config::Config;
use device::{DeviceManager, InputEvent, Panel};
use input::KeystrokeSender;
use keypad::Controller;
use layers::LayerEngine;

/// How often to look for a missing deck
const RECONNECT_INTERVAL: Duration = Duration::from_secs(5);

/// Device events handled per tick at most
const MAX_EVENTS_PER_TICK: usize = 32;

/// Main application struct
pub struct App {
    config: Config,
    pad: Controller,
    engine: LayerEngine,
    panel: Panel,
    keys: KeystrokeSender,
    device: Option<DeviceManager>,
}

impl App {
    /// Create a new application instance
    pub async fn new(config: Config) -> Result<Self> {
        let keypad = config.validate()?;

        let mut pad = Controller::new(
            keypad.grid.clone(),
            keypad.timing,
            keypad.sleep,
            Instant::now(),
        );
        let engine = LayerEngine::new(keypad.layers);
        let mut panel = Panel::new(keypad.grid)?;
        let keys = KeystrokeSender::new()?;

        let device = Self::open_device(config.device.brightness).await;
        panel.set_connected(device.is_some());

        let faults = engine.show(&mut pad, &mut panel);
        if !faults.is_empty() {
            debug!("{} LED writes skipped at startup", faults.len());
        }

        Ok(Self {
            config,
            pad,
            engine,
            panel,
            keys,
            device,
        })
    }

    /// Connect and wake the deck; a missing deck is not fatal
    async fn open_device(brightness: u8) -> Option<DeviceManager> {
        match DeviceManager::connect().await {
            Ok(d) => {
                if let Err(e) = d.reset().await {
                    warn!("Reset failed: {}", e);
                }
                if let Err(e) = d.keep_alive().await {
                    warn!("Keep-alive failed: {}", e);
                }
                if let Err(e) = d.set_brightness(brightness).await {
                    warn!("Set brightness failed: {}", e);
                }
                Some(d)
            }
            Err(e) => {
                error!("Failed to connect to device: {}", e);
                None
            }
        }
    }

    /// Run the poll loop until the task is cancelled
    pub async fn run(&mut self) -> Result<()> {
        let layer = self.engine.active_layer();
        info!("Running - layer {} ({}) active", layer.id, layer.name);

        let poll_interval = Duration::from_millis(self.config.device.poll_interval_ms);
        let keepalive_interval = Duration::from_secs(self.config.device.keepalive_secs);

        let mut last_keepalive = Instant::now();
        let mut last_connect_attempt = Instant::now();

        loop {
            if self.device.is_some() {
                self.drain_events().await;
            } else if last_connect_attempt.elapsed() >= RECONNECT_INTERVAL {
                last_connect_attempt = Instant::now();
                self.reconnect().await;
            }

            let now = Instant::now();
            let levels = self.panel.snapshot();
            self.pad.tick(now, &levels, &mut self.panel);
            self.engine
                .tick(now, &mut self.pad, &mut self.panel, &mut self.keys);

            self.flush_leds().await;

            if let Some(device) = self.device.as_ref() {
                if last_keepalive.elapsed() >= keepalive_interval {
                    if let Err(e) = device.keep_alive().await {
                        warn!("Keep-alive failed: {}", e);
                    }
                    last_keepalive = Instant::now();
                }
            }

            tokio::time::sleep(poll_interval).await;
        }
    }

    /// Feed pending button events into the panel
    async fn drain_events(&mut self) {
        let Some(device) = self.device.as_mut() else {
            return;
        };

        for _ in 0..MAX_EVENTS_PER_TICK {
            match device.poll_event().await {
                Ok(Some(InputEvent::Ignored)) => continue,
                Ok(Some(event)) => {
                    debug!("Device event: {:?}", event);
                    self.panel.apply(event);
                }
                Ok(None) => break,
                Err(e) => {
                    warn!("{}, will try to reconnect...", e);
                    self.device = None;
                    self.panel.set_connected(false);
                    break;
                }
            }
        }
    }

    async fn reconnect(&mut self) {
        let Some(device) = Self::open_device(self.config.device.brightness).await else {
            return;
        };
        info!("Reconnected to device");
        self.device = Some(device);
        self.panel.set_connected(true);
        self.panel.repaint(self.pad.keys());
    }

    /// Send LED changes from this tick to the deck
    async fn flush_leds(&mut self) {
        let Some(device) = self.device.as_ref() else {
            return;
        };
        if !self.panel.has_pending() {
            return;
        }

        for (button, rgb) in self.panel.take_pending() {
            if let Err(e) = device.set_key_color(button, rgb).await {
                warn!("LED update skipped: {}", e);
            }
        }
        if let Err(e) = device.flush().await {
            warn!("{}", e);
        }
    }

    pub async fn shutdown(&mut self) {
        info!("Shutting down layerpad...");

        if let Some(device) = self.device.take() {
            if let Err(e) = device.reset().await {
                warn!("Reset failed: {}", e);
            }
            device.disconnect().await;
        }

        info!("Shutdown complete");
    }
}
