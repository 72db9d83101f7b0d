use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use layerpad::{config::Config, device::Panel, layers::store::rgb_to_hex, App};

#[derive(Parser, Debug)]
#[command(name = "layerpad")]
#[command(about = "Layered macro keypad for the AJAZZ AKP05E")]
#[command(version)]
struct Cli {
    /// Configuration file (default: ~/.config/layerpad/config.toml)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Validate the configuration, print the layers and exit
    #[arg(long)]
    check: bool,

    /// Check device connection status and exit
    #[arg(long)]
    status: bool,

    /// Set device brightness (0-100)
    #[arg(long, value_name = "PERCENT")]
    brightness: Option<u8>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    if cli.status {
        return check_status().await;
    }

    if let Some(brightness) = cli.brightness {
        return set_brightness(brightness).await;
    }

    let config = Config::load(cli.config.as_deref())?;

    if cli.check {
        return check_config(&config);
    }

    info!("Starting layerpad");

    let mut app = App::new(config).await?;

    // Set up signal handlers for graceful shutdown
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;

    let result = tokio::select! {
        result = app.run() => {
            result
        }
        _ = signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
            Ok(())
        }
        _ = sigterm.recv() => {
            info!("Received SIGTERM, shutting down...");
            Ok(())
        }
    };

    // Always run shutdown
    app.shutdown().await;
    result
}

fn check_config(config: &Config) -> Result<()> {
    let keypad = config.validate()?;
    Panel::new(keypad.grid.clone())?;
    let layers = &keypad.layers;

    println!(
        "✓ {}x{} keypad, modifier key {}, {:?} latch",
        keypad.grid.width(),
        keypad.grid.height(),
        layers.modifier(),
        layers.latch
    );
    for layer in layers.layers() {
        println!(
            "  Layer {} '{}' (selector {}, {})",
            layer.id,
            layer.name,
            layer.selector,
            rgb_to_hex(layer.color)
        );
        for (key, action) in &layer.bindings {
            println!("    {:>2}: {}", key, action);
        }
    }
    Ok(())
}

async fn check_status() -> Result<()> {
    use layerpad::device::DeviceManager;

    info!("Checking device status...");

    match DeviceManager::find_device().await {
        Ok(info) => {
            println!("✓ Device found: {}", info.name);
            println!("  Firmware: {}", info.firmware_version);
            println!("  Serial: {}", info.serial_number);
            Ok(())
        }
        Err(e) => {
            println!("✗ No device found: {}", e);
            std::process::exit(1);
        }
    }
}

async fn set_brightness(brightness: u8) -> Result<()> {
    use layerpad::device::DeviceManager;

    let brightness = brightness.min(100);
    info!("Setting brightness to {}%", brightness);

    let manager = DeviceManager::connect().await?;
    manager.set_brightness(brightness).await?;
    println!("✓ Brightness set to {}%", brightness);
    Ok(())
}
