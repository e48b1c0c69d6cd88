use anyhow::Result;
use eframe::egui;
use log::info;
use std::sync::Arc;
use tokio::runtime::Handle;

mod camera;
mod camera_controller;
mod config;
mod controller;
mod countdown;
mod download;
mod encoded;
mod error;
mod session;
mod submission;
mod texture;
mod ui;

#[cfg(test)]
mod fakes;

use crate::camera::JpegFrameCapturer;
use crate::camera_controller::{MediaSource, RpicamSource, SimulatedSource};
use crate::config::Config;
use crate::controller::{Capabilities, CaptureController};
use crate::countdown::TokioCountdown;
use crate::submission::RelayClient;
use crate::ui::BoothApp;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    info!("📸 Starting Employee Appreciator booth");

    // Load configuration
    let config = Config::load()?;
    config.create_directories()?;
    info!(
        "Configuration loaded: {}x{} display",
        config.display.width, config.display.height
    );

    let runtime = Handle::current();

    let media: Arc<dyn MediaSource> = if cfg!(feature = "camera") && !config.camera.simulate {
        info!("Using Pi camera via rpicam-still");
        Arc::new(RpicamSource::new(&config.camera))
    } else {
        info!("Using simulated camera");
        Arc::new(SimulatedSource::new(&config.camera))
    };

    let relay = RelayClient::new(&config.relay)?;
    info!("Submitting captures to {}", relay.endpoint());

    let caps = Capabilities {
        media,
        capturer: Arc::new(JpegFrameCapturer::new(config.capture.jpeg_quality)),
        timer: Arc::new(TokioCountdown::new(runtime.clone())),
        client: Arc::new(relay),
    };
    let controller = CaptureController::new(caps, config.capture.clone());

    let mut viewport = egui::ViewportBuilder::default()
        .with_inner_size([config.display.width as f32, config.display.height as f32])
        .with_fullscreen(config.display.fullscreen);
    if config.display.fullscreen {
        viewport = viewport
            .with_decorations(false)              // No window decorations
            .with_resizable(false)
            .with_always_on_top();
    }
    let options = eframe::NativeOptions {
        viewport,
        ..Default::default()
    };

    info!("Launching GUI application...");

    eframe::run_native(
        "Employee Appreciator",
        options,
        Box::new(move |cc| {
            // Setup egui style for touch interface
            setup_touch_style(&cc.egui_ctx);

            Box::new(BoothApp::new(&cc.egui_ctx, controller, runtime, &config))
        }),
    )
    .map_err(|e| anyhow::anyhow!("Failed to run application: {}", e))?;

    info!("Application shut down gracefully");
    Ok(())
}

fn setup_touch_style(ctx: &egui::Context) {
    let mut style = (*ctx.style()).clone();

    // Larger UI elements for touch interaction
    style.spacing.button_padding = egui::vec2(16.0, 12.0);
    style.spacing.item_spacing = egui::vec2(12.0, 8.0);
    style.spacing.window_margin = egui::Margin::same(16.0);

    // Larger text for readability at booth distance
    style.text_styles.insert(
        egui::TextStyle::Button,
        egui::FontId::new(20.0, egui::FontFamily::Proportional),
    );
    style.text_styles.insert(
        egui::TextStyle::Body,
        egui::FontId::new(18.0, egui::FontFamily::Proportional),
    );

    ctx.set_style(style);
}
