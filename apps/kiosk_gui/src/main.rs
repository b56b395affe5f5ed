mod backend_bridge;
mod config;
mod controller;
mod ui;

use clap::Parser;
use crossbeam_channel::bounded;
use eframe::egui;

use backend_bridge::commands::BackendCommand;
use config::load_settings;
use controller::events::UiEvent;
use ui::KioskApp;

/// Fullscreen photo slideshow client for a local photo backend.
#[derive(Debug, Parser)]
#[command(name = "kiosk_gui", version, about)]
struct Cli {
    /// Base URL of the photo backend, e.g. http://127.0.0.1:8080
    #[arg(long)]
    server_url: Option<String>,

    /// Seconds each slide stays on screen
    #[arg(long)]
    slide_duration: Option<u64>,

    /// Start in a window instead of fullscreen
    #[arg(long)]
    windowed: bool,
}

fn main() -> eframe::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let cli = Cli::parse();
    let mut settings = load_settings();
    if let Some(server_url) = cli.server_url {
        settings.server_url = server_url;
    }
    if let Some(slide_duration) = cli.slide_duration {
        settings.slide_duration_secs = slide_duration;
    }
    if cli.windowed {
        settings.windowed = true;
    }

    let (cmd_tx, cmd_rx) = bounded::<BackendCommand>(64);
    let (ui_tx, ui_rx) = bounded::<UiEvent>(256);
    backend_bridge::runtime::launch(cmd_rx, ui_tx, settings.clone());

    let viewport = if settings.windowed {
        egui::ViewportBuilder::default()
            .with_title("Photo Kiosk")
            .with_inner_size([1280.0, 800.0])
            .with_min_inner_size([800.0, 480.0])
    } else {
        egui::ViewportBuilder::default()
            .with_title("Photo Kiosk")
            .with_fullscreen(true)
    };
    let options = eframe::NativeOptions {
        viewport,
        ..Default::default()
    };
    eframe::run_native(
        "Photo Kiosk",
        options,
        Box::new(move |cc| Ok(Box::new(KioskApp::new(cc, cmd_tx, ui_rx, settings)))),
    )
}
