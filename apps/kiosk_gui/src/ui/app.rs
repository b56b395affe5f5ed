use std::{sync::Arc, thread, time::Duration};

use chrono::Local;
use crossbeam_channel::{Receiver, Sender, TrySendError};
use eframe::egui;
use serde::{Deserialize, Serialize};

use crate::backend_bridge::commands::BackendCommand;
use crate::config::Settings;
use crate::controller::events::{classify_startup_failure, UiError, UiErrorContext, UiEvent};
use crate::controller::orchestration::dispatch_backend_command;
use client_core::{
    ControllerEvent, ControllerSettings, HttpBackend, KioskBackend, SlideshowController,
};
use shared::{domain::SlideshowSource, protocol::ImageRecord};

const SETTINGS_STORAGE_KEY: &str = "kiosk_settings";
/// Seconds of inactivity before the on-screen controls fade out.
const CONTROLS_HIDE_AFTER_SECS: f64 = 3.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
struct PersistedKioskSettings {
    slide_interval_secs: u64,
    auto_refresh: bool,
}

impl Default for PersistedKioskSettings {
    fn default() -> Self {
        Self {
            slide_interval_secs: 8,
            auto_refresh: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ViewState {
    Loading,
    Error,
    Slideshow,
}

struct CurrentSlide {
    record: ImageRecord,
    index: usize,
    total: usize,
    texture: egui::TextureHandle,
    size: egui::Vec2,
}

pub struct KioskApp {
    cmd_tx: Sender<BackendCommand>,
    ui_rx: Receiver<UiEvent>,

    view_state: ViewState,
    status: String,
    error_message: Option<String>,

    slide: Option<CurrentSlide>,
    playing: bool,
    interval_secs: u64,
    interval_draft: u64,
    auto_refresh: bool,
    source: SlideshowSource,
    albums_available: bool,
    decode_failures: usize,
    slide_shown_at: f64,

    controls_visible: bool,
    last_activity_time: f64,
    settings_open: bool,
    fullscreen: bool,
}

impl KioskApp {
    pub fn new(
        cc: &eframe::CreationContext<'_>,
        cmd_tx: Sender<BackendCommand>,
        ui_rx: Receiver<UiEvent>,
        settings: Settings,
    ) -> Self {
        let persisted = cc
            .storage
            .and_then(|storage| storage.get_string(SETTINGS_STORAGE_KEY))
            .and_then(|text| serde_json::from_str::<PersistedKioskSettings>(&text).ok());

        let mut status = "Connecting to photo server...".to_string();
        dispatch_backend_command(&cmd_tx, BackendCommand::Initialize, &mut status);

        // On-screen adjustments from the previous run take precedence over
        // the configured defaults; re-sync the worker with them.
        let (interval_secs, auto_refresh) = match persisted {
            Some(persisted) => {
                dispatch_backend_command(
                    &cmd_tx,
                    BackendCommand::SetInterval {
                        secs: persisted.slide_interval_secs,
                    },
                    &mut status,
                );
                dispatch_backend_command(
                    &cmd_tx,
                    BackendCommand::SetAutoRefresh {
                        enabled: persisted.auto_refresh,
                    },
                    &mut status,
                );
                (persisted.slide_interval_secs, persisted.auto_refresh)
            }
            None => (settings.slide_duration_secs, settings.auto_refresh),
        };

        Self {
            cmd_tx,
            ui_rx,
            view_state: ViewState::Loading,
            status,
            error_message: None,
            slide: None,
            playing: settings.autoplay,
            interval_secs,
            interval_draft: interval_secs,
            auto_refresh,
            source: SlideshowSource::Memories,
            albums_available: false,
            decode_failures: 0,
            slide_shown_at: 0.0,
            controls_visible: true,
            last_activity_time: 0.0,
            settings_open: false,
            fullscreen: !settings.windowed,
        }
    }

    fn process_ui_events(&mut self, ctx: &egui::Context) {
        while let Ok(event) = self.ui_rx.try_recv() {
            match event {
                UiEvent::Info(message) => {
                    self.status = message;
                }
                UiEvent::BackendReady => {
                    self.status = "Loading images...".to_string();
                }
                UiEvent::Error(err) => {
                    if err.is_fatal() {
                        self.view_state = ViewState::Error;
                        self.error_message = Some(classify_startup_failure(err.message()));
                        self.playing = false;
                    } else {
                        self.status = err.message().to_string();
                    }
                }
                UiEvent::Controller(event) => self.apply_controller_event(ctx, event),
            }
        }
    }

    fn apply_controller_event(&mut self, ctx: &egui::Context, event: ControllerEvent) {
        match event {
            ControllerEvent::SlideReady {
                index,
                total,
                record,
                bytes,
            } => {
                self.install_slide(ctx, index, total, record, bytes);
            }
            ControllerEvent::SequenceReplaced { source, total } => {
                self.source = source;
                self.status = format!("{} slideshow - {total} images", source.label());
            }
            ControllerEvent::PlaybackChanged { playing } => {
                if playing && !self.playing {
                    // Resume restarts the slide timer; restart the strip too.
                    self.slide_shown_at = ctx.input(|i| i.time);
                }
                self.playing = playing;
            }
            ControllerEvent::IntervalChanged { interval } => {
                self.interval_secs = interval.as_secs();
                self.interval_draft = self.interval_secs;
            }
            ControllerEvent::SourceChanged { source } => {
                self.source = source;
            }
            ControllerEvent::AlbumsAvailabilityChanged { available } => {
                self.albums_available = available;
            }
            ControllerEvent::FatalError(message) => {
                self.view_state = ViewState::Error;
                self.error_message = Some(classify_startup_failure(&message));
                self.playing = false;
            }
            ControllerEvent::RefreshFailed(message) => {
                // Previous sequence stays on screen; only note the failure.
                let err = UiError::from_message(UiErrorContext::Refresh, message);
                self.status = format!("Refresh failed: {}", err.message());
            }
        }
    }

    fn install_slide(
        &mut self,
        ctx: &egui::Context,
        index: usize,
        total: usize,
        record: ImageRecord,
        bytes: Vec<u8>,
    ) {
        let decoded = match image::load_from_memory(&bytes) {
            Ok(decoded) => decoded,
            Err(err) => {
                tracing::warn!(asset = %record.id, "failed to decode image: {err}");
                self.decode_failures += 1;
                if self.decode_failures < total.max(1) {
                    dispatch_backend_command(
                        &self.cmd_tx,
                        BackendCommand::NextSlide,
                        &mut self.status,
                    );
                } else {
                    self.status = "No displayable image in the current set".to_string();
                }
                return;
            }
        };

        let rgba = decoded.to_rgba8();
        let [w, h] = [rgba.width() as usize, rgba.height() as usize];
        let color_image = egui::ColorImage::from_rgba_unmultiplied([w, h], rgba.as_raw());
        let texture = ctx.load_texture(
            format!("slide:{}", record.id),
            color_image,
            egui::TextureOptions::LINEAR,
        );

        self.decode_failures = 0;
        self.slide_shown_at = ctx.input(|i| i.time);
        self.slide = Some(CurrentSlide {
            record,
            index,
            total,
            texture,
            size: egui::vec2(w as f32, h as f32),
        });
        self.view_state = ViewState::Slideshow;
        self.error_message = None;
    }

    fn handle_keyboard(&mut self, ctx: &egui::Context) {
        let (next, previous, toggle, fullscreen, settings, memories, albums) = ctx.input(|i| {
            (
                i.key_pressed(egui::Key::ArrowRight),
                i.key_pressed(egui::Key::ArrowLeft),
                i.key_pressed(egui::Key::Space),
                i.key_pressed(egui::Key::F),
                i.key_pressed(egui::Key::S),
                i.key_pressed(egui::Key::Num1),
                i.key_pressed(egui::Key::Num2),
            )
        });

        if fullscreen {
            self.fullscreen = !self.fullscreen;
            ctx.send_viewport_cmd(egui::ViewportCommand::Fullscreen(self.fullscreen));
        }
        if settings {
            self.settings_open = !self.settings_open;
        }

        if self.view_state != ViewState::Slideshow {
            return;
        }
        if next {
            dispatch_backend_command(&self.cmd_tx, BackendCommand::NextSlide, &mut self.status);
        }
        if previous {
            dispatch_backend_command(&self.cmd_tx, BackendCommand::PreviousSlide, &mut self.status);
        }
        if toggle {
            dispatch_backend_command(
                &self.cmd_tx,
                BackendCommand::TogglePlayback,
                &mut self.status,
            );
        }
        if memories {
            self.request_source(SlideshowSource::Memories);
        }
        if albums {
            self.request_source(SlideshowSource::Albums);
        }
    }

    fn request_source(&mut self, source: SlideshowSource) {
        if source == SlideshowSource::Albums && !self.albums_available {
            self.status = "No albums available".to_string();
            return;
        }
        if source == self.source {
            return;
        }
        dispatch_backend_command(
            &self.cmd_tx,
            BackendCommand::SwitchSource { source },
            &mut self.status,
        );
    }

    fn track_activity(&mut self, ctx: &egui::Context) {
        let (now, active) = ctx.input(|i| {
            let moved = i.pointer.delta().length_sq() > 0.0;
            (i.time, moved || i.pointer.any_down() || !i.events.is_empty())
        });
        if active {
            self.last_activity_time = now;
            self.controls_visible = true;
        } else if now - self.last_activity_time > CONTROLS_HIDE_AFTER_SECS && !self.settings_open {
            self.controls_visible = false;
        }
    }

    fn show_loading_screen(&mut self, ctx: &egui::Context) {
        egui::CentralPanel::default()
            .frame(egui::Frame::NONE.fill(egui::Color32::BLACK))
            .show(ctx, |ui| {
                ui.vertical_centered(|ui| {
                    ui.add_space(ui.available_height() * 0.4);
                    ui.spinner();
                    ui.add_space(12.0);
                    ui.label(
                        egui::RichText::new(&self.status)
                            .size(18.0)
                            .color(egui::Color32::LIGHT_GRAY),
                    );
                });
            });
    }

    fn show_error_screen(&mut self, ctx: &egui::Context) {
        let message = self
            .error_message
            .clone()
            .unwrap_or_else(|| "Something went wrong".to_string());

        egui::CentralPanel::default()
            .frame(egui::Frame::NONE.fill(egui::Color32::BLACK))
            .show(ctx, |ui| {
                ui.vertical_centered(|ui| {
                    ui.add_space(ui.available_height() * 0.35);
                    ui.label(egui::RichText::new("⚠").size(48.0));
                    ui.add_space(8.0);
                    ui.label(
                        egui::RichText::new(message)
                            .size(20.0)
                            .color(egui::Color32::LIGHT_GRAY),
                    );
                    ui.add_space(16.0);
                    if ui
                        .button(egui::RichText::new("Retry").size(18.0))
                        .clicked()
                    {
                        self.view_state = ViewState::Loading;
                        self.status = "Retrying...".to_string();
                        self.error_message = None;
                        dispatch_backend_command(
                            &self.cmd_tx,
                            BackendCommand::Retry,
                            &mut self.status,
                        );
                    }
                });
            });
    }

    fn show_slideshow(&mut self, ctx: &egui::Context) {
        egui::CentralPanel::default()
            .frame(egui::Frame::NONE.fill(egui::Color32::BLACK))
            .show(ctx, |ui| {
                if let Some(slide) = &self.slide {
                    let fitted = fit_size(slide.size, ui.available_size());
                    ui.centered_and_justified(|ui| {
                        ui.add(egui::Image::new(&slide.texture).fit_to_exact_size(fitted));
                    });
                }
            });

        self.show_clock(ctx);
        self.show_source_badge(ctx);
        self.show_metadata(ctx);
        self.show_progress_bar(ctx);
        if self.controls_visible {
            self.show_controls(ctx);
        }
    }

    /// Thin strip along the bottom edge tracking how far into the slide
    /// interval the current image is. Hidden while paused.
    fn show_progress_bar(&self, ctx: &egui::Context) {
        if !self.playing || self.slide.is_none() {
            return;
        }
        let now = ctx.input(|i| i.time);
        let fraction = progress_fraction(now - self.slide_shown_at, self.interval_secs);
        let screen = ctx.screen_rect();
        let rect = egui::Rect::from_min_size(
            egui::pos2(screen.left(), screen.bottom() - 4.0),
            egui::vec2(screen.width() * fraction, 4.0),
        );
        let painter = ctx.layer_painter(egui::LayerId::new(
            egui::Order::Foreground,
            egui::Id::new("kiosk_progress"),
        ));
        painter.rect_filled(rect, 0.0, egui::Color32::from_white_alpha(150));
    }

    fn show_clock(&self, ctx: &egui::Context) {
        egui::Area::new(egui::Id::new("kiosk_clock"))
            .anchor(egui::Align2::RIGHT_TOP, [-16.0, 16.0])
            .order(egui::Order::Foreground)
            .show(ctx, |ui| {
                overlay_frame().show(ui, |ui| {
                    ui.label(
                        egui::RichText::new(Local::now().format("%H:%M").to_string())
                            .size(26.0)
                            .color(egui::Color32::WHITE),
                    );
                });
            });
    }

    fn show_source_badge(&self, ctx: &egui::Context) {
        egui::Area::new(egui::Id::new("kiosk_source_badge"))
            .anchor(egui::Align2::LEFT_TOP, [16.0, 16.0])
            .order(egui::Order::Foreground)
            .show(ctx, |ui| {
                overlay_frame().show(ui, |ui| {
                    ui.label(
                        egui::RichText::new(self.source.label())
                            .size(14.0)
                            .color(egui::Color32::LIGHT_GRAY),
                    );
                });
            });
    }

    fn show_metadata(&self, ctx: &egui::Context) {
        let Some(slide) = &self.slide else {
            return;
        };

        egui::Area::new(egui::Id::new("kiosk_metadata"))
            .anchor(egui::Align2::LEFT_BOTTOM, [16.0, -16.0])
            .order(egui::Order::Foreground)
            .show(ctx, |ui| {
                overlay_frame().show(ui, |ui| {
                    let title = slide
                        .record
                        .original_file_name
                        .clone()
                        .unwrap_or_else(|| slide.record.id.to_string());
                    ui.label(
                        egui::RichText::new(title)
                            .size(16.0)
                            .color(egui::Color32::WHITE),
                    );
                    if let Some(created) = slide.record.file_created_at {
                        ui.label(
                            egui::RichText::new(
                                created
                                    .with_timezone(&Local)
                                    .format("%B %e, %Y")
                                    .to_string(),
                            )
                            .size(13.0)
                            .color(egui::Color32::LIGHT_GRAY),
                        );
                    }
                    if let Some(context) = slide_context(&slide.record) {
                        ui.label(
                            egui::RichText::new(context)
                                .size(13.0)
                                .color(egui::Color32::LIGHT_GRAY),
                        );
                    }
                });
            });

        egui::Area::new(egui::Id::new("kiosk_counter"))
            .anchor(egui::Align2::RIGHT_BOTTOM, [-16.0, -16.0])
            .order(egui::Order::Foreground)
            .show(ctx, |ui| {
                overlay_frame().show(ui, |ui| {
                    ui.label(
                        egui::RichText::new(format!("{} / {}", slide.index + 1, slide.total))
                            .size(14.0)
                            .color(egui::Color32::LIGHT_GRAY),
                    );
                });
            });
    }

    fn show_controls(&mut self, ctx: &egui::Context) {
        egui::Area::new(egui::Id::new("kiosk_controls"))
            .anchor(egui::Align2::CENTER_BOTTOM, [0.0, -56.0])
            .order(egui::Order::Foreground)
            .show(ctx, |ui| {
                overlay_frame().show(ui, |ui| {
                    ui.horizontal(|ui| {
                        if ui.button(egui::RichText::new("⏮").size(22.0)).clicked() {
                            dispatch_backend_command(
                                &self.cmd_tx,
                                BackendCommand::PreviousSlide,
                                &mut self.status,
                            );
                        }
                        let play_pause = if self.playing { "⏸" } else { "▶" };
                        if ui
                            .button(egui::RichText::new(play_pause).size(22.0))
                            .clicked()
                        {
                            dispatch_backend_command(
                                &self.cmd_tx,
                                BackendCommand::TogglePlayback,
                                &mut self.status,
                            );
                        }
                        if ui.button(egui::RichText::new("⏭").size(22.0)).clicked() {
                            dispatch_backend_command(
                                &self.cmd_tx,
                                BackendCommand::NextSlide,
                                &mut self.status,
                            );
                        }

                        ui.separator();

                        let mut requested = None;
                        if ui
                            .selectable_label(
                                self.source == SlideshowSource::Memories,
                                "Memories",
                            )
                            .clicked()
                        {
                            requested = Some(SlideshowSource::Memories);
                        }
                        let albums_label = ui.add_enabled(
                            self.albums_available,
                            egui::SelectableLabel::new(
                                self.source == SlideshowSource::Albums,
                                "Albums",
                            ),
                        );
                        if albums_label.clicked() {
                            requested = Some(SlideshowSource::Albums);
                        }
                        if let Some(source) = requested {
                            self.request_source(source);
                        }

                        ui.separator();
                        if ui.button(egui::RichText::new("⚙").size(20.0)).clicked() {
                            self.settings_open = !self.settings_open;
                        }
                    });
                });
            });
    }

    fn show_settings_window(&mut self, ctx: &egui::Context) {
        if !self.settings_open {
            return;
        }

        let mut settings_open = self.settings_open;
        egui::Window::new("Settings")
            .open(&mut settings_open)
            .resizable(false)
            .show(ctx, |ui| {
                let slider = ui.add(
                    egui::Slider::new(&mut self.interval_draft, 1..=30).text("Seconds per slide"),
                );
                let committed = slider.drag_stopped() || (slider.changed() && !slider.dragged());
                if committed && self.interval_draft != self.interval_secs {
                    dispatch_backend_command(
                        &self.cmd_tx,
                        BackendCommand::SetInterval {
                            secs: self.interval_draft,
                        },
                        &mut self.status,
                    );
                }

                let mut auto_refresh = self.auto_refresh;
                if ui
                    .checkbox(&mut auto_refresh, "Refresh images every 5 minutes")
                    .changed()
                {
                    self.auto_refresh = auto_refresh;
                    dispatch_backend_command(
                        &self.cmd_tx,
                        BackendCommand::SetAutoRefresh {
                            enabled: auto_refresh,
                        },
                        &mut self.status,
                    );
                }

                ui.separator();
                ui.small("←/→ navigate, Space play/pause, 1/2 source, F fullscreen, S settings");
            });
        self.settings_open = settings_open;
    }
}

impl eframe::App for KioskApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.process_ui_events(ctx);
        self.handle_keyboard(ctx);
        self.track_activity(ctx);

        match self.view_state {
            ViewState::Loading => self.show_loading_screen(ctx),
            ViewState::Error => self.show_error_screen(ctx),
            ViewState::Slideshow => self.show_slideshow(ctx),
        }
        self.show_settings_window(ctx);

        // Keep the clock fresh and keep draining worker events while idle.
        ctx.request_repaint_after(Duration::from_millis(250));
    }

    fn save(&mut self, storage: &mut dyn eframe::Storage) {
        let persisted = PersistedKioskSettings {
            slide_interval_secs: self.interval_secs,
            auto_refresh: self.auto_refresh,
        };
        if let Ok(text) = serde_json::to_string(&persisted) {
            storage.set_string(SETTINGS_STORAGE_KEY, text);
        }
    }
}

fn overlay_frame() -> egui::Frame {
    egui::Frame::NONE
        .fill(egui::Color32::from_black_alpha(160))
        .corner_radius(10.0)
        .inner_margin(egui::Margin::symmetric(12, 8))
}

fn progress_fraction(elapsed_secs: f64, interval_secs: u64) -> f32 {
    if interval_secs == 0 {
        return 0.0;
    }
    (elapsed_secs / interval_secs as f64).clamp(0.0, 1.0) as f32
}

/// Scales an image to fill as much of the viewport as possible while
/// preserving its aspect ratio.
fn fit_size(image: egui::Vec2, avail: egui::Vec2) -> egui::Vec2 {
    if image.x <= 0.0 || image.y <= 0.0 {
        return avail;
    }
    let scale = (avail.x / image.x).min(avail.y / image.y);
    image * scale
}

fn slide_context(record: &ImageRecord) -> Option<String> {
    if let Some(album) = &record.album_name {
        return Some(album.clone());
    }
    record.memory_type.as_deref().map(|memory_type| {
        if memory_type == "on_this_day" {
            "On this day".to_string()
        } else {
            let spaced = memory_type.replace('_', " ");
            let mut chars = spaced.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => spaced,
            }
        }
    })
}

pub fn start_backend_bridge(
    cmd_rx: Receiver<BackendCommand>,
    ui_tx: Sender<UiEvent>,
    settings: Settings,
) {
    thread::spawn(move || {
        let _ = ui_tx.try_send(UiEvent::Info("Backend worker starting...".to_string()));
        let runtime = match tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(err) => {
                let _ = ui_tx.try_send(UiEvent::Error(UiError::from_message(
                    UiErrorContext::BackendStartup,
                    format!("backend worker startup failure: failed to build runtime: {err}"),
                )));
                tracing::error!("failed to build backend runtime: {err}");
                return;
            }
        };

        runtime.block_on(async move {
            let backend: Arc<dyn KioskBackend> = match HttpBackend::new(&settings.server_url) {
                Ok(backend) => Arc::new(backend),
                Err(err) => {
                    let _ = ui_tx.try_send(UiEvent::Error(UiError::from_message(
                        UiErrorContext::BackendStartup,
                        err.to_string(),
                    )));
                    tracing::error!("invalid backend url: {err}");
                    return;
                }
            };

            let controller = SlideshowController::with_settings(
                backend,
                ControllerSettings {
                    slide_interval: Duration::from_secs(settings.slide_duration_secs),
                    autoplay: settings.autoplay,
                    auto_refresh: settings.auto_refresh,
                },
            );

            let mut events = controller.subscribe_events();
            let ui_tx_events = ui_tx.clone();
            let event_task = tokio::spawn(async move {
                while let Ok(event) = events.recv().await {
                    match ui_tx_events.try_send(UiEvent::Controller(event)) {
                        Ok(()) => {}
                        Err(TrySendError::Full(_)) => {
                            tracing::warn!("ui event queue full; dropping controller event");
                        }
                        Err(TrySendError::Disconnected(_)) => return,
                    }
                }
            });

            let _ = ui_tx.try_send(UiEvent::BackendReady);

            while let Ok(cmd) = cmd_rx.recv() {
                match cmd {
                    BackendCommand::Initialize | BackendCommand::Retry => {
                        // Failures surface through FatalError on the event stream.
                        if let Err(err) = controller.initialize().await {
                            tracing::warn!("initialization failed: {err}");
                        }
                    }
                    BackendCommand::NextSlide => {
                        if let Err(err) = controller.next().await {
                            tracing::warn!("manual advance failed: {err}");
                        }
                    }
                    BackendCommand::PreviousSlide => {
                        if let Err(err) = controller.previous().await {
                            tracing::warn!("manual rewind failed: {err}");
                        }
                    }
                    BackendCommand::TogglePlayback => {
                        let _ = controller.toggle_playback().await;
                    }
                    BackendCommand::SetInterval { secs } => {
                        controller.set_interval_secs(secs).await;
                    }
                    BackendCommand::SetAutoRefresh { enabled } => {
                        controller.set_auto_refresh(enabled).await;
                    }
                    BackendCommand::SwitchSource { source } => {
                        if let Err(err) = controller.switch_source(source).await {
                            tracing::warn!("source switch failed: {err}");
                        }
                    }
                }
            }

            controller.shutdown().await;
            event_task.abort();
        });
    });
}
