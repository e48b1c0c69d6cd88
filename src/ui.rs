use std::future::Future;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use eframe::egui;
use tokio::runtime::Handle;
use tokio::sync::watch;

use crate::config::Config;
use crate::controller::CaptureController;
use crate::download::{self, ARTIFACT_FILE_NAME};
use crate::error::BoothError;
use crate::session::{CameraState, CaptureSession, Phase};
use crate::texture::StillTexture;

// ============================================================================
// CONSTANTS FOR UI STYLING
// ============================================================================
const UI_PADDING: f32 = 20.0;
const LARGE_BUTTON_RADIUS: f32 = 80.0;
const SMALL_BUTTON_RADIUS: f32 = 50.0;
const HEADER_HEIGHT: f32 = 110.0;
const STATUS_HEIGHT: f32 = 70.0;
const CAPTURE_ERROR_HOLD_SECS: i64 = 4;

const BRAND_RED: egui::Color32 = egui::Color32::from_rgb(220, 38, 38);
const BRAND_YELLOW: egui::Color32 = egui::Color32::from_rgb(250, 204, 21);
const BRAND_GREEN: egui::Color32 = egui::Color32::from_rgb(22, 163, 74);
const NEUTRAL: egui::Color32 = egui::Color32::from_rgb(70, 70, 80);

// ============================================================================
// MAIN APP STRUCT
// ============================================================================

/// Booth front-end. Renders from the published session state only; every
/// button forwards to the capture controller.
pub struct BoothApp {
    controller: CaptureController,
    runtime: Handle,
    updates: watch::Receiver<CaptureSession>,
    download_dir: PathBuf,

    pub camera_texture: Option<egui::TextureHandle>,
    captured_texture: Option<StillTexture>,
    result_texture: Option<StillTexture>,
    last_camera_update: Option<Instant>,

    export_message: Option<String>,
    export_message_time: Option<Instant>,

    // Exit mechanism for kiosk mode
    exit_tap_count: u32,
    exit_tap_last_time: Option<Instant>,
}

// ============================================================================
// INITIALIZATION
// ============================================================================

impl BoothApp {
    pub fn new(
        ctx: &egui::Context,
        controller: CaptureController,
        runtime: Handle,
        config: &Config,
    ) -> Self {
        let updates = controller.subscribe();

        // Repaint whenever an async completion changes the session
        let mut changes = controller.subscribe();
        let repaint_ctx = ctx.clone();
        runtime.spawn(async move {
            while changes.changed().await.is_ok() {
                repaint_ctx.request_repaint();
            }
        });

        Self {
            controller,
            runtime,
            updates,
            download_dir: config.paths.download_dir.clone(),
            camera_texture: None,
            captured_texture: None,
            result_texture: None,
            last_camera_update: None,
            export_message: None,
            export_message_time: None,
            exit_tap_count: 0,
            exit_tap_last_time: None,
        }
    }

    fn spawn<F, Fut>(&self, action: F)
    where
        F: FnOnce(CaptureController) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.runtime.spawn(action(self.controller.clone()));
    }

    fn start_camera(&self) {
        self.spawn(|controller| async move { controller.start_camera().await });
    }

    fn submit(&self) {
        self.spawn(|controller| async move {
            controller.submit().await;
        });
    }

    fn regenerate(&self) {
        self.spawn(|controller| async move {
            controller.regenerate().await;
        });
    }

    fn retake(&mut self) {
        self.camera_texture = None;
        self.last_camera_update = None;
        self.spawn(|controller| async move { controller.retake().await });
    }

    fn download(&mut self, session: &CaptureSession) {
        let Some(artifact) = session.result_artifact.as_ref() else {
            return;
        };
        let Some(path) = rfd::FileDialog::new()
            .set_directory(&self.download_dir)
            .set_file_name(ARTIFACT_FILE_NAME)
            .add_filter("PNG image", &["png"])
            .save_file()
        else {
            return;
        };

        self.export_message = Some(match download::save_artifact_to(artifact, &path) {
            Ok(()) => format!("✓ Saved {}", path.display()),
            Err(e) => {
                log::warn!("Download failed: {:#}", e);
                format!("✗ Save failed: {}", e)
            }
        });
        self.export_message_time = Some(Instant::now());
    }
}

impl Drop for BoothApp {
    fn drop(&mut self) {
        self.controller.shutdown();
    }
}

// ============================================================================
// MAIN UPDATE LOOP
// ============================================================================

impl eframe::App for BoothApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        // ESC key to exit (for debugging in kiosk mode with keyboard)
        if ctx.input(|i| i.key_pressed(egui::Key::Escape)) {
            ctx.send_viewport_cmd(egui::ViewportCommand::Close);
        }

        self.render_exit_area(ctx);

        let session = self.updates.borrow_and_update().clone();

        // Space starts the countdown, Enter skips it
        if session.phase() == Phase::CameraOn {
            if ctx.input(|i| i.key_pressed(egui::Key::Space)) {
                self.controller.request_capture();
            } else if ctx.input(|i| i.key_pressed(egui::Key::Enter)) {
                self.controller.capture_now();
            }
        }

        self.expire_capture_error(ctx, &session);

        if session.camera_state == CameraState::On {
            self.update_camera_preview(ctx);
            ctx.request_repaint();
        }

        self.render_ui(ctx, &session);
    }
}

impl BoothApp {
    /// A failed snapshot is transient: its overlay clears after a few seconds.
    fn expire_capture_error(&self, ctx: &egui::Context, session: &CaptureSession) {
        let Some(overlay) = &session.overlay else {
            return;
        };
        if !matches!(overlay.error, BoothError::CaptureUnavailable(_)) {
            return;
        }
        let hold = chrono::Duration::seconds(CAPTURE_ERROR_HOLD_SECS);
        match session.overlay_shown_for(chrono::Local::now()) {
            Some(shown) if shown >= hold => self.controller.dismiss_error(overlay.at),
            _ => ctx.request_repaint_after(Duration::from_millis(500)),
        }
    }

    fn update_camera_preview(&mut self, ctx: &egui::Context) {
        let now = Instant::now();
        let should_update = match self.last_camera_update {
            None => true,
            Some(last) => now.duration_since(last) >= Duration::from_millis(33),
        };

        if should_update {
            if let Some(frame) = self.controller.preview_frame() {
                self.update_camera_texture(ctx, &frame);
                self.last_camera_update = Some(now);
            }
        }
    }

    /// Hidden exit area for touchscreens: tap the top-left corner 5 times within 3 seconds.
    fn render_exit_area(&mut self, ctx: &egui::Context) {
        egui::Area::new("exit_area")
            .fixed_pos(egui::pos2(0.0, 0.0))
            .order(egui::Order::Foreground)
            .show(ctx, |ui| {
                let (_rect, response) =
                    ui.allocate_exact_size(egui::vec2(50.0, 50.0), egui::Sense::click());

                if response.clicked() {
                    let now = Instant::now();
                    if let Some(last_time) = self.exit_tap_last_time {
                        if now.duration_since(last_time).as_secs() > 3 {
                            self.exit_tap_count = 0;
                        }
                    }
                    self.exit_tap_count += 1;
                    self.exit_tap_last_time = Some(now);

                    if self.exit_tap_count >= 5 {
                        ctx.send_viewport_cmd(egui::ViewportCommand::Close);
                    }
                }
            });
    }

    fn render_ui(&mut self, ctx: &egui::Context, session: &CaptureSession) {
        egui::CentralPanel::default()
            .frame(egui::Frame::none())
            .show(ctx, |ui| {
                let full_rect = ui.max_rect();
                ui.painter().rect_filled(full_rect, 0.0, egui::Color32::from_rgb(30, 30, 34));

                let header_rect = egui::Rect::from_min_size(
                    full_rect.min,
                    egui::vec2(full_rect.width(), HEADER_HEIGHT),
                );
                let status_rect = egui::Rect::from_min_max(
                    egui::pos2(full_rect.min.x, full_rect.max.y - STATUS_HEIGHT),
                    full_rect.max,
                );
                let viewport_rect = egui::Rect::from_min_max(
                    egui::pos2(full_rect.min.x + UI_PADDING, header_rect.max.y + UI_PADDING),
                    egui::pos2(full_rect.max.x - UI_PADDING, status_rect.min.y - UI_PADDING),
                );

                self.render_header(ui, header_rect);
                self.render_viewport(ui, ctx, viewport_rect, session);
                self.render_status(ui, status_rect, session);
                self.render_button_overlay(ctx, viewport_rect, session);
                self.render_export_message(ctx);
            });
    }

    fn render_header(&self, ui: &mut egui::Ui, rect: egui::Rect) {
        let painter = ui.painter();
        painter.rect_filled(rect, 0.0, BRAND_RED);
        painter.text(
            rect.center() - egui::vec2(0.0, 16.0),
            egui::Align2::CENTER_CENTER,
            "EMPLOYEE APPRECIATOR©",
            egui::FontId::proportional(36.0),
            egui::Color32::WHITE,
        );
        painter.text(
            rect.center() + egui::vec2(0.0, 26.0),
            egui::Align2::CENTER_CENTER,
            "Generate Your Official Employee of the Month Certificate",
            egui::FontId::proportional(18.0),
            egui::Color32::from_rgb(254, 249, 195),
        );
    }

    fn render_status(&self, ui: &mut egui::Ui, rect: egui::Rect, session: &CaptureSession) {
        let message = session.status_message();
        if message.is_empty() {
            return;
        }
        let (fill, text) = if session.is_error_message() {
            (egui::Color32::from_rgb(254, 242, 242), egui::Color32::from_rgb(185, 28, 28))
        } else {
            (egui::Color32::from_rgb(240, 253, 244), egui::Color32::from_rgb(21, 128, 61))
        };
        let painter = ui.painter();
        painter.rect_filled(rect.shrink(8.0), 8.0, fill);
        painter.text(
            rect.center(),
            egui::Align2::CENTER_CENTER,
            message,
            egui::FontId::proportional(20.0),
            text,
        );
    }

    fn render_export_message(&mut self, ctx: &egui::Context) {
        // Auto-hide message after 3 seconds
        if let Some(message_time) = self.export_message_time {
            if message_time.elapsed().as_secs() > 3 {
                self.export_message = None;
                self.export_message_time = None;
            }
        }

        if let Some(ref message) = self.export_message {
            let is_success = message.starts_with('✓');

            egui::Area::new("export_message")
                .anchor(egui::Align2::CENTER_TOP, egui::vec2(0.0, HEADER_HEIGHT + UI_PADDING))
                .order(egui::Order::Tooltip)
                .show(ctx, |ui| {
                    egui::Frame::none()
                        .fill(if is_success {
                            egui::Color32::from_rgb(40, 120, 40)
                        } else {
                            egui::Color32::from_rgb(180, 40, 40)
                        })
                        .rounding(8.0)
                        .inner_margin(egui::Margin::symmetric(20.0, 15.0))
                        .show(ui, |ui| {
                            ui.label(
                                egui::RichText::new(message)
                                    .color(egui::Color32::WHITE)
                                    .size(20.0),
                            );
                        });
                });
            ctx.request_repaint_after(Duration::from_millis(500));
        }
    }
}

// ============================================================================
// VIEWPORT RENDERING
// ============================================================================

impl BoothApp {
    fn render_viewport(
        &mut self,
        ui: &mut egui::Ui,
        ctx: &egui::Context,
        rect: egui::Rect,
        session: &CaptureSession,
    ) {
        ui.painter().rect_filled(rect, 8.0, egui::Color32::BLACK);
        ui.painter()
            .rect_stroke(rect, 8.0, egui::Stroke::new(4.0, BRAND_YELLOW));

        let texture = match session.phase() {
            Phase::Result => session.result_artifact.as_ref().and_then(|artifact| {
                Self::still_texture(ctx, &mut self.result_texture, "certificate", artifact)
            }),
            Phase::Captured | Phase::Submitting => {
                session.captured_image.as_ref().and_then(|image| {
                    Self::still_texture(ctx, &mut self.captured_texture, "captured_photo", image)
                })
            }
            Phase::CameraOn | Phase::Counting => self.camera_texture.clone(),
            Phase::Idle => None,
        };

        match texture {
            Some(texture) => {
                let display_size = fit_image_in_rect(texture.size_vec2(), rect.shrink(4.0).size());
                let centered_rect = center_rect_in_rect(display_size, rect);
                ui.allocate_ui_at_rect(centered_rect, |ui| {
                    ui.add(egui::Image::new(&texture).fit_to_exact_size(display_size));
                });
            }
            None => {
                let label = match session.camera_state {
                    CameraState::Starting => "Starting camera...",
                    CameraState::Error => "Camera unavailable",
                    _ => "📷 Ready for your close-up?",
                };
                ui.painter().text(
                    rect.center(),
                    egui::Align2::CENTER_CENTER,
                    label,
                    egui::FontId::proportional(24.0),
                    egui::Color32::from_rgb(254, 249, 195),
                );
            }
        }

        if let Some(remaining) = session.countdown_value {
            ui.painter().circle_filled(rect.center(), 90.0, egui::Color32::from_black_alpha(140));
            ui.painter().text(
                rect.center(),
                egui::Align2::CENTER_CENTER,
                remaining.to_string(),
                egui::FontId::proportional(120.0),
                egui::Color32::WHITE,
            );
        }
    }
}

// ============================================================================
// BUTTON ZONE RENDERING (OVERLAY)
// ============================================================================

impl BoothApp {
    fn render_button_overlay(
        &mut self,
        ctx: &egui::Context,
        viewport: egui::Rect,
        session: &CaptureSession,
    ) {
        let primary_center = egui::pos2(
            viewport.max.x - LARGE_BUTTON_RADIUS - UI_PADDING,
            viewport.max.y - LARGE_BUTTON_RADIUS - UI_PADDING,
        );
        let secondary_center = egui::pos2(
            viewport.max.x - SMALL_BUTTON_RADIUS - UI_PADDING,
            primary_center.y - LARGE_BUTTON_RADIUS - SMALL_BUTTON_RADIUS - UI_PADDING,
        );
        let tertiary_center = egui::pos2(
            secondary_center.x,
            secondary_center.y - SMALL_BUTTON_RADIUS * 2.0 - UI_PADDING,
        );

        match session.phase() {
            Phase::Idle => {
                if session.camera_state != CameraState::Starting
                    && self.overlay_button(ctx, "start_btn", primary_center, LARGE_BUTTON_RADIUS, "Start", BRAND_RED, true)
                {
                    self.start_camera();
                }
            }
            Phase::CameraOn | Phase::Counting => {
                if self.overlay_button(ctx, "capture_btn", primary_center, LARGE_BUTTON_RADIUS, "Capture", BRAND_YELLOW, true) {
                    self.controller.request_capture();
                }
                if self.overlay_button(ctx, "stop_btn", secondary_center, SMALL_BUTTON_RADIUS, "Stop", NEUTRAL, true) {
                    self.controller.stop_camera();
                }
            }
            Phase::Captured | Phase::Submitting => {
                let pending = session.is_submitting();
                let retry = session
                    .last_error()
                    .map(|e| e.is_submission_error())
                    .unwrap_or(false);
                let label = match (pending, retry) {
                    (true, _) => "Generating...",
                    (false, true) => "Try again",
                    (false, false) => "Generate",
                };
                if self.overlay_button(ctx, "generate_btn", primary_center, LARGE_BUTTON_RADIUS, label, BRAND_GREEN, !pending) {
                    if retry {
                        self.regenerate();
                    } else {
                        self.submit();
                    }
                }
                if self.overlay_button(ctx, "retake_btn", secondary_center, SMALL_BUTTON_RADIUS, "Retake", NEUTRAL, true) {
                    self.retake();
                }
            }
            Phase::Result => {
                if self.overlay_button(ctx, "download_btn", primary_center, LARGE_BUTTON_RADIUS, "Download", BRAND_GREEN, true) {
                    self.download(session);
                }
                if self.overlay_button(ctx, "regenerate_btn", secondary_center, SMALL_BUTTON_RADIUS, "Again", BRAND_RED, true) {
                    self.regenerate();
                }
                if self.overlay_button(ctx, "retake_btn", tertiary_center, SMALL_BUTTON_RADIUS, "Retake", NEUTRAL, true) {
                    self.retake();
                }
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn overlay_button(
        &self,
        ctx: &egui::Context,
        id: &str,
        center: egui::Pos2,
        radius: f32,
        text: &str,
        fill: egui::Color32,
        enabled: bool,
    ) -> bool {
        egui::Area::new(id.to_owned())
            .fixed_pos(center - egui::vec2(radius, radius))
            .order(egui::Order::Foreground)
            .show(ctx, |ui| circular_button(ui, radius, text, fill, enabled))
            .inner
    }
}

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

/// Circular touch button; a disabled button is drawn dimmed and ignores clicks.
fn circular_button(
    ui: &mut egui::Ui,
    radius: f32,
    text: &str,
    base_fill: egui::Color32,
    enabled: bool,
) -> bool {
    let size = egui::vec2(radius * 2.0, radius * 2.0);
    let sense = if enabled { egui::Sense::click() } else { egui::Sense::hover() };
    let (rect, response) = ui.allocate_exact_size(size, sense);

    if ui.is_rect_visible(rect) {
        let painter = ui.painter();
        let center = rect.center();

        let (fill_color, stroke_color) = if !enabled {
            (base_fill.gamma_multiply(0.4), egui::Color32::from_rgb(90, 90, 95))
        } else if response.is_pointer_button_down_on() {
            let r = base_fill.r().saturating_sub(30);
            let g = base_fill.g().saturating_sub(30);
            let b = base_fill.b().saturating_sub(30);
            (egui::Color32::from_rgb(r, g, b), egui::Color32::from_rgb(120, 120, 130))
        } else if response.hovered() {
            let r = base_fill.r().saturating_add(20);
            let g = base_fill.g().saturating_add(20);
            let b = base_fill.b().saturating_add(20);
            (egui::Color32::from_rgb(r, g, b), egui::Color32::from_rgb(150, 150, 160))
        } else {
            (base_fill, egui::Color32::from_rgb(100, 100, 110))
        };

        // Shadow for depth
        painter.circle(
            center + egui::vec2(3.0, 3.0),
            radius,
            egui::Color32::from_black_alpha(80),
            egui::Stroke::NONE,
        );
        painter.circle(center, radius, fill_color, egui::Stroke::new(3.0, stroke_color));

        let font_id = egui::FontId::proportional(radius / 3.0);
        let galley = painter.layout_no_wrap(text.to_string(), font_id, egui::Color32::WHITE);
        let text_pos = center - galley.size() / 2.0;
        painter.galley(text_pos, galley);

        if enabled && response.hovered() {
            ui.ctx().set_cursor_icon(egui::CursorIcon::PointingHand);
        }
    }

    enabled && response.clicked()
}

// Helper functions for image centering
fn fit_image_in_rect(image_size: egui::Vec2, container_size: egui::Vec2) -> egui::Vec2 {
    let scale = (container_size.x / image_size.x).min(container_size.y / image_size.y);
    image_size * scale
}

fn center_rect_in_rect(content_size: egui::Vec2, container: egui::Rect) -> egui::Rect {
    let offset = (container.size() - content_size) * 0.5;
    egui::Rect::from_min_size(container.min + offset, content_size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fit_keeps_aspect_ratio() {
        let fitted = fit_image_in_rect(egui::vec2(720.0, 900.0), egui::vec2(400.0, 400.0));
        assert!((fitted.y - 400.0).abs() < 1e-3);
        assert!((fitted.x - 320.0).abs() < 1e-3);
    }

    #[test]
    fn test_center_rect() {
        let container = egui::Rect::from_min_size(egui::pos2(10.0, 20.0), egui::vec2(100.0, 50.0));
        let centered = center_rect_in_rect(egui::vec2(40.0, 50.0), container);
        assert_eq!(centered.min, egui::pos2(40.0, 20.0));
    }
}
