use std::sync::{Arc, PoisonError};

use eframe::{App, CreationContext};
use egui::{CentralPanel, Color32, Context, Rect, Sense, Stroke};
use egui_plot::{Line, Plot, PlotBounds, PlotPoints};
use tokio::sync::watch;

use crate::coordinator::Round;
use crate::error::TrainerError;
use crate::feedback::Color;
use crate::note::Note;
use crate::state::AppState;

const KEYBOARD_HEIGHT: f32 = 140.0;

/// Window showing the feedback keyboard and training progress.
pub struct TrainerApp {
    state: Arc<AppState>,
    rounds: watch::Receiver<Option<Round>>,
}

impl TrainerApp {
    pub fn new(state: Arc<AppState>, rounds: watch::Receiver<Option<Round>>) -> Self {
        Self { state, rounds }
    }

    fn keyboard(&self, ui: &mut egui::Ui) {
        let colors: Vec<(i32, Color32)> = self
            .state
            .key_colors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(&key, &color)| (key, to_color32(color)))
            .collect();

        let size = egui::vec2(ui.available_width(), KEYBOARD_HEIGHT);
        let (rect, _) = ui.allocate_exact_size(size, Sense::hover());
        let painter = ui.painter_at(rect);
        let width = rect.width() / colors.len().max(1) as f32;

        for (i, (key, color)) in colors.iter().enumerate() {
            // black keys are drawn shorter
            let height = if Note::new(*key).is_black_key() {
                rect.height() * 0.65
            } else {
                rect.height()
            };
            let key_rect = Rect::from_min_size(
                egui::pos2(rect.left() + i as f32 * width, rect.top()),
                egui::vec2(width - 1.0, height),
            );
            painter.rect_filled(key_rect, 2.0, *color);
            painter.rect_stroke(key_rect, 2.0, Stroke::new(1.0, Color32::DARK_GRAY));
        }
    }
}

impl App for TrainerApp {
    /// The update method is called every frame to update and render the UI.
    fn update(&mut self, ctx: &Context, _: &mut eframe::Frame) {
        ctx.request_repaint();

        let round = self
            .rounds
            .borrow()
            .as_ref()
            .map(|r| format!("Round {}: {} ({})", r.number, r.chord(), r.stimulus.instrument))
            .unwrap_or_else(|| "Waiting for participants...".to_string());
        let (history, summary) = {
            let stats = self.state.stats.lock().unwrap_or_else(PoisonError::into_inner);
            (stats.history().to_vec(), stats.summary())
        };
        let waveform = self
            .state
            .waveform_buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        CentralPanel::default().show(ctx, |ui| {
            ui.heading("Chord Trainer");
            ui.label(round);
            self.keyboard(ui);

            ui.separator();
            for (name, value) in &summary {
                ui.label(format!("{}: {:.2}", name, value));
            }

            let accuracy = Plot::new("Accuracy")
                .view_aspect(4.0)
                .show_axes([true, true]);
            accuracy.show(ui, |plot_ui| {
                let points: Vec<_> = history
                    .iter()
                    .enumerate()
                    .map(|(i, &v)| [i as f64, v])
                    .collect();
                plot_ui.set_plot_bounds(PlotBounds::from_min_max(
                    [0.0, 0.0],
                    [history.len().max(1) as f64, 1.0],
                ));
                plot_ui.line(Line::new(PlotPoints::from(points)));
            });

            let plot = Plot::new("Waveform")
                .view_aspect(4.0) // Set aspect ratio for the plot
                .show_axes([true, true]); // Show X and Y axes
            plot.show(ui, |plot_ui| {
                // Convert the waveform buffer to points for plotting
                let points: Vec<_> = waveform
                    .iter()
                    .enumerate()
                    .map(|(i, &v)| [i as f64, v as f64])
                    .collect();
                plot_ui.set_plot_bounds(PlotBounds::from_min_max(
                    [0.0, -1.1],
                    [waveform.len() as f64, 1.1],
                ));
                plot_ui.line(Line::new(PlotPoints::from(points)));
            });
        });
    }
}

fn to_color32(color: Color) -> Color32 {
    let channel = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
    Color32::from_rgba_unmultiplied(
        channel(color.r),
        channel(color.g),
        channel(color.b),
        channel(color.a),
    )
}

/// Initializes and runs the eframe application. Blocks until the window closes.
pub fn run_ui(
    state: Arc<AppState>,
    rounds: watch::Receiver<Option<Round>>,
) -> Result<(), TrainerError> {
    let options = eframe::NativeOptions::default();
    eframe::run_native(
        "Chord Trainer",
        options,
        Box::new(|_cc: &CreationContext| Ok(Box::new(TrainerApp::new(state, rounds)))),
    )
    .map_err(|e| TrainerError::Ui(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_conversion() {
        assert_eq!(to_color32(Color::WHITE), Color32::WHITE);
        assert_eq!(to_color32(Color::BLACK), Color32::BLACK);
        assert_eq!(
            to_color32(Color::rgb(1.0, 0.5, 0.0)),
            Color32::from_rgb(255, 128, 0)
        );
    }
}
