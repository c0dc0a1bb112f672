use egui::{Align, Color32, RichText};

use super::{GradeUploader, NoticeLevel};
use crate::upload::{format_duration, UploadTask};
use crate::utils::format_size;

const ACCENT: Color32 = Color32::from_rgb(161, 89, 225);
const SUCCESS: Color32 = Color32::from_rgb(0, 180, 0);
const FAILURE: Color32 = Color32::from_rgb(220, 50, 50);
const MUTED: Color32 = Color32::from_rgb(150, 150, 150);
const WARNING: Color32 = Color32::from_rgb(230, 160, 30);

impl GradeUploader {
    pub fn render(&mut self, ctx: &egui::Context) {
        egui::CentralPanel::default().show(ctx, |ui| {
            ui.add_space(20.0);
            ui.vertical_centered(|ui| {
                ui.heading("Student Grades Import");
                ui.add_space(5.0);
                ui.label(
                    RichText::new("Bulk-upload grade CSV files and follow their processing")
                        .color(ui.visuals().text_color().gamma_multiply(0.7)),
                );
                ui.add_space(10.0);
                ui.label(
                    RichText::new(format!(
                        "Server: {}  ·  Mode: {}",
                        self.config.server_url,
                        self.config.mode.label()
                    ))
                    .small()
                    .color(MUTED),
                );
                ui.add_space(20.0);

                let button =
                    egui::Button::new("📤 Upload CSV Files").min_size(egui::vec2(200.0, 40.0));
                if ui.add(button).clicked() {
                    self.session.open_dialog();
                }
            });

            ui.with_layout(egui::Layout::bottom_up(Align::Center), |ui| {
                ui.add_space(15.0);
                self.render_footer(ui);
            });
        });

        if self.session.dialog_open {
            self.render_upload_window(ctx);
        }
    }

    fn render_upload_window(&mut self, ctx: &egui::Context) {
        let mut open = true;
        egui::Window::new("Upload CSV Files")
            .open(&mut open)
            .collapsible(false)
            .resizable(true)
            .default_width(480.0)
            .show(ctx, |ui| {
                ui.add_enabled_ui(!self.session.uploading, |ui| {
                    ui.horizontal(|ui| {
                        if ui.button("📄 Select Files").clicked() {
                            self.pick_files();
                        }
                        if ui.button("📁 Select Folder").clicked() {
                            self.pick_folder();
                        }
                    });
                });

                ui.add_space(10.0);
                ui.horizontal(|ui| {
                    let label = if self.session.uploading {
                        "Uploading"
                    } else {
                        "Start Import"
                    };
                    ui.add_enabled_ui(self.session.can_start(), |ui| {
                        if ui.button(label).clicked() {
                            self.start_upload();
                        }
                    });
                    if self.session.uploading {
                        ui.spinner();
                    }
                });

                if self.session.uploading {
                    ui.add_space(8.0);
                    ui.colored_label(
                        ACCENT,
                        "Please keep this window open while the upload is in progress.",
                    );
                }

                self.render_notices(ui);

                ui.add_space(10.0);
                egui::ScrollArea::vertical()
                    .max_height(320.0)
                    .show(ui, |ui| {
                        let tasks = self.session.batch.tasks();
                        for (idx, task) in tasks.iter().enumerate() {
                            render_task(ui, task);
                            if idx + 1 < tasks.len() {
                                ui.separator();
                            }
                        }
                    });

                self.render_metrics(ui);

                ui.add_space(10.0);
                ui.add_enabled_ui(!self.session.uploading, |ui| {
                    if ui.button("Close").clicked() {
                        self.session.request_close();
                    }
                });
            });

        if !open {
            self.session.request_close();
        }
    }

    fn render_notices(&self, ui: &mut egui::Ui) {
        if self.session.notices.is_empty() {
            return;
        }
        ui.add_space(8.0);
        for notice in &self.session.notices {
            let (icon, color) = match notice.level {
                NoticeLevel::Info => ("✅", SUCCESS),
                NoticeLevel::Warning => ("⚠", WARNING),
                NoticeLevel::Error => ("❌", FAILURE),
            };
            ui.horizontal_wrapped(|ui| {
                ui.label(icon);
                ui.colored_label(color, &notice.text);
            });
        }
    }

    fn render_metrics(&self, ui: &mut egui::Ui) {
        let metrics = self.session.metrics();
        if !metrics.has_summary() {
            return;
        }
        ui.add_space(12.0);
        ui.group(|ui| {
            ui.strong("Overall Metrics");
            ui.label(format!(
                "Total Upload Time: {}",
                format_duration(metrics.total_upload)
            ));
            ui.label(format!(
                "Total Processing Time: {}",
                format_duration(metrics.total_processing)
            ));
            ui.label(format!(
                "Total Time: {}",
                format_duration(metrics.total_overall)
            ));
        });
    }

    fn render_footer(&self, ui: &mut egui::Ui) {
        let Some(url) = self.config.console_url.clone() else {
            return;
        };
        let link = egui::Label::new(RichText::new("Open admin console").color(ACCENT))
            .sense(egui::Sense::click());
        if ui.add(link).on_hover_text(url).clicked() {
            self.open_console();
        }
    }
}

fn render_task(ui: &mut egui::Ui, task: &UploadTask) {
    ui.horizontal(|ui| {
        ui.strong(&task.name);
        ui.label(RichText::new(format_size(task.size_bytes)).color(MUTED));
    });

    ui.label(format!("Upload Progress: {:.2}%", task.upload_progress));
    ui.add(
        egui::ProgressBar::new(task.upload_progress / 100.0)
            .fill(if task.upload_end.is_some() { SUCCESS } else { ACCENT })
            .animate(false),
    );
    if task.upload_end.is_some() {
        ui.label(format!(
            "Upload Time: {}",
            format_duration(task.upload_duration())
        ));
    }

    if task.processing_start.is_some() || task.process_progress > 0.0 {
        ui.label(format!("Processing Progress: {:.0}%", task.process_progress));
        ui.add(
            egui::ProgressBar::new(task.process_progress / 100.0)
                .fill(if task.is_processed() { SUCCESS } else { ACCENT })
                .animate(false),
        );
        ui.label(format!(
            "Records Processed: {}",
            task.records_processed.unwrap_or(0)
        ));
        if task.is_processed() {
            ui.label(format!(
                "Processing Time: {}",
                format_duration(task.processing_duration())
            ));
            ui.label(format!(
                "Total Time: {}",
                format_duration(task.total_duration())
            ));
        }
    }

    if let Some(error) = &task.error {
        ui.colored_label(FAILURE, format!("❌ {}", error));
    }
}
