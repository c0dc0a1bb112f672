mod state;
mod ui;

use std::time::Duration;

use eframe::{egui, App};
use glob::Pattern;
use rfd::FileDialog;
use tokio::runtime::Runtime;
use tracing::{error, info, warn};

use crate::config::UploaderConfig;
use crate::upload::{self, collect_folder, select_paths, GradesClient, UploadJob};
pub use state::{Notice, NoticeLevel, UploadSession, CLOSE_WHILE_UPLOADING};

const REPAINT_WHILE_UPLOADING: Duration = Duration::from_millis(100);

pub struct GradeUploader {
    config: UploaderConfig,
    client: GradesClient,
    runtime: Runtime,
    file_pattern: Pattern,
    session: UploadSession,
}

impl GradeUploader {
    /// The client and runtime are created by the caller and owned here until
    /// the window closes; dropping the app shuts the runtime down.
    pub fn new(
        _cc: &eframe::CreationContext<'_>,
        config: UploaderConfig,
        client: GradesClient,
        runtime: Runtime,
    ) -> Self {
        info!(
            "grade uploader ready, server {} in {} mode",
            config.server_url,
            config.mode.label()
        );
        let file_pattern = Pattern::new(&config.file_pattern).unwrap_or_else(|e| {
            warn!("bad file pattern {:?} ({}), using *.csv", config.file_pattern, e);
            Pattern::new("*.csv").unwrap_or_default()
        });
        Self {
            config,
            client,
            runtime,
            file_pattern,
            session: UploadSession::default(),
        }
    }

    pub fn pick_files(&mut self) {
        let Some(paths) = FileDialog::new()
            .add_filter("CSV files", &["csv"])
            .pick_files()
        else {
            return;
        };

        let (files, errors) = select_paths(paths);
        if self.session.select(files) {
            for e in errors {
                self.session.warn(&e.to_string());
            }
        }
    }

    pub fn pick_folder(&mut self) {
        let Some(folder) = FileDialog::new().pick_folder() else {
            return;
        };

        info!("collecting {} under {}", self.file_pattern, folder.display());
        let files = collect_folder(&folder, &self.file_pattern);
        if files.is_empty() {
            self.session.warn(&format!(
                "No files matching {} found in {}",
                self.file_pattern,
                folder.display()
            ));
            return;
        }
        self.session.select(files);
    }

    pub fn start_upload(&mut self) {
        let Some((files, events)) = self.session.begin() else {
            return;
        };

        let job = UploadJob {
            mode: self.config.mode,
            files,
            poll_interval: self.config.poll_interval(),
        };
        self.runtime
            .spawn(upload::run(self.client.clone(), job, events));
    }

    pub fn update_state(&mut self, ctx: &egui::Context) {
        if self.session.drain_events() {
            ctx.request_repaint();
        }
        if self.session.uploading {
            ctx.request_repaint_after(REPAINT_WHILE_UPLOADING);
        }
    }

    pub fn open_console(&self) {
        if let Some(url) = &self.config.console_url {
            if let Err(e) = open::that(url) {
                error!("failed to open {}: {}", url, e);
            }
        }
    }
}

impl App for GradeUploader {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.update_state(ctx);
        let close_requested = ctx.input(|i| i.viewport().close_requested());
        if close_requested && self.session.should_cancel_app_close() {
            ctx.send_viewport_cmd(egui::ViewportCommand::CancelClose);
        }
        self.render(ctx);
    }
}
