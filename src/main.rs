use eframe::CreationContext;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use grade_uploader::app::GradeUploader;
use grade_uploader::config::UploaderConfig;
use grade_uploader::upload::GradesClient;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,hyper=warn,reqwest=warn"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config = UploaderConfig::load().map_err(|e| {
        error!("{}", e);
        e
    })?;
    let client = GradesClient::new(&config)?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .thread_name("grade-upload")
        .enable_all()
        .build()?;

    info!("starting grade uploader against {}", config.server_url);

    let options = eframe::NativeOptions {
        viewport: eframe::egui::ViewportBuilder::default()
            .with_inner_size([640.0, 680.0])
            .with_min_inner_size([420.0, 500.0]),
        ..Default::default()
    };

    eframe::run_native(
        "Student Grades Import",
        options,
        Box::new(move |cc: &CreationContext| {
            Box::new(GradeUploader::new(cc, config, client, runtime))
        }),
    )
    .map_err(|e| format!("failed to start the window: {}", e))?;

    Ok(())
}
