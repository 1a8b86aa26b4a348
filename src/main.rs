use anyhow::Result;
use batchdrop::{
    config::Config, pipeline::BatchOrchestrator, route::OutcomeRouter, source, store::BatchStore,
};
use std::fs;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .init();
    info!("startup");

    // ─── 2) load config + prepare folders ────────────────────────────
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "batchdrop.yaml".to_string());
    let cfg = Config::load(&config_path)?;
    for d in [&cfg.incoming_dir, &cfg.success_dir, &cfg.error_dir] {
        fs::create_dir_all(d)?;
    }

    // ─── 3) open store + build the pipeline ──────────────────────────
    let store = BatchStore::open(&cfg.database_path).await?;
    let orchestrator = BatchOrchestrator::new(store, cfg.worker_count, cfg.block_timeout());
    let router = OutcomeRouter::new(&cfg.success_dir, &cfg.error_dir);

    // ─── 4) recurring drop-folder scan ───────────────────────────────
    info!(
        folder = %cfg.incoming_dir.display(),
        every_secs = cfg.scan_interval_secs,
        "watching drop folder"
    );
    let mut ticker = tokio::time::interval(cfg.scan_interval());
    loop {
        ticker.tick().await;
        if let Err(err) = scan_once(&cfg, &orchestrator, &router).await {
            error!("scan pass failed: {err:#}");
        }
    }
}

/// One pass over the incoming folder: sweep non-CSV files to the error
/// folder, then run every CSV file through the pipeline.
async fn scan_once(
    cfg: &Config,
    orchestrator: &BatchOrchestrator,
    router: &OutcomeRouter,
) -> Result<()> {
    let files = source::scan_folder(&cfg.incoming_dir)?;

    for file in files.iter().filter(|f| !source::is_csv_file(f)) {
        error!(file = %file.display(), "invalid file format, only CSV files are allowed");
        router.to_error(file, "invalid file format");
    }

    let csv_files: Vec<_> = files
        .into_iter()
        .filter(|f| source::is_csv_file(f))
        .collect();
    if csv_files.is_empty() {
        info!("no CSV files found");
        return Ok(());
    }

    for file in csv_files {
        info!(file = %file.display(), "processing");
        orchestrator.process_path(router, &file).await;
    }
    Ok(())
}
