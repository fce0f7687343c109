pub mod models;
pub mod services;
pub mod api;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::time::Instant;
use tracing::info;
use tracing_subscriber::{
    fmt,
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;

use services::config_store::load_app_config;
use services::moderation::{FeatureExtractor, HttpPolicyJudge, ReviewPipeline, TermMatcher};

static PROCESS_START: OnceLock<Instant> = OnceLock::new();
static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

const LOG_FILE_PREFIX: &str = "reviewGuard_";
const LOG_FILES_KEPT: usize = 30;

fn startup_elapsed_ms() -> u128 {
    PROCESS_START
        .get()
        .map(|t| t.elapsed().as_millis())
        .unwrap_or(0)
}

fn env_flag(key: &str) -> bool {
    matches!(std::env::var(key).as_deref(), Ok("1") | Ok("true") | Ok("TRUE"))
}

/// Initialize logging with a timestamped file per session.
pub fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if env_flag("REVIEW_GUARD_DISABLE_FILE_LOG") {
        init_console_only_logging(env_filter);
        info!("File logging disabled via REVIEW_GUARD_DISABLE_FILE_LOG");
        return;
    }

    let logs_dir = match std::env::var("REVIEW_GUARD_LOG_DIR") {
        Ok(p) if !p.trim().is_empty() => PathBuf::from(p),
        _ => get_logs_dir(),
    };

    if let Err(e) = fs::create_dir_all(&logs_dir) {
        eprintln!("Failed to create logs directory: {}", e);
        init_console_only_logging(env_filter);
        info!("Falling back to console-only logging (log dir not writable)");
        return;
    }

    let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let log_filename = format!("{}{}.log", LOG_FILE_PREFIX, timestamp);

    let file_appender = rolling::never(&logs_dir, &log_filename);
    let (file_writer, file_guard) = tracing_appender::non_blocking(file_appender);
    let _ = LOG_GUARD.set(file_guard);

    let file_layer = fmt::layer()
        .with_writer(file_writer)
        .with_ansi(false)
        .with_target(true)
        .with_file(true)
        .with_line_number(true);

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(cfg!(debug_assertions))
        .with_target(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .init();

    info!("=== reviewGuard Started ===");
    info!("Log file: {}/{}", logs_dir.display(), log_filename);
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    std::thread::spawn(move || {
        cleanup_old_logs(&logs_dir, LOG_FILES_KEPT);
    });
}

fn get_logs_dir() -> PathBuf {
    if let Some(data_dir) = dirs::data_local_dir() {
        return data_dir.join("reviewGuard").join("logs");
    }
    PathBuf::from("logs")
}

fn cleanup_old_logs(logs_dir: &Path, keep: usize) {
    let mut entries: Vec<_> = match fs::read_dir(logs_dir) {
        Ok(rd) => rd.filter_map(|e| e.ok()).collect(),
        Err(_) => return,
    };

    entries.retain(|e| {
        let name = e.file_name().to_string_lossy().to_string();
        name.starts_with(LOG_FILE_PREFIX) && name.ends_with(".log")
    });

    if entries.len() <= keep {
        return;
    }

    entries.sort_by_key(|e| {
        e.metadata()
            .and_then(|m| m.modified())
            .unwrap_or(std::time::SystemTime::UNIX_EPOCH)
    });

    let remove_count = entries.len().saturating_sub(keep);
    for entry in entries.into_iter().take(remove_count) {
        let _ = fs::remove_file(entry.path());
    }
}

fn init_console_only_logging(env_filter: EnvFilter) {
    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(cfg!(debug_assertions))
        .with_target(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .init();
}

/// Build the classification pipeline from resolved config.
pub fn build_pipeline(config: &services::config_store::AppConfig) -> anyhow::Result<ReviewPipeline> {
    let matcher = TermMatcher::new(&config.terms);
    let (promo, visit, irrelevant) = matcher.term_counts();
    info!(promo, visit, irrelevant, "term tables compiled");

    let judge = HttpPolicyJudge::new(config.judge.clone())?;
    info!(
        model = %config.judge.model_id,
        url = %config.judge.base_url,
        timeout_secs = config.judge.timeout_secs,
        authenticated = config.judge.api_token.is_some(),
        "judge configured"
    );

    Ok(ReviewPipeline::new(
        FeatureExtractor::new(Arc::new(matcher)),
        Arc::new(judge),
    ))
}

/// Service entry point: logging, config, pipeline, then HTTP until Ctrl-C.
pub async fn run() -> anyhow::Result<()> {
    PROCESS_START.get_or_init(Instant::now);

    let logging_t0 = Instant::now();
    init_logging();
    info!(startup_ms = startup_elapsed_ms(), logging_ms = logging_t0.elapsed().as_millis(), "logging.initialized");

    let config = load_app_config();
    let pipeline = build_pipeline(&config)?;
    info!(startup_ms = startup_elapsed_ms(), "pipeline.ready");

    api::serve(&config.server, pipeline).await?;

    info!("=== reviewGuard Exited ===");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cleanup_old_logs_keeps_newest() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..5 {
            let path = dir.path().join(format!("{}2024010{}_000000.log", LOG_FILE_PREFIX, i));
            fs::write(&path, "x").unwrap();
            std::thread::sleep(std::time::Duration::from_millis(20));
        }
        fs::write(dir.path().join("unrelated.log"), "y").unwrap();

        cleanup_old_logs(dir.path(), 2);

        let mut names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        assert_eq!(
            names,
            vec![
                format!("{}20240103_000000.log", LOG_FILE_PREFIX),
                format!("{}20240104_000000.log", LOG_FILE_PREFIX),
                "unrelated.log".to_string(),
            ]
        );
    }

    #[test]
    fn test_build_pipeline_uses_configured_model() {
        let mut config = services::config_store::AppConfig::default();
        config.judge.model_id = "acme/judge-1".to_string();
        let pipeline = build_pipeline(&config).unwrap();
        assert_eq!(pipeline.model_id(), "acme/judge-1");
    }
}
