//! Tracing setup: stderr plus a daily-rolling file under `logs/`.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const LOG_DIR: &str = "logs";

/// Level used when `RUST_LOG` is unset: debug when `LOG_DEBUG` is truthy.
fn default_directive(log_debug: Option<&str>) -> &'static str {
    let debug = log_debug
        .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false);
    if debug { "mrpilot=debug" } else { "mrpilot=info" }
}

/// Install the global subscriber. The returned guard must live until the
/// process exits so buffered file output is flushed.
pub fn init(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let log_debug = std::env::var("LOG_DEBUG").ok();
    let filter = || {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_directive(log_debug.as_deref())))
    };

    let dir = log_dir.unwrap_or(Path::new(LOG_DIR));
    let appender = std::fs::create_dir_all(dir).ok().and_then(|_| {
        tracing_appender::rolling::RollingFileAppender::builder()
            .rotation(tracing_appender::rolling::Rotation::DAILY)
            .filename_prefix("mrpilot")
            .filename_suffix("log")
            .build(dir)
            .ok()
    });

    match appender {
        Some(appender) => {
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            let _ = tracing_subscriber::registry()
                .with(filter())
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(non_blocking),
                )
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .try_init();
            Some(guard)
        }
        None => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter())
                .with_writer(std::io::stderr)
                .try_init();
            None
        }
    }
}

/// Strip any userinfo from a URL before it reaches a log line.
pub fn redact_url(url: &str) -> String {
    match reqwest::Url::parse(url) {
        Ok(mut parsed) if !parsed.username().is_empty() || parsed.password().is_some() => {
            let _ = parsed.set_username("***");
            let _ = parsed.set_password(None);
            parsed.to_string()
        }
        Ok(parsed) => parsed.to_string(),
        Err(_) => url.to_string(),
    }
}
