use crate::api::{self, GIT_COMMIT_HASH, config::ServerConfig};
use anyhow::Result;
use tracing::info;

#[derive(Debug)]
pub struct Args {
    pub config: ServerConfig,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the database is unreachable or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    log_startup_args(&args.config);
    api::new(args.config).await
}

fn log_startup_args(config: &ServerConfig) {
    let database = config.database();
    let limiter = config.limiter();
    let entries = [
        ("listen", format!("tcp:{}", config.port())),
        ("environment", config.environment().to_string()),
        (
            "dsn",
            database
                .redacted_dsn()
                .unwrap_or_else(|_| "invalid-dsn".to_string()),
        ),
        ("db_max_connections", database.max_connections().to_string()),
        (
            "db_max_idle",
            format!("{}s", database.max_idle().as_secs()),
        ),
        ("limiter_enabled", limiter.enabled().to_string()),
        ("limiter_rps", limiter.rps().to_string()),
        ("limiter_burst", limiter.burst().to_string()),
        (
            "limiter_sweep",
            format!("{}s", limiter.sweep_interval().as_secs()),
        ),
    ];
    info!("{}", format_entries("Startup configuration", &entries));
}

fn format_entries(title: &str, entries: &[(&str, String)]) -> String {
    let max_key_len = entries.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
    let mut message = format!(
        "cyclingmarket {} - {}\n\n{title}:",
        env!("CARGO_PKG_VERSION"),
        short_commit(GIT_COMMIT_HASH)
    );
    for (key, value) in entries {
        let padding = " ".repeat(max_key_len.saturating_sub(key.len()));
        let _ =
            std::fmt::Write::write_fmt(&mut message, format_args!("\n  {key}:{padding} {value}"));
    }
    message
}

fn short_commit(hash: &str) -> &str {
    let trimmed = hash.trim();
    trimmed.get(..7).unwrap_or(trimmed)
}
