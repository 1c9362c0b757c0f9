use crate::{
    api::{
        config::{DatabaseConfig, Environment, ServerConfig},
        rate_limit::LimiterConfig,
    },
    cli::{
        actions::{Action, server::Args},
        commands::{ARG_ENVIRONMENT, ARG_PORT, database, limiter},
    },
};
use anyhow::{Context, Result};
use secrecy::SecretString;
use std::time::Duration;

/// # Errors
/// Returns an error if required arguments are missing.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>(ARG_PORT).copied().unwrap_or(4000);
    let environment = matches
        .get_one::<Environment>(ARG_ENVIRONMENT)
        .copied()
        .unwrap_or_default();
    let dsn = matches
        .get_one::<String>(database::ARG_DSN)
        .cloned()
        .context("missing required argument: --dsn")?;

    let mut database = DatabaseConfig::new(SecretString::from(dsn));
    if let Some(max) = matches.get_one::<u32>(database::ARG_DB_MAX_CONNECTIONS) {
        database = database.with_max_connections(*max);
    }
    if let Some(secs) = matches.get_one::<u64>(database::ARG_DB_MAX_IDLE_SECONDS) {
        database = database.with_max_idle(Duration::from_secs(*secs));
    }

    let mut limiter = LimiterConfig::new();
    if let Some(rps) = matches.get_one::<f64>(limiter::ARG_LIMITER_RPS) {
        limiter = limiter.with_rps(*rps);
    }
    if let Some(burst) = matches.get_one::<u32>(limiter::ARG_LIMITER_BURST) {
        limiter = limiter.with_burst(*burst);
    }
    if let Some(enabled) = matches.get_one::<bool>(limiter::ARG_LIMITER_ENABLED) {
        limiter = limiter.with_enabled(*enabled);
    }
    if let Some(secs) = matches.get_one::<u64>(limiter::ARG_LIMITER_SWEEP_SECONDS) {
        limiter = limiter.with_sweep_interval(Duration::from_secs(*secs));
    }

    Ok(Action::Server(Args {
        config: ServerConfig::new(database)
            .with_port(port)
            .with_environment(environment)
            .with_limiter(limiter),
    }))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::cli::commands;
    use secrecy::ExposeSecret;

    #[test]
    fn builds_server_config_from_flags() {
        let matches = commands::new().get_matches_from(vec![
            "cyclingmarket",
            "--port",
            "9000",
            "--dsn",
            "postgres://market:pw@db:5432/cyclingmarket",
            "--environment",
            "production",
            "--db-max-connections",
            "5",
            "--db-max-idle-seconds",
            "30",
            "--limiter-rps",
            "1.5",
            "--limiter-burst",
            "8",
            "--limiter-enabled",
            "false",
            "--limiter-sweep-seconds",
            "15",
        ]);

        let Action::Server(args) = handler(&matches).unwrap();
        let config = args.config;

        assert_eq!(config.port(), 9000);
        assert_eq!(config.environment(), Environment::Production);
        assert_eq!(
            config.database().dsn().expose_secret(),
            "postgres://market:pw@db:5432/cyclingmarket"
        );
        assert_eq!(config.database().max_connections(), 5);
        assert_eq!(config.database().max_idle(), Duration::from_secs(30));
        assert!((config.limiter().rps() - 1.5).abs() < f64::EPSILON);
        assert_eq!(config.limiter().burst(), 8);
        assert!(!config.limiter().enabled());
        assert_eq!(config.limiter().sweep_interval(), Duration::from_secs(15));
    }
}
