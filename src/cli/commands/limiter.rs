use clap::{Arg, ArgAction, Command, builder::ValueParser};

pub const ARG_LIMITER_RPS: &str = "limiter-rps";
pub const ARG_LIMITER_BURST: &str = "limiter-burst";
pub const ARG_LIMITER_ENABLED: &str = "limiter-enabled";
pub const ARG_LIMITER_SWEEP_SECONDS: &str = "limiter-sweep-seconds";

#[must_use]
pub fn validator_rps() -> ValueParser {
    ValueParser::from(move |rps: &str| -> std::result::Result<f64, String> {
        match rps.parse::<f64>() {
            Ok(parsed) if parsed.is_finite() && parsed >= 0.0 => Ok(parsed),
            _ => Err("must be a non-negative number".to_string()),
        }
    })
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_LIMITER_RPS)
                .long(ARG_LIMITER_RPS)
                .help("Rate limiter refill rate in requests per second")
                .default_value("2")
                .env("CYCLINGMARKET_LIMITER_RPS")
                .value_parser(validator_rps()),
        )
        .arg(
            Arg::new(ARG_LIMITER_BURST)
                .long(ARG_LIMITER_BURST)
                .help("Rate limiter maximum burst")
                .default_value("4")
                .env("CYCLINGMARKET_LIMITER_BURST")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new(ARG_LIMITER_ENABLED)
                .long(ARG_LIMITER_ENABLED)
                .help("Enable the per-client rate limiter")
                .default_value("true")
                .env("CYCLINGMARKET_LIMITER_ENABLED")
                .action(ArgAction::Set)
                .value_parser(clap::value_parser!(bool)),
        )
        .arg(
            Arg::new(ARG_LIMITER_SWEEP_SECONDS)
                .long(ARG_LIMITER_SWEEP_SECONDS)
                .help("Seconds between sweeps of idle rate limiter clients")
                .default_value("60")
                .env("CYCLINGMARKET_LIMITER_SWEEP_SECONDS")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
}
