pub mod database;
pub mod limiter;
pub mod logging;

use clap::{
    Arg, ColorChoice, Command,
    builder::{
        PossibleValuesParser, TypedValueParser,
        styling::{AnsiColor, Effects, Styles},
    },
};

use crate::api::{GIT_COMMIT_HASH, config::Environment};

pub const ARG_PORT: &str = "port";
pub const ARG_ENVIRONMENT: &str = "environment";

#[must_use]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    let long_version: &'static str = Box::leak(
        format!("{} - {}", env!("CARGO_PKG_VERSION"), GIT_COMMIT_HASH).into_boxed_str(),
    );

    let command = Command::new("cyclingmarket")
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .version(env!("CARGO_PKG_VERSION"))
        .long_version(long_version)
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new(ARG_PORT)
                .short('p')
                .long(ARG_PORT)
                .help("Port to listen on")
                .default_value("4000")
                .env("CYCLINGMARKET_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new(ARG_ENVIRONMENT)
                .long(ARG_ENVIRONMENT)
                .help("Deployment environment reported by the healthcheck")
                .default_value("development")
                .env("CYCLINGMARKET_ENVIRONMENT")
                .value_parser(
                    PossibleValuesParser::new(Environment::VARIANTS)
                        .try_map(|name| name.parse::<Environment>()),
                ),
        );

    let command = database::with_args(command);
    let command = limiter::with_args(command);
    logging::with_args(command)
}
