use crate::cli::{actions::Action, commands, dispatch, telemetry};
use anyhow::Result;

/// Parse the command line, bring up logging, and hand back the action to
/// run.
///
/// # Errors
///
/// Returns an error if telemetry setup or argument dispatch fails
pub fn start() -> Result<Action> {
    let matches = commands::new().get_matches();

    let verbosity = matches
        .get_one::<u8>(commands::logging::ARG_VERBOSITY)
        .copied()
        .unwrap_or(0);
    telemetry::init(verbosity_to_level(verbosity))?;

    dispatch::handler(&matches)
}

/// Repeated `-v` flags raise the log level; zero means logging stays off.
const fn verbosity_to_level(verbosity: u8) -> Option<tracing::Level> {
    match verbosity {
        0 => None,
        1 => Some(tracing::Level::WARN),
        2 => Some(tracing::Level::INFO),
        3 => Some(tracing::Level::DEBUG),
        _ => Some(tracing::Level::TRACE),
    }
}

#[cfg(test)]
mod tests {
    use super::verbosity_to_level;

    #[test]
    fn each_extra_flag_raises_the_level() {
        assert_eq!(verbosity_to_level(0), None);
        assert_eq!(verbosity_to_level(1), Some(tracing::Level::WARN));
        assert_eq!(verbosity_to_level(2), Some(tracing::Level::INFO));
        assert_eq!(verbosity_to_level(3), Some(tracing::Level::DEBUG));
        assert_eq!(verbosity_to_level(4), Some(tracing::Level::TRACE));
        assert_eq!(verbosity_to_level(255), Some(tracing::Level::TRACE));
    }
}
