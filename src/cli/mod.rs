pub mod actions;
pub mod commands;
pub mod dispatch;
pub mod telemetry;

use anyhow::Result;
use telemetry::TelemetryGuard;

/// Parse arguments, install tracing and build the action to run.
///
/// The returned guard must be held until the action finishes so buffered
/// spans are flushed.
///
/// # Errors
///
/// Returns an error if tracing cannot be installed or the arguments are invalid
pub fn start() -> Result<(actions::Action, TelemetryGuard)> {
    let matches = commands::new().get_matches();

    let verbosity = matches.get_count("verbose");
    let guard = telemetry::init(telemetry::level_from_verbosity(verbosity))?;

    let action = dispatch::handler(&matches)?;

    Ok((action, guard))
}
