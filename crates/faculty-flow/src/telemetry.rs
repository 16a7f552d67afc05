use std::fmt;

use tracing_subscriber::filter::ParseError;
use tracing_subscriber::EnvFilter;

use crate::config::TelemetryConfig;

/// Crates logged at the configured level; everything else stays at `warn`
/// unless `RUST_LOG` overrides the whole filter.
const SERVICE_TARGETS: [&str; 2] = ["faculty_flow", "faculty_flow_api"];

#[derive(Debug)]
pub enum TelemetryError {
    Filter {
        directives: String,
        source: ParseError,
    },
    Init(Box<dyn std::error::Error + Send + Sync>),
}

impl fmt::Display for TelemetryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TelemetryError::Filter { directives, .. } => {
                write!(f, "invalid log filter '{directives}'")
            }
            TelemetryError::Init(err) => {
                write!(f, "failed to install the tracing subscriber: {err}")
            }
        }
    }
}

impl std::error::Error for TelemetryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TelemetryError::Filter { source, .. } => Some(source),
            TelemetryError::Init(err) => Some(&**err),
        }
    }
}

/// A bare level such as `debug` is scoped to this workspace's crates so
/// dependency chatter stays at `warn`; a string that already carries
/// directives is passed through untouched.
fn service_directives(log_level: &str) -> String {
    if log_level.contains('=') || log_level.contains(',') {
        return log_level.to_owned();
    }
    let mut directives = String::from("warn");
    for target in SERVICE_TARGETS {
        directives.push_str(&format!(",{target}={log_level}"));
    }
    directives
}

pub fn init(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => {
            let directives = service_directives(&config.log_level);
            EnvFilter::try_new(&directives).map_err(|source| TelemetryError::Filter {
                directives,
                source,
            })?
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .with_ansi(false)
        .try_init()
        .map_err(TelemetryError::Init)
}

#[cfg(test)]
mod tests {
    use super::service_directives;

    #[test]
    fn bare_level_is_scoped_to_the_service_crates() {
        assert_eq!(
            service_directives("debug"),
            "warn,faculty_flow=debug,faculty_flow_api=debug"
        );
    }

    #[test]
    fn directive_strings_pass_through_unchanged() {
        assert_eq!(
            service_directives("faculty_flow=trace,axum=warn"),
            "faculty_flow=trace,axum=warn"
        );
    }
}
