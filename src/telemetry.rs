use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Registry;

const DEFAULT_LEVEL: &str = "INFO";

/// Installs the global subscriber.
///
/// `RUST_LOG` wins when set. Otherwise `level` is used, given either as a numeric container
/// log level (10 debug through 50 critical) or by name. Calling this twice is harmless.
pub fn init_logging(level: Option<&str>) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let directive = level.and_then(level_directive).unwrap_or(DEFAULT_LEVEL);
        EnvFilter::new(directive)
    });

    let _ = Registry::default()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

/// Maps a container log level to a `tracing` level directive.
pub fn level_directive(level: &str) -> Option<&'static str> {
    let directive = match level.trim().to_ascii_lowercase().as_str() {
        "0" | "notset" | "trace" => "TRACE",
        "10" | "debug" => "DEBUG",
        "20" | "info" => "INFO",
        "30" | "warn" | "warning" => "WARN",
        "40" | "50" | "error" | "critical" | "fatal" => "ERROR",
        _ => return None,
    };
    Some(directive)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn container_levels() {
        assert_eq!(level_directive("10"), Some("DEBUG"));
        assert_eq!(level_directive("20"), Some("INFO"));
        assert_eq!(level_directive("Warning"), Some("WARN"));
        assert_eq!(level_directive("50"), Some("ERROR"));
        assert_eq!(level_directive("loud"), None);
    }

    #[test]
    fn repeated_init_does_not_panic() {
        init_logging(Some("debug"));
        init_logging(None);
    }
}
