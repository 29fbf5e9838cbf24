//! `LOG_LEVEL` handling.
//!
//! Level names are accepted case-insensitively, including the spellings used
//! by other tooling (`WARNING`, `CRITICAL`, `FATAL`, `NOTSET`). Full
//! `tracing` directives such as `imgrelay=debug,ureq=warn` work too.

use tracing_subscriber::EnvFilter;

pub const LOG_LEVEL_VAR: &str = "LOG_LEVEL";
const DEFAULT_LEVEL: &str = "info";

/// Map a level name onto the one `tracing` understands. Anything else is
/// returned unchanged.
pub fn normalize_level(level: &str) -> String {
    let known = match level.trim().to_ascii_lowercase().as_str() {
        "warning" | "warn" => "warn",
        "critical" | "fatal" | "error" => "error",
        "notset" | "all" | "trace" => "trace",
        "debug" => "debug",
        "info" => "info",
        "off" => "off",
        _ => return level.trim().to_owned(),
    };
    known.to_owned()
}

/// Normalize the level of every directive in a comma-separated filter.
pub fn normalize_directives(value: &str) -> String {
    value
        .split(',')
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(|directive| match directive.rsplit_once('=') {
            Some((target, level)) => format!("{target}={}", normalize_level(level)),
            None => normalize_level(directive),
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// Build the filter for `value`. Returns the filter and, when `value` could
/// not be parsed, the error to report once logging is up.
pub fn filter_for(value: Option<&str>) -> (EnvFilter, Option<String>) {
    let directives = value.map(normalize_directives).unwrap_or_default();
    if directives.is_empty() {
        return (EnvFilter::new(DEFAULT_LEVEL), None);
    }
    match EnvFilter::try_new(&directives) {
        Ok(filter) => (filter, None),
        Err(e) => (
            EnvFilter::new(DEFAULT_LEVEL),
            Some(format!("ignoring invalid {LOG_LEVEL_VAR} '{directives}': {e}")),
        ),
    }
}

pub fn init() {
    let value = std::env::var(LOG_LEVEL_VAR).ok();
    let (filter, problem) = filter_for(value.as_deref());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
    if let Some(problem) = problem {
        tracing::warn!("{problem}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_aliases() {
        assert_eq!(normalize_level("WARNING"), "warn");
        assert_eq!(normalize_level("Warn"), "warn");
        assert_eq!(normalize_level("CRITICAL"), "error");
        assert_eq!(normalize_level("fatal"), "error");
        assert_eq!(normalize_level("ERROR"), "error");
        assert_eq!(normalize_level("DEBUG"), "debug");
        assert_eq!(normalize_level(" info "), "info");
        assert_eq!(normalize_level("NOTSET"), "trace");
        assert_eq!(normalize_level("imgrelay::engine"), "imgrelay::engine");
    }

    #[test]
    fn directives_keep_targets() {
        assert_eq!(
            normalize_directives("imgrelay=WARNING, ureq=Critical,INFO"),
            "imgrelay=warn,ureq=error,info"
        );
        assert_eq!(normalize_directives(" , "), "");
    }

    #[test]
    fn filter_defaults_and_rejections() {
        let (filter, problem) = filter_for(None);
        assert_eq!(filter.to_string(), "info");
        assert!(problem.is_none());

        let (filter, problem) = filter_for(Some("WARNING"));
        assert_eq!(filter.to_string(), "warn");
        assert!(problem.is_none());

        let (filter, problem) = filter_for(Some("imgrelay=loud"));
        assert_eq!(filter.to_string(), "info");
        assert!(problem.unwrap().contains("LOG_LEVEL"));
    }
}
