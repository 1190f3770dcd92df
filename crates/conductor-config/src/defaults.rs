use std::env;
use std::path::PathBuf;

/// Default log filter expression used by the binary.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Environment variable overriding the log filter.
pub const LOG_FILTER_ENV: &str = "CONDUCTOR_LOG_FILTER";

/// Environment variable overriding the log format.
pub const LOG_FORMAT_ENV: &str = "CONDUCTOR_LOG_FORMAT";

/// Environment variable naming the base directory for the per-process temp dir.
pub const TEMP_DIR_ENV: &str = "CONDUCTOR_TEMP_DIR";

/// Environment variable overriding the persistent cache root.
pub const CACHE_DIR_ENV: &str = "CONDUCTOR_CACHE_DIR";

/// Section holding the handler document inside TOML files.
pub const CONFIG_SECTION: &str = "conductor";

/// Event name used when running outside CI without `--event`.
pub const DEFAULT_LOCAL_EVENT: &str = "push";

/// Files probed, in order, when no configuration path is supplied.
pub const CONFIG_FILE_CANDIDATES: &[&str] = &[
    "conductor.yaml",
    "conductor.yml",
    "conductor.toml",
    "Cargo.toml",
];

/// Default logging format for the binary.
#[must_use]
pub fn default_log_format() -> crate::logging::LogFormat {
    crate::logging::LogFormat::Compact
}

/// Maps a `-v` occurrence count onto a log filter preset.
#[must_use]
pub const fn verbosity_filter(count: u8) -> &'static str {
    match count {
        0 => DEFAULT_LOG_FILTER,
        1 => "info,conductor_handlers=debug,conductor_cli=debug",
        2 => "debug",
        _ => "trace",
    }
}

/// Computes the persistent cache root for fetched handler revisions.
///
/// Uses the platform cache directory when one is known and falls back to the
/// system temp directory otherwise.
#[must_use]
pub fn default_cache_root() -> PathBuf {
    dirs::cache_dir().map_or_else(
        || env::temp_dir().join("conductor-cache"),
        |dir| dir.join("conductor"),
    )
}
