//! Configuration model shared by the conductor engine and CLI.
//!
//! The crate parses the handler document (YAML or TOML) into ordered
//! [`HandlerDescriptor`] values, carries the free-form [`Options`] tree that
//! is merged with `-o key=value` overrides, and exposes the logging settings
//! and default paths the binary needs. Parsing never touches the filesystem
//! beyond reading the document itself; acquisition and staging live in
//! `conductor-handlers`.

mod condition;
mod defaults;
mod document;
mod error;
mod logging;
mod options;

pub use condition::ConditionSpec;
pub use defaults::{
    CACHE_DIR_ENV, CONFIG_FILE_CANDIDATES, CONFIG_SECTION, DEFAULT_LOCAL_EVENT,
    DEFAULT_LOG_FILTER, LOG_FILTER_ENV, LOG_FORMAT_ENV, TEMP_DIR_ENV, default_cache_root,
    default_log_format, verbosity_filter,
};
pub use document::{ConfigDocument, HandlerDescriptor, HandlerSource, RemoteSpec, locate};
pub use error::ConfigError;
pub use logging::LogFormat;
pub use options::Options;
