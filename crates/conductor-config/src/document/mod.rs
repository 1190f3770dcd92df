//! Handler document parsing.
//!
//! A document is either a YAML file whose top level is the conductor section,
//! or a TOML file carrying a `[conductor]`, `[tool.conductor]`, or
//! `[package.metadata.conductor]` table. Both formats are reduced to the same
//! raw entries so that validation is shared.

mod remote;

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::de::{self, MapAccess, Visitor, value::MapAccessDeserializer};
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

pub use self::remote::RemoteSpec;
use crate::condition::ConditionSpec;
use crate::defaults::{CONFIG_FILE_CANDIDATES, CONFIG_SECTION};
use crate::error::ConfigError;
use crate::options::{Options, value_kind};

const TOML_SECTION_PATHS: &[&[&str]] = &[
    &[CONFIG_SECTION],
    &["tool", CONFIG_SECTION],
    &["package", "metadata", CONFIG_SECTION],
];

/// Where a handler's code comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerSource {
    /// A file or directory on the local filesystem.
    Local {
        /// Absolute or document-relative path, already resolved against the
        /// document's directory.
        path: PathBuf,
    },
    /// A revision of a remote git repository.
    Remote(RemoteSpec),
}

/// One validated entry of the `handlers` list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerDescriptor {
    name: String,
    source: HandlerSource,
    conditions: BTreeMap<String, ConditionSpec>,
}

impl HandlerDescriptor {
    /// Creates a descriptor with no configuration-level conditions.
    #[must_use]
    pub fn new(name: impl Into<String>, source: HandlerSource) -> Self {
        Self {
            name: name.into(),
            source,
            conditions: BTreeMap::new(),
        }
    }

    /// Attaches a condition for `event`, replacing any previous one.
    #[must_use]
    pub fn with_condition(mut self, event: impl Into<String>, spec: ConditionSpec) -> Self {
        self.conditions.insert(event.into(), spec);
        self
    }

    /// Logical handler name, unique within one document.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared source of the handler's code.
    #[must_use]
    pub const fn source(&self) -> &HandlerSource {
        &self.source
    }

    /// Condition declared in the document for `event`, if any.
    #[must_use]
    pub fn condition_for(&self, event: &str) -> Option<&ConditionSpec> {
        self.conditions.get(event)
    }
}

/// A parsed and validated handler document.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigDocument {
    path: PathBuf,
    handlers: Vec<HandlerDescriptor>,
    options: Options,
}

impl ConfigDocument {
    /// Reads and validates the document at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file is missing, unreadable, in an
    /// unknown format, or fails validation.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let format = DocumentFormat::detect(path)?;
        let text = fs::read_to_string(path).map_err(|source| {
            if source.kind() == io::ErrorKind::NotFound {
                ConfigError::FileNotFound {
                    path: path.to_path_buf(),
                }
            } else {
                ConfigError::Read {
                    path: path.to_path_buf(),
                    source: Arc::new(source),
                }
            }
        })?;
        match format {
            DocumentFormat::Yaml => Self::from_yaml_str(&text, path),
            DocumentFormat::Toml => Self::from_toml_str(&text, path),
        }
    }

    /// Parses YAML text as though it were read from `path`.
    ///
    /// `path` is only used for diagnostics and to resolve relative local
    /// handler paths against its parent directory. Handler entries are
    /// decoded straight into typed fields, so plain scalars such as `on` or
    /// `1.10` keep their text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the text is not YAML or fails validation.
    pub fn from_yaml_str(text: &str, path: &Path) -> Result<Self, ConfigError> {
        let root: Value = serde_saphyr::from_str(text).map_err(|err| parse_error(path, &err))?;
        let section = match root {
            Value::Null => return Err(missing_section(path)),
            Value::Object(section) => section,
            other => {
                return Err(ConfigError::Parse {
                    path: path.to_path_buf(),
                    message: format!(
                        "expected a mapping at top level, found {}",
                        value_kind(&other)
                    ),
                });
            }
        };
        for (index, entry) in handler_values(&section)?.iter().enumerate() {
            check_entry_shape(index, entry)?;
        }

        let typed: YamlSection =
            serde_saphyr::from_str(text).map_err(|err| parse_error(path, &err))?;
        let entries = typed
            .handlers
            .unwrap_or_default()
            .into_iter()
            .map(RawEntry::from)
            .collect();
        Self::from_entries(entries, typed.options.unwrap_or(Value::Null), path)
    }

    /// Parses TOML text as though it were read from `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the text is not TOML, carries no conductor
    /// table, or fails validation.
    pub fn from_toml_str(text: &str, path: &Path) -> Result<Self, ConfigError> {
        let root: Value = toml::from_str(text).map_err(|err| parse_error(path, &err))?;
        let section = TOML_SECTION_PATHS
            .iter()
            .find_map(|keys| lookup_table(&root, keys))
            .ok_or_else(|| missing_section(path))?;
        let entries = handler_values(&section)?
            .iter()
            .cloned()
            .enumerate()
            .map(|(index, entry)| raw_entry(index, entry))
            .collect::<Result<Vec<_>, _>>()?;
        let options = section.get("options").cloned().unwrap_or(Value::Null);
        Self::from_entries(entries, options, path)
    }

    fn from_entries(entries: Vec<RawEntry>, options: Value, path: &Path) -> Result<Self, ConfigError> {
        let base_dir = path.parent().unwrap_or_else(|| Path::new(""));
        let options = Options::from_value(options)?;

        let mut seen = HashSet::new();
        let mut handlers = Vec::with_capacity(entries.len());
        for (index, raw) in entries.into_iter().enumerate() {
            let descriptor = build_descriptor(index, raw, base_dir)?;
            if !seen.insert(descriptor.name.clone()) {
                return Err(ConfigError::DuplicateName {
                    name: descriptor.name,
                });
            }
            handlers.push(descriptor);
        }

        Ok(Self {
            path: path.to_path_buf(),
            handlers,
            options,
        })
    }

    /// Path the document was read from.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Handlers in declaration order.
    #[must_use]
    pub fn handlers(&self) -> &[HandlerDescriptor] {
        &self.handlers
    }

    /// The document's `options` mapping.
    #[must_use]
    pub const fn options(&self) -> &Options {
        &self.options
    }
}

/// Finds the configuration file to load.
///
/// An explicit path is resolved against `cwd` and must exist. Otherwise the
/// [`CONFIG_FILE_CANDIDATES`] are probed in order inside `cwd`.
///
/// # Errors
///
/// Returns [`ConfigError::FileNotFound`] for a missing explicit path and
/// [`ConfigError::NoConfigFile`] when no candidate exists.
pub fn locate(explicit: Option<&Path>, cwd: &Path) -> Result<PathBuf, ConfigError> {
    if let Some(path) = explicit {
        let resolved = cwd.join(path);
        if resolved.is_file() {
            return Ok(resolved);
        }
        return Err(ConfigError::FileNotFound { path: resolved });
    }
    CONFIG_FILE_CANDIDATES
        .iter()
        .map(|candidate| cwd.join(candidate))
        .find(|candidate| candidate.is_file())
        .ok_or_else(|| ConfigError::NoConfigFile {
            directory: cwd.to_path_buf(),
        })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DocumentFormat {
    Yaml,
    Toml,
}

impl DocumentFormat {
    fn detect(path: &Path) -> Result<Self, ConfigError> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);
        match extension.as_deref() {
            Some("yaml" | "yml") => Ok(Self::Yaml),
            Some("toml") => Ok(Self::Toml),
            _ => Err(ConfigError::UnsupportedFormat {
                path: path.to_path_buf(),
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawEntry {
    #[serde(default)]
    name: Option<String>,
    #[serde(default, alias = "local")]
    path: Option<String>,
    #[serde(default, alias = "remote")]
    git: Option<RemoteSpec>,
    #[serde(default)]
    conditions: BTreeMap<String, ConditionSpec>,
}

impl RawEntry {
    fn local(path: String) -> Self {
        Self {
            name: None,
            path: Some(path),
            git: None,
            conditions: BTreeMap::new(),
        }
    }
}

impl From<YamlEntry> for RawEntry {
    fn from(entry: YamlEntry) -> Self {
        match entry {
            YamlEntry::Path(path) => Self::local(path),
            YamlEntry::Mapping(raw) => raw,
        }
    }
}

#[derive(Debug, Deserialize)]
struct YamlSection {
    #[serde(default)]
    handlers: Option<Vec<YamlEntry>>,
    #[serde(default)]
    options: Option<Value>,
}

/// A `handlers` item: a bare path or a mapping.
///
/// Not `#[serde(untagged)]`: buffering the item would re-infer the types of
/// its plain scalars.
#[derive(Debug)]
enum YamlEntry {
    Path(String),
    Mapping(RawEntry),
}

impl<'de> Deserialize<'de> for YamlEntry {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(YamlEntryVisitor)
    }
}

struct YamlEntryVisitor;

impl<'de> Visitor<'de> for YamlEntryVisitor {
    type Value = YamlEntry;

    fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("a handler path or mapping")
    }

    fn visit_str<E: de::Error>(self, text: &str) -> Result<Self::Value, E> {
        Ok(YamlEntry::Path(text.to_owned()))
    }

    fn visit_string<E: de::Error>(self, text: String) -> Result<Self::Value, E> {
        Ok(YamlEntry::Path(text))
    }

    fn visit_map<A: MapAccess<'de>>(self, map: A) -> Result<Self::Value, A::Error> {
        RawEntry::deserialize(MapAccessDeserializer::new(map)).map(YamlEntry::Mapping)
    }
}

fn handler_values(section: &Map<String, Value>) -> Result<&[Value], ConfigError> {
    match section.get("handlers") {
        None | Some(Value::Null) => Ok(&[]),
        Some(Value::Array(entries)) => Ok(entries),
        Some(other) => Err(ConfigError::InvalidSection {
            key: "handlers",
            message: format!("expected a list, found {}", value_kind(other)),
        }),
    }
}

fn check_entry_shape(index: usize, entry: &Value) -> Result<(), ConfigError> {
    match entry {
        Value::String(_) | Value::Object(_) => Ok(()),
        other => Err(ConfigError::InvalidEntry {
            index,
            message: format!("expected a path or a mapping, found {}", value_kind(other)),
        }),
    }
}

fn raw_entry(index: usize, entry: Value) -> Result<RawEntry, ConfigError> {
    check_entry_shape(index, &entry)?;
    match entry {
        Value::String(path) => Ok(RawEntry::local(path)),
        other => serde_json::from_value(other).map_err(|err| ConfigError::InvalidEntry {
            index,
            message: err.to_string(),
        }),
    }
}

fn build_descriptor(
    index: usize,
    raw: RawEntry,
    base_dir: &Path,
) -> Result<HandlerDescriptor, ConfigError> {
    let name = raw.name.unwrap_or_else(|| format!("package_{index}"));
    validate_name(&name)?;

    let source = match (raw.path, raw.git) {
        (Some(path), None) => HandlerSource::Local {
            path: resolve_local_path(index, &path, base_dir)?,
        },
        (None, Some(remote)) => HandlerSource::Remote(remote),
        (None, None) => return Err(ConfigError::MissingSource { index }),
        (Some(_), Some(_)) => return Err(ConfigError::ConflictingSources { index }),
    };

    Ok(HandlerDescriptor {
        name,
        source,
        conditions: raw.conditions,
    })
}

fn validate_name(name: &str) -> Result<(), ConfigError> {
    let reason = if name.trim().is_empty() {
        Some("name must not be empty")
    } else if name == "." || name == ".." {
        Some("name must not be a relative path component")
    } else if name.contains(['/', '\\']) {
        Some("name must not contain path separators")
    } else {
        None
    };
    reason.map_or(Ok(()), |why| {
        Err(ConfigError::InvalidName {
            name: name.to_owned(),
            reason: why,
        })
    })
}

fn resolve_local_path(index: usize, raw: &str, base_dir: &Path) -> Result<PathBuf, ConfigError> {
    if raw.trim().is_empty() {
        return Err(ConfigError::InvalidEntry {
            index,
            message: String::from("handler path must not be empty"),
        });
    }
    let expanded = expand_home(raw);
    if expanded.is_absolute() {
        Ok(expanded)
    } else {
        Ok(base_dir.join(expanded))
    }
}

pub(crate) fn expand_home(raw: &str) -> PathBuf {
    match (raw.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(raw),
    }
}

fn lookup_table(root: &Value, keys: &[&str]) -> Option<Map<String, Value>> {
    keys.iter()
        .try_fold(root, |current, key| current.get(*key))
        .and_then(Value::as_object)
        .cloned()
}

fn parse_error(path: &Path, err: &impl fmt::Display) -> ConfigError {
    ConfigError::Parse {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}

fn missing_section(path: &Path) -> ConfigError {
    ConfigError::MissingSection {
        path: path.to_path_buf(),
        section: CONFIG_SECTION,
    }
}
