//! Channel configuration
//!
//! Init-time options come from `key=value` properties, from a channel URL
//! (`sqlite://path;bulk-size=100;journal=wal`) or from any serde format
//! using kebab-case keys. Open-time parameters select what to replay.

use serde::{Deserialize, Serialize};
use sqlbridge_core::{parse_bool, Error, IndexPolicy, Result};
use sqlbridge_storage::{JournalMode, StoreConfig};
use std::fmt;
use std::str::FromStr;
use tracing::warn;

/// Input/output capabilities of a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    /// Replay only
    #[serde(rename = "r")]
    Read,
    /// Writes only
    #[serde(rename = "w")]
    Write,
    /// Both
    #[serde(rename = "rw")]
    ReadWrite,
}

impl Direction {
    /// Channel may replay
    pub fn is_readable(&self) -> bool {
        matches!(self, Direction::Read | Direction::ReadWrite)
    }

    /// Channel may write
    pub fn is_writable(&self) -> bool {
        matches!(self, Direction::Write | Direction::ReadWrite)
    }
}

impl FromStr for Direction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "r" | "in" => Ok(Direction::Read),
            "w" | "out" => Ok(Direction::Write),
            "rw" | "inout" => Ok(Direction::ReadWrite),
            other => Err(Error::config(
                "dir",
                format!("invalid direction '{}', expected r, w or rw", other),
            )),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Direction::Read => "r",
            Direction::Write => "w",
            Direction::ReadWrite => "rw",
        })
    }
}

fn bool_value(key: &str, value: &str) -> Result<bool> {
    parse_bool(value).ok_or_else(|| {
        Error::config(key, format!("invalid bool '{}', expected true/false/yes/no/1/0", value))
    })
}

/// Parsed channel URL: `proto://host;key=value;...`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelUrl {
    /// Protocol (`sqlite`, `jsqlite`)
    pub proto: String,
    /// Database path
    pub host: String,
    /// Properties in declaration order
    pub props: Vec<(String, String)>,
}

impl ChannelUrl {
    /// Split a URL into protocol, host and properties
    pub fn parse(url: &str) -> Result<Self> {
        let (proto, rest) = url
            .split_once("://")
            .ok_or_else(|| Error::config("url", format!("missing '://' in '{}'", url)))?;
        let mut parts = rest.split(';');
        let host = parts.next().unwrap_or_default().to_string();
        let mut props = Vec::new();
        for part in parts.filter(|p| !p.is_empty()) {
            let (k, v) = part.split_once('=').ok_or_else(|| {
                Error::config("url", format!("property '{}' is not key=value", part))
            })?;
            props.push((k.trim().to_string(), v.trim().to_string()));
        }
        Ok(ChannelUrl {
            proto: proto.to_string(),
            host,
            props,
        })
    }
}

/// Init-time channel configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ChannelConfig {
    /// Database path, `:memory:` for a private in-memory database
    pub path: String,
    /// Write and catalog settings
    #[serde(flatten)]
    pub store: StoreConfig,
    /// Shared table of the structured-text channel
    #[serde(default)]
    pub table: Option<String>,
    /// Close the structured-text channel once replay is exhausted
    #[serde(default)]
    pub autoclose: bool,
    /// Capabilities; each channel has its own default
    #[serde(default)]
    pub dir: Option<Direction>,
}

impl ChannelConfig {
    /// Configuration for the database at `path` with default settings
    pub fn new(path: impl Into<String>) -> Self {
        ChannelConfig {
            path: path.into(),
            store: StoreConfig::default(),
            table: None,
            autoclose: false,
            dir: None,
        }
    }

    /// Build from a URL; the host part is the path
    pub fn from_url(url: &ChannelUrl) -> Result<Self> {
        Self::new(url.host.clone()).with_props(url.props.iter().map(|(k, v)| (k.as_str(), v.as_str())))
    }

    /// Apply `key=value` properties; unknown keys are logged and ignored
    pub fn with_props<'a, I>(mut self, props: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        for (key, value) in props {
            match key {
                "path" => self.path = value.to_string(),
                "replace" => self.store.replace = bool_value(key, value)?,
                "seq-index" => {
                    self.store.seq_index = value.parse::<IndexPolicy>().map_err(|e| Error::config(key, e))?
                }
                "bulk-size" => {
                    self.store.bulk_size = value.parse().map_err(|e| {
                        Error::config(key, format!("invalid size '{}': {}", value, e))
                    })?
                }
                "journal" => self.store.journal = value.parse::<JournalMode>()?,
                "table" => self.table = Some(value.to_string()),
                "autoclose" => self.autoclose = bool_value(key, value)?,
                "dir" => self.dir = Some(value.parse()?),
                other => {
                    warn!(target: "sqlbridge::channel", key = other, value, "Unknown option ignored")
                }
            }
        }
        Ok(self)
    }

    /// Set the shared table name
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    /// Set the batch commit threshold
    pub fn with_bulk_size(mut self, bulk_size: usize) -> Self {
        self.store.bulk_size = bulk_size;
        self
    }

    /// Set the journal mode
    pub fn with_journal(mut self, journal: JournalMode) -> Self {
        self.store.journal = journal;
        self
    }

    /// Set the sequence column index policy
    pub fn with_seq_index(mut self, policy: IndexPolicy) -> Self {
        self.store.seq_index = policy;
        self
    }

    /// Use upsert-by-replace
    pub fn with_replace(mut self, replace: bool) -> Self {
        self.store.replace = replace;
        self
    }

    /// Close after replay exhausts
    pub fn with_autoclose(mut self, autoclose: bool) -> Self {
        self.autoclose = autoclose;
        self
    }

    /// Set the capabilities
    pub fn with_dir(mut self, dir: Direction) -> Self {
        self.dir = Some(dir);
        self
    }

    /// Check values that do not depend on the channel kind
    pub fn validate(&self) -> Result<()> {
        if self.path.is_empty() {
            return Err(Error::config("path", "database path is empty"));
        }
        if let Some(table) = &self.table {
            if table.is_empty() {
                return Err(Error::config("table", "table name is empty"));
            }
        }
        Ok(())
    }
}

/// Open-time parameters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenParams {
    /// Table to replay (structured mode)
    #[serde(default)]
    pub table: Option<String>,
    /// Message name filter (structured-text mode)
    #[serde(default)]
    pub query: Option<String>,
    /// `query.<path>` equality filters, in declaration order
    #[serde(default)]
    pub filters: Vec<(String, String)>,
}

impl OpenParams {
    /// No replay
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `table`, `query` and `query.<path>` properties
    pub fn from_props<'a, I>(props: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut params = OpenParams::default();
        for (key, value) in props {
            match key {
                "table" => params.table = Some(value.to_string()),
                "query" => params.query = Some(value.to_string()),
                _ => match key.strip_prefix("query.") {
                    Some("") => return Err(Error::config(key, "empty query path")),
                    Some(path) => params.filters.push((path.to_string(), value.to_string())),
                    None => {
                        warn!(target: "sqlbridge::channel", key, value, "Unknown open parameter ignored")
                    }
                },
            }
        }
        Ok(params)
    }

    /// Replay `table`
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    /// Replay only messages named `name`
    pub fn with_query(mut self, name: impl Into<String>) -> Self {
        self.query = Some(name.into());
        self
    }

    /// Add a path equality filter
    pub fn with_filter(mut self, path: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.push((path.into(), value.into()));
        self
    }
}
