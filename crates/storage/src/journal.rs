//! Journal mode configuration
//!
//! Controls the SQLite journal (`default` rollback journal or `wal`).

use serde::{Deserialize, Serialize};
use sqlbridge_core::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// Journal mode applied when the connection is opened
///
/// # Modes
///
/// | Mode | Readers during a batch | Commit cost |
/// |------|------------------------|-------------|
/// | Default | blocked at commit | journal rewrite |
/// | Wal | never blocked | append to WAL |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JournalMode {
    /// Engine default (rollback journal)
    #[default]
    Default,
    /// Write-ahead log
    Wal,
}

impl JournalMode {
    /// Pragma value to apply, `None` to leave the engine default
    pub fn pragma_value(&self) -> Option<&'static str> {
        match self {
            JournalMode::Default => None,
            JournalMode::Wal => Some("wal"),
        }
    }

    /// Human-readable description of the mode
    pub fn description(&self) -> &'static str {
        match self {
            JournalMode::Default => "Default (rollback journal)",
            JournalMode::Wal => "WAL (concurrent readers during batches)",
        }
    }
}

impl FromStr for JournalMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "default" => Ok(JournalMode::Default),
            "wal" => Ok(JournalMode::Wal),
            other => Err(Error::config(
                "journal",
                format!("invalid journal mode '{}', expected default or wal", other),
            )),
        }
    }
}

impl fmt::Display for JournalMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JournalMode::Default => write!(f, "default"),
            JournalMode::Wal => write!(f, "wal"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_journal_mode() {
        assert_eq!("wal".parse::<JournalMode>().unwrap(), JournalMode::Wal);
        assert_eq!(
            "default".parse::<JournalMode>().unwrap(),
            JournalMode::Default
        );
        let err = "delete".parse::<JournalMode>().unwrap_err();
        assert!(err.to_string().contains("journal"));
    }

    #[test]
    fn test_pragma_value() {
        assert_eq!(JournalMode::Default.pragma_value(), None);
        assert_eq!(JournalMode::Wal.pragma_value(), Some("wal"));
    }

    #[test]
    fn test_default_is_rollback_journal() {
        assert_eq!(JournalMode::default(), JournalMode::Default);
        assert!(JournalMode::Wal.description().contains("WAL"));
    }
}
