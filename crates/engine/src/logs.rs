use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::str::FromStr;

use crate::EngineError;

pub const DEFAULT_LOG_CAPACITY: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Uppercase label used in exported text.
    pub fn label(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for LogLevel {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            // "warning" kept as an alias for callers using the long form
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(EngineError::Config(format!("invalid log level '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: u64,
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    /// Free-text origin tag (step id, service name). Not a foreign key.
    pub source: String,
}

#[derive(Debug, Clone, Default)]
pub struct LogFilter {
    pub source: Option<String>,
    pub levels: Option<HashSet<LogLevel>>,
    pub search_term: Option<String>,
}

/// Bounded in-memory log ring, newest first. Session scoped; eviction is
/// pure FIFO by recency once the capacity is exceeded.
pub struct LogStore {
    entries: VecDeque<LogEntry>,
    capacity: usize,
    next_id: u64,
}

impl LogStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(DEFAULT_LOG_CAPACITY)),
            capacity: capacity.max(1),
            next_id: 1,
        }
    }

    /// Assigns the entry id, prepends, and truncates to capacity.
    pub fn append(
        &mut self,
        level: LogLevel,
        source: impl Into<String>,
        message: impl Into<String>,
    ) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.entries.push_front(LogEntry {
            id,
            timestamp: Utc::now(),
            level,
            message: message.into(),
            source: source.into(),
        });
        self.entries.truncate(self.capacity);
        id
    }

    /// Pure filter over the retained entries, newest first.
    pub fn query(&self, filter: &LogFilter) -> Vec<&LogEntry> {
        self.entries
            .iter()
            .filter(|e| Self::matches(e, filter))
            .collect()
    }

    fn matches(entry: &LogEntry, filter: &LogFilter) -> bool {
        if let Some(source) = &filter.source {
            if &entry.source != source {
                return false;
            }
        }
        if let Some(levels) = &filter.levels {
            if !levels.contains(&entry.level) {
                return false;
            }
        }
        if let Some(term) = &filter.search_term {
            if !entry
                .message
                .to_lowercase()
                .contains(&term.to_lowercase())
            {
                return false;
            }
        }
        true
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Flat text rendering of the filtered entries, one line each, in the
    /// same order `query` returns.
    pub fn export(&self, filter: &LogFilter) -> String {
        self.query(filter)
            .iter()
            .map(|e| format!("[{}] [{}] {}", e.timestamp.to_rfc3339(), e.level.label(), e.message))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for LogStore {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retention_keeps_only_the_newest_entries() {
        let mut store = LogStore::new(3);
        for i in 1..=5 {
            store.append(LogLevel::Info, "test", format!("entry {}", i));
        }
        let ids: Vec<u64> = store.query(&LogFilter::default()).iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![5, 4, 3]);
    }

    #[test]
    fn query_filters_by_exact_source() {
        let mut store = LogStore::new(10);
        store.append(LogLevel::Info, "setup", "a");
        store.append(LogLevel::Info, "questions", "b");
        store.append(LogLevel::Info, "setup", "c");

        let filter = LogFilter {
            source: Some("setup".to_string()),
            ..Default::default()
        };
        let hits = store.query(&filter);
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|e| e.source == "setup"));
        // newest first, relative order preserved
        assert_eq!(hits[0].message, "c");
        assert_eq!(hits[1].message, "a");
    }

    #[test]
    fn query_filters_by_level_set() {
        let mut store = LogStore::new(10);
        store.append(LogLevel::Debug, "s", "d");
        store.append(LogLevel::Info, "s", "i");
        store.append(LogLevel::Error, "s", "e");

        let filter = LogFilter {
            levels: Some([LogLevel::Error, LogLevel::Info].into_iter().collect()),
            ..Default::default()
        };
        let hits = store.query(&filter);
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|e| e.level != LogLevel::Debug));
    }

    #[test]
    fn search_is_case_insensitive() {
        let mut store = LogStore::new(10);
        store.append(LogLevel::Info, "s", "Training FAILED badly");
        store.append(LogLevel::Info, "s", "all good");

        let filter = LogFilter {
            search_term: Some("failed".to_string()),
            ..Default::default()
        };
        assert_eq!(store.query(&filter).len(), 1);
    }

    #[test]
    fn export_renders_one_line_per_entry() {
        let mut store = LogStore::new(10);
        store.append(LogLevel::Warn, "s", "first");
        store.append(LogLevel::Error, "s", "second");

        let text = store.export(&LogFilter::default());
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("[ERROR] second"));
        assert!(lines[1].contains("[WARN] first"));
        assert!(lines[0].starts_with('['));
    }

    #[test]
    fn clear_empties_the_store() {
        let mut store = LogStore::new(10);
        store.append(LogLevel::Info, "s", "x");
        store.clear();
        assert!(store.is_empty());
    }

    #[test]
    fn warning_parses_as_warn() {
        assert_eq!("warning".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert_eq!("warn".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert!("fatal".parse::<LogLevel>().is_err());
    }
}
