//! Structured logging for allow/block decisions.
//!
//! Decisions are appended to an operator-configured log file in text or
//! JSON lines format. The log is a diagnostic side channel: it never feeds
//! back into evaluation, and logging failures never affect the verdict.

use crate::guard::CheckResult;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::PathBuf;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// One decision record, as serialized in JSON mode.
#[derive(Debug, Serialize)]
struct DecisionRecord<'a> {
    timestamp: String,
    decision: &'static str,
    command: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    rule: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<&'a str>,
}

/// Append-only decision log bound to a file path.
#[derive(Debug, Clone)]
pub struct DecisionLog {
    path: PathBuf,
    format: LogFormat,
}

impl DecisionLog {
    /// Build a log from an operator-supplied path (with `~` expansion) and
    /// format. Returns `None` when logging is not configured.
    #[must_use]
    pub fn new(log_file: Option<&str>, format: LogFormat) -> Option<Self> {
        let raw = log_file?;
        Some(Self {
            path: expand_tilde(raw),
            format,
        })
    }

    /// Append one decision.
    ///
    /// # Errors
    ///
    /// Returns any I/O error from creating the parent directory or appending
    /// to the file. Callers treat failures as non-fatal.
    pub fn append(&self, command: &str, result: &CheckResult) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        let record = DecisionRecord {
            timestamp: Utc::now().to_rfc3339(),
            decision: if result.blocked { "block" } else { "allow" },
            command,
            rule: result.rule_name(),
            reason: result.reason(),
        };

        match self.format {
            LogFormat::Json => {
                serde_json::to_writer(&mut file, &record).map_err(io::Error::other)?;
                writeln!(file)
            }
            LogFormat::Text => match (record.rule, record.reason) {
                (Some(rule), Some(reason)) => writeln!(
                    file,
                    "[{}] {} [{}] {}\n  Command: {}",
                    record.timestamp, record.decision, rule, reason, command
                ),
                _ => writeln!(
                    file,
                    "[{}] {} Command: {}",
                    record.timestamp, record.decision, command
                ),
            },
        }
    }
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::Rule;

    fn blocked_result() -> CheckResult {
        CheckResult::blocked_by(&Rule {
            name: "rm-recursive-force".into(),
            reason: "recursive force delete".into(),
            ..Rule::default()
        })
    }

    #[test]
    fn test_unconfigured_log_is_none() {
        assert!(DecisionLog::new(None, LogFormat::Text).is_none());
    }

    #[test]
    fn test_text_append() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("decisions.log");
        let log = DecisionLog::new(path.to_str(), LogFormat::Text).unwrap();

        log.append("rm -rf /", &blocked_result()).unwrap();
        log.append("ls", &CheckResult::allowed()).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("block"));
        assert!(contents.contains("rm-recursive-force"));
        assert!(contents.contains("allow"));
    }

    #[test]
    fn test_json_append_is_parseable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("decisions.jsonl");
        let log = DecisionLog::new(path.to_str(), LogFormat::Json).unwrap();

        log.append("rm -rf /", &blocked_result()).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let line = contents.lines().next().unwrap();
        let value: serde_json::Value = serde_json::from_str(line).unwrap();
        assert_eq!(value["decision"], "block");
        assert_eq!(value["rule"], "rm-recursive-force");
    }

    #[test]
    fn test_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/deep/decisions.log");
        let log = DecisionLog::new(path.to_str(), LogFormat::Text).unwrap();
        log.append("ls", &CheckResult::allowed()).unwrap();
        assert!(path.exists());
    }
}
