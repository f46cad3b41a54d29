//! Stack trace sinks.
//!
//! Destinations are `log` (events go through `tracing` under the
//! `chipctl::trace` target) and `json:<path>` (one JSON object per line).

use chipctl_core::{ChipError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// One recorded trace event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEvent {
    /// When the event was recorded
    pub timestamp: DateTime<Utc>,
    /// Event name
    pub event: String,
    /// Event payload
    pub fields: serde_json::Value,
}

enum TraceSink {
    Log,
    Json {
        path: PathBuf,
        writer: BufWriter<File>,
    },
}

impl TraceSink {
    fn describe(&self) -> String {
        match self {
            Self::Log => "log".to_string(),
            Self::Json { path, .. } => format!("json:{}", path.display()),
        }
    }
}

/// Active trace destinations
#[derive(Default)]
pub struct TracingSetup {
    sinks: Vec<TraceSink>,
}

impl TracingSetup {
    /// No destination enabled
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable a destination given as `log` or `json:<path>`
    pub fn enable_tracing_for(&mut self, destination: &str) -> Result<()> {
        let sink = match destination.split_once(':') {
            None if destination == "log" => TraceSink::Log,
            Some(("json", path)) if !path.is_empty() => {
                let path = PathBuf::from(path);
                let file = File::create(&path).map_err(|e| {
                    ChipError::InvalidArgument(format!("trace file {}: {e}", path.display()))
                })?;
                TraceSink::Json {
                    path,
                    writer: BufWriter::new(file),
                }
            }
            _ => {
                return Err(ChipError::InvalidArgument(format!(
                    "unknown trace destination: {destination} (expected log or json:<path>)"
                )))
            }
        };

        debug!(destination = %sink.describe(), "trace destination enabled");
        self.sinks.push(sink);
        Ok(())
    }

    /// Enable JSON tracing into a file, the `--trace-file` shorthand
    pub fn enable_trace_file(&mut self, path: &Path) -> Result<()> {
        self.enable_tracing_for(&format!("json:{}", path.display()))
    }

    /// Returns true if any destination is enabled
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        !self.sinks.is_empty()
    }

    /// Enabled destinations in the form they were given
    #[must_use]
    pub fn destinations(&self) -> Vec<String> {
        self.sinks.iter().map(TraceSink::describe).collect()
    }

    /// Send an event to every destination
    pub fn record(&mut self, event: &str, fields: serde_json::Value) {
        if self.sinks.is_empty() {
            return;
        }
        let entry = TraceEvent {
            timestamp: Utc::now(),
            event: event.to_string(),
            fields,
        };
        for sink in &mut self.sinks {
            match sink {
                TraceSink::Log => {
                    info!(target: "chipctl::trace", event = %entry.event, fields = %entry.fields);
                }
                TraceSink::Json { path, writer } => {
                    let written = serde_json::to_writer(&mut *writer, &entry)
                        .map_err(std::io::Error::from)
                        .and_then(|()| writer.write_all(b"\n"));
                    if let Err(e) = written {
                        debug!(path = %path.display(), error = %e, "dropping trace event");
                    }
                }
            }
        }
    }

    /// Flush and close every destination
    pub fn stop(&mut self) -> Result<()> {
        let mut first_error = None;
        for sink in self.sinks.drain(..) {
            if let TraceSink::Json { mut writer, .. } = sink {
                if let Err(e) = writer.flush() {
                    first_error.get_or_insert(ChipError::Io(e));
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_json_sink_writes_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("trace.jsonl");

        let mut tracing = TracingSetup::new();
        tracing.enable_trace_file(&path).unwrap();
        tracing.enable_tracing_for("log").unwrap();
        assert_eq!(tracing.destinations().len(), 2);

        tracing.record("stack_up", json!({ "paa_count": 1 }));
        tracing.record("teardown", json!({}));
        tracing.stop().unwrap();
        assert!(!tracing.is_enabled());

        let content = std::fs::read_to_string(&path).unwrap();
        let events: Vec<TraceEvent> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event, "stack_up");
        assert_eq!(events[0].fields["paa_count"], 1);
    }

    #[test]
    fn test_unknown_destination() {
        let mut tracing = TracingSetup::new();
        for bad in ["perfetto", "json:", "json"] {
            assert!(matches!(
                tracing.enable_tracing_for(bad),
                Err(ChipError::InvalidArgument(_))
            ));
        }
        assert!(!tracing.is_enabled());
    }
}
