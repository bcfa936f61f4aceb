use super::{EventCategory, EventEntry, EventStack, EventStackConfig};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use std::fmt::Write as _;
use std::fs;
use std::io;
use std::path::Path;

const EXPORT_HEADER: &str = "=== Railyard Event Log ===";
const SEPARATOR: &str = "==========================";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ExportedConfig<'a> {
    #[serde(flatten)]
    stack: &'a EventStackConfig,
    enabled_categories: Vec<EventCategory>,
}

/// One export line:
/// `[timestamp] [LEVEL] [CATEGORY] [type] message [source] | Context: {json}`.
pub fn format_entry(entry: &EventEntry) -> String {
    let mut line = format!(
        "[{}] [{}] [{}] [{}] {}",
        entry.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
        entry.level,
        entry.category,
        entry.event_type,
        entry.message
    );
    if let Some(source) = &entry.source {
        let _ = write!(line, " [{source}]");
    }
    if let Some(context) = &entry.context {
        let _ = write!(line, " | Context: {context}");
    }
    line
}

impl EventStack {
    pub fn export_text(&self) -> String {
        let config = ExportedConfig {
            stack: self.config(),
            enabled_categories: self.enabled_categories(),
        };
        let config = serde_json::to_string_pretty(&config).unwrap_or_else(|_| "{}".to_string());

        let mut out = String::new();
        let _ = writeln!(out, "{EXPORT_HEADER}");
        let _ = writeln!(
            out,
            "Exported: {}",
            Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
        );
        let _ = writeln!(out, "Total events: {}", self.len());
        let _ = writeln!(out, "Config: {config}");
        let _ = writeln!(out, "{SEPARATOR}");
        for entry in self.events() {
            let _ = writeln!(out, "{}", format_entry(entry));
        }
        out
    }

    pub fn write_export(&self, path: &Path) -> io::Result<()> {
        fs::write(path, self.export_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{LogLevel, LogRecord};
    use serde_json::json;

    #[test]
    fn entry_line_includes_source_and_context() {
        let mut stack = EventStack::default();
        stack.record(
            LogRecord::new(EventCategory::Combat, LogLevel::Warn, "hit", "turret struck enemy_4")
                .source("turret_2")
                .context(json!({ "damage": 5 })),
        );
        let entry = &stack.get_all_events()[0];

        let line = format_entry(entry);

        assert!(line.ends_with("[WARN] [COMBAT] [hit] turret struck enemy_4 [turret_2] | Context: {\"damage\":5}"));
        assert!(line.starts_with('['));
        assert!(line.contains('T') && line.contains("Z]"));
    }

    #[test]
    fn export_lists_header_then_entries() {
        let mut stack = EventStack::default();
        stack.info(EventCategory::Train, "departed", "train_1 left station_1");
        stack.info(EventCategory::Station, "opened", "station_2 opened");

        let text = stack.export_text();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], EXPORT_HEADER);
        assert!(lines[1].starts_with("Exported: "));
        assert_eq!(lines[2], "Total events: 2");
        assert!(text.contains("\"capacity\": 1000"));
        assert!(text.contains("\"enabledCategories\""));
        assert!(lines[lines.len() - 1].ends_with("[INFO] [STATION] [opened] station_2 opened"));
    }

    #[test]
    fn write_export_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.log");
        let mut stack = EventStack::default();
        stack.error(EventCategory::Error, "crash", "renderer lost");

        stack.write_export(&path).unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("[ERROR] [ERROR] [crash] renderer lost"));
    }
}
