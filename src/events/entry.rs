use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventCategory {
    Game,
    Train,
    Enemy,
    Combat,
    Economy,
    Station,
    Error,
    Rendering,
    Attachment,
    System,
    Ui,
}

impl EventCategory {
    pub const ALL: [EventCategory; 11] = [
        EventCategory::Game,
        EventCategory::Train,
        EventCategory::Enemy,
        EventCategory::Combat,
        EventCategory::Economy,
        EventCategory::Station,
        EventCategory::Error,
        EventCategory::Rendering,
        EventCategory::Attachment,
        EventCategory::System,
        EventCategory::Ui,
    ];

    /// Debug categories start disabled and may be toggled at runtime; the
    /// rest are always recorded.
    pub const fn is_debug(self) -> bool {
        matches!(
            self,
            EventCategory::Rendering
                | EventCategory::Attachment
                | EventCategory::System
                | EventCategory::Ui
        )
    }

    pub const fn label(self) -> &'static str {
        match self {
            EventCategory::Game => "GAME",
            EventCategory::Train => "TRAIN",
            EventCategory::Enemy => "ENEMY",
            EventCategory::Combat => "COMBAT",
            EventCategory::Economy => "ECONOMY",
            EventCategory::Station => "STATION",
            EventCategory::Error => "ERROR",
            EventCategory::Rendering => "RENDERING",
            EventCategory::Attachment => "ATTACHMENT",
            EventCategory::System => "SYSTEM",
            EventCategory::Ui => "UI",
        }
    }
}

impl fmt::Display for EventCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub const fn label(self) -> &'static str {
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
        f.write_str(self.label())
    }
}

/// A recorded log entry. Entries are never modified after they are appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEntry {
    pub id: u64,
    pub timestamp: DateTime<Utc>,
    pub category: EventCategory,
    pub level: LogLevel,
    pub event_type: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default)]
    pub verbose: bool,
}

/// Builder for entries handed to the event stack.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    pub(crate) category: EventCategory,
    pub(crate) level: LogLevel,
    pub(crate) event_type: String,
    pub(crate) message: String,
    pub(crate) context: Option<Value>,
    pub(crate) source: Option<String>,
    pub(crate) verbose: bool,
}

impl LogRecord {
    pub fn new(
        category: EventCategory,
        level: LogLevel,
        event_type: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            category,
            level,
            event_type: event_type.into(),
            message: message.into(),
            context: None,
            source: None,
            verbose: false,
        }
    }

    pub fn context(mut self, context: Value) -> Self {
        self.context = Some(context);
        self
    }

    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Verbose entries are dropped unless the stack is configured to show them.
    pub fn verbose(mut self) -> Self {
        self.verbose = true;
        self
    }

    pub(crate) fn into_entry(self, id: u64) -> EventEntry {
        EventEntry {
            id,
            timestamp: Utc::now(),
            category: self.category,
            level: self.level,
            event_type: self.event_type,
            message: self.message,
            context: self.context,
            source: self.source,
            verbose: self.verbose,
        }
    }
}
