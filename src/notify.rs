//! Outbound notifications
//!
//! The engine describes what happened; delivery belongs to whoever
//! implements [`Notifier`]. Dispatch is fire-and-forget: a failed delivery
//! is logged and never fails the operation that produced it.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;
use crate::queue::UserId;

pub const NOTIFICATION_SCHEMA_VERSION: &str = "rota.notification.v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    NewAssignment,
    DeadlineApproaching,
    DeadlineOverdue,
    SwapCreated,
    SwapApproved,
    SwapRejected,
    SwapExpired,
    Completion,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub schema_version: String,
    pub event_type: NotificationKind,
    pub task_instance_id: Uuid,
    pub recipients: Vec<UserId>,
    #[serde(default)]
    pub context: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl Notification {
    pub fn new(event_type: NotificationKind, task_instance_id: Uuid, recipients: Vec<UserId>) -> Self {
        let mut recipients = recipients;
        recipients.sort();
        recipients.dedup();
        Self {
            schema_version: NOTIFICATION_SCHEMA_VERSION.to_string(),
            event_type,
            task_instance_id,
            recipients,
            context: serde_json::Value::Null,
            timestamp: Utc::now(),
        }
    }

    pub fn with_context(mut self, context: serde_json::Value) -> Self {
        self.context = context;
        self
    }
}

pub trait Notifier: Send + Sync {
    fn deliver(&self, notification: &Notification) -> Result<()>;
}

/// Deliver every notification, logging failures instead of returning them.
pub fn dispatch(notifier: &dyn Notifier, notifications: &[Notification]) {
    for notification in notifications {
        if notification.recipients.is_empty() {
            tracing::debug!(event = ?notification.event_type, "notification has no recipients; skipped");
            continue;
        }
        if let Err(err) = notifier.deliver(notification) {
            tracing::warn!(
                event = ?notification.event_type,
                instance = %notification.task_instance_id,
                error = %err,
                "notification delivery failed"
            );
        }
    }
}

/// Drops everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn deliver(&self, _notification: &Notification) -> Result<()> {
        Ok(())
    }
}

/// Keeps delivered notifications in memory for inspection.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    delivered: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delivered(&self) -> Vec<Notification> {
        self.delivered
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    pub fn of_kind(&self, kind: NotificationKind) -> Vec<Notification> {
        self.delivered()
            .into_iter()
            .filter(|n| n.event_type == kind)
            .collect()
    }
}

impl Notifier for RecordingNotifier {
    fn deliver(&self, notification: &Notification) -> Result<()> {
        self.delivered
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(notification.clone());
        Ok(())
    }
}

// =============================================================================
// JSONL sink
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationDestination {
    Stdout,
    File(PathBuf),
}

impl NotificationDestination {
    /// `-` means stdout; empty means none.
    pub fn parse(raw: Option<&str>) -> Option<Self> {
        raw.and_then(|value| {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                return None;
            }
            if trimmed == "-" {
                return Some(NotificationDestination::Stdout);
            }
            Some(NotificationDestination::File(PathBuf::from(trimmed)))
        })
    }

    pub fn open(&self) -> Result<JsonlNotifier> {
        match self {
            NotificationDestination::Stdout => Ok(JsonlNotifier::stdout()),
            NotificationDestination::File(path) => JsonlNotifier::file(path),
        }
    }
}

/// Writes one JSON object per line
pub struct JsonlNotifier {
    writer: Mutex<Box<dyn Write + Send>>,
}

impl JsonlNotifier {
    pub fn stdout() -> Self {
        Self {
            writer: Mutex::new(Box::new(std::io::stdout())),
        }
    }

    pub fn file(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        Ok(Self {
            writer: Mutex::new(Box::new(file)),
        })
    }
}

impl Notifier for JsonlNotifier {
    fn deliver(&self, notification: &Notification) -> Result<()> {
        let serialized = serde_json::to_vec(notification)?;
        let mut writer = self.writer.lock().unwrap_or_else(|p| p.into_inner());
        writer.write_all(&serialized)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }
}
