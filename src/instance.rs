//! Task instances and their audit trail
//!
//! An instance is one concrete occurrence of a template for a period. Its
//! status only moves forward:
//!
//! ```text
//! scheduled ──▶ in_progress ──▶ completed
//!     │              │
//!     └──────────────┴──────▶ cancelled
//! ```
//!
//! `original_assignees` is fixed at creation. `current_assignees` changes
//! only through [`TaskInstance::update_assignees`], which always appends a
//! swap entry to the audit log.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::period::Period;
use crate::queue::UserId;
use crate::template::{ExecutionWindow, TaskTemplate};

pub const MIN_RATING: u8 = 1;
pub const MAX_RATING: u8 = 5;

// =============================================================================
// Status
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    Scheduled,
    InProgress,
    Completed,
    Cancelled,
}

impl InstanceStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, InstanceStatus::Completed | InstanceStatus::Cancelled)
    }

    pub fn is_open(&self) -> bool {
        !self.is_terminal()
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstanceStatus::Scheduled => write!(f, "scheduled"),
            InstanceStatus::InProgress => write!(f, "in_progress"),
            InstanceStatus::Completed => write!(f, "completed"),
            InstanceStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl FromStr for InstanceStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "scheduled" => Ok(InstanceStatus::Scheduled),
            "in_progress" | "started" => Ok(InstanceStatus::InProgress),
            "completed" | "done" => Ok(InstanceStatus::Completed),
            "cancelled" | "canceled" => Ok(InstanceStatus::Cancelled),
            _ => Err(Error::Validation(format!(
                "Invalid status '{}'. Expected: scheduled, in_progress, completed, cancelled",
                s
            ))),
        }
    }
}

// =============================================================================
// Audit log
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentMethod {
    FairRotation,
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssigneeRole {
    Primary,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssigneeSlot {
    pub user_id: UserId,
    pub role: AssigneeRole,
}

/// One append-only record in an instance's history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuditEntry {
    Assignment {
        at: DateTime<Utc>,
        method: AssignmentMethod,
        assignees: Vec<AssigneeSlot>,
    },
    StatusChange {
        at: DateTime<Utc>,
        actor: UserId,
        from: InstanceStatus,
        to: InstanceStatus,
    },
    Swap {
        at: DateTime<Utc>,
        actor: UserId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<Uuid>,
        old_assignees: Vec<UserId>,
        new_assignees: Vec<UserId>,
    },
    Completion {
        at: DateTime<Utc>,
        by: UserId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        rating: Option<u8>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        duration_hours: Option<f64>,
    },
    Note {
        at: DateTime<Utc>,
        actor: UserId,
        text: String,
    },
}

impl AuditEntry {
    pub fn at(&self) -> DateTime<Utc> {
        match self {
            AuditEntry::Assignment { at, .. }
            | AuditEntry::StatusChange { at, .. }
            | AuditEntry::Swap { at, .. }
            | AuditEntry::Completion { at, .. }
            | AuditEntry::Note { at, .. } => *at,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            AuditEntry::Assignment { .. } => "assignment",
            AuditEntry::StatusChange { .. } => "status_change",
            AuditEntry::Swap { .. } => "swap",
            AuditEntry::Completion { .. } => "completion",
            AuditEntry::Note { .. } => "note",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuditLog {
    entries: Vec<AuditEntry>,
}

impl AuditLog {
    pub fn entries(&self) -> &[AuditEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn swaps(&self) -> impl Iterator<Item = &AuditEntry> {
        self.entries
            .iter()
            .filter(|e| matches!(e, AuditEntry::Swap { .. }))
    }

    fn push(&mut self, entry: AuditEntry) {
        self.entries.push(entry);
    }

    /// Remove the oldest entries so at most `retain` entries remain besides
    /// the original assignment, returning what was removed in order.
    pub fn archive(&mut self, retain: usize) -> Vec<AuditEntry> {
        let assignment = self
            .entries
            .iter()
            .position(|e| matches!(e, AuditEntry::Assignment { .. }));
        let others = self.entries.len() - usize::from(assignment.is_some());
        if others <= retain {
            return Vec::new();
        }

        let mut to_remove = others - retain;
        let mut kept = Vec::with_capacity(self.entries.len() - to_remove);
        let mut archived = Vec::with_capacity(to_remove);
        for (idx, entry) in self.entries.drain(..).enumerate() {
            if to_remove > 0 && Some(idx) != assignment {
                archived.push(entry);
                to_remove -= 1;
            } else {
                kept.push(entry);
            }
        }
        self.entries = kept;
        archived
    }
}

// =============================================================================
// Instance
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRecord {
    pub completed_by: UserId,
    pub completed_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_hours: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskInstance {
    pub id: Uuid,
    pub template_id: Uuid,
    /// Name of the template when the instance was generated
    pub template_name: String,
    pub period: Period,
    pub window: ExecutionWindow,
    pub status: InstanceStatus,
    pub original_assignees: Vec<UserId>,
    pub current_assignees: Vec<UserId>,
    #[serde(default)]
    pub audit: AuditLog,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion: Option<CompletionRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TaskInstance {
    /// Create a scheduled instance. The first assignee is the primary.
    pub fn new(
        template: &TaskTemplate,
        period: Period,
        window: ExecutionWindow,
        assignees: Vec<UserId>,
        method: AssignmentMethod,
    ) -> Result<Self> {
        let assignees = dedup(assignees);
        if assignees.is_empty() {
            return Err(Error::Validation(
                "an instance needs at least one assignee".to_string(),
            ));
        }

        let now = Utc::now();
        let slots = assignees
            .iter()
            .enumerate()
            .map(|(idx, user_id)| AssigneeSlot {
                user_id: user_id.clone(),
                role: if idx == 0 {
                    AssigneeRole::Primary
                } else {
                    AssigneeRole::Assistant
                },
            })
            .collect();

        let mut audit = AuditLog::default();
        audit.push(AuditEntry::Assignment {
            at: now,
            method,
            assignees: slots,
        });

        Ok(Self {
            id: Uuid::new_v4(),
            template_id: template.id,
            template_name: template.name.clone(),
            period,
            window,
            status: InstanceStatus::Scheduled,
            original_assignees: assignees.clone(),
            current_assignees: assignees,
            audit,
            completion: None,
            started_at: None,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn primary_assignee(&self) -> Option<&UserId> {
        self.current_assignees.first()
    }

    pub fn is_assignee(&self, user: &str) -> bool {
        self.current_assignees.iter().any(|u| u == user)
    }

    pub fn is_open(&self) -> bool {
        self.status.is_open()
    }

    /// Open and past the end of its execution window
    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        self.is_open() && self.window.end < today
    }

    pub fn days_until_due(&self, today: NaiveDate) -> i64 {
        (self.window.end - today).num_days()
    }

    fn ensure_open(&self, action: &str) -> Result<()> {
        if self.status.is_terminal() {
            return Err(Error::State(format!(
                "cannot {} instance {}: it is {}",
                action, self.id, self.status
            )));
        }
        Ok(())
    }

    fn transition(&mut self, to: InstanceStatus, actor: &str, at: DateTime<Utc>) {
        self.audit.push(AuditEntry::StatusChange {
            at,
            actor: actor.to_string(),
            from: self.status,
            to,
        });
        self.status = to;
        self.updated_at = at;
    }

    pub fn start(&mut self, actor: &str) -> Result<()> {
        if self.status != InstanceStatus::Scheduled {
            return Err(Error::State(format!(
                "cannot start instance {}: it is {}",
                self.id, self.status
            )));
        }
        let now = Utc::now();
        self.started_at = Some(now);
        self.transition(InstanceStatus::InProgress, actor, now);
        Ok(())
    }

    /// Mark the instance completed by one of its current assignees.
    ///
    /// When no duration is given and the instance was started, the duration
    /// is measured from the start. Returns the recorded completion.
    pub fn complete(
        &mut self,
        by: &str,
        notes: Option<String>,
        rating: Option<u8>,
        duration_hours: Option<f64>,
    ) -> Result<&CompletionRecord> {
        if let Some(rating) = rating {
            if !(MIN_RATING..=MAX_RATING).contains(&rating) {
                return Err(Error::Validation(format!(
                    "rating must be {}-{}, got {}",
                    MIN_RATING, MAX_RATING, rating
                )));
            }
        }
        if let Some(hours) = duration_hours {
            if !hours.is_finite() || hours < 0.0 {
                return Err(Error::Validation(format!(
                    "duration must be a non-negative number of hours, got {}",
                    hours
                )));
            }
        }
        self.ensure_open("complete")?;
        if !self.is_assignee(by) {
            return Err(Error::Authorization(format!(
                "{} is not assigned to instance {}",
                by, self.id
            )));
        }

        let now = Utc::now();
        let duration_hours = duration_hours.or_else(|| {
            self.started_at
                .map(|started| (now - started).num_seconds().max(0) as f64 / 3600.0)
        });
        let notes = notes.filter(|n| !n.trim().is_empty());

        self.transition(InstanceStatus::Completed, by, now);
        self.audit.push(AuditEntry::Completion {
            at: now,
            by: by.to_string(),
            rating,
            duration_hours,
        });
        Ok(self.completion.insert(CompletionRecord {
            completed_by: by.to_string(),
            completed_at: now,
            notes,
            rating,
            duration_hours,
        }))
    }

    pub fn cancel(&mut self, actor: &str) -> Result<()> {
        self.ensure_open("cancel")?;
        self.transition(InstanceStatus::Cancelled, actor, Utc::now());
        Ok(())
    }

    /// Replace the current assignees, recording the change.
    pub fn update_assignees(
        &mut self,
        new_assignees: Vec<UserId>,
        actor: &str,
        request_id: Option<Uuid>,
    ) -> Result<()> {
        self.ensure_open("reassign")?;
        let new_assignees = dedup(new_assignees);
        if new_assignees.is_empty() {
            return Err(Error::Validation(
                "an instance cannot be left without assignees".to_string(),
            ));
        }

        let now = Utc::now();
        let old_assignees = std::mem::replace(&mut self.current_assignees, new_assignees);
        self.audit.push(AuditEntry::Swap {
            at: now,
            actor: actor.to_string(),
            request_id,
            old_assignees,
            new_assignees: self.current_assignees.clone(),
        });
        self.updated_at = now;
        Ok(())
    }

    /// Move `from` out of the assignee list and `to` into it, keeping the
    /// slot position. Adding someone already assigned is a no-op add.
    pub fn reassign(
        &mut self,
        from: &str,
        to: &str,
        actor: &str,
        request_id: Option<Uuid>,
    ) -> Result<()> {
        if !self.is_assignee(from) {
            return Err(Error::State(format!(
                "{} is no longer assigned to instance {}",
                from, self.id
            )));
        }
        let already_assigned = self.is_assignee(to);
        let next: Vec<UserId> = self
            .current_assignees
            .iter()
            .filter_map(|user| {
                if user == from {
                    (!already_assigned).then(|| to.to_string())
                } else {
                    Some(user.clone())
                }
            })
            .collect();
        self.update_assignees(next, actor, request_id)
    }

    /// Notes are accepted in every state, including terminal ones.
    pub fn annotate(&mut self, actor: &str, text: &str) -> Result<()> {
        let text = text.trim();
        if text.is_empty() {
            return Err(Error::Validation("note cannot be empty".to_string()));
        }
        let now = Utc::now();
        self.audit.push(AuditEntry::Note {
            at: now,
            actor: actor.to_string(),
            text: text.to_string(),
        });
        self.updated_at = now;
        Ok(())
    }
}

fn dedup(users: Vec<UserId>) -> Vec<UserId> {
    let mut seen = HashSet::new();
    users
        .into_iter()
        .filter(|u| seen.insert(u.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::TaskTemplate;

    fn instance(assignees: &[&str]) -> TaskInstance {
        let template = TaskTemplate::builder("Autoclave check", Uuid::new_v4())
            .build()
            .unwrap();
        let period: Period = "2024-04".parse().unwrap();
        let window = template.execution_window(&period).unwrap();
        TaskInstance::new(
            &template,
            period,
            window,
            assignees.iter().map(|s| s.to_string()).collect(),
            AssignmentMethod::FairRotation,
        )
        .unwrap()
    }

    #[test]
    fn new_instance_records_assignment_roles() {
        let inst = instance(&["a", "b", "a"]);
        assert_eq!(inst.current_assignees, vec!["a", "b"]);
        assert_eq!(inst.original_assignees, inst.current_assignees);
        match &inst.audit.entries()[0] {
            AuditEntry::Assignment { assignees, method, .. } => {
                assert_eq!(*method, AssignmentMethod::FairRotation);
                assert_eq!(assignees[0].role, AssigneeRole::Primary);
                assert_eq!(assignees[1].role, AssigneeRole::Assistant);
            }
            other => panic!("unexpected entry {other:?}"),
        }
    }

    #[test]
    fn lifecycle_transitions() {
        let mut inst = instance(&["a"]);
        inst.start("a").unwrap();
        assert_eq!(inst.status, InstanceStatus::InProgress);
        assert!(matches!(inst.start("a"), Err(Error::State(_))));

        let record = inst.complete("a", Some("done".into()), Some(4), Some(1.5)).unwrap();
        assert_eq!(record.rating, Some(4));
        assert_eq!(inst.status, InstanceStatus::Completed);

        assert!(matches!(inst.cancel("admin"), Err(Error::State(_))));
        assert!(matches!(
            inst.complete("a", None, None, None),
            Err(Error::State(_))
        ));
        inst.annotate("a", "late note").unwrap();
        assert_eq!(inst.audit.entries().last().unwrap().kind(), "note");
    }

    #[test]
    fn complete_requires_current_assignee() {
        let mut inst = instance(&["a"]);
        assert!(matches!(
            inst.complete("b", None, None, None),
            Err(Error::Authorization(_))
        ));
        assert!(matches!(
            inst.complete("a", None, Some(9), None),
            Err(Error::Validation(_))
        ));
        assert_eq!(inst.status, InstanceStatus::Scheduled);
    }

    #[test]
    fn reassign_keeps_slot_and_audits() {
        let mut inst = instance(&["a", "b"]);
        inst.reassign("a", "c", "c", None).unwrap();
        assert_eq!(inst.current_assignees, vec!["c", "b"]);
        assert_eq!(inst.original_assignees, vec!["a", "b"]);
        assert_eq!(inst.audit.swaps().count(), 1);

        // moving onto someone already assigned just drops the giver
        inst.reassign("c", "b", "b", None).unwrap();
        assert_eq!(inst.current_assignees, vec!["b"]);

        assert!(matches!(
            inst.reassign("a", "d", "d", None),
            Err(Error::State(_))
        ));
        assert!(matches!(
            inst.update_assignees(vec![], "admin", None),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn archive_keeps_original_assignment() {
        let mut inst = instance(&["a"]);
        for i in 0..5 {
            inst.annotate("a", &format!("note {i}")).unwrap();
        }
        let archived = inst.audit.archive(2);
        assert_eq!(archived.len(), 3);
        assert_eq!(inst.audit.len(), 3);
        assert_eq!(inst.audit.entries()[0].kind(), "assignment");
        match &inst.audit.entries()[2] {
            AuditEntry::Note { text, .. } => assert_eq!(text, "note 4"),
            other => panic!("unexpected entry {other:?}"),
        }
        assert!(inst.audit.archive(2).is_empty());
    }

    #[test]
    fn status_parse() {
        assert_eq!(
            InstanceStatus::from_str("in-progress").unwrap(),
            InstanceStatus::InProgress
        );
        assert_eq!(
            InstanceStatus::from_str("canceled").unwrap(),
            InstanceStatus::Cancelled
        );
        assert!(InstanceStatus::from_str("paused").is_err());
    }
}
