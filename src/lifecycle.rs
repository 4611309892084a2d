//! Status changes on task instances
//!
//! Completion also folds the result into the completing member's queue
//! statistics in the same transaction, so the scorer always sees completion
//! rates that agree with the instances.

use chrono::{Duration, NaiveDate, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::identity::{require_admin, AdminDirectory};
use crate::instance::{AuditEntry, TaskInstance};
use crate::ledger::Ledger;
use crate::notify::{dispatch, Notification, NotificationKind, Notifier};
use crate::store::Store;

/// Optional details recorded with a completion
#[derive(Debug, Clone, Default)]
pub struct Completion {
    pub notes: Option<String>,
    pub rating: Option<u8>,
    pub duration_hours: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepReport {
    pub today: Option<NaiveDate>,
    pub approaching: Vec<Uuid>,
    pub overdue: Vec<Uuid>,
}

/// Audit entries moved out of one instance
#[derive(Debug, Clone, Serialize)]
pub struct ArchivedAudit {
    pub instance_id: Uuid,
    pub entries: Vec<AuditEntry>,
}

pub struct Lifecycle<'a, S: Store> {
    store: &'a S,
    directory: &'a dyn AdminDirectory,
    notifier: &'a dyn Notifier,
}

impl<'a, S: Store> Lifecycle<'a, S> {
    pub fn new(store: &'a S, directory: &'a dyn AdminDirectory, notifier: &'a dyn Notifier) -> Self {
        Self {
            store,
            directory,
            notifier,
        }
    }

    /// Any current assignee or an administrator may start an instance.
    pub fn start(&self, instance_id: Uuid, actor: &str) -> Result<TaskInstance> {
        let directory = self.directory;
        self.store.transact(|ledger| {
            let instance = ledger.instance_mut(instance_id)?;
            if !instance.is_assignee(actor) && !directory.is_admin(actor) {
                return Err(Error::Authorization(format!(
                    "{} may not start instance {}",
                    actor, instance_id
                )));
            }
            instance.start(actor)?;
            tracing::debug!(instance = %instance_id, actor, "instance started");
            Ok(instance.clone())
        })
    }

    pub fn complete(&self, instance_id: Uuid, actor: &str, completion: Completion) -> Result<TaskInstance> {
        let instance = self.store.transact(|ledger| {
            let instance = ledger.instance_mut(instance_id)?;
            let duration = instance
                .complete(
                    actor,
                    completion.notes,
                    completion.rating,
                    completion.duration_hours,
                )?
                .duration_hours;
            let instance = instance.clone();
            close_pending_requests(ledger, instance_id, actor, "instance completed");

            let queue_id = ledger.queue_for_instance(&instance)?.id;
            let pending = ledger.pending_assignments(queue_id, actor, Utc::now().date_naive());
            match ledger.member_mut(queue_id, actor) {
                Some(member) => member.record_completion(duration, pending),
                None => tracing::debug!(actor, "completing user has no queue entry; stats unchanged"),
            }
            Ok(instance)
        })?;

        tracing::info!(instance = %instance.id, actor, "instance completed");
        let mut recipients = instance.current_assignees.clone();
        recipients.extend(self.directory.admins());
        recipients.retain(|r| r != actor);
        let notification = Notification::new(NotificationKind::Completion, instance.id, recipients)
            .with_context(serde_json::json!({
                "template": instance.template_name,
                "period": instance.period,
                "completed_by": actor,
                "rating": instance.completion.as_ref().and_then(|c| c.rating),
            }));
        dispatch(self.notifier, &[notification]);
        Ok(instance)
    }

    /// Administrators only. Pending requests on the instance are closed too.
    pub fn cancel(&self, instance_id: Uuid, actor: &str) -> Result<TaskInstance> {
        require_admin(self.directory, actor, "cancel instances")?;
        self.store.transact(|ledger| {
            let instance = ledger.instance_mut(instance_id)?;
            instance.cancel(actor)?;
            let instance = instance.clone();
            close_pending_requests(ledger, instance_id, actor, "instance cancelled");
            tracing::info!(instance = %instance_id, actor, "instance cancelled");
            Ok(instance)
        })
    }

    /// Notes are accepted from anyone who was ever assigned, or an administrator.
    pub fn annotate(&self, instance_id: Uuid, actor: &str, text: &str) -> Result<TaskInstance> {
        let directory = self.directory;
        self.store.transact(|ledger| {
            let instance = ledger.instance_mut(instance_id)?;
            let involved = instance.is_assignee(actor)
                || instance.original_assignees.iter().any(|u| u == actor);
            if !involved && !directory.is_admin(actor) {
                return Err(Error::Authorization(format!(
                    "{} is not involved in instance {}",
                    actor, instance_id
                )));
            }
            instance.annotate(actor, text)?;
            Ok(instance.clone())
        })
    }

    /// Remind assignees of open instances that are due soon or overdue.
    /// Assignees of overdue instances get their completion rate refreshed.
    pub fn sweep_deadlines(&self, today: NaiveDate, warn_before: Duration) -> Result<SweepReport> {
        let ledger = self.store.transact(|ledger| {
            refresh_overdue_rates(ledger, today);
            Ok(ledger.clone())
        })?;
        let horizon = warn_before.num_days();
        let admins = self.directory.admins();
        let mut report = SweepReport {
            today: Some(today),
            ..SweepReport::default()
        };
        let mut notifications = Vec::new();

        for instance in ledger.instances.iter().filter(|i| i.is_open()) {
            let days_left = instance.days_until_due(today);
            let context = serde_json::json!({
                "template": instance.template_name,
                "period": instance.period,
                "window_end": instance.window.end,
                "days_left": days_left,
            });
            if instance.is_overdue(today) {
                let mut recipients = instance.current_assignees.clone();
                recipients.extend(admins.iter().cloned());
                report.overdue.push(instance.id);
                notifications.push(
                    Notification::new(NotificationKind::DeadlineOverdue, instance.id, recipients)
                        .with_context(context),
                );
            } else if days_left <= horizon {
                report.approaching.push(instance.id);
                notifications.push(
                    Notification::new(
                        NotificationKind::DeadlineApproaching,
                        instance.id,
                        instance.current_assignees.clone(),
                    )
                    .with_context(context),
                );
            }
        }

        tracing::debug!(
            approaching = report.approaching.len(),
            overdue = report.overdue.len(),
            "deadline sweep"
        );
        dispatch(self.notifier, &notifications);
        Ok(report)
    }

    /// Trim the audit logs of finished instances down to `retain` entries
    /// (plus the original assignment), returning what was removed.
    pub fn archive_audit(&self, retain: usize) -> Result<Vec<ArchivedAudit>> {
        self.store.transact(|ledger| {
            let mut archived = Vec::new();
            for instance in ledger.instances.iter_mut().filter(|i| !i.is_open()) {
                let entries = instance.audit.archive(retain);
                if !entries.is_empty() {
                    archived.push(ArchivedAudit {
                        instance_id: instance.id,
                        entries,
                    });
                }
            }
            Ok(archived)
        })
    }
}

fn refresh_overdue_rates(ledger: &mut Ledger, today: NaiveDate) {
    let mut holders: Vec<(Uuid, String)> = Vec::new();
    for instance in ledger.instances.iter().filter(|i| i.is_overdue(today)) {
        let Ok(queue) = ledger.queue_for_instance(instance) else {
            continue;
        };
        for user in &instance.current_assignees {
            if !holders.iter().any(|(q, u)| *q == queue.id && u == user) {
                holders.push((queue.id, user.clone()));
            }
        }
    }
    for (queue_id, user) in holders {
        let pending = ledger.pending_assignments(queue_id, &user, today);
        if let Some(member) = ledger.member_mut(queue_id, &user) {
            member.refresh_completion_rate(pending);
        }
    }
}

fn close_pending_requests(ledger: &mut Ledger, instance_id: Uuid, actor: &str, note: &str) {
    let now = Utc::now();
    for request in ledger
        .requests
        .iter_mut()
        .filter(|r| r.instance_id == instance_id && r.is_pending())
    {
        if let Err(err) = request.reject(actor, Some(note.to_string()), now) {
            tracing::warn!(request = %request.id, error = %err, "could not close request");
        }
    }
}
