//! Read-only aggregates over the ledger
//!
//! Nothing here is stored; every figure is recomputed from instances and
//! members on demand.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::instance::{InstanceStatus, TaskInstance};
use crate::ledger::Ledger;
use crate::period::Period;
use crate::queue::UserId;

/// Longest trend `system_stats` will build.
pub const MAX_TREND_MONTHS: u32 = 1200;

#[derive(Debug, Clone, Serialize)]
pub struct StatusCount {
    pub status: InstanceStatus,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct MonthlyCount {
    pub period: Period,
    pub assigned: usize,
    pub completed: usize,
}

/// A member's standing in one queue
#[derive(Debug, Clone, Serialize)]
pub struct QueueStanding {
    pub queue_id: Uuid,
    pub queue_name: String,
    pub is_active: bool,
    pub total_assignments: u32,
    pub last_assigned_period: Option<Period>,
    pub completion_rate: f64,
    pub average_completion_hours: Option<f64>,
    pub priority_score: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserStats {
    pub user_id: UserId,
    pub generated_at: DateTime<Utc>,
    pub total: usize,
    pub completed: usize,
    pub cancelled: usize,
    pub overdue: usize,
    /// Open and not yet past the end of the window
    pub upcoming: usize,
    /// Completed over non-cancelled, in percent
    pub completion_rate: Option<f64>,
    pub queues: Vec<QueueStanding>,
    pub monthly: Vec<MonthlyCount>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TemplatePopularity {
    pub template_id: Uuid,
    pub template_name: String,
    pub instances: usize,
    pub completed: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct MonthlyTrend {
    pub period: Period,
    /// Instances scheduled for the period
    pub created: usize,
    /// Completions recorded during the period
    pub completed: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemStats {
    pub generated_at: DateTime<Utc>,
    pub instances_total: usize,
    pub overdue: usize,
    pub pending_requests: usize,
    pub active_members: usize,
    pub statuses: Vec<StatusCount>,
    pub templates: Vec<TemplatePopularity>,
    pub trend: Vec<MonthlyTrend>,
}

/// Counts for instances `user` currently holds.
pub fn user_stats(ledger: &Ledger, user: &str, today: NaiveDate) -> Result<UserStats> {
    let user = user.trim();
    if user.is_empty() {
        return Err(Error::Validation("user id cannot be empty".to_string()));
    }

    let held: Vec<&TaskInstance> = ledger
        .instances
        .iter()
        .filter(|i| i.is_assignee(user))
        .collect();

    let completed = count_status(&held, InstanceStatus::Completed);
    let cancelled = count_status(&held, InstanceStatus::Cancelled);
    let overdue = held.iter().filter(|i| i.is_overdue(today)).count();
    let upcoming = held
        .iter()
        .filter(|i| i.is_open() && i.window.end >= today)
        .count();

    let mut monthly: BTreeMap<Period, MonthlyCount> = BTreeMap::new();
    for instance in &held {
        let entry = monthly.entry(instance.period).or_insert(MonthlyCount {
            period: instance.period,
            assigned: 0,
            completed: 0,
        });
        entry.assigned += 1;
        if instance.status == InstanceStatus::Completed {
            entry.completed += 1;
        }
    }

    let queues = ledger
        .members
        .iter()
        .filter(|m| m.user_id == user)
        .map(|m| QueueStanding {
            queue_id: m.queue_id,
            queue_name: ledger
                .queue(m.queue_id)
                .map(|q| q.name.clone())
                .unwrap_or_else(|_| "(removed)".to_string()),
            is_active: m.is_active,
            total_assignments: m.total_assignments,
            last_assigned_period: m.last_assigned_period,
            completion_rate: round2(m.completion_rate),
            average_completion_hours: m.average_completion_hours.map(round2),
            priority_score: round2(m.priority_score),
        })
        .collect();

    Ok(UserStats {
        user_id: user.to_string(),
        generated_at: Utc::now(),
        total: held.len(),
        completed,
        cancelled,
        overdue,
        upcoming,
        completion_rate: percent(completed, held.len() - cancelled),
        queues,
        monthly: monthly.into_values().collect(),
    })
}

/// System-wide figures, with a trend over the `months` periods ending at `today`.
pub fn system_stats(ledger: &Ledger, months: u32, today: NaiveDate) -> Result<SystemStats> {
    if !(1..=MAX_TREND_MONTHS).contains(&months) {
        return Err(Error::Validation(format!(
            "months must be between 1 and {MAX_TREND_MONTHS} (got {months})"
        )));
    }

    let mut statuses: BTreeMap<InstanceStatus, usize> = BTreeMap::new();
    for instance in &ledger.instances {
        *statuses.entry(instance.status).or_insert(0) += 1;
    }

    let mut popularity: HashMap<Uuid, TemplatePopularity> = HashMap::new();
    for instance in &ledger.instances {
        let entry = popularity
            .entry(instance.template_id)
            .or_insert_with(|| TemplatePopularity {
                template_id: instance.template_id,
                template_name: ledger
                    .template(instance.template_id)
                    .map(|t| t.name.clone())
                    .unwrap_or_else(|_| instance.template_name.clone()),
                instances: 0,
                completed: 0,
            });
        entry.instances += 1;
        if instance.status == InstanceStatus::Completed {
            entry.completed += 1;
        }
    }
    let mut templates: Vec<TemplatePopularity> = popularity.into_values().collect();
    templates.sort_by(|a, b| {
        b.instances
            .cmp(&a.instances)
            .then_with(|| a.template_name.cmp(&b.template_name))
    });

    let last = Period::from_date(today);
    let first = last.add_months(1 - months as i32);
    let trend = first
        .through(&last)
        .into_iter()
        .map(|period| MonthlyTrend {
            period,
            created: ledger
                .instances
                .iter()
                .filter(|i| i.period == period)
                .count(),
            completed: ledger
                .instances
                .iter()
                .filter_map(|i| i.completion.as_ref())
                .filter(|c| period.contains(c.completed_at.date_naive()))
                .count(),
        })
        .collect();

    Ok(SystemStats {
        generated_at: Utc::now(),
        instances_total: ledger.instances.len(),
        overdue: ledger.instances.iter().filter(|i| i.is_overdue(today)).count(),
        pending_requests: ledger.requests.iter().filter(|r| r.is_pending()).count(),
        active_members: ledger.members.iter().filter(|m| m.is_active).count(),
        statuses: statuses
            .into_iter()
            .map(|(status, count)| StatusCount { status, count })
            .collect(),
        templates,
        trend,
    })
}

fn count_status(instances: &[&TaskInstance], status: InstanceStatus) -> usize {
    instances.iter().filter(|i| i.status == status).count()
}

fn percent(part: usize, whole: usize) -> Option<f64> {
    if whole == 0 {
        return None;
    }
    Some(round2(part as f64 * 100.0 / whole as f64))
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
