//! rota task command implementation
//!
//! Listing and status changes on generated instances.

use chrono::{NaiveDate, Utc};
use uuid::Uuid;

use crate::cli::Context;
use crate::error::{Error, Result};
use crate::instance::{AuditEntry, InstanceStatus, TaskInstance};
use crate::lifecycle::{Completion, Lifecycle};
use crate::output::{emit_success, HumanOutput};
use crate::period::Period;
use crate::store::{FileStore, Store};

fn lifecycle(ctx: &Context) -> Lifecycle<'_, FileStore> {
    Lifecycle::new(&ctx.store, &ctx.directory, ctx.notifier.as_ref())
}

fn resolve(ctx: &Context, reference: &str) -> Result<Uuid> {
    ctx.store.read()?.resolve_instance(reference)
}

pub fn run_list(
    ctx: &Context,
    period: Option<String>,
    user: Option<String>,
    status: Option<String>,
) -> Result<()> {
    let period = period.as_deref().map(str::parse::<Period>).transpose()?;
    let status = status
        .as_deref()
        .map(str::parse::<InstanceStatus>)
        .transpose()?;

    let ledger = ctx.store.read()?;
    let mut instances: Vec<&TaskInstance> = ledger
        .instances
        .iter()
        .filter(|i| period.map_or(true, |p| i.period == p))
        .filter(|i| status.map_or(true, |s| i.status == s))
        .filter(|i| user.as_deref().map_or(true, |u| i.is_assignee(u)))
        .collect();
    instances.sort_by(|a, b| {
        a.window
            .start
            .cmp(&b.window.start)
            .then_with(|| a.template_name.cmp(&b.template_name))
    });

    let today = Utc::now().date_naive();
    let mut human = HumanOutput::new(format!("rota task list: {} instance(s)", instances.len()));
    for instance in &instances {
        let overdue = if instance.is_overdue(today) { " OVERDUE" } else { "" };
        human.push_detail(format!(
            "{} {} {} [{}{}] {}",
            short_id(instance.id),
            instance.period,
            instance.template_name,
            instance.status,
            overdue,
            instance.current_assignees.join(", ")
        ));
    }

    emit_success(ctx.output, "task list", &instances, Some(&human))
}

pub fn run_show(ctx: &Context, reference: &str) -> Result<()> {
    let ledger = ctx.store.read()?;
    let instance = ledger.instance(ledger.resolve_instance(reference)?)?;

    let mut human = HumanOutput::new(format!(
        "rota task show: {} ({})",
        instance.template_name, instance.period
    ));
    human.push_summary("id", instance.id.to_string());
    human.push_summary("status", instance.status.to_string());
    human.push_summary(
        "window",
        format!("{} to {}", instance.window.start, instance.window.end),
    );
    human.push_summary("assignees", instance.current_assignees.join(", "));
    if instance.original_assignees != instance.current_assignees {
        human.push_summary("originally", instance.original_assignees.join(", "));
    }
    if let Some(completion) = &instance.completion {
        human.push_summary(
            "completed",
            format!("by {} at {}", completion.completed_by, completion.completed_at),
        );
    }
    for entry in instance.audit.entries() {
        human.push_detail(describe_entry(entry));
    }

    emit_success(ctx.output, "task show", instance, Some(&human))
}

pub fn run_start(ctx: &Context, reference: &str) -> Result<()> {
    let id = resolve(ctx, reference)?;
    let instance = lifecycle(ctx).start(id, &ctx.actor)?;
    let human = HumanOutput::new(format!(
        "rota task start: {} ({}) in progress",
        instance.template_name, instance.period
    ));
    emit_success(ctx.output, "task start", &instance, Some(&human))
}

pub fn run_complete(
    ctx: &Context,
    reference: &str,
    notes: Option<String>,
    rating: Option<u8>,
    hours: Option<f64>,
) -> Result<()> {
    let id = resolve(ctx, reference)?;
    let instance = lifecycle(ctx).complete(
        id,
        &ctx.actor,
        Completion {
            notes,
            rating,
            duration_hours: hours,
        },
    )?;

    let mut human = HumanOutput::new(format!(
        "rota task complete: {} ({})",
        instance.template_name, instance.period
    ));
    if let Some(hours) = instance.completion.as_ref().and_then(|c| c.duration_hours) {
        human.push_summary("hours", format!("{hours:.1}"));
    }
    emit_success(ctx.output, "task complete", &instance, Some(&human))
}

pub fn run_cancel(ctx: &Context, reference: &str) -> Result<()> {
    let id = resolve(ctx, reference)?;
    let instance = lifecycle(ctx).cancel(id, &ctx.actor)?;
    let human = HumanOutput::new(format!(
        "rota task cancel: {} ({}) cancelled",
        instance.template_name, instance.period
    ));
    emit_success(ctx.output, "task cancel", &instance, Some(&human))
}

pub fn run_note(ctx: &Context, reference: &str, text: &str) -> Result<()> {
    let id = resolve(ctx, reference)?;
    let instance = lifecycle(ctx).annotate(id, &ctx.actor, text)?;
    let human = HumanOutput::new(format!("rota task note: added to {}", short_id(instance.id)));
    emit_success(ctx.output, "task note", &instance, Some(&human))
}

pub fn run_sweep(ctx: &Context, today: Option<String>) -> Result<()> {
    let today = match today.as_deref() {
        Some(raw) => NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|_| {
            Error::Validation(format!("Invalid date '{raw}'. Expected YYYY-MM-DD"))
        })?,
        None => Utc::now().date_naive(),
    };
    let warn_before = ctx.config.deadlines.warn_before()?;
    let report = lifecycle(ctx).sweep_deadlines(today, warn_before)?;

    let mut human = HumanOutput::new(format!("rota task sweep: {today}"));
    human.push_summary("approaching", report.approaching.len().to_string());
    human.push_summary("overdue", report.overdue.len().to_string());
    emit_success(ctx.output, "task sweep", &report, Some(&human))
}

pub fn run_archive(ctx: &Context, retain: usize) -> Result<()> {
    let archived = lifecycle(ctx).archive_audit(retain)?;
    let path = ctx.storage.audit_archive_file();
    for record in &archived {
        ctx.storage.append_jsonl(&path, record)?;
    }

    let moved: usize = archived.iter().map(|a| a.entries.len()).sum();
    let mut human = HumanOutput::new("rota task archive");
    human.push_summary("instances", archived.len().to_string());
    human.push_summary("entries moved", moved.to_string());
    human.push_summary("archive", path.display().to_string());
    emit_success(ctx.output, "task archive", &archived, Some(&human))
}

fn short_id(id: Uuid) -> String {
    id.to_string()[..8].to_string()
}

fn describe_entry(entry: &AuditEntry) -> String {
    let at = entry.at().format("%Y-%m-%d %H:%M").to_string();
    match entry {
        AuditEntry::Assignment {
            method, assignees, ..
        } => {
            let names: Vec<&str> = assignees.iter().map(|s| s.user_id.as_str()).collect();
            format!("{at} assigned ({method:?}): {}", names.join(", "))
        }
        AuditEntry::StatusChange {
            actor, from, to, ..
        } => format!("{at} {actor}: {from} -> {to}"),
        AuditEntry::Swap {
            actor,
            old_assignees,
            new_assignees,
            ..
        } => format!(
            "{at} {actor}: [{}] -> [{}]",
            old_assignees.join(", "),
            new_assignees.join(", ")
        ),
        AuditEntry::Completion { by, rating, .. } => match rating {
            Some(rating) => format!("{at} completed by {by} (rating {rating})"),
            None => format!("{at} completed by {by}"),
        },
        AuditEntry::Note { actor, text, .. } => format!("{at} {actor}: {text}"),
    }
}
