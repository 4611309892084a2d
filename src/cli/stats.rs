//! rota stats command implementation

use chrono::Utc;

use crate::cli::Context;
use crate::error::Result;
use crate::output::{emit_success, HumanOutput};
use crate::stats::{system_stats, user_stats};
use crate::store::Store;

pub fn run_user(ctx: &Context, user: &str) -> Result<()> {
    let ledger = ctx.store.read()?;
    let stats = user_stats(&ledger, user, Utc::now().date_naive())?;

    let mut human = HumanOutput::new(format!("rota stats user: {}", stats.user_id));
    human.push_summary("total", stats.total.to_string());
    human.push_summary("completed", stats.completed.to_string());
    human.push_summary("overdue", stats.overdue.to_string());
    human.push_summary("upcoming", stats.upcoming.to_string());
    human.push_summary(
        "completion rate",
        stats
            .completion_rate
            .map(|r| format!("{r:.1}%"))
            .unwrap_or_else(|| "n/a".to_string()),
    );
    for month in &stats.monthly {
        human.push_detail(format!(
            "{}: {} assigned, {} completed",
            month.period, month.assigned, month.completed
        ));
    }
    emit_success(ctx.output, "stats user", &stats, Some(&human))
}

pub fn run_system(ctx: &Context, months: u32) -> Result<()> {
    let ledger = ctx.store.read()?;
    let stats = system_stats(&ledger, months, Utc::now().date_naive())?;

    let mut human = HumanOutput::new("rota stats system");
    human.push_summary("instances", stats.instances_total.to_string());
    human.push_summary("overdue", stats.overdue.to_string());
    human.push_summary("pending requests", stats.pending_requests.to_string());
    human.push_summary("active members", stats.active_members.to_string());
    for status in &stats.statuses {
        human.push_detail(format!("{}: {}", status.status, status.count));
    }
    for template in stats.templates.iter().take(5) {
        human.push_detail(format!(
            "{}: {} instance(s), {} completed",
            template.template_name, template.instances, template.completed
        ));
    }
    for month in &stats.trend {
        human.push_detail(format!(
            "{}: {} created, {} completed",
            month.period, month.created, month.completed
        ));
    }
    emit_success(ctx.output, "stats system", &stats, Some(&human))
}
