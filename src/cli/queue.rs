//! rota queue command implementation

use serde::Serialize;

use crate::cli::Context;
use crate::error::Result;
use crate::output::{emit_success, HumanOutput};
use crate::period::Period;
use crate::queue::{Preference, QueueMember, RotationQueue};
use crate::store::Store;

/// Options for `queue add`
pub struct AddOptions {
    pub name: String,
    pub min_gap: u32,
    pub random_factor: f64,
    pub workload: bool,
    pub require_admin: bool,
    pub conflict_window: u32,
}

/// Options for `queue avail`
pub struct AvailOptions {
    pub queue: String,
    pub user: String,
    pub exclude: Vec<String>,
    pub prefer: Vec<String>,
    pub avoid: Vec<String>,
    pub clear: Vec<String>,
}

#[derive(Serialize)]
struct QueueSummary {
    #[serde(flatten)]
    queue: RotationQueue,
    active_members: usize,
    inactive_members: usize,
}

#[derive(Serialize)]
struct MembershipReport {
    queue: String,
    members: Vec<QueueMember>,
}

pub fn run_add(ctx: &Context, options: AddOptions) -> Result<()> {
    let queue = RotationQueue::new(options.name.trim())
        .with_min_gap(options.min_gap)
        .with_random_factor(options.random_factor)
        .with_workload(options.workload)
        .with_admin_approval(options.require_admin)
        .with_conflict_window(options.conflict_window);
    let queue = ctx
        .store
        .transact(|ledger| Ok(ledger.add_queue(queue)?.clone()))?;
    tracing::info!(queue = %queue.name, actor = %ctx.actor, "queue created");

    let mut human = HumanOutput::new(format!("rota queue add: {}", queue.name));
    human.push_summary("id", queue.id.to_string());
    human.push_summary("min gap (months)", queue.min_gap_months.to_string());
    human.push_summary("random factor", queue.random_factor.to_string());
    human.push_summary("workload", queue.consider_workload.to_string());
    human.push_summary("admin approval", queue.require_admin_approval.to_string());
    human.push_next_step(format!("rota queue join {} <user>...", queue.name));

    emit_success(ctx.output, "queue add", &queue, Some(&human))
}

pub fn run_list(ctx: &Context) -> Result<()> {
    let ledger = ctx.store.read()?;
    let queues: Vec<QueueSummary> = ledger
        .queues
        .iter()
        .map(|queue| {
            let (active, inactive): (Vec<_>, Vec<_>) =
                ledger.members_of(queue.id).partition(|m| m.is_active);
            QueueSummary {
                queue: queue.clone(),
                active_members: active.len(),
                inactive_members: inactive.len(),
            }
        })
        .collect();

    let mut human = HumanOutput::new(format!("rota queue list: {} queue(s)", queues.len()));
    for summary in &queues {
        human.push_detail(format!(
            "{} ({} active, {} inactive, min gap {})",
            summary.queue.name,
            summary.active_members,
            summary.inactive_members,
            summary.queue.min_gap_months
        ));
    }

    emit_success(ctx.output, "queue list", &queues, Some(&human))
}

pub fn run_join(ctx: &Context, queue: &str, users: &[String]) -> Result<()> {
    let report = ctx.store.transact(|ledger| {
        let queue = ledger.find_queue(queue)?.clone();
        let mut members = Vec::with_capacity(users.len());
        for user in users {
            members.push(ledger.enroll(queue.id, user)?.clone());
        }
        Ok(MembershipReport {
            queue: queue.name,
            members,
        })
    })?;

    let mut human = HumanOutput::new(format!("rota queue join: {}", report.queue));
    for member in &report.members {
        human.push_detail(format!(
            "{} ({} assignments)",
            member.user_id, member.total_assignments
        ));
    }
    emit_success(ctx.output, "queue join", &report, Some(&human))
}

pub fn run_leave(ctx: &Context, queue: &str, user: &str) -> Result<()> {
    let report = ctx.store.transact(|ledger| {
        let queue = ledger.find_queue(queue)?.clone();
        let member = ledger
            .member_mut(queue.id, user)
            .ok_or_else(|| crate::error::Error::not_found("member", user))?;
        member.deactivate();
        Ok(MembershipReport {
            queue: queue.name,
            members: vec![member.clone()],
        })
    })?;

    let human = HumanOutput::new(format!("rota queue leave: {} left {}", user, report.queue));
    emit_success(ctx.output, "queue leave", &report, Some(&human))
}

pub fn run_avail(ctx: &Context, options: AvailOptions) -> Result<()> {
    let exclude = parse_periods(&options.exclude)?;
    let prefer = parse_periods(&options.prefer)?;
    let avoid = parse_periods(&options.avoid)?;
    let clear = parse_periods(&options.clear)?;

    let report = ctx.store.transact(|ledger| {
        let queue = ledger.find_queue(&options.queue)?.clone();
        let member = ledger
            .member_mut(queue.id, &options.user)
            .ok_or_else(|| crate::error::Error::not_found("member", &options.user))?;
        for period in &clear {
            member.availability.clear(period);
        }
        for period in exclude {
            member.availability.exclude(period);
        }
        for period in prefer {
            member.availability.prefer(period, Preference::Preferred);
        }
        for period in avoid {
            member.availability.prefer(period, Preference::Avoid);
        }
        Ok(MembershipReport {
            queue: queue.name,
            members: vec![member.clone()],
        })
    })?;

    let mut human = HumanOutput::new(format!("rota queue avail: {}", options.user));
    if let Some(member) = report.members.first() {
        let excluded: Vec<String> = member
            .availability
            .excluded_periods
            .iter()
            .map(Period::to_string)
            .collect();
        human.push_summary("excluded", excluded.join(", "));
        for (period, preference) in &member.availability.period_preference {
            human.push_detail(format!("{period}: {preference}"));
        }
    }
    emit_success(ctx.output, "queue avail", &report, Some(&human))
}

fn parse_periods(raw: &[String]) -> Result<Vec<Period>> {
    raw.iter().map(|p| p.parse()).collect()
}
