//! rota swap command implementation

use crate::cli::Context;
use crate::error::Result;
use crate::negotiation::{Negotiation, NegotiationPolicy, NewRequest};
use crate::output::{emit_success, HumanOutput};
use crate::store::{FileStore, Store};
use crate::swap::{SwapKind, SwapRequest, SwapStatus};

fn negotiation(ctx: &Context) -> Result<Negotiation<'_, FileStore>> {
    let policy = NegotiationPolicy::from_config(&ctx.config.negotiation)?;
    Ok(Negotiation::new(&ctx.store, &ctx.directory, ctx.notifier.as_ref()).with_policy(policy))
}

fn describe(request: &SwapRequest) -> String {
    let target = request.to_user.as_deref().unwrap_or("(open)");
    let mut line = format!(
        "{} {} {} -> {} [{}]",
        &request.id.to_string()[..8],
        request.kind,
        request.from_user,
        target,
        request.status
    );
    if request.is_pending() {
        if let Some(expires) = request.expires_at {
            line.push_str(&format!(" expires {}", expires.format("%Y-%m-%d %H:%M")));
        }
    }
    line
}

fn report(ctx: &Context, command: &str, header: &str, request: &SwapRequest) -> Result<()> {
    let mut human = HumanOutput::new(format!("rota {command}: {header}"));
    human.push_summary("request", request.id.to_string());
    human.push_summary("status", request.status.to_string());
    if request.is_pending() {
        let mut waiting = Vec::new();
        if request.kind.needs_target_approval() && request.target_approval.is_none() {
            waiting.push(request.to_user.as_deref().unwrap_or("a claimant").to_string());
        }
        if request.requires_admin && request.admin_approval.is_none() {
            waiting.push("an administrator".to_string());
        }
        if !waiting.is_empty() {
            human.push_summary("waiting for", waiting.join(", "));
        }
    }
    emit_success(ctx.output, command, request, Some(&human))
}

pub fn run_request(
    ctx: &Context,
    task: &str,
    kind: &str,
    to: Option<String>,
    reason: Option<String>,
) -> Result<()> {
    let kind: SwapKind = kind.parse()?;
    let instance_id = ctx.store.read()?.resolve_instance(task)?;
    let mut new = NewRequest {
        kind,
        to_user: to,
        reason: None,
    };
    if let Some(reason) = reason {
        new = new.with_reason(reason);
    }

    let request = negotiation(ctx)?.create(instance_id, &ctx.actor, new)?;
    let header = match request.status {
        SwapStatus::Approved => format!("{} executed", request.kind),
        _ => format!("{} requested", request.kind),
    };
    report(ctx, "swap request", &header, &request)
}

pub fn run_approve(ctx: &Context, reference: &str) -> Result<()> {
    let id = ctx.store.read()?.resolve_request(reference)?;
    let request = negotiation(ctx)?.approve(id, &ctx.actor)?;
    let header = if request.status == SwapStatus::Approved {
        "approved and executed"
    } else {
        "approval recorded"
    };
    report(ctx, "swap approve", header, &request)
}

pub fn run_reject(ctx: &Context, reference: &str, reason: Option<String>) -> Result<()> {
    let id = ctx.store.read()?.resolve_request(reference)?;
    let request = negotiation(ctx)?.reject(id, &ctx.actor, reason)?;
    report(ctx, "swap reject", "rejected", &request)
}

pub fn run_claim(ctx: &Context, reference: &str) -> Result<()> {
    let id = ctx.store.read()?.resolve_request(reference)?;
    let request = negotiation(ctx)?.claim(id, &ctx.actor)?;
    let header = if request.status == SwapStatus::Approved {
        "claimed"
    } else {
        "claimed, waiting for an administrator"
    };
    report(ctx, "swap claim", header, &request)
}

pub fn run_list(ctx: &Context, pool: bool, task: Option<String>, status: Option<String>) -> Result<()> {
    let negotiation = negotiation(ctx)?;
    let requests = if pool {
        negotiation.list_open_pool(Some(&ctx.actor))?
    } else {
        let instance = match task.as_deref() {
            Some(task) => Some(ctx.store.read()?.resolve_instance(task)?),
            None => None,
        };
        let status = status.as_deref().map(str::parse::<SwapStatus>).transpose()?;
        negotiation.list(instance, status)?
    };

    let mut human = HumanOutput::new(format!("rota swap list: {} request(s)", requests.len()));
    for request in &requests {
        human.push_detail(describe(request));
    }
    if pool && !requests.is_empty() {
        human.push_next_step("rota swap claim <id>");
    }
    emit_success(ctx.output, "swap list", &requests, Some(&human))
}

pub fn run_expire(ctx: &Context) -> Result<()> {
    let expiry = negotiation(ctx)?.expire_stale()?;
    let mut human = HumanOutput::new("rota swap expire");
    human.push_summary("expired", expiry.expired.len().to_string());
    human.push_summary("republished", expiry.republished.len().to_string());
    emit_success(ctx.output, "swap expire", &expiry, Some(&human))
}
