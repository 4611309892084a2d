//! rota generate command implementation

use std::collections::BTreeMap;

use serde::Serialize;
use uuid::Uuid;

use crate::cli::Context;
use crate::error::{JsonError, Result};
use crate::output::{emit_success, HumanOutput};
use crate::period::Period;
use crate::scheduler::{GenerationReport, Scheduler, TemplateOutcome};
use crate::store::Store;

/// Options for the generate command
pub struct GenerateOptions {
    pub periods: Vec<String>,
    pub templates: Vec<String>,
    pub preview: bool,
}

#[derive(Serialize)]
#[serde(untagged)]
enum PeriodOutcome {
    Report(GenerationReport),
    Error { error: JsonError },
}

pub fn run(ctx: &Context, options: GenerateOptions) -> Result<()> {
    let periods = options
        .periods
        .iter()
        .map(|p| p.parse::<Period>())
        .collect::<Result<Vec<_>>>()?;

    let filter: Option<Vec<Uuid>> = if options.templates.is_empty() {
        None
    } else {
        let ledger = ctx.store.read()?;
        Some(
            options
                .templates
                .iter()
                .map(|t| ledger.find_template(t).map(|t| t.id))
                .collect::<Result<Vec<_>>>()?,
        )
    };

    let mut scheduler = Scheduler::new(&ctx.store, ctx.notifier.as_ref());
    if let Some(seed) = ctx.config.scheduler.rng_seed {
        scheduler = scheduler.with_seed(seed);
    }
    let mut results = scheduler.generate_batch(&periods, filter.as_deref(), options.preview);

    // A single period keeps its error as the command's error.
    if results.len() == 1 && results.values().all(|r| r.is_err()) {
        if let Some((_, Err(err))) = results.pop_first() {
            return Err(err);
        }
    }

    let verb = if options.preview { "preview" } else { "generate" };
    let mut human = HumanOutput::new(format!("rota {}: {} period(s)", verb, results.len()));
    let mut outcomes = BTreeMap::new();
    for (period, result) in results {
        match result {
            Ok(report) => {
                describe(&mut human, &report);
                outcomes.insert(period, PeriodOutcome::Report(report));
            }
            Err(err) => {
                human.push_warning(format!("{period}: {err}"));
                outcomes.insert(
                    period,
                    PeriodOutcome::Error {
                        error: JsonError::from(&err),
                    },
                );
            }
        }
    }
    if options.preview {
        human.push_next_step("rerun without --preview to commit");
    }

    emit_success(ctx.output, verb, &outcomes, Some(&human))
}

fn describe(human: &mut HumanOutput, report: &GenerationReport) {
    let created = report.created().count();
    let existing = report.existing().count();
    let failed = report.failures().count();
    human.push_summary(
        report.period.to_string(),
        format!("{created} created, {existing} existing, {failed} failed"),
    );
    for result in &report.results {
        match &result.outcome {
            TemplateOutcome::Created { instance, .. } => human.push_detail(format!(
                "{} {}: {} ({} to {})",
                report.period,
                result.template_name,
                instance.current_assignees.join(", "),
                instance.window.start,
                instance.window.end
            )),
            TemplateOutcome::Existing { instance_id } => human.push_detail(format!(
                "{} {}: already generated ({})",
                report.period, result.template_name, instance_id
            )),
            TemplateOutcome::Failed { error, .. } => {
                human.push_warning(format!("{} {}: {}", report.period, result.template_name, error))
            }
        }
    }
}
