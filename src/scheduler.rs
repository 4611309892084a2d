//! Generation of task instances for a period
//!
//! For every active template that fires in the period, the scheduler
//! computes the execution window, asks the scorer for assignees and records
//! the instance together with the members' new assignment statistics. The
//! whole period runs in one store transaction, so concurrent generation of
//! the same (template, period) resolves to a single instance.
//!
//! A template that cannot be staffed is reported and skipped; it never
//! aborts the rest of the period.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use uuid::Uuid;

use crate::error::{Error, ErrorKind, Result};
use crate::instance::{AssignmentMethod, TaskInstance};
use crate::ledger::Ledger;
use crate::notify::{dispatch, Notification, NotificationKind, Notifier};
use crate::period::Period;
use crate::queue::QueueMember;
use crate::scorer::{self, ScoringInput, Selection};
use crate::store::Store;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TemplateOutcome {
    Created {
        instance: TaskInstance,
        selection: Selection,
    },
    /// An instance for this (template, period) already exists
    Existing { instance_id: Uuid },
    Failed {
        error: String,
        kind: ErrorKind,
        #[serde(skip_serializing_if = "Option::is_none")]
        details: Option<serde_json::Value>,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct TemplateResult {
    pub template_id: Uuid,
    pub template_name: String,
    #[serde(flatten)]
    pub outcome: TemplateOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct GenerationReport {
    pub period: Period,
    /// Nothing was persisted
    pub preview: bool,
    pub results: Vec<TemplateResult>,
}

impl GenerationReport {
    pub fn created(&self) -> impl Iterator<Item = &TaskInstance> {
        self.results.iter().filter_map(|r| match &r.outcome {
            TemplateOutcome::Created { instance, .. } => Some(instance),
            _ => None,
        })
    }

    pub fn existing(&self) -> impl Iterator<Item = Uuid> + '_ {
        self.results.iter().filter_map(|r| match &r.outcome {
            TemplateOutcome::Existing { instance_id } => Some(*instance_id),
            _ => None,
        })
    }

    pub fn failures(&self) -> impl Iterator<Item = &TemplateResult> {
        self.results
            .iter()
            .filter(|r| matches!(r.outcome, TemplateOutcome::Failed { .. }))
    }
}

pub struct Scheduler<'a, S: Store> {
    store: &'a S,
    notifier: &'a dyn Notifier,
    rng: StdRng,
}

impl<'a, S: Store> Scheduler<'a, S> {
    pub fn new(store: &'a S, notifier: &'a dyn Notifier) -> Self {
        Self {
            store,
            notifier,
            rng: StdRng::from_os_rng(),
        }
    }

    /// Reproducible jitter
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Create the instances due in `period`, optionally limited to some templates.
    pub fn generate(&mut self, period: Period, templates: Option<&[Uuid]>) -> Result<GenerationReport> {
        let rng = &mut self.rng;
        let report = self
            .store
            .transact(|ledger| run(ledger, period, templates, false, rng))?;

        let created = report.created().count();
        tracing::info!(
            period = %period,
            created,
            existing = report.existing().count(),
            failed = report.failures().count(),
            "generation committed"
        );
        dispatch(self.notifier, &assignment_notifications(&report));
        Ok(report)
    }

    /// Same selection as [`generate`](Self::generate), run on a copy of the ledger.
    pub fn preview(&mut self, period: Period, templates: Option<&[Uuid]>) -> Result<GenerationReport> {
        let mut ledger = self.store.read()?;
        run(&mut ledger, period, templates, true, &mut self.rng)
    }

    /// Generate several periods in order, each in its own transaction.
    pub fn generate_batch(
        &mut self,
        periods: &[Period],
        templates: Option<&[Uuid]>,
        preview: bool,
    ) -> BTreeMap<Period, Result<GenerationReport>> {
        let mut ordered = periods.to_vec();
        ordered.sort();
        ordered.dedup();

        let mut results = BTreeMap::new();
        if preview {
            // One working copy so later periods see earlier picks.
            let mut ledger = match self.store.read() {
                Ok(ledger) => ledger,
                Err(err) => {
                    let message = err.to_string();
                    for period in ordered {
                        results.insert(period, Err(Error::State(format!("preview unavailable: {message}"))));
                    }
                    return results;
                }
            };
            for period in ordered {
                let report = run(&mut ledger, period, templates, true, &mut self.rng);
                results.insert(period, report);
            }
            return results;
        }

        for period in ordered {
            let report = self.generate(period, templates);
            if let Err(err) = &report {
                tracing::warn!(period = %period, error = %err, "generation failed for period");
            }
            results.insert(period, report);
        }
        results
    }
}

fn run<R: Rng + ?Sized>(
    ledger: &mut Ledger,
    period: Period,
    filter: Option<&[Uuid]>,
    preview: bool,
    rng: &mut R,
) -> Result<GenerationReport> {
    if let Some(ids) = filter {
        for id in ids {
            ledger.template(*id)?;
        }
    }

    let due: Vec<(Uuid, String)> = ledger
        .templates
        .iter()
        .filter(|t| filter.map_or(true, |ids| ids.contains(&t.id)))
        .filter(|t| {
            let fires = t.active && t.fires_for(&period);
            if !fires {
                tracing::debug!(template = %t.name, period = %period, active = t.active, "template not due");
            }
            fires
        })
        .map(|t| (t.id, t.name.clone()))
        .collect();

    let mut results = Vec::with_capacity(due.len());
    for (template_id, template_name) in due {
        let outcome = match generate_one(ledger, template_id, period, rng) {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::warn!(template = %template_name, period = %period, error = %err, "template skipped");
                TemplateOutcome::Failed {
                    error: err.to_string(),
                    kind: err.kind(),
                    details: err.details(),
                }
            }
        };
        results.push(TemplateResult {
            template_id,
            template_name,
            outcome,
        });
    }

    Ok(GenerationReport {
        period,
        preview,
        results,
    })
}

fn generate_one<R: Rng + ?Sized>(
    ledger: &mut Ledger,
    template_id: Uuid,
    period: Period,
    rng: &mut R,
) -> Result<TemplateOutcome> {
    if let Some(existing) = ledger.instance_for(template_id, period) {
        tracing::debug!(instance = %existing.id, period = %period, "instance already exists");
        return Ok(TemplateOutcome::Existing {
            instance_id: existing.id,
        });
    }

    let template = ledger.template(template_id)?.clone();
    let window = template.execution_window(&period)?;
    let queue = ledger.queue(template.queue_id)?.clone();
    let members: Vec<QueueMember> = ledger.members_of(queue.id).cloned().collect();
    let open_assignments = ledger.open_assignments_at(window.start);
    let recent_pairs = ledger.recent_pairs(queue.id, period, queue.conflict_window_months);

    let input = ScoringInput {
        queue: &queue,
        members: &members,
        target: period,
        open_assignments: &open_assignments,
        recent_pairs: &recent_pairs,
    };
    let selection = scorer::select(&input, template.people.default as usize, &template.name, rng)?;
    if selection.relaxed_conflicts {
        tracing::debug!(template = %template.name, period = %period, "conflict filter relaxed to fill slots");
    }

    let instance = TaskInstance::new(
        &template,
        period,
        window,
        selection.user_ids(),
        AssignmentMethod::FairRotation,
    )?;
    let instance = ledger.insert_instance(instance)?.clone();

    for score in &selection.ranking.eligible {
        if let Some(member) = ledger.member_mut(queue.id, &score.user_id) {
            member.priority_score = score.score;
        }
    }
    for user in &instance.current_assignees {
        if let Some(member) = ledger.member_mut(queue.id, user) {
            member.record_assignment(period);
        }
    }

    Ok(TemplateOutcome::Created {
        instance,
        selection,
    })
}

fn assignment_notifications(report: &GenerationReport) -> Vec<Notification> {
    report
        .created()
        .map(|instance| {
            Notification::new(
                NotificationKind::NewAssignment,
                instance.id,
                instance.current_assignees.clone(),
            )
            .with_context(serde_json::json!({
                "template": instance.template_name,
                "period": instance.period,
                "window_start": instance.window.start,
                "window_end": instance.window.end,
                "primary": instance.primary_assignee(),
            }))
        })
        .collect()
}
