//! rota template command implementation

use crate::cli::Context;
use crate::error::Result;
use crate::identity::require_admin;
use crate::output::{emit_success, HumanOutput};
use crate::period::Period;
use crate::store::Store;
use crate::template::{Cadence, PeopleBounds, TaskPriority, TaskTemplate, WindowRule};

/// Options for `template add`
pub struct AddOptions {
    pub name: String,
    pub queue: String,
    pub cadence: String,
    pub start: Option<String>,
    pub min: u32,
    pub max: u32,
    pub default_people: u32,
    pub window: String,
    pub priority: String,
    pub hours: Option<f64>,
    pub category: Option<String>,
    pub description: Option<String>,
}

pub fn run_add(ctx: &Context, options: AddOptions) -> Result<()> {
    require_admin(&ctx.directory, &ctx.actor, "create templates")?;
    let cadence: Cadence = options.cadence.parse()?;
    let window: WindowRule = options.window.parse()?;
    let priority: TaskPriority = options.priority.parse()?;
    let people = PeopleBounds::new(options.min, options.max, options.default_people)?;
    let start = options
        .start
        .as_deref()
        .map(str::parse::<Period>)
        .transpose()?;

    let template = ctx.store.transact(|ledger| {
        let queue_id = ledger.find_queue(&options.queue)?.id;
        let mut builder = TaskTemplate::builder(options.name.as_str(), queue_id)
            .cadence(cadence)
            .window(window)
            .priority(priority)
            .people(people)
            .created_by(ctx.actor.as_str());
        if let Some(start) = start {
            builder = builder.start_period(start);
        }
        if let Some(hours) = options.hours {
            builder = builder.estimated_hours(hours);
        }
        if let Some(category) = options.category.as_deref() {
            builder = builder.category(category);
        }
        if let Some(description) = options.description.as_deref() {
            builder = builder.description(description);
        }
        Ok(ledger.add_template(builder.build()?)?.clone())
    })?;
    tracing::info!(template = %template.name, actor = %ctx.actor, "template created");

    let mut human = HumanOutput::new(format!("rota template add: {}", template.name));
    human.push_summary("id", template.id.to_string());
    human.push_summary("cadence", template.cadence.to_string());
    human.push_summary("starts", template.start_period.to_string());
    human.push_summary("window", template.window.to_string());
    human.push_summary(
        "people",
        format!(
            "{} (min {}, max {})",
            template.people.default, template.people.min, template.people.max
        ),
    );
    human.push_next_step(format!("rota generate {} --preview", template.start_period));

    emit_success(ctx.output, "template add", &template, Some(&human))
}

pub fn run_list(ctx: &Context) -> Result<()> {
    let ledger = ctx.store.read()?;
    let mut human = HumanOutput::new(format!(
        "rota template list: {} template(s)",
        ledger.templates.len()
    ));
    for template in &ledger.templates {
        let queue = ledger
            .queue(template.queue_id)
            .map(|q| q.name.as_str())
            .unwrap_or("?");
        human.push_detail(format!(
            "{} [{}{}] queue={} people={} window={}",
            template.name,
            template.cadence,
            if template.active { "" } else { ", inactive" },
            queue,
            template.people.default,
            template.window
        ));
    }
    emit_success(ctx.output, "template list", &ledger.templates, Some(&human))
}

pub fn run_set_active(ctx: &Context, reference: &str, active: bool) -> Result<()> {
    require_admin(&ctx.directory, &ctx.actor, "change templates")?;
    let template = ctx.store.transact(|ledger| {
        let id = ledger.find_template(reference)?.id;
        let template = ledger.template_mut(id)?;
        if active {
            template.activate();
        } else {
            template.deactivate();
        }
        Ok(template.clone())
    })?;

    let command = if active {
        "template activate"
    } else {
        "template deactivate"
    };
    let human = HumanOutput::new(format!("rota {}: {}", command, template.name));
    emit_success(ctx.output, command, &template, Some(&human))
}
