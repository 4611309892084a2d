//! Task templates
//!
//! A template is the recurring definition of a duty: how often it fires,
//! which days of the period it should be carried out on, and how many
//! people it needs. Templates are never deleted once instances reference
//! them; they are deactivated instead.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::period::Period;

// =============================================================================
// Cadence
// =============================================================================

/// How often a template fires, counted from its start period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cadence {
    Monthly,
    Quarterly,
    Annual,
    OneTime,
}

impl Cadence {
    /// Step between firing periods, in months. `None` for one-off templates.
    pub fn step_months(&self) -> Option<i32> {
        match self {
            Cadence::Monthly => Some(1),
            Cadence::Quarterly => Some(3),
            Cadence::Annual => Some(12),
            Cadence::OneTime => None,
        }
    }
}

impl fmt::Display for Cadence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cadence::Monthly => write!(f, "monthly"),
            Cadence::Quarterly => write!(f, "quarterly"),
            Cadence::Annual => write!(f, "annual"),
            Cadence::OneTime => write!(f, "one_time"),
        }
    }
}

impl FromStr for Cadence {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "monthly" => Ok(Cadence::Monthly),
            "quarterly" => Ok(Cadence::Quarterly),
            "annual" | "yearly" => Ok(Cadence::Annual),
            "one_time" | "one-time" | "once" => Ok(Cadence::OneTime),
            _ => Err(Error::Validation(format!(
                "Invalid cadence '{}'. Expected: monthly, quarterly, annual, one_time",
                s
            ))),
        }
    }
}

impl Default for Cadence {
    fn default() -> Self {
        Cadence::Monthly
    }
}

// =============================================================================
// Priority
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    Low,
    Medium,
    High,
}

impl fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskPriority::Low => write!(f, "low"),
            TaskPriority::Medium => write!(f, "medium"),
            TaskPriority::High => write!(f, "high"),
        }
    }
}

impl FromStr for TaskPriority {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "low" => Ok(TaskPriority::Low),
            "medium" | "med" => Ok(TaskPriority::Medium),
            "high" => Ok(TaskPriority::High),
            _ => Err(Error::Validation(format!(
                "Invalid priority '{}'. Expected: low, medium, high",
                s
            ))),
        }
    }
}

impl Default for TaskPriority {
    fn default() -> Self {
        TaskPriority::Medium
    }
}

// =============================================================================
// People bounds
// =============================================================================

/// How many people an instance of the template needs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeopleBounds {
    pub min: u32,
    pub max: u32,
    pub default: u32,
}

impl PeopleBounds {
    pub fn new(min: u32, max: u32, default: u32) -> Result<Self> {
        let bounds = Self { min, max, default };
        bounds.validate()?;
        Ok(bounds)
    }

    pub fn single() -> Self {
        Self {
            min: 1,
            max: 1,
            default: 1,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.min < 1 {
            return Err(Error::Validation(
                "min_people must be at least 1".to_string(),
            ));
        }
        if !(self.min <= self.default && self.default <= self.max) {
            return Err(Error::Validation(format!(
                "people bounds must satisfy min <= default <= max (got {}/{}/{})",
                self.min, self.default, self.max
            )));
        }
        Ok(())
    }

    pub fn contains(&self, count: usize) -> bool {
        count >= self.min as usize && count <= self.max as usize
    }
}

impl Default for PeopleBounds {
    fn default() -> Self {
        Self::single()
    }
}

// =============================================================================
// Window rule
// =============================================================================

/// Largest offset a relative window may shift either edge by.
pub const MAX_OFFSET_DAYS: i64 = 366;

/// Rule turning a period into a concrete execution window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WindowRule {
    /// Literal day-of-month range, clamped to the month's length
    Fixed { start_day: u32, end_day: u32 },
    /// Offsets in days from the first and last day of the period
    Relative {
        start_offset_days: i64,
        end_offset_days: i64,
    },
}

impl WindowRule {
    pub fn validate(&self) -> Result<()> {
        match *self {
            WindowRule::Fixed { start_day, end_day } => {
                if !(1..=31).contains(&start_day) || !(1..=31).contains(&end_day) {
                    return Err(Error::Validation(format!(
                        "fixed window days must be 1-31 (got {start_day}-{end_day})"
                    )));
                }
                if start_day > end_day {
                    return Err(Error::Validation(format!(
                        "fixed window start day {start_day} is after end day {end_day}"
                    )));
                }
                Ok(())
            }
            WindowRule::Relative {
                start_offset_days,
                end_offset_days,
            } => {
                for offset in [start_offset_days, end_offset_days] {
                    if offset.abs() > MAX_OFFSET_DAYS {
                        return Err(Error::Validation(format!(
                            "relative window offset {offset} exceeds {MAX_OFFSET_DAYS} days"
                        )));
                    }
                }
                Ok(())
            }
        }
    }

    /// Compute the execution window for a period.
    pub fn window_for(&self, period: &Period) -> Result<ExecutionWindow> {
        self.validate()?;
        let (start, end) = match *self {
            WindowRule::Fixed { start_day, end_day } => {
                let last = period.days_in_month();
                let first = period.first_day();
                let start = first + Duration::days(i64::from(start_day.min(last)) - 1);
                let end = first + Duration::days(i64::from(end_day.min(last)) - 1);
                (start, end)
            }
            WindowRule::Relative {
                start_offset_days,
                end_offset_days,
            } => {
                let shift = |day: NaiveDate, offset: i64| {
                    day.checked_add_signed(Duration::days(offset)).ok_or_else(|| {
                        Error::Validation(format!(
                            "relative window offset {offset} leaves the calendar range"
                        ))
                    })
                };
                (
                    shift(period.first_day(), start_offset_days)?,
                    shift(period.last_day(), end_offset_days)?,
                )
            }
        };
        ExecutionWindow::new(start, end)
    }
}

impl fmt::Display for WindowRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WindowRule::Fixed { start_day, end_day } => write!(f, "fixed:{start_day}-{end_day}"),
            WindowRule::Relative {
                start_offset_days,
                end_offset_days,
            } => write!(f, "relative:{start_offset_days},{end_offset_days}"),
        }
    }
}

impl FromStr for WindowRule {
    type Err = Error;

    /// Parses `fixed:<start>-<end>` or `relative:<start_offset>,<end_offset>`.
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || {
            Error::Validation(format!(
                "Invalid window '{}'. Expected: fixed:<start>-<end> or relative:<start>,<end>",
                s
            ))
        };

        let rule = if let Some(range) = s.strip_prefix("fixed:") {
            let (start, end) = range.split_once('-').ok_or_else(invalid)?;
            WindowRule::Fixed {
                start_day: start.trim().parse().map_err(|_| invalid())?,
                end_day: end.trim().parse().map_err(|_| invalid())?,
            }
        } else if let Some(offsets) = s.strip_prefix("relative:") {
            let (start, end) = offsets.split_once(',').ok_or_else(invalid)?;
            WindowRule::Relative {
                start_offset_days: start.trim().parse().map_err(|_| invalid())?,
                end_offset_days: end.trim().parse().map_err(|_| invalid())?,
            }
        } else {
            return Err(invalid());
        };

        rule.validate()?;
        Ok(rule)
    }
}

impl Default for WindowRule {
    fn default() -> Self {
        WindowRule::Relative {
            start_offset_days: 0,
            end_offset_days: 0,
        }
    }
}

/// Concrete start/end dates (inclusive) for carrying out an instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl ExecutionWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if end < start {
            return Err(Error::Validation(format!(
                "execution window ends ({end}) before it starts ({start})"
            )));
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// True if the window overlaps `date` or lies entirely after it.
    pub fn reaches(&self, date: NaiveDate) -> bool {
        self.end >= date
    }

    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }
}

// =============================================================================
// Template
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskTemplate {
    pub id: Uuid,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub cadence: Cadence,
    /// First period the template fires for; cadence steps are counted from here
    pub start_period: Period,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub active: bool,
    pub people: PeopleBounds,
    pub window: WindowRule,
    pub priority: TaskPriority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_hours: Option<f64>,
    pub queue_id: Uuid,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TaskTemplate {
    pub fn builder(name: impl Into<String>, queue_id: Uuid) -> TemplateBuilder {
        TemplateBuilder::new(name, queue_id)
    }

    /// Whether the template produces an instance for `period`.
    pub fn fires_for(&self, period: &Period) -> bool {
        if !self.active {
            return false;
        }
        let elapsed = period.months_since(&self.start_period);
        if elapsed < 0 {
            return false;
        }
        match self.cadence.step_months() {
            Some(step) => elapsed % step == 0,
            None => elapsed == 0,
        }
    }

    pub fn execution_window(&self, period: &Period) -> Result<ExecutionWindow> {
        self.window.window_for(period)
    }

    pub fn deactivate(&mut self) {
        self.active = false;
        self.updated_at = Utc::now();
    }

    pub fn activate(&mut self) {
        self.active = true;
        self.updated_at = Utc::now();
    }

    pub fn set_people(&mut self, people: PeopleBounds) -> Result<()> {
        people.validate()?;
        self.people = people;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::Validation(
                "template name cannot be empty".to_string(),
            ));
        }
        self.people.validate()?;
        self.window.validate()?;
        if let Some(hours) = self.estimated_hours {
            if !hours.is_finite() || hours < 0.0 {
                return Err(Error::Validation(format!(
                    "estimated hours must be a non-negative number (got {hours})"
                )));
            }
        }
        Ok(())
    }
}

// =============================================================================
// Template Builder
// =============================================================================

pub struct TemplateBuilder {
    name: String,
    queue_id: Uuid,
    description: Option<String>,
    cadence: Cadence,
    start_period: Option<Period>,
    category: Option<String>,
    people: PeopleBounds,
    window: WindowRule,
    priority: TaskPriority,
    estimated_hours: Option<f64>,
    created_by: String,
}

impl TemplateBuilder {
    pub fn new(name: impl Into<String>, queue_id: Uuid) -> Self {
        Self {
            name: name.into(),
            queue_id,
            description: None,
            cadence: Cadence::default(),
            start_period: None,
            category: None,
            people: PeopleBounds::default(),
            window: WindowRule::default(),
            priority: TaskPriority::default(),
            estimated_hours: None,
            created_by: "unknown".to_string(),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn cadence(mut self, cadence: Cadence) -> Self {
        self.cadence = cadence;
        self
    }

    pub fn start_period(mut self, period: Period) -> Self {
        self.start_period = Some(period);
        self
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn people(mut self, people: PeopleBounds) -> Self {
        self.people = people;
        self
    }

    pub fn window(mut self, window: WindowRule) -> Self {
        self.window = window;
        self
    }

    pub fn priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn estimated_hours(mut self, hours: f64) -> Self {
        self.estimated_hours = Some(hours);
        self
    }

    pub fn created_by(mut self, actor: impl Into<String>) -> Self {
        self.created_by = actor.into();
        self
    }

    pub fn build(self) -> Result<TaskTemplate> {
        let now = Utc::now();
        let template = TaskTemplate {
            id: Uuid::new_v4(),
            name: self.name.trim().to_string(),
            description: self.description,
            cadence: self.cadence,
            start_period: self.start_period.unwrap_or_else(Period::current),
            category: self.category,
            active: true,
            people: self.people,
            window: self.window,
            priority: self.priority,
            estimated_hours: self.estimated_hours,
            queue_id: self.queue_id,
            created_by: self.created_by,
            created_at: now,
            updated_at: now,
        };
        template.validate()?;
        Ok(template)
    }
}

// =============================================================================
// Tests
// =============================================================================
