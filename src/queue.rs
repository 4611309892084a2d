//! Rotation queues and their members
//!
//! A queue is the pool of people eligible for a template. Each member entry
//! carries the history the scorer reads (assignment count, last period,
//! completion record) and the member's availability for upcoming periods.
//!
//! Member entries are created lazily and only ever soft-deactivated, so the
//! fairness history survives someone leaving and rejoining.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::period::Period;

/// Opaque user identifier
pub type UserId = String;

/// Completion rate a member starts with before any history exists
pub const INITIAL_COMPLETION_RATE: f64 = 100.0;

// =============================================================================
// Queue
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RotationQueue {
    pub id: Uuid,
    pub name: String,
    /// Minimum number of months between two assignments of the same member
    pub min_gap_months: u32,
    /// Scale of the random tie-breaking term, 0.0 ..= 1.0
    pub random_factor: f64,
    /// Whether open commitments lower a member's score
    pub consider_workload: bool,
    /// Whether swap and transfer requests also need an administrator
    #[serde(default)]
    pub require_admin_approval: bool,
    /// Look-back window for the pairwise conflict filter
    #[serde(default = "default_conflict_window")]
    pub conflict_window_months: u32,
    pub created_at: DateTime<Utc>,
}

fn default_conflict_window() -> u32 {
    2
}

impl RotationQueue {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            min_gap_months: 1,
            random_factor: 0.0,
            consider_workload: false,
            require_admin_approval: false,
            conflict_window_months: default_conflict_window(),
            created_at: Utc::now(),
        }
    }

    pub fn with_min_gap(mut self, months: u32) -> Self {
        self.min_gap_months = months;
        self
    }

    pub fn with_random_factor(mut self, factor: f64) -> Self {
        self.random_factor = factor;
        self
    }

    pub fn with_workload(mut self, enabled: bool) -> Self {
        self.consider_workload = enabled;
        self
    }

    pub fn with_admin_approval(mut self, required: bool) -> Self {
        self.require_admin_approval = required;
        self
    }

    pub fn with_conflict_window(mut self, months: u32) -> Self {
        self.conflict_window_months = months;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::Validation("queue name cannot be empty".to_string()));
        }
        if !(0.0..=1.0).contains(&self.random_factor) {
            return Err(Error::Validation(format!(
                "random factor must be between 0 and 1 (got {})",
                self.random_factor
            )));
        }
        Ok(())
    }
}

// =============================================================================
// Availability
// =============================================================================

/// A member's stated preference for a period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Preference {
    Preferred,
    Neutral,
    Avoid,
}

impl fmt::Display for Preference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Preference::Preferred => write!(f, "preferred"),
            Preference::Neutral => write!(f, "neutral"),
            Preference::Avoid => write!(f, "avoid"),
        }
    }
}

impl FromStr for Preference {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "preferred" | "prefer" => Ok(Preference::Preferred),
            "neutral" => Ok(Preference::Neutral),
            "avoid" => Ok(Preference::Avoid),
            _ => Err(Error::Validation(format!(
                "Invalid preference '{}'. Expected: preferred, neutral, avoid",
                s
            ))),
        }
    }
}

/// Resolved availability of a member for one period
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AvailabilityStatus {
    Unavailable,
    Available(Preference),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Availability {
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub excluded_periods: BTreeSet<Period>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub period_preference: BTreeMap<Period, Preference>,
}

impl Availability {
    pub fn status_for(&self, period: &Period) -> AvailabilityStatus {
        if self.excluded_periods.contains(period) {
            return AvailabilityStatus::Unavailable;
        }
        let preference = self
            .period_preference
            .get(period)
            .copied()
            .unwrap_or(Preference::Neutral);
        AvailabilityStatus::Available(preference)
    }

    pub fn exclude(&mut self, period: Period) {
        self.period_preference.remove(&period);
        self.excluded_periods.insert(period);
    }

    pub fn prefer(&mut self, period: Period, preference: Preference) {
        self.excluded_periods.remove(&period);
        if preference == Preference::Neutral {
            self.period_preference.remove(&period);
        } else {
            self.period_preference.insert(period, preference);
        }
    }

    pub fn clear(&mut self, period: &Period) {
        self.excluded_periods.remove(period);
        self.period_preference.remove(period);
    }

    pub fn is_empty(&self) -> bool {
        self.excluded_periods.is_empty() && self.period_preference.is_empty()
    }
}

// =============================================================================
// Member
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueMember {
    pub queue_id: Uuid,
    pub user_id: UserId,
    pub is_active: bool,
    pub total_assignments: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_assigned_period: Option<Period>,
    /// Percentage 0..=100
    pub completion_rate: f64,
    #[serde(default)]
    pub completed_count: u32,
    #[serde(default)]
    pub timed_completions: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average_completion_hours: Option<f64>,
    /// Score from the most recent ranking, for display only
    #[serde(default)]
    pub priority_score: f64,
    #[serde(default, skip_serializing_if = "Availability::is_empty")]
    pub availability: Availability,
    pub joined_at: DateTime<Utc>,
}

impl QueueMember {
    pub fn new(queue_id: Uuid, user_id: impl Into<UserId>) -> Self {
        Self {
            queue_id,
            user_id: user_id.into(),
            is_active: true,
            total_assignments: 0,
            last_assigned_period: None,
            completion_rate: INITIAL_COMPLETION_RATE,
            completed_count: 0,
            timed_completions: 0,
            average_completion_hours: None,
            priority_score: 0.0,
            availability: Availability::default(),
            joined_at: Utc::now(),
        }
    }

    /// Record that the member was picked for `period`.
    pub fn record_assignment(&mut self, period: Period) {
        self.total_assignments += 1;
        self.last_assigned_period = Some(match self.last_assigned_period {
            Some(previous) if previous > period => previous,
            _ => period,
        });
    }

    /// Undo the count of an assignment handed to someone else.
    pub fn release_assignment(&mut self) {
        self.total_assignments = self.total_assignments.saturating_sub(1);
    }

    /// Fold one completion into the running statistics in O(1).
    ///
    /// `pending` is the number of the member's assignments that are still
    /// open and not yet due; they stay out of the completion rate.
    pub fn record_completion(&mut self, duration_hours: Option<f64>, pending: u32) {
        self.completed_count += 1;
        self.refresh_completion_rate(pending);

        if let Some(hours) = duration_hours.filter(|h| h.is_finite() && *h >= 0.0) {
            self.timed_completions += 1;
            let n = f64::from(self.timed_completions);
            let average = self.average_completion_hours.unwrap_or(0.0);
            self.average_completion_hours = Some(average + (hours - average) / n);
        }
    }

    pub fn deactivate(&mut self) {
        self.is_active = false;
    }

    pub fn reactivate(&mut self) {
        self.is_active = true;
    }

    /// Completed share of resolved assignments (completed or past due).
    pub fn refresh_completion_rate(&mut self, pending: u32) {
        let resolved = self.total_assignments.saturating_sub(pending);
        if resolved == 0 {
            self.completion_rate = INITIAL_COMPLETION_RATE;
            return;
        }
        let rate = f64::from(self.completed_count) / f64::from(resolved) * 100.0;
        self.completion_rate = rate.clamp(0.0, 100.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> Period {
        s.parse().unwrap()
    }

    #[test]
    fn availability_exclusion_wins_over_preference() {
        let mut availability = Availability::default();
        availability.prefer(p("2024-05"), Preference::Preferred);
        assert_eq!(
            availability.status_for(&p("2024-05")),
            AvailabilityStatus::Available(Preference::Preferred)
        );

        availability.exclude(p("2024-05"));
        assert_eq!(
            availability.status_for(&p("2024-05")),
            AvailabilityStatus::Unavailable
        );

        availability.clear(&p("2024-05"));
        assert_eq!(
            availability.status_for(&p("2024-05")),
            AvailabilityStatus::Available(Preference::Neutral)
        );
        assert!(availability.is_empty());
    }

    #[test]
    fn record_assignment_keeps_latest_period() {
        let mut member = QueueMember::new(Uuid::new_v4(), "u1");
        member.record_assignment(p("2024-04"));
        member.record_assignment(p("2024-02"));
        assert_eq!(member.total_assignments, 2);
        assert_eq!(member.last_assigned_period, Some(p("2024-04")));
    }

    #[test]
    fn released_assignment_is_uncounted() {
        let mut member = QueueMember::new(Uuid::new_v4(), "u1");
        member.record_assignment(p("2024-04"));
        member.release_assignment();
        member.release_assignment();
        assert_eq!(member.total_assignments, 0);
        assert_eq!(member.completion_rate, INITIAL_COMPLETION_RATE);
    }

    #[test]
    fn open_assignments_leave_the_rate_alone() {
        let mut member = QueueMember::new(Uuid::new_v4(), "u1");
        member.record_assignment(p("2024-04"));
        assert_eq!(member.completion_rate, INITIAL_COMPLETION_RATE);

        member.refresh_completion_rate(1);
        assert_eq!(member.completion_rate, INITIAL_COMPLETION_RATE);

        member.refresh_completion_rate(0);
        assert_eq!(member.completion_rate, 0.0);
    }

    #[test]
    fn completion_statistics_are_incremental() {
        let mut member = QueueMember::new(Uuid::new_v4(), "u1");
        for period in ["2024-01", "2024-02", "2024-03", "2024-04", "2024-05"] {
            member.record_assignment(p(period));
        }
        assert_eq!(member.completion_rate, INITIAL_COMPLETION_RATE);

        member.record_completion(Some(2.0), 3);
        member.record_completion(Some(4.0), 2);
        member.record_completion(None, 1);

        assert_eq!(member.completed_count, 3);
        assert_eq!(member.timed_completions, 2);
        assert!((member.completion_rate - 75.0).abs() < 1e-9);
        assert!((member.average_completion_hours.unwrap() - 3.0).abs() < 1e-9);
    }

    #[test]
    fn queue_validation() {
        assert!(RotationQueue::new("q").with_random_factor(0.5).validate().is_ok());
        assert!(RotationQueue::new("q").with_random_factor(1.5).validate().is_err());
        assert!(RotationQueue::new(" ").validate().is_err());
    }

    #[test]
    fn preference_parse() {
        assert_eq!(Preference::from_str("prefer").unwrap(), Preference::Preferred);
        assert_eq!(Preference::from_str("AVOID").unwrap(), Preference::Avoid);
        assert!(Preference::from_str("maybe").is_err());
    }
}
