//! Fair rotation scoring
//!
//! Ranks the members of a queue for a target period. Higher scores are
//! assigned sooner. The score is the sum of independent terms so every
//! ranking can be explained term by term:
//!
//! | term          | value                                                        |
//! |---------------|--------------------------------------------------------------|
//! | base          | `100`                                                        |
//! | recency       | `gap_months × 20`, or `+200` if never assigned               |
//! | workload      | `(queue_avg_open − member_open) × 30` (queue opt-in)         |
//! | completion    | `(completion_rate/100 − 0.8) × 50`                           |
//! | speed         | `(queue_avg_hours − member_avg_hours) × 5`, clamped to ±20   |
//! | fairness      | `(queue_avg_total − member_total) × 25`                      |
//! | availability  | `+50` preferred, `−100` avoid                                |
//! | jitter        | uniform `[−1, 1] × random_factor × 100`, drawn last           |
//!
//! Members inside the minimum gap or marked unavailable are ineligible and
//! never appear in the ranking. Scoring has no side effects; the caller owns
//! the random source and persists any statistics.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use rand::Rng;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::period::Period;
use crate::queue::{AvailabilityStatus, Preference, QueueMember, RotationQueue, UserId};

pub const BASE_SCORE: f64 = 100.0;
pub const RECENCY_PER_MONTH: f64 = 20.0;
pub const NEW_MEMBER_BONUS: f64 = 200.0;
pub const WORKLOAD_WEIGHT: f64 = 30.0;
pub const COMPLETION_BASELINE: f64 = 0.8;
pub const COMPLETION_WEIGHT: f64 = 50.0;
pub const SPEED_PER_HOUR: f64 = 5.0;
pub const SPEED_CAP: f64 = 20.0;
pub const FAIRNESS_WEIGHT: f64 = 25.0;
pub const PREFERRED_BONUS: f64 = 50.0;
pub const AVOID_PENALTY: f64 = -100.0;
pub const JITTER_SCALE: f64 = 100.0;

/// Per-term contributions to a member's score
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    pub base: f64,
    pub recency: f64,
    pub workload: f64,
    pub completion: f64,
    pub speed: f64,
    pub fairness: f64,
    pub availability: f64,
    pub jitter: f64,
}

impl ScoreBreakdown {
    pub fn total(&self) -> f64 {
        self.base
            + self.recency
            + self.workload
            + self.completion
            + self.speed
            + self.fairness
            + self.availability
            + self.jitter
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemberScore {
    pub user_id: UserId,
    pub score: f64,
    pub breakdown: ScoreBreakdown,
}

/// Why a member was left out of the candidate list
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Ineligibility {
    Inactive,
    TooRecent {
        last_assigned: Period,
        gap_months: i32,
        min_gap_months: u32,
    },
    Unavailable,
}

/// Everything the scorer reads. Built by the caller from stored state.
#[derive(Debug, Clone)]
pub struct ScoringInput<'a> {
    pub queue: &'a RotationQueue,
    pub members: &'a [QueueMember],
    pub target: Period,
    /// Open assignments per user whose window reaches the target date
    pub open_assignments: &'a HashMap<UserId, usize>,
    /// Unordered pairs (see [`pair_key`]) jointly assigned within the conflict window
    pub recent_pairs: &'a HashSet<(UserId, UserId)>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Ranking {
    pub eligible: Vec<MemberScore>,
    pub ineligible: Vec<(UserId, Ineligibility)>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Selection {
    pub selected: Vec<MemberScore>,
    /// True when the pairwise conflict filter had to be relaxed to fill all slots
    pub relaxed_conflicts: bool,
    pub ranking: Ranking,
}

impl Selection {
    pub fn user_ids(&self) -> Vec<UserId> {
        self.selected.iter().map(|s| s.user_id.clone()).collect()
    }
}

/// Canonical ordering for an unordered pair of users.
pub fn pair_key(a: &str, b: &str) -> (UserId, UserId) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

struct QueueAverages {
    total_assignments: f64,
    open_assignments: f64,
    completion_hours: Option<f64>,
}

fn queue_averages(input: &ScoringInput<'_>) -> QueueAverages {
    let active: Vec<&QueueMember> = input.members.iter().filter(|m| m.is_active).collect();
    if active.is_empty() {
        return QueueAverages {
            total_assignments: 0.0,
            open_assignments: 0.0,
            completion_hours: None,
        };
    }

    let count = active.len() as f64;
    let total_assignments =
        active.iter().map(|m| f64::from(m.total_assignments)).sum::<f64>() / count;
    let open_assignments = active
        .iter()
        .map(|m| input.open_assignments.get(&m.user_id).copied().unwrap_or(0) as f64)
        .sum::<f64>()
        / count;

    let timed: Vec<f64> = active
        .iter()
        .filter_map(|m| m.average_completion_hours)
        .collect();
    let completion_hours = if timed.is_empty() {
        None
    } else {
        Some(timed.iter().sum::<f64>() / timed.len() as f64)
    };

    QueueAverages {
        total_assignments,
        open_assignments,
        completion_hours,
    }
}

fn eligibility(
    member: &QueueMember,
    queue: &RotationQueue,
    target: &Period,
) -> std::result::Result<Preference, Ineligibility> {
    if !member.is_active {
        return Err(Ineligibility::Inactive);
    }
    if let Some(last) = member.last_assigned_period {
        let gap = target.months_since(&last);
        if gap < queue.min_gap_months as i32 {
            return Err(Ineligibility::TooRecent {
                last_assigned: last,
                gap_months: gap,
                min_gap_months: queue.min_gap_months,
            });
        }
    }
    match member.availability.status_for(target) {
        AvailabilityStatus::Unavailable => Err(Ineligibility::Unavailable),
        AvailabilityStatus::Available(preference) => Ok(preference),
    }
}

fn breakdown_for(
    member: &QueueMember,
    preference: Preference,
    input: &ScoringInput<'_>,
    averages: &QueueAverages,
) -> ScoreBreakdown {
    let recency = match member.last_assigned_period {
        Some(last) => f64::from(input.target.months_since(&last)) * RECENCY_PER_MONTH,
        None => NEW_MEMBER_BONUS,
    };

    let workload = if input.queue.consider_workload {
        let open = input
            .open_assignments
            .get(&member.user_id)
            .copied()
            .unwrap_or(0) as f64;
        (averages.open_assignments - open) * WORKLOAD_WEIGHT
    } else {
        0.0
    };

    let completion = (member.completion_rate / 100.0 - COMPLETION_BASELINE) * COMPLETION_WEIGHT;

    let speed = match (averages.completion_hours, member.average_completion_hours) {
        (Some(queue_avg), Some(member_avg)) => {
            ((queue_avg - member_avg) * SPEED_PER_HOUR).clamp(-SPEED_CAP, SPEED_CAP)
        }
        _ => 0.0,
    };

    let fairness =
        (averages.total_assignments - f64::from(member.total_assignments)) * FAIRNESS_WEIGHT;

    let availability = match preference {
        Preference::Preferred => PREFERRED_BONUS,
        Preference::Neutral => 0.0,
        Preference::Avoid => AVOID_PENALTY,
    };

    ScoreBreakdown {
        base: BASE_SCORE,
        recency,
        workload,
        completion,
        speed,
        fairness,
        availability,
        jitter: 0.0,
    }
}

fn by_score_desc(a: &MemberScore, b: &MemberScore) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.user_id.cmp(&b.user_id))
}

/// Score every member and return eligible ones ranked best first.
pub fn rank<R: Rng + ?Sized>(input: &ScoringInput<'_>, rng: &mut R) -> Ranking {
    let averages = queue_averages(input);
    let jitter_range = input.queue.random_factor * JITTER_SCALE;
    let mut ranking = Ranking::default();

    for member in input.members {
        match eligibility(member, input.queue, &input.target) {
            Err(reason) => ranking.ineligible.push((member.user_id.clone(), reason)),
            Ok(preference) => {
                let mut breakdown = breakdown_for(member, preference, input, &averages);
                if jitter_range > 0.0 {
                    breakdown.jitter = rng.random_range(-1.0..=1.0) * jitter_range;
                }
                ranking.eligible.push(MemberScore {
                    user_id: member.user_id.clone(),
                    score: breakdown.total(),
                    breakdown,
                });
            }
        }
    }

    ranking.eligible.sort_by(by_score_desc);
    ranking
}

/// Pick `required` members for one instance.
///
/// Candidates that were recently paired with someone already picked are
/// deferred; deferred candidates fill any remaining slots in score order.
pub fn select<R: Rng + ?Sized>(
    input: &ScoringInput<'_>,
    required: usize,
    template_name: &str,
    rng: &mut R,
) -> Result<Selection> {
    let ranking = rank(input, rng);

    if ranking.eligible.len() < required {
        return Err(Error::Ineligible {
            template: template_name.to_string(),
            period: input.target.to_string(),
            required,
            available: ranking.eligible.len(),
        });
    }

    let mut selected: Vec<MemberScore> = Vec::with_capacity(required);
    let mut deferred: Vec<&MemberScore> = Vec::new();

    for candidate in &ranking.eligible {
        if selected.len() == required {
            break;
        }
        let conflicts = selected.iter().any(|picked| {
            input
                .recent_pairs
                .contains(&pair_key(&picked.user_id, &candidate.user_id))
        });
        if conflicts {
            deferred.push(candidate);
        } else {
            selected.push(candidate.clone());
        }
    }

    let relaxed_conflicts = selected.len() < required;
    for candidate in deferred {
        if selected.len() == required {
            break;
        }
        selected.push(candidate.clone());
    }

    Ok(Selection {
        selected,
        relaxed_conflicts,
        ranking,
    })
}
