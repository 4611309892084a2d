//! Swap, transfer and pool-release requests
//!
//! A request moves one assignee slot of an instance from `from_user` to
//! `to_user`. The approval set it needs depends on its kind:
//!
//! - `swap`: the named target must approve, plus an administrator when the
//!   queue requires one.
//! - `transfer`: creating the request is the giver's consent; only the
//!   administrator gate applies.
//! - `pool_release`: published to the queue; the first claim fills
//!   `to_user` and counts as the target's approval.
//!
//! Requests move `pending → approved | rejected | expired` and never leave a
//! resolved state.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::queue::UserId;

// =============================================================================
// Kind / Status
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwapKind {
    Swap,
    Transfer,
    PoolRelease,
}

impl SwapKind {
    /// Whether someone other than the requester has to accept the slot
    pub fn needs_target_approval(&self) -> bool {
        matches!(self, SwapKind::Swap | SwapKind::PoolRelease)
    }
}

impl fmt::Display for SwapKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SwapKind::Swap => write!(f, "swap"),
            SwapKind::Transfer => write!(f, "transfer"),
            SwapKind::PoolRelease => write!(f, "pool_release"),
        }
    }
}

impl FromStr for SwapKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "swap" => Ok(SwapKind::Swap),
            "transfer" => Ok(SwapKind::Transfer),
            "pool" | "pool_release" | "release" => Ok(SwapKind::PoolRelease),
            _ => Err(Error::Validation(format!(
                "Invalid request kind '{}'. Expected: swap, transfer, pool",
                s
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwapStatus {
    Pending,
    Approved,
    Rejected,
    Expired,
}

impl SwapStatus {
    pub fn is_resolved(&self) -> bool {
        !matches!(self, SwapStatus::Pending)
    }
}

impl fmt::Display for SwapStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SwapStatus::Pending => write!(f, "pending"),
            SwapStatus::Approved => write!(f, "approved"),
            SwapStatus::Rejected => write!(f, "rejected"),
            SwapStatus::Expired => write!(f, "expired"),
        }
    }
}

impl FromStr for SwapStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(SwapStatus::Pending),
            "approved" => Ok(SwapStatus::Approved),
            "rejected" => Ok(SwapStatus::Rejected),
            "expired" => Ok(SwapStatus::Expired),
            _ => Err(Error::Validation(format!(
                "Invalid request status '{}'. Expected: pending, approved, rejected, expired",
                s
            ))),
        }
    }
}

// =============================================================================
// Request
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Approval {
    pub by: UserId,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapRequest {
    pub id: Uuid,
    pub instance_id: Uuid,
    pub kind: SwapKind,
    pub from_user: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_user: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Snapshot of the queue policy when the request was created
    pub requires_admin: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_approval: Option<Approval>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_approval: Option<Approval>,
    #[serde(default)]
    pub is_public: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    /// How many times this slot has been put back in the pool
    #[serde(default)]
    pub republish_count: u32,
    pub status: SwapStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_by: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution_note: Option<String>,
}

impl SwapRequest {
    pub fn builder(instance_id: Uuid, kind: SwapKind, from_user: impl Into<UserId>) -> SwapRequestBuilder {
        SwapRequestBuilder::new(instance_id, kind, from_user)
    }

    pub fn is_pending(&self) -> bool {
        self.status == SwapStatus::Pending
    }

    /// Open pool release that nobody has claimed yet
    pub fn is_claimable(&self, now: DateTime<Utc>) -> bool {
        self.kind == SwapKind::PoolRelease
            && self.is_pending()
            && self.is_public
            && self.to_user.is_none()
            && !self.is_due(now)
    }

    fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires| expires <= now)
    }

    /// True once every approval this request needs has been given.
    pub fn can_approve(&self) -> bool {
        let target_ok = !self.kind.needs_target_approval()
            || (self.to_user.is_some() && self.target_approval.is_some());
        let admin_ok = !self.requires_admin || self.admin_approval.is_some();
        self.is_pending() && target_ok && admin_ok
    }

    /// `State` error for anything already resolved
    pub fn ensure_pending(&self) -> Result<()> {
        match self.status {
            SwapStatus::Pending => Ok(()),
            SwapStatus::Expired => Err(Error::State(format!(
                "request {} has expired",
                self.id
            ))),
            other => Err(Error::State(format!(
                "request {} is already {}",
                self.id, other
            ))),
        }
    }

    pub fn approve_as_target(&mut self, actor: &str, now: DateTime<Utc>) -> Result<()> {
        self.ensure_pending()?;
        if self.to_user.as_deref() != Some(actor) {
            return Err(Error::Authorization(format!(
                "{} is not the target of request {}",
                actor, self.id
            )));
        }
        if self.target_approval.is_some() {
            return Err(Error::Conflict(format!(
                "request {} was already approved by {}",
                self.id, actor
            )));
        }
        self.target_approval = Some(Approval {
            by: actor.to_string(),
            at: now,
        });
        Ok(())
    }

    pub fn approve_as_admin(&mut self, actor: &str, now: DateTime<Utc>) -> Result<()> {
        self.ensure_pending()?;
        if !self.requires_admin {
            return Err(Error::State(format!(
                "request {} does not need administrator approval",
                self.id
            )));
        }
        if self.kind == SwapKind::PoolRelease && self.to_user.is_none() {
            return Err(Error::State(format!(
                "request {} has no claimant to confirm yet",
                self.id
            )));
        }
        if self.admin_approval.is_some() {
            return Err(Error::Conflict(format!(
                "request {} already has administrator approval",
                self.id
            )));
        }
        self.admin_approval = Some(Approval {
            by: actor.to_string(),
            at: now,
        });
        Ok(())
    }

    /// First-claim-wins on an open pool release.
    pub fn claim(&mut self, user: &str, now: DateTime<Utc>) -> Result<()> {
        if self.kind != SwapKind::PoolRelease {
            return Err(Error::Validation(format!(
                "request {} is a {}, not a pool release",
                self.id, self.kind
            )));
        }
        if self.from_user == user {
            return Err(Error::Validation(
                "cannot claim your own pool release".to_string(),
            ));
        }
        if !self.is_claimable(now) {
            return Err(Error::Conflict(format!(
                "pool release {} is no longer available",
                self.id
            )));
        }
        self.to_user = Some(user.to_string());
        self.target_approval = Some(Approval {
            by: user.to_string(),
            at: now,
        });
        self.is_public = false;
        Ok(())
    }

    pub(crate) fn mark_approved(&mut self, actor: &str, now: DateTime<Utc>) -> Result<()> {
        if !self.can_approve() {
            return Err(Error::State(format!(
                "request {} is missing required approvals",
                self.id
            )));
        }
        self.resolve(SwapStatus::Approved, actor, None, now);
        Ok(())
    }

    pub fn reject(&mut self, actor: &str, reason: Option<String>, now: DateTime<Utc>) -> Result<()> {
        self.ensure_pending()?;
        self.resolve(SwapStatus::Rejected, actor, reason, now);
        Ok(())
    }

    /// Expire an unclaimed pool release whose horizon has passed.
    pub fn expire_if_due(&mut self, now: DateTime<Utc>) -> bool {
        if self.kind != SwapKind::PoolRelease
            || !self.is_pending()
            || self.to_user.is_some()
            || !self.is_due(now)
        {
            return false;
        }
        self.is_public = false;
        self.resolve(SwapStatus::Expired, "system", None, now);
        true
    }

    /// Fresh pool release for the same slot, counting against the budget.
    pub fn republish(&self, horizon: Duration, now: DateTime<Utc>) -> SwapRequest {
        SwapRequest {
            id: Uuid::new_v4(),
            instance_id: self.instance_id,
            kind: SwapKind::PoolRelease,
            from_user: self.from_user.clone(),
            to_user: None,
            reason: self.reason.clone(),
            requires_admin: self.requires_admin,
            target_approval: None,
            admin_approval: None,
            is_public: true,
            published_at: Some(now),
            expires_at: Some(now + horizon),
            republish_count: self.republish_count + 1,
            status: SwapStatus::Pending,
            created_at: now,
            resolved_at: None,
            resolved_by: None,
            resolution_note: None,
        }
    }

    fn resolve(&mut self, status: SwapStatus, actor: &str, note: Option<String>, now: DateTime<Utc>) {
        self.status = status;
        self.resolved_at = Some(now);
        self.resolved_by = Some(actor.to_string());
        self.resolution_note = note.filter(|n| !n.trim().is_empty());
    }
}

// =============================================================================
// Builder
// =============================================================================

pub struct SwapRequestBuilder {
    instance_id: Uuid,
    kind: SwapKind,
    from_user: UserId,
    to_user: Option<UserId>,
    reason: Option<String>,
    requires_admin: bool,
    pool_horizon: Duration,
}

impl SwapRequestBuilder {
    pub fn new(instance_id: Uuid, kind: SwapKind, from_user: impl Into<UserId>) -> Self {
        Self {
            instance_id,
            kind,
            from_user: from_user.into(),
            to_user: None,
            reason: None,
            requires_admin: false,
            pool_horizon: Duration::hours(48),
        }
    }

    pub fn to_user(mut self, user: impl Into<UserId>) -> Self {
        self.to_user = Some(user.into());
        self
    }

    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn requires_admin(mut self, required: bool) -> Self {
        self.requires_admin = required;
        self
    }

    pub fn pool_horizon(mut self, horizon: Duration) -> Self {
        self.pool_horizon = horizon;
        self
    }

    pub fn build(self) -> Result<SwapRequest> {
        match (self.kind, self.to_user.as_deref()) {
            (SwapKind::Swap | SwapKind::Transfer, None) => {
                return Err(Error::Validation(format!(
                    "a {} needs a target user",
                    self.kind
                )));
            }
            (SwapKind::Swap | SwapKind::Transfer, Some(to)) if to == self.from_user => {
                return Err(Error::Validation(
                    "cannot hand a slot to yourself".to_string(),
                ));
            }
            (SwapKind::PoolRelease, Some(_)) => {
                return Err(Error::Validation(
                    "a pool release is open to the queue and takes no target".to_string(),
                ));
            }
            _ => {}
        }
        if self.kind == SwapKind::PoolRelease && self.pool_horizon <= Duration::zero() {
            return Err(Error::Validation(
                "pool horizon must be positive".to_string(),
            ));
        }

        let now = Utc::now();
        let pool = self.kind == SwapKind::PoolRelease;
        Ok(SwapRequest {
            id: Uuid::new_v4(),
            instance_id: self.instance_id,
            kind: self.kind,
            from_user: self.from_user,
            to_user: self.to_user,
            reason: self.reason.filter(|r| !r.trim().is_empty()),
            requires_admin: self.requires_admin,
            target_approval: None,
            admin_approval: None,
            is_public: pool,
            published_at: pool.then_some(now),
            expires_at: pool.then(|| now + self.pool_horizon),
            republish_count: 0,
            status: SwapStatus::Pending,
            created_at: now,
            resolved_at: None,
            resolved_by: None,
            resolution_note: None,
        })
    }
}

// =============================================================================
// Duration Parsing
// =============================================================================

/// Parse a duration string like "48h", "30m", "3d"
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();

    if s.is_empty() {
        return Err(Error::Validation("Duration cannot be empty".to_string()));
    }

    let (num_str, unit) = match s.find(|c: char| !c.is_ascii_digit()) {
        Some(pos) => (&s[..pos], &s[pos..]),
        // bare numbers are hours
        None => (s, "h"),
    };

    let num: i64 = num_str
        .parse()
        .map_err(|_| Error::Validation(format!("Invalid duration number: '{}'", num_str)))?;

    let duration = match unit.trim().to_lowercase().as_str() {
        "s" | "sec" | "second" | "seconds" => Duration::seconds(num),
        "m" | "min" | "minute" | "minutes" => Duration::minutes(num),
        "h" | "hr" | "hour" | "hours" => Duration::hours(num),
        "d" | "day" | "days" => Duration::days(num),
        "w" | "week" | "weeks" => Duration::weeks(num),
        _ => {
            return Err(Error::Validation(format!(
                "Invalid duration unit '{}'. Expected: s, m, h, d, w",
                unit
            )));
        }
    };

    Ok(duration)
}
