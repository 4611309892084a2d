//! Swap, transfer and pool-release negotiation
//!
//! Every operation runs inside one store transaction: the approval that
//! completes a request and the assignee change it triggers are committed
//! together or not at all. Claims on a pool release are a compare-and-set on
//! the request inside that exclusive section, so of two concurrent claimants
//! exactly one wins and the other sees a `Conflict`.
//!
//! Pool releases expire lazily: every operation first expires what is due
//! at "now", then acts. There is no background timer.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::config::{NegotiationConfig, PoolExpiryPolicy};
use crate::error::{Error, Result};
use crate::identity::AdminDirectory;
use crate::instance::TaskInstance;
use crate::ledger::Ledger;
use crate::notify::{dispatch, Notification, NotificationKind, Notifier};
use crate::queue::UserId;
use crate::store::Store;
use crate::swap::{SwapKind, SwapRequest, SwapStatus};

/// Pool-release expiry settings
#[derive(Debug, Clone, Copy)]
pub struct NegotiationPolicy {
    pub pool_horizon: Duration,
    pub on_expiry: PoolExpiryPolicy,
    pub max_republish: u32,
}

impl Default for NegotiationPolicy {
    fn default() -> Self {
        Self {
            pool_horizon: Duration::hours(48),
            on_expiry: PoolExpiryPolicy::Revert,
            max_republish: 1,
        }
    }
}

impl NegotiationPolicy {
    pub fn from_config(config: &NegotiationConfig) -> Result<Self> {
        Ok(Self {
            pool_horizon: config.pool_horizon()?,
            on_expiry: config.expiry_policy()?,
            max_republish: config.max_republish,
        })
    }
}

/// What a new request should do
#[derive(Debug, Clone)]
pub struct NewRequest {
    pub kind: SwapKind,
    pub to_user: Option<UserId>,
    pub reason: Option<String>,
}

impl NewRequest {
    pub fn swap(to_user: impl Into<UserId>) -> Self {
        Self {
            kind: SwapKind::Swap,
            to_user: Some(to_user.into()),
            reason: None,
        }
    }

    pub fn transfer(to_user: impl Into<UserId>) -> Self {
        Self {
            kind: SwapKind::Transfer,
            to_user: Some(to_user.into()),
            reason: None,
        }
    }

    pub fn pool_release() -> Self {
        Self {
            kind: SwapKind::PoolRelease,
            to_user: None,
            reason: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ExpiryReport {
    pub expired: Vec<Uuid>,
    /// Fresh pool releases published in place of expired ones
    pub republished: Vec<Uuid>,
}

pub struct Negotiation<'a, S: Store> {
    store: &'a S,
    directory: &'a dyn AdminDirectory,
    notifier: &'a dyn Notifier,
    policy: NegotiationPolicy,
}

impl<'a, S: Store> Negotiation<'a, S> {
    pub fn new(store: &'a S, directory: &'a dyn AdminDirectory, notifier: &'a dyn Notifier) -> Self {
        Self {
            store,
            directory,
            notifier,
            policy: NegotiationPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: NegotiationPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Run `f` after lazy expiry, then deliver everything it queued.
    fn transact<T, F>(&self, now: DateTime<Utc>, f: F) -> Result<T>
    where
        F: FnOnce(&mut Ledger, &mut Vec<Notification>) -> Result<T>,
    {
        let policy = self.policy;
        let directory = self.directory;
        let (out, notifications) = self.store.transact(|ledger| {
            let mut notifications = Vec::new();
            expire_due(ledger, now, &policy, directory, &mut notifications);
            let out = f(ledger, &mut notifications)?;
            Ok((out, notifications))
        })?;
        dispatch(self.notifier, &notifications);
        Ok(out)
    }

    /// Open a request on an instance the actor is currently assigned to.
    ///
    /// A transfer that needs no administrator executes immediately.
    pub fn create(&self, instance_id: Uuid, actor: &str, new: NewRequest) -> Result<SwapRequest> {
        let policy = self.policy;
        let directory = self.directory;
        let now = Utc::now();
        self.transact(now, |ledger, notifications| {
            let instance = ledger.instance(instance_id)?;
            if !instance.is_open() {
                return Err(Error::State(format!(
                    "instance {} is {}; its assignees can no longer change",
                    instance_id, instance.status
                )));
            }
            if !instance.is_assignee(actor) {
                return Err(Error::Authorization(format!(
                    "{} is not assigned to instance {}",
                    actor, instance_id
                )));
            }
            let queue = ledger.queue_for_instance(instance)?;
            if let Some(to) = new.to_user.as_deref() {
                if !ledger.is_active_member(queue.id, to) {
                    return Err(Error::Validation(format!(
                        "{} is not an active member of queue '{}'",
                        to, queue.name
                    )));
                }
                if instance.is_assignee(to) {
                    return Err(Error::Validation(format!(
                        "{} is already assigned to instance {}",
                        to, instance_id
                    )));
                }
            }

            let mut builder = SwapRequest::builder(instance_id, new.kind, actor)
                .requires_admin(queue.require_admin_approval)
                .pool_horizon(policy.pool_horizon);
            if let Some(to) = new.to_user {
                builder = builder.to_user(to);
            }
            if let Some(reason) = new.reason {
                builder = builder.reason(reason);
            }
            let request = ledger.insert_request(builder.build()?)?.clone();
            tracing::info!(request = %request.id, kind = %request.kind, actor, "request created");

            notifications.push(created_notification(ledger, &request, directory)?);
            if request.kind == SwapKind::Transfer && request.can_approve() {
                return execute(ledger, request.id, actor, now, notifications);
            }
            Ok(request)
        })
    }

    /// Record the actor's approval; executes once the approval set is complete.
    pub fn approve(&self, request_id: Uuid, actor: &str) -> Result<SwapRequest> {
        let directory = self.directory;
        let now = Utc::now();
        self.transact(now, |ledger, notifications| {
            let request = ledger.request_mut(request_id)?;
            request.ensure_pending()?;

            let is_target = request.kind == SwapKind::Swap
                && request.to_user.as_deref() == Some(actor);
            let is_gatekeeper = request.requires_admin && directory.is_admin(actor);
            if is_target && (request.target_approval.is_none() || !is_gatekeeper) {
                request.approve_as_target(actor, now)?;
            } else if is_gatekeeper {
                request.approve_as_admin(actor, now)?;
            } else {
                return Err(Error::Authorization(format!(
                    "{} cannot approve request {}",
                    actor, request_id
                )));
            }
            tracing::debug!(request = %request_id, actor, "approval recorded");

            if request.can_approve() {
                return execute(ledger, request_id, actor, now, notifications);
            }
            Ok(request.clone())
        })
    }

    /// The target, an administrator, or the requester (withdrawal) may reject.
    pub fn reject(&self, request_id: Uuid, actor: &str, reason: Option<String>) -> Result<SwapRequest> {
        let directory = self.directory;
        let now = Utc::now();
        self.transact(now, |ledger, notifications| {
            let request = ledger.request_mut(request_id)?;
            request.ensure_pending()?;

            let allowed = request.from_user == actor
                || request.to_user.as_deref() == Some(actor)
                || directory.is_admin(actor);
            if !allowed {
                return Err(Error::Authorization(format!(
                    "{} cannot reject request {}",
                    actor, request_id
                )));
            }
            request.reject(actor, reason, now)?;
            let request = request.clone();
            tracing::info!(request = %request_id, actor, "request rejected");

            let mut recipients = vec![request.from_user.clone()];
            recipients.extend(request.to_user.clone());
            recipients.retain(|r| r != actor);
            notifications.push(
                Notification::new(NotificationKind::SwapRejected, request.instance_id, recipients)
                    .with_context(request_context(&request)),
            );
            Ok(request)
        })
    }

    pub fn claim(&self, request_id: Uuid, actor: &str) -> Result<SwapRequest> {
        self.claim_at(request_id, actor, Utc::now())
    }

    /// First claim wins. Claimants must be active queue members who are not
    /// already on the instance.
    pub fn claim_at(&self, request_id: Uuid, actor: &str, now: DateTime<Utc>) -> Result<SwapRequest> {
        let directory = self.directory;
        self.transact(now, |ledger, notifications| {
            let request = ledger.request(request_id)?;
            let instance = ledger.instance(request.instance_id)?;
            if !instance.is_open() {
                return Err(Error::Conflict(format!(
                    "request {} is no longer available: instance {} is {}",
                    request_id, instance.id, instance.status
                )));
            }
            let queue = ledger.queue_for_instance(instance)?;
            if !ledger.is_active_member(queue.id, actor) {
                return Err(Error::Authorization(format!(
                    "{} is not an active member of queue '{}'",
                    actor, queue.name
                )));
            }
            if instance.is_assignee(actor) && request.from_user != actor {
                return Err(Error::Validation(format!(
                    "{} is already assigned to instance {}",
                    actor, instance.id
                )));
            }

            let request = ledger.request_mut(request_id)?;
            request.claim(actor, now)?;
            tracing::info!(request = %request_id, actor, "pool release claimed");

            if request.can_approve() {
                return execute(ledger, request_id, actor, now, notifications);
            }

            let request = request.clone();
            notifications.push(
                Notification::new(NotificationKind::SwapCreated, request.instance_id, directory.admins())
                    .with_context(request_context(&request)),
            );
            Ok(request)
        })
    }

    pub fn list_open_pool(&self, viewer: Option<&str>) -> Result<Vec<SwapRequest>> {
        self.list_open_pool_at(viewer, Utc::now())
    }

    /// Claimable pool releases, optionally only those `viewer` could claim.
    pub fn list_open_pool_at(&self, viewer: Option<&str>, now: DateTime<Utc>) -> Result<Vec<SwapRequest>> {
        self.transact(now, |ledger, _| {
            let mut open = Vec::new();
            for request in ledger.requests.iter().filter(|r| r.is_claimable(now)) {
                let instance = ledger.instance(request.instance_id)?;
                if !instance.is_open() {
                    continue;
                }
                if let Some(viewer) = viewer {
                    let queue = ledger.queue_for_instance(instance)?;
                    if request.from_user == viewer
                        || instance.is_assignee(viewer)
                        || !ledger.is_active_member(queue.id, viewer)
                    {
                        continue;
                    }
                }
                open.push(request.clone());
            }
            Ok(open)
        })
    }

    /// All requests, optionally for one instance, after lazy expiry.
    pub fn list(&self, instance_id: Option<Uuid>, status: Option<SwapStatus>) -> Result<Vec<SwapRequest>> {
        self.transact(Utc::now(), |ledger, _| {
            Ok(ledger
                .requests
                .iter()
                .filter(|r| instance_id.map_or(true, |id| r.instance_id == id))
                .filter(|r| status.map_or(true, |s| r.status == s))
                .cloned()
                .collect())
        })
    }

    pub fn expire_stale(&self) -> Result<ExpiryReport> {
        self.expire_stale_at(Utc::now())
    }

    /// Expire unclaimed pool releases that are due at `now`.
    pub fn expire_stale_at(&self, now: DateTime<Utc>) -> Result<ExpiryReport> {
        let policy = self.policy;
        let directory = self.directory;
        let (report, notifications) = self.store.transact(|ledger| {
            let mut notifications = Vec::new();
            let report = expire_due(ledger, now, &policy, directory, &mut notifications);
            Ok((report, notifications))
        })?;
        dispatch(self.notifier, &notifications);
        Ok(report)
    }
}

/// Move the slot and close the request. Runs inside the caller's transaction.
fn execute(
    ledger: &mut Ledger,
    request_id: Uuid,
    actor: &str,
    now: DateTime<Utc>,
    notifications: &mut Vec<Notification>,
) -> Result<SwapRequest> {
    let request = ledger.request(request_id)?.clone();
    let to_user = request.to_user.clone().ok_or_else(|| {
        Error::State(format!("request {} has no receiving user", request_id))
    })?;

    let instance = ledger.instance_mut(request.instance_id)?;
    instance.reassign(&request.from_user, &to_user, actor, Some(request_id))?;
    let period = instance.period;
    let instance = instance.clone();

    let queue_id = ledger.queue_for_instance(&instance)?.id;
    if let Some(member) = ledger.member_mut(queue_id, &request.from_user) {
        member.release_assignment();
    }
    if let Some(member) = ledger.member_mut(queue_id, &to_user) {
        member.record_assignment(period);
    }

    let request = ledger.request_mut(request_id)?;
    request.mark_approved(actor, now)?;
    let request = request.clone();
    tracing::info!(
        request = %request_id,
        instance = %instance.id,
        from = %request.from_user,
        to = %to_user,
        "request executed"
    );

    notifications.push(
        Notification::new(
            NotificationKind::SwapApproved,
            instance.id,
            vec![request.from_user.clone(), to_user],
        )
        .with_context(request_context(&request)),
    );
    Ok(request)
}

/// Expire due pool releases, applying the republish policy.
fn expire_due(
    ledger: &mut Ledger,
    now: DateTime<Utc>,
    policy: &NegotiationPolicy,
    directory: &dyn AdminDirectory,
    notifications: &mut Vec<Notification>,
) -> ExpiryReport {
    let mut report = ExpiryReport::default();
    let mut expired = Vec::new();
    for request in ledger.requests.iter_mut() {
        if request.expire_if_due(now) {
            tracing::debug!(request = %request.id, "pool release expired");
            expired.push(request.clone());
        }
    }

    for request in expired {
        report.expired.push(request.id);
        notifications.push(
            Notification::new(
                NotificationKind::SwapExpired,
                request.instance_id,
                vec![request.from_user.clone()],
            )
            .with_context(request_context(&request)),
        );

        if policy.on_expiry != PoolExpiryPolicy::Republish
            || request.republish_count >= policy.max_republish
        {
            continue;
        }
        let still_held = ledger
            .instance(request.instance_id)
            .is_ok_and(|i| i.is_open() && i.is_assignee(&request.from_user));
        if !still_held || ledger.pending_request_for(request.instance_id, &request.from_user).is_some() {
            continue;
        }

        let fresh = request.republish(policy.pool_horizon, now);
        match ledger.insert_request(fresh) {
            Ok(fresh) => {
                let fresh = fresh.clone();
                tracing::info!(request = %fresh.id, previous = %request.id, "pool release republished");
                report.republished.push(fresh.id);
                match created_notification(ledger, &fresh, directory) {
                    Ok(notification) => notifications.push(notification),
                    Err(err) => tracing::warn!(request = %fresh.id, error = %err, "no audience for republished release"),
                }
            }
            Err(err) => tracing::warn!(request = %request.id, error = %err, "republish failed"),
        }
    }
    report
}

/// Who hears about a new request: the target, the pool, and admins when gated.
fn created_notification(
    ledger: &Ledger,
    request: &SwapRequest,
    directory: &dyn AdminDirectory,
) -> Result<Notification> {
    let instance = ledger.instance(request.instance_id)?;
    let mut recipients: Vec<UserId> = match request.kind {
        SwapKind::PoolRelease => pool_audience(ledger, instance)?,
        SwapKind::Swap | SwapKind::Transfer => request.to_user.iter().cloned().collect(),
    };
    if request.requires_admin {
        recipients.extend(directory.admins());
    }
    recipients.retain(|r| *r != request.from_user);
    Ok(
        Notification::new(NotificationKind::SwapCreated, request.instance_id, recipients)
            .with_context(request_context(request)),
    )
}

/// Active queue members not already on the instance
fn pool_audience(ledger: &Ledger, instance: &TaskInstance) -> Result<Vec<UserId>> {
    let queue = ledger.queue_for_instance(instance)?;
    Ok(ledger
        .members_of(queue.id)
        .filter(|m| m.is_active && !instance.is_assignee(&m.user_id))
        .map(|m| m.user_id.clone())
        .collect())
}

fn request_context(request: &SwapRequest) -> serde_json::Value {
    serde_json::json!({
        "request_id": request.id,
        "kind": request.kind,
        "status": request.status,
        "from_user": request.from_user,
        "to_user": request.to_user,
        "reason": request.reason,
        "expires_at": request.expires_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::StaticDirectory;
    use crate::instance::AssignmentMethod;
    use crate::notify::RecordingNotifier;
    use crate::period::Period;
    use crate::queue::RotationQueue;
    use crate::store::MemoryStore;
    use crate::template::TaskTemplate;

    fn setup(require_admin: bool) -> (MemoryStore, Uuid) {
        let store = MemoryStore::new();
        let instance_id = store
            .transact(|ledger| {
                let queue = RotationQueue::new("lab").with_admin_approval(require_admin);
                let queue_id = ledger.add_queue(queue)?.id;
                for user in ["u1", "u2", "u3"] {
                    ledger.enroll(queue_id, user)?;
                }
                let period: Period = "2024-04".parse()?;
                let template = TaskTemplate::builder("Incubator clean", queue_id)
                    .start_period(period)
                    .build()?;
                let template = ledger.add_template(template)?.clone();
                let instance = TaskInstance::new(
                    &template,
                    period,
                    template.execution_window(&period)?,
                    vec!["u1".to_string()],
                    AssignmentMethod::FairRotation,
                )?;
                if let Some(member) = ledger.member_mut(queue_id, "u1") {
                    member.record_assignment(period);
                }
                Ok(ledger.insert_instance(instance)?.id)
            })
            .unwrap();
        (store, instance_id)
    }

    #[test]
    fn swap_needs_target_then_executes() {
        let (store, instance_id) = setup(false);
        let directory = StaticDirectory::default();
        let notifier = RecordingNotifier::new();
        let negotiation = Negotiation::new(&store, &directory, &notifier);

        let request = negotiation
            .create(instance_id, "u1", NewRequest::swap("u2").with_reason("travel"))
            .unwrap();
        assert_eq!(request.status, SwapStatus::Pending);
        assert!(matches!(
            negotiation.approve(request.id, "u3"),
            Err(Error::Authorization(_))
        ));

        let approved = negotiation.approve(request.id, "u2").unwrap();
        assert_eq!(approved.status, SwapStatus::Approved);

        let ledger = store.read().unwrap();
        let instance = ledger.instance(instance_id).unwrap();
        assert_eq!(instance.current_assignees, vec!["u2"]);
        assert_eq!(instance.audit.swaps().count(), 1);
        let queue_id = ledger.queues[0].id;
        assert_eq!(ledger.member(queue_id, "u1").unwrap().total_assignments, 0);
        assert_eq!(ledger.member(queue_id, "u2").unwrap().total_assignments, 1);
        assert_eq!(notifier.of_kind(NotificationKind::SwapApproved).len(), 1);
    }

    #[test]
    fn admin_gate_holds_until_admin_approves() {
        let (store, instance_id) = setup(true);
        let directory = StaticDirectory::new(["boss"]);
        let notifier = RecordingNotifier::new();
        let negotiation = Negotiation::new(&store, &directory, &notifier);

        let request = negotiation
            .create(instance_id, "u1", NewRequest::swap("u2"))
            .unwrap();
        let created = notifier.of_kind(NotificationKind::SwapCreated);
        assert_eq!(created[0].recipients, vec!["boss", "u2"]);

        let after_target = negotiation.approve(request.id, "u2").unwrap();
        assert_eq!(after_target.status, SwapStatus::Pending);
        let after_admin = negotiation.approve(request.id, "boss").unwrap();
        assert_eq!(after_admin.status, SwapStatus::Approved);
        assert!(matches!(
            negotiation.approve(request.id, "boss"),
            Err(Error::State(_))
        ));
    }

    #[test]
    fn transfer_without_gate_executes_on_creation() {
        let (store, instance_id) = setup(false);
        let directory = StaticDirectory::default();
        let notifier = RecordingNotifier::new();
        let negotiation = Negotiation::new(&store, &directory, &notifier);

        let request = negotiation
            .create(instance_id, "u1", NewRequest::transfer("u3"))
            .unwrap();
        assert_eq!(request.status, SwapStatus::Approved);
        let ledger = store.read().unwrap();
        assert_eq!(ledger.instance(instance_id).unwrap().current_assignees, vec!["u3"]);
    }

    #[test]
    fn creation_guards() {
        let (store, instance_id) = setup(false);
        let directory = StaticDirectory::default();
        let notifier = RecordingNotifier::new();
        let negotiation = Negotiation::new(&store, &directory, &notifier);

        assert!(matches!(
            negotiation.create(instance_id, "u2", NewRequest::pool_release()),
            Err(Error::Authorization(_))
        ));
        assert!(matches!(
            negotiation.create(instance_id, "u1", NewRequest::swap("stranger")),
            Err(Error::Validation(_))
        ));
        negotiation
            .create(instance_id, "u1", NewRequest::pool_release())
            .unwrap();
        assert!(matches!(
            negotiation.create(instance_id, "u1", NewRequest::swap("u2")),
            Err(Error::Conflict(_))
        ));
    }

    #[test]
    fn reject_by_requester_is_a_withdrawal() {
        let (store, instance_id) = setup(false);
        let directory = StaticDirectory::default();
        let notifier = RecordingNotifier::new();
        let negotiation = Negotiation::new(&store, &directory, &notifier);

        let request = negotiation
            .create(instance_id, "u1", NewRequest::swap("u2"))
            .unwrap();
        assert!(matches!(
            negotiation.reject(request.id, "u3", None),
            Err(Error::Authorization(_))
        ));
        let rejected = negotiation
            .reject(request.id, "u1", Some("plans changed".into()))
            .unwrap();
        assert_eq!(rejected.status, SwapStatus::Rejected);
        let notices = notifier.of_kind(NotificationKind::SwapRejected);
        assert_eq!(notices[0].recipients, vec!["u2"]);

        // a new request is allowed once the old one is resolved
        negotiation
            .create(instance_id, "u1", NewRequest::swap("u3"))
            .unwrap();
    }

    #[test]
    fn pool_claim_is_first_come() {
        let (store, instance_id) = setup(false);
        let directory = StaticDirectory::default();
        let notifier = RecordingNotifier::new();
        let negotiation = Negotiation::new(&store, &directory, &notifier);

        let request = negotiation
            .create(instance_id, "u1", NewRequest::pool_release())
            .unwrap();
        assert_eq!(negotiation.list_open_pool(Some("u2")).unwrap().len(), 1);
        assert!(negotiation.list_open_pool(Some("u1")).unwrap().is_empty());

        let claimed = negotiation.claim(request.id, "u2").unwrap();
        assert_eq!(claimed.status, SwapStatus::Approved);
        assert!(matches!(
            negotiation.claim(request.id, "u3"),
            Err(Error::Conflict(_))
        ));
        assert!(negotiation.list_open_pool(None).unwrap().is_empty());
        let ledger = store.read().unwrap();
        assert_eq!(ledger.instance(instance_id).unwrap().current_assignees, vec!["u2"]);
    }

    #[test]
    fn expiry_reverts_or_republishes() {
        let (store, instance_id) = setup(false);
        let directory = StaticDirectory::default();
        let notifier = RecordingNotifier::new();
        let policy = NegotiationPolicy {
            pool_horizon: Duration::hours(1),
            on_expiry: PoolExpiryPolicy::Republish,
            max_republish: 1,
        };
        let negotiation = Negotiation::new(&store, &directory, &notifier).with_policy(policy);

        let original = negotiation
            .create(instance_id, "u1", NewRequest::pool_release())
            .unwrap();
        let later = Utc::now() + Duration::hours(2);
        let report = negotiation.expire_stale_at(later).unwrap();
        assert_eq!(report.expired, vec![original.id]);
        assert_eq!(report.republished.len(), 1);

        let much_later = later + Duration::hours(2);
        let report = negotiation.expire_stale_at(much_later).unwrap();
        assert_eq!(report.expired.len(), 1);
        assert!(report.republished.is_empty());

        let ledger = store.read().unwrap();
        assert!(ledger.requests.iter().all(|r| r.status == SwapStatus::Expired));
        assert_eq!(ledger.instance(instance_id).unwrap().current_assignees, vec!["u1"]);
        assert_eq!(notifier.of_kind(NotificationKind::SwapExpired).len(), 2);
    }

    #[test]
    fn claim_after_horizon_sees_expired_release() {
        let (store, instance_id) = setup(false);
        let directory = StaticDirectory::default();
        let notifier = RecordingNotifier::new();
        let negotiation = Negotiation::new(&store, &directory, &notifier);

        let request = negotiation
            .create(instance_id, "u1", NewRequest::pool_release())
            .unwrap();
        let later = Utc::now() + Duration::days(3);
        assert!(matches!(
            negotiation.claim_at(request.id, "u2", later),
            Err(Error::Conflict(_))
        ));
        assert!(negotiation.list_open_pool_at(None, later).unwrap().is_empty());
    }
}
