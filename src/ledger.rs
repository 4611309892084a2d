//! The ledger: every queue, member, template, instance and request
//!
//! Services never touch records directly; they borrow a `&mut Ledger` from a
//! [`Store`](crate::store::Store) transaction. The ledger enforces the two
//! cross-record invariants:
//!
//! - one instance per (template, period)
//! - one pending request per (instance, requesting user)
//!
//! Both are checked at insert time, inside the store's exclusive section.

use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::instance::{InstanceStatus, TaskInstance};
use crate::period::Period;
use crate::queue::{QueueMember, RotationQueue, UserId};
use crate::scorer::pair_key;
use crate::swap::SwapRequest;
use crate::template::TaskTemplate;

pub const LEDGER_SCHEMA_VERSION: &str = "rota.ledger.v1";

fn default_schema_version() -> String {
    LEDGER_SCHEMA_VERSION.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ledger {
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
    #[serde(default)]
    pub queues: Vec<RotationQueue>,
    #[serde(default)]
    pub members: Vec<QueueMember>,
    #[serde(default)]
    pub templates: Vec<TaskTemplate>,
    #[serde(default)]
    pub instances: Vec<TaskInstance>,
    #[serde(default)]
    pub requests: Vec<SwapRequest>,
}

impl Default for Ledger {
    fn default() -> Self {
        Self {
            schema_version: default_schema_version(),
            queues: Vec::new(),
            members: Vec::new(),
            templates: Vec::new(),
            instances: Vec::new(),
            requests: Vec::new(),
        }
    }
}

impl Ledger {
    // -------------------------------------------------------------------------
    // Queues and members
    // -------------------------------------------------------------------------

    pub fn add_queue(&mut self, queue: RotationQueue) -> Result<&RotationQueue> {
        queue.validate()?;
        if self.queues.iter().any(|q| q.name.eq_ignore_ascii_case(&queue.name)) {
            return Err(Error::Conflict(format!(
                "queue '{}' already exists",
                queue.name
            )));
        }
        self.queues.push(queue);
        let idx = self.queues.len() - 1;
        Ok(&self.queues[idx])
    }

    pub fn queue(&self, id: Uuid) -> Result<&RotationQueue> {
        self.queues
            .iter()
            .find(|q| q.id == id)
            .ok_or_else(|| Error::not_found("queue", id))
    }

    /// Resolve a queue by name or id prefix.
    pub fn find_queue(&self, reference: &str) -> Result<&RotationQueue> {
        if let Some(queue) = self
            .queues
            .iter()
            .find(|q| q.name.eq_ignore_ascii_case(reference.trim()))
        {
            return Ok(queue);
        }
        let id = resolve_prefix("queue", reference, self.queues.iter().map(|q| q.id))?;
        self.queue(id)
    }

    pub fn members_of(&self, queue_id: Uuid) -> impl Iterator<Item = &QueueMember> {
        self.members.iter().filter(move |m| m.queue_id == queue_id)
    }

    pub fn member(&self, queue_id: Uuid, user: &str) -> Option<&QueueMember> {
        self.members
            .iter()
            .find(|m| m.queue_id == queue_id && m.user_id == user)
    }

    pub fn member_mut(&mut self, queue_id: Uuid, user: &str) -> Option<&mut QueueMember> {
        self.members
            .iter_mut()
            .find(|m| m.queue_id == queue_id && m.user_id == user)
    }

    /// Create the member entry on first use, or reactivate an existing one.
    pub fn enroll(&mut self, queue_id: Uuid, user: &str) -> Result<&mut QueueMember> {
        self.queue(queue_id)?;
        let user = user.trim();
        if user.is_empty() {
            return Err(Error::Validation("user id cannot be empty".to_string()));
        }
        let idx = match self
            .members
            .iter()
            .position(|m| m.queue_id == queue_id && m.user_id == user)
        {
            Some(idx) => {
                self.members[idx].reactivate();
                idx
            }
            None => {
                self.members.push(QueueMember::new(queue_id, user));
                self.members.len() - 1
            }
        };
        Ok(&mut self.members[idx])
    }

    pub fn is_active_member(&self, queue_id: Uuid, user: &str) -> bool {
        self.member(queue_id, user).is_some_and(|m| m.is_active)
    }

    // -------------------------------------------------------------------------
    // Templates
    // -------------------------------------------------------------------------

    pub fn add_template(&mut self, template: TaskTemplate) -> Result<&TaskTemplate> {
        template.validate()?;
        self.queue(template.queue_id)?;
        if self
            .templates
            .iter()
            .any(|t| t.name.eq_ignore_ascii_case(&template.name))
        {
            return Err(Error::Conflict(format!(
                "template '{}' already exists",
                template.name
            )));
        }
        self.templates.push(template);
        let idx = self.templates.len() - 1;
        Ok(&self.templates[idx])
    }

    pub fn template(&self, id: Uuid) -> Result<&TaskTemplate> {
        self.templates
            .iter()
            .find(|t| t.id == id)
            .ok_or_else(|| Error::not_found("template", id))
    }

    pub fn template_mut(&mut self, id: Uuid) -> Result<&mut TaskTemplate> {
        self.templates
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| Error::not_found("template", id))
    }

    /// Resolve a template by name or id prefix.
    pub fn find_template(&self, reference: &str) -> Result<&TaskTemplate> {
        if let Some(template) = self
            .templates
            .iter()
            .find(|t| t.name.eq_ignore_ascii_case(reference.trim()))
        {
            return Ok(template);
        }
        let id = resolve_prefix("template", reference, self.templates.iter().map(|t| t.id))?;
        self.template(id)
    }

    /// Queue of the template an instance was generated from
    pub fn queue_for_instance(&self, instance: &TaskInstance) -> Result<&RotationQueue> {
        let template = self.template(instance.template_id)?;
        self.queue(template.queue_id)
    }

    // -------------------------------------------------------------------------
    // Instances
    // -------------------------------------------------------------------------

    pub fn instance(&self, id: Uuid) -> Result<&TaskInstance> {
        self.instances
            .iter()
            .find(|i| i.id == id)
            .ok_or_else(|| Error::not_found("instance", id))
    }

    pub fn instance_mut(&mut self, id: Uuid) -> Result<&mut TaskInstance> {
        self.instances
            .iter_mut()
            .find(|i| i.id == id)
            .ok_or_else(|| Error::not_found("instance", id))
    }

    pub fn resolve_instance(&self, reference: &str) -> Result<Uuid> {
        resolve_prefix("instance", reference, self.instances.iter().map(|i| i.id))
    }

    pub fn instance_for(&self, template_id: Uuid, period: Period) -> Option<&TaskInstance> {
        self.instances
            .iter()
            .find(|i| i.template_id == template_id && i.period == period)
    }

    /// Insert unless an instance already exists for the same (template, period).
    pub fn insert_instance(&mut self, instance: TaskInstance) -> Result<&TaskInstance> {
        if let Some(existing) = self.instance_for(instance.template_id, instance.period) {
            return Err(Error::Conflict(format!(
                "'{}' already has instance {} for {}",
                instance.template_name, existing.id, instance.period
            )));
        }
        self.instances.push(instance);
        let idx = self.instances.len() - 1;
        Ok(&self.instances[idx])
    }

    /// Open assignments per user whose execution window reaches `date`.
    pub fn open_assignments_at(&self, date: NaiveDate) -> HashMap<UserId, usize> {
        let mut counts: HashMap<UserId, usize> = HashMap::new();
        for instance in self
            .instances
            .iter()
            .filter(|i| i.is_open() && i.window.reaches(date))
        {
            for user in &instance.current_assignees {
                *counts.entry(user.clone()).or_insert(0) += 1;
            }
        }
        counts
    }

    /// Open instances of the queue held by `user` that are not yet due on `today`.
    pub fn pending_assignments(&self, queue_id: Uuid, user: &str, today: NaiveDate) -> u32 {
        let count = self
            .instances
            .iter()
            .filter(|i| i.is_open() && !i.is_overdue(today) && i.is_assignee(user))
            .filter(|i| {
                self.template(i.template_id)
                    .map_or(false, |t| t.queue_id == queue_id)
            })
            .count();
        u32::try_from(count).unwrap_or(u32::MAX)
    }

    /// Unordered pairs who shared a non-cancelled instance of this queue in
    /// the `window_months` periods before `target`.
    pub fn recent_pairs(
        &self,
        queue_id: Uuid,
        target: Period,
        window_months: u32,
    ) -> HashSet<(UserId, UserId)> {
        let since = target.add_months(-(window_months as i32));
        let queue_templates: HashSet<Uuid> = self
            .templates
            .iter()
            .filter(|t| t.queue_id == queue_id)
            .map(|t| t.id)
            .collect();

        let mut pairs = HashSet::new();
        for instance in self.instances.iter().filter(|i| {
            i.status != InstanceStatus::Cancelled
                && queue_templates.contains(&i.template_id)
                && i.period >= since
                && i.period < target
        }) {
            let users = &instance.current_assignees;
            for (idx, a) in users.iter().enumerate() {
                for b in &users[idx + 1..] {
                    pairs.insert(pair_key(a, b));
                }
            }
        }
        pairs
    }

    // -------------------------------------------------------------------------
    // Requests
    // -------------------------------------------------------------------------

    pub fn request(&self, id: Uuid) -> Result<&SwapRequest> {
        self.requests
            .iter()
            .find(|r| r.id == id)
            .ok_or_else(|| Error::not_found("request", id))
    }

    pub fn request_mut(&mut self, id: Uuid) -> Result<&mut SwapRequest> {
        self.requests
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| Error::not_found("request", id))
    }

    pub fn resolve_request(&self, reference: &str) -> Result<Uuid> {
        resolve_prefix("request", reference, self.requests.iter().map(|r| r.id))
    }

    pub fn pending_request_for(&self, instance_id: Uuid, user: &str) -> Option<&SwapRequest> {
        self.requests
            .iter()
            .find(|r| r.instance_id == instance_id && r.from_user == user && r.is_pending())
    }

    /// Insert unless the requester already has a pending request on the instance.
    pub fn insert_request(&mut self, request: SwapRequest) -> Result<&SwapRequest> {
        if let Some(existing) = self.pending_request_for(request.instance_id, &request.from_user) {
            return Err(Error::Conflict(format!(
                "{} already has pending request {} on instance {}",
                request.from_user, existing.id, request.instance_id
            )));
        }
        self.requests.push(request);
        let idx = self.requests.len() - 1;
        Ok(&self.requests[idx])
    }
}

/// Resolve a full id or a unique prefix of one.
fn resolve_prefix(
    kind: &'static str,
    reference: &str,
    ids: impl Iterator<Item = Uuid>,
) -> Result<Uuid> {
    let needle = reference.trim().to_lowercase();
    if needle.is_empty() {
        return Err(Error::Validation(format!("{kind} id cannot be empty")));
    }
    if let Ok(exact) = Uuid::parse_str(&needle) {
        return Ok(exact);
    }

    let mut matches: Vec<Uuid> = ids
        .filter(|id| {
            let full = id.to_string();
            full.starts_with(&needle) || full.replace('-', "").starts_with(&needle)
        })
        .collect();
    matches.sort();
    matches.dedup();

    match matches.len() {
        0 => Err(Error::not_found(kind, reference.trim())),
        1 => Ok(matches[0]),
        _ => Err(Error::Validation(format!(
            "ambiguous {} id '{}': {}",
            kind,
            reference.trim(),
            matches
                .iter()
                .map(Uuid::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::AssignmentMethod;
    use crate::swap::SwapKind;

    fn p(s: &str) -> Period {
        s.parse().unwrap()
    }

    fn seeded() -> (Ledger, Uuid, Uuid) {
        let mut ledger = Ledger::default();
        let queue_id = ledger.add_queue(RotationQueue::new("lab")).unwrap().id;
        let template = TaskTemplate::builder("Fridge defrost", queue_id)
            .start_period(p("2024-01"))
            .build()
            .unwrap();
        let template_id = ledger.add_template(template).unwrap().id;
        (ledger, queue_id, template_id)
    }

    fn instance(ledger: &Ledger, template_id: Uuid, period: &str, users: &[&str]) -> TaskInstance {
        let template = ledger.template(template_id).unwrap();
        let period = p(period);
        TaskInstance::new(
            template,
            period,
            template.execution_window(&period).unwrap(),
            users.iter().map(|u| u.to_string()).collect(),
            AssignmentMethod::FairRotation,
        )
        .unwrap()
    }

    #[test]
    fn instance_key_is_unique() {
        let (mut ledger, _, template_id) = seeded();
        let first = instance(&ledger, template_id, "2024-04", &["a"]);
        let second = instance(&ledger, template_id, "2024-04", &["b"]);
        ledger.insert_instance(first).unwrap();
        assert!(matches!(
            ledger.insert_instance(second),
            Err(Error::Conflict(_))
        ));
        assert_eq!(ledger.instances.len(), 1);
    }

    #[test]
    fn one_pending_request_per_user_and_instance() {
        let (mut ledger, _, template_id) = seeded();
        let inst = instance(&ledger, template_id, "2024-04", &["a"]);
        let instance_id = ledger.insert_instance(inst).unwrap().id;

        let request = SwapRequest::builder(instance_id, SwapKind::PoolRelease, "a")
            .build()
            .unwrap();
        ledger.insert_request(request).unwrap();
        let duplicate = SwapRequest::builder(instance_id, SwapKind::Transfer, "a")
            .to_user("b")
            .build()
            .unwrap();
        assert!(matches!(
            ledger.insert_request(duplicate),
            Err(Error::Conflict(_))
        ));
    }

    #[test]
    fn enroll_is_lazy_and_reactivates() {
        let (mut ledger, queue_id, _) = seeded();
        ledger.enroll(queue_id, "a").unwrap().total_assignments = 3;
        ledger.member_mut(queue_id, "a").unwrap().deactivate();
        assert!(!ledger.is_active_member(queue_id, "a"));

        let member = ledger.enroll(queue_id, "a").unwrap();
        assert!(member.is_active);
        assert_eq!(member.total_assignments, 3);
        assert_eq!(ledger.members_of(queue_id).count(), 1);
    }

    #[test]
    fn recent_pairs_respect_window_and_cancellation() {
        let (mut ledger, queue_id, template_id) = seeded();
        let old = instance(&ledger, template_id, "2024-01", &["a", "b"]);
        let recent = instance(&ledger, template_id, "2024-03", &["c", "d", "e"]);
        let mut cancelled = instance(&ledger, template_id, "2024-02", &["a", "c"]);
        cancelled.cancel("admin").unwrap();
        ledger.insert_instance(old).unwrap();
        ledger.insert_instance(recent).unwrap();
        ledger.insert_instance(cancelled).unwrap();

        let pairs = ledger.recent_pairs(queue_id, p("2024-04"), 2);
        assert_eq!(pairs.len(), 3);
        assert!(pairs.contains(&pair_key("e", "c")));
        assert!(!pairs.contains(&pair_key("a", "b")));
        assert!(!pairs.contains(&pair_key("a", "c")));
    }

    #[test]
    fn references_resolve_by_name_and_prefix() {
        let (ledger, queue_id, template_id) = seeded();
        assert_eq!(ledger.find_queue("LAB").unwrap().id, queue_id);
        let prefix = &template_id.to_string()[..8];
        assert_eq!(ledger.find_template(prefix).unwrap().id, template_id);
        assert!(matches!(
            ledger.find_template("nope"),
            Err(Error::NotFound { .. })
        ));
    }
}
