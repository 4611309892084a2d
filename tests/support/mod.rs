#![allow(dead_code)]

use std::path::Path;

use assert_cmd::Command;
use rota::instance::{AssignmentMethod, TaskInstance};
use rota::period::Period;
use rota::queue::RotationQueue;
use rota::storage::Storage;
use rota::store::{FileStore, MemoryStore, Store};
use rota::template::{PeopleBounds, TaskTemplate};
use tempfile::TempDir;
use uuid::Uuid;

pub fn p(s: &str) -> Period {
    s.parse().expect("period")
}

/// A queue in a store, with helpers to seed members, templates and instances.
pub struct Lab<S: Store> {
    pub store: S,
    pub queue_id: Uuid,
}

impl Lab<MemoryStore> {
    pub fn new(queue: RotationQueue) -> Self {
        Lab::with_store(MemoryStore::new(), queue)
    }
}

impl<S: Store> Lab<S> {
    pub fn with_store(store: S, queue: RotationQueue) -> Self {
        let queue_id = store
            .transact(|ledger| Ok(ledger.add_queue(queue)?.id))
            .expect("add queue");
        Self { store, queue_id }
    }

    pub fn join(&self, users: &[&str]) {
        self.store
            .transact(|ledger| {
                for user in users {
                    ledger.enroll(self.queue_id, user)?;
                }
                Ok(())
            })
            .expect("enroll");
    }

    /// Seed history: one completed assignment in `last`.
    pub fn history(&self, user: &str, last: &str, total: u32) {
        let last = p(last);
        self.store
            .transact(|ledger| {
                let member = ledger.enroll(self.queue_id, user)?;
                member.last_assigned_period = Some(last);
                member.total_assignments = total;
                member.completed_count = total;
                member.completion_rate = 100.0;
                Ok(())
            })
            .expect("seed history");
    }

    pub fn template(&self, name: &str, start: &str, people: u32) -> Uuid {
        let start = p(start);
        self.store
            .transact(|ledger| {
                let template = TaskTemplate::builder(name, self.queue_id)
                    .start_period(start)
                    .people(PeopleBounds::new(1, people.max(1), people)?)
                    .build()?;
                Ok(ledger.add_template(template)?.id)
            })
            .expect("add template")
    }

    /// Instance created by hand, bypassing the scorer.
    pub fn instance(&self, template_id: Uuid, period: &str, assignees: &[&str]) -> Uuid {
        let period = p(period);
        let assignees: Vec<String> = assignees.iter().map(|u| u.to_string()).collect();
        self.store
            .transact(|ledger| {
                let template = ledger.template(template_id)?.clone();
                let instance = TaskInstance::new(
                    &template,
                    period,
                    template.execution_window(&period)?,
                    assignees.clone(),
                    AssignmentMethod::Manual,
                )?;
                let id = ledger.insert_instance(instance)?.id;
                for user in &assignees {
                    if let Some(member) = ledger.member_mut(self.queue_id, user) {
                        member.record_assignment(period);
                    }
                }
                Ok(id)
            })
            .expect("add instance")
    }

    pub fn assignees(&self, instance_id: Uuid) -> Vec<String> {
        self.store
            .read()
            .expect("read")
            .instance(instance_id)
            .expect("instance")
            .current_assignees
            .clone()
    }

    pub fn total_assignments(&self, user: &str) -> u32 {
        self.store
            .read()
            .expect("read")
            .member(self.queue_id, user)
            .map(|m| m.total_assignments)
            .unwrap_or(0)
    }
}

/// Initialized `.rota/` in a temp dir
pub fn file_store() -> (TempDir, FileStore) {
    let dir = tempfile::tempdir().expect("tempdir");
    let storage = Storage::new(dir.path());
    storage.init().expect("init storage");
    (dir, FileStore::new(storage))
}

pub fn open_file_store(root: &Path) -> FileStore {
    FileStore::new(Storage::new(root))
}

/// `rota` binary run inside `root`, isolated from the caller's environment.
pub fn rota_cmd(root: &Path) -> Command {
    let mut cmd = Command::cargo_bin("rota").expect("binary");
    cmd.current_dir(root)
        .env_remove("ROTA_DIR")
        .env_remove("ROTA_ACTOR")
        .env_remove("RUST_LOG");
    cmd
}
