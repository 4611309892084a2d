//! rota - fair task rotation library
//!
//! This library provides the engine behind the rota CLI: recurring task
//! templates are turned into per-period instances whose assignees are picked
//! by a fairness score, and assignees can renegotiate their slot afterwards.
//!
//! # Core Concepts
//!
//! - **Templates**: recurring duties with a cadence, window rule and head count
//! - **Queues**: the pool of people for a duty and their assignment history
//! - **Scorer**: ranks members for a period (recency, workload, fairness, jitter)
//! - **Instances**: one per (template, period), with a typed audit log
//! - **Negotiation**: swap, transfer and first-claim-wins pool releases
//!
//! # Module Organization
//!
//! - `cli`: Command-line interface using clap
//! - `config`: Configuration loading from `.rota.toml`
//! - `error`: Error types and result aliases
//! - `period`, `template`, `queue`, `instance`, `swap`: the data model
//! - `scorer`: the fair rotation scorer
//! - `ledger`: the aggregate all services mutate
//! - `store`: exclusive transactions over the ledger (memory and file backed)
//! - `scheduler`, `lifecycle`, `negotiation`: the services
//! - `notify`: outbound notification payloads and sinks
//! - `identity`: actor resolution and the administrator directory
//! - `stats`: read-only aggregates
//! - `storage`: File storage and directory management
//! - `lock`: File locking and atomic operations for concurrency safety

pub mod cli;
pub mod config;
pub mod error;
pub mod identity;
pub mod instance;
pub mod ledger;
pub mod lifecycle;
pub mod lock;
pub mod negotiation;
pub mod notify;
pub mod output;
pub mod period;
pub mod queue;
pub mod scheduler;
pub mod scorer;
pub mod stats;
pub mod storage;
pub mod store;
pub mod swap;
pub mod template;

pub use error::{Error, Result};
pub use ledger::Ledger;
pub use store::{FileStore, MemoryStore, Store};
