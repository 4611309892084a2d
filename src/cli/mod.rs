//! Command-line interface for rota
//!
//! This module defines the CLI structure using clap derive macros.
//! Each command group is implemented in its own submodule.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::identity::{resolve_actor, StaticDirectory};
use crate::notify::{NotificationDestination, Notifier};
use crate::output::OutputOptions;
use crate::storage::Storage;
use crate::store::FileStore;

mod generate;
mod init;
mod queue;
mod stats;
mod swap;
mod task;
mod template;

/// rota - fair task rotation
///
/// Assigns recurring duties to a pool of people by a fairness score and lets
/// assignees swap, transfer or release their slot.
#[derive(Parser, Debug)]
#[command(name = "rota")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Directory holding .rota/ (defaults to current directory)
    #[arg(long, global = true, env = "ROTA_DIR")]
    pub dir: Option<PathBuf>,

    /// Acting user
    #[arg(long, global = true, env = "ROTA_ACTOR")]
    pub actor: Option<String>,

    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Notification sink: a file path or "-" for stdout
    /// (default: .rota/notifications.jsonl)
    #[arg(long, global = true, value_name = "PATH|-")]
    pub events: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create .rota/ and a default .rota.toml
    Init,

    /// Rotation queues and their members
    #[command(subcommand)]
    Queue(QueueCommands),

    /// Recurring task templates
    #[command(subcommand)]
    Template(TemplateCommands),

    /// Generate task instances for one or more periods
    Generate {
        /// Periods (YYYY-MM)
        #[arg(required = true)]
        periods: Vec<String>,

        /// Limit to these templates (name or id prefix)
        #[arg(long = "template")]
        templates: Vec<String>,

        /// Run the selection without saving anything
        #[arg(long)]
        preview: bool,
    },

    /// Task instances
    #[command(subcommand)]
    Task(TaskCommands),

    /// Swap, transfer and pool-release requests
    #[command(subcommand)]
    Swap(SwapCommands),

    /// Read-only statistics
    #[command(subcommand)]
    Stats(StatsCommands),
}

/// Queue subcommands
#[derive(Subcommand, Debug)]
pub enum QueueCommands {
    /// Create a queue
    Add {
        name: String,

        /// Minimum months between two assignments of one member
        #[arg(long, default_value_t = 1)]
        min_gap: u32,

        /// Jitter factor between 0 and 1
        #[arg(long, default_value_t = 0.1)]
        random_factor: f64,

        /// Favour members with fewer open assignments
        #[arg(long)]
        workload: bool,

        /// Swaps and transfers also need an administrator
        #[arg(long)]
        require_admin: bool,

        /// Months in which a joint assignment counts as a pairing conflict
        #[arg(long, default_value_t = 2)]
        conflict_window: u32,
    },

    /// List queues with member counts
    List,

    /// Add or reactivate members
    Join {
        queue: String,

        #[arg(required = true)]
        users: Vec<String>,
    },

    /// Deactivate a member; history is kept
    Leave { queue: String, user: String },

    /// Edit a member's availability
    Avail {
        queue: String,
        user: String,

        /// Periods the member cannot take
        #[arg(long)]
        exclude: Vec<String>,

        /// Periods the member would like
        #[arg(long)]
        prefer: Vec<String>,

        /// Periods the member would rather not take
        #[arg(long)]
        avoid: Vec<String>,

        /// Periods to reset to neutral
        #[arg(long)]
        clear: Vec<String>,
    },
}

/// Template subcommands
#[derive(Subcommand, Debug)]
pub enum TemplateCommands {
    /// Create a template
    Add {
        name: String,

        /// Queue that staffs the template
        #[arg(long)]
        queue: String,

        /// monthly, quarterly, annual, one_time
        #[arg(long, default_value = "monthly")]
        cadence: String,

        /// First period the template fires for (default: current month)
        #[arg(long)]
        start: Option<String>,

        #[arg(long, default_value_t = 1)]
        min: u32,

        #[arg(long, default_value_t = 1)]
        max: u32,

        /// People per instance
        #[arg(long = "default", default_value_t = 1)]
        default_people: u32,

        /// fixed:<start>-<end> or relative:<start>,<end>
        #[arg(long, default_value = "relative:0,0", allow_hyphen_values = true)]
        window: String,

        /// low, medium, high
        #[arg(long, default_value = "medium")]
        priority: String,

        /// Estimated effort in hours
        #[arg(long)]
        hours: Option<f64>,

        #[arg(long)]
        category: Option<String>,

        #[arg(long)]
        description: Option<String>,
    },

    /// List templates
    List,

    /// Stop generating instances for a template
    Deactivate { template: String },

    /// Resume generating instances for a template
    Activate { template: String },
}

/// Task subcommands
#[derive(Subcommand, Debug)]
pub enum TaskCommands {
    /// List instances
    List {
        #[arg(long)]
        period: Option<String>,

        /// Only instances currently held by this user
        #[arg(long)]
        user: Option<String>,

        /// scheduled, in_progress, completed, cancelled
        #[arg(long)]
        status: Option<String>,
    },

    /// Show one instance with its audit trail
    Show { id: String },

    /// Mark an instance in progress
    Start { id: String },

    /// Complete an instance
    Complete {
        id: String,

        #[arg(long)]
        notes: Option<String>,

        /// 1 to 5
        #[arg(long)]
        rating: Option<u8>,

        /// Hours spent
        #[arg(long)]
        hours: Option<f64>,
    },

    /// Cancel an instance (administrators only)
    Cancel { id: String },

    /// Add a note to the audit trail
    Note { id: String, text: String },

    /// Send deadline reminders
    Sweep {
        /// Reference date (default: today)
        #[arg(long)]
        today: Option<String>,
    },

    /// Move old audit entries of finished instances to .rota/archive/
    Archive {
        /// Entries to keep per instance
        #[arg(long, default_value_t = 20)]
        retain: usize,
    },
}

/// Swap subcommands
#[derive(Subcommand, Debug)]
pub enum SwapCommands {
    /// Open a request on one of your instances
    Request {
        task: String,

        /// swap, transfer, pool
        #[arg(long, default_value = "swap")]
        kind: String,

        /// Receiving user (swap and transfer)
        #[arg(long)]
        to: Option<String>,

        #[arg(long)]
        reason: Option<String>,
    },

    /// Approve as the target or as an administrator
    Approve { id: String },

    /// Reject or withdraw a request
    Reject {
        id: String,

        #[arg(long)]
        reason: Option<String>,
    },

    /// Claim an open pool release
    Claim { id: String },

    /// List requests
    List {
        /// Only pool releases you could claim
        #[arg(long)]
        pool: bool,

        /// Only requests on this instance
        #[arg(long)]
        task: Option<String>,

        /// pending, approved, rejected, expired
        #[arg(long)]
        status: Option<String>,
    },

    /// Expire pool releases past their horizon
    Expire,
}

/// Stats subcommands
#[derive(Subcommand, Debug)]
pub enum StatsCommands {
    /// Per-user counts
    User { user: String },

    /// System-wide breakdown and trend
    System {
        /// Months in the trend
        #[arg(long, default_value_t = 6)]
        months: u32,
    },
}

/// Everything a command needs once `.rota/` is known to exist
pub(crate) struct Context {
    pub storage: Storage,
    pub config: Config,
    pub store: FileStore,
    pub directory: StaticDirectory,
    pub notifier: Box<dyn Notifier>,
    pub actor: String,
    pub output: OutputOptions,
}

impl Context {
    fn open(root: Option<PathBuf>, actor: Option<&str>, events: Option<&str>, output: OutputOptions) -> Result<Self> {
        let root = resolve_root(root)?;
        let storage = Storage::new(&root);
        if !storage.is_initialized() {
            return Err(Error::not_found("ledger", storage.data_dir().display()));
        }

        let config = Config::load_from_dir(&root)?;
        let destination = NotificationDestination::parse(events)
            .unwrap_or_else(|| NotificationDestination::File(storage.notifications_file()));
        let notifier: Box<dyn Notifier> = Box::new(destination.open()?);

        Ok(Self {
            store: FileStore::new(storage.clone()).with_lock_timeout(config.storage.lock_timeout_ms),
            directory: StaticDirectory::from_config(&config),
            actor: resolve_actor(actor, &config),
            storage,
            config,
            notifier,
            output,
        })
    }
}

fn resolve_root(root: Option<PathBuf>) -> Result<PathBuf> {
    match root {
        Some(path) => Ok(path),
        None => Ok(std::env::current_dir()?),
    }
}

impl Cli {
    /// Execute the CLI command
    pub fn run(self) -> Result<()> {
        let output = OutputOptions {
            json: self.json,
            quiet: self.quiet,
        };
        if let Commands::Init = self.command {
            return init::run(resolve_root(self.dir)?, self.actor.as_deref(), output);
        }

        let ctx = Context::open(self.dir, self.actor.as_deref(), self.events.as_deref(), output)?;
        match self.command {
            Commands::Init => Ok(()),
            Commands::Queue(cmd) => match cmd {
                QueueCommands::Add {
                    name,
                    min_gap,
                    random_factor,
                    workload,
                    require_admin,
                    conflict_window,
                } => queue::run_add(
                    &ctx,
                    queue::AddOptions {
                        name,
                        min_gap,
                        random_factor,
                        workload,
                        require_admin,
                        conflict_window,
                    },
                ),
                QueueCommands::List => queue::run_list(&ctx),
                QueueCommands::Join { queue, users } => queue::run_join(&ctx, &queue, &users),
                QueueCommands::Leave { queue, user } => queue::run_leave(&ctx, &queue, &user),
                QueueCommands::Avail {
                    queue,
                    user,
                    exclude,
                    prefer,
                    avoid,
                    clear,
                } => queue::run_avail(
                    &ctx,
                    queue::AvailOptions {
                        queue,
                        user,
                        exclude,
                        prefer,
                        avoid,
                        clear,
                    },
                ),
            },
            Commands::Template(cmd) => match cmd {
                TemplateCommands::Add {
                    name,
                    queue,
                    cadence,
                    start,
                    min,
                    max,
                    default_people,
                    window,
                    priority,
                    hours,
                    category,
                    description,
                } => template::run_add(
                    &ctx,
                    template::AddOptions {
                        name,
                        queue,
                        cadence,
                        start,
                        min,
                        max,
                        default_people,
                        window,
                        priority,
                        hours,
                        category,
                        description,
                    },
                ),
                TemplateCommands::List => template::run_list(&ctx),
                TemplateCommands::Deactivate { template } => {
                    template::run_set_active(&ctx, &template, false)
                }
                TemplateCommands::Activate { template } => {
                    template::run_set_active(&ctx, &template, true)
                }
            },
            Commands::Generate {
                periods,
                templates,
                preview,
            } => generate::run(
                &ctx,
                generate::GenerateOptions {
                    periods,
                    templates,
                    preview,
                },
            ),
            Commands::Task(cmd) => match cmd {
                TaskCommands::List {
                    period,
                    user,
                    status,
                } => task::run_list(&ctx, period, user, status),
                TaskCommands::Show { id } => task::run_show(&ctx, &id),
                TaskCommands::Start { id } => task::run_start(&ctx, &id),
                TaskCommands::Complete {
                    id,
                    notes,
                    rating,
                    hours,
                } => task::run_complete(&ctx, &id, notes, rating, hours),
                TaskCommands::Cancel { id } => task::run_cancel(&ctx, &id),
                TaskCommands::Note { id, text } => task::run_note(&ctx, &id, &text),
                TaskCommands::Sweep { today } => task::run_sweep(&ctx, today),
                TaskCommands::Archive { retain } => task::run_archive(&ctx, retain),
            },
            Commands::Swap(cmd) => match cmd {
                SwapCommands::Request {
                    task,
                    kind,
                    to,
                    reason,
                } => swap::run_request(&ctx, &task, &kind, to, reason),
                SwapCommands::Approve { id } => swap::run_approve(&ctx, &id),
                SwapCommands::Reject { id, reason } => swap::run_reject(&ctx, &id, reason),
                SwapCommands::Claim { id } => swap::run_claim(&ctx, &id),
                SwapCommands::List { pool, task, status } => swap::run_list(&ctx, pool, task, status),
                SwapCommands::Expire => swap::run_expire(&ctx),
            },
            Commands::Stats(cmd) => match cmd {
                StatsCommands::User { user } => stats::run_user(&ctx, &user),
                StatsCommands::System { months } => stats::run_system(&ctx, months),
            },
        }
    }
}
