//! Who is acting, and who may approve.
//!
//! Actor resolution order:
//! 1) CLI --actor (explicit)
//! 2) ROTA_ACTOR environment variable
//! 3) Config default (`identity.default_actor`)
//!
//! Users are opaque ids. The only capability the engine asks about is
//! "is this user an administrator", answered by an [`AdminDirectory`].

use std::collections::BTreeSet;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::queue::UserId;

pub const ACTOR_ENV: &str = "ROTA_ACTOR";

/// Resolve the acting user from the CLI flag, environment, and config.
pub fn resolve_actor(cli_actor: Option<&str>, config: &Config) -> String {
    if let Some(actor) = non_empty(cli_actor) {
        return actor.to_string();
    }

    if let Ok(env_actor) = std::env::var(ACTOR_ENV) {
        if let Some(actor) = non_empty(Some(env_actor.as_str())) {
            return actor.to_string();
        }
    }

    config.identity.default_actor.clone()
}

fn non_empty(input: Option<&str>) -> Option<&str> {
    input.and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed)
        }
    })
}

pub trait AdminDirectory: Send + Sync {
    fn is_admin(&self, user: &str) -> bool;

    /// Everyone who should hear about admin-gated requests
    fn admins(&self) -> Vec<UserId>;
}

/// `Authorization` error unless `actor` is an administrator.
pub fn require_admin(directory: &dyn AdminDirectory, actor: &str, action: &str) -> Result<()> {
    if directory.is_admin(actor) {
        return Ok(());
    }
    Err(Error::Authorization(format!(
        "only administrators may {} ({} is not one)",
        action, actor
    )))
}

/// Fixed set of administrators, usually from `.rota.toml`
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    admins: BTreeSet<UserId>,
}

impl StaticDirectory {
    pub fn new<I, S>(admins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<UserId>,
    {
        Self {
            admins: admins.into_iter().map(Into::into).collect(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.identity.admins.iter().cloned())
    }
}

impl AdminDirectory for StaticDirectory {
    fn is_admin(&self, user: &str) -> bool {
        self.admins.contains(user)
    }

    fn admins(&self) -> Vec<UserId> {
        self.admins.iter().cloned().collect()
    }
}
