//! rota init command implementation
//!
//! Creates the data directory, an empty ledger and a default config.
//! Whoever runs the first init is listed as the first administrator.

use std::path::PathBuf;

use crate::config::Config;
use crate::error::Result;
use crate::identity::resolve_actor;
use crate::ledger::Ledger;
use crate::output::{emit_success, HumanOutput, OutputOptions};
use crate::storage::Storage;

#[derive(serde::Serialize)]
struct InitReport {
    root: PathBuf,
    created: InitCreated,
    admins: Vec<String>,
}

#[derive(serde::Serialize)]
struct InitCreated {
    config: bool,
    data_dir: bool,
    ledger: bool,
}

pub fn run(root: PathBuf, actor: Option<&str>, output: OutputOptions) -> Result<()> {
    let storage = Storage::new(&root);

    let created_data_dir = !storage.is_initialized();
    storage.init()?;

    let ledger_path = storage.ledger_file();
    let created_ledger = !ledger_path.exists();
    if created_ledger {
        storage.write_json(&ledger_path, &Ledger::default())?;
    }

    let config_path = storage.config_file();
    let created_config = !config_path.exists();
    let config = if created_config {
        let mut config = Config::default();
        config.identity.admins.push(resolve_actor(actor, &config));
        config.save(&config_path)?;
        config
    } else {
        Config::load(&config_path)?
    };

    let report = InitReport {
        root: root.clone(),
        created: InitCreated {
            config: created_config,
            data_dir: created_data_dir,
            ledger: created_ledger,
        },
        admins: config.identity.admins.clone(),
    };

    let mut created_items = Vec::new();
    if created_config {
        created_items.push(".rota.toml");
    }
    if created_data_dir {
        created_items.push(".rota/");
    }
    if created_ledger {
        created_items.push(".rota/ledger.json");
    }

    let header = if created_items.is_empty() {
        "rota init: nothing to do".to_string()
    } else {
        "rota init: initialized".to_string()
    };

    let mut human = HumanOutput::new(header);
    human.push_summary("root", root.display().to_string());
    human.push_summary(
        "created",
        if created_items.is_empty() {
            "none".to_string()
        } else {
            created_items.join(", ")
        },
    );
    human.push_summary("admins", config.identity.admins.join(", "));
    human.push_next_step("rota queue add <name>");
    human.push_next_step("rota queue join <queue> <user>...");

    emit_success(output, "init", &report, Some(&human))
}
