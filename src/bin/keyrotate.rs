// src/bin/keyrotate.rs
//! keyrotate — inspect and rotate the keys of a SQLCipher item store
//!
//! Usage: keyrotate status | rotate [reason] | sweep <namespace> [batch] | prune

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use key_rotation_vault::platform::software::SoftwarePlatform;
use key_rotation_vault::platform::sqlite::SqliteItemStore;
use key_rotation_vault::{load_config, KeyRotationEngine};
use rpassword::prompt_password;
use tracing::info;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: keyrotate status | rotate [reason] | sweep <namespace> [batch] | prune";

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first() else {
        bail!(USAGE);
    };

    let config = load_config();
    let passphrase = match std::env::var(&config.storage.passphrase_env) {
        Ok(key) => key,
        Err(_) => prompt_password("Store passphrase: ").context("Failed to read passphrase")?,
    };

    let store = Arc::new(
        SqliteItemStore::open(&config.storage.db_path, &passphrase).with_context(|| {
            format!(
                "Failed to open store at {} (is {} correct?)",
                config.storage.db_path.display(),
                config.storage.passphrase_env
            )
        })?,
    );
    let engine = KeyRotationEngine::with_config(
        Arc::new(SoftwarePlatform),
        store.clone(),
        store,
        config.rotation.clone(),
    )
    .context("Failed to start key rotation engine")?;

    match (command.as_str(), &args[1..]) {
        ("status", []) => {
            let status = engine.get_rotation_status();
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        ("rotate", rest) if rest.len() <= 1 => {
            let result = engine
                .rotate_keys(rest.first().map(String::as_str))
                .context("Rotation failed")?;
            info!(version = %result.new_key_version.id, "rotated");
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        ("sweep", [namespace, rest @ ..]) if rest.len() <= 1 => {
            let batch = rest
                .first()
                .map(|b| b.parse::<usize>())
                .transpose()
                .context("Batch size must be a positive integer")?;
            let report = engine
                .re_encrypt_all_items(namespace, batch)
                .with_context(|| format!("Sweep of `{namespace}` failed"))?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        ("prune", []) => {
            let report = engine.prune_key_versions().context("Pruning failed")?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        _ => bail!(USAGE),
    }

    Ok(())
}
