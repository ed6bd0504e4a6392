//! Remove command: delete a node and its pinned host keys.

use anyhow::{Result, bail};
use clap::Args;
use dialoguer::Confirm;

use crate::infra::inventory::InventoryStore;
use crate::infra::known_hosts::KnownHostsStore;
use crate::output::OutputContext;

/// Arguments for the remove command.
#[derive(Args)]
pub struct RemoveArgs {
    /// Node name (case-insensitive)
    pub name: String,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub force: bool,
}

/// Run the remove command.
///
/// # Errors
///
/// Returns an error when the node does not exist or the prompt fails.
pub fn run(
    ctx: &OutputContext,
    store: &InventoryStore,
    hosts: &KnownHostsStore,
    args: &RemoveArgs,
    json: bool,
) -> Result<()> {
    let Some(node) = store.get(&args.name) else {
        bail!("node '{}' not found", args.name);
    };

    // Prompt only where a human can answer.
    if !args.force && !json && ctx.is_tty {
        let confirmed = Confirm::new()
            .with_prompt(format!("Remove node '{}' ({}@{})?", node.name, node.user, node.host))
            .default(false)
            .interact()?;
        if !confirmed {
            ctx.info("Aborted");
            return Ok(());
        }
    }

    store.remove(&node.name)?;
    hosts.remove(&node.host, node.port)?;

    if json {
        println!("{}", serde_json::json!({ "removed": node.name }));
    } else {
        ctx.success(&format!("Removed {}", node.name));
    }
    Ok(())
}
