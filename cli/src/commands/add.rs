//! Add command: register a node in the inventory.

use anyhow::Result;
use clap::Args;

use crate::infra::inventory::{AddNode, InventoryStore};
use crate::output::OutputContext;

/// Arguments for the add command.
#[derive(Args)]
pub struct AddArgs {
    /// Unique display name for the node
    pub name: String,

    /// Hostname or IP address
    pub host: String,

    /// SSH login account
    #[arg(short, long)]
    pub user: String,

    /// SSH port
    #[arg(short, long, default_value_t = 22)]
    pub port: u32,

    /// Free-form tag (repeatable)
    #[arg(short, long = "tag")]
    pub tags: Vec<String>,
}

/// Run the add command.
///
/// # Errors
///
/// Returns an error on invalid input or a duplicate name.
pub fn run(ctx: &OutputContext, store: &InventoryStore, args: &AddArgs, json: bool) -> Result<()> {
    let node = store.add(&AddNode {
        name: args.name.clone(),
        host: args.host.clone(),
        port: args.port,
        user: args.user.clone(),
        tags: args.tags.clone(),
    })?;

    if json {
        println!("{}", serde_json::to_string_pretty(&node)?);
    } else {
        ctx.success(&format!(
            "Added {} ({}@{}:{})",
            node.name, node.user, node.host, node.port
        ));
        ctx.info("Run `flotilla ping` to verify connectivity and pin its host key");
    }
    Ok(())
}
