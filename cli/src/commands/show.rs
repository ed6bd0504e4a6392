//! Show command: full detail for one node.

use anyhow::{Result, bail};
use clap::Args;
use flotilla_common::types::Node;

use crate::infra::inventory::InventoryStore;
use crate::infra::known_hosts::KnownHostsStore;
use crate::output::OutputContext;
use crate::trust;

/// Arguments for the show command.
#[derive(Args)]
pub struct ShowArgs {
    /// Node name (case-insensitive)
    pub name: String,
}

/// Run the show command.
///
/// # Errors
///
/// Returns an error when the node does not exist.
pub fn run(
    ctx: &OutputContext,
    store: &InventoryStore,
    hosts: &KnownHostsStore,
    args: &ShowArgs,
    json: bool,
) -> Result<()> {
    let Some(node) = store.get(&args.name) else {
        bail!("node '{}' not found", args.name);
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&node)?);
        return Ok(());
    }

    render(ctx, &node, trust::node_fingerprint(hosts, &node));
    Ok(())
}

fn render(ctx: &OutputContext, node: &Node, pinned: Option<String>) {
    ctx.header(&node.name);
    ctx.kv("id        ", &node.id);
    ctx.kv("address   ", &format!("{}@{}:{}", node.user, node.host, node.port));
    ctx.kv("trusted   ", if node.trusted { "yes" } else { "no" });
    if let Some(fingerprint) = pinned.or_else(|| node.host_key_fingerprint.clone()) {
        ctx.kv("host key  ", &fingerprint);
    }
    if !node.tags.is_empty() {
        ctx.kv("tags      ", &node.tags.join(", "));
    }
    if let (Some(os), Some(arch)) = (node.os, node.arch) {
        ctx.kv("platform  ", &format!("{} {}", os.as_str(), arch.as_str()));
    }
    if let Some(install) = &node.install {
        ctx.kv(
            "agent     ",
            &format!("{} (installed {})", install.version, install.installed_at.to_rfc3339()),
        );
    }
    if let Some(state) = node.service_state {
        ctx.kv("service   ", state.as_str());
    }
    if let Some(seen) = node.last_contact {
        ctx.kv("last seen ", &seen.to_rfc3339());
    }
}
