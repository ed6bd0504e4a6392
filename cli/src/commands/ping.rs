//! Ping command: TOFU handshake plus a round-trip liveness check.

use std::time::Duration;

use anyhow::{Result, bail};
use chrono::Utc;
use clap::Args;
use flotilla_common::types::NodeUpdate;

use crate::infra::inventory::InventoryStore;
use crate::infra::known_hosts::KnownHostsStore;
use crate::infra::ssh::{SshTarget, Transport};
use crate::output::OutputContext;
use crate::trust::{self, TrustOutcome};

/// Arguments for the ping command.
#[derive(Args)]
pub struct PingArgs {
    /// Node name (case-insensitive)
    pub name: String,

    /// Per-command timeout in seconds
    #[arg(short, long, default_value_t = 10)]
    pub timeout: u64,

    /// Accept a changed host key and re-pin it
    #[arg(long)]
    pub trust_new_key: bool,
}

/// Run the ping command.
///
/// # Errors
///
/// Returns an error for unknown nodes, trust violations, and failed
/// round trips.
pub async fn run<T: Transport>(
    ctx: &OutputContext,
    transport: &T,
    store: &InventoryStore,
    hosts: &KnownHostsStore,
    args: &PingArgs,
    json: bool,
) -> Result<()> {
    let Some(node) = store.get(&args.name) else {
        bail!("node '{}' not found", args.name);
    };
    let timeout = Duration::from_secs(args.timeout);

    let outcome = trust::establish(transport, hosts, &node, args.trust_new_key, timeout).await?;
    match &outcome {
        TrustOutcome::FirstContact { pinned } => {
            ctx.info(&format!("First contact: pinned {pinned} host key(s)"));
        }
        TrustOutcome::Unchanged => {}
        TrustOutcome::Repinned { old_fingerprint } => {
            ctx.warn(&format!("Host key changed and was re-pinned (was: {old_fingerprint})"));
        }
    }

    // Refresh the node's view before the round trip so SSH verifies
    // against the key we just pinned.
    let target = SshTarget::for_node(&node, hosts.path());
    let result = transport.execute(&target, "echo FLOTILLA_PONG", timeout).await;
    if !result.success() || !result.stdout.contains("FLOTILLA_PONG") {
        let detail = if result.timed_out {
            format!("timed out after {}s", args.timeout)
        } else if result.stderr.trim().is_empty() {
            format!("exit code {:?}", result.exit_code)
        } else {
            result.stderr.trim().to_string()
        };
        bail!("ping failed for '{}': {detail}", node.name);
    }

    store.update(
        &node.name,
        &NodeUpdate {
            trusted: Some(true),
            host_key_fingerprint: trust::node_fingerprint(hosts, &node),
            last_contact: Some(Utc::now()),
            ..NodeUpdate::default()
        },
    )?;

    if json {
        println!(
            "{}",
            serde_json::json!({
                "node": node.name,
                "reachable": true,
                "trusted": true,
            })
        );
    } else {
        ctx.success(&format!("{} is reachable", node.name));
    }
    Ok(())
}
