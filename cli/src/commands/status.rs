//! Status command: health-check one node or sweep the whole fleet.
//!
//! Multi-node sweeps fan out concurrently with a fixed concurrency
//! bound; each node's probe remains a single sequential round trip.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, bail};
use chrono::Utc;
use clap::Args;
use flotilla_common::types::{HealthRecord, Node, NodeUpdate};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::diagnostics;
use crate::infra::inventory::InventoryStore;
use crate::infra::known_hosts::KnownHostsStore;
use crate::infra::ssh::{SshTarget, Transport};
use crate::output::OutputContext;

/// Nodes probed at once during a fleet sweep.
const SWEEP_CONCURRENCY: usize = 8;

/// Arguments for the status command.
#[derive(Args)]
pub struct StatusArgs {
    /// Node name; omit to sweep every node
    pub name: Option<String>,

    /// Per-node timeout in seconds
    #[arg(short, long, default_value_t = 10)]
    pub timeout: u64,
}

/// Run the status command.
///
/// # Errors
///
/// Returns an error when a named node does not exist or when any probed
/// node is offline (so scripted sweeps fail loudly).
pub async fn run<T: Transport + Send + Sync + 'static>(
    ctx: &OutputContext,
    transport: &Arc<T>,
    store: &InventoryStore,
    hosts: &KnownHostsStore,
    args: &StatusArgs,
    json: bool,
) -> Result<()> {
    let nodes = match &args.name {
        Some(name) => match store.get(name) {
            Some(node) => vec![node],
            None => bail!("node '{name}' not found"),
        },
        None => store.list(),
    };
    if nodes.is_empty() {
        if json {
            println!("[]");
        } else {
            ctx.info("No nodes registered");
        }
        return Ok(());
    }

    let timeout = Duration::from_secs(args.timeout);
    let results = sweep(transport, nodes, hosts, timeout).await;
    persist_contacts(store, &results)?;

    if json {
        let payload: Vec<_> = results
            .iter()
            .map(|(node, record)| {
                serde_json::json!({
                    "name": node.name,
                    "health": record,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        for (node, record) in &results {
            render_line(ctx, node, record);
        }
    }

    let offline = results.iter().filter(|(_, r)| !r.online).count();
    if offline > 0 {
        bail!("{offline} of {} node(s) offline", results.len());
    }
    Ok(())
}

/// Probe every node with bounded concurrency, returning results in
/// inventory order.
async fn sweep<T: Transport + Send + Sync + 'static>(
    transport: &Arc<T>,
    nodes: Vec<Node>,
    hosts: &KnownHostsStore,
    timeout: Duration,
) -> Vec<(Node, HealthRecord)> {
    let limit = Arc::new(Semaphore::new(SWEEP_CONCURRENCY));
    let mut tasks = JoinSet::new();
    for (index, node) in nodes.into_iter().enumerate() {
        let target = SshTarget::for_node(&node, hosts.path());
        let limit = Arc::clone(&limit);
        let transport = Arc::clone(transport);
        tasks.spawn(async move {
            // Closing the semaphore is not part of this flow; treat a
            // failed acquire as an offline probe.
            let record = match limit.acquire().await {
                Ok(_permit) => {
                    diagnostics::probe(transport.as_ref(), &node, &target, timeout).await
                }
                Err(_) => HealthRecord::offline("probe cancelled"),
            };
            (index, node, record)
        });
    }

    let mut results: Vec<(usize, Node, HealthRecord)> = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        if let Ok(entry) = joined {
            results.push(entry);
        }
    }
    results.sort_by_key(|(index, _, _)| *index);
    results.into_iter().map(|(_, node, record)| (node, record)).collect()
}

/// Persist fresh contact data for nodes that answered. The probe
/// itself never writes, so a failed sweep leaves records untouched.
fn persist_contacts(store: &InventoryStore, results: &[(Node, HealthRecord)]) -> Result<()> {
    for (node, record) in results {
        if record.online {
            store.update(
                &node.name,
                &NodeUpdate {
                    last_contact: Some(Utc::now()),
                    service_state: Some(record.service_status),
                    ..NodeUpdate::default()
                },
            )?;
        }
    }
    Ok(())
}

fn render_line(ctx: &OutputContext, node: &Node, record: &HealthRecord) {
    if record.online {
        let version = record.version.as_deref().unwrap_or("-");
        let uptime = record
            .uptime
            .as_deref()
            .map(|u| format!(", up {u}"))
            .unwrap_or_default();
        ctx.success(&format!(
            "{:<20} agent {version} {}{uptime}",
            node.name,
            record.service_status.as_str(),
        ));
    } else {
        let error = record.error.as_deref().unwrap_or("unreachable");
        ctx.error(&format!("{:<20} offline: {error}", node.name));
    }
}
