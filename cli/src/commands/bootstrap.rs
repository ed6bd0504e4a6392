//! Bootstrap command: preflight, plan, execute.

use std::time::Duration;

use anyhow::{Result, bail};
use clap::Args;

use crate::executor::{self, ExecuteOptions, StepStatus};
use crate::infra::inventory::InventoryStore;
use crate::infra::known_hosts::KnownHostsStore;
use crate::infra::ssh::{SshTarget, Transport};
use crate::output::{OutputContext, progress};
use crate::plan::{self, LATEST_VERSION, Step};
use crate::preflight;

/// Arguments for the bootstrap command.
#[derive(Args)]
pub struct BootstrapArgs {
    /// Node name (case-insensitive)
    pub name: String,

    /// Agent version to install
    #[arg(id = "agent_version", short = 'a', long = "agent-version", default_value = LATEST_VERSION)]
    pub version: String,

    /// Run steps even when the facts say they could be skipped
    #[arg(short, long)]
    pub force: bool,

    /// Show the plan without sending any command
    #[arg(long)]
    pub dry_run: bool,

    /// Per-command timeout in seconds
    #[arg(short, long, default_value_t = 120)]
    pub timeout: u64,
}

/// Run the bootstrap command.
///
/// # Errors
///
/// Returns an error when the node is unknown, preflight fails, the OS
/// is unsupported, or a plan step fails.
pub async fn run<T: Transport>(
    ctx: &OutputContext,
    transport: &T,
    store: &InventoryStore,
    hosts: &KnownHostsStore,
    args: &BootstrapArgs,
    json: bool,
) -> Result<()> {
    let Some(node) = store.get(&args.name) else {
        bail!("node '{}' not found", args.name);
    };
    let target = SshTarget::for_node(&node, hosts.path());

    let spinner = ctx
        .show_progress()
        .then(|| progress::spinner(&format!("Probing {}...", node.name)));
    let probe = preflight::probe(transport, &node, hosts.path(), Duration::from_secs(15)).await;
    let facts = match probe {
        Ok(facts) => {
            if let Some(pb) = &spinner {
                progress::finish_ok(pb, &format!("Probed {}", node.name));
            }
            facts
        }
        Err(e) => {
            if let Some(pb) = &spinner {
                progress::finish_error(pb, &format!("Preflight failed for {}", node.name));
            }
            return Err(e);
        }
    };

    let plan = plan::build_plan(&node, &facts, &args.version, args.force)?;

    if args.dry_run {
        if json {
            println!("{}", serde_json::to_string_pretty(&plan)?);
        } else {
            print!("{}", plan::format_plan(&plan));
        }
        return Ok(());
    }

    let mut on_progress = |step: &Step, status: StepStatus| match status {
        StepStatus::Running => ctx.info(&step.description),
        StepStatus::Success => ctx.success(&step.description),
        StepStatus::Skipped => ctx.kv("skipped", &step.description),
        StepStatus::Failed => ctx.error(&step.description),
        StepStatus::Pending => {}
    };
    let result = executor::execute_plan(
        transport,
        store,
        &target,
        &plan,
        ExecuteOptions {
            dry_run: false,
            command_timeout: Duration::from_secs(args.timeout),
            on_progress: Some(&mut on_progress),
        },
    )
    .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    }
    if !result.success {
        let failed = result
            .steps
            .iter()
            .find(|s| s.status == StepStatus::Failed)
            .and_then(|s| s.error.clone())
            .unwrap_or_else(|| "step failed".to_string());
        bail!("bootstrap of '{}' failed: {failed}", node.name);
    }
    if !json {
        ctx.success(&format!(
            "Bootstrapped {} with agent {} in {:.1}s",
            node.name,
            args.version,
            result.total_duration_ms as f64 / 1000.0
        ));
    }
    Ok(())
}
