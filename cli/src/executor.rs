//! Bootstrap plan execution.
//!
//! Steps run strictly in plan order; the first failing step aborts the
//! plan and later steps are simply absent from the result. On a fully
//! successful run the node's inventory record is refreshed in a single
//! update.

use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::Utc;
use flotilla_common::types::{InstallInfo, NodeUpdate, ServiceState};
use serde::Serialize;

use crate::infra::inventory::InventoryStore;
use crate::infra::ssh::{SshTarget, Transport};
use crate::plan::{Plan, Step};

/// Lifecycle of one step during execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Pending,
    Running,
    Success,
    Skipped,
    Failed,
}

/// Terminal record for one executed (or skipped) step.
#[derive(Debug, Clone, Serialize)]
pub struct StepResult {
    pub id: &'static str,
    pub description: String,
    pub status: StepStatus,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub output: String,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of executing a whole plan. `steps` holds one entry per step
/// that reached a terminal state; steps after a failure are absent.
#[derive(Debug, Clone, Serialize)]
pub struct PlanResult {
    pub success: bool,
    pub steps: Vec<StepResult>,
    pub total_duration_ms: u64,
    /// Version recorded in the inventory after a successful run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub installed_version: Option<String>,
}

/// Execution tuning and hooks.
pub struct ExecuteOptions<'a> {
    pub dry_run: bool,
    pub command_timeout: Duration,
    /// Invoked synchronously at each step's status transitions.
    pub on_progress: Option<&'a mut dyn FnMut(&Step, StepStatus)>,
}

impl Default for ExecuteOptions<'_> {
    fn default() -> Self {
        Self {
            dry_run: false,
            command_timeout: Duration::from_secs(120),
            on_progress: None,
        }
    }
}

/// Execute a plan against its node.
///
/// In dry-run mode no remote command is sent and every non-skipped step
/// is recorded as an immediate synthetic success.
///
/// # Errors
///
/// Returns an error only when the final inventory update fails; remote
/// failures are captured inside the returned `PlanResult`.
pub async fn execute_plan<T: Transport>(
    transport: &T,
    store: &InventoryStore,
    target: &SshTarget,
    plan: &Plan,
    mut opts: ExecuteOptions<'_>,
) -> Result<PlanResult> {
    let started = Instant::now();
    let mut steps = Vec::with_capacity(plan.steps.len());
    let mut failed = false;

    for step in &plan.steps {
        if step.skippable {
            notify(&mut opts, step, StepStatus::Skipped);
            steps.push(StepResult {
                id: step.id,
                description: step.description.clone(),
                status: StepStatus::Skipped,
                output: String::new(),
                duration_ms: 0,
                error: None,
            });
            continue;
        }

        notify(&mut opts, step, StepStatus::Running);
        let result = if opts.dry_run {
            StepResult {
                id: step.id,
                description: step.description.clone(),
                status: StepStatus::Success,
                output: String::new(),
                duration_ms: 0,
                error: None,
            }
        } else {
            run_step(transport, target, step, opts.command_timeout).await
        };
        notify(&mut opts, step, result.status);

        let step_failed = result.status == StepStatus::Failed;
        steps.push(result);
        if step_failed {
            failed = true;
            break;
        }
    }

    let success = !failed;
    let installed_version = if success && !opts.dry_run {
        store.update(
            &plan.node_name,
            &NodeUpdate {
                os: Some(plan.facts.os),
                arch: Some(plan.facts.arch),
                install: Some(InstallInfo {
                    version: plan.version.clone(),
                    installed_at: Utc::now(),
                }),
                last_contact: Some(Utc::now()),
                service_state: Some(ServiceState::Running),
                ..NodeUpdate::default()
            },
        )?;
        Some(plan.version.clone())
    } else {
        None
    };

    Ok(PlanResult {
        success,
        steps,
        total_duration_ms: elapsed_ms(&started),
        installed_version,
    })
}

async fn run_step<T: Transport>(
    transport: &T,
    target: &SshTarget,
    step: &Step,
    timeout: Duration,
) -> StepResult {
    let started = Instant::now();
    let mut output = String::new();

    for command in &step.commands {
        let outcome = transport.execute(target, command, timeout).await;
        output.push_str(&outcome.stdout);
        if !outcome.success() {
            let detail = if outcome.timed_out {
                format!("command timed out after {}s", timeout.as_secs())
            } else if outcome.stderr.trim().is_empty() {
                format!("command exited with code {:?}", outcome.exit_code)
            } else {
                outcome.stderr.trim().to_string()
            };
            let error = match &step.failure_hint {
                Some(hint) => format!("{detail} (hint: {hint})"),
                None => detail,
            };
            return StepResult {
                id: step.id,
                description: step.description.clone(),
                status: StepStatus::Failed,
                output,
                duration_ms: elapsed_ms(&started),
                error: Some(error),
            };
        }
    }

    StepResult {
        id: step.id,
        description: step.description.clone(),
        status: StepStatus::Success,
        output,
        duration_ms: elapsed_ms(&started),
        error: None,
    }
}

fn elapsed_ms(started: &Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn notify(opts: &mut ExecuteOptions<'_>, step: &Step, status: StepStatus) {
    if let Some(callback) = opts.on_progress.as_mut() {
        callback(step, status);
    }
}
