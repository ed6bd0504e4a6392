//! Read-only preflight probe of one node.
//!
//! Gathers the fact sheet the plan builder needs: OS family, CPU
//! architecture, home directory, Node.js runtime, npm, the installed
//! agent and the state of the managed service. Each probe command either
//! exits zero (possibly reporting a negative sentinel) or aborts the
//! whole preflight — a partial fact sheet is never returned.

use std::path::Path;
use std::time::Duration;

use anyhow::{Result, bail};
use flotilla_common::types::{CpuArch, FactSheet, Node, OsFamily};

use crate::infra::ssh::{ExecOutcome, SshTarget, Transport};

/// Service unit name on systemd nodes.
pub const SERVICE_UNIT: &str = "flotilla-agent.service";
/// Launchd label on darwin nodes.
pub const LAUNCHD_LABEL: &str = "sh.flotilla.agent";

const NO_NODE: &str = "NO_NODE";
const NO_NPM: &str = "NO_NPM";
const NO_AGENT: &str = "NO_AGENT";

/// Probe a node and assemble its fact sheet.
///
/// Uses accept-new verification for untrusted nodes, strict otherwise
/// (the mode is baked into the target by `SshTarget::for_node`).
///
/// # Errors
///
/// Returns an error when any round trip fails or a critical field comes
/// back empty.
pub async fn probe<T: Transport>(
    transport: &T,
    node: &Node,
    known_hosts: &Path,
    timeout: Duration,
) -> Result<FactSheet> {
    let target = SshTarget::for_node(node, known_hosts);

    // (1) identity: OS family, architecture, home directory in one trip
    let outcome = transport
        .execute(
            &target,
            r#"echo "OS=$(uname -s)"; echo "ARCH=$(uname -m)"; echo "HOME_DIR=$HOME""#,
            timeout,
        )
        .await;
    let identity = require_success("identify remote system", &outcome)?;
    let (os, arch, home_dir) = parse_identity(identity)?;

    // (2) scripting runtime
    let outcome = transport
        .execute(
            &target,
            &format!("command -v node >/dev/null 2>&1 && node --version || echo {NO_NODE}"),
            timeout,
        )
        .await;
    let (has_node, node_version) = parse_versioned(require_success("check Node.js", &outcome)?, NO_NODE);

    // (3) package manager
    let outcome = transport
        .execute(
            &target,
            &format!("command -v npm >/dev/null 2>&1 && echo HAS_NPM || echo {NO_NPM}"),
            timeout,
        )
        .await;
    let has_npm = require_success("check npm", &outcome)?.trim() == "HAS_NPM";

    // (4) product agent
    let outcome = transport
        .execute(
            &target,
            &format!(
                "command -v flotilla-agent >/dev/null 2>&1 && flotilla-agent --version || echo {NO_AGENT}"
            ),
            timeout,
        )
        .await;
    let (_, agent_version) = parse_versioned(require_success("check agent", &outcome)?, NO_AGENT);

    // (5) service manager, one command shape per OS family
    let outcome = transport
        .execute(&target, &service_query_command(os), timeout)
        .await;
    let (service_registered, service_active) =
        parse_service_query(require_success("query service manager", &outcome)?);

    Ok(FactSheet {
        os,
        arch,
        home_dir,
        has_node,
        node_version,
        has_npm,
        agent_version,
        service_registered,
        service_active,
    })
}

/// The OS-specific service-manager query. Both shapes always exit zero
/// and report through `SERVICE=`/`ACTIVE=` lines.
#[must_use]
pub fn service_query_command(os: OsFamily) -> String {
    match os {
        OsFamily::Darwin => format!(
            "launchctl list {LAUNCHD_LABEL} >/dev/null 2>&1 \
             && echo SERVICE=registered || echo SERVICE=unregistered; \
             launchctl list {LAUNCHD_LABEL} 2>/dev/null | grep -q '\"PID\"' \
             && echo ACTIVE=active || echo ACTIVE=inactive"
        ),
        // Unknown falls through to the systemd shape; the plan builder
        // rejects unknown OS before anything is mutated.
        _ => format!(
            "systemctl --user cat {SERVICE_UNIT} >/dev/null 2>&1 \
             && echo SERVICE=registered || echo SERVICE=unregistered; \
             echo ACTIVE=$(systemctl --user is-active {SERVICE_UNIT} 2>/dev/null || echo inactive)"
        ),
    }
}

fn require_success<'a>(what: &str, outcome: &'a ExecOutcome) -> Result<&'a str> {
    if outcome.timed_out {
        bail!("preflight: {what} timed out");
    }
    if !outcome.success() {
        let detail = if outcome.stderr.trim().is_empty() {
            format!("exit code {:?}", outcome.exit_code)
        } else {
            outcome.stderr.trim().to_string()
        };
        bail!("preflight: {what} failed: {detail}");
    }
    Ok(&outcome.stdout)
}

/// Parse the identity round trip. The home directory is a critical
/// field: an empty value aborts preflight.
fn parse_identity(stdout: &str) -> Result<(OsFamily, CpuArch, String)> {
    let os = labeled_line(stdout, "OS=").map(OsFamily::parse).unwrap_or(OsFamily::Unknown);
    let arch = labeled_line(stdout, "ARCH=").map(CpuArch::parse).unwrap_or(CpuArch::Unknown);
    let home_dir = labeled_line(stdout, "HOME_DIR=")
        .map(str::to_string)
        .unwrap_or_default();
    if home_dir.is_empty() {
        bail!("preflight: remote reported an empty home directory");
    }
    Ok((os, arch, home_dir))
}

/// Parse a presence/version probe: the sentinel means absent, anything
/// else is the version string.
fn parse_versioned(stdout: &str, sentinel: &str) -> (bool, Option<String>) {
    let line = stdout.trim();
    if line.is_empty() || line == sentinel {
        (false, None)
    } else {
        (true, Some(line.trim_start_matches('v').to_string()))
    }
}

fn parse_service_query(stdout: &str) -> (bool, bool) {
    let registered = labeled_line(stdout, "SERVICE=") == Some("registered");
    let active = labeled_line(stdout, "ACTIVE=") == Some("active");
    (registered, active)
}

fn labeled_line<'a>(stdout: &'a str, label: &str) -> Option<&'a str> {
    stdout
        .lines()
        .find_map(|line| line.trim().strip_prefix(label))
        .map(str::trim)
        .filter(|v| !v.is_empty())
}
