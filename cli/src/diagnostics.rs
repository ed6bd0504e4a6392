//! One-shot remote health probe.
//!
//! Sends a single composite command framed by start/end markers and
//! classifies whatever comes back into a `HealthRecord`. This module
//! never raises and never writes to the inventory; persisting the
//! refreshed contact timestamp is the caller's business.

use std::time::Duration;

use flotilla_common::types::{HealthRecord, Node, OsFamily, ServiceState};
use serde_json::Value;

use crate::infra::ssh::{SshTarget, Transport};
use crate::preflight::{LAUNCHD_LABEL, SERVICE_UNIT};

const START_MARKER: &str = "DIAG_START";
const END_MARKER: &str = "DIAG_END";
const VERSION_NOT_FOUND: &str = "NOT_FOUND";

/// Millisecond uptime field inside the agent's status JSON.
const UPTIME_FIELD: &str = "uptimeMs";

/// The composite diagnostic command for a node's OS family. Every
/// branch exits zero and reports through labeled lines, so a non-zero
/// exit always means the transport or shell itself failed.
#[must_use]
pub fn diagnostic_command(os: OsFamily) -> String {
    let service_probe = match os {
        OsFamily::Darwin => format!(
            "launchctl list {LAUNCHD_LABEL} 2>/dev/null | grep -q '\"PID\"' \
             && echo SERVICE:running || echo SERVICE:stopped"
        ),
        _ => format!(
            "echo SERVICE:$(systemctl --user is-active {SERVICE_UNIT} 2>/dev/null \
             | sed 's/^active$/running/;s/^inactive$/stopped/' || echo unknown)"
        ),
    };
    format!(
        "echo {START_MARKER}; \
         echo VERSION:$(flotilla-agent --version 2>/dev/null || echo {VERSION_NOT_FOUND}); \
         {service_probe}; \
         echo STATUS_JSON:$(flotilla-agent status --json 2>/dev/null || echo '{{}}'); \
         echo {END_MARKER}"
    )
}

/// Probe one node's health. All failure modes are folded into the
/// returned record.
pub async fn probe<T: Transport>(
    transport: &T,
    node: &Node,
    target: &SshTarget,
    timeout: Duration,
) -> HealthRecord {
    let os = node.os.unwrap_or(OsFamily::Linux);
    let outcome = transport
        .execute(target, &diagnostic_command(os), timeout)
        .await;

    if outcome.timed_out {
        return HealthRecord::offline("timed out");
    }
    if outcome.exit_code != Some(0) && !outcome.stdout.contains(START_MARKER) {
        let error = if outcome.stderr.trim().is_empty() {
            format!("probe exited with code {:?}", outcome.exit_code)
        } else {
            outcome.stderr.trim().to_string()
        };
        return HealthRecord::offline(error);
    }

    classify(&outcome.stdout)
}

/// Build the health record from probe stdout that reached the marker.
#[must_use]
pub fn classify(stdout: &str) -> HealthRecord {
    let version = labeled(stdout, "VERSION:")
        .filter(|v| *v != VERSION_NOT_FOUND)
        .map(|v| v.trim_start_matches('v').to_string());
    let service_status = labeled(stdout, "SERVICE:")
        .map(ServiceState::parse)
        .unwrap_or(ServiceState::Unknown);
    let uptime = labeled(stdout, "STATUS_JSON:")
        .and_then(|blob| serde_json::from_str::<Value>(blob).ok())
        .and_then(|status| status.get(UPTIME_FIELD).and_then(Value::as_u64))
        .map(format_uptime_ms);

    HealthRecord {
        online: true,
        version,
        service_running: service_status == ServiceState::Running,
        service_status,
        uptime,
        error: None,
    }
}

fn labeled<'a>(stdout: &'a str, label: &str) -> Option<&'a str> {
    stdout
        .lines()
        .find_map(|line| line.trim().strip_prefix(label))
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Render a millisecond uptime in its largest applicable unit pair.
#[must_use]
pub fn format_uptime_ms(ms: u64) -> String {
    let secs = ms / 1000;
    let (days, hours, mins) = (secs / 86_400, (secs % 86_400) / 3600, (secs % 3600) / 60);
    if days > 0 {
        format!("{days}d {hours}h")
    } else if hours > 0 {
        format!("{hours}h {mins}m")
    } else if mins > 0 {
        format!("{mins}m {}s", secs % 60)
    } else {
        format!("{secs}s")
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use crate::infra::ssh::{ExecOutcome, KeyScanOutcome, VerificationMode};
    use std::path::PathBuf;

    struct OneShot {
        outcome: ExecOutcome,
    }

    impl Transport for OneShot {
        async fn execute(&self, _: &SshTarget, _: &str, _: Duration) -> ExecOutcome {
            self.outcome.clone()
        }

        async fn discover_host_keys(&self, _: &str, _: u16, _: Duration) -> KeyScanOutcome {
            KeyScanOutcome::default()
        }
    }

    fn node() -> Node {
        Node {
            id: "node-1".to_string(),
            name: "edge-1".to_string(),
            host: "10.0.0.5".to_string(),
            port: 22,
            user: "ops".to_string(),
            trusted: true,
            host_key_fingerprint: None,
            tags: Vec::new(),
            os: Some(OsFamily::Linux),
            arch: None,
            install: None,
            last_contact: None,
            service_state: None,
        }
    }

    fn target() -> SshTarget {
        SshTarget {
            host: "10.0.0.5".to_string(),
            port: 22,
            user: "ops".to_string(),
            known_hosts: PathBuf::from("/tmp/fleet/known_hosts"),
            mode: VerificationMode::Strict,
        }
    }

    async fn probe_with(outcome: ExecOutcome) -> HealthRecord {
        probe(&OneShot { outcome }, &node(), &target(), Duration::from_secs(10)).await
    }

    // ── classification ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_stopped_agent_with_no_version_is_online() {
        let record = probe_with(ExecOutcome {
            stdout: "DIAG_START\nVERSION:NOT_FOUND\nSERVICE:stopped\nSTATUS_JSON:{}\nDIAG_END\n"
                .to_string(),
            exit_code: Some(0),
            ..ExecOutcome::default()
        })
        .await;

        assert!(record.online);
        assert!(record.version.is_none());
        assert!(!record.service_running);
        assert_eq!(record.service_status, ServiceState::Stopped);
        assert!(record.uptime.is_none());
        assert!(record.error.is_none());
    }

    #[tokio::test]
    async fn test_healthy_agent_reports_version_and_uptime() {
        let record = probe_with(ExecOutcome {
            stdout: "DIAG_START\nVERSION:v1.2.3\nSERVICE:running\n\
                     STATUS_JSON:{\"uptimeMs\":9000000}\nDIAG_END\n"
                .to_string(),
            exit_code: Some(0),
            ..ExecOutcome::default()
        })
        .await;

        assert!(record.online);
        assert_eq!(record.version.as_deref(), Some("1.2.3"));
        assert!(record.service_running);
        assert_eq!(record.service_status, ServiceState::Running);
        assert_eq!(record.uptime.as_deref(), Some("2h 30m"));
    }

    #[tokio::test]
    async fn test_timeout_is_offline_with_fixed_message() {
        let record = probe_with(ExecOutcome {
            timed_out: true,
            ..ExecOutcome::default()
        })
        .await;
        assert!(!record.online);
        assert_eq!(record.error.as_deref(), Some("timed out"));
    }

    #[tokio::test]
    async fn test_nonzero_exit_without_marker_surfaces_stderr() {
        let record = probe_with(ExecOutcome {
            stderr: "ssh: connect to host 10.0.0.5 port 22: Connection refused".to_string(),
            exit_code: Some(255),
            ..ExecOutcome::default()
        })
        .await;
        assert!(!record.online);
        assert!(record.error.as_deref().is_some_and(|e| e.contains("Connection refused")));
    }

    #[tokio::test]
    async fn test_nonzero_exit_with_empty_stderr_gets_generic_message() {
        let record = probe_with(ExecOutcome {
            exit_code: Some(127),
            ..ExecOutcome::default()
        })
        .await;
        assert!(!record.online);
        assert!(record.error.as_deref().is_some_and(|e| e.contains("127")));
    }

    #[tokio::test]
    async fn test_marker_present_despite_nonzero_exit_is_still_classified() {
        let record = probe_with(ExecOutcome {
            stdout: "DIAG_START\nVERSION:2.0.0\nSERVICE:running\nSTATUS_JSON:{}\nDIAG_END\n"
                .to_string(),
            exit_code: Some(1),
            ..ExecOutcome::default()
        })
        .await;
        assert!(record.online);
        assert_eq!(record.version.as_deref(), Some("2.0.0"));
    }

    #[test]
    fn test_malformed_status_json_defaults_uptime_to_none() {
        let record =
            classify("DIAG_START\nVERSION:1.0.0\nSERVICE:running\nSTATUS_JSON:not-json\nDIAG_END");
        assert!(record.online);
        assert!(record.uptime.is_none());
    }

    #[test]
    fn test_unrecognized_service_state_is_unknown() {
        let record =
            classify("DIAG_START\nVERSION:1.0.0\nSERVICE:flapping\nSTATUS_JSON:{}\nDIAG_END");
        assert_eq!(record.service_status, ServiceState::Unknown);
        assert!(!record.service_running);
    }

    // ── uptime rendering ─────────────────────────────────────────────────────

    #[test]
    fn test_uptime_picks_largest_applicable_unit_pair() {
        assert_eq!(format_uptime_ms(12_000), "12s");
        assert_eq!(format_uptime_ms(150_000), "2m 30s");
        assert_eq!(format_uptime_ms(9_000_000), "2h 30m");
        assert_eq!(format_uptime_ms(200_000_000), "2d 7h");
    }

    #[test]
    fn test_uptime_zero_is_seconds() {
        assert_eq!(format_uptime_ms(0), "0s");
        assert_eq!(format_uptime_ms(999), "0s");
    }

    // ── command shape ────────────────────────────────────────────────────────

    #[test]
    fn test_diagnostic_command_is_framed_and_os_specific() {
        let linux = diagnostic_command(OsFamily::Linux);
        let darwin = diagnostic_command(OsFamily::Darwin);
        for cmd in [&linux, &darwin] {
            assert!(cmd.starts_with("echo DIAG_START"));
            assert!(cmd.ends_with("echo DIAG_END"));
        }
        assert!(linux.contains("systemctl --user"));
        assert!(darwin.contains("launchctl list"));
    }
}
