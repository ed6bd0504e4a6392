//! Hardened SSH transport.
//!
//! Every remote command in the tool flows through here. The invocation
//! is built defensively: the client binary is addressed by absolute
//! path, an explicit `--` separator precedes the user-supplied address,
//! hosts that could parse as option flags are rejected before any
//! process is spawned, and authentication never prompts interactively.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncReadExt;

use flotilla_common::types::Node;

/// Absolute, non-PATH-resolved client binaries.
const SSH_BIN: &str = "/usr/bin/ssh";
const KEYSCAN_BIN: &str = "/usr/bin/ssh-keyscan";

/// Connection-establishment timeout, distinct from the per-command
/// timeout enforced by the caller.
const CONNECT_TIMEOUT_SECS: u32 = 10;

/// Host-identity verification mode for one SSH session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationMode {
    /// Reject on any identity mismatch or unknown host.
    Strict,
    /// Pin on first contact, reject on mismatch thereafter.
    AcceptNew,
}

impl VerificationMode {
    /// Mode for a node: strict once the operator has accepted its
    /// identity, accept-new before that.
    #[must_use]
    pub fn for_node(node: &Node) -> Self {
        if node.trusted {
            Self::Strict
        } else {
            Self::AcceptNew
        }
    }

    fn ssh_option(self) -> &'static str {
        match self {
            Self::Strict => "StrictHostKeyChecking=yes",
            Self::AcceptNew => "StrictHostKeyChecking=accept-new",
        }
    }
}

/// Where and how to run a remote command.
#[derive(Debug, Clone)]
pub struct SshTarget {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub known_hosts: PathBuf,
    pub mode: VerificationMode,
}

impl SshTarget {
    /// Target for a node using the fleet's host-identity database.
    #[must_use]
    pub fn for_node(node: &Node, known_hosts: &Path) -> Self {
        Self {
            host: node.host.clone(),
            port: node.port,
            user: node.user.clone(),
            known_hosts: known_hosts.to_path_buf(),
            mode: VerificationMode::for_node(node),
        }
    }
}

/// Outcome of one remote command. Transport failures are represented
/// here rather than raised, so callers always get a value to classify.
#[derive(Debug, Clone, Default)]
pub struct ExecOutcome {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process was killed by a signal or never spawned.
    pub exit_code: Option<i32>,
    /// Terminating signal, when one applied.
    pub signal: Option<i32>,
    pub timed_out: bool,
}

impl ExecOutcome {
    /// A synthetic rejection produced without spawning any process.
    #[must_use]
    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            stderr: message.into(),
            exit_code: Some(1),
            ..Self::default()
        }
    }

    /// A synthetic failure for a child that could not be spawned.
    #[must_use]
    pub fn spawn_failed(message: impl Into<String>) -> Self {
        Self {
            stderr: message.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }
}

/// Outcome of remote public-key discovery. Raw lines only — trust
/// decisions belong to the caller.
#[derive(Debug, Clone, Default)]
pub struct KeyScanOutcome {
    pub output: String,
    pub exit_code: Option<i32>,
    pub error: Option<String>,
}

/// Remote execution seam. The production implementation shells out to
/// OpenSSH; tests inject doubles that return canned outcomes. The
/// returned futures are `Send` so multi-node sweeps can run probes on
/// spawned tasks.
pub trait Transport {
    /// Run one command on the target, bounded by `timeout`.
    fn execute(
        &self,
        target: &SshTarget,
        command: &str,
        timeout: Duration,
    ) -> impl Future<Output = ExecOutcome> + Send;

    /// Scan the host's public keys with a short per-host timeout.
    fn discover_host_keys(
        &self,
        host: &str,
        port: u16,
        timeout: Duration,
    ) -> impl Future<Output = KeyScanOutcome> + Send;
}

/// Reject host values that an SSH client could parse as an option flag.
fn host_rejection(host: &str) -> Option<String> {
    if host.is_empty() {
        return Some("refusing empty host".to_string());
    }
    if host.starts_with('-') {
        return Some(format!(
            "refusing host {host:?}: a leading '-' could be interpreted as an option flag"
        ));
    }
    None
}

/// Production transport backed by the OpenSSH client tools.
#[derive(Debug, Clone, Default)]
pub struct SshTransport;

impl SshTransport {
    fn build_args(target: &SshTarget, command: &str, port_str: &str) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "-o".into(),
            "BatchMode=yes".into(),
            "-o".into(),
            format!("ConnectTimeout={CONNECT_TIMEOUT_SECS}"),
            "-o".into(),
            "ServerAliveInterval=5".into(),
            "-o".into(),
            "ServerAliveCountMax=2".into(),
            "-o".into(),
            target.mode.ssh_option().into(),
            "-o".into(),
            format!("UserKnownHostsFile={}", target.known_hosts.display()),
            "-o".into(),
            "LogLevel=ERROR".into(),
            "-p".into(),
            port_str.into(),
            // End of options: nothing after this can be parsed as a flag.
            "--".into(),
            format!("{}@{}", target.user, target.host),
        ];
        args.push(command.into());
        args
    }
}

impl Transport for SshTransport {
    async fn execute(&self, target: &SshTarget, command: &str, timeout: Duration) -> ExecOutcome {
        if let Some(reason) = host_rejection(&target.host) {
            return ExecOutcome::rejected(reason);
        }

        let port_str = target.port.to_string();
        let args = Self::build_args(target, command, &port_str);

        let child = tokio::process::Command::new(SSH_BIN)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();
        let mut child = match child {
            Ok(child) => child,
            Err(e) => return ExecOutcome::spawn_failed(format!("failed to spawn {SSH_BIN}: {e}")),
        };

        let mut stdout_handle = child.stdout.take();
        let mut stderr_handle = child.stderr.take();

        // Read stdout/stderr CONCURRENTLY with wait() to avoid pipe
        // deadlock: a child writing more than the OS pipe buffer blocks
        // on write, and wait() alone would never resolve.
        tokio::select! {
            (status, stdout, stderr) = async {
                tokio::join!(
                    child.wait(),
                    async {
                        let mut buf = Vec::new();
                        if let Some(ref mut h) = stdout_handle {
                            let _ = h.read_to_end(&mut buf).await;
                        }
                        buf
                    },
                    async {
                        let mut buf = Vec::new();
                        if let Some(ref mut h) = stderr_handle {
                            let _ = h.read_to_end(&mut buf).await;
                        }
                        buf
                    },
                )
            } => {
                let stdout = String::from_utf8_lossy(&stdout).into_owned();
                let stderr = String::from_utf8_lossy(&stderr).into_owned();
                match status {
                    Ok(status) => ExecOutcome {
                        stdout,
                        stderr,
                        exit_code: status.code(),
                        signal: exit_signal(&status),
                        timed_out: false,
                    },
                    Err(e) => ExecOutcome {
                        stdout,
                        stderr: format!("waiting for {SSH_BIN}: {e}"),
                        ..ExecOutcome::default()
                    },
                }
            }
            () = tokio::time::sleep(timeout) => {
                let _ = child.kill().await;
                ExecOutcome {
                    timed_out: true,
                    stderr: format!("command timed out after {}s", timeout.as_secs()),
                    ..ExecOutcome::default()
                }
            }
        }
    }

    async fn discover_host_keys(&self, host: &str, port: u16, timeout: Duration) -> KeyScanOutcome {
        if let Some(reason) = host_rejection(host) {
            return KeyScanOutcome {
                error: Some(reason),
                ..KeyScanOutcome::default()
            };
        }

        let per_host_timeout = timeout.as_secs().clamp(1, 60).to_string();
        let port_str = port.to_string();
        let child = tokio::process::Command::new(KEYSCAN_BIN)
            .args(["-p", &port_str, "-T", &per_host_timeout, host])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();
        let child = match child {
            Ok(child) => child,
            Err(e) => {
                return KeyScanOutcome {
                    error: Some(format!("failed to spawn {KEYSCAN_BIN}: {e}")),
                    ..KeyScanOutcome::default()
                };
            }
        };

        // keyscan enforces its own per-host timeout; the outer sleep is a
        // backstop against a wedged process.
        let backstop = timeout.saturating_add(Duration::from_secs(5));
        match tokio::time::timeout(backstop, child.wait_with_output()).await {
            Ok(Ok(output)) => KeyScanOutcome {
                output: String::from_utf8_lossy(&output.stdout).into_owned(),
                exit_code: output.status.code(),
                error: if output.status.success() {
                    None
                } else {
                    Some(String::from_utf8_lossy(&output.stderr).into_owned())
                },
            },
            Ok(Err(e)) => KeyScanOutcome {
                error: Some(format!("waiting for {KEYSCAN_BIN}: {e}")),
                ..KeyScanOutcome::default()
            },
            Err(_) => KeyScanOutcome {
                error: Some("host key scan timed out".to_string()),
                ..KeyScanOutcome::default()
            },
        }
    }
}

#[cfg(unix)]
fn exit_signal(status: &std::process::ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: &std::process::ExitStatus) -> Option<i32> {
    None
}
