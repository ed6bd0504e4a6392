//! Bootstrap plan construction.
//!
//! A plan is an immutable, ordered list of steps computed once from a
//! node's fact sheet. Skip decisions are pure functions of the facts so
//! the same plan can be rendered for dry-run display without any I/O.

use flotilla_common::types::{FactSheet, Node, OsFamily};
use serde::Serialize;

use crate::domain::error::PlanError;
use crate::preflight::{LAUNCHD_LABEL, SERVICE_UNIT};

/// Version sentinel meaning "whatever the registry considers current".
pub const LATEST_VERSION: &str = "latest";

/// Remote path of the agent's configuration directory, relative to the
/// login account's home.
const AGENT_CONFIG_DIR: &str = ".flotilla-agent";

/// Condition under which a step may be skipped. Evaluation reads the
/// fact sheet only, never the network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipWhen {
    /// The scripting runtime is already on the node.
    NodeRuntimePresent,
    /// Some version of the agent is already installed.
    AnyAgentInstalled,
    /// The agent is already installed at exactly this version.
    AgentAtVersion(String),
    /// The managed service is already registered with the service manager.
    ServiceRegistered,
}

impl SkipWhen {
    #[must_use]
    pub fn evaluate(&self, facts: &FactSheet) -> bool {
        match self {
            Self::NodeRuntimePresent => facts.has_node,
            Self::AnyAgentInstalled => facts.agent_version.is_some(),
            Self::AgentAtVersion(version) => facts.agent_version.as_deref() == Some(version),
            Self::ServiceRegistered => facts.service_registered,
        }
    }
}

/// One unit of bootstrap work: a short command sequence executed in
/// order on the node, all of which must exit zero.
#[derive(Debug, Clone, Serialize)]
pub struct Step {
    pub id: &'static str,
    pub description: String,
    pub commands: Vec<String>,
    /// Whether the executor may skip this step, decided at build time
    /// from the fact sheet and the force flag.
    pub skippable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_when: Option<SkipWhen>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_hint: Option<String>,
}

impl Step {
    fn new(id: &'static str, description: impl Into<String>, commands: Vec<String>) -> Self {
        Self {
            id,
            description: description.into(),
            commands,
            skippable: false,
            skip_when: None,
            failure_hint: None,
        }
    }

    /// Attach a skip condition. `force` pins the step to non-skippable
    /// regardless of what the facts say.
    fn skip_when(mut self, condition: SkipWhen, facts: &FactSheet, force: bool) -> Self {
        self.skippable = !force && condition.evaluate(facts);
        self.skip_when = Some(condition);
        self
    }

    fn hint(mut self, hint: impl Into<String>) -> Self {
        self.failure_hint = Some(hint.into());
        self
    }
}

/// An immutable bootstrap plan for one node.
#[derive(Debug, Clone, Serialize)]
pub struct Plan {
    pub node_name: String,
    pub facts: FactSheet,
    pub steps: Vec<Step>,
    pub version: String,
    pub force: bool,
}

/// Build the bootstrap plan for a node from its fact sheet.
///
/// # Errors
///
/// Returns `PlanError::UnsupportedOs` when the fact sheet's OS family is
/// unknown, or `PlanError::InvalidVersion` for a version string outside
/// the package-version charset; no remote mutation is attempted in
/// either case.
pub fn build_plan(
    node: &Node,
    facts: &FactSheet,
    version: &str,
    force: bool,
) -> Result<Plan, PlanError> {
    validate_version(version)?;
    let steps = match facts.os {
        OsFamily::Linux => linux_steps(facts, version, force),
        OsFamily::Darwin => darwin_steps(facts, version, force),
        OsFamily::Unknown => return Err(PlanError::UnsupportedOs(facts.os.as_str().to_string())),
    };
    Ok(Plan {
        node_name: node.name.clone(),
        facts: facts.clone(),
        steps,
        version: version.to_string(),
        force,
    })
}

/// The version string ends up inside a remote shell command, so it is
/// held to the package-version charset even though the operator already
/// holds SSH access to the node.
fn validate_version(version: &str) -> Result<(), PlanError> {
    let well_formed = version == LATEST_VERSION
        || (!version.is_empty()
            && version
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '+' | '-')));
    if well_formed {
        Ok(())
    } else {
        Err(PlanError::InvalidVersion(version.to_string()))
    }
}

/// Skip condition for the agent-install step: an exact-version request
/// skips only when that version is present; a "latest" request skips
/// whenever any agent is installed (we cannot compare against an
/// unresolved registry version without network access).
fn agent_skip(version: &str) -> SkipWhen {
    if version == LATEST_VERSION {
        SkipWhen::AnyAgentInstalled
    } else {
        SkipWhen::AgentAtVersion(version.to_string())
    }
}

fn agent_package(version: &str) -> String {
    format!("flotilla-agent@{version}")
}

fn linux_steps(facts: &FactSheet, version: &str, force: bool) -> Vec<Step> {
    vec![
        Step::new(
            "install-runtime",
            "Install Node.js runtime",
            vec![
                "sudo apt-get update -qq".to_string(),
                "sudo apt-get install -y -qq nodejs npm".to_string(),
            ],
        )
        .skip_when(SkipWhen::NodeRuntimePresent, facts, force)
        .hint("install Node.js manually, then re-run bootstrap"),
        Step::new(
            "install-agent",
            format!("Install agent ({version})"),
            vec![format!("npm install -g --silent {}", agent_package(version))],
        )
        .skip_when(agent_skip(version), facts, force)
        .hint("check npm registry access from the node"),
        Step::new(
            "create-config-dir",
            "Create agent configuration directory",
            vec![format!(
                "mkdir -p \"$HOME/{AGENT_CONFIG_DIR}\" && chmod 700 \"$HOME/{AGENT_CONFIG_DIR}\""
            )],
        ),
        Step::new(
            "install-service",
            "Register systemd user service",
            vec![
                "mkdir -p \"$HOME/.config/systemd/user\"".to_string(),
                format!(
                    "cat > \"$HOME/.config/systemd/user/{SERVICE_UNIT}\" <<'UNIT'\n\
                     [Unit]\n\
                     Description=Flotilla agent\n\
                     After=network.target\n\
                     \n\
                     [Service]\n\
                     ExecStart=/usr/bin/env flotilla-agent start\n\
                     Restart=on-failure\n\
                     RestartSec=5\n\
                     \n\
                     [Install]\n\
                     WantedBy=default.target\n\
                     UNIT"
                ),
                "systemctl --user daemon-reload".to_string(),
                format!("systemctl --user enable {SERVICE_UNIT}"),
            ],
        )
        .skip_when(SkipWhen::ServiceRegistered, facts, force)
        .hint("ensure systemd user sessions are enabled (loginctl enable-linger)"),
        Step::new(
            "start-service",
            "Start agent service",
            vec![format!("systemctl --user restart {SERVICE_UNIT}")],
        ),
        Step::new(
            "verify",
            "Verify agent responds",
            vec![
                "sleep 2".to_string(),
                format!("systemctl --user is-active {SERVICE_UNIT}"),
                "flotilla-agent status".to_string(),
            ],
        )
        .hint("inspect the service log: journalctl --user -u flotilla-agent"),
    ]
}

fn darwin_steps(facts: &FactSheet, version: &str, force: bool) -> Vec<Step> {
    let plist = format!("$HOME/Library/LaunchAgents/{LAUNCHD_LABEL}.plist");
    vec![
        Step::new(
            "install-runtime",
            "Install Node.js runtime",
            vec!["brew install node".to_string()],
        )
        .skip_when(SkipWhen::NodeRuntimePresent, facts, force)
        .hint("install Homebrew first: https://brew.sh"),
        Step::new(
            "install-agent",
            format!("Install agent ({version})"),
            vec![format!("npm install -g --silent {}", agent_package(version))],
        )
        .skip_when(agent_skip(version), facts, force)
        .hint("check npm registry access from the node"),
        Step::new(
            "create-config-dir",
            "Create agent configuration directory",
            vec![format!(
                "mkdir -p \"$HOME/{AGENT_CONFIG_DIR}\" && chmod 700 \"$HOME/{AGENT_CONFIG_DIR}\""
            )],
        ),
        Step::new(
            "install-service",
            "Register launchd agent",
            vec![
                "mkdir -p \"$HOME/Library/LaunchAgents\"".to_string(),
                format!(
                    "cat > \"{plist}\" <<'PLIST'\n\
                     <?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
                     <!DOCTYPE plist PUBLIC \"-//Apple//DTD PLIST 1.0//EN\" \
                     \"http://www.apple.com/DTDs/PropertyList-1.0.dtd\">\n\
                     <plist version=\"1.0\">\n\
                     <dict>\n\
                     \x20 <key>Label</key><string>{LAUNCHD_LABEL}</string>\n\
                     \x20 <key>ProgramArguments</key>\n\
                     \x20 <array>\n\
                     \x20   <string>/usr/bin/env</string>\n\
                     \x20   <string>flotilla-agent</string>\n\
                     \x20   <string>start</string>\n\
                     \x20 </array>\n\
                     \x20 <key>RunAtLoad</key><true/>\n\
                     \x20 <key>KeepAlive</key><true/>\n\
                     </dict>\n\
                     </plist>\n\
                     PLIST"
                ),
            ],
        )
        .skip_when(SkipWhen::ServiceRegistered, facts, force)
        .hint("check write access to ~/Library/LaunchAgents"),
        Step::new(
            "start-service",
            "Start agent service",
            vec![
                format!("launchctl unload \"{plist}\" 2>/dev/null || true"),
                format!("launchctl load -w \"{plist}\""),
            ],
        ),
        Step::new(
            "verify",
            "Verify agent responds",
            vec![
                "sleep 2".to_string(),
                format!("launchctl list {LAUNCHD_LABEL} | grep -q PID"),
                "flotilla-agent status".to_string(),
            ],
        )
        .hint("inspect launchd state: launchctl list | grep flotilla"),
    ]
}

/// Render a plan for dry-run display. Pure projection, no I/O.
#[must_use]
pub fn format_plan(plan: &Plan) -> String {
    let mut out = format!(
        "Bootstrap plan for {} ({} {}, agent {})\n",
        plan.node_name,
        plan.facts.os.as_str(),
        plan.facts.arch.as_str(),
        plan.version,
    );
    for (i, step) in plan.steps.iter().enumerate() {
        let marker = if step.skippable { "skip" } else { " run" };
        out.push_str(&format!("  {}. [{marker}] {}\n", i + 1, step.description));
        for command in &step.commands {
            let first_line = command.lines().next().unwrap_or_default();
            out.push_str(&format!("         $ {first_line}\n"));
        }
    }
    out
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use flotilla_common::types::CpuArch;

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
            os: None,
            arch: None,
            install: None,
            last_contact: None,
            service_state: None,
        }
    }

    fn bare_facts(os: OsFamily) -> FactSheet {
        FactSheet {
            os,
            arch: CpuArch::X86_64,
            home_dir: "/home/ops".to_string(),
            has_node: false,
            node_version: None,
            has_npm: false,
            agent_version: None,
            service_registered: false,
            service_active: false,
        }
    }

    fn step<'a>(plan: &'a Plan, id: &str) -> &'a Step {
        plan.steps
            .iter()
            .find(|s| s.id == id)
            .unwrap_or_else(|| panic!("step {id} missing"))
    }

    // ── plan shape ───────────────────────────────────────────────────────────

    #[test]
    fn test_linux_and_darwin_share_step_order() {
        let expected = [
            "install-runtime",
            "install-agent",
            "create-config-dir",
            "install-service",
            "start-service",
            "verify",
        ];
        for os in [OsFamily::Linux, OsFamily::Darwin] {
            let plan = build_plan(&node(), &bare_facts(os), LATEST_VERSION, false).expect("plan");
            let ids: Vec<&str> = plan.steps.iter().map(|s| s.id).collect();
            assert_eq!(ids, expected, "{os:?}");
        }
    }

    #[test]
    fn test_unknown_os_is_rejected_before_any_step_is_built() {
        let err = build_plan(&node(), &bare_facts(OsFamily::Unknown), "1.0.0", false)
            .expect_err("unknown OS must fail");
        assert!(matches!(err, PlanError::UnsupportedOs(_)));
    }

    #[test]
    fn test_os_families_get_different_service_commands() {
        let linux =
            build_plan(&node(), &bare_facts(OsFamily::Linux), "1.0.0", false).expect("plan");
        let darwin =
            build_plan(&node(), &bare_facts(OsFamily::Darwin), "1.0.0", false).expect("plan");
        assert!(step(&linux, "start-service").commands[0].contains("systemctl --user"));
        assert!(step(&darwin, "start-service").commands[0].contains("launchctl"));
    }

    // ── skip predicates ──────────────────────────────────────────────────────

    #[test]
    fn test_runtime_skip_depends_only_on_has_node() {
        let mut facts = bare_facts(OsFamily::Linux);
        facts.agent_version = Some("9.9.9".to_string());
        facts.service_registered = true;
        assert!(!SkipWhen::NodeRuntimePresent.evaluate(&facts));
        facts.has_node = true;
        assert!(SkipWhen::NodeRuntimePresent.evaluate(&facts));
    }

    #[test]
    fn test_exact_version_match_skips_agent_install_unless_forced() {
        let mut facts = bare_facts(OsFamily::Linux);
        facts.agent_version = Some("1.2.3".to_string());

        let plan = build_plan(&node(), &facts, "1.2.3", false).expect("plan");
        assert!(step(&plan, "install-agent").skippable);

        let forced = build_plan(&node(), &facts, "1.2.3", true).expect("plan");
        assert!(!step(&forced, "install-agent").skippable);
    }

    #[test]
    fn test_version_mismatch_never_skips_agent_install() {
        let mut facts = bare_facts(OsFamily::Linux);
        facts.agent_version = Some("1.2.3".to_string());
        let plan = build_plan(&node(), &facts, "2.0.0", false).expect("plan");
        assert!(!step(&plan, "install-agent").skippable);
    }

    #[test]
    fn test_latest_sentinel_skips_when_any_agent_is_installed() {
        let mut facts = bare_facts(OsFamily::Linux);
        facts.agent_version = Some("0.1.0".to_string());
        let plan = build_plan(&node(), &facts, LATEST_VERSION, false).expect("plan");
        assert!(step(&plan, "install-agent").skippable);

        facts.agent_version = None;
        let fresh = build_plan(&node(), &facts, LATEST_VERSION, false).expect("plan");
        assert!(!step(&fresh, "install-agent").skippable);
    }

    #[test]
    fn test_registered_service_skips_unit_install_unless_forced() {
        let mut facts = bare_facts(OsFamily::Linux);
        facts.service_registered = true;
        let plan = build_plan(&node(), &facts, "1.0.0", false).expect("plan");
        assert!(step(&plan, "install-service").skippable);
        let forced = build_plan(&node(), &facts, "1.0.0", true).expect("plan");
        assert!(!step(&forced, "install-service").skippable);
    }

    #[test]
    fn test_config_start_and_verify_steps_are_never_skippable() {
        let mut facts = bare_facts(OsFamily::Darwin);
        facts.has_node = true;
        facts.agent_version = Some("1.0.0".to_string());
        facts.service_registered = true;
        facts.service_active = true;
        let plan = build_plan(&node(), &facts, "1.0.0", false).expect("plan");
        for id in ["create-config-dir", "start-service", "verify"] {
            assert!(!step(&plan, id).skippable, "{id} must always run");
        }
    }

    // ── rendering ────────────────────────────────────────────────────────────

    #[test]
    fn test_format_plan_marks_skipped_steps() {
        let mut facts = bare_facts(OsFamily::Linux);
        facts.has_node = true;
        let plan = build_plan(&node(), &facts, "1.0.0", false).expect("plan");
        let rendered = format_plan(&plan);
        assert!(rendered.contains("[skip] Install Node.js runtime"));
        assert!(rendered.contains("[ run] Install agent (1.0.0)"));
        assert!(rendered.contains("edge-1"));
    }

    #[test]
    fn test_agent_package_pins_requested_version() {
        assert_eq!(agent_package("1.2.3"), "flotilla-agent@1.2.3");
        assert_eq!(agent_package(LATEST_VERSION), "flotilla-agent@latest");
    }

    // ── version validation ───────────────────────────────────────────────────

    #[test]
    fn test_build_plan_accepts_package_version_charset() {
        let facts = bare_facts(OsFamily::Linux);
        for version in [LATEST_VERSION, "1.2.3", "2.0.0-beta.1", "1.0.0+build_7"] {
            assert!(
                build_plan(&node(), &facts, version, false).is_ok(),
                "{version} must be accepted"
            );
        }
    }

    #[test]
    fn test_build_plan_rejects_shell_metacharacters_in_version() {
        let facts = bare_facts(OsFamily::Linux);
        for version in ["1.0.0; rm -rf /", "$(reboot)", "1.0 && true", "`id`", ""] {
            let err = build_plan(&node(), &facts, version, false)
                .expect_err("metacharacters must be rejected");
            assert!(matches!(err, PlanError::InvalidVersion(_)), "{version}");
        }
    }
}
