//! List command: show every node in the inventory.

use anyhow::Result;
use flotilla_common::types::Node;

use crate::infra::inventory::InventoryStore;
use crate::output::OutputContext;

/// One rendered line of the node table.
#[must_use]
pub fn format_node_line(node: &Node) -> String {
    let address = format!("{}@{}:{}", node.user, node.host, node.port);
    let version = node
        .install
        .as_ref()
        .map_or_else(|| "-".to_string(), |i| i.version.clone());
    let service = node
        .service_state
        .map_or("unknown", flotilla_common::types::ServiceState::as_str);
    let trust = if node.trusted { "trusted" } else { "untrusted" };
    format!("{:<20} {:<30} {:<10} {:<9} {trust}", node.name, address, version, service)
}

/// Run the list command.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn run(ctx: &OutputContext, store: &InventoryStore, json: bool) -> Result<()> {
    let nodes = store.list();

    if json {
        println!("{}", serde_json::to_string_pretty(&nodes)?);
        return Ok(());
    }

    if nodes.is_empty() {
        ctx.info("No nodes registered. Add one with `flotilla add <name> <host> --user <user>`");
        return Ok(());
    }

    ctx.header(&format!(
        "{:<20} {:<30} {:<10} {:<9} {}",
        "NAME", "ADDRESS", "VERSION", "SERVICE", "TRUST"
    ));
    for node in &nodes {
        println!("  {}", format_node_line(node));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flotilla_common::types::{InstallInfo, ServiceState};

    fn node() -> Node {
        Node {
            id: "node-1".to_string(),
            name: "edge-1".to_string(),
            host: "10.0.0.5".to_string(),
            port: 2222,
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

    #[test]
    fn test_format_node_line_shows_address_and_placeholders() {
        let line = format_node_line(&node());
        assert!(line.contains("edge-1"));
        assert!(line.contains("ops@10.0.0.5:2222"));
        assert!(line.contains("unknown"));
        assert!(line.contains("trusted"));
    }

    #[test]
    fn test_format_node_line_shows_install_and_service() {
        let mut n = node();
        n.install = Some(InstallInfo {
            version: "1.2.3".to_string(),
            installed_at: chrono::Utc::now(),
        });
        n.service_state = Some(ServiceState::Running);
        let line = format_node_line(&n);
        assert!(line.contains("1.2.3"));
        assert!(line.contains("running"));
    }
}
