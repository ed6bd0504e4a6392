//! Trust-on-first-use protocol over the host-identity store.
//!
//! On first contact every discovered key is pinned and the connection
//! proceeds. On later contacts the preferred pinned key must match the
//! freshly discovered one exactly; a mismatch aborts unless the operator
//! passed the per-invocation override flag, which re-pins and warns.

use std::time::Duration;

use anyhow::Result;
use flotilla_common::types::Node;

use crate::domain::error::TrustError;
use crate::infra::known_hosts::{self, HostKeyEntry, KnownHostsStore};
use crate::infra::ssh::Transport;

/// How the trust check for one contact concluded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrustOutcome {
    /// No prior pin existed; all discovered keys were pinned.
    FirstContact { pinned: usize },
    /// The discovered key matches the pin.
    Unchanged,
    /// The key changed and the operator overrode the rejection.
    Repinned { old_fingerprint: String },
}

/// The fingerprint snapshot to record on a node after a successful
/// contact: the preferred pinned entry for its address, when one exists.
#[must_use]
pub fn node_fingerprint(store: &KnownHostsStore, node: &Node) -> Option<String> {
    store.get(&node.host, node.port).map(|e| e.fingerprint())
}

/// Run the TOFU handshake for one node.
///
/// # Errors
///
/// Returns `TrustError::DiscoveryFailed` when the key scan yields no
/// usable keys, or `TrustError::HostKeyChanged` when the pinned key
/// differs and `trust_new_key` is false.
pub async fn establish<T: Transport>(
    transport: &T,
    store: &KnownHostsStore,
    node: &Node,
    trust_new_key: bool,
    timeout: Duration,
) -> Result<TrustOutcome> {
    let scan = transport
        .discover_host_keys(&node.host, node.port, timeout)
        .await;
    let discovered = known_hosts::parse_keyscan_output(&node.host, node.port, &scan.output);
    if discovered.is_empty() {
        let reason = scan
            .error
            .unwrap_or_else(|| "no host keys returned".to_string());
        return Err(TrustError::DiscoveryFailed {
            host: node.host.clone(),
            port: node.port,
            reason,
        }
        .into());
    }

    let Some(pinned) = store.get(&node.host, node.port) else {
        // First contact: pin everything the host offered.
        for entry in &discovered {
            store.pin(entry)?;
        }
        return Ok(TrustOutcome::FirstContact {
            pinned: discovered.len(),
        });
    };

    let candidate = matching_candidate(&pinned, &discovered);
    match candidate {
        Some(candidate) if candidate.key == pinned.key => Ok(TrustOutcome::Unchanged),
        _ => {
            if !trust_new_key {
                return Err(TrustError::HostKeyChanged {
                    host: node.host.clone(),
                    port: node.port,
                }
                .into());
            }
            let old_fingerprint = pinned.fingerprint();
            for entry in &discovered {
                store.pin(entry)?;
            }
            Ok(TrustOutcome::Repinned { old_fingerprint })
        }
    }
}

/// The discovered key comparable against the pin: same algorithm as the
/// preferred pinned entry.
fn matching_candidate<'a>(
    pinned: &HostKeyEntry,
    discovered: &'a [HostKeyEntry],
) -> Option<&'a HostKeyEntry> {
    discovered.iter().find(|e| e.algorithm == pinned.algorithm)
}
