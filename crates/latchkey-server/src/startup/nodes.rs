//! Storage node wiring

use anyhow::Context;
use latchkey_core::{LockService, SharedNode, from_endpoint};
use tracing::{info, warn};

use crate::model::Configuration;
use crate::model::constants::STANDALONE_NODE;

/// Build one node per endpoint. Without endpoints a single in-process node
/// is used.
pub fn build_nodes(endpoints: &[String]) -> anyhow::Result<Vec<SharedNode>> {
    if endpoints.is_empty() {
        warn!(
            node = STANDALONE_NODE,
            "No storage nodes configured, running standalone with an in-process node"
        );
        return Ok(vec![from_endpoint(STANDALONE_NODE)?]);
    }

    endpoints
        .iter()
        .map(|endpoint| {
            from_endpoint(endpoint)
                .with_context(|| format!("invalid storage node endpoint '{}'", endpoint))
        })
        .collect()
}

pub fn build_lock_service(configuration: &Configuration) -> anyhow::Result<LockService> {
    let lock_config = configuration.lock_config()?;
    let nodes = build_nodes(&configuration.nodes())?;

    let service =
        LockService::new(nodes, lock_config).context("failed to create lock service")?;
    info!(
        nodes = ?service.node_names(),
        quorum = service.quorum(),
        "Lock service ready"
    );
    Ok(service)
}
