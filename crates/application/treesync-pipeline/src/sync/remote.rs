use tracing::{debug, info};
use treesync_core::formats::decode_index;
use treesync_core::Snapshot;
use treesync_infra::net::Transport;

use crate::sync::SyncError;

/// Fetch and decode the published index.
///
/// The index's own entry, if the publisher listed it, is dropped so it never
/// shows up in a plan.
pub async fn fetch_remote_snapshot(
    transport: &dyn Transport,
    index_name: &str,
) -> Result<Snapshot, SyncError> {
    let body = transport
        .fetch_bytes(index_name)
        .await
        .map_err(SyncError::Remote)?;
    debug!("Fetched index {} ({} bytes)", index_name, body.len());

    let snapshot = decode_index(&body).map_err(SyncError::Decode)?;
    let snapshot = snapshot.pruned(index_name);
    info!("Remote index lists {} files", snapshot.len());
    Ok(snapshot)
}
