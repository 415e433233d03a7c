use std::time::Duration;

use anyhow::Result;

use crate::platform::{AuditAction, PlatformApi};

/// Resolve who executed a deletion by correlating the audit trail.
///
/// Sleeps out the grace window first; the trail is eventually consistent and
/// usually needs a beat to contain the entry for the action that triggered
/// us. Then scans the most recent `lookback` entries of the matching action
/// kind, newest first, and takes the first whose target equals the deleted
/// resource. `Ok(None)` is an attribution miss: the caller stops without
/// punishing anyone.
pub async fn find_executor(
    api: &impl PlatformApi,
    guild_id: u64,
    action: AuditAction,
    target_id: u64,
    grace: Duration,
    lookback: u8,
) -> Result<Option<u64>> {
    if !grace.is_zero() {
        tokio::time::sleep(grace).await;
    }

    let entries = api.audit_entries(guild_id, action, lookback.max(1)).await?;
    Ok(entries
        .iter()
        .find(|e| e.target_id == Some(target_id))
        .map(|e| e.actor_id))
}
