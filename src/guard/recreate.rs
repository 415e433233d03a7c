use anyhow::Result;

use crate::platform::PlatformApi;
use crate::store::{ChannelBackup, RoleBackup};

#[derive(Debug, Clone, Copy)]
pub struct ChannelRecreation {
    pub new_id: u64,
    pub overwrite_failures: usize,
}

/// Rebuild a deleted channel from its snapshot. Permission overwrites are
/// restored one target at a time; a failing target is counted and skipped so
/// it cannot take the remaining overwrites down with it.
pub async fn recreate_channel(
    api: &impl PlatformApi,
    guild_id: u64,
    backup: &ChannelBackup,
) -> Result<ChannelRecreation> {
    let new_id = api.create_channel(guild_id, backup).await?;

    let mut overwrite_failures = 0usize;
    for overwrite in &backup.overwrites {
        if let Err(e) = api.set_channel_overwrite(guild_id, new_id, overwrite).await {
            overwrite_failures += 1;
            tracing::warn!(
                error=?e,
                guild_id,
                channel_id = new_id,
                target = overwrite.target_id,
                "overwrite restore failed"
            );
        }
    }

    Ok(ChannelRecreation {
        new_id,
        overwrite_failures,
    })
}

/// Rebuild a deleted role from its snapshot; returns the new role id.
pub async fn recreate_role(api: &impl PlatformApi, guild_id: u64, backup: &RoleBackup) -> Result<u64> {
    api.create_role(guild_id, backup).await
}
