use chrono::Utc;

use crate::AppContext;
use crate::error::GuardError;
use crate::platform::PlatformApi;

pub struct Mute;

impl Mute {
    /// Raw timed mute, no logging. The abuse detectors use this and write
    /// their own detector-specific log entry.
    pub async fn timeout(
        api: &impl PlatformApi,
        guild_id: u64,
        user_id: u64,
        secs: u64,
        reason: &str,
    ) -> Result<(), GuardError> {
        let until = Utc::now() + chrono::Duration::seconds(secs as i64);
        api.timeout_member(guild_id, user_id, until, reason)
            .await
            .map_err(GuardError::remote)
    }

    /// Direct mute for the command surface: timed mute plus one log entry.
    pub async fn apply(
        api: &impl PlatformApi,
        ctx: &AppContext,
        guild_id: u64,
        user_id: u64,
        secs: u64,
        reason: &str,
    ) -> Result<(), GuardError> {
        Self::timeout(api, guild_id, user_id, secs, reason).await?;
        ctx.store
            .push_log(
                guild_id,
                "Member muted",
                &format!("<@{user_id}> muted for {secs}s: {reason}"),
            )
            .await;
        Ok(())
    }

    /// Lift a mute early.
    pub async fn clear(
        api: &impl PlatformApi,
        ctx: &AppContext,
        guild_id: u64,
        user_id: u64,
        reason: &str,
    ) -> Result<(), GuardError> {
        api.clear_timeout(guild_id, user_id, reason)
            .await
            .map_err(GuardError::remote)?;
        ctx.store
            .push_log(
                guild_id,
                "Member unmuted",
                &format!("<@{user_id}> unmuted: {reason}"),
            )
            .await;
        Ok(())
    }
}
