use chrono::Utc;

use crate::AppContext;
use crate::store::WarningRecord;

/// Observational warning ledger. A count carries no automatic consequence;
/// escalation, if any, is a moderator's call.
pub struct Warns;

impl Warns {
    /// Record a warning; returns the user's new warning count.
    pub async fn add(
        ctx: &AppContext,
        guild_id: u64,
        user_id: u64,
        moderator_id: u64,
        reason: &str,
    ) -> usize {
        let count = ctx
            .store
            .add_warning(
                guild_id,
                user_id,
                WarningRecord {
                    reason: reason.to_string(),
                    moderator_id,
                    at: Utc::now(),
                },
            )
            .await;
        ctx.store
            .push_log(
                guild_id,
                "Warning issued",
                &format!("<@{user_id}> warned by <@{moderator_id}>: {reason} (total {count})"),
            )
            .await;
        count
    }

    pub async fn list(ctx: &AppContext, guild_id: u64, user_id: u64) -> Vec<WarningRecord> {
        ctx.store.warnings(guild_id, user_id).await
    }

    /// Drop all warnings of one user; returns how many were removed.
    pub async fn clear(ctx: &AppContext, guild_id: u64, user_id: u64, moderator_id: u64) -> usize {
        let removed = ctx.store.clear_warnings(guild_id, user_id).await;
        if removed > 0 {
            ctx.store
                .push_log(
                    guild_id,
                    "Warnings cleared",
                    &format!("{removed} warning(s) of <@{user_id}> cleared by <@{moderator_id}>"),
                )
                .await;
        }
        removed
    }
}
