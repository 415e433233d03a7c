use chrono::{DateTime, Utc};

use crate::AppContext;
use crate::platform::{JoinEvent, LogNotice, NoticeKind, PlatformApi};

pub struct JoinGuard;

impl JoinGuard {
    /// Join-time screening: automated accounts first (short-circuits), then
    /// account age. Accounts exactly at the day threshold are allowed; the
    /// ban boundary is exclusive.
    pub async fn on_member_join(api: &impl PlatformApi, ctx: &AppContext, join: &JoinEvent) {
        let cfg = ctx.store.guild_config(join.guild_id).await;

        if join.is_bot {
            if !cfg.auto_ban_bots {
                return;
            }
            let outcome = match api
                .ban(join.guild_id, join.user_id, "security: automated account")
                .await
            {
                Ok(()) => "banned".to_string(),
                Err(e) => format!("ban failed: {e}"),
            };
            let title = "Bot banned automatically";
            let description = format!("<@{}> joined as a bot account | {outcome}", join.user_id);
            ctx.store.push_log(join.guild_id, title, &description).await;
            let notice = LogNotice::new(NoticeKind::Warning, title, &description)
                .field("Account", format!("<@{}> ({})", join.user_id, join.user_id))
                .field("Created", join.created_at.to_rfc3339());
            if let Err(e) = api
                .send_notice(join.guild_id, &cfg.logs_channel, &notice)
                .await
            {
                tracing::warn!(error=?e, guild_id = join.guild_id, "logs channel notice failed");
            }
            return;
        }

        if !cfg.auto_ban_new_accounts {
            return;
        }
        let age = account_age_days(join.created_at, Utc::now());
        if age >= i64::from(cfg.new_account_days) {
            return;
        }

        let reason = format!(
            "security: account is {age} day(s) old, minimum is {}",
            cfg.new_account_days
        );
        let outcome = match api.ban(join.guild_id, join.user_id, &reason).await {
            Ok(()) => "banned".to_string(),
            Err(e) => format!("ban failed: {e}"),
        };
        let title = "New account banned";
        let description = format!(
            "<@{}> joined with a {age} day old account (threshold {}) | {outcome}",
            join.user_id, cfg.new_account_days
        );
        ctx.store.push_log(join.guild_id, title, &description).await;
        let notice = LogNotice::new(NoticeKind::Warning, title, &description)
            .field("Account", format!("<@{}> ({})", join.user_id, join.user_id))
            .field("Account age", format!("{age} day(s)"));
        if let Err(e) = api
            .send_notice(join.guild_id, &cfg.logs_channel, &notice)
            .await
        {
            tracing::warn!(error=?e, guild_id = join.guild_id, "logs channel notice failed");
        }
    }
}

/// Whole elapsed days between account creation and now.
fn account_age_days(created_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (now - created_at).num_days()
}
