use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serenity::async_trait;
use tokio::sync::Mutex;

use aegis_security::{
    AppContext,
    config::Settings,
    joinguard::JoinGuard,
    platform::{AuditAction, AuditEntry, JoinEvent, LogNotice, MessageEvent, PlatformApi},
    store::{ChannelBackup, OverwriteBackup, RoleBackup, Store},
};

/// Mock that only records moderation calls; everything the detectors and the
/// join screener reach for.
#[derive(Default)]
struct ModApi {
    bans: Mutex<Vec<(u64, u64, String)>>,
    timeouts: Mutex<Vec<(u64, u64)>>,
    deleted: Mutex<Vec<(u64, u64)>>,
    message_gone: bool,
}

#[async_trait]
impl PlatformApi for ModApi {
    async fn audit_entries(&self, _: u64, _: AuditAction, _: u8) -> Result<Vec<AuditEntry>> {
        Ok(vec![])
    }
    async fn member_roles(&self, _: u64, _: u64) -> Result<Option<Vec<u64>>> {
        Ok(None)
    }
    async fn guild_role_ids(&self, _: u64) -> Result<Vec<u64>> {
        Ok(vec![])
    }
    async fn ban(&self, guild_id: u64, user_id: u64, reason: &str) -> Result<()> {
        self.bans
            .lock()
            .await
            .push((guild_id, user_id, reason.to_string()));
        Ok(())
    }
    async fn remove_roles(&self, _: u64, _: u64, _: &[u64], _: &str) -> Result<()> {
        Ok(())
    }
    async fn add_roles(&self, _: u64, _: u64, _: &[u64], _: &str) -> Result<()> {
        Ok(())
    }
    async fn timeout_member(
        &self,
        guild_id: u64,
        user_id: u64,
        _until: DateTime<Utc>,
        _reason: &str,
    ) -> Result<()> {
        self.timeouts.lock().await.push((guild_id, user_id));
        Ok(())
    }
    async fn clear_timeout(&self, _: u64, _: u64, _: &str) -> Result<()> {
        Ok(())
    }
    async fn delete_message(&self, channel_id: u64, message_id: u64) -> Result<bool> {
        if self.message_gone {
            return Ok(false);
        }
        self.deleted.lock().await.push((channel_id, message_id));
        Ok(true)
    }
    async fn create_channel(&self, _: u64, _: &ChannelBackup) -> Result<u64> {
        Ok(0)
    }
    async fn create_role(&self, _: u64, _: &RoleBackup) -> Result<u64> {
        Ok(0)
    }
    async fn set_channel_overwrite(&self, _: u64, _: u64, _: &OverwriteBackup) -> Result<()> {
        Ok(())
    }
    async fn send_notice(&self, _: u64, _: &str, _: &LogNotice) -> Result<()> {
        Ok(())
    }
}

fn ctx() -> Arc<AppContext> {
    AppContext::assemble(Settings::for_tests(), Store::in_memory())
}

fn message(author: u64, content: &str, mentions: Vec<u64>) -> MessageEvent {
    MessageEvent {
        guild_id: 1,
        channel_id: 2,
        message_id: 3,
        author_id: author,
        author_is_bot: false,
        content: content.to_string(),
        mention_ids: mentions,
    }
}

#[tokio::test]
async fn mass_mention_boundary_is_inclusive_on_trigger() {
    let ctx = ctx();
    let api = ModApi::default();
    // default max_mentions = 5; invite/spam noise off for focus
    ctx.store.set_option(1, "anti_spam_enabled", "false").await.unwrap();

    // exactly max - 1 distinct mentions: untouched
    let below = message(7, "hi", vec![1, 2, 3, 4]);
    ctx.chatguard().on_message(&api, &below).await;
    assert!(api.deleted.lock().await.is_empty());
    assert!(api.timeouts.lock().await.is_empty());

    // exactly max distinct mentions: deleted and muted
    let at = message(7, "hi", vec![1, 2, 3, 4, 5]);
    ctx.chatguard().on_message(&api, &at).await;
    assert_eq!(api.deleted.lock().await.len(), 1);
    assert_eq!(*api.timeouts.lock().await, vec![(1, 7)]);

    let logs = ctx.store.recent_logs(1, 10).await;
    assert_eq!(logs.len(), 1);
    assert!(logs[0].title.contains("Mass mention"));
}

#[tokio::test]
async fn duplicate_mentions_count_once() {
    let ctx = ctx();
    let api = ModApi::default();
    ctx.store.set_option(1, "anti_spam_enabled", "false").await.unwrap();

    // five mentions but only four distinct users
    let msg = message(7, "hi", vec![1, 1, 2, 3, 4]);
    ctx.chatguard().on_message(&api, &msg).await;
    assert!(api.deleted.lock().await.is_empty());
}

#[tokio::test]
async fn invite_link_is_deleted_without_a_mute() {
    let ctx = ctx();
    let api = ModApi::default();
    ctx.store.set_option(1, "anti_spam_enabled", "false").await.unwrap();

    let msg = message(7, "join discord.gg/abc123", vec![]);
    ctx.chatguard().on_message(&api, &msg).await;

    assert_eq!(api.deleted.lock().await.len(), 1);
    assert!(api.timeouts.lock().await.is_empty());
    let logs = ctx.store.recent_logs(1, 10).await;
    assert_eq!(logs.len(), 1);
    assert!(logs[0].title.contains("Invite link"));
}

#[tokio::test]
async fn already_gone_message_is_tolerated() {
    let ctx = ctx();
    let api = ModApi {
        message_gone: true,
        ..Default::default()
    };
    ctx.store.set_option(1, "anti_spam_enabled", "false").await.unwrap();

    let msg = message(7, "join discord.gg/abc123", vec![]);
    ctx.chatguard().on_message(&api, &msg).await;

    // no delete landed, but the violation is still logged
    let logs = ctx.store.recent_logs(1, 10).await;
    assert_eq!(logs.len(), 1);
    assert!(logs[0].description.contains("already gone"));
}

#[tokio::test]
async fn flood_burst_mutes_through_the_full_pipeline() {
    let ctx = ctx();
    let api = ModApi::default();
    ctx.store.set_option(1, "mass_mention_enabled", "false").await.unwrap();
    ctx.store.set_option(1, "invite_filter_enabled", "false").await.unwrap();

    // default threshold 5 in 10s: a tight burst trips on the fifth message
    for _ in 0..5 {
        ctx.chatguard().on_message(&api, &message(7, "spam", vec![])).await;
    }
    assert_eq!(*api.timeouts.lock().await, vec![(1, 7)]);

    // window was fully reset: the next message alone cannot re-trigger
    ctx.chatguard().on_message(&api, &message(7, "spam", vec![])).await;
    assert_eq!(api.timeouts.lock().await.len(), 1);
}

#[tokio::test]
async fn bot_join_is_banned_before_the_age_check() {
    let ctx = ctx();
    let api = ModApi::default();
    ctx.store.set_option(1, "auto_ban_new_accounts", "true").await.unwrap();

    let join = JoinEvent {
        guild_id: 1,
        user_id: 42,
        is_bot: true,
        // old account: only the bot rule can be the reason for the ban
        created_at: Utc::now() - Duration::days(400),
    };
    JoinGuard::on_member_join(&api, &ctx, &join).await;

    let bans = api.bans.lock().await;
    assert_eq!(bans.len(), 1);
    assert!(bans[0].2.contains("automated account"));
}

#[tokio::test]
async fn new_account_ban_boundary_is_exclusive() {
    let ctx = ctx();
    let api = ModApi::default();
    ctx.store.set_option(1, "auto_ban_new_accounts", "true").await.unwrap();
    // default threshold: 7 days

    // exactly 7 days old: allowed
    let join = JoinEvent {
        guild_id: 1,
        user_id: 42,
        is_bot: false,
        created_at: Utc::now() - Duration::days(7) - Duration::seconds(5),
    };
    JoinGuard::on_member_join(&api, &ctx, &join).await;
    assert!(api.bans.lock().await.is_empty());

    // six days old: banned, and the computed age is logged
    let join = JoinEvent {
        guild_id: 1,
        user_id: 43,
        is_bot: false,
        created_at: Utc::now() - Duration::days(6),
    };
    JoinGuard::on_member_join(&api, &ctx, &join).await;
    assert_eq!(api.bans.lock().await.len(), 1);
    let logs = ctx.store.recent_logs(1, 10).await;
    assert!(logs.last().unwrap().description.contains("6 day old account"));
}

#[tokio::test]
async fn direct_mute_and_unmute_are_logged() {
    use aegis_security::mute::Mute;

    let ctx = ctx();
    let api = ModApi::default();

    Mute::apply(&api, &ctx, 1, 7, 300, "manual mute").await.unwrap();
    assert_eq!(*api.timeouts.lock().await, vec![(1, 7)]);

    Mute::clear(&api, &ctx, 1, 7, "appealed").await.unwrap();

    let logs = ctx.store.recent_logs(1, 10).await;
    assert_eq!(logs.len(), 2);
    assert_eq!(logs[0].title, "Member muted");
    assert_eq!(logs[1].title, "Member unmuted");
}

#[tokio::test]
async fn warnings_are_observational_only() {
    use aegis_security::warn::Warns;

    let ctx = ctx();
    let api = ModApi::default();

    assert_eq!(Warns::add(&ctx, 1, 7, 900, "spamming").await, 1);
    assert_eq!(Warns::add(&ctx, 1, 7, 900, "again").await, 2);
    assert_eq!(Warns::list(&ctx, 1, 7).await.len(), 2);

    // a pile of warnings triggers no moderation call by itself
    assert!(api.bans.lock().await.is_empty());
    assert!(api.timeouts.lock().await.is_empty());

    assert_eq!(Warns::clear(&ctx, 1, 7, 900).await, 2);
    assert!(Warns::list(&ctx, 1, 7).await.is_empty());
}

#[tokio::test]
async fn disabled_detectors_do_nothing() {
    let ctx = ctx();
    let api = ModApi::default();
    for opt in ["anti_spam_enabled", "mass_mention_enabled", "invite_filter_enabled"] {
        ctx.store.set_option(1, opt, "false").await.unwrap();
    }

    for _ in 0..10 {
        let msg = message(7, "discord.gg/abc123", vec![1, 2, 3, 4, 5, 6, 7, 8]);
        ctx.chatguard().on_message(&api, &msg).await;
    }
    assert!(api.deleted.lock().await.is_empty());
    assert!(api.timeouts.lock().await.is_empty());
    assert!(ctx.store.recent_logs(1, 10).await.is_empty());
}
