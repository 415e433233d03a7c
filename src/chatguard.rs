use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::AppContext;
use crate::mute::Mute;
use crate::platform::{LogNotice, MessageEvent, NoticeKind, PlatformApi};
use crate::store::GuildConfig;

static RE_INVITE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?ix)\b(discord\.(gg|me|io)/[A-Za-z0-9-]+|(https?://)?(www\.)?discord(app)?\.com/invite/[A-Za-z0-9-]+)\b"#,
    )
    .unwrap()
});

/// Per-message abuse detectors: flood mute, mass-mention mute, invite-link
/// filter. Each runs behind its own config flag and each tolerates the
/// message having been deleted already by an earlier detector.
///
/// The flood windows are in-memory only and reset on process restart.
pub struct ChatGuard {
    ctx: Arc<AppContext>,
    windows: DashMap<(u64, u64), VecDeque<Instant>>, // (guild, author)
}

impl ChatGuard {
    pub fn new(ctx: Arc<AppContext>) -> Arc<Self> {
        Arc::new(Self {
            ctx,
            windows: DashMap::new(),
        })
    }

    pub async fn on_message(&self, api: &impl PlatformApi, msg: &MessageEvent) {
        if msg.author_is_bot {
            return;
        }
        let cfg = self.ctx.store.guild_config(msg.guild_id).await;

        if cfg.anti_spam_enabled {
            self.check_flood(api, &cfg, msg).await;
        }
        if cfg.mass_mention_enabled {
            self.check_mass_mention(api, &cfg, msg).await;
        }
        if cfg.invite_filter_enabled {
            self.check_invite(api, &cfg, msg).await;
        }
    }

    /// Record one message and report whether the flood threshold was hit.
    /// Pruning is lazy: entries older than the window relative to `at` are
    /// dropped before the new timestamp is appended. A trip clears the
    /// window entirely so the same burst cannot re-trigger on its tail.
    fn observe_at(
        &self,
        guild_id: u64,
        author_id: u64,
        at: Instant,
        window: Duration,
        threshold: u32,
    ) -> bool {
        let mut w = self.windows.entry((guild_id, author_id)).or_default();
        while let Some(front) = w.front() {
            if at.duration_since(*front) > window {
                w.pop_front();
            } else {
                break;
            }
        }
        w.push_back(at);
        if w.len() as u32 >= threshold {
            w.clear();
            true
        } else {
            false
        }
    }

    async fn check_flood(&self, api: &impl PlatformApi, cfg: &GuildConfig, msg: &MessageEvent) {
        let tripped = self.observe_at(
            msg.guild_id,
            msg.author_id,
            Instant::now(),
            Duration::from_secs(cfg.spam_window_secs),
            cfg.spam_message_count,
        );
        if !tripped {
            return;
        }

        let reason = format!(
            "security: {} messages within {}s",
            cfg.spam_message_count, cfg.spam_window_secs
        );
        let muted = match Mute::timeout(
            api,
            msg.guild_id,
            msg.author_id,
            cfg.spam_mute_secs,
            &reason,
        )
        .await
        {
            Ok(()) => format!("muted for {}s", cfg.spam_mute_secs),
            Err(e) => format!("mute failed: {e}"),
        };

        let title = "Message flood detected";
        let description = format!("<@{}> tripped the flood window | {muted}", msg.author_id);
        self.ctx.store.push_log(msg.guild_id, title, &description).await;
        self.notify(api, cfg, msg.guild_id, NoticeKind::Warning, title, &description)
            .await;
    }

    async fn check_mass_mention(
        &self,
        api: &impl PlatformApi,
        cfg: &GuildConfig,
        msg: &MessageEvent,
    ) {
        let mentions = distinct_mention_count(&msg.mention_ids);
        if mentions < cfg.max_mentions {
            return;
        }

        // Already-gone message is a no-op, not an error.
        let deleted = match api.delete_message(msg.channel_id, msg.message_id).await {
            Ok(true) => "message deleted",
            Ok(false) => "message already gone",
            Err(_) => "message delete failed",
        };
        let reason = format!("security: mass mention ({mentions} users)");
        let muted = match Mute::timeout(
            api,
            msg.guild_id,
            msg.author_id,
            cfg.mass_mention_mute_secs,
            &reason,
        )
        .await
        {
            Ok(()) => format!("muted for {}s", cfg.mass_mention_mute_secs),
            Err(e) => format!("mute failed: {e}"),
        };

        let title = "Mass mention detected";
        let description = format!(
            "<@{}> mentioned {mentions} distinct users | {deleted} | {muted}",
            msg.author_id
        );
        self.ctx.store.push_log(msg.guild_id, title, &description).await;
        self.notify(api, cfg, msg.guild_id, NoticeKind::Warning, title, &description)
            .await;
    }

    async fn check_invite(&self, api: &impl PlatformApi, cfg: &GuildConfig, msg: &MessageEvent) {
        if !RE_INVITE.is_match(&msg.content) {
            return;
        }

        let deleted = match api.delete_message(msg.channel_id, msg.message_id).await {
            Ok(true) => "message deleted",
            Ok(false) => "message already gone",
            Err(_) => "message delete failed",
        };

        let title = "Invite link removed";
        let description = format!("<@{}> posted an invite link | {deleted}", msg.author_id);
        self.ctx.store.push_log(msg.guild_id, title, &description).await;
        self.notify(api, cfg, msg.guild_id, NoticeKind::Info, title, &description)
            .await;
    }

    async fn notify(
        &self,
        api: &impl PlatformApi,
        cfg: &GuildConfig,
        guild_id: u64,
        kind: NoticeKind,
        title: &str,
        description: &str,
    ) {
        let notice = LogNotice::new(kind, title, description);
        if let Err(e) = api.send_notice(guild_id, &cfg.logs_channel, &notice).await {
            tracing::warn!(error=?e, guild_id, "logs channel notice failed");
        }
    }
}

fn distinct_mention_count(mention_ids: &[u64]) -> u32 {
    mention_ids.iter().collect::<HashSet<_>>().len() as u32
}
