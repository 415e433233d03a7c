use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use futures_util::FutureExt;
use serenity::all::*;
use serenity::async_trait;

use crate::AppContext;
use crate::joinguard::JoinGuard;
use crate::platform::{JoinEvent, MessageEvent};
use crate::store::{ChannelBackup, ChannelKind, OverwriteBackup, OverwriteKind, RoleBackup};

pub mod api;

use api::SerenityApi;

pub struct Handler {
    pub app: Arc<AppContext>,
}

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        tracing::info!("Logged in as {}", ready.user.name);
    }

    async fn channel_delete(
        &self,
        ctx: Context,
        channel: GuildChannel,
        _messages: Option<Vec<Message>>,
    ) {
        let api = SerenityApi::new(ctx.http.clone());
        let guild_id = channel.guild_id.get();
        let backup = channel_backup(&channel);

        // A panic in the response flow must not take the gateway down.
        let guard = self.app.guard();
        let fut = guard.on_channel_delete(&api, guild_id, backup);
        if AssertUnwindSafe(fut).catch_unwind().await.is_err() {
            tracing::error!(guild_id, "channel_delete handler panicked");
        }
    }

    async fn guild_role_delete(
        &self,
        ctx: Context,
        guild_id: GuildId,
        removed_role_id: RoleId,
        removed_role_data_if_available: Option<Role>,
    ) {
        let api = SerenityApi::new(ctx.http.clone());
        let backup = role_backup(removed_role_id.get(), removed_role_data_if_available.as_ref());

        let guard = self.app.guard();
        let fut = guard.on_role_delete(&api, guild_id.get(), backup);
        if AssertUnwindSafe(fut).catch_unwind().await.is_err() {
            tracing::error!(guild_id = guild_id.get(), "role_delete handler panicked");
        }
    }

    async fn guild_member_addition(&self, ctx: Context, member: Member) {
        let api = SerenityApi::new(ctx.http.clone());
        let join = JoinEvent {
            guild_id: member.guild_id.get(),
            user_id: member.user.id.get(),
            is_bot: member.user.bot,
            created_at: api::timestamp_to_utc(member.user.id.created_at()),
        };
        JoinGuard::on_member_join(&api, &self.app, &join).await;
    }

    async fn message(&self, ctx: Context, msg: Message) {
        let Some(guild_id) = msg.guild_id else {
            return;
        };
        if msg.author.bot {
            return;
        }

        let api = SerenityApi::new(ctx.http.clone());
        let event = MessageEvent {
            guild_id: guild_id.get(),
            channel_id: msg.channel_id.get(),
            message_id: msg.id.get(),
            author_id: msg.author.id.get(),
            author_is_bot: msg.author.bot,
            content: msg.content.clone(),
            mention_ids: msg.mentions.iter().map(|u| u.id.get()).collect(),
        };
        self.app.chatguard().on_message(&api, &event).await;
    }
}

/// Snapshot a channel's structure at the moment of deletion.
fn channel_backup(ch: &GuildChannel) -> ChannelBackup {
    let kind = match ch.kind {
        ChannelType::Text | ChannelType::News => ChannelKind::Text,
        ChannelType::Voice | ChannelType::Stage => ChannelKind::Voice,
        ChannelType::Category => ChannelKind::Category,
        _ => ChannelKind::Other,
    };
    ChannelBackup {
        id: ch.id.get(),
        name: ch.name.clone(),
        kind,
        parent_id: ch.parent_id.map(|p| p.get()),
        position: ch.position,
        topic: ch.topic.clone(),
        nsfw: ch.nsfw,
        slowmode_secs: ch.rate_limit_per_user.unwrap_or(0),
        overwrites: ch
            .permission_overwrites
            .iter()
            .map(|ow| {
                let (target_id, kind) = match ow.kind {
                    PermissionOverwriteType::Member(u) => (u.get(), OverwriteKind::Member),
                    PermissionOverwriteType::Role(r) => (r.get(), OverwriteKind::Role),
                    _ => (0, OverwriteKind::Role),
                };
                OverwriteBackup {
                    target_id,
                    kind,
                    allow: ow.allow.bits(),
                    deny: ow.deny.bits(),
                }
            })
            .collect(),
        deleted_at: Utc::now(),
    }
}

/// Snapshot a role's structure. Without the gateway cache the role data may
/// be absent; the id alone still supports attribution and punishment.
fn role_backup(role_id: u64, role: Option<&Role>) -> RoleBackup {
    match role {
        Some(r) => RoleBackup {
            id: role_id,
            name: r.name.clone(),
            color: r.colour.0,
            hoist: r.hoist,
            mentionable: r.mentionable,
            permissions: r.permissions.bits(),
            position: r.position,
            deleted_at: Utc::now(),
        },
        None => RoleBackup {
            id: role_id,
            name: format!("deleted-role-{role_id}"),
            color: 0,
            hoist: false,
            mentionable: false,
            permissions: 0,
            position: 0,
            deleted_at: Utc::now(),
        },
    }
}

fn intents_from_settings(names: &[String]) -> GatewayIntents {
    let mut i = GatewayIntents::empty();
    for n in names {
        match n.as_str() {
            "GUILDS" => i |= GatewayIntents::GUILDS,
            "GUILD_MEMBERS" => i |= GatewayIntents::GUILD_MEMBERS,
            "GUILD_MESSAGES" => i |= GatewayIntents::GUILD_MESSAGES,
            "MESSAGE_CONTENT" => i |= GatewayIntents::MESSAGE_CONTENT,
            _ => {}
        }
    }
    i
}

pub async fn run_bot(ctx: Arc<AppContext>) -> Result<()> {
    let token = &ctx.settings.discord.token;
    if token.is_empty() {
        anyhow::bail!("Discord token missing (AGS_DISCORD_TOKEN). Fill it in .env.");
    }

    let intents = intents_from_settings(&ctx.settings.discord.intents);

    let handler = Handler { app: ctx.clone() };

    let mut client = serenity::Client::builder(token, intents)
        .event_handler(handler)
        .await?;

    tracing::info!("Discord client starting…");
    client.start().await?;
    Ok(())
}
