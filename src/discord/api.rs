use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serenity::all::{
    ChannelId, ChannelType, Colour, CreateChannel, CreateEmbed, CreateEmbedFooter, CreateMessage,
    EditMember, EditRole, GuildId, PermissionOverwrite, PermissionOverwriteType, Permissions,
    RoleId, Timestamp, UserId,
};
use serenity::async_trait;
use serenity::http::{Http, HttpError};
use serenity::model::guild::audit_log::{Action, ChannelAction, RoleAction};

use crate::platform::{AuditAction, AuditEntry, LogNotice, NoticeKind, PlatformApi};
use crate::store::{ChannelBackup, ChannelKind, OverwriteBackup, OverwriteKind, RoleBackup};

const BRAND_FOOTER: &str = "Aegis Security";

/// `PlatformApi` over the Discord HTTP API. One instance per event
/// invocation; holds only the shared HTTP client.
pub struct SerenityApi {
    http: Arc<Http>,
}

impl SerenityApi {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

fn is_not_found(e: &serenity::Error) -> bool {
    matches!(
        e,
        serenity::Error::Http(HttpError::UnsuccessfulRequest(resp))
            if resp.status_code.as_u16() == 404
    )
}

pub(crate) fn timestamp_to_utc(ts: Timestamp) -> DateTime<Utc> {
    DateTime::from_timestamp(ts.unix_timestamp(), 0).unwrap_or_default()
}

fn notice_colour(kind: NoticeKind) -> Colour {
    match kind {
        NoticeKind::Info => Colour::new(0x0099ff),
        NoticeKind::Success => Colour::new(0x00ff00),
        NoticeKind::Warning => Colour::new(0xff9900),
        NoticeKind::Danger => Colour::new(0xff0000),
    }
}

#[async_trait]
impl PlatformApi for SerenityApi {
    async fn audit_entries(
        &self,
        guild_id: u64,
        action: AuditAction,
        limit: u8,
    ) -> Result<Vec<AuditEntry>> {
        let filter = match action {
            AuditAction::ChannelDelete => Action::Channel(ChannelAction::Delete),
            AuditAction::RoleDelete => Action::Role(RoleAction::Delete),
        };
        let logs = GuildId::new(guild_id)
            .audit_logs(&self.http, Some(filter), None, None, Some(limit))
            .await?;
        Ok(logs
            .entries
            .iter()
            .map(|e| AuditEntry {
                target_id: e.target_id.map(|t| t.get()),
                actor_id: e.user_id.get(),
                at: timestamp_to_utc(e.id.created_at()),
            })
            .collect())
    }

    async fn member_roles(&self, guild_id: u64, user_id: u64) -> Result<Option<Vec<u64>>> {
        match GuildId::new(guild_id)
            .member(&self.http, UserId::new(user_id))
            .await
        {
            Ok(member) => Ok(Some(member.roles.iter().map(|r| r.get()).collect())),
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn guild_role_ids(&self, guild_id: u64) -> Result<Vec<u64>> {
        let roles = GuildId::new(guild_id).roles(&self.http).await?;
        Ok(roles.keys().map(|r| r.get()).collect())
    }

    async fn ban(&self, guild_id: u64, user_id: u64, reason: &str) -> Result<()> {
        GuildId::new(guild_id)
            .ban_with_reason(&self.http, UserId::new(user_id), 0, reason)
            .await?;
        Ok(())
    }

    async fn remove_roles(
        &self,
        guild_id: u64,
        user_id: u64,
        roles: &[u64],
        reason: &str,
    ) -> Result<()> {
        for role in roles {
            self.http
                .remove_member_role(
                    GuildId::new(guild_id),
                    UserId::new(user_id),
                    RoleId::new(*role),
                    Some(reason),
                )
                .await?;
        }
        Ok(())
    }

    async fn add_roles(
        &self,
        guild_id: u64,
        user_id: u64,
        roles: &[u64],
        reason: &str,
    ) -> Result<()> {
        for role in roles {
            self.http
                .add_member_role(
                    GuildId::new(guild_id),
                    UserId::new(user_id),
                    RoleId::new(*role),
                    Some(reason),
                )
                .await?;
        }
        Ok(())
    }

    async fn timeout_member(
        &self,
        guild_id: u64,
        user_id: u64,
        until: DateTime<Utc>,
        reason: &str,
    ) -> Result<()> {
        GuildId::new(guild_id)
            .edit_member(
                &self.http,
                UserId::new(user_id),
                EditMember::new()
                    .disable_communication_until(until.to_rfc3339())
                    .audit_log_reason(reason),
            )
            .await?;
        Ok(())
    }

    async fn clear_timeout(&self, guild_id: u64, user_id: u64, reason: &str) -> Result<()> {
        GuildId::new(guild_id)
            .edit_member(
                &self.http,
                UserId::new(user_id),
                EditMember::new()
                    .enable_communication()
                    .audit_log_reason(reason),
            )
            .await?;
        Ok(())
    }

    async fn delete_message(&self, channel_id: u64, message_id: u64) -> Result<bool> {
        match self
            .http
            .delete_message(
                ChannelId::new(channel_id),
                serenity::all::MessageId::new(message_id),
                Some("security filter"),
            )
            .await
        {
            Ok(()) => Ok(true),
            Err(e) if is_not_found(&e) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn create_channel(&self, guild_id: u64, backup: &ChannelBackup) -> Result<u64> {
        let kind = match backup.kind {
            ChannelKind::Text | ChannelKind::Other => ChannelType::Text,
            ChannelKind::Voice => ChannelType::Voice,
            ChannelKind::Category => ChannelType::Category,
        };
        let mut builder = CreateChannel::new(&backup.name)
            .kind(kind)
            .position(backup.position)
            .nsfw(backup.nsfw)
            .audit_log_reason("security: channel recreated after unauthorized deletion");
        if let Some(topic) = &backup.topic {
            builder = builder.topic(topic);
        }
        if backup.slowmode_secs > 0 {
            builder = builder.rate_limit_per_user(backup.slowmode_secs);
        }
        if let Some(parent) = backup.parent_id {
            builder = builder.category(ChannelId::new(parent));
        }
        let created = GuildId::new(guild_id).create_channel(&self.http, builder).await?;
        Ok(created.id.get())
    }

    async fn create_role(&self, guild_id: u64, backup: &RoleBackup) -> Result<u64> {
        let builder = EditRole::new()
            .name(&backup.name)
            .colour(Colour::new(backup.color))
            .hoist(backup.hoist)
            .mentionable(backup.mentionable)
            .permissions(Permissions::from_bits_truncate(backup.permissions))
            .position(backup.position)
            .audit_log_reason("security: role recreated after unauthorized deletion");
        let created = GuildId::new(guild_id).create_role(&self.http, builder).await?;
        Ok(created.id.get())
    }

    async fn set_channel_overwrite(
        &self,
        _guild_id: u64,
        channel_id: u64,
        overwrite: &OverwriteBackup,
    ) -> Result<()> {
        let kind = match overwrite.kind {
            OverwriteKind::Role => PermissionOverwriteType::Role(RoleId::new(overwrite.target_id)),
            OverwriteKind::Member => {
                PermissionOverwriteType::Member(UserId::new(overwrite.target_id))
            }
        };
        ChannelId::new(channel_id)
            .create_permission(
                &self.http,
                PermissionOverwrite {
                    allow: Permissions::from_bits_truncate(overwrite.allow),
                    deny: Permissions::from_bits_truncate(overwrite.deny),
                    kind,
                },
            )
            .await?;
        Ok(())
    }

    async fn send_notice(
        &self,
        guild_id: u64,
        channel_name: &str,
        notice: &LogNotice,
    ) -> Result<()> {
        let channels = GuildId::new(guild_id).channels(&self.http).await?;
        let existing = channels
            .values()
            .find(|c| c.kind == ChannelType::Text && c.name == channel_name)
            .map(|c| c.id);
        let channel_id = match existing {
            Some(id) => id,
            None => {
                // Lazily create the logs channel the first time it is needed.
                GuildId::new(guild_id)
                    .create_channel(
                        &self.http,
                        CreateChannel::new(channel_name)
                            .kind(ChannelType::Text)
                            .topic("Automatic security logs")
                            .audit_log_reason("security: logs channel created automatically"),
                    )
                    .await?
                    .id
            }
        };

        let mut embed = CreateEmbed::new()
            .title(format!("🔒 {}", notice.title))
            .description(&notice.body)
            .colour(notice_colour(notice.kind))
            .timestamp(Timestamp::now())
            .footer(CreateEmbedFooter::new(BRAND_FOOTER));
        for (name, value) in &notice.fields {
            embed = embed.field(name, value, true);
        }

        channel_id
            .send_message(&self.http, CreateMessage::new().embed(embed))
            .await?;
        Ok(())
    }
}
