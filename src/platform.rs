use anyhow::Result;
use chrono::{DateTime, Utc};
use serenity::async_trait;

use crate::store::{ChannelBackup, OverwriteBackup, RoleBackup};

/// Audit-trail action kinds the engine correlates against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuditAction {
    ChannelDelete,
    RoleDelete,
}

/// One audit-trail row, most-recent-first when queried.
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub target_id: Option<u64>,
    pub actor_id: u64,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Info,
    Success,
    Warning,
    Danger,
}

/// Structured, human-facing notice for the guild's logs channel. Rendering
/// (embeds, colors) is the transport adapter's business.
#[derive(Debug, Clone)]
pub struct LogNotice {
    pub kind: NoticeKind,
    pub title: String,
    pub body: String,
    pub fields: Vec<(String, String)>,
}

impl LogNotice {
    pub fn new(kind: NoticeKind, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            kind,
            title: title.into(),
            body: body.into(),
            fields: Vec::new(),
        }
    }

    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((name.into(), value.into()));
        self
    }
}

/// A member joining, as seen by the join screener.
#[derive(Debug, Clone)]
pub struct JoinEvent {
    pub guild_id: u64,
    pub user_id: u64,
    pub is_bot: bool,
    pub created_at: DateTime<Utc>,
}

/// A guild message, as seen by the abuse detectors.
#[derive(Debug, Clone)]
pub struct MessageEvent {
    pub guild_id: u64,
    pub channel_id: u64,
    pub message_id: u64,
    pub author_id: u64,
    pub author_is_bot: bool,
    pub content: String,
    /// Distinct mentioned user ids.
    pub mention_ids: Vec<u64>,
}

/// Everything the engine asks of the chat platform. One implementation talks
/// to Discord (`discord::api`); tests supply mocks. Every call is
/// independently fallible and callers fold failures into their outcome
/// reports instead of aborting the flow.
#[async_trait]
pub trait PlatformApi: Send + Sync {
    /// Most recent audit entries of `action`, newest first, at most `limit`.
    async fn audit_entries(
        &self,
        guild_id: u64,
        action: AuditAction,
        limit: u8,
    ) -> Result<Vec<AuditEntry>>;

    /// Role ids currently held by the member, excluding nothing. `None`
    /// when the user is not (or no longer) a member.
    async fn member_roles(&self, guild_id: u64, user_id: u64) -> Result<Option<Vec<u64>>>;

    /// Role ids that currently exist in the guild.
    async fn guild_role_ids(&self, guild_id: u64) -> Result<Vec<u64>>;

    async fn ban(&self, guild_id: u64, user_id: u64, reason: &str) -> Result<()>;

    async fn remove_roles(
        &self,
        guild_id: u64,
        user_id: u64,
        roles: &[u64],
        reason: &str,
    ) -> Result<()>;

    async fn add_roles(
        &self,
        guild_id: u64,
        user_id: u64,
        roles: &[u64],
        reason: &str,
    ) -> Result<()>;

    async fn timeout_member(
        &self,
        guild_id: u64,
        user_id: u64,
        until: DateTime<Utc>,
        reason: &str,
    ) -> Result<()>;

    async fn clear_timeout(&self, guild_id: u64, user_id: u64, reason: &str) -> Result<()>;

    /// Returns `Ok(false)` when the message is already gone; that is a
    /// no-op for every caller, not an error.
    async fn delete_message(&self, channel_id: u64, message_id: u64) -> Result<bool>;

    /// Recreate a channel from its snapshot; returns the new channel id.
    async fn create_channel(&self, guild_id: u64, backup: &ChannelBackup) -> Result<u64>;

    /// Recreate a role from its snapshot; returns the new role id.
    async fn create_role(&self, guild_id: u64, backup: &RoleBackup) -> Result<u64>;

    /// Restore a single permission overwrite on a channel.
    async fn set_channel_overwrite(
        &self,
        guild_id: u64,
        channel_id: u64,
        overwrite: &OverwriteBackup,
    ) -> Result<()>;

    /// Deliver a notice to the guild's logs channel, resolving it by name
    /// and creating it when absent.
    async fn send_notice(&self, guild_id: u64, channel_name: &str, notice: &LogNotice)
    -> Result<()>;
}
