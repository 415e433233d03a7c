use std::collections::{BTreeSet, HashMap, VecDeque};
use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{RwLock, mpsc};

use crate::error::GuardError;

/* =========================================
   Per-guild configuration
   ========================================= */

/// Punishment applied to a non-whitelisted actor after a deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Punishment {
    RemoveRoles,
    Ban,
}

impl Punishment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Punishment::RemoveRoles => "remove_roles",
            Punishment::Ban => "ban",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value {
            "remove_roles" => Some(Punishment::RemoveRoles),
            "ban" => Some(Punishment::Ban),
            _ => None,
        }
    }
}

/// Settings record of a single guild. A lookup never yields null: missing
/// guilds are materialized from this default table on first sight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuildConfig {
    pub protection_enabled: bool,
    pub auto_ban_bots: bool,
    pub auto_ban_new_accounts: bool,
    pub new_account_days: u32,
    pub channel_delete_punishment: Punishment,
    pub role_delete_punishment: Punishment,
    pub recreate_channels: bool,
    pub recreate_roles: bool,
    pub anti_spam_enabled: bool,
    pub spam_message_count: u32,
    pub spam_window_secs: u64,
    pub spam_mute_secs: u64,
    pub mass_mention_enabled: bool,
    pub max_mentions: u32,
    pub mass_mention_mute_secs: u64,
    pub invite_filter_enabled: bool,
    pub backup_channels: bool,
    pub backup_roles: bool,
    pub logs_channel: String,
    pub max_log_history: usize,
    pub whitelist: BTreeSet<u64>,
}

impl Default for GuildConfig {
    fn default() -> Self {
        Self {
            protection_enabled: true,
            auto_ban_bots: true,
            auto_ban_new_accounts: false,
            new_account_days: 7,
            channel_delete_punishment: Punishment::RemoveRoles,
            role_delete_punishment: Punishment::RemoveRoles,
            recreate_channels: true,
            recreate_roles: true,
            anti_spam_enabled: true,
            spam_message_count: 5,
            spam_window_secs: 10,
            spam_mute_secs: 300,
            mass_mention_enabled: true,
            max_mentions: 5,
            mass_mention_mute_secs: 600,
            invite_filter_enabled: true,
            backup_channels: true,
            backup_roles: true,
            logs_channel: "security-logs".into(),
            max_log_history: 100,
            whitelist: BTreeSet::new(),
        }
    }
}

impl GuildConfig {
    /// Names accepted by `set_option` / `option_value`, in display order.
    pub const OPTION_NAMES: &'static [&'static str] = &[
        "protection_enabled",
        "auto_ban_bots",
        "auto_ban_new_accounts",
        "new_account_days",
        "channel_delete_punishment",
        "role_delete_punishment",
        "recreate_channels",
        "recreate_roles",
        "anti_spam_enabled",
        "spam_message_count",
        "spam_window_secs",
        "spam_mute_secs",
        "mass_mention_enabled",
        "max_mentions",
        "mass_mention_mute_secs",
        "invite_filter_enabled",
        "backup_channels",
        "backup_roles",
        "logs_channel",
        "max_log_history",
    ];

    /// Apply one named option. Unknown names and out-of-domain values are
    /// rejected before any field is touched.
    pub fn set_option(&mut self, name: &str, value: &str) -> Result<(), GuardError> {
        fn flag(value: &str) -> Result<bool, GuardError> {
            match value {
                "true" => Ok(true),
                "false" => Ok(false),
                other => Err(GuardError::InvalidConfig(format!(
                    "expected true/false, got `{other}`"
                ))),
            }
        }
        fn int<T: std::str::FromStr + PartialOrd + Copy + std::fmt::Display>(
            value: &str,
            lo: T,
            hi: T,
        ) -> Result<T, GuardError> {
            let v: T = value
                .parse()
                .map_err(|_| GuardError::InvalidConfig(format!("not a number: `{value}`")))?;
            if v < lo || v > hi {
                return Err(GuardError::InvalidConfig(format!(
                    "value {v} outside {lo}..={hi}"
                )));
            }
            Ok(v)
        }

        match name {
            "protection_enabled" => self.protection_enabled = flag(value)?,
            "auto_ban_bots" => self.auto_ban_bots = flag(value)?,
            "auto_ban_new_accounts" => self.auto_ban_new_accounts = flag(value)?,
            "new_account_days" => self.new_account_days = int(value, 1u32, 365)?,
            "channel_delete_punishment" => {
                self.channel_delete_punishment = Punishment::parse(value).ok_or_else(|| {
                    GuardError::InvalidConfig("expected remove_roles or ban".into())
                })?
            }
            "role_delete_punishment" => {
                self.role_delete_punishment = Punishment::parse(value).ok_or_else(|| {
                    GuardError::InvalidConfig("expected remove_roles or ban".into())
                })?
            }
            "recreate_channels" => self.recreate_channels = flag(value)?,
            "recreate_roles" => self.recreate_roles = flag(value)?,
            "anti_spam_enabled" => self.anti_spam_enabled = flag(value)?,
            "spam_message_count" => self.spam_message_count = int(value, 2u32, 50)?,
            "spam_window_secs" => self.spam_window_secs = int(value, 1u64, 600)?,
            "spam_mute_secs" => self.spam_mute_secs = int(value, 10u64, 86_400)?,
            "mass_mention_enabled" => self.mass_mention_enabled = flag(value)?,
            "max_mentions" => self.max_mentions = int(value, 2u32, 100)?,
            "mass_mention_mute_secs" => self.mass_mention_mute_secs = int(value, 10u64, 86_400)?,
            "invite_filter_enabled" => self.invite_filter_enabled = flag(value)?,
            "backup_channels" => self.backup_channels = flag(value)?,
            "backup_roles" => self.backup_roles = flag(value)?,
            "logs_channel" => {
                if value.trim().is_empty() {
                    return Err(GuardError::InvalidConfig("channel name is empty".into()));
                }
                self.logs_channel = value.trim().to_string();
            }
            "max_log_history" => self.max_log_history = int(value, 10usize, 1000)?,
            other => {
                return Err(GuardError::InvalidConfig(format!(
                    "unknown option `{other}`"
                )));
            }
        }
        Ok(())
    }

    /// Human-readable list of the protections currently switched on.
    pub fn active_protections(&self) -> Vec<&'static str> {
        let mut active = Vec::new();
        if self.protection_enabled {
            active.push("deletion protection");
        }
        if self.auto_ban_bots {
            active.push("auto-ban bots");
        }
        if self.auto_ban_new_accounts {
            active.push("new-account screening");
        }
        if self.anti_spam_enabled {
            active.push("anti-spam");
        }
        if self.mass_mention_enabled {
            active.push("mass-mention filter");
        }
        if self.invite_filter_enabled {
            active.push("invite filter");
        }
        if self.backup_channels {
            active.push("channel backups");
        }
        if self.backup_roles {
            active.push("role backups");
        }
        active
    }

    pub fn option_value(&self, name: &str) -> Option<String> {
        let v = match name {
            "protection_enabled" => self.protection_enabled.to_string(),
            "auto_ban_bots" => self.auto_ban_bots.to_string(),
            "auto_ban_new_accounts" => self.auto_ban_new_accounts.to_string(),
            "new_account_days" => self.new_account_days.to_string(),
            "channel_delete_punishment" => self.channel_delete_punishment.as_str().into(),
            "role_delete_punishment" => self.role_delete_punishment.as_str().into(),
            "recreate_channels" => self.recreate_channels.to_string(),
            "recreate_roles" => self.recreate_roles.to_string(),
            "anti_spam_enabled" => self.anti_spam_enabled.to_string(),
            "spam_message_count" => self.spam_message_count.to_string(),
            "spam_window_secs" => self.spam_window_secs.to_string(),
            "spam_mute_secs" => self.spam_mute_secs.to_string(),
            "mass_mention_enabled" => self.mass_mention_enabled.to_string(),
            "max_mentions" => self.max_mentions.to_string(),
            "mass_mention_mute_secs" => self.mass_mention_mute_secs.to_string(),
            "invite_filter_enabled" => self.invite_filter_enabled.to_string(),
            "backup_channels" => self.backup_channels.to_string(),
            "backup_roles" => self.backup_roles.to_string(),
            "logs_channel" => self.logs_channel.clone(),
            "max_log_history" => self.max_log_history.to_string(),
            _ => return None,
        };
        Some(v)
    }
}

/* =========================================
   Persisted records
   ========================================= */

/// Roles stripped from an actor, kept so the punishment can be reversed.
/// At most one live record per actor; a newer punishment overwrites it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestorationRecord {
    pub guild_id: u64,
    pub roles: Vec<u64>,
    pub reason: String,
    pub removed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub at: DateTime<Utc>,
    pub title: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarningRecord {
    pub reason: String,
    pub moderator_id: u64,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Text,
    Voice,
    Category,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverwriteKind {
    Role,
    Member,
}

/// One permission overwrite of a channel, bit-for-bit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverwriteBackup {
    pub target_id: u64,
    pub kind: OverwriteKind,
    pub allow: u64,
    pub deny: u64,
}

/// Structural snapshot of a channel, captured the moment it was deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelBackup {
    pub id: u64,
    pub name: String,
    pub kind: ChannelKind,
    pub parent_id: Option<u64>,
    pub position: u16,
    pub topic: Option<String>,
    pub nsfw: bool,
    pub slowmode_secs: u16,
    pub overwrites: Vec<OverwriteBackup>,
    pub deleted_at: DateTime<Utc>,
}

/// Structural snapshot of a role, captured the moment it was deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleBackup {
    pub id: u64,
    pub name: String,
    pub color: u32,
    pub hoist: bool,
    pub mentionable: bool,
    pub permissions: u64,
    pub position: u16,
    pub deleted_at: DateTime<Utc>,
}

/// Append-only per-guild backup sequences. Never pruned here; retention is
/// an external concern.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GuildBackups {
    pub channels: Vec<ChannelBackup>,
    pub roles: Vec<RoleBackup>,
}

/// The single consolidated document. Everything the engine persists lives
/// here; spam windows are deliberately absent and reset on restart.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityDocument {
    pub configs: HashMap<u64, GuildConfig>,
    pub restorations: HashMap<u64, RestorationRecord>,
    pub logs: HashMap<u64, VecDeque<LogEntry>>,
    pub warnings: HashMap<u64, HashMap<u64, Vec<WarningRecord>>>,
    pub backups: HashMap<u64, GuildBackups>,
}

/* =========================================
   Store: load once, commit through one writer
   ========================================= */

/// Counters reported to the status command.
#[derive(Debug, Clone)]
pub struct StatusReport {
    pub log_count: usize,
    pub pending_restorations: usize,
    pub warned_users: usize,
    pub config: GuildConfig,
}

/// Owner of the persisted document. All mutation happens inside `mutate`
/// under one write lock, and every mutation enqueues a full re-serialization
/// to a single writer task, so concurrent handlers cannot interleave
/// read-modify-write cycles or race commits against each other.
pub struct Store {
    doc: RwLock<SecurityDocument>,
    commits: Option<mpsc::UnboundedSender<Vec<u8>>>,
}

impl Store {
    /// Load the document (or start empty) and spawn the writer task.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path: PathBuf = path.as_ref().to_path_buf();
        let doc = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => SecurityDocument::default(),
            Err(e) => return Err(e.into()),
        };

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(writer_task(path, rx));

        Ok(Self {
            doc: RwLock::new(doc),
            commits: Some(tx),
        })
    }

    /// Store without a backing file. Used by tests; commits are dropped.
    pub fn in_memory() -> Self {
        Self {
            doc: RwLock::new(SecurityDocument::default()),
            commits: None,
        }
    }

    pub async fn read<T>(&self, f: impl FnOnce(&SecurityDocument) -> T) -> T {
        f(&*self.doc.read().await)
    }

    /// Apply a mutation and commit the whole document. The serialization
    /// happens under the write guard so the writer always receives a
    /// consistent snapshot.
    pub async fn mutate<T>(&self, f: impl FnOnce(&mut SecurityDocument) -> T) -> T {
        let mut guard = self.doc.write().await;
        let out = f(&mut guard);
        if let Some(tx) = &self.commits {
            match serde_json::to_vec_pretty(&*guard) {
                Ok(bytes) => {
                    let _ = tx.send(bytes);
                }
                Err(e) => tracing::warn!(error=?e, "document serialization failed; commit skipped"),
            }
        }
        out
    }

    /* ===== Config store ===== */

    /// Per-guild config, materializing the default table on first sight.
    pub async fn guild_config(&self, guild_id: u64) -> GuildConfig {
        if let Some(cfg) = self.read(|d| d.configs.get(&guild_id).cloned()).await {
            return cfg;
        }
        self.mutate(|d| d.configs.entry(guild_id).or_default().clone())
            .await
    }

    pub async fn set_option(
        &self,
        guild_id: u64,
        name: &str,
        value: &str,
    ) -> Result<(), GuardError> {
        self.mutate(|d| {
            let cfg = d.configs.entry(guild_id).or_default();
            // Validate against a scratch copy so a rejected value leaves
            // the stored config untouched.
            let mut next = cfg.clone();
            next.set_option(name, value)?;
            *cfg = next;
            Ok(())
        })
        .await
    }

    pub async fn option_value(&self, guild_id: u64, name: &str) -> Option<String> {
        self.guild_config(guild_id).await.option_value(name)
    }

    pub async fn whitelist_add(&self, guild_id: u64, actor_id: u64) -> bool {
        self.mutate(|d| d.configs.entry(guild_id).or_default().whitelist.insert(actor_id))
            .await
    }

    pub async fn whitelist_remove(&self, guild_id: u64, actor_id: u64) -> bool {
        self.mutate(|d| d.configs.entry(guild_id).or_default().whitelist.remove(&actor_id))
            .await
    }

    /* ===== Log ring ===== */

    /// Append one entry to the guild's bounded log, evicting the oldest
    /// entries once the configured bound is exceeded.
    pub async fn push_log(&self, guild_id: u64, title: &str, description: &str) {
        self.mutate(|d| {
            let max = d.configs.entry(guild_id).or_default().max_log_history;
            let ring = d.logs.entry(guild_id).or_default();
            ring.push_back(LogEntry {
                at: Utc::now(),
                title: title.to_string(),
                description: description.to_string(),
            });
            while ring.len() > max {
                ring.pop_front();
            }
        })
        .await
    }

    /// Most recent entries, newest last, at most `count`.
    pub async fn recent_logs(&self, guild_id: u64, count: usize) -> Vec<LogEntry> {
        self.read(|d| {
            d.logs
                .get(&guild_id)
                .map(|ring| ring.iter().rev().take(count).rev().cloned().collect())
                .unwrap_or_default()
        })
        .await
    }

    /* ===== Restoration records ===== */

    /// Write the reversal snapshot. Last-write-wins: a new punishment for the
    /// same actor replaces any unconsumed record.
    pub async fn put_restoration(&self, actor_id: u64, record: RestorationRecord) {
        self.mutate(|d| {
            d.restorations.insert(actor_id, record);
        })
        .await
    }

    /// Take the record out atomically; the caller re-inserts it if the
    /// role grant fails, keeping the restore single-use without losing it.
    pub async fn take_restoration(&self, actor_id: u64) -> Option<RestorationRecord> {
        self.mutate(|d| d.restorations.remove(&actor_id)).await
    }

    pub async fn peek_restoration(&self, actor_id: u64) -> Option<RestorationRecord> {
        self.read(|d| d.restorations.get(&actor_id).cloned()).await
    }

    /* ===== Warnings ===== */

    pub async fn add_warning(&self, guild_id: u64, user_id: u64, record: WarningRecord) -> usize {
        self.mutate(|d| {
            let list = d
                .warnings
                .entry(guild_id)
                .or_default()
                .entry(user_id)
                .or_default();
            list.push(record);
            list.len()
        })
        .await
    }

    pub async fn warnings(&self, guild_id: u64, user_id: u64) -> Vec<WarningRecord> {
        self.read(|d| {
            d.warnings
                .get(&guild_id)
                .and_then(|m| m.get(&user_id))
                .cloned()
                .unwrap_or_default()
        })
        .await
    }

    pub async fn clear_warnings(&self, guild_id: u64, user_id: u64) -> usize {
        self.mutate(|d| {
            d.warnings
                .get_mut(&guild_id)
                .and_then(|m| m.remove(&user_id))
                .map(|l| l.len())
                .unwrap_or(0)
        })
        .await
    }

    /* ===== Backups ===== */

    pub async fn push_channel_backup(&self, guild_id: u64, backup: ChannelBackup) {
        self.mutate(|d| d.backups.entry(guild_id).or_default().channels.push(backup))
            .await
    }

    pub async fn push_role_backup(&self, guild_id: u64, backup: RoleBackup) {
        self.mutate(|d| d.backups.entry(guild_id).or_default().roles.push(backup))
            .await
    }

    /// Most recent backups of both kinds, newest last, at most `count` each.
    pub async fn recent_backups(&self, guild_id: u64, count: usize) -> GuildBackups {
        self.read(|d| {
            let all = d.backups.get(&guild_id).cloned().unwrap_or_default();
            GuildBackups {
                channels: all.channels.iter().rev().take(count).rev().cloned().collect(),
                roles: all.roles.iter().rev().take(count).rev().cloned().collect(),
            }
        })
        .await
    }

    /* ===== Status ===== */

    pub async fn status(&self, guild_id: u64) -> StatusReport {
        let config = self.guild_config(guild_id).await;
        self.read(|d| StatusReport {
            log_count: d.logs.get(&guild_id).map(VecDeque::len).unwrap_or(0),
            pending_restorations: d
                .restorations
                .values()
                .filter(|r| r.guild_id == guild_id)
                .count(),
            warned_users: d.warnings.get(&guild_id).map(HashMap::len).unwrap_or(0),
            config,
        })
        .await
    }
}

/// Drains commit snapshots and rewrites the document file. Coalesces a
/// backlog down to the newest snapshot; an I/O failure is logged and the
/// in-memory state stays authoritative for the rest of the process.
async fn writer_task(path: PathBuf, mut rx: mpsc::UnboundedReceiver<Vec<u8>>) {
    let tmp = path.with_extension("json.tmp");
    while let Some(mut bytes) = rx.recv().await {
        while let Ok(newer) = rx.try_recv() {
            bytes = newer;
        }
        let result = async {
            tokio::fs::write(&tmp, &bytes).await?;
            tokio::fs::rename(&tmp, &path).await
        }
        .await;
        if let Err(e) = result {
            tracing::warn!(error=?e, path=%path.display(), "document write failed; keeping in-memory state");
        }
    }
}
