use chrono::Utc;

use crate::AppContext;
use crate::platform::{LogNotice, NoticeKind, PlatformApi};
use crate::store::{ChannelBackup, Punishment, RestorationRecord, RoleBackup};

use super::recreate;

/// The resource a deletion event is about, with its pre-deletion snapshot.
#[derive(Debug, Clone, Copy)]
pub enum DeletedResource<'a> {
    Channel(&'a ChannelBackup),
    Role(&'a RoleBackup),
}

impl DeletedResource<'_> {
    pub fn label(&self) -> String {
        match self {
            DeletedResource::Channel(c) => format!("#{}", c.name),
            DeletedResource::Role(r) => format!("@{}", r.name),
        }
    }

    pub fn kind_word(&self) -> &'static str {
        match self {
            DeletedResource::Channel(_) => "channel",
            DeletedResource::Role(_) => "role",
        }
    }

    pub fn id(&self) -> u64 {
        match self {
            DeletedResource::Channel(c) => c.id,
            DeletedResource::Role(r) => r.id,
        }
    }
}

/// The guild's implicit everyone role carries the guild's own id; it can
/// neither be removed nor restored, so it never enters a snapshot.
fn removable_roles(guild_id: u64, roles: Vec<u64>) -> Vec<u64> {
    roles.into_iter().filter(|r| *r != guild_id).collect()
}

/// Respond to an attributed deletion: clear whitelisted actors, otherwise
/// recreate (when policy says so) and punish. Every branch lands exactly one
/// detailed log entry; remote failures degrade to text in that entry and
/// never abort the remaining sub-steps.
pub async fn respond(
    api: &impl PlatformApi,
    ctx: &AppContext,
    guild_id: u64,
    actor_id: u64,
    resource: DeletedResource<'_>,
) {
    let cfg = ctx.store.guild_config(guild_id).await;
    let label = resource.label();
    let kind = resource.kind_word();

    if cfg.whitelist.contains(&actor_id) {
        let title = format!("Authorized {kind} deletion");
        let description =
            format!("<@{actor_id}> deleted {label}; actor is whitelisted, no action taken");
        ctx.store.push_log(guild_id, &title, &description).await;
        let notice = LogNotice::new(NoticeKind::Success, &title, &description)
            .field("Deleted", format!("{label} ({})", resource.id()))
            .field("Actor", format!("<@{actor_id}>"));
        if let Err(e) = api.send_notice(guild_id, &cfg.logs_channel, &notice).await {
            tracing::warn!(error=?e, guild_id, "logs channel notice failed");
        }
        return;
    }

    // Best-effort recreation first; punishment is applied either way.
    let recreation = match resource {
        DeletedResource::Channel(c) if cfg.recreate_channels => {
            Some(match recreate::recreate_channel(api, guild_id, c).await {
                Ok(r) if r.overwrite_failures == 0 => format!("recreated as {}", r.new_id),
                Ok(r) => format!(
                    "recreated as {} ({} overwrite(s) not restored)",
                    r.new_id, r.overwrite_failures
                ),
                Err(e) => format!("recreation failed: {e}"),
            })
        }
        DeletedResource::Role(r) if cfg.recreate_roles => {
            Some(match recreate::recreate_role(api, guild_id, r).await {
                Ok(new_id) => format!("recreated as {new_id}"),
                Err(e) => format!("recreation failed: {e}"),
            })
        }
        _ => None,
    };

    let policy = match resource {
        DeletedResource::Channel(_) => cfg.channel_delete_punishment,
        DeletedResource::Role(_) => cfg.role_delete_punishment,
    };
    let reason = format!("security: deleted {kind} {label} without authorization");

    let punishment = match policy {
        Punishment::Ban => match api.ban(guild_id, actor_id, &reason).await {
            Ok(()) => "ban".to_string(),
            Err(e) => format!("ban failed: {e}"),
        },
        Punishment::RemoveRoles => {
            remove_roles_with_snapshot(api, ctx, guild_id, actor_id, &reason).await
        }
    };

    let title = format!("Suspicious action: {kind} deleted");
    let description = format!(
        "{label} deleted by <@{actor_id}> | punishment: {punishment}{}",
        recreation
            .as_deref()
            .map(|r| format!(" | {r}"))
            .unwrap_or_default()
    );
    ctx.store.push_log(guild_id, &title, &description).await;

    let mut notice = LogNotice::new(NoticeKind::Danger, &title, &description)
        .field("Deleted", format!("{label} ({})", resource.id()))
        .field("Actor", format!("<@{actor_id}> ({actor_id})"))
        .field("Punishment", &punishment);
    if let Some(r) = &recreation {
        notice = notice.field("Recreation", r);
    }
    if policy == Punishment::RemoveRoles {
        notice = notice.field("Reversal", "restore(actor) re-grants the removed roles");
    }
    if let Err(e) = api.send_notice(guild_id, &cfg.logs_channel, &notice).await {
        tracing::warn!(error=?e, guild_id, "logs channel notice failed");
    }
}

/// Strip the actor's roles, snapshotting them first so a crash between the
/// snapshot and the revoke never loses the reversal data.
async fn remove_roles_with_snapshot(
    api: &impl PlatformApi,
    ctx: &AppContext,
    guild_id: u64,
    actor_id: u64,
    reason: &str,
) -> String {
    let roles = match api.member_roles(guild_id, actor_id).await {
        Err(e) => return format!("role lookup failed: {e}"),
        Ok(None) => return "actor is no longer a member".to_string(),
        Ok(Some(roles)) => removable_roles(guild_id, roles),
    };
    if roles.is_empty() {
        return "actor held no removable roles".to_string();
    }

    ctx.store
        .put_restoration(
            actor_id,
            RestorationRecord {
                guild_id,
                roles: roles.clone(),
                reason: reason.to_string(),
                removed_at: Utc::now(),
            },
        )
        .await;

    match api.remove_roles(guild_id, actor_id, &roles, reason).await {
        Ok(()) => format!("removed {} role(s), reversible via restore", roles.len()),
        Err(e) => format!("role removal failed: {e}"),
    }
}
