use crate::AppContext;
use crate::error::GuardError;
use crate::platform::{LogNotice, NoticeKind, PlatformApi};

/// Roles actually re-granted by a successful restore.
#[derive(Debug, Clone)]
pub struct Restored {
    pub guild_id: u64,
    pub granted: Vec<u64>,
    pub dropped: Vec<u64>,
}

/// Reverse a remove-roles punishment. Single-use: the record is taken out of
/// the store up front and only re-inserted when the reversal could not be
/// applied, so two concurrent calls cannot both grant, and a second call
/// after success gets NotFound. Stored role ids that no longer resolve in
/// the guild are dropped silently.
pub async fn restore(
    api: &impl PlatformApi,
    ctx: &AppContext,
    actor_id: u64,
    moderator_id: u64,
) -> Result<Restored, GuardError> {
    let record = ctx
        .store
        .take_restoration(actor_id)
        .await
        .ok_or_else(|| GuardError::not_found("no restoration record for this user"))?;
    let guild_id = record.guild_id;

    // Helper: put the record back before surfacing a failure, so the
    // reversal data survives for a retry.
    macro_rules! bail_keep {
        ($err:expr) => {{
            ctx.store.put_restoration(actor_id, record.clone()).await;
            return Err($err);
        }};
    }

    match api.member_roles(guild_id, actor_id).await {
        Err(e) => bail_keep!(GuardError::remote(e)),
        Ok(None) => bail_keep!(GuardError::not_found("user is no longer a member")),
        Ok(Some(_)) => {}
    }

    let existing = match api.guild_role_ids(guild_id).await {
        Err(e) => bail_keep!(GuardError::remote(e)),
        Ok(ids) => ids,
    };

    let (granted, dropped): (Vec<u64>, Vec<u64>) = record
        .roles
        .iter()
        .copied()
        .partition(|r| existing.contains(r));
    if granted.is_empty() {
        bail_keep!(GuardError::not_found("none of the stored roles still exist"));
    }

    let reason = format!("manual restoration by moderator {moderator_id}");
    if let Err(e) = api.add_roles(guild_id, actor_id, &granted, &reason).await {
        bail_keep!(GuardError::remote(e));
    }

    let title = "Roles restored".to_string();
    let description = format!(
        "re-granted {} role(s) to <@{actor_id}> (moderator <@{moderator_id}>){}",
        granted.len(),
        if dropped.is_empty() {
            String::new()
        } else {
            format!("; {} stored role(s) no longer exist", dropped.len())
        }
    );
    ctx.store.push_log(guild_id, &title, &description).await;

    let cfg = ctx.store.guild_config(guild_id).await;
    let notice = LogNotice::new(NoticeKind::Success, &title, &description)
        .field("User", format!("<@{actor_id}>"))
        .field("Restored by", format!("<@{moderator_id}>"))
        .field("Originally removed for", record.reason.clone());
    if let Err(e) = api.send_notice(guild_id, &cfg.logs_channel, &notice).await {
        tracing::warn!(error=?e, guild_id, "logs channel notice failed");
    }

    Ok(Restored {
        guild_id,
        granted,
        dropped,
    })
}
