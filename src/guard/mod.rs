use std::sync::Arc;
use std::time::Duration;

use crate::AppContext;
use crate::platform::{AuditAction, PlatformApi};
use crate::store::{ChannelBackup, RoleBackup};

pub mod attribution;
pub mod punish;
pub mod recreate;
pub mod restore;

pub use punish::DeletedResource;

/// Deletion-response service: snapshot, wait for the audit trail, attribute,
/// punish or clear. One instance per process; every handler invocation is an
/// independent flow that suspends at the grace delay and at remote calls
/// without blocking the other flows.
pub struct Guard {
    ctx: Arc<AppContext>,
}

impl Guard {
    pub fn new(ctx: Arc<AppContext>) -> Arc<Self> {
        Arc::new(Self { ctx })
    }

    pub async fn on_channel_delete(&self, api: &impl PlatformApi, guild_id: u64, deleted: ChannelBackup) {
        let cfg = self.ctx.store.guild_config(guild_id).await;
        if !cfg.protection_enabled {
            return;
        }
        if cfg.backup_channels {
            self.ctx
                .store
                .push_channel_backup(guild_id, deleted.clone())
                .await;
        }
        self.handle_deletion(
            api,
            guild_id,
            AuditAction::ChannelDelete,
            deleted.id,
            DeletedResource::Channel(&deleted),
        )
        .await;
    }

    pub async fn on_role_delete(&self, api: &impl PlatformApi, guild_id: u64, deleted: RoleBackup) {
        let cfg = self.ctx.store.guild_config(guild_id).await;
        if !cfg.protection_enabled {
            return;
        }
        if cfg.backup_roles {
            self.ctx
                .store
                .push_role_backup(guild_id, deleted.clone())
                .await;
        }
        self.handle_deletion(
            api,
            guild_id,
            AuditAction::RoleDelete,
            deleted.id,
            DeletedResource::Role(&deleted),
        )
        .await;
    }

    async fn handle_deletion(
        &self,
        api: &impl PlatformApi,
        guild_id: u64,
        action: AuditAction,
        target_id: u64,
        resource: DeletedResource<'_>,
    ) {
        let grace = Duration::from_secs(self.ctx.settings.security.audit_grace_secs);
        let lookback = self.ctx.settings.security.audit_lookback;

        match attribution::find_executor(api, guild_id, action, target_id, grace, lookback).await {
            Ok(Some(actor_id)) => {
                punish::respond(api, &self.ctx, guild_id, actor_id, resource).await;
            }
            Ok(None) => {
                // Documented limitation: the trail may lag past the grace
                // window. Never guess an actor; widen the lookback or the
                // delay in settings instead.
                tracing::warn!(
                    guild_id,
                    target_id,
                    ?action,
                    "attribution miss: no matching audit entry within lookback"
                );
            }
            Err(e) => {
                tracing::warn!(error=?e, guild_id, target_id, "audit trail query failed");
            }
        }
    }
}
