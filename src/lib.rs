// src/lib.rs

pub mod chatguard;
pub mod config;
pub mod discord;
pub mod error;
pub mod guard;
pub mod joinguard;
pub mod keepalive;
pub mod logging;
pub mod mute;
pub mod platform;
pub mod store;
pub mod warn;

use anyhow::Result;
use once_cell::sync::OnceCell;
use std::sync::Arc;

use config::Settings;
use store::Store;

use serenity::all::GatewayIntents;

/// Global application context: settings, the persisted document store, and
/// the long-lived services wired into OnceCells.
pub struct AppContext {
    pub settings: Settings,
    pub store: Store,
    guard: OnceCell<Arc<guard::Guard>>,
    chatguard: OnceCell<Arc<chatguard::ChatGuard>>,
}

impl AppContext {
    /// Bootstrap the whole application:
    /// - logging
    /// - load the persisted document + start its writer task
    /// - wire the Guard and ChatGuard services
    pub async fn bootstrap(settings: Settings) -> Result<Arc<Self>> {
        logging::init(&settings);

        let store = Store::open(&settings.security.data_file).await?;

        Ok(Self::assemble(settings, store))
    }

    /// Wire services into a fresh context. `bootstrap` goes through here;
    /// tests call it directly with `Store::in_memory()`.
    pub fn assemble(settings: Settings, store: Store) -> Arc<Self> {
        let ctx = Arc::new(Self {
            settings,
            store,
            guard: OnceCell::new(),
            chatguard: OnceCell::new(),
        });

        let g = guard::Guard::new(ctx.clone());
        let _ = ctx.guard.set(g); // set() only works once

        let cg = chatguard::ChatGuard::new(ctx.clone());
        let _ = ctx.chatguard.set(cg);

        ctx
    }

    pub fn guard(&self) -> Arc<guard::Guard> {
        self.guard.get().expect("Guard not initialized").clone()
    }

    pub fn chatguard(&self) -> Arc<chatguard::ChatGuard> {
        self.chatguard
            .get()
            .expect("ChatGuard not initialized")
            .clone()
    }
}

/// Intents the client needs: guilds and members for deletions and joins,
/// message content for the abuse detectors.
pub fn default_gateway_intents() -> GatewayIntents {
    GatewayIntents::GUILDS
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT
        | GatewayIntents::GUILD_MEMBERS
}

/// Start the keepalive endpoint (when enabled) and the Discord client.
pub async fn run(ctx: Arc<AppContext>) -> Result<()> {
    if ctx.settings.keepalive.enabled {
        let port = ctx.settings.keepalive.port;
        tokio::spawn(async move {
            if let Err(e) = keepalive::serve(port).await {
                tracing::warn!(error=?e, "keepalive endpoint failed");
            }
        });
    }

    discord::run_bot(ctx).await
}
