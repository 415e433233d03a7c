use anyhow::Result;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    pub env: String,
    pub app: App,
    pub discord: Discord,
    pub logging: Logging,
    pub security: Security,
    pub keepalive: Keepalive,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct App {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Discord {
    pub token: String,
    pub app_id: Option<String>,
    pub intents: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Logging {
    pub json: Option<bool>,
    pub level: Option<String>,
}

/// Process-level knobs of the protection engine. Per-guild policy lives in
/// the persisted document, not here.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Security {
    /// Path of the consolidated JSON document.
    pub data_file: String,
    /// Seconds to wait before querying the audit log after a deletion.
    /// The audit trail is eventually consistent; this is the catch-up window.
    pub audit_grace_secs: u64,
    /// How many most-recent audit entries to scan for the matching target.
    pub audit_lookback: u8,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Keepalive {
    pub enabled: bool,
    pub port: u16,
}

impl Settings {
    pub fn load() -> Result<Self> {
        let env = std::env::var("AGS_ENV").unwrap_or_else(|_| "development".to_string());

        // Load .env.<env> and .env when present
        let _ = dotenvy::from_filename(format!(".env.{}", env));
        let _ = dotenvy::dotenv();

        let defaults = Settings {
            env: env.clone(),
            app: App {
                name: "Aegis Security".into(),
            },
            discord: Discord {
                token: "".into(),
                app_id: None,
                intents: vec![
                    "GUILDS".into(),
                    "GUILD_MEMBERS".into(),
                    "GUILD_MESSAGES".into(),
                    "MESSAGE_CONTENT".into(),
                ],
            },
            logging: Logging {
                json: Some(false),
                level: Some("info".into()),
            },
            security: Security {
                data_file: "security_data.json".into(),
                audit_grace_secs: 2,
                audit_lookback: 1,
            },
            keepalive: Keepalive {
                enabled: true,
                port: 8080,
            },
        };

        // Layers: defaults -> TOML file -> AGS_* environment variables
        let figment = Figment::from(Serialized::defaults(defaults))
            .merge(Toml::file(format!("config/{}.toml", env)))
            // AGS_DISCORD_TOKEN => discord.token etc.
            .merge(Env::prefixed("AGS_").split("_"));

        let mut s: Settings = figment.extract()?;
        s.env = env;

        if s.security.audit_lookback == 0 {
            s.security.audit_lookback = 1;
        }

        Ok(s)
    }

    /// Settings for tests: no token, no data file, zero grace delay.
    pub fn for_tests() -> Self {
        Settings {
            env: "test".into(),
            app: App {
                name: "test".into(),
            },
            discord: Discord {
                token: String::new(),
                app_id: None,
                intents: vec![],
            },
            logging: Logging {
                json: Some(false),
                level: Some("info".into()),
            },
            security: Security {
                data_file: String::new(),
                audit_grace_secs: 0,
                audit_lookback: 1,
            },
            keepalive: Keepalive {
                enabled: false,
                port: 0,
            },
        }
    }
}
