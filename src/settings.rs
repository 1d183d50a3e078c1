//! Per-guild settings persisted in Postgres
//!
//! A flat key/value table keyed by guild: custom prefix, selected
//! model, allowed channel and role lists. Values are stored as JSON
//! text so list- and string-valued settings share one schema.

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::warn;
use twilight_model::id::marker::GuildMarker;
use twilight_model::id::Id;

use crate::error::Result;

pub const KEY_PREFIX: &str = "prefix";
pub const KEY_MODEL: &str = "model";
pub const KEY_ALLOWED_CHANNELS: &str = "allowed_channels";
pub const KEY_ALLOWED_ROLES: &str = "allowed_roles";

pub async fn create_pool(database_url: &str) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await?;
    Ok(pool)
}

/// Looks up which model to use for a guild; the settings store is the
/// real implementation, tests inject a fixed one.
#[async_trait]
pub trait ModelSource: Send + Sync {
    async fn model_for(&self, guild_id: Option<Id<GuildMarker>>) -> String;
}

#[derive(Clone)]
pub struct SettingsStore {
    pool: PgPool,
    default_prefix: String,
    default_model: String,
}

impl SettingsStore {
    pub fn new(pool: PgPool, default_prefix: String, default_model: String) -> Self {
        Self {
            pool,
            default_prefix,
            default_model,
        }
    }

    /// Create the settings table if this is a fresh database.
    pub async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS guild_settings (
                guild_id TEXT NOT NULL,
                key TEXT NOT NULL,
                value TEXT NOT NULL,
                PRIMARY KEY (guild_id, key)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get(
        &self,
        guild_id: Id<GuildMarker>,
        key: &str,
    ) -> Result<Option<serde_json::Value>> {
        let raw = sqlx::query_scalar::<_, String>(
            "SELECT value FROM guild_settings WHERE guild_id = $1 AND key = $2",
        )
        .bind(guild_id.to_string())
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        match raw {
            None => Ok(None),
            Some(raw) => match serde_json::from_str(&raw) {
                Ok(value) => Ok(Some(value)),
                Err(e) => {
                    warn!(guild = %guild_id, key, error = %e, "dropping unparseable setting");
                    Ok(None)
                }
            },
        }
    }

    pub async fn set(
        &self,
        guild_id: Id<GuildMarker>,
        key: &str,
        value: &serde_json::Value,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO guild_settings (guild_id, key, value)
            VALUES ($1, $2, $3)
            ON CONFLICT (guild_id, key) DO UPDATE SET value = EXCLUDED.value
            "#,
        )
        .bind(guild_id.to_string())
        .bind(key)
        .bind(value.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn unset(&self, guild_id: Id<GuildMarker>, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM guild_settings WHERE guild_id = $1 AND key = $2")
            .bind(guild_id.to_string())
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Remove every setting for the guild.
    pub async fn reset(&self, guild_id: Id<GuildMarker>) -> Result<()> {
        sqlx::query("DELETE FROM guild_settings WHERE guild_id = $1")
            .bind(guild_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Command prefix for the guild, or the global default (also used
    /// in DMs, where there is no guild).
    pub async fn prefix_for(&self, guild_id: Option<Id<GuildMarker>>) -> Result<String> {
        let Some(guild_id) = guild_id else {
            return Ok(self.default_prefix.clone());
        };
        let prefix = self
            .get(guild_id, KEY_PREFIX)
            .await?
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_else(|| self.default_prefix.clone());
        Ok(prefix)
    }

    pub async fn model_setting(&self, guild_id: Id<GuildMarker>) -> Result<Option<String>> {
        Ok(self
            .get(guild_id, KEY_MODEL)
            .await?
            .and_then(|v| v.as_str().map(str::to_string)))
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    pub async fn allowed_channels(&self, guild_id: Id<GuildMarker>) -> Result<Vec<u64>> {
        self.id_list(guild_id, KEY_ALLOWED_CHANNELS).await
    }

    pub async fn allowed_roles(&self, guild_id: Id<GuildMarker>) -> Result<Vec<u64>> {
        self.id_list(guild_id, KEY_ALLOWED_ROLES).await
    }

    pub async fn add_to_list(&self, guild_id: Id<GuildMarker>, key: &str, id: u64) -> Result<()> {
        let mut ids = self.id_list(guild_id, key).await?;
        if !ids.contains(&id) {
            ids.push(id);
        }
        self.store_id_list(guild_id, key, &ids).await
    }

    pub async fn remove_from_list(
        &self,
        guild_id: Id<GuildMarker>,
        key: &str,
        id: u64,
    ) -> Result<()> {
        let mut ids = self.id_list(guild_id, key).await?;
        ids.retain(|&existing| existing != id);
        self.store_id_list(guild_id, key, &ids).await
    }

    async fn id_list(&self, guild_id: Id<GuildMarker>, key: &str) -> Result<Vec<u64>> {
        let ids = self
            .get(guild_id, key)
            .await?
            .and_then(|v| {
                v.as_array().map(|entries| {
                    entries
                        .iter()
                        .filter_map(|entry| entry.as_str().and_then(|s| s.parse().ok()))
                        .collect()
                })
            })
            .unwrap_or_default();
        Ok(ids)
    }

    async fn store_id_list(
        &self,
        guild_id: Id<GuildMarker>,
        key: &str,
        ids: &[u64],
    ) -> Result<()> {
        let value = serde_json::Value::Array(
            ids.iter()
                .map(|id| serde_json::Value::String(id.to_string()))
                .collect(),
        );
        self.set(guild_id, key, &value).await
    }
}

#[async_trait]
impl ModelSource for SettingsStore {
    async fn model_for(&self, guild_id: Option<Id<GuildMarker>>) -> String {
        let Some(guild_id) = guild_id else {
            return self.default_model.clone();
        };
        match self.model_setting(guild_id).await {
            Ok(Some(model)) => model,
            Ok(None) => self.default_model.clone(),
            Err(e) => {
                warn!(guild = %guild_id, error = %e, "settings lookup failed, using default model");
                self.default_model.clone()
            }
        }
    }
}
