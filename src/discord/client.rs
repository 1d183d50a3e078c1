use std::sync::Arc;

use async_trait::async_trait;
use twilight_http::Client;
use twilight_model::guild::Permissions;
use twilight_model::id::{
    marker::{ChannelMarker, GuildMarker, MessageMarker, RoleMarker, UserMarker},
    Id,
};

use crate::error::{Error, Result};

/// The Discord operations the bot needs, behind a trait so tests can
/// run against a mock instead of the live API.
#[async_trait]
pub trait DiscordInterface: Send + Sync {
    fn current_user_id(&self) -> Id<UserMarker>;
    async fn send_message(
        &self,
        channel_id: Id<ChannelMarker>,
        content: &str,
    ) -> Result<Id<MessageMarker>>;
    async fn reply_to(
        &self,
        channel_id: Id<ChannelMarker>,
        message_id: Id<MessageMarker>,
        content: &str,
    ) -> Result<Id<MessageMarker>>;
    async fn delete_message(
        &self,
        channel_id: Id<ChannelMarker>,
        message_id: Id<MessageMarker>,
    ) -> Result<()>;
    async fn trigger_typing(&self, channel_id: Id<ChannelMarker>) -> Result<()>;
    async fn member_permissions(
        &self,
        guild_id: Id<GuildMarker>,
        user_id: Id<UserMarker>,
        role_ids: &[Id<RoleMarker>],
    ) -> Result<Permissions>;
}

#[derive(Clone)]
pub struct DiscordClient {
    pub http: Arc<Client>,
    user_id: Id<UserMarker>,
}

impl DiscordClient {
    /// Build the HTTP client and resolve the bot's own user ID, which
    /// mention stripping and reply detection depend on.
    pub async fn connect(token: &str) -> Result<Self> {
        let http = Arc::new(Client::new(token.to_string()));
        let user = http
            .current_user()
            .await
            .map_err(|e| Error::Discord(e.to_string()))?
            .model()
            .await
            .map_err(|e| Error::Discord(e.to_string()))?;

        Ok(Self {
            http,
            user_id: user.id,
        })
    }
}

#[async_trait]
impl DiscordInterface for DiscordClient {
    fn current_user_id(&self) -> Id<UserMarker> {
        self.user_id
    }

    async fn send_message(
        &self,
        channel_id: Id<ChannelMarker>,
        content: &str,
    ) -> Result<Id<MessageMarker>> {
        let message = self
            .http
            .create_message(channel_id)
            .content(content)
            .await
            .map_err(|e| Error::Discord(e.to_string()))?
            .model()
            .await
            .map_err(|e| Error::Discord(e.to_string()))?;

        Ok(message.id)
    }

    async fn reply_to(
        &self,
        channel_id: Id<ChannelMarker>,
        message_id: Id<MessageMarker>,
        content: &str,
    ) -> Result<Id<MessageMarker>> {
        let message = self
            .http
            .create_message(channel_id)
            .reply(message_id)
            .content(content)
            .await
            .map_err(|e| Error::Discord(e.to_string()))?
            .model()
            .await
            .map_err(|e| Error::Discord(e.to_string()))?;

        Ok(message.id)
    }

    async fn delete_message(
        &self,
        channel_id: Id<ChannelMarker>,
        message_id: Id<MessageMarker>,
    ) -> Result<()> {
        self.http
            .delete_message(channel_id, message_id)
            .await
            .map_err(|e| Error::Discord(e.to_string()))?;
        Ok(())
    }

    async fn trigger_typing(&self, channel_id: Id<ChannelMarker>) -> Result<()> {
        self.http
            .create_typing_trigger(channel_id)
            .await
            .map_err(|e| Error::Discord(e.to_string()))?;
        Ok(())
    }

    /// Effective permissions from the member's roles plus @everyone;
    /// the guild owner implicitly has everything.
    async fn member_permissions(
        &self,
        guild_id: Id<GuildMarker>,
        user_id: Id<UserMarker>,
        role_ids: &[Id<RoleMarker>],
    ) -> Result<Permissions> {
        let guild = self
            .http
            .guild(guild_id)
            .await
            .map_err(|e| Error::Discord(e.to_string()))?
            .model()
            .await
            .map_err(|e| Error::Discord(e.to_string()))?;

        if guild.owner_id == user_id {
            return Ok(Permissions::all());
        }

        let roles = self
            .http
            .roles(guild_id)
            .await
            .map_err(|e| Error::Discord(e.to_string()))?
            .model()
            .await
            .map_err(|e| Error::Discord(e.to_string()))?;

        let everyone_id: Id<RoleMarker> = guild_id.cast();
        let mut permissions = Permissions::empty();
        for role in roles {
            if role.id == everyone_id || role_ids.contains(&role.id) {
                permissions |= role.permissions;
            }
        }

        Ok(permissions)
    }
}
