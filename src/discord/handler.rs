//! Gateway message dispatch: commands, permission gates, conversations

use std::sync::Arc;

use tokio::time::Instant;
use tracing::{error, info, warn};
use twilight_model::channel::Message;
use twilight_model::guild::Permissions;
use twilight_model::id::marker::GuildMarker;
use twilight_model::id::Id;

use crate::chat::orchestrator::ConversationOrchestrator;
use crate::chat::store::ConversationStore;
use crate::config::Config;
use crate::discord::client::DiscordInterface;
use crate::error::{Error, Result};
use crate::settings::{SettingsStore, KEY_ALLOWED_CHANNELS, KEY_ALLOWED_ROLES, KEY_MODEL, KEY_PREFIX};

pub const THINKING_MESSAGE: &str = "🤔 Thinking...";
pub const ERROR_MESSAGE: &str = "❌ Sorry, I encountered an error. Please try again later.";
pub const RATE_LIMITED_MESSAGE: &str =
    "⏳ You're sending too many requests. Please wait a moment before trying again.";
pub const NO_CONVERSATION_MESSAGE: &str = "❓ You don't have an active conversation.";
pub const CONVERSATION_ENDED_MESSAGE: &str = "✅ Conversation ended.";

pub struct MessageHandler {
    discord: Arc<dyn DiscordInterface>,
    orchestrator: ConversationOrchestrator,
    store: Arc<ConversationStore>,
    settings: Arc<SettingsStore>,
    config: Config,
}

impl MessageHandler {
    pub fn new(
        discord: Arc<dyn DiscordInterface>,
        orchestrator: ConversationOrchestrator,
        store: Arc<ConversationStore>,
        settings: Arc<SettingsStore>,
        config: Config,
    ) -> Self {
        Self {
            discord,
            orchestrator,
            store,
            settings,
            config,
        }
    }

    pub async fn on_message(&self, message: &Message) -> Result<()> {
        if message.author.bot {
            return Ok(());
        }

        let prefix = self.settings.prefix_for(message.guild_id).await?;
        if let Some(rest) = message.content.strip_prefix(&prefix) {
            return self.handle_command(message, rest).await;
        }

        let bot_id = self.discord.current_user_id();
        let is_mention = message.mentions.iter().any(|m| m.id == bot_id);
        let is_reply = message
            .referenced_message
            .as_deref()
            .is_some_and(|referenced| referenced.author.id == bot_id);

        if !(is_mention || is_reply) {
            return Ok(());
        }

        if let Some(guild_id) = message.guild_id {
            if !self.passes_guild_gate(guild_id, message).await? {
                return Ok(());
            }
        }

        self.relay_conversation(message, is_mention).await
    }

    /// Run the message through the orchestrator, bracketed by a typing
    /// indicator and a placeholder that is removed once the reply (or
    /// an error notice) is ready.
    async fn relay_conversation(&self, message: &Message, is_mention: bool) -> Result<()> {
        let _ = self.discord.trigger_typing(message.channel_id).await;
        let thinking = self
            .discord
            .send_message(message.channel_id, THINKING_MESSAGE)
            .await
            .ok();

        let result = self
            .orchestrator
            .handle_message(
                message.author.id,
                message.guild_id,
                &message.content,
                is_mention,
                Instant::now(),
            )
            .await;

        if let Some(thinking_id) = thinking {
            let _ = self
                .discord
                .delete_message(message.channel_id, thinking_id)
                .await;
        }

        match result {
            Ok(reply) => {
                self.discord
                    .reply_to(message.channel_id, message.id, &reply)
                    .await?;
            }
            Err(Error::RateLimited) => {
                self.discord
                    .send_message(message.channel_id, RATE_LIMITED_MESSAGE)
                    .await?;
            }
            Err(e) => {
                error!(user = %message.author.id, error = %e, "conversation failed");
                self.discord
                    .send_message(message.channel_id, ERROR_MESSAGE)
                    .await?;
            }
        }
        Ok(())
    }

    async fn handle_command(&self, message: &Message, rest: &str) -> Result<()> {
        let mut parts = rest.split_whitespace();
        let Some(command) = parts.next() else {
            return Ok(());
        };
        let args: Vec<&str> = parts.collect();

        match command {
            "chat" => self.cmd_chat(message).await,
            "end" => self.cmd_end(message).await,
            "help" => self.cmd_help(message).await,
            "admin" => self.cmd_admin(message, &args).await,
            // Unknown prefixed messages may belong to another bot
            _ => Ok(()),
        }
    }

    async fn cmd_chat(&self, message: &Message) -> Result<()> {
        self.store.start(message.author.id, Instant::now());
        info!(user = %message.author.id, "started conversation");

        let prefix = self.settings.prefix_for(message.guild_id).await?;
        let timeout_minutes = self.config.conversation_timeout.as_secs() / 60;
        let text = format!(
            "**New conversation started.** Mention me or reply to my messages to chat.\n\
             Your conversation times out after {timeout_minutes} minutes of inactivity.\n\
             Type `{prefix}end` to end it manually."
        );
        self.discord
            .send_message(message.channel_id, &text)
            .await?;
        Ok(())
    }

    async fn cmd_end(&self, message: &Message) -> Result<()> {
        let text = if self.store.end(message.author.id) {
            info!(user = %message.author.id, "ended conversation");
            CONVERSATION_ENDED_MESSAGE
        } else {
            NO_CONVERSATION_MESSAGE
        };
        self.discord.send_message(message.channel_id, text).await?;
        Ok(())
    }

    async fn cmd_help(&self, message: &Message) -> Result<()> {
        let prefix = self.settings.prefix_for(message.guild_id).await?;
        let text = format!(
            "**Commands**\n\
             `{prefix}chat` - start a fresh conversation\n\
             `{prefix}end` - end your conversation\n\
             `{prefix}admin` - server settings (admins only)\n\
             Mention me or reply to one of my messages to talk."
        );
        self.discord
            .send_message(message.channel_id, &text)
            .await?;
        Ok(())
    }

    async fn cmd_admin(&self, message: &Message, args: &[&str]) -> Result<()> {
        let Some(guild_id) = message.guild_id else {
            self.discord
                .send_message(
                    message.channel_id,
                    "❌ Admin commands can only be used in servers, not in DMs.",
                )
                .await?;
            return Ok(());
        };

        if !self.is_moderator(guild_id, message).await? {
            self.discord
                .send_message(
                    message.channel_id,
                    "❌ You need to be a server administrator to use this command.",
                )
                .await?;
            return Ok(());
        }

        let response = match args {
            [] | ["settings"] => self.admin_settings(guild_id).await?,
            ["model", "reset"] => {
                self.settings.unset(guild_id, KEY_MODEL).await?;
                format!(
                    "✅ Model reset to the default `{}`.",
                    self.settings.default_model()
                )
            }
            ["model", model_id] => {
                self.settings
                    .set(guild_id, KEY_MODEL, &serde_json::Value::String(model_id.to_string()))
                    .await?;
                format!("✅ AI model set to `{model_id}`.")
            }
            ["prefix", prefix] => {
                self.settings
                    .set(guild_id, KEY_PREFIX, &serde_json::Value::String(prefix.to_string()))
                    .await?;
                format!("✅ Command prefix set to `{prefix}`.")
            }
            ["allowchannel", channel] => {
                self.update_id_list(guild_id, KEY_ALLOWED_CHANNELS, *channel, parse_channel_mention, true)
                    .await?
            }
            ["denychannel", channel] => {
                self.update_id_list(guild_id, KEY_ALLOWED_CHANNELS, *channel, parse_channel_mention, false)
                    .await?
            }
            ["allowrole", role] => {
                self.update_id_list(guild_id, KEY_ALLOWED_ROLES, *role, parse_role_mention, true)
                    .await?
            }
            ["denyrole", role] => {
                self.update_id_list(guild_id, KEY_ALLOWED_ROLES, *role, parse_role_mention, false)
                    .await?
            }
            ["reset"] => {
                self.settings.reset(guild_id).await?;
                "✅ Server settings reset to defaults.".to_string()
            }
            _ => "❌ Unknown admin command. Try `settings`, `model`, `prefix`, \
                  `allowchannel`, `denychannel`, `allowrole`, `denyrole` or `reset`."
                .to_string(),
        };

        self.discord
            .send_message(message.channel_id, &response)
            .await?;
        Ok(())
    }

    async fn admin_settings(&self, guild_id: Id<GuildMarker>) -> Result<String> {
        let prefix = self.settings.prefix_for(Some(guild_id)).await?;
        let model = self
            .settings
            .model_setting(guild_id)
            .await?
            .unwrap_or_else(|| self.settings.default_model().to_string());
        let channels = self.settings.allowed_channels(guild_id).await?;
        let roles = self.settings.allowed_roles(guild_id).await?;

        let channels_str = if channels.is_empty() {
            "All channels allowed".to_string()
        } else {
            channels
                .iter()
                .map(|id| format!("<#{id}>"))
                .collect::<Vec<_>>()
                .join(", ")
        };
        let roles_str = if roles.is_empty() {
            "All roles allowed".to_string()
        } else {
            roles
                .iter()
                .map(|id| format!("<@&{id}>"))
                .collect::<Vec<_>>()
                .join(", ")
        };

        Ok(format!(
            "**Server Settings**\n\
             Prefix: `{prefix}`\n\
             AI Model: `{model}`\n\
             Allowed Channels: {channels_str}\n\
             Allowed Roles: {roles_str}"
        ))
    }

    async fn update_id_list(
        &self,
        guild_id: Id<GuildMarker>,
        key: &str,
        raw: &str,
        parse: fn(&str) -> Option<u64>,
        add: bool,
    ) -> Result<String> {
        let Some(id) = parse(raw) else {
            return Ok(format!("❌ `{raw}` is not a valid mention."));
        };
        if add {
            self.settings.add_to_list(guild_id, key, id).await?;
            Ok(format!("✅ Added {raw} to the allow list."))
        } else {
            self.settings.remove_from_list(guild_id, key, id).await?;
            Ok(format!("✅ Removed {raw} from the allow list."))
        }
    }

    /// Messages in guilds must come from an allowed channel and, when
    /// a role list is configured, from a member holding one of the
    /// allowed roles. Empty lists allow everything.
    async fn passes_guild_gate(&self, guild_id: Id<GuildMarker>, message: &Message) -> Result<bool> {
        let allowed_channels = self.settings.allowed_channels(guild_id).await?;
        if !allowed_channels.is_empty() && !allowed_channels.contains(&message.channel_id.get()) {
            return Ok(false);
        }

        let allowed_roles = self.settings.allowed_roles(guild_id).await?;
        if allowed_roles.is_empty() {
            return Ok(true);
        }
        let member_roles = message
            .member
            .as_ref()
            .map(|m| m.roles.as_slice())
            .unwrap_or_default();
        Ok(member_roles
            .iter()
            .any(|role| allowed_roles.contains(&role.get())))
    }

    async fn is_moderator(&self, guild_id: Id<GuildMarker>, message: &Message) -> Result<bool> {
        let role_ids = message
            .member
            .as_ref()
            .map(|m| m.roles.clone())
            .unwrap_or_default();
        let permissions = match self
            .discord
            .member_permissions(guild_id, message.author.id, &role_ids)
            .await
        {
            Ok(permissions) => permissions,
            Err(e) => {
                warn!(guild = %guild_id, error = %e, "permission lookup failed");
                return Ok(false);
            }
        };
        Ok(permissions.intersects(Permissions::ADMINISTRATOR | Permissions::MANAGE_GUILD))
    }
}

fn parse_channel_mention(raw: &str) -> Option<u64> {
    raw.strip_prefix("<#")?.strip_suffix('>')?.parse().ok()
}

fn parse_role_mention(raw: &str) -> Option<u64> {
    raw.strip_prefix("<@&")?.strip_suffix('>')?.parse().ok()
}
