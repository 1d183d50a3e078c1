//! Answers one incoming conversation message
//!
//! Composes the rate limiter, the conversation store, the text
//! generator and the per-guild model lookup. Holds no mutable state
//! of its own.

use std::sync::Arc;

use tokio::time::Instant;
use tracing::{debug, error, warn};
use twilight_model::id::marker::{GuildMarker, UserMarker};
use twilight_model::id::Id;

use crate::chat::rate_limit::RateLimiter;
use crate::chat::store::{ConversationStore, Role};
use crate::error::{Error, Result};
use crate::lang;
use crate::llm::TextGenerator;
use crate::settings::ModelSource;

/// Generation defaults applied to every request.
#[derive(Clone, Copy)]
pub struct GenerationDefaults {
    pub max_tokens: u32,
    pub temperature: f32,
}

pub struct ConversationOrchestrator {
    limiter: RateLimiter,
    store: Arc<ConversationStore>,
    generator: Arc<dyn TextGenerator>,
    models: Arc<dyn ModelSource>,
    bot_user_id: Id<UserMarker>,
    defaults: GenerationDefaults,
}

impl ConversationOrchestrator {
    pub fn new(
        limiter: RateLimiter,
        store: Arc<ConversationStore>,
        generator: Arc<dyn TextGenerator>,
        models: Arc<dyn ModelSource>,
        bot_user_id: Id<UserMarker>,
        defaults: GenerationDefaults,
    ) -> Self {
        Self {
            limiter,
            store,
            generator,
            models,
            bot_user_id,
            defaults,
        }
    }

    /// Handle one inbound message and produce the reply text.
    ///
    /// Returns `Error::RateLimited` without touching the conversation
    /// buffer when the user is over quota, and `Error::Generation`
    /// when the model call fails. A failed generation does not roll
    /// back the user turn appended in step 3; the conversation keeps
    /// the user's message so the next attempt has full context.
    pub async fn handle_message(
        &self,
        user_id: Id<UserMarker>,
        guild_id: Option<Id<GuildMarker>>,
        text: &str,
        is_mention: bool,
        now: Instant,
    ) -> Result<String> {
        if !self.limiter.allow(user_id, now) {
            warn!(user = %user_id, "rate limit exceeded");
            return Err(Error::RateLimited);
        }

        let content = if is_mention {
            self.strip_mention(text)
        } else {
            text.to_string()
        };

        self.store.append_user(user_id, &content, now);

        let prompt = self.build_prompt(user_id, &content);
        let model = self.models.model_for(guild_id).await;
        debug!(user = %user_id, model, "requesting generation");

        let reply = self
            .generator
            .generate(
                &prompt,
                &model,
                self.defaults.max_tokens,
                self.defaults.temperature,
            )
            .await
            .map_err(|e| {
                error!(user = %user_id, model, error = %e, "text generation failed");
                Error::Generation(e.to_string())
            })?;

        self.store.append_assistant(user_id, &reply)?;
        debug!(user = %user_id, "replied to conversation message");
        Ok(reply)
    }

    fn strip_mention(&self, text: &str) -> String {
        let plain = format!("<@{}>", self.bot_user_id);
        let nick = format!("<@!{}>", self.bot_user_id);
        text.replace(&plain, "").replace(&nick, "").trim().to_string()
    }

    /// Alternating `User:`/`AI:` transcript, a language instruction
    /// keyed off the latest user message, then the completion cue.
    fn build_prompt(&self, user_id: Id<UserMarker>, latest_user_message: &str) -> String {
        let mut prompt = String::new();
        for turn in self.store.snapshot(user_id) {
            let prefix = match turn.role {
                Role::User => "User: ",
                Role::Assistant => "AI: ",
            };
            prompt.push_str(prefix);
            prompt.push_str(&turn.content);
            prompt.push('\n');
        }
        prompt.push('\n');
        prompt.push_str(lang::instruction_for(latest_user_message));
        prompt.push_str("\n\nAI: ");
        prompt
    }
}
