use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use twilight_model::id::marker::{GuildMarker, UserMarker};
use twilight_model::id::Id;

use chatrelay::chat::orchestrator::{ConversationOrchestrator, GenerationDefaults};
use chatrelay::chat::rate_limit::RateLimiter;
use chatrelay::chat::store::{ConversationStore, Role};
use chatrelay::error::{Error, Result};
use chatrelay::llm::TextGenerator;
use chatrelay::settings::ModelSource;

const BOT_ID: u64 = 4242;

struct MockGenerator {
    reply: &'static str,
    fail: bool,
    calls: Mutex<Vec<(String, String)>>,
}

impl MockGenerator {
    fn replying(reply: &'static str) -> Arc<Self> {
        Arc::new(Self {
            reply,
            fail: false,
            calls: Mutex::new(Vec::new()),
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            reply: "",
            fail: true,
            calls: Mutex::new(Vec::new()),
        })
    }

    fn last_call(&self) -> (String, String) {
        self.calls.lock().unwrap().last().cloned().expect("generator was called")
    }
}

#[async_trait]
impl TextGenerator for MockGenerator {
    async fn generate(
        &self,
        prompt: &str,
        model_id: &str,
        _max_tokens: u32,
        _temperature: f32,
    ) -> Result<String> {
        self.calls
            .lock()
            .unwrap()
            .push((prompt.to_string(), model_id.to_string()));
        if self.fail {
            Err(Error::Generation("remote unavailable".into()))
        } else {
            Ok(self.reply.to_string())
        }
    }
}

struct FixedModel(&'static str);

#[async_trait]
impl ModelSource for FixedModel {
    async fn model_for(&self, _guild_id: Option<Id<GuildMarker>>) -> String {
        self.0.to_string()
    }
}

fn orchestrator(
    generator: Arc<MockGenerator>,
    store: Arc<ConversationStore>,
    max_requests: usize,
) -> ConversationOrchestrator {
    ConversationOrchestrator::new(
        RateLimiter::new(Duration::from_secs(60), max_requests),
        store,
        generator,
        Arc::new(FixedModel("test-model")),
        Id::new(BOT_ID),
        GenerationDefaults {
            max_tokens: 64,
            temperature: 0.7,
        },
    )
}

fn user(id: u64) -> Id<UserMarker> {
    Id::new(id)
}

#[tokio::test]
async fn replies_and_records_both_turns() {
    let store = Arc::new(ConversationStore::new(10));
    let generator = MockGenerator::replying("hi there!");
    let orchestrator = orchestrator(generator, store.clone(), 10);

    let reply = orchestrator
        .handle_message(user(1), None, "hello", false, Instant::now())
        .await
        .unwrap();

    assert_eq!(reply, "hi there!");
    let turns = store.snapshot(user(1));
    assert_eq!(turns.len(), 2);
    assert_eq!(turns[0].role, Role::User);
    assert_eq!(turns[0].content, "hello");
    assert_eq!(turns[1].role, Role::Assistant);
    assert_eq!(turns[1].content, "hi there!");
}

#[tokio::test]
async fn prompt_carries_transcript_instruction_and_cue() {
    let store = Arc::new(ConversationStore::new(10));
    let generator = MockGenerator::replying("I'm fine.");
    let orchestrator = orchestrator(generator.clone(), store, 10);

    let t0 = Instant::now();
    orchestrator
        .handle_message(user(1), None, "how are you", false, t0)
        .await
        .unwrap();
    orchestrator
        .handle_message(user(1), None, "glad you're fine", false, t0 + Duration::from_secs(1))
        .await
        .unwrap();

    let (prompt, model) = generator.last_call();
    assert_eq!(model, "test-model");
    assert_eq!(
        prompt,
        "User: how are you\nAI: I'm fine.\nUser: glad you're fine\n\n\
         Please respond in English.\n\nAI: "
    );
}

#[tokio::test]
async fn polish_message_gets_polish_instruction() {
    let store = Arc::new(ConversationStore::new(10));
    let generator = MockGenerator::replying("Dzień dobry!");
    let orchestrator = orchestrator(generator.clone(), store, 10);

    orchestrator
        .handle_message(user(1), None, "dzień dobry, jak się masz?", false, Instant::now())
        .await
        .unwrap();

    let (prompt, _) = generator.last_call();
    assert!(prompt.contains("Proszę odpowiadaj po polsku."));
}

#[tokio::test]
async fn strips_leading_mention_token() {
    let store = Arc::new(ConversationStore::new(10));
    let generator = MockGenerator::replying("hello!");
    let orchestrator = orchestrator(generator.clone(), store.clone(), 10);

    orchestrator
        .handle_message(user(1), None, &format!("<@{BOT_ID}> tell me a story"), true, Instant::now())
        .await
        .unwrap();

    assert_eq!(store.snapshot(user(1))[0].content, "tell me a story");
    let (prompt, _) = generator.last_call();
    assert!(prompt.starts_with("User: tell me a story\n"));
}

#[tokio::test]
async fn rate_limited_request_leaves_buffer_untouched() {
    let store = Arc::new(ConversationStore::new(10));
    let generator = MockGenerator::replying("reply");
    let orchestrator = orchestrator(generator, store.clone(), 1);

    let t0 = Instant::now();
    orchestrator
        .handle_message(user(1), None, "first", false, t0)
        .await
        .unwrap();

    let result = orchestrator
        .handle_message(user(1), None, "second", false, t0 + Duration::from_secs(1))
        .await;
    assert!(matches!(result, Err(Error::RateLimited)));

    // Only the first exchange made it into the conversation
    let turns = store.snapshot(user(1));
    assert_eq!(turns.len(), 2);
    assert_eq!(turns[0].content, "first");
}

#[tokio::test]
async fn rate_limit_is_per_user() {
    let store = Arc::new(ConversationStore::new(10));
    let generator = MockGenerator::replying("reply");
    let orchestrator = orchestrator(generator, store, 1);

    let t0 = Instant::now();
    orchestrator
        .handle_message(user(1), None, "from a", false, t0)
        .await
        .unwrap();
    assert!(matches!(
        orchestrator.handle_message(user(1), None, "again", false, t0).await,
        Err(Error::RateLimited)
    ));
    // A different user is unaffected by the first user's quota
    orchestrator
        .handle_message(user(2), None, "from b", false, t0)
        .await
        .unwrap();
}

#[tokio::test]
async fn quota_frees_up_after_the_window_slides() {
    let store = Arc::new(ConversationStore::new(10));
    let generator = MockGenerator::replying("reply");
    let orchestrator = orchestrator(generator, store, 2);

    let t0 = Instant::now();
    for offset in [0, 10] {
        orchestrator
            .handle_message(user(1), None, "hi", false, t0 + Duration::from_secs(offset))
            .await
            .unwrap();
    }
    assert!(matches!(
        orchestrator
            .handle_message(user(1), None, "hi", false, t0 + Duration::from_secs(20))
            .await,
        Err(Error::RateLimited)
    ));
    orchestrator
        .handle_message(user(1), None, "hi", false, t0 + Duration::from_secs(61))
        .await
        .unwrap();
}

#[tokio::test]
async fn generation_failure_keeps_user_turn_without_assistant_turn() {
    let store = Arc::new(ConversationStore::new(10));
    let generator = MockGenerator::failing();
    let orchestrator = orchestrator(generator, store.clone(), 10);

    let result = orchestrator
        .handle_message(user(1), None, "hello?", false, Instant::now())
        .await;
    assert!(matches!(result, Err(Error::Generation(_))));

    // The user turn stays; no assistant turn was appended
    let turns = store.snapshot(user(1));
    assert_eq!(turns.len(), 1);
    assert_eq!(turns[0].role, Role::User);
    assert_eq!(turns[0].content, "hello?");
}
