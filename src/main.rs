use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use twilight_gateway::{Event, EventTypeFlags, Intents, Shard, ShardId, StreamExt as _};

use chatrelay::chat::orchestrator::{ConversationOrchestrator, GenerationDefaults};
use chatrelay::chat::rate_limit::RateLimiter;
use chatrelay::chat::reaper::SessionReaper;
use chatrelay::chat::store::ConversationStore;
use chatrelay::config::Config;
use chatrelay::discord::client::{DiscordClient, DiscordInterface};
use chatrelay::discord::handler::MessageHandler;
use chatrelay::llm::PllumClient;
use chatrelay::settings::{self, SettingsStore};

const VERSION: &str = chatrelay::VERSION;

fn print_banner(addr: &SocketAddr) {
    let display_host = if addr.ip().is_unspecified() {
        "localhost"
    } else {
        &addr.ip().to_string()
    };
    println!();
    println!("  \x1b[36m╔══════════════════════════════════════════╗\x1b[0m");
    println!("  \x1b[36m║\x1b[0m  \x1b[1;35m⚡ chatrelay\x1b[0m                            \x1b[36m║\x1b[0m");
    println!("  \x1b[36m║\x1b[0m  \x1b[90mDiscord → PLLuM\x1b[0m                         \x1b[36m║\x1b[0m");
    println!("  \x1b[36m╚══════════════════════════════════════════╝\x1b[0m");
    println!();
    println!(
        "  \x1b[32m→\x1b[0m Status page at \x1b[1;4mhttp://{}:{}\x1b[0m",
        display_host,
        addr.port()
    );
    println!("  \x1b[32m→\x1b[0m Version: \x1b[33m{}\x1b[0m", VERSION);
    println!();
    println!("  \x1b[90mPress Ctrl+C to stop\x1b[0m");
    println!();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = Config::from_env();

    let pool = settings::create_pool(&config.database_url).await?;
    let store = Arc::new(SettingsStore::new(
        pool,
        config.command_prefix.clone(),
        config.model_id.clone(),
    ));
    store.init().await?;

    let discord = Arc::new(DiscordClient::connect(&config.discord_bot_token).await?);
    info!(bot_user = %discord.current_user_id(), "connected to discord");

    let conversations = Arc::new(ConversationStore::new(config.max_history_turns));
    let reaper = SessionReaper::spawn(
        conversations.clone(),
        config.sweep_interval,
        config.conversation_timeout,
    );

    let generator = Arc::new(PllumClient::new(
        config.huggingface_api_key.clone(),
        config.generation_timeout,
    ));
    let orchestrator = ConversationOrchestrator::new(
        RateLimiter::new(config.rate_limit_window, config.rate_limit_user),
        conversations.clone(),
        generator,
        store.clone(),
        discord.current_user_id(),
        GenerationDefaults {
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        },
    );

    let handler = MessageHandler::new(
        discord.clone(),
        orchestrator,
        conversations,
        store,
        config.clone(),
    );

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, chatrelay::status_app()).await {
            error!(error = %e, "status server exited");
        }
    });

    print_banner(&addr);

    let intents = Intents::GUILD_MESSAGES | Intents::DIRECT_MESSAGES | Intents::MESSAGE_CONTENT;
    let mut shard = Shard::new(ShardId::ONE, config.discord_bot_token.clone(), intents);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                break;
            }
            item = shard.next_event(EventTypeFlags::all()) => {
                let Some(item) = item else { break };
                let event = match item {
                    Ok(event) => event,
                    Err(source) => {
                        warn!(error = %source, "failed to receive gateway event");
                        continue;
                    }
                };
                match event {
                    Event::Ready(_) => info!("gateway session ready"),
                    Event::MessageCreate(message) => {
                        if let Err(e) = handler.on_message(&message).await {
                            error!(error = %e, "failed to handle message");
                        }
                    }
                    _ => {}
                }
            }
        }
    }

    reaper.shutdown().await;

    Ok(())
}
