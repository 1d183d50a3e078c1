use std::env;
use std::time::Duration;

#[derive(Clone)]
pub struct Config {
    pub discord_bot_token: String,
    pub huggingface_api_key: Option<String>,
    pub database_url: String,
    pub command_prefix: String,
    pub model_id: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub max_history_turns: usize,
    pub conversation_timeout: Duration,
    pub rate_limit_user: usize,
    pub rate_limit_window: Duration,
    pub sweep_interval: Duration,
    pub generation_timeout: Duration,
    pub host: String,
    pub port: u16,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            discord_bot_token: env::var("DISCORD_BOT_TOKEN").expect("DISCORD_BOT_TOKEN required"),
            huggingface_api_key: env::var("HUGGINGFACE_API_KEY")
                .or_else(|_| env::var("PLLUM_API_KEY"))
                .ok(),
            database_url: env::var("DATABASE_URL").expect("DATABASE_URL required"),
            command_prefix: env::var("COMMAND_PREFIX").unwrap_or_else(|_| "!".into()),
            model_id: env::var("PLLUM_MODEL_ID")
                .unwrap_or_else(|_| "mistralai/Mistral-7B-Instruct-v0.2".into()),
            max_tokens: env::var("PLLUM_MAX_TOKENS")
                .unwrap_or_else(|_| "1024".into())
                .parse()
                .unwrap_or(1024),
            temperature: env::var("PLLUM_TEMPERATURE")
                .unwrap_or_else(|_| "0.7".into())
                .parse()
                .unwrap_or(0.7),
            max_history_turns: env::var("MAX_HISTORY_LENGTH")
                .unwrap_or_else(|_| "10".into())
                .parse()
                .unwrap_or(10),
            conversation_timeout: duration_var("CONVERSATION_TIMEOUT", 600),
            rate_limit_user: env::var("RATE_LIMIT_USER")
                .unwrap_or_else(|_| "10".into())
                .parse()
                .unwrap_or(10),
            rate_limit_window: duration_var("RATE_LIMIT_WINDOW", 60),
            sweep_interval: duration_var("SWEEP_INTERVAL", 60),
            generation_timeout: duration_var("GENERATION_TIMEOUT", 120),
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "3000".into())
                .parse()
                .unwrap_or(3000),
        }
    }
}

fn duration_var(name: &str, default_secs: u64) -> Duration {
    let secs = env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default_secs);
    Duration::from_secs(secs)
}
