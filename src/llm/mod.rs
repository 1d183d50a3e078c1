pub mod client;
pub mod prompt;

pub use client::PllumClient;

use async_trait::async_trait;

use crate::error::Result;

/// Remote text generation, injected into the orchestrator so tests
/// can substitute a mock.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(
        &self,
        prompt: &str,
        model_id: &str,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<String>;
}
