pub mod openai;

pub use openai::*;

use async_trait::async_trait;

/// Produces reply text for a piece of user content.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// `None` when nothing usable came back. Failures are logged, never raised.
    async fn generate(&self, prompt_seed: &str) -> Option<String>;
}
