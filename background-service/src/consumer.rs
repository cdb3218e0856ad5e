//! One listing's filter, generate and reply loop.

use crate::session::SessionConfig;
use futures::StreamExt;
use llm_interface::TextGenerator;
use reddit_client::{FeedProvider, ItemStream};
use replybot_core::{CoreError, FeedItem, Identity, ItemKind};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// What happened to a single item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutcome {
    /// Filtered out before generation.
    Rejected,
    /// Generation came back empty and nothing was posted.
    Skipped,
    Replied {
        /// The apology was posted instead of a completion.
        fallback: bool,
    },
    ReplyFailed,
}

pub struct StreamConsumer {
    kind: ItemKind,
    feed: Arc<dyn FeedProvider>,
    generator: Arc<dyn TextGenerator>,
    identity: Arc<Identity>,
    config: Arc<SessionConfig>,
}

impl StreamConsumer {
    pub fn new(
        kind: ItemKind,
        feed: Arc<dyn FeedProvider>,
        generator: Arc<dyn TextGenerator>,
        identity: Arc<Identity>,
        config: Arc<SessionConfig>,
    ) -> Self {
        Self {
            kind,
            feed,
            generator,
            identity,
            config,
        }
    }

    /// Drains `stream` one item at a time. Returns the first stream error.
    pub async fn run(self, mut stream: ItemStream) -> Result<(), CoreError> {
        info!("Watching {}s", self.kind.label().to_lowercase());
        let mut replied = 0u64;

        while let Some(next) = stream.next().await {
            let item = match next {
                Ok(item) => item,
                Err(e) => {
                    error!("{} stream stopped after {} replies: {}", self.kind, replied, e);
                    return Err(e);
                }
            };
            if let ItemOutcome::Replied { .. } = self.process_item(&item).await {
                replied += 1;
            }
        }

        info!("{} stream ended after {} replies", self.kind, replied);
        Ok(())
    }

    pub async fn process_item(&self, item: &FeedItem) -> ItemOutcome {
        if !self.config.filter.is_eligible(item, &self.identity) {
            debug!("Ignoring {} {} by {}", self.kind, item.id, item.author_name());
            return ItemOutcome::Rejected;
        }

        let generated = self.generator.generate(&item.lowercased_body()).await;
        let fallback = generated.is_none();
        let Some(text) = self.config.reply_policy.compose(generated) else {
            debug!("No completion for {} {}, not replying", self.kind, item.id);
            return ItemOutcome::Skipped;
        };

        let started = Instant::now();
        if let Err(e) = self.feed.reply(item, &text).await {
            warn!("Could not reply to {} {}: {}", self.kind, item.id, e);
            return ItemOutcome::ReplyFailed;
        }

        info!(
            "Replied to {} by: {} ({:.2}s)",
            self.kind,
            item.author_name(),
            started.elapsed().as_secs_f64()
        );
        tokio::time::sleep(self.config.reply_pause).await;

        ItemOutcome::Replied { fallback }
    }
}
