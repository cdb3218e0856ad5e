use async_trait::async_trait;
use futures::stream::BoxStream;
use replybot_core::{Community, CoreError, FeedItem, Identity, ItemKind};

/// Endless sequence of new items. An `Err` is always the last element.
pub type ItemStream = BoxStream<'static, Result<FeedItem, CoreError>>;

/// The forum operations the bot relies on.
#[async_trait]
pub trait FeedProvider: Send + Sync {
    /// Logs in and returns the account the bot acts as.
    async fn authenticate(&self) -> Result<Identity, CoreError>;

    async fn resolve_community(&self, name: &str) -> Result<Community, CoreError>;

    /// Starts watching one listing of `community`.
    fn subscribe(&self, community: &Community, kind: ItemKind, skip_existing: bool) -> ItemStream;

    async fn reply(&self, item: &FeedItem, text: &str) -> Result<(), CoreError>;
}
