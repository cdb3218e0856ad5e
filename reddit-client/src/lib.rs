pub mod api;
pub mod auth;
pub mod backoff;
pub mod provider;
pub mod rate_limiter;
pub mod stream;


pub use api::*;
pub use auth::*;
pub use backoff::*;
pub use provider::*;
pub use rate_limiter::*;
pub use stream::*;

use async_trait::async_trait;
use replybot_core::{Community, CoreError, FeedItem, Identity, ItemKind};
use std::sync::Arc;
use tracing::{debug, info};

/// Reddit access for a script app: one account, one shared token, one shared rate limit.
#[derive(Clone)]
pub struct RedditClient {
    auth: Arc<Authenticator>,
    api: Arc<RedditApiClient>,
}

impl RedditClient {
    pub fn new(config: RedditOAuth2Config) -> Result<Self, CoreError> {
        let api = RedditApiClient::new(&config.user_agent)?;
        Self::with_api(config, api)
    }

    /// Builds a client around an already configured API client.
    pub fn with_api(config: RedditOAuth2Config, api: RedditApiClient) -> Result<Self, CoreError> {
        let auth = Authenticator::new(config, api.http_client().clone())?;
        Ok(Self {
            auth: Arc::new(auth),
            api: Arc::new(api),
        })
    }

    #[cfg(test)]
    pub(crate) async fn set_token(&self, token: RedditToken) {
        self.auth.set_token(token).await;
    }

    /// One listing page, newest first.
    pub async fn fetch_newest(
        &self,
        subreddit: &str,
        kind: ItemKind,
        limit: u32,
        before: Option<&str>,
    ) -> Result<Vec<FeedItem>, CoreError> {
        let token = self.auth.access_token().await?;
        self.api
            .get_newest_items(&token, subreddit, kind, limit, before)
            .await
    }

    pub fn stream(&self, subreddit: &str, kind: ItemKind, skip_existing: bool) -> ItemStream {
        let client = self.clone();
        let subreddit = subreddit.to_string();
        let fetch = move |limit: u32, before: Option<String>| {
            let client = client.clone();
            let subreddit = subreddit.clone();
            async move {
                client
                    .fetch_newest(&subreddit, kind, limit, before.as_deref())
                    .await
            }
        };
        poll_listing(fetch, skip_existing, PollBackoff::reddit())
    }
}

#[async_trait]
impl FeedProvider for RedditClient {
    async fn authenticate(&self) -> Result<Identity, CoreError> {
        let token = self.auth.access_token().await?;
        let me = self.api.get_user_info(&token).await?;
        info!("Authenticated with Reddit as u/{}", me.name);
        Ok(Identity::new(me.name))
    }

    async fn resolve_community(&self, name: &str) -> Result<Community, CoreError> {
        let token = self.auth.access_token().await?;
        let about = self.api.get_subreddit_info(&token, name).await?;
        debug!(
            "Resolved r/{} ({} subscribers)",
            about.display_name,
            about.subscribers.unwrap_or_default()
        );
        Ok(Community {
            display_name: about.display_name,
        })
    }

    fn subscribe(&self, community: &Community, kind: ItemKind, skip_existing: bool) -> ItemStream {
        debug!("Subscribing to {} stream of {}", kind, community);
        self.stream(&community.display_name, kind, skip_existing)
    }

    async fn reply(&self, item: &FeedItem, text: &str) -> Result<(), CoreError> {
        let token = self.auth.access_token().await?;
        self.api.submit_reply(&token, &item.fullname, text).await
    }
}
