use crate::consumer::StreamConsumer;
use llm_interface::TextGenerator;
use reddit_client::FeedProvider;
use replybot_core::{
    AppConfig, Community, CoreError, Identity, ItemFilter, ItemKind, RedditApiError, ReplyPolicy,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{JoinError, JoinHandle};
use tracing::{error, info};

/// What a running session needs beyond the two service handles.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub community: String,
    pub skip_existing: bool,
    pub reply_pause: Duration,
    pub filter: ItemFilter,
    pub reply_policy: ReplyPolicy,
}

impl From<&AppConfig> for SessionConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            community: config.subreddit.clone(),
            skip_existing: config.policy.skip_existing,
            reply_pause: config.policy.reply_pause,
            filter: config.policy.filter.clone(),
            reply_policy: config.policy.reply.clone(),
        }
    }
}

pub struct BotSession;

impl BotSession {
    /// Logs in, resolves the target community and spawns one consumer per listing.
    pub async fn start(
        feed: Arc<dyn FeedProvider>,
        generator: Arc<dyn TextGenerator>,
        config: SessionConfig,
    ) -> Result<SessionHandle, CoreError> {
        let identity = feed.authenticate().await.map_err(login_failure)?;
        let community = feed.resolve_community(&config.community).await?;

        info!("=============================");
        info!("Logged in as: {}", identity);
        info!("Replying in: {}", community);
        info!("=============================");

        let identity = Arc::new(identity);
        let config = Arc::new(config);

        let spawn_consumer = |kind: ItemKind| {
            let consumer = StreamConsumer::new(
                kind,
                Arc::clone(&feed),
                Arc::clone(&generator),
                Arc::clone(&identity),
                Arc::clone(&config),
            );
            let stream = feed.subscribe(&community, kind, config.skip_existing);
            tokio::spawn(consumer.run(stream))
        };

        let comments = spawn_consumer(ItemKind::Comment);
        let submissions = spawn_consumer(ItemKind::Submission);

        Ok(SessionHandle {
            identity,
            community,
            comments,
            submissions,
        })
    }
}

fn login_failure(error: CoreError) -> CoreError {
    match error {
        CoreError::RedditApi(RedditApiError::InvalidToken) => {
            CoreError::RedditApi(RedditApiError::AuthenticationFailed {
                reason: "access token rejected".to_string(),
            })
        }
        CoreError::RedditApi(RedditApiError::Forbidden { resource }) => {
            CoreError::RedditApi(RedditApiError::AuthenticationFailed {
                reason: format!("account may not access {resource}"),
            })
        }
        other => other,
    }
}

pub struct SessionHandle {
    identity: Arc<Identity>,
    community: Community,
    comments: JoinHandle<Result<(), CoreError>>,
    submissions: JoinHandle<Result<(), CoreError>>,
}

impl SessionHandle {
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn community(&self) -> &Community {
        &self.community
    }

    /// Resolves once both consumers have stopped.
    pub async fn wait(self) -> SessionReport {
        let (comments, submissions) = tokio::join!(self.comments, self.submissions);
        SessionReport {
            comments: joined(ItemKind::Comment, comments),
            submissions: joined(ItemKind::Submission, submissions),
        }
    }
}

fn joined(kind: ItemKind, result: Result<Result<(), CoreError>, JoinError>) -> Result<(), CoreError> {
    result.unwrap_or_else(|e| {
        error!("{} consumer task died: {}", kind, e);
        Err(CoreError::Internal {
            message: format!("{kind} consumer task failed: {e}"),
        })
    })
}

/// How each consumer exited.
#[derive(Debug)]
pub struct SessionReport {
    pub comments: Result<(), CoreError>,
    pub submissions: Result<(), CoreError>,
}

impl SessionReport {
    pub fn is_clean(&self) -> bool {
        self.comments.is_ok() && self.submissions.is_ok()
    }

    /// The comment consumer's error wins when both failed.
    pub fn into_result(self) -> Result<(), CoreError> {
        self.comments?;
        self.submissions
    }
}
