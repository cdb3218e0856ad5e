use crate::rate_limiter::{RateLimitConfig, RateLimiter};
use chrono::{DateTime, Utc};
use replybot_core::{CoreError, FeedItem, ItemKind, RedditApiError};
use reqwest::{Client, Method, Response};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, error, info, warn};

const REDDIT_API_BASE: &str = "https://oauth.reddit.com";

/// Largest page Reddit serves for listings.
pub const MAX_LISTING_LIMIT: u32 = 100;

#[derive(Debug, Clone, Deserialize)]
pub struct RedditListing<T> {
    pub data: RedditListingData<T>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedditListingData<T> {
    pub children: Vec<RedditListingChild<T>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedditListingChild<T> {
    pub kind: String,
    pub data: T,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedditCommentData {
    pub id: String,
    pub name: String,
    pub author: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub permalink: String,
    pub created_utc: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedditPostData {
    pub id: String,
    pub name: String,
    pub title: String,
    #[serde(default)]
    pub selftext: String,
    pub author: String,
    #[serde(default)]
    pub permalink: String,
    pub created_utc: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedditUserData {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedditSubredditData {
    pub display_name: String,
    #[serde(default)]
    pub subscribers: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct CommentResponse {
    json: CommentResponseBody,
}

#[derive(Debug, Deserialize)]
struct CommentResponseBody {
    #[serde(default)]
    errors: Vec<Vec<serde_json::Value>>,
}

#[derive(Debug)]
pub struct RedditApiClient {
    http_client: Client,
    rate_limiter: RateLimiter,
    api_base: String,
}

impl RedditApiClient {
    pub fn new(user_agent: &str) -> Result<Self, CoreError> {
        let http_client = Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http_client,
            rate_limiter: RateLimiter::new(RateLimitConfig::reddit_oauth()),
            api_base: REDDIT_API_BASE.to_string(),
        })
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    pub fn http_client(&self) -> &Client {
        &self.http_client
    }

    pub async fn make_request(
        &self,
        method: Method,
        endpoint: &str,
        access_token: &str,
        query_params: Option<&[(&str, &str)]>,
        form: Option<&[(&str, &str)]>,
    ) -> Result<Response, CoreError> {
        let url = format!("{}{}", self.api_base, endpoint);

        let queue_wait = self.rate_limiter.acquire_permit().await;
        debug!(
            "Acquired rate limit permit for {} {} after {:?}",
            method, endpoint, queue_wait
        );

        let mut request_builder = self
            .http_client
            .request(method.clone(), &url)
            .bearer_auth(access_token);

        if let Some(params) = query_params {
            request_builder = request_builder.query(params);
        }
        if let Some(fields) = form {
            request_builder = request_builder.form(fields);
        }

        debug!("Making Reddit API request: {} {}", method, endpoint);
        let response = request_builder.send().await.map_err(|e| {
            error!("Network error for {} {}: {}", method, endpoint, e);
            if e.is_timeout() {
                CoreError::RedditApi(RedditApiError::RequestTimeout)
            } else {
                CoreError::Network(e)
            }
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        error!("Request failed with status: {} for {}", status, endpoint);
        let error = match status.as_u16() {
            429 => {
                let retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|value| value.to_str().ok())
                    .and_then(|value| value.trim().parse::<f64>().ok())
                    .map(|seconds| seconds.ceil() as u64)
                    .unwrap_or(60);
                warn!("Rate limited, retry after {} seconds", retry_after);
                RedditApiError::RateLimitExceeded { retry_after }
            }
            401 => RedditApiError::InvalidToken,
            403 => RedditApiError::Forbidden {
                resource: endpoint.to_string(),
            },
            404 => RedditApiError::NotFound {
                resource: endpoint.to_string(),
            },
            code if status.is_server_error() => RedditApiError::ServerError { status_code: code },
            code => RedditApiError::InvalidResponse {
                details: format!("unexpected status {} for {}", code, endpoint),
            },
        };
        Err(CoreError::RedditApi(error))
    }

    pub async fn get_user_info(&self, access_token: &str) -> Result<RedditUserData, CoreError> {
        let response = self
            .make_request(Method::GET, "/api/v1/me", access_token, None, None)
            .await?;

        let user_data: RedditUserData = response.json().await.map_err(|e| {
            error!("Failed to parse user data: {}", e);
            CoreError::RedditApi(RedditApiError::InvalidResponse {
                details: "Failed to parse user data".to_string(),
            })
        })?;

        debug!("Retrieved user info for: {}", user_data.name);
        Ok(user_data)
    }

    /// Resolves a subreddit. Unknown names come back as 404, or as a search listing instead of
    /// a `t5` thing; both mean the community does not exist.
    pub async fn get_subreddit_info(
        &self,
        access_token: &str,
        subreddit: &str,
    ) -> Result<RedditSubredditData, CoreError> {
        let endpoint = format!("/r/{}/about", subreddit);
        let not_found = || {
            CoreError::RedditApi(RedditApiError::SubredditNotFound {
                subreddit: subreddit.to_string(),
            })
        };

        let response = match self
            .make_request(Method::GET, &endpoint, access_token, None, None)
            .await
        {
            Ok(response) => response,
            Err(CoreError::RedditApi(RedditApiError::NotFound { .. })) => return Err(not_found()),
            Err(e) => return Err(e),
        };

        let thing: RedditListingChild<serde_json::Value> =
            response.json().await.map_err(|_| not_found())?;
        if thing.kind != "t5" {
            debug!("r/{} resolved to a {} instead of a subreddit", subreddit, thing.kind);
            return Err(not_found());
        }
        let about: RedditSubredditData = serde_json::from_value(thing.data).map_err(|e| {
            error!("Failed to parse subreddit info: {}", e);
            not_found()
        })?;

        debug!("Retrieved info for r/{}", subreddit);
        Ok(about)
    }

    /// Newest items of one kind, newest first, as Reddit returns them.
    pub async fn get_newest_items(
        &self,
        access_token: &str,
        subreddit: &str,
        kind: ItemKind,
        limit: u32,
        before: Option<&str>,
    ) -> Result<Vec<FeedItem>, CoreError> {
        let endpoint = match kind {
            ItemKind::Comment => format!("/r/{}/comments", subreddit),
            ItemKind::Submission => format!("/r/{}/new", subreddit),
        };
        let limit_str = limit.min(MAX_LISTING_LIMIT).to_string();
        let mut params = vec![("limit", limit_str.as_str()), ("raw_json", "1")];
        if let Some(before_val) = before {
            params.push(("before", before_val));
        }

        let response = self
            .make_request(
                Method::GET,
                &endpoint,
                access_token,
                Some(params.as_slice()),
                None,
            )
            .await?;

        let parse_error = |e: reqwest::Error| {
            error!("Failed to parse {} listing: {}", kind, e);
            CoreError::RedditApi(RedditApiError::InvalidResponse {
                details: format!("Failed to parse {} listing for r/{}", kind, subreddit),
            })
        };

        let items: Vec<FeedItem> = match kind {
            ItemKind::Comment => {
                let listing: RedditListing<RedditCommentData> =
                    response.json().await.map_err(parse_error)?;
                listing.into_items()
            }
            ItemKind::Submission => {
                let listing: RedditListing<RedditPostData> =
                    response.json().await.map_err(parse_error)?;
                listing.into_items()
            }
        };

        debug!("Retrieved {} {} items from r/{}", items.len(), kind, subreddit);
        Ok(items)
    }

    /// Posts `text` as a reply to the thing named `thing_id`.
    pub async fn submit_reply(
        &self,
        access_token: &str,
        thing_id: &str,
        text: &str,
    ) -> Result<(), CoreError> {
        let form = [("api_type", "json"), ("thing_id", thing_id), ("text", text)];
        let response = self
            .make_request(Method::POST, "/api/comment", access_token, None, Some(&form[..]))
            .await?;

        let body = response.text().await?;
        if let Some(reason) = reply_errors(&body) {
            return Err(CoreError::RedditApi(RedditApiError::ReplyRejected {
                thing_id: thing_id.to_string(),
                reason,
            }));
        }

        info!("Posted reply to {}", thing_id);
        Ok(())
    }
}

impl<T: Into<FeedItem>> RedditListing<T> {
    pub fn into_items(self) -> Vec<FeedItem> {
        self.data
            .children
            .into_iter()
            .map(|child| child.data.into())
            .collect()
    }
}

/// Errors Reddit reports inside a 200 response to `/api/comment`, joined into one line.
pub fn reply_errors(body: &str) -> Option<String> {
    let response: CommentResponse = match serde_json::from_str(body) {
        Ok(response) => response,
        Err(_) => {
            return if body.trim().is_empty() {
                None
            } else {
                Some(format!("unexpected reply response: {}", body.trim()))
            }
        }
    };

    if response.json.errors.is_empty() {
        return None;
    }

    let reasons: Vec<String> = response
        .json
        .errors
        .iter()
        .map(|parts| {
            parts
                .iter()
                .filter_map(|part| part.as_str())
                .take(2)
                .collect::<Vec<_>>()
                .join(": ")
        })
        .collect();
    Some(reasons.join("; "))
}

fn author_of(author: String) -> Option<String> {
    if author == "[deleted]" || author.is_empty() {
        None
    } else {
        Some(author)
    }
}

fn timestamp(created_utc: f64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(created_utc as i64, 0).unwrap_or_default()
}

impl From<RedditCommentData> for FeedItem {
    fn from(comment: RedditCommentData) -> Self {
        Self {
            kind: ItemKind::Comment,
            id: comment.id,
            fullname: comment.name,
            author: author_of(comment.author),
            body: comment.body,
            permalink: comment.permalink,
            created_utc: timestamp(comment.created_utc),
        }
    }
}

// Link posts have no self text; their title stands in as the body.
impl From<RedditPostData> for FeedItem {
    fn from(post: RedditPostData) -> Self {
        let body = if post.selftext.trim().is_empty() {
            post.title
        } else {
            post.selftext
        };
        Self {
            kind: ItemKind::Submission,
            id: post.id,
            fullname: post.name,
            author: author_of(post.author),
            body,
            permalink: post.permalink,
            created_utc: timestamp(post.created_utc),
        }
    }
}
