//! Script-app authentication against Reddit.
//!
//! Reddit "script" apps authenticate with the resource-owner password grant. The grant yields no
//! refresh token, so an expiring token is replaced by running the grant again.

use oauth2::basic::{BasicClient, BasicErrorResponse};
use oauth2::{
    AuthUrl, ClientId, ClientSecret, HttpRequest, HttpResponse, RequestTokenError,
    ResourceOwnerPassword, ResourceOwnerUsername, Scope, TokenResponse, TokenUrl,
};
use replybot_core::{CoreError, RedditApiError, RedditCredentials};
use std::fmt;
use std::time::{Duration, SystemTime};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

const REDDIT_AUTH_URL: &str = "https://www.reddit.com/api/v1/authorize";
const REDDIT_TOKEN_URL: &str = "https://www.reddit.com/api/v1/access_token";

/// Tokens are renewed this long before they actually expire.
const REFRESH_MARGIN: Duration = Duration::from_secs(60);
/// Used when the token response carries no `expires_in`.
const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(3600);

#[derive(Clone)]
pub struct RedditOAuth2Config {
    pub client_id: String,
    pub client_secret: String,
    pub username: String,
    pub password: String,
    pub user_agent: String,
}

impl RedditOAuth2Config {
    pub fn new(
        client_id: String,
        client_secret: String,
        username: String,
        password: String,
        user_agent: String,
    ) -> Self {
        Self {
            client_id,
            client_secret,
            username,
            password,
            user_agent,
        }
    }
}

impl From<&RedditCredentials> for RedditOAuth2Config {
    fn from(credentials: &RedditCredentials) -> Self {
        Self::new(
            credentials.client_id.clone(),
            credentials.client_secret.clone(),
            credentials.username.clone(),
            credentials.password.clone(),
            credentials.user_agent.clone(),
        )
    }
}

impl fmt::Debug for RedditOAuth2Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedditOAuth2Config")
            .field("client_id", &self.client_id)
            .field("username", &self.username)
            .field("user_agent", &self.user_agent)
            .finish_non_exhaustive()
    }
}

#[derive(Clone)]
pub struct RedditToken {
    pub access_token: String,
    pub expires_at: SystemTime,
    pub scope: Vec<String>,
}

impl RedditToken {
    pub fn is_expired(&self) -> bool {
        SystemTime::now() >= self.expires_at
    }

    pub fn needs_refresh(&self) -> bool {
        SystemTime::now() + REFRESH_MARGIN >= self.expires_at
    }
}

impl fmt::Debug for RedditToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedditToken")
            .field("expires_at", &self.expires_at)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

pub struct Authenticator {
    config: RedditOAuth2Config,
    oauth_client: BasicClient,
    http_client: reqwest::Client,
    token: RwLock<Option<RedditToken>>,
}

impl Authenticator {
    pub fn new(config: RedditOAuth2Config, http_client: reqwest::Client) -> Result<Self, CoreError> {
        let auth_url = AuthUrl::new(REDDIT_AUTH_URL.to_string()).map_err(|e| CoreError::Internal {
            message: format!("invalid authorize url: {e}"),
        })?;
        let token_url =
            TokenUrl::new(REDDIT_TOKEN_URL.to_string()).map_err(|e| CoreError::Internal {
                message: format!("invalid token url: {e}"),
            })?;

        let oauth_client = BasicClient::new(
            ClientId::new(config.client_id.clone()),
            Some(ClientSecret::new(config.client_secret.clone())),
            auth_url,
            Some(token_url),
        );

        Ok(Self {
            config,
            oauth_client,
            http_client,
            token: RwLock::new(None),
        })
    }

    pub fn get_required_scopes() -> Vec<&'static str> {
        vec!["identity", "read", "submit"]
    }

    #[cfg(test)]
    pub(crate) async fn set_token(&self, token: RedditToken) {
        *self.token.write().await = Some(token);
    }

    /// Returns a usable bearer token, running the password grant when none is cached or the
    /// cached one is about to expire.
    pub async fn access_token(&self) -> Result<String, CoreError> {
        if let Some(token) = self.token.read().await.as_ref() {
            if !token.needs_refresh() {
                return Ok(token.access_token.clone());
            }
        }

        let mut guard = self.token.write().await;
        // Another task may have refreshed while we waited for the write lock.
        if let Some(token) = guard.as_ref() {
            if !token.needs_refresh() {
                return Ok(token.access_token.clone());
            }
            if token.is_expired() {
                debug!("Reddit token expired, requesting a new one");
            } else {
                debug!("Reddit token expires soon, requesting a new one");
            }
        }

        let token = self.request_token().await?;
        let access_token = token.access_token.clone();
        *guard = Some(token);
        Ok(access_token)
    }

    async fn request_token(&self) -> Result<RedditToken, CoreError> {
        let username = ResourceOwnerUsername::new(self.config.username.clone());
        let password = ResourceOwnerPassword::new(self.config.password.clone());
        let scopes = Self::get_required_scopes()
            .into_iter()
            .map(|scope| Scope::new(scope.to_string()));
        let http_client = self.http_client.clone();

        let response = self
            .oauth_client
            .exchange_password(&username, &password)
            .add_scopes(scopes)
            .request_async(move |request| send_token_request(http_client, request))
            .await
            .map_err(|e| {
                let reason = describe_token_error(e);
                warn!("Reddit password grant failed: {}", reason);
                CoreError::RedditApi(RedditApiError::AuthenticationFailed { reason })
            })?;

        let lifetime = response.expires_in().unwrap_or(DEFAULT_TOKEN_LIFETIME);
        let scope = response
            .scopes()
            .map(|scopes| scopes.iter().map(|scope| scope.to_string()).collect())
            .unwrap_or_default();

        info!(
            "Obtained Reddit access token for {} (valid for {:?})",
            self.config.username, lifetime
        );

        Ok(RedditToken {
            access_token: response.access_token().secret().clone(),
            expires_at: SystemTime::now() + lifetime,
            scope,
        })
    }
}

/// Runs the token request through our own client so Reddit sees the configured User-Agent.
async fn send_token_request(
    client: reqwest::Client,
    request: HttpRequest,
) -> Result<HttpResponse, reqwest::Error> {
    let response = client
        .request(request.method, request.url.as_str())
        .headers(request.headers)
        .body(request.body)
        .send()
        .await?;

    let status_code = response.status();
    let headers = response.headers().clone();
    let body = response.bytes().await?.to_vec();

    Ok(HttpResponse {
        status_code,
        headers,
        body,
    })
}

fn describe_token_error<RE>(error: RequestTokenError<RE, BasicErrorResponse>) -> String
where
    RE: std::error::Error + 'static,
{
    match error {
        RequestTokenError::ServerResponse(response) => response.error().as_ref().to_string(),
        RequestTokenError::Request(e) => format!("token request failed: {e}"),
        // Reddit answers a wrong password with 200 and `{"error": "invalid_grant"}`.
        RequestTokenError::Parse(_, body) => error_field(&body)
            .unwrap_or_else(|| format!("unexpected token response: {}", String::from_utf8_lossy(&body))),
        RequestTokenError::Other(message) => message,
    }
}

pub(crate) fn error_field(body: &[u8]) -> Option<String> {
    let value: serde_json::Value = serde_json::from_slice(body).ok()?;
    value.get("error").map(|error| match error {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    })
}
