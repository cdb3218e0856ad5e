//! Startup configuration.
//!
//! Secrets always come from the environment. Non-secret settings may also come from a TOML file
//! named by `REPLYBOT_CONFIG`; environment values win over the file, the file wins over the
//! built-in defaults.

use crate::error::ConfigError;
use crate::filter::ItemFilter;
use crate::reply::{FallbackPolicy, ReplyPolicy, DEFAULT_FOOTER};
use serde::Deserialize;
use std::fmt;
use std::path::Path;
use std::time::Duration;
use url::Url;

pub const CONFIG_PATH_VAR: &str = "REPLYBOT_CONFIG";

pub const DEFAULT_USER_AGENT: &str = "OpenAI Reddit Bot";
pub const DEFAULT_MODEL: &str = "text-curie-001";
pub const DEFAULT_MAX_TOKENS: u32 = 256;
pub const DEFAULT_PROMPT_SUFFIX: &str =
    ". Please reply in Markdown format that is appropriate for Reddit.";
pub const DEFAULT_REPLY_PAUSE: Duration = Duration::from_secs(5);
pub const DEFAULT_GENERATION_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct RedditCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub username: String,
    pub password: String,
    pub user_agent: String,
}

impl fmt::Debug for RedditCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedditCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

#[derive(Clone)]
pub struct GenerationConfig {
    pub endpoint: Url,
    pub bearer_token: String,
    pub model: String,
    pub max_tokens: u32,
    /// Appended to the item text to form the prompt.
    pub prompt_suffix: Option<String>,
    pub timeout: Duration,
}

impl fmt::Debug for GenerationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenerationConfig")
            .field("endpoint", &self.endpoint.as_str())
            .field("bearer_token", &"<redacted>")
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("prompt_suffix", &self.prompt_suffix)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct BotPolicy {
    pub filter: ItemFilter,
    pub reply: ReplyPolicy,
    /// Pause after each successful reply before the consumer pulls its next item.
    pub reply_pause: Duration,
    pub skip_existing: bool,
}

impl Default for BotPolicy {
    fn default() -> Self {
        Self {
            filter: ItemFilter::default(),
            reply: ReplyPolicy::default(),
            reply_pause: DEFAULT_REPLY_PAUSE,
            skip_existing: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub reddit: RedditCredentials,
    pub subreddit: String,
    pub generation: GenerationConfig,
    pub policy: BotPolicy,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SettingsFile {
    pub reddit: RedditSettings,
    pub generation: GenerationSettings,
    pub policy: PolicySettings,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RedditSettings {
    pub user_agent: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GenerationSettings {
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
    pub prompt_suffix: Option<String>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PolicySettings {
    pub filter: Option<String>,
    pub keywords: Option<Vec<String>>,
    pub fallback: Option<String>,
    pub footer: Option<String>,
    pub reply_pause_secs: Option<u64>,
    pub skip_existing: Option<bool>,
}

impl SettingsFile {
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
            path: path.display().to_string(),
        })?;
        Self::from_toml_str(&contents)
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let settings = match present(&lookup, CONFIG_PATH_VAR) {
            Some(path) => SettingsFile::load(Path::new(&path))?,
            None => SettingsFile::default(),
        };
        Self::from_parts(lookup, settings)
    }

    pub fn from_parts<F>(lookup: F, settings: SettingsFile) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let reddit = RedditCredentials {
            client_id: required(&lookup, "CLIENT_ID")?,
            client_secret: required(&lookup, "CLIENT_SECRET")?,
            username: required(&lookup, "USER_HANDLE")?,
            password: required(&lookup, "USER_PASSWORD")?,
            user_agent: present(&lookup, "USER_AGENT")
                .or(settings.reddit.user_agent)
                .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
        };

        let subreddit = present(&lookup, "BOT_SUBREDDIT")
            .or_else(|| present(&lookup, "TEST_SUBREDDIT"))
            .map(|name| normalize_subreddit(&name))
            .ok_or_else(|| ConfigError::MissingEnvironmentVariable {
                var_name: "BOT_SUBREDDIT".to_string(),
            })?;
        if subreddit.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "BOT_SUBREDDIT".to_string(),
                value: subreddit,
            });
        }

        let generation = Self::generation_config(&lookup, settings.generation)?;
        let policy = Self::bot_policy(&lookup, settings.policy)?;

        Ok(Self {
            reddit,
            subreddit,
            generation,
            policy,
        })
    }

    fn generation_config<F>(
        lookup: &F,
        settings: GenerationSettings,
    ) -> Result<GenerationConfig, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let raw_endpoint = required(lookup, "OPENAI_URL")?;
        let endpoint = Url::parse(&raw_endpoint).map_err(|_| ConfigError::InvalidValue {
            field: "OPENAI_URL".to_string(),
            value: raw_endpoint.clone(),
        })?;

        let max_tokens = match present(lookup, "OPENAI_MAX_TOKENS") {
            Some(raw) => parse_number::<u32>("OPENAI_MAX_TOKENS", &raw)?,
            None => settings.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        };
        if max_tokens == 0 {
            return Err(ConfigError::ValidationFailed {
                reason: "max_tokens must be greater than zero".to_string(),
            });
        }

        let timeout = match present(lookup, "OPENAI_TIMEOUT_SECS") {
            Some(raw) => Duration::from_secs(parse_number::<u64>("OPENAI_TIMEOUT_SECS", &raw)?),
            None => settings
                .timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_GENERATION_TIMEOUT),
        };
        if timeout.is_zero() {
            return Err(ConfigError::ValidationFailed {
                reason: "generation timeout must be greater than zero".to_string(),
            });
        }

        let prompt_suffix = lookup("PROMPT_SUFFIX")
            .or(settings.prompt_suffix)
            .unwrap_or_else(|| DEFAULT_PROMPT_SUFFIX.to_string());

        Ok(GenerationConfig {
            endpoint,
            bearer_token: required(lookup, "OPENAI_BEARER_TOKEN")?,
            model: present(lookup, "OPENAI_MODEL")
                .or(settings.model)
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            max_tokens,
            prompt_suffix: disable_when_empty(prompt_suffix),
            timeout,
        })
    }

    fn bot_policy<F>(lookup: &F, settings: PolicySettings) -> Result<BotPolicy, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mode = present(lookup, "BOT_FILTER")
            .or(settings.filter)
            .unwrap_or_else(|| "keywords".to_string());
        let filter = match mode.to_ascii_lowercase().as_str() {
            "keywords" | "keyword" => {
                let filter = match present(lookup, "BOT_KEYWORDS") {
                    Some(raw) => ItemFilter::keywords(raw.split(',')),
                    None => match settings.keywords {
                        Some(keywords) => ItemFilter::keywords(keywords),
                        None => ItemFilter::default_keywords(),
                    },
                };
                if matches!(&filter, ItemFilter::KeywordGated { keywords } if keywords.is_empty()) {
                    return Err(ConfigError::ValidationFailed {
                        reason: "keyword filter needs at least one trigger phrase".to_string(),
                    });
                }
                filter
            }
            "all" | "unconditional" => ItemFilter::Unconditional,
            _ => {
                return Err(ConfigError::InvalidValue {
                    field: "BOT_FILTER".to_string(),
                    value: mode,
                })
            }
        };

        let fallback_raw = present(lookup, "BOT_FALLBACK")
            .or(settings.fallback)
            .unwrap_or_else(|| "silent".to_string());
        let fallback = match fallback_raw.to_ascii_lowercase().as_str() {
            "silent" => FallbackPolicy::Silent,
            "apology" => FallbackPolicy::Apology,
            _ => {
                return Err(ConfigError::InvalidValue {
                    field: "BOT_FALLBACK".to_string(),
                    value: fallback_raw,
                })
            }
        };

        let footer = lookup("REPLY_FOOTER")
            .or(settings.footer)
            .unwrap_or_else(|| DEFAULT_FOOTER.to_string());

        let reply_pause = match present(lookup, "REPLY_PAUSE_SECS") {
            Some(raw) => Duration::from_secs(parse_number::<u64>("REPLY_PAUSE_SECS", &raw)?),
            None => settings
                .reply_pause_secs
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_REPLY_PAUSE),
        };

        let skip_existing = match present(lookup, "SKIP_EXISTING") {
            Some(raw) => parse_bool("SKIP_EXISTING", &raw)?,
            None => settings.skip_existing.unwrap_or(false),
        };

        Ok(BotPolicy {
            filter,
            reply: ReplyPolicy {
                fallback,
                footer: disable_when_empty(footer),
            },
            reply_pause,
            skip_existing,
        })
    }
}

/// Set and non-blank.
fn present<F>(lookup: &F, name: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name).filter(|value| !value.trim().is_empty())
}

fn required<F>(lookup: &F, name: &str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    present(lookup, name).ok_or_else(|| ConfigError::MissingEnvironmentVariable {
        var_name: name.to_string(),
    })
}

fn disable_when_empty(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

fn normalize_subreddit(name: &str) -> String {
    let name = name.trim().trim_start_matches('/');
    name.strip_prefix("r/").unwrap_or(name).trim_end_matches('/').to_string()
}

fn parse_number<T: std::str::FromStr>(field: &str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse::<T>().map_err(|_| ConfigError::InvalidValue {
        field: field.to_string(),
        value: raw.to_string(),
    })
}

fn parse_bool(field: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            field: field.to_string(),
            value: raw.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_subreddit() {
        assert_eq!(normalize_subreddit("rust"), "rust");
        assert_eq!(normalize_subreddit("/r/rust/"), "rust");
        assert_eq!(normalize_subreddit(" r/rust "), "rust");
    }

    #[test]
    fn test_parse_bool() {
        assert!(parse_bool("SKIP_EXISTING", "True").unwrap());
        assert!(!parse_bool("SKIP_EXISTING", "0").unwrap());
        assert!(parse_bool("SKIP_EXISTING", "maybe").is_err());
    }
}
