use replybot_core::{ConfigError, CoreError, ErrorExt, ErrorReporter, LlmError, RedditApiError};

#[test]
fn test_error_codes() {
    let reddit_error = CoreError::RedditApi(RedditApiError::InvalidToken);
    assert_eq!(reddit_error.error_code(), "REDDIT_INVALID_TOKEN");

    let llm_error = CoreError::Llm(LlmError::EmptyCompletion {
        provider: "openai".to_string(),
    });
    assert_eq!(llm_error.error_code(), "LLM_EMPTY_COMPLETION");

    let config_error = CoreError::Config(ConfigError::MissingEnvironmentVariable {
        var_name: "CLIENT_ID".to_string(),
    });
    assert_eq!(config_error.error_code(), "CONFIG_MISSING_ENV_VAR");

    let internal = CoreError::Internal {
        message: "join failed".to_string(),
    };
    assert_eq!(internal.error_code(), "INTERNAL");

    let not_found = RedditApiError::SubredditNotFound {
        subreddit: "nope".to_string(),
    };
    assert_eq!(not_found.error_code(), "REDDIT_SUBREDDIT_NOT_FOUND");
}

#[test]
fn test_from_conversions() {
    let error: CoreError = RedditApiError::AuthenticationFailed {
        reason: "invalid_grant".to_string(),
    }
    .into();
    assert!(matches!(
        error,
        CoreError::RedditApi(RedditApiError::AuthenticationFailed { .. })
    ));

    let error: CoreError = ConfigError::ValidationFailed {
        reason: "bad".to_string(),
    }
    .into();
    assert!(matches!(error, CoreError::Config(_)));
}

#[test]
fn test_user_friendly_messages() {
    let reddit_error = CoreError::RedditApi(RedditApiError::SubredditNotFound {
        subreddit: "nosuchplace".to_string(),
    });
    let message = reddit_error.user_friendly_message();
    assert!(message.contains("nosuchplace"));

    let config_error = CoreError::Config(ConfigError::MissingEnvironmentVariable {
        var_name: "OPENAI_URL".to_string(),
    });
    let message = config_error.user_friendly_message();
    assert!(message.contains("OPENAI_URL"));
}

#[test]
fn test_error_reporter_summary() {
    let reporter = ErrorReporter::new();

    let error = CoreError::RedditApi(RedditApiError::SubredditNotFound {
        subreddit: "nosuchplace".to_string(),
    });
    assert_eq!(
        reporter.summary(&error),
        "[REDDIT_SUBREDDIT_NOT_FOUND] Subreddit 'nosuchplace' not found or is private."
    );

    let error = CoreError::Config(ConfigError::MissingEnvironmentVariable {
        var_name: "OPENAI_URL".to_string(),
    });
    assert_eq!(
        reporter.summary(&error),
        "[CONFIG_MISSING_ENV_VAR] Environment variable 'OPENAI_URL' is required but not set."
    );

    let error = CoreError::Internal {
        message: "comment consumer task failed".to_string(),
    };
    assert_eq!(
        reporter.summary(&error),
        "[INTERNAL] An unexpected error occurred."
    );
}
