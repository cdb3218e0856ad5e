use background_service::{BotSession, SessionConfig};
use llm_interface::OpenAiCompletionClient;
use reddit_client::{RedditClient, RedditOAuth2Config};
use replybot_core::{AppConfig, CoreError, ErrorReporter};
use std::process::ExitCode;
use std::sync::Arc;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new(
                    "replybot=info,replybot_core=info,reddit_client=info,llm_interface=info,background_service=info",
                )
            }),
        )
        .init();

    tracing::info!("Starting replybot");

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            ErrorReporter::new().report_error(&e);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), CoreError> {
    let config = AppConfig::from_env()?;
    tracing::debug!("Loaded configuration: {:?}", config);

    let reddit = RedditClient::new(RedditOAuth2Config::from(&config.reddit))?;
    let generator = OpenAiCompletionClient::new(config.generation.clone());

    let handle = BotSession::start(
        Arc::new(reddit),
        Arc::new(generator),
        SessionConfig::from(&config),
    )
    .await?;

    tokio::select! {
        report = handle.wait() => {
            tracing::info!("Both streams have stopped");
            report.into_result()
        }
        signal = tokio::signal::ctrl_c() => {
            signal?;
            tracing::info!("Interrupted, shutting down");
            Ok(())
        }
    }
}
