//! Turns a generation result into the text that gets posted.

/// Posted in place of a completion when the apology fallback is enabled.
pub const APOLOGY_MESSAGE: &str = "I am sorry! I was unable to process your query at this time!";

/// Attribution appended to every posted reply unless disabled.
pub const DEFAULT_FOOTER: &str = "\n\n\n---\n\n*^Beep ^boop! ^I ^am ^a ^bot ^that ^replies ^using ^the ^[OpenAI](https://openai.com/api/) ^api.*";

/// What to do when generation yields nothing usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FallbackPolicy {
    /// Post nothing.
    #[default]
    Silent,
    /// Post [`APOLOGY_MESSAGE`].
    Apology,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyPolicy {
    pub fallback: FallbackPolicy,
    pub footer: Option<String>,
}

impl Default for ReplyPolicy {
    fn default() -> Self {
        Self {
            fallback: FallbackPolicy::default(),
            footer: Some(DEFAULT_FOOTER.to_string()),
        }
    }
}

impl ReplyPolicy {
    /// `None` means no reply should be posted.
    pub fn compose(&self, generated: Option<String>) -> Option<String> {
        let body = match generated {
            Some(text) if !text.trim().is_empty() => text,
            _ => match self.fallback {
                FallbackPolicy::Silent => return None,
                FallbackPolicy::Apology => APOLOGY_MESSAGE.to_string(),
            },
        };
        Some(match &self.footer {
            Some(footer) => format!("{body}{footer}"),
            None => body,
        })
    }
}
