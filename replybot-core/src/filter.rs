//! Reply eligibility.
//!
//! The filter is a pure function of the item and the bot identity; evaluating it twice on the
//! same input always gives the same answer.

use crate::types::{FeedItem, Identity};

/// Trigger phrases used when no keywords are configured.
pub const DEFAULT_KEYWORDS: &[&str] = &["america", "united states"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemFilter {
    /// Reply only when the body contains at least one trigger phrase.
    KeywordGated { keywords: Vec<String> },
    /// Reply to every item not written by the bot.
    Unconditional,
}

impl ItemFilter {
    pub fn keywords<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keywords = keywords
            .into_iter()
            .map(|k| k.as_ref().trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
        ItemFilter::KeywordGated { keywords }
    }

    pub fn default_keywords() -> Self {
        Self::keywords(DEFAULT_KEYWORDS.iter().copied())
    }

    /// First configured phrase found in `body`, compared case-insensitively.
    pub fn matched_keyword(&self, body: &str) -> Option<&str> {
        match self {
            ItemFilter::KeywordGated { keywords } => {
                let body = body.to_lowercase();
                keywords
                    .iter()
                    .find(|k| body.contains(k.as_str()))
                    .map(String::as_str)
            }
            ItemFilter::Unconditional => None,
        }
    }

    pub fn is_eligible(&self, item: &FeedItem, me: &Identity) -> bool {
        if me.is_author_of(item) {
            return false;
        }
        match self {
            ItemFilter::KeywordGated { .. } => self.matched_keyword(&item.body).is_some(),
            ItemFilter::Unconditional => true,
        }
    }
}

impl Default for ItemFilter {
    fn default() -> Self {
        Self::default_keywords()
    }
}
