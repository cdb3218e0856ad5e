use chrono::{DateTime, Utc};
use std::fmt;

/// Which listing an item was pulled from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemKind {
    Comment,
    Submission,
}

impl ItemKind {
    pub fn label(&self) -> &'static str {
        match self {
            ItemKind::Comment => "Comment",
            ItemKind::Submission => "Submission",
        }
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One comment or submission seen on the feed. Lives only while it is being processed.
#[derive(Debug, Clone)]
pub struct FeedItem {
    pub kind: ItemKind,
    pub id: String,
    /// Type-prefixed id (`t1_...`, `t3_...`) used as the reply target.
    pub fullname: String,
    /// `None` for deleted accounts.
    pub author: Option<String>,
    pub body: String,
    pub permalink: String,
    pub created_utc: DateTime<Utc>,
}

impl FeedItem {
    pub fn author_name(&self) -> &str {
        self.author.as_deref().unwrap_or("[deleted]")
    }

    pub fn lowercased_body(&self) -> String {
        self.body.to_lowercase()
    }
}

/// The bot's own account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    name: String,
}

impl Identity {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Reddit user names compare case-insensitively.
    pub fn is_author_of(&self, item: &FeedItem) -> bool {
        item.author
            .as_deref()
            .is_some_and(|author| author.eq_ignore_ascii_case(&self.name))
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// A resolved subreddit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Community {
    pub display_name: String,
}

impl fmt::Display for Community {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/r/{}", self.display_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn comment_by(author: Option<&str>) -> FeedItem {
        FeedItem {
            kind: ItemKind::Comment,
            id: "abc".to_string(),
            fullname: "t1_abc".to_string(),
            author: author.map(str::to_string),
            body: "Hello There".to_string(),
            permalink: "/r/test/comments/x/y/abc/".to_string(),
            created_utc: DateTime::<Utc>::from_timestamp(1_640_995_200, 0).unwrap_or_default(),
        }
    }

    #[test]
    fn test_identity_matches_author_ignoring_case() {
        let me = Identity::new("ReplyBot");
        assert!(me.is_author_of(&comment_by(Some("replybot"))));
        assert!(!me.is_author_of(&comment_by(Some("someone_else"))));
        assert!(!me.is_author_of(&comment_by(None)));
    }

    #[test]
    fn test_item_helpers() {
        let item = comment_by(None);
        assert_eq!(item.author_name(), "[deleted]");
        assert_eq!(item.lowercased_body(), "hello there");
        assert_eq!(ItemKind::Submission.to_string(), "Submission");
        assert_eq!(
            Community {
                display_name: "rust".to_string()
            }
            .to_string(),
            "/r/rust"
        );
    }
}
