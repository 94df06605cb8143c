//! Automod rule evaluation
//!
//! `evaluate` is a pure function from a message and a guild's automod settings
//! to an ordered list of violations. It has no side effects and never touches
//! the clock or the network, so every rule is unit-testable in isolation.

use once_cell::sync::Lazy;
use poise::serenity_prelude as serenity;
use regex::Regex;
use std::fmt;

use crate::policy::AutomodSettings;

static INVITE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)discord\.gg/\w+|discordapp\.com/invite/\w+").unwrap());

// The [$-_] range covers the URL punctuation between '$' and '_', '/' and
// ':' included, so a whole invite URL stays one match.
static URL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"https?://(?:[a-zA-Z0-9]|[$-_@.&+]|[!*(),]|%[0-9a-fA-F]{2})+").unwrap());

// Custom guild emoji only; native Unicode emoji are not counted.
static CUSTOM_EMOJI_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<:\w*:\d*>").unwrap());

/// A single automod rule violation found in a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    /// A blocklisted word appeared in the message (case-insensitive)
    FilteredWord(String),
    /// The message contained a Discord invite link
    InviteLink,
    /// The message contained an http/https URL that is not an invite
    ExternalLink,
    /// User plus role mentions exceeded the configured maximum
    TooManyMentions(usize),
    /// Custom-emoji tokens exceeded the configured maximum
    TooManyEmojis(usize),
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FilteredWord(word) => write!(f, "Filtered word: {word}"),
            Self::InviteLink => write!(f, "Discord invite link"),
            Self::ExternalLink => write!(f, "External link"),
            Self::TooManyMentions(count) => write!(f, "Too many mentions ({count})"),
            Self::TooManyEmojis(count) => write!(f, "Too many emojis ({count})"),
        }
    }
}

/// Join violations into the reason text used in audit logs and warnings
#[must_use]
pub fn join_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Platform-agnostic projection of an inbound message, carrying exactly what
/// the evaluator and dispatcher need.
#[derive(Debug, Clone)]
pub struct MessageView {
    pub guild_id: u64,
    pub channel_id: u64,
    pub message_id: u64,
    pub author_id: u64,
    pub author_name: String,
    pub content: String,
    pub user_mentions: usize,
    pub role_mentions: usize,
}

impl MessageView {
    /// Build a view from a gateway message. Returns `None` for direct
    /// messages; automod only applies inside guilds.
    #[must_use]
    pub fn from_serenity(message: &serenity::Message) -> Option<Self> {
        let guild_id = message.guild_id?;
        Some(Self {
            guild_id: guild_id.get(),
            channel_id: message.channel_id.get(),
            message_id: message.id.get(),
            author_id: message.author.id.get(),
            author_name: message.author.name.clone(),
            content: message.content.clone(),
            user_mentions: message.mentions.len(),
            role_mentions: message.mention_roles.len(),
        })
    }

    #[must_use]
    pub fn mention_count(&self) -> usize {
        self.user_mentions + self.role_mentions
    }
}

/// Evaluate a message against a guild's automod settings.
///
/// All matching rules are reported, not just the first, in a fixed order:
/// blocklist words (one entry per matched word, in policy list order), invite
/// links, external links, mention count, emoji count. Returns an empty list
/// without running any rule when automod is disabled.
#[must_use]
pub fn evaluate(message: &MessageView, automod: &AutomodSettings) -> Vec<Violation> {
    if !automod.enabled {
        return Vec::new();
    }

    let mut violations = Vec::new();
    let content_lower = message.content.to_lowercase();

    for word in &automod.filter_words {
        if content_lower.contains(&word.to_lowercase()) {
            violations.push(Violation::FilteredWord(word.clone()));
        }
    }

    if automod.filter_invites && INVITE_RE.is_match(&message.content) {
        violations.push(Violation::InviteLink);
    }

    // A URL that is itself an invite is already reported above; only count a
    // violation here if some URL is not invite-shaped.
    if automod.filter_links
        && URL_RE
            .find_iter(&message.content)
            .any(|url| !INVITE_RE.is_match(url.as_str()))
    {
        violations.push(Violation::ExternalLink);
    }

    let mentions = message.mention_count();
    if mentions > automod.max_mentions {
        violations.push(Violation::TooManyMentions(mentions));
    }

    let emoji_count = CUSTOM_EMOJI_RE.find_iter(&message.content).count();
    if emoji_count > automod.max_emojis {
        violations.push(Violation::TooManyEmojis(emoji_count));
    }

    violations
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view(content: &str) -> MessageView {
        MessageView {
            guild_id: 1,
            channel_id: 2,
            message_id: 3,
            author_id: 4,
            author_name: "tester".to_string(),
            content: content.to_string(),
            user_mentions: 0,
            role_mentions: 0,
        }
    }

    fn enabled_automod() -> AutomodSettings {
        AutomodSettings {
            enabled: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_disabled_automod_short_circuits() {
        let mut automod = AutomodSettings::default();
        automod.filter_words = vec!["spam".to_string()];
        automod.filter_invites = true;
        automod.filter_links = true;
        automod.max_mentions = 0;
        assert!(!automod.enabled);

        let mut message = view("spam discord.gg/abc https://evil.example");
        message.user_mentions = 50;
        assert!(evaluate(&message, &automod).is_empty());
    }

    #[test]
    fn test_filtered_words_policy_order_case_insensitive() {
        let mut automod = enabled_automod();
        automod.filter_words = vec!["beta".to_string(), "alpha".to_string()];

        let violations = evaluate(&view("ALPHA then Beta"), &automod);
        assert_eq!(
            violations,
            vec![
                Violation::FilteredWord("beta".to_string()),
                Violation::FilteredWord("alpha".to_string()),
            ]
        );
    }

    #[test]
    fn test_one_entry_per_matched_word() {
        let mut automod = enabled_automod();
        automod.filter_words = vec!["spam".to_string()];

        let violations = evaluate(&view("spam spam spam"), &automod);
        assert_eq!(violations.len(), 1);
    }

    #[test]
    fn test_invite_link_scenario() {
        let mut automod = enabled_automod();
        automod.filter_invites = true;

        let violations = evaluate(&view("join us: discord.gg/abc123"), &automod);
        assert_eq!(violations, vec![Violation::InviteLink]);
        assert_eq!(join_violations(&violations), "Discord invite link");
    }

    #[test]
    fn test_invite_detection_is_case_insensitive() {
        let mut automod = enabled_automod();
        automod.filter_invites = true;

        assert_eq!(
            evaluate(&view("DISCORD.GG/HIDDEN"), &automod),
            vec![Violation::InviteLink]
        );
        assert_eq!(
            evaluate(&view("discordapp.com/invite/abc"), &automod),
            vec![Violation::InviteLink]
        );
    }

    #[test]
    fn test_external_link() {
        let mut automod = enabled_automod();
        automod.filter_links = true;

        assert_eq!(
            evaluate(&view("see https://example.com/page"), &automod),
            vec![Violation::ExternalLink]
        );
        assert!(evaluate(&view("no links here"), &automod).is_empty());
    }

    #[test]
    fn test_invite_url_is_not_double_reported() {
        let mut automod = enabled_automod();
        automod.filter_invites = true;
        automod.filter_links = true;

        let violations = evaluate(&view("https://discord.gg/abc123"), &automod);
        assert_eq!(violations, vec![Violation::InviteLink]);

        // A plain URL next to an invite still reports both
        let violations = evaluate(
            &view("https://discord.gg/abc123 and https://example.com"),
            &automod,
        );
        assert_eq!(
            violations,
            vec![Violation::InviteLink, Violation::ExternalLink]
        );
    }

    #[test]
    fn test_mention_count_boundary() {
        let automod = enabled_automod();

        let mut message = view("hello");
        message.user_mentions = 3;
        message.role_mentions = 2;
        // Exactly max_mentions does not violate
        assert!(evaluate(&message, &automod).is_empty());

        message.role_mentions = 3;
        assert_eq!(
            evaluate(&message, &automod),
            vec![Violation::TooManyMentions(6)]
        );
    }

    #[test]
    fn test_emoji_count() {
        let mut automod = enabled_automod();
        automod.max_emojis = 2;

        let under = "<:a:1> <:b:2>";
        assert!(evaluate(&view(under), &automod).is_empty());

        let over = "<:a:1> <:b:2> <:c:3>";
        assert_eq!(
            evaluate(&view(over), &automod),
            vec![Violation::TooManyEmojis(3)]
        );

        // Unicode emoji are not counted
        assert!(evaluate(&view("🔥🔥🔥🔥🔥"), &automod).is_empty());
    }

    #[test]
    fn test_all_rules_reported_in_order() {
        let mut automod = enabled_automod();
        automod.filter_words = vec!["bad".to_string()];
        automod.filter_invites = true;
        automod.filter_links = true;
        automod.max_mentions = 0;
        automod.max_emojis = 0;

        let mut message = view("bad discord.gg/x https://example.com <:e:9>");
        message.user_mentions = 1;

        let violations = evaluate(&message, &automod);
        assert_eq!(
            violations,
            vec![
                Violation::FilteredWord("bad".to_string()),
                Violation::InviteLink,
                Violation::ExternalLink,
                Violation::TooManyMentions(1),
                Violation::TooManyEmojis(1),
            ]
        );
        assert_eq!(
            join_violations(&violations),
            "Filtered word: bad, Discord invite link, External link, \
             Too many mentions (1), Too many emojis (1)"
        );
    }
}
