//! Per-guild policy store
//!
//! Every guild the bot sees gets a `GuildPolicy` lazily on first access. The
//! store owns the only mutable copy; readers get clones and writers go through
//! `update`, which holds the map entry for the whole read-modify-write.

use std::{fmt, str::FromStr, sync::Arc};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// Punishment applied when automod finds violations in a message
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PunishmentLevel {
    #[default]
    Warn,
    Mute,
    Kick,
    Ban,
}

impl fmt::Display for PunishmentLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Warn => write!(f, "warn"),
            Self::Mute => write!(f, "mute"),
            Self::Kick => write!(f, "kick"),
            Self::Ban => write!(f, "ban"),
        }
    }
}

impl FromStr for PunishmentLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "warn" => Ok(Self::Warn),
            "mute" => Ok(Self::Mute),
            "kick" => Ok(Self::Kick),
            "ban" => Ok(Self::Ban),
            other => Err(format!("unknown punishment level: {other}")),
        }
    }
}

/// General moderation settings for a guild
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModerationSettings {
    /// Channel that receives audit-log entries
    pub log_channel: Option<u64>,
    /// Role granted to muted members
    pub mute_role: Option<u64>,
    pub welcome_channel: Option<u64>,
    pub welcome_message: Option<String>,
    pub leave_channel: Option<u64>,
    pub leave_message: Option<String>,
    /// Roles granted automatically on member join
    pub autoroles: Vec<u64>,
}

/// Automod settings for a guild
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomodSettings {
    pub enabled: bool,
    /// Lowercased blocklist, kept in insertion order
    pub filter_words: Vec<String>,
    pub filter_links: bool,
    pub filter_invites: bool,
    /// A message violates when its mention count exceeds this (strictly)
    pub max_mentions: usize,
    /// A message violates when its custom-emoji count exceeds this (strictly)
    pub max_emojis: usize,
    pub punishment: PunishmentLevel,
}

impl Default for AutomodSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            filter_words: Vec::new(),
            filter_links: false,
            filter_invites: false,
            max_mentions: 5,
            max_emojis: 10,
            punishment: PunishmentLevel::Warn,
        }
    }
}

/// Complete configuration for one guild
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GuildPolicy {
    pub moderation: ModerationSettings,
    pub automod: AutomodSettings,
}

/// Store of per-guild policies
#[derive(Clone, Default)]
pub struct PolicyStore {
    policies: Arc<DashMap<u64, GuildPolicy>>,
}

impl PolicyStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the policy for a guild, creating defaults on first access.
    /// Returns a snapshot; mutations go through [`Self::update`].
    #[must_use]
    pub fn get_or_init(&self, guild_id: u64) -> GuildPolicy {
        self.policies.entry(guild_id).or_default().clone()
    }

    /// Apply an atomic read-modify-write to a guild's policy. The map entry
    /// stays locked for the duration of the closure, so concurrent readers
    /// never observe a partial update.
    pub fn update(&self, guild_id: u64, mutate: impl FnOnce(&mut GuildPolicy)) {
        let mut entry = self.policies.entry(guild_id).or_default();
        mutate(entry.value_mut());
    }

    #[must_use]
    pub fn guild_count(&self) -> usize {
        self.policies.len()
    }
}

/// Substitute the `{user}`, `{server}`, and `{membercount}` placeholders in a
/// welcome or leave template.
#[must_use]
pub fn render_template(template: &str, user: &str, server: &str, member_count: u64) -> String {
    template
        .replace("{user}", user)
        .replace("{server}", server)
        .replace("{membercount}", &member_count.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_automod_defaults() {
        let automod = AutomodSettings::default();
        assert!(!automod.enabled);
        assert!(automod.filter_words.is_empty());
        assert!(!automod.filter_links);
        assert!(!automod.filter_invites);
        assert_eq!(automod.max_mentions, 5);
        assert_eq!(automod.max_emojis, 10);
        assert_eq!(automod.punishment, PunishmentLevel::Warn);
    }

    #[test]
    fn test_get_or_init_is_stable() {
        let store = PolicyStore::new();
        assert_eq!(store.guild_count(), 0);

        let first = store.get_or_init(42);
        assert!(first.moderation.mute_role.is_none());
        assert_eq!(store.guild_count(), 1);

        // A second access returns the same entry, not fresh defaults
        store.update(42, |policy| policy.moderation.mute_role = Some(7));
        assert_eq!(store.get_or_init(42).moderation.mute_role, Some(7));
        assert_eq!(store.guild_count(), 1);
    }

    #[test]
    fn test_update_initializes_absent_guilds() {
        let store = PolicyStore::new();
        store.update(9, |policy| {
            policy.automod.enabled = true;
            policy.automod.filter_words.push("spam".to_string());
        });

        let policy = store.get_or_init(9);
        assert!(policy.automod.enabled);
        assert_eq!(policy.automod.filter_words, vec!["spam".to_string()]);
    }

    #[test]
    fn test_punishment_level_round_trip() {
        for level in [
            PunishmentLevel::Warn,
            PunishmentLevel::Mute,
            PunishmentLevel::Kick,
            PunishmentLevel::Ban,
        ] {
            let parsed: PunishmentLevel = level.to_string().parse().unwrap();
            assert_eq!(parsed, level);
        }
        assert!("banish".parse::<PunishmentLevel>().is_err());
    }

    #[test]
    fn test_policy_serialization() {
        let mut policy = GuildPolicy::default();
        policy.moderation.log_channel = Some(1234);
        policy.automod.enabled = true;
        policy.automod.punishment = PunishmentLevel::Mute;

        let yaml = serde_yaml::to_string(&policy).expect("Failed to serialize");
        assert!(yaml.contains("log_channel: 1234"));
        assert!(yaml.contains("punishment: mute"));

        let back: GuildPolicy = serde_yaml::from_str(&yaml).expect("Failed to deserialize");
        assert_eq!(back.moderation.log_channel, Some(1234));
        assert_eq!(back.automod.punishment, PunishmentLevel::Mute);
    }

    #[test]
    fn test_render_template() {
        let rendered = render_template(
            "Welcome {user} to {server}! You are member #{membercount}.",
            "<@42>",
            "Test Guild",
            100,
        );
        assert_eq!(rendered, "Welcome <@42> to Test Guild! You are member #100.");
    }
}
