//! Actuator and log-sink capabilities
//!
//! The core never talks to Discord directly; it goes through these traits so
//! the dispatcher and scheduler can be exercised against mocks. The serenity
//! implementations translate the plain-integer ids the core uses into typed
//! ids at the boundary.

#[cfg(test)]
use mockall::automock;
use poise::serenity_prelude::{
    self as serenity, ChannelId, GuildId, Http, MessageId, PermissionOverwrite,
    PermissionOverwriteType, Permissions, RoleId, UserId, builder::EditRole,
};
use std::sync::Arc;
use tracing::warn;

use crate::moderation::ModResult;
use crate::policy::PolicyStore;

/// Platform mutations the moderation core can request. Every method reports
/// failure through the result; none may panic or retry internally.
#[cfg_attr(test, automock)]
#[async_trait::async_trait]
pub trait Actuator: Send + Sync {
    async fn grant_role(&self, guild_id: u64, user_id: u64, role_id: u64, reason: &str)
    -> ModResult<()>;

    async fn revoke_role(
        &self,
        guild_id: u64,
        user_id: u64,
        role_id: u64,
        reason: &str,
    ) -> ModResult<()>;

    /// Create a role and return its id.
    async fn create_role(&self, guild_id: u64, name: &str, colour: u32, reason: &str)
    -> ModResult<u64>;

    async fn guild_channels(&self, guild_id: u64) -> ModResult<Vec<u64>>;

    /// Deny send/speak/react for a role on one channel.
    async fn deny_channel_for_role(&self, channel_id: u64, role_id: u64) -> ModResult<()>;

    async fn delete_message(&self, channel_id: u64, message_id: u64) -> ModResult<()>;

    async fn send_direct_message(&self, user_id: u64, text: &str) -> ModResult<()>;

    async fn send_channel_message(&self, channel_id: u64, text: &str) -> ModResult<()>;

    async fn kick_user(&self, guild_id: u64, user_id: u64, reason: &str) -> ModResult<()>;

    async fn ban_user(&self, guild_id: u64, user_id: u64, reason: &str) -> ModResult<()>;

    async fn unban_user(&self, guild_id: u64, user_id: u64) -> ModResult<()>;
}

/// Audit-log sink. Appending is best-effort and infallible from the caller's
/// point of view; delivery problems are logged and swallowed.
#[cfg_attr(test, automock)]
#[async_trait::async_trait]
pub trait LogSink: Send + Sync {
    async fn append(&self, guild_id: u64, text: &str);
}

/// Actuator backed by the serenity HTTP client
pub struct SerenityActuator {
    http: Arc<Http>,
}

impl SerenityActuator {
    #[must_use]
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

#[async_trait::async_trait]
impl Actuator for SerenityActuator {
    async fn grant_role(
        &self,
        guild_id: u64,
        user_id: u64,
        role_id: u64,
        reason: &str,
    ) -> ModResult<()> {
        self.http
            .add_member_role(
                GuildId::new(guild_id),
                UserId::new(user_id),
                RoleId::new(role_id),
                Some(reason),
            )
            .await?;
        Ok(())
    }

    async fn revoke_role(
        &self,
        guild_id: u64,
        user_id: u64,
        role_id: u64,
        reason: &str,
    ) -> ModResult<()> {
        self.http
            .remove_member_role(
                GuildId::new(guild_id),
                UserId::new(user_id),
                RoleId::new(role_id),
                Some(reason),
            )
            .await?;
        Ok(())
    }

    async fn create_role(
        &self,
        guild_id: u64,
        name: &str,
        colour: u32,
        reason: &str,
    ) -> ModResult<u64> {
        let role = GuildId::new(guild_id)
            .create_role(
                &self.http,
                EditRole::new()
                    .name(name)
                    .colour(colour)
                    .audit_log_reason(reason),
            )
            .await?;
        Ok(role.id.get())
    }

    async fn guild_channels(&self, guild_id: u64) -> ModResult<Vec<u64>> {
        let channels = self.http.get_channels(GuildId::new(guild_id)).await?;
        Ok(channels.iter().map(|channel| channel.id.get()).collect())
    }

    async fn deny_channel_for_role(&self, channel_id: u64, role_id: u64) -> ModResult<()> {
        ChannelId::new(channel_id)
            .create_permission(
                &self.http,
                PermissionOverwrite {
                    allow: Permissions::empty(),
                    deny: Permissions::SEND_MESSAGES
                        | Permissions::SPEAK
                        | Permissions::ADD_REACTIONS,
                    kind: PermissionOverwriteType::Role(RoleId::new(role_id)),
                },
            )
            .await?;
        Ok(())
    }

    async fn delete_message(&self, channel_id: u64, message_id: u64) -> ModResult<()> {
        self.http
            .delete_message(ChannelId::new(channel_id), MessageId::new(message_id), None)
            .await?;
        Ok(())
    }

    async fn send_direct_message(&self, user_id: u64, text: &str) -> ModResult<()> {
        let channel = UserId::new(user_id).create_dm_channel(&self.http).await?;
        channel.id.say(&self.http, text).await?;
        Ok(())
    }

    async fn send_channel_message(&self, channel_id: u64, text: &str) -> ModResult<()> {
        ChannelId::new(channel_id).say(&self.http, text).await?;
        Ok(())
    }

    async fn kick_user(&self, guild_id: u64, user_id: u64, reason: &str) -> ModResult<()> {
        GuildId::new(guild_id)
            .kick_with_reason(&self.http, UserId::new(user_id), reason)
            .await?;
        Ok(())
    }

    async fn ban_user(&self, guild_id: u64, user_id: u64, reason: &str) -> ModResult<()> {
        GuildId::new(guild_id)
            .ban_with_reason(&self.http, UserId::new(user_id), 0, reason)
            .await?;
        Ok(())
    }

    async fn unban_user(&self, guild_id: u64, user_id: u64) -> ModResult<()> {
        GuildId::new(guild_id)
            .unban(&self.http, UserId::new(user_id))
            .await?;
        Ok(())
    }
}

/// Log sink that posts to each guild's configured log channel. No-op for
/// guilds without one.
pub struct ChannelLogSink {
    http: Arc<Http>,
    policies: PolicyStore,
}

impl ChannelLogSink {
    #[must_use]
    pub fn new(http: Arc<Http>, policies: PolicyStore) -> Self {
        Self { http, policies }
    }
}

#[async_trait::async_trait]
impl LogSink for ChannelLogSink {
    async fn append(&self, guild_id: u64, text: &str) {
        let Some(log_channel) = self.policies.get_or_init(guild_id).moderation.log_channel else {
            return;
        };

        if let Err(e) = ChannelId::new(log_channel)
            .send_message(
                &self.http,
                serenity::CreateMessage::new()
                    .embed(serenity::CreateEmbed::new().description(text).timestamp(
                        serenity::Timestamp::now(),
                    )),
            )
            .await
        {
            warn!(
                target: crate::ERROR_TARGET,
                guild_id = %guild_id,
                error = %e,
                "Failed to append to the log channel"
            );
        }
    }
}
