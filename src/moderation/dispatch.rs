//! Punishment dispatch
//!
//! Turns rule violations into side effects: message deletion, audit logging,
//! the configured punishment, and a courtesy DM to the offender. Every step
//! is best-effort and isolated — a failing actuator call is logged and the
//! remaining steps still run. Nothing in here can fail the message pipeline.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::moderation::{
    ModResult,
    actuator::{Actuator, LogSink},
    duration::parse_duration,
    ledger::{MuteRecord, ViolationLedger, ViolationRecord},
    rules::{self, MessageView, Violation},
};
use crate::policy::{PolicyStore, PunishmentLevel};

/// Name and colour of the synthesized mute role
pub const MUTE_ROLE_NAME: &str = "Muted";
pub const MUTE_ROLE_COLOUR: u32 = 0x0081_8386;

/// Summary of one automod dispatch
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    pub violations: Vec<Violation>,
    pub punishment: PunishmentLevel,
    pub message_deleted: bool,
    pub user_notified: bool,
}

/// Result of a mute operation
#[derive(Debug, Clone)]
pub struct MuteOutcome {
    pub role_id: u64,
    /// `None` means a permanent mute: no timer was set and the scheduler
    /// will never touch this subject.
    pub expires_at: Option<DateTime<Utc>>,
}

/// Applies punishments and runs the manual moderation operations
#[derive(Clone)]
pub struct Dispatcher {
    policies: PolicyStore,
    ledger: ViolationLedger,
    actuator: Arc<dyn Actuator>,
    log: Arc<dyn LogSink>,
    /// The bot's own user id, used to attribute automod punishments
    bot_user_id: Arc<AtomicU64>,
}

impl Dispatcher {
    #[must_use]
    pub fn new(
        policies: PolicyStore,
        ledger: ViolationLedger,
        actuator: Arc<dyn Actuator>,
        log: Arc<dyn LogSink>,
    ) -> Self {
        Self {
            policies,
            ledger,
            actuator,
            log,
            bot_user_id: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Record the bot's own identity once the gateway reports it
    pub fn set_bot_user_id(&self, id: u64) {
        self.bot_user_id.store(id, Ordering::Relaxed);
    }

    #[must_use]
    pub fn synthetic_moderator_id(&self) -> u64 {
        self.bot_user_id.load(Ordering::Relaxed)
    }

    /// Entry point for inbound guild messages. Evaluates the guild's automod
    /// rules and, if any match, dispatches the configured punishment.
    pub async fn evaluate_and_dispatch(&self, message: &MessageView) -> Option<DispatchOutcome> {
        let automod = self.policies.get_or_init(message.guild_id).automod;
        let violations = rules::evaluate(message, &automod);
        if violations.is_empty() {
            return None;
        }
        Some(self.dispatch(message, violations, automod.punishment).await)
    }

    /// Apply a punishment for the given violations. Infallible by contract:
    /// each side effect is attempted in order and failures never propagate.
    pub async fn dispatch(
        &self,
        message: &MessageView,
        violations: Vec<Violation>,
        punishment: PunishmentLevel,
    ) -> DispatchOutcome {
        let violation_text = rules::join_violations(&violations);

        // The message may already be gone; that is fine.
        let message_deleted = match self
            .actuator
            .delete_message(message.channel_id, message.message_id)
            .await
        {
            Ok(()) => true,
            Err(e) => {
                info!(
                    target: crate::EVENT_TARGET,
                    message_id = %message.message_id,
                    error = %e,
                    "Could not delete offending message"
                );
                false
            }
        };

        self.log
            .append(
                message.guild_id,
                &format!(
                    "**AutoMod:** Deleted message from **{}** in <#{}>\nViolations: {violation_text}",
                    message.author_name, message.channel_id
                ),
            )
            .await;

        match punishment {
            PunishmentLevel::Warn => {
                self.ledger.record_warning(ViolationRecord {
                    guild_id: message.guild_id,
                    user_id: message.author_id,
                    reason: format!("AutoMod violation: {violation_text}"),
                    moderator_id: self.synthetic_moderator_id(),
                    timestamp: Utc::now(),
                });
            }
            PunishmentLevel::Mute => {
                // Automod mutes are permanent until a moderator unmutes;
                // no MuteRecord is created and the sweeper never fires one.
                match self.ensure_mute_role(message.guild_id).await {
                    Ok(role_id) => {
                        if let Err(e) = self
                            .actuator
                            .grant_role(
                                message.guild_id,
                                message.author_id,
                                role_id,
                                &format!("AutoMod violation: {violation_text}"),
                            )
                            .await
                        {
                            warn!(
                                target: crate::ERROR_TARGET,
                                user_id = %message.author_id,
                                error = %e,
                                "Failed to grant mute role for automod violation"
                            );
                        }
                    }
                    Err(e) => {
                        warn!(
                            target: crate::ERROR_TARGET,
                            guild_id = %message.guild_id,
                            error = %e,
                            "Failed to resolve a mute role for automod violation"
                        );
                    }
                }
            }
            PunishmentLevel::Kick => {
                if let Err(e) = self
                    .actuator
                    .kick_user(
                        message.guild_id,
                        message.author_id,
                        &format!("AutoMod violation: {violation_text}"),
                    )
                    .await
                {
                    warn!(
                        target: crate::ERROR_TARGET,
                        user_id = %message.author_id,
                        error = %e,
                        "Failed to kick user for automod violation"
                    );
                }
            }
            PunishmentLevel::Ban => {
                if let Err(e) = self
                    .actuator
                    .ban_user(
                        message.guild_id,
                        message.author_id,
                        &format!("AutoMod violation: {violation_text}"),
                    )
                    .await
                {
                    warn!(
                        target: crate::ERROR_TARGET,
                        user_id = %message.author_id,
                        error = %e,
                        "Failed to ban user for automod violation"
                    );
                }
            }
        }

        // The user may have DMs closed; never let that surface.
        let user_notified = self
            .actuator
            .send_direct_message(
                message.author_id,
                &format!(
                    "Your message was deleted for violating server rules.\nViolations: {violation_text}"
                ),
            )
            .await
            .is_ok();

        info!(
            target: crate::EVENT_TARGET,
            guild_id = %message.guild_id,
            user_id = %message.author_id,
            punishment = %punishment,
            violations = %violation_text,
            "AutoMod punishment dispatched"
        );

        DispatchOutcome {
            violations,
            punishment,
            message_deleted,
            user_notified,
        }
    }

    /// Resolve the guild's mute role, synthesizing one if none is configured.
    ///
    /// The created role id is committed to the policy before the per-channel
    /// permission loop runs: permission overrides are idempotent and
    /// re-runnable, while creating a second role is not.
    pub async fn ensure_mute_role(&self, guild_id: u64) -> ModResult<u64> {
        if let Some(role_id) = self.policies.get_or_init(guild_id).moderation.mute_role {
            return Ok(role_id);
        }

        let role_id = self
            .actuator
            .create_role(guild_id, MUTE_ROLE_NAME, MUTE_ROLE_COLOUR, "Auto-created mute role")
            .await?;

        self.policies
            .update(guild_id, |policy| policy.moderation.mute_role = Some(role_id));

        match self.actuator.guild_channels(guild_id).await {
            Ok(channels) => {
                for channel_id in channels {
                    if let Err(e) = self.actuator.deny_channel_for_role(channel_id, role_id).await {
                        warn!(
                            target: crate::ERROR_TARGET,
                            channel_id = %channel_id,
                            error = %e,
                            "Failed to set mute-role overrides on channel"
                        );
                    }
                }
            }
            Err(e) => {
                warn!(
                    target: crate::ERROR_TARGET,
                    guild_id = %guild_id,
                    error = %e,
                    "Failed to list channels for mute-role overrides"
                );
            }
        }

        Ok(role_id)
    }

    /// Mute a user, optionally with a timed expiry.
    ///
    /// An unparseable duration still applies the role — the mute simply has
    /// no timer and the scheduler never touches it.
    pub async fn mute_user(
        &self,
        guild_id: u64,
        user_id: u64,
        duration: Option<&str>,
        reason: &str,
        moderator_name: &str,
        now: DateTime<Utc>,
    ) -> ModResult<MuteOutcome> {
        let role_id = self.ensure_mute_role(guild_id).await?;
        self.actuator
            .grant_role(guild_id, user_id, role_id, reason)
            .await?;

        let expires_at = duration
            .and_then(parse_duration)
            .map(|duration| now + duration);

        if let Some(expires_at) = expires_at {
            self.ledger.set_mute(MuteRecord {
                user_id,
                guild_id,
                expires_at,
                role_id,
            });
        }

        let duration_text = match duration {
            Some(text) if expires_at.is_some() => text.to_string(),
            _ => "Permanent".to_string(),
        };
        self.log
            .append(
                guild_id,
                &format!(
                    "<@{user_id}> was muted by **{moderator_name}**\nDuration: {duration_text}\nReason: {reason}"
                ),
            )
            .await;

        Ok(MuteOutcome { role_id, expires_at })
    }

    /// Remove a user's mute role and drop any pending expiry. Returns `true`
    /// if a role revoke was issued.
    pub async fn unmute_user(
        &self,
        guild_id: u64,
        user_id: u64,
        reason: &str,
        moderator_name: &str,
    ) -> ModResult<bool> {
        // Clear the timer first so a failing revoke cannot leave a stale
        // expiry that fires against an unmuted user.
        self.ledger.clear_mute(user_id);

        let Some(role_id) = self.policies.get_or_init(guild_id).moderation.mute_role else {
            return Ok(false);
        };

        self.actuator
            .revoke_role(guild_id, user_id, role_id, reason)
            .await?;
        self.log
            .append(
                guild_id,
                &format!("<@{user_id}> was unmuted by **{moderator_name}**\nReason: {reason}"),
            )
            .await;
        Ok(true)
    }

    /// Append a manual warning. Returns the user's warning total afterwards.
    pub async fn record_warning(
        &self,
        guild_id: u64,
        user_id: u64,
        moderator_id: u64,
        moderator_name: &str,
        reason: &str,
    ) -> usize {
        let total = self.ledger.record_warning(ViolationRecord {
            guild_id,
            user_id,
            reason: reason.to_string(),
            moderator_id,
            timestamp: Utc::now(),
        });
        self.log
            .append(
                guild_id,
                &format!("<@{user_id}> was warned by **{moderator_name}**\nReason: {reason}"),
            )
            .await;
        total
    }

    /// A user's warnings in one guild, oldest first.
    #[must_use]
    pub fn list_warnings(&self, guild_id: u64, user_id: u64) -> Vec<ViolationRecord> {
        self.ledger.warnings_for(guild_id, user_id)
    }

    pub async fn kick_user(
        &self,
        guild_id: u64,
        user_id: u64,
        reason: &str,
        moderator_name: &str,
    ) -> ModResult<()> {
        self.actuator.kick_user(guild_id, user_id, reason).await?;
        self.log
            .append(
                guild_id,
                &format!("<@{user_id}> was kicked by **{moderator_name}**\nReason: {reason}"),
            )
            .await;
        Ok(())
    }

    pub async fn ban_user(
        &self,
        guild_id: u64,
        user_id: u64,
        reason: &str,
        moderator_name: &str,
    ) -> ModResult<()> {
        self.actuator.ban_user(guild_id, user_id, reason).await?;
        self.log
            .append(
                guild_id,
                &format!("<@{user_id}> was banned by **{moderator_name}**\nReason: {reason}"),
            )
            .await;
        Ok(())
    }

    pub async fn unban_user(
        &self,
        guild_id: u64,
        user_id: u64,
        moderator_name: &str,
    ) -> ModResult<()> {
        self.actuator.unban_user(guild_id, user_id).await?;
        self.log
            .append(
                guild_id,
                &format!("<@{user_id}> was unbanned by **{moderator_name}**"),
            )
            .await;
        Ok(())
    }

    #[must_use]
    pub fn ledger(&self) -> &ViolationLedger {
        &self.ledger
    }

    #[must_use]
    pub fn policies(&self) -> &PolicyStore {
        &self.policies
    }
}
