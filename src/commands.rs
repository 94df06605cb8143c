use chrono::Utc;
use poise::command;
use poise::serenity_prelude as serenity;

use crate::moderation::ModerationError;
use crate::{Context, Error};

const INVALID_DURATION_REPLY: &str =
    "Invalid duration format! Use formats like `1h`, `30m`, `1d`.";

fn guild_id(ctx: &Context<'_>) -> Result<u64, Error> {
    ctx.guild_id()
        .map(|id| id.get())
        .ok_or_else(|| Error::from("This command can only be used in a server"))
}

/// Basic ping command
/// This command is used to check if the bot is responsive.
#[command(prefix_command, slash_command, guild_only)]
pub async fn ping(ctx: Context<'_>) -> Result<(), Error> {
    ctx.say("Pong!").await?;
    Ok(())
}

/// Warn a user
#[command(
    prefix_command,
    slash_command,
    guild_only,
    required_permissions = "KICK_MEMBERS"
)]
pub async fn warn(
    ctx: Context<'_>,
    #[description = "User to warn"] user: serenity::User,
    #[description = "Reason for the warning"] reason: String,
) -> Result<(), Error> {
    let guild_id = guild_id(&ctx)?;
    let total = ctx
        .data()
        .dispatcher
        .record_warning(
            guild_id,
            user.id.get(),
            ctx.author().id.get(),
            &ctx.author().name,
            &reason,
        )
        .await;
    ctx.say(format!(
        "⚠️ **{}** has been warned ({total} total). Reason: {reason}",
        user.name
    ))
    .await?;
    Ok(())
}

/// List a user's warnings
#[command(prefix_command, slash_command, guild_only)]
pub async fn warnings(
    ctx: Context<'_>,
    #[description = "User to look up"] user: serenity::User,
) -> Result<(), Error> {
    let guild_id = guild_id(&ctx)?;
    let records = ctx.data().dispatcher.list_warnings(guild_id, user.id.get());
    if records.is_empty() {
        ctx.say(format!("**{}** has no warnings.", user.name)).await?;
        return Ok(());
    }

    let mut lines = vec![format!("Warnings for **{}**:", user.name)];
    for (i, record) in records.iter().enumerate() {
        lines.push(format!(
            "{}. {} — <@{}> at {}",
            i + 1,
            record.reason,
            record.moderator_id,
            record.timestamp.format("%Y-%m-%d %H:%M UTC")
        ));
    }
    ctx.say(lines.join("\n")).await?;
    Ok(())
}

/// Mute a user, optionally for a limited time
#[command(
    prefix_command,
    slash_command,
    guild_only,
    required_permissions = "MODERATE_MEMBERS"
)]
pub async fn mute(
    ctx: Context<'_>,
    #[description = "User to mute"] user: serenity::User,
    #[description = "Duration like 30m, 2h or 1d (omit for permanent)"] duration: Option<String>,
    #[description = "Reason for the mute"] reason: Option<String>,
) -> Result<(), Error> {
    let guild_id = guild_id(&ctx)?;
    let reason = reason.unwrap_or_else(|| "No reason given".to_string());
    let outcome = ctx
        .data()
        .dispatcher
        .mute_user(
            guild_id,
            user.id.get(),
            duration.as_deref(),
            &reason,
            &ctx.author().name,
            Utc::now(),
        )
        .await?;

    match outcome.expires_at {
        Some(expires_at) => {
            ctx.say(format!(
                "🔇 **{}** has been muted until {}.",
                user.name,
                expires_at.format("%Y-%m-%d %H:%M UTC")
            ))
            .await?;
        }
        None => {
            ctx.say(format!("🔇 **{}** has been muted permanently.", user.name))
                .await?;
        }
    }
    Ok(())
}

/// Unmute a user
#[command(
    prefix_command,
    slash_command,
    guild_only,
    required_permissions = "MODERATE_MEMBERS"
)]
pub async fn unmute(
    ctx: Context<'_>,
    #[description = "User to unmute"] user: serenity::User,
    #[description = "Reason"] reason: Option<String>,
) -> Result<(), Error> {
    let guild_id = guild_id(&ctx)?;
    let reason = reason.unwrap_or_else(|| "No reason given".to_string());
    let revoked = ctx
        .data()
        .dispatcher
        .unmute_user(guild_id, user.id.get(), &reason, &ctx.author().name)
        .await?;
    if revoked {
        ctx.say(format!("🔊 **{}** has been unmuted.", user.name)).await?;
    } else {
        ctx.say("This server has no mute role configured.").await?;
    }
    Ok(())
}

/// Kick a user from the server
#[command(
    prefix_command,
    slash_command,
    guild_only,
    required_permissions = "KICK_MEMBERS"
)]
pub async fn kick(
    ctx: Context<'_>,
    #[description = "User to kick"] user: serenity::User,
    #[description = "Reason"] reason: Option<String>,
) -> Result<(), Error> {
    let guild_id = guild_id(&ctx)?;
    let reason = reason.unwrap_or_else(|| "No reason given".to_string());
    ctx.data()
        .dispatcher
        .kick_user(guild_id, user.id.get(), &reason, &ctx.author().name)
        .await?;
    ctx.say(format!("👢 **{}** has been kicked. Reason: {reason}", user.name))
        .await?;
    Ok(())
}

/// Ban a user from the server
#[command(
    prefix_command,
    slash_command,
    guild_only,
    required_permissions = "BAN_MEMBERS"
)]
pub async fn ban(
    ctx: Context<'_>,
    #[description = "User to ban"] user: serenity::User,
    #[description = "Reason"] reason: Option<String>,
) -> Result<(), Error> {
    let guild_id = guild_id(&ctx)?;
    let reason = reason.unwrap_or_else(|| "No reason given".to_string());
    ctx.data()
        .dispatcher
        .ban_user(guild_id, user.id.get(), &reason, &ctx.author().name)
        .await?;
    ctx.say(format!("🔨 **{}** has been banned. Reason: {reason}", user.name))
        .await?;
    Ok(())
}

/// Unban a user
#[command(
    prefix_command,
    slash_command,
    guild_only,
    required_permissions = "BAN_MEMBERS"
)]
pub async fn unban(
    ctx: Context<'_>,
    #[description = "Id of the user to unban"] user_id: String,
) -> Result<(), Error> {
    let guild_id = guild_id(&ctx)?;
    let user_id: u64 = user_id
        .parse()
        .map_err(|_| Error::from("That is not a valid user id"))?;
    ctx.data()
        .dispatcher
        .unban_user(guild_id, user_id, &ctx.author().name)
        .await?;
    ctx.say(format!("<@{user_id}> has been unbanned.")).await?;
    Ok(())
}

/// Schedule a reminder
#[command(prefix_command, slash_command, guild_only)]
pub async fn remind(
    ctx: Context<'_>,
    #[description = "When, like 45s, 10m, 2h or 1d"] duration: String,
    #[description = "What to remind you about"]
    #[rest]
    text: String,
) -> Result<(), Error> {
    let result = ctx.data().reminders.schedule(
        ctx.author().id.get(),
        ctx.channel_id().get(),
        &duration,
        &text,
        Utc::now(),
    );
    match result {
        Ok(_) => {
            ctx.say(format!("⏰ Okay, I'll remind you in {duration}.")).await?;
        }
        Err(ModerationError::InvalidDuration(_)) => {
            ctx.say(INVALID_DURATION_REPLY).await?;
        }
        Err(e) => return Err(Box::new(e)),
    }
    Ok(())
}

/// Configure the automod
#[command(
    slash_command,
    prefix_command,
    guild_only,
    required_permissions = "MANAGE_GUILD",
    subcommands(
        "automod_show",
        "automod_enable",
        "automod_disable",
        "automod_addword",
        "automod_removeword"
    ),
    subcommand_required
)]
pub async fn automod(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Show the current automod settings
#[command(slash_command, prefix_command, guild_only, rename = "show")]
pub async fn automod_show(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = guild_id(&ctx)?;
    let automod = ctx.data().policies.get_or_init(guild_id).automod;
    let words = if automod.filter_words.is_empty() {
        "(none)".to_string()
    } else {
        automod.filter_words.join(", ")
    };
    ctx.say(format!(
        "**AutoMod settings**\n\
         Enabled: {}\n\
         Filtered words: {words}\n\
         Filter links: {}\n\
         Filter invites: {}\n\
         Max mentions: {}\n\
         Max emojis: {}\n\
         Punishment: {}",
        automod.enabled,
        automod.filter_links,
        automod.filter_invites,
        automod.max_mentions,
        automod.max_emojis,
        automod.punishment
    ))
    .await?;
    Ok(())
}

/// Turn the automod on
#[command(slash_command, prefix_command, guild_only, rename = "enable")]
pub async fn automod_enable(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = guild_id(&ctx)?;
    ctx.data()
        .policies
        .update(guild_id, |policy| policy.automod.enabled = true);
    ctx.say("✅ AutoMod is now enabled.").await?;
    Ok(())
}

/// Turn the automod off
#[command(slash_command, prefix_command, guild_only, rename = "disable")]
pub async fn automod_disable(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = guild_id(&ctx)?;
    ctx.data()
        .policies
        .update(guild_id, |policy| policy.automod.enabled = false);
    ctx.say("AutoMod is now disabled.").await?;
    Ok(())
}

/// Add a filtered word
#[command(slash_command, prefix_command, guild_only, rename = "addword")]
pub async fn automod_addword(
    ctx: Context<'_>,
    #[description = "Word to filter"] word: String,
) -> Result<(), Error> {
    let guild_id = guild_id(&ctx)?;
    let word = word.to_lowercase();
    let mut added = false;
    ctx.data().policies.update(guild_id, |policy| {
        if !policy.automod.filter_words.contains(&word) {
            policy.automod.filter_words.push(word.clone());
            added = true;
        }
    });
    if added {
        ctx.say(format!("Added `{word}` to the filter.")).await?;
    } else {
        ctx.say(format!("`{word}` is already filtered.")).await?;
    }
    Ok(())
}

/// Remove a filtered word
#[command(slash_command, prefix_command, guild_only, rename = "removeword")]
pub async fn automod_removeword(
    ctx: Context<'_>,
    #[description = "Word to stop filtering"] word: String,
) -> Result<(), Error> {
    let guild_id = guild_id(&ctx)?;
    let word = word.to_lowercase();
    let mut removed = false;
    ctx.data().policies.update(guild_id, |policy| {
        let before = policy.automod.filter_words.len();
        policy.automod.filter_words.retain(|w| w != &word);
        removed = policy.automod.filter_words.len() != before;
    });
    if removed {
        ctx.say(format!("Removed `{word}` from the filter.")).await?;
    } else {
        ctx.say(format!("`{word}` was not filtered.")).await?;
    }
    Ok(())
}

/// Configure server channels and messages
#[command(
    slash_command,
    prefix_command,
    guild_only,
    required_permissions = "MANAGE_GUILD",
    subcommands("config_log", "config_welcome", "config_leave"),
    subcommand_required
)]
pub async fn config(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Set the moderation log channel
#[command(slash_command, prefix_command, guild_only, rename = "log")]
pub async fn config_log(
    ctx: Context<'_>,
    #[description = "Channel for moderation logs"] channel: serenity::GuildChannel,
) -> Result<(), Error> {
    let guild_id = guild_id(&ctx)?;
    ctx.data().policies.update(guild_id, |policy| {
        policy.moderation.log_channel = Some(channel.id.get());
    });
    ctx.say(format!("Moderation logs will go to <#{}>.", channel.id))
        .await?;
    Ok(())
}

/// Set the welcome channel and message
#[command(slash_command, prefix_command, guild_only, rename = "welcome")]
pub async fn config_welcome(
    ctx: Context<'_>,
    #[description = "Channel for welcome messages"] channel: serenity::GuildChannel,
    #[description = "Template; {user}, {server} and {membercount} are substituted"]
    #[rest]
    message: String,
) -> Result<(), Error> {
    let guild_id = guild_id(&ctx)?;
    ctx.data().policies.update(guild_id, |policy| {
        policy.moderation.welcome_channel = Some(channel.id.get());
        policy.moderation.welcome_message = Some(message.clone());
    });
    ctx.say(format!("Welcome messages will go to <#{}>.", channel.id))
        .await?;
    Ok(())
}

/// Set the leave channel and message
#[command(slash_command, prefix_command, guild_only, rename = "leave")]
pub async fn config_leave(
    ctx: Context<'_>,
    #[description = "Channel for leave messages"] channel: serenity::GuildChannel,
    #[description = "Template; {user}, {server} and {membercount} are substituted"]
    #[rest]
    message: String,
) -> Result<(), Error> {
    let guild_id = guild_id(&ctx)?;
    ctx.data().policies.update(guild_id, |policy| {
        policy.moderation.leave_channel = Some(channel.id.get());
        policy.moderation.leave_message = Some(message.clone());
    });
    ctx.say(format!("Leave messages will go to <#{}>.", channel.id))
        .await?;
    Ok(())
}

/// Manage reaction roles
#[command(
    slash_command,
    prefix_command,
    guild_only,
    required_permissions = "MANAGE_ROLES",
    subcommands("reactionrole_add", "reactionrole_remove", "reactionrole_list"),
    subcommand_required
)]
pub async fn reactionrole(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

fn parse_message_id(raw: &str) -> Result<u64, Error> {
    raw.parse()
        .map_err(|_| Error::from("That is not a valid message id"))
}

/// Bind an emoji on a message to a role
#[command(slash_command, prefix_command, guild_only, rename = "add")]
pub async fn reactionrole_add(
    ctx: Context<'_>,
    #[description = "Id of the message to watch"] message_id: String,
    #[description = "Emoji to react with"] emoji: String,
    #[description = "Role to grant"] role: serenity::Role,
) -> Result<(), Error> {
    let message_id = parse_message_id(&message_id)?;
    ctx.data()
        .reaction_roles
        .bind(message_id, &emoji, role.id.get());
    ctx.say(format!(
        "Reacting with {emoji} on message `{message_id}` now grants **{}**.",
        role.name
    ))
    .await?;
    Ok(())
}

/// Remove a reaction-role binding
#[command(slash_command, prefix_command, guild_only, rename = "remove")]
pub async fn reactionrole_remove(
    ctx: Context<'_>,
    #[description = "Id of the watched message"] message_id: String,
    #[description = "Bound emoji"] emoji: String,
) -> Result<(), Error> {
    let message_id = parse_message_id(&message_id)?;
    match ctx.data().reaction_roles.unbind(message_id, &emoji) {
        Some(role_id) => {
            ctx.say(format!(
                "{emoji} on message `{message_id}` no longer grants <@&{role_id}>."
            ))
            .await?;
        }
        None => {
            ctx.say("No such binding.").await?;
        }
    }
    Ok(())
}

/// List the bindings on a message
#[command(slash_command, prefix_command, guild_only, rename = "list")]
pub async fn reactionrole_list(
    ctx: Context<'_>,
    #[description = "Id of the watched message"] message_id: String,
) -> Result<(), Error> {
    let message_id = parse_message_id(&message_id)?;
    let bindings = ctx.data().reaction_roles.bindings_for_message(message_id);
    if bindings.is_empty() {
        ctx.say("No bindings on that message.").await?;
        return Ok(());
    }
    let lines: Vec<String> = bindings
        .iter()
        .map(|b| format!("{} → <@&{}>", b.emoji, b.role_id))
        .collect();
    ctx.say(lines.join("\n")).await?;
    Ok(())
}

/// All commands, for framework registration.
#[must_use]
pub fn all() -> Vec<poise::Command<crate::Data, Error>> {
    vec![
        ping(),
        warn(),
        warnings(),
        mute(),
        unmute(),
        kick(),
        ban(),
        unban(),
        remind(),
        automod(),
        config(),
        reactionrole(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    // Test that the ping command is properly defined
    #[test]
    fn test_ping_command_definition() {
        let cmd = ping();
        assert_eq!(cmd.name, "ping");
        assert!(cmd.guild_only);
    }

    #[test]
    fn test_all_commands_are_registered() {
        let names: Vec<String> = all().into_iter().map(|c| c.name).collect();
        for expected in [
            "ping",
            "warn",
            "warnings",
            "mute",
            "unmute",
            "kick",
            "ban",
            "unban",
            "remind",
            "automod",
            "config",
            "reactionrole",
        ] {
            assert!(names.iter().any(|n| n == expected), "missing {expected}");
        }
    }

    #[test]
    fn test_subcommands_are_attached() {
        let automod = automod();
        let subcommands: Vec<&str> =
            automod.subcommands.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(
            subcommands,
            vec!["show", "enable", "disable", "addword", "removeword"]
        );

        let config = config();
        assert_eq!(config.subcommands.len(), 3);
        assert_eq!(reactionrole().subcommands.len(), 3);
    }

    #[test]
    fn test_commands_create_as_slash_commands() {
        for cmd in all() {
            assert!(cmd.create_as_slash_command().is_some(), "{}", cmd.name);
        }
    }
}
