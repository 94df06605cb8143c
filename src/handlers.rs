use poise::serenity_prelude::{
    self as serenity, Context, EventHandler, GuildId, Member, Message, Reaction, Ready, User,
};
use tracing::{info, warn};

use crate::data::Data;
use crate::moderation::MessageView;
use crate::policy::render_template;

pub struct Handler;

async fn shared_data(ctx: &Context) -> Option<Data> {
    ctx.data.read().await.get::<Data>().cloned()
}

/// Guild name and member count, cloned out of the cache before any await.
fn guild_facts(ctx: &Context, guild_id: GuildId) -> (String, u64) {
    ctx.cache
        .guild(guild_id)
        .map(|guild| (guild.name.clone(), guild.member_count))
        .unwrap_or_else(|| (String::from("the server"), 0))
}

#[serenity::async_trait]
impl EventHandler for Handler {
    /// Called when the bot is ready, but the cache may not be fully populated yet.
    async fn ready(&self, ctx: Context, ready: Ready) {
        let user_name = ready.user.name.clone();
        let shard_id = ctx.shard_id;
        info!("Connected as {user_name}, shard {shard_id}");

        if let Some(data) = shared_data(&ctx).await {
            data.set_bot_user_id(ready.user.id.get());
        }
    }

    /// Called when the cache is fully populated.
    async fn cache_ready(&self, ctx: Context, guilds: Vec<GuildId>) {
        let guild_count_cache = ctx.cache.guild_count();
        let guild_count = guilds.len();
        if guild_count != guild_count_cache {
            warn!(
                "Cache guild count mismatch: {guild_count_cache} (cache) vs {guild_count} (actual)"
            );
        }
        info!("Cache ready! The bot is in {guild_count} guild(s)");
    }

    /// Every guild message runs through the automod rules.
    async fn message(&self, ctx: Context, msg: Message) {
        if msg.author.bot {
            return;
        }
        let Some(view) = MessageView::from_serenity(&msg) else {
            return;
        };
        let Some(data) = shared_data(&ctx).await else {
            return;
        };
        data.dispatcher.evaluate_and_dispatch(&view).await;
    }

    async fn reaction_add(&self, ctx: Context, reaction: Reaction) {
        let (Some(guild_id), Some(user_id)) = (reaction.guild_id, reaction.user_id) else {
            return;
        };
        if user_id == ctx.cache.current_user().id {
            return;
        }
        let Some(data) = shared_data(&ctx).await else {
            return;
        };
        data.reaction_roles
            .on_reaction_add(
                guild_id.get(),
                reaction.message_id.get(),
                &reaction.emoji.to_string(),
                user_id.get(),
            )
            .await;
    }

    async fn reaction_remove(&self, ctx: Context, reaction: Reaction) {
        let (Some(guild_id), Some(user_id)) = (reaction.guild_id, reaction.user_id) else {
            return;
        };
        if user_id == ctx.cache.current_user().id {
            return;
        }
        let Some(data) = shared_data(&ctx).await else {
            return;
        };
        data.reaction_roles
            .on_reaction_remove(
                guild_id.get(),
                reaction.message_id.get(),
                &reaction.emoji.to_string(),
                user_id.get(),
            )
            .await;
    }

    /// Autoroles and the welcome message.
    async fn guild_member_addition(&self, ctx: Context, member: Member) {
        let Some(data) = shared_data(&ctx).await else {
            return;
        };
        let guild_id = member.guild_id.get();
        let user_id = member.user.id.get();
        let policy = data.policies.get_or_init(guild_id);

        for role_id in &policy.moderation.autoroles {
            if let Err(e) = data
                .actuator
                .grant_role(guild_id, user_id, *role_id, "Autorole")
                .await
            {
                warn!(
                    target: crate::ERROR_TARGET,
                    user_id = %user_id,
                    role_id = %role_id,
                    error = %e,
                    "Failed to grant autorole"
                );
            }
        }

        let (Some(channel_id), Some(template)) = (
            policy.moderation.welcome_channel,
            policy.moderation.welcome_message.as_deref(),
        ) else {
            return;
        };
        let (guild_name, member_count) = guild_facts(&ctx, member.guild_id);
        let text = render_template(template, &format!("<@{user_id}>"), &guild_name, member_count);
        if let Err(e) = data.actuator.send_channel_message(channel_id, &text).await {
            warn!(
                target: crate::ERROR_TARGET,
                channel_id = %channel_id,
                error = %e,
                "Failed to send welcome message"
            );
        }
    }

    /// The leave message.
    async fn guild_member_removal(
        &self,
        ctx: Context,
        guild_id: GuildId,
        user: User,
        _member_data: Option<Member>,
    ) {
        let Some(data) = shared_data(&ctx).await else {
            return;
        };
        let policy = data.policies.get_or_init(guild_id.get());
        let (Some(channel_id), Some(template)) = (
            policy.moderation.leave_channel,
            policy.moderation.leave_message.as_deref(),
        ) else {
            return;
        };
        let (guild_name, member_count) = guild_facts(&ctx, guild_id);
        let text = render_template(template, &user.name, &guild_name, member_count);
        if let Err(e) = data.actuator.send_channel_message(channel_id, &text).await {
            warn!(
                target: crate::ERROR_TARGET,
                channel_id = %channel_id,
                error = %e,
                "Failed to send leave message"
            );
        }
    }
}
