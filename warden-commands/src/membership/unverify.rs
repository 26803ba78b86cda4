use poise::serenity_prelude as serenity;

use warden_core::{Context, Error};
use warden_utils::permissions::has_user_permission;

use crate::CommandMeta;
use crate::membership::is_valid_minecraft_name;
use crate::usage_message;

pub const META: CommandMeta = CommandMeta {
    name: "unverify",
    desc: "Discard a pending verification session.",
    category: "membership",
    usage: "/unverify <minecraft name>",
};

#[poise::command(slash_command, prefix_command, category = "Membership")]
pub async fn unverify(
    ctx: Context<'_>,
    #[description = "Minecraft username with a pending session"] username: Option<String>,
) -> Result<(), Error> {
    let Some(guild_id) = ctx.guild_id() else {
        ctx.say("This command only works in a guild.").await?;
        return Ok(());
    };

    if !has_user_permission(
        ctx.http(),
        guild_id,
        ctx.author().id,
        serenity::Permissions::MANAGE_GUILD,
    )
    .await?
    {
        return Ok(());
    }

    let Some(username) = username else {
        ctx.say(usage_message(META.usage)).await?;
        return Ok(());
    };
    let username = username.trim().to_owned();

    if !is_valid_minecraft_name(&username) {
        ctx.say("That does not look like a Minecraft username.").await?;
        return Ok(());
    }

    let removed = ctx.data().warden.sessions().remove_session(&username).await;
    if removed {
        ctx.say(format!("Dropped the pending session for `{username}`."))
            .await?;
    } else {
        ctx.say(format!("No pending session for `{username}`.")).await?;
    }

    Ok(())
}
