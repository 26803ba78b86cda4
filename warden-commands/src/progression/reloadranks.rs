use poise::serenity_prelude as serenity;

use warden_core::{Context, Error};
use warden_utils::permissions::has_user_permission;

use crate::CommandMeta;

pub const META: CommandMeta = CommandMeta {
    name: "reloadranks",
    desc: "Rebuild the rank definition cache from storage.",
    category: "progression",
    usage: "/reloadranks",
};

#[poise::command(slash_command, prefix_command, category = "Progression")]
pub async fn reloadranks(ctx: Context<'_>) -> Result<(), Error> {
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

    let count = ctx.data().warden.reload_rank_definitions().await?;
    ctx.say(format!("Rank definitions reloaded: {count} entries."))
        .await?;

    Ok(())
}
