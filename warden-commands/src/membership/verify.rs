use warden_core::{Context, Error};
use warden_utils::embed::build_embed_with_footer;
use warden_utils::formatting::format_playtime;
use warden_utils::time::now_unix_secs;

use crate::CommandMeta;
use crate::membership::is_valid_minecraft_name;
use crate::usage_message;

pub const META: CommandMeta = CommandMeta {
    name: "verify",
    desc: "Request a pairing code for your Minecraft account.",
    category: "membership",
    usage: "/verify <minecraft name>",
};

#[poise::command(slash_command, prefix_command, category = "Membership")]
pub async fn verify(
    ctx: Context<'_>,
    #[description = "Your Minecraft username"] username: Option<String>,
) -> Result<(), Error> {
    let Some(username) = username else {
        ctx.say(usage_message(META.usage)).await?;
        return Ok(());
    };
    let username = username.trim().to_owned();

    if !is_valid_minecraft_name(&username) {
        ctx.say("That does not look like a Minecraft username.").await?;
        return Ok(());
    }

    let warden = &ctx.data().warden;
    let code = warden
        .request_code_for_discord(&username, ctx.author().id.get(), &ctx.author().name)
        .await;

    let (server, footer) = match warden.sessions().live_session(&username).await {
        Some(session) => {
            let minutes = session.remaining_secs_at(now_unix_secs()).div_ceil(60);
            (
                session.allowed_server,
                format!("Expires in {}", format_playtime(minutes)),
            )
        }
        None => ("hub".to_owned(), String::new()),
    };

    let embed = build_embed_with_footer(
        "Verification code",
        format!(
            "Join the **{server}** server as `{username}` and run `/verify {code}` in game.\n\
             The code is single-use and case-insensitive."
        ),
        &footer,
    );
    ctx.send(poise::CreateReply::default().ephemeral(true).embed(embed))
        .await?;

    Ok(())
}
