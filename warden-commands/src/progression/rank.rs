use warden_core::{Context, Error};
use warden_utils::embed::build_embed;
use warden_utils::formatting::{format_playtime, format_progress_bar};

use crate::CommandMeta;

pub const META: CommandMeta = CommandMeta {
    name: "rank",
    desc: "Show your current rank and progress toward the next one.",
    category: "progression",
    usage: "/rank",
};

#[poise::command(slash_command, prefix_command, category = "Progression")]
pub async fn rank(ctx: Context<'_>) -> Result<(), Error> {
    let warden = &ctx.data().warden;

    let Some(player_uuid) = warden
        .storage()
        .player_uuid_for_discord(ctx.author().id.get())
        .await?
    else {
        ctx.say("Your Discord account is not linked yet. Use `/verify` first.")
            .await?;
        return Ok(());
    };

    let Some(summary) = warden.rank_summary(player_uuid).await? else {
        ctx.say("No progression record yet. Join the server to start one.")
            .await?;
        return Ok(());
    };

    let playtime = format_playtime(summary.rank.play_time_minutes.max(0) as u64);
    let mut description = format!(
        "**{}**\nPlaytime: {}\nAchievements: {}",
        summary.display, playtime, summary.rank.achievements_completed
    );

    match &summary.next {
        Some(next) => {
            let time_bar = format_progress_bar(
                summary.rank.play_time_minutes,
                next.required_time_minutes,
                10,
            );
            let achievement_bar = format_progress_bar(
                summary.rank.achievements_completed,
                next.required_achievements,
                10,
            );
            description.push_str(&format!(
                "\n\nNext rank requires {} of playtime and {} achievements:\n\
                 Time {}\nAchievements {}",
                format_playtime(next.required_time_minutes.max(0) as u64),
                next.required_achievements,
                time_bar,
                achievement_bar,
            ));
        }
        None => description.push_str("\n\nYou have reached the final rank."),
    }

    let embed = build_embed("Rank", description);
    ctx.send(poise::CreateReply::default().embed(embed)).await?;

    Ok(())
}
