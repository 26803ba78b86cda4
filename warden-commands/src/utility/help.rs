use warden_core::{Context, Error};
use warden_utils::embed::build_embed;

use crate::{COMMANDS, CommandMeta};

pub const META: CommandMeta = CommandMeta {
    name: "help",
    desc: "List available commands.",
    category: "utility",
    usage: "/help",
};

#[poise::command(prefix_command, slash_command, category = "Utility")]
pub async fn help(ctx: Context<'_>) -> Result<(), Error> {
    let mut description = String::new();
    for category in ["membership", "progression", "utility"] {
        description.push_str(&format!("**{category}**\n"));
        for meta in COMMANDS.iter().filter(|meta| meta.category == category) {
            description.push_str(&format!("`{}` — {}\n", meta.usage, meta.desc));
        }
        description.push('\n');
    }

    let embed = build_embed("Commands", description.trim_end());
    ctx.send(poise::CreateReply::default().ephemeral(true).embed(embed))
        .await?;

    Ok(())
}
