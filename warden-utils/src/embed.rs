use poise::serenity_prelude as serenity;

/// Default embed color used across the bot UI.
pub const DEFAULT_EMBED_COLOR: u32 = 0x2E_8B_57;

/// Build a standard embed with consistent styling.
pub fn build_embed(title: &str, description: impl Into<String>) -> serenity::CreateEmbed {
    serenity::CreateEmbed::new()
        .title(title.to_owned())
        .color(DEFAULT_EMBED_COLOR)
        .description(description)
}

/// Build a standard embed with a footer note.
pub fn build_embed_with_footer(
    title: &str,
    description: impl Into<String>,
    footer_note: &str,
) -> serenity::CreateEmbed {
    let builder = build_embed(title, description);
    if footer_note.is_empty() {
        builder
    } else {
        builder.footer(serenity::CreateEmbedFooter::new(footer_note.to_owned()))
    }
}
