pub mod membership;
pub mod progression;
pub mod utility;

use warden_core::{Data, Error};

pub struct CommandMeta {
    pub name: &'static str,
    pub desc: &'static str,
    pub category: &'static str,
    pub usage: &'static str,
}

pub const COMMANDS: &[CommandMeta] = &[
    utility::ping::META,
    utility::help::META,
    membership::verify::META,
    membership::unverify::META,
    progression::rank::META,
    progression::reloadranks::META,
];

pub fn commands() -> Vec<poise::Command<Data, Error>> {
    vec![
        utility::ping::ping(),
        utility::help::help(),
        membership::verify::verify(),
        membership::unverify::unverify(),
        progression::rank::rank(),
        progression::reloadranks::reloadranks(),
    ]
}

/// Standard usage hint for malformed invocations.
pub(crate) fn usage_message(usage: &str) -> String {
    format!("Usage: `{usage}`")
}
