mod clock;

pub mod config;
pub mod gate;
pub mod rank;
pub mod rewards;
pub mod service;
pub mod session;
pub mod storage;
pub mod xp;

pub use service::Warden;

pub type Error = anyhow::Error;

/// Shared state handed to every command invocation.
#[derive(Clone)]
pub struct Data {
    pub warden: std::sync::Arc<Warden>,
}

impl std::fmt::Debug for Data {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Data").finish_non_exhaustive()
    }
}

pub type Context<'a> = poise::Context<'a, Data, Error>;
