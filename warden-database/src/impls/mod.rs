pub mod player_ranks;
pub mod rank_definitions;
pub mod verification;
pub mod xp_events;
