pub mod rank;
pub mod reloadranks;
