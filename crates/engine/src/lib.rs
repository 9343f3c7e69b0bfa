// maplive-engine library entry point.

pub mod broadcast;
pub mod config;
pub mod cors;
pub mod error;
pub mod leaderboard;
pub mod registry;
pub mod session;
pub mod store;
pub mod ws;
