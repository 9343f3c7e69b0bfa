// maplive-common: shared types and protocol for the MapLive workspace

pub mod error;
pub mod protocol;
pub mod types;
