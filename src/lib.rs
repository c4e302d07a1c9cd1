//! Paddle Arena - authoritative match engine for two-player paddle games
//! and four-player single-elimination tournaments

pub mod app;
pub mod client;
pub mod config;
pub mod error;
pub mod game;
pub mod http;
pub mod matchmaking;
pub mod store;
pub mod tournament;
pub mod util;
pub mod ws;
