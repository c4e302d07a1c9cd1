//! Shared helpers: clocks, rate limiting, shuffling

pub mod rate_limit;
pub mod shuffle;
pub mod time;
