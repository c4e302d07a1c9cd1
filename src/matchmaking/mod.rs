//! Player registry, random pairing, invites and match launch

pub mod registry;
pub mod service;

pub use registry::{Lobby, LobbyState, LobbyStats, PlayerEntry};
pub use service::{CleanOutcome, MatchService, SeekOutcome};
