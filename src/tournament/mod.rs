//! Four-player tournaments, remote (server-tracked roster) and local
//! (one device drives every match)

pub mod bracket;
pub mod local;
pub mod remote;
pub mod service;

pub use bracket::{Bracket, Entrant, Stage, StageMatch, TournamentPhase, TournamentRef, TOURNAMENT_SIZE};
pub use local::{LocalTournament, RosterEntry};
pub use remote::{Departure, RemoteTournament};
pub use service::{AdvanceOutcome, TournamentService};
