//! Match simulation modules

pub mod r#match;
pub mod physics;
pub mod snapshot;

pub use r#match::{
    conclude_cancelled, input_channel, GameMatch, MatchContext, MatchHandle, MatchInput,
    MatchPhase, MatchReport, MatchState, Participant, WINNING_SCORE,
};

use crate::ws::protocol::{Direction, Side};

/// Input forwarded by the gateway into a running match
#[derive(Debug, Clone, PartialEq)]
pub enum MatchCommand {
    Move {
        direction: Direction,
        pressed: bool,
        side: Option<Side>,
    },
    Drag {
        y: f32,
        side: Option<Side>,
    },
    Go,
}
