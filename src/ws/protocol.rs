//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Court side. Every client is shown its own paddle on the left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub fn opposite(self) -> Self {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }

    /// Index into `[left, right]` pairs
    pub fn index(self) -> usize {
        match self {
            Side::Left => 0,
            Side::Right => 1,
        }
    }
}

/// Logical paddle direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Towards +y
    Up,
    /// Towards -y
    Down,
}

/// Messages sent from client to server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMsg {
    /// Key pressed or released
    Move {
        direction: Direction,
        pressed: bool,
        /// Only honoured in local matches, where one tab drives both paddles
        #[serde(default)]
        side: Option<Side>,
    },

    /// Pointer/touch drag to a court coordinate
    Drag {
        /// Target paddle centre, in the sender's own orientation
        y: f32,
        #[serde(default)]
        side: Option<Side>,
    },

    /// Resume a paused match
    Go,

    /// Heartbeat reply
    Pong,
}

/// Messages sent from server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    /// Welcome message after connection
    Welcome {
        identity: Uuid,
        tab_id: Uuid,
        server_time: u64,
    },

    /// A match (or tournament match) is about to begin
    StartGame {
        match_id: u64,
        side: Side,
        you: PlayerSummary,
        opponent: PlayerSummary,
        tournament_id: Option<u64>,
        /// One tab drives both paddles
        local: bool,
    },

    /// Countdown tick: 3, 2, 1, 0
    DecountGame {
        count: u32,
    },

    /// Per-tick state
    State(Snapshot),

    /// Match has ended; `score` is `[you, opponent]`
    End {
        match_id: u64,
        score: [u8; 2],
        winner: Option<Uuid>,
        cancelled: bool,
    },

    /// Roster after a join or leave
    TournamentLobbyUpdate {
        tournament_id: u64,
        players: Vec<PlayerSummary>,
    },

    PlayerReadyUpdate {
        tournament_id: u64,
        identity: Uuid,
        ready: bool,
    },

    StartTournamentSignal {
        tournament_id: u64,
        stage: u8,
    },

    DismantleSignal {
        tournament_id: u64,
    },

    /// Someone invited this identity to a match
    InviteReceived {
        from: PlayerSummary,
    },

    /// Heartbeat; answer with `pong` before the next one
    Ping,

    /// Error message
    Error {
        code: String,
        message: String,
    },
}

/// Player summary for rosters and opponents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerSummary {
    pub identity: Uuid,
    pub alias: Option<String>,
    pub ready: bool,
}

/// A point in the normalized [-1, 1] court
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

/// One tick of match state, oriented for its recipient
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub match_id: u64,
    pub tick: u64,
    /// Recipient's real side; coordinates are mirrored when this is `right`
    pub side: Side,
    pub ball: Point,
    pub you: Point,
    pub opponent: Point,
    /// `[you, opponent]`
    pub score: [u8; 2],
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_survives_the_wire() {
        let msg = ServerMsg::State(Snapshot {
            match_id: 12,
            tick: 9_001,
            side: Side::Right,
            ball: Point { x: -0.123_456_79, y: 0.999_999 },
            you: Point { x: -0.985, y: 0.1 + 0.2 },
            opponent: Point { x: 0.985, y: -1.0e-7 },
            score: [2, 1],
        });

        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"state\""));
        let back: ServerMsg = serde_json::from_str(&json).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn inbound_kinds_parse() {
        let mv: ClientMsg =
            serde_json::from_str(r#"{"type":"move","direction":"up","pressed":true}"#).unwrap();
        assert_eq!(
            mv,
            ClientMsg::Move {
                direction: Direction::Up,
                pressed: true,
                side: None
            }
        );

        let drag: ClientMsg =
            serde_json::from_str(r#"{"type":"drag","y":-0.25,"side":"right"}"#).unwrap();
        assert_eq!(
            drag,
            ClientMsg::Drag {
                y: -0.25,
                side: Some(Side::Right)
            }
        );

        assert_eq!(serde_json::from_str::<ClientMsg>(r#"{"type":"go"}"#).unwrap(), ClientMsg::Go);
        assert_eq!(serde_json::from_str::<ClientMsg>(r#"{"type":"pong"}"#).unwrap(), ClientMsg::Pong);
    }

    #[test]
    fn unknown_kind_is_a_parse_error() {
        assert!(serde_json::from_str::<ClientMsg>(r#"{"type":"teleport"}"#).is_err());
    }

    #[test]
    fn push_tags_match_the_protocol() {
        let tag = |msg: &ServerMsg| {
            serde_json::to_value(msg).unwrap()["type"]
                .as_str()
                .unwrap()
                .to_string()
        };
        assert_eq!(tag(&ServerMsg::DecountGame { count: 3 }), "decount_game");
        assert_eq!(
            tag(&ServerMsg::TournamentLobbyUpdate {
                tournament_id: 1,
                players: vec![]
            }),
            "tournament_lobby_update"
        );
        assert_eq!(tag(&ServerMsg::DismantleSignal { tournament_id: 1 }), "dismantle_signal");
        assert_eq!(tag(&ServerMsg::Ping), "ping");
    }
}
