//! Collaborators owned outside this engine: match/tournament records and the
//! friend-relation directory

pub mod memory;
pub mod rest;

use std::collections::HashSet;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use memory::MemoryStore;
pub use rest::RestStore;

/// Record id handed out by the persistence collaborator
pub type RecordId = i64;

/// Final status written for a match record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Finished,
    Cancelled,
}

/// Everything written when a match leaves the active set
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchOutcome {
    pub status: MatchStatus,
    pub winner: Option<Uuid>,
    /// [left, right]
    pub score: [u8; 2],
    pub duration_secs: u64,
    pub cancelled_by: Option<Uuid>,
}

/// Final status written for a tournament record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TournamentStatus {
    Finished,
    Dismantled,
}

/// Match and tournament records
#[async_trait]
pub trait Persistence: Send + Sync {
    /// Create a match record, optionally owned by a tournament record
    async fn create_match(&self, tournament: Option<RecordId>) -> Result<RecordId, StoreError>;

    /// Attach participants; temporary players are passed as `None`
    async fn attach_players(
        &self,
        record: RecordId,
        left: Option<Uuid>,
        right: Option<Uuid>,
    ) -> Result<(), StoreError>;

    async fn finish_match(&self, record: RecordId, outcome: &MatchOutcome) -> Result<(), StoreError>;

    async fn create_tournament(&self, name: &str, master: Uuid) -> Result<RecordId, StoreError>;

    async fn register_participant(
        &self,
        tournament: RecordId,
        identity: Uuid,
        alias: Option<&str>,
    ) -> Result<(), StoreError>;

    async fn close_tournament(
        &self,
        tournament: RecordId,
        status: TournamentStatus,
        winner: Option<Uuid>,
    ) -> Result<(), StoreError>;

    /// Winner of a finished match, `None` while unresolved
    async fn match_winner(&self, record: RecordId) -> Result<Option<Uuid>, StoreError>;
}

/// Read-only view of the friend-relation store
#[async_trait]
pub trait Relations: Send + Sync {
    /// Identities with a blocking relation to `identity`, in either direction
    async fn blocked_with(&self, identity: Uuid) -> Result<HashSet<Uuid>, StoreError>;
}

/// Collaborator errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("API error (status {status}): {body}")]
    Api { status: u16, body: String },

    #[error("Failed to parse response: {0}")]
    Parse(reqwest::Error),

    #[error("No row returned from insert")]
    NoRowReturned,

    #[error("Unknown record {0}")]
    UnknownRecord(RecordId),
}
