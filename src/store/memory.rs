//! In-process stand-in for the collaborators, used when no persistence URL
//! is configured and throughout the tests

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use parking_lot::Mutex;
use uuid::Uuid;

use super::{
    MatchOutcome, MatchStatus, Persistence, RecordId, Relations, StoreError, TournamentStatus,
};

#[derive(Debug, Clone, Default)]
pub struct MatchRecord {
    pub tournament: Option<RecordId>,
    pub left: Option<Uuid>,
    pub right: Option<Uuid>,
    pub outcome: Option<MatchOutcome>,
}

#[derive(Debug, Clone)]
pub struct TournamentRecord {
    pub name: String,
    pub master: Uuid,
    pub participants: Vec<(Uuid, Option<String>)>,
    pub closed: Option<(TournamentStatus, Option<Uuid>)>,
}

#[derive(Default)]
struct Tables {
    next_id: RecordId,
    matches: HashMap<RecordId, MatchRecord>,
    tournaments: HashMap<RecordId, TournamentRecord>,
    blocked: HashSet<(Uuid, Uuid)>,
}

impl Tables {
    fn next_id(&mut self) -> RecordId {
        self.next_id += 1;
        self.next_id
    }
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a blocking relation between two identities
    pub fn block(&self, a: Uuid, b: Uuid) {
        self.tables.lock().blocked.insert((a, b));
    }

    pub fn match_record(&self, record: RecordId) -> Option<MatchRecord> {
        self.tables.lock().matches.get(&record).cloned()
    }

    pub fn tournament_record(&self, record: RecordId) -> Option<TournamentRecord> {
        self.tables.lock().tournaments.get(&record).cloned()
    }

    pub fn match_records(&self) -> Vec<(RecordId, MatchRecord)> {
        let tables = self.tables.lock();
        let mut records: Vec<_> = tables.matches.iter().map(|(id, r)| (*id, r.clone())).collect();
        records.sort_by_key(|(id, _)| *id);
        records
    }
}

#[async_trait]
impl Persistence for MemoryStore {
    async fn create_match(&self, tournament: Option<RecordId>) -> Result<RecordId, StoreError> {
        let mut tables = self.tables.lock();
        let id = tables.next_id();
        tables.matches.insert(
            id,
            MatchRecord {
                tournament,
                ..MatchRecord::default()
            },
        );
        Ok(id)
    }

    async fn attach_players(
        &self,
        record: RecordId,
        left: Option<Uuid>,
        right: Option<Uuid>,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables.lock();
        let row = tables
            .matches
            .get_mut(&record)
            .ok_or(StoreError::UnknownRecord(record))?;
        row.left = left;
        row.right = right;
        Ok(())
    }

    async fn finish_match(&self, record: RecordId, outcome: &MatchOutcome) -> Result<(), StoreError> {
        let mut tables = self.tables.lock();
        let row = tables
            .matches
            .get_mut(&record)
            .ok_or(StoreError::UnknownRecord(record))?;
        row.outcome = Some(outcome.clone());
        Ok(())
    }

    async fn create_tournament(&self, name: &str, master: Uuid) -> Result<RecordId, StoreError> {
        let mut tables = self.tables.lock();
        let id = tables.next_id();
        tables.tournaments.insert(
            id,
            TournamentRecord {
                name: name.to_string(),
                master,
                participants: Vec::new(),
                closed: None,
            },
        );
        Ok(id)
    }

    async fn register_participant(
        &self,
        tournament: RecordId,
        identity: Uuid,
        alias: Option<&str>,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables.lock();
        let row = tables
            .tournaments
            .get_mut(&tournament)
            .ok_or(StoreError::UnknownRecord(tournament))?;
        row.participants.push((identity, alias.map(str::to_string)));
        Ok(())
    }

    async fn close_tournament(
        &self,
        tournament: RecordId,
        status: TournamentStatus,
        winner: Option<Uuid>,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables.lock();
        let row = tables
            .tournaments
            .get_mut(&tournament)
            .ok_or(StoreError::UnknownRecord(tournament))?;
        row.closed = Some((status, winner));
        Ok(())
    }

    async fn match_winner(&self, record: RecordId) -> Result<Option<Uuid>, StoreError> {
        let tables = self.tables.lock();
        let row = tables
            .matches
            .get(&record)
            .ok_or(StoreError::UnknownRecord(record))?;
        Ok(row
            .outcome
            .as_ref()
            .filter(|o| o.status == MatchStatus::Finished)
            .and_then(|o| o.winner))
    }
}

#[async_trait]
impl Relations for MemoryStore {
    async fn blocked_with(&self, identity: Uuid) -> Result<HashSet<Uuid>, StoreError> {
        let tables = self.tables.lock();
        Ok(tables
            .blocked
            .iter()
            .filter_map(|&(a, b)| {
                if a == identity {
                    Some(b)
                } else if b == identity {
                    Some(a)
                } else {
                    None
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn blocking_is_symmetric() {
        let store = MemoryStore::new();
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        store.block(a, b);

        assert!(store.blocked_with(a).await.unwrap().contains(&b));
        assert!(store.blocked_with(b).await.unwrap().contains(&a));
        assert!(store.blocked_with(c).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn winner_is_only_visible_once_finished() {
        let store = MemoryStore::new();
        let winner = Uuid::new_v4();
        let record = store.create_match(None).await.unwrap();
        assert_eq!(store.match_winner(record).await.unwrap(), None);

        let cancelled = MatchOutcome {
            status: MatchStatus::Cancelled,
            winner: Some(winner),
            score: [1, 0],
            duration_secs: 4,
            cancelled_by: Some(winner),
        };
        store.finish_match(record, &cancelled).await.unwrap();
        assert_eq!(store.match_winner(record).await.unwrap(), None);

        let finished = MatchOutcome {
            status: MatchStatus::Finished,
            cancelled_by: None,
            score: [3, 1],
            ..cancelled
        };
        store.finish_match(record, &finished).await.unwrap();
        assert_eq!(store.match_winner(record).await.unwrap(), Some(winner));
    }

    #[tokio::test]
    async fn unknown_records_are_errors() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.match_winner(99).await,
            Err(StoreError::UnknownRecord(99))
        ));
    }
}
