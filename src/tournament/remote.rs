//! Server-tracked tournament: join phase, ready check, master controls

use uuid::Uuid;

use crate::error::{EngineError, EngineResult};
use crate::store::RecordId;
use crate::ws::protocol::PlayerSummary;

use super::bracket::{Bracket, Entrant, TournamentPhase, TOURNAMENT_SIZE};

/// What a successful leave request amounts to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Departure {
    Left,
    /// The master walked out, taking the tournament with them
    Dismantle,
}

#[derive(Debug, Clone)]
pub struct RemoteTournament {
    pub id: u64,
    pub name: String,
    pub master: Uuid,
    pub record: Option<RecordId>,
    pub phase: TournamentPhase,
    /// Join order
    pub players: Vec<Entrant>,
    pub bracket: Bracket,
}

impl RemoteTournament {
    /// New tournament with its master seated first
    pub fn new(id: u64, name: String, master: Entrant) -> Self {
        Self {
            id,
            name,
            master: master.identity,
            record: None,
            phase: TournamentPhase::Open,
            players: vec![master],
            bracket: Bracket::default(),
        }
    }

    pub fn contains(&self, identity: Uuid) -> bool {
        self.players.iter().any(|p| p.identity == identity)
    }

    pub fn is_full(&self) -> bool {
        self.players.len() >= TOURNAMENT_SIZE
    }

    pub fn entrant_mut(&mut self, identity: Uuid) -> Option<&mut Entrant> {
        self.players.iter_mut().find(|p| p.identity == identity)
    }

    fn refresh_phase(&mut self) {
        self.phase = if self.is_full() {
            TournamentPhase::ReadyCheck
        } else {
            TournamentPhase::Open
        };
    }

    fn ensure_roster_open(&self) -> EngineResult<()> {
        if self.phase.accepts_roster_changes() {
            Ok(())
        } else {
            Err(EngineError::Precondition(format!(
                "tournament {} has already started",
                self.id
            )))
        }
    }

    /// Seat a player. Cross-tournament membership is checked by the lobby.
    pub fn join(&mut self, entrant: Entrant) -> EngineResult<()> {
        if self.contains(entrant.identity) {
            return Err(EngineError::Conflict(
                "already registered in this tournament".into(),
            ));
        }
        self.ensure_roster_open()?;
        if self.is_full() {
            return Err(EngineError::Conflict(format!("tournament {} is full", self.id)));
        }

        self.players.push(entrant);
        self.refresh_phase();
        Ok(())
    }

    pub fn leave(&mut self, identity: Uuid) -> EngineResult<Departure> {
        if !self.contains(identity) {
            return Err(EngineError::NotFound(format!(
                "not registered in tournament {}",
                self.id
            )));
        }
        self.ensure_roster_open()?;

        if identity == self.master {
            return Ok(Departure::Dismantle);
        }
        self.players.retain(|p| p.identity != identity);
        self.refresh_phase();
        Ok(Departure::Left)
    }

    pub fn set_ready(&mut self, identity: Uuid, ready: bool) -> EngineResult<()> {
        self.ensure_roster_open()?;
        let id = self.id;
        let entrant = self.entrant_mut(identity).ok_or_else(|| {
            EngineError::NotFound(format!("not registered in tournament {}", id))
        })?;
        entrant.ready = ready;
        Ok(())
    }

    /// Master only, full roster, everyone ready
    pub fn check_start(&self, requester: Uuid) -> EngineResult<()> {
        if requester != self.master {
            return Err(EngineError::Unauthorized(
                "only the tournament master can start it".into(),
            ));
        }
        self.ensure_roster_open()?;
        if self.players.len() != TOURNAMENT_SIZE {
            return Err(EngineError::Precondition(format!(
                "{} of {} players joined",
                self.players.len(),
                TOURNAMENT_SIZE
            )));
        }
        let ready = self.players.iter().filter(|p| p.ready).count();
        if ready != TOURNAMENT_SIZE {
            return Err(EngineError::Precondition(format!(
                "{} of {} players ready",
                ready, TOURNAMENT_SIZE
            )));
        }
        Ok(())
    }

    pub fn check_dismantle(&self, requester: Uuid) -> EngineResult<()> {
        if requester != self.master {
            return Err(EngineError::Unauthorized(
                "only the tournament master can dismantle it".into(),
            ));
        }
        self.ensure_roster_open()
    }

    pub fn roster(&self) -> Vec<PlayerSummary> {
        self.players.iter().map(Entrant::summary).collect()
    }

    /// Tabs that receive tournament pushes
    pub fn recipients(&self) -> Vec<(Uuid, Uuid)> {
        self.players.iter().map(|p| (p.identity, p.tab_id)).collect()
    }
}
