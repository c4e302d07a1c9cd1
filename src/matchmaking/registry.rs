//! Process-wide player registry and active match/tournament lists
//!
//! All mutation goes through [`Lobby::transact`], which holds one mutex for
//! the duration of a synchronous closure. Nothing awaits while it is held,
//! so a lookup and the action taken on it are always one atomic step.

use std::collections::HashSet;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};
use crate::game::{MatchHandle, MatchInput, Participant};
use crate::store::RecordId;
use crate::tournament::{LocalTournament, RemoteTournament, TournamentRef};

/// One connected tab. Temporary local opponents live only in their match.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerEntry {
    pub identity: Uuid,
    pub tab_id: Uuid,
    pub alias: Option<String>,
    pub ready: bool,
    pub seeking: bool,
    pub in_match: Option<u64>,
}

impl PlayerEntry {
    pub fn participant(&self) -> Participant {
        Participant {
            identity: self.identity,
            tab_id: self.tab_id,
            alias: self.alias.clone(),
            temporary: false,
        }
    }
}

/// Pending invite from one tab to an identity
#[derive(Debug, Clone, PartialEq)]
pub struct Invite {
    pub inviter: Uuid,
    pub inviter_tab: Uuid,
    pub invitee: Uuid,
}

#[derive(Default)]
pub struct LobbyState {
    /// Insertion order, which is also matchmaking scan order
    players: Vec<PlayerEntry>,
    matches: Vec<MatchHandle>,
    tournaments: Vec<RemoteTournament>,
    local_tournaments: Vec<LocalTournament>,
    invites: Vec<Invite>,
    next_match_id: u64,
    next_tournament_id: u64,
}

impl LobbyState {
    // ------------------------------------------------------------------
    // Player entries
    // ------------------------------------------------------------------

    /// Existing entry for (identity, tab) or a new one. Without a tab the
    /// identity's first entry is reused, or a fresh tab id is minted.
    pub fn get_or_create_entry(
        &mut self,
        identity: Uuid,
        tab_id: Option<Uuid>,
        alias: Option<String>,
    ) -> &mut PlayerEntry {
        let existing = self.players.iter().position(|p| {
            p.identity == identity && tab_id.map_or(true, |tab| p.tab_id == tab)
        });

        let idx = match existing {
            Some(idx) => idx,
            None => {
                self.players.push(PlayerEntry {
                    identity,
                    tab_id: tab_id.unwrap_or_else(Uuid::new_v4),
                    alias: None,
                    ready: false,
                    seeking: false,
                    in_match: None,
                });
                debug!(identity = %identity, "Registered player entry");
                self.players.len() - 1
            }
        };

        let entry = &mut self.players[idx];
        if alias.is_some() {
            entry.alias = alias;
        }
        entry
    }

    pub fn entry(&self, identity: Uuid, tab_id: Uuid) -> Option<&PlayerEntry> {
        self.players
            .iter()
            .find(|p| p.identity == identity && p.tab_id == tab_id)
    }

    pub fn entry_mut(&mut self, identity: Uuid, tab_id: Uuid) -> Option<&mut PlayerEntry> {
        self.players
            .iter_mut()
            .find(|p| p.identity == identity && p.tab_id == tab_id)
    }

    pub fn entries(&self) -> &[PlayerEntry] {
        &self.players
    }

    /// Any tab of `identity` already playing
    pub fn identity_in_match(&self, identity: Uuid) -> Option<u64> {
        self.matches
            .iter()
            .find(|m| m.players.iter().any(|p| p.identity == identity))
            .map(|m| m.id)
    }

    /// Running tournament `identity` is seated in, from the start until
    /// the final ends
    pub fn tournament_in_play(&self, identity: Uuid) -> Option<TournamentRef> {
        if let Some(t) = self
            .tournaments
            .iter()
            .find(|t| t.phase.in_play() && t.contains(identity))
        {
            return Some(TournamentRef::Remote(t.id));
        }
        self.local_tournaments
            .iter()
            .find(|t| t.phase.in_play() && t.members().any(|m| m == identity))
            .map(|t| TournamentRef::Local(t.id))
    }

    /// `Conflict` unless `identity` may be seated in a new match
    pub fn ensure_free(&self, identity: Uuid) -> EngineResult<()> {
        if let Some(id) = self.identity_in_match(identity) {
            return Err(EngineError::Conflict(format!("already playing match {id}")));
        }
        if let Some(t) = self.tournament_in_play(identity) {
            return Err(EngineError::Conflict(format!(
                "playing in tournament {}",
                t.id()
            )));
        }
        Ok(())
    }

    /// First seeking entry of another identity that is not blocked and is
    /// not busy on another tab
    pub fn find_opponent(&self, requester: Uuid, blocked: &HashSet<Uuid>) -> Option<usize> {
        self.players.iter().position(|p| {
            p.seeking
                && p.identity != requester
                && p.in_match.is_none()
                && !blocked.contains(&p.identity)
                && self.ensure_free(p.identity).is_ok()
        })
    }

    pub fn entry_at(&self, idx: usize) -> Option<&PlayerEntry> {
        self.players.get(idx)
    }

    /// Stop seeking and drop the tab's outstanding invites
    pub fn withdraw(&mut self, identity: Uuid, tab_id: Uuid) {
        if let Some(entry) = self.entry_mut(identity, tab_id) {
            entry.seeking = false;
        }
        self.invites
            .retain(|i| !(i.inviter == identity && i.inviter_tab == tab_id));
    }

    /// Drop a closed tab. Tournament members keep theirs for reconnects.
    pub fn release_tab(&mut self, identity: Uuid, tab_id: Uuid) -> bool {
        self.invites
            .retain(|i| !(i.inviter == identity && i.inviter_tab == tab_id));
        if self.tournament_of(identity).is_some() {
            if let Some(entry) = self.entry_mut(identity, tab_id) {
                entry.seeking = false;
            }
            return false;
        }
        self.remove_entry(identity, tab_id)
    }

    fn remove_entry(&mut self, identity: Uuid, tab_id: Uuid) -> bool {
        let before = self.players.len();
        self.players
            .retain(|p| !(p.identity == identity && p.tab_id == tab_id));
        before != self.players.len()
    }

    /// Remove every idle entry of `identity` not held by a tournament
    pub fn purge_identity(&mut self, identity: Uuid) {
        if self.tournament_of(identity).is_some() {
            return;
        }
        self.players
            .retain(|p| p.identity != identity || p.in_match.is_some());
    }

    // ------------------------------------------------------------------
    // Matches
    // ------------------------------------------------------------------

    /// Register a match and flag its entries. Seeking flags are cleared on
    /// every tab of both identities in the same step.
    pub fn insert_match(
        &mut self,
        players: [Participant; 2],
        controller: Option<(Uuid, Uuid)>,
        tournament: Option<TournamentRef>,
        input_tx: mpsc::Sender<MatchInput>,
    ) -> u64 {
        self.next_match_id += 1;
        let id = self.next_match_id;

        for entry in self
            .players
            .iter_mut()
            .filter(|p| players.iter().any(|seat| seat.identity == p.identity))
        {
            entry.seeking = false;
        }

        let mut tabs: Vec<(Uuid, Uuid)> = players.iter().map(|p| (p.identity, p.tab_id)).collect();
        tabs.extend(controller);
        for (identity, tab_id) in tabs {
            if let Some(entry) = self.entry_mut(identity, tab_id) {
                entry.in_match = Some(id);
            }
        }

        self.matches.push(MatchHandle {
            id,
            players,
            controller,
            tournament,
            record: None,
            score: [0, 0],
            created_at: Instant::now(),
            input_tx,
        });
        id
    }

    pub fn match_handle(&self, id: u64) -> Option<&MatchHandle> {
        self.matches.iter().find(|m| m.id == id)
    }

    pub fn match_handle_mut(&mut self, id: u64) -> Option<&mut MatchHandle> {
        self.matches.iter_mut().find(|m| m.id == id)
    }

    pub fn matches(&self) -> &[MatchHandle] {
        &self.matches
    }

    /// Match a tab is allowed to steer
    pub fn match_for_tab(&self, identity: Uuid, tab_id: Uuid) -> Option<&MatchHandle> {
        self.matches
            .iter()
            .find(|m| m.side_for(identity, tab_id, None).is_some())
    }

    /// Move an identity's seat in a running tournament match to another tab
    pub fn rebind_match_tab(
        &mut self,
        identity: Uuid,
        tournament: TournamentRef,
        tab_id: Uuid,
    ) -> Option<u64> {
        let handle = self.matches.iter_mut().find(|m| {
            m.tournament == Some(tournament)
                && m.controller.is_none()
                && m.players.iter().any(|p| p.identity == identity)
        })?;
        for p in handle.players.iter_mut().filter(|p| p.identity == identity) {
            p.tab_id = tab_id;
        }
        let id = handle.id;
        if let Some(entry) = self.entry_mut(identity, tab_id) {
            entry.in_match = Some(id);
        }
        Some(id)
    }

    /// Idempotent removal. The caller that gets `Some` owns the conclusion.
    pub fn remove_match(&mut self, id: u64) -> Option<MatchHandle> {
        let idx = self.matches.iter().position(|m| m.id == id)?;
        let handle = self.matches.remove(idx);

        let mut tabs: Vec<(Uuid, Uuid)> = handle
            .players
            .iter()
            .map(|p| (p.identity, p.tab_id))
            .collect();
        tabs.extend(handle.controller);

        for (identity, tab_id) in tabs {
            let held = self.tournament_of(identity).is_some();
            let release = match self.entry_mut(identity, tab_id) {
                Some(entry) if entry.in_match == Some(id) => {
                    entry.in_match = None;
                    !held
                }
                _ => false,
            };
            if release {
                self.remove_entry(identity, tab_id);
            }
        }

        debug!(match_id = id, "Match removed from lobby");
        Some(handle)
    }

    // ------------------------------------------------------------------
    // Invites
    // ------------------------------------------------------------------

    pub fn has_invite(&self, inviter: Uuid, invitee: Uuid) -> bool {
        self.invites
            .iter()
            .any(|i| i.inviter == inviter && i.invitee == invitee)
    }

    pub fn add_invite(&mut self, invite: Invite) {
        self.invites.push(invite);
    }

    pub fn take_invite(&mut self, inviter: Uuid, invitee: Uuid) -> Option<Invite> {
        let idx = self
            .invites
            .iter()
            .position(|i| i.inviter == inviter && i.invitee == invitee)?;
        Some(self.invites.remove(idx))
    }

    // ------------------------------------------------------------------
    // Tournaments
    // ------------------------------------------------------------------

    pub fn next_tournament_id(&mut self) -> u64 {
        self.next_tournament_id += 1;
        self.next_tournament_id
    }

    pub fn insert_tournament(&mut self, tournament: RemoteTournament) {
        self.tournaments.push(tournament);
    }

    pub fn insert_local_tournament(&mut self, tournament: LocalTournament) {
        self.local_tournaments.push(tournament);
    }

    pub fn tournament(&self, id: u64) -> Option<&RemoteTournament> {
        self.tournaments.iter().find(|t| t.id == id)
    }

    pub fn tournament_mut(&mut self, id: u64) -> Option<&mut RemoteTournament> {
        self.tournaments.iter_mut().find(|t| t.id == id)
    }

    pub fn local_tournament(&self, id: u64) -> Option<&LocalTournament> {
        self.local_tournaments.iter().find(|t| t.id == id)
    }

    pub fn local_tournament_mut(&mut self, id: u64) -> Option<&mut LocalTournament> {
        self.local_tournaments.iter_mut().find(|t| t.id == id)
    }

    pub fn tournament_count(&self) -> usize {
        self.tournaments.len() + self.local_tournaments.len()
    }

    /// Active tournament `identity` belongs to, if any
    pub fn tournament_of(&self, identity: Uuid) -> Option<TournamentRef> {
        if let Some(t) = self.tournaments.iter().find(|t| t.contains(identity)) {
            return Some(TournamentRef::Remote(t.id));
        }
        self.local_tournaments
            .iter()
            .find(|t| t.members().any(|m| m == identity))
            .map(|t| TournamentRef::Local(t.id))
    }

    /// Idempotent removal of either kind
    pub fn remove_tournament(&mut self, tournament: TournamentRef) -> bool {
        let before = self.tournaments.len() + self.local_tournaments.len();
        match tournament {
            TournamentRef::Remote(id) => self.tournaments.retain(|t| t.id != id),
            TournamentRef::Local(id) => self.local_tournaments.retain(|t| t.id != id),
        }
        before != self.tournaments.len() + self.local_tournaments.len()
    }
}

/// Counters for the health endpoint
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LobbyStats {
    pub matches: usize,
    pub tournaments: usize,
    pub tabs: usize,
}

/// Shared handle to the registry
#[derive(Default)]
pub struct Lobby {
    state: Mutex<LobbyState>,
}

impl Lobby {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` as one atomic step over the registry
    pub fn transact<R>(&self, f: impl FnOnce(&mut LobbyState) -> R) -> R {
        let mut state = self.state.lock();
        f(&mut state)
    }

    pub fn match_handle(&self, id: u64) -> Option<MatchHandle> {
        self.transact(|s| s.match_handle(id).cloned())
    }

    pub fn remove_match(&self, id: u64) -> Option<MatchHandle> {
        self.transact(|s| s.remove_match(id))
    }

    pub fn set_record(&self, id: u64, record: RecordId) {
        self.transact(|s| {
            if let Some(handle) = s.match_handle_mut(id) {
                handle.record = Some(record);
            }
        })
    }

    pub fn record_score(&self, id: u64, score: [u8; 2]) {
        self.transact(|s| {
            if let Some(handle) = s.match_handle_mut(id) {
                handle.score = score;
            }
        })
    }

    pub fn stats(&self) -> LobbyStats {
        self.transact(|s| LobbyStats {
            matches: s.matches.len(),
            tournaments: s.tournament_count(),
            tabs: s.players.len(),
        })
    }

    /// Input channel of the match this tab steers
    pub fn input_for(&self, identity: Uuid, tab_id: Uuid) -> Option<mpsc::Sender<MatchInput>> {
        self.transact(|s| s.match_for_tab(identity, tab_id).map(|m| m.input_tx.clone()))
    }
}
