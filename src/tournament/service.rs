//! Tournament orchestrator: roster requests, stage launches and the
//! completion loop fed by match reports

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};
use crate::game::{conclude_cancelled, input_channel, MatchContext, MatchInput, MatchReport};
use crate::matchmaking::{LobbyState, MatchService};
use crate::store::{MatchStatus, RecordId, TournamentStatus};
use crate::ws::protocol::ServerMsg;

use super::bracket::{Bracket, Entrant, Stage, StageMatch, TournamentPhase, TournamentRef};
use super::local::{build_roster, LocalTournament, RosterEntry};
use super::remote::{Departure, RemoteTournament};

/// Automatic stage-two attempts after stage one completes
pub const ADVANCE_ATTEMPTS: u32 = 10;
pub const ADVANCE_RETRY: Duration = Duration::from_secs(1);

const MAX_NAME_LEN: usize = 64;
const LOCAL_RECORD_NAME: &str = "local tournament";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvanceOutcome {
    Started(u64),
    /// Stage one is unfinished or a winner is not yet resolvable
    Deferred,
    AlreadyStarted,
}

/// Bracket plus the bits of its owner the launch logic needs
struct BracketView<'a> {
    bracket: &'a mut Bracket,
    phase: &'a mut TournamentPhase,
    record: Option<RecordId>,
    controller: Option<(Uuid, Uuid)>,
}

fn bracket_view(s: &mut LobbyState, tournament: TournamentRef) -> Option<BracketView<'_>> {
    match tournament {
        TournamentRef::Remote(id) => s.tournament_mut(id).map(|t| BracketView {
            bracket: &mut t.bracket,
            phase: &mut t.phase,
            record: t.record,
            controller: None,
        }),
        TournamentRef::Local(id) => s.local_tournament_mut(id).map(|t| BracketView {
            bracket: &mut t.bracket,
            phase: &mut t.phase,
            record: t.record,
            controller: Some(t.controller),
        }),
    }
}

fn tournament_recipients(s: &LobbyState, tournament: TournamentRef) -> Vec<(Uuid, Uuid)> {
    match tournament {
        TournamentRef::Remote(id) => s.tournament(id).map(|t| t.recipients()).unwrap_or_default(),
        TournamentRef::Local(id) => s
            .local_tournament(id)
            .map(|t| vec![t.controller])
            .unwrap_or_default(),
    }
}

#[derive(Debug, Clone, Copy)]
enum Slot {
    One(usize),
    Two,
}

/// Register a bracket slot's match in the lobby
fn launch_in(
    s: &mut LobbyState,
    tournament: TournamentRef,
    slot: Slot,
    input_tx: mpsc::Sender<MatchInput>,
) -> EngineResult<(u64, Option<RecordId>)> {
    let missing = || EngineError::NotFound(format!("tournament {}", tournament.id()));

    let view = bracket_view(s, tournament).ok_or_else(missing)?;
    let (controller, record) = (view.controller, view.record);
    let stage_match = match slot {
        Slot::One(idx) => view.bracket.stage_one.get(idx),
        Slot::Two => view.bracket.stage_two.as_ref(),
    }
    .ok_or_else(|| EngineError::Internal("bracket slot missing".into()))?;
    let players = [
        stage_match.players[0].participant(),
        stage_match.players[1].participant(),
    ];
    if players.iter().any(|p| s.identity_in_match(p.identity).is_some()) {
        return Err(EngineError::Precondition(
            "a player is still in another match".into(),
        ));
    }

    let match_id = s.insert_match(players, controller, Some(tournament), input_tx);

    let view = bracket_view(s, tournament).ok_or_else(missing)?;
    let stage_match = match slot {
        Slot::One(idx) => view.bracket.stage_one.get_mut(idx),
        Slot::Two => view.bracket.stage_two.as_mut(),
    };
    if let Some(stage_match) = stage_match {
        stage_match.match_id = Some(match_id);
    }
    Ok((match_id, record))
}

/// Everything left to do after a tournament leaves the lobby
struct Closed {
    recipients: Vec<(Uuid, Uuid)>,
    record: Option<RecordId>,
    guests: HashSet<Uuid>,
    matches: Vec<crate::game::MatchHandle>,
}

/// Remove a tournament, its running matches and its idle entries
fn close_in(s: &mut LobbyState, tournament: TournamentRef) -> Option<Closed> {
    let (recipients, record, entrants) = match tournament {
        TournamentRef::Remote(id) => {
            let t = s.tournament(id)?;
            (t.recipients(), t.record, t.players.clone())
        }
        TournamentRef::Local(id) => {
            let t = s.local_tournament(id)?;
            let mut entrants = t.players.clone();
            entrants.retain(|e| e.identity != t.master);
            (vec![t.controller], t.record, entrants)
        }
    };
    let master = match tournament {
        TournamentRef::Remote(id) => s.tournament(id).map(|t| t.master),
        TournamentRef::Local(id) => s.local_tournament(id).map(|t| t.master),
    };

    s.remove_tournament(tournament);

    let running: Vec<u64> = s
        .matches()
        .iter()
        .filter(|m| m.tournament == Some(tournament))
        .map(|m| m.id)
        .collect();
    let matches = running
        .into_iter()
        .filter_map(|id| s.remove_match(id))
        .collect();

    for identity in entrants.iter().map(|e| e.identity).chain(master) {
        s.purge_identity(identity);
    }

    Some(Closed {
        recipients,
        record,
        guests: entrants
            .iter()
            .filter(|e| e.temporary)
            .map(|e| e.identity)
            .collect(),
        matches,
    })
}

pub struct TournamentService {
    matches: Arc<MatchService>,
    rng: Mutex<ChaCha8Rng>,
    reports: Mutex<Option<mpsc::UnboundedReceiver<MatchReport>>>,
}

impl TournamentService {
    pub fn new(
        matches: Arc<MatchService>,
        reports: mpsc::UnboundedReceiver<MatchReport>,
        shuffle_seed: Option<u64>,
    ) -> Self {
        let rng = match shuffle_seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        Self {
            matches,
            rng: Mutex::new(rng),
            reports: Mutex::new(Some(reports)),
        }
    }

    fn ctx(&self) -> &MatchContext {
        self.matches.context()
    }

    fn broadcast(&self, recipients: &[(Uuid, Uuid)], msg: ServerMsg) {
        for (identity, tab_id) in recipients {
            self.ctx().connections.send(*identity, *tab_id, msg.clone());
        }
    }

    fn broadcast_roster(&self, tournament_id: u64) {
        let roster = self.ctx().lobby.transact(|s| {
            s.tournament(tournament_id)
                .map(|t| (t.recipients(), t.roster()))
        });
        if let Some((recipients, players)) = roster {
            self.broadcast(
                &recipients,
                ServerMsg::TournamentLobbyUpdate {
                    tournament_id,
                    players,
                },
            );
        }
    }

    fn seed_bracket(&self, entrants: Vec<Entrant>) -> Bracket {
        let mut rng = self.rng.lock();
        Bracket::seed(entrants, &mut *rng)
    }

    // ------------------------------------------------------------------
    // Remote tournaments
    // ------------------------------------------------------------------

    /// Open a tournament with the requester as master and first player
    pub async fn create(
        &self,
        identity: Uuid,
        tab_id: Uuid,
        name: &str,
        alias: Option<String>,
    ) -> EngineResult<u64> {
        let name = name.trim();
        if name.is_empty() || name.len() > MAX_NAME_LEN {
            return Err(EngineError::Validation(format!(
                "tournament name must be 1 to {} characters",
                MAX_NAME_LEN
            )));
        }

        let tournament_id = self.ctx().lobby.transact(|s| {
            if let Some(current) = s.tournament_of(identity) {
                return Err(EngineError::Conflict(format!(
                    "already in tournament {}",
                    current.id()
                )));
            }
            let entry = s.get_or_create_entry(identity, Some(tab_id), alias);
            let master = Entrant {
                identity,
                tab_id,
                alias: entry.alias.clone(),
                ready: false,
                temporary: false,
            };
            let id = s.next_tournament_id();
            s.insert_tournament(RemoteTournament::new(id, name.to_string(), master));
            Ok(id)
        })?;
        info!(tournament_id, master = %identity, "Tournament created");

        let record = self
            .ctx()
            .store
            .create_tournament(name, identity)
            .await
            .map_err(|e| {
                error!(tournament_id, error = %e, "Failed to create tournament record");
                EngineError::from(e)
            });
        if let Ok(id) = &record {
            self.ctx().lobby.transact(|s| {
                if let Some(t) = s.tournament_mut(tournament_id) {
                    t.record = Some(*id);
                }
            });
        }

        self.broadcast_roster(tournament_id);
        record.map(|_| tournament_id)
    }

    pub fn join(
        &self,
        identity: Uuid,
        tab_id: Uuid,
        tournament_id: u64,
        alias: Option<String>,
    ) -> EngineResult<()> {
        self.ctx().lobby.transact(|s| {
            if s.tournament(tournament_id).is_none() {
                return Err(EngineError::NotFound(format!("tournament {tournament_id}")));
            }
            match s.tournament_of(identity) {
                Some(TournamentRef::Remote(id)) if id == tournament_id => {
                    return Err(EngineError::Conflict(
                        "already registered in this tournament".into(),
                    ));
                }
                Some(other) => {
                    return Err(EngineError::Conflict(format!(
                        "already in tournament {}",
                        other.id()
                    )));
                }
                None => {}
            }

            let alias = alias.or_else(|| s.entry(identity, tab_id).and_then(|p| p.alias.clone()));
            let entrant = Entrant {
                identity,
                tab_id,
                alias: alias.clone(),
                ready: false,
                temporary: false,
            };
            s.tournament_mut(tournament_id)
                .ok_or_else(|| EngineError::NotFound(format!("tournament {tournament_id}")))?
                .join(entrant)?;
            s.get_or_create_entry(identity, Some(tab_id), alias);
            Ok(())
        })?;

        info!(tournament_id, identity = %identity, "Joined tournament");
        self.broadcast_roster(tournament_id);
        Ok(())
    }

    pub async fn leave(&self, identity: Uuid, tournament_id: u64) -> EngineResult<Departure> {
        let departure = self.ctx().lobby.transact(|s| {
            s.tournament_mut(tournament_id)
                .ok_or_else(|| EngineError::NotFound(format!("tournament {tournament_id}")))?
                .leave(identity)
        })?;

        match departure {
            Departure::Left => {
                info!(tournament_id, identity = %identity, "Left tournament");
                self.broadcast_roster(tournament_id);
            }
            Departure::Dismantle => {
                info!(tournament_id, "Master left, dismantling");
                self.dismantle_now(TournamentRef::Remote(tournament_id), Some(identity))
                    .await?;
            }
        }
        Ok(departure)
    }

    pub fn set_ready(&self, identity: Uuid, tournament_id: u64, ready: bool) -> EngineResult<()> {
        let recipients = self.ctx().lobby.transact(|s| {
            let t = s
                .tournament_mut(tournament_id)
                .ok_or_else(|| EngineError::NotFound(format!("tournament {tournament_id}")))?;
            t.set_ready(identity, ready)?;
            Ok::<_, EngineError>(t.recipients())
        })?;

        debug!(tournament_id, identity = %identity, ready, "Ready flag set");
        self.broadcast(
            &recipients,
            ServerMsg::PlayerReadyUpdate {
                tournament_id,
                identity,
                ready,
            },
        );
        Ok(())
    }

    /// Register participants, shuffle, and launch both stage-one matches
    pub async fn start(&self, identity: Uuid, tournament_id: u64) -> EngineResult<Vec<u64>> {
        let (record, players) = self.ctx().lobby.transact(|s| {
            let t = s
                .tournament(tournament_id)
                .ok_or_else(|| EngineError::NotFound(format!("tournament {tournament_id}")))?;
            t.check_start(identity)?;
            if t.players.iter().any(|p| s.identity_in_match(p.identity).is_some()) {
                return Err(EngineError::Precondition(
                    "a player is still in another match".into(),
                ));
            }

            let t = s
                .tournament_mut(tournament_id)
                .ok_or_else(|| EngineError::NotFound(format!("tournament {tournament_id}")))?;
            t.phase = TournamentPhase::InProgress;
            Ok::<_, EngineError>((t.record, t.players.clone()))
        })?;

        let registered = self.register_participants(tournament_id, record, &players).await;

        let bracket = self.seed_bracket(players);
        let tournament = TournamentRef::Remote(tournament_id);
        let recipients = self.ctx().lobby.transact(|s| {
            let t = s
                .tournament_mut(tournament_id)
                .ok_or_else(|| EngineError::NotFound(format!("tournament {tournament_id}")))?;
            t.bracket = bracket;
            Ok::<_, EngineError>(t.recipients())
        })?;

        info!(tournament_id, "Tournament started");
        self.broadcast(
            &recipients,
            ServerMsg::StartTournamentSignal {
                tournament_id,
                stage: 1,
            },
        );

        let mut launched = Vec::with_capacity(2);
        for idx in 0..2 {
            launched.push(self.launch(tournament, Slot::One(idx)).await?);
        }

        registered.map(|_| launched)
    }

    async fn register_participants(
        &self,
        tournament_id: u64,
        record: Option<RecordId>,
        players: &[Entrant],
    ) -> EngineResult<()> {
        let Some(record) = record else {
            warn!(tournament_id, "Tournament has no record, participants not registered");
            return Ok(());
        };
        let mut result = Ok(());
        for player in players.iter().filter(|p| !p.temporary) {
            if let Err(e) = self
                .ctx()
                .store
                .register_participant(record, player.identity, player.alias.as_deref())
                .await
            {
                error!(tournament_id, identity = %player.identity, error = %e, "Failed to register participant");
                result = Err(EngineError::from(e));
            }
        }
        result
    }

    async fn launch(&self, tournament: TournamentRef, slot: Slot) -> EngineResult<u64> {
        let (input_tx, input_rx) = input_channel();
        let (match_id, record) = self
            .ctx()
            .lobby
            .transact(|s| launch_in(s, tournament, slot, input_tx))?;

        info!(tournament_id = tournament.id(), match_id, ?slot, "Tournament match launched");
        self.matches.start(match_id, input_rx, record).await?;
        Ok(match_id)
    }

    /// Master only, before the start
    pub async fn dismantle(&self, identity: Uuid, tournament_id: u64) -> EngineResult<()> {
        self.ctx().lobby.transact(|s| {
            s.tournament(tournament_id)
                .ok_or_else(|| EngineError::NotFound(format!("tournament {tournament_id}")))?
                .check_dismantle(identity)
        })?;
        self.dismantle_now(TournamentRef::Remote(tournament_id), Some(identity))
            .await
    }

    async fn dismantle_now(
        &self,
        tournament: TournamentRef,
        requested_by: Option<Uuid>,
    ) -> EngineResult<()> {
        let Some(closed) = self.ctx().lobby.transact(|s| close_in(s, tournament)) else {
            return Ok(());
        };

        for handle in &closed.matches {
            conclude_cancelled(self.ctx(), handle, requested_by).await;
        }
        self.broadcast(
            &closed.recipients,
            ServerMsg::DismantleSignal {
                tournament_id: tournament.id(),
            },
        );
        info!(tournament_id = tournament.id(), "Tournament dismantled");

        if let Some(record) = closed.record {
            self.ctx()
                .store
                .close_tournament(record, TournamentStatus::Dismantled, None)
                .await
                .map_err(|e| {
                    error!(tournament_id = tournament.id(), error = %e, "Failed to close tournament record");
                    EngineError::from(e)
                })?;
        }
        Ok(())
    }

    /// Rebind a member's seat (and running match) to the requesting tab
    pub fn rejoin(&self, identity: Uuid, tab_id: Uuid, tournament_id: u64) -> EngineResult<Option<u64>> {
        self.ctx().lobby.transact(|s| {
            let t = s
                .tournament_mut(tournament_id)
                .ok_or_else(|| EngineError::NotFound(format!("tournament {tournament_id}")))?;
            let entrant = t.entrant_mut(identity).ok_or_else(|| {
                EngineError::Unauthorized("not registered in this tournament".into())
            })?;
            entrant.tab_id = tab_id;
            let alias = entrant.alias.clone();

            let bracket = &mut t.bracket;
            for slot in bracket.stage_one.iter_mut().chain(bracket.stage_two.iter_mut()) {
                for player in slot.players.iter_mut().filter(|p| p.identity == identity) {
                    player.tab_id = tab_id;
                }
            }

            s.get_or_create_entry(identity, Some(tab_id), alias);
            Ok(s.rebind_match_tab(identity, TournamentRef::Remote(tournament_id), tab_id))
        })
    }

    /// Explicit stage-two request from a member
    pub async fn advance(&self, identity: Uuid, tournament_id: u64) -> EngineResult<AdvanceOutcome> {
        let member = self
            .ctx()
            .lobby
            .transact(|s| s.tournament(tournament_id).map(|t| t.contains(identity)));
        match member {
            None => Err(EngineError::NotFound(format!("tournament {tournament_id}"))),
            Some(false) => Err(EngineError::Unauthorized(
                "not registered in this tournament".into(),
            )),
            Some(true) => self.try_advance(TournamentRef::Remote(tournament_id)).await,
        }
    }

    // ------------------------------------------------------------------
    // Local tournaments
    // ------------------------------------------------------------------

    /// Build a local tournament and launch its first match. The second
    /// stage-one match waits for the first, since one tab drives both.
    pub async fn create_local(
        &self,
        identity: Uuid,
        tab_id: Uuid,
        entries: &[RosterEntry],
    ) -> EngineResult<(u64, u64)> {
        let roster = build_roster(tab_id, entries)?;
        let bracket = self.seed_bracket(roster.clone());

        let tournament_id = self.ctx().lobby.transact(|s| {
            if let Some(id) = s.identity_in_match(identity) {
                return Err(EngineError::Conflict(format!("already playing match {id}")));
            }
            let members = std::iter::once(identity)
                .chain(roster.iter().filter(|e| !e.temporary).map(|e| e.identity));
            for member in members {
                if let Some(current) = s.tournament_of(member) {
                    return Err(EngineError::Conflict(format!(
                        "a player is already in tournament {}",
                        current.id()
                    )));
                }
            }

            s.get_or_create_entry(identity, Some(tab_id), None);
            let id = s.next_tournament_id();
            s.insert_local_tournament(LocalTournament::new(
                id,
                (identity, tab_id),
                roster.clone(),
                bracket,
            ));
            Ok(id)
        })?;
        let tournament = TournamentRef::Local(tournament_id);
        info!(tournament_id, master = %identity, "Local tournament created");

        let persisted = self.open_local_record(tournament_id, identity, &roster).await;

        self.broadcast(
            &[(identity, tab_id)],
            ServerMsg::StartTournamentSignal {
                tournament_id,
                stage: 1,
            },
        );
        let match_id = self.launch(tournament, Slot::One(0)).await?;

        persisted.map(|_| (tournament_id, match_id))
    }

    async fn open_local_record(
        &self,
        tournament_id: u64,
        master: Uuid,
        roster: &[Entrant],
    ) -> EngineResult<()> {
        let record = self
            .ctx()
            .store
            .create_tournament(LOCAL_RECORD_NAME, master)
            .await
            .map_err(|e| {
                error!(tournament_id, error = %e, "Failed to create tournament record");
                EngineError::from(e)
            })?;
        self.ctx().lobby.transact(|s| {
            if let Some(t) = s.local_tournament_mut(tournament_id) {
                t.record = Some(record);
            }
        });
        self.register_participants(tournament_id, Some(record), roster)
            .await
    }

    // ------------------------------------------------------------------
    // Stage advancement
    // ------------------------------------------------------------------

    /// Launch stage two once both stage-one winners are resolvable
    pub async fn try_advance(&self, tournament: TournamentRef) -> EngineResult<AdvanceOutcome> {
        let gate = self.ctx().lobby.transact(|s| -> EngineResult<Result<Vec<StageMatch>, AdvanceOutcome>> {
            let view = bracket_view(s, tournament)
                .ok_or_else(|| EngineError::NotFound(format!("tournament {}", tournament.id())))?;
            if view.bracket.stage_two.is_some() {
                return Ok(Err(AdvanceOutcome::AlreadyStarted));
            }
            if !view.bracket.stage_one_done() || view.bracket.advancing {
                return Ok(Err(AdvanceOutcome::Deferred));
            }
            view.bracket.advancing = true;
            Ok(Ok(view.bracket.stage_one.clone()))
        })?;
        let slots = match gate {
            Ok(slots) => slots,
            Err(outcome) => return Ok(outcome),
        };

        let mut finalists = Vec::with_capacity(2);
        for slot in &slots {
            if let Some(winner) = self.resolve_winner(slot).await {
                finalists.push(winner);
            }
        }

        let pair: Option<[Entrant; 2]> = finalists.try_into().ok();
        let Some(pair) = pair else {
            self.ctx().lobby.transact(|s| {
                if let Some(view) = bracket_view(s, tournament) {
                    view.bracket.advancing = false;
                }
            });
            info!(tournament_id = tournament.id(), "Stage two deferred, winners unresolved");
            return Ok(AdvanceOutcome::Deferred);
        };

        let recipients = self.ctx().lobby.transact(|s| {
            let view = bracket_view(s, tournament)
                .ok_or_else(|| EngineError::NotFound(format!("tournament {}", tournament.id())))?;
            view.bracket.stage_two = Some(StageMatch::new(pair));
            view.bracket.advancing = false;
            *view.phase = TournamentPhase::StageTwo;
            Ok::<_, EngineError>(tournament_recipients(s, tournament))
        })?;

        self.broadcast(
            &recipients,
            ServerMsg::StartTournamentSignal {
                tournament_id: tournament.id(),
                stage: 2,
            },
        );
        let match_id = self.launch(tournament, Slot::Two).await?;
        Ok(AdvanceOutcome::Started(match_id))
    }

    /// Persisted winner, or the in-memory one for guests and unrecorded matches
    async fn resolve_winner(&self, slot: &StageMatch) -> Option<Entrant> {
        let in_memory = slot.winner.and_then(|w| slot.entrant(w));
        let winner = match (slot.record, in_memory) {
            (_, Some(entrant)) if entrant.temporary => Some(entrant.identity),
            (Some(record), _) => match self.ctx().store.match_winner(record).await {
                Ok(winner) => winner,
                Err(e) => {
                    warn!(record, error = %e, "Failed to read back match winner");
                    None
                }
            },
            (None, _) => slot.winner,
        };
        winner.and_then(|id| slot.entrant(id).cloned())
    }

    async fn advance_with_retry(self: Arc<Self>, tournament: TournamentRef) {
        for attempt in 1..=ADVANCE_ATTEMPTS {
            match self.try_advance(tournament).await {
                Ok(AdvanceOutcome::Deferred) => {
                    debug!(tournament_id = tournament.id(), attempt, "Stage two not ready");
                    sleep(ADVANCE_RETRY).await;
                }
                Ok(_) => return,
                Err(e) => {
                    debug!(tournament_id = tournament.id(), error = %e, "Stopped advancing");
                    return;
                }
            }
        }
        warn!(
            tournament_id = tournament.id(),
            "Stage two still deferred, waiting for an explicit advance"
        );
    }

    async fn complete(&self, tournament: TournamentRef, winner: Option<Uuid>) {
        let Some(closed) = self.ctx().lobby.transact(|s| close_in(s, tournament)) else {
            return;
        };
        let persisted_winner = winner.filter(|w| !closed.guests.contains(w));
        info!(tournament_id = tournament.id(), winner = ?winner, "Tournament finished");

        if let Some(record) = closed.record {
            if let Err(e) = self
                .ctx()
                .store
                .close_tournament(record, TournamentStatus::Finished, persisted_winner)
                .await
            {
                error!(tournament_id = tournament.id(), error = %e, "Failed to close tournament record");
            }
        }
    }

    pub(crate) async fn handle_report(self: &Arc<Self>, report: MatchReport) {
        let tournament = report.tournament;

        if report.status == MatchStatus::Cancelled {
            warn!(tournament_id = tournament.id(), match_id = report.match_id, "Tournament match cancelled");
            if let Err(e) = self.dismantle_now(tournament, None).await {
                error!(tournament_id = tournament.id(), error = %e, "Dismantle after cancellation failed");
            }
            return;
        }

        let progress = self.ctx().lobby.transact(|s| {
            let view = bracket_view(s, tournament)?;
            let stage = view
                .bracket
                .record_result(report.match_id, report.winner, report.record)?;
            let done = view.bracket.stage_one_done();
            match stage {
                Stage::One if done => *view.phase = TournamentPhase::StageTwoPending,
                Stage::Two => *view.phase = TournamentPhase::Finished,
                Stage::One => {}
            }
            Some((stage, done, view.bracket.next_queued()))
        });

        match progress {
            None => debug!(match_id = report.match_id, "Report for a tournament no longer active"),
            Some((Stage::One, _, Some(queued))) => {
                if let Err(e) = self.launch(tournament, Slot::One(queued)).await {
                    error!(tournament_id = tournament.id(), error = %e, "Failed to launch queued match");
                }
            }
            Some((Stage::One, true, None)) => {
                tokio::spawn(self.clone().advance_with_retry(tournament));
            }
            Some((Stage::One, false, None)) => {
                debug!(tournament_id = tournament.id(), "Waiting for the other stage-one match");
            }
            Some((Stage::Two, _, _)) => self.complete(tournament, report.winner).await,
        }
    }

    /// Consume match reports until the channel closes
    pub async fn run(self: Arc<Self>) {
        let Some(mut reports) = self.reports.lock().take() else {
            warn!("Tournament orchestrator already running");
            return;
        };
        info!("Tournament orchestrator started");

        while let Some(report) = reports.recv().await {
            self.handle_report(report).await;
        }
    }
}
