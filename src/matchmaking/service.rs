//! Matchmaking service - pairs players and launches match tasks

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{error, info};
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};
use crate::game::{conclude_cancelled, input_channel, GameMatch, MatchContext, MatchInput, Participant};
use crate::store::{RecordId, Relations};
use crate::ws::protocol::{PlayerSummary, ServerMsg};

use super::registry::{Invite, PlayerEntry};

/// Alias given to the synthesized local opponent
pub const GUEST_ALIAS: &str = "Guest";

/// Result of a random matchmaking request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekOutcome {
    Matched(u64),
    /// Flagged as seeking; a later request from someone else pairs us
    Waiting,
}

/// Result of a cleanup request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanOutcome {
    Withdrawn,
    Cancelled(u64),
}

/// Matchmaking service
pub struct MatchService {
    ctx: MatchContext,
    relations: Arc<dyn Relations>,
}

impl MatchService {
    pub fn new(ctx: MatchContext, relations: Arc<dyn Relations>) -> Self {
        Self { ctx, relations }
    }

    pub fn context(&self) -> &MatchContext {
        &self.ctx
    }

    /// Gateway connect: make sure the tab has a registry entry
    pub fn attach_tab(&self, identity: Uuid, tab_id: Uuid) {
        self.ctx
            .lobby
            .transact(|s| s.get_or_create_entry(identity, Some(tab_id), None).tab_id);
    }

    /// Gateway disconnect: drop the tab's entry and invites. Running
    /// matches keep going and simply miss the tab's pushes.
    pub fn detach_tab(&self, identity: Uuid, tab_id: Uuid) {
        let removed = self.ctx.lobby.transact(|s| s.release_tab(identity, tab_id));
        info!(identity = %identity, tab_id = %tab_id, removed, "Tab detached");
    }

    async fn blocked_with(&self, identity: Uuid) -> EngineResult<std::collections::HashSet<Uuid>> {
        self.relations.blocked_with(identity).await.map_err(|e| {
            error!(identity = %identity, error = %e, "Failed to load blocked relations");
            EngineError::from(e)
        })
    }

    /// Pair with the first compatible seeker, or start seeking
    pub async fn random(
        &self,
        identity: Uuid,
        tab_id: Uuid,
        alias: Option<String>,
    ) -> EngineResult<SeekOutcome> {
        let blocked = self.blocked_with(identity).await?;
        let (input_tx, input_rx) = input_channel();

        let paired = self.ctx.lobby.transact(|s| -> EngineResult<Option<u64>> {
            s.ensure_free(identity)?;
            let me = s
                .get_or_create_entry(identity, Some(tab_id), alias)
                .participant();

            let opponent = s
                .find_opponent(identity, &blocked)
                .and_then(|idx| s.entry_at(idx))
                .map(PlayerEntry::participant);
            let Some(opponent) = opponent else {
                if let Some(entry) = s.entry_mut(identity, tab_id) {
                    entry.seeking = true;
                }
                return Ok(None);
            };

            Ok(Some(s.insert_match([opponent, me], None, None, input_tx)))
        })?;

        match paired {
            Some(match_id) => {
                info!(match_id, identity = %identity, "Paired from matchmaking");
                self.start(match_id, input_rx, None).await?;
                Ok(SeekOutcome::Matched(match_id))
            }
            None => {
                info!(identity = %identity, "Waiting for an opponent");
                Ok(SeekOutcome::Waiting)
            }
        }
    }

    /// Two paddles on one tab against a temporary opponent
    pub async fn local(
        &self,
        identity: Uuid,
        tab_id: Uuid,
        alias: Option<String>,
        opponent_alias: Option<String>,
    ) -> EngineResult<u64> {
        let (input_tx, input_rx) = input_channel();

        let match_id = self.ctx.lobby.transact(|s| -> EngineResult<u64> {
            s.ensure_free(identity)?;
            let me = s
                .get_or_create_entry(identity, Some(tab_id), alias)
                .participant();
            // The guest has no tab of its own and never enters the registry
            let guest = Participant {
                identity: Uuid::new_v4(),
                tab_id: Uuid::new_v4(),
                alias: Some(opponent_alias.unwrap_or_else(|| GUEST_ALIAS.to_string())),
                temporary: true,
            };

            Ok(s.insert_match([me, guest], Some((identity, tab_id)), None, input_tx))
        })?;

        info!(match_id, identity = %identity, "Local match created");
        self.start(match_id, input_rx, None).await?;
        Ok(match_id)
    }

    pub async fn invite(
        &self,
        identity: Uuid,
        tab_id: Uuid,
        alias: Option<String>,
        invitee: Uuid,
    ) -> EngineResult<()> {
        if invitee == identity {
            return Err(EngineError::Validation("cannot invite yourself".into()));
        }
        if self.blocked_with(identity).await?.contains(&invitee) {
            return Err(EngineError::Precondition(
                "a block exists between these players".into(),
            ));
        }

        let from = self.ctx.lobby.transact(|s| {
            s.ensure_free(identity)?;
            if !s.entries().iter().any(|p| p.identity == invitee) {
                return Err(EngineError::NotFound("invited player is not online".into()));
            }
            if s.has_invite(identity, invitee) {
                return Err(EngineError::Conflict("invite already pending".into()));
            }

            let me = s.get_or_create_entry(identity, Some(tab_id), alias);
            let from = PlayerSummary {
                identity,
                alias: me.alias.clone(),
                ready: false,
            };
            s.add_invite(Invite {
                inviter: identity,
                inviter_tab: tab_id,
                invitee,
            });
            Ok(from)
        })?;

        let delivered = self
            .ctx
            .connections
            .send_to_identity(invitee, &ServerMsg::InviteReceived { from });
        info!(inviter = %identity, invitee = %invitee, delivered, "Invite sent");
        Ok(())
    }

    /// Consume a pending invite and start the match
    pub async fn accept(
        &self,
        identity: Uuid,
        tab_id: Uuid,
        alias: Option<String>,
        inviter: Uuid,
    ) -> EngineResult<u64> {
        let (input_tx, input_rx) = input_channel();

        let match_id = self.ctx.lobby.transact(|s| {
            if !s.has_invite(inviter, identity) {
                return Err(EngineError::NotFound("no pending invite from this player".into()));
            }
            s.ensure_free(identity)?;
            s.ensure_free(inviter)?;

            let invite = s
                .take_invite(inviter, identity)
                .ok_or_else(|| EngineError::NotFound("no pending invite from this player".into()))?;
            let host = s
                .entry(invite.inviter, invite.inviter_tab)
                .map(PlayerEntry::participant)
                .ok_or_else(|| EngineError::NotFound("inviter is no longer connected".into()))?;
            let me = s
                .get_or_create_entry(identity, Some(tab_id), alias)
                .participant();

            Ok(s.insert_match([host, me], None, None, input_tx))
        })?;

        info!(match_id, inviter = %inviter, invitee = %identity, "Invite accepted");
        self.start(match_id, input_rx, None).await?;
        Ok(match_id)
    }

    /// Without a match id: stop seeking. With one: cancel that match.
    pub async fn clean(
        &self,
        identity: Uuid,
        tab_id: Uuid,
        match_id: Option<u64>,
    ) -> EngineResult<CleanOutcome> {
        let Some(match_id) = match_id else {
            self.ctx.lobby.transact(|s| s.withdraw(identity, tab_id));
            info!(identity = %identity, "Left matchmaking");
            return Ok(CleanOutcome::Withdrawn);
        };

        let handle = self.ctx.lobby.transact(|s| {
            let handle = s
                .match_handle(match_id)
                .ok_or_else(|| EngineError::NotFound(format!("match {match_id}")))?;
            if !handle.involves(identity) {
                return Err(EngineError::Unauthorized(
                    "only participants can cancel a match".into(),
                ));
            }
            s.remove_match(match_id)
                .ok_or_else(|| EngineError::NotFound(format!("match {match_id}")))
        })?;

        info!(match_id, cancelled_by = %identity, "Match cancelled");
        conclude_cancelled(&self.ctx, &handle, Some(identity)).await;
        Ok(CleanOutcome::Cancelled(match_id))
    }

    /// Open the persistence record and spawn the match task. The task runs
    /// even when the record could not be written.
    pub async fn start(
        &self,
        match_id: u64,
        input_rx: mpsc::Receiver<MatchInput>,
        tournament_record: Option<RecordId>,
    ) -> EngineResult<()> {
        let handle = self
            .ctx
            .lobby
            .match_handle(match_id)
            .ok_or_else(|| EngineError::NotFound(format!("match {match_id}")))?;

        let persisted = self.open_record(match_id, &handle.players, tournament_record).await;

        tokio::spawn(GameMatch::new(handle, input_rx, self.ctx.clone()).run());
        persisted
    }

    async fn open_record(
        &self,
        match_id: u64,
        players: &[Participant; 2],
        tournament_record: Option<RecordId>,
    ) -> EngineResult<()> {
        let store = &self.ctx.store;
        let result = async {
            let record = store.create_match(tournament_record).await?;
            self.ctx.lobby.set_record(match_id, record);
            store
                .attach_players(
                    record,
                    players[0].persisted_identity(),
                    players[1].persisted_identity(),
                )
                .await
        }
        .await;

        result.map_err(|e| {
            error!(match_id, error = %e, "Failed to open match record");
            EngineError::from(e)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::MatchReport;
    use crate::matchmaking::Lobby;
    use crate::store::{MatchStatus, MemoryStore};
    use crate::ws::connections::ConnectionTable;

    struct Fixture {
        service: MatchService,
        store: Arc<MemoryStore>,
        _reports: mpsc::UnboundedReceiver<MatchReport>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let (reports_tx, reports) = mpsc::unbounded_channel();
        let ctx = MatchContext {
            lobby: Arc::new(Lobby::new()),
            connections: ConnectionTable::new(),
            store: store.clone(),
            reports: reports_tx,
            pause_between_rounds: false,
        };
        Fixture {
            service: MatchService::new(ctx, store.clone()),
            store,
            _reports: reports,
        }
    }

    struct Client {
        identity: Uuid,
        tab: Uuid,
        rx: mpsc::Receiver<ServerMsg>,
    }

    fn connect(service: &MatchService) -> Client {
        let (tx, rx) = mpsc::channel(1024);
        let (identity, tab) = (Uuid::new_v4(), Uuid::new_v4());
        let ctx = service.context();
        ctx.connections.register(identity, tab, tx);
        ctx.lobby
            .transact(|s| s.get_or_create_entry(identity, Some(tab), None).tab_id);
        Client { identity, tab, rx }
    }

    fn seeking(service: &MatchService, identity: Uuid) -> bool {
        service
            .context()
            .lobby
            .transact(|s| s.entries().iter().any(|p| p.identity == identity && p.seeking))
    }

    #[tokio::test(start_paused = true)]
    async fn two_seekers_pair_exactly_once() {
        let f = fixture();
        let mut a = connect(&f.service);
        let mut b = connect(&f.service);
        let c = connect(&f.service);

        assert_eq!(
            f.service.random(a.identity, a.tab, Some("A".into())).await.unwrap(),
            SeekOutcome::Waiting
        );
        let outcome = f.service.random(b.identity, b.tab, Some("B".into())).await.unwrap();
        let SeekOutcome::Matched(match_id) = outcome else {
            panic!("expected a pairing, got {outcome:?}");
        };
        assert!(!seeking(&f.service, a.identity));
        assert!(!seeking(&f.service, b.identity));

        assert_eq!(
            f.service.random(c.identity, c.tab, None).await.unwrap(),
            SeekOutcome::Waiting
        );
        assert!(seeking(&f.service, c.identity));

        match a.rx.recv().await {
            Some(ServerMsg::StartGame { match_id: id, opponent, .. }) => {
                assert_eq!(id, match_id);
                assert_eq!(opponent.identity, b.identity);
                assert_eq!(opponent.alias.as_deref(), Some("B"));
            }
            other => panic!("unexpected {other:?}"),
        }
        match b.rx.recv().await {
            Some(ServerMsg::StartGame { opponent, .. }) => assert_eq!(opponent.identity, a.identity),
            other => panic!("unexpected {other:?}"),
        }

        let records = f.store.match_records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].1.left, Some(a.identity));
        assert_eq!(records[0].1.right, Some(b.identity));
    }

    #[tokio::test(start_paused = true)]
    async fn blocked_seekers_are_skipped() {
        let f = fixture();
        let a = connect(&f.service);
        let b = connect(&f.service);
        f.store.block(a.identity, b.identity);

        f.service.random(a.identity, a.tab, None).await.unwrap();
        assert_eq!(
            f.service.random(b.identity, b.tab, None).await.unwrap(),
            SeekOutcome::Waiting
        );
        assert!(seeking(&f.service, a.identity));
        assert!(seeking(&f.service, b.identity));
    }

    #[tokio::test(start_paused = true)]
    async fn same_identity_never_pairs_with_itself() {
        let f = fixture();
        let a = connect(&f.service);
        let other_tab = Uuid::new_v4();

        f.service.random(a.identity, a.tab, None).await.unwrap();
        assert_eq!(
            f.service.random(a.identity, other_tab, None).await.unwrap(),
            SeekOutcome::Waiting
        );
    }

    #[tokio::test(start_paused = true)]
    async fn seeker_busy_on_another_tab_is_not_paired_again() {
        let f = fixture();
        let a = connect(&f.service);
        let c = connect(&f.service);
        let other_tab = Uuid::new_v4();

        assert_eq!(
            f.service.random(a.identity, a.tab, None).await.unwrap(),
            SeekOutcome::Waiting
        );
        f.service.local(a.identity, other_tab, None, None).await.unwrap();
        assert!(!seeking(&f.service, a.identity));

        assert_eq!(
            f.service.random(c.identity, c.tab, None).await.unwrap(),
            SeekOutcome::Waiting
        );
        let playing = f.service.context().lobby.transact(|s| {
            s.matches().iter().filter(|m| m.involves(a.identity)).count()
        });
        assert_eq!(playing, 1);
        assert!(matches!(
            f.service.random(a.identity, a.tab, None).await,
            Err(EngineError::Conflict(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn invite_then_accept_starts_a_match() {
        let f = fixture();
        let mut host = connect(&f.service);
        let mut guest = connect(&f.service);

        f.service
            .invite(host.identity, host.tab, Some("host".into()), guest.identity)
            .await
            .unwrap();
        match guest.rx.recv().await {
            Some(ServerMsg::InviteReceived { from }) => {
                assert_eq!(from.identity, host.identity);
                assert_eq!(from.alias.as_deref(), Some("host"));
            }
            other => panic!("unexpected {other:?}"),
        }

        assert!(matches!(
            f.service.invite(host.identity, host.tab, None, guest.identity).await,
            Err(EngineError::Conflict(_))
        ));
        assert!(matches!(
            f.service.invite(host.identity, host.tab, None, host.identity).await,
            Err(EngineError::Validation(_))
        ));

        let match_id = f
            .service
            .accept(guest.identity, guest.tab, None, host.identity)
            .await
            .unwrap();
        assert!(matches!(
            host.rx.recv().await,
            Some(ServerMsg::StartGame { match_id: id, .. }) if id == match_id
        ));

        // Invite is consumed
        assert!(matches!(
            f.service.accept(guest.identity, guest.tab, None, host.identity).await,
            Err(EngineError::NotFound(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn inviting_a_blocked_player_fails() {
        let f = fixture();
        let a = connect(&f.service);
        let b = connect(&f.service);
        f.store.block(b.identity, a.identity);

        assert!(matches!(
            f.service.invite(a.identity, a.tab, None, b.identity).await,
            Err(EngineError::Precondition(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn local_match_drives_both_paddles_from_one_tab() {
        let f = fixture();
        let mut host = connect(&f.service);

        let match_id = f
            .service
            .local(host.identity, host.tab, Some("host".into()), None)
            .await
            .unwrap();
        match host.rx.recv().await {
            Some(ServerMsg::StartGame { local, opponent, .. }) => {
                assert!(local);
                assert_eq!(opponent.alias.as_deref(), Some(GUEST_ALIAS));
            }
            other => panic!("unexpected {other:?}"),
        }

        let (_, record) = f.store.match_records().pop().unwrap();
        assert_eq!(record.left, Some(host.identity));
        assert_eq!(record.right, None);

        let handle = f.service.context().lobby.match_handle(match_id).unwrap();
        assert!(handle.players[1].temporary);

        // The guest only exists inside the match
        let entries = f.service.context().lobby.transact(|s| s.entries().to_vec());
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].identity, host.identity);

        f.service.clean(host.identity, host.tab, Some(match_id)).await.unwrap();
        assert_eq!(f.service.context().lobby.stats().tabs, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn clean_cancels_and_persists() {
        let f = fixture();
        let a = connect(&f.service);
        let mut b = connect(&f.service);
        let outsider = connect(&f.service);

        f.service.random(a.identity, a.tab, None).await.unwrap();
        let SeekOutcome::Matched(match_id) = f.service.random(b.identity, b.tab, None).await.unwrap() else {
            panic!("expected a pairing");
        };

        assert!(matches!(
            f.service.clean(outsider.identity, outsider.tab, Some(match_id)).await,
            Err(EngineError::Unauthorized(_))
        ));
        assert_eq!(
            f.service.clean(a.identity, a.tab, Some(match_id)).await.unwrap(),
            CleanOutcome::Cancelled(match_id)
        );
        assert!(matches!(
            f.service.clean(a.identity, a.tab, Some(match_id)).await,
            Err(EngineError::NotFound(_))
        ));

        let mut last = None;
        while let Ok(msg) = b.rx.try_recv() {
            last = Some(msg);
        }
        assert!(matches!(last, Some(ServerMsg::End { cancelled: true, .. })));

        let (_, record) = f.store.match_records().pop().unwrap();
        let outcome = record.outcome.unwrap();
        assert_eq!(outcome.status, MatchStatus::Cancelled);
        assert_eq!(outcome.cancelled_by, Some(a.identity));
        assert_eq!(outcome.winner, None);
    }
}
