//! Match state and authoritative tick loop

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{interval, sleep, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::matchmaking::Lobby;
use crate::store::{MatchOutcome, MatchStatus, Persistence, RecordId};
use crate::tournament::TournamentRef;
use crate::util::time::{tick_duration, COUNTDOWN_SECS};
use crate::ws::connections::ConnectionTable;
use crate::ws::protocol::{PlayerSummary, ServerMsg, Side};

use super::physics::{bounce_paddle, bounce_walls, Ball, Paddle};
use super::snapshot::{self, oriented_score};
use super::MatchCommand;

/// First side to reach this many points wins
pub const WINNING_SCORE: u8 = 3;

/// Inbound command buffer per match
pub const INPUT_CAPACITY: usize = 256;

/// Channel pair feeding a match task
pub fn input_channel() -> (mpsc::Sender<MatchInput>, mpsc::Receiver<MatchInput>) {
    mpsc::channel(INPUT_CAPACITY)
}

/// Match phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchPhase {
    /// Registered, start pushed
    Created,
    /// Countdown running
    Starting,
    /// Ball in play
    Running,
    /// A point was just scored
    RoundEnd,
    /// Someone reached the winning score
    Over,
    /// Removed from the lobby by someone else
    Cancelled,
}

/// One side of a match as registered in the lobby
#[derive(Debug, Clone, PartialEq)]
pub struct Participant {
    pub identity: Uuid,
    pub tab_id: Uuid,
    pub alias: Option<String>,
    /// Synthesized local opponent, never persisted
    pub temporary: bool,
}

impl Participant {
    pub fn summary(&self) -> PlayerSummary {
        PlayerSummary {
            identity: self.identity,
            alias: self.alias.clone(),
            ready: false,
        }
    }

    /// Identity as sent to the persistence collaborator
    pub fn persisted_identity(&self) -> Option<Uuid> {
        (!self.temporary).then_some(self.identity)
    }
}

/// Lobby-side view of a running match
#[derive(Debug, Clone)]
pub struct MatchHandle {
    pub id: u64,
    /// `[left, right]`
    pub players: [Participant; 2],
    /// Tab driving both paddles in local play
    pub controller: Option<(Uuid, Uuid)>,
    pub tournament: Option<TournamentRef>,
    pub record: Option<RecordId>,
    /// `[left, right]`, updated after every point
    pub score: [u8; 2],
    pub created_at: Instant,
    pub input_tx: mpsc::Sender<MatchInput>,
}

impl MatchHandle {
    pub fn is_local(&self) -> bool {
        self.controller.is_some()
    }

    /// Whether `identity` plays in or drives this match
    pub fn involves(&self, identity: Uuid) -> bool {
        self.controller.map(|(id, _)| id) == Some(identity)
            || self.players.iter().any(|p| p.identity == identity)
    }

    /// Paddle a tab may steer. In local play the controller picks the side.
    pub fn side_for(&self, identity: Uuid, tab_id: Uuid, requested: Option<Side>) -> Option<Side> {
        if let Some(controller) = self.controller {
            return (controller == (identity, tab_id)).then(|| requested.unwrap_or(Side::Left));
        }
        self.players
            .iter()
            .position(|p| p.identity == identity && p.tab_id == tab_id)
            .map(|idx| if idx == 0 { Side::Left } else { Side::Right })
    }

    /// Connected-tab recipients and the side each one is shown as
    pub fn recipients(&self) -> Vec<(Uuid, Uuid, Side)> {
        if let Some((identity, tab_id)) = self.controller {
            return vec![(identity, tab_id, Side::Left)];
        }
        [Side::Left, Side::Right]
            .into_iter()
            .map(|side| (&self.players[side.index()], side))
            .filter(|(p, _)| !p.temporary)
            .map(|(p, side)| (p.identity, p.tab_id, side))
            .collect()
    }

    pub fn duration_secs(&self) -> u64 {
        self.created_at.elapsed().as_secs()
    }
}

/// Input routed from the gateway
#[derive(Debug, Clone)]
pub struct MatchInput {
    pub identity: Uuid,
    pub tab_id: Uuid,
    pub command: MatchCommand,
}

/// Sent to the tournament orchestrator when a tournament match concludes
#[derive(Debug, Clone)]
pub struct MatchReport {
    pub match_id: u64,
    pub tournament: TournamentRef,
    pub record: Option<RecordId>,
    /// In-memory winner, including temporary guests
    pub winner: Option<Uuid>,
    pub status: MatchStatus,
}

/// Shared services every match task needs
#[derive(Clone)]
pub struct MatchContext {
    pub lobby: Arc<Lobby>,
    pub connections: ConnectionTable,
    pub store: Arc<dyn Persistence>,
    pub reports: mpsc::UnboundedSender<MatchReport>,
    pub pause_between_rounds: bool,
}

/// Result of one simulation step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Continue,
    Point { scorer: Side },
}

/// Simulation state (owned by the match task)
#[derive(Debug, Clone)]
pub struct MatchState {
    pub id: u64,
    pub phase: MatchPhase,
    pub tick: u64,
    pub ball: Ball,
    /// `[left, right]`
    pub paddles: [Paddle; 2],
    /// `[left, right]`
    pub score: [u8; 2],
    pub started: bool,
    pub over: bool,
    pub paused: bool,
}

impl MatchState {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            phase: MatchPhase::Created,
            tick: 0,
            ball: Ball::serve(Side::Right),
            paddles: [Paddle::new(Side::Left), Paddle::new(Side::Right)],
            score: [0, 0],
            started: false,
            over: false,
            paused: false,
        }
    }

    /// Reset score and positions and put the ball in play
    pub fn init(&mut self) {
        self.score = [0, 0];
        self.started = true;
        self.over = false;
        self.paused = false;
        self.paddles = [Paddle::new(Side::Left), Paddle::new(Side::Right)];
        self.ball = Ball::serve(Side::Right);
        self.phase = MatchPhase::Running;
    }

    /// Apply a movement command to one paddle. Returns false for no-ops.
    pub fn register_input(&mut self, side: Side, command: &MatchCommand) -> bool {
        let paddle = &mut self.paddles[side.index()];
        match *command {
            MatchCommand::Move {
                direction, pressed, ..
            } => paddle.set_key(direction, pressed),
            MatchCommand::Drag { y, .. } => paddle.set_drag(y),
            MatchCommand::Go => false,
        }
    }

    /// Leave a pause and start the next round
    pub fn resume(&mut self) -> bool {
        if !self.paused || self.over {
            return false;
        }
        self.paused = false;
        self.phase = MatchPhase::Running;
        true
    }

    /// Advance one tick. Does nothing unless the ball is in play.
    pub fn step(&mut self) -> TickOutcome {
        if self.phase != MatchPhase::Running || self.paused {
            return TickOutcome::Continue;
        }
        self.tick += 1;

        for paddle in self.paddles.iter_mut() {
            paddle.advance();
        }
        self.ball.advance();
        bounce_walls(&mut self.ball);
        for paddle in self.paddles.iter() {
            if bounce_paddle(&mut self.ball, paddle) {
                break;
            }
        }

        let Some(exited) = self.ball.exited() else {
            return TickOutcome::Continue;
        };

        let scorer = exited.opposite();
        self.score[scorer.index()] += 1;
        if self.score[scorer.index()] >= WINNING_SCORE {
            self.finish();
        } else {
            self.phase = MatchPhase::RoundEnd;
            // Next serve goes to whoever conceded
            self.ball = Ball::serve(exited);
        }
        TickOutcome::Point { scorer }
    }

    /// Side whose score equals the winning threshold
    pub fn winner(&self) -> Option<Side> {
        if self.score[Side::Left.index()] == WINNING_SCORE {
            Some(Side::Left)
        } else if self.score[Side::Right.index()] == WINNING_SCORE {
            Some(Side::Right)
        } else {
            None
        }
    }

    pub fn finish(&mut self) {
        self.over = true;
        self.started = false;
        self.phase = MatchPhase::Over;
    }
}

/// The authoritative match task
pub struct GameMatch {
    state: MatchState,
    handle: MatchHandle,
    input_rx: mpsc::Receiver<MatchInput>,
    ctx: MatchContext,
}

impl GameMatch {
    pub fn new(handle: MatchHandle, input_rx: mpsc::Receiver<MatchInput>, ctx: MatchContext) -> Self {
        Self {
            state: MatchState::new(handle.id),
            handle,
            input_rx,
            ctx,
        }
    }

    /// Countdown, then the tick loop until the match is over or removed
    pub async fn run(mut self) {
        info!(match_id = self.handle.id, local = self.handle.is_local(), "Match created");

        self.announce();
        if !self.countdown().await {
            return;
        }

        self.state.init();
        info!(match_id = self.handle.id, "Match started");
        self.play().await;
    }

    fn send(&self, identity: Uuid, tab_id: Uuid, msg: ServerMsg) {
        self.ctx.connections.send(identity, tab_id, msg);
    }

    fn announce(&self) {
        let tournament_id = self.handle.tournament.map(|t| t.id());
        for (identity, tab_id, side) in self.handle.recipients() {
            let msg = ServerMsg::StartGame {
                match_id: self.handle.id,
                side,
                you: self.handle.players[side.index()].summary(),
                opponent: self.handle.players[side.opposite().index()].summary(),
                tournament_id,
                local: self.handle.is_local(),
            };
            self.send(identity, tab_id, msg);
        }
    }

    /// Pick up the lobby's current view of this match. `None` once removed.
    fn refresh(&mut self) -> bool {
        match self.ctx.lobby.match_handle(self.handle.id) {
            Some(handle) => {
                self.handle.players = handle.players;
                self.handle.controller = handle.controller;
                true
            }
            None => {
                self.state.phase = MatchPhase::Cancelled;
                debug!(match_id = self.handle.id, "Match no longer registered, stopping");
                false
            }
        }
    }

    /// 3, 2, 1, 0 at one-second steps. Returns false if the match was removed.
    async fn countdown(&mut self) -> bool {
        self.state.phase = MatchPhase::Starting;

        for count in (0..=COUNTDOWN_SECS).rev() {
            if !self.refresh() {
                return false;
            }
            for (identity, tab_id, _) in self.handle.recipients() {
                self.send(identity, tab_id, ServerMsg::DecountGame { count });
            }
            if count > 0 {
                sleep(Duration::from_secs(1)).await;
            }
        }
        true
    }

    async fn play(&mut self) {
        let mut ticker = interval(tick_duration());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;

            if !self.refresh() {
                return;
            }

            self.drain_inputs();
            if self.state.paused {
                continue;
            }

            let outcome = self.state.step();
            self.broadcast_state();

            if let TickOutcome::Point { scorer } = outcome {
                self.ctx.lobby.record_score(self.handle.id, self.state.score);
                info!(
                    match_id = self.handle.id,
                    scorer = ?scorer,
                    score = ?self.state.score,
                    "Point scored"
                );

                if self.state.over {
                    self.end_match().await;
                    return;
                }

                if self.ctx.pause_between_rounds {
                    self.state.paused = true;
                } else {
                    self.state.phase = MatchPhase::Running;
                }
            }
        }
    }

    /// Apply every input queued since the previous tick
    fn drain_inputs(&mut self) {
        while let Ok(input) = self.input_rx.try_recv() {
            self.apply_input(input);
        }
    }

    fn apply_input(&mut self, input: MatchInput) {
        let requested = match &input.command {
            MatchCommand::Move { side, .. } | MatchCommand::Drag { side, .. } => *side,
            MatchCommand::Go => None,
        };
        let Some(side) = self.handle.side_for(input.identity, input.tab_id, requested) else {
            warn!(
                match_id = self.handle.id,
                identity = %input.identity,
                "Input from a tab that does not play this match"
            );
            return;
        };

        if input.command == MatchCommand::Go {
            if self.state.resume() {
                info!(match_id = self.handle.id, "Match resumed");
            }
            return;
        }
        self.state.register_input(side, &input.command);
    }

    fn broadcast_state(&self) {
        for (identity, tab_id, side) in self.handle.recipients() {
            let msg = snapshot::build(
                self.handle.id,
                self.state.tick,
                side,
                &self.state.ball,
                &self.state.paddles,
                self.state.score,
            );
            self.send(identity, tab_id, msg);
        }
    }

    async fn end_match(&mut self) {
        self.state.finish();

        // Whoever removes the match from the lobby owns its conclusion
        let Some(handle) = self.ctx.lobby.remove_match(self.handle.id) else {
            debug!(match_id = self.handle.id, "Match already removed, skipping conclusion");
            return;
        };

        let winner_side = self.state.winner();
        let status = if winner_side.is_some() {
            MatchStatus::Finished
        } else {
            MatchStatus::Cancelled
        };
        let winner = winner_side.map(|side| &handle.players[side.index()]);

        for (identity, tab_id, side) in handle.recipients() {
            self.send(
                identity,
                tab_id,
                ServerMsg::End {
                    match_id: handle.id,
                    score: oriented_score(self.state.score, side),
                    winner: winner.map(|w| w.identity),
                    cancelled: status == MatchStatus::Cancelled,
                },
            );
        }

        info!(
            match_id = handle.id,
            score = ?self.state.score,
            winner = ?winner.map(|w| w.identity),
            "Match ended"
        );

        let outcome = MatchOutcome {
            status,
            winner: winner.and_then(Participant::persisted_identity),
            score: self.state.score,
            duration_secs: handle.duration_secs(),
            cancelled_by: None,
        };
        persist_outcome(self.ctx.store.as_ref(), &handle, &outcome).await;

        if let Some(tournament) = handle.tournament {
            let report = MatchReport {
                match_id: handle.id,
                tournament,
                record: handle.record,
                winner: winner.map(|w| w.identity),
                status,
            };
            if self.ctx.reports.send(report).is_err() {
                warn!(match_id = handle.id, "Tournament orchestrator is gone");
            }
        }
    }
}

/// Write the final record. Failures are logged; the engine does not roll back.
pub async fn persist_outcome(store: &dyn Persistence, handle: &MatchHandle, outcome: &MatchOutcome) {
    let Some(record) = handle.record else {
        warn!(match_id = handle.id, "Match has no record, outcome not persisted");
        return;
    };
    if let Err(e) = store.finish_match(record, outcome).await {
        error!(match_id = handle.id, record, error = %e, "Failed to persist match outcome");
    }
}

/// Conclude a match that was removed by an explicit cleanup request
pub async fn conclude_cancelled(
    ctx: &MatchContext,
    handle: &MatchHandle,
    cancelled_by: Option<Uuid>,
) {
    for (identity, tab_id, side) in handle.recipients() {
        ctx.connections.send(
            identity,
            tab_id,
            ServerMsg::End {
                match_id: handle.id,
                score: oriented_score(handle.score, side),
                winner: None,
                cancelled: true,
            },
        );
    }

    let outcome = MatchOutcome {
        status: MatchStatus::Cancelled,
        winner: None,
        score: handle.score,
        duration_secs: handle.duration_secs(),
        cancelled_by,
    };
    persist_outcome(ctx.store.as_ref(), handle, &outcome).await;

    if let Some(tournament) = handle.tournament {
        let report = MatchReport {
            match_id: handle.id,
            tournament,
            record: handle.record,
            winner: None,
            status: MatchStatus::Cancelled,
        };
        if ctx.reports.send(report).is_err() {
            warn!(match_id = handle.id, "Tournament orchestrator is gone");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::ws::protocol::Direction;

    fn participant(alias: &str) -> Participant {
        Participant {
            identity: Uuid::new_v4(),
            tab_id: Uuid::new_v4(),
            alias: Some(alias.to_string()),
            temporary: false,
        }
    }

    /// Ball about to leave through `side`, clear of the paddle
    fn ball_leaving(side: Side) -> Ball {
        let mut ball = Ball::serve(side);
        ball.x = match side {
            Side::Left => -0.995,
            Side::Right => 0.995,
        };
        ball.y = 0.9;
        ball
    }

    struct Harness {
        ctx: MatchContext,
        store: Arc<MemoryStore>,
        reports: mpsc::UnboundedReceiver<MatchReport>,
    }

    fn harness() -> Harness {
        let store = Arc::new(MemoryStore::new());
        let (reports_tx, reports) = mpsc::unbounded_channel();
        let ctx = MatchContext {
            lobby: Arc::new(Lobby::new()),
            connections: ConnectionTable::new(),
            store: store.clone(),
            reports: reports_tx,
            pause_between_rounds: false,
        };
        Harness {
            ctx,
            store,
            reports,
        }
    }

    fn connect(ctx: &MatchContext, p: &Participant) -> mpsc::Receiver<ServerMsg> {
        let (tx, rx) = mpsc::channel(1024);
        ctx.connections.register(p.identity, p.tab_id, tx);
        rx
    }

    fn register(ctx: &MatchContext, players: [Participant; 2]) -> (MatchHandle, mpsc::Receiver<MatchInput>) {
        let (input_tx, input_rx) = mpsc::channel(INPUT_CAPACITY);
        let id = ctx
            .lobby
            .transact(|s| s.insert_match(players, None, None, input_tx));
        let handle = ctx.lobby.match_handle(id).unwrap();
        (handle, input_rx)
    }

    #[test]
    fn match_is_over_exactly_at_winning_score() {
        let mut state = MatchState::new(1);
        state.init();

        for expected in 1..=WINNING_SCORE {
            assert!(!state.over);
            state.ball = ball_leaving(Side::Left);
            let outcome = state.step();
            assert_eq!(outcome, TickOutcome::Point { scorer: Side::Right });
            assert_eq!(state.score, [0, expected]);
            if expected < WINNING_SCORE {
                assert_eq!(state.phase, MatchPhase::RoundEnd);
                assert_eq!(state.ball.x, 0.0);
                state.phase = MatchPhase::Running;
            }
        }
        assert!(state.over);
        assert_eq!(state.phase, MatchPhase::Over);
        assert_eq!(state.winner(), Some(Side::Right));

        // No further scoring once over
        state.ball = ball_leaving(Side::Left);
        assert_eq!(state.step(), TickOutcome::Continue);
        assert_eq!(state.score, [0, 3]);
    }

    #[test]
    fn winner_compares_against_threshold() {
        let mut state = MatchState::new(1);
        state.score = [1, 2];
        assert_eq!(state.winner(), None);
        state.score = [3, 2];
        assert_eq!(state.winner(), Some(Side::Left));
        state.score = [0, 3];
        assert_eq!(state.winner(), Some(Side::Right));
    }

    #[test]
    fn input_is_visible_on_next_tick() {
        let mut state = MatchState::new(1);
        state.init();
        let up = MatchCommand::Move {
            direction: Direction::Up,
            pressed: true,
            side: None,
        };
        assert!(state.register_input(Side::Right, &up));
        assert!(!state.register_input(Side::Right, &up));
        state.step();
        assert!(state.paddles[1].y > 0.0);
        assert_eq!(state.paddles[0].y, 0.0);
    }

    #[test]
    fn go_only_resumes_a_paused_match() {
        let mut state = MatchState::new(1);
        state.init();
        assert!(!state.resume());
        state.paused = true;
        state.phase = MatchPhase::RoundEnd;
        assert_eq!(state.step(), TickOutcome::Continue);
        assert!(state.resume());
        assert_eq!(state.phase, MatchPhase::Running);
    }

    #[test]
    fn local_controller_drives_both_sides() {
        let (tx, _rx) = mpsc::channel(1);
        let owner = participant("host");
        let guest = Participant {
            temporary: true,
            ..participant("guest")
        };
        let handle = MatchHandle {
            id: 5,
            players: [owner.clone(), guest.clone()],
            controller: Some((owner.identity, owner.tab_id)),
            tournament: None,
            record: None,
            score: [0, 0],
            created_at: Instant::now(),
            input_tx: tx,
        };

        assert_eq!(
            handle.side_for(owner.identity, owner.tab_id, Some(Side::Right)),
            Some(Side::Right)
        );
        assert_eq!(handle.side_for(owner.identity, owner.tab_id, None), Some(Side::Left));
        assert_eq!(handle.side_for(guest.identity, guest.tab_id, None), None);
        assert_eq!(handle.recipients(), vec![(owner.identity, owner.tab_id, Side::Left)]);
    }

    #[tokio::test(start_paused = true)]
    async fn ball_out_right_at_two_nil_finishes_for_left() {
        let h = harness();
        let left = participant("left");
        let right = participant("right");
        let mut left_rx = connect(&h.ctx, &left);
        let mut right_rx = connect(&h.ctx, &right);

        let (handle, input_rx) = register(&h.ctx, [left.clone(), right.clone()]);
        let record = h.store.create_match(None).await.unwrap();
        h.ctx.lobby.set_record(handle.id, record);
        let handle = h.ctx.lobby.match_handle(handle.id).unwrap();

        let mut game = GameMatch::new(handle.clone(), input_rx, h.ctx.clone());
        game.state.init();
        game.state.score = [2, 0];
        game.state.ball = ball_leaving(Side::Right);

        game.play().await;

        assert_eq!(game.state.phase, MatchPhase::Over);
        assert_eq!(game.state.score, [3, 0]);
        assert_eq!(game.state.winner(), Some(Side::Left));
        assert!(h.ctx.lobby.match_handle(handle.id).is_none());

        let outcome = h.store.match_record(record).unwrap().outcome.unwrap();
        assert_eq!(outcome.status, MatchStatus::Finished);
        assert_eq!(outcome.winner, Some(left.identity));
        assert_eq!(outcome.score, [3, 0]);

        let last = |rx: &mut mpsc::Receiver<ServerMsg>| {
            let mut last = None;
            while let Ok(msg) = rx.try_recv() {
                last = Some(msg);
            }
            last
        };
        assert_eq!(
            last(&mut left_rx),
            Some(ServerMsg::End {
                match_id: handle.id,
                score: [3, 0],
                winner: Some(left.identity),
                cancelled: false
            })
        );
        assert_eq!(
            last(&mut right_rx),
            Some(ServerMsg::End {
                match_id: handle.id,
                score: [0, 3],
                winner: Some(left.identity),
                cancelled: false
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn paused_match_waits_for_go_after_a_point() {
        let mut h = harness();
        h.ctx.pause_between_rounds = true;
        let left = participant("left");
        let right = participant("right");
        let mut left_rx = connect(&h.ctx, &left);

        let (handle, input_rx) = register(&h.ctx, [left.clone(), right.clone()]);
        let input_tx = handle.input_tx.clone();
        let mut game = GameMatch::new(handle.clone(), input_rx, h.ctx.clone());
        game.state.init();
        game.state.ball = ball_leaving(Side::Left);
        let task = tokio::spawn(async move {
            game.play().await;
            game
        });

        match left_rx.recv().await {
            Some(ServerMsg::State(snap)) => {
                assert_eq!(snap.tick, 1);
                assert_eq!(snap.score, [0, 1]);
            }
            other => panic!("unexpected {other:?}"),
        }

        // Ticks keep running but nothing moves or is pushed
        sleep(Duration::from_millis(500)).await;
        assert!(left_rx.try_recv().is_err());

        input_tx
            .send(MatchInput {
                identity: right.identity,
                tab_id: right.tab_id,
                command: MatchCommand::Go,
            })
            .await
            .unwrap();
        match left_rx.recv().await {
            Some(ServerMsg::State(snap)) => assert_eq!(snap.tick, 2),
            other => panic!("unexpected {other:?}"),
        }

        assert!(h.ctx.lobby.remove_match(handle.id).is_some());
        let game = task.await.unwrap();
        assert_eq!(game.state.phase, MatchPhase::Cancelled);
        assert_eq!(game.state.score, [0, 1]);
    }

    #[tokio::test(start_paused = true)]
    async fn removed_match_stops_countdown_silently() {
        let h = harness();
        let a = participant("a");
        let b = participant("b");
        let mut a_rx = connect(&h.ctx, &a);

        let (handle, input_rx) = register(&h.ctx, [a.clone(), b.clone()]);
        let task = tokio::spawn(GameMatch::new(handle.clone(), input_rx, h.ctx.clone()).run());

        assert!(matches!(a_rx.recv().await, Some(ServerMsg::StartGame { .. })));
        assert_eq!(a_rx.recv().await, Some(ServerMsg::DecountGame { count: 3 }));

        assert!(h.ctx.lobby.remove_match(handle.id).is_some());
        sleep(Duration::from_secs(5)).await;

        assert!(task.is_finished());
        assert!(a_rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn tournament_match_reports_its_winner() {
        let mut h = harness();
        let left = participant("left");
        let right = participant("right");
        let (input_tx, input_rx) = mpsc::channel(INPUT_CAPACITY);
        let id = h.ctx.lobby.transact(|s| {
            s.insert_match(
                [left.clone(), right.clone()],
                None,
                Some(TournamentRef::Remote(9)),
                input_tx,
            )
        });
        let handle = h.ctx.lobby.match_handle(id).unwrap();

        let mut game = GameMatch::new(handle, input_rx, h.ctx.clone());
        game.state.init();
        game.state.score = [0, 2];
        game.state.ball = ball_leaving(Side::Left);
        game.play().await;

        let report = h.reports.recv().await.unwrap();
        assert_eq!(report.match_id, id);
        assert_eq!(report.tournament, TournamentRef::Remote(9));
        assert_eq!(report.winner, Some(right.identity));
        assert_eq!(report.status, MatchStatus::Finished);
    }
}
