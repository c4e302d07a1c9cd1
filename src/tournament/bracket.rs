//! Shared four-player single-elimination bracket

use rand::Rng;
use uuid::Uuid;

use crate::game::Participant;
use crate::store::RecordId;
use crate::util::shuffle::fisher_yates;
use crate::ws::protocol::PlayerSummary;

/// Every tournament seats exactly this many players
pub const TOURNAMENT_SIZE: usize = 4;

/// Which tournament list an id belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TournamentRef {
    Remote(u64),
    Local(u64),
}

impl TournamentRef {
    pub fn id(self) -> u64 {
        match self {
            TournamentRef::Remote(id) | TournamentRef::Local(id) => id,
        }
    }
}

/// Tournament lifecycle. Local tournaments start at `InProgress`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TournamentPhase {
    Open,
    ReadyCheck,
    InProgress,
    StageTwoPending,
    StageTwo,
    Finished,
    Dismantled,
}

impl TournamentPhase {
    /// Join, leave and ready toggles are only accepted before the start
    pub fn accepts_roster_changes(self) -> bool {
        matches!(self, TournamentPhase::Open | TournamentPhase::ReadyCheck)
    }

    /// Started and not yet finished: members belong to the bracket
    pub fn in_play(self) -> bool {
        matches!(
            self,
            TournamentPhase::InProgress | TournamentPhase::StageTwoPending | TournamentPhase::StageTwo
        )
    }
}

/// A seated player
#[derive(Debug, Clone, PartialEq)]
pub struct Entrant {
    pub identity: Uuid,
    pub tab_id: Uuid,
    pub alias: Option<String>,
    pub ready: bool,
    /// Unregistered local guest with a synthesized id
    pub temporary: bool,
}

impl Entrant {
    pub fn participant(&self) -> Participant {
        Participant {
            identity: self.identity,
            tab_id: self.tab_id,
            alias: self.alias.clone(),
            temporary: self.temporary,
        }
    }

    pub fn summary(&self) -> PlayerSummary {
        PlayerSummary {
            identity: self.identity,
            alias: self.alias.clone(),
            ready: self.ready,
        }
    }
}

/// One bracket slot
#[derive(Debug, Clone)]
pub struct StageMatch {
    /// `None` while queued behind another match on the same device
    pub match_id: Option<u64>,
    pub players: [Entrant; 2],
    /// Persistence record, known once the match reports back
    pub record: Option<RecordId>,
    pub finished: bool,
    /// In-memory winner as reported by the match task
    pub winner: Option<Uuid>,
}

impl StageMatch {
    pub fn new(players: [Entrant; 2]) -> Self {
        Self {
            match_id: None,
            players,
            record: None,
            finished: false,
            winner: None,
        }
    }

    pub fn entrant(&self, identity: Uuid) -> Option<&Entrant> {
        self.players.iter().find(|e| e.identity == identity)
    }
}

/// Stage a finished match belonged to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    One,
    Two,
}

#[derive(Debug, Clone, Default)]
pub struct Bracket {
    pub stage_one: Vec<StageMatch>,
    pub stage_two: Option<StageMatch>,
    /// Set while a stage-two launch is in flight
    pub advancing: bool,
}

impl Bracket {
    /// Uniform shuffle, then consecutive pairs
    pub fn seed<R: Rng + ?Sized>(mut entrants: Vec<Entrant>, rng: &mut R) -> Self {
        fisher_yates(&mut entrants, rng);

        let mut stage_one = Vec::with_capacity(TOURNAMENT_SIZE / 2);
        let mut seats = entrants.into_iter();
        while let (Some(a), Some(b)) = (seats.next(), seats.next()) {
            stage_one.push(StageMatch::new([a, b]));
        }

        Self {
            stage_one,
            stage_two: None,
            advancing: false,
        }
    }

    /// Mark a match finished. Returns the stage it belonged to.
    pub fn record_result(
        &mut self,
        match_id: u64,
        winner: Option<Uuid>,
        record: Option<RecordId>,
    ) -> Option<Stage> {
        let stage = if self.stage_one.iter().any(|m| m.match_id == Some(match_id)) {
            Stage::One
        } else {
            Stage::Two
        };
        let slot = self.slot_mut(match_id)?;
        slot.finished = true;
        slot.winner = winner;
        slot.record = record;
        Some(stage)
    }

    pub fn stage_one_done(&self) -> bool {
        !self.stage_one.is_empty() && self.stage_one.iter().all(|m| m.finished)
    }

    /// Next stage-one slot that has not been launched yet
    pub fn next_queued(&self) -> Option<usize> {
        self.stage_one.iter().position(|m| m.match_id.is_none())
    }

    /// Slot whose match is `match_id`, in either stage
    pub fn slot_mut(&mut self, match_id: u64) -> Option<&mut StageMatch> {
        self.stage_one
            .iter_mut()
            .chain(self.stage_two.iter_mut())
            .find(|m| m.match_id == Some(match_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use std::collections::HashSet;

    fn entrants() -> Vec<Entrant> {
        (1..=4)
            .map(|n| Entrant {
                identity: Uuid::new_v4(),
                tab_id: Uuid::new_v4(),
                alias: Some(format!("P{n}")),
                ready: true,
                temporary: false,
            })
            .collect()
    }

    #[test]
    fn seeding_partitions_the_roster() {
        let roster = entrants();
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let bracket = Bracket::seed(roster.clone(), &mut rng);

        assert_eq!(bracket.stage_one.len(), 2);
        let seated: HashSet<Uuid> = bracket
            .stage_one
            .iter()
            .flat_map(|m| m.players.iter().map(|e| e.identity))
            .collect();
        let expected: HashSet<Uuid> = roster.iter().map(|e| e.identity).collect();
        assert_eq!(seated, expected);
    }

    #[test]
    fn results_are_tracked_per_stage() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut bracket = Bracket::seed(entrants(), &mut rng);
        bracket.stage_one[0].match_id = Some(10);
        bracket.stage_one[1].match_id = Some(11);

        let first = bracket.stage_one[0].players[0].identity;
        assert_eq!(bracket.record_result(10, Some(first), Some(3)), Some(Stage::One));
        assert!(!bracket.stage_one_done());
        assert_eq!(bracket.record_result(11, None, None), Some(Stage::One));
        assert!(bracket.stage_one_done());
        assert_eq!(bracket.stage_one[0].record, Some(3));
        assert_eq!(bracket.record_result(99, None, None), None);

        let final_pair = [bracket.stage_one[0].players[0].clone(), bracket.stage_one[1].players[0].clone()];
        let mut final_slot = StageMatch::new(final_pair);
        final_slot.match_id = Some(12);
        bracket.stage_two = Some(final_slot);
        assert_eq!(bracket.record_result(12, Some(first), None), Some(Stage::Two));
    }
}
