//! Host-local tournament: one device, four known players, no join phase

use std::collections::HashSet;

use serde::Deserialize;
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};
use crate::store::RecordId;

use super::bracket::{Bracket, Entrant, TournamentPhase, TOURNAMENT_SIZE};

const MAX_ALIAS_LEN: usize = 32;

/// One roster line as submitted by the host
#[derive(Debug, Clone, Deserialize)]
pub struct RosterEntry {
    pub alias: String,
    /// Registered identity; guests leave this out
    #[serde(default)]
    pub identity: Option<Uuid>,
}

#[derive(Debug, Clone)]
pub struct LocalTournament {
    pub id: u64,
    pub master: Uuid,
    /// Tab that drives every match
    pub controller: (Uuid, Uuid),
    pub record: Option<RecordId>,
    pub phase: TournamentPhase,
    pub players: Vec<Entrant>,
    pub bracket: Bracket,
}

impl LocalTournament {
    pub fn new(id: u64, controller: (Uuid, Uuid), players: Vec<Entrant>, bracket: Bracket) -> Self {
        Self {
            id,
            master: controller.0,
            controller,
            record: None,
            phase: TournamentPhase::InProgress,
            players,
            bracket,
        }
    }

    /// Identities that count as tournament members
    pub fn members(&self) -> impl Iterator<Item = Uuid> + '_ {
        std::iter::once(self.master).chain(
            self.players
                .iter()
                .filter(|p| !p.temporary)
                .map(|p| p.identity),
        )
    }
}

/// Validate the submitted roster and give guests synthetic identities
pub fn build_roster(controller_tab: Uuid, entries: &[RosterEntry]) -> EngineResult<Vec<Entrant>> {
    if entries.len() != TOURNAMENT_SIZE {
        return Err(EngineError::Validation(format!(
            "a local tournament needs exactly {} players",
            TOURNAMENT_SIZE
        )));
    }

    let mut aliases = HashSet::new();
    let mut identities = HashSet::new();
    let mut roster = Vec::with_capacity(TOURNAMENT_SIZE);

    for entry in entries {
        let alias = entry.alias.trim();
        if alias.is_empty() || alias.len() > MAX_ALIAS_LEN {
            return Err(EngineError::Validation(format!(
                "alias must be 1 to {} characters",
                MAX_ALIAS_LEN
            )));
        }
        if !aliases.insert(alias.to_lowercase()) {
            return Err(EngineError::Validation(format!("duplicate alias {alias}")));
        }
        if let Some(identity) = entry.identity {
            if !identities.insert(identity) {
                return Err(EngineError::Validation("duplicate player identity".into()));
            }
        }

        roster.push(Entrant {
            identity: entry.identity.unwrap_or_else(Uuid::new_v4),
            tab_id: controller_tab,
            alias: Some(alias.to_string()),
            ready: true,
            temporary: entry.identity.is_none(),
        });
    }

    Ok(roster)
}
