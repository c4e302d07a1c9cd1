//! Application state shared across routes

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::config::Config;
use crate::game::{MatchContext, MatchReport};
use crate::matchmaking::{Lobby, MatchService};
use crate::store::{MemoryStore, Persistence, Relations, RestStore};
use crate::tournament::TournamentService;
use crate::ws::connections::ConnectionTable;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub lobby: Arc<Lobby>,
    pub connections: ConnectionTable,
    pub matches: Arc<MatchService>,
    pub tournaments: Arc<TournamentService>,
}

impl AppState {
    /// REST collaborators when a persistence URL is configured, in-memory
    /// ones otherwise
    pub fn new(config: Config) -> Self {
        match config.persistence_url.clone() {
            Some(url) => {
                let rest = Arc::new(RestStore::new(&url, &config));
                Self::with_stores(config, rest.clone(), rest)
            }
            None => {
                tracing::warn!("PERSISTENCE_URL not set, records are kept in memory");
                let memory = Arc::new(MemoryStore::new());
                Self::with_stores(config, memory.clone(), memory)
            }
        }
    }

    pub fn with_stores(
        config: Config,
        store: Arc<dyn Persistence>,
        relations: Arc<dyn Relations>,
    ) -> Self {
        let config = Arc::new(config);
        let lobby = Arc::new(Lobby::new());
        let connections = ConnectionTable::new();

        let (reports_tx, reports_rx) = mpsc::unbounded_channel::<MatchReport>();
        let ctx = MatchContext {
            lobby: lobby.clone(),
            connections: connections.clone(),
            store,
            reports: reports_tx,
            pause_between_rounds: config.pause_between_rounds,
        };

        let matches = Arc::new(MatchService::new(ctx, relations));
        let tournaments = Arc::new(TournamentService::new(
            matches.clone(),
            reports_rx,
            config.shuffle_seed,
        ));

        Self {
            config,
            lobby,
            connections,
            matches,
            tournaments,
        }
    }
}
