//! PostgREST-style client for the persistence and relation collaborators

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use uuid::Uuid;

use crate::config::Config;

use super::{
    MatchOutcome, MatchStatus, Persistence, RecordId, Relations, StoreError, TournamentStatus,
};

/// REST client authenticated with the collaborator's service key
#[derive(Clone)]
pub struct RestStore {
    client: Client,
    base_url: String,
    service_key: String,
}

impl RestStore {
    pub fn new(base_url: &str, config: &Config) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            service_key: config.persistence_service_key.clone(),
        }
    }

    /// Get the REST API URL for a table
    fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn authed(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("apikey", &self.service_key)
            .header("Authorization", format!("Bearer {}", self.service_key))
            .header("Content-Type", "application/json")
    }

    async fn check(response: Response) -> Result<Response, StoreError> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Api { status: status.as_u16(), body });
        }
        Ok(response)
    }

    /// GET rows matching a query
    async fn get<T: DeserializeOwned>(&self, table: &str, query: &str) -> Result<Vec<T>, StoreError> {
        let url = format!("{}?{}", self.rest_url(table), query);
        let response = self
            .authed(self.client.get(&url))
            .send()
            .await
            .map_err(StoreError::Request)?;

        Self::check(response).await?.json().await.map_err(StoreError::Parse)
    }

    /// POST a row and return its representation
    async fn insert<T: Serialize, R: DeserializeOwned>(&self, table: &str, data: &T) -> Result<R, StoreError> {
        let response = self
            .authed(self.client.post(self.rest_url(table)))
            .header("Prefer", "return=representation")
            .json(data)
            .send()
            .await
            .map_err(StoreError::Request)?;

        // PostgREST returns an array, take the first element
        let rows: Vec<R> = Self::check(response).await?.json().await.map_err(StoreError::Parse)?;
        rows.into_iter().next().ok_or(StoreError::NoRowReturned)
    }

    /// PATCH rows matching a query
    async fn update<T: Serialize>(&self, table: &str, query: &str, data: &T) -> Result<(), StoreError> {
        let url = format!("{}?{}", self.rest_url(table), query);
        let response = self
            .authed(self.client.patch(&url))
            .json(data)
            .send()
            .await
            .map_err(StoreError::Request)?;

        Self::check(response).await.map(|_| ())
    }
}

#[derive(Deserialize)]
struct IdRow {
    id: RecordId,
}

#[derive(Serialize)]
struct NewMatch {
    status: &'static str,
    tournament_id: Option<RecordId>,
    created_at: chrono::DateTime<Utc>,
}

#[derive(Serialize)]
struct MatchPlayers {
    player_left: Option<Uuid>,
    player_right: Option<Uuid>,
}

#[derive(Serialize)]
struct MatchResult {
    status: MatchStatus,
    winner: Option<Uuid>,
    score_left: u8,
    score_right: u8,
    duration_secs: u64,
    cancelled_by: Option<Uuid>,
    finished_at: chrono::DateTime<Utc>,
}

#[derive(Deserialize)]
struct WinnerRow {
    winner: Option<Uuid>,
}

#[derive(Serialize)]
struct NewTournament<'a> {
    name: &'a str,
    master: Uuid,
    status: &'static str,
}

#[derive(Serialize)]
struct NewParticipant<'a> {
    tournament_id: RecordId,
    player_id: Uuid,
    alias: Option<&'a str>,
}

#[derive(Serialize)]
struct TournamentClose {
    status: TournamentStatus,
    winner: Option<Uuid>,
    closed_at: chrono::DateTime<Utc>,
}

#[derive(Deserialize)]
struct FriendshipRow {
    user_a: Uuid,
    user_b: Uuid,
}

#[async_trait]
impl Persistence for RestStore {
    async fn create_match(&self, tournament: Option<RecordId>) -> Result<RecordId, StoreError> {
        let row: IdRow = self
            .insert(
                "matches",
                &NewMatch {
                    status: "pending",
                    tournament_id: tournament,
                    created_at: Utc::now(),
                },
            )
            .await?;
        Ok(row.id)
    }

    async fn attach_players(
        &self,
        record: RecordId,
        left: Option<Uuid>,
        right: Option<Uuid>,
    ) -> Result<(), StoreError> {
        self.update(
            "matches",
            &format!("id=eq.{}", record),
            &MatchPlayers {
                player_left: left,
                player_right: right,
            },
        )
        .await
    }

    async fn finish_match(&self, record: RecordId, outcome: &MatchOutcome) -> Result<(), StoreError> {
        self.update(
            "matches",
            &format!("id=eq.{}", record),
            &MatchResult {
                status: outcome.status,
                winner: outcome.winner,
                score_left: outcome.score[0],
                score_right: outcome.score[1],
                duration_secs: outcome.duration_secs,
                cancelled_by: outcome.cancelled_by,
                finished_at: Utc::now(),
            },
        )
        .await
    }

    async fn create_tournament(&self, name: &str, master: Uuid) -> Result<RecordId, StoreError> {
        let row: IdRow = self
            .insert(
                "tournaments",
                &NewTournament {
                    name,
                    master,
                    status: "open",
                },
            )
            .await?;
        Ok(row.id)
    }

    async fn register_participant(
        &self,
        tournament: RecordId,
        identity: Uuid,
        alias: Option<&str>,
    ) -> Result<(), StoreError> {
        let _: serde_json::Value = self
            .insert(
                "tournament_players",
                &NewParticipant {
                    tournament_id: tournament,
                    player_id: identity,
                    alias,
                },
            )
            .await?;
        Ok(())
    }

    async fn close_tournament(
        &self,
        tournament: RecordId,
        status: TournamentStatus,
        winner: Option<Uuid>,
    ) -> Result<(), StoreError> {
        self.update(
            "tournaments",
            &format!("id=eq.{}", tournament),
            &TournamentClose {
                status,
                winner,
                closed_at: Utc::now(),
            },
        )
        .await
    }

    async fn match_winner(&self, record: RecordId) -> Result<Option<Uuid>, StoreError> {
        let rows: Vec<WinnerRow> = self
            .get(
                "matches",
                &format!("id=eq.{}&status=eq.finished&select=winner", record),
            )
            .await?;
        Ok(rows.into_iter().next().and_then(|row| row.winner))
    }
}

#[async_trait]
impl Relations for RestStore {
    async fn blocked_with(&self, identity: Uuid) -> Result<HashSet<Uuid>, StoreError> {
        let query = format!(
            "or=(user_a.eq.{id},user_b.eq.{id})&status=eq.blocked&select=user_a,user_b",
            id = identity
        );
        let rows: Vec<FriendshipRow> = self.get("friendships", &query).await?;

        Ok(rows
            .into_iter()
            .map(|row| if row.user_a == identity { row.user_b } else { row.user_a })
            .collect())
    }
}
