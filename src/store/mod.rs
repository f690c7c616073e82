//! Seams to the external relational store.
//!
//! Services only talk to these traits. `MemoryStore` backs development runs
//! and tests; `PgStore` is the PostgreSQL adapter.
#![allow(async_fn_in_trait)]

pub mod memory;
pub mod postgres;

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    AchievementProgress, Match, Notification, Player, Tournament, TournamentStatus,
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("{0} belongs to another user")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    /// The store refused the values themselves, e.g. a constraint or
    /// length violation. Resending the same data fails the same way.
    #[error("Rejected by the store: {0}")]
    Rejected(String),

    #[error("Database error: {0}")]
    Database(#[source] sqlx::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SqlStateClass {
    Rejected,
    Transient,
    Other,
}

/// Buckets a PostgreSQL SQLSTATE by its two-character class.
fn sqlstate_class(code: &str) -> SqlStateClass {
    match code.get(..2) {
        // data exception, integrity constraint violation
        Some("22" | "23") => SqlStateClass::Rejected,
        // connection, transaction rollback, resources, operator intervention
        Some("08" | "40" | "53" | "57") => SqlStateClass::Transient,
        _ => SqlStateClass::Other,
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        let class = match &err {
            sqlx::Error::Database(db) => db
                .code()
                .map_or(SqlStateClass::Other, |code| sqlstate_class(&code)),
            sqlx::Error::Io(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => SqlStateClass::Transient,
            _ => SqlStateClass::Other,
        };

        match class {
            SqlStateClass::Rejected => match &err {
                sqlx::Error::Database(db) => StoreError::Rejected(db.message().to_string()),
                _ => StoreError::Database(err),
            },
            SqlStateClass::Transient => StoreError::Unavailable(err.to_string()),
            SqlStateClass::Other => StoreError::Database(err),
        }
    }
}

/// Read access to tournaments, their matches and rosters.
pub trait MatchStore {
    /// Liveness check for the health endpoint.
    async fn ping(&self) -> Result<(), StoreError>;

    async fn get_tournament(&self, tournament_id: Uuid) -> Result<Tournament, StoreError>;

    /// Matches in encounter order (match number, then insertion).
    async fn list_matches(&self, tournament_id: Uuid) -> Result<Vec<Match>, StoreError>;

    async fn list_roster(&self, tournament_id: Uuid) -> Result<Vec<Player>, StoreError>;

    async fn get_match(&self, match_id: Uuid) -> Result<Match, StoreError>;

    async fn get_player(&self, player_id: Uuid) -> Result<Player, StoreError>;
}

/// Per-user notification records. Unread counts are always derived from the
/// records themselves.
pub trait NotificationStore {
    async fn insert_notification(&self, notification: Notification) -> Result<Notification, StoreError>;

    /// Newest first, with the total number of rows matching the filter.
    async fn list_notifications(
        &self,
        user_id: Uuid,
        unread_only: bool,
        offset: usize,
        limit: usize,
    ) -> Result<(Vec<Notification>, i64), StoreError>;

    async fn count_unread(&self, user_id: Uuid) -> Result<i64, StoreError>;

    /// Fails with `NotFound` for unknown ids and `Forbidden` when the
    /// notification is owned by someone else. Already-read rows are returned
    /// unchanged.
    async fn mark_read(
        &self,
        notification_id: Uuid,
        user_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Notification, StoreError>;

    /// Returns how many notifications flipped to read.
    async fn mark_all_read(&self, user_id: Uuid, at: DateTime<Utc>) -> Result<u64, StoreError>;

    async fn delete_notification(&self, notification_id: Uuid, user_id: Uuid) -> Result<(), StoreError>;
}

/// Transactional writer for the match-completion unit of work.
pub trait CompletionStore {
    type Tx: CompletionTransaction;

    async fn begin(&self) -> Result<Self::Tx, StoreError>;
}

/// Everything inside one completion. Dropping the transaction without
/// calling `commit` discards every write made through it.
pub trait CompletionTransaction {
    async fn is_applied(&mut self, match_id: Uuid) -> Result<bool, StoreError>;

    async fn load_tournament(&mut self, tournament_id: Uuid) -> Result<Tournament, StoreError>;

    async fn load_matches(&mut self, tournament_id: Uuid) -> Result<Vec<Match>, StoreError>;

    async fn load_roster(&mut self, tournament_id: Uuid) -> Result<Vec<Player>, StoreError>;

    /// Loads a player and holds it against concurrent completions until the
    /// transaction ends.
    async fn load_player_for_update(&mut self, player_id: Uuid) -> Result<Player, StoreError>;

    async fn load_progress(&mut self, player_id: Uuid) -> Result<Vec<AchievementProgress>, StoreError>;

    async fn save_match(&mut self, record: &Match) -> Result<(), StoreError>;

    async fn save_player(&mut self, player: &Player) -> Result<(), StoreError>;

    async fn save_progress(&mut self, progress: &AchievementProgress) -> Result<(), StoreError>;

    async fn insert_notification(&mut self, notification: &Notification) -> Result<(), StoreError>;

    async fn set_tournament_status(
        &mut self,
        tournament_id: Uuid,
        status: TournamentStatus,
    ) -> Result<(), StoreError>;

    async fn mark_applied(&mut self, match_id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError>;

    async fn commit(self) -> Result<(), StoreError>;
}

/// Everything the HTTP layer needs from a backing store.
pub trait Store:
    MatchStore + NotificationStore + CompletionStore + Clone + Send + Sync + 'static
{
}

impl<T> Store for T where
    T: MatchStore + NotificationStore + CompletionStore + Clone + Send + Sync + 'static
{
}
