use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{Postgres, Row, Transaction};
use uuid::Uuid;

use super::{CompletionStore, CompletionTransaction, MatchStore, NotificationStore, StoreError};
use crate::db::DbPool;
use crate::models::{
    AchievementProgress, Match, Notification, Player, Tournament, TournamentStatus,
};

const MATCH_COLUMNS: &str = "id, tournament_id, match_number, player1_id, player2_id, round, \
     status, detailed_score, winner_id, completed_at";
const PLAYER_COLUMNS: &str =
    "id, name, user_id, wins, losses, rating, current_win_streak, best_win_streak";
const NOTIFICATION_COLUMNS: &str =
    "id, user_id, type, title, message, is_read, read_at, link_url, metadata, created_at";

/// PostgreSQL adapter. Schema lives in `migrations/`.
#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Distinguishes an unknown id from one owned by another user after a
    /// scoped statement touched no rows.
    async fn ownership_error(&self, notification_id: Uuid) -> StoreError {
        let owner = sqlx::query("SELECT user_id FROM notifications WHERE id = $1")
            .bind(notification_id)
            .fetch_optional(&self.pool)
            .await;
        match owner {
            Ok(Some(_)) => StoreError::Forbidden(format!("notification {}", notification_id)),
            Ok(None) => StoreError::NotFound(format!("notification {}", notification_id)),
            Err(e) => e.into(),
        }
    }
}

fn decode_error(message: String) -> StoreError {
    StoreError::Database(sqlx::Error::Decode(message.into()))
}

fn tournament_from_row(row: &PgRow) -> Result<Tournament, StoreError> {
    let format: String = row.try_get("format")?;
    let status: String = row.try_get("status")?;
    Ok(Tournament {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        format: format.parse().map_err(decode_error)?,
        max_participants: row.try_get("max_participants")?,
        status: status.parse().map_err(decode_error)?,
        created_at: row.try_get("created_at")?,
    })
}

fn match_from_row(row: &PgRow) -> Result<Match, StoreError> {
    let status: String = row.try_get("status")?;
    Ok(Match {
        id: row.try_get("id")?,
        tournament_id: row.try_get("tournament_id")?,
        match_number: row.try_get("match_number")?,
        player1_id: row.try_get("player1_id")?,
        player2_id: row.try_get("player2_id")?,
        round: row.try_get("round")?,
        status: status.parse().map_err(decode_error)?,
        detailed_score: row.try_get("detailed_score")?,
        winner_id: row.try_get("winner_id")?,
        completed_at: row.try_get("completed_at")?,
    })
}

fn player_from_row(row: &PgRow) -> Result<Player, StoreError> {
    Ok(Player {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        user_id: row.try_get("user_id")?,
        wins: row.try_get("wins")?,
        losses: row.try_get("losses")?,
        rating: row.try_get("rating")?,
        current_win_streak: row.try_get("current_win_streak")?,
        best_win_streak: row.try_get("best_win_streak")?,
    })
}

fn notification_from_row(row: &PgRow) -> Result<Notification, StoreError> {
    let notification_type: String = row.try_get("type")?;
    Ok(Notification {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        notification_type: notification_type.parse().map_err(decode_error)?,
        title: row.try_get("title")?,
        message: row.try_get("message")?,
        is_read: row.try_get("is_read")?,
        read_at: row.try_get("read_at")?,
        link_url: row.try_get("link_url")?,
        metadata: row.try_get("metadata")?,
        created_at: row.try_get("created_at")?,
    })
}

fn progress_from_row(row: &PgRow) -> Result<AchievementProgress, StoreError> {
    Ok(AchievementProgress {
        player_id: row.try_get("player_id")?,
        achievement_id: row.try_get("achievement_id")?,
        progress: row.try_get("progress")?,
        unlocked: row.try_get("unlocked")?,
        unlocked_at: row.try_get("unlocked_at")?,
    })
}

impl MatchStore for PgStore {
    async fn ping(&self) -> Result<(), StoreError> {
        crate::db::health_check(&self.pool).await?;
        Ok(())
    }

    async fn get_tournament(&self, tournament_id: Uuid) -> Result<Tournament, StoreError> {
        let row = sqlx::query(
            "SELECT id, name, format, max_participants, status, created_at \
             FROM tournaments WHERE id = $1",
        )
        .bind(tournament_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("tournament {}", tournament_id)))?;
        tournament_from_row(&row)
    }

    async fn list_matches(&self, tournament_id: Uuid) -> Result<Vec<Match>, StoreError> {
        let sql = format!(
            "SELECT {} FROM matches WHERE tournament_id = $1 ORDER BY match_number, created_at",
            MATCH_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(tournament_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(match_from_row).collect()
    }

    async fn list_roster(&self, tournament_id: Uuid) -> Result<Vec<Player>, StoreError> {
        let sql = format!(
            "SELECT {} FROM players p \
             JOIN tournament_participants tp ON tp.player_id = p.id \
             WHERE tp.tournament_id = $1 ORDER BY tp.registered_at, p.id",
            prefixed(PLAYER_COLUMNS, "p")
        );
        let rows = sqlx::query(&sql)
            .bind(tournament_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(player_from_row).collect()
    }

    async fn get_match(&self, match_id: Uuid) -> Result<Match, StoreError> {
        let sql = format!("SELECT {} FROM matches WHERE id = $1", MATCH_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(match_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("match {}", match_id)))?;
        match_from_row(&row)
    }

    async fn get_player(&self, player_id: Uuid) -> Result<Player, StoreError> {
        let sql = format!("SELECT {} FROM players WHERE id = $1", PLAYER_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(player_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("player {}", player_id)))?;
        player_from_row(&row)
    }
}

fn prefixed(columns: &str, alias: &str) -> String {
    columns
        .split(',')
        .map(|c| format!("{}.{}", alias, c.trim()))
        .collect::<Vec<_>>()
        .join(", ")
}

async fn insert_notification_row<'e, E>(executor: E, n: &Notification) -> Result<(), StoreError>
where
    E: sqlx::Executor<'e, Database = Postgres>,
{
    sqlx::query(
        r#"
        INSERT INTO notifications (
            id, user_id, type, title, message, is_read, read_at, link_url, metadata, created_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#,
    )
    .bind(n.id)
    .bind(n.user_id)
    .bind(n.notification_type.to_string())
    .bind(&n.title)
    .bind(&n.message)
    .bind(n.is_read)
    .bind(n.read_at)
    .bind(&n.link_url)
    .bind(&n.metadata)
    .bind(n.created_at)
    .execute(executor)
    .await?;
    Ok(())
}

impl NotificationStore for PgStore {
    async fn insert_notification(&self, notification: Notification) -> Result<Notification, StoreError> {
        insert_notification_row(&self.pool, &notification).await?;
        Ok(notification)
    }

    async fn list_notifications(
        &self,
        user_id: Uuid,
        unread_only: bool,
        offset: usize,
        limit: usize,
    ) -> Result<(Vec<Notification>, i64), StoreError> {
        let sql = format!(
            "SELECT {} FROM notifications \
             WHERE user_id = $1 AND ($2 = FALSE OR is_read = FALSE) \
             ORDER BY created_at DESC, id DESC LIMIT $3 OFFSET $4",
            NOTIFICATION_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(user_id)
            .bind(unread_only)
            .bind(limit as i64)
            .bind(offset as i64)
            .fetch_all(&self.pool)
            .await?;
        let notifications = rows
            .iter()
            .map(notification_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM notifications WHERE user_id = $1 AND ($2 = FALSE OR is_read = FALSE)",
        )
        .bind(user_id)
        .bind(unread_only)
        .fetch_one(&self.pool)
        .await?;

        Ok((notifications, total))
    }

    async fn count_unread(&self, user_id: Uuid) -> Result<i64, StoreError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM notifications WHERE user_id = $1 AND is_read = FALSE",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn mark_read(
        &self,
        notification_id: Uuid,
        user_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Notification, StoreError> {
        let sql = format!(
            "UPDATE notifications SET is_read = TRUE, read_at = COALESCE(read_at, $3) \
             WHERE id = $1 AND user_id = $2 RETURNING {}",
            NOTIFICATION_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(notification_id)
            .bind(user_id)
            .bind(at)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => notification_from_row(&row),
            None => Err(self.ownership_error(notification_id).await),
        }
    }

    async fn mark_all_read(&self, user_id: Uuid, at: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "UPDATE notifications SET is_read = TRUE, read_at = $2 \
             WHERE user_id = $1 AND is_read = FALSE",
        )
        .bind(user_id)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn delete_notification(&self, notification_id: Uuid, user_id: Uuid) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM notifications WHERE id = $1 AND user_id = $2")
            .bind(notification_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(self.ownership_error(notification_id).await);
        }
        Ok(())
    }
}

/// One database transaction per completion; rolled back on drop.
pub struct PgCompletionTransaction {
    tx: Transaction<'static, Postgres>,
}

impl CompletionStore for PgStore {
    type Tx = PgCompletionTransaction;

    async fn begin(&self) -> Result<Self::Tx, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(PgCompletionTransaction { tx })
    }
}

impl CompletionTransaction for PgCompletionTransaction {
    async fn is_applied(&mut self, match_id: Uuid) -> Result<bool, StoreError> {
        let applied: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM match_completions WHERE match_id = $1)",
        )
        .bind(match_id)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(applied)
    }

    async fn load_tournament(&mut self, tournament_id: Uuid) -> Result<Tournament, StoreError> {
        let row = sqlx::query(
            "SELECT id, name, format, max_participants, status, created_at \
             FROM tournaments WHERE id = $1 FOR UPDATE",
        )
        .bind(tournament_id)
        .fetch_optional(&mut *self.tx)
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("tournament {}", tournament_id)))?;
        tournament_from_row(&row)
    }

    async fn load_matches(&mut self, tournament_id: Uuid) -> Result<Vec<Match>, StoreError> {
        let sql = format!(
            "SELECT {} FROM matches WHERE tournament_id = $1 ORDER BY match_number, created_at",
            MATCH_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(tournament_id)
            .fetch_all(&mut *self.tx)
            .await?;
        rows.iter().map(match_from_row).collect()
    }

    async fn load_roster(&mut self, tournament_id: Uuid) -> Result<Vec<Player>, StoreError> {
        let sql = format!(
            "SELECT {} FROM players p \
             JOIN tournament_participants tp ON tp.player_id = p.id \
             WHERE tp.tournament_id = $1 ORDER BY tp.registered_at, p.id",
            prefixed(PLAYER_COLUMNS, "p")
        );
        let rows = sqlx::query(&sql)
            .bind(tournament_id)
            .fetch_all(&mut *self.tx)
            .await?;
        rows.iter().map(player_from_row).collect()
    }

    async fn load_player_for_update(&mut self, player_id: Uuid) -> Result<Player, StoreError> {
        let sql = format!("SELECT {} FROM players WHERE id = $1 FOR UPDATE", PLAYER_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(player_id)
            .fetch_optional(&mut *self.tx)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("player {}", player_id)))?;
        player_from_row(&row)
    }

    async fn load_progress(&mut self, player_id: Uuid) -> Result<Vec<AchievementProgress>, StoreError> {
        let rows = sqlx::query(
            "SELECT player_id, achievement_id, progress, unlocked, unlocked_at \
             FROM achievement_progress WHERE player_id = $1 FOR UPDATE",
        )
        .bind(player_id)
        .fetch_all(&mut *self.tx)
        .await?;
        rows.iter().map(progress_from_row).collect()
    }

    async fn save_match(&mut self, record: &Match) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE matches
            SET status = $2, winner_id = $3, detailed_score = $4, completed_at = $5,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(record.id)
        .bind(record.status.to_string())
        .bind(record.winner_id)
        .bind(&record.detailed_score)
        .bind(record.completed_at)
        .execute(&mut *self.tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("match {}", record.id)));
        }
        Ok(())
    }

    async fn save_player(&mut self, player: &Player) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE players
            SET wins = $2, losses = $3, rating = $4, current_win_streak = $5,
                best_win_streak = $6, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(player.id)
        .bind(player.wins)
        .bind(player.losses)
        .bind(player.rating)
        .bind(player.current_win_streak)
        .bind(player.best_win_streak)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn save_progress(&mut self, progress: &AchievementProgress) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO achievement_progress (player_id, achievement_id, progress, unlocked, unlocked_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (player_id, achievement_id) DO UPDATE
            SET progress = GREATEST(achievement_progress.progress, EXCLUDED.progress),
                unlocked = achievement_progress.unlocked OR EXCLUDED.unlocked,
                unlocked_at = COALESCE(achievement_progress.unlocked_at, EXCLUDED.unlocked_at)
            "#,
        )
        .bind(progress.player_id)
        .bind(&progress.achievement_id)
        .bind(progress.progress)
        .bind(progress.unlocked)
        .bind(progress.unlocked_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn insert_notification(&mut self, notification: &Notification) -> Result<(), StoreError> {
        insert_notification_row(&mut *self.tx, notification).await
    }

    async fn set_tournament_status(
        &mut self,
        tournament_id: Uuid,
        status: TournamentStatus,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE tournaments SET status = $2, updated_at = NOW() WHERE id = $1")
            .bind(tournament_id)
            .bind(status.to_string())
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn mark_applied(&mut self, match_id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError> {
        let result = sqlx::query(
            "INSERT INTO match_completions (match_id, applied_at) VALUES ($1, $2) \
             ON CONFLICT (match_id) DO NOTHING",
        )
        .bind(match_id)
        .bind(at)
        .execute(&mut *self.tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict(format!(
                "completion of match {} already applied",
                match_id
            )));
        }
        Ok(())
    }

    async fn commit(self) -> Result<(), StoreError> {
        Ok(self.tx.commit().await?)
    }
}
