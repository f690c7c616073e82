use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::{CompletionStore, CompletionTransaction, MatchStore, NotificationStore, StoreError};
use crate::models::{
    AchievementProgress, Match, Notification, Player, Tournament, TournamentStatus,
};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    tournaments: HashMap<Uuid, Tournament>,
    /// Insertion order doubles as the tie-break for equal match numbers.
    matches: Vec<Match>,
    rosters: HashMap<Uuid, Vec<Uuid>>,
    players: HashMap<Uuid, Player>,
    notifications: Vec<Notification>,
    progress: HashMap<(Uuid, String), AchievementProgress>,
    applied: HashMap<Uuid, DateTime<Utc>>,
}

impl MemoryState {
    fn tournament(&self, id: Uuid) -> Result<Tournament, StoreError> {
        self.tournaments
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("tournament {}", id)))
    }

    fn matches_for(&self, tournament_id: Uuid) -> Vec<Match> {
        let mut matches: Vec<Match> = self
            .matches
            .iter()
            .filter(|m| m.tournament_id == tournament_id)
            .cloned()
            .collect();
        matches.sort_by_key(|m| m.match_number);
        matches
    }

    fn roster_for(&self, tournament_id: Uuid) -> Vec<Player> {
        self.rosters
            .get(&tournament_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| self.players.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn player(&self, id: Uuid) -> Result<Player, StoreError> {
        self.players
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("player {}", id)))
    }

    fn owned_notification_mut(
        &mut self,
        notification_id: Uuid,
        user_id: Uuid,
    ) -> Result<&mut Notification, StoreError> {
        let notification = self
            .notifications
            .iter_mut()
            .find(|n| n.id == notification_id)
            .ok_or_else(|| StoreError::NotFound(format!("notification {}", notification_id)))?;
        if notification.user_id != user_id {
            return Err(StoreError::Forbidden(format!("notification {}", notification_id)));
        }
        Ok(notification)
    }
}

/// Store kept entirely in process memory. Every operation takes the same
/// lock, so mutations on one notification or one player are serialized.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_tournament(&self, tournament: Tournament) {
        let mut state = self.state.lock().await;
        state.tournaments.insert(tournament.id, tournament);
    }

    /// Adds the player to the global player table and to the roster.
    pub async fn register_player(&self, tournament_id: Uuid, player: Player) {
        let mut state = self.state.lock().await;
        let roster = state.rosters.entry(tournament_id).or_default();
        if !roster.contains(&player.id) {
            roster.push(player.id);
        }
        state.players.insert(player.id, player);
    }

    pub async fn insert_match(&self, record: Match) {
        let mut state = self.state.lock().await;
        match state.matches.iter_mut().find(|m| m.id == record.id) {
            Some(existing) => *existing = record,
            None => state.matches.push(record),
        }
    }

    pub async fn achievement_progress(&self, player_id: Uuid) -> Vec<AchievementProgress> {
        let state = self.state.lock().await;
        let mut rows: Vec<AchievementProgress> = state
            .progress
            .values()
            .filter(|p| p.player_id == player_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.achievement_id.cmp(&b.achievement_id));
        rows
    }
}

impl MatchStore for MemoryStore {
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn get_tournament(&self, tournament_id: Uuid) -> Result<Tournament, StoreError> {
        self.state.lock().await.tournament(tournament_id)
    }

    async fn list_matches(&self, tournament_id: Uuid) -> Result<Vec<Match>, StoreError> {
        Ok(self.state.lock().await.matches_for(tournament_id))
    }

    async fn list_roster(&self, tournament_id: Uuid) -> Result<Vec<Player>, StoreError> {
        Ok(self.state.lock().await.roster_for(tournament_id))
    }

    async fn get_match(&self, match_id: Uuid) -> Result<Match, StoreError> {
        self.state
            .lock()
            .await
            .matches
            .iter()
            .find(|m| m.id == match_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("match {}", match_id)))
    }

    async fn get_player(&self, player_id: Uuid) -> Result<Player, StoreError> {
        self.state.lock().await.player(player_id)
    }
}

impl NotificationStore for MemoryStore {
    async fn insert_notification(&self, notification: Notification) -> Result<Notification, StoreError> {
        let mut state = self.state.lock().await;
        state.notifications.push(notification.clone());
        Ok(notification)
    }

    async fn list_notifications(
        &self,
        user_id: Uuid,
        unread_only: bool,
        offset: usize,
        limit: usize,
    ) -> Result<(Vec<Notification>, i64), StoreError> {
        let state = self.state.lock().await;
        let mut matching: Vec<&Notification> = state
            .notifications
            .iter()
            .filter(|n| n.user_id == user_id && (!unread_only || !n.is_read))
            .collect();
        // Newest first; insertion order breaks timestamp ties.
        matching.reverse();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = matching.len() as i64;
        let page = matching
            .into_iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect();
        Ok((page, total))
    }

    async fn count_unread(&self, user_id: Uuid) -> Result<i64, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .notifications
            .iter()
            .filter(|n| n.user_id == user_id && !n.is_read)
            .count() as i64)
    }

    async fn mark_read(
        &self,
        notification_id: Uuid,
        user_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Notification, StoreError> {
        let mut state = self.state.lock().await;
        let notification = state.owned_notification_mut(notification_id, user_id)?;
        notification.mark_read(at);
        Ok(notification.clone())
    }

    async fn mark_all_read(&self, user_id: Uuid, at: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut state = self.state.lock().await;
        let mut marked = 0;
        for notification in state
            .notifications
            .iter_mut()
            .filter(|n| n.user_id == user_id && !n.is_read)
        {
            notification.mark_read(at);
            marked += 1;
        }
        Ok(marked)
    }

    async fn delete_notification(&self, notification_id: Uuid, user_id: Uuid) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state.owned_notification_mut(notification_id, user_id)?;
        state.notifications.retain(|n| n.id != notification_id);
        Ok(())
    }
}

/// Holds the store lock for its whole lifetime and writes into a staged
/// copy that replaces the live state on commit.
pub struct MemoryTransaction {
    guard: OwnedMutexGuard<MemoryState>,
    staged: MemoryState,
}

impl CompletionStore for MemoryStore {
    type Tx = MemoryTransaction;

    async fn begin(&self) -> Result<Self::Tx, StoreError> {
        let guard = self.state.clone().lock_owned().await;
        let staged = guard.clone();
        Ok(MemoryTransaction { guard, staged })
    }
}

impl CompletionTransaction for MemoryTransaction {
    async fn is_applied(&mut self, match_id: Uuid) -> Result<bool, StoreError> {
        Ok(self.staged.applied.contains_key(&match_id))
    }

    async fn load_tournament(&mut self, tournament_id: Uuid) -> Result<Tournament, StoreError> {
        self.staged.tournament(tournament_id)
    }

    async fn load_matches(&mut self, tournament_id: Uuid) -> Result<Vec<Match>, StoreError> {
        Ok(self.staged.matches_for(tournament_id))
    }

    async fn load_roster(&mut self, tournament_id: Uuid) -> Result<Vec<Player>, StoreError> {
        Ok(self.staged.roster_for(tournament_id))
    }

    async fn load_player_for_update(&mut self, player_id: Uuid) -> Result<Player, StoreError> {
        self.staged.player(player_id)
    }

    async fn load_progress(&mut self, player_id: Uuid) -> Result<Vec<AchievementProgress>, StoreError> {
        Ok(self
            .staged
            .progress
            .values()
            .filter(|p| p.player_id == player_id)
            .cloned()
            .collect())
    }

    async fn save_match(&mut self, record: &Match) -> Result<(), StoreError> {
        let existing = self
            .staged
            .matches
            .iter_mut()
            .find(|m| m.id == record.id)
            .ok_or_else(|| StoreError::NotFound(format!("match {}", record.id)))?;
        existing.apply_completion(record);
        Ok(())
    }

    async fn save_player(&mut self, player: &Player) -> Result<(), StoreError> {
        self.staged.players.insert(player.id, player.clone());
        Ok(())
    }

    async fn save_progress(&mut self, progress: &AchievementProgress) -> Result<(), StoreError> {
        self.staged.progress.insert(
            (progress.player_id, progress.achievement_id.clone()),
            progress.clone(),
        );
        Ok(())
    }

    async fn insert_notification(&mut self, notification: &Notification) -> Result<(), StoreError> {
        self.staged.notifications.push(notification.clone());
        Ok(())
    }

    async fn set_tournament_status(
        &mut self,
        tournament_id: Uuid,
        status: TournamentStatus,
    ) -> Result<(), StoreError> {
        let tournament = self
            .staged
            .tournaments
            .get_mut(&tournament_id)
            .ok_or_else(|| StoreError::NotFound(format!("tournament {}", tournament_id)))?;
        tournament.status = status;
        Ok(())
    }

    async fn mark_applied(&mut self, match_id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError> {
        if self.staged.applied.insert(match_id, at).is_some() {
            return Err(StoreError::Conflict(format!(
                "completion of match {} already applied",
                match_id
            )));
        }
        Ok(())
    }

    async fn commit(self) -> Result<(), StoreError> {
        let MemoryTransaction { mut guard, staged } = self;
        *guard = staged;
        Ok(())
    }
}
