use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const DEFAULT_RATING: i32 = 1200;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Player {
    pub id: Uuid,
    pub name: String,
    /// Account that receives notifications for this player, if linked.
    pub user_id: Option<Uuid>,
    pub wins: i32,
    pub losses: i32,
    pub rating: i32,
    pub current_win_streak: i32,
    pub best_win_streak: i32,
}

impl Player {
    pub fn new(name: impl Into<String>, user_id: Option<Uuid>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            user_id,
            wins: 0,
            losses: 0,
            rating: DEFAULT_RATING,
            current_win_streak: 0,
            best_win_streak: 0,
        }
    }

    pub fn matches_played(&self) -> i32 {
        self.wins + self.losses
    }
}

/// One row of a tournament's standings table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Standing {
    pub rank: usize,
    pub player_id: Uuid,
    pub player_name: Option<String>,
    pub wins: i32,
    pub losses: i32,
    pub points: i32,
    pub point_difference: i64,
}

/// Player stats before and after a completed match.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StandingsDelta {
    pub winner_before: Player,
    pub winner_after: Player,
    pub loser_before: Player,
    pub loser_after: Player,
}
