use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What a catalog entry counts towards its target.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AchievementCondition {
    /// Career match wins.
    TotalWins,
    /// Best run of consecutive wins.
    WinStreak,
    /// Wins without conceding a set.
    CleanSweep,
    /// Completed matches, won or lost.
    MatchesPlayed,
    /// Tournaments won.
    TournamentTitle,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AchievementDefinition {
    pub id: String,
    pub name: String,
    pub description: String,
    pub condition: AchievementCondition,
    pub target: i32,
}

/// Ledger row tracking a player's progress towards one achievement.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AchievementProgress {
    pub player_id: Uuid,
    pub achievement_id: String,
    pub progress: i32,
    pub unlocked: bool,
    pub unlocked_at: Option<DateTime<Utc>>,
}

impl AchievementProgress {
    pub fn empty(player_id: Uuid, achievement_id: impl Into<String>) -> Self {
        Self {
            player_id,
            achievement_id: achievement_id.into(),
            progress: 0,
            unlocked: false,
            unlocked_at: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AchievementDelta {
    pub player_id: Uuid,
    pub achievement_id: String,
    pub previous_progress: i32,
    pub new_progress: i32,
    pub target: i32,
    pub unlocked_now: bool,
    /// Row to write back to the ledger.
    pub record: AchievementProgress,
}
