use std::collections::HashSet;
use std::path::Path;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::models::{
    AchievementCondition, AchievementDefinition, AchievementDelta, AchievementProgress, Player,
};

/// Static mapping from achievement id to unlock condition and target.
#[derive(Debug, Clone)]
pub struct AchievementCatalog {
    definitions: Vec<AchievementDefinition>,
}

impl AchievementCatalog {
    pub fn new(definitions: Vec<AchievementDefinition>) -> Result<Self, anyhow::Error> {
        let mut seen = HashSet::new();
        for definition in &definitions {
            if !seen.insert(definition.id.as_str()) {
                anyhow::bail!("duplicate achievement id '{}'", definition.id);
            }
            if definition.target < 1 {
                anyhow::bail!(
                    "achievement '{}' needs a target of at least 1",
                    definition.id
                );
            }
        }
        Ok(Self { definitions })
    }

    /// Catalog shipped with the service.
    pub fn builtin() -> Self {
        let entry = |id: &str, name: &str, description: &str, condition, target| {
            AchievementDefinition {
                id: id.to_string(),
                name: name.to_string(),
                description: description.to_string(),
                condition,
                target,
            }
        };

        Self {
            definitions: vec![
                entry("first_win", "First Blood", "Win your first match", AchievementCondition::TotalWins, 1),
                entry("ten_wins", "Veteran", "Win 10 matches", AchievementCondition::TotalWins, 10),
                entry("hot_streak", "Hot Streak", "Win 3 matches in a row", AchievementCondition::WinStreak, 3),
                entry("flawless", "Flawless", "Win a match without dropping a set", AchievementCondition::CleanSweep, 1),
                entry("regular", "Regular", "Play 25 matches", AchievementCondition::MatchesPlayed, 25),
                entry("champion", "Champion", "Win a tournament", AchievementCondition::TournamentTitle, 1),
            ],
        }
    }

    /// Loads a JSON array of definitions.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, anyhow::Error> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let definitions: Vec<AchievementDefinition> = serde_json::from_str(&raw)?;
        let catalog = Self::new(definitions)?;
        info!(
            path = %path.as_ref().display(),
            achievements = catalog.definitions.len(),
            "Loaded achievement catalog"
        );
        Ok(catalog)
    }

    pub fn definitions(&self) -> &[AchievementDefinition] {
        &self.definitions
    }

    pub fn get(&self, id: &str) -> Option<&AchievementDefinition> {
        self.definitions.iter().find(|d| d.id == id)
    }
}

/// One participant's view of a completed match.
#[derive(Debug, Clone)]
pub struct ParticipantOutcome<'a> {
    /// Stats after the incremental standings update.
    pub player: &'a Player,
    pub won: bool,
    /// Won without conceding a set.
    pub clean_sweep: bool,
    /// This match decided a tournament in the player's favour.
    pub tournament_title: bool,
}

/// Progress deltas for one participant. Progress never decreases, is capped
/// at the target, and `unlocked_now` is set only on the evaluation that
/// first reaches the target.
pub fn evaluate_achievements(
    catalog: &AchievementCatalog,
    outcome: &ParticipantOutcome<'_>,
    current: &[AchievementProgress],
    now: DateTime<Utc>,
) -> Vec<AchievementDelta> {
    let player_id = outcome.player.id;
    let mut deltas = Vec::new();

    for definition in catalog.definitions() {
        let existing = current
            .iter()
            .find(|p| p.player_id == player_id && p.achievement_id == definition.id)
            .cloned()
            .unwrap_or_else(|| AchievementProgress::empty(player_id, definition.id.clone()));

        let candidate = match definition.condition {
            AchievementCondition::TotalWins => outcome.player.wins,
            AchievementCondition::MatchesPlayed => outcome.player.matches_played(),
            AchievementCondition::WinStreak => outcome.player.best_win_streak,
            AchievementCondition::CleanSweep if outcome.won && outcome.clean_sweep => {
                existing.progress + 1
            }
            AchievementCondition::TournamentTitle if outcome.tournament_title => {
                existing.progress + 1
            }
            AchievementCondition::CleanSweep | AchievementCondition::TournamentTitle => {
                existing.progress
            }
        };

        let new_progress = existing.progress.max(candidate.min(definition.target));
        let unlocked_now = !existing.unlocked && new_progress >= definition.target;

        if new_progress == existing.progress && !unlocked_now {
            continue;
        }

        let mut record = existing.clone();
        record.progress = new_progress;
        if unlocked_now {
            record.unlocked = true;
            record.unlocked_at = Some(now);
        }

        debug!(
            player_id = %player_id,
            achievement_id = %definition.id,
            previous = existing.progress,
            progress = new_progress,
            unlocked_now,
            "Achievement progress"
        );

        deltas.push(AchievementDelta {
            player_id,
            achievement_id: definition.id.clone(),
            previous_progress: existing.progress,
            new_progress,
            target: definition.target,
            unlocked_now,
            record,
        });
    }

    deltas
}
