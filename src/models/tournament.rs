use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use super::match_model::{Match, Round};
use super::player::Standing;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tournament {
    pub id: Uuid,
    pub name: String,
    pub format: TournamentFormat,
    pub max_participants: i32,
    pub status: TournamentStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TournamentFormat {
    SingleElimination,
    RoundRobin,
    GroupStage,
}

impl TournamentFormat {
    /// Formats where standings award points per win.
    pub fn is_point_based(&self) -> bool {
        matches!(self, TournamentFormat::RoundRobin | TournamentFormat::GroupStage)
    }
}

impl std::fmt::Display for TournamentFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TournamentFormat::SingleElimination => write!(f, "single_elimination"),
            TournamentFormat::RoundRobin => write!(f, "round_robin"),
            TournamentFormat::GroupStage => write!(f, "group_stage"),
        }
    }
}

impl FromStr for TournamentFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "single_elimination" => Ok(TournamentFormat::SingleElimination),
            "round_robin" => Ok(TournamentFormat::RoundRobin),
            "group_stage" => Ok(TournamentFormat::GroupStage),
            other => Err(format!("unknown tournament format '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TournamentStatus {
    Upcoming,
    Ongoing,
    Completed,
}

impl std::fmt::Display for TournamentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TournamentStatus::Upcoming => write!(f, "upcoming"),
            TournamentStatus::Ongoing => write!(f, "ongoing"),
            TournamentStatus::Completed => write!(f, "completed"),
        }
    }
}

impl FromStr for TournamentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "upcoming" => Ok(TournamentStatus::Upcoming),
            "ongoing" => Ok(TournamentStatus::Ongoing),
            "completed" => Ok(TournamentStatus::Completed),
            other => Err(format!("unknown tournament status '{}'", other)),
        }
    }
}

/// A tournament is finished once every match has reached a terminal status
/// and at least one of them was actually played.
pub fn is_tournament_finished(matches: &[Match]) -> bool {
    !matches.is_empty()
        && matches.iter().all(|m| m.status.is_terminal())
        && matches.iter().any(|m| m.is_completed())
}

// ===== Response Types =====

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BracketMatchView {
    #[serde(flatten)]
    pub match_data: Match,
    /// Match-level set tally such as "3-1".
    pub set_score: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BracketRoundView {
    pub name: String,
    pub matches: Vec<BracketMatchView>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BracketResponse {
    pub tournament_id: Uuid,
    pub format: TournamentFormat,
    pub rounds: Vec<BracketRoundView>,
}

impl BracketRoundView {
    pub fn from_round(round: Round, set_score: impl Fn(Option<&str>) -> Option<String>) -> Self {
        let matches = round
            .matches
            .into_iter()
            .map(|m| BracketMatchView {
                set_score: set_score(m.detailed_score.as_deref()),
                match_data: m,
            })
            .collect();
        Self {
            name: round.name,
            matches,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StandingsResponse {
    pub tournament_id: Uuid,
    pub status: TournamentStatus,
    pub standings: Vec<Standing>,
}
