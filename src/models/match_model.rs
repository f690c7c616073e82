use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Match {
    pub id: Uuid,
    pub tournament_id: Uuid,
    #[serde(default)]
    pub match_number: i32,
    pub player1_id: Option<Uuid>,
    pub player2_id: Option<Uuid>,
    #[serde(default)]
    pub round: Option<String>,
    pub status: MatchStatus,
    #[serde(default)]
    pub detailed_score: Option<String>,
    #[serde(default)]
    pub winner_id: Option<Uuid>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Match {
    pub fn is_completed(&self) -> bool {
        self.status == MatchStatus::Completed
    }

    /// The other participant, if `player_id` played in this match.
    pub fn opponent_of(&self, player_id: Uuid) -> Option<Uuid> {
        if self.player1_id == Some(player_id) {
            self.player2_id
        } else if self.player2_id == Some(player_id) {
            self.player1_id
        } else {
            None
        }
    }

    /// Loser of a completed match, when both seats are filled.
    pub fn loser_id(&self) -> Option<Uuid> {
        let winner = self.winner_id?;
        self.opponent_of(winner)
    }

    /// Copies the fields a completion is allowed to change from `event`.
    /// Seats, round label and match number stay as stored.
    pub fn apply_completion(&mut self, event: &Match) {
        self.status = event.status;
        self.winner_id = event.winner_id;
        self.detailed_score = event.detailed_score.clone();
        self.completed_at = event.completed_at;
    }

    /// A winner, when present, must occupy one of the two seats and only a
    /// completed match may carry one.
    pub fn check_winner_invariant(&self) -> Result<(), String> {
        match self.winner_id {
            None => Ok(()),
            Some(_) if self.status != MatchStatus::Completed => Err(format!(
                "match {} has a winner but status is {}",
                self.id, self.status
            )),
            Some(winner) if self.player1_id != Some(winner) && self.player2_id != Some(winner) => {
                Err(format!("winner {} did not play in match {}", winner, self.id))
            }
            Some(_) => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MatchStatus {
    Scheduled,
    Ongoing,
    Completed,
    Cancelled,
}

impl MatchStatus {
    /// Completed and cancelled matches never change again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, MatchStatus::Completed | MatchStatus::Cancelled)
    }
}

impl std::fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MatchStatus::Scheduled => write!(f, "scheduled"),
            MatchStatus::Ongoing => write!(f, "ongoing"),
            MatchStatus::Completed => write!(f, "completed"),
            MatchStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl FromStr for MatchStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "scheduled" => Ok(MatchStatus::Scheduled),
            "ongoing" | "in_progress" => Ok(MatchStatus::Ongoing),
            "completed" => Ok(MatchStatus::Completed),
            "cancelled" | "canceled" => Ok(MatchStatus::Cancelled),
            other => Err(format!("unknown match status '{}'", other)),
        }
    }
}

/// Round metadata parsed from the free-text label stored on a match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "label", rename_all = "snake_case")]
pub enum RoundLabel {
    RoundOf32,
    RoundOf16,
    Quarterfinal,
    Semifinal,
    Final,
    Unlabeled(String),
}

impl RoundLabel {
    /// Returns `None` for labels that carry no round metadata: absent,
    /// blank, or the `unknown` sentinel.
    pub fn parse(raw: Option<&str>) -> Option<RoundLabel> {
        let raw = raw?.trim();
        if raw.is_empty() || raw.eq_ignore_ascii_case("unknown") {
            return None;
        }

        let key = normalize_key(raw);
        let label = if key.contains("quarter") {
            RoundLabel::Quarterfinal
        } else if key.contains("semi") {
            RoundLabel::Semifinal
        } else if key.contains("final") {
            RoundLabel::Final
        } else if matches!(key.as_str(), "roundof32" | "r32" | "last32" | "ro32") {
            RoundLabel::RoundOf32
        } else if matches!(key.as_str(), "roundof16" | "r16" | "last16" | "ro16") {
            RoundLabel::RoundOf16
        } else {
            RoundLabel::Unlabeled(raw.to_string())
        };
        Some(label)
    }

    /// Canonical bracket position; unrecognized labels sort after every
    /// known round.
    pub fn canonical_rank(&self) -> u8 {
        match self {
            RoundLabel::RoundOf32 => 0,
            RoundLabel::RoundOf16 => 1,
            RoundLabel::Quarterfinal => 2,
            RoundLabel::Semifinal => 3,
            RoundLabel::Final => 4,
            RoundLabel::Unlabeled(_) => u8::MAX,
        }
    }

    pub fn display_name(&self) -> String {
        match self {
            RoundLabel::RoundOf32 => "Round of 32".to_string(),
            RoundLabel::RoundOf16 => "Round of 16".to_string(),
            RoundLabel::Quarterfinal => "Quarter-finals".to_string(),
            RoundLabel::Semifinal => "Semi-finals".to_string(),
            RoundLabel::Final => "Final".to_string(),
            RoundLabel::Unlabeled(raw) => capitalize_first(raw),
        }
    }

    /// Key used to merge differently spelled labels into one round.
    pub fn group_key(&self) -> String {
        match self {
            RoundLabel::Unlabeled(raw) => format!("unlabeled:{}", normalize_key(raw)),
            known => format!("known:{}", known.canonical_rank()),
        }
    }
}

/// Lowercase ASCII alphanumerics only. Digits are kept so "round of 16" and
/// "round of 32" stay distinct.
fn normalize_key(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

fn capitalize_first(raw: &str) -> String {
    let mut chars = raw.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// A reconstructed bracket stage. Never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Round {
    pub name: String,
    pub label: RoundLabel,
    pub matches: Vec<Match>,
}

/// Final match record handed over by the completion hook.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchCompletionEvent {
    #[serde(rename = "match")]
    pub match_record: Match,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sentinel_labels() {
        assert_eq!(RoundLabel::parse(None), None);
        assert_eq!(RoundLabel::parse(Some("")), None);
        assert_eq!(RoundLabel::parse(Some("   ")), None);
        assert_eq!(RoundLabel::parse(Some("unknown")), None);
        assert_eq!(RoundLabel::parse(Some("UNKNOWN")), None);
    }

    #[test]
    fn test_parse_known_labels() {
        assert_eq!(RoundLabel::parse(Some("FINAL")), Some(RoundLabel::Final));
        assert_eq!(RoundLabel::parse(Some("Finals")), Some(RoundLabel::Final));
        assert_eq!(RoundLabel::parse(Some("semi-final")), Some(RoundLabel::Semifinal));
        assert_eq!(RoundLabel::parse(Some("Quarter Finals")), Some(RoundLabel::Quarterfinal));
        assert_eq!(RoundLabel::parse(Some("round_of_16")), Some(RoundLabel::RoundOf16));
        assert_eq!(RoundLabel::parse(Some("Round of 32")), Some(RoundLabel::RoundOf32));
    }

    #[test]
    fn test_short_round_aliases() {
        for alias in ["R16", "ro16", "Last 16"] {
            assert_eq!(RoundLabel::parse(Some(alias)), Some(RoundLabel::RoundOf16));
        }
        for alias in ["r32", "RO32", "last-32"] {
            assert_eq!(RoundLabel::parse(Some(alias)), Some(RoundLabel::RoundOf32));
        }
        assert_eq!(RoundLabel::parse(Some("Eighth-finals")), Some(RoundLabel::Final));
    }

    #[test]
    fn test_apply_completion_keeps_stored_layout() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let mut stored = Match {
            id: Uuid::new_v4(),
            tournament_id: Uuid::new_v4(),
            match_number: 2,
            player1_id: Some(a),
            player2_id: Some(b),
            round: Some("Semi-final".to_string()),
            status: MatchStatus::Ongoing,
            detailed_score: None,
            winner_id: None,
            completed_at: None,
        };
        let mut event = stored.clone();
        event.match_number = 0;
        event.round = None;
        event.status = MatchStatus::Completed;
        event.winner_id = Some(b);
        event.detailed_score = Some("9-11, 8-11".to_string());

        stored.apply_completion(&event);
        assert_eq!(stored.round.as_deref(), Some("Semi-final"));
        assert_eq!(stored.match_number, 2);
        assert_eq!(stored.status, MatchStatus::Completed);
        assert_eq!(stored.winner_id, Some(b));
        assert_eq!(stored.detailed_score.as_deref(), Some("9-11, 8-11"));
    }

    #[test]
    fn test_unlabeled_display_name() {
        let label = RoundLabel::parse(Some("group a")).unwrap();
        assert_eq!(label, RoundLabel::Unlabeled("group a".to_string()));
        assert_eq!(label.display_name(), "Group a");
        assert_eq!(label.canonical_rank(), u8::MAX);
    }

    #[test]
    fn test_status_round_trip_through_strings() {
        for status in [
            MatchStatus::Scheduled,
            MatchStatus::Ongoing,
            MatchStatus::Completed,
            MatchStatus::Cancelled,
        ] {
            assert_eq!(status.to_string().parse::<MatchStatus>().unwrap(), status);
        }
        assert!("postponed".parse::<MatchStatus>().is_err());
    }

    #[test]
    fn test_winner_invariant() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let mut m = Match {
            id: Uuid::new_v4(),
            tournament_id: Uuid::new_v4(),
            match_number: 1,
            player1_id: Some(a),
            player2_id: Some(b),
            round: None,
            status: MatchStatus::Completed,
            detailed_score: None,
            winner_id: Some(a),
            completed_at: None,
        };
        assert!(m.check_winner_invariant().is_ok());
        assert_eq!(m.loser_id(), Some(b));

        m.winner_id = Some(Uuid::new_v4());
        assert!(m.check_winner_invariant().is_err());

        m.winner_id = Some(a);
        m.status = MatchStatus::Ongoing;
        assert!(m.check_winner_invariant().is_err());
    }
}
