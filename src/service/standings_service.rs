use std::collections::BTreeMap;

use uuid::Uuid;

use crate::models::{Match, Player, Standing, StandingsDelta, TournamentFormat};
use crate::service::score_service::parse_sets;

/// Elo K-factor applied to every completed match.
pub const RATING_K_FACTOR: f64 = 32.0;

/// How standings convert results into points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoringRules {
    pub points_per_win: i32,
}

impl ScoringRules {
    /// Round-robin and group formats award `points_per_win`; elimination
    /// brackets do not score points.
    pub fn for_format(format: TournamentFormat, points_per_win: i32) -> Self {
        if format.is_point_based() {
            Self { points_per_win }
        } else {
            Self { points_per_win: 0 }
        }
    }
}

#[derive(Debug, Default)]
struct Tally {
    name: Option<String>,
    wins: i32,
    losses: i32,
    point_difference: i64,
}

/// Folds completed matches into a ranked standings table.
///
/// Only completed matches with a winner count. Ranking is wins descending,
/// then point difference descending, then player id ascending. Pure: the
/// same snapshot always produces the same table.
pub fn compute_standings(
    matches: &[Match],
    roster: &[Player],
    rules: ScoringRules,
) -> Vec<Standing> {
    let mut tallies: BTreeMap<Uuid, Tally> = BTreeMap::new();

    for player in roster {
        tallies.entry(player.id).or_default().name = Some(player.name.clone());
    }

    for m in matches.iter().filter(|m| m.is_completed()) {
        let Some(winner) = m.winner_id else {
            continue;
        };
        let loser = m.loser_id();
        let tally = m.detailed_score.as_deref().map(parse_sets);

        let winner_entry = tallies.entry(winner).or_default();
        winner_entry.wins = winner_entry.wins.saturating_add(1);
        if let Some(t) = tally {
            winner_entry.point_difference = winner_entry
                .point_difference
                .saturating_add(t.point_difference(m.player1_id == Some(winner)));
        }

        if let Some(loser) = loser {
            let loser_entry = tallies.entry(loser).or_default();
            loser_entry.losses = loser_entry.losses.saturating_add(1);
            if let Some(t) = tally {
                loser_entry.point_difference = loser_entry
                    .point_difference
                    .saturating_add(t.point_difference(m.player1_id == Some(loser)));
            }
        }
    }

    let mut standings: Vec<Standing> = tallies
        .into_iter()
        .map(|(player_id, t)| Standing {
            rank: 0,
            player_id,
            player_name: t.name,
            wins: t.wins,
            losses: t.losses,
            points: t.wins.saturating_mul(rules.points_per_win),
            point_difference: t.point_difference,
        })
        .collect();

    standings.sort_by(|a, b| {
        b.wins
            .cmp(&a.wins)
            .then_with(|| b.point_difference.cmp(&a.point_difference))
            .then_with(|| a.player_id.cmp(&b.player_id))
    });

    for (i, standing) in standings.iter_mut().enumerate() {
        standing.rank = i + 1;
    }

    standings
}

/// Incremental update of both participants' aggregate stats for one
/// completed match.
pub fn apply_match_result(winner: &Player, loser: &Player) -> StandingsDelta {
    let rating_change = rating_change(winner.rating, loser.rating);

    let mut winner_after = winner.clone();
    winner_after.wins += 1;
    winner_after.current_win_streak += 1;
    winner_after.best_win_streak = winner_after
        .best_win_streak
        .max(winner_after.current_win_streak);
    winner_after.rating += rating_change;

    let mut loser_after = loser.clone();
    loser_after.losses += 1;
    loser_after.current_win_streak = 0;
    loser_after.rating -= rating_change;

    StandingsDelta {
        winner_before: winner.clone(),
        winner_after,
        loser_before: loser.clone(),
        loser_after,
    }
}

/// Rating points moved from loser to winner.
fn rating_change(winner_rating: i32, loser_rating: i32) -> i32 {
    let exponent = f64::from(loser_rating - winner_rating) / 400.0;
    let expected = 1.0 / (1.0 + 10f64.powf(exponent));
    (RATING_K_FACTOR * (1.0 - expected)).round() as i32
}
