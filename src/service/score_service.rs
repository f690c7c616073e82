use serde::{Deserialize, Serialize};

/// Set and point totals parsed from a detailed score such as "11-9, 7-11".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetTally {
    pub player1_sets: i32,
    pub player2_sets: i32,
    pub player1_points: i64,
    pub player2_points: i64,
}

impl SetTally {
    /// Sets conceded by the player in seat one or two.
    pub fn sets_conceded(&self, seat_one: bool) -> i32 {
        if seat_one {
            self.player2_sets
        } else {
            self.player1_sets
        }
    }

    /// Points scored minus points conceded from the given seat's view.
    pub fn point_difference(&self, seat_one: bool) -> i64 {
        if seat_one {
            self.player1_points.saturating_sub(self.player2_points)
        } else {
            self.player2_points.saturating_sub(self.player1_points)
        }
    }

    pub fn sets_played(&self) -> i32 {
        self.player1_sets.saturating_add(self.player2_sets)
    }
}

/// Parses every comma-separated "a-b" pair. Pairs that are not two integers
/// are skipped; a set with `a > b` goes to player one, anything else to
/// player two. Totals saturate instead of overflowing.
pub fn parse_sets(detailed: &str) -> SetTally {
    let mut tally = SetTally::default();

    for pair in detailed.split(',') {
        let Some((a, b)) = parse_pair(pair) else {
            continue;
        };
        if a > b {
            tally.player1_sets = tally.player1_sets.saturating_add(1);
        } else {
            tally.player2_sets = tally.player2_sets.saturating_add(1);
        }
        tally.player1_points = tally.player1_points.saturating_add(a);
        tally.player2_points = tally.player2_points.saturating_add(b);
    }

    tally
}

fn parse_pair(pair: &str) -> Option<(i64, i64)> {
    let (a, b) = pair.trim().split_once('-')?;
    let a = a.trim().parse::<i64>().ok()?;
    let b = b.trim().parse::<i64>().ok()?;
    Some((a, b))
}

/// Match-level "W-L" set tally, or `None` when no detailed score exists.
pub fn set_score(detailed: Option<&str>) -> Option<String> {
    let tally = parse_sets(detailed?);
    Some(format!("{}-{}", tally.player1_sets, tally.player2_sets))
}
