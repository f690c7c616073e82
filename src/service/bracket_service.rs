//! Round inference for tournament brackets.
//!
//! Matches arrive unordered with respect to rounds and often without usable
//! round labels. Labeled matches are grouped and sorted into canonical
//! bracket order; when nothing is labeled the rounds are reconstructed from
//! the match count alone, assuming single-elimination seeding order (earliest
//! matches first, last match is the final).

use crate::models::{
    BracketResponse, BracketRoundView, Match, Round, RoundLabel, Tournament,
};
use crate::service::score_service::set_score;
use tracing::debug;

#[derive(Debug, Clone, Copy)]
enum Stage {
    RoundOf16,
    Quarterfinal,
    Semifinal,
    Final,
}

impl Stage {
    fn label(self) -> RoundLabel {
        match self {
            Stage::RoundOf16 => RoundLabel::RoundOf16,
            Stage::Quarterfinal => RoundLabel::Quarterfinal,
            Stage::Semifinal => RoundLabel::Semifinal,
            Stage::Final => RoundLabel::Final,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Slice {
    stage: Stage,
    start: usize,
    end: usize,
}

const fn slice(stage: Stage, start: usize, end: usize) -> Slice {
    Slice { stage, start, end }
}

/// Bracket shapes recognised purely from the number of matches.
const POSITIONAL_LAYOUTS: &[(usize, &[Slice])] = &[
    (
        3,
        &[slice(Stage::Semifinal, 0, 2), slice(Stage::Final, 2, 3)],
    ),
    // Only the quarter-finals exist until their results are known.
    (4, &[slice(Stage::Quarterfinal, 0, 4)]),
    (
        7,
        &[
            slice(Stage::Quarterfinal, 0, 4),
            slice(Stage::Semifinal, 4, 6),
            slice(Stage::Final, 6, 7),
        ],
    ),
    (
        15,
        &[
            slice(Stage::RoundOf16, 0, 8),
            slice(Stage::Quarterfinal, 8, 12),
            slice(Stage::Semifinal, 12, 14),
            slice(Stage::Final, 14, 15),
        ],
    ),
];

/// Matches that the generic fallback assigns to the semi-finals, counted
/// back from the final.
const GENERIC_SEMIFINAL_MATCHES: usize = 2;

/// Reconstructs the ordered rounds of a bracket from its matches.
///
/// Pure and deterministic for a fixed input order; matches keep their input
/// order inside each round.
pub fn infer_rounds(matches: &[Match]) -> Vec<Round> {
    let labeled = group_labeled(matches);
    if !labeled.is_empty() {
        debug!(rounds = labeled.len(), "Rounds inferred from stored labels");
        return labeled;
    }

    let positional = infer_positional(matches);
    debug!(
        matches = matches.len(),
        rounds = positional.len(),
        "Rounds inferred from match count"
    );
    positional
}

fn group_labeled(matches: &[Match]) -> Vec<Round> {
    let mut groups: Vec<(String, RoundLabel, Vec<Match>)> = Vec::new();

    for m in matches {
        let Some(label) = RoundLabel::parse(m.round.as_deref()) else {
            continue;
        };
        let key = label.group_key();
        match groups.iter_mut().find(|(existing, _, _)| *existing == key) {
            Some((_, _, members)) => members.push(m.clone()),
            None => groups.push((key, label, vec![m.clone()])),
        }
    }

    // Stable: unrecognised labels keep their encounter order.
    groups.sort_by_key(|(_, label, _)| label.canonical_rank());

    groups
        .into_iter()
        .map(|(_, label, matches)| Round {
            name: label.display_name(),
            label,
            matches,
        })
        .collect()
}

fn infer_positional(matches: &[Match]) -> Vec<Round> {
    let count = matches.len();
    if count == 0 {
        return Vec::new();
    }

    let slices = match POSITIONAL_LAYOUTS.iter().find(|(n, _)| *n == count) {
        Some((_, layout)) => layout.to_vec(),
        None => generic_layout(count),
    };

    slices
        .into_iter()
        .filter(|s| s.end > s.start)
        .map(|s| {
            let label = s.stage.label();
            Round {
                name: label.display_name(),
                label,
                matches: matches[s.start..s.end].to_vec(),
            }
        })
        .collect()
}

/// Approximation for counts outside the known layouts: last match is the
/// final, up to two before it are semi-finals, the rest quarter-finals. Not
/// a bracket solver; counts such as 5, 6 or 12 are not guaranteed to match
/// the real bracket shape.
fn generic_layout(count: usize) -> Vec<Slice> {
    let final_start = count - 1;
    let semis_start = if count >= 3 {
        final_start.saturating_sub(GENERIC_SEMIFINAL_MATCHES)
    } else {
        final_start
    };

    vec![
        slice(Stage::Quarterfinal, 0, semis_start),
        slice(Stage::Semifinal, semis_start, final_start),
        slice(Stage::Final, final_start, count),
    ]
}

/// Bracket view for rendering: inferred rounds with per-match set tallies.
pub fn build_bracket(tournament: &Tournament, matches: &[Match]) -> BracketResponse {
    let rounds = infer_rounds(matches)
        .into_iter()
        .map(|round| BracketRoundView::from_round(round, set_score))
        .collect();

    BracketResponse {
        tournament_id: tournament.id,
        format: tournament.format,
        rounds,
    }
}
