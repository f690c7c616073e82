use actix_web::{web, HttpResponse, Responder};
use tracing::info;
use uuid::Uuid;

use crate::api_error::ApiError;
use crate::http::AppState;
use crate::models::{Match, MatchCompletionEvent, StandingsResponse};
use crate::service::{build_bracket, compute_standings, ScoringRules};
use crate::store::Store;

/// GET /api/tournaments/{id}/bracket
pub async fn get_bracket<S: Store>(
    state: web::Data<AppState<S>>,
    path: web::Path<Uuid>,
) -> Result<impl Responder, ApiError> {
    let tournament_id = path.into_inner();
    let tournament = state.store.get_tournament(tournament_id).await?;
    let matches = state.store.list_matches(tournament_id).await?;

    Ok(HttpResponse::Ok().json(build_bracket(&tournament, &matches)))
}

/// GET /api/tournaments/{id}/standings
pub async fn get_standings<S: Store>(
    state: web::Data<AppState<S>>,
    path: web::Path<Uuid>,
) -> Result<impl Responder, ApiError> {
    let tournament_id = path.into_inner();
    let tournament = state.store.get_tournament(tournament_id).await?;
    let matches = state.store.list_matches(tournament_id).await?;
    let roster = state.store.list_roster(tournament_id).await?;

    let rules = ScoringRules::for_format(tournament.format, state.points_per_win);
    Ok(HttpResponse::Ok().json(StandingsResponse {
        tournament_id,
        status: tournament.status,
        standings: compute_standings(&matches, &roster, rules),
    }))
}

/// POST /api/matches/{id}/complete
/// Completion hook; the body is the final match record.
pub async fn complete_match<S: Store>(
    state: web::Data<AppState<S>>,
    path: web::Path<Uuid>,
    body: web::Json<Match>,
) -> Result<impl Responder, ApiError> {
    let match_id = path.into_inner();
    let record = body.into_inner();
    if record.id != match_id {
        return Err(ApiError::bad_request(format!(
            "path match id {} does not match body id {}",
            match_id, record.id
        )));
    }

    info!(match_id = %match_id, winner_id = ?record.winner_id, "Received match completion");

    let outcome = state
        .completions
        .complete_match(MatchCompletionEvent {
            match_record: record,
        })
        .await?;

    Ok(HttpResponse::Ok().json(outcome))
}
