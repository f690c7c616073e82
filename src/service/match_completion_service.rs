use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::api_error::ApiError;
use crate::models::{
    is_tournament_finished, AchievementDelta, AchievementProgress, Match, MatchCompletionEvent,
    MatchStatus, NewNotification, Notification, NotificationType, Player, Standing,
    StandingsDelta, Tournament, TournamentStatus,
};
use crate::service::achievement_service::{
    evaluate_achievements, AchievementCatalog, ParticipantOutcome,
};
use crate::service::email_service::{dispatch_best_effort, EmailDispatcher, EmailEvent};
use crate::service::score_service::{parse_sets, set_score};
use crate::service::standings_service::{apply_match_result, compute_standings, ScoringRules};
use crate::store::{CompletionStore, CompletionTransaction, StoreError};

/// Side effects of one match completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionOutcome {
    pub match_id: Uuid,
    /// The completion had been committed before; nothing was written.
    pub already_applied: bool,
    pub standings: Option<StandingsDelta>,
    pub achievements: Vec<AchievementDelta>,
    pub notifications: Vec<Notification>,
    pub tournament_completed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_standings: Option<Vec<Standing>>,
}

impl CompletionOutcome {
    fn already_applied(match_id: Uuid) -> Self {
        Self {
            match_id,
            already_applied: true,
            standings: None,
            achievements: Vec::new(),
            notifications: Vec::new(),
            tournament_completed: false,
            final_standings: None,
        }
    }
}

/// Snapshot read inside the completion transaction.
#[derive(Debug, Clone)]
pub struct CompletionContext {
    pub match_record: Match,
    pub tournament: Tournament,
    /// Every match of the tournament as stored before this completion.
    pub matches: Vec<Match>,
    pub roster: Vec<Player>,
    pub winner: Player,
    pub loser: Player,
    pub winner_progress: Vec<AchievementProgress>,
    pub loser_progress: Vec<AchievementProgress>,
}

/// Everything to write for one completion, computed without touching the
/// store.
#[derive(Debug, Clone)]
pub struct CompletionPlan {
    pub match_record: Match,
    pub tournament_status: Option<TournamentStatus>,
    pub emails: Vec<EmailEvent>,
    pub outcome: CompletionOutcome,
}

/// Pure planning step of a completion.
pub fn plan_completion(
    ctx: &CompletionContext,
    catalog: &AchievementCatalog,
    points_per_win: i32,
    now: DateTime<Utc>,
) -> CompletionPlan {
    let mut match_record = ctx
        .matches
        .iter()
        .find(|m| m.id == ctx.match_record.id)
        .cloned()
        .unwrap_or_else(|| ctx.match_record.clone());
    match_record.apply_completion(&ctx.match_record);
    match_record.completed_at.get_or_insert(now);

    let mut matches = ctx.matches.clone();
    match matches.iter_mut().find(|m| m.id == match_record.id) {
        Some(existing) => *existing = match_record.clone(),
        None => matches.push(match_record.clone()),
    }

    let delta = apply_match_result(&ctx.winner, &ctx.loser);
    let winner = &delta.winner_after;
    let loser = &delta.loser_after;

    let finished_now = ctx.tournament.status != TournamentStatus::Completed
        && is_tournament_finished(&matches);

    let final_standings = finished_now.then(|| {
        let rules = ScoringRules::for_format(ctx.tournament.format, points_per_win);
        compute_standings(&matches, &ctx.roster, rules)
    });
    let champion = final_standings
        .as_ref()
        .and_then(|s| s.first())
        .map(|s| s.player_id);

    let tally = match_record.detailed_score.as_deref().map(parse_sets);
    let clean_sweep = tally.is_some_and(|t| {
        let seat_one = match_record.player1_id == Some(winner.id);
        t.sets_played() > 0 && t.sets_conceded(seat_one) == 0
    });

    let mut achievements = evaluate_achievements(
        catalog,
        &ParticipantOutcome {
            player: winner,
            won: true,
            clean_sweep,
            tournament_title: champion == Some(winner.id),
        },
        &ctx.winner_progress,
        now,
    );
    achievements.extend(evaluate_achievements(
        catalog,
        &ParticipantOutcome {
            player: loser,
            won: false,
            clean_sweep: false,
            tournament_title: false,
        },
        &ctx.loser_progress,
        now,
    ));

    let score = set_score(match_record.detailed_score.as_deref());
    let mut notifications = Vec::new();

    for (player, opponent, won) in [(winner, loser, true), (loser, winner, false)] {
        let Some(user_id) = player.user_id else {
            continue;
        };
        let (title, verb) = if won {
            ("Match won", "beat")
        } else {
            ("Match lost", "lost to")
        };
        let message = match &score {
            Some(score) => format!("You {} {} ({})", verb, opponent.name, score),
            None => format!("You {} {}", verb, opponent.name),
        };
        notifications.push(notification(
            user_id,
            NotificationType::Match,
            title,
            message,
            Some(format!("/tournaments/{}/bracket", ctx.tournament.id)),
            serde_json::json!({
                "match_id": match_record.id,
                "tournament_id": ctx.tournament.id,
                "won": won,
                "set_score": score,
            }),
            now,
        ));
    }

    for unlocked in achievements.iter().filter(|d| d.unlocked_now) {
        let owner = if unlocked.player_id == winner.id { winner } else { loser };
        let (Some(user_id), Some(definition)) = (owner.user_id, catalog.get(&unlocked.achievement_id))
        else {
            continue;
        };
        notifications.push(notification(
            user_id,
            NotificationType::Achievement,
            "Achievement unlocked",
            format!("{}: {}", definition.name, definition.description),
            None,
            serde_json::json!({
                "achievement_id": definition.id,
                "match_id": match_record.id,
            }),
            now,
        ));
    }

    let mut emails = Vec::new();
    if let Some(standings) = &final_standings {
        let linked: HashMap<Uuid, Uuid> = ctx
            .roster
            .iter()
            .filter_map(|p| p.user_id.map(|u| (p.id, u)))
            .collect();
        let field = standings.len();

        for standing in standings {
            let Some(&user_id) = linked.get(&standing.player_id) else {
                continue;
            };
            notifications.push(notification(
                user_id,
                NotificationType::Tournament,
                format!("{} has finished", ctx.tournament.name),
                format!("You finished #{} of {}", standing.rank, field),
                Some(format!("/tournaments/{}/standings", ctx.tournament.id)),
                serde_json::json!({
                    "tournament_id": ctx.tournament.id,
                    "rank": standing.rank,
                }),
                now,
            ));
            emails.push(EmailEvent::TournamentCompleted {
                user_id,
                tournament_id: ctx.tournament.id,
                tournament_name: ctx.tournament.name.clone(),
                rank: standing.rank,
            });
            if standing.rank == 1 {
                emails.push(EmailEvent::CertificateReady {
                    user_id,
                    tournament_id: ctx.tournament.id,
                    tournament_name: ctx.tournament.name.clone(),
                });
            }
        }
    }

    CompletionPlan {
        tournament_status: finished_now.then_some(TournamentStatus::Completed),
        emails,
        outcome: CompletionOutcome {
            match_id: match_record.id,
            already_applied: false,
            standings: Some(delta),
            achievements,
            notifications,
            tournament_completed: finished_now,
            final_standings,
        },
        match_record,
    }
}

fn notification(
    user_id: Uuid,
    notification_type: NotificationType,
    title: impl Into<String>,
    message: impl Into<String>,
    link_url: Option<String>,
    metadata: serde_json::Value,
    now: DateTime<Utc>,
) -> Notification {
    let mut n = Notification::new(NewNotification {
        user_id,
        notification_type,
        title: title.into(),
        message: message.into(),
        link_url,
        metadata: Some(metadata),
    });
    n.created_at = now;
    n
}

/// Rejects events that cannot be applied: the match must be completed with
/// two distinct players and a winner in one of the seats.
pub fn validate_completion(record: &Match) -> Result<(Uuid, Uuid), ApiError> {
    if record.status != MatchStatus::Completed {
        return Err(ApiError::bad_request(format!(
            "match {} is {}, expected completed",
            record.id, record.status
        )));
    }
    let (Some(player1), Some(player2)) = (record.player1_id, record.player2_id) else {
        return Err(ApiError::bad_request(format!(
            "match {} needs two players to complete",
            record.id
        )));
    };
    if player1 == player2 {
        return Err(ApiError::bad_request(format!(
            "match {} has the same player in both seats",
            record.id
        )));
    }
    record.check_winner_invariant().map_err(ApiError::bad_request)?;
    let winner = record
        .winner_id
        .ok_or_else(|| ApiError::bad_request(format!("match {} has no winner", record.id)))?;
    let loser = if winner == player1 { player2 } else { player1 };
    Ok((winner, loser))
}

/// Applies match completions: standings, achievements and notifications in
/// one store transaction, then best-effort email.
pub struct MatchCompletionService<S, E> {
    store: S,
    email: E,
    catalog: Arc<AchievementCatalog>,
    points_per_win: i32,
}

impl<S, E> MatchCompletionService<S, E>
where
    S: CompletionStore,
    E: EmailDispatcher,
{
    pub fn new(store: S, email: E, catalog: Arc<AchievementCatalog>, points_per_win: i32) -> Self {
        Self {
            store,
            email,
            catalog,
            points_per_win,
        }
    }

    /// Idempotent per match id: a retry after a committed completion returns
    /// `already_applied` and writes nothing.
    pub async fn complete_match(&self, event: MatchCompletionEvent) -> Result<CompletionOutcome, ApiError> {
        let record = event.match_record;
        let (winner_id, loser_id) = validate_completion(&record)?;
        let match_id = record.id;

        let mut tx = self.store.begin().await.map_err(|e| unit_error(match_id, e))?;

        if tx.is_applied(match_id).await.map_err(|e| unit_error(match_id, e))? {
            info!(match_id = %match_id, "Completion already applied");
            return Ok(CompletionOutcome::already_applied(match_id));
        }

        let ctx = self
            .load_context(&mut tx, record, winner_id, loser_id)
            .await
            .map_err(|e| unit_error(match_id, e))?;
        check_stored_seats(&ctx)?;
        let plan = plan_completion(&ctx, &self.catalog, self.points_per_win, Utc::now());

        Self::persist(&mut tx, &ctx, &plan)
            .await
            .map_err(|e| unit_error(match_id, e))?;
        tx.commit().await.map_err(|e| unit_error(match_id, e))?;

        info!(
            match_id = %match_id,
            tournament_id = %ctx.tournament.id,
            winner_id = %winner_id,
            achievements = plan.outcome.achievements.len(),
            notifications = plan.outcome.notifications.len(),
            tournament_completed = plan.outcome.tournament_completed,
            "Match completion applied"
        );

        if !plan.emails.is_empty() {
            let delivered = dispatch_best_effort(&self.email, &plan.emails).await;
            if delivered < plan.emails.len() {
                warn!(
                    match_id = %match_id,
                    delivered,
                    total = plan.emails.len(),
                    "Some completion emails were not delivered"
                );
            }
        }

        Ok(plan.outcome)
    }

    async fn load_context(
        &self,
        tx: &mut S::Tx,
        record: Match,
        winner_id: Uuid,
        loser_id: Uuid,
    ) -> Result<CompletionContext, StoreError> {
        let matches = tx.load_matches(record.tournament_id).await?;
        if !matches.iter().any(|m| m.id == record.id) {
            return Err(StoreError::NotFound(format!("match {}", record.id)));
        }

        let tournament = tx.load_tournament(record.tournament_id).await?;
        let roster = tx.load_roster(record.tournament_id).await?;
        let winner = tx.load_player_for_update(winner_id).await?;
        let loser = tx.load_player_for_update(loser_id).await?;
        let winner_progress = tx.load_progress(winner_id).await?;
        let loser_progress = tx.load_progress(loser_id).await?;

        Ok(CompletionContext {
            match_record: record,
            tournament,
            matches,
            roster,
            winner,
            loser,
            winner_progress,
            loser_progress,
        })
    }

    async fn persist(tx: &mut S::Tx, ctx: &CompletionContext, plan: &CompletionPlan) -> Result<(), StoreError> {
        tx.save_match(&plan.match_record).await?;

        if let Some(delta) = &plan.outcome.standings {
            tx.save_player(&delta.winner_after).await?;
            tx.save_player(&delta.loser_after).await?;
        }
        for achievement in &plan.outcome.achievements {
            tx.save_progress(&achievement.record).await?;
        }
        for notification in &plan.outcome.notifications {
            tx.insert_notification(notification).await?;
        }
        if let Some(status) = plan.tournament_status {
            tx.set_tournament_status(ctx.tournament.id, status).await?;
        }

        let applied_at = plan.match_record.completed_at.unwrap_or_else(Utc::now);
        tx.mark_applied(plan.match_record.id, applied_at).await
    }
}

/// The event must describe the same pairing as the stored match, in either
/// seat order.
fn check_stored_seats(ctx: &CompletionContext) -> Result<(), ApiError> {
    let record = &ctx.match_record;
    let seats = (record.player1_id, record.player2_id);
    let stored = ctx.matches.iter().find(|m| m.id == record.id);
    match stored {
        Some(m) if (m.player1_id, m.player2_id) == seats || (m.player2_id, m.player1_id) == seats => Ok(()),
        Some(_) => Err(ApiError::Conflict(format!(
            "match {} players differ from the stored record",
            record.id
        ))),
        None => Err(ApiError::not_found(format!("match {}", record.id))),
    }
}

/// Inside the completion unit, missing records and values the store refuses
/// are client errors. Transient failures and losing the applied-marker race
/// to a concurrent delivery may succeed on retry.
fn unit_error(match_id: Uuid, err: StoreError) -> ApiError {
    match err {
        StoreError::NotFound(what) => ApiError::not_found(what),
        StoreError::Forbidden(what) => ApiError::forbidden(what),
        StoreError::Rejected(reason) => {
            warn!(match_id = %match_id, reason = %reason, "Match completion rejected by the store");
            ApiError::bad_request(format!("match {} completion rejected: {}", match_id, reason))
        }
        StoreError::Database(e) => {
            error!(match_id = %match_id, error = %e, "Match completion rolled back");
            ApiError::DatabaseError(e)
        }
        other @ (StoreError::Conflict(_) | StoreError::Unavailable(_)) => {
            error!(match_id = %match_id, error = %other, "Match completion rolled back");
            ApiError::retryable(format!("match {} completion not applied: {}", match_id, other))
        }
    }
}
