#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use chrono::{DateTime, Utc};
    use uuid::Uuid;

    use crate::api_error::ApiError;
    use crate::models::*;
    use crate::service::achievement_service::AchievementCatalog;
    use crate::service::bracket_service::infer_rounds;
    use crate::service::email_service::{EmailDispatcher, EmailError, EmailEvent, LogEmailDispatcher};
    use crate::service::match_completion_service::{
        plan_completion, validate_completion, CompletionContext, MatchCompletionService,
    };
    use crate::store::memory::MemoryTransaction;
    use crate::store::{
        CompletionStore, CompletionTransaction, MatchStore, MemoryStore, NotificationStore,
        StoreError,
    };

    /// Four-player single-elimination bracket: A-B and C-D, then a final
    /// between A and C.
    struct Bracket {
        store: MemoryStore,
        tournament: Tournament,
        a: Player,
        b: Player,
        c: Player,
        d: Player,
        semi_ab: Match,
        semi_cd: Match,
        final_ac: Match,
    }

    fn scheduled(tournament_id: Uuid, number: i32, p1: Uuid, p2: Uuid) -> Match {
        Match {
            id: Uuid::new_v4(),
            tournament_id,
            match_number: number,
            player1_id: Some(p1),
            player2_id: Some(p2),
            round: None,
            status: MatchStatus::Scheduled,
            detailed_score: None,
            winner_id: None,
            completed_at: None,
        }
    }

    fn finished(record: &Match, winner: Uuid, score: &str) -> MatchCompletionEvent {
        let mut m = record.clone();
        m.status = MatchStatus::Completed;
        m.winner_id = Some(winner);
        m.detailed_score = Some(score.to_string());
        MatchCompletionEvent { match_record: m }
    }

    async fn seed_bracket() -> Bracket {
        let store = MemoryStore::new();
        let tournament = Tournament {
            id: Uuid::new_v4(),
            name: "Spring Open".to_string(),
            format: TournamentFormat::SingleElimination,
            max_participants: 4,
            status: TournamentStatus::Ongoing,
            created_at: Utc::now(),
        };
        store.insert_tournament(tournament.clone()).await;

        let a = Player::new("A", Some(Uuid::new_v4()));
        let b = Player::new("B", Some(Uuid::new_v4()));
        let c = Player::new("C", Some(Uuid::new_v4()));
        let d = Player::new("D", None);
        for p in [&a, &b, &c, &d] {
            store.register_player(tournament.id, p.clone()).await;
        }

        let semi_ab = scheduled(tournament.id, 1, a.id, b.id);
        let semi_cd = scheduled(tournament.id, 2, c.id, d.id);
        let final_ac = scheduled(tournament.id, 3, a.id, c.id);
        for m in [&semi_ab, &semi_cd, &final_ac] {
            store.insert_match(m.clone()).await;
        }

        Bracket {
            store,
            tournament,
            a,
            b,
            c,
            d,
            semi_ab,
            semi_cd,
            final_ac,
        }
    }

    fn service<S: CompletionStore>(store: S) -> MatchCompletionService<S, LogEmailDispatcher> {
        MatchCompletionService::new(store, LogEmailDispatcher, Arc::new(AchievementCatalog::builtin()), 1)
    }

    async fn all_notifications(store: &MemoryStore, user_id: Uuid) -> Vec<Notification> {
        store.list_notifications(user_id, false, 0, 100).await.unwrap().0
    }

    #[tokio::test]
    async fn test_four_player_bracket_end_to_end() {
        let t = seed_bracket().await;
        let service = service(t.store.clone());

        let first = service
            .complete_match(finished(&t.semi_ab, t.a.id, "11-5, 11-7"))
            .await
            .unwrap();
        assert!(!first.already_applied);
        assert!(!first.tournament_completed);
        let delta = first.standings.unwrap();
        assert_eq!(delta.winner_after.rating, 1216);
        assert_eq!(delta.loser_after.rating, 1184);
        let unlocked: Vec<&str> = first
            .achievements
            .iter()
            .filter(|d| d.unlocked_now)
            .map(|d| d.achievement_id.as_str())
            .collect();
        assert_eq!(unlocked, vec!["first_win", "flawless"]);

        let second = service
            .complete_match(finished(&t.semi_cd, t.c.id, "11-9, 5-11, 11-8"))
            .await
            .unwrap();
        assert!(!second.tournament_completed);
        // C dropped a set, D has no linked account.
        assert!(second
            .achievements
            .iter()
            .all(|d| d.achievement_id != "flawless"));
        assert_eq!(second.notifications.len(), 2);

        let last = service
            .complete_match(finished(&t.final_ac, t.a.id, "11-3, 11-4"))
            .await
            .unwrap();
        assert!(last.tournament_completed);
        let standings = last.final_standings.unwrap();
        assert_eq!(standings[0].player_id, t.a.id);
        assert_eq!(standings[0].rank, 1);
        assert_eq!((standings[0].wins, standings[0].losses), (2, 0));
        assert_eq!(standings[1].player_id, t.c.id);
        assert!(standings.iter().all(|s| s.points == 0));

        let matches = t.store.list_matches(t.tournament.id).await.unwrap();
        let rounds = infer_rounds(&matches);
        assert_eq!(rounds.len(), 2);
        assert_eq!(rounds[0].name, "Semi-finals");
        assert_eq!(rounds[0].matches.len(), 2);
        assert_eq!(rounds[1].name, "Final");
        assert_eq!(rounds[1].matches.len(), 1);
        assert!(matches.iter().all(|m| m.completed_at.is_some()));

        let tournament = t.store.get_tournament(t.tournament.id).await.unwrap();
        assert_eq!(tournament.status, TournamentStatus::Completed);

        let a = t.store.get_player(t.a.id).await.unwrap();
        assert_eq!((a.wins, a.losses), (2, 0));
        assert_eq!(a.best_win_streak, 2);
        let c = t.store.get_player(t.c.id).await.unwrap();
        assert_eq!((c.wins, c.losses, c.current_win_streak), (1, 1, 0));

        let progress = t.store.achievement_progress(t.a.id).await;
        let champion = progress.iter().find(|p| p.achievement_id == "champion").unwrap();
        assert!(champion.unlocked);
        let ten_wins = progress.iter().find(|p| p.achievement_id == "ten_wins").unwrap();
        assert_eq!(ten_wins.progress, 2);
        assert!(!ten_wins.unlocked);

        // A: two results, three unlocks, one final ranking.
        let a_feed = all_notifications(&t.store, t.a.user_id.unwrap()).await;
        assert_eq!(a_feed.len(), 6);
        let count = |kind: NotificationType| a_feed.iter().filter(|n| n.notification_type == kind).count();
        assert_eq!(count(NotificationType::Match), 2);
        assert_eq!(count(NotificationType::Achievement), 3);
        assert_eq!(count(NotificationType::Tournament), 1);
        assert_eq!(t.store.count_unread(t.a.user_id.unwrap()).await.unwrap(), 6);

        let b_feed = all_notifications(&t.store, t.b.user_id.unwrap()).await;
        assert_eq!(b_feed.len(), 2);
        let ranking = b_feed
            .iter()
            .find(|n| n.notification_type == NotificationType::Tournament)
            .unwrap();
        let b_rank = standings.iter().find(|s| s.player_id == t.b.id).unwrap().rank;
        assert_eq!(ranking.metadata["rank"], b_rank);

        let d = t.store.get_player(t.d.id).await.unwrap();
        assert_eq!(d.losses, 1);
    }

    #[tokio::test]
    async fn test_retry_is_idempotent() {
        let t = seed_bracket().await;
        let service = service(t.store.clone());
        let event = finished(&t.semi_ab, t.a.id, "11-5, 11-7");

        service.complete_match(event.clone()).await.unwrap();
        let feed_before = all_notifications(&t.store, t.a.user_id.unwrap()).await.len();

        let retry = service.complete_match(event).await.unwrap();
        assert!(retry.already_applied);
        assert!(retry.standings.is_none());
        assert!(retry.notifications.is_empty());

        let a = t.store.get_player(t.a.id).await.unwrap();
        assert_eq!(a.wins, 1);
        assert_eq!(a.rating, 1216);
        assert_eq!(
            all_notifications(&t.store, t.a.user_id.unwrap()).await.len(),
            feed_before
        );
    }

    #[tokio::test]
    async fn test_completion_without_round_keeps_bracket_shape() {
        let store = MemoryStore::new();
        let tournament = Tournament {
            id: Uuid::new_v4(),
            name: "Autumn Cup".to_string(),
            format: TournamentFormat::SingleElimination,
            max_participants: 4,
            status: TournamentStatus::Ongoing,
            created_at: Utc::now(),
        };
        store.insert_tournament(tournament.clone()).await;
        let players: Vec<Player> = ["A", "B", "C", "D"]
            .into_iter()
            .map(|name| Player::new(name, None))
            .collect();
        for p in &players {
            store.register_player(tournament.id, p.clone()).await;
        }

        let labeled = |number, p1: &Player, p2: &Player, round: &str| {
            let mut m = scheduled(tournament.id, number, p1.id, p2.id);
            m.round = Some(round.to_string());
            m
        };
        let semi_one = labeled(1, &players[0], &players[1], "Semi-final");
        let semi_two = labeled(2, &players[2], &players[3], "Semi-final");
        let final_match = labeled(3, &players[0], &players[2], "Final");
        for m in [&semi_one, &semi_two, &final_match] {
            store.insert_match(m.clone()).await;
        }

        let mut event = finished(&semi_one, players[0].id, "11-3, 11-4");
        event.match_record.round = None;
        event.match_record.match_number = 0;
        service(store.clone()).complete_match(event).await.unwrap();

        let matches = store.list_matches(tournament.id).await.unwrap();
        let stored = matches.iter().find(|m| m.id == semi_one.id).unwrap();
        assert_eq!(stored.round.as_deref(), Some("Semi-final"));
        assert_eq!(stored.match_number, 1);
        assert_eq!(stored.winner_id, Some(players[0].id));

        let shape: Vec<(String, usize)> = infer_rounds(&matches)
            .into_iter()
            .map(|r| (r.name, r.matches.len()))
            .collect();
        assert_eq!(
            shape,
            vec![("Semi-finals".to_string(), 2), ("Final".to_string(), 1)]
        );
    }

    /// Completion store whose transactions fail the next `failures`
    /// notification inserts with the error built by `failure`.
    #[derive(Clone)]
    struct FlakyStore {
        inner: MemoryStore,
        failures: Arc<AtomicUsize>,
        failure: fn() -> StoreError,
    }

    impl FlakyStore {
        fn new(inner: MemoryStore, failures: usize, failure: fn() -> StoreError) -> Self {
            Self {
                inner,
                failures: Arc::new(AtomicUsize::new(failures)),
                failure,
            }
        }
    }

    struct FlakyTransaction {
        inner: MemoryTransaction,
        failures: Arc<AtomicUsize>,
        failure: fn() -> StoreError,
    }

    impl CompletionStore for FlakyStore {
        type Tx = FlakyTransaction;

        async fn begin(&self) -> Result<Self::Tx, StoreError> {
            Ok(FlakyTransaction {
                inner: self.inner.begin().await?,
                failures: self.failures.clone(),
                failure: self.failure,
            })
        }
    }

    impl CompletionTransaction for FlakyTransaction {
        async fn is_applied(&mut self, match_id: Uuid) -> Result<bool, StoreError> {
            self.inner.is_applied(match_id).await
        }

        async fn load_tournament(&mut self, tournament_id: Uuid) -> Result<Tournament, StoreError> {
            self.inner.load_tournament(tournament_id).await
        }

        async fn load_matches(&mut self, tournament_id: Uuid) -> Result<Vec<Match>, StoreError> {
            self.inner.load_matches(tournament_id).await
        }

        async fn load_roster(&mut self, tournament_id: Uuid) -> Result<Vec<Player>, StoreError> {
            self.inner.load_roster(tournament_id).await
        }

        async fn load_player_for_update(&mut self, player_id: Uuid) -> Result<Player, StoreError> {
            self.inner.load_player_for_update(player_id).await
        }

        async fn load_progress(&mut self, player_id: Uuid) -> Result<Vec<AchievementProgress>, StoreError> {
            self.inner.load_progress(player_id).await
        }

        async fn save_match(&mut self, record: &Match) -> Result<(), StoreError> {
            self.inner.save_match(record).await
        }

        async fn save_player(&mut self, player: &Player) -> Result<(), StoreError> {
            self.inner.save_player(player).await
        }

        async fn save_progress(&mut self, progress: &AchievementProgress) -> Result<(), StoreError> {
            self.inner.save_progress(progress).await
        }

        async fn insert_notification(&mut self, notification: &Notification) -> Result<(), StoreError> {
            let remaining = self.failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures.store(remaining - 1, Ordering::SeqCst);
                return Err((self.failure)());
            }
            self.inner.insert_notification(notification).await
        }

        async fn set_tournament_status(
            &mut self,
            tournament_id: Uuid,
            status: TournamentStatus,
        ) -> Result<(), StoreError> {
            self.inner.set_tournament_status(tournament_id, status).await
        }

        async fn mark_applied(&mut self, match_id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError> {
            self.inner.mark_applied(match_id, at).await
        }

        async fn commit(self) -> Result<(), StoreError> {
            self.inner.commit().await
        }
    }

    #[tokio::test]
    async fn test_store_failure_rolls_back_and_retry_applies_once() {
        let t = seed_bracket().await;
        let flaky = FlakyStore::new(t.store.clone(), 1, || {
            StoreError::Unavailable("connection reset".to_string())
        });
        let service = service(flaky);
        let event = finished(&t.semi_ab, t.a.id, "11-5, 11-7");

        let err = service.complete_match(event.clone()).await.unwrap_err();
        assert!(err.is_retryable());

        let a = t.store.get_player(t.a.id).await.unwrap();
        assert_eq!(a.wins, 0);
        assert_eq!(a.rating, DEFAULT_RATING);
        assert!(t.store.achievement_progress(t.a.id).await.is_empty());
        assert!(all_notifications(&t.store, t.a.user_id.unwrap()).await.is_empty());
        let stored = t.store.get_match(t.semi_ab.id).await.unwrap();
        assert_eq!(stored.status, MatchStatus::Scheduled);

        let outcome = service.complete_match(event.clone()).await.unwrap();
        assert!(!outcome.already_applied);
        let again = service.complete_match(event).await.unwrap();
        assert!(again.already_applied);

        let a = t.store.get_player(t.a.id).await.unwrap();
        assert_eq!(a.wins, 1);
        let b = t.store.get_player(t.b.id).await.unwrap();
        assert_eq!(b.losses, 1);
        assert_eq!(t.store.count_unread(t.a.user_id.unwrap()).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_permanent_store_errors_are_not_retryable() {
        let t = seed_bracket().await;
        let event = finished(&t.semi_ab, t.a.id, "11-5, 11-7");

        let refused = service(FlakyStore::new(t.store.clone(), usize::MAX, || {
            StoreError::Rejected("value too long for type character varying(64)".to_string())
        }));
        for _ in 0..2 {
            let err = refused.complete_match(event.clone()).await.unwrap_err();
            assert!(matches!(err, ApiError::BadRequest(_)));
            assert!(!err.is_retryable());
        }

        let corrupt = service(FlakyStore::new(t.store.clone(), 1, || {
            StoreError::Database(sqlx::Error::Decode("unknown match status".into()))
        }));
        let err = corrupt.complete_match(event.clone()).await.unwrap_err();
        assert!(matches!(err, ApiError::DatabaseError(_)));
        assert!(!err.is_retryable());

        let a = t.store.get_player(t.a.id).await.unwrap();
        assert_eq!(a.wins, 0);
        let stored = t.store.get_match(t.semi_ab.id).await.unwrap();
        assert_eq!(stored.status, MatchStatus::Scheduled);
    }

    #[tokio::test]
    async fn test_rejects_events_that_cannot_complete() {
        let t = seed_bracket().await;
        let service = service(t.store.clone());

        let mut ongoing = finished(&t.semi_ab, t.a.id, "11-5");
        ongoing.match_record.status = MatchStatus::Ongoing;
        assert!(matches!(
            service.complete_match(ongoing).await,
            Err(ApiError::BadRequest(_))
        ));

        let outsider = finished(&t.semi_ab, t.c.id, "11-5");
        assert!(matches!(
            service.complete_match(outsider).await,
            Err(ApiError::BadRequest(_))
        ));

        let mut no_winner = finished(&t.semi_ab, t.a.id, "11-5");
        no_winner.match_record.winner_id = None;
        assert!(matches!(
            service.complete_match(no_winner).await,
            Err(ApiError::BadRequest(_))
        ));

        let mut bye = finished(&t.semi_ab, t.a.id, "11-5");
        bye.match_record.player2_id = None;
        assert!(validate_completion(&bye.match_record).is_err());

        let unknown = finished(&scheduled(t.tournament.id, 9, t.a.id, t.b.id), t.a.id, "11-5");
        assert!(matches!(
            service.complete_match(unknown).await,
            Err(ApiError::NotFound(_))
        ));

        let mut reseated = finished(&t.semi_ab, t.a.id, "11-5");
        reseated.match_record.player2_id = Some(t.d.id);
        assert!(matches!(
            service.complete_match(reseated).await,
            Err(ApiError::Conflict(_))
        ));

        // Nothing was applied along the way.
        let a = t.store.get_player(t.a.id).await.unwrap();
        assert_eq!(a.matches_played(), 0);
    }

    #[derive(Clone, Default)]
    struct RecordingDispatcher {
        sent: Arc<Mutex<Vec<EmailEvent>>>,
    }

    impl EmailDispatcher for RecordingDispatcher {
        async fn send(&self, event: &EmailEvent) -> Result<(), EmailError> {
            self.sent.lock().unwrap().push(event.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_emails_follow_tournament_completion() {
        let t = seed_bracket().await;
        let mailer = RecordingDispatcher::default();
        let service = MatchCompletionService::new(
            t.store.clone(),
            mailer.clone(),
            Arc::new(AchievementCatalog::builtin()),
            1,
        );

        service
            .complete_match(finished(&t.semi_ab, t.a.id, "11-5, 11-7"))
            .await
            .unwrap();
        service
            .complete_match(finished(&t.semi_cd, t.c.id, "11-9, 11-8"))
            .await
            .unwrap();
        assert!(mailer.sent.lock().unwrap().is_empty());

        service
            .complete_match(finished(&t.final_ac, t.a.id, "11-3, 11-4"))
            .await
            .unwrap();
        let sent = mailer.sent.lock().unwrap().clone();
        let completed = sent
            .iter()
            .filter(|e| matches!(e, EmailEvent::TournamentCompleted { .. }))
            .count();
        assert_eq!(completed, 3);
        let certificates: Vec<Uuid> = sent
            .iter()
            .filter(|e| matches!(e, EmailEvent::CertificateReady { .. }))
            .map(|e| e.user_id())
            .collect();
        assert_eq!(certificates, vec![t.a.user_id.unwrap()]);
    }

    #[test]
    fn test_plan_is_pure_and_keeps_progress_monotone() {
        let tournament_id = Uuid::new_v4();
        let mut winner = Player::new("W", Some(Uuid::new_v4()));
        winner.best_win_streak = 4;
        winner.current_win_streak = 0;
        let loser = Player::new("L", None);
        let record = scheduled(tournament_id, 1, winner.id, loser.id);
        let pending = scheduled(tournament_id, 2, winner.id, loser.id);
        let event = finished(&record, winner.id, "9-11, 11-7, 11-2");

        let mut streak = AchievementProgress::empty(winner.id, "hot_streak");
        streak.progress = 3;
        streak.unlocked = true;

        let ctx = CompletionContext {
            match_record: event.match_record,
            tournament: Tournament {
                id: tournament_id,
                name: "League".to_string(),
                format: TournamentFormat::RoundRobin,
                max_participants: 2,
                status: TournamentStatus::Ongoing,
                created_at: Utc::now(),
            },
            matches: vec![record, pending],
            roster: vec![winner.clone(), loser.clone()],
            winner,
            loser,
            winner_progress: vec![streak],
            loser_progress: vec![],
        };

        let now = Utc::now();
        let catalog = AchievementCatalog::builtin();
        let plan = plan_completion(&ctx, &catalog, 3, now);
        let replay = plan_completion(&ctx, &catalog, 3, now);

        assert_eq!(plan.match_record.completed_at, Some(now));
        assert!(plan.tournament_status.is_none());
        assert!(!plan.outcome.tournament_completed);
        assert!(plan.emails.is_empty());
        assert_eq!(plan.outcome.achievements, replay.outcome.achievements);

        // Current streak is 1 after this win; stored progress stays at 3.
        assert!(plan
            .outcome
            .achievements
            .iter()
            .all(|d| d.achievement_id != "hot_streak"));
        // Dropped the first set.
        assert!(plan
            .outcome
            .achievements
            .iter()
            .all(|d| d.achievement_id != "flawless"));
        // Only the winner is linked.
        let match_notes = plan
            .outcome
            .notifications
            .iter()
            .filter(|n| n.notification_type == NotificationType::Match)
            .count();
        assert_eq!(match_notes, 1);
    }
}
