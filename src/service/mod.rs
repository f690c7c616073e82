// Service layer for bracket-engine
pub mod achievement_service;
pub mod bracket_service;
pub mod email_service;
pub mod match_completion_service;
pub mod notification_service;
pub mod score_service;
pub mod standings_service;

#[cfg(test)]
mod match_completion_service_test;

pub use achievement_service::AchievementCatalog;
pub use bracket_service::{build_bracket, infer_rounds};
pub use email_service::{EmailChannel, EmailDispatcher, EmailEvent};
pub use match_completion_service::{CompletionOutcome, MatchCompletionService};
pub use notification_service::NotificationService;
pub use score_service::set_score;
pub use standings_service::{compute_standings, ScoringRules};
