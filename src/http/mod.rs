pub mod bracket_handler;
pub mod health;
pub mod notification_handler;

use std::future::{ready, Ready};

use actix_web::{dev::Payload, web, FromRequest, HttpRequest};
use tracing::debug;
use uuid::Uuid;

use crate::api_error::ApiError;
use crate::service::{EmailChannel, MatchCompletionService, NotificationService};
use crate::store::Store;

/// Header carrying the caller's account id, set by the upstream auth layer.
pub const USER_ID_HEADER: &str = "X-User-Id";

/// Shared state for every handler, generic over the backing store.
pub struct AppState<S> {
    pub store: S,
    pub notifications: NotificationService<S>,
    pub completions: MatchCompletionService<S, EmailChannel>,
    pub points_per_win: i32,
}

/// Caller identity taken from `X-User-Id`. Missing or malformed ids are
/// rejected with 401.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthenticatedUser(pub Uuid);

impl FromRequest for AuthenticatedUser {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let user_id = req
            .headers()
            .get(USER_ID_HEADER)
            .and_then(|h| h.to_str().ok())
            .and_then(|v| Uuid::parse_str(v.trim()).ok());

        match user_id {
            Some(id) => ready(Ok(AuthenticatedUser(id))),
            None => {
                debug!(path = %req.path(), "Request without a valid user id");
                ready(Err(ApiError::Unauthorized))
            }
        }
    }
}

pub fn configure_routes<S: Store>(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .route("/health", web::get().to(health::health_check::<S>))
            .route(
                "/tournaments/{id}/bracket",
                web::get().to(bracket_handler::get_bracket::<S>),
            )
            .route(
                "/tournaments/{id}/standings",
                web::get().to(bracket_handler::get_standings::<S>),
            )
            .route(
                "/matches/{id}/complete",
                web::post().to(bracket_handler::complete_match::<S>),
            )
            .route(
                "/notifications",
                web::get().to(notification_handler::list_notifications::<S>),
            )
            .route(
                "/notifications/unread-count",
                web::get().to(notification_handler::unread_count::<S>),
            )
            .route(
                "/notifications/read-all",
                web::post().to(notification_handler::mark_all_read::<S>),
            )
            .route(
                "/notifications/{id}/read",
                web::post().to(notification_handler::mark_read::<S>),
            )
            .route(
                "/notifications/{id}",
                web::delete().to(notification_handler::delete_notification::<S>),
            ),
    );
}
