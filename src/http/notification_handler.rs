use actix_web::{web, HttpResponse, Responder};
use uuid::Uuid;

use crate::api_error::ApiError;
use crate::http::{AppState, AuthenticatedUser};
use crate::models::{ListNotificationsQuery, UnreadCountResponse};
use crate::store::Store;

/// GET /api/notifications?unread_only&page&per_page
pub async fn list_notifications<S: Store>(
    state: web::Data<AppState<S>>,
    user: AuthenticatedUser,
    query: web::Query<ListNotificationsQuery>,
) -> Result<impl Responder, ApiError> {
    let result = state.notifications.list(user.0, &query).await?;
    Ok(HttpResponse::Ok().json(result))
}

/// GET /api/notifications/unread-count
pub async fn unread_count<S: Store>(
    state: web::Data<AppState<S>>,
    user: AuthenticatedUser,
) -> Result<impl Responder, ApiError> {
    let unread_count = state.notifications.unread_count(user.0).await?;
    Ok(HttpResponse::Ok().json(UnreadCountResponse { unread_count }))
}

/// POST /api/notifications/{id}/read
pub async fn mark_read<S: Store>(
    state: web::Data<AppState<S>>,
    user: AuthenticatedUser,
    path: web::Path<Uuid>,
) -> Result<impl Responder, ApiError> {
    let notification = state
        .notifications
        .mark_read(path.into_inner(), user.0)
        .await?;
    Ok(HttpResponse::Ok().json(notification))
}

/// POST /api/notifications/read-all
pub async fn mark_all_read<S: Store>(
    state: web::Data<AppState<S>>,
    user: AuthenticatedUser,
) -> Result<impl Responder, ApiError> {
    let result = state.notifications.mark_all_read(user.0).await?;
    Ok(HttpResponse::Ok().json(result))
}

/// DELETE /api/notifications/{id}
pub async fn delete_notification<S: Store>(
    state: web::Data<AppState<S>>,
    user: AuthenticatedUser,
    path: web::Path<Uuid>,
) -> Result<impl Responder, ApiError> {
    state
        .notifications
        .delete(path.into_inner(), user.0)
        .await?;
    Ok(HttpResponse::NoContent().finish())
}
