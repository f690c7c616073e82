use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;
use validator::Validate;

use crate::api_error::ApiError;
use crate::models::{
    ListNotificationsQuery, MarkAllReadResponse, NewNotification, Notification,
    NotificationListResponse, NotificationType,
};
use crate::store::{NotificationStore, StoreError};

/// Per-user notification feed. Every mutation is scoped to the owning user;
/// unread counts are always read back from the store.
#[derive(Clone)]
pub struct NotificationService<S> {
    store: S,
}

impl<S: NotificationStore> NotificationService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Appends a new unread notification. Never touches existing ones.
    pub async fn create(
        &self,
        user_id: Uuid,
        notification_type: NotificationType,
        title: impl Into<String>,
        message: impl Into<String>,
        link_url: Option<String>,
        metadata: Option<serde_json::Value>,
    ) -> Result<Notification, ApiError> {
        let notification = Notification::new(NewNotification {
            user_id,
            notification_type,
            title: title.into(),
            message: message.into(),
            link_url,
            metadata,
        });

        let stored = self.store.insert_notification(notification).await?;
        debug!(
            notification_id = %stored.id,
            user_id = %user_id,
            notification_type = %notification_type,
            "Notification created"
        );
        Ok(stored)
    }

    pub async fn list(
        &self,
        user_id: Uuid,
        query: &ListNotificationsQuery,
    ) -> Result<NotificationListResponse, ApiError> {
        query.validate()?;

        let (notifications, total) = self
            .store
            .list_notifications(
                user_id,
                query.unread_only,
                query.offset(),
                query.per_page() as usize,
            )
            .await?;
        let unread_count = self.store.count_unread(user_id).await?;

        Ok(NotificationListResponse {
            notifications,
            total,
            unread_count,
            page: query.page(),
            per_page: query.per_page(),
        })
    }

    pub async fn unread_count(&self, user_id: Uuid) -> Result<i64, ApiError> {
        Ok(self.store.count_unread(user_id).await?)
    }

    /// Idempotent for already-read notifications; rejects other users'.
    pub async fn mark_read(&self, notification_id: Uuid, user_id: Uuid) -> Result<Notification, ApiError> {
        let notification = self
            .store
            .mark_read(notification_id, user_id, Utc::now())
            .await
            .map_err(|e| log_rejection(e, notification_id, user_id))?;
        debug!(notification_id = %notification_id, user_id = %user_id, "Notification read");
        Ok(notification)
    }

    pub async fn mark_all_read(&self, user_id: Uuid) -> Result<MarkAllReadResponse, ApiError> {
        let marked = self.store.mark_all_read(user_id, Utc::now()).await?;
        let unread_count = self.store.count_unread(user_id).await?;
        info!(user_id = %user_id, marked, "Marked all notifications read");
        Ok(MarkAllReadResponse {
            marked,
            unread_count,
        })
    }

    pub async fn delete(&self, notification_id: Uuid, user_id: Uuid) -> Result<(), ApiError> {
        self.store
            .delete_notification(notification_id, user_id)
            .await
            .map_err(|e| log_rejection(e, notification_id, user_id))?;
        debug!(notification_id = %notification_id, user_id = %user_id, "Notification deleted");
        Ok(())
    }
}

fn log_rejection(err: StoreError, notification_id: Uuid, user_id: Uuid) -> ApiError {
    if let StoreError::Forbidden(_) = err {
        warn!(
            notification_id = %notification_id,
            user_id = %user_id,
            "Rejected access to another user's notification"
        );
    }
    err.into()
}
