#![allow(async_fn_in_trait)]

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum EmailError {
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Email webhook rejected event: HTTP {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// Events mailed out after a completion has been committed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EmailEvent {
    TournamentCompleted {
        user_id: Uuid,
        tournament_id: Uuid,
        tournament_name: String,
        rank: usize,
    },
    CertificateReady {
        user_id: Uuid,
        tournament_id: Uuid,
        tournament_name: String,
    },
}

impl EmailEvent {
    pub fn user_id(&self) -> Uuid {
        match self {
            EmailEvent::TournamentCompleted { user_id, .. }
            | EmailEvent::CertificateReady { user_id, .. } => *user_id,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            EmailEvent::TournamentCompleted { .. } => "tournament_completed",
            EmailEvent::CertificateReady { .. } => "certificate_ready",
        }
    }
}

pub trait EmailDispatcher {
    async fn send(&self, event: &EmailEvent) -> Result<(), EmailError>;
}

/// Posts each event as JSON to an external mailer.
#[derive(Debug, Clone)]
pub struct WebhookEmailDispatcher {
    client: reqwest::Client,
    url: String,
}

impl WebhookEmailDispatcher {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

impl EmailDispatcher for WebhookEmailDispatcher {
    async fn send(&self, event: &EmailEvent) -> Result<(), EmailError> {
        let response = self.client.post(&self.url).json(event).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EmailError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

/// Used when no mailer is configured.
#[derive(Debug, Clone, Default)]
pub struct LogEmailDispatcher;

impl EmailDispatcher for LogEmailDispatcher {
    async fn send(&self, event: &EmailEvent) -> Result<(), EmailError> {
        info!(user_id = %event.user_id(), event = event.kind(), "Email dispatch skipped, no mailer configured");
        Ok(())
    }
}

/// Dispatcher picked from configuration at startup.
#[derive(Debug, Clone)]
pub enum EmailChannel {
    Webhook(WebhookEmailDispatcher),
    Log(LogEmailDispatcher),
}

impl EmailChannel {
    pub fn from_webhook_url(url: Option<&str>) -> Self {
        match url {
            Some(url) => EmailChannel::Webhook(WebhookEmailDispatcher::new(url)),
            None => EmailChannel::Log(LogEmailDispatcher),
        }
    }
}

impl EmailDispatcher for EmailChannel {
    async fn send(&self, event: &EmailEvent) -> Result<(), EmailError> {
        match self {
            EmailChannel::Webhook(d) => d.send(event).await,
            EmailChannel::Log(d) => d.send(event).await,
        }
    }
}

/// Sends every event, logging and swallowing failures. Returns how many
/// were delivered.
pub async fn dispatch_best_effort<E: EmailDispatcher>(dispatcher: &E, events: &[EmailEvent]) -> usize {
    let mut delivered = 0;
    for event in events {
        match dispatcher.send(event).await {
            Ok(()) => delivered += 1,
            Err(e) => warn!(
                user_id = %event.user_id(),
                event = event.kind(),
                error = %e,
                "Failed to send email"
            ),
        }
    }
    delivered
}
