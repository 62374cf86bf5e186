//! Delivery of bill notices to consumers.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::billing::BillNotice;
use crate::config::NotificationConfig;
use crate::models::Consumer;

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("Invalid recipient: {0}")]
    InvalidRecipient(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Send error: {0}")]
    SendFailed(String),
}

/// Channel a notice went out on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Email,
    Sms,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationReceipt {
    pub channels: Vec<Channel>,
}

#[async_trait]
pub trait NotificationGateway: Send + Sync {
    /// Send `notice` on every channel the consumer asked for.
    async fn notify(
        &self,
        consumer: &Consumer,
        notice: &BillNotice,
    ) -> Result<NotificationReceipt, NotificationError>;
}

#[derive(Debug, Serialize)]
struct EmailRequest<'a> {
    to: &'a str,
    subject: &'a str,
    body_text: &'a str,
}

#[derive(Debug, Serialize)]
struct SmsRequest<'a> {
    to: &'a str,
    body: &'a str,
}

/// Sends notices through the notification service's HTTP API.
pub struct HttpNotificationGateway {
    base_url: String,
    client: Client,
}

impl HttpNotificationGateway {
    pub fn new(config: &NotificationConfig) -> Result<Self, NotificationError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| NotificationError::Connection(format!("Failed to build client: {}", e)))?;

        Ok(Self {
            base_url: config.service_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    async fn post<T: Serialize + Sync>(&self, path: &str, body: &T) -> Result<(), NotificationError> {
        let response = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .json(body)
            .send()
            .await
            .map_err(|e| {
                NotificationError::Connection(format!("Failed to reach notification service: {}", e))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(NotificationError::SendFailed(format!(
                "Notification service returned {}: {}",
                status, body
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl NotificationGateway for HttpNotificationGateway {
    async fn notify(
        &self,
        consumer: &Consumer,
        notice: &BillNotice,
    ) -> Result<NotificationReceipt, NotificationError> {
        let preference = consumer.notification_preference;
        let mut channels = Vec::new();

        if preference.wants_email() {
            let to = consumer.email.as_deref().filter(|e| !e.is_empty()).ok_or_else(|| {
                NotificationError::InvalidRecipient(format!(
                    "Consumer {} has no email address",
                    consumer.consumer_id
                ))
            })?;
            let request = EmailRequest {
                to,
                subject: &notice.subject,
                body_text: &notice.email_body,
            };
            self.post("/notifications/email", &request).await?;
            channels.push(Channel::Email);
        }

        if preference.wants_sms() {
            let to = consumer.phone.as_deref().filter(|p| !p.is_empty()).ok_or_else(|| {
                NotificationError::InvalidRecipient(format!(
                    "Consumer {} has no phone number",
                    consumer.consumer_id
                ))
            })?;
            let request = SmsRequest {
                to,
                body: &notice.sms_body,
            };
            self.post("/notifications/sms", &request).await?;
            channels.push(Channel::Sms);
        }

        tracing::info!(
            consumer_id = %consumer.consumer_id,
            channels = ?channels,
            "Bill notice delivered"
        );

        Ok(NotificationReceipt { channels })
    }
}

/// Mock gateway for local runs and tests
#[derive(Default)]
pub struct MockNotificationGateway {
    send_count: AtomicU64,
    fail_all: AtomicBool,
    failing: Mutex<HashSet<Uuid>>,
}

impl MockNotificationGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn send_count(&self) -> u64 {
        self.send_count.load(Ordering::SeqCst)
    }

    pub fn fail_all(&self, fail: bool) {
        self.fail_all.store(fail, Ordering::SeqCst);
    }

    /// Make every notice to `consumer_id` fail.
    pub fn fail_for(&self, consumer_id: Uuid) {
        if let Ok(mut failing) = self.failing.lock() {
            failing.insert(consumer_id);
        }
    }

    fn should_fail(&self, consumer_id: Uuid) -> bool {
        self.fail_all.load(Ordering::SeqCst)
            || self
                .failing
                .lock()
                .map(|failing| failing.contains(&consumer_id))
                .unwrap_or(false)
    }
}

#[async_trait]
impl NotificationGateway for MockNotificationGateway {
    async fn notify(
        &self,
        consumer: &Consumer,
        notice: &BillNotice,
    ) -> Result<NotificationReceipt, NotificationError> {
        if self.should_fail(consumer.consumer_id) {
            return Err(NotificationError::SendFailed(
                "Mock notification failure".to_string(),
            ));
        }

        self.send_count.fetch_add(1, Ordering::SeqCst);

        tracing::info!(
            consumer_id = %consumer.consumer_id,
            subject = %notice.subject,
            "[MOCK] Bill notice would be sent"
        );

        let preference = consumer.notification_preference;
        let mut channels = Vec::new();
        if preference.wants_email() {
            channels.push(Channel::Email);
        }
        if preference.wants_sms() {
            channels.push(Channel::Sms);
        }
        Ok(NotificationReceipt { channels })
    }
}
