use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{KindName, Owner, OwnerId, Transaction};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationEvent {
    PaymentRequested,
    PaymentReceived,
    TransactionMatched,
    StatusChanged,
}

impl NotificationEvent {
    pub fn title(&self) -> &'static str {
        match self {
            NotificationEvent::PaymentRequested => "payment requested",
            NotificationEvent::PaymentReceived => "payment received",
            NotificationEvent::TransactionMatched => "you have been matched to a transaction",
            NotificationEvent::StatusChanged => "transaction status updated",
        }
    }
}

/// Record of a domain event for one recipient. Created as a side effect and
/// never fed back into transaction state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub recipient: OwnerId,
    pub event: NotificationEvent,
    pub title: String,
    pub message: String,
    pub info_type: KindName,
    pub device_token: Option<String>,
    /// Snapshot of the triggering transaction.
    pub info_data: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(
        recipient: &Owner,
        event: NotificationEvent,
        message: String,
        snapshot: &Transaction,
    ) -> Self {
        Self {
            id: ulid::Ulid::new().to_string(),
            recipient: recipient.id.clone(),
            event,
            title: event.title().to_string(),
            message,
            info_type: snapshot.kind_name(),
            device_token: recipient.device_token.clone(),
            info_data: serde_json::to_value(snapshot).unwrap_or(serde_json::Value::Null),
            created_at: Utc::now(),
        }
    }
}
