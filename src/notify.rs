use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use ulid::Ulid;

use crate::model::{BookingRecord, TimeOfDay};
use crate::observability;

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    Confirmed,
    Rescheduled,
    Cancelled,
}

/// A delivery request handed to the notification collaborator after a booking
/// mutation commits: everything an email/SMS template needs, nothing more.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notice {
    pub kind: NoticeKind,
    pub booking_id: Ulid,
    pub service_id: Ulid,
    pub service_name: String,
    pub date: NaiveDate,
    pub time: TimeOfDay,
    pub customer_name: String,
    pub email: String,
    pub phone: String,
}

impl Notice {
    pub fn booking(kind: NoticeKind, record: &BookingRecord, service_name: &str) -> Self {
        Self {
            kind,
            booking_id: record.id,
            service_id: record.service_id,
            service_name: service_name.to_string(),
            date: record.date,
            time: record.time,
            customer_name: record.customer.name.clone(),
            email: record.customer.email.clone(),
            phone: record.customer.phone.clone(),
        }
    }
}

/// Per-tenant broadcast hub feeding the notification dispatcher.
pub struct NotifyHub {
    tx: broadcast::Sender<Notice>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.tx.subscribe()
    }

    /// Publish a notice. No-op if nobody is listening.
    pub fn send(&self, notice: Notice) {
        let _ = self.tx.send(notice);
    }
}

/// The email/SMS collaborator seam. Real deployments put a provider client
/// behind this; the engine only ever hands over a `Notice`.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, notice: &Notice) -> Result<(), String>;
}

/// Default sink: writes the delivery request to the structured log.
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn deliver(&self, notice: &Notice) -> Result<(), String> {
        tracing::info!(
            booking = %notice.booking_id,
            service = %notice.service_name,
            kind = ?notice.kind,
            email = %notice.email,
            "notification request"
        );
        Ok(())
    }
}

/// Per-tenant dispatcher: forwards notices to the sink. Delivery failures are
/// logged and counted, never surfaced to the booking path — the record is
/// already durable by the time a notice exists.
pub async fn run_dispatcher(
    hub: Arc<NotifyHub>,
    sink: Arc<dyn NotificationSink>,
    shutdown: CancellationToken,
) {
    let mut rx = hub.subscribe();
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            msg = rx.recv() => match msg {
                Ok(notice) => match sink.deliver(&notice).await {
                    Ok(()) => {
                        metrics::counter!(observability::NOTIFICATIONS_SENT_TOTAL).increment(1);
                    }
                    Err(e) => {
                        metrics::counter!(observability::NOTIFICATIONS_FAILED_TOTAL).increment(1);
                        tracing::warn!(
                            booking = %notice.booking_id,
                            "notification delivery failed: {e}"
                        );
                    }
                },
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!("notification dispatcher lagged, dropped {n} notices");
                }
                Err(broadcast::error::RecvError::Closed) => return,
            },
        }
    }
}
