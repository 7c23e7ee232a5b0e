use chrono::{NaiveDate, Utc};
use tokio::sync::oneshot;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::notify::{Notice, NoticeKind};
use crate::observability;

use super::conflict::{filter_available, now_ms};
use super::eligibility::{in_service_area, is_date_eligible, validate_intake};
use super::slots::generate_candidate_slots;
use super::{Engine, EngineError, WalCommand};

impl Engine {
    /// Replace the tenant's scheduling rules.
    pub async fn update_settings(&self, settings: BookingSettings) -> Result<(), EngineError> {
        settings.validate().map_err(EngineError::Validation)?;
        let mut guard = self.settings.write().await;
        self.wal_append(&Event::SettingsUpdated {
            settings: settings.clone(),
        })
        .await?;
        *guard = settings;
        Ok(())
    }

    /// Create or replace a service definition. Existing bookings keep their
    /// snapshotted durations.
    pub async fn upsert_service(&self, service: BookingService) -> Result<(), EngineError> {
        service.validate().map_err(EngineError::Validation)?;

        if let Some(state) = self.get_service(&service.id) {
            let mut guard = state.write().await;
            let event = Event::ServiceUpserted { service };
            return self.persist_and_apply(&mut guard, &event).await;
        }

        if self.services.len() >= MAX_SERVICES_PER_TENANT {
            return Err(EngineError::LimitExceeded("too many services"));
        }
        let event = Event::ServiceUpserted {
            service: service.clone(),
        };
        self.wal_append(&event).await?;
        self.services.insert(
            service.id,
            std::sync::Arc::new(tokio::sync::RwLock::new(ServiceState::new(service))),
        );
        Ok(())
    }

    /// Remove a service definition. Refused while booking records exist —
    /// history is an audit trail; deactivate instead.
    pub async fn remove_service(&self, id: Ulid) -> Result<(), EngineError> {
        let state = self
            .get_service(&id)
            .ok_or(EngineError::ServiceInactiveOrUnknown(id))?;
        let guard = state.read().await;
        if !guard.bookings.is_empty() {
            return Err(EngineError::HasBookings(id));
        }
        drop(guard);

        self.wal_append(&Event::ServiceRemoved { id }).await?;
        self.services.remove(&id);
        Ok(())
    }

    /// Create a booking. The whole listing pipeline is re-run server-side
    /// under the service's write lock — a client-cached slot list is never
    /// trusted — then the event is made durable and applied. Holding the
    /// write lock across revalidate + append + apply serializes writers per
    /// (tenant, service), so of two racing requests for the last opening of
    /// a slot, exactly one succeeds and the other gets `SlotUnavailable`.
    pub async fn create_booking(
        &self,
        input: CreateBooking,
    ) -> Result<BookingRecord, EngineError> {
        if self.booking_to_service.contains_key(&input.id) {
            return Err(EngineError::AlreadyExists(input.id));
        }
        if let Some(notes) = &input.notes
            && notes.len() > MAX_NOTES_LEN
        {
            return Err(EngineError::LimitExceeded("notes too long"));
        }

        let settings = self.settings.read().await.clone();
        let state = self
            .get_service(&input.service_id)
            .ok_or(EngineError::ServiceInactiveOrUnknown(input.service_id))?;
        let mut guard = state.write_owned().await;
        if !guard.definition.active {
            return Err(EngineError::ServiceInactiveOrUnknown(input.service_id));
        }
        if guard.bookings.len() >= MAX_BOOKINGS_PER_SERVICE {
            return Err(EngineError::LimitExceeded("too many bookings on service"));
        }

        validate_intake(&guard.definition, &settings, &input.customer, &input.details)?;
        if let Some(zip) = input.details.zip_code()
            && !in_service_area(zip, &settings)
        {
            return Err(EngineError::Validation(
                "address is outside the service area".into(),
            ));
        }

        let now = Utc::now();
        if !is_date_eligible(input.date, &guard.definition, &settings, now) {
            return Err(EngineError::DateOutOfRange(input.date));
        }
        let candidates = generate_candidate_slots(input.date, &guard.definition, &settings, now);
        let open = filter_available(
            &candidates,
            &guard.definition,
            &settings,
            guard.on_date(input.date),
            None,
        );
        if !open.contains(&input.time) {
            metrics::counter!(observability::SLOT_CONFLICTS_TOTAL).increment(1);
            return Err(EngineError::SlotUnavailable {
                date: input.date,
                time: input.time,
            });
        }

        let stamp = now_ms();
        let record = BookingRecord {
            id: input.id,
            site_id: self.site_id.clone(),
            service_id: input.service_id,
            date: input.date,
            time: input.time,
            duration_minutes: guard.definition.duration_minutes,
            customer: input.customer,
            details: input.details,
            status: BookingStatus::Confirmed,
            notes: input.notes,
            created_at: stamp,
            updated_at: stamp,
        };
        let event = Event::BookingCreated {
            record: record.clone(),
        };
        self.persist_and_apply(&mut guard, &event).await?;

        metrics::counter!(observability::BOOKINGS_CREATED_TOTAL).increment(1);
        // Delivery is a collaborator concern; the booking is already durable.
        self.notify
            .send(Notice::booking(NoticeKind::Confirmed, &record, &guard.definition.name));
        Ok(record)
    }

    /// Move a booking to a new slot in place. The new slot runs the same
    /// eligibility + capacity pipeline, with the booking's own prior
    /// occupancy excluded from the count so moving within a full slot's
    /// footprint (or back to it) works.
    pub async fn reschedule_booking(
        &self,
        id: Ulid,
        identity_email: &str,
        new_date: NaiveDate,
        new_time: TimeOfDay,
    ) -> Result<BookingRecord, EngineError> {
        let (_, mut guard) = self.resolve_booking_write(&id).await?;
        let record = guard.booking(&id).ok_or(EngineError::NotFound(id))?;
        if record.customer.email != identity_email {
            return Err(EngineError::Forbidden(id));
        }
        if record.status.is_terminal() {
            return Err(EngineError::Validation(format!(
                "cannot reschedule a {} booking",
                record.status.as_str()
            )));
        }
        if !guard.definition.active {
            return Err(EngineError::ServiceInactiveOrUnknown(record.service_id));
        }
        let mut updated = record.clone();

        let settings = self.settings.read().await.clone();
        let now = Utc::now();
        if !is_date_eligible(new_date, &guard.definition, &settings, now) {
            return Err(EngineError::DateOutOfRange(new_date));
        }
        let candidates = generate_candidate_slots(new_date, &guard.definition, &settings, now);
        let open = filter_available(
            &candidates,
            &guard.definition,
            &settings,
            guard.on_date(new_date),
            Some(id),
        );
        if !open.contains(&new_time) {
            metrics::counter!(observability::SLOT_CONFLICTS_TOTAL).increment(1);
            return Err(EngineError::SlotUnavailable {
                date: new_date,
                time: new_time,
            });
        }

        let stamp = now_ms();
        let event = Event::BookingRescheduled {
            id,
            service_id: updated.service_id,
            date: new_date,
            time: new_time,
            updated_at: stamp,
        };
        self.persist_and_apply(&mut guard, &event).await?;

        updated.date = new_date;
        updated.time = new_time;
        updated.updated_at = stamp;
        self.notify
            .send(Notice::booking(NoticeKind::Rescheduled, &updated, &guard.definition.name));
        Ok(updated)
    }

    /// Flip a booking to `cancelled`, freeing its slot. Idempotent: a second
    /// cancel of the same booking is a no-op success. The record stays on
    /// file.
    pub async fn cancel_booking(&self, id: Ulid, identity_email: &str) -> Result<(), EngineError> {
        let (_, mut guard) = self.resolve_booking_write(&id).await?;
        let record = guard.booking(&id).ok_or(EngineError::NotFound(id))?;
        if record.customer.email != identity_email {
            return Err(EngineError::Forbidden(id));
        }
        match record.status {
            BookingStatus::Cancelled => return Ok(()),
            BookingStatus::Completed => {
                return Err(EngineError::Validation(
                    "cannot cancel a completed booking".into(),
                ));
            }
            BookingStatus::Confirmed => {}
        }
        let notice = Notice::booking(NoticeKind::Cancelled, record, &guard.definition.name);

        let event = Event::BookingCancelled {
            id,
            service_id: notice.service_id,
            updated_at: now_ms(),
        };
        self.persist_and_apply(&mut guard, &event).await?;

        metrics::counter!(observability::BOOKINGS_CANCELLED_TOTAL).increment(1);
        self.notify.send(notice);
        Ok(())
    }

    /// Operator-side completion. No identity proof — this comes from the
    /// admin surface, not the customer. Idempotent on completed bookings.
    pub async fn complete_booking(&self, id: Ulid) -> Result<(), EngineError> {
        let (service_id, mut guard) = self.resolve_booking_write(&id).await?;
        let record = guard.booking(&id).ok_or(EngineError::NotFound(id))?;
        match record.status {
            BookingStatus::Completed => return Ok(()),
            BookingStatus::Cancelled => {
                return Err(EngineError::Validation(
                    "cannot complete a cancelled booking".into(),
                ));
            }
            BookingStatus::Confirmed => {}
        }

        let event = Event::BookingCompleted {
            id,
            service_id,
            updated_at: now_ms(),
        };
        self.persist_and_apply(&mut guard, &event).await
    }

    /// Compact the WAL by rewriting it with only the events needed to
    /// recreate the current state: settings, service definitions, and each
    /// booking record as it stands (status flips already folded in).
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let mut events = Vec::new();
        events.push(Event::SettingsUpdated {
            settings: self
                .settings
                .try_read()
                .map_err(|_| EngineError::WalError("settings lock contended".into()))?
                .clone(),
        });

        let service_ids: Vec<Ulid> = self.services.iter().map(|e| *e.key()).collect();
        for id in service_ids {
            let Some(state) = self.get_service(&id) else {
                continue;
            };
            let guard = state.read().await;
            events.push(Event::ServiceUpserted {
                service: guard.definition.clone(),
            });
            for record in &guard.bookings {
                events.push(Event::BookingCreated {
                    record: record.clone(),
                });
            }
        }

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact {
                events,
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
