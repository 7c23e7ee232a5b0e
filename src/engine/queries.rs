use chrono::{NaiveDate, Utc};
use ulid::Ulid;

use crate::model::*;

use super::conflict::filter_available;
use super::eligibility::is_date_eligible;
use super::slots::generate_candidate_slots;
use super::{Engine, EngineError};

impl Engine {
    /// The bookable start times for (service, date): eligibility gate, then
    /// candidate generation, then the capacity filter against the day's
    /// authoritative booking set. An ineligible date (blocked, blacked out,
    /// closed, out of window) yields an empty list; an unknown or inactive
    /// service is an error.
    pub async fn list_slots(
        &self,
        service_id: Ulid,
        date: NaiveDate,
    ) -> Result<Vec<TimeOfDay>, EngineError> {
        let settings = self.settings.read().await.clone();
        let state = self
            .get_service(&service_id)
            .ok_or(EngineError::ServiceInactiveOrUnknown(service_id))?;
        let guard = state.read().await;
        if !guard.definition.active {
            return Err(EngineError::ServiceInactiveOrUnknown(service_id));
        }

        let now = Utc::now();
        if !is_date_eligible(date, &guard.definition, &settings, now) {
            return Ok(Vec::new());
        }
        let candidates = generate_candidate_slots(date, &guard.definition, &settings, now);
        Ok(filter_available(
            &candidates,
            &guard.definition,
            &settings,
            guard.on_date(date),
            None,
        ))
    }

    /// All bookings matching both contact fields — AND, not OR, and exact
    /// equality, so a partially matching field never leaks another
    /// customer's records. Includes cancelled/completed history.
    pub async fn list_for_customer(&self, email: &str, phone: &str) -> Vec<BookingRecord> {
        let mut out = Vec::new();
        let states: Vec<_> = self.services.iter().map(|e| e.value().clone()).collect();
        for state in states {
            let guard = state.read().await;
            out.extend(
                guard
                    .bookings
                    .iter()
                    .filter(|b| b.customer.email == email && b.customer.phone == phone)
                    .cloned(),
            );
        }
        out.sort_by_key(|b| (b.date, b.time, b.id));
        out
    }

    pub async fn list_services(&self) -> Vec<BookingService> {
        let states: Vec<_> = self.services.iter().map(|e| e.value().clone()).collect();
        let mut out = Vec::with_capacity(states.len());
        for state in states {
            out.push(state.read().await.definition.clone());
        }
        out
    }

    pub async fn current_settings(&self) -> BookingSettings {
        self.settings.read().await.clone()
    }
}
