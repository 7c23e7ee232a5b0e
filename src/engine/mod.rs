mod conflict;
mod eligibility;
mod error;
mod mutations;
mod queries;
mod slots;

pub use conflict::{filter_available, occupied_span, slot_capacity};
pub use eligibility::{earliest_start, in_service_area, is_date_eligible, validate_intake};
pub use error::EngineError;
pub use slots::generate_candidate_slots;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, RwLock};
use ulid::Ulid;

use crate::model::*;
use crate::notify::NotifyHub;
use crate::wal::Wal;

pub type SharedServiceState = Arc<RwLock<ServiceState>>;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond to all senders.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];

                // Drain all immediately available appends
                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => {
                            batch.push((event, response));
                        }
                        Ok(other) => {
                            // Flush current batch first, then handle the non-append command
                            flush_and_respond(&mut wal, &mut batch);
                            handle_non_append(&mut wal, other);
                            break;
                        }
                        Err(_) => break, // channel empty — flush batch
                    }
                }

                if !batch.is_empty() {
                    flush_and_respond(&mut wal, &mut batch);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

fn flush_and_respond(wal: &mut Wal, batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    respond_batch(batch, &result);
}

fn flush_batch(
    wal: &mut Wal,
    batch: &mut [(Event, oneshot::Sender<io::Result<()>>)],
) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch.iter() {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Always flush — even on append error — so partially buffered bytes
    // don't leak into the next batch (callers were told this batch failed).
    let flush_err = wal.flush_sync().err();
    if let Some(e) = append_err {
        return Err(e);
    }
    if let Some(e) = flush_err {
        return Err(e);
    }
    Ok(())
}

fn respond_batch(batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>, result: &io::Result<()>) {
    for (_, tx) in batch.drain(..) {
        let r = match result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!(),
    }
}

// ── Engine ───────────────────────────────────────────────

/// One tenant's booking engine: settings, services, and their booking
/// records, rebuilt from the tenant's WAL at load.
pub struct Engine {
    site_id: String,
    pub settings: RwLock<BookingSettings>,
    pub services: DashMap<Ulid, SharedServiceState>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    pub notify: Arc<NotifyHub>,
    /// Reverse lookup: booking id → service id.
    pub(super) booking_to_service: DashMap<Ulid, Ulid>,
}

/// Apply an event directly to a ServiceState (no locking — caller holds the
/// lock).
fn apply_to_service(state: &mut ServiceState, event: &Event, index: &DashMap<Ulid, Ulid>) {
    match event {
        Event::ServiceUpserted { service } => {
            state.definition = service.clone();
        }
        Event::BookingCreated { record } => {
            index.insert(record.id, record.service_id);
            state.insert_booking(record.clone());
        }
        Event::BookingRescheduled {
            id,
            date,
            time,
            updated_at,
            ..
        } => {
            // Re-sort under the new (date, time) key.
            if let Some(mut record) = state.remove_booking(*id) {
                record.date = *date;
                record.time = *time;
                record.updated_at = *updated_at;
                state.insert_booking(record);
            }
        }
        Event::BookingCancelled { id, updated_at, .. } => {
            if let Some(record) = state.booking_mut(id) {
                record.status = BookingStatus::Cancelled;
                record.updated_at = *updated_at;
            }
        }
        Event::BookingCompleted { id, updated_at, .. } => {
            if let Some(record) = state.booking_mut(id) {
                record.status = BookingStatus::Completed;
                record.updated_at = *updated_at;
            }
        }
        // Settings and service create/remove are handled at the Engine level.
        Event::SettingsUpdated { .. } | Event::ServiceRemoved { .. } => {}
    }
}

impl Engine {
    pub fn new(site_id: String, wal_path: PathBuf, notify: Arc<NotifyHub>) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            site_id,
            settings: RwLock::new(BookingSettings::default()),
            services: DashMap::new(),
            wal_tx,
            notify,
            booking_to_service: DashMap::new(),
        };

        // Replay events — we're the sole owner of these locks, so try_read/
        // try_write always succeed instantly. Never use blocking_read/
        // blocking_write here because this may run inside an async context
        // (lazy tenant creation).
        for event in &events {
            match event {
                Event::SettingsUpdated { settings } => {
                    *engine
                        .settings
                        .try_write()
                        .expect("replay: uncontended write") = settings.clone();
                }
                Event::ServiceUpserted { service } => {
                    // Take the Arc out of the map entry before touching the
                    // map again.
                    let existing = engine.get_service(&service.id);
                    match existing {
                        Some(state) => {
                            let mut guard =
                                state.try_write().expect("replay: uncontended write");
                            apply_to_service(&mut guard, event, &engine.booking_to_service);
                        }
                        None => {
                            engine.services.insert(
                                service.id,
                                Arc::new(RwLock::new(ServiceState::new(service.clone()))),
                            );
                        }
                    }
                }
                Event::ServiceRemoved { id } => {
                    engine.services.remove(id);
                    engine.booking_to_service.retain(|_, sid| sid != id);
                }
                other => {
                    if let Some(service_id) = event_service_id(other)
                        && let Some(state) = engine.get_service(&service_id)
                    {
                        let mut guard = state.try_write().expect("replay: uncontended write");
                        apply_to_service(&mut guard, other, &engine.booking_to_service);
                    }
                }
            }
        }

        Ok(engine)
    }

    pub fn site_id(&self) -> &str {
        &self.site_id
    }

    /// Write event to WAL via the background group-commit writer.
    async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub fn get_service(&self, id: &Ulid) -> Option<SharedServiceState> {
        self.services.get(id).map(|e| e.value().clone())
    }

    pub fn get_service_for_booking(&self, booking_id: &Ulid) -> Option<Ulid> {
        self.booking_to_service.get(booking_id).map(|e| *e.value())
    }

    /// WAL-append + apply in one call; the event is durable before the
    /// in-memory state changes.
    pub(super) async fn persist_and_apply(
        &self,
        state: &mut ServiceState,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        apply_to_service(state, event, &self.booking_to_service);
        Ok(())
    }

    /// Lookup booking → service, get the service, acquire its write lock.
    pub(super) async fn resolve_booking_write(
        &self,
        booking_id: &Ulid,
    ) -> Result<(Ulid, tokio::sync::OwnedRwLockWriteGuard<ServiceState>), EngineError> {
        let service_id = self
            .get_service_for_booking(booking_id)
            .ok_or(EngineError::NotFound(*booking_id))?;
        let state = self
            .get_service(&service_id)
            .ok_or(EngineError::NotFound(*booking_id))?;
        let guard = state.write_owned().await;
        Ok((service_id, guard))
    }
}

/// Extract the service id from a booking-scoped event.
fn event_service_id(event: &Event) -> Option<Ulid> {
    match event {
        Event::BookingCreated { record } => Some(record.service_id),
        Event::BookingRescheduled { service_id, .. }
        | Event::BookingCancelled { service_id, .. }
        | Event::BookingCompleted { service_id, .. } => Some(*service_id),
        Event::ServiceUpserted { service } => Some(service.id),
        Event::SettingsUpdated { .. } | Event::ServiceRemoved { .. } => None,
    }
}
