use std::collections::HashMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use shared_models::auth::SessionContext;

use crate::error::SchedulingError;
use crate::models::{
    AdjustmentOverride, BookingRecord, DateAvailabilityStatus, DateRange, DayAvailabilityLists, SlotDefinition,
    TemporaryAdjustment,
};
use crate::services::adjustment::AdjustmentLedger;
use crate::services::conflict::ConflictChecker;
use crate::services::gateway::CalendarGateway;
use crate::services::projector::AvailabilityProjector;
use crate::services::wire::StatusResponse;

type OwnerKey = (String, Option<String>);

#[derive(Default)]
struct CalendarStore {
    definitions: Vec<SlotDefinition>,
    ledgers: HashMap<(String, String), AdjustmentLedger>,
    bookings: HashMap<(OwnerKey, NaiveDate), Vec<BookingRecord>>,
}

impl CalendarStore {
    fn owned_definitions(&self, session: &SessionContext) -> Vec<SlotDefinition> {
        self.definitions
            .iter()
            .filter(|d| d.same_owner(&session.facility_id, session.doctor_id.as_deref()))
            .cloned()
            .collect()
    }

    fn owned_adjustments(&self, session: &SessionContext, range: &DateRange) -> Vec<TemporaryAdjustment> {
        let owned_slots: Vec<String> = self
            .owned_definitions(session)
            .into_iter()
            .filter_map(|d| d.slot_id)
            .collect();

        self.ledgers
            .iter()
            .filter(|((facility_id, slot_id), _)| {
                facility_id == &session.facility_id && owned_slots.contains(slot_id)
            })
            .flat_map(|(_, ledger)| ledger.iter())
            .filter(|adjustment| range.contains(adjustment.date))
            .cloned()
            .collect()
    }

    fn counts(&self, session: &SessionContext, range: &DateRange) -> HashMap<NaiveDate, u32> {
        let owner = owner_key(session);
        range
            .days()
            .filter_map(|date| {
                self.bookings
                    .get(&(owner.clone(), date))
                    .map(|records| (date, AvailabilityProjector::count_bookings(records)))
            })
            .collect()
    }
}

/// Process-local calendar backend. Conflict detection and the write happen
/// under one lock, so two racing creates cannot both succeed.
#[derive(Default)]
pub struct InMemoryCalendarGateway {
    store: RwLock<CalendarStore>,
}

impl InMemoryCalendarGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a booking made outside this service.
    pub async fn seed_booking(
        &self,
        facility_id: &str,
        doctor_id: Option<&str>,
        date: NaiveDate,
        booking: BookingRecord,
    ) {
        let key = ((facility_id.to_string(), doctor_id.map(str::to_string)), date);
        self.store.write().await.bookings.entry(key).or_default().push(booking);
    }
}

fn owner_key(session: &SessionContext) -> OwnerKey {
    (session.facility_id.clone(), session.doctor_id.clone())
}

#[async_trait]
impl CalendarGateway for InMemoryCalendarGateway {
    async fn list_day_availability(
        &self,
        session: &SessionContext,
        range: DateRange,
    ) -> Result<DayAvailabilityLists, SchedulingError> {
        let store = self.store.read().await;
        let definitions = store.owned_definitions(session);
        let adjustments = store.owned_adjustments(session, &range);
        let counts = store.counts(session, &range);

        let mut lists = DayAvailabilityLists::default();
        for (date, status) in
            AvailabilityProjector::classify_range(&range, &definitions, &adjustments, &counts)
        {
            match status {
                DateAvailabilityStatus::Available => lists.available.push(date),
                DateAvailabilityStatus::Partial => lists.partial.push(date),
                DateAvailabilityStatus::Full => lists.full.push(date),
                DateAvailabilityStatus::NotConfigured => {}
            }
        }
        Ok(lists)
    }

    async fn list_bookings(
        &self,
        session: &SessionContext,
        date: NaiveDate,
    ) -> Result<Vec<BookingRecord>, SchedulingError> {
        let store = self.store.read().await;
        Ok(store
            .bookings
            .get(&(owner_key(session), date))
            .cloned()
            .unwrap_or_default())
    }

    async fn booking_counts(
        &self,
        session: &SessionContext,
        range: DateRange,
    ) -> Result<HashMap<NaiveDate, u32>, SchedulingError> {
        Ok(self.store.read().await.counts(session, &range))
    }

    async fn check_conflict(
        &self,
        session: &SessionContext,
        range: DateRange,
        exclude_slot_id: Option<&str>,
    ) -> Result<StatusResponse, SchedulingError> {
        let store = self.store.read().await;
        let outcome = ConflictChecker::check_local(
            &store.definitions,
            &session.facility_id,
            session.doctor_id.as_deref(),
            &range,
            exclude_slot_id,
        );
        Ok(StatusResponse::from_outcome(&outcome))
    }

    async fn save_definition(
        &self,
        _session: &SessionContext,
        definition: &SlotDefinition,
        proceed_anyway: bool,
    ) -> Result<SlotDefinition, SchedulingError> {
        let mut store = self.store.write().await;

        let existing_index = match definition.slot_id.as_deref() {
            Some(slot_id) => {
                let index = store
                    .definitions
                    .iter()
                    .position(|d| {
                        d.slot_id.as_deref() == Some(slot_id) && d.facility_id == definition.facility_id
                    })
                    .ok_or_else(|| SchedulingError::NotFound(format!("Slot {} not found", slot_id)))?;

                let current = store.definitions[index].version;
                if current != definition.version {
                    return Err(SchedulingError::StaleWrite(format!(
                        "Slot {} is at version {:?}, write was based on {:?}",
                        slot_id, current, definition.version
                    )));
                }
                Some(index)
            }
            None => None,
        };

        let outcome = ConflictChecker::check_local(
            &store.definitions,
            &definition.facility_id,
            definition.doctor_id.as_deref(),
            &definition.effective_range,
            definition.slot_id.as_deref(),
        );
        ConflictChecker::ensure_committable(&outcome, proceed_anyway)?;

        let mut saved = definition.clone();
        match existing_index {
            Some(index) => {
                saved.version = Some(definition.version.unwrap_or(0) + 1);
                store.definitions[index] = saved.clone();
                debug!("Replaced slot {:?} at version {:?}", saved.slot_id, saved.version);
            }
            None => {
                let slot_id = Uuid::new_v4().to_string();
                saved.slot_id = Some(slot_id.clone());
                saved.version = Some(1);
                store.definitions.push(saved.clone());
                info!("Created slot {} for facility {}", slot_id, saved.facility_id);
            }
        }

        Ok(saved)
    }

    async fn fetch_definition(
        &self,
        session: &SessionContext,
        slot_id: &str,
    ) -> Result<SlotDefinition, SchedulingError> {
        let store = self.store.read().await;
        store
            .definitions
            .iter()
            .find(|d| d.slot_id.as_deref() == Some(slot_id) && d.facility_id == session.facility_id)
            .cloned()
            .ok_or_else(|| SchedulingError::NotFound(format!("Slot {} not found", slot_id)))
    }

    async fn list_definitions(
        &self,
        session: &SessionContext,
    ) -> Result<Vec<SlotDefinition>, SchedulingError> {
        Ok(self.store.read().await.owned_definitions(session))
    }

    async fn list_adjustments(
        &self,
        session: &SessionContext,
        range: DateRange,
    ) -> Result<Vec<TemporaryAdjustment>, SchedulingError> {
        Ok(self.store.read().await.owned_adjustments(session, &range))
    }

    async fn save_adjustment(
        &self,
        _session: &SessionContext,
        adjustment: &TemporaryAdjustment,
    ) -> Result<TemporaryAdjustment, SchedulingError> {
        let mut store = self.store.write().await;

        let parent = store
            .definitions
            .iter()
            .find(|d| {
                d.slot_id.as_deref() == Some(adjustment.slot_id.as_str())
                    && d.facility_id == adjustment.facility_id
            })
            .ok_or_else(|| SchedulingError::NotFound(format!("Slot {} not found", adjustment.slot_id)))?;
        if !parent.effective_range.contains(adjustment.date) {
            return Err(SchedulingError::NotFound(format!(
                "Slot {} has no schedule on {}",
                adjustment.slot_id, adjustment.date
            )));
        }

        let key = (adjustment.facility_id.clone(), adjustment.slot_id.clone());
        let ledger = store
            .ledgers
            .entry(key)
            .or_insert_with(|| AdjustmentLedger::new(&adjustment.facility_id, &adjustment.slot_id));

        ledger.apply(
            adjustment.date,
            AdjustmentOverride {
                windows: adjustment.windows.clone(),
                capacity: adjustment.capacity,
                closed: adjustment.closed,
            },
        )
    }

    async fn delete_adjustment(
        &self,
        session: &SessionContext,
        slot_id: &str,
        date: NaiveDate,
    ) -> Result<(), SchedulingError> {
        let mut store = self.store.write().await;
        let ledger = store
            .ledgers
            .get_mut(&(session.facility_id.clone(), slot_id.to_string()))
            .ok_or_else(|| {
                SchedulingError::NotFound(format!("No adjustment for slot {} on {}", slot_id, date))
            })?;
        ledger.revert(date)?;
        Ok(())
    }
}
