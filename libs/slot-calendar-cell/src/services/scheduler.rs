use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use tracing::{debug, info};

use shared_config::AppConfig;
use shared_models::auth::SessionContext;

use crate::error::SchedulingError;
use crate::models::{
    AdjustmentOverride, BookingSlotView, BuildSlotRequest, ConflictCheckOutcome,
    DateAvailabilityStatus, DateRange, SlotDefinition, TemporaryAdjustment,
};
use crate::services::adjustment::AdjustmentLedger;
use crate::services::builder::SlotDefinitionBuilder;
use crate::services::cache::{MonthProjection, ProjectionCache, ProjectionKey};
use crate::services::conflict::ConflictChecker;
use crate::services::gateway::{CalendarGateway, HttpCalendarGateway};
use crate::services::memory::InMemoryCalendarGateway;
use crate::services::projector::AvailabilityProjector;

/// Longest range one calendar projection may span.
const MAX_CALENDAR_DAYS: i64 = 366;

pub struct SlotSchedulingService {
    gateway: Arc<dyn CalendarGateway>,
    cache: ProjectionCache,
}

impl SlotSchedulingService {
    pub fn new(config: &AppConfig) -> Self {
        let gateway: Arc<dyn CalendarGateway> = if config.is_calendar_service_configured() {
            Arc::new(HttpCalendarGateway::new(config))
        } else {
            info!("No calendar service configured, keeping schedules in memory");
            Arc::new(InMemoryCalendarGateway::new())
        };
        Self::with_gateway(gateway, Duration::from_secs(config.projection_cache_ttl_secs))
    }

    pub fn with_gateway(gateway: Arc<dyn CalendarGateway>, cache_ttl: Duration) -> Self {
        Self {
            gateway,
            cache: ProjectionCache::new(cache_ttl),
        }
    }

    /// Coarse pre-editor check of a proposed effective range.
    pub async fn check_conflict(
        &self,
        session: &SessionContext,
        range: DateRange,
        exclude_slot_id: Option<&str>,
    ) -> Result<ConflictCheckOutcome, SchedulingError> {
        debug!("Checking {:?} for facility {}", range, session.facility_id);
        range.validate()?;

        let response = self.gateway.check_conflict(session, range, exclude_slot_id).await?;
        Ok(ConflictChecker::interpret(&response))
    }

    pub async fn create_definition(
        &self,
        session: &SessionContext,
        request: &BuildSlotRequest,
        proceed_anyway: bool,
    ) -> Result<SlotDefinition, SchedulingError> {
        debug!("Creating slot definition for facility {}", session.facility_id);

        let request = with_session_doctor(session, request);
        let definition = SlotDefinitionBuilder::build(&session.facility_id, &request)?;

        let saved = self
            .gateway
            .save_definition(session, &definition, proceed_anyway)
            .await?;
        self.cache.invalidate_facility(&session.facility_id).await;

        info!("Slot {:?} created for facility {}", saved.slot_id, saved.facility_id);
        Ok(saved)
    }

    /// Full replacement. `version` must be the token the operator loaded;
    /// the gateway rejects it if someone else wrote in between.
    pub async fn replace_definition(
        &self,
        session: &SessionContext,
        slot_id: &str,
        request: &BuildSlotRequest,
        version: Option<u64>,
        proceed_anyway: bool,
    ) -> Result<SlotDefinition, SchedulingError> {
        debug!("Replacing slot {} for facility {}", slot_id, session.facility_id);

        let version = version.ok_or_else(|| {
            SchedulingError::Validation("Version is required to replace a slot".to_string())
        })?;
        let request = with_session_doctor(session, request);
        let draft = SlotDefinitionBuilder::build(&session.facility_id, &request)?;

        let mut existing = self.fetch_definition(session, slot_id).await?;
        if draft.doctor_id != existing.doctor_id {
            return Err(SchedulingError::Validation(
                "A slot cannot be moved to another doctor".to_string(),
            ));
        }
        existing.version = Some(version);
        let definition = SlotDefinitionBuilder::rebuild(&existing, draft);

        let saved = self
            .gateway
            .save_definition(session, &definition, proceed_anyway)
            .await?;
        self.cache.invalidate_facility(&session.facility_id).await;
        Ok(saved)
    }

    /// A slot is only visible to sessions of its own facility and doctor.
    pub async fn fetch_definition(
        &self,
        session: &SessionContext,
        slot_id: &str,
    ) -> Result<SlotDefinition, SchedulingError> {
        let definition = self.gateway.fetch_definition(session, slot_id).await?;
        if !definition.same_owner(&session.facility_id, session.doctor_id.as_deref()) {
            debug!(
                "Slot {} belongs to {}/{:?}, not to this session",
                slot_id, definition.facility_id, definition.doctor_id
            );
            return Err(SchedulingError::NotFound(format!(
                "Slot {} not found for facility {}",
                slot_id, session.facility_id
            )));
        }
        Ok(definition)
    }

    /// Colours every date of `range` from definitions, adjustments and
    /// booking counts.
    pub async fn calendar(
        &self,
        session: &SessionContext,
        range: DateRange,
    ) -> Result<MonthProjection, SchedulingError> {
        validate_calendar_range(&range)?;

        let key = ProjectionKey::new(&session.facility_id, session.doctor_id.as_deref(), range);
        if let Some(cached) = self.cache.get(&key).await {
            return Ok(cached);
        }
        let generation = self.cache.generation(&session.facility_id).await;

        let (definitions, adjustments, counts) = futures::try_join!(
            self.gateway.list_definitions(session),
            self.gateway.list_adjustments(session, range),
            self.gateway.booking_counts(session, range),
        )?;

        let statuses =
            AvailabilityProjector::classify_range(&range, &definitions, &adjustments, &counts);
        self.cache.put(key, statuses.clone(), generation).await;
        Ok(statuses)
    }

    /// Calendar colouring as reported by the calendar service's own day
    /// lists, without local recomputation.
    pub async fn remote_calendar(
        &self,
        session: &SessionContext,
        range: DateRange,
    ) -> Result<BTreeMap<NaiveDate, DateAvailabilityStatus>, SchedulingError> {
        validate_calendar_range(&range)?;

        let lists = self.gateway.list_day_availability(session, range).await?;
        Ok(range.days().map(|date| (date, lists.status_of(date))).collect())
    }

    pub async fn day_view(
        &self,
        session: &SessionContext,
        date: NaiveDate,
    ) -> Result<BookingSlotView, SchedulingError> {
        debug!("Expanding {} for facility {}", date, session.facility_id);
        let day = DateRange { start: date, end: date };

        let (definitions, adjustments, bookings) = futures::try_join!(
            self.gateway.list_definitions(session),
            self.gateway.list_adjustments(session, day),
            self.gateway.list_bookings(session, date),
        )?;

        let plan = AvailabilityProjector::effective_plan(date, &definitions, &adjustments)
            .ok_or_else(|| {
                SchedulingError::NotFound(format!("No schedule covers {} for this facility", date))
            })?;
        Ok(AvailabilityProjector::expand_plan(&plan, &bookings))
    }

    pub async fn apply_adjustment(
        &self,
        session: &SessionContext,
        slot_id: &str,
        date: NaiveDate,
        change: AdjustmentOverride,
    ) -> Result<TemporaryAdjustment, SchedulingError> {
        debug!("Adjusting slot {} on {}", slot_id, date);

        let adjustment = AdjustmentLedger::prepare(&session.facility_id, slot_id, date, change)?;

        let parent = self.fetch_definition(session, slot_id).await?;
        if !parent.effective_range.contains(date) {
            return Err(SchedulingError::NotFound(format!(
                "Slot {} has no schedule on {}",
                slot_id, date
            )));
        }

        let saved = self.gateway.save_adjustment(session, &adjustment).await?;
        self.cache.invalidate_facility(&session.facility_id).await;
        Ok(saved)
    }

    pub async fn revert_adjustment(
        &self,
        session: &SessionContext,
        slot_id: &str,
        date: NaiveDate,
    ) -> Result<(), SchedulingError> {
        debug!("Reverting adjustment of slot {} on {}", slot_id, date);

        self.fetch_definition(session, slot_id).await?;
        self.gateway.delete_adjustment(session, slot_id, date).await?;
        self.cache.invalidate_facility(&session.facility_id).await;
        Ok(())
    }
}

fn with_session_doctor(session: &SessionContext, request: &BuildSlotRequest) -> BuildSlotRequest {
    let mut request = request.clone();
    if request.doctor_id.as_deref().map_or(true, |id| id.trim().is_empty()) {
        request.doctor_id = session.doctor_id.clone();
    }
    request
}

fn validate_calendar_range(range: &DateRange) -> Result<(), SchedulingError> {
    range.validate()?;
    if range.len_days() > MAX_CALENDAR_DAYS {
        return Err(SchedulingError::Validation(format!(
            "Calendar range may span at most {} days",
            MAX_CALENDAR_DAYS
        )));
    }
    Ok(())
}
