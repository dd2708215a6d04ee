use std::collections::HashMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Method;
use serde_json::Value;
use tracing::{debug, error, warn};

use shared_calendar_service::CalendarServiceClient;
use shared_config::AppConfig;
use shared_models::auth::SessionContext;

use crate::error::SchedulingError;
use crate::models::{
    BookingRecord, DateRange, DayAvailabilityLists, SlotDefinition, TemporaryAdjustment,
};
use crate::services::wire::{
    self, AdjustmentWire, BookingCountWire, BookingRecordWire, ConflictCheckRequest,
    SlotDaysResponse, SlotDefinitionPayload, StatusResponse,
};

/// Boundary to whatever persists slot definitions and bookings.
#[async_trait]
pub trait CalendarGateway: Send + Sync {
    async fn list_day_availability(
        &self,
        session: &SessionContext,
        range: DateRange,
    ) -> Result<DayAvailabilityLists, SchedulingError>;

    async fn list_bookings(
        &self,
        session: &SessionContext,
        date: NaiveDate,
    ) -> Result<Vec<BookingRecord>, SchedulingError>;

    async fn booking_counts(
        &self,
        session: &SessionContext,
        range: DateRange,
    ) -> Result<HashMap<NaiveDate, u32>, SchedulingError>;

    async fn check_conflict(
        &self,
        session: &SessionContext,
        range: DateRange,
        exclude_slot_id: Option<&str>,
    ) -> Result<StatusResponse, SchedulingError>;

    /// Creates (no `slot_id`) or fully replaces a definition. The conflict
    /// check and the write happen in one call; replacement is rejected
    /// with `StaleWrite` when `definition.version` is not current.
    async fn save_definition(
        &self,
        session: &SessionContext,
        definition: &SlotDefinition,
        proceed_anyway: bool,
    ) -> Result<SlotDefinition, SchedulingError>;

    async fn fetch_definition(
        &self,
        session: &SessionContext,
        slot_id: &str,
    ) -> Result<SlotDefinition, SchedulingError>;

    async fn list_definitions(
        &self,
        session: &SessionContext,
    ) -> Result<Vec<SlotDefinition>, SchedulingError>;

    async fn list_adjustments(
        &self,
        session: &SessionContext,
        range: DateRange,
    ) -> Result<Vec<TemporaryAdjustment>, SchedulingError>;

    async fn save_adjustment(
        &self,
        session: &SessionContext,
        adjustment: &TemporaryAdjustment,
    ) -> Result<TemporaryAdjustment, SchedulingError>;

    async fn delete_adjustment(
        &self,
        session: &SessionContext,
        slot_id: &str,
        date: NaiveDate,
    ) -> Result<(), SchedulingError>;
}

/// `CalendarGateway` over the remote calendar service's JSON API.
pub struct HttpCalendarGateway {
    client: CalendarServiceClient,
}

impl HttpCalendarGateway {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: CalendarServiceClient::new(config),
        }
    }

    async fn get<T: serde::de::DeserializeOwned>(
        &self,
        segments: &[&str],
        query: &[(&str, &str)],
        session: &SessionContext,
    ) -> Result<T, SchedulingError> {
        Ok(self
            .client
            .request(Method::GET, segments, query, Some(session.auth_token.as_str()), None)
            .await?)
    }

    /// Facility and, when scoped, doctor of the session plus `extra`.
    fn owner_query<'a>(
        session: &'a SessionContext,
        extra: &[(&'a str, &'a str)],
    ) -> Vec<(&'a str, &'a str)> {
        let mut query = vec![("facility_id", session.facility_id.as_str())];
        if let Some(doctor_id) = session.doctor_id.as_deref() {
            query.push(("doctor_id", doctor_id));
        }
        query.extend_from_slice(extra);
        query
    }
}

#[async_trait]
impl CalendarGateway for HttpCalendarGateway {
    async fn list_day_availability(
        &self,
        session: &SessionContext,
        range: DateRange,
    ) -> Result<DayAvailabilityLists, SchedulingError> {
        debug!("Fetching slot days for facility {}", session.facility_id);
        let (from_date, to_date) = (wire::format_date(range.start), wire::format_date(range.end));
        let query = Self::owner_query(
            session,
            &[("from_date", from_date.as_str()), ("to_date", to_date.as_str())],
        );
        let response: SlotDaysResponse = self.get(&["calendar", "slot-days"], &query, session).await?;
        Ok(DayAvailabilityLists::from(&response))
    }

    async fn list_bookings(
        &self,
        session: &SessionContext,
        date: NaiveDate,
    ) -> Result<Vec<BookingRecord>, SchedulingError> {
        let date = wire::format_date(date);
        let query = Self::owner_query(session, &[("date", date.as_str())]);
        let records: Vec<BookingRecordWire> = self.get(&["calendar", "bookings"], &query, session).await?;
        Ok(records.into_iter().map(BookingRecordWire::into_domain).collect())
    }

    async fn booking_counts(
        &self,
        session: &SessionContext,
        range: DateRange,
    ) -> Result<HashMap<NaiveDate, u32>, SchedulingError> {
        let (from_date, to_date) = (wire::format_date(range.start), wire::format_date(range.end));
        let query = Self::owner_query(
            session,
            &[("from_date", from_date.as_str()), ("to_date", to_date.as_str())],
        );
        let counts: Vec<BookingCountWire> =
            self.get(&["calendar", "booking-counts"], &query, session).await?;

        let mut by_date = HashMap::new();
        for count in counts {
            match wire::parse_date(&count.date) {
                Ok(date) => *by_date.entry(date).or_insert(0) += count.booked,
                Err(_) => warn!("Skipping booking count with malformed date '{}'", count.date),
            }
        }
        Ok(by_date)
    }

    async fn check_conflict(
        &self,
        session: &SessionContext,
        range: DateRange,
        exclude_slot_id: Option<&str>,
    ) -> Result<StatusResponse, SchedulingError> {
        let body = ConflictCheckRequest::new(
            &session.facility_id,
            session.doctor_id.as_deref(),
            range,
            exclude_slot_id,
        );
        let body = serde_json::to_value(body)
            .map_err(|e| SchedulingError::RemoteService(e.to_string()))?;

        Ok(self
            .client
            .request(
                Method::POST,
                &["calendar", "slots", "conflict-check"],
                &[],
                Some(session.auth_token.as_str()),
                Some(body),
            )
            .await?)
    }

    async fn save_definition(
        &self,
        session: &SessionContext,
        definition: &SlotDefinition,
        proceed_anyway: bool,
    ) -> Result<SlotDefinition, SchedulingError> {
        let payload = wire::encode_definition(definition, session.org_id.as_deref())?;
        let mut body = serde_json::to_value(&payload)
            .map_err(|e| SchedulingError::RemoteService(e.to_string()))?;
        if let Value::Object(map) = &mut body {
            map.insert("proceed_anyway".to_string(), Value::Bool(proceed_anyway));
        }

        let response: StatusResponse = self
            .client
            .request(
                Method::POST,
                &["calendar", "slots"],
                &[],
                Some(session.auth_token.as_str()),
                Some(body),
            )
            .await?;

        if !response.is_success() {
            let message = response
                .message
                .clone()
                .unwrap_or_else(|| format!("Calendar service answered '{}'", response.status));
            let mentions_existing = message.to_ascii_lowercase().contains("exists");
            if response.is_conflict() || response.conflicting_range().is_some() || mentions_existing {
                return Err(SchedulingError::conflict(message, response.conflicting_range()));
            }
            error!("Slot definition save rejected: {}", message);
            return Err(SchedulingError::RemoteService(message));
        }

        let mut saved = definition.clone();
        saved.slot_id = response.slot_id.or_else(|| definition.slot_id.clone());
        saved.version = response.version.or(definition.version);
        Ok(saved)
    }

    async fn fetch_definition(
        &self,
        session: &SessionContext,
        slot_id: &str,
    ) -> Result<SlotDefinition, SchedulingError> {
        let payload: SlotDefinitionPayload =
            self.get(&["calendar", "slots", slot_id], &[], session).await?;
        wire::decode_definition(&payload)
    }

    async fn list_definitions(
        &self,
        session: &SessionContext,
    ) -> Result<Vec<SlotDefinition>, SchedulingError> {
        let query = Self::owner_query(session, &[]);
        let payloads: Vec<SlotDefinitionPayload> =
            self.get(&["calendar", "slots"], &query, session).await?;

        let definitions = payloads
            .iter()
            .filter_map(|payload| match wire::decode_definition(payload) {
                Ok(definition) => Some(definition),
                Err(e) => {
                    warn!("Skipping undecodable slot {:?}: {}", payload.slot_id, e);
                    None
                }
            })
            .filter(|definition| {
                definition.same_owner(&session.facility_id, session.doctor_id.as_deref())
            })
            .collect();
        Ok(definitions)
    }

    async fn list_adjustments(
        &self,
        session: &SessionContext,
        range: DateRange,
    ) -> Result<Vec<TemporaryAdjustment>, SchedulingError> {
        let (from_date, to_date) = (wire::format_date(range.start), wire::format_date(range.end));
        let query = Self::owner_query(
            session,
            &[("from_date", from_date.as_str()), ("to_date", to_date.as_str())],
        );
        let records: Vec<AdjustmentWire> =
            self.get(&["calendar", "adjustments"], &query, session).await?;

        Ok(records
            .into_iter()
            .filter_map(|record| match TemporaryAdjustment::try_from(record) {
                Ok(adjustment) if range.contains(adjustment.date) => Some(adjustment),
                Ok(_) => None,
                Err(e) => {
                    warn!("Skipping malformed adjustment: {}", e);
                    None
                }
            })
            .collect())
    }

    async fn save_adjustment(
        &self,
        session: &SessionContext,
        adjustment: &TemporaryAdjustment,
    ) -> Result<TemporaryAdjustment, SchedulingError> {
        let body = serde_json::to_value(AdjustmentWire::from(adjustment))
            .map_err(|e| SchedulingError::RemoteService(e.to_string()))?;
        let saved: AdjustmentWire = self
            .client
            .request(
                Method::PUT,
                &["calendar", "adjustments"],
                &[],
                Some(session.auth_token.as_str()),
                Some(body),
            )
            .await?;
        TemporaryAdjustment::try_from(saved)
    }

    async fn delete_adjustment(
        &self,
        session: &SessionContext,
        slot_id: &str,
        date: NaiveDate,
    ) -> Result<(), SchedulingError> {
        let date = wire::format_date(date);
        let query = [
            ("facility_id", session.facility_id.as_str()),
            ("slot_id", slot_id),
            ("date", date.as_str()),
        ];
        let _: Value = self
            .client
            .request(
                Method::DELETE,
                &["calendar", "adjustments"],
                &query,
                Some(session.auth_token.as_str()),
                None,
            )
            .await?;
        Ok(())
    }
}
