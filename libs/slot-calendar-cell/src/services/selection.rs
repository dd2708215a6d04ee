use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::NaiveDate;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use shared_models::auth::SessionContext;

use crate::error::SchedulingError;
use crate::models::{BookingSlotView, DateRange};
use crate::services::cache::MonthProjection;
use crate::services::scheduler::SlotSchedulingService;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub facility_id: String,
    pub doctor_id: Option<String>,
    pub date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionTicket {
    generation: u64,
    pub selection: Selection,
}

/// Issues one ticket per selection change. Only the newest ticket is
/// current; responses carrying older tickets are dropped.
#[derive(Debug, Default)]
pub struct SelectionTracker {
    generation: AtomicU64,
}

impl SelectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&self, selection: Selection) -> SelectionTicket {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        SelectionTicket { generation, selection }
    }

    pub fn is_current(&self, ticket: &SelectionTicket) -> bool {
        self.generation.load(Ordering::SeqCst) == ticket.generation
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CalendarSnapshot {
    pub selection: Selection,
    pub month: MonthProjection,
    /// `None` when nothing is scheduled on the selected date.
    pub day: Option<BookingSlotView>,
}

/// The calendar screen's state: month colouring plus the selected day's
/// slots, always belonging to the latest selection.
pub struct CalendarView {
    service: Arc<SlotSchedulingService>,
    tracker: SelectionTracker,
    snapshot: Mutex<Option<CalendarSnapshot>>,
}

impl CalendarView {
    pub fn new(service: Arc<SlotSchedulingService>) -> Self {
        Self {
            service,
            tracker: SelectionTracker::new(),
            snapshot: Mutex::new(None),
        }
    }

    /// Loads `month` and `date` for the session's facility/doctor. Returns
    /// `false` when a newer selection superseded this one before it landed.
    pub async fn select(
        &self,
        session: &SessionContext,
        date: NaiveDate,
        month: DateRange,
    ) -> Result<bool, SchedulingError> {
        let ticket = self.tracker.begin(Selection {
            facility_id: session.facility_id.clone(),
            doctor_id: session.doctor_id.clone(),
            date,
        });
        debug!("Selecting {} for facility {}", date, session.facility_id);

        let (month_statuses, day) = tokio::join!(
            self.service.calendar(session, month),
            self.service.day_view(session, date),
        );
        let month_statuses = month_statuses?;
        let day = match day {
            Ok(view) => Some(view),
            Err(SchedulingError::NotFound(_)) => None,
            Err(e) => return Err(e),
        };

        let mut snapshot = self.snapshot.lock().await;
        if !self.tracker.is_current(&ticket) {
            warn!(
                "Discarding stale calendar response for facility {} on {}",
                ticket.selection.facility_id, ticket.selection.date
            );
            return Ok(false);
        }
        *snapshot = Some(CalendarSnapshot {
            selection: ticket.selection,
            month: month_statuses,
            day,
        });
        Ok(true)
    }

    pub async fn snapshot(&self) -> Option<CalendarSnapshot> {
        self.snapshot.lock().await.clone()
    }
}
