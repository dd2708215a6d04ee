use std::collections::HashMap;

use chrono::{Datelike, Duration, NaiveDate, NaiveTime, Weekday};
use serde::{ser::SerializeMap, Deserialize, Serialize, Serializer};

use crate::error::SchedulingError;

/// Monday-first ordering used everywhere a weekday set is iterated.
pub const WEEK: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingMode {
    /// Patients are booked into fixed-width sub-intervals of a window.
    Timeslot,
    /// Patients queue for the day in arrival order up to a capacity.
    Sequence,
}

impl BookingMode {
    pub fn as_wire(&self) -> &'static str {
        match self {
            BookingMode::Timeslot => "timeslot",
            BookingMode::Sequence => "sequence",
        }
    }

    pub fn from_wire(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "timeslot" | "time_slot" | "slot" => Some(BookingMode::Timeslot),
            "sequence" | "queue" => Some(BookingMode::Sequence),
            _ => None,
        }
    }
}

/// Inclusive calendar date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, SchedulingError> {
        let range = Self { start, end };
        range.validate()?;
        Ok(range)
    }

    pub fn validate(&self) -> Result<(), SchedulingError> {
        if self.start > self.end {
            return Err(SchedulingError::Validation(format!(
                "Start date {} is after end date {}",
                self.start, self.end
            )));
        }
        Ok(())
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    pub fn intersects(&self, other: &DateRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    pub fn intersection(&self, other: &DateRange) -> Option<DateRange> {
        if !self.intersects(other) {
            return None;
        }
        Some(DateRange {
            start: self.start.max(other.start),
            end: self.end.min(other.end),
        })
    }

    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        let end = self.end;
        self.start.iter_days().take_while(move |day| *day <= end)
    }

    pub fn len_days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub capacity: u32,
}

impl TimeWindow {
    pub fn new(start: NaiveTime, end: NaiveTime, capacity: u32) -> Result<Self, SchedulingError> {
        if start >= end {
            return Err(SchedulingError::Validation(format!(
                "Window start {} must be before end {}",
                start.format("%H:%M"),
                end.format("%H:%M")
            )));
        }
        Ok(Self { start, end, capacity })
    }

    pub fn duration_minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }

    /// Whole sub-slots of `slot_minutes` that fit; the remainder is truncated.
    pub fn slot_count(&self, slot_minutes: u32) -> u32 {
        if slot_minutes == 0 {
            return 0;
        }
        (self.duration_minutes() / slot_minutes as i64) as u32
    }

    pub fn same_span(&self, other: &TimeWindow) -> bool {
        self.start == other.start && self.end == other.end
    }
}

/// Time windows per weekday. A weekday without windows is inactive.
/// Active days remember the order they were selected in; equality only
/// looks at the windows.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(from = "HashMap<Weekday, Vec<TimeWindow>>")]
pub struct WeeklyPattern {
    days: [Vec<TimeWindow>; 7],
    order: Vec<Weekday>,
}

impl PartialEq for WeeklyPattern {
    fn eq(&self, other: &Self) -> bool {
        self.days == other.days
    }
}

impl Eq for WeeklyPattern {}

impl WeeklyPattern {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn windows(&self, day: Weekday) -> &[TimeWindow] {
        &self.days[day.num_days_from_monday() as usize]
    }

    pub fn set(&mut self, day: Weekday, mut windows: Vec<TimeWindow>) {
        windows.sort_by_key(|w| w.start);
        if windows.is_empty() {
            self.order.retain(|selected| *selected != day);
        } else if !self.order.contains(&day) {
            self.order.push(day);
        }
        self.days[day.num_days_from_monday() as usize] = windows;
    }

    /// Moves the listed active days to the front, in the given order.
    pub fn prefer_order(&mut self, days: &[Weekday]) {
        let mut order: Vec<Weekday> = Vec::with_capacity(self.order.len());
        for day in days.iter().chain(self.order.iter()) {
            if self.is_active(*day) && !order.contains(day) {
                order.push(*day);
            }
        }
        self.order = order;
    }

    pub fn is_active(&self, day: Weekday) -> bool {
        !self.windows(day).is_empty()
    }

    /// Active days in selection order.
    pub fn active_days(&self) -> Vec<Weekday> {
        self.order.clone()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Weekday, &[TimeWindow])> {
        WEEK.iter().map(move |day| (*day, self.windows(*day)))
    }

    pub fn is_empty(&self) -> bool {
        self.days.iter().all(Vec::is_empty)
    }

    /// The window list shared by every active day, if all active days agree.
    pub fn shared_windows(&self) -> Option<&[TimeWindow]> {
        let mut active = self.days.iter().filter(|w| !w.is_empty());
        let first = active.next()?;
        if active.all(|w| w == first) {
            Some(first.as_slice())
        } else {
            None
        }
    }
}

impl From<HashMap<Weekday, Vec<TimeWindow>>> for WeeklyPattern {
    fn from(map: HashMap<Weekday, Vec<TimeWindow>>) -> Self {
        let mut map = map;
        let mut pattern = WeeklyPattern::new();
        for day in WEEK {
            if let Some(windows) = map.remove(&day) {
                pattern.set(day, windows);
            }
        }
        pattern
    }
}

impl Serialize for WeeklyPattern {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let active = self.active_days();
        let mut map = serializer.serialize_map(Some(active.len()))?;
        for day in active {
            map.serialize_entry(&day, self.windows(day))?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotDefinition {
    pub slot_id: Option<String>,
    pub facility_id: String,
    /// Absent means the facility's solo-practice default doctor.
    pub doctor_id: Option<String>,
    pub effective_range: DateRange,
    pub booking_mode: BookingMode,
    pub per_weekday: WeeklyPattern,
    pub slot_duration_minutes: Option<u32>,
    /// Concurrency token issued by the calendar service on every write.
    pub version: Option<u64>,
}

impl SlotDefinition {
    pub fn covers(&self, date: NaiveDate) -> bool {
        self.effective_range.contains(date) && self.per_weekday.is_active(date.weekday())
    }

    pub fn windows_on(&self, date: NaiveDate) -> &[TimeWindow] {
        self.per_weekday.windows(date.weekday())
    }

    pub fn same_owner(&self, facility_id: &str, doctor_id: Option<&str>) -> bool {
        self.facility_id == facility_id && self.doctor_id.as_deref() == doctor_id
    }
}

/// A time window as typed by the operator; any field may still be blank.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawWindow {
    pub from_hour: Option<u32>,
    pub from_minute: Option<u32>,
    pub to_hour: Option<u32>,
    pub to_minute: Option<u32>,
}

impl RawWindow {
    pub fn new(from_hour: u32, from_minute: u32, to_hour: u32, to_minute: u32) -> Self {
        Self {
            from_hour: Some(from_hour),
            from_minute: Some(from_minute),
            to_hour: Some(to_hour),
            to_minute: Some(to_minute),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.from_hour.is_some()
            && self.from_minute.is_some()
            && self.to_hour.is_some()
            && self.to_minute.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildSlotRequest {
    pub doctor_id: Option<String>,
    pub weekdays: Vec<Weekday>,
    pub windows: Vec<RawWindow>,
    pub booking_mode: BookingMode,
    pub slot_duration_minutes: Option<u32>,
    /// Patients per window in sequence mode.
    pub capacity: Option<u32>,
    pub effective_range: DateRange,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemporaryAdjustment {
    pub facility_id: String,
    pub slot_id: String,
    pub date: NaiveDate,
    pub windows: Option<Vec<TimeWindow>>,
    pub capacity: Option<u32>,
    #[serde(default)]
    pub closed: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustmentOverride {
    pub windows: Option<Vec<TimeWindow>>,
    pub capacity: Option<u32>,
    #[serde(default)]
    pub closed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Booked,
    Arrived,
    InConsultation,
    Completed,
    Cancelled,
    NoShow,
}

impl BookingStatus {
    pub fn holds_capacity(&self) -> bool {
        !matches!(self, BookingStatus::Cancelled)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingRecord {
    pub appointment_id: String,
    pub patient_id: String,
    pub patient_name: Option<String>,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub status: BookingStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotOccupant {
    pub appointment_id: String,
    pub patient_id: String,
    pub patient_name: Option<String>,
    pub status: BookingStatus,
}

impl From<&BookingRecord> for SlotOccupant {
    fn from(record: &BookingRecord) -> Self {
        Self {
            appointment_id: record.appointment_id.clone(),
            patient_id: record.patient_id.clone(),
            patient_name: record.patient_name.clone(),
            status: record.status,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookableSlot {
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub occupant: Option<SlotOccupant>,
}

impl BookableSlot {
    pub fn is_occupied(&self) -> bool {
        self.occupant.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub position: u32,
    pub occupant: SlotOccupant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum BookingSlotView {
    Timeslot {
        date: NaiveDate,
        slots: Vec<BookableSlot>,
    },
    Sequence {
        date: NaiveDate,
        capacity: u32,
        booked: u32,
        queue: Vec<QueueEntry>,
    },
}

impl BookingSlotView {
    pub fn date(&self) -> NaiveDate {
        match self {
            BookingSlotView::Timeslot { date, .. } | BookingSlotView::Sequence { date, .. } => *date,
        }
    }

    pub fn free_places(&self) -> u32 {
        match self {
            BookingSlotView::Timeslot { slots, .. } => {
                slots.iter().filter(|slot| !slot.is_occupied()).count() as u32
            }
            BookingSlotView::Sequence { capacity, booked, .. } => capacity.saturating_sub(*booked),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DateAvailabilityStatus {
    Available,
    Partial,
    Full,
    NotConfigured,
}

/// Remote per-day summary: which dates are open, partly booked, fully booked.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayAvailabilityLists {
    pub available: Vec<NaiveDate>,
    pub partial: Vec<NaiveDate>,
    pub full: Vec<NaiveDate>,
}

impl DayAvailabilityLists {
    pub fn status_of(&self, date: NaiveDate) -> DateAvailabilityStatus {
        if self.full.contains(&date) {
            DateAvailabilityStatus::Full
        } else if self.partial.contains(&date) {
            DateAvailabilityStatus::Partial
        } else if self.available.contains(&date) {
            DateAvailabilityStatus::Available
        } else {
            DateAvailabilityStatus::NotConfigured
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictSeverity {
    None,
    /// The service hinted at an existing schedule; the operator may proceed.
    Warning,
    Blocking,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictCheckOutcome {
    pub available: bool,
    pub severity: ConflictSeverity,
    pub conflicting_range: Option<DateRange>,
    pub message: Option<String>,
}

impl ConflictCheckOutcome {
    pub fn available() -> Self {
        Self {
            available: true,
            severity: ConflictSeverity::None,
            conflicting_range: None,
            message: None,
        }
    }

    pub fn blocking(conflicting_range: Option<DateRange>, message: impl Into<String>) -> Self {
        Self {
            available: false,
            severity: ConflictSeverity::Blocking,
            conflicting_range,
            message: Some(message.into()),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            available: false,
            severity: ConflictSeverity::Warning,
            conflicting_range: None,
            message: Some(message.into()),
        }
    }
}

/// Minutes-since-midnight arithmetic that never wraps past midnight.
pub fn add_minutes(time: NaiveTime, minutes: i64) -> Option<NaiveTime> {
    let (next, wrapped) = time.overflowing_add_signed(Duration::minutes(minutes));
    if wrapped == 0 {
        Some(next)
    } else {
        None
    }
}
