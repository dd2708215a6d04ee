//! Translation between the scheduling model and the calendar service's flat
//! wire shapes. Nothing outside this module knows about `DD/MM/YYYY` dates,
//! `Monday~Wednesday` day lists, `9-0-11-0` timings or the per-weekday
//! `mon_start_1` style fields.

use chrono::{NaiveDate, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::SchedulingError;
use crate::models::{
    BookingMode, BookingRecord, BookingStatus, ConflictCheckOutcome, DateRange,
    DayAvailabilityLists, SlotDefinition, TemporaryAdjustment, TimeWindow, WeeklyPattern, WEEK,
};

pub const DATE_FORMAT: &str = "%d/%m/%Y";

/// The flat record holds at most this many windows per weekday.
pub const MAX_FLAT_WINDOWS: usize = 2;

const DAY_PREFIXES: [&str; 7] = ["mon", "tue", "wed", "thu", "fri", "sat", "sun"];

pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

pub fn parse_date(raw: &str) -> Result<NaiveDate, SchedulingError> {
    let trimmed = raw.trim();
    NaiveDate::parse_from_str(trimmed, DATE_FORMAT)
        .or_else(|_| NaiveDate::parse_from_str(trimmed, "%Y-%m-%d"))
        .map_err(|_| SchedulingError::Validation(format!("'{}' is not a DD/MM/YYYY date", raw)))
}

/// Comma-joined date list; blanks are skipped, malformed entries are logged
/// and skipped.
pub fn parse_date_list(raw: &str) -> Vec<NaiveDate> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .filter_map(|entry| match parse_date(entry) {
            Ok(date) => Some(date),
            Err(_) => {
                warn!("Skipping malformed date '{}' in calendar day list", entry);
                None
            }
        })
        .collect()
}

pub fn encode_weekdays(days: &[Weekday]) -> String {
    days.iter().map(|day| weekday_name(*day)).collect::<Vec<_>>().join("~")
}

pub fn decode_weekdays(raw: &str) -> Vec<Weekday> {
    let mut days = Vec::new();
    for entry in raw.split('~').map(str::trim).filter(|e| !e.is_empty()) {
        match entry.parse::<Weekday>() {
            Ok(day) if !days.contains(&day) => days.push(day),
            Ok(_) => {}
            Err(_) => warn!("Skipping unknown weekday '{}'", entry),
        }
    }
    days
}

pub fn encode_windows(windows: &[TimeWindow]) -> String {
    windows
        .iter()
        .map(|w| {
            format!(
                "{}-{}-{}-{}",
                w.start.format("%-H"),
                w.start.format("%-M"),
                w.end.format("%-H"),
                w.end.format("%-M")
            )
        })
        .collect::<Vec<_>>()
        .join("~")
}

/// Decodes `fromH-fromM-toH-toM~...`; placeholder and inverted entries are
/// treated as "no window".
pub fn decode_windows(raw: &str) -> Vec<(NaiveTime, NaiveTime)> {
    let mut spans = Vec::new();
    for entry in raw.split('~').map(str::trim).filter(|e| !e.is_empty()) {
        let parts: Vec<Option<u32>> = entry.split('-').map(|p| p.trim().parse().ok()).collect();
        let span = match parts.as_slice() {
            [Some(fh), Some(fm), Some(th), Some(tm)] => NaiveTime::from_hms_opt(*fh, *fm, 0)
                .zip(NaiveTime::from_hms_opt(*th, *tm, 0)),
            _ => None,
        };
        match span {
            Some((start, end)) if start < end => spans.push((start, end)),
            Some(_) => {}
            None => warn!("Skipping malformed timing '{}'", entry),
        }
    }
    spans
}

/// Parses one time field of the legacy shape. Blank, null, all-zero
/// placeholders (`0`, `00`, `0-0`, `00:00`) and unparsable values mean
/// "no window".
pub fn parse_wire_time(raw: Option<&str>) -> Option<NaiveTime> {
    let trimmed = raw?.trim();
    if trimmed.is_empty() || trimmed.chars().all(|c| matches!(c, '0' | ':' | '-' | '.')) {
        return None;
    }

    let parsed = NaiveTime::parse_from_str(trimmed, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(trimmed, "%H:%M"))
        .ok()
        .or_else(|| {
            let (h, m) = trimmed.split_once('-')?;
            NaiveTime::from_hms_opt(h.trim().parse().ok()?, m.trim().parse().ok()?, 0)
        });

    if parsed.is_none() {
        warn!("Treating unparsable time value '{}' as no window", trimmed);
    }
    parsed
}

fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

fn day_prefix(day: Weekday) -> &'static str {
    DAY_PREFIXES[day.num_days_from_monday() as usize]
}

fn field_str(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn field_u32(value: Option<&Value>) -> Option<u32> {
    match value? {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn field_flag(value: Option<&Value>) -> Option<bool> {
    match value? {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_u64().map(|n| n != 0),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "y" => Some(true),
            "0" | "false" | "no" | "n" | "" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

/// Create/replace body and fetch-for-edit record of a slot definition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SlotDefinitionPayload {
    pub slot_id: Option<String>,
    pub facility_id: String,
    pub doctor_id: Option<String>,
    #[serde(default)]
    pub org_id: Option<String>,
    pub from_date: String,
    pub to_date: String,
    pub booking_type: String,
    pub slot_duration: Option<u32>,
    pub capacity: Option<u32>,
    #[serde(default)]
    pub version: Option<u64>,
    /// Legacy shared encoding, only present when all active days agree.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub days: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timings: Option<String>,
    #[serde(flatten)]
    pub day_fields: Map<String, Value>,
}

pub fn encode_definition(
    definition: &SlotDefinition,
    org_id: Option<&str>,
) -> Result<SlotDefinitionPayload, SchedulingError> {
    let mut day_fields = Map::new();

    for (day, windows) in definition.per_weekday.iter() {
        if windows.len() > MAX_FLAT_WINDOWS {
            return Err(SchedulingError::Validation(format!(
                "{} has {} windows; at most {} per day are supported",
                weekday_name(day),
                windows.len(),
                MAX_FLAT_WINDOWS
            )));
        }

        let prefix = day_prefix(day);
        for n in 1..=MAX_FLAT_WINDOWS {
            let window = windows.get(n - 1);
            day_fields.insert(
                format!("{}_start_{}", prefix, n),
                window.map_or(Value::Null, |w| Value::String(w.start.format("%H:%M").to_string())),
            );
            day_fields.insert(
                format!("{}_stop_{}", prefix, n),
                window.map_or(Value::Null, |w| Value::String(w.end.format("%H:%M").to_string())),
            );
            day_fields.insert(
                format!("{}_capacity_{}", prefix, n),
                window.map_or(Value::Null, |w| Value::from(w.capacity)),
            );
        }
        day_fields.insert(format!("{}_available", prefix), Value::Bool(!windows.is_empty()));
    }

    let shared = definition.per_weekday.shared_windows();
    let capacity = match definition.booking_mode {
        BookingMode::Sequence => shared
            .and_then(|windows| windows.first())
            .map(|w| w.capacity),
        BookingMode::Timeslot => None,
    };

    Ok(SlotDefinitionPayload {
        slot_id: definition.slot_id.clone(),
        facility_id: definition.facility_id.clone(),
        doctor_id: definition.doctor_id.clone(),
        org_id: org_id.map(str::to_string),
        from_date: format_date(definition.effective_range.start),
        to_date: format_date(definition.effective_range.end),
        booking_type: definition.booking_mode.as_wire().to_string(),
        slot_duration: definition.slot_duration_minutes,
        capacity,
        version: definition.version,
        days: shared.map(|_| encode_weekdays(&definition.per_weekday.active_days())),
        timings: shared.map(encode_windows),
        day_fields,
    })
}

pub fn decode_definition(payload: &SlotDefinitionPayload) -> Result<SlotDefinition, SchedulingError> {
    let effective_range = DateRange::new(parse_date(&payload.from_date)?, parse_date(&payload.to_date)?)?;
    let booking_mode = BookingMode::from_wire(&payload.booking_type).ok_or_else(|| {
        SchedulingError::Validation(format!("Unknown booking type '{}'", payload.booking_type))
    })?;
    let slot_duration = payload.slot_duration.filter(|minutes| *minutes > 0);

    let capacity_for = |window: &TimeWindow, explicit: Option<u32>| -> u32 {
        match (booking_mode, slot_duration) {
            (BookingMode::Timeslot, Some(minutes)) => window.slot_count(minutes),
            (BookingMode::Timeslot, None) => 0,
            (BookingMode::Sequence, _) => explicit.or(payload.capacity).unwrap_or(0),
        }
    };

    let has_flat_fields = WEEK.iter().any(|day| {
        let prefix = day_prefix(*day);
        payload.day_fields.contains_key(&format!("{}_start_1", prefix))
            || payload.day_fields.contains_key(&format!("{}_available", prefix))
    });

    let mut per_weekday = WeeklyPattern::new();

    if has_flat_fields {
        for day in WEEK {
            let prefix = day_prefix(day);
            if field_flag(payload.day_fields.get(&format!("{}_available", prefix))) == Some(false) {
                continue;
            }

            let mut windows = Vec::new();
            for n in 1..=MAX_FLAT_WINDOWS {
                let start = parse_wire_time(
                    field_str(payload.day_fields.get(&format!("{}_start_{}", prefix, n))).as_deref(),
                );
                let end = parse_wire_time(
                    field_str(payload.day_fields.get(&format!("{}_stop_{}", prefix, n))).as_deref(),
                );
                let (Some(start), Some(end)) = (start, end) else {
                    continue;
                };
                let Ok(mut window) = TimeWindow::new(start, end, 0) else {
                    warn!("Ignoring inverted {} window {}-{}", prefix, start, end);
                    continue;
                };
                let explicit = field_u32(payload.day_fields.get(&format!("{}_capacity_{}", prefix, n)));
                window.capacity = capacity_for(&window, explicit);
                windows.push(window);
            }
            per_weekday.set(day, windows);
        }
        if let Some(days) = &payload.days {
            per_weekday.prefer_order(&decode_weekdays(days));
        }
    } else if let (Some(days), Some(timings)) = (&payload.days, &payload.timings) {
        let windows: Vec<TimeWindow> = decode_windows(timings)
            .into_iter()
            .map(|(start, end)| {
                let mut window = TimeWindow { start, end, capacity: 0 };
                window.capacity = capacity_for(&window, None);
                window
            })
            .collect();
        for day in decode_weekdays(days) {
            per_weekday.set(day, windows.clone());
        }
    }

    Ok(SlotDefinition {
        slot_id: non_blank(payload.slot_id.clone()),
        facility_id: payload.facility_id.clone(),
        doctor_id: non_blank(payload.doctor_id.clone()),
        effective_range,
        booking_mode,
        per_weekday,
        slot_duration_minutes: slot_duration,
        version: payload.version,
    })
}

/// `{status, message}` answer shared by the write and conflict endpoints.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
    pub message: Option<String>,
    #[serde(default)]
    pub slot_id: Option<String>,
    #[serde(default)]
    pub version: Option<u64>,
    #[serde(default)]
    pub conflicting_from: Option<String>,
    #[serde(default)]
    pub conflicting_to: Option<String>,
}

impl StatusResponse {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: "success".to_string(),
            message: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(
            self.status.trim().to_ascii_lowercase().as_str(),
            "success" | "ok" | "available" | "true" | "1"
        )
    }

    pub fn is_conflict(&self) -> bool {
        matches!(
            self.status.trim().to_ascii_lowercase().as_str(),
            "conflict" | "exists" | "duplicate"
        )
    }

    pub fn conflicting_range(&self) -> Option<DateRange> {
        let start = parse_date(self.conflicting_from.as_deref()?).ok()?;
        let end = parse_date(self.conflicting_to.as_deref()?).ok()?;
        DateRange::new(start, end).ok()
    }

    pub fn from_outcome(outcome: &ConflictCheckOutcome) -> Self {
        Self {
            status: if outcome.available { "success" } else { "conflict" }.to_string(),
            message: outcome.message.clone(),
            slot_id: None,
            version: None,
            conflicting_from: outcome.conflicting_range.map(|r| format_date(r.start)),
            conflicting_to: outcome.conflicting_range.map(|r| format_date(r.end)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictCheckRequest {
    pub facility_id: String,
    pub doctor_id: Option<String>,
    pub from_date: String,
    pub to_date: String,
    pub exclude_slot_id: Option<String>,
}

impl ConflictCheckRequest {
    pub fn new(facility_id: &str, doctor_id: Option<&str>, range: DateRange, exclude_slot_id: Option<&str>) -> Self {
        Self {
            facility_id: facility_id.to_string(),
            doctor_id: doctor_id.map(str::to_string),
            from_date: format_date(range.start),
            to_date: format_date(range.end),
            exclude_slot_id: exclude_slot_id.map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SlotDaysResponse {
    #[serde(default)]
    pub available_dates: String,
    #[serde(default)]
    pub partial_dates: String,
    #[serde(default)]
    pub booked_dates: String,
}

impl From<&SlotDaysResponse> for DayAvailabilityLists {
    fn from(response: &SlotDaysResponse) -> Self {
        Self {
            available: parse_date_list(&response.available_dates),
            partial: parse_date_list(&response.partial_dates),
            full: parse_date_list(&response.booked_dates),
        }
    }
}

impl From<&DayAvailabilityLists> for SlotDaysResponse {
    fn from(lists: &DayAvailabilityLists) -> Self {
        let join = |dates: &[NaiveDate]| {
            dates.iter().map(|d| format_date(*d)).collect::<Vec<_>>().join(",")
        };
        Self {
            available_dates: join(&lists.available),
            partial_dates: join(&lists.partial),
            booked_dates: join(&lists.full),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingRecordWire {
    pub appointment_id: String,
    pub patient_id: String,
    pub patient_name: Option<String>,
    pub start_time: Option<String>,
    pub stop_time: Option<String>,
    pub status: String,
}

impl BookingRecordWire {
    pub fn into_domain(self) -> BookingRecord {
        let status = match self.status.trim().to_ascii_lowercase().replace([' ', '-'], "_").as_str() {
            "booked" | "confirmed" | "scheduled" => BookingStatus::Booked,
            "arrived" | "checked_in" => BookingStatus::Arrived,
            "in_consultation" | "in_progress" => BookingStatus::InConsultation,
            "completed" | "done" => BookingStatus::Completed,
            "cancelled" | "canceled" => BookingStatus::Cancelled,
            "no_show" | "noshow" => BookingStatus::NoShow,
            other => {
                warn!("Unknown booking status '{}', treating as booked", other);
                BookingStatus::Booked
            }
        };

        BookingRecord {
            appointment_id: self.appointment_id,
            patient_id: self.patient_id,
            patient_name: non_blank(self.patient_name),
            start_time: parse_wire_time(self.start_time.as_deref()),
            end_time: parse_wire_time(self.stop_time.as_deref()),
            status,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingCountWire {
    pub date: String,
    pub booked: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdjustmentWire {
    pub facility_id: String,
    pub slot_id: String,
    pub date: String,
    pub windows: Option<Vec<TimeWindow>>,
    pub capacity: Option<u32>,
    #[serde(default)]
    pub closed: bool,
}

impl From<&TemporaryAdjustment> for AdjustmentWire {
    fn from(adjustment: &TemporaryAdjustment) -> Self {
        Self {
            facility_id: adjustment.facility_id.clone(),
            slot_id: adjustment.slot_id.clone(),
            date: format_date(adjustment.date),
            windows: adjustment.windows.clone(),
            capacity: adjustment.capacity,
            closed: adjustment.closed,
        }
    }
}

impl TryFrom<AdjustmentWire> for TemporaryAdjustment {
    type Error = SchedulingError;

    fn try_from(wire: AdjustmentWire) -> Result<Self, Self::Error> {
        Ok(Self {
            date: parse_date(&wire.date)?,
            facility_id: wire.facility_id,
            slot_id: wire.slot_id,
            windows: wire.windows,
            capacity: wire.capacity,
            closed: wire.closed,
        })
    }
}
