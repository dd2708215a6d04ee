use chrono::{NaiveTime, Weekday};
use tracing::debug;

use crate::error::SchedulingError;
use crate::models::{
    BookingMode, BuildSlotRequest, RawWindow, SlotDefinition, TimeWindow, WeeklyPattern,
};

/// Turns the weekly-pattern editor's form input into a canonical
/// `SlotDefinition`. Pure: nothing here talks to the calendar service.
pub struct SlotDefinitionBuilder;

impl SlotDefinitionBuilder {
    pub fn build(
        facility_id: &str,
        request: &BuildSlotRequest,
    ) -> Result<SlotDefinition, SchedulingError> {
        debug!(
            "Building {:?} slot definition for facility {} ({} weekdays, {} raw windows)",
            request.booking_mode,
            facility_id,
            request.weekdays.len(),
            request.windows.len()
        );

        if facility_id.trim().is_empty() {
            return Err(SchedulingError::Validation("Facility is required".to_string()));
        }

        request.effective_range.validate()?;

        let weekdays = dedup_weekdays(&request.weekdays);
        if weekdays.is_empty() {
            return Err(SchedulingError::Validation(
                "Select at least one weekday".to_string(),
            ));
        }

        let (slot_duration_minutes, sequence_capacity) = match request.booking_mode {
            BookingMode::Timeslot => match request.slot_duration_minutes {
                Some(minutes) if minutes > 0 => (Some(minutes), None),
                _ => {
                    return Err(SchedulingError::Validation(
                        "Slot duration is required for timeslot booking".to_string(),
                    ))
                }
            },
            BookingMode::Sequence => match request.capacity {
                Some(capacity) if capacity > 0 => (None, Some(capacity)),
                _ => {
                    return Err(SchedulingError::Validation(
                        "Patient capacity is required for sequence booking".to_string(),
                    ))
                }
            },
        };

        let windows = complete_windows(&request.windows, slot_duration_minutes, sequence_capacity)?;

        let mut per_weekday = WeeklyPattern::new();
        for day in weekdays {
            per_weekday.set(day, windows.clone());
        }

        Ok(SlotDefinition {
            slot_id: None,
            facility_id: facility_id.to_string(),
            doctor_id: request.doctor_id.clone().filter(|id| !id.trim().is_empty()),
            effective_range: request.effective_range,
            booking_mode: request.booking_mode,
            per_weekday,
            slot_duration_minutes,
            version: None,
        })
    }

    /// Full replacement of an existing definition: `draft` is the already
    /// validated output of `build`, identity and version token come from
    /// what the operator loaded.
    pub fn rebuild(existing: &SlotDefinition, draft: SlotDefinition) -> SlotDefinition {
        SlotDefinition {
            slot_id: existing.slot_id.clone(),
            facility_id: existing.facility_id.clone(),
            version: existing.version,
            ..draft
        }
    }
}

fn dedup_weekdays(weekdays: &[Weekday]) -> Vec<Weekday> {
    let mut seen = Vec::with_capacity(weekdays.len());
    for day in weekdays {
        if !seen.contains(day) {
            seen.push(*day);
        }
    }
    seen
}

fn complete_windows(
    raw: &[RawWindow],
    slot_duration_minutes: Option<u32>,
    sequence_capacity: Option<u32>,
) -> Result<Vec<TimeWindow>, SchedulingError> {
    let complete: Vec<&RawWindow> = raw.iter().filter(|w| w.is_complete()).collect();
    if complete.len() < raw.len() {
        debug!("Dropping {} incomplete time windows", raw.len() - complete.len());
    }

    let mut windows = Vec::with_capacity(complete.len());
    for window in complete {
        let start = to_time(window.from_hour, window.from_minute)?;
        let end = to_time(window.to_hour, window.to_minute)?;
        let mut window = TimeWindow::new(start, end, 0)?;

        window.capacity = match (slot_duration_minutes, sequence_capacity) {
            (Some(minutes), _) => {
                let slots = window.slot_count(minutes);
                if slots == 0 {
                    return Err(SchedulingError::Validation(format!(
                        "Window {}-{} is shorter than the {} minute slot duration",
                        start.format("%H:%M"),
                        end.format("%H:%M"),
                        minutes
                    )));
                }
                slots
            }
            (None, Some(capacity)) => capacity,
            (None, None) => 0,
        };

        windows.push(window);
    }

    if windows.is_empty() {
        return Err(SchedulingError::Validation(
            "At least one complete time window is required".to_string(),
        ));
    }

    windows.sort_by_key(|w| w.start);
    for pair in windows.windows(2) {
        if pair[1].start < pair[0].end {
            return Err(SchedulingError::Validation(format!(
                "Time windows {}-{} and {}-{} overlap",
                pair[0].start.format("%H:%M"),
                pair[0].end.format("%H:%M"),
                pair[1].start.format("%H:%M"),
                pair[1].end.format("%H:%M")
            )));
        }
    }

    Ok(windows)
}

fn to_time(hour: Option<u32>, minute: Option<u32>) -> Result<NaiveTime, SchedulingError> {
    let (hour, minute) = hour.zip(minute).ok_or_else(|| {
        SchedulingError::Validation("Incomplete time value".to_string())
    })?;
    NaiveTime::from_hms_opt(hour, minute, 0).ok_or_else(|| {
        SchedulingError::Validation(format!("{:02}:{:02} is not a valid time", hour, minute))
    })
}
