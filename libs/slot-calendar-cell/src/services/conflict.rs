use tracing::{debug, warn};

use crate::error::SchedulingError;
use crate::models::{ConflictCheckOutcome, ConflictSeverity, DateRange, SlotDefinition};
use crate::services::wire::StatusResponse;

/// Decides whether a proposed effective range may be created for a
/// facility/doctor pair.
pub struct ConflictChecker;

impl ConflictChecker {
    /// Earliest-starting existing definition of the same facility and doctor
    /// whose range intersects `proposed`.
    pub fn find_conflict<'a>(
        existing: &'a [SlotDefinition],
        facility_id: &str,
        doctor_id: Option<&str>,
        proposed: &DateRange,
        exclude_slot_id: Option<&str>,
    ) -> Option<&'a SlotDefinition> {
        existing
            .iter()
            .filter(|definition| definition.same_owner(facility_id, doctor_id))
            .filter(|definition| {
                exclude_slot_id.is_none() || definition.slot_id.as_deref() != exclude_slot_id
            })
            .filter(|definition| definition.effective_range.intersects(proposed))
            .min_by_key(|definition| definition.effective_range.start)
    }

    pub fn check_local(
        existing: &[SlotDefinition],
        facility_id: &str,
        doctor_id: Option<&str>,
        proposed: &DateRange,
        exclude_slot_id: Option<&str>,
    ) -> ConflictCheckOutcome {
        match Self::find_conflict(existing, facility_id, doctor_id, proposed, exclude_slot_id) {
            Some(conflict) => {
                let range = conflict.effective_range;
                debug!("Proposed range {:?} overlaps existing slot {:?}", proposed, conflict.slot_id);
                ConflictCheckOutcome::blocking(
                    Some(range),
                    format!(
                        "A schedule already exists from {} to {}",
                        range.start.format("%d/%m/%Y"),
                        range.end.format("%d/%m/%Y")
                    ),
                )
            }
            None => ConflictCheckOutcome::available(),
        }
    }

    /// Reads the calendar service's `{status, message}` answer. A failure
    /// whose message only mentions an existing schedule degrades to a
    /// warning the operator may override.
    pub fn interpret(response: &StatusResponse) -> ConflictCheckOutcome {
        if response.is_success() {
            return ConflictCheckOutcome::available();
        }

        let message = response
            .message
            .clone()
            .unwrap_or_else(|| "Slot dates are not available".to_string());
        let conflicting_range = response.conflicting_range();

        if response.is_conflict() || conflicting_range.is_some() {
            return ConflictCheckOutcome::blocking(conflicting_range, message);
        }

        if message.to_ascii_lowercase().contains("exists") {
            warn!("Ambiguous conflict answer from calendar service: {}", message);
            return ConflictCheckOutcome::warning(message);
        }

        ConflictCheckOutcome::blocking(None, message)
    }

    pub fn ensure_committable(
        outcome: &ConflictCheckOutcome,
        proceed_anyway: bool,
    ) -> Result<(), SchedulingError> {
        match outcome.severity {
            ConflictSeverity::None => Ok(()),
            ConflictSeverity::Warning if proceed_anyway => {
                warn!(
                    "Operator chose to proceed despite warning: {}",
                    outcome.message.as_deref().unwrap_or_default()
                );
                Ok(())
            }
            _ => Err(SchedulingError::conflict(
                outcome.message.clone().unwrap_or_else(|| "Schedule conflict".to_string()),
                outcome.conflicting_range,
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::NaiveDate;

    use crate::models::{BookingMode, WeeklyPattern};

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn definition(slot_id: &str, doctor: Option<&str>, start: NaiveDate, end: NaiveDate) -> SlotDefinition {
        SlotDefinition {
            slot_id: Some(slot_id.to_string()),
            facility_id: "facility-1".to_string(),
            doctor_id: doctor.map(str::to_string),
            effective_range: DateRange { start, end },
            booking_mode: BookingMode::Timeslot,
            per_weekday: WeeklyPattern::new(),
            slot_duration_minutes: Some(30),
            version: Some(1),
        }
    }

    #[test]
    fn test_overlapping_range_is_blocked() {
        let existing = vec![definition("slot-1", None, d(2025, 1, 1), d(2025, 1, 31))];
        let proposed = DateRange { start: d(2025, 1, 15), end: d(2025, 2, 15) };

        let outcome = ConflictChecker::check_local(&existing, "facility-1", None, &proposed, None);

        assert!(!outcome.available);
        assert_eq!(outcome.severity, ConflictSeverity::Blocking);
        assert_eq!(outcome.conflicting_range, Some(existing[0].effective_range));
    }

    #[test]
    fn test_other_doctor_or_facility_does_not_conflict() {
        let mut other_facility = definition("slot-2", None, d(2025, 1, 1), d(2025, 1, 31));
        other_facility.facility_id = "facility-2".to_string();
        let existing = vec![
            definition("slot-1", Some("doc-1"), d(2025, 1, 1), d(2025, 1, 31)),
            other_facility,
        ];
        let proposed = DateRange { start: d(2025, 1, 10), end: d(2025, 1, 12) };

        assert!(ConflictChecker::check_local(&existing, "facility-1", None, &proposed, None).available);
        assert!(!ConflictChecker::check_local(&existing, "facility-1", Some("doc-1"), &proposed, None).available);
    }

    #[test]
    fn test_excluded_slot_does_not_self_conflict() {
        let existing = vec![definition("slot-1", None, d(2025, 1, 1), d(2025, 1, 31))];
        let proposed = DateRange { start: d(2025, 1, 1), end: d(2025, 2, 28) };

        assert!(ConflictChecker::check_local(&existing, "facility-1", None, &proposed, Some("slot-1")).available);
    }

    #[test]
    fn test_adjacent_ranges_do_not_conflict() {
        let existing = vec![definition("slot-1", None, d(2025, 1, 1), d(2025, 1, 31))];
        let proposed = DateRange { start: d(2025, 2, 1), end: d(2025, 2, 28) };
        assert!(ConflictChecker::check_local(&existing, "facility-1", None, &proposed, None).available);
    }

    #[test]
    fn test_earliest_conflict_is_reported() {
        let existing = vec![
            definition("slot-2", None, d(2025, 3, 1), d(2025, 3, 31)),
            definition("slot-1", None, d(2025, 1, 1), d(2025, 1, 31)),
        ];
        let proposed = DateRange { start: d(2025, 1, 1), end: d(2025, 12, 31) };
        let conflict = ConflictChecker::find_conflict(&existing, "facility-1", None, &proposed, None);
        assert_eq!(conflict.and_then(|c| c.slot_id.as_deref()), Some("slot-1"));
    }

    #[test]
    fn test_interpret_remote_answers() {
        assert!(ConflictChecker::interpret(&StatusResponse::success("ok")).available);

        let soft = StatusResponse {
            status: "failure".to_string(),
            message: Some("Slot already Exists for these dates".to_string()),
            ..StatusResponse::default()
        };
        assert_eq!(ConflictChecker::interpret(&soft).severity, ConflictSeverity::Warning);

        let hard = StatusResponse {
            status: "failure".to_string(),
            message: Some("Dates overlap".to_string()),
            conflicting_from: Some("01/01/2025".to_string()),
            conflicting_to: Some("31/01/2025".to_string()),
            ..StatusResponse::default()
        };
        let outcome = ConflictChecker::interpret(&hard);
        assert_eq!(outcome.severity, ConflictSeverity::Blocking);
        assert_eq!(
            outcome.conflicting_range,
            Some(DateRange { start: d(2025, 1, 1), end: d(2025, 1, 31) })
        );

        let unknown = StatusResponse {
            status: "error".to_string(),
            message: None,
            ..StatusResponse::default()
        };
        assert_eq!(ConflictChecker::interpret(&unknown).severity, ConflictSeverity::Blocking);
    }

    #[test]
    fn test_ensure_committable() {
        let warning = ConflictCheckOutcome::warning("exists");
        assert_matches!(
            ConflictChecker::ensure_committable(&warning, false),
            Err(SchedulingError::Conflict { .. })
        );
        assert!(ConflictChecker::ensure_committable(&warning, true).is_ok());

        let blocking = ConflictCheckOutcome::blocking(None, "overlap");
        assert_matches!(
            ConflictChecker::ensure_committable(&blocking, true),
            Err(SchedulingError::Conflict { .. })
        );
        assert!(ConflictChecker::ensure_committable(&ConflictCheckOutcome::available(), false).is_ok());
    }
}
