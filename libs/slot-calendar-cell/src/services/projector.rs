use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use tracing::{debug, warn};

use crate::models::{
    add_minutes, BookableSlot, BookingMode, BookingRecord, BookingSlotView, DateAvailabilityStatus,
    DateRange, QueueEntry, SlotDefinition, SlotOccupant, TemporaryAdjustment, TimeWindow,
};

/// What actually applies on one calendar date once any temporary adjustment
/// has been laid over the recurring definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayPlan {
    pub date: NaiveDate,
    pub slot_id: Option<String>,
    pub booking_mode: BookingMode,
    pub slot_duration_minutes: Option<u32>,
    pub windows: Vec<TimeWindow>,
    pub capacity_override: Option<u32>,
    pub closed: bool,
    pub adjusted: bool,
}

impl DayPlan {
    fn from_definition(date: NaiveDate, definition: &SlotDefinition) -> Self {
        Self {
            date,
            slot_id: definition.slot_id.clone(),
            booking_mode: definition.booking_mode,
            slot_duration_minutes: definition.slot_duration_minutes,
            windows: definition.windows_on(date).to_vec(),
            capacity_override: None,
            closed: false,
            adjusted: false,
        }
    }

    fn with_adjustment(
        date: NaiveDate,
        parent: &SlotDefinition,
        adjustment: &TemporaryAdjustment,
    ) -> Self {
        let windows = if adjustment.closed {
            Vec::new()
        } else {
            adjustment
                .windows
                .clone()
                .unwrap_or_else(|| parent.windows_on(date).to_vec())
        };

        Self {
            date,
            slot_id: Some(adjustment.slot_id.clone()),
            booking_mode: parent.booking_mode,
            slot_duration_minutes: parent.slot_duration_minutes,
            windows,
            capacity_override: if adjustment.closed { Some(0) } else { adjustment.capacity },
            closed: adjustment.closed,
            adjusted: true,
        }
    }
}

/// Derives calendar colouring and bookable slots from persisted definitions,
/// temporary adjustments and live bookings. Every call recomputes from
/// scratch.
pub struct AvailabilityProjector;

impl AvailabilityProjector {
    /// The single recurring definition in force on `date`.
    pub fn effective_definition<'a>(
        date: NaiveDate,
        definitions: &'a [SlotDefinition],
    ) -> Option<&'a SlotDefinition> {
        let mut covering = definitions.iter().filter(|definition| definition.covers(date));
        let first = covering.next();
        if first.is_some() && covering.next().is_some() {
            warn!("More than one slot definition covers {}, using the first", date);
        }
        first
    }

    pub fn effective_plan(
        date: NaiveDate,
        definitions: &[SlotDefinition],
        adjustments: &[TemporaryAdjustment],
    ) -> Option<DayPlan> {
        let adjustment_of = |definition: &SlotDefinition| {
            adjustments.iter().find(|a| {
                a.date == date && definition.slot_id.as_deref() == Some(a.slot_id.as_str())
            })
        };

        if let Some(definition) = Self::effective_definition(date, definitions) {
            return Some(match adjustment_of(definition) {
                Some(adjustment) => DayPlan::with_adjustment(date, definition, adjustment),
                None => DayPlan::from_definition(date, definition),
            });
        }

        // An adjustment may open a weekday its own definition leaves inactive.
        let opened = definitions
            .iter()
            .filter(|definition| definition.effective_range.contains(date))
            .find_map(|definition| adjustment_of(definition).map(|a| (definition, a)));
        if let Some((definition, adjustment)) = opened {
            return Some(DayPlan::with_adjustment(date, definition, adjustment));
        }

        if adjustments.iter().any(|a| a.date == date) {
            debug!("Ignoring adjustments on {} without a definition in force", date);
        }
        None
    }

    pub fn day_capacity(plan: &DayPlan) -> u32 {
        if plan.closed {
            return 0;
        }
        match plan.booking_mode {
            BookingMode::Timeslot => {
                let slots = plan
                    .slot_duration_minutes
                    .map(|minutes| plan.windows.iter().map(|w| w.slot_count(minutes)).sum())
                    .unwrap_or(0);
                // Expansion never yields more slots than the windows hold
                plan.capacity_override.map_or(slots, |capacity| capacity.min(slots))
            }
            BookingMode::Sequence => plan
                .capacity_override
                .unwrap_or_else(|| plan.windows.iter().map(|w| w.capacity).sum()),
        }
    }

    pub fn count_bookings(bookings: &[BookingRecord]) -> u32 {
        bookings.iter().filter(|b| b.status.holds_capacity()).count() as u32
    }

    pub fn classify(
        date: NaiveDate,
        definitions: &[SlotDefinition],
        adjustments: &[TemporaryAdjustment],
        booking_counts: &HashMap<NaiveDate, u32>,
    ) -> DateAvailabilityStatus {
        let Some(plan) = Self::effective_plan(date, definitions, adjustments) else {
            return DateAvailabilityStatus::NotConfigured;
        };

        let capacity = Self::day_capacity(&plan);
        let booked = booking_counts.get(&date).copied().unwrap_or(0);

        if booked >= capacity {
            DateAvailabilityStatus::Full
        } else if booked == 0 {
            DateAvailabilityStatus::Available
        } else {
            DateAvailabilityStatus::Partial
        }
    }

    pub fn classify_range(
        range: &DateRange,
        definitions: &[SlotDefinition],
        adjustments: &[TemporaryAdjustment],
        booking_counts: &HashMap<NaiveDate, u32>,
    ) -> BTreeMap<NaiveDate, DateAvailabilityStatus> {
        range
            .days()
            .map(|date| (date, Self::classify(date, definitions, adjustments, booking_counts)))
            .collect()
    }

    /// Expands one date of `definition` into bookable units. `adjustment`
    /// is ignored unless it belongs to `definition` and is for that date.
    pub fn expand(
        date: NaiveDate,
        definition: &SlotDefinition,
        adjustment: Option<&TemporaryAdjustment>,
        bookings: &[BookingRecord],
    ) -> BookingSlotView {
        let plan = match adjustment.filter(|a| {
            a.date == date && definition.slot_id.as_deref() == Some(a.slot_id.as_str())
        }) {
            Some(adjustment) => DayPlan::with_adjustment(date, definition, adjustment),
            None if definition.covers(date) => DayPlan::from_definition(date, definition),
            None => DayPlan {
                windows: Vec::new(),
                ..DayPlan::from_definition(date, definition)
            },
        };

        Self::expand_plan(&plan, bookings)
    }

    pub fn expand_plan(plan: &DayPlan, bookings: &[BookingRecord]) -> BookingSlotView {
        let active: Vec<&BookingRecord> = bookings.iter().filter(|b| b.status.holds_capacity()).collect();

        match plan.booking_mode {
            BookingMode::Timeslot => {
                let mut slots = match plan.slot_duration_minutes {
                    Some(minutes) if minutes > 0 => subdivide(&plan.windows, minutes),
                    _ => {
                        warn!("Timeslot plan for {} has no slot duration", plan.date);
                        Vec::new()
                    }
                };
                if let Some(capacity) = plan.capacity_override {
                    slots.truncate(capacity as usize);
                }

                let mut taken = vec![false; active.len()];
                for slot in slots.iter_mut() {
                    let found = active
                        .iter()
                        .enumerate()
                        .find(|(i, b)| !taken[*i] && b.start_time == Some(slot.start));
                    if let Some((i, booking)) = found {
                        taken[i] = true;
                        slot.occupant = Some(SlotOccupant::from(*booking));
                    }
                }
                let unplaced = taken.iter().filter(|t| !**t).count();
                if unplaced > 0 {
                    debug!("{} bookings on {} do not match any slot start", unplaced, plan.date);
                }

                BookingSlotView::Timeslot {
                    date: plan.date,
                    slots,
                }
            }
            BookingMode::Sequence => {
                let queue: Vec<QueueEntry> = active
                    .iter()
                    .enumerate()
                    .map(|(i, booking)| QueueEntry {
                        position: i as u32 + 1,
                        occupant: SlotOccupant::from(*booking),
                    })
                    .collect();

                BookingSlotView::Sequence {
                    date: plan.date,
                    capacity: Self::day_capacity(plan),
                    booked: queue.len() as u32,
                    queue,
                }
            }
        }
    }
}

/// Contiguous `minutes`-long blocks of each window, ascending; a trailing
/// remainder shorter than `minutes` is dropped.
fn subdivide(windows: &[TimeWindow], minutes: u32) -> Vec<BookableSlot> {
    let mut slots = Vec::new();
    for window in windows {
        let mut cursor = window.start;
        while let Some(end) = add_minutes(cursor, minutes as i64) {
            if end > window.end {
                break;
            }
            slots.push(BookableSlot {
                start: cursor,
                end,
                occupant: None,
            });
            cursor = end;
        }
    }
    slots.sort_by_key(|slot| slot.start);
    slots
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveTime, Weekday};

    use crate::models::{BookingStatus, WeeklyPattern};

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn monday() -> NaiveDate {
        d(2025, 1, 6)
    }

    fn timeslot_definition(window: TimeWindow, duration: u32) -> SlotDefinition {
        let mut pattern = WeeklyPattern::new();
        pattern.set(Weekday::Mon, vec![window]);
        pattern.set(Weekday::Wed, vec![window]);
        SlotDefinition {
            slot_id: Some("slot-1".to_string()),
            facility_id: "facility-1".to_string(),
            doctor_id: None,
            effective_range: DateRange { start: d(2025, 1, 1), end: d(2025, 1, 31) },
            booking_mode: BookingMode::Timeslot,
            per_weekday: pattern,
            slot_duration_minutes: Some(duration),
            version: Some(1),
        }
    }

    fn sequence_definition(capacity: u32) -> SlotDefinition {
        let mut definition = timeslot_definition(TimeWindow::new(t(9, 0), t(12, 0), capacity).unwrap(), 30);
        definition.booking_mode = BookingMode::Sequence;
        definition.slot_duration_minutes = None;
        definition
    }

    fn booking(id: &str, start: Option<NaiveTime>, status: BookingStatus) -> BookingRecord {
        BookingRecord {
            appointment_id: format!("apt-{}", id),
            patient_id: format!("pet-{}", id),
            patient_name: Some(format!("Pet {}", id)),
            start_time: start,
            end_time: None,
            status,
        }
    }

    fn counts(date: NaiveDate, booked: u32) -> HashMap<NaiveDate, u32> {
        HashMap::from([(date, booked)])
    }

    #[test]
    fn test_monday_window_expands_into_four_half_hours() {
        let definition = timeslot_definition(TimeWindow::new(t(9, 0), t(11, 0), 4).unwrap(), 30);

        let view = AvailabilityProjector::expand(monday(), &definition, None, &[]);
        let BookingSlotView::Timeslot { slots, .. } = view else {
            panic!("expected timeslot view");
        };

        let spans: Vec<_> = slots.iter().map(|s| (s.start, s.end)).collect();
        assert_eq!(
            spans,
            vec![
                (t(9, 0), t(9, 30)),
                (t(9, 30), t(10, 0)),
                (t(10, 0), t(10, 30)),
                (t(10, 30), t(11, 0)),
            ]
        );
    }

    #[test]
    fn test_uneven_window_truncates_remainder() {
        let window = TimeWindow::new(t(9, 0), t(10, 50), 0).unwrap();
        let definition = timeslot_definition(window, 20);

        let BookingSlotView::Timeslot { slots, .. } =
            AvailabilityProjector::expand(monday(), &definition, None, &[])
        else {
            panic!("expected timeslot view");
        };

        assert_eq!(slots.len() as i64, window.duration_minutes() / 20);
        for pair in slots.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
            assert!(pair[0].start < pair[1].start);
        }
        assert_eq!(slots.last().map(|s| s.end), Some(t(10, 40)));
    }

    #[test]
    fn test_bookings_occupy_matching_slots() {
        let definition = timeslot_definition(TimeWindow::new(t(9, 0), t(11, 0), 4).unwrap(), 30);
        let bookings = vec![
            booking("1", Some(t(9, 30)), BookingStatus::Arrived),
            booking("2", Some(t(10, 0)), BookingStatus::Cancelled),
            booking("3", Some(t(13, 0)), BookingStatus::Booked),
        ];

        let view = AvailabilityProjector::expand(monday(), &definition, None, &bookings);
        let BookingSlotView::Timeslot { slots, .. } = &view else {
            panic!("expected timeslot view");
        };

        let occupant = slots[1].occupant.as_ref().unwrap();
        assert_eq!(occupant.appointment_id, "apt-1");
        assert_eq!(occupant.status, BookingStatus::Arrived);
        assert!(slots[2].occupant.is_none());
        assert_eq!(view.free_places(), 3);
    }

    #[test]
    fn test_uncovered_date_expands_to_nothing() {
        let definition = timeslot_definition(TimeWindow::new(t(9, 0), t(11, 0), 4).unwrap(), 30);
        // Tuesday
        let view = AvailabilityProjector::expand(d(2025, 1, 7), &definition, None, &[]);
        assert_eq!(view.free_places(), 0);
    }

    #[test]
    fn test_sequence_classification() {
        let definitions = vec![sequence_definition(5)];
        let date = monday();

        let classify = |booked| AvailabilityProjector::classify(date, &definitions, &[], &counts(date, booked));

        assert_eq!(classify(0), DateAvailabilityStatus::Available);
        assert_eq!(classify(3), DateAvailabilityStatus::Partial);
        assert_eq!(classify(5), DateAvailabilityStatus::Full);
        assert_eq!(classify(7), DateAvailabilityStatus::Full);
    }

    #[test]
    fn test_sequence_expansion_keeps_arrival_order() {
        let definition = sequence_definition(5);
        let bookings = vec![
            booking("a", None, BookingStatus::Booked),
            booking("b", None, BookingStatus::Cancelled),
            booking("c", None, BookingStatus::Completed),
        ];

        let view = AvailabilityProjector::expand(monday(), &definition, None, &bookings);
        let BookingSlotView::Sequence { capacity, booked, queue, .. } = view else {
            panic!("expected sequence view");
        };

        assert_eq!((capacity, booked), (5, 2));
        assert_eq!(queue[0].occupant.patient_id, "pet-a");
        assert_eq!(queue[1].position, 2);
        assert_eq!(queue[1].occupant.patient_id, "pet-c");
    }

    #[test]
    fn test_not_configured_dates() {
        let definitions = vec![timeslot_definition(TimeWindow::new(t(9, 0), t(11, 0), 4).unwrap(), 30)];
        let empty = HashMap::new();

        // Tuesday: weekday inactive
        assert_eq!(
            AvailabilityProjector::classify(d(2025, 1, 7), &definitions, &[], &empty),
            DateAvailabilityStatus::NotConfigured
        );
        // Monday outside the effective range
        assert_eq!(
            AvailabilityProjector::classify(d(2025, 2, 3), &definitions, &[], &empty),
            DateAvailabilityStatus::NotConfigured
        );
        assert_eq!(
            AvailabilityProjector::classify(monday(), &[], &[], &empty),
            DateAvailabilityStatus::NotConfigured
        );
    }

    #[test]
    fn test_timeslot_capacity_is_slot_count() {
        let definitions = vec![timeslot_definition(TimeWindow::new(t(9, 0), t(11, 0), 4).unwrap(), 30)];
        let date = monday();

        assert_eq!(
            AvailabilityProjector::classify(date, &definitions, &[], &counts(date, 3)),
            DateAvailabilityStatus::Partial
        );
        assert_eq!(
            AvailabilityProjector::classify(date, &definitions, &[], &counts(date, 4)),
            DateAvailabilityStatus::Full
        );
    }

    #[test]
    fn test_adjustment_takes_precedence_only_on_its_date() {
        let definitions = vec![sequence_definition(5)];
        let adjusted_day = monday();
        let next_wednesday = d(2025, 1, 8);
        let adjustments = vec![TemporaryAdjustment {
            facility_id: "facility-1".to_string(),
            slot_id: "slot-1".to_string(),
            date: adjusted_day,
            windows: None,
            capacity: Some(2),
            closed: false,
        }];
        let booked = HashMap::from([(adjusted_day, 2), (next_wednesday, 2)]);

        assert_eq!(
            AvailabilityProjector::classify(adjusted_day, &definitions, &adjustments, &booked),
            DateAvailabilityStatus::Full
        );
        assert_eq!(
            AvailabilityProjector::classify(next_wednesday, &definitions, &adjustments, &booked),
            DateAvailabilityStatus::Partial
        );

        let view = AvailabilityProjector::expand(adjusted_day, &definitions[0], adjustments.first(), &[]);
        assert_matches::assert_matches!(view, BookingSlotView::Sequence { capacity: 2, .. });

        let other = AvailabilityProjector::expand(next_wednesday, &definitions[0], adjustments.first(), &[]);
        assert_matches::assert_matches!(other, BookingSlotView::Sequence { capacity: 5, .. });
    }

    #[test]
    fn test_adjustment_can_open_an_inactive_day_and_close_an_active_one() {
        let definitions = vec![timeslot_definition(TimeWindow::new(t(9, 0), t(11, 0), 4).unwrap(), 30)];
        let tuesday = d(2025, 1, 7);
        let adjustments = vec![
            TemporaryAdjustment {
                facility_id: "facility-1".to_string(),
                slot_id: "slot-1".to_string(),
                date: tuesday,
                windows: Some(vec![TimeWindow::new(t(14, 0), t(15, 0), 2).unwrap()]),
                capacity: None,
                closed: false,
            },
            TemporaryAdjustment {
                facility_id: "facility-1".to_string(),
                slot_id: "slot-1".to_string(),
                date: monday(),
                windows: None,
                capacity: None,
                closed: true,
            },
        ];
        let empty = HashMap::new();

        assert_eq!(
            AvailabilityProjector::classify(tuesday, &definitions, &adjustments, &empty),
            DateAvailabilityStatus::Available
        );
        assert_eq!(
            AvailabilityProjector::classify(monday(), &definitions, &adjustments, &empty),
            DateAvailabilityStatus::Full
        );

        let view = AvailabilityProjector::expand(tuesday, &definitions[0], adjustments.first(), &[]);
        let BookingSlotView::Timeslot { slots, .. } = view else {
            panic!("expected timeslot view");
        };
        assert_eq!(slots.len(), 2);
        assert_eq!(slots[0].start, t(14, 0));

        let closed = AvailabilityProjector::expand(monday(), &definitions[0], adjustments.get(1), &[]);
        assert_eq!(closed.free_places(), 0);
    }

    #[test]
    fn test_capacity_override_limits_timeslots() {
        let definition = timeslot_definition(TimeWindow::new(t(9, 0), t(11, 0), 4).unwrap(), 30);
        let adjustment = TemporaryAdjustment {
            facility_id: "facility-1".to_string(),
            slot_id: "slot-1".to_string(),
            date: monday(),
            windows: None,
            capacity: Some(2),
            closed: false,
        };

        let view = AvailabilityProjector::expand(monday(), &definition, Some(&adjustment), &[]);
        assert_eq!(view.free_places(), 2);
    }

    #[test]
    fn test_classify_range_is_ordered() {
        let definitions = vec![sequence_definition(5)];
        let range = DateRange { start: d(2025, 1, 6), end: d(2025, 1, 8) };
        let statuses = AvailabilityProjector::classify_range(&range, &definitions, &[], &HashMap::new());

        let values: Vec<_> = statuses.values().copied().collect();
        assert_eq!(
            values,
            vec![
                DateAvailabilityStatus::Available,
                DateAvailabilityStatus::NotConfigured,
                DateAvailabilityStatus::Available,
            ]
        );
    }

    #[test]
    fn test_adjustment_only_overrides_its_own_definition() {
        let january = sequence_definition(5);
        let mut february = sequence_definition(3);
        february.slot_id = Some("slot-2".to_string());
        february.effective_range = DateRange { start: d(2025, 2, 1), end: d(2025, 2, 28) };
        let definitions = vec![january, february];

        let february_monday = d(2025, 2, 3);
        let foreign = vec![TemporaryAdjustment {
            facility_id: "facility-1".to_string(),
            slot_id: "slot-1".to_string(),
            date: february_monday,
            windows: None,
            capacity: None,
            closed: true,
        }];

        assert_eq!(
            AvailabilityProjector::classify(february_monday, &definitions, &foreign, &HashMap::new()),
            DateAvailabilityStatus::Available
        );
        let plan = AvailabilityProjector::effective_plan(february_monday, &definitions, &foreign).unwrap();
        assert_eq!(plan.slot_id.as_deref(), Some("slot-2"));
        assert!(!plan.adjusted);

        let view = AvailabilityProjector::expand(february_monday, &definitions[1], foreign.first(), &[]);
        assert_eq!(view.free_places(), 3);

        // Outside any definition's range the adjustment has nothing to override
        let orphan_day = d(2025, 3, 3);
        let orphan = vec![TemporaryAdjustment { date: orphan_day, ..foreign[0].clone() }];
        assert_eq!(AvailabilityProjector::effective_plan(orphan_day, &definitions, &orphan), None);
    }

    #[test]
    fn test_capacity_override_never_exceeds_slot_count() {
        let definitions = vec![timeslot_definition(TimeWindow::new(t(9, 0), t(11, 0), 4).unwrap(), 30)];
        let adjustments = vec![TemporaryAdjustment {
            facility_id: "facility-1".to_string(),
            slot_id: "slot-1".to_string(),
            date: monday(),
            windows: None,
            capacity: Some(10),
            closed: false,
        }];

        let plan = AvailabilityProjector::effective_plan(monday(), &definitions, &adjustments).unwrap();
        assert_eq!(AvailabilityProjector::day_capacity(&plan), 4);
        assert_eq!(
            AvailabilityProjector::classify(monday(), &definitions, &adjustments, &counts(monday(), 4)),
            DateAvailabilityStatus::Full
        );

        let view = AvailabilityProjector::expand_plan(&plan, &[]);
        assert_eq!(view.free_places(), 4);
    }
}
