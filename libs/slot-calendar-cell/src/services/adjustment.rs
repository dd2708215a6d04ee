use std::collections::BTreeMap;

use chrono::NaiveDate;
use tracing::debug;

use crate::error::SchedulingError;
use crate::models::{AdjustmentOverride, TemporaryAdjustment};

/// Date-scoped overrides for one slot definition. Applying or reverting an
/// override never touches the recurring pattern itself.
#[derive(Debug, Clone, Default)]
pub struct AdjustmentLedger {
    facility_id: String,
    slot_id: String,
    by_date: BTreeMap<NaiveDate, TemporaryAdjustment>,
}

impl AdjustmentLedger {
    pub fn new(facility_id: impl Into<String>, slot_id: impl Into<String>) -> Self {
        Self {
            facility_id: facility_id.into(),
            slot_id: slot_id.into(),
            by_date: BTreeMap::new(),
        }
    }

    pub fn slot_id(&self) -> &str {
        &self.slot_id
    }

    /// Builds the override record for `date` without storing it.
    pub fn prepare(
        facility_id: &str,
        slot_id: &str,
        date: NaiveDate,
        change: AdjustmentOverride,
    ) -> Result<TemporaryAdjustment, SchedulingError> {
        if !change.closed && change.windows.is_none() && change.capacity.is_none() {
            return Err(SchedulingError::Validation(
                "An adjustment needs windows, a capacity or a closure".to_string(),
            ));
        }

        let windows = match change.windows {
            Some(mut windows) if !change.closed => {
                windows.sort_by_key(|w| w.start);
                for window in &windows {
                    if window.start >= window.end {
                        return Err(SchedulingError::Validation(format!(
                            "Adjusted window {}-{} ends before it starts",
                            window.start.format("%H:%M"),
                            window.end.format("%H:%M")
                        )));
                    }
                }
                if windows.windows(2).any(|pair| pair[1].start < pair[0].end) {
                    return Err(SchedulingError::Validation(
                        "Adjusted windows overlap".to_string(),
                    ));
                }
                Some(windows)
            }
            _ => None,
        };

        Ok(TemporaryAdjustment {
            facility_id: facility_id.to_string(),
            slot_id: slot_id.to_string(),
            date,
            windows,
            capacity: if change.closed { None } else { change.capacity },
            closed: change.closed,
        })
    }

    pub fn apply(
        &mut self,
        date: NaiveDate,
        change: AdjustmentOverride,
    ) -> Result<TemporaryAdjustment, SchedulingError> {
        let adjustment = Self::prepare(&self.facility_id, &self.slot_id, date, change)?;
        if self.by_date.insert(date, adjustment.clone()).is_some() {
            debug!("Replaced existing adjustment for slot {} on {}", self.slot_id, date);
        }
        Ok(adjustment)
    }

    pub fn revert(&mut self, date: NaiveDate) -> Result<TemporaryAdjustment, SchedulingError> {
        self.by_date.remove(&date).ok_or_else(|| {
            SchedulingError::NotFound(format!(
                "No adjustment for slot {} on {}",
                self.slot_id, date
            ))
        })
    }

    pub fn get(&self, date: NaiveDate) -> Option<&TemporaryAdjustment> {
        self.by_date.get(&date)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TemporaryAdjustment> {
        self.by_date.values()
    }

    pub fn is_empty(&self) -> bool {
        self.by_date.is_empty()
    }
}
