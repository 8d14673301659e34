//! Read-side folds over application histories: the stage flow graph and the
//! per-day activity calendar.

mod activity;
mod flow;
pub mod views;

use std::borrow::Cow;

use tracing::{debug, warn};

use super::applications::{ApplicationId, IntegrityViolation, StatusHistoryEntry};

pub use activity::{ActivityAggregator, ActivityCalendar};
pub use flow::{EdgeKey, FlowGraph, TransitionGraphBuilder};

/// Entries of one application in timestamp order, or the reason the application
/// must be left out of an aggregation.
pub(crate) fn ordered_entries(
    application_id: ApplicationId,
    entries: &[StatusHistoryEntry],
) -> Result<Cow<'_, [StatusHistoryEntry]>, IntegrityViolation> {
    if entries.is_empty() {
        return Err(IntegrityViolation::MissingHistory { application_id });
    }

    if let Some(stray) = entries
        .iter()
        .find(|entry| entry.application_id != application_id)
    {
        return Err(IntegrityViolation::OrphanHistory {
            application_id: stray.application_id,
        });
    }

    let ordered = entries
        .windows(2)
        .all(|pair| pair[0].timestamp <= pair[1].timestamp);
    if ordered {
        return Ok(Cow::Borrowed(entries));
    }

    debug!(application_id = %application_id, "re-sorting out of order history");
    let mut entries = entries.to_vec();
    entries.sort_by_key(|entry| entry.timestamp);
    Ok(Cow::Owned(entries))
}

pub(crate) fn log_skipped(aggregation: &'static str, violation: &IntegrityViolation) {
    warn!(aggregation, %violation, "skipping application in aggregation");
}
