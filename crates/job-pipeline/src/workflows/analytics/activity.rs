use std::collections::BTreeMap;

use chrono::{DateTime, Days, FixedOffset, NaiveDate, Utc};

use super::views::{ActivityDayView, ActivityView};
use super::{log_skipped, ordered_entries};
use crate::workflows::applications::{
    ApplicationHistory, ApplicationId, IntegrityViolation, StatusHistoryEntry,
};

/// Streaming fold bucketing each application by the day of its first entry.
#[derive(Debug)]
pub struct ActivityAggregator {
    offset: FixedOffset,
    days: BTreeMap<NaiveDate, u32>,
    skipped: Vec<IntegrityViolation>,
}

impl ActivityAggregator {
    /// `offset` fixes the timezone in which timestamps are cut into days.
    pub fn new(offset: FixedOffset) -> Self {
        Self {
            offset,
            days: BTreeMap::new(),
            skipped: Vec::new(),
        }
    }

    pub fn push(&mut self, history: &ApplicationHistory) {
        self.push_entries(history.id(), &history.entries);
    }

    pub fn push_entries(&mut self, application_id: ApplicationId, entries: &[StatusHistoryEntry]) {
        match ordered_entries(application_id, entries) {
            Ok(entries) => {
                let day = local_day(entries[0].timestamp, self.offset);
                *self.days.entry(day).or_default() += 1;
            }
            Err(violation) => {
                log_skipped("activity", &violation);
                self.skipped.push(violation);
            }
        }
    }

    pub fn extend<'a, I>(&mut self, histories: I)
    where
        I: IntoIterator<Item = &'a ApplicationHistory>,
    {
        for history in histories {
            self.push(history);
        }
    }

    pub fn finish(self) -> ActivityCalendar {
        let mut skipped = self.skipped;
        skipped.sort();
        ActivityCalendar {
            offset: self.offset,
            days: self.days,
            skipped,
        }
    }
}

/// Day to application-count mapping. Days without activity are absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityCalendar {
    offset: FixedOffset,
    days: BTreeMap<NaiveDate, u32>,
    skipped: Vec<IntegrityViolation>,
}

impl ActivityCalendar {
    pub fn from_histories<'a, I>(histories: I, offset: FixedOffset) -> Self
    where
        I: IntoIterator<Item = &'a ApplicationHistory>,
    {
        let mut aggregator = ActivityAggregator::new(offset);
        aggregator.extend(histories);
        aggregator.finish()
    }

    pub fn days(&self) -> &BTreeMap<NaiveDate, u32> {
        &self.days
    }

    pub fn count_on(&self, day: NaiveDate) -> u32 {
        self.days.get(&day).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u32 {
        self.days.values().sum()
    }

    pub fn skipped(&self) -> &[IntegrityViolation] {
        &self.skipped
    }

    /// Applications whose activity day is one of the `window_days` days ending
    /// on `now`'s day. Future days are not counted.
    pub fn recent_count(&self, now: DateTime<Utc>, window_days: u32) -> u32 {
        if window_days == 0 {
            return 0;
        }
        let today = local_day(now, self.offset);
        // Windows reaching past the calendar start cover every recorded day.
        let first = today
            .checked_sub_days(Days::new(u64::from(window_days) - 1))
            .unwrap_or(NaiveDate::MIN);
        self.days.range(first..=today).map(|(_, count)| count).sum()
    }

    pub fn view(&self, now: DateTime<Utc>, window_days: u32) -> ActivityView {
        ActivityView {
            days: self
                .days
                .iter()
                .map(|(&date, &count)| ActivityDayView { date, count })
                .collect(),
            total: self.total(),
            recent_count: self.recent_count(now, window_days),
            recent_window_days: window_days,
            skipped: self.skipped.clone(),
        }
    }
}

fn local_day(timestamp: DateTime<Utc>, offset: FixedOffset) -> NaiveDate {
    timestamp.with_timezone(&offset).date_naive()
}
