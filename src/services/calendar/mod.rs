pub mod google;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};

// An occupied window on the shared shop calendar, half-open [start, end).
#[derive(Debug, Clone, PartialEq)]
pub struct EventWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewEvent {
    pub summary: String,
    pub description: String,
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
    pub timezone: String,
}

#[async_trait]
pub trait CalendarProvider: Send + Sync {
    // Returns every event overlapping [time_min, time_max).
    async fn list_events(
        &self,
        calendar_id: &str,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
    ) -> anyhow::Result<Vec<EventWindow>>;

    async fn insert_event(&self, calendar_id: &str, event: &NewEvent) -> anyhow::Result<String>;
}
