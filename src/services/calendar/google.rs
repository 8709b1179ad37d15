use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::json;

use super::{CalendarProvider, EventWindow, NewEvent};

pub struct GoogleCalendarProvider {
    api_token: String,
    base_url: String,
    client: reqwest::Client,
}

impl GoogleCalendarProvider {
    pub fn new(api_token: String) -> Self {
        Self::with_base_url(api_token, "https://www.googleapis.com/calendar/v3".to_string())
    }

    pub fn with_base_url(api_token: String, base_url: String) -> Self {
        Self {
            api_token,
            base_url,
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
        }
    }
}

// Event boundaries arrive either as an RFC 3339 "dateTime" or, for all-day
// events, a bare "date".
fn parse_event_boundary(value: &serde_json::Value) -> Option<DateTime<Utc>> {
    if let Some(dt) = value.get("dateTime").and_then(|v| v.as_str()) {
        return DateTime::parse_from_rfc3339(dt)
            .ok()
            .map(|dt| dt.with_timezone(&Utc));
    }
    let date = value.get("date").and_then(|v| v.as_str())?;
    let date = NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()?;
    Some(DateTime::from_naive_utc_and_offset(
        date.and_hms_opt(0, 0, 0)?,
        Utc,
    ))
}

#[async_trait]
impl CalendarProvider for GoogleCalendarProvider {
    async fn list_events(
        &self,
        calendar_id: &str,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
    ) -> anyhow::Result<Vec<EventWindow>> {
        let url = format!("{}/calendars/{}/events", self.base_url, calendar_id);

        let resp = self
            .client
            .get(&url)
            .bearer_auth(&self.api_token)
            .query(&[
                ("timeMin", time_min.to_rfc3339().as_str()),
                ("timeMax", time_max.to_rfc3339().as_str()),
                ("singleEvents", "true"),
                ("orderBy", "startTime"),
            ])
            .send()
            .await
            .context("failed to list calendar events")?;

        let status = resp.status();
        let data: serde_json::Value = resp
            .json()
            .await
            .context("failed to parse calendar list response")?;

        if !status.is_success() {
            anyhow::bail!("calendar API error ({}): {}", status, data);
        }

        let mut events = vec![];
        for item in data["items"].as_array().map(Vec::as_slice).unwrap_or(&[]) {
            let (Some(start), Some(end)) = (
                parse_event_boundary(&item["start"]),
                parse_event_boundary(&item["end"]),
            ) else {
                tracing::warn!("skipping calendar event with unparseable boundaries");
                continue;
            };
            events.push(EventWindow { start, end });
        }
        Ok(events)
    }

    async fn insert_event(&self, calendar_id: &str, event: &NewEvent) -> anyhow::Result<String> {
        let url = format!("{}/calendars/{}/events", self.base_url, calendar_id);

        let body = json!({
            "summary": event.summary,
            "description": event.description,
            "start": { "dateTime": event.start.to_rfc3339(), "timeZone": event.timezone },
            "end": { "dateTime": event.end.to_rfc3339(), "timeZone": event.timezone },
        });

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_token)
            .json(&body)
            .send()
            .await
            .context("failed to insert calendar event")?;

        let status = resp.status();
        let data: serde_json::Value = resp
            .json()
            .await
            .context("failed to parse calendar insert response")?;

        if !status.is_success() {
            anyhow::bail!("calendar API error ({}): {}", status, data);
        }

        data["id"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| anyhow::anyhow!("missing id in calendar insert response"))
    }
}
