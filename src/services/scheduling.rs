use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Timelike, Utc, Weekday};
use chrono_tz::Tz;

use crate::services::calendar::{CalendarProvider, EventWindow};
use crate::services::parsers;

pub const SHOP_OPEN_HOUR: u32 = 10;
pub const SHOP_CLOSE_HOUR: u32 = 18;
const SEARCH_HORIZON_DAYS: i64 = 30;
const SUGGESTED_SLOT_COUNT: usize = 3;

#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    #[error("Please provide a valid time during shop hours (Monday-Saturday 10 AM-6 PM) in the format: MONTH DAY TIME.")]
    OutsideShopHours,

    #[error("That time is already booked. Please choose another.")]
    Conflict,

    #[error(transparent)]
    Calendar(#[from] anyhow::Error),
}

pub fn service_duration(hours: f64) -> Duration {
    Duration::minutes((hours * 60.0).round() as i64)
}

// Shop hours: Monday-Saturday, appointments start at 10:00 or later and must
// end by 18:00 sharp.
pub fn within_shop_hours(start: DateTime<Tz>, duration_hours: f64) -> bool {
    if start.weekday() == Weekday::Sun {
        return false;
    }
    if start.hour() < SHOP_OPEN_HOUR {
        return false;
    }
    let end = start + service_duration(duration_hours);
    if end.hour() > SHOP_CLOSE_HOUR || (end.hour() == SHOP_CLOSE_HOUR && end.minute() > 0) {
        return false;
    }
    true
}

// Half-open overlap: [start, end) collides with [ev.start, ev.end).
fn overlaps(start: DateTime<Utc>, end: DateTime<Utc>, ev: &EventWindow) -> bool {
    start < ev.end && end > ev.start
}

pub struct SlotPlanner<'a> {
    calendar: &'a dyn CalendarProvider,
    calendar_id: &'a str,
}

impl<'a> SlotPlanner<'a> {
    pub fn new(calendar: &'a dyn CalendarProvider, calendar_id: &'a str) -> Self {
        Self {
            calendar,
            calendar_id,
        }
    }

    pub async fn is_slot_available(
        &self,
        start: DateTime<Tz>,
        end: DateTime<Tz>,
    ) -> anyhow::Result<bool> {
        let (start, end) = (start.with_timezone(&Utc), end.with_timezone(&Utc));
        let events = self
            .calendar
            .list_events(self.calendar_id, start, end)
            .await?;
        // The provider is asked for exactly the window, but overlap is still
        // checked locally against each returned event.
        Ok(!events.iter().any(|ev| overlaps(start, end, ev)))
    }

    pub async fn validate(
        &self,
        start: DateTime<Tz>,
        duration_hours: f64,
    ) -> Result<(), ScheduleError> {
        if !within_shop_hours(start, duration_hours) {
            return Err(ScheduleError::OutsideShopHours);
        }
        let end = start + service_duration(duration_hours);
        if !self.is_slot_available(start, end).await? {
            return Err(ScheduleError::Conflict);
        }
        Ok(())
    }

    pub async fn find_next_available_slots(
        &self,
        duration_hours: f64,
        count: usize,
        now: DateTime<Tz>,
    ) -> anyhow::Result<Vec<DateTime<Tz>>> {
        let tz = now.timezone();
        let mut slots: Vec<DateTime<Tz>> = vec![];

        for day_offset in 0..SEARCH_HORIZON_DAYS {
            if slots.len() >= count {
                break;
            }
            let date = now.date_naive() + Duration::days(day_offset);
            if date.weekday() == Weekday::Sun {
                continue;
            }

            let candidates: Vec<_> = day_candidates(date, duration_hours, tz)
                .into_iter()
                .filter(|(start, _)| *start >= now)
                .collect();
            if candidates.is_empty() {
                continue;
            }

            let events = self.day_events(date, tz).await?;
            for (start, end) in candidates {
                if !within_shop_hours(start, duration_hours) {
                    continue;
                }
                if events
                    .iter()
                    .any(|ev| overlaps(start.with_timezone(&Utc), end.with_timezone(&Utc), ev))
                {
                    continue;
                }
                slots.push(start);
                if slots.len() >= count {
                    break;
                }
            }
        }

        Ok(slots)
    }

    pub async fn get_available_times_for_date(
        &self,
        date_text: &str,
        duration_hours: f64,
        now: DateTime<Tz>,
    ) -> anyhow::Result<Vec<DateTime<Tz>>> {
        let tz = now.timezone();
        let Some(target) = parsers::parse_datetime(date_text, true, now) else {
            return Ok(vec![]);
        };

        let date = target.date_naive();
        if date.weekday() == Weekday::Sun {
            return Ok(vec![]);
        }

        let candidates = day_candidates(date, duration_hours, tz);
        if candidates.is_empty() {
            return Ok(vec![]);
        }

        let events = self.day_events(date, tz).await?;
        let times = candidates
            .into_iter()
            .filter(|(start, _)| *start > now && within_shop_hours(*start, duration_hours))
            .filter(|(start, end)| {
                !events
                    .iter()
                    .any(|ev| overlaps(start.with_timezone(&Utc), end.with_timezone(&Utc), ev))
            })
            .map(|(start, _)| start)
            .collect();
        Ok(times)
    }

    pub async fn handle_try_date_request(
        &self,
        message: &str,
        duration_hours: f64,
        now: DateTime<Tz>,
    ) -> anyhow::Result<Option<String>> {
        let Some(date_text) = parsers::parse_try_date(message) else {
            return Ok(None);
        };

        let Some(parsed) = parsers::parse_datetime(&date_text, true, now) else {
            return Ok(Some(
                "Sorry, I couldn't understand that date. Try a format like 'Try August 5'."
                    .to_string(),
            ));
        };

        let times = self
            .get_available_times_for_date(&date_text, duration_hours, now)
            .await?;
        if times.is_empty() {
            return Ok(Some(format!(
                "Sorry, there are no available appointment times on {}.",
                parsed.format("%B %d")
            )));
        }

        let times_list = times
            .iter()
            .map(|t| t.format("%I:%M %p").to_string())
            .collect::<Vec<_>>()
            .join("\n");
        Ok(Some(format!(
            "Here are the available times for {}:\n\n{}\n\n\
             Please type the full date and time you'd like in this format: MONTH DAY TIME. \
             Or, check availability for another day using the same 'Try MONTH DAY' format you just used.",
            parsed.format("%B %d"),
            times_list
        )))
    }

    // The prompt shown when the dialogue first asks for a date/time. Slot
    // search failures degrade to the format-only prompt instead of failing
    // the turn.
    pub async fn datetime_prompt(&self, duration_hours: f64, now: DateTime<Tz>) -> String {
        const BASE: &str = "When would you like to bring it in? Please specify a date and time. \
                            Use this format: MONTH DAY TIME (e.g., August 3 at 2 PM).";

        let slots = match self
            .find_next_available_slots(duration_hours, SUGGESTED_SLOT_COUNT, now)
            .await
        {
            Ok(slots) => slots,
            Err(e) => {
                tracing::error!(error = %e, "slot search failed, omitting suggestions");
                return BASE.to_string();
            }
        };

        if slots.is_empty() {
            return format!(
                "{BASE} Unfortunately, we couldn't find open time slots in the next few weeks, \
                 so please try again later or contact the shop."
            );
        }

        let suggestions = slots
            .iter()
            .map(|dt| dt.format("%B %d at %I:%M %p").to_string())
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "{BASE}\n\nOur soonest available appointments are: {suggestions}. \
             You can also check availability for other days by typing 'Try MONTH DAY' \
             (e.g., Try August 10)"
        )
    }

    // One range query covering the whole shop day; callers filter locally.
    async fn day_events(&self, date: NaiveDate, tz: Tz) -> anyhow::Result<Vec<EventWindow>> {
        let (Some(open), Some(close)) = (
            local_at_hour(date, SHOP_OPEN_HOUR, tz),
            local_at_hour(date, SHOP_CLOSE_HOUR, tz),
        ) else {
            return Ok(vec![]);
        };
        self.calendar
            .list_events(
                self.calendar_id,
                open.with_timezone(&Utc),
                close.with_timezone(&Utc),
            )
            .await
    }
}

fn local_at_hour(date: NaiveDate, hour: u32, tz: Tz) -> Option<DateTime<Tz>> {
    let naive = date.and_hms_opt(hour, 0, 0)?;
    tz.from_local_datetime(&naive).earliest()
}

// Hourly start candidates for one day, each paired with its end, capped so
// the appointment ends by closing time.
fn day_candidates(date: NaiveDate, duration_hours: f64, tz: Tz) -> Vec<(DateTime<Tz>, DateTime<Tz>)> {
    let mut candidates = vec![];
    for hour in SHOP_OPEN_HOUR..SHOP_CLOSE_HOUR {
        let Some(start) = local_at_hour(date, hour, tz) else {
            continue;
        };
        let end = start + service_duration(duration_hours);
        if end.hour() > SHOP_CLOSE_HOUR || (end.hour() == SHOP_CLOSE_HOUR && end.minute() > 0) {
            continue;
        }
        candidates.push((start, end));
    }
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    use crate::services::calendar::NewEvent;

    struct MockCalendar {
        events: Mutex<Vec<EventWindow>>,
    }

    impl MockCalendar {
        fn new(events: Vec<EventWindow>) -> Self {
            Self {
                events: Mutex::new(events),
            }
        }

        fn empty() -> Self {
            Self::new(vec![])
        }
    }

    #[async_trait]
    impl CalendarProvider for MockCalendar {
        async fn list_events(
            &self,
            _calendar_id: &str,
            time_min: DateTime<Utc>,
            time_max: DateTime<Utc>,
        ) -> anyhow::Result<Vec<EventWindow>> {
            Ok(self
                .events
                .lock()
                .unwrap()
                .iter()
                .filter(|ev| time_min < ev.end && time_max > ev.start)
                .cloned()
                .collect())
        }

        async fn insert_event(
            &self,
            _calendar_id: &str,
            event: &NewEvent,
        ) -> anyhow::Result<String> {
            self.events.lock().unwrap().push(EventWindow {
                start: event.start.with_timezone(&Utc),
                end: event.end.with_timezone(&Utc),
            });
            Ok("evt-1".to_string())
        }
    }

    fn tz() -> Tz {
        "America/Chicago".parse().unwrap()
    }

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Tz> {
        tz().with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    fn window(start: DateTime<Tz>, end: DateTime<Tz>) -> EventWindow {
        EventWindow {
            start: start.with_timezone(&Utc),
            end: end.with_timezone(&Utc),
        }
    }

    // Monday, June 3 2030.
    fn monday_morning() -> DateTime<Tz> {
        at(2030, 6, 3, 9, 0)
    }

    #[test]
    fn test_sunday_is_always_closed() {
        // June 9 2030 is a Sunday.
        assert!(!within_shop_hours(at(2030, 6, 9, 10, 0), 1.0));
        assert!(!within_shop_hours(at(2030, 6, 9, 12, 0), 0.0));
    }

    #[test]
    fn test_start_before_opening_rejected() {
        assert!(!within_shop_hours(at(2030, 6, 3, 9, 0), 1.0));
    }

    #[test]
    fn test_end_past_closing_rejected() {
        assert!(!within_shop_hours(at(2030, 6, 3, 17, 0), 2.0));
        assert!(!within_shop_hours(at(2030, 6, 3, 17, 30), 1.0));
    }

    #[test]
    fn test_end_exactly_at_closing_allowed() {
        assert!(within_shop_hours(at(2030, 6, 3, 16, 0), 2.0));
        assert!(within_shop_hours(at(2030, 6, 3, 17, 0), 1.0));
    }

    #[test]
    fn test_zero_duration_within_hours() {
        assert!(within_shop_hours(at(2030, 6, 3, 10, 0), 0.0));
    }

    #[tokio::test]
    async fn test_find_slots_empty_calendar() {
        let calendar = MockCalendar::empty();
        let planner = SlotPlanner::new(&calendar, "cal");

        let slots = planner
            .find_next_available_slots(2.0, 3, monday_morning())
            .await
            .unwrap();

        assert_eq!(
            slots,
            vec![at(2030, 6, 3, 10, 0), at(2030, 6, 3, 11, 0), at(2030, 6, 3, 12, 0)]
        );
    }

    #[tokio::test]
    async fn test_find_slots_strictly_increasing_and_capped() {
        let calendar = MockCalendar::empty();
        let planner = SlotPlanner::new(&calendar, "cal");

        let slots = planner
            .find_next_available_slots(1.0, 10, monday_morning())
            .await
            .unwrap();

        assert_eq!(slots.len(), 10);
        for pair in slots.windows(2) {
            assert!(pair[0] < pair[1]);
        }
        for slot in &slots {
            assert!(within_shop_hours(*slot, 1.0));
        }
    }

    #[tokio::test]
    async fn test_find_slots_skips_busy_hours() {
        let calendar = MockCalendar::new(vec![window(
            at(2030, 6, 3, 11, 0),
            at(2030, 6, 3, 12, 0),
        )]);
        let planner = SlotPlanner::new(&calendar, "cal");

        let slots = planner
            .find_next_available_slots(1.0, 3, monday_morning())
            .await
            .unwrap();

        assert_eq!(
            slots,
            vec![at(2030, 6, 3, 10, 0), at(2030, 6, 3, 12, 0), at(2030, 6, 3, 13, 0)]
        );
    }

    #[tokio::test]
    async fn test_find_slots_skips_sunday() {
        // Saturday June 8 2030, late enough that only Monday remains.
        let calendar = MockCalendar::empty();
        let planner = SlotPlanner::new(&calendar, "cal");
        let now = at(2030, 6, 8, 17, 30);

        let slots = planner.find_next_available_slots(1.0, 1, now).await.unwrap();

        assert_eq!(slots, vec![at(2030, 6, 10, 10, 0)]);
    }

    #[tokio::test]
    async fn test_find_slots_discards_past_candidates() {
        let calendar = MockCalendar::empty();
        let planner = SlotPlanner::new(&calendar, "cal");
        let now = at(2030, 6, 3, 10, 30);

        let slots = planner.find_next_available_slots(1.0, 1, now).await.unwrap();

        assert_eq!(slots, vec![at(2030, 6, 3, 11, 0)]);
    }

    #[tokio::test]
    async fn test_long_service_limits_start_hours() {
        let calendar = MockCalendar::empty();
        let planner = SlotPlanner::new(&calendar, "cal");

        let slots = planner
            .find_next_available_slots(8.0, 5, monday_morning())
            .await
            .unwrap();

        // An 8-hour job only fits the 10:00 start; one slot per day.
        assert_eq!(slots.len(), 5);
        for slot in &slots {
            assert_eq!(slot.hour(), 10);
        }
    }

    #[tokio::test]
    async fn test_validate_conflict() {
        let calendar = MockCalendar::new(vec![window(
            at(2030, 6, 3, 14, 0),
            at(2030, 6, 3, 16, 0),
        )]);
        let planner = SlotPlanner::new(&calendar, "cal");

        let result = planner.validate(at(2030, 6, 3, 15, 0), 2.0).await;
        assert!(matches!(result, Err(ScheduleError::Conflict)));

        // Adjacent appointment starting exactly at the event end is fine.
        assert!(planner.validate(at(2030, 6, 3, 16, 0), 2.0).await.is_ok());
    }

    #[tokio::test]
    async fn test_validate_outside_hours_takes_priority() {
        let calendar = MockCalendar::empty();
        let planner = SlotPlanner::new(&calendar, "cal");

        let result = planner.validate(at(2030, 6, 9, 11, 0), 1.0).await;
        assert!(matches!(result, Err(ScheduleError::OutsideShopHours)));
    }

    #[tokio::test]
    async fn test_times_for_date() {
        let calendar = MockCalendar::new(vec![window(
            at(2030, 6, 10, 10, 0),
            at(2030, 6, 10, 12, 0),
        )]);
        let planner = SlotPlanner::new(&calendar, "cal");

        let times = planner
            .get_available_times_for_date("june 10", 2.0, monday_morning())
            .await
            .unwrap();

        // 2-hour job: starts 10:00-16:00, minus the 10:00-12:00 block.
        assert_eq!(
            times,
            vec![
                at(2030, 6, 10, 12, 0),
                at(2030, 6, 10, 13, 0),
                at(2030, 6, 10, 14, 0),
                at(2030, 6, 10, 15, 0),
                at(2030, 6, 10, 16, 0),
            ]
        );
    }

    #[tokio::test]
    async fn test_times_for_sunday_empty() {
        let calendar = MockCalendar::empty();
        let planner = SlotPlanner::new(&calendar, "cal");

        let times = planner
            .get_available_times_for_date("june 9", 1.0, monday_morning())
            .await
            .unwrap();
        assert!(times.is_empty());
    }

    #[tokio::test]
    async fn test_times_for_unparseable_empty() {
        let calendar = MockCalendar::empty();
        let planner = SlotPlanner::new(&calendar, "cal");

        let times = planner
            .get_available_times_for_date("not a date", 1.0, monday_morning())
            .await
            .unwrap();
        assert!(times.is_empty());
    }

    #[tokio::test]
    async fn test_try_date_request_lists_times() {
        let calendar = MockCalendar::empty();
        let planner = SlotPlanner::new(&calendar, "cal");

        let reply = planner
            .handle_try_date_request("Try June 10", 2.0, monday_morning())
            .await
            .unwrap()
            .unwrap();
        assert!(reply.contains("available times for June 10"));
        assert!(reply.contains("10:00 AM"));
    }

    #[tokio::test]
    async fn test_try_date_request_ignores_other_messages() {
        let calendar = MockCalendar::empty();
        let planner = SlotPlanner::new(&calendar, "cal");

        let reply = planner
            .handle_try_date_request("june 10 at 2 pm", 2.0, monday_morning())
            .await
            .unwrap();
        assert!(reply.is_none());
    }

    #[tokio::test]
    async fn test_try_date_request_bad_date() {
        let calendar = MockCalendar::empty();
        let planner = SlotPlanner::new(&calendar, "cal");

        let reply = planner
            .handle_try_date_request("try zzz 99", 2.0, monday_morning())
            .await
            .unwrap()
            .unwrap();
        assert!(reply.contains("couldn't understand that date"));
    }

    #[tokio::test]
    async fn test_try_date_request_sunday_has_no_times() {
        let calendar = MockCalendar::empty();
        let planner = SlotPlanner::new(&calendar, "cal");

        let reply = planner
            .handle_try_date_request("try june 9", 2.0, monday_morning())
            .await
            .unwrap()
            .unwrap();
        assert!(reply.contains("no available appointment times on June 09"));
    }

    #[tokio::test]
    async fn test_datetime_prompt_suggests_slots() {
        let calendar = MockCalendar::empty();
        let planner = SlotPlanner::new(&calendar, "cal");

        let prompt = planner.datetime_prompt(2.0, monday_morning()).await;
        assert!(prompt.contains("June 03 at 10:00 AM"));
        assert!(prompt.contains("Try MONTH DAY"));
    }
}
