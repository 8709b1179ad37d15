use anyhow::Context;
use chrono::DateTime;
use chrono_tz::Tz;

use crate::models::{BookingState, BookingStep, Catalog, VehicleRecord};
use crate::services::calendar::{CalendarProvider, NewEvent};
use crate::services::matcher::{self, MatchResult};
use crate::services::parsers;
use crate::services::scheduling::{self, ScheduleError, SlotPlanner};

const CONFIRMATION_PHRASE: &str = "book now";

const VEHICLE_REPROMPT: &str = "Okay, let's get you booked! Please confirm your vehicle info \
                                using this input format: YEAR MAKE MODEL";
const NAME_PROMPT: &str = "Almost there! Can I have your full name? Use this format: FIRST LAST";
const NAME_REPROMPT: &str = "I'm sorry, but I did not get your name! Please provide your full \
                             name in the format: FIRST LAST";
const PHONE_PROMPT: &str = "Last thing! What's your phone number? Use this format: (xxx) xxx-xxxx";
const PHONE_REPROMPT: &str = "So sorry, but I did not get your phone number! Please provide your \
                              phone number in the format: (xxx) xxx-xxxx";
const CONFIRM_REPROMPT: &str = "Please type BOOK NOW to confirm, or let me know if something \
                                needs to be changed.";

#[derive(Debug, PartialEq)]
pub enum BookingOutcome {
    // Stay in booking mode and send this reply.
    Reply(String),
    // Booking complete: the caller drops the BookingState and returns the
    // session to chat mode.
    Booked(String),
}

pub struct BookingFlow<'a> {
    catalog: &'a Catalog,
    calendar: &'a dyn CalendarProvider,
    calendar_id: &'a str,
    timezone: String,
}

impl<'a> BookingFlow<'a> {
    pub fn new(
        catalog: &'a Catalog,
        calendar: &'a dyn CalendarProvider,
        calendar_id: &'a str,
        timezone: String,
    ) -> Self {
        Self {
            catalog,
            calendar,
            calendar_id,
            timezone,
        }
    }

    fn planner(&self) -> SlotPlanner<'_> {
        SlotPlanner::new(self.calendar, self.calendar_id)
    }

    // One turn of the booking dialogue. Collaborator failures bubble up as
    // errors without having advanced the state; invalid input reprompts the
    // active step.
    pub async fn handle(
        &self,
        state: &mut BookingState,
        message: &str,
        now: DateTime<Tz>,
    ) -> anyhow::Result<BookingOutcome> {
        match state.next_step() {
            BookingStep::Vehicle => match matcher::match_vehicle(message, self.catalog) {
                MatchResult::Match(vehicle) => {
                    state.vehicle = Some(vehicle.description());
                    state.duration_hours = Some(vehicle.service_time_hours);
                }
                MatchResult::Ambiguous(options) => {
                    return Ok(BookingOutcome::Reply(ambiguous_vehicle_reply(&options)));
                }
                MatchResult::NoMatch => {
                    return Ok(BookingOutcome::Reply(VEHICLE_REPROMPT.to_string()));
                }
            },

            BookingStep::DateTime => {
                let duration = state.duration_hours.unwrap_or(1.0);
                let planner = self.planner();

                // A "Try MONTH DAY" probe answers with that day's openings and
                // is never consumed as a datetime answer.
                if let Some(reply) = planner
                    .handle_try_date_request(message, duration, now)
                    .await?
                {
                    return Ok(BookingOutcome::Reply(reply));
                }

                let Some(requested) = parsers::parse_datetime(message, true, now) else {
                    return Ok(BookingOutcome::Reply(
                        ScheduleError::OutsideShopHours.to_string(),
                    ));
                };
                match planner.validate(requested, duration).await {
                    Ok(()) => state.appointment = Some(requested.fixed_offset()),
                    Err(e @ (ScheduleError::OutsideShopHours | ScheduleError::Conflict)) => {
                        return Ok(BookingOutcome::Reply(e.to_string()));
                    }
                    Err(ScheduleError::Calendar(e)) => return Err(e),
                }
            }

            BookingStep::Name => match parsers::parse_full_name(message) {
                Some(name) => state.name = Some(name),
                None => return Ok(BookingOutcome::Reply(NAME_REPROMPT.to_string())),
            },

            BookingStep::Phone => match parsers::parse_phone(message) {
                Some(phone) => state.phone = Some(phone),
                None => return Ok(BookingOutcome::Reply(PHONE_REPROMPT.to_string())),
            },

            BookingStep::Confirmation => return self.confirm(state, message, now).await,
        }

        // A field was just set; immediately ask for the next one.
        Ok(BookingOutcome::Reply(self.next_prompt(state, now).await))
    }

    async fn confirm(
        &self,
        state: &mut BookingState,
        message: &str,
        now: DateTime<Tz>,
    ) -> anyhow::Result<BookingOutcome> {
        if !state.confirmation_requested {
            state.confirmation_requested = true;
            return Ok(BookingOutcome::Reply(summary_reply(state)));
        }

        if !message.trim().eq_ignore_ascii_case(CONFIRMATION_PHRASE) {
            return Ok(BookingOutcome::Reply(CONFIRM_REPROMPT.to_string()));
        }

        let appointment = state
            .appointment
            .context("booking state has no appointment at confirmation")?;
        let duration = state.duration_hours.unwrap_or(1.0);
        let start = appointment.with_timezone(&now.timezone());
        let end = start + scheduling::service_duration(duration);

        // The slot was checked when chosen, but that check and this insert are
        // not atomic; re-validate right before inserting so a slot grabbed in
        // the meantime sends the customer back to pick a new time.
        if !self.planner().is_slot_available(start, end).await? {
            state.clear_appointment();
            let prompt = self.planner().datetime_prompt(duration, now).await;
            return Ok(BookingOutcome::Reply(format!(
                "Sorry, that time was just booked by someone else. {prompt}"
            )));
        }

        let event = NewEvent {
            summary: format!(
                "Hybrid Battery Appointment - {}",
                state.name.as_deref().unwrap_or("Unknown")
            ),
            description: format!(
                "Vehicle: {}\nPhone: {}",
                state.vehicle.as_deref().unwrap_or("Unknown"),
                state.phone.as_deref().unwrap_or("Unknown"),
            ),
            start: appointment,
            end: end.fixed_offset(),
            timezone: self.timezone.clone(),
        };

        // The booking only counts as committed once this call succeeds; a
        // failure leaves the state awaiting confirmation so the customer can
        // retry without producing a second event.
        let event_id = self.calendar.insert_event(self.calendar_id, &event).await?;
        tracing::info!(event_id = %event_id, "appointment booked");

        Ok(BookingOutcome::Booked(format!(
            "Appointment booked for {}. We are looking forward to seeing you!",
            start.format("%I:%M %p on %B %d, %Y")
        )))
    }

    async fn next_prompt(&self, state: &mut BookingState, now: DateTime<Tz>) -> String {
        match state.next_step() {
            BookingStep::Vehicle => VEHICLE_REPROMPT.to_string(),
            BookingStep::DateTime => {
                let duration = state.duration_hours.unwrap_or(1.0);
                self.planner().datetime_prompt(duration, now).await
            }
            BookingStep::Name => NAME_PROMPT.to_string(),
            BookingStep::Phone => PHONE_PROMPT.to_string(),
            BookingStep::Confirmation => {
                state.confirmation_requested = true;
                summary_reply(state)
            }
        }
    }
}

fn ambiguous_vehicle_reply(options: &[&VehicleRecord]) -> String {
    let list = options
        .iter()
        .map(|v| format!("- {} {} {} ({})", v.year, v.make, v.model, v.vehicle_type))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "I found more than one version of that vehicle. \
         Could you let me know which one you have?\n\n{list}"
    )
}

fn summary_reply(state: &BookingState) -> String {
    let when = state
        .appointment
        .map(|dt| dt.format("%I:%M %p on %B %d, %Y").to_string())
        .unwrap_or_else(|| "Unknown".to_string());
    format!(
        "Here is your appointment info:\n\n\
         Date & Time: {when}\n\
         Vehicle: {}\n\
         Name: {}\n\
         Phone: {}\n\n\
         If everything looks good, type BOOK NOW to confirm your appointment.",
        state.vehicle.as_deref().unwrap_or("Unknown"),
        state.name.as_deref().unwrap_or("Unknown"),
        state.phone.as_deref().unwrap_or("Unknown"),
    )
}
