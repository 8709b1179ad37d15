use std::sync::Arc;

use chrono::{Duration, Utc};

use crate::db::queries;
use crate::models::{BookingState, ChatMessage, ConversationSession, Mode};
use crate::services::booking::{BookingFlow, BookingOutcome};
use crate::services::matcher::{self, MatchResult};
use crate::state::AppState;

pub const FALLBACK_REPLY: &str =
    "Sorry, I'm having trouble right now. Please try again in a moment.";

pub async fn process_message(
    state: &Arc<AppState>,
    session_id: &str,
    message: &str,
) -> anyhow::Result<String> {
    // Turns of one session are strictly serialized; other sessions proceed.
    let _guard = state.session_locks.acquire(session_id).await;

    let mut session = {
        let db = state.db.lock().unwrap();
        queries::get_session(&db, session_id)?
    }
    .unwrap_or_else(|| {
        ConversationSession::new(
            session_id,
            Utc::now().naive_utc(),
            state.config.session_ttl_hours,
        )
    });

    session.history.push(ChatMessage::user(message));

    // The trigger phrase switches the session into booking mode with a fresh
    // booking state; history carries over.
    let lowered = message.to_lowercase();
    if session.mode == Mode::Chat
        && (lowered.contains("lets book") || lowered.contains("let's book"))
    {
        session.mode = Mode::Booking;
        session.booking = Some(BookingState::default());
    }

    tracing::info!(
        session = %session_id,
        mode = ?session.mode,
        "processing message"
    );

    let now = Utc::now().with_timezone(&state.tz);

    let reply = match session.mode {
        Mode::Booking => {
            let mut booking = session.booking.take().unwrap_or_default();
            let flow = BookingFlow::new(
                &state.catalog,
                state.calendar.as_ref(),
                &state.config.calendar_id,
                state.config.shop_timezone.clone(),
            );
            match flow.handle(&mut booking, message, now).await {
                Ok(BookingOutcome::Reply(reply)) => {
                    session.booking = Some(booking);
                    reply
                }
                Ok(BookingOutcome::Booked(reply)) => {
                    // Booking complete: back to chat, the attempt is dropped.
                    session.mode = Mode::Chat;
                    session.booking = None;
                    reply
                }
                Err(e) => {
                    tracing::error!(error = %e, session = %session_id, "booking turn failed");
                    session.booking = Some(booking);
                    FALLBACK_REPLY.to_string()
                }
            }
        }
        Mode::Chat => chat_reply(state, &session).await,
    };

    session.history.push(ChatMessage::assistant(reply.clone()));

    let now_utc = Utc::now().naive_utc();
    session.last_activity = now_utc;
    session.expires_at = now_utc + Duration::hours(state.config.session_ttl_hours);

    {
        let db = state.db.lock().unwrap();
        queries::save_session(&db, &session)?;
    }

    Ok(reply)
}

async fn chat_reply(state: &Arc<AppState>, session: &ConversationSession) -> String {
    let latest = session.latest_user_message().unwrap_or("");
    let shop = &state.config.shop_name;

    let system_prompt = match matcher::match_vehicle(latest, &state.catalog) {
        // Several plausible vehicles: clarify locally, no LLM round-trip.
        MatchResult::Ambiguous(options) => {
            let list = options
                .iter()
                .map(|v| format!("- {} {} {} ({})", v.year, v.make, v.model, v.vehicle_type))
                .collect::<Vec<_>>()
                .join("\n");
            return format!("I found multiple vehicle types. Could you clarify?\n{list}");
        }

        MatchResult::Match(vehicle) => format!(
            "You are a helpful assistant for {shop}. \
             The customer can enter booking mode at any time by typing 'Lets book' - \
             you must tell them this if service options are being discussed. \
             The customer is asking about a {}. \
             Our service history data shows that a battery replacement for this vehicle \
             should take approximately {} hours.",
            vehicle.description(),
            vehicle.service_time_hours,
        ),

        MatchResult::NoMatch => format!(
            "You are a helpful assistant for {shop}. \
             The customer asked about service, but their vehicle was unclear. \
             Ask them for year/make/model. \
             If the customer asks a question or makes a statement that has nothing to do \
             with vehicle maintenance, cleverly steer their input back towards the fact \
             that you are here to help with their hybrid battery needs. \
             Always try to guide the customer towards scheduling a battery replacement with us. \
             You do not have the ability to find available appointment times unless the \
             customer enters booking mode. \
             The customer can enter booking mode at any time by typing 'Lets book' and you \
             must inform them of this if any services are being discussed."
        ),
    };

    match state.llm.chat(&system_prompt, &session.history).await {
        Ok(reply) => reply,
        Err(e) => {
            tracing::error!(error = %e, "LLM call failed");
            FALLBACK_REPLY.to_string()
        }
    }
}
