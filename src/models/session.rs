use chrono::{DateTime, FixedOffset, NaiveDateTime};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Chat,
    Booking,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

// The dialogue step is derived from the first unset field, in this order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BookingStep {
    Vehicle,
    DateTime,
    Name,
    Phone,
    Confirmation,
}

// Fields fill strictly in order vehicle -> appointment -> name -> phone ->
// confirmation, and completion is per-field `is_some()`: a zero-hour duration
// is a set value, not a missing one.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BookingState {
    pub vehicle: Option<String>,
    pub duration_hours: Option<f64>,
    pub appointment: Option<DateTime<FixedOffset>>,
    pub name: Option<String>,
    pub phone: Option<String>,
    #[serde(default)]
    pub confirmation_requested: bool,
}

impl BookingState {
    pub fn next_step(&self) -> BookingStep {
        if self.vehicle.is_none() {
            BookingStep::Vehicle
        } else if self.appointment.is_none() {
            BookingStep::DateTime
        } else if self.name.is_none() {
            BookingStep::Name
        } else if self.phone.is_none() {
            BookingStep::Phone
        } else {
            BookingStep::Confirmation
        }
    }

    // Re-request the appointment time (the one sanctioned way a set field is
    // cleared short of a full session reset).
    pub fn clear_appointment(&mut self) {
        self.appointment = None;
        self.confirmation_requested = false;
    }
}

#[derive(Debug, Clone)]
pub struct ConversationSession {
    pub id: String,
    pub mode: Mode,
    pub history: Vec<ChatMessage>,
    pub booking: Option<BookingState>,
    pub last_activity: NaiveDateTime,
    pub expires_at: NaiveDateTime,
}

impl ConversationSession {
    pub fn new(id: &str, now: NaiveDateTime, ttl_hours: i64) -> Self {
        Self {
            id: id.to_string(),
            mode: Mode::Chat,
            history: vec![],
            booking: None,
            last_activity: now,
            expires_at: now + chrono::Duration::hours(ttl_hours),
        }
    }

    pub fn latest_user_message(&self) -> Option<&str> {
        self.history
            .iter()
            .rev()
            .find(|m| m.role == "user")
            .map(|m| m.content.as_str())
    }
}
