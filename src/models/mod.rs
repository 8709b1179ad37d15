pub mod session;
pub mod vehicle;

pub use session::{BookingState, BookingStep, ChatMessage, ConversationSession, Mode};
pub use vehicle::{Catalog, VehicleRecord};
