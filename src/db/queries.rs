use chrono::{NaiveDateTime, Utc};
use rusqlite::{params, Connection};

use crate::models::{BookingState, ChatMessage, ConversationSession, Mode};

const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(serde::Serialize, serde::Deserialize)]
struct SessionData {
    mode: Mode,
    history: Vec<ChatMessage>,
    booking: Option<BookingState>,
}

pub fn get_session(conn: &Connection, id: &str) -> anyhow::Result<Option<ConversationSession>> {
    let now = Utc::now().naive_utc().format(TS_FORMAT).to_string();
    let mut stmt = conn.prepare(
        "SELECT id, data, last_activity, expires_at FROM sessions WHERE id = ?1 AND expires_at > ?2",
    )?;

    let result = stmt.query_row(params![id, now], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
        ))
    });

    match result {
        Ok((id, data_json, last_activity_str, expires_at_str)) => {
            let data: SessionData = serde_json::from_str(&data_json).unwrap_or(SessionData {
                mode: Mode::Chat,
                history: vec![],
                booking: None,
            });

            let last_activity = NaiveDateTime::parse_from_str(&last_activity_str, TS_FORMAT)
                .unwrap_or_else(|_| Utc::now().naive_utc());
            let expires_at = NaiveDateTime::parse_from_str(&expires_at_str, TS_FORMAT)
                .unwrap_or_else(|_| Utc::now().naive_utc());

            Ok(Some(ConversationSession {
                id,
                mode: data.mode,
                history: data.history,
                booking: data.booking,
                last_activity,
                expires_at,
            }))
        }
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn save_session(conn: &Connection, session: &ConversationSession) -> anyhow::Result<()> {
    let data = SessionData {
        mode: session.mode,
        history: session.history.clone(),
        booking: session.booking.clone(),
    };
    let data_json = serde_json::to_string(&data)?;
    let last_activity = session.last_activity.format(TS_FORMAT).to_string();
    let expires_at = session.expires_at.format(TS_FORMAT).to_string();

    conn.execute(
        "INSERT INTO sessions (id, data, last_activity, expires_at)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(id) DO UPDATE SET
           data = excluded.data,
           last_activity = excluded.last_activity,
           expires_at = excluded.expires_at",
        params![session.id, data_json, last_activity, expires_at],
    )?;
    Ok(())
}

pub fn delete_session(conn: &Connection, id: &str) -> anyhow::Result<bool> {
    let count = conn.execute("DELETE FROM sessions WHERE id = ?1", params![id])?;
    Ok(count > 0)
}

pub fn expire_old_sessions(conn: &Connection) -> anyhow::Result<usize> {
    let now = Utc::now().naive_utc().format(TS_FORMAT).to_string();
    let count = conn.execute("DELETE FROM sessions WHERE expires_at <= ?1", params![now])?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use chrono::Duration;

    fn setup_db() -> Connection {
        db::init_db(":memory:").unwrap()
    }

    fn make_session(id: &str, ttl_hours: i64) -> ConversationSession {
        ConversationSession::new(id, Utc::now().naive_utc(), ttl_hours)
    }

    #[test]
    fn test_missing_session_is_none() {
        let conn = setup_db();
        assert!(get_session(&conn, "nope").unwrap().is_none());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let conn = setup_db();
        let mut session = make_session("s1", 24);
        session.mode = Mode::Booking;
        session.history.push(ChatMessage::user("lets book"));
        session.history.push(ChatMessage::assistant("Okay!"));
        session.booking = Some(BookingState {
            vehicle: Some("2019 Toyota Corolla".to_string()),
            duration_hours: Some(2.0),
            ..Default::default()
        });
        save_session(&conn, &session).unwrap();

        let loaded = get_session(&conn, "s1").unwrap().unwrap();
        assert_eq!(loaded.mode, Mode::Booking);
        assert_eq!(loaded.history.len(), 2);
        assert_eq!(loaded.history[0].content, "lets book");
        let booking = loaded.booking.unwrap();
        assert_eq!(booking.vehicle.as_deref(), Some("2019 Toyota Corolla"));
        assert_eq!(booking.duration_hours, Some(2.0));
    }

    #[test]
    fn test_save_is_upsert() {
        let conn = setup_db();
        let mut session = make_session("s1", 24);
        save_session(&conn, &session).unwrap();

        session.history.push(ChatMessage::user("hello"));
        save_session(&conn, &session).unwrap();

        let loaded = get_session(&conn, "s1").unwrap().unwrap();
        assert_eq!(loaded.history.len(), 1);
    }

    #[test]
    fn test_expired_session_not_returned() {
        let conn = setup_db();
        let mut session = make_session("s1", 24);
        session.expires_at = Utc::now().naive_utc() - Duration::minutes(1);
        save_session(&conn, &session).unwrap();

        assert!(get_session(&conn, "s1").unwrap().is_none());
        assert_eq!(expire_old_sessions(&conn).unwrap(), 1);
    }

    #[test]
    fn test_delete_session() {
        let conn = setup_db();
        save_session(&conn, &make_session("s1", 24)).unwrap();
        assert!(delete_session(&conn, "s1").unwrap());
        assert!(!delete_session(&conn, "s1").unwrap());
        assert!(get_session(&conn, "s1").unwrap().is_none());
    }
}
