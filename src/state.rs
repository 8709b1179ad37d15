use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono_tz::Tz;
use rusqlite::Connection;

use crate::config::AppConfig;
use crate::models::Catalog;
use crate::services::ai::LlmProvider;
use crate::services::calendar::CalendarProvider;

pub struct AppState {
    pub db: Arc<Mutex<Connection>>,
    pub config: AppConfig,
    pub catalog: Catalog,
    pub tz: Tz,
    pub llm: Box<dyn LlmProvider>,
    pub calendar: Box<dyn CalendarProvider>,
    pub session_locks: SessionLocks,
}

// One async mutex per session id: turns of the same session are processed
// strictly one at a time, while distinct sessions proceed in parallel.
#[derive(Default)]
pub struct SessionLocks {
    inner: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl SessionLocks {
    pub async fn acquire(&self, session_id: &str) -> tokio::sync::OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.inner.lock().unwrap();
            if locks.len() > 1024 {
                locks.retain(|_, l| Arc::strong_count(l) > 1);
            }
            locks
                .entry(session_id.to_string())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_same_session_serialized() {
        let locks = Arc::new(SessionLocks::default());

        let guard = locks.acquire("s1").await;

        let locks2 = Arc::clone(&locks);
        let contender = tokio::spawn(async move {
            let _guard = locks2.acquire("s1").await;
        });

        // The second acquire cannot complete while the first guard is held.
        tokio::task::yield_now().await;
        assert!(!contender.is_finished());

        drop(guard);
        contender.await.unwrap();
    }

    #[tokio::test]
    async fn test_distinct_sessions_independent() {
        let locks = SessionLocks::default();
        let _a = locks.acquire("a").await;
        // Must not deadlock: "b" uses its own lock.
        let _b = locks.acquire("b").await;
    }
}
