//! Typed session table
//!
//! One entry per key holds everything the engine knows about a session:
//! scheduling state, validator, last payload, the stored error and the
//! current transition. Entries carry a generation id so a superseded driver
//! can never write into its successor's entry.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{Notify, mpsc};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::{PollOptions, Priority};
use crate::delta::TransitionRecord;
use crate::error::ErrorRecord;
use crate::event::PollEvent;
use crate::transport::Endpoint;

/// Wake-up handles shared between the registry and a session driver.
#[derive(Debug, Clone, Default)]
pub(crate) struct Signals {
    /// Poll now
    pub(crate) refresh: Arc<Notify>,
    /// Re-derive the armed interval without polling
    pub(crate) retime: Arc<Notify>,
}

/// Live state of one polling session.
#[derive(Debug)]
pub(crate) struct Session {
    pub(crate) id: u64,
    pub(crate) key: String,
    pub(crate) endpoint: Endpoint,
    pub(crate) options: PollOptions,
    pub(crate) current_interval: Option<Duration>,
    pub(crate) consecutive_errors: u32,
    pub(crate) validator: Option<String>,
    pub(crate) last_payload: Option<Value>,
    pub(crate) in_flight: bool,
    pub(crate) last_request_at: Option<Instant>,
    pub(crate) request_count: u64,
    pub(crate) token: CancellationToken,
    pub(crate) signals: Signals,
    pub(crate) events: mpsc::UnboundedSender<PollEvent>,
    pub(crate) error: Option<ErrorRecord>,
    pub(crate) transition: Option<TransitionRecord>,
}

impl Session {
    pub(crate) fn new(
        id: u64,
        key: String,
        endpoint: Endpoint,
        options: PollOptions,
        events: mpsc::UnboundedSender<PollEvent>,
    ) -> Self {
        Self {
            id,
            key,
            endpoint,
            options,
            current_interval: None,
            consecutive_errors: 0,
            validator: None,
            last_payload: None,
            in_flight: false,
            last_request_at: None,
            request_count: 0,
            token: CancellationToken::new(),
            signals: Signals::default(),
            events,
            error: None,
            transition: None,
        }
    }

    /// Cancel the session and any request it has in flight.
    pub(crate) fn cancel(&self) {
        self.token.cancel();
    }

    /// Deliver an event; a dropped receiver is not an error.
    pub(crate) fn emit(&self, event: PollEvent) {
        let _ = self.events.send(event);
    }

    pub(crate) fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            key: self.key.clone(),
            url: self.endpoint.url.clone(),
            base_interval: self.options.interval,
            current_interval: self.current_interval,
            consecutive_errors: self.consecutive_errors,
            in_flight: self.in_flight,
            request_count: self.request_count,
            validator: self.validator.clone(),
            priority: self.options.priority,
            has_payload: self.last_payload.is_some(),
            last_request_at: self.last_request_at,
        }
    }
}

/// Read-only view of a session, for dashboards and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    /// Session key
    pub key: String,
    /// Polled URL
    pub url: String,
    /// Configured base interval
    pub base_interval: Duration,
    /// Last computed interval; `None` before the first computation or while stopped
    pub current_interval: Option<Duration>,
    /// Consecutive failed attempts
    pub consecutive_errors: u32,
    /// A request is in flight
    pub in_flight: bool,
    /// Requests issued so far
    pub request_count: u64,
    /// Stored validator
    pub validator: Option<String>,
    /// Priority tier
    pub priority: Priority,
    /// A successful payload has been received
    pub has_payload: bool,
    /// Start of the last request
    pub last_request_at: Option<Instant>,
}

/// Sessions by key.
#[derive(Debug, Default)]
pub(crate) struct SessionTable {
    sessions: HashMap<String, Session>,
    next_id: u64,
}

impl SessionTable {
    pub(crate) fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    /// Insert a session, returning the one it replaces.
    pub(crate) fn insert(&mut self, session: Session) -> Option<Session> {
        self.sessions.insert(session.key.clone(), session)
    }

    /// Remove the session under `key`; with `id`, only if it is that generation.
    pub(crate) fn remove(&mut self, key: &str, id: Option<u64>) -> Option<Session> {
        match (self.sessions.get(key), id) {
            (Some(session), Some(id)) if session.id != id => None,
            (Some(_), _) => self.sessions.remove(key),
            (None, _) => None,
        }
    }

    pub(crate) fn get(&self, key: &str) -> Option<&Session> {
        self.sessions.get(key)
    }

    pub(crate) fn get_mut(&mut self, key: &str) -> Option<&mut Session> {
        self.sessions.get_mut(key)
    }

    /// The live session of generation `id`, if it is still current.
    pub(crate) fn current_mut(&mut self, key: &str, id: u64) -> Option<&mut Session> {
        self.sessions
            .get_mut(key)
            .filter(|session| session.id == id && !session.token.is_cancelled())
    }

    pub(crate) fn keys(&self) -> Vec<String> {
        let mut keys: Vec<_> = self.sessions.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values()
    }

    pub(crate) fn drain(&mut self) -> Vec<Session> {
        self.sessions.drain().map(|(_, session)| session).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(table: &mut SessionTable, key: &str) -> Session {
        let (tx, _rx) = mpsc::unbounded_channel();
        Session::new(
            table.next_id(),
            key.to_string(),
            Endpoint::get("http://shop.local/orders"),
            PollOptions::default(),
            tx,
        )
    }

    #[test]
    fn insert_returns_superseded_session() {
        let mut table = SessionTable::default();
        let first = session(&mut table, "cashier-orders");
        let first_id = first.id;
        assert!(table.insert(first).is_none());

        let second = session(&mut table, "cashier-orders");
        let replaced = table.insert(second).unwrap();
        assert_eq!(replaced.id, first_id);
        assert_eq!(table.keys(), vec!["cashier-orders".to_string()]);
    }

    #[test]
    fn remove_respects_generation() {
        let mut table = SessionTable::default();
        let first = session(&mut table, "k");
        let stale_id = first.id;
        table.insert(first);
        let second = session(&mut table, "k");
        let live_id = second.id;
        table.insert(second);

        assert!(table.remove("k", Some(stale_id)).is_none());
        assert!(table.current_mut("k", stale_id).is_none());
        assert!(table.current_mut("k", live_id).is_some());
        assert_eq!(table.remove("k", Some(live_id)).map(|s| s.id), Some(live_id));
        assert!(table.get("k").is_none());
    }

    #[test]
    fn cancelled_session_is_not_current() {
        let mut table = SessionTable::default();
        let session = session(&mut table, "k");
        let id = session.id;
        session.cancel();
        table.insert(session);

        assert!(table.current_mut("k", id).is_none());
    }
}
