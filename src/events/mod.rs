//! Cancel notification broker.
//!
//! Subscribers attach through connection points. Every call to
//! [`EventBroker::find_connection_point`] yields a fresh point, and each point
//! holds at most one subscriber, so a host that wants two subscribers asks for two
//! points. Subscriptions are addressed by an opaque [`Cookie`] issued by the broker.
//!
//! When the user asks to cancel, the UI worker calls [`EventBroker::fire_cancel`]:
//! subscribers run in the order they advised and any of them may veto.

use indexmap::IndexMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::SubscriptionError;
use crate::models::CancelFanOut;

/// Opaque subscription handle. Issued monotonically, never reused by one broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Cookie(u64);

impl Cookie {
    pub const fn from_raw(value: u64) -> Self {
        Self(value)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Cookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Events a connection point can deliver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum EventKind {
    /// The user asked to cancel; subscribers may veto.
    Cancel,
}

/// The shared allow-cancel decision passed to each subscriber.
///
/// Starts out allowed. A veto is final: no later subscriber can re-allow.
#[derive(Debug)]
pub struct CancelVote {
    allowed: bool,
}

impl CancelVote {
    pub(crate) fn new() -> Self {
        Self { allowed: true }
    }

    pub fn veto(&mut self) {
        self.allowed = false;
    }

    pub fn is_allowed(&self) -> bool {
        self.allowed
    }
}

/// Receives cancel notifications. Runs on the UI worker thread.
///
/// Implemented for any `Fn(&mut CancelVote) + Send + Sync` closure.
pub trait CancelSink: Send + Sync {
    fn on_cancel(&self, vote: &mut CancelVote);
}

impl<F> CancelSink for F
where
    F: Fn(&mut CancelVote) + Send + Sync,
{
    fn on_cancel(&self, vote: &mut CancelVote) {
        self(vote)
    }
}

/// A live subscription as seen through enumeration.
#[derive(Clone)]
pub struct Connection {
    pub cookie: Cookie,
    pub kind: EventKind,
    pub sink: Arc<dyn CancelSink>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("cookie", &self.cookie)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
struct Registry {
    last_cookie: u64,
    // Insertion order is advise order; removal keeps the rest in place
    subscribers: IndexMap<Cookie, Connection>,
}

impl Registry {
    fn issue_cookie(&mut self) -> Cookie {
        self.last_cookie += 1;
        Cookie(self.last_cookie)
    }
}

struct BrokerShared {
    registry: Mutex<Registry>,
    // Held for the whole of one notification round
    firing: Mutex<()>,
    fan_out: CancelFanOut,
}

impl BrokerShared {
    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Registry of cancel subscribers with vetoable fan-out
///
/// Cloning yields another handle to the same subscriber list.
#[derive(Clone)]
pub struct EventBroker {
    shared: Arc<BrokerShared>,
}

impl EventBroker {
    pub fn new(fan_out: CancelFanOut) -> Self {
        Self {
            shared: Arc::new(BrokerShared {
                registry: Mutex::new(Registry::default()),
                firing: Mutex::new(()),
                fan_out,
            }),
        }
    }

    /// Create a new, empty connection point for `kind`.
    ///
    /// Dropping the returned point removes its subscription.
    pub fn find_connection_point(&self, kind: EventKind) -> Arc<ConnectionPoint> {
        Arc::new(ConnectionPoint {
            kind,
            broker: Arc::clone(&self.shared),
            cookie: Mutex::new(None),
        })
    }

    pub fn subscriber_count(&self) -> usize {
        self.shared.registry().subscribers.len()
    }

    /// Resumable cursor over live subscriptions, in advise order.
    pub fn enumerate(&self) -> ConnectionPointEnumerator {
        ConnectionPointEnumerator {
            broker: Arc::clone(&self.shared),
            position: 0,
        }
    }

    /// Ask every subscriber whether cancelling is allowed.
    ///
    /// Only one notification round runs at a time. The subscriber list is copied
    /// before anyone is called, so subscribers may advise or unadvise from inside
    /// the callback; such changes apply to the next round.
    ///
    /// Returns `true` unless someone vetoed.
    pub fn fire_cancel(&self) -> bool {
        let _firing = self
            .shared
            .firing
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let sinks: Vec<(Cookie, Arc<dyn CancelSink>)> = self
            .shared
            .registry()
            .subscribers
            .values()
            .filter(|c| c.kind == EventKind::Cancel)
            .map(|c| (c.cookie, Arc::clone(&c.sink)))
            .collect();

        let mut vote = CancelVote::new();
        for (cookie, sink) in sinks {
            sink.on_cancel(&mut vote);
            if !vote.is_allowed() {
                tracing::warn!("Cancel vetoed by subscriber {}", cookie);
                if self.shared.fan_out == CancelFanOut::StopAtVeto {
                    break;
                }
            }
        }

        tracing::debug!("Cancel notification finished, allowed = {}", vote.is_allowed());
        vote.is_allowed()
    }
}

impl Default for EventBroker {
    fn default() -> Self {
        Self::new(CancelFanOut::default())
    }
}

/// One attachment slot for a subscriber.
pub struct ConnectionPoint {
    kind: EventKind,
    broker: Arc<BrokerShared>,
    cookie: Mutex<Option<Cookie>>,
}

impl ConnectionPoint {
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// Cookie of the current subscription, if any.
    pub fn cookie(&self) -> Option<Cookie> {
        *self.cookie.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Attach `sink`. Fails if this point already has a subscriber.
    pub fn advise(&self, sink: Arc<dyn CancelSink>) -> Result<Cookie, SubscriptionError> {
        let mut slot = self.cookie.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            return Err(SubscriptionError::AlreadyAdvised);
        }

        let mut registry = self.broker.registry();
        let cookie = registry.issue_cookie();
        registry.subscribers.insert(
            cookie,
            Connection {
                cookie,
                kind: self.kind,
                sink,
            },
        );
        *slot = Some(cookie);

        tracing::debug!("Subscriber {} advised for {:?}", cookie, self.kind);
        Ok(cookie)
    }

    /// Detach the subscription identified by `cookie`.
    pub fn unadvise(&self, cookie: Cookie) -> Result<(), SubscriptionError> {
        let mut slot = self.cookie.lock().unwrap_or_else(PoisonError::into_inner);
        if *slot != Some(cookie) {
            return Err(SubscriptionError::NoSuchSubscription(cookie));
        }

        self.broker.registry().subscribers.shift_remove(&cookie);
        *slot = None;

        tracing::debug!("Subscriber {} unadvised", cookie);
        Ok(())
    }
}

impl Drop for ConnectionPoint {
    fn drop(&mut self) {
        let slot = self.cookie.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(cookie) = slot.take() {
            self.broker.registry().subscribers.shift_remove(&cookie);
        }
    }
}

/// Cursor over live subscriptions.
///
/// The cursor is an index into the current list. Advising or unadvising while a
/// cursor is in use may make it skip or repeat an entry.
pub struct ConnectionPointEnumerator {
    broker: Arc<BrokerShared>,
    position: usize,
}

impl ConnectionPointEnumerator {
    /// Up to `count` entries from the current position.
    pub fn next(&mut self, count: usize) -> Vec<Connection> {
        let registry = self.broker.registry();
        let end = self.position.saturating_add(count).min(registry.subscribers.len());
        let batch: Vec<Connection> = (self.position..end)
            .filter_map(|i| registry.subscribers.get_index(i).map(|(_, c)| c.clone()))
            .collect();
        self.position = self.position.max(end);
        batch
    }

    /// Advance past `count` entries. Returns `false` if fewer than `count` remained.
    pub fn skip(&mut self, count: usize) -> bool {
        let len = self.broker.registry().subscribers.len();
        let target = self.position.saturating_add(count);
        self.position = target.min(len);
        target <= len
    }

    pub fn reset(&mut self) {
        self.position = 0;
    }
}

impl Clone for ConnectionPointEnumerator {
    fn clone(&self) -> Self {
        Self {
            broker: Arc::clone(&self.broker),
            position: self.position,
        }
    }
}
