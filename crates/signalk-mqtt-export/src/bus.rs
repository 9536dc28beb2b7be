//! Upstream delta bus.
//!
//! The exporter subscribes to the SignalK bus once per context group and
//! keeps the returned handles so it can release them on stop or rebuild.
//! [`LocalDeltaBus`] is an in-process bus used by the binary and tests.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

use regex::Regex;
use signalk_core::{Delta, PathSelector, PathValue, Update, SELF_CONTEXT};
use signalk_protocol::SubscribeRequest;
use tracing::debug;

use crate::error::SubscriptionError;

/// Called with every delta delivered to a subscription.
pub type DeltaHandler = Arc<dyn Fn(&Delta) + Send + Sync>;

/// Called when the bus reports a problem with a subscription.
pub type ErrorHandler = Arc<dyn Fn(&SubscriptionError) + Send + Sync>;

/// Subscription side of the SignalK bus.
pub trait DeltaBus: Send + Sync {
    /// Subscribe to a context. Deltas are delivered to `on_delta`, filtered
    /// to the requested paths.
    fn subscribe(
        &self,
        request: SubscribeRequest,
        on_error: ErrorHandler,
        on_delta: DeltaHandler,
    ) -> Result<SubscriptionHandle, SubscriptionError>;
}

/// Releases a subscription when [`unsubscribe`](Self::unsubscribe)d.
pub struct SubscriptionHandle {
    context: String,
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl SubscriptionHandle {
    pub fn new(context: impl Into<String>, release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            context: context.into(),
            release: Some(Box::new(release)),
        }
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    pub fn unsubscribe(mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl std::fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("context", &self.context)
            .finish()
    }
}

/// Context part of a subscription.
#[derive(Debug, Clone)]
enum ContextFilter {
    /// `vessels.self`, also matching the self URN.
    SelfVessel,
    Exact(String),
    /// `*` glob, e.g. "vessels.*" or "vessels.urn:*".
    Glob(Regex),
}

impl ContextFilter {
    fn new(filter: &str) -> Result<Self, SubscriptionError> {
        if filter == SELF_CONTEXT {
            return Ok(ContextFilter::SelfVessel);
        }
        if !filter.contains('*') {
            return Ok(ContextFilter::Exact(filter.to_string()));
        }

        let pattern = filter
            .split('*')
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(".*");
        Regex::new(&format!("^{pattern}$"))
            .map(ContextFilter::Glob)
            .map_err(|e| SubscriptionError::Upstream(e.to_string()))
    }

    fn matches(&self, context: &str, self_urn: &str) -> bool {
        match self {
            ContextFilter::SelfVessel => context == SELF_CONTEXT || context == self_urn,
            ContextFilter::Exact(exact) => exact == context,
            ContextFilter::Glob(regex) => regex.is_match(context),
        }
    }
}

struct BusSubscriber {
    context: ContextFilter,
    paths: Vec<PathSelector>,
    on_error: ErrorHandler,
    on_delta: DeltaHandler,
}

impl BusSubscriber {
    fn matches(&self, path: &str) -> bool {
        self.paths.iter().any(|p| p.matches(path))
    }

    /// Restrict a delta to the subscribed paths.
    ///
    /// Returns None if no paths match.
    fn filter_delta(&self, delta: &Delta) -> Option<Delta> {
        let updates: Vec<Update> = delta
            .updates
            .iter()
            .filter_map(|update| {
                let values: Vec<PathValue> = update
                    .values
                    .iter()
                    .filter(|pv| self.matches(&pv.path))
                    .cloned()
                    .collect();

                if values.is_empty() {
                    None
                } else {
                    Some(Update {
                        values,
                        ..update.clone()
                    })
                }
            })
            .collect();

        if updates.is_empty() {
            None
        } else {
            Some(Delta {
                context: delta.context.clone(),
                updates,
                extra: delta.extra.clone(),
            })
        }
    }
}

#[derive(Default)]
struct BusState {
    next_id: u64,
    closed: bool,
    subscribers: HashMap<u64, BusSubscriber>,
}

/// In-process SignalK bus.
///
/// Handlers run on the publishing thread, outside the bus lock, so a
/// handler may subscribe or unsubscribe without deadlocking.
#[derive(Clone)]
pub struct LocalDeltaBus {
    self_urn: String,
    state: Arc<RwLock<BusState>>,
}

impl LocalDeltaBus {
    /// Create a bus. `self_urn` is the full self context, e.g.
    /// "vessels.urn:mrn:signalk:uuid:...".
    pub fn new(self_urn: &str) -> Self {
        Self {
            self_urn: self_urn.to_string(),
            state: Arc::new(RwLock::new(BusState::default())),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, BusState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, BusState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Deliver a delta to every matching subscription.
    ///
    /// Returns the number of deliveries.
    pub fn publish(&self, delta: &Delta) -> usize {
        let context = delta.context_or_self();
        let deliveries: Vec<(DeltaHandler, Delta)> = {
            let state = self.read();
            if state.closed {
                return 0;
            }
            state
                .subscribers
                .values()
                .filter(|s| s.context.matches(context, &self.self_urn))
                .filter_map(|s| s.filter_delta(delta).map(|d| (s.on_delta.clone(), d)))
                .collect()
        };

        for (handler, filtered) in &deliveries {
            handler(filtered);
        }
        deliveries.len()
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.read().subscribers.len()
    }

    /// Close the bus, reporting `BusClosed` to every subscriber.
    pub fn close(&self) {
        let drained: Vec<BusSubscriber> = {
            let mut state = self.write();
            state.closed = true;
            state.subscribers.drain().map(|(_, s)| s).collect()
        };

        for subscriber in drained {
            (subscriber.on_error)(&SubscriptionError::BusClosed);
        }
    }
}

impl DeltaBus for LocalDeltaBus {
    fn subscribe(
        &self,
        request: SubscribeRequest,
        on_error: ErrorHandler,
        on_delta: DeltaHandler,
    ) -> Result<SubscriptionHandle, SubscriptionError> {
        if request.subscribe.is_empty() {
            return Err(SubscriptionError::EmptyRequest(request.context));
        }

        let subscriber = BusSubscriber {
            context: ContextFilter::new(&request.context)?,
            paths: request
                .subscribe
                .iter()
                .map(|s| PathSelector::new(&s.path))
                .collect(),
            on_error,
            on_delta,
        };

        let id = {
            let mut state = self.write();
            if state.closed {
                return Err(SubscriptionError::BusClosed);
            }
            let id = state.next_id;
            state.next_id += 1;
            state.subscribers.insert(id, subscriber);
            id
        };
        debug!(
            "Bus subscription {} for {} ({} paths)",
            id,
            request.context,
            request.subscribe.len()
        );

        let state: Weak<RwLock<BusState>> = Arc::downgrade(&self.state);
        Ok(SubscriptionHandle::new(request.context, move || {
            if let Some(state) = state.upgrade() {
                state
                    .write()
                    .unwrap_or_else(|e| e.into_inner())
                    .subscribers
                    .remove(&id);
            }
        }))
    }
}
