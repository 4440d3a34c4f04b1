//! Interception events raised while replaying the sync log.
//!
//! Listeners are registered per event type with an optional URL scope.
//! Dispatch runs the matching listeners one after another in registration
//! order; the first listener returning an action ends the chain.

use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use parking_lot::RwLock;
use regex::Regex;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use synclog_codec::{HttpRequest, HttpResponse};
use tracing::trace;

/// Lifecycle points at which listeners are invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncEventType {
    /// Before a queued request is replayed.
    BeforeSyncRequest,
    /// After a queued request was replayed successfully.
    SyncRequest,
}

impl SyncEventType {
    /// Returns the event name.
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncEventType::BeforeSyncRequest => "beforeSyncRequest",
            SyncEventType::SyncRequest => "syncRequest",
        }
    }
}

impl fmt::Display for SyncEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncEventType {
    type Err = SyncError;

    /// Parses an event name, ignoring ASCII case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [SyncEventType::BeforeSyncRequest, SyncEventType::SyncRequest]
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| SyncError::UnknownEventType(s.to_string()))
    }
}

/// Payload handed to listeners.
#[derive(Debug, Clone)]
pub struct SyncEvent {
    /// Which lifecycle point raised the event.
    pub event_type: SyncEventType,
    /// Id of the queue entry being replayed.
    pub request_id: String,
    /// The request (a copy; changing it does not affect replay).
    pub request: HttpRequest,
    /// The replay response; only set for [`SyncEventType::SyncRequest`].
    pub response: Option<HttpResponse>,
}

impl SyncEvent {
    /// Creates a `beforeSyncRequest` event.
    pub fn before_sync_request(request_id: impl Into<String>, request: HttpRequest) -> Self {
        Self {
            event_type: SyncEventType::BeforeSyncRequest,
            request_id: request_id.into(),
            request,
            response: None,
        }
    }

    /// Creates a `syncRequest` event.
    pub fn sync_request(
        request_id: impl Into<String>,
        request: HttpRequest,
        response: HttpResponse,
    ) -> Self {
        Self {
            event_type: SyncEventType::SyncRequest,
            request_id: request_id.into(),
            request,
            response: Some(response),
        }
    }
}

/// What a listener wants done with the current entry.
///
/// Listeners return `None` to leave the entry alone.
#[derive(Debug, Clone)]
pub enum ListenerAction {
    /// Remove the entry without sending it.
    Skip,
    /// End the sync session, leaving this entry and the rest queued.
    Stop,
    /// Send this request instead of the stored one.
    Replay(HttpRequest),
}

/// Receives sync events.
#[async_trait]
pub trait SyncEventListener: Send + Sync {
    /// Handles an event, optionally returning an action.
    async fn on_event(&self, event: &SyncEvent) -> Option<ListenerAction>;
}

/// Adapts a synchronous closure into a [`SyncEventListener`].
pub struct FnListener<F>(F);

/// Wraps a closure into a shareable listener.
pub fn listener_fn<F>(f: F) -> Arc<dyn SyncEventListener>
where
    F: Fn(&SyncEvent) -> Option<ListenerAction> + Send + Sync + 'static,
{
    Arc::new(FnListener(f))
}

#[async_trait]
impl<F> SyncEventListener for FnListener<F>
where
    F: Fn(&SyncEvent) -> Option<ListenerAction> + Send + Sync,
{
    async fn on_event(&self, event: &SyncEvent) -> Option<ListenerAction> {
        (self.0)(event)
    }
}

struct Registration {
    event_type: SyncEventType,
    listener: Arc<dyn SyncEventListener>,
    scope: Option<Regex>,
}

impl Registration {
    fn applies_to(&self, event_type: SyncEventType, url: Option<&str>) -> bool {
        if self.event_type != event_type {
            return false;
        }
        match (&self.scope, url) {
            (None, _) | (_, None) => true,
            (Some(scope), Some(url)) => scope.is_match(url),
        }
    }
}

fn same_scope(a: Option<&Regex>, b: Option<&Regex>) -> bool {
    a.map(Regex::as_str) == b.map(Regex::as_str)
}

/// Ordered listener registry.
#[derive(Default)]
pub struct EventDispatcher {
    registrations: RwLock<Vec<Registration>>,
}

impl EventDispatcher {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `listener` for `event_type`, limited to URLs matching
    /// `scope` when one is given.
    pub fn add(
        &self,
        event_type: SyncEventType,
        listener: Arc<dyn SyncEventListener>,
        scope: Option<Regex>,
    ) {
        self.registrations.write().push(Registration {
            event_type,
            listener,
            scope,
        });
    }

    /// Registers `listener` with a scope given as a regex string.
    pub fn add_scoped(
        &self,
        event_type: SyncEventType,
        listener: Arc<dyn SyncEventListener>,
        scope: &str,
    ) -> SyncResult<()> {
        self.add(event_type, listener, Some(Regex::new(scope)?));
        Ok(())
    }

    /// Removes the first registration matching the `(type, listener, scope)`
    /// triple. Listeners compare by identity and scopes by pattern text.
    pub fn remove(
        &self,
        event_type: SyncEventType,
        listener: &Arc<dyn SyncEventListener>,
        scope: Option<&Regex>,
    ) -> bool {
        let mut registrations = self.registrations.write();
        let position = registrations.iter().position(|r| {
            r.event_type == event_type
                && Arc::ptr_eq(&r.listener, listener)
                && same_scope(r.scope.as_ref(), scope)
        });
        match position {
            Some(index) => {
                registrations.remove(index);
                true
            }
            None => false,
        }
    }

    /// Returns the number of registrations.
    pub fn len(&self) -> usize {
        self.registrations.read().len()
    }

    /// Returns true if no listener is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Runs matching listeners in registration order until one returns an
    /// action.
    ///
    /// A `None` URL matches every scope.
    pub async fn dispatch(&self, event: &SyncEvent, url: Option<&str>) -> Option<ListenerAction> {
        let listeners: Vec<Arc<dyn SyncEventListener>> = self
            .registrations
            .read()
            .iter()
            .filter(|r| r.applies_to(event.event_type, url))
            .map(|r| Arc::clone(&r.listener))
            .collect();

        for listener in listeners {
            if let Some(action) = listener.on_event(event).await {
                trace!(
                    event = %event.event_type,
                    request_id = %event.request_id,
                    ?action,
                    "Listener intercepted event"
                );
                return Some(action);
            }
        }
        None
    }
}

impl fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("registrations", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn event(url: &str) -> SyncEvent {
        SyncEvent::before_sync_request("1", HttpRequest::post(url))
    }

    fn counting(counter: Arc<AtomicUsize>, action: Option<ListenerAction>) -> Arc<dyn SyncEventListener> {
        listener_fn(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            action.clone()
        })
    }

    #[test]
    fn event_type_parse_ignores_case() {
        assert_eq!(
            "BEFORESYNCREQUEST".parse::<SyncEventType>().unwrap(),
            SyncEventType::BeforeSyncRequest
        );
        assert_eq!(
            "syncRequest".parse::<SyncEventType>().unwrap(),
            SyncEventType::SyncRequest
        );
        assert!(matches!(
            "afterSync".parse::<SyncEventType>(),
            Err(SyncError::UnknownEventType(_))
        ));
    }

    #[tokio::test]
    async fn no_listeners_means_no_action() {
        let dispatcher = EventDispatcher::new();
        assert!(dispatcher.dispatch(&event("https://a/"), Some("https://a/")).await.is_none());
    }

    #[tokio::test]
    async fn first_action_wins() {
        let dispatcher = EventDispatcher::new();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let third = Arc::new(AtomicUsize::new(0));

        dispatcher.add(SyncEventType::BeforeSyncRequest, counting(first.clone(), None), None);
        dispatcher.add(
            SyncEventType::BeforeSyncRequest,
            counting(second.clone(), Some(ListenerAction::Skip)),
            None,
        );
        dispatcher.add(
            SyncEventType::BeforeSyncRequest,
            counting(third.clone(), Some(ListenerAction::Stop)),
            None,
        );

        let action = dispatcher.dispatch(&event("https://a/"), Some("https://a/")).await;
        assert!(matches!(action, Some(ListenerAction::Skip)));
        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 1);
        assert_eq!(third.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn scope_filters_by_url() {
        let dispatcher = EventDispatcher::new();
        let hits = Arc::new(AtomicUsize::new(0));
        dispatcher
            .add_scoped(
                SyncEventType::BeforeSyncRequest,
                counting(hits.clone(), Some(ListenerAction::Skip)),
                "/orders",
            )
            .unwrap();

        let miss = dispatcher
            .dispatch(&event("https://a/users"), Some("https://a/users"))
            .await;
        assert!(miss.is_none());

        let hit = dispatcher
            .dispatch(&event("https://a/orders/1"), Some("https://a/orders/1"))
            .await;
        assert!(hit.is_some());

        let unscoped = dispatcher.dispatch(&event("https://a/users"), None).await;
        assert!(unscoped.is_some());
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn type_filters_listeners() {
        let dispatcher = EventDispatcher::new();
        let hits = Arc::new(AtomicUsize::new(0));
        dispatcher.add(
            SyncEventType::SyncRequest,
            counting(hits.clone(), Some(ListenerAction::Stop)),
            None,
        );

        assert!(dispatcher.dispatch(&event("https://a/"), None).await.is_none());
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn remove_matches_type_listener_and_scope() {
        let dispatcher = EventDispatcher::new();
        let listener = counting(Arc::new(AtomicUsize::new(0)), None);
        let scope = Regex::new("/orders").unwrap();

        dispatcher.add(SyncEventType::SyncRequest, listener.clone(), Some(scope.clone()));
        assert!(!dispatcher.remove(SyncEventType::SyncRequest, &listener, None));
        assert!(!dispatcher.remove(SyncEventType::BeforeSyncRequest, &listener, Some(&scope)));

        let other = counting(Arc::new(AtomicUsize::new(0)), None);
        assert!(!dispatcher.remove(SyncEventType::SyncRequest, &other, Some(&scope)));

        assert!(dispatcher.remove(SyncEventType::SyncRequest, &listener, Some(&scope)));
        assert!(dispatcher.is_empty());
    }
}
