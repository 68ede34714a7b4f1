//! Event handler registry
//!
//! Thread-safe mapping from (event name, optional target) to handler
//! worklets. Dispatch snapshots the matching handlers under the registry
//! lock and invokes them after releasing it, so a handler registering or
//! unregistering other handlers mid-dispatch can neither deadlock nor
//! mutate the set being iterated.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tandem_core::{JsValue, Shareable};

/// Identity of a host-tree node an event may target.
pub type TargetId = u64;

/// One registered handler.
#[derive(Clone)]
pub struct EventHandlerRegistration {
    pub id: u64,
    pub event_name: String,
    pub target: Option<TargetId>,
    pub handler: Arc<Shareable>,
}

impl EventHandlerRegistration {
    /// The event object passed to the handler worklet.
    pub fn event_value(event_name: &str, target: Option<TargetId>, timestamp: f64, payload: &JsValue) -> JsValue {
        JsValue::object([
            ("eventName".to_string(), JsValue::string(event_name)),
            (
                "target".to_string(),
                match target {
                    Some(target) => JsValue::Number(target as f64),
                    None => JsValue::Undefined,
                },
            ),
            ("eventTimestamp".to_string(), JsValue::Number(timestamp)),
            ("payload".to_string(), payload.clone()),
        ])
    }
}

#[derive(Default)]
struct Inner {
    /// Handlers filtering on a specific target.
    by_event_and_target: HashMap<(String, TargetId), HashMap<u64, Arc<EventHandlerRegistration>>>,
    /// Handlers listening to the event regardless of target.
    by_event: HashMap<String, HashMap<u64, Arc<EventHandlerRegistration>>>,
    by_id: HashMap<u64, Arc<EventHandlerRegistration>>,
}

pub struct EventHandlerRegistry {
    inner: Mutex<Inner>,
    next_id: AtomicU64,
}

impl EventHandlerRegistry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            // Registration ids start at 1 and are never reused.
            next_id: AtomicU64::new(1),
        }
    }

    pub fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn register(
        &self,
        id: u64,
        event_name: &str,
        target: Option<TargetId>,
        handler: Arc<Shareable>,
    ) {
        let registration = Arc::new(EventHandlerRegistration {
            id,
            event_name: event_name.to_string(),
            target,
            handler,
        });
        let mut inner = self.inner.lock();
        match target {
            Some(target) => {
                inner
                    .by_event_and_target
                    .entry((event_name.to_string(), target))
                    .or_default()
                    .insert(id, registration.clone());
            }
            None => {
                inner
                    .by_event
                    .entry(event_name.to_string())
                    .or_default()
                    .insert(id, registration.clone());
            }
        }
        inner.by_id.insert(id, registration);
    }

    pub fn unregister(&self, id: u64) {
        let mut inner = self.inner.lock();
        let Some(registration) = inner.by_id.remove(&id) else {
            return;
        };
        match registration.target {
            Some(target) => {
                let key = (registration.event_name.clone(), target);
                if let Some(handlers) = inner.by_event_and_target.get_mut(&key) {
                    handlers.remove(&id);
                    if handlers.is_empty() {
                        inner.by_event_and_target.remove(&key);
                    }
                }
            }
            None => {
                if let Some(handlers) = inner.by_event.get_mut(&registration.event_name) {
                    handlers.remove(&id);
                    if handlers.is_empty() {
                        inner.by_event.remove(&registration.event_name);
                    }
                }
            }
        }
    }

    pub fn is_any_handler_waiting_for(&self, event_name: &str, target: Option<TargetId>) -> bool {
        let inner = self.inner.lock();
        if inner.by_event.contains_key(event_name) {
            return true;
        }
        match target {
            Some(target) => inner
                .by_event_and_target
                .contains_key(&(event_name.to_string(), target)),
            None => false,
        }
    }

    /// Snapshot the handlers matching (event, target). Handlers for the same
    /// key fire in no particular order.
    fn matching(&self, event_name: &str, target: Option<TargetId>) -> Vec<Arc<EventHandlerRegistration>> {
        let inner = self.inner.lock();
        let mut matched = Vec::new();
        if let Some(handlers) = inner.by_event.get(event_name) {
            matched.extend(handlers.values().cloned());
        }
        if let Some(target) = target {
            if let Some(handlers) = inner
                .by_event_and_target
                .get(&(event_name.to_string(), target))
            {
                matched.extend(handlers.values().cloned());
            }
        }
        matched
    }

    /// Invoke every matching handler through `invoke` (typically guarded
    /// invocation on the UI runtime). The lock is released before any
    /// handler runs; a dispatch already in flight completes even if its
    /// handler is unregistered meanwhile.
    pub fn dispatch<F>(
        &self,
        event_name: &str,
        target: Option<TargetId>,
        timestamp: f64,
        payload: &JsValue,
        invoke: F,
    ) -> bool
    where
        F: Fn(&Arc<Shareable>, JsValue),
    {
        let matched = self.matching(event_name, target);
        if matched.is_empty() {
            return false;
        }
        tracing::trace!(event_name, ?target, handlers = matched.len(), "dispatching event");
        for registration in &matched {
            let event = EventHandlerRegistration::event_value(event_name, target, timestamp, payload);
            invoke(&registration.handler, event);
        }
        true
    }
}

impl Default for EventHandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex as PlMutex;
    use tandem_core::{RuntimeId, RuntimeLivenessRegistry};

    fn handler(liveness: &Arc<RuntimeLivenessRegistry>) -> Arc<Shareable> {
        Shareable::wrap(liveness, RuntimeId(1), &JsValue::string("handler")).unwrap()
    }

    #[test]
    fn test_register_query_unregister() {
        let liveness = Arc::new(RuntimeLivenessRegistry::new());
        let registry = EventHandlerRegistry::new();

        let id = registry.next_id();
        assert_eq!(id, 1);
        registry.register(id, "scroll", Some(42), handler(&liveness));

        assert!(registry.is_any_handler_waiting_for("scroll", Some(42)));
        assert!(!registry.is_any_handler_waiting_for("scroll", Some(7)));
        assert!(!registry.is_any_handler_waiting_for("touch", Some(42)));

        registry.unregister(id);
        assert!(!registry.is_any_handler_waiting_for("scroll", Some(42)));
    }

    #[test]
    fn test_untargeted_handler_matches_any_target() {
        let liveness = Arc::new(RuntimeLivenessRegistry::new());
        let registry = EventHandlerRegistry::new();
        registry.register(registry.next_id(), "scroll", None, handler(&liveness));

        assert!(registry.is_any_handler_waiting_for("scroll", Some(5)));
        assert!(registry.is_any_handler_waiting_for("scroll", None));

        let fired = Arc::new(PlMutex::new(0usize));
        {
            let fired = fired.clone();
            registry.dispatch("scroll", Some(5), 0.0, &JsValue::Null, |_, _| {
                *fired.lock() += 1;
            });
        }
        assert_eq!(*fired.lock(), 1);
    }

    #[test]
    fn test_dispatch_passes_event_object() {
        let liveness = Arc::new(RuntimeLivenessRegistry::new());
        let registry = EventHandlerRegistry::new();
        registry.register(registry.next_id(), "scroll", Some(9), handler(&liveness));

        let seen = Arc::new(PlMutex::new(Vec::new()));
        {
            let seen = seen.clone();
            let payload = JsValue::object([("y".to_string(), JsValue::Number(12.0))]);
            registry.dispatch("scroll", Some(9), 16.6, &payload, |_, event| {
                seen.lock().push(event);
            });
        }
        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].get("eventName"), Some(&JsValue::string("scroll")));
        assert_eq!(seen[0].get("eventTimestamp"), Some(&JsValue::Number(16.6)));
        assert_eq!(
            seen[0].get("payload").and_then(|p| p.get("y")),
            Some(&JsValue::Number(12.0))
        );
    }

    #[test]
    fn test_dispatch_snapshot_does_not_see_handlers_registered_mid_dispatch() {
        let liveness = Arc::new(RuntimeLivenessRegistry::new());
        let registry = Arc::new(EventHandlerRegistry::new());
        registry.register(registry.next_id(), "touch", None, handler(&liveness));

        let fired = Arc::new(PlMutex::new(0usize));
        {
            let fired = fired.clone();
            let registry_inner = registry.clone();
            let liveness = liveness.clone();
            registry.dispatch("touch", None, 0.0, &JsValue::Null, move |_, _| {
                *fired.lock() += 1;
                // Registering from inside a handler must neither deadlock
                // nor add to the in-flight dispatch.
                registry_inner.register(
                    registry_inner.next_id(),
                    "touch",
                    None,
                    handler(&liveness),
                );
            });
        }
        assert_eq!(*fired.lock(), 1);

        // The next dispatch sees both.
        let fired2 = Arc::new(PlMutex::new(0usize));
        {
            let fired2 = fired2.clone();
            registry.dispatch("touch", None, 0.0, &JsValue::Null, |_, _| {
                *fired2.lock() += 1;
            });
        }
        assert_eq!(*fired2.lock(), 2);
    }

    #[test]
    fn test_dispatch_returns_whether_any_handler_ran() {
        let registry = EventHandlerRegistry::new();
        assert!(!registry.dispatch("scroll", None, 0.0, &JsValue::Null, |_, _| {}));
    }
}
