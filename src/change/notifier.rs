//! Subscription list for change notifications.
//!
//! Handlers run synchronously on the mutating thread. The subscriber list
//! lock is released before any handler runs, so a handler may subscribe or
//! unsubscribe (itself included) without deadlocking.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::Notification;

/// Handle returned by [`Notifier::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(pub u64);

type Handler = Arc<dyn Fn(&Notification) + Send + Sync>;

#[derive(Default)]
struct Subscribers {
    next_id: u64,
    handlers: Vec<(SubscriptionId, Handler)>,
}

/// Cloneable handle onto a shared subscriber list.
#[derive(Clone, Default)]
pub struct Notifier {
    inner: Arc<Mutex<Subscribers>>,
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier").field("subscribers", &self.len()).finish()
    }
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&Notification) + Send + Sync + 'static,
    {
        let mut subs = self.inner.lock();
        let id = SubscriptionId(subs.next_id);
        subs.next_id += 1;
        subs.handlers.push((id, Arc::new(handler)));
        id
    }

    /// Returns false if the subscription was unknown.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subs = self.inner.lock();
        let before = subs.handlers.len();
        subs.handlers.retain(|(sid, _)| *sid != id);
        subs.handlers.len() != before
    }

    pub fn is_subscribed(&self, id: SubscriptionId) -> bool {
        self.inner.lock().handlers.iter().any(|(sid, _)| *sid == id)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver one notification to every current subscriber.
    ///
    /// Handlers added during dispatch first see the next notification;
    /// handlers removed during dispatch are skipped if not yet called.
    pub fn emit(&self, notification: &Notification) {
        let snapshot: Vec<(SubscriptionId, Handler)> = self.inner.lock().handlers.clone();
        for (id, handler) in snapshot {
            if self.is_subscribed(id) {
                handler(notification);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change::ChangeEvent;
    use crate::model::RecordId;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn note() -> Notification {
        Notification {
            record: RecordId::new(),
            type_name: "Zone".into(),
            events: vec![ChangeEvent::Changed],
            diffs: Vec::new(),
            emitted_at: Utc::now(),
        }
    }

    #[test]
    fn test_subscribe_and_emit() {
        let notifier = Notifier::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let id = notifier.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        notifier.emit(&note());
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        assert!(notifier.unsubscribe(id));
        assert!(!notifier.unsubscribe(id));
        notifier.emit(&note());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_handler_can_unsubscribe_itself() {
        let notifier = Notifier::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let slot: Arc<Mutex<Option<SubscriptionId>>> = Arc::new(Mutex::new(None));

        let (n, h, s) = (notifier.clone(), hits.clone(), slot.clone());
        let id = notifier.subscribe(move |_| {
            h.fetch_add(1, Ordering::SeqCst);
            if let Some(id) = *s.lock() {
                n.unsubscribe(id);
            }
        });
        *slot.lock() = Some(id);

        notifier.emit(&note());
        notifier.emit(&note());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(notifier.is_empty());
    }

    #[test]
    fn test_handler_can_subscribe_during_dispatch() {
        let notifier = Notifier::new();
        let late_hits = Arc::new(AtomicUsize::new(0));

        let (n, late) = (notifier.clone(), late_hits.clone());
        notifier.subscribe(move |_| {
            let late = late.clone();
            if n.len() == 1 {
                n.subscribe(move |_| {
                    late.fetch_add(1, Ordering::SeqCst);
                });
            }
        });

        notifier.emit(&note());
        assert_eq!(late_hits.load(Ordering::SeqCst), 0);
        notifier.emit(&note());
        assert_eq!(late_hits.load(Ordering::SeqCst), 1);
    }
}
