// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt;
use std::sync::Arc;

use cohere_cache::EntityKind;
use parking_lot::RwLock;
use uuid::Uuid;

/// The message a refresher handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefresherMessage {
    /// Every entry of the kind was evicted.
    RefreshAll,
    /// The entity with this id changed.
    RefreshById(i32),
    /// The entity with this id was removed.
    RemoveById(i32),
    /// The entity with this secondary key changed.
    RefreshByKey(Uuid),
    /// A change description, as serialized JSON.
    RefreshByPayload(String),
}

impl RefresherMessage {
    /// Returns the stable name of this message shape.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::RefreshAll => "refresh_all",
            Self::RefreshById(_) => "refresh_by_id",
            Self::RemoveById(_) => "remove_by_id",
            Self::RefreshByKey(_) => "refresh_by_key",
            Self::RefreshByPayload(_) => "refresh_by_payload",
        }
    }
}

/// Published after a refresher applied a message to the local caches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheRefresherNotification {
    /// The wire-level address of the refresher.
    pub refresher_id: Uuid,
    /// The name of the refresher.
    pub refresher_name: &'static str,
    /// The kind the refresher is bound to.
    pub kind: EntityKind,
    /// What was applied.
    pub message: RefresherMessage,
}

type Subscriber = Arc<dyn Fn(&CacheRefresherNotification) + Send + Sync>;

/// Fans refresher notifications out to subscribers.
///
/// Subscribers are called synchronously on the thread that applied the message, after the caches were
/// updated. Cloning is cheap and clones share their subscribers.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicUsize, Ordering};
///
/// use cohere_cache::EntityKind;
/// use cohere_sync::{CacheRefresherNotification, RefresherMessage, RefresherNotifications};
/// use uuid::Uuid;
///
/// let notifications = RefresherNotifications::new();
/// let seen = Arc::new(AtomicUsize::new(0));
/// let counter = Arc::clone(&seen);
/// notifications.subscribe(move |_| {
///     counter.fetch_add(1, Ordering::SeqCst);
/// });
///
/// notifications.publish(&CacheRefresherNotification {
///     refresher_id: Uuid::nil(),
///     refresher_name: "template",
///     kind: EntityKind::Template,
///     message: RefresherMessage::RefreshAll,
/// });
/// assert_eq!(seen.load(Ordering::SeqCst), 1);
/// ```
#[derive(Clone, Default)]
pub struct RefresherNotifications {
    subscribers: Arc<RwLock<Vec<Subscriber>>>,
}

impl RefresherNotifications {
    /// Creates a hub without subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a callback invoked for every published notification.
    pub fn subscribe(&self, subscriber: impl Fn(&CacheRefresherNotification) + Send + Sync + 'static) {
        self.subscribers.write().push(Arc::new(subscriber));
    }

    /// Returns the number of registered subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Logs `notification` and hands it to every subscriber.
    pub fn publish(&self, notification: &CacheRefresherNotification) {
        tracing::debug!(
            refresher.id = %notification.refresher_id,
            refresher.name = notification.refresher_name,
            refresher.kind = notification.kind.name(),
            refresher.message = notification.message.name(),
            "refresher.event"
        );

        // Subscribers may subscribe in turn, so they run outside the lock.
        let subscribers = self.subscribers.read().clone();
        for subscriber in subscribers {
            subscriber(notification);
        }
    }
}

impl fmt::Debug for RefresherNotifications {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefresherNotifications")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;

    use super::*;

    fn notification(message: RefresherMessage) -> CacheRefresherNotification {
        CacheRefresherNotification {
            refresher_id: Uuid::nil(),
            refresher_name: "user",
            kind: EntityKind::User,
            message,
        }
    }

    #[test]
    fn every_subscriber_sees_every_notification() {
        let notifications = RefresherNotifications::new();
        let first = Arc::new(Mutex::new(Vec::new()));
        let second = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&first);
        notifications.subscribe(move |n| sink.lock().push(n.message.clone()));
        let sink = Arc::clone(&second);
        notifications.subscribe(move |n| sink.lock().push(n.message.clone()));

        notifications.publish(&notification(RefresherMessage::RefreshById(7)));
        notifications.publish(&notification(RefresherMessage::RemoveById(7)));

        let expected = vec![RefresherMessage::RefreshById(7), RefresherMessage::RemoveById(7)];
        assert_eq!(*first.lock(), expected);
        assert_eq!(*second.lock(), expected);
    }

    #[test]
    fn clones_share_subscribers() {
        let notifications = RefresherNotifications::new();
        let clone = notifications.clone();
        clone.subscribe(|_| {});

        assert_eq!(notifications.subscriber_count(), 1);
        assert!(format!("{notifications:?}").contains("subscribers: 1"));
    }

    #[test]
    fn subscriber_may_subscribe_while_notified() {
        let notifications = RefresherNotifications::new();
        let hub = notifications.clone();
        notifications.subscribe(move |_| hub.subscribe(|_| {}));

        notifications.publish(&notification(RefresherMessage::RefreshAll));
        assert_eq!(notifications.subscriber_count(), 2);
    }

    #[test]
    fn message_names_are_stable() {
        assert_eq!(RefresherMessage::RefreshByKey(Uuid::nil()).name(), "refresh_by_key");
        assert_eq!(RefresherMessage::RefreshByPayload(String::new()).name(), "refresh_by_payload");
    }
}
