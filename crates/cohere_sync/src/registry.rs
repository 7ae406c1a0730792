// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The refresher dispatch table.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use cohere_cache::{EntityKind, Error, Result};
use uuid::Uuid;

use crate::instruction::{RefreshInstruction, RefreshMethod};
use crate::notifications::{CacheRefresherNotification, RefresherMessage, RefresherNotifications};
use crate::refresher::{CacheRefresher, IdCacheRefresher, KeyCacheRefresher, PayloadCacheRefresher};

/// A message shape a refresher may accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageShape {
    /// Full refresh, accepted by every refresher.
    RefreshAll,
    /// Refresh or removal by numeric id.
    ById,
    /// Refresh by secondary key.
    ByKey,
    /// Refresh by structured change description.
    ByPayload,
}

impl MessageShape {
    const fn name(self) -> &'static str {
        match self {
            Self::RefreshAll => "refresh-all",
            Self::ById => "by-id",
            Self::ByKey => "by-key",
            Self::ByPayload => "payload",
        }
    }
}

impl fmt::Display for MessageShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

type IdHandler = Box<dyn Fn(i32) + Send + Sync>;
type KeyHandler = Box<dyn Fn(Uuid) + Send + Sync>;
type JsonHandler = Box<dyn Fn(&str) -> Result<()> + Send + Sync>;

/// One row of the dispatch table: a refresher and the message shapes it accepts.
///
/// Built with [`RefresherEntry::new`] and the capability methods of [`Registration`], which only exist for
/// refreshers implementing the matching capability trait.
pub struct RefresherEntry {
    id: Uuid,
    name: &'static str,
    kind: EntityKind,
    instance: Arc<dyn Any + Send + Sync>,
    refresh_all: Box<dyn Fn() + Send + Sync>,
    refresh_id: Option<IdHandler>,
    remove_id: Option<IdHandler>,
    refresh_key: Option<KeyHandler>,
    refresh_json: Option<JsonHandler>,
}

impl RefresherEntry {
    /// Starts registering `refresher`, accepting full refreshes only.
    #[expect(clippy::new_ret_no_self, reason = "the entry is completed through its registration")]
    pub fn new<R: CacheRefresher>(refresher: R) -> Registration<R> {
        Registration::new(Arc::new(refresher))
    }

    /// Returns the wire-level address of the refresher.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Returns the name of the refresher.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Returns the kind the refresher is bound to.
    #[must_use]
    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    /// Returns `true` if the refresher accepts `shape`.
    #[must_use]
    pub fn supports(&self, shape: MessageShape) -> bool {
        match shape {
            MessageShape::RefreshAll => true,
            MessageShape::ById => self.refresh_id.is_some(),
            MessageShape::ByKey => self.refresh_key.is_some(),
            MessageShape::ByPayload => self.refresh_json.is_some(),
        }
    }

    pub(crate) fn unsupported(&self, shape: MessageShape) -> Error {
        Error::configuration(format!(
            "cache refresher {} ({}) does not accept {shape} messages",
            self.name, self.id
        ))
    }
}

impl fmt::Debug for RefresherEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefresherEntry")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("by_id", &self.supports(MessageShape::ById))
            .field("by_key", &self.supports(MessageShape::ByKey))
            .field("by_payload", &self.supports(MessageShape::ByPayload))
            .finish()
    }
}

/// Declares which message shapes a refresher accepts.
///
/// # Example
///
/// ```
/// use cohere_cache::AppCaches;
/// use cohere_sync::refreshers::UserCacheRefresher;
/// use cohere_sync::{CacheRefresher, CacheRefresherRegistry, MessageShape, RefresherEntry};
///
/// let caches = AppCaches::disabled();
/// let registry = CacheRefresherRegistry::builder()
///     .register(RefresherEntry::new(UserCacheRefresher::new(caches)).by_id())
///     .build()?;
///
/// let entry = registry.entry(UserCacheRefresher::UNIQUE_ID)?;
/// assert!(entry.supports(MessageShape::ById));
/// assert!(!entry.supports(MessageShape::ByPayload));
/// # Ok::<(), cohere_cache::Error>(())
/// ```
pub struct Registration<R> {
    refresher: Arc<R>,
    entry: RefresherEntry,
}

impl<R: CacheRefresher> Registration<R> {
    fn new(refresher: Arc<R>) -> Self {
        let all = Arc::clone(&refresher);
        let entry = RefresherEntry {
            id: R::UNIQUE_ID,
            name: R::NAME,
            kind: R::KIND,
            instance: Arc::clone(&refresher) as Arc<dyn Any + Send + Sync>,
            refresh_all: Box::new(move || all.refresh_all()),
            refresh_id: None,
            remove_id: None,
            refresh_key: None,
            refresh_json: None,
        };

        Self { refresher, entry }
    }
}

impl<R: IdCacheRefresher> Registration<R> {
    /// Accepts refreshes and removals by numeric id.
    #[must_use]
    pub fn by_id(mut self) -> Self {
        let refresh = Arc::clone(&self.refresher);
        let remove = Arc::clone(&self.refresher);
        self.entry.refresh_id = Some(Box::new(move |id| refresh.refresh_id(id)));
        self.entry.remove_id = Some(Box::new(move |id| remove.remove_id(id)));
        self
    }
}

impl<R: KeyCacheRefresher> Registration<R> {
    /// Accepts refreshes by secondary key.
    #[must_use]
    pub fn by_key(mut self) -> Self {
        let refresher = Arc::clone(&self.refresher);
        self.entry.refresh_key = Some(Box::new(move |key| refresher.refresh_key(key)));
        self
    }
}

impl<R: PayloadCacheRefresher> Registration<R> {
    /// Accepts structured change descriptions and their JSON wire form.
    #[must_use]
    pub fn by_payload(mut self) -> Self {
        let refresher = Arc::clone(&self.refresher);
        self.entry.refresh_json = Some(Box::new(move |json| {
            let payloads: Vec<R::Payload> = serde_json::from_str(json).map_err(Error::serialization)?;
            refresher.refresh_payloads(&payloads);
            Ok(())
        }));
        self
    }
}

impl<R: CacheRefresher> From<Registration<R>> for RefresherEntry {
    fn from(registration: Registration<R>) -> Self {
        registration.entry
    }
}

impl<R> fmt::Debug for Registration<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration").field("entry", &self.entry).finish()
    }
}

/// Builder for [`CacheRefresherRegistry`].
#[derive(Debug, Default)]
pub struct CacheRefresherRegistryBuilder {
    entries: Vec<RefresherEntry>,
    notifications: RefresherNotifications,
}

impl CacheRefresherRegistryBuilder {
    /// Adds a refresher to the table.
    #[must_use]
    pub fn register(mut self, entry: impl Into<RefresherEntry>) -> Self {
        self.entries.push(entry.into());
        self
    }

    /// Sets the hub notified after every applied message.
    #[must_use]
    pub fn notifications(mut self, notifications: RefresherNotifications) -> Self {
        self.notifications = notifications;
        self
    }

    /// Builds the registry.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if two refreshers share an identifier.
    pub fn build(self) -> Result<CacheRefresherRegistry> {
        let mut entries: HashMap<Uuid, RefresherEntry> = HashMap::with_capacity(self.entries.len());
        for entry in self.entries {
            if let Some(existing) = entries.get(&entry.id) {
                return Err(Error::configuration(format!(
                    "cache refreshers {} and {} share the identifier {}",
                    existing.name, entry.name, entry.id
                )));
            }
            entries.insert(entry.id, entry);
        }

        Ok(CacheRefresherRegistry {
            entries,
            notifications: self.notifications,
        })
    }
}

/// The set of refreshers known to one server process, addressed by their unique identifier.
///
/// Every applied message is published to the registry's [`RefresherNotifications`].
pub struct CacheRefresherRegistry {
    entries: HashMap<Uuid, RefresherEntry>,
    notifications: RefresherNotifications,
}

impl CacheRefresherRegistry {
    /// Starts building a registry.
    #[must_use]
    pub fn builder() -> CacheRefresherRegistryBuilder {
        CacheRefresherRegistryBuilder::default()
    }

    /// Returns the entry registered under `refresher_id`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if no refresher has this identifier.
    pub fn entry(&self, refresher_id: Uuid) -> Result<&RefresherEntry> {
        self.entries
            .get(&refresher_id)
            .ok_or_else(|| Error::configuration(format!("cache refresher with id {refresher_id} does not exist")))
    }

    /// Returns `true` if a refresher is registered under `refresher_id`.
    #[must_use]
    pub fn contains(&self, refresher_id: Uuid) -> bool {
        self.entries.contains_key(&refresher_id)
    }

    /// Returns the identifiers of every registered refresher, sorted.
    #[must_use]
    pub fn refresher_ids(&self) -> Vec<Uuid> {
        let mut ids: Vec<_> = self.entries.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Returns the notification hub.
    #[must_use]
    pub fn notifications(&self) -> &RefresherNotifications {
        &self.notifications
    }

    /// Returns the registered instance of `R`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `R` is not registered, or if another type is registered under its
    /// identifier.
    pub fn get<R: CacheRefresher>(&self) -> Result<Arc<R>> {
        let entry = self.entry(R::UNIQUE_ID)?;
        Arc::clone(&entry.instance).downcast::<R>().map_err(|_other| {
            Error::configuration(format!(
                "cache refresher {} is registered under the identifier of {}",
                entry.name,
                R::NAME
            ))
        })
    }

    /// Evicts everything the refresher `refresher_id` is responsible for.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the refresher is unknown.
    pub fn refresh_all(&self, refresher_id: Uuid) -> Result<()> {
        let entry = self.entry(refresher_id)?;
        (entry.refresh_all)();
        self.notify(entry, RefresherMessage::RefreshAll);
        Ok(())
    }

    /// Evicts the entity `id`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the refresher is unknown or does not accept ids.
    pub fn refresh_id(&self, refresher_id: Uuid, id: i32) -> Result<()> {
        let entry = self.entry(refresher_id)?;
        let handler = entry.refresh_id.as_ref().ok_or_else(|| entry.unsupported(MessageShape::ById))?;
        handler(id);
        self.notify(entry, RefresherMessage::RefreshById(id));
        Ok(())
    }

    /// Evicts the removed entity `id`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the refresher is unknown or does not accept ids.
    pub fn remove_id(&self, refresher_id: Uuid, id: i32) -> Result<()> {
        let entry = self.entry(refresher_id)?;
        let handler = entry.remove_id.as_ref().ok_or_else(|| entry.unsupported(MessageShape::ById))?;
        handler(id);
        self.notify(entry, RefresherMessage::RemoveById(id));
        Ok(())
    }

    /// Evicts the entity with secondary key `key`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the refresher is unknown or does not accept keys.
    pub fn refresh_key(&self, refresher_id: Uuid, key: Uuid) -> Result<()> {
        let entry = self.entry(refresher_id)?;
        let handler = entry.refresh_key.as_ref().ok_or_else(|| entry.unsupported(MessageShape::ByKey))?;
        handler(key);
        self.notify(entry, RefresherMessage::RefreshByKey(key));
        Ok(())
    }

    /// Parses `json` as an array of the refresher's payloads and applies it.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the refresher is unknown or does not accept payloads, and a
    /// serialization error if `json` is not an array of its payloads.
    pub fn refresh_json(&self, refresher_id: Uuid, json: &str) -> Result<()> {
        let entry = self.entry(refresher_id)?;
        let handler = entry.refresh_json.as_ref().ok_or_else(|| entry.unsupported(MessageShape::ByPayload))?;
        handler(json)?;
        self.notify(entry, RefresherMessage::RefreshByPayload(json.to_owned()));
        Ok(())
    }

    /// Applies typed `payloads` through the registered `R` and returns their JSON wire form.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `R` is not registered or was registered without payload support,
    /// and a serialization error if the payloads cannot be serialized.
    pub fn refresh_payloads<R: PayloadCacheRefresher>(&self, payloads: &[R::Payload]) -> Result<String> {
        let refresher = self.get::<R>()?;
        let entry = self.entry(R::UNIQUE_ID)?;
        if !entry.supports(MessageShape::ByPayload) {
            return Err(entry.unsupported(MessageShape::ByPayload));
        }

        let json = serde_json::to_string(payloads).map_err(Error::serialization)?;
        refresher.refresh_payloads(payloads);
        self.notify(entry, RefresherMessage::RefreshByPayload(json.clone()));
        Ok(json)
    }

    /// Applies one instruction received from a peer.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the addressed refresher is unknown or does not accept the
    /// instruction's shape, and a serialization error if the instruction's JSON is missing or invalid.
    pub fn apply(&self, instruction: &RefreshInstruction) -> Result<()> {
        let refresher_id = instruction.refresher_id;
        match instruction.method {
            RefreshMethod::RefreshAll => self.refresh_all(refresher_id),
            RefreshMethod::RefreshById => self.refresh_id(refresher_id, instruction.int_id),
            RefreshMethod::RemoveById => self.remove_id(refresher_id, instruction.int_id),
            RefreshMethod::RefreshByGuid => self.refresh_key(refresher_id, instruction.guid_id),
            RefreshMethod::RefreshByIds => {
                let json = instruction.json_ids.as_deref().ok_or_else(|| missing_json("jsonIds"))?;
                let ids: Vec<i32> = serde_json::from_str(json).map_err(Error::serialization)?;
                ids.into_iter().try_for_each(|id| self.refresh_id(refresher_id, id))
            }
            RefreshMethod::RefreshByJson => {
                let json = instruction.json_payload.as_deref().ok_or_else(|| missing_json("jsonPayload"))?;
                self.refresh_json(refresher_id, json)
            }
        }
    }

    fn notify(&self, entry: &RefresherEntry, message: RefresherMessage) {
        self.notifications.publish(&CacheRefresherNotification {
            refresher_id: entry.id,
            refresher_name: entry.name,
            kind: entry.kind,
            message,
        });
    }
}

fn missing_json(field: &str) -> Error {
    Error::serialization(format!("instruction has no {field}"))
}

impl fmt::Debug for CacheRefresherRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.entries.values().map(|entry| entry.name).collect();
        names.sort_unstable();
        f.debug_struct("CacheRefresherRegistry")
            .field("refreshers", &names)
            .field("notifications", &self.notifications)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use cohere_cache::ErrorKind;
    use parking_lot::Mutex;
    use serde::{Deserialize, Serialize};

    use super::*;

    #[derive(Debug, Default)]
    struct Counting {
        all: AtomicUsize,
        ids: Mutex<Vec<i32>>,
        removed: Mutex<Vec<i32>>,
        keys: Mutex<Vec<Uuid>>,
        payloads: Mutex<Vec<Change>>,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Change {
        id: i32,
    }

    #[derive(Debug, Default, Clone)]
    struct Tracker(Arc<Counting>);

    impl CacheRefresher for Tracker {
        const UNIQUE_ID: Uuid = Uuid::from_u128(0x0001);
        const NAME: &'static str = "tracker";
        const KIND: EntityKind = EntityKind::Member;

        fn refresh_all(&self) {
            self.0.all.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl IdCacheRefresher for Tracker {
        fn refresh_id(&self, id: i32) {
            self.0.ids.lock().push(id);
        }

        fn remove_id(&self, id: i32) {
            self.0.removed.lock().push(id);
        }
    }

    impl KeyCacheRefresher for Tracker {
        fn refresh_key(&self, key: Uuid) {
            self.0.keys.lock().push(key);
        }
    }

    impl PayloadCacheRefresher for Tracker {
        type Payload = Change;

        fn refresh_payloads(&self, payloads: &[Change]) {
            self.0.payloads.lock().extend_from_slice(payloads);
        }
    }

    #[derive(Debug)]
    struct AllOnly;

    impl CacheRefresher for AllOnly {
        const UNIQUE_ID: Uuid = Uuid::from_u128(0x0002);
        const NAME: &'static str = "all-only";
        const KIND: EntityKind = EntityKind::PublicAccessEntry;

        fn refresh_all(&self) {}
    }

    fn registry(tracker: &Tracker) -> CacheRefresherRegistry {
        CacheRefresherRegistry::builder()
            .register(RefresherEntry::new(tracker.clone()).by_id().by_key().by_payload())
            .register(RefresherEntry::new(AllOnly))
            .build()
            .expect("unique ids")
    }

    #[test]
    fn dispatches_every_shape() {
        let tracker = Tracker::default();
        let registry = registry(&tracker);
        let key = Uuid::from_u128(42);

        registry.refresh_all(Tracker::UNIQUE_ID).expect("refresh all");
        registry.refresh_id(Tracker::UNIQUE_ID, 7).expect("by id");
        registry.remove_id(Tracker::UNIQUE_ID, 8).expect("remove");
        registry.refresh_key(Tracker::UNIQUE_ID, key).expect("by key");
        registry.refresh_json(Tracker::UNIQUE_ID, r#"[{"id":9}]"#).expect("by json");

        assert_eq!(tracker.0.all.load(Ordering::SeqCst), 1);
        assert_eq!(*tracker.0.ids.lock(), vec![7]);
        assert_eq!(*tracker.0.removed.lock(), vec![8]);
        assert_eq!(*tracker.0.keys.lock(), vec![key]);
        assert_eq!(*tracker.0.payloads.lock(), vec![Change { id: 9 }]);
    }

    #[test]
    fn unknown_refresher_is_a_configuration_error() {
        let registry = registry(&Tracker::default());
        let error = registry.refresh_all(Uuid::from_u128(0xdead)).expect_err("unknown");

        assert_eq!(error.kind(), ErrorKind::Configuration);
        assert!(error.to_string().contains("does not exist"), "got: {error}");
    }

    #[test]
    fn unsupported_shape_fails_loudly() {
        let registry = registry(&Tracker::default());

        for error in [
            registry.refresh_id(AllOnly::UNIQUE_ID, 1).expect_err("ids"),
            registry.remove_id(AllOnly::UNIQUE_ID, 1).expect_err("remove"),
            registry.refresh_key(AllOnly::UNIQUE_ID, Uuid::from_u128(1)).expect_err("keys"),
            registry.refresh_json(AllOnly::UNIQUE_ID, "[]").expect_err("payload"),
        ] {
            assert!(error.is_configuration());
            assert!(error.to_string().contains("all-only"), "got: {error}");
        }

        registry.refresh_all(AllOnly::UNIQUE_ID).expect("refresh all is always accepted");
    }

    #[test]
    fn duplicate_identifiers_are_rejected() {
        let error = CacheRefresherRegistry::builder()
            .register(RefresherEntry::new(Tracker::default()))
            .register(RefresherEntry::new(Tracker::default()).by_id())
            .build()
            .expect_err("duplicate");

        assert!(error.is_configuration());
    }

    #[test]
    fn invalid_json_is_a_serialization_error() {
        let tracker = Tracker::default();
        let registry = registry(&tracker);

        let error = registry.refresh_json(Tracker::UNIQUE_ID, "{not json").expect_err("malformed");
        assert_eq!(error.kind(), ErrorKind::Serialization);
        assert!(tracker.0.payloads.lock().is_empty());
    }

    #[test]
    fn typed_payloads_are_applied_and_serialized() {
        let tracker = Tracker::default();
        let registry = registry(&tracker);

        let json = registry
            .refresh_payloads::<Tracker>(&[Change { id: 1 }, Change { id: 2 }])
            .expect("typed payloads");

        assert_eq!(json, r#"[{"id":1},{"id":2}]"#);
        assert_eq!(tracker.0.payloads.lock().len(), 2);
    }

    #[test]
    fn typed_payloads_require_payload_registration() {
        let registry = CacheRefresherRegistry::builder()
            .register(RefresherEntry::new(Tracker::default()).by_id())
            .build()
            .expect("registry");

        let error = registry.refresh_payloads::<Tracker>(&[Change { id: 1 }]).expect_err("not registered");
        assert!(error.is_configuration());
    }

    #[test]
    fn instructions_are_routed_by_method() {
        let tracker = Tracker::default();
        let registry = registry(&tracker);

        let instructions = [
            RefreshInstruction::refresh_ids(Tracker::UNIQUE_ID, &[3, 4]).expect("ids"),
            RefreshInstruction::remove_by_id(Tracker::UNIQUE_ID, 5),
            RefreshInstruction::refresh_by_json(Tracker::UNIQUE_ID, String::from(r#"[{"id":6}]"#), 1),
        ];
        for instruction in &instructions {
            registry.apply(instruction).expect("apply");
        }

        assert_eq!(*tracker.0.ids.lock(), vec![3, 4]);
        assert_eq!(*tracker.0.removed.lock(), vec![5]);
        assert_eq!(*tracker.0.payloads.lock(), vec![Change { id: 6 }]);
    }

    #[test]
    fn every_applied_message_is_published() {
        let notifications = RefresherNotifications::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        notifications.subscribe(move |n| sink.lock().push((n.refresher_name, n.message.clone())));

        let registry = CacheRefresherRegistry::builder()
            .notifications(notifications)
            .register(RefresherEntry::new(Tracker::default()).by_id())
            .build()
            .expect("registry");

        registry.refresh_id(Tracker::UNIQUE_ID, 7).expect("by id");
        let _ = registry.refresh_key(Tracker::UNIQUE_ID, Uuid::from_u128(1));

        assert_eq!(*seen.lock(), vec![("tracker", RefresherMessage::RefreshById(7))]);
    }

    #[test]
    fn typed_lookup_returns_the_registered_instance() {
        let tracker = Tracker::default();
        let registry = registry(&tracker);

        let found = registry.get::<Tracker>().expect("registered");
        assert!(Arc::ptr_eq(&found.0, &tracker.0));
        assert!(format!("{registry:?}").contains("all-only"));
    }
}
