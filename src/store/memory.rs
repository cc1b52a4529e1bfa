//! In-process [`ConfigStore`] with a broadcast change feed and fault injection.

use super::{
    ConfigStore, LabelSelector, ResourceKind, StoreError, StoreEvent, StoreEventKind,
    StoreEventStream, StoreObject,
};
use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::debug;

const EVENT_CHANNEL_CAPACITY: usize = 256;

type ObjectKey = (ResourceKind, String, String);

#[derive(Debug, Default)]
struct Faults {
    get: VecDeque<StoreError>,
    list: VecDeque<StoreError>,
    watch: VecDeque<StoreError>,
}

/// Store kept entirely in memory.
///
/// Every mutation is published to open watch streams. Queued faults are
/// returned, in order, by the next matching calls before normal service
/// resumes.
#[derive(Debug)]
pub struct InMemoryStore {
    objects: RwLock<BTreeMap<ObjectKey, StoreObject>>,
    events: broadcast::Sender<(ResourceKind, StoreEvent)>,
    faults: Mutex<Faults>,
    /// Cancelled to force every open watch stream to end
    disconnect: Mutex<CancellationToken>,
    get_calls: AtomicUsize,
    watch_calls: AtomicUsize,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            objects: RwLock::new(BTreeMap::new()),
            events,
            faults: Mutex::new(Faults::default()),
            disconnect: Mutex::new(CancellationToken::new()),
            get_calls: AtomicUsize::new(0),
            watch_calls: AtomicUsize::new(0),
        }
    }

    /// Create or replace an object, emitting `Added` or `Modified`
    pub fn apply(&self, kind: ResourceKind, object: StoreObject) {
        let key = (kind, object.namespace.clone(), object.name.clone());
        let previous = self.objects.write().insert(key, object.clone());
        let event_kind = if previous.is_some() {
            StoreEventKind::Modified
        } else {
            StoreEventKind::Added
        };
        self.publish(kind, event_kind, object);
    }

    /// Remove an object, emitting `Deleted` with its last known state
    pub fn delete(&self, kind: ResourceKind, namespace: &str, name: &str) -> bool {
        let key = (kind, namespace.to_string(), name.to_string());
        let removed = self.objects.write().remove(&key);
        match removed {
            Some(object) => {
                self.publish(kind, StoreEventKind::Deleted, object);
                true
            }
            None => false,
        }
    }

    /// Emit a raw event without touching stored state
    pub fn emit(&self, kind: ResourceKind, event: StoreEvent) {
        // No receivers is fine
        let _ = self.events.send((kind, event));
    }

    pub fn fail_next_get(&self, error: StoreError) {
        self.faults.lock().get.push_back(error);
    }

    pub fn fail_next_list(&self, error: StoreError) {
        self.faults.lock().list.push_back(error);
    }

    pub fn fail_next_watch(&self, error: StoreError) {
        self.faults.lock().watch.push_back(error);
    }

    /// End every open watch stream, as a dropped connection would
    pub fn disconnect_watchers(&self) {
        let mut token = self.disconnect.lock();
        token.cancel();
        *token = CancellationToken::new();
    }

    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::Relaxed)
    }

    pub fn watch_calls(&self) -> usize {
        self.watch_calls.load(Ordering::Relaxed)
    }

    fn publish(&self, kind: ResourceKind, event_kind: StoreEventKind, object: StoreObject) {
        debug!(%kind, namespace = %object.namespace, name = %object.name, event = ?event_kind, "store change");
        self.emit(
            kind,
            StoreEvent {
                kind: event_kind,
                object,
            },
        );
    }
}

#[async_trait]
impl ConfigStore for InMemoryStore {
    async fn get(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
    ) -> Result<StoreObject, StoreError> {
        self.get_calls.fetch_add(1, Ordering::Relaxed);
        if let Some(error) = self.faults.lock().get.pop_front() {
            return Err(error);
        }

        let key = (kind, namespace.to_string(), name.to_string());
        self.objects
            .read()
            .get(&key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                kind,
                namespace: namespace.to_string(),
                name: name.to_string(),
            })
    }

    async fn list(
        &self,
        kind: ResourceKind,
        namespace: &str,
        selector: &LabelSelector,
    ) -> Result<Vec<StoreObject>, StoreError> {
        if let Some(error) = self.faults.lock().list.pop_front() {
            return Err(error);
        }

        Ok(self
            .objects
            .read()
            .iter()
            .filter(|((k, ns, _), object)| {
                *k == kind && ns == namespace && selector.matches(&object.labels)
            })
            .map(|(_, object)| object.clone())
            .collect())
    }

    async fn watch(
        &self,
        kind: ResourceKind,
        namespace: &str,
        selector: &LabelSelector,
    ) -> Result<StoreEventStream, StoreError> {
        self.watch_calls.fetch_add(1, Ordering::Relaxed);
        if let Some(error) = self.faults.lock().watch.pop_front() {
            return Err(error);
        }

        let receiver = self.events.subscribe();
        let disconnect = self.disconnect.lock().clone();
        let scope = WatchScope {
            kind,
            namespace: namespace.to_string(),
            selector: selector.clone(),
        };

        let stream = futures::stream::unfold(
            (receiver, disconnect, scope),
            |(mut receiver, disconnect, scope)| async move {
                loop {
                    let received = tokio::select! {
                        _ = disconnect.cancelled() => return None,
                        received = receiver.recv() => received,
                    };
                    match received {
                        Ok((kind, event)) if scope.admits(kind, &event.object) => {
                            return Some((Ok(event), (receiver, disconnect, scope)));
                        }
                        Ok(_) => continue,
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            let error = StoreError::Other(format!("watch lagged by {skipped} events"));
                            return Some((Err(error), (receiver, disconnect, scope)));
                        }
                        Err(broadcast::error::RecvError::Closed) => return None,
                    }
                }
            },
        );

        Ok(stream.boxed())
    }
}

struct WatchScope {
    kind: ResourceKind,
    namespace: String,
    selector: LabelSelector,
}

impl WatchScope {
    fn admits(&self, kind: ResourceKind, object: &StoreObject) -> bool {
        kind == self.kind && object.namespace == self.namespace && self.selector.matches(&object.labels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_get_and_fault_queue() {
        let store = InMemoryStore::new();
        store.apply(ResourceKind::ConfigMap, StoreObject::new("ns", "a"));
        store.fail_next_get(StoreError::Unavailable("boom".into()));

        let first = store.get(ResourceKind::ConfigMap, "ns", "a").await;
        assert_eq!(first, Err(StoreError::Unavailable("boom".into())));
        assert!(store.get(ResourceKind::ConfigMap, "ns", "a").await.is_ok());
        assert!(matches!(
            store.get(ResourceKind::Secret, "ns", "a").await,
            Err(StoreError::NotFound { .. })
        ));
        assert_eq!(store.get_calls(), 3);
    }

    #[tokio::test]
    async fn test_watch_scoped_by_kind_namespace_and_labels() {
        let store = InMemoryStore::new();
        let mut stream = store
            .watch(ResourceKind::ConfigMap, "ns", &LabelSelector::managed())
            .await
            .unwrap();

        store.apply(ResourceKind::ConfigMap, StoreObject::new("ns", "unlabeled"));
        store.apply(ResourceKind::Secret, StoreObject::new("ns", "secret").managed());
        store.apply(ResourceKind::ConfigMap, StoreObject::new("other", "x").managed());
        store.apply(ResourceKind::ConfigMap, StoreObject::new("ns", "wanted").managed());

        let event = tokio::time::timeout(Duration::from_secs(1), stream.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(event.kind, StoreEventKind::Added);
        assert_eq!(event.object.name, "wanted");
    }

    #[tokio::test]
    async fn test_disconnect_ends_stream() {
        let store = InMemoryStore::new();
        let mut stream = store
            .watch(ResourceKind::ConfigMap, "ns", &LabelSelector::new())
            .await
            .unwrap();

        store.disconnect_watchers();
        let next = tokio::time::timeout(Duration::from_secs(1), stream.next())
            .await
            .unwrap();
        assert!(next.is_none());
    }

    #[tokio::test]
    async fn test_list_filters_by_selector() {
        let store = InMemoryStore::new();
        store.apply(ResourceKind::ConfigMap, StoreObject::new("ns", "a").managed());
        store.apply(ResourceKind::ConfigMap, StoreObject::new("ns", "b"));

        let listed = store
            .list(ResourceKind::ConfigMap, "ns", &LabelSelector::managed())
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "a");
    }
}
