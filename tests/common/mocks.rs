//! Hand-rolled provider and store doubles.

use async_trait::async_trait;
use futures::StreamExt;
use mcp_config::store::{ResourceKind, StoreEventStream};
use mcp_config::{
    ConfigProvider, ConfigStore, ConfigUpdateHandler, LabelSelector, McpConfig, ProviderError,
    ProviderResult, StoreError, StoreObject, WatchStatus,
};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Scripted result for one call
#[derive(Debug, Clone)]
pub enum Outcome {
    Ok,
    Fail(String),
}

#[derive(Debug)]
pub struct MockProvider {
    name: String,
    watch_script: Mutex<VecDeque<Outcome>>,
    /// Used once the script runs out
    watch_default: Outcome,
    stop_outcome: Outcome,
    configs: Mutex<HashMap<String, Arc<McpConfig>>>,
    get_failures: Mutex<VecDeque<String>>,
    watching: AtomicBool,
    pub watch_calls: AtomicUsize,
    pub stop_calls: AtomicUsize,
    pub get_calls: AtomicUsize,
}

impl MockProvider {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            watch_script: Mutex::new(VecDeque::new()),
            watch_default: Outcome::Ok,
            stop_outcome: Outcome::Ok,
            configs: Mutex::new(HashMap::new()),
            get_failures: Mutex::new(VecDeque::new()),
            watching: AtomicBool::new(false),
            watch_calls: AtomicUsize::new(0),
            stop_calls: AtomicUsize::new(0),
            get_calls: AtomicUsize::new(0),
        }
    }

    /// Every watch call fails with `reason`
    pub fn failing_watch(name: &str, reason: &str) -> Self {
        Self {
            watch_default: Outcome::Fail(reason.to_string()),
            ..Self::new(name)
        }
    }

    pub fn failing_stop(name: &str, reason: &str) -> Self {
        Self {
            stop_outcome: Outcome::Fail(reason.to_string()),
            ..Self::new(name)
        }
    }

    /// Queue outcomes for the next watch calls
    pub fn script_watch(self, outcomes: impl IntoIterator<Item = Outcome>) -> Self {
        self.watch_script.lock().extend(outcomes);
        self
    }

    pub fn with_config(self, config_ref: &str, config: McpConfig) -> Self {
        self.configs
            .lock()
            .insert(config_ref.to_string(), Arc::new(config));
        self
    }

    pub fn fail_next_get(&self, reason: &str) {
        self.get_failures.lock().push_back(reason.to_string());
    }

    pub fn is_watching(&self) -> bool {
        self.watching.load(Ordering::SeqCst)
    }

    pub fn watch_calls(&self) -> usize {
        self.watch_calls.load(Ordering::SeqCst)
    }

    fn unavailable(&self, reason: &str) -> ProviderError {
        ProviderError::Unavailable {
            provider: self.name.clone(),
            reason: reason.to_string(),
        }
    }
}

#[async_trait]
impl ConfigProvider for MockProvider {
    async fn get_mcp_config(
        &self,
        cancel: &CancellationToken,
        config_ref: &str,
    ) -> ProviderResult<Arc<McpConfig>> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        if cancel.is_cancelled() {
            return Err(ProviderError::Cancelled);
        }
        if let Some(reason) = self.get_failures.lock().pop_front() {
            return Err(self.unavailable(&reason));
        }
        self.configs
            .lock()
            .get(config_ref)
            .cloned()
            .ok_or_else(|| self.unavailable("no such config"))
    }

    async fn watch(
        &self,
        _cancel: &CancellationToken,
        _handler: ConfigUpdateHandler,
    ) -> ProviderResult<WatchStatus> {
        self.watch_calls.fetch_add(1, Ordering::SeqCst);
        let outcome = self
            .watch_script
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.watch_default.clone());
        match outcome {
            Outcome::Ok => {
                self.watching.store(true, Ordering::SeqCst);
                Ok(WatchStatus::Started)
            }
            Outcome::Fail(reason) => Err(self.unavailable(&reason)),
        }
    }

    async fn stop(&self) -> ProviderResult<()> {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        self.watching.store(false, Ordering::SeqCst);
        match &self.stop_outcome {
            Outcome::Ok => Ok(()),
            Outcome::Fail(reason) => Err(ProviderError::StopFailed {
                provider: self.name.clone(),
                reason: reason.clone(),
            }),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Store whose calls never complete. With `open_watch` set, `watch` answers
/// with a feed that stays silent and only `get`/`list` hang.
#[derive(Debug, Default)]
pub struct UnresponsiveStore {
    pub open_watch: bool,
    pub list_calls: AtomicUsize,
}

#[async_trait]
impl ConfigStore for UnresponsiveStore {
    async fn get(
        &self,
        _kind: ResourceKind,
        _namespace: &str,
        _name: &str,
    ) -> Result<StoreObject, StoreError> {
        std::future::pending().await
    }

    async fn list(
        &self,
        _kind: ResourceKind,
        _namespace: &str,
        _selector: &LabelSelector,
    ) -> Result<Vec<StoreObject>, StoreError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        std::future::pending().await
    }

    async fn watch(
        &self,
        _kind: ResourceKind,
        _namespace: &str,
        _selector: &LabelSelector,
    ) -> Result<StoreEventStream, StoreError> {
        if self.open_watch {
            return Ok(futures::stream::pending().boxed());
        }
        std::future::pending().await
    }
}
